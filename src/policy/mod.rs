//! Pure decision logic. Nothing in here touches the store, the clock or the
//! network: callers resolve the ownership chain and the current instant first,
//! then ask these functions for a verdict.

pub mod authorization;
pub mod eligibility;

pub use authorization::{Decision, Denial, Principal, StudentPlacement};
pub use eligibility::Ineligible;
