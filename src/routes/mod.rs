/// Router Module Index
///
/// Routes are split by whether the auth layer applies. Role checks live in the
/// handlers, because most rules depend on the resource being touched.

/// Routes reachable without a token (health, login).
pub mod public;

/// Routes behind the bearer-token layer.
pub mod authenticated;
