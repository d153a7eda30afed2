use thiserror::Error;

use crate::models::{Registration, Role, School, Student};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("role is not permitted for this operation")]
    WrongRole,
    #[error("actor does not own the target resource")]
    NotOwner,
    /// The actor's own profile row (or the resource's owner) could not be found,
    /// so ownership cannot be established.
    #[error("ownership could not be resolved")]
    OwnershipUnresolved,
    #[error("unrecognized role")]
    UnknownRole,
}

pub type Decision = Result<(), Denial>;

/// Principal
///
/// An authenticated actor together with its resolved ownership chain: the school
/// row for a school user, the student row for a student user. `None` means the
/// profile row is missing, which denies every ownership-based action.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Admin { user_id: i32 },
    School { user_id: i32, school: Option<School> },
    Student { user_id: i32, student: Option<Student> },
}

impl Principal {
    pub fn user_id(&self) -> i32 {
        match self {
            Principal::Admin { user_id }
            | Principal::School { user_id, .. }
            | Principal::Student { user_id, .. } => *user_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Admin { .. } => Role::Admin,
            Principal::School { .. } => Role::School,
            Principal::Student { .. } => Role::Student,
        }
    }
}

/// Where a newly created student will be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentPlacement {
    /// Admin path: the client-supplied school id, which the caller must verify exists.
    Requested(Option<i32>),
    /// School path: the actor's own school, regardless of what the client sent.
    Forced(i32),
}

/// Maps the raw role claim of a token onto the closed role set.
pub fn role_from_claim(raw: &str) -> Result<Role, Denial> {
    raw.parse::<Role>().map_err(|_| Denial::UnknownRole)
}

fn owns_school(school: Option<&School>, school_id: i32) -> Decision {
    match school {
        None => Err(Denial::OwnershipUnresolved),
        Some(school) if school.id == school_id => Ok(()),
        Some(_) => Err(Denial::NotOwner),
    }
}

fn is_student(student: Option<&Student>, student_id: i32) -> Decision {
    match student {
        None => Err(Denial::OwnershipUnresolved),
        Some(student) if student.id == student_id => Ok(()),
        Some(_) => Err(Denial::NotOwner),
    }
}

// --- Role-only rules ---

/// Competition writes, user administration, school deletion, registration
/// listing per competition, student listing, registration status overrides.
pub fn require_admin(principal: &Principal) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { .. } | Principal::Student { .. } => Err(Denial::WrongRole),
    }
}

/// Competitions and schools are readable by every authenticated role.
pub fn can_read_catalog(principal: &Principal) -> Decision {
    match principal {
        Principal::Admin { .. } | Principal::School { .. } | Principal::Student { .. } => Ok(()),
    }
}

// --- Ownership rules ---

pub fn can_view_student_registrations(principal: &Principal, target: &Student) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => owns_school(school.as_ref(), target.school_id),
        Principal::Student { student, .. } => is_student(student.as_ref(), target.id),
    }
}

pub fn can_register_student(principal: &Principal, target: &Student) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => owns_school(school.as_ref(), target.school_id),
        Principal::Student { student, .. } => is_student(student.as_ref(), target.id),
    }
}

/// `owner` is the student the registration belongs to; only the school path
/// needs it, and a missing row means ownership is unresolved.
pub fn can_cancel_registration(
    principal: &Principal,
    registration: &Registration,
    owner: Option<&Student>,
) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => {
            let owner = owner.ok_or(Denial::OwnershipUnresolved)?;
            owns_school(school.as_ref(), owner.school_id)
        }
        Principal::Student { student, .. } => {
            is_student(student.as_ref(), registration.student_id)
        }
    }
}

pub fn student_placement(
    principal: &Principal,
    requested_school_id: Option<i32>,
) -> Result<StudentPlacement, Denial> {
    match principal {
        Principal::Admin { .. } => Ok(StudentPlacement::Requested(requested_school_id)),
        Principal::School { school, .. } => school
            .as_ref()
            .map(|school| StudentPlacement::Forced(school.id))
            .ok_or(Denial::OwnershipUnresolved),
        Principal::Student { .. } => Err(Denial::WrongRole),
    }
}

/// Read, update and delete of a single student record.
pub fn can_manage_student(principal: &Principal, target: &Student) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => owns_school(school.as_ref(), target.school_id),
        Principal::Student { .. } => Err(Denial::WrongRole),
    }
}

pub fn can_list_school_students(principal: &Principal, school_id: i32) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => owns_school(school.as_ref(), school_id),
        Principal::Student { .. } => Err(Denial::WrongRole),
    }
}

pub fn can_update_school(principal: &Principal, target: &School) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { school, .. } => owns_school(school.as_ref(), target.id),
        Principal::Student { .. } => Err(Denial::WrongRole),
    }
}

pub fn can_update_user(principal: &Principal, target_user_id: i32) -> Decision {
    match principal {
        Principal::Admin { .. } => Ok(()),
        Principal::School { user_id, .. } | Principal::Student { user_id, .. } => {
            if *user_id == target_user_id {
                Ok(())
            } else {
                Err(Denial::NotOwner)
            }
        }
    }
}
