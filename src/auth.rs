use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{
    credentials::CredentialState,
    error::AppError,
    models::Role,
    policy::{Denial, Principal, authorization::role_from_claim},
    repository::{RepoResult, Repository, RepositoryState},
};

/// AuthUser
///
/// The resolved identity of an authenticated request. Handlers that only need
/// the actor's id or role take this; handlers that make ownership decisions take
/// `Principal` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i32,
    pub email: String,
    /// The role as currently persisted, which wins over the token claim if an
    /// admin changed it after the token was issued.
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Reads `Authorization: Bearer <token>`.
/// 2. Verifies signature and expiry through the credential service.
/// 3. Refuses a role claim outside the closed role set (403 "Unauthorized").
/// 4. Confirms the user still exists, so deleted users lose access immediately.
///
/// If the auth layer already resolved the user it is taken from the request
/// extensions instead.
///
/// Rejection: `Denial::NotAuthenticated` (401) for a missing token or a user
/// that no longer exists, `AppError::Unauthenticated` (401) for a bad token.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    CredentialState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the auth layer for this request.
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let credentials = CredentialState::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(Denial::NotAuthenticated)?;

        let identity = credentials.verify_token(token)?;

        role_from_claim(&identity.role).map_err(|denial| {
            tracing::warn!(user_id = identity.user_id, role = %identity.role, "unrecognized role claim");
            AppError::denied(denial, "Unauthorized")
        })?;

        let user = repo
            .find_user(identity.user_id)
            .await?
            .ok_or(Denial::NotAuthenticated)?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            role: user.role,
        })
    }
}

/// Principal Extractor Implementation
///
/// Authenticates through `AuthUser`, then walks the ownership chain: the school
/// row for a school user, the student row for a student user. A missing profile
/// row is kept as `None` and denies every ownership-based action later.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    CredentialState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_user = AuthUser::from_request_parts(parts, state).await?;
        let repo = RepositoryState::from_ref(state);
        Ok(resolve_principal(repo.as_ref(), &auth_user).await?)
    }
}

pub async fn resolve_principal(repo: &dyn Repository, user: &AuthUser) -> RepoResult<Principal> {
    let principal = match user.role {
        Role::Admin => Principal::Admin { user_id: user.id },
        Role::School => Principal::School {
            user_id: user.id,
            school: repo.find_school_by_user(user.id).await?,
        },
        Role::Student => Principal::Student {
            user_id: user.id,
            student: repo.find_student_by_user(user.id).await?,
        },
    };
    Ok(principal)
}

/// Logs a policy denial with the actor attached, then converts it.
pub fn forbid(principal: &Principal, denial: Denial, message: &str) -> AppError {
    tracing::warn!(
        user_id = principal.user_id(),
        role = %principal.role(),
        reason = %denial,
        "authorization denied"
    );
    AppError::denied(denial, message)
}
