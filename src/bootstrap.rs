use crate::{
    config::AppConfig,
    credentials::CredentialService,
    error::AppError,
    models::{NewUser, Role, UserChanges},
    repository::Repository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminBootstrap {
    AlreadyPresent,
    Created(i32),
    Promoted(i32),
}

/// ensure_default_admin
///
/// Guarantees an admin account exists. If none does, the configured admin
/// email is either promoted (when a non-admin already owns it) or created.
/// Never fails startup: errors are logged and reported as `None`.
pub async fn ensure_default_admin(
    repo: &dyn Repository,
    credentials: &dyn CredentialService,
    config: &AppConfig,
) -> Option<AdminBootstrap> {
    match try_ensure_default_admin(repo, credentials, config).await {
        Ok(outcome) => {
            match outcome {
                AdminBootstrap::AlreadyPresent => tracing::debug!("admin account present"),
                AdminBootstrap::Created(id) => {
                    tracing::info!(user_id = id, email = %config.admin_email, "default admin created")
                }
                AdminBootstrap::Promoted(id) => {
                    tracing::info!(user_id = id, email = %config.admin_email, "existing user promoted to admin")
                }
            }
            Some(outcome)
        }
        Err(err) => {
            tracing::error!(error = %err, "default admin bootstrap failed; continuing without it");
            None
        }
    }
}

async fn try_ensure_default_admin(
    repo: &dyn Repository,
    credentials: &dyn CredentialService,
    config: &AppConfig,
) -> Result<AdminBootstrap, AppError> {
    if repo.find_any_admin().await?.is_some() {
        return Ok(AdminBootstrap::AlreadyPresent);
    }

    if let Some(existing) = repo.find_user_by_email(&config.admin_email).await? {
        let changes = UserChanges {
            role: Some(Role::Admin),
            ..Default::default()
        };
        repo.update_user(existing.id, changes).await?;
        return Ok(AdminBootstrap::Promoted(existing.id));
    }

    let password_hash = credentials.hash_password(&config.admin_password)?;
    let admin = repo
        .create_user(NewUser {
            email: config.admin_email.clone(),
            password_hash,
            name: "Administrator".to_string(),
            role: Role::Admin,
        })
        .await?;
    Ok(AdminBootstrap::Created(admin.id))
}
