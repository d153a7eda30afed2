use crate::{
    AppState,
    auth::forbid,
    error::{AppError, AppJson, AppResult},
    models::{
        Competition, CompetitionChanges, CompetitionCreatedResponse, CreateCompetitionRequest,
        CreateRegistrationRequest, CreateSchoolRequest, CreateStudentRequest, LoginRequest,
        LoginResponse, MessageResponse, NewCompetition, NewSchool, NewStudent, NewUser,
        Registration, RegistrationCreatedResponse, RegistrationStatus, Role, School, SchoolChanges,
        SchoolCreatedResponse, Student, StudentChanges, StudentCreatedResponse,
        UpdateCompetitionRequest, UpdateRegistrationStatusRequest, UpdateSchoolRequest,
        UpdateStudentRequest, UpdateUserRequest, User, UserChanges, UserSummary,
    },
    policy::{
        Principal, StudentPlacement,
        authorization::{
            can_cancel_registration, can_list_school_students, can_manage_student,
            can_read_catalog, can_register_student, can_update_school, can_update_user,
            can_view_student_registrations, require_admin, student_placement,
        },
        eligibility::{
            Ineligible, check_cancellation, check_not_registered, check_registration_window,
            check_status_transition, confirmed_registration, validate_competition_dates,
            validate_competition_update,
        },
    },
    repository::{Repository, is_unique_violation},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};

const ADMIN_REQUIRED: &str = "Admin access required";
const MISSING_FIELDS: &str = "Missing required fields";
const EMAIL_IN_USE: &str = "Email already in use";

// --- Helpers ---

/// parse_date
///
/// Accepts a full RFC 3339 timestamp or a bare `YYYY-MM-DD`, which is read as
/// midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_optional_date(raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_date(value).ok_or_else(|| AppError::Validation("Invalid date format".to_string()))
    })
    .transpose()
}

/// Treats blank strings the same as absent ones, on create and on partial
/// update alike.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn not_found(what: &str) -> AppError {
    AppError::NotFound(format!("{what} not found"))
}

async fn ensure_email_available(
    repo: &dyn Repository,
    email: &str,
    owner: Option<i32>,
) -> AppResult<()> {
    match repo.find_user_by_email(email).await? {
        Some(existing) if Some(existing.id) != owner => {
            Err(AppError::Conflict(EMAIL_IN_USE.to_string()))
        }
        _ => Ok(()),
    }
}

/// A unique violation on `users.email` that slipped past the pre-check.
fn email_conflict(err: sqlx::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(EMAIL_IN_USE.to_string())
    } else {
        err.into()
    }
}

// --- Users ---

/// login
///
/// [Public Route] Exchanges an email and password for a bearer token.
/// Unknown email and wrong password are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = MessageResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let credential = state
        .repo
        .find_credential_by_email(&payload.email)
        .await?
        .filter(|c| {
            state
                .credentials
                .verify_password(&payload.password, &c.password_hash)
        });

    let Some(credential) = credential else {
        tracing::info!(email = %payload.email, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    let token = state
        .credentials
        .issue_token(credential.id, &credential.email, credential.role)?;

    tracing::info!(user_id = credential.id, "login succeeded");
    Ok(Json(LoginResponse {
        token,
        user: UserSummary {
            id: credential.id,
            email: credential.email,
            name: credential.name,
            role: credential.role,
        },
    }))
}

/// create_school_account
///
/// [Admin Route] Creates a `school` user and its school profile in one transaction.
#[utoipa::path(
    post,
    path = "/api/users/schools",
    request_body = CreateSchoolRequest,
    responses(
        (status = 201, description = "School created", body = SchoolCreatedResponse),
        (status = 400, description = "Missing required fields", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 409, description = "Email already in use", body = MessageResponse)
    )
)]
pub async fn create_school_account(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<CreateSchoolRequest>,
) -> AppResult<(StatusCode, Json<SchoolCreatedResponse>)> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;

    let (Some(email), Some(password), Some(name), Some(school_name)) = (
        present(payload.email),
        present(payload.password),
        present(payload.name),
        present(payload.school_name),
    ) else {
        return Err(AppError::Validation(MISSING_FIELDS.to_string()));
    };

    ensure_email_available(state.repo.as_ref(), &email, None).await?;
    let password_hash = state.credentials.hash_password(&password)?;

    let (user, school) = state
        .repo
        .create_school_account(
            NewUser {
                email,
                password_hash,
                name,
                role: Role::School,
            },
            NewSchool {
                school_name,
                address: payload.address,
                phone: payload.phone,
            },
        )
        .await
        .map_err(email_conflict)?;

    tracing::info!(user_id = user.id, school_id = school.id, "school account created");
    Ok((
        StatusCode::CREATED,
        Json(SchoolCreatedResponse {
            message: "School created successfully".to_string(),
            user_id: user.id,
            school_id: school.id,
        }),
    ))
}

/// create_student_account
///
/// [Admin or School Route] Creates a `student` user and its student profile.
/// A school actor always places the student in its own school; an admin must
/// name an existing school.
#[utoipa::path(
    post,
    path = "/api/users/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = StudentCreatedResponse),
        (status = 400, description = "Missing required fields", body = MessageResponse),
        (status = 403, description = "School or admin access required", body = MessageResponse),
        (status = 404, description = "School not found", body = MessageResponse),
        (status = 409, description = "Email already in use", body = MessageResponse)
    )
)]
pub async fn create_student_account(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<CreateStudentRequest>,
) -> AppResult<(StatusCode, Json<StudentCreatedResponse>)> {
    let placement = student_placement(&principal, payload.school_id)
        .map_err(|d| forbid(&principal, d, "School or admin access required"))?;

    let (Some(email), Some(password), Some(name)) = (
        present(payload.email),
        present(payload.password),
        present(payload.name),
    ) else {
        return Err(AppError::Validation(MISSING_FIELDS.to_string()));
    };

    let school_id = match placement {
        StudentPlacement::Forced(school_id) => school_id,
        StudentPlacement::Requested(None) => {
            return Err(AppError::Validation(MISSING_FIELDS.to_string()));
        }
        StudentPlacement::Requested(Some(school_id)) => {
            state
                .repo
                .find_school(school_id)
                .await?
                .ok_or_else(|| not_found("School"))?;
            school_id
        }
    };

    ensure_email_available(state.repo.as_ref(), &email, None).await?;
    let password_hash = state.credentials.hash_password(&password)?;

    let (user, student) = state
        .repo
        .create_student_account(
            NewUser {
                email,
                password_hash,
                name,
                role: Role::Student,
            },
            NewStudent {
                school_id,
                grade: payload.grade,
                age: payload.age,
            },
        )
        .await
        .map_err(email_conflict)?;

    tracing::info!(user_id = user.id, student_id = student.id, school_id, "student account created");
    Ok((
        StatusCode::CREATED,
        Json(StudentCreatedResponse {
            message: "Student created successfully".to_string(),
            user_id: user.id,
            student_id: student.id,
        }),
    ))
}

/// create_student
///
/// [Admin or School Route] Alias of `create_student_account` mounted under the
/// students resource.
#[utoipa::path(
    post,
    path = "/api/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = StudentCreatedResponse),
        (status = 403, description = "School or admin access required", body = MessageResponse)
    )
)]
pub async fn create_student(
    state: State<AppState>,
    principal: Principal,
    payload: AppJson<CreateStudentRequest>,
) -> AppResult<(StatusCode, Json<StudentCreatedResponse>)> {
    create_student_account(state, principal, payload).await
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Admin access required", body = MessageResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<User>>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    Ok(Json(state.repo.list_users().await?))
}

/// update_user
///
/// [Authenticated Route] Users may edit themselves; admins may edit anyone.
/// A new password is re-hashed before it reaches the store.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = MessageResponse),
        (status = 403, description = "Not the same user", body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse),
        (status = 409, description = "Email already in use", body = MessageResponse)
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<MessageResponse>> {
    can_update_user(&principal, id)
        .map_err(|d| forbid(&principal, d, "Not authorized to update this user"))?;

    state
        .repo
        .find_user(id)
        .await?
        .ok_or_else(|| not_found("User"))?;

    let email = present(payload.email);
    if let Some(email) = email.as_deref() {
        ensure_email_available(state.repo.as_ref(), email, Some(id)).await?;
    }

    let password_hash = match present(payload.password) {
        Some(password) => Some(state.credentials.hash_password(&password)?),
        None => None,
    };

    let changes = UserChanges {
        name: present(payload.name),
        email,
        password_hash,
        role: None,
    };
    if !state.repo.update_user(id, changes).await.map_err(email_conflict)? {
        return Err(not_found("User"));
    }
    Ok(Json(MessageResponse::new("User updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    if !state.repo.delete_user(id).await? {
        return Err(not_found("User"));
    }
    tracing::info!(user_id = id, deleted_by = principal.user_id(), "user deleted");
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

// --- Schools ---

#[utoipa::path(
    get,
    path = "/api/schools",
    responses((status = 200, description = "All schools", body = [School]))
)]
pub async fn list_schools(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<School>>> {
    can_read_catalog(&principal)?;
    Ok(Json(state.repo.list_schools().await?))
}

#[utoipa::path(
    get,
    path = "/api/schools/{id}",
    params(("id" = i32, Path, description = "School id")),
    responses(
        (status = 200, description = "School", body = School),
        (status = 404, description = "School not found", body = MessageResponse)
    )
)]
pub async fn get_school(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<School>> {
    can_read_catalog(&principal)?;
    let school = state
        .repo
        .find_school(id)
        .await?
        .ok_or_else(|| not_found("School"))?;
    Ok(Json(school))
}

/// update_school
///
/// [Authenticated Route] The owning school user or an admin.
#[utoipa::path(
    put,
    path = "/api/schools/{id}",
    params(("id" = i32, Path, description = "School id")),
    request_body = UpdateSchoolRequest,
    responses(
        (status = 200, description = "School updated", body = MessageResponse),
        (status = 403, description = "Not the owning school", body = MessageResponse),
        (status = 404, description = "School not found", body = MessageResponse)
    )
)]
pub async fn update_school(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateSchoolRequest>,
) -> AppResult<Json<MessageResponse>> {
    let school = state
        .repo
        .find_school(id)
        .await?
        .ok_or_else(|| not_found("School"))?;
    can_update_school(&principal, &school)
        .map_err(|d| forbid(&principal, d, "Not authorized to update this school"))?;

    let changes = SchoolChanges {
        school_name: present(payload.school_name),
        address: payload.address,
        phone: payload.phone,
    };
    if !state.repo.update_school(id, changes).await? {
        return Err(not_found("School"));
    }
    Ok(Json(MessageResponse::new("School updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/schools/{id}",
    params(("id" = i32, Path, description = "School id")),
    responses(
        (status = 200, description = "School deleted", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "School not found", body = MessageResponse)
    )
)]
pub async fn delete_school(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    if !state.repo.delete_school(id).await? {
        return Err(not_found("School"));
    }
    Ok(Json(MessageResponse::new("School deleted successfully")))
}

// --- Students ---

#[utoipa::path(
    get,
    path = "/api/students",
    responses(
        (status = 200, description = "All students", body = [Student]),
        (status = 403, description = "Admin access required", body = MessageResponse)
    )
)]
pub async fn list_students(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Student>>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    Ok(Json(state.repo.list_students().await?))
}

/// list_school_students
///
/// [Authenticated Route] An admin may list any school; a school only its own.
/// The decision does not depend on whether the target school has students.
#[utoipa::path(
    get,
    path = "/api/students/school/{id}",
    params(("id" = i32, Path, description = "School id")),
    responses(
        (status = 200, description = "Students of the school", body = [Student]),
        (status = 403, description = "Not authorized to view these students", body = MessageResponse)
    )
)]
pub async fn list_school_students(
    State(state): State<AppState>,
    principal: Principal,
    Path(school_id): Path<i32>,
) -> AppResult<Json<Vec<Student>>> {
    can_list_school_students(&principal, school_id)
        .map_err(|d| forbid(&principal, d, "Not authorized to view these students"))?;
    Ok(Json(state.repo.list_students_by_school(school_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id" = i32, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student", body = Student),
        (status = 403, description = "Not authorized to view this student", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    )
)]
pub async fn get_student(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<Student>> {
    let student = state
        .repo
        .find_student(id)
        .await?
        .ok_or_else(|| not_found("Student"))?;
    can_manage_student(&principal, &student)
        .map_err(|d| forbid(&principal, d, "Not authorized to view this student"))?;
    Ok(Json(student))
}

#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id" = i32, Path, description = "Student id")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student updated", body = MessageResponse),
        (status = 403, description = "Not authorized to update this student", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    )
)]
pub async fn update_student(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateStudentRequest>,
) -> AppResult<Json<MessageResponse>> {
    let student = state
        .repo
        .find_student(id)
        .await?
        .ok_or_else(|| not_found("Student"))?;
    can_manage_student(&principal, &student)
        .map_err(|d| forbid(&principal, d, "Not authorized to update this student"))?;

    let changes = StudentChanges {
        grade: present(payload.grade),
        age: payload.age.filter(|age| *age != 0),
    };
    if !state.repo.update_student(id, changes).await? {
        return Err(not_found("Student"));
    }
    Ok(Json(MessageResponse::new("Student updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id" = i32, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student deleted", body = MessageResponse),
        (status = 403, description = "Not authorized to delete this student", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    )
)]
pub async fn delete_student(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    let student = state
        .repo
        .find_student(id)
        .await?
        .ok_or_else(|| not_found("Student"))?;
    can_manage_student(&principal, &student)
        .map_err(|d| forbid(&principal, d, "Not authorized to delete this student"))?;

    if !state.repo.delete_student(id).await? {
        return Err(not_found("Student"));
    }
    Ok(Json(MessageResponse::new("Student deleted successfully")))
}

// --- Competitions ---

#[utoipa::path(
    get,
    path = "/api/competitions",
    responses((status = 200, description = "All competitions", body = [Competition]))
)]
pub async fn list_competitions(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Competition>>> {
    can_read_catalog(&principal)?;
    Ok(Json(state.repo.list_competitions().await?))
}

/// list_upcoming_competitions
///
/// [Authenticated Route] Competitions whose registration window has not closed
/// yet, soonest first.
#[utoipa::path(
    get,
    path = "/api/competitions/upcoming",
    responses((status = 200, description = "Open competitions", body = [Competition]))
)]
pub async fn list_upcoming_competitions(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<Competition>>> {
    can_read_catalog(&principal)?;
    let now = state.clock.now();
    Ok(Json(state.repo.list_upcoming_competitions(now).await?))
}

#[utoipa::path(
    get,
    path = "/api/competitions/{id}",
    params(("id" = i32, Path, description = "Competition id")),
    responses(
        (status = 200, description = "Competition", body = Competition),
        (status = 404, description = "Competition not found", body = MessageResponse)
    )
)]
pub async fn get_competition(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<Competition>> {
    can_read_catalog(&principal)?;
    let competition = state
        .repo
        .find_competition(id)
        .await?
        .ok_or_else(|| not_found("Competition"))?;
    Ok(Json(competition))
}

/// create_competition
///
/// [Admin Route] Registration must close no later than the competition starts.
#[utoipa::path(
    post,
    path = "/api/competitions",
    request_body = CreateCompetitionRequest,
    responses(
        (status = 201, description = "Competition created", body = CompetitionCreatedResponse),
        (status = 400, description = "Invalid dates or missing fields", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse)
    )
)]
pub async fn create_competition(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<CreateCompetitionRequest>,
) -> AppResult<(StatusCode, Json<CompetitionCreatedResponse>)> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;

    let (Some(name), Some(start_raw), Some(last_raw)) = (
        present(payload.name),
        present(payload.start_date),
        present(payload.last_registration_date),
    ) else {
        return Err(AppError::Validation(MISSING_FIELDS.to_string()));
    };

    let (Some(start_date), Some(last_registration_date)) =
        (parse_date(&start_raw), parse_date(&last_raw))
    else {
        return Err(AppError::Validation("Invalid date format".to_string()));
    };
    validate_competition_dates(start_date, last_registration_date)?;

    let competition = state
        .repo
        .create_competition(NewCompetition {
            name,
            description: payload.description.unwrap_or_default(),
            start_date,
            last_registration_date,
        })
        .await?;

    tracing::info!(competition_id = competition.id, "competition created");
    Ok((
        StatusCode::CREATED,
        Json(CompetitionCreatedResponse {
            message: "Competition created successfully".to_string(),
            competition_id: competition.id,
        }),
    ))
}

/// update_competition
///
/// [Admin Route] Partial update. The date ordering is re-checked against the
/// persisted value of whichever date is not being changed.
#[utoipa::path(
    put,
    path = "/api/competitions/{id}",
    params(("id" = i32, Path, description = "Competition id")),
    request_body = UpdateCompetitionRequest,
    responses(
        (status = 200, description = "Competition updated", body = MessageResponse),
        (status = 400, description = "Invalid dates", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "Competition not found", body = MessageResponse)
    )
)]
pub async fn update_competition(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateCompetitionRequest>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;

    let existing = state
        .repo
        .find_competition(id)
        .await?
        .ok_or_else(|| not_found("Competition"))?;

    let changes = CompetitionChanges {
        name: present(payload.name),
        description: present(payload.description),
        start_date: parse_optional_date(present(payload.start_date).as_deref())?,
        last_registration_date: parse_optional_date(
            present(payload.last_registration_date).as_deref(),
        )?,
    };
    validate_competition_update(&existing, &changes)?;

    if !state.repo.update_competition(id, changes).await? {
        return Err(not_found("Competition"));
    }
    Ok(Json(MessageResponse::new("Competition updated successfully")))
}

#[utoipa::path(
    delete,
    path = "/api/competitions/{id}",
    params(("id" = i32, Path, description = "Competition id")),
    responses(
        (status = 200, description = "Competition deleted", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "Competition not found", body = MessageResponse)
    )
)]
pub async fn delete_competition(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    if !state.repo.delete_competition(id).await? {
        return Err(not_found("Competition"));
    }
    Ok(Json(MessageResponse::new("Competition deleted successfully")))
}

// --- Registrations ---

#[utoipa::path(
    get,
    path = "/api/competitions/{id}/registrations",
    params(("id" = i32, Path, description = "Competition id")),
    responses(
        (status = 200, description = "Registrations for the competition", body = [Registration]),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "Competition not found", body = MessageResponse)
    )
)]
pub async fn list_competition_registrations(
    State(state): State<AppState>,
    principal: Principal,
    Path(competition_id): Path<i32>,
) -> AppResult<Json<Vec<Registration>>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;
    state
        .repo
        .find_competition(competition_id)
        .await?
        .ok_or_else(|| not_found("Competition"))?;
    Ok(Json(
        state
            .repo
            .list_registrations_by_competition(competition_id)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/students/{id}/registrations",
    params(("id" = i32, Path, description = "Student id")),
    responses(
        (status = 200, description = "Registrations of the student", body = [Registration]),
        (status = 403, description = "Not the student or its school", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    )
)]
pub async fn list_student_registrations(
    State(state): State<AppState>,
    principal: Principal,
    Path(student_id): Path<i32>,
) -> AppResult<Json<Vec<Registration>>> {
    let student = state
        .repo
        .find_student(student_id)
        .await?
        .ok_or_else(|| not_found("Student"))?;
    can_view_student_registrations(&principal, &student).map_err(|d| {
        let message = match principal {
            Principal::Student { .. } => "You can only view your own registrations",
            _ => "You can only view registrations for students in your school",
        };
        forbid(&principal, d, message)
    })?;
    Ok(Json(
        state.repo.list_registrations_by_student(student_id).await?,
    ))
}

/// register_student
///
/// [Authenticated Route] Enters a student into a competition.
///
/// Order of checks: both records must exist, the registration window must be
/// open, the actor must own the student, and the pair must not be registered
/// already. New registrations are stored as `confirmed`.
#[utoipa::path(
    post,
    path = "/api/registrations",
    request_body = CreateRegistrationRequest,
    responses(
        (status = 201, description = "Student registered", body = RegistrationCreatedResponse),
        (status = 400, description = "Registration closed or already registered", body = MessageResponse),
        (status = 403, description = "Actor does not own the student", body = MessageResponse),
        (status = 404, description = "Student or competition not found", body = MessageResponse)
    )
)]
pub async fn register_student(
    State(state): State<AppState>,
    principal: Principal,
    AppJson(payload): AppJson<CreateRegistrationRequest>,
) -> AppResult<(StatusCode, Json<RegistrationCreatedResponse>)> {
    let student = state
        .repo
        .find_student(payload.student_id)
        .await?
        .ok_or_else(|| not_found("Student"))?;
    let competition = state
        .repo
        .find_competition(payload.competition_id)
        .await?
        .ok_or_else(|| not_found("Competition"))?;

    let now = state.clock.now();
    check_registration_window(&competition, now)?;

    can_register_student(&principal, &student).map_err(|d| {
        let message = match principal {
            Principal::Student { .. } => "You can only register yourself",
            _ => "You can only register students from your school",
        };
        forbid(&principal, d, message)
    })?;

    let existing = state
        .repo
        .find_registration_for(student.id, competition.id)
        .await?;
    check_not_registered(existing.as_ref())?;

    let registration = state
        .repo
        .create_registration(confirmed_registration(student.id, competition.id, now))
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::from(Ineligible::DuplicateRegistration)
            } else {
                err.into()
            }
        })?;

    tracing::info!(
        registration_id = registration.id,
        student_id = student.id,
        competition_id = competition.id,
        "student registered"
    );
    Ok((
        StatusCode::CREATED,
        Json(RegistrationCreatedResponse {
            message: "Student registered successfully".to_string(),
            registration_id: registration.id,
        }),
    ))
}

/// cancel_registration
///
/// [Authenticated Route] Moves a registration to `cancelled` in place. Allowed
/// until the competition starts.
#[utoipa::path(
    put,
    path = "/api/registrations/{id}/cancel",
    params(("id" = i32, Path, description = "Registration id")),
    responses(
        (status = 200, description = "Registration cancelled", body = MessageResponse),
        (status = 400, description = "Competition already started", body = MessageResponse),
        (status = 403, description = "Actor does not own the registration", body = MessageResponse),
        (status = 404, description = "Registration not found", body = MessageResponse)
    )
)]
pub async fn cancel_registration(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
) -> AppResult<Json<MessageResponse>> {
    let registration = state
        .repo
        .find_registration(id)
        .await?
        .ok_or_else(|| not_found("Registration"))?;

    let owner = match principal {
        Principal::School { .. } => state.repo.find_student(registration.student_id).await?,
        Principal::Admin { .. } | Principal::Student { .. } => None,
    };
    can_cancel_registration(&principal, &registration, owner.as_ref()).map_err(|d| {
        let message = match principal {
            Principal::Student { .. } => "You can only cancel your own registrations",
            _ => "You can only cancel registrations for students in your school",
        };
        forbid(&principal, d, message)
    })?;

    let competition = state
        .repo
        .find_competition(registration.competition_id)
        .await?;
    check_cancellation(registration.status, competition.as_ref(), state.clock.now())?;

    if !state
        .repo
        .set_registration_status(id, RegistrationStatus::Cancelled)
        .await?
    {
        return Err(not_found("Registration"));
    }
    tracing::info!(registration_id = id, cancelled_by = principal.user_id(), "registration cancelled");
    Ok(Json(MessageResponse::new("Registration cancelled successfully")))
}

/// update_registration_status
///
/// [Admin Route] Moves a registration along its lifecycle. Terminal states
/// (`rejected`, `cancelled`) accept no further change.
#[utoipa::path(
    put,
    path = "/api/registrations/{id}/status",
    params(("id" = i32, Path, description = "Registration id")),
    request_body = UpdateRegistrationStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = MessageResponse),
        (status = 400, description = "Transition not allowed", body = MessageResponse),
        (status = 403, description = "Admin access required", body = MessageResponse),
        (status = 404, description = "Registration not found", body = MessageResponse)
    )
)]
pub async fn update_registration_status(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateRegistrationStatusRequest>,
) -> AppResult<Json<MessageResponse>> {
    require_admin(&principal).map_err(|d| forbid(&principal, d, ADMIN_REQUIRED))?;

    let registration = state
        .repo
        .find_registration(id)
        .await?
        .ok_or_else(|| not_found("Registration"))?;
    check_status_transition(registration.status, payload.status)?;

    if !state.repo.set_registration_status(id, payload.status).await? {
        return Err(not_found("Registration"));
    }
    tracing::info!(
        registration_id = id,
        from = %registration.status,
        to = %payload.status,
        "registration status changed"
    );
    Ok(Json(MessageResponse::new("Registration status updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_bare_dates_as_utc_midnight() {
        assert_eq!(
            parse_date("2025-06-01"),
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_date("2025-06-01T12:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date("2025-13-01"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn optional_date_reports_invalid_format() {
        assert!(matches!(parse_optional_date(None), Ok(None)));
        assert!(matches!(
            parse_optional_date(Some("nope")),
            Err(AppError::Validation(msg)) if msg == "Invalid date format"
        ));
    }

    #[test]
    fn blank_fields_count_as_missing() {
        assert_eq!(present(Some("   ".to_string())), None);
        assert_eq!(present(Some("x".to_string())), Some("x".to_string()));
        assert_eq!(present(None), None);
    }
}
