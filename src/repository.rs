use crate::models::{
    Competition, CompetitionChanges, Credential, NewCompetition, NewRegistration, NewSchool,
    NewStudent, NewUser, Registration, RegistrationStatus, Role, School, SchoolChanges, Student,
    StudentChanges, User, UserChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// The Entity Store contract. Handlers depend on this trait only, so the Postgres
/// implementation can be swapped for an in-memory one in tests.
///
/// Conventions:
/// - `find_*` returns `Ok(None)` when nothing matches; `Err` is reserved for store failures.
/// - `update_*` / `delete_*` return whether a row was affected.
/// - Nothing here returns a password hash except `find_credential_by_email`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: i32) -> RepoResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// Login lookup: the only query that exposes the credential hash.
    async fn find_credential_by_email(&self, email: &str) -> RepoResult<Option<Credential>>;
    async fn find_any_admin(&self) -> RepoResult<Option<User>>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn update_user(&self, id: i32, changes: UserChanges) -> RepoResult<bool>;
    async fn delete_user(&self, id: i32) -> RepoResult<bool>;

    // --- Accounts (user + profile, atomically) ---
    async fn create_school_account(
        &self,
        user: NewUser,
        school: NewSchool,
    ) -> RepoResult<(User, School)>;
    async fn create_student_account(
        &self,
        user: NewUser,
        student: NewStudent,
    ) -> RepoResult<(User, Student)>;

    // --- Schools ---
    async fn find_school(&self, id: i32) -> RepoResult<Option<School>>;
    async fn find_school_by_user(&self, user_id: i32) -> RepoResult<Option<School>>;
    async fn list_schools(&self) -> RepoResult<Vec<School>>;
    async fn update_school(&self, id: i32, changes: SchoolChanges) -> RepoResult<bool>;
    async fn delete_school(&self, id: i32) -> RepoResult<bool>;

    // --- Students ---
    async fn find_student(&self, id: i32) -> RepoResult<Option<Student>>;
    async fn find_student_by_user(&self, user_id: i32) -> RepoResult<Option<Student>>;
    async fn list_students(&self) -> RepoResult<Vec<Student>>;
    async fn list_students_by_school(&self, school_id: i32) -> RepoResult<Vec<Student>>;
    async fn update_student(&self, id: i32, changes: StudentChanges) -> RepoResult<bool>;
    async fn delete_student(&self, id: i32) -> RepoResult<bool>;

    // --- Competitions ---
    async fn find_competition(&self, id: i32) -> RepoResult<Option<Competition>>;
    async fn list_competitions(&self) -> RepoResult<Vec<Competition>>;
    /// Competitions still accepting registrations at `now`, soonest start first.
    async fn list_upcoming_competitions(&self, now: DateTime<Utc>) -> RepoResult<Vec<Competition>>;
    async fn create_competition(&self, competition: NewCompetition) -> RepoResult<Competition>;
    async fn update_competition(&self, id: i32, changes: CompetitionChanges) -> RepoResult<bool>;
    async fn delete_competition(&self, id: i32) -> RepoResult<bool>;

    // --- Registrations ---
    async fn find_registration(&self, id: i32) -> RepoResult<Option<Registration>>;
    /// Exact (student, competition) lookup used for duplicate detection.
    async fn find_registration_for(
        &self,
        student_id: i32,
        competition_id: i32,
    ) -> RepoResult<Option<Registration>>;
    async fn list_registrations_by_competition(
        &self,
        competition_id: i32,
    ) -> RepoResult<Vec<Registration>>;
    async fn list_registrations_by_student(&self, student_id: i32)
    -> RepoResult<Vec<Registration>>;
    async fn create_registration(&self, registration: NewRegistration)
    -> RepoResult<Registration>;
    async fn set_registration_status(
        &self,
        id: i32,
        status: RegistrationStatus,
    ) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// True when the store refused a write because of a UNIQUE constraint.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

const USER_COLUMNS: &str = "id, email, name, role, created_at, updated_at";
const SCHOOL_COLUMNS: &str = "id, user_id, school_name, address, phone";
const STUDENT_COLUMNS: &str = "id, user_id, school_id, grade, age";
const COMPETITION_COLUMNS: &str =
    "id, name, description, start_date, last_registration_date, created_at, updated_at";
const REGISTRATION_COLUMNS: &str =
    "id, student_id, competition_id, registration_date, status, created_at, updated_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are checked at runtime so the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn find_user(&self, id: i32) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_credential_by_email(&self, email: &str) -> RepoResult<Option<Credential>> {
        sqlx::query_as::<_, Credential>(
            "SELECT id, email, name, role, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_any_admin(&self) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id LIMIT 1"
        ))
        .bind(Role::Admin.as_str())
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
    }

    /// Uses `COALESCE` so only the supplied fields change.
    async fn update_user(&self, id: i32, changes: UserChanges) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.password_hash)
        .bind(changes.role.map(|r| r.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- ACCOUNTS ---

    async fn create_school_account(
        &self,
        user: NewUser,
        school: NewSchool,
    ) -> RepoResult<(User, School)> {
        let mut tx = self.pool.begin().await?;

        let created_user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let created_school = sqlx::query_as::<_, School>(&format!(
            "INSERT INTO schools (user_id, school_name, address, phone) VALUES ($1, $2, $3, $4) \
             RETURNING {SCHOOL_COLUMNS}"
        ))
        .bind(created_user.id)
        .bind(&school.school_name)
        .bind(&school.address)
        .bind(&school.phone)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created_user, created_school))
    }

    async fn create_student_account(
        &self,
        user: NewUser,
        student: NewStudent,
    ) -> RepoResult<(User, Student)> {
        let mut tx = self.pool.begin().await?;

        let created_user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let created_student = sqlx::query_as::<_, Student>(&format!(
            "INSERT INTO students (user_id, school_id, grade, age) VALUES ($1, $2, $3, $4) \
             RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(created_user.id)
        .bind(student.school_id)
        .bind(&student.grade)
        .bind(student.age)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((created_user, created_student))
    }

    // --- SCHOOLS ---

    async fn find_school(&self, id: i32) -> RepoResult<Option<School>> {
        sqlx::query_as::<_, School>(&format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn find_school_by_user(&self, user_id: i32) -> RepoResult<Option<School>> {
        sqlx::query_as::<_, School>(&format!(
            "SELECT {SCHOOL_COLUMNS} FROM schools WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_schools(&self) -> RepoResult<Vec<School>> {
        sqlx::query_as::<_, School>(&format!("SELECT {SCHOOL_COLUMNS} FROM schools ORDER BY id"))
            .fetch_all(&self.pool)
            .await
    }

    async fn update_school(&self, id: i32, changes: SchoolChanges) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE schools
            SET school_name = COALESCE($2, school_name),
                address = COALESCE($3, address),
                phone = COALESCE($4, phone)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.school_name)
        .bind(changes.address)
        .bind(changes.phone)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_school(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM schools WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- STUDENTS ---

    async fn find_student(&self, id: i32) -> RepoResult<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_student_by_user(&self, user_id: i32) -> RepoResult<Option<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_students(&self) -> RepoResult<Vec<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn list_students_by_school(&self, school_id: i32) -> RepoResult<Vec<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE school_id = $1 ORDER BY id"
        ))
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_student(&self, id: i32, changes: StudentChanges) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET grade = COALESCE($2, grade),
                age = COALESCE($3, age)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.grade)
        .bind(changes.age)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_student(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- COMPETITIONS ---

    async fn find_competition(&self, id: i32) -> RepoResult<Option<Competition>> {
        sqlx::query_as::<_, Competition>(&format!(
            "SELECT {COMPETITION_COLUMNS} FROM competitions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_competitions(&self) -> RepoResult<Vec<Competition>> {
        sqlx::query_as::<_, Competition>(&format!(
            "SELECT {COMPETITION_COLUMNS} FROM competitions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
    }

    async fn list_upcoming_competitions(
        &self,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Competition>> {
        sqlx::query_as::<_, Competition>(&format!(
            "SELECT {COMPETITION_COLUMNS} FROM competitions \
             WHERE last_registration_date >= $1 ORDER BY start_date ASC"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_competition(&self, competition: NewCompetition) -> RepoResult<Competition> {
        sqlx::query_as::<_, Competition>(&format!(
            "INSERT INTO competitions (name, description, start_date, last_registration_date) \
             VALUES ($1, $2, $3, $4) RETURNING {COMPETITION_COLUMNS}"
        ))
        .bind(&competition.name)
        .bind(&competition.description)
        .bind(competition.start_date)
        .bind(competition.last_registration_date)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_competition(&self, id: i32, changes: CompetitionChanges) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE competitions
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                start_date = COALESCE($4, start_date),
                last_registration_date = COALESCE($5, last_registration_date),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.start_date)
        .bind(changes.last_registration_date)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_competition(&self, id: i32) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM competitions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- REGISTRATIONS ---

    async fn find_registration(&self, id: i32) -> RepoResult<Option<Registration>> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_registration_for(
        &self,
        student_id: i32,
        competition_id: i32,
    ) -> RepoResult<Option<Registration>> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE student_id = $1 AND competition_id = $2"
        ))
        .bind(student_id)
        .bind(competition_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_registrations_by_competition(
        &self,
        competition_id: i32,
    ) -> RepoResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE competition_id = $1 ORDER BY registration_date"
        ))
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_registrations_by_student(
        &self,
        student_id: i32,
    ) -> RepoResult<Vec<Registration>> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE student_id = $1 ORDER BY registration_date"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
    }

    /// The `(student_id, competition_id)` UNIQUE constraint backs the handler's
    /// pre-check; a concurrent duplicate fails here with a unique violation.
    async fn create_registration(
        &self,
        registration: NewRegistration,
    ) -> RepoResult<Registration> {
        sqlx::query_as::<_, Registration>(&format!(
            "INSERT INTO registrations (student_id, competition_id, registration_date, status) \
             VALUES ($1, $2, $3, $4) RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(registration.student_id)
        .bind(registration.competition_id)
        .bind(registration.registration_date)
        .bind(registration.status.as_str())
        .fetch_one(&self.pool)
        .await
    }

    async fn set_registration_status(
        &self,
        id: i32,
        status: RegistrationStatus,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE registrations SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
