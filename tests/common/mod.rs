#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, TimeZone, Utc};
use doodle_dome::{
    AppConfig, AppState, BcryptJwtCredentials, create_router,
    clock::Clock,
    credentials::CredentialService,
    models::{
        Competition, CompetitionChanges, Credential, NewCompetition, NewRegistration, NewSchool,
        NewStudent, NewUser, Registration, RegistrationStatus, Role, School, SchoolChanges,
        Student, StudentChanges, User, UserChanges,
    },
    repository::{RepoResult, Repository},
};
use serde_json::Value;
use sqlx::error::{DatabaseError, ErrorKind};
use std::{
    error::Error as StdError,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";
pub const JWT_SECRET: &str = "integration-test-secret";

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

// --- Store errors the in-memory repository can raise ---

#[derive(Debug)]
struct ConstraintViolation {
    message: &'static str,
    kind: ErrorKind,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl StdError for ConstraintViolation {}

impl DatabaseError for ConstraintViolation {
    fn message(&self) -> &str {
        self.message
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.kind {
            ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
            ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
            _ => ErrorKind::Other,
        }
    }
}

fn unique_violation(message: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(ConstraintViolation {
        message,
        kind: ErrorKind::UniqueViolation,
    }))
}

fn foreign_key_violation(message: &'static str) -> sqlx::Error {
    sqlx::Error::Database(Box::new(ConstraintViolation {
        message,
        kind: ErrorKind::ForeignKeyViolation,
    }))
}

// --- In-memory entity store ---

struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Tables {
    users: Vec<StoredUser>,
    schools: Vec<School>,
    students: Vec<Student>,
    competitions: Vec<Competition>,
    registrations: Vec<Registration>,
}

fn next_id(ids: impl Iterator<Item = i32>) -> i32 {
    ids.max().unwrap_or(0) + 1
}

/// InMemoryRepository
///
/// Behaves like the Postgres schema: unique emails, unique
/// (student, competition) pairs and foreign keys that block deletes.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// Every call fails with a pool error.
    pub failing: AtomicBool,
    /// `find_registration_for` pretends nothing exists, as if a concurrent
    /// request inserted the row after our check.
    pub hide_existing_registrations: AtomicBool,
}

impl InMemoryRepository {
    fn check(&self) -> RepoResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }

    pub fn insert_school_row(&self, school: School) {
        self.tables.lock().unwrap().schools.push(school);
    }

    pub fn registration(&self, id: i32) -> Option<Registration> {
        let t = self.tables.lock().unwrap();
        t.registrations.iter().find(|r| r.id == id).cloned()
    }

    pub fn students(&self) -> Vec<Student> {
        self.tables.lock().unwrap().students.clone()
    }

    pub fn password_hash_of(&self, user_id: i32) -> Option<String> {
        let t = self.tables.lock().unwrap();
        t.users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| u.password_hash.clone())
    }

    fn insert_user(t: &mut Tables, user: NewUser) -> RepoResult<User> {
        if t.users.iter().any(|u| u.user.email == user.email) {
            return Err(unique_violation("users_email_key"));
        }
        let now = Utc::now();
        let created = User {
            id: next_id(t.users.iter().map(|u| u.user.id)),
            email: user.email,
            name: user.name,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        t.users.push(StoredUser {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user(&self, id: i32) -> RepoResult<Option<User>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.user.id == id).map(|u| u.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users
            .iter()
            .find(|u| u.user.email == email)
            .map(|u| u.user.clone()))
    }

    async fn find_credential_by_email(&self, email: &str) -> RepoResult<Option<Credential>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users
            .iter()
            .find(|u| u.user.email == email)
            .map(|u| Credential {
                id: u.user.id,
                email: u.user.email.clone(),
                name: u.user.name.clone(),
                role: u.user.role,
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn find_any_admin(&self) -> RepoResult<Option<User>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users
            .iter()
            .find(|u| u.user.role == Role::Admin)
            .map(|u| u.user.clone()))
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().map(|u| u.user.clone()).collect())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        Self::insert_user(&mut t, user)
    }

    async fn update_user(&self, id: i32, changes: UserChanges) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if let Some(email) = &changes.email {
            if t.users.iter().any(|u| &u.user.email == email && u.user.id != id) {
                return Err(unique_violation("users_email_key"));
            }
        }
        let Some(stored) = t.users.iter_mut().find(|u| u.user.id == id) else {
            return Ok(false);
        };
        if let Some(name) = changes.name {
            stored.user.name = name;
        }
        if let Some(email) = changes.email {
            stored.user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            stored.password_hash = hash;
        }
        if let Some(role) = changes.role {
            stored.user.role = role;
        }
        stored.user.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_user(&self, id: i32) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if t.schools.iter().any(|s| s.user_id == id) || t.students.iter().any(|s| s.user_id == id)
        {
            return Err(foreign_key_violation("profile references user"));
        }
        let before = t.users.len();
        t.users.retain(|u| u.user.id != id);
        Ok(t.users.len() < before)
    }

    async fn create_school_account(
        &self,
        user: NewUser,
        school: NewSchool,
    ) -> RepoResult<(User, School)> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let user = Self::insert_user(&mut t, user)?;
        let school = School {
            id: next_id(t.schools.iter().map(|s| s.id)),
            user_id: user.id,
            school_name: school.school_name,
            address: school.address,
            phone: school.phone,
        };
        t.schools.push(school.clone());
        Ok((user, school))
    }

    async fn create_student_account(
        &self,
        user: NewUser,
        student: NewStudent,
    ) -> RepoResult<(User, Student)> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if !t.schools.iter().any(|s| s.id == student.school_id) {
            return Err(foreign_key_violation("students_school_id_fkey"));
        }
        let user = Self::insert_user(&mut t, user)?;
        let student = Student {
            id: next_id(t.students.iter().map(|s| s.id)),
            user_id: user.id,
            school_id: student.school_id,
            grade: student.grade,
            age: student.age,
        };
        t.students.push(student.clone());
        Ok((user, student))
    }

    async fn find_school(&self, id: i32) -> RepoResult<Option<School>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.schools.iter().find(|s| s.id == id).cloned())
    }

    async fn find_school_by_user(&self, user_id: i32) -> RepoResult<Option<School>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.schools.iter().find(|s| s.user_id == user_id).cloned())
    }

    async fn list_schools(&self) -> RepoResult<Vec<School>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().schools.clone())
    }

    async fn update_school(&self, id: i32, changes: SchoolChanges) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let Some(school) = t.schools.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if let Some(name) = changes.school_name {
            school.school_name = name;
        }
        if changes.address.is_some() {
            school.address = changes.address;
        }
        if changes.phone.is_some() {
            school.phone = changes.phone;
        }
        Ok(true)
    }

    async fn delete_school(&self, id: i32) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if t.students.iter().any(|s| s.school_id == id) {
            return Err(foreign_key_violation("students_school_id_fkey"));
        }
        let before = t.schools.len();
        t.schools.retain(|s| s.id != id);
        Ok(t.schools.len() < before)
    }

    async fn find_student(&self, id: i32) -> RepoResult<Option<Student>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.students.iter().find(|s| s.id == id).cloned())
    }

    async fn find_student_by_user(&self, user_id: i32) -> RepoResult<Option<Student>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.students.iter().find(|s| s.user_id == user_id).cloned())
    }

    async fn list_students(&self) -> RepoResult<Vec<Student>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().students.clone())
    }

    async fn list_students_by_school(&self, school_id: i32) -> RepoResult<Vec<Student>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.students
            .iter()
            .filter(|s| s.school_id == school_id)
            .cloned()
            .collect())
    }

    async fn update_student(&self, id: i32, changes: StudentChanges) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let Some(student) = t.students.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        if changes.grade.is_some() {
            student.grade = changes.grade;
        }
        if changes.age.is_some() {
            student.age = changes.age;
        }
        Ok(true)
    }

    async fn delete_student(&self, id: i32) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if t.registrations.iter().any(|r| r.student_id == id) {
            return Err(foreign_key_violation("registrations_student_id_fkey"));
        }
        let before = t.students.len();
        t.students.retain(|s| s.id != id);
        Ok(t.students.len() < before)
    }

    async fn find_competition(&self, id: i32) -> RepoResult<Option<Competition>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.competitions.iter().find(|c| c.id == id).cloned())
    }

    async fn list_competitions(&self) -> RepoResult<Vec<Competition>> {
        self.check()?;
        Ok(self.tables.lock().unwrap().competitions.clone())
    }

    async fn list_upcoming_competitions(
        &self,
        now: DateTime<Utc>,
    ) -> RepoResult<Vec<Competition>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        let mut open: Vec<Competition> = t
            .competitions
            .iter()
            .filter(|c| c.last_registration_date >= now)
            .cloned()
            .collect();
        open.sort_by_key(|c| c.start_date);
        Ok(open)
    }

    async fn create_competition(&self, competition: NewCompetition) -> RepoResult<Competition> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let now = Utc::now();
        let created = Competition {
            id: next_id(t.competitions.iter().map(|c| c.id)),
            name: competition.name,
            description: competition.description,
            start_date: competition.start_date,
            last_registration_date: competition.last_registration_date,
            created_at: now,
            updated_at: now,
        };
        t.competitions.push(created.clone());
        Ok(created)
    }

    async fn update_competition(&self, id: i32, changes: CompetitionChanges) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let Some(c) = t.competitions.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        if let Some(name) = changes.name {
            c.name = name;
        }
        if let Some(description) = changes.description {
            c.description = description;
        }
        if let Some(start) = changes.start_date {
            c.start_date = start;
        }
        if let Some(last) = changes.last_registration_date {
            c.last_registration_date = last;
        }
        c.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_competition(&self, id: i32) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if t.registrations.iter().any(|r| r.competition_id == id) {
            return Err(foreign_key_violation("registrations_competition_id_fkey"));
        }
        let before = t.competitions.len();
        t.competitions.retain(|c| c.id != id);
        Ok(t.competitions.len() < before)
    }

    async fn find_registration(&self, id: i32) -> RepoResult<Option<Registration>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.registrations.iter().find(|r| r.id == id).cloned())
    }

    async fn find_registration_for(
        &self,
        student_id: i32,
        competition_id: i32,
    ) -> RepoResult<Option<Registration>> {
        self.check()?;
        if self.hide_existing_registrations.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let t = self.tables.lock().unwrap();
        Ok(t.registrations
            .iter()
            .find(|r| r.student_id == student_id && r.competition_id == competition_id)
            .cloned())
    }

    async fn list_registrations_by_competition(
        &self,
        competition_id: i32,
    ) -> RepoResult<Vec<Registration>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.registrations
            .iter()
            .filter(|r| r.competition_id == competition_id)
            .cloned()
            .collect())
    }

    async fn list_registrations_by_student(
        &self,
        student_id: i32,
    ) -> RepoResult<Vec<Registration>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.registrations
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn create_registration(
        &self,
        registration: NewRegistration,
    ) -> RepoResult<Registration> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        if t.registrations.iter().any(|r| {
            r.student_id == registration.student_id
                && r.competition_id == registration.competition_id
        }) {
            return Err(unique_violation(
                "registrations_student_id_competition_id_key",
            ));
        }
        let now = Utc::now();
        let created = Registration {
            id: next_id(t.registrations.iter().map(|r| r.id)),
            student_id: registration.student_id,
            competition_id: registration.competition_id,
            registration_date: registration.registration_date,
            status: registration.status,
            created_at: now,
            updated_at: now,
        };
        t.registrations.push(created.clone());
        Ok(created)
    }

    async fn set_registration_status(
        &self,
        id: i32,
        status: RegistrationStatus,
    ) -> RepoResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let Some(r) = t.registrations.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        r.status = status;
        r.updated_at = Utc::now();
        Ok(true)
    }
}

// --- Clock the tests can move ---

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// --- Application harness ---

pub struct TestApp {
    pub repo: Arc<InMemoryRepository>,
    pub credentials: Arc<BcryptJwtCredentials>,
    pub clock: Arc<ManualClock>,
    pub config: AppConfig,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        let repo = Arc::new(InMemoryRepository::default());
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let credentials = Arc::new(BcryptJwtCredentials::new(
            JWT_SECRET,
            chrono::Duration::hours(1),
            config.bcrypt_cost,
        ));
        let clock = Arc::new(ManualClock(Mutex::new(now)));

        let router = create_router(AppState {
            repo: repo.clone(),
            credentials: credentials.clone(),
            clock: clock.clone(),
            config: config.clone(),
        });

        TestApp {
            repo,
            credentials,
            clock,
            config,
            router,
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    pub fn token_for(&self, user: &User) -> String {
        self.credentials
            .issue_token(user.id, &user.email, user.role)
            .unwrap()
    }

    /// Sends one request through the full router and decodes the body as JSON
    /// (or as a JSON string when it is plain text).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("PUT", uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, Some(token), None).await
    }

    // --- Seeding ---

    async fn new_user(&self, email: &str, name: &str, role: Role) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: self.credentials.hash_password(PASSWORD).unwrap(),
            name: name.to_string(),
            role,
        }
    }

    pub async fn seed_admin(&self) -> User {
        let user = self.new_user("admin@example.com", "Admin", Role::Admin).await;
        self.repo.create_user(user).await.unwrap()
    }

    pub async fn seed_school(&self, name: &str) -> (User, School) {
        let email = format!("{}@schools.test", name.to_lowercase().replace(' ', "."));
        let user = self.new_user(&email, name, Role::School).await;
        self.repo
            .create_school_account(
                user,
                NewSchool {
                    school_name: name.to_string(),
                    address: None,
                    phone: None,
                },
            )
            .await
            .unwrap()
    }

    pub async fn seed_student(&self, name: &str, school_id: i32) -> (User, Student) {
        let email = format!("{}@students.test", name.to_lowercase().replace(' ', "."));
        let user = self.new_user(&email, name, Role::Student).await;
        self.repo
            .create_student_account(
                user,
                NewStudent {
                    school_id,
                    grade: Some("5".to_string()),
                    age: Some(11),
                },
            )
            .await
            .unwrap()
    }

    pub async fn seed_competition(
        &self,
        start_date: DateTime<Utc>,
        last_registration_date: DateTime<Utc>,
    ) -> Competition {
        self.repo
            .create_competition(NewCompetition {
                name: "Spring Sketch".to_string(),
                description: "Pencil only".to_string(),
                start_date,
                last_registration_date,
            })
            .await
            .unwrap()
    }

    pub async fn seed_registration(
        &self,
        student_id: i32,
        competition_id: i32,
        status: RegistrationStatus,
    ) -> Registration {
        self.repo
            .create_registration(NewRegistration {
                student_id,
                competition_id,
                registration_date: self.clock.now(),
                status,
            })
            .await
            .unwrap()
    }
}
