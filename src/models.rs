use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Closed Enumerations ---

/// Role
///
/// The three actor types of the platform. Stored as lowercase TEXT in `users.role`
/// and carried verbatim in the token claims. Every policy function matches on it
/// exhaustively, so adding a role forces a review of each decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    School,
    Student,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized role: {0}")]
pub struct ParseRoleError(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::School => "school",
            Role::Student => "student",
        }
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "school" => Ok(Role::School),
            "student" => Ok(Role::Student),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

// Used by `#[sqlx(try_from = "String")]` when decoding rows.
impl TryFrom<String> for Role {
    type Error = ParseRoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RegistrationStatus
///
/// Lifecycle of a registration:
/// `Pending -> Confirmed`, `Pending | Confirmed -> Rejected | Cancelled`.
/// `Rejected` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized registration status: {0}")]
pub struct ParseStatusError(pub String);

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Rejected | RegistrationStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        match (self, next) {
            (Pending, Confirmed) => true,
            (Pending | Confirmed, Rejected | Cancelled) => true,
            (Pending, Pending) | (Confirmed, Confirmed) => false,
            (Confirmed, Pending) => false,
            (Rejected | Cancelled, _) => false,
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "rejected" => Ok(RegistrationStatus::Rejected),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl TryFrom<String> for RegistrationStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Core Entities (Mapped to Database) ---

/// User
///
/// A row of the `users` table as returned to callers. The credential hash is
/// deliberately absent; only `find_credential_by_email` ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: String,
    #[serde(rename = "userType")]
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Credential
///
/// The login projection of a user: exactly the fields needed to verify a password
/// and issue a token. Never serialized.
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: i32,
    pub email: String,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub password_hash: String,
}

/// School
///
/// Profile row owned 1:1 by a user of role `school`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct School {
    pub id: i32,
    pub user_id: i32,
    pub school_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Student
///
/// Profile row owned 1:1 by a user of role `student`, attached N:1 to a school.
/// `school_id` is the edge every school-side ownership check walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Student {
    pub id: i32,
    pub user_id: i32,
    pub school_id: i32,
    pub grade: Option<String>,
    pub age: Option<i32>,
}

/// Competition
///
/// Invariant: `last_registration_date <= start_date` after every successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Competition {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[ts(type = "string")]
    pub start_date: DateTime<Utc>,
    #[ts(type = "string")]
    pub last_registration_date: DateTime<Utc>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Registration
///
/// A student's entry into a competition. Cancellation is a status change,
/// never a delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Registration {
    pub id: i32,
    pub student_id: i32,
    pub competition_id: i32,
    #[ts(type = "string")]
    pub registration_date: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: RegistrationStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Store Inputs (Insert / Partial Update) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewSchool {
    pub school_name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub school_id: i32,
    pub grade: Option<String>,
    pub age: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewCompetition {
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub last_registration_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub student_id: i32,
    pub competition_id: i32,
    pub registration_date: DateTime<Utc>,
    pub status: RegistrationStatus,
}

/// Partial updates: `None` leaves the column untouched (COALESCE in SQL).
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct SchoolChanges {
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentChanges {
    pub grade: Option<String>,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct CompetitionChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub last_registration_date: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for `POST /api/users/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// CreateSchoolRequest
///
/// Input for `POST /api/users/schools`. Required fields are modelled as `Option`
/// so a missing field yields our own 400 rather than a deserialization rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateSchoolRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub school_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// CreateStudentRequest
///
/// Input for `POST /api/users/students` and `POST /api/students`.
/// `school_id` is honoured for admins only; a school actor always gets its own id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateStudentRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub school_id: Option<i32>,
    pub grade: Option<String>,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateSchoolRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateStudentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i32>,
}

/// CreateCompetitionRequest
///
/// Dates arrive as strings (RFC 3339 or `YYYY-MM-DD`) and are parsed by the
/// handler so malformed input maps to a 400 with a readable message.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateCompetitionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub last_registration_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateCompetitionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_registration_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateRegistrationRequest {
    pub student_id: i32,
    pub competition_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRegistrationStatusRequest {
    pub status: RegistrationStatus,
}

// --- Response Payloads (Output Schemas) ---

/// MessageResponse
///
/// Body of every successful mutation without a created id, and of every 4xx.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// UserSummary
///
/// The public view of a user embedded in the login response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSummary {
    pub id: i32,
    pub email: String,
    pub name: String,
    #[serde(rename = "userType")]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SchoolCreatedResponse {
    pub message: String,
    pub user_id: i32,
    pub school_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentCreatedResponse {
    pub message: String,
    pub user_id: i32,
    pub student_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CompetitionCreatedResponse {
    pub message: String,
    pub competition_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegistrationCreatedResponse {
    pub message: String,
    pub registration_id: i32,
}
