use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use clock::{ClockState, FixedClock, SystemClock};
pub use config::AppConfig;
pub use credentials::{BcryptJwtCredentials, CredentialState};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` payload into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::create_school_account, handlers::create_student_account,
        handlers::create_student, handlers::list_users, handlers::update_user,
        handlers::delete_user, handlers::list_schools, handlers::get_school,
        handlers::update_school, handlers::delete_school, handlers::list_students,
        handlers::list_school_students, handlers::get_student, handlers::update_student,
        handlers::delete_student, handlers::list_competitions,
        handlers::list_upcoming_competitions, handlers::get_competition,
        handlers::create_competition, handlers::update_competition,
        handlers::delete_competition, handlers::list_competition_registrations,
        handlers::list_student_registrations, handlers::register_student,
        handlers::cancel_registration, handlers::update_registration_status
    ),
    components(
        schemas(
            models::Role, models::RegistrationStatus, models::User, models::School,
            models::Student, models::Competition, models::Registration,
            models::LoginRequest, models::LoginResponse, models::UserSummary,
            models::CreateSchoolRequest, models::CreateStudentRequest,
            models::UpdateUserRequest, models::UpdateSchoolRequest,
            models::UpdateStudentRequest, models::CreateCompetitionRequest,
            models::UpdateCompetitionRequest, models::CreateRegistrationRequest,
            models::UpdateRegistrationStatusRequest, models::MessageResponse,
            models::SchoolCreatedResponse, models::StudentCreatedResponse,
            models::CompetitionCreatedResponse, models::RegistrationCreatedResponse,
        )
    ),
    tags(
        (name = "doodle-dome", description = "Art competition registration API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container for the application's collaborators. Each one
/// is a trait object behind an `Arc`, built once in `main` (or in a test) and
/// cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    /// Entity store.
    pub repo: RepositoryState,
    /// Password hashing and token issuance.
    pub credentials: CredentialState,
    /// Source of "now" for every eligibility decision.
    pub clock: ClockState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for ClockState {
    fn from_ref(app_state: &AppState) -> ClockState {
        app_state.clock.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for `authenticated_routes`. A failing `AuthUser`
/// extraction rejects the request with 401 before any handler runs; on
/// success the resolved user is stored in the request extensions so handler
/// extractors do not verify the token a second time.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies the auth layer to gated routes and
/// wraps everything in the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span so every log line of a request carries its
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
