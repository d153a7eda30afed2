use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the auth layer, so handlers can assume a valid
/// token. Role and ownership rules are decided per handler by the policy
/// functions, since most of them depend on the target resource.
///
/// Path parameters are all named `{id}`; the router requires one name per
/// position across sibling routes.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Users ---
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/schools", post(handlers::create_school_account))
        .route("/api/users/students", post(handlers::create_student_account))
        .route(
            "/api/users/{id}",
            put(handlers::update_user).delete(handlers::delete_user),
        )
        // --- Schools ---
        .route("/api/schools", get(handlers::list_schools))
        .route(
            "/api/schools/{id}",
            get(handlers::get_school)
                .put(handlers::update_school)
                .delete(handlers::delete_school),
        )
        // --- Students ---
        .route(
            "/api/students",
            get(handlers::list_students).post(handlers::create_student),
        )
        // Static `school` segment wins over `{id}`.
        .route("/api/students/school/{id}", get(handlers::list_school_students))
        .route(
            "/api/students/{id}",
            get(handlers::get_student)
                .put(handlers::update_student)
                .delete(handlers::delete_student),
        )
        .route(
            "/api/students/{id}/registrations",
            get(handlers::list_student_registrations),
        )
        // --- Competitions ---
        .route(
            "/api/competitions",
            get(handlers::list_competitions).post(handlers::create_competition),
        )
        .route(
            "/api/competitions/upcoming",
            get(handlers::list_upcoming_competitions),
        )
        .route(
            "/api/competitions/{id}",
            get(handlers::get_competition)
                .put(handlers::update_competition)
                .delete(handlers::delete_competition),
        )
        .route(
            "/api/competitions/{id}/registrations",
            get(handlers::list_competition_registrations),
        )
        // --- Registrations ---
        .route("/api/registrations", post(handlers::register_student))
        .route(
            "/api/registrations/{id}/cancel",
            put(handlers::cancel_registration),
        )
        .route(
            "/api/registrations/{id}/status",
            put(handlers::update_registration_status),
        )
}
