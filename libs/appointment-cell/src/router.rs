// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::AppointmentCellState;

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/search", get(handlers::search_appointments))
        .route("/stats", get(handlers::get_appointment_stats))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route(
            "/{appointment_id}",
            patch(handlers::update_appointment_details),
        )
        .route(
            "/{appointment_id}/status",
            patch(handlers::update_appointment_status),
        )
        .route(
            "/patients/{patient_id}",
            get(handlers::get_patient_appointments),
        )
        .route(
            "/doctors/{doctor_id}",
            get(handlers::get_doctor_appointments),
        )
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
