use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentCellState;
use schedule_cell::router::schedule_routes;
use schedule_cell::ScheduleCellState;

pub fn create_router(
    schedule_state: Arc<ScheduleCellState>,
    appointment_state: Arc<AppointmentCellState>,
) -> Router {
    Router::new()
        .route("/", get(|| async { "Caretide Portal API is running!" }))
        .nest("/schedules", schedule_routes(schedule_state))
        .nest("/appointments", appointment_routes(appointment_state))
}
