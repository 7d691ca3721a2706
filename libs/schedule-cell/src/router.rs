// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::ScheduleCellState;

pub fn schedule_routes(state: Arc<ScheduleCellState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::upsert_schedule))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_schedules))
        .route(
            "/doctors/{doctor_id}/slots",
            get(handlers::list_bookable_slots),
        )
        .route(
            "/doctors/{doctor_id}/{date}/regenerate",
            post(handlers::regenerate_slots),
        )
        .route("/{schedule_id}", delete(handlers::delete_schedule))
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
