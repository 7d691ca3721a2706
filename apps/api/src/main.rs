use std::net::SocketAddr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::booking::{AppointmentService, AppointmentStore};
use appointment_cell::AppointmentCellState;
use schedule_cell::services::reservation::ReservationService;
use schedule_cell::services::schedule::{BookingGuard, ScheduleService, ScheduleStore};
use schedule_cell::ScheduleCellState;
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Caretide Portal API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Stores are shared: the schedule service and the reservation engine
    // mutate the same collection, appointments live in their own.
    let schedule_store = Arc::new(ScheduleStore::new());
    let appointment_store = Arc::new(AppointmentStore::new());

    let reservations = Arc::new(ReservationService::new(Arc::clone(&schedule_store)));
    let appointments = Arc::new(AppointmentService::new(
        Arc::clone(&appointment_store),
        Arc::clone(&reservations),
    ));

    let schedule_state = Arc::new(ScheduleCellState {
        config: Arc::clone(&config),
        schedules: ScheduleService::new(Arc::clone(&schedule_store)),
        guard: Arc::clone(&appointments) as Arc<dyn BookingGuard>,
    });
    let appointment_state = Arc::new(AppointmentCellState {
        config: Arc::clone(&config),
        appointments,
    });

    // Build the application router
    let app = router::create_router(schedule_state, appointment_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
