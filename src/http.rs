use crate::{
    backend::SlotBackend,
    configuration::Configuration,
    error::BookingError,
    live_updates::{LiveMessage, LiveUpdateStream},
    slot_manager::SlotManager,
    types::{
        AttendedRequest, NewRegistration, NewSlotRequest, Registration, RegistrationSearch,
        SlotFilter, SlotUpdate, SlotView,
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, patch, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

pub const ADMIN_PASSWORD_HEADER: &str = "x-admin-password";

#[derive(Clone)]
pub struct AppState<T: SlotBackend> {
    slot_manager: SlotManager<T>,
    admin_password: Option<String>,
    keep_alive_interval: Duration,
}

pub fn create_app<T: SlotBackend>(
    slot_manager: SlotManager<T>,
    configuration: &impl Configuration,
) -> Router {
    let state = AppState {
        slot_manager,
        admin_password: configuration.admin_password(),
        keep_alive_interval: configuration.keep_alive_interval(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/slots", get(list_slots))
        .route("/slots/:id", get(get_slot))
        .route("/slots/:id/registrations", post(register))
        .route("/registrations", get(search_registrations))
        .route("/events", get(live_updates));

    let admin = Router::new()
        .route("/slots", post(add_slot))
        .route("/slots/:id", patch(update_slot).delete(remove_slot))
        .route("/registrations/:id", patch(set_attended))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth::<T>));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Admin routes are open when no password is configured.
async fn admin_auth<T: SlotBackend>(
    State(state): State<AppState<T>>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let Some(admin_password) = state.admin_password.as_deref() else {
        return Ok(next.run(request).await);
    };

    match request.headers().get(ADMIN_PASSWORD_HEADER) {
        Some(header) if header.as_bytes() == admin_password.as_bytes() => {
            Ok(next.run(request).await)
        }
        Some(_) => Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string())),
        None => Err((StatusCode::UNAUTHORIZED, "Missing credentials".to_string())),
    }
}

async fn list_slots<T: SlotBackend>(
    State(state): State<AppState<T>>,
    filter: Result<Query<SlotFilter>, QueryRejection>,
) -> Result<Json<Vec<SlotView>>, BookingError> {
    let Query(filter) = filter?;
    Ok(Json(state.slot_manager.slots(filter).await?))
}

async fn get_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SlotView>, BookingError> {
    let Path(id) = id?;
    Ok(Json(state.slot_manager.slot(id).await?))
}

async fn add_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    request: Result<Json<NewSlotRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Json(request) = request?;
    let view = state.slot_manager.add_slot(request).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
    update: Result<Json<SlotUpdate>, JsonRejection>,
) -> Result<Json<SlotView>, BookingError> {
    let Path(id) = id?;
    let Json(update) = update?;
    Ok(Json(state.slot_manager.update_slot(id, update).await?))
}

async fn remove_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, BookingError> {
    let Path(id) = id?;
    state.slot_manager.remove_slot(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register<T: SlotBackend>(
    State(state): State<AppState<T>>,
    slot_id: Result<Path<Uuid>, PathRejection>,
    registration: Result<Json<NewRegistration>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let Path(slot_id) = slot_id?;
    let Json(registration) = registration?;
    let registration = state.slot_manager.register(slot_id, registration).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn set_attended<T: SlotBackend>(
    State(state): State<AppState<T>>,
    id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<AttendedRequest>, JsonRejection>,
) -> Result<Json<Registration>, BookingError> {
    let Path(id) = id?;
    let Json(request) = request?;
    Ok(Json(state.slot_manager.set_attended(id, request.attended).await?))
}

async fn search_registrations<T: SlotBackend>(
    State(state): State<AppState<T>>,
    search: Result<Query<RegistrationSearch>, QueryRejection>,
) -> Result<Json<Vec<Registration>>, BookingError> {
    let Query(search) = search?;
    Ok(Json(state.slot_manager.search_registrations(search).await?))
}

async fn live_updates<T: SlotBackend>(
    State(state): State<AppState<T>>,
) -> Sse<impl Stream<Item = Result<Event, BookingError>>> {
    let stream = LiveUpdateStream::connect(state.slot_manager.bus(), state.keep_alive_interval);
    Sse::new(stream.map(LiveMessage::into_event))
}
