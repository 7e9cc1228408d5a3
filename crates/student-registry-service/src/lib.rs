use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use student_registry_api::{DeleteResult, StudentRegistryApi};
use student_registry_core::{ErrorKind, RegistryError, StudentId, StudentPayload, StudentRecord};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const SERVICE_CONTRACT_VERSION: &str = "service.v1";
pub const ROOT_MESSAGE: &str = "student registry service is running";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
pub struct ServiceState {
    api: StudentRegistryApi,
}

impl ServiceState {
    #[must_use]
    pub fn new(api: StudentRegistryApi) -> Self {
        Self { api }
    }
}

/// Error response; serializes to `{"error": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        let status = match err.kind() {
            ErrorKind::InvalidIdentifier | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StoreUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = err.kind().as_str(), "{err}");
        } else {
            tracing::debug!(kind = err.kind().as_str(), "{err}");
        }
        Self { status, error: err.to_string() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Clone, Serialize)]
struct RootResponse {
    message: &'static str,
}

pub fn app(state: ServiceState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(root))
        .route("/api/openapi", get(openapi))
        .route("/api/students", get(list_students).post(create_student))
        .route(
            "/api/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run one registry call on the blocking pool; the `SQLite` store is synchronous.
async fn run_blocking<T, F>(state: &ServiceState, op: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce(&StudentRegistryApi) -> Result<T, RegistryError> + Send + 'static,
{
    let api = state.api.clone();
    let joined = tokio::task::spawn_blocking(move || op(&api)).await.map_err(|err| {
        ServiceError::from(RegistryError::StoreUnavailable(format!("store task failed: {err}")))
    })?;
    joined.map_err(ServiceError::from)
}

fn payload_or_error(
    payload: Result<Json<StudentPayload>, JsonRejection>,
) -> Result<StudentPayload, ServiceError> {
    payload.map(|Json(payload)| payload).map_err(|rejection| {
        ServiceError::from(RegistryError::Validation(rejection.body_text()))
    })
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse { message: ROOT_MESSAGE })
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn list_students(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<StudentRecord>>, ServiceError> {
    let students = run_blocking(&state, |api| api.list()).await?;
    Ok(Json(students))
}

async fn get_student(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<StudentRecord>, ServiceError> {
    let student = run_blocking(&state, move |api| api.get(&id)).await?;
    Ok(Json(student))
}

async fn create_student(
    State(state): State<ServiceState>,
    payload: Result<Json<StudentPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<StudentRecord>), ServiceError> {
    let payload = payload_or_error(payload)?;
    let student = run_blocking(&state, move |api| api.create(&payload)).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn update_student(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    payload: Result<Json<StudentPayload>, JsonRejection>,
) -> Result<Json<StudentRecord>, ServiceError> {
    let payload = match payload_or_error(payload) {
        Ok(payload) => payload,
        // A malformed id still wins over a malformed body.
        Err(err) => {
            StudentId::parse(&id).map_err(ServiceError::from)?;
            return Err(err);
        }
    };
    let student = run_blocking(&state, move |api| api.update(&id, &payload)).await?;
    Ok(Json(student))
}

async fn delete_student(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResult>, ServiceError> {
    let result = run_blocking(&state, move |api| api.delete(&id)).await?;
    Ok(Json(result))
}
