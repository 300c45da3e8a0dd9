use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::error;

use super::domain::{RecordId, VerificationStatus};
use super::service::{
    DocumentSubmission, ResolutionRequest, VerificationService, VerificationServiceError,
};
use super::store::VerificationRecordStore;
use crate::workflows::access::{Actor, Role, UserId};
use crate::workflows::events::into_sse;
use crate::workflows::notifications::{NotificationId, NotificationRepository};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Router builder exposing verification, notification, and event endpoints.
pub fn verification_router<S, N>(service: Arc<VerificationService<S, N>>) -> Router
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/verifications",
            post(submit_handler::<S, N>).get(list_handler::<S, N>),
        )
        .route("/api/v1/verifications/:id", patch(resolve_handler::<S, N>))
        .route(
            "/api/v1/verifications/:id/current",
            get(current_handler::<S, N>),
        )
        .route(
            "/api/v1/events/admin-stream",
            get(admin_stream_handler::<S, N>),
        )
        .route(
            "/api/v1/events/user-stream/:id",
            get(user_stream_handler::<S, N>),
        )
        .route("/api/v1/events/stats", get(stats_handler::<S, N>))
        .route(
            "/api/v1/notifications/:id",
            get(notifications_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications/:id/counts",
            get(counts_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications/:id/read",
            post(mark_read_handler::<S, N>),
        )
        .route(
            "/api/v1/notifications/:id/read-all",
            post(mark_all_read_handler::<S, N>),
        )
        .with_state(service)
}

/// Rejection for requests that arrive without trusted identity headers.
#[derive(Debug)]
pub struct Unauthenticated(&'static str);

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.0,
            "code": "unauthenticated",
        });
        (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
    }
}

pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Unauthenticated> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(Unauthenticated("missing x-user-id header"))?;

    let role = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(Unauthenticated("missing x-user-role header"))?;
    let role = Role::parse(role).ok_or(Unauthenticated("unrecognised x-user-role header"))?;

    Ok(Actor {
        user_id: UserId::new(user_id),
        role,
    })
}

#[axum::async_trait]
impl<St> FromRequestParts<St> for Actor
where
    St: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

pub(crate) fn error_response(error: VerificationServiceError) -> Response {
    let status = match &error {
        VerificationServiceError::Evidence(_)
        | VerificationServiceError::MissingReason
        | VerificationServiceError::MalformedBody(_) => StatusCode::BAD_REQUEST,
        VerificationServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        VerificationServiceError::AlreadyActive(_) | VerificationServiceError::Conflict { .. } => {
            StatusCode::CONFLICT
        }
        VerificationServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        VerificationServiceError::Internal(_) => {
            error!(error = %error, "verification request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "error": error.to_string(),
        "code": error.code(),
    });
    (status, axum::Json(payload)).into_response()
}

/// JSON body extractor whose rejections use the verification error body.
#[derive(Debug)]
pub(crate) struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, St> FromRequest<St> for ValidJson<T>
where
    T: DeserializeOwned,
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &St) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(error_response(VerificationServiceError::MalformedBody(
                rejection.body_text(),
            ))),
        }
    }
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, VerificationServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    status: Option<VerificationStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct NotificationQuery {
    #[serde(default)]
    unread_only: bool,
}

pub(crate) async fn submit_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    ValidJson(submission): ValidJson<DocumentSubmission>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(
        StatusCode::CREATED,
        service.submit_document(&actor, submission),
    )
}

pub(crate) async fn list_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    let status = query.status.unwrap_or(VerificationStatus::Pending);
    respond(StatusCode::OK, service.list_by_status(&actor, status))
}

pub(crate) async fn resolve_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(record_id): Path<String>,
    ValidJson(request): ValidJson<ResolutionRequest>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    let record_id = RecordId(record_id);
    respond(
        StatusCode::OK,
        service.resolve(
            &actor,
            &record_id,
            request.decision,
            request.reason.as_deref(),
        ),
    )
}

pub(crate) async fn current_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.current(&actor, &UserId::new(user_id)),
    )
}

pub(crate) async fn admin_stream_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    match service.subscribe_admin(&actor) {
        Ok(subscription) => into_sse(subscription).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn user_stream_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    match service.subscribe_user(&actor, &UserId::new(user_id)) {
        Ok(subscription) => into_sse(subscription).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn stats_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(StatusCode::OK, service.diagnostics(&actor))
}

pub(crate) async fn notifications_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(user_id): Path<String>,
    Query(query): Query<NotificationQuery>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.notifications(&actor, &UserId::new(user_id), query.unread_only),
    )
}

pub(crate) async fn counts_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.counts(&actor, &UserId::new(user_id)),
    )
}

pub(crate) async fn mark_read_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(notification_id): Path<String>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    respond(
        StatusCode::OK,
        service.mark_read(&actor, &NotificationId(notification_id)),
    )
}

pub(crate) async fn mark_all_read_handler<S, N>(
    State(service): State<Arc<VerificationService<S, N>>>,
    actor: Actor,
    Path(user_id): Path<String>,
) -> Response
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    let user_id = UserId::new(user_id);
    let result = service
        .mark_all_read(&actor, &user_id)
        .map(|updated| json!({ "user_id": user_id, "updated": updated }));
    respond(StatusCode::OK, result)
}
