use application::{ApplicationError, DispatchError};
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Domain(DomainError::ValidationError { field, message }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, message),
            ),
            AppErr::Domain(DomainError::MalformedFrame { message }) => {
                ApiError::new(StatusCode::BAD_REQUEST, "MALFORMED_FRAME", message)
            }
            AppErr::RoomNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "ROOM_NOT_FOUND", "room not found")
            }
            AppErr::Authorization => {
                ApiError::new(StatusCode::UNAUTHORIZED, "INVALID_PASSWORD", "invalid password")
            }
            AppErr::NotRoomMember { room } => ApiError::new(
                StatusCode::FORBIDDEN,
                "NOT_ROOM_MEMBER",
                format!("not a member of room {}", room),
            ),
            AppErr::Repository(RepositoryError::Storage { message }) => {
                tracing::error!(error = %message, "room store failure");
                ApiError::internal_server_error("internal server error")
            }
            AppErr::Password(err) => {
                tracing::error!(error = %err, "password hashing failure");
                ApiError::internal_server_error("internal server error")
            }
            AppErr::Dispatch(DispatchError::QueueFull { capacity }) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_FULL",
                format!("dispatch queue full (capacity {})", capacity),
            ),
            AppErr::ConnectionNotFound => {
                ApiError::new(StatusCode::GONE, "CONNECTION_CLOSED", "connection closed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
