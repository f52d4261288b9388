use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::api::envelope::Envelope;
use crate::models::status::{OfferStatus, RideStatus};
use crate::models::user::UserRole;
use crate::store::StoreError;

/// Failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Expired,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Expired => StatusCode::GONE,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Expired => "expired",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    Validation(String),

    #[error("no active customer account {0}")]
    NoActiveCustomer(Uuid),

    #[error("no active fare schedule")]
    NoActiveFareSchedule,

    #[error("fare did not match the active fare schedule")]
    FareMismatch,

    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("ride request {0} not found")]
    RequestNotFound(Uuid),

    #[error("ride request not offerable in current status: {0}")]
    RequestNotOfferable(RideStatus),

    #[error("ride request {0} already expired")]
    RequestExpired(Uuid),

    #[error("driver {0} did not offer for this request")]
    OfferNotFound(Uuid),

    #[error("offer is no longer active: {0}")]
    OfferNotActive(OfferStatus),

    #[error("offer from driver {0} has expired")]
    OfferExpired(Uuid),

    #[error("offer is closed for this request: {0}")]
    OfferClosed(OfferStatus),

    #[error("driver {0} is offline")]
    DriverOffline(Uuid),

    #[error("driver location missing in offer snapshot")]
    DriverLocationMissing,

    #[error("ride {0} not found")]
    BookingNotFound(Uuid),

    #[error("caller is not the assigned {0} on this ride")]
    NotAssignedParty(UserRole),

    #[error("operation requires the {0} role")]
    RoleMismatch(UserRole),

    #[error("cannot change ride from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error("cannot cancel a ride that is {0}")]
    CancellationNotAllowed(RideStatus),

    #[error("ride is already {0}")]
    RideClosed(RideStatus),

    #[error("start time missing on ride {0}")]
    StartTimeMissing(Uuid),

    #[error("otp does not match")]
    OtpMismatch,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NoActiveCustomer(_)
            | Self::UserNotFound(_)
            | Self::RequestNotFound(_)
            | Self::OfferNotFound(_)
            | Self::BookingNotFound(_) => ErrorKind::NotFound,
            Self::FareMismatch
            | Self::RequestNotOfferable(_)
            | Self::OfferNotActive(_)
            | Self::OfferClosed(_)
            | Self::DriverOffline(_)
            | Self::DriverLocationMissing
            | Self::NotAssignedParty(_)
            | Self::RoleMismatch(_)
            | Self::InvalidTransition { .. }
            | Self::CancellationNotAllowed(_)
            | Self::RideClosed(_)
            | Self::OtpMismatch => ErrorKind::Conflict,
            Self::RequestExpired(_) | Self::OfferExpired(_) => ErrorKind::Expired,
            Self::NoActiveFareSchedule => ErrorKind::Unavailable,
            Self::StartTimeMissing(_) | Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Logs the error at the level its kind calls for.
    pub fn log(&self, operation: &'static str) {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            error!(operation, error = ?self, "operation failed");
        } else {
            warn!(operation, kind = kind.as_str(), error = %self, "operation rejected");
        }
    }

    /// Message safe to return across the transport boundary.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let body: Envelope<()> = Envelope::failure(self.public_message(), kind.as_str());

        (kind.status_code(), Json(body)).into_response()
    }
}
