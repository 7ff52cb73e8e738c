//! # Error Taxonomy
//!
//! One domain taxonomy ([`ExposureError`]) plus closed unions for the two
//! platform surfaces that produce errors (network, matching engine). Each
//! platform union is mapped into the taxonomy exactly once, at its boundary;
//! everything inside the core pattern-matches on the closed enums.

use thiserror::Error;

/// Why the matching engine is currently unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    /// Bluetooth is switched off.
    BluetoothOff,
    /// The user disabled exposure notifications.
    Disabled,
    /// Device policy forbids exposure notifications.
    Restricted,
}

impl std::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            InactiveReason::BluetoothOff => "bluetooth off",
            InactiveReason::Disabled => "disabled",
            InactiveReason::Restricted => "restricted",
        };
        f.write_str(reason)
    }
}

/// The domain error taxonomy every operation of this core resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExposureError {
    /// The distribution service could not be reached at all.
    #[error("network unreachable")]
    NetworkUnreachable,

    /// The distribution service answered, but not usefully.
    #[error("server error")]
    ServerError,

    /// A local failure: storage, serialization, or a broken invariant.
    #[error("internal error: {0}")]
    InternalError(String),

    /// The matching engine cannot run right now.
    #[error("exposure framework inactive: {0}")]
    Inactive(InactiveReason),

    /// The user never authorized (or revoked) exposure notifications.
    #[error("not authorized")]
    NotAuthorized,

    /// The response was served from cache; nothing new to process.
    #[error("response cached")]
    ResponseCached,

    /// A key set's signature was rejected by the engine.
    #[error("signature validation failed")]
    SignatureValidationFailed,
}

impl ExposureError {
    /// Shorthand for an [`ExposureError::InternalError`] with context.
    pub fn internal(message: impl Into<String>) -> Self {
        ExposureError::InternalError(message.into())
    }
}

/// Failures of the distribution/network collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request could not even be constructed.
    #[error("invalid request")]
    InvalidRequest,

    /// No route to the server (offline, DNS, timeout).
    #[error("server not reachable")]
    NotReachable,

    /// The response body could not be decoded.
    #[error("invalid response")]
    InvalidResponse,

    /// Conditional fetch answered "not modified".
    #[error("response served from cache")]
    ResponseCached,

    /// The server reported a failure status.
    #[error("server returned an error")]
    ServerError,

    /// The request payload could not be encoded.
    #[error("encoding failed")]
    EncodingFailed,

    /// The server redirected somewhere it should not.
    #[error("unexpected redirection")]
    Redirection,
}

impl From<NetworkError> for ExposureError {
    fn from(error: NetworkError) -> Self {
        match error {
            NetworkError::NotReachable => ExposureError::NetworkUnreachable,
            NetworkError::ResponseCached => ExposureError::ResponseCached,
            NetworkError::InvalidRequest | NetworkError::EncodingFailed => {
                ExposureError::internal(error.to_string())
            }
            NetworkError::InvalidResponse
            | NetworkError::ServerError
            | NetworkError::Redirection => ExposureError::ServerError,
        }
    }
}

/// Failures of the platform matching engine, mapped from its native error
/// surface into one closed union at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Bluetooth is switched off.
    #[error("bluetooth off")]
    BluetoothOff,

    /// Exposure notifications are disabled.
    #[error("exposure notifications disabled")]
    Disabled,

    /// Device policy forbids exposure notifications.
    #[error("exposure notifications restricted")]
    Restricted,

    /// The app is not authorized to use the engine.
    #[error("not authorized")]
    NotAuthorized,

    /// The engine refused the call because its own budget is exhausted.
    #[error("rate limited")]
    RateLimited,

    /// The engine rejected a key set's signature.
    #[error("signature validation failed")]
    SignatureValidation,

    /// The engine returned a shape it never should.
    #[error("internal type mismatch")]
    InternalTypeMismatch,

    /// Anything else the platform surfaced.
    #[error("engine failure: {0}")]
    Other(String),
}

impl EngineError {
    /// The errors that make the engine unusable for the rest of this run.
    /// `Some` propagates as fatal; `None` means the caller recovers locally
    /// by invalidating the selected key sets.
    pub fn fatal(&self) -> Option<ExposureError> {
        match self {
            EngineError::BluetoothOff => {
                Some(ExposureError::Inactive(InactiveReason::BluetoothOff))
            }
            EngineError::Disabled => Some(ExposureError::Inactive(InactiveReason::Disabled)),
            EngineError::Restricted => Some(ExposureError::Inactive(InactiveReason::Restricted)),
            EngineError::NotAuthorized => Some(ExposureError::NotAuthorized),
            EngineError::RateLimited
            | EngineError::SignatureValidation
            | EngineError::InternalTypeMismatch
            | EngineError::Other(_) => None,
        }
    }
}

/// Failures of the local notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The user denied notification permission.
    #[error("notifications not authorized")]
    NotAuthorized,

    /// The platform refused to schedule the notification.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}
