use thiserror::Error;

/// Failures returned by the create-only binding request.
///
/// `AlreadyBound` is the race-safety property of the control plane showing
/// through: a second bind attempt for a unit that already has a placement
/// must fail rather than overwrite.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("work unit {unit} is already bound")]
    AlreadyBound { unit: String },

    #[error("work unit {unit} not found")]
    NotFound { unit: String },

    #[error("transient bind failure for {unit}: {reason}")]
    Transient { unit: String, reason: String },
}

/// Transport-level failures from the control plane. A dropped watch is not
/// an error value; it surfaces as stream termination.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("control plane unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum PlacedError {
    #[error("subscription to {resource} lost: {reason}")]
    Subscription {
        resource: &'static str,
        reason: String,
    },

    #[error("malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no schedulable nodes in view")]
    NoFit,

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error("audit event creation failed: {0}")]
    Record(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, PlacedError>;
