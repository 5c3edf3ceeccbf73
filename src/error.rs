//! Error taxonomy for the accessory registries
//!
//! Every failure surfaced by a registry, codec or store maps onto one of these
//! variants. Protocol adapters collapse them into the `<X>` failure token;
//! the HTTP API maps them onto status codes.

use thiserror::Error;

/// Result alias used throughout the accessory core
pub type Result<T> = std::result::Result<T, AccessoryError>;

/// Kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Output,
    RemoteSensor,
    Document,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Output => write!(f, "output"),
            EntityKind::RemoteSensor => write!(f, "remote sensor"),
            EntityKind::Document => write!(f, "document"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AccessoryError {
    /// Operation referenced an unknown id
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Creation of an output on a hardware-restricted pin
    #[error("pin {0} is restricted")]
    RestrictedPin(u8),

    /// Wrong argument count or a token that is not a base-10 integer
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Persisted document is missing, corrupt or could not be written
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),
}

impl AccessoryError {
    pub fn output_not_found(id: u16) -> Self {
        AccessoryError::NotFound {
            kind: EntityKind::Output,
            id: id.to_string(),
        }
    }

    pub fn sensor_not_found(raw_id: u16) -> Self {
        AccessoryError::NotFound {
            kind: EntityKind::RemoteSensor,
            id: raw_id.to_string(),
        }
    }

    /// True for errors that a caller can fix by choosing different input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AccessoryError::NotFound { .. }
                | AccessoryError::RestrictedPin(_)
                | AccessoryError::MalformedCommand(_)
        )
    }
}
