// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use affilink::StoreError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Errors that can occur during persistence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// A database error occurred.
    DatabaseError(String),
    /// Database connection failed.
    DatabaseConnectionFailed(String),
    /// Database migration failed.
    MigrationFailed(String),
    /// Query execution failed.
    QueryFailed(String),
    /// Another connection holds the write lock.
    Busy(String),
    /// A uniqueness constraint rejected a write.
    Duplicate { entity: &'static str, key: String },
    /// A row that must exist was missing.
    NotFound { entity: &'static str, id: String },
    /// A stored document could not be encoded or decoded.
    SerializationError(String),
    /// A timestamp is outside the storable range.
    InvalidTimestamp(String),
    /// Initialization error.
    InitializationError(String),
    /// Foreign key enforcement is not enabled.
    ForeignKeyEnforcementNotEnabled,
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::DatabaseConnectionFailed(msg) => {
                write!(f, "Database connection failed: {msg}")
            }
            Self::MigrationFailed(msg) => write!(f, "Migration failed: {msg}"),
            Self::QueryFailed(msg) => write!(f, "Query failed: {msg}"),
            Self::Busy(msg) => write!(f, "Database busy: {msg}"),
            Self::Duplicate { entity, key } => write!(f, "Duplicate {entity}: {key}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            Self::InvalidTimestamp(msg) => write!(f, "Invalid timestamp: {msg}"),
            Self::InitializationError(msg) => write!(f, "Initialization error: {msg}"),
            Self::ForeignKeyEnforcementNotEnabled => {
                write!(f, "Foreign key enforcement is not enabled")
            }
        }
    }
}

impl std::error::Error for PersistenceError {}

impl PersistenceError {
    /// Maps a unique-constraint failure to `Duplicate`, everything else
    /// through the generic conversion.
    pub(crate) fn on_unique(entity: &'static str, key: impl Into<String>) -> impl FnOnce(DieselError) -> Self {
        let key: String = key.into();
        move |err| match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                Self::Duplicate { entity, key }
            }
            other => Self::from(other),
        }
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(kind, info) => {
                let message: &str = info.message();
                if message.contains("database is locked") || message.contains("busy") {
                    Self::Busy(message.to_string())
                } else if matches!(kind, DatabaseErrorKind::UniqueViolation) {
                    Self::Duplicate {
                        entity: "row",
                        key: message.to_string(),
                    }
                } else {
                    Self::DatabaseError(message.to_string())
                }
            }
            other => Self::QueryFailed(other.to_string()),
        }
    }
}

impl From<diesel::ConnectionError> for PersistenceError {
    fn from(err: diesel::ConnectionError) -> Self {
        Self::DatabaseConnectionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Busy(msg) => Self::Conflict(msg),
            PersistenceError::Duplicate { entity, key } => Self::Duplicate { entity, key },
            PersistenceError::NotFound { entity, id } => Self::NotFound { entity, id },
            PersistenceError::SerializationError(msg) | PersistenceError::InvalidTimestamp(msg) => {
                Self::Serialization(msg)
            }
            other => Self::Backend(other.to_string()),
        }
    }
}
