//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not open a connection after every retry attempt.
    #[error("Connection to {endpoint} failed after {attempts} attempts: {message}")]
    Connection {
        endpoint: String,
        attempts: u32,
        message: String,
    },

    /// The role may not run the requested operation.
    #[error("Role '{role}' is not permitted to run {operation}")]
    PermissionDenied { role: String, operation: String },

    /// Reading a table from the source failed.
    #[error("Extract failed for table {table}: {message}")]
    Extract { table: String, message: String },

    /// Writing a table to the target failed.
    #[error("Load failed for table {table}: {message}")]
    Load { table: String, message: String },

    /// The audit row could not be written to the target.
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    /// Watermark or history file error
    #[error("State file error: {0}")]
    State(String),

    /// Database driver error
    #[error("Database error: {}", describe_pg_error(.0))]
    Database(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Server message with SQLSTATE, detail and hint for errors raised by
/// PostgreSQL; the driver's message and its cause for everything else.
fn describe_pg_error(err: &tokio_postgres::Error) -> String {
    if let Some(db) = err.as_db_error() {
        let mut out = format!("{} (SQLSTATE {})", db.message(), db.code().code());
        if let Some(detail) = db.detail() {
            out.push_str(&format!("; detail: {}", detail));
        }
        if let Some(hint) = db.hint() {
            out.push_str(&format!("; hint: {}", hint));
        }
        return out;
    }

    let mut out = err.to_string();
    if let Some(cause) = std::error::Error::source(err) {
        let cause = cause.to_string();
        if !out.contains(&cause) {
            out.push_str(&format!(": {}", cause));
        }
    }
    out
}

impl MigrateError {
    /// Create a Connection error for an endpoint ("source" or "target").
    pub fn connection(endpoint: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        MigrateError::Connection {
            endpoint: endpoint.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Create an Extract error
    pub fn extract(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Extract {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Load error
    pub fn load(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Load {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrateError::Connection { .. } | MigrateError::PermissionDenied { .. }
        )
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::PermissionDenied { .. } => 3,
            MigrateError::Connection { .. } => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_and_permission_are_fatal() {
        assert!(MigrateError::connection("source", 3, "refused").is_fatal());
        assert!(MigrateError::PermissionDenied {
            role: "operator".into(),
            operation: "full-load".into()
        }
        .is_fatal());
        assert!(!MigrateError::extract("customers", "boom").is_fatal());
        assert!(!MigrateError::load("customers", "boom").is_fatal());
        assert!(!MigrateError::AuditWrite("boom".into()).is_fatal());
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = MigrateError::load("orders", "duplicate key");
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Load failed for table orders"));
        assert!(detailed.contains("duplicate key"));
    }

    #[test]
    fn test_database_error_keeps_driver_cause() {
        let pg = "port=notanumber"
            .parse::<tokio_postgres::Config>()
            .unwrap_err();
        let err = MigrateError::from(pg);
        let text = err.to_string();
        assert!(text.starts_with("Database error: "));
        assert!(text.contains("port"), "{}", text);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::connection("target", 3, "x").exit_code(), 4);
        assert_eq!(MigrateError::State("x".into()).exit_code(), 1);
    }
}
