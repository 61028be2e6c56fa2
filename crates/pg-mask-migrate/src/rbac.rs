//! Role-based gate deciding which run modes a caller may start.
//!
//! | operation        | guest | operator | dev |
//! |------------------|-------|----------|-----|
//! | dry-run          | yes   | yes      | yes |
//! | incremental-load | no    | yes      | yes |
//! | full-load        | no    | no       | yes |
//!
//! The gate is stateless and runs before any connection is opened.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Caller role, in ascending privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Operator,
    Dev,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Operator => "operator",
            Role::Dev => "dev",
        }
    }
}

impl FromStr for Role {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "operator" => Ok(Role::Operator),
            "dev" => Ok(Role::Dev),
            other => Err(MigrateError::PermissionDenied {
                role: other.to_string(),
                operation: "any operation (unknown role)".to_string(),
            }),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run mode requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Count rows, write nothing.
    DryRun,
    /// Load rows above the persisted watermark.
    IncrementalLoad,
    /// Clean target tables, reset watermarks and reload everything.
    FullLoad,
}

impl Operation {
    /// Parse a run option: `1`/`full`, `2`/`incremental`, `3`/`dry-run`.
    pub fn from_option(option: &str) -> Result<Self> {
        match option.trim().to_lowercase().replace('_', "-").as_str() {
            "1" | "full" | "full-load" => Ok(Operation::FullLoad),
            "2" | "incremental" | "incremental-load" => Ok(Operation::IncrementalLoad),
            "3" | "dry-run" | "dryrun" => Ok(Operation::DryRun),
            other => Err(MigrateError::Config(format!(
                "Unknown run option '{}'. Valid options: 1 (full), 2 (incremental), 3 (dry-run)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DryRun => "dry-run",
            Operation::IncrementalLoad => "incremental-load",
            Operation::FullLoad => "full-load",
        }
    }

    /// Lowest role allowed to run this operation.
    pub fn minimum_role(&self) -> Role {
        match self {
            Operation::DryRun => Role::Guest,
            Operation::IncrementalLoad => Role::Operator,
            Operation::FullLoad => Role::Dev,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `role` may run `operation`.
pub fn authorize(role: Role, operation: Operation) -> Result<()> {
    if role >= operation.minimum_role() {
        Ok(())
    } else {
        Err(MigrateError::PermissionDenied {
            role: role.to_string(),
            operation: operation.to_string(),
        })
    }
}
