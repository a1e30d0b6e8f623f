use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::Scope;

pub type Result<T> = std::result::Result<T, Error>;

/// What a failed store mutation was trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Add,
    Remove,
}

impl fmt::Display for StoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreAction::Add => f.write_str("adding"),
            StoreAction::Remove => f.write_str("removing"),
        }
    }
}

/// One failed unit of a store update. Scope failures are independent: earlier
/// scopes may already have been applied when a later one fails.
#[derive(Debug)]
pub struct StoreFailure {
    pub target: String,
    pub action: StoreAction,
    pub detail: String,
}

impl StoreFailure {
    pub fn scope(scope: Scope, action: StoreAction, err: &io::Error) -> Self {
        Self {
            target: format!("{scope} scope"),
            action,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} the {}: {}", self.action, self.target, self.detail)
    }
}

fn join_failures(failures: &[StoreFailure]) -> String {
    let parts: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    parts.join("; ")
}

#[derive(Debug, Error)]
pub enum Error {
    /// A declaration field failed validation before anything was touched.
    #[error("{0}")]
    Validation(String),

    #[error("the registry key name '{0}' is already used by another shortcut")]
    Uniqueness(String),

    #[error("administrator privileges are required to change the context menu")]
    Permission,

    #[error("{0}")]
    Incompatible(String),

    /// One or more store units failed; the rest of the update went through.
    #[error("the system store rejected the update: {}", join_failures(.0))]
    Store(Vec<StoreFailure>),

    #[error("the shell did not restart cleanly: {0}")]
    ShellRestart(String),

    #[error("could not save the shortcut list to {}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("the context menu store is only available on Windows")]
    Unsupported,
}
