// Error types for the jump-host router

use std::path::PathBuf;
use thiserror::Error;

use crate::routes::lookup::ResolveError;
use crate::routes::parser::MalformedRoute;
use crate::transport::TransportError;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to read routes file {}: {source}", .path.display())]
    RouteFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid routes file: {0}")]
    RouteFileFormat(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Invalid target `{0}`: expected user@host[:port]")]
    InvalidTarget(String),

    #[error("Invalid jump chain `{chain}`: {reason}")]
    InvalidChain { chain: String, reason: MalformedRoute },

    #[error("Could not resolve address of {0}")]
    AddressResolution(String),

    #[error("Nothing to execute: pass --command or --script")]
    MissingJob,

    #[error("Script file not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Convert error to user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AppError::RouteFileRead { path, .. } => {
                format!("Routes file {} could not be read. Check the path and permissions.", path.display())
            }
            AppError::RouteFileFormat(msg) => {
                format!("Routes file is not valid: {}.", msg)
            }
            AppError::Resolve(ResolveError::NoRouteFound(addr)) => {
                format!("No route found for {}. Add a matching network or a default route.", addr)
            }
            AppError::InvalidTarget(target) => {
                format!("Invalid target '{}'. Use user@host or user@host:port.", target)
            }
            AppError::InvalidChain { chain, reason } => {
                format!("Invalid jump chain '{}' ({}). Use direct or user@host[:port],user@host[:port].", chain, reason)
            }
            AppError::AddressResolution(host) => {
                format!("Could not resolve {} to an IPv4 address. Check the hostname or DNS.", host)
            }
            AppError::MissingJob => {
                "Nothing to execute. Pass --command or --script.".to_string()
            }
            AppError::ScriptNotFound(path) => {
                format!("Script file not found: {}", path.display())
            }
            AppError::Transport(TransportError::Spawn { program, .. }) => {
                format!("Failed to execute command. Make sure {} is installed.", program)
            }
            AppError::Transport(TransportError::Timeout(after)) => {
                format!("Remote operation timed out after {}s.", after.as_secs())
            }
            AppError::Transport(TransportError::Wait(_)) => {
                "Lost track of the ssh process. Try again.".to_string()
            }
            AppError::Serialization(_) => {
                "Data format error. Check that the routes file is valid JSON.".to_string()
            }
        }
    }

    /// Whether the failure only concerns this connection attempt, so a
    /// caller driving several targets can carry on with the next one
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Resolve(_)
                | AppError::AddressResolution(_)
                | AppError::InvalidTarget(_)
                | AppError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_route_message() {
        let err = AppError::from(ResolveError::NoRouteFound("10.1.2.3".parse().unwrap()));
        assert!(err.user_message().contains("10.1.2.3"));
        assert!(err.to_string().contains("no route found for 10.1.2.3"));
    }

    #[test]
    fn test_error_recoverable() {
        assert!(AppError::from(ResolveError::NoRouteFound("10.0.0.1".parse().unwrap())).is_recoverable());
        assert!(AppError::Transport(TransportError::Timeout(Duration::from_secs(5))).is_recoverable());
        assert!(!AppError::RouteFileFormat("x".to_string()).is_recoverable());
    }
}
