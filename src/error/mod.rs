//! The unified error handling system for the client.

// 1. Core Types
pub use auth::RefreshError;
pub use config::ConfigError;
pub use network::TransportError;
pub use types::ClientError;

/// A unified `Result` type for the entire client.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result of a single transport send.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Result of one refresh call / refresh episode.
pub type RefreshResult<T> = std::result::Result<T, RefreshError>;

/// Result of configuration loading and validation.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// 2. Module declarations
pub mod auth;
pub mod config;
pub mod macros;
pub mod network;
pub mod prelude;
pub mod types;

// 3. Context Trait for adding context to errors.
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<ClientError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let context_message = context().to_string();
                Err(ClientError::Context {
                    context: context_message,
                    source: Box::new(error.into()),
                })
            }
        }
    }
}

// 4. Error Category for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Errors caused by the caller (bad input, rejected request).
    /// Corresponds to 4xx HTTP status codes.
    Client,
    /// Errors caused by the server, the network, or this library.
    Server,
    /// The authenticated session is gone; a new login is required.
    Session,
}
