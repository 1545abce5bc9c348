//! A "prelude" for easily importing the most common error handling items.

pub use super::auth::RefreshError;
pub use super::config::ConfigError;
pub use super::network::TransportError;
pub use super::{
    ClientError, ConfigResult, Context, ErrorCategory, RefreshResult, Result, TransportResult,
};

pub use crate::{config_error, ensure_config, internal_error};
