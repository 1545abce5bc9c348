//! # API Auth Client
//!
//! 带单飞令牌刷新的认证 HTTP 客户端核心库。
//!
//! 请求经由 `RequestPipeline` 附加凭证并发送；收到凭证过期响应时，
//! 由 `RefreshCoordinator` 保证同一时刻只有一次刷新调用，
//! 刷新成功后每个请求各重放一次，刷新失败则结束会话。

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use auth::{Credential, CredentialStore, RefreshCoordinator, SessionEvent};
pub use client::{AuthClient, AuthClientBuilder};
pub use config::{ClientConfig, ConfigManager};
pub use error::{ClientError, RefreshError, Result};
pub use pipeline::{ApiRequest, ApiResponse, RequestPipeline};
