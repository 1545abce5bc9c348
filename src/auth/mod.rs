//! # 认证模块
//!
//! 凭证存储、请求认证、令牌刷新与单飞刷新协调。
//! 组件自底向上：`credential` → `authenticator` → `refresh` → `coordinator`，
//! `session` 提供显式登录/登出及刷新失败时的会话终止。

pub mod authenticator;
pub mod coordinator;
pub mod credential;
pub mod jwt;
pub mod refresh;
pub mod session;

pub use authenticator::{AuthorizedRequest, RequestAuthenticator};
pub use coordinator::{CoordinatorStats, RefreshCoordinator, RefreshOutcome, RefreshState};
pub use credential::{Credential, CredentialStore, InMemoryCredentialStore};
pub use refresh::{HttpRefreshExecutor, RefreshExecutor, RefreshedTokens};
pub use session::{FnTeardown, LogoutReason, SessionEvent, SessionManager, SessionTeardown};
