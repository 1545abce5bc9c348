//! # 会话管理
//!
//! 负责显式登录/登出，并作为刷新失败时的会话终止回调。
//! 会话状态变化通过 broadcast 通道通知应用层。

use std::sync::Arc;
use tokio::sync::broadcast;

use super::credential::{Credential, CredentialStore};
use crate::error::RefreshError;
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 会话事件通道容量
const SESSION_EVENT_CAPACITY: usize = 16;

/// 登出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    /// 应用主动登出
    UserRequested,
    /// 刷新周期失败，会话被强制结束
    RefreshFailed(RefreshError),
}

/// 会话事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 已登录（写入了新凭证）
    LoggedIn,
    /// 已登出
    LoggedOut {
        /// 原因
        reason: LogoutReason,
    },
}

/// 刷新失败时的会话终止回调
///
/// 协调器保证每个失败的刷新周期只调用一次，且在释放等待者之前调用。
pub trait SessionTeardown: Send + Sync {
    /// 刷新周期失败
    fn on_refresh_failed(&self, error: &RefreshError);
}

/// 以闭包实现的会话终止回调
pub struct FnTeardown<F>(pub F);

impl<F> SessionTeardown for FnTeardown<F>
where
    F: Fn(&RefreshError) + Send + Sync,
{
    fn on_refresh_failed(&self, error: &RefreshError) {
        (self.0)(error);
    }
}

/// 会话管理器
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("authenticated", &self.is_authenticated())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl SessionManager {
    /// 创建会话管理器
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { store, events }
    }

    /// 登录：写入凭证
    pub fn login(&self, credential: Credential) {
        linfo!(
            "system",
            LogStage::Session,
            LogComponent::Session,
            "login",
            &format!("写入登录凭证 {}", credential.masked())
        );
        self.store.set(credential);
        self.emit(SessionEvent::LoggedIn);
    }

    /// 主动登出：清除凭证
    pub fn logout(&self) {
        self.end_session(LogoutReason::UserRequested);
    }

    /// 订阅会话事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// 当前是否持有凭证
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// 当前凭证
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.store.get()
    }

    fn end_session(&self, reason: LogoutReason) {
        match &reason {
            LogoutReason::UserRequested => linfo!(
                "system",
                LogStage::Session,
                LogComponent::Session,
                "logout",
                "应用主动登出"
            ),
            LogoutReason::RefreshFailed(e) => lwarn!(
                "system",
                LogStage::Session,
                LogComponent::Session,
                "forced_logout",
                &format!("刷新失败，会话结束: {e}")
            ),
        }
        self.store.clear();
        self.emit(SessionEvent::LoggedOut { reason });
    }

    fn emit(&self, event: SessionEvent) {
        // 没有订阅者时发送失败，可以忽略
        let _ = self.events.send(event);
    }
}

impl SessionTeardown for SessionManager {
    fn on_refresh_failed(&self, error: &RefreshError) {
        self.end_session(LogoutReason::RefreshFailed(error.clone()));
    }
}
