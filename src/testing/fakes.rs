//! # 手写假实现
//!
//! 可观察调用次数与调用顺序的存储、刷新执行器、传输层和会话回调

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::auth::{AuthorizedRequest, Credential, CredentialStore, InMemoryCredentialStore};
use crate::auth::{RefreshExecutor, SessionTeardown};
use crate::error::{RefreshError, RefreshResult, TransportError, TransportResult};
use crate::pipeline::{ApiResponse, Transport};

/// 存储写操作记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    /// 写入了某个令牌
    Set(String),
    /// 清除
    Clear,
}

/// 记录写操作的凭证存储
#[derive(Debug, Default)]
pub struct RecordingCredentialStore {
    inner: InMemoryCredentialStore,
    writes: Mutex<Vec<StoreWrite>>,
    reads: AtomicUsize,
}

impl RecordingCredentialStore {
    /// 以初始令牌创建
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        let store = Self::default();
        store.inner.set(Credential::new(token));
        store
    }

    /// 写操作序列（不含初始令牌）
    pub fn writes(&self) -> Vec<StoreWrite> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 读取次数
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CredentialStore for RecordingCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get()
    }

    fn set(&self, credential: Credential) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoreWrite::Set(credential.token().to_string()));
        self.inner.set(credential);
    }

    fn clear(&self) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoreWrite::Clear);
        self.inner.clear();
    }
}

/// 计数的刷新执行器
///
/// 可选闸门：`gated()` 后每次调用都会阻塞，直到 `release()`。
#[derive(Debug)]
pub struct CountingRefreshExecutor {
    calls: AtomicUsize,
    queued: Mutex<VecDeque<RefreshResult<Credential>>>,
    fallback: RefreshResult<Credential>,
    gate: Option<Semaphore>,
    delay: Option<Duration>,
}

impl CountingRefreshExecutor {
    fn with_fallback(fallback: RefreshResult<Credential>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            queued: Mutex::new(VecDeque::new()),
            fallback,
            gate: None,
            delay: None,
        }
    }

    /// 总是返回给定令牌
    #[must_use]
    pub fn succeeding(token: &str) -> Self {
        Self::with_fallback(Ok(Credential::new(token)))
    }

    /// 总是返回给定错误
    #[must_use]
    pub fn failing(error: RefreshError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// 在默认结果之前先依次返回的结果
    #[must_use]
    pub fn then(self, outcome: RefreshResult<Credential>) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }

    /// 加闸门
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// 每次调用的延迟
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 放行一次调用
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// 调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshExecutor for CountingRefreshExecutor {
    async fn refresh(&self) -> RefreshResult<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| RefreshError::Abandoned)?
                .forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

/// 记录调用的会话终止回调
#[derive(Debug, Default)]
pub struct RecordingTeardown {
    errors: Mutex<Vec<RefreshError>>,
}

impl RecordingTeardown {
    /// 调用次数
    pub fn calls(&self) -> usize {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 最近一次收到的错误
    pub fn last_error(&self) -> Option<RefreshError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl SessionTeardown for RecordingTeardown {
    fn on_refresh_failed(&self, error: &RefreshError) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
    }
}

/// 已发送请求的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// 目标
    pub target: String,
    /// 认证头（如有）
    pub authorization: Option<String>,
}

type Responder = dyn Fn(&AuthorizedRequest) -> TransportResult<ApiResponse> + Send + Sync;

/// 按脚本应答的传输层
pub struct ScriptedTransport {
    responder: Box<Responder>,
    sent: Mutex<Vec<SentRequest>>,
    delay: Option<Duration>,
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("sent", &self.sent())
            .finish_non_exhaustive()
    }
}

impl ScriptedTransport {
    /// 用闭包决定每个请求的响应
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&AuthorizedRequest) -> TransportResult<ApiResponse> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            sent: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// 只接受 `Bearer {token}`，其余一律 401
    #[must_use]
    pub fn accepting(token: &str) -> Self {
        let expected = format!("Bearer {token}");
        Self::new(move |request| {
            let authorized = request
                .headers
                .get(reqwest::header::AUTHORIZATION)
                .is_some_and(|v| v.as_bytes() == expected.as_bytes());
            if authorized {
                Ok(ApiResponse::new(
                    StatusCode::OK,
                    Bytes::from(format!("ok:{}", request.target)),
                ))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, "expired"))
            }
        })
    }

    /// 总是返回给定状态码
    #[must_use]
    pub fn always(status: StatusCode) -> Self {
        Self::new(move |_| Ok(ApiResponse::new(status, Bytes::new())))
    }

    /// 总是超时
    #[must_use]
    pub fn timing_out() -> Self {
        Self::new(|_| Err(TransportError::Timeout("5s elapsed".to_string())))
    }

    /// 每次发送前的延迟
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已发送的请求
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 发往某个目标的次数
    pub fn sent_to(&self, target: &str) -> usize {
        self.sent().iter().filter(|r| r.target == target).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: AuthorizedRequest) -> TransportResult<ApiResponse> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentRequest {
                target: request.target.clone(),
                authorization: request
                    .headers
                    .get(reqwest::header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}
