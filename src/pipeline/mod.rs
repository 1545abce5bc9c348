//! # 请求管道
//!
//! 每个请求的状态机：
//!
//! `Sending -> (成功 | AuthExpired) -> [AuthExpired -> Refreshing -> Retrying -> (成功 | 失败)] -> Terminal`
//!
//! 凭证过期响应只会触发一次刷新与一次重放；重放后的任何结果都是终态。
//! 刷新端点本身和无需认证的请求永远不会触发刷新。

pub mod request;
pub mod response;
pub mod transport;

pub use request::{ApiRequest, RequestContext};
pub use response::{ApiEnvelope, ApiResponse};
pub use transport::{ReqwestTransport, Transport};

use chrono::Utc;
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;

use crate::auth::{CredentialStore, RefreshCoordinator, RequestAuthenticator};
use crate::config::AuthConfig;
use crate::error::{ClientError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{config_error, ldebug, linfo, lwarn};

/// 管道阶段（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// 首次发送
    Sending,
    /// 收到凭证过期响应
    AuthExpired,
    /// 等待刷新周期
    Refreshing,
    /// 刷新后重放
    Retrying,
    /// 终态
    Terminal,
}

impl PipelineStage {
    /// 日志中使用的名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::AuthExpired => "auth_expired",
            Self::Refreshing => "refreshing",
            Self::Retrying => "retrying",
            Self::Terminal => "terminal",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求管道
#[derive(Clone)]
pub struct RequestPipeline {
    authenticator: RequestAuthenticator,
    transport: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
    store: Arc<dyn CredentialStore>,
    auth: AuthConfig,
    expired_status: StatusCode,
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("authenticator", &self.authenticator)
            .field("coordinator", &self.coordinator)
            .field("expired_status", &self.expired_status)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// 创建请求管道
    pub fn new(
        authenticator: RequestAuthenticator,
        transport: Arc<dyn Transport>,
        coordinator: RefreshCoordinator,
        store: Arc<dyn CredentialStore>,
        auth: AuthConfig,
    ) -> Result<Self> {
        let expired_status = StatusCode::from_u16(auth.expired_status).map_err(|e| {
            config_error!("无效的过期状态码 {}: {e}", auth.expired_status)
        })?;
        Ok(Self {
            authenticator,
            transport,
            coordinator,
            store,
            auth,
            expired_status,
        })
    }

    /// 刷新协调器
    #[must_use]
    pub const fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// 发出请求
    pub async fn issue(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut ctx = RequestContext::new(request);
        self.execute(&mut ctx).await
    }

    /// 在给定上下文上执行请求
    pub async fn execute(&self, ctx: &mut RequestContext) -> Result<ApiResponse> {
        if self.needs_proactive_refresh(ctx) {
            linfo!(
                ctx.request_id(),
                LogStage::TokenRefresh,
                LogComponent::Pipeline,
                "proactive_refresh",
                &format!("凭证即将过期，发送前刷新: {}", ctx.request().target)
            );
            self.coordinator
                .ensure_fresh_credential(ctx.request_id())
                .await?;
        }

        loop {
            let stage = if ctx.already_retried() {
                PipelineStage::Retrying
            } else {
                PipelineStage::Sending
            };

            let authorized = self.authenticator.authenticate(ctx);
            let response = match self.transport.send(authorized).await {
                Ok(response) => response,
                Err(e) => {
                    lwarn!(
                        ctx.request_id(),
                        LogStage::RequestSend,
                        LogComponent::Pipeline,
                        "send_failed",
                        &format!("[{stage}] {} 发送失败: {e}", ctx.request().target)
                    );
                    return Err(ClientError::Transport(e));
                }
            };

            if !self.is_credential_expired(ctx, &response) {
                ldebug!(
                    ctx.request_id(),
                    LogStage::ResponseReceive,
                    LogComponent::Pipeline,
                    "terminal",
                    &format!(
                        "[{stage} -> {}] {} {}",
                        PipelineStage::Terminal,
                        ctx.request().target,
                        response.status
                    )
                );
                return Ok(response);
            }

            if ctx.already_retried() {
                lwarn!(
                    ctx.request_id(),
                    LogStage::Retry,
                    LogComponent::Pipeline,
                    "expired_after_retry",
                    &format!("刷新后重放仍返回 {}: {}", response.status, ctx.request().target)
                );
                return Err(ClientError::CredentialExpired {
                    target: ctx.request().target.clone(),
                });
            }

            ctx.mark_retried();
            ldebug!(
                ctx.request_id(),
                LogStage::TokenRefresh,
                LogComponent::Pipeline,
                "auth_expired",
                &format!(
                    "[{} -> {}] {}",
                    PipelineStage::AuthExpired,
                    PipelineStage::Refreshing,
                    ctx.request().target
                )
            );
            self.coordinator
                .ensure_fresh_credential(ctx.request_id())
                .await?;
        }
    }

    /// 是否为需要走刷新流程的凭证过期响应
    fn is_credential_expired(&self, ctx: &RequestContext, response: &ApiResponse) -> bool {
        response.status == self.expired_status
            && ctx.request().requires_auth
            && !self.auth.is_refresh_target(&ctx.request().target)
    }

    fn needs_proactive_refresh(&self, ctx: &RequestContext) -> bool {
        let Some(window) = self.auth.proactive_refresh_seconds else {
            return false;
        };
        ctx.request().requires_auth
            && !self.auth.is_refresh_target(&ctx.request().target)
            && self.store.get().is_some_and(|credential| {
                credential.expires_within(chrono::Duration::seconds(window), Utc::now())
            })
    }
}
