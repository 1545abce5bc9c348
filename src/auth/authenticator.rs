//! # 请求认证器
//!
//! 在发送前从凭证存储读取当前凭证并写入请求头。
//! 每次发送（包括重放）都会重新读取，因此重放请求总是带着刷新后的凭证。

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use super::credential::CredentialStore;
use crate::error::{ClientError, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::pipeline::RequestContext;

/// 已附加凭证、可直接交给传输层的请求
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    /// 请求 ID
    pub request_id: String,
    /// HTTP 方法
    pub method: Method,
    /// 目标路径或完整 URL
    pub target: String,
    /// 完整请求头（含认证头）
    pub headers: HeaderMap,
    /// 请求体
    pub body: Option<Bytes>,
    /// 单请求超时
    pub timeout: Option<Duration>,
    /// 是否附加了凭证
    pub authenticated: bool,
}

/// 请求认证器
#[derive(Clone)]
pub struct RequestAuthenticator {
    store: Arc<dyn CredentialStore>,
    header_name: HeaderName,
    scheme: String,
}

impl std::fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("header_name", &self.header_name)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl RequestAuthenticator {
    /// 创建认证器；`scheme` 为空时直接写入令牌原文
    pub fn new(
        store: Arc<dyn CredentialStore>,
        header_name: &str,
        scheme: impl Into<String>,
    ) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|e| {
            ClientError::internal_with_source(format!("无效的认证头名: {header_name}"), e)
        })?;
        Ok(Self {
            store,
            header_name,
            scheme: scheme.into(),
        })
    }

    /// 使用 `Authorization: Bearer <token>` 的认证器
    #[must_use]
    pub fn bearer(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            header_name: reqwest::header::AUTHORIZATION,
            scheme: "Bearer".to_string(),
        }
    }

    /// 为请求附加当前凭证
    ///
    /// 无需认证的请求或存储为空时原样放行，不产生错误；
    /// 调用方提供的同名头会被覆盖。
    pub fn authenticate(&self, ctx: &RequestContext) -> AuthorizedRequest {
        let request = ctx.request();
        let mut headers = request.headers.clone();
        let mut authenticated = false;

        if request.requires_auth {
            match self.store.get() {
                Some(credential) => match self.header_value(credential.token()) {
                    Some(value) => {
                        headers.insert(self.header_name.clone(), value);
                        authenticated = true;
                        ldebug!(
                            ctx.request_id(),
                            LogStage::Authentication,
                            LogComponent::Authenticator,
                            "attach_credential",
                            &format!("附加凭证 {} -> {}", credential.masked(), request.target)
                        );
                    }
                    None => {
                        ldebug!(
                            ctx.request_id(),
                            LogStage::Authentication,
                            LogComponent::Authenticator,
                            "invalid_credential",
                            "凭证包含非法头字符，未附加"
                        );
                    }
                },
                None => {
                    ldebug!(
                        ctx.request_id(),
                        LogStage::Authentication,
                        LogComponent::Authenticator,
                        "no_credential",
                        &format!("当前无凭证，不附加认证头: {}", request.target)
                    );
                }
            }
        }

        AuthorizedRequest {
            request_id: ctx.request_id().to_string(),
            method: request.method.clone(),
            target: request.target.clone(),
            headers,
            body: request.body.clone(),
            timeout: request.timeout,
            authenticated,
        }
    }

    fn header_value(&self, token: &str) -> Option<HeaderValue> {
        let raw = if self.scheme.is_empty() {
            token.to_string()
        } else {
            format!("{} {token}", self.scheme)
        };
        let mut value = HeaderValue::from_str(&raw).ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}
