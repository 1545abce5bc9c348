//! # 令牌刷新执行器
//!
//! 执行一次刷新调用：以会话 Cookie 为凭据请求刷新端点，解析新的访问令牌。
//! 执行器本身不做单飞控制，也不写凭证存储，这两件事由协调器负责。

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::credential::Credential;
use crate::config::{ApiConfig, AuthConfig};
use crate::config_error;
use crate::error::{RefreshError, RefreshResult, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 刷新执行器
#[async_trait]
pub trait RefreshExecutor: Send + Sync {
    /// 执行一次刷新调用
    async fn refresh(&self) -> RefreshResult<Credential>;
}

/// 刷新端点返回的令牌对
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedTokens {
    /// 新访问令牌
    #[serde(alias = "access_token")]
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    /// 轮换后的刷新令牌（通常经 Cookie 下发，这里仅作记录）
    #[serde(alias = "refresh_token")]
    #[serde(rename = "refreshToken")]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshEnvelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<RefreshedTokens>,
}

/// 通过 HTTP 调用刷新端点的执行器
///
/// 使用与请求传输共享的 reqwest 客户端，这样登录时下发的
/// HTTP-only 会话 Cookie 会自动随刷新请求发送。
#[derive(Debug, Clone)]
pub struct HttpRefreshExecutor {
    client: reqwest::Client,
    url: Url,
    method: Method,
    timeout: Duration,
}

impl HttpRefreshExecutor {
    /// 创建刷新执行器
    pub fn new(client: reqwest::Client, api: &ApiConfig, auth: &AuthConfig) -> Result<Self> {
        let base = api.base_url.trim_end_matches('/');
        let url = Url::parse(&format!("{base}{}", auth.refresh_path))
            .map_err(|e| config_error!("无效的刷新端点地址: {e}"))?;
        let method = Method::from_bytes(auth.refresh_method.as_bytes())
            .map_err(|e| config_error!("无效的刷新方法: {e}"))?;
        Ok(Self {
            client,
            url,
            method,
            timeout: auth.refresh_timeout(),
        })
    }

    /// 刷新端点完整地址
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// 解析刷新响应体
    ///
    /// 接受 `{code, message, data: {accessToken}}` 信封（可再包在 `body` 中），
    /// 也接受顶层直接给出令牌。
    pub fn parse_response(status: u16, body: &[u8]) -> RefreshResult<Credential> {
        if !(200..300).contains(&status) {
            let message = serde_json::from_slice::<Value>(body)
                .ok()
                .map(unwrap_entity)
                .and_then(|value| serde_json::from_value::<RefreshEnvelope>(value).ok())
                .and_then(|e| e.message)
                .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
            return Err(RefreshError::rejected(status, message));
        }

        let value = unwrap_entity(serde_json::from_slice(body)?);
        let envelope: RefreshEnvelope = serde_json::from_value(value.clone())?;
        let envelope_failed = envelope.success == Some(false)
            || envelope.code.is_some_and(|code| !(200..300).contains(&code));
        if envelope_failed {
            let code = envelope
                .code
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(status);
            return Err(RefreshError::rejected(
                code,
                envelope.message.unwrap_or_else(|| "refresh failed".to_string()),
            ));
        }

        let token = match envelope.data.and_then(|d| d.access_token) {
            Some(token) => token,
            None => serde_json::from_value::<RefreshedTokens>(value)?
                .access_token
                .ok_or_else(|| {
                    RefreshError::MalformedResponse("响应中缺少 accessToken".to_string())
                })?,
        };

        if token.trim().is_empty() {
            return Err(RefreshError::MalformedResponse(
                "accessToken 为空".to_string(),
            ));
        }
        Ok(Credential::new(token))
    }
}

/// 服务端把信封再包进 `{headers, body, statusCode}` 时取出内层 `body`
fn unwrap_entity(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if !map.contains_key("data") && map.get("body").is_some_and(Value::is_object) =>
        {
            map.remove("body").unwrap_or_default()
        }
        other => other,
    }
}

#[async_trait]
impl RefreshExecutor for HttpRefreshExecutor {
    async fn refresh(&self) -> RefreshResult<Credential> {
        ldebug!(
            "system",
            LogStage::TokenRefresh,
            LogComponent::RefreshExecutor,
            "refresh_call",
            &format!("{} {}", self.method, self.url)
        );

        let response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let result = Self::parse_response(status, &body);
        if let Err(e) = &result {
            lwarn!(
                "system",
                LogStage::TokenRefresh,
                LogComponent::RefreshExecutor,
                "refresh_call_failed",
                &format!("刷新调用失败: {e}")
            );
        }
        result
    }
}
