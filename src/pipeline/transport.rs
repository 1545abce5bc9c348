//! # 传输层
//!
//! 把已认证请求交给底层 HTTP 客户端。传输层只负责 "发出去、拿回来"，
//! 不理解凭证过期，也不做任何重试。

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

use super::ApiResponse;
use crate::auth::AuthorizedRequest;
use crate::config::ApiConfig;
use crate::error::{ClientError, Result, TransportResult};
use crate::{config_error, ldebug};
use crate::logging::{LogComponent, LogStage};

/// 发送已认证请求的传输层
#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送请求并返回完整响应；任何 HTTP 状态码都是 `Ok`
    async fn send(&self, request: AuthorizedRequest) -> TransportResult<ApiResponse>;
}

/// 基于 reqwest 的传输层
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Url,
    default_timeout: Duration,
    default_headers: HeaderMap,
}

impl ReqwestTransport {
    /// 根据 API 配置创建传输层
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::internal_with_source("创建HTTP客户端失败", e))?;
        Self::with_client(client, config)
    }

    /// 使用现有 reqwest 客户端（例如共享 Cookie 存储的客户端）
    pub fn with_client(client: reqwest::Client, config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| config_error!("无效的 base_url: {}: {e}", config.base_url))?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| config_error!("无效的默认请求头名 {name}: {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| config_error!("无效的默认请求头值 {name}: {e}"))?;
            default_headers.insert(name, value);
        }

        Ok(Self {
            client,
            base_url,
            default_timeout: config.request_timeout(),
            default_headers,
        })
    }

    /// 解析目标地址：完整 URL 原样使用，路径拼接到 `base_url`
    pub fn resolve(&self, target: &str) -> TransportResult<Url> {
        if target.contains("://") {
            return Ok(Url::parse(target)?);
        }
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = target.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: AuthorizedRequest) -> TransportResult<ApiResponse> {
        let url = self.resolve(&request.target)?;

        let mut headers = self.default_headers.clone();
        headers.extend(request.headers);

        ldebug!(
            request.request_id,
            LogStage::RequestSend,
            LogComponent::Transport,
            "send",
            &format!("{} {}", request.method, url)
        );

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(headers)
            .timeout(request.timeout.unwrap_or(self.default_timeout));
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        ldebug!(
            request.request_id,
            LogStage::ResponseReceive,
            LogComponent::Transport,
            "receive",
            &format!("状态 {status}, {} 字节", body.len())
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
