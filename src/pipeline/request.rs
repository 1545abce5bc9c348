//! # 请求描述与请求上下文
//!
//! `ApiRequest` 是调用方给出的请求描述；`RequestContext` 在管道中包裹它，
//! 并携带每个请求实例独有的 "已重试" 标记。

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// 出站请求描述
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP 方法
    pub method: Method,
    /// 目标路径（相对 `base_url`）或完整 URL
    pub target: String,
    /// 额外请求头
    pub headers: HeaderMap,
    /// 请求体
    pub body: Option<Bytes>,
    /// 是否需要附加凭证
    pub requires_auth: bool,
    /// 单请求超时；None 使用配置默认值
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    /// 创建需要认证的请求
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: None,
            requires_auth: true,
            timeout: None,
        }
    }

    /// GET 请求
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    /// POST 请求
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// PUT 请求
    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    /// PATCH 请求
    pub fn patch(target: impl Into<String>) -> Self {
        Self::new(Method::PATCH, target)
    }

    /// DELETE 请求
    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    /// 标记为无需认证（不附加凭证，也不会触发刷新）
    #[must_use]
    pub const fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// 设置 JSON 请求体
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        self.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// 设置原始请求体
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// 添加请求头
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::internal_with_source(format!("无效的请求头名: {name}"), e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::internal_with_source("无效的请求头值", e))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// 设置单请求超时
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// 管道中的请求上下文
#[derive(Debug)]
pub struct RequestContext {
    request: ApiRequest,
    request_id: String,
    already_retried: bool,
}

impl RequestContext {
    /// 包裹请求并分配请求 ID
    #[must_use]
    pub fn new(request: ApiRequest) -> Self {
        Self {
            request,
            request_id: uuid::Uuid::new_v4().to_string(),
            already_retried: false,
        }
    }

    /// 原始请求
    #[must_use]
    pub const fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// 请求 ID（日志关联用）
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// 是否已经因凭证过期重试过
    #[must_use]
    pub const fn already_retried(&self) -> bool {
        self.already_retried
    }

    /// 标记已重试；只能从 false 变为 true
    pub(crate) fn mark_retried(&mut self) {
        self.already_retried = true;
    }
}
