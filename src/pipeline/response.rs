//! # 响应与响应信封
//!
//! 后端统一使用 `{ code, message, data }` 信封；`ApiResponse` 保留原始字节，
//! 由调用方决定按信封解码还是直接读取。

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

/// 传输层返回的原始响应
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// 状态码
    pub status: StatusCode,
    /// 响应头
    pub headers: HeaderMap,
    /// 响应体
    pub body: Bytes,
}

/// 后端响应信封
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// 业务状态码（与 HTTP 状态码一致的 2xx 表示成功）
    #[serde(default)]
    pub code: Option<i64>,
    /// 部分接口使用布尔成功标记
    #[serde(default)]
    pub success: Option<bool>,
    /// 提示信息
    #[serde(default)]
    pub message: Option<String>,
    /// 业务数据
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// 信封是否表示成功
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true) && self.code.is_none_or(|code| (200..300).contains(&code))
    }
}

impl ApiResponse {
    /// 创建响应
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// 以 JSON 值创建响应
    #[must_use]
    pub fn json_value(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    /// HTTP 状态是否为 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 响应体文本（非 UTF-8 字节被替换）
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 将响应体解码为 JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ClientError::serialization("响应体不是预期的JSON", e))
    }

    /// 将响应体解码为信封
    pub fn envelope<T: DeserializeOwned>(&self) -> Result<ApiEnvelope<T>> {
        self.json()
    }

    /// 读取信封中的 `data`
    ///
    /// HTTP 非 2xx、信封失败或 `data` 缺失都视为 API 错误。
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        if !self.is_success() {
            let message = self
                .envelope::<serde_json::Value>()
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| self.text());
            return Err(ClientError::api(self.status.as_u16(), message));
        }

        let envelope: ApiEnvelope<T> = self.envelope()?;
        if !envelope.is_success() {
            let status = envelope
                .code
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or_else(|| self.status.as_u16());
            return Err(ClientError::api(
                status,
                envelope.message.unwrap_or_else(|| "服务器响应失败".to_string()),
            ));
        }

        envelope.data.ok_or_else(|| {
            ClientError::api(
                self.status.as_u16(),
                envelope
                    .message
                    .unwrap_or_else(|| "服务器响应缺少 data".to_string()),
            )
        })
    }
}
