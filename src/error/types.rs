//! # 错误类型定义

use reqwest::StatusCode;
use thiserror::Error;

use super::ErrorCategory;
use super::auth::RefreshError;
use super::config::ConfigError;
use super::network::TransportError;

/// 客户端主要错误类型
#[derive(Debug, Error)]
pub enum ClientError {
    /// 请求发送失败（网络不可达、超时等），只影响当前请求
    #[error("网络错误: {0}")]
    Transport(#[from] TransportError),

    /// 刷新周期失败，会话已结束
    #[error("令牌刷新失败: {0}")]
    Refresh(#[from] RefreshError),

    /// 刷新后重放的请求再次返回凭证过期
    #[error("凭证在刷新后仍被拒绝: {target}")]
    CredentialExpired { target: String },

    /// 服务端返回的业务失败（非 2xx 或失败信封）
    #[error("API错误({status}): {message}")]
    Api { status: u16, message: String },

    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 附加上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// 错误分类，供调用方决定如何响应
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Refresh(_) | Self::CredentialExpired { .. } => ErrorCategory::Session,
            Self::Api { status, .. } if (400..500).contains(status) => ErrorCategory::Client,
            Self::Config(_) | Self::Serialization { .. } => ErrorCategory::Client,
            Self::Context { source, .. } => source.category(),
            Self::Transport(_) | Self::Api { .. } | Self::Internal { .. } => ErrorCategory::Server,
        }
    }

    /// 对应的 HTTP 状态码（无法对应时为 None）
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => StatusCode::from_u16(*status).ok(),
            Self::CredentialExpired { .. } => Some(StatusCode::UNAUTHORIZED),
            Self::Refresh(RefreshError::Rejected { status, .. }) => {
                StatusCode::from_u16(*status).ok()
            }
            Self::Context { source, .. } => source.status(),
            _ => None,
        }
    }

    /// 该错误是否意味着会话已经结束（需要重新登录）
    #[must_use]
    pub fn is_session_ended(&self) -> bool {
        match self {
            Self::Refresh(_) => true,
            Self::Context { source, .. } => source.is_session_ended(),
            _ => false,
        }
    }

    /// 创建API错误
    pub fn api<T: Into<String>>(status: u16, message: T) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config(ConfigError::invalid(message))
    }

    /// 创建序列化错误
    pub fn serialization<T: Into<String>, E: Into<anyhow::Error>>(message: T, source: E) -> Self {
        Self::Serialization {
            message: message.into(),
            source: source.into(),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON解析失败", err)
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(ConfigError::Parse(err))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}
