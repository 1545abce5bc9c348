//! # 客户端配置结构定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::ensure_config;
use crate::error::ConfigResult;

/// 客户端主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 后端 API 配置
    pub api: ApiConfig,
    /// 认证与刷新配置
    #[serde(default)]
    pub auth: AuthConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 后端 API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 基础地址，例如 `https://api.example.com`
    pub base_url: String,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 每个请求都附带的公共头
    #[serde(default)]
    pub default_headers: HashMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_seconds: default_request_timeout(),
            user_agent: default_user_agent(),
            default_headers: HashMap::new(),
        }
    }
}

/// 认证与刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 刷新端点路径（相对 `base_url`）
    pub refresh_path: String,
    /// 刷新端点 HTTP 方法
    pub refresh_method: String,
    /// 刷新调用超时（秒），超时视为刷新失败
    pub refresh_timeout_seconds: u64,
    /// 附加凭证的请求头名
    pub header_name: String,
    /// 凭证前缀，例如 `Bearer`；为空时直接写入令牌
    pub scheme: String,
    /// 表示凭证过期的状态码
    pub expired_status: u16,
    /// 提前刷新窗口（秒）；None 表示只在收到过期响应后刷新
    pub proactive_refresh_seconds: Option<i64>,
    /// 承载会话凭据的 HTTP-only Cookie 名称
    pub session_cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: "/api/auth/refresh".to_string(),
            refresh_method: "POST".to_string(),
            refresh_timeout_seconds: 10,
            header_name: "Authorization".to_string(),
            scheme: "Bearer".to_string(),
            expired_status: 401,
            proactive_refresh_seconds: None,
            session_cookie_name: "RefreshToken".to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const fn default_request_timeout() -> u64 {
    5
}

fn default_user_agent() -> String {
    format!("api-auth-client/{}", env!("CARGO_PKG_VERSION"))
}

impl ApiConfig {
    /// 请求超时
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl AuthConfig {
    /// 刷新调用超时
    #[must_use]
    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_seconds)
    }

    /// 判断某个请求路径是否就是刷新端点本身
    ///
    /// 与传输层拼接地址的方式一致：忽略首尾 `/`、查询串和片段。
    #[must_use]
    pub fn is_refresh_target(&self, target: &str) -> bool {
        let refresh = self.refresh_path.trim_matches('/');
        if target.contains("://") {
            return url::Url::parse(target).is_ok_and(|url| {
                let path = url.path().trim_matches('/');
                path == refresh || path.ends_with(&format!("/{refresh}"))
            });
        }
        let path = target.split(['?', '#']).next().unwrap_or(target);
        path.trim_matches('/') == refresh
    }
}

impl ClientConfig {
    /// 使用给定基础地址创建默认配置
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                ..ApiConfig::default()
            },
            ..Self::default()
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> ConfigResult<()> {
        ensure_config!(!self.api.base_url.is_empty(), "api.base_url 不能为空");
        let parsed = url::Url::parse(&self.api.base_url);
        ensure_config!(
            parsed.as_ref().is_ok_and(|u| u.scheme() == "http" || u.scheme() == "https"),
            "api.base_url 不是有效的 http(s) 地址: {}",
            self.api.base_url
        );
        ensure_config!(
            self.api.request_timeout_seconds > 0,
            "api.request_timeout_seconds 必须大于0"
        );
        ensure_config!(
            self.auth.refresh_timeout_seconds > 0,
            "auth.refresh_timeout_seconds 必须大于0"
        );
        ensure_config!(
            self.auth.refresh_path.starts_with('/'),
            "auth.refresh_path 必须以 '/' 开头: {}",
            self.auth.refresh_path
        );
        ensure_config!(
            reqwest::Method::from_bytes(self.auth.refresh_method.as_bytes()).is_ok(),
            "auth.refresh_method 无效: {}",
            self.auth.refresh_method
        );
        ensure_config!(
            !self.auth.header_name.trim().is_empty(),
            "auth.header_name 不能为空"
        );
        ensure_config!(
            (400..=599).contains(&self.auth.expired_status),
            "auth.expired_status 必须是 4xx/5xx 状态码: {}",
            self.auth.expired_status
        );
        if let Some(window) = self.auth.proactive_refresh_seconds {
            ensure_config!(window > 0, "auth.proactive_refresh_seconds 必须大于0");
        }
        Ok(())
    }
}
