//! # 日志配置模块
//!
//! 提供统一的结构化日志宏与日志系统初始化。
//! 所有日志事件都携带 `request_id`、`stage`、`component`、`operation` 四个固定字段，
//! 便于按请求追踪一次刷新周期内的全部事件。

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStage {
    /// 启动
    Startup,
    /// 配置加载
    Configuration,
    /// 附加凭证
    Authentication,
    /// 发送请求
    RequestSend,
    /// 接收响应
    ResponseReceive,
    /// 令牌刷新
    TokenRefresh,
    /// 凭证过期后的重放
    Retry,
    /// 会话登录/登出
    Session,
    /// 关闭
    Shutdown,
}

impl LogStage {
    /// 日志字段中使用的名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::RequestSend => "request_send",
            Self::ResponseReceive => "response_receive",
            Self::TokenRefresh => "token_refresh",
            Self::Retry => "retry",
            Self::Session => "session",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogComponent {
    /// 主程序
    Main,
    /// 配置管理
    Config,
    /// 凭证存储
    CredentialStore,
    /// 请求认证器
    Authenticator,
    /// 刷新执行器
    RefreshExecutor,
    /// 刷新协调器
    RefreshCoordinator,
    /// 请求管道
    Pipeline,
    /// 传输层
    Transport,
    /// 会话管理
    Session,
    /// 客户端门面
    Client,
}

impl LogComponent {
    /// 日志字段中使用的名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::CredentialStore => "credential_store",
            Self::Authenticator => "authenticator",
            Self::RefreshExecutor => "refresh_executor",
            Self::RefreshCoordinator => "refresh_coordinator",
            Self::Pipeline => "pipeline",
            Self::Transport => "transport",
            Self::Session => "session",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 info 日志
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用传入级别，并把本 crate 提升到 debug。
/// 重复初始化（例如测试中）会被静默忽略。
pub fn init_optimized_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let default_filter = format!("{level},api_auth_client=debug,reqwest=warn,hyper=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                          # 标准日志级别");
    println!("  RUST_LOG=debug                         # 调试级别");
    println!("  RUST_LOG=api_auth_client=trace         # 客户端详细追踪");
    println!("  RUST_LOG=info,reqwest=debug            # 查看底层 HTTP 连接");
}
