//! # API Auth Client 命令行
//!
//! 通过完整的认证管道发出单个请求，打印状态码与响应体

use std::path::PathBuf;
use std::process::ExitCode;

use api_auth_client::{
    ApiRequest, AuthClient, ConfigManager, lerror, linfo,
    logging::{self, LogComponent, LogStage},
};
use clap::Parser;
use reqwest::Method;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(name = "api-auth-client", version, about = "带自动令牌刷新的 API 客户端")]
struct Cli {
    /// 配置文件路径（默认 `AUTH_CLIENT_CONFIG_PATH` 或 `config/config.{RUST_ENV}.toml`）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 初始访问令牌
    #[arg(short, long)]
    token: Option<String>,

    /// 会话 Cookie 的值（用于刷新）
    #[arg(long)]
    session_cookie: Option<String>,

    /// JSON 请求体
    #[arg(short, long)]
    data: Option<String>,

    /// 无需认证的请求
    #[arg(long)]
    public: bool,

    /// 日志级别，覆盖配置文件
    #[arg(long)]
    log_level: Option<String>,

    /// 打印日志配置指南后退出
    #[arg(long)]
    logging_help: bool,

    /// HTTP 方法
    #[arg(default_value = "GET")]
    method: String,

    /// 请求路径
    #[arg(default_value = "/")]
    path: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.logging_help {
        logging::print_logging_help();
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Main,
                "request_failed",
                &format!("请求失败: {e:#}")
            );
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::new(),
    }
    .map_err(|e| anyhow::anyhow!("配置加载失败: {e}"))?;
    let config = manager.get_config().await;

    logging::init_optimized_logging(Some(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
    ));
    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Main,
        "config_loaded",
        &format!("使用配置文件: {}", manager.path().display())
    );

    let mut builder = AuthClient::builder(config);
    if let Some(cookie) = cli.session_cookie {
        builder = builder.session_cookie(cookie);
    }
    let client = builder.build()?;
    if let Some(token) = cli.token {
        client.login(token);
    }

    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())
        .map_err(|e| anyhow::anyhow!("无效的 HTTP 方法 {}: {e}", cli.method))?;
    let mut request = ApiRequest::new(method, cli.path);
    if cli.public {
        request = request.public();
    }
    if let Some(data) = cli.data {
        let body: serde_json::Value = serde_json::from_str(&data)?;
        request = request.json(&body)?;
    }

    let response = client.issue(request).await?;
    println!("{}", response.status);
    println!("{}", response.text());

    let stats = client.stats();
    if stats.episodes_started > 0 {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "refresh_stats",
            &format!("刷新统计: {}", serde_json::to_string(&stats)?)
        );
    }
    Ok(())
}
