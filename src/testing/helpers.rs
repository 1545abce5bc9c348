//! # 测试辅助函数
//!
//! 提供通用的测试工具和辅助函数

use serde_json::Value;
use std::io::Write;
use std::sync::Once;
use std::time::Duration;
use tracing::Level;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::{failure_envelope, refresh_envelope};
use crate::config::ClientConfig;
use crate::pipeline::ApiResponse;

static INIT: Once = Once::new();

/// 初始化测试环境
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 指向给定地址的测试配置
#[must_use]
pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::with_base_url(base_url);
    config.auth.refresh_timeout_seconds = 2;
    config.api.request_timeout_seconds = 2;
    config
}

/// 构造 JSON 响应
#[must_use]
pub fn json_response(status: u16, body: &Value) -> ApiResponse {
    ApiResponse::json_value(
        reqwest::StatusCode::from_u16(status).unwrap_or(reqwest::StatusCode::OK),
        body,
    )
}

/// 写入临时配置文件
pub fn write_temp_config(contents: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// 挂载成功的刷新端点
pub async fn mount_refresh_success(server: &MockServer, access_token: &str, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refresh_envelope(access_token))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// 挂载失败的刷新端点
pub async fn mount_refresh_failure(server: &MockServer, status: u16, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(failure_envelope(i64::from(status), "Refresh token expired"))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// 已记录的刷新调用次数
pub async fn refresh_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/api/auth/refresh")
        .count()
}

/// 断言错误类型
#[macro_export]
macro_rules! assert_error_type {
    ($result:expr, $error_type:pat) => {
        match $result {
            Err($error_type) => (),
            Err(other) => panic!("Expected error type, got: {:?}", other),
            Ok(val) => panic!("Expected error, got Ok: {:?}", val),
        }
    };
}
