//! # 配置管理模块
//!
//! 处理客户端配置加载、验证和管理

mod app_config;
mod manager;

pub use app_config::{ApiConfig, AuthConfig, ClientConfig, LoggingConfig};
pub use manager::ConfigManager;
