//! # 配置管理器
//!
//! 统一的配置加载接口，支持环境变量覆盖

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::ClientConfig;
use crate::error::{ConfigError, ConfigResult};

/// 支持的环境变量覆盖
const ENV_OVERRIDES: &[&str] = &[
    "AUTH_CLIENT_BASE_URL",
    "AUTH_CLIENT_REFRESH_PATH",
    "AUTH_CLIENT_REQUEST_TIMEOUT",
    "AUTH_CLIENT_REFRESH_TIMEOUT",
    "AUTH_CLIENT_LOG_LEVEL",
];

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 配置文件路径
    path: PathBuf,
    /// 当前配置
    config: Arc<RwLock<ClientConfig>>,
    /// 环境变量覆盖映射
    env_overrides: HashMap<String, String>,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 优先使用 `AUTH_CLIENT_CONFIG_PATH`，否则读取 `config/config.{RUST_ENV}.toml`
    pub fn new() -> ConfigResult<Self> {
        let config_file = if let Ok(path) = env::var("AUTH_CLIENT_CONFIG_PATH") {
            path
        } else {
            let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
            format!("config/config.{env}.toml")
        };

        Self::from_file(&config_file)
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(config_path: impl AsRef<Path>) -> ConfigResult<Self> {
        let env_overrides = Self::build_env_overrides();
        Self::from_file_with_overrides(config_path, env_overrides)
    }

    /// 从指定文件创建配置管理器，并使用显式给出的覆盖值
    pub fn from_file_with_overrides(
        config_path: impl AsRef<Path>,
        env_overrides: HashMap<String, String>,
    ) -> ConfigResult<Self> {
        let path = config_path.as_ref().to_path_buf();
        let mut config = Self::load_config_file(&path)?;

        Self::apply_env_overrides(&mut config, &env_overrides)?;
        config.validate()?;

        info!(
            "配置加载完成: {} (环境变量覆盖 {} 个)",
            path.display(),
            env_overrides.len()
        );

        Ok(Self {
            path,
            config: Arc::new(RwLock::new(config)),
            env_overrides,
        })
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> ClientConfig {
        (*self.config.read().await).clone()
    }

    /// 配置文件路径
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 手动重载配置；失败时保留旧配置
    pub async fn reload(&self) -> ConfigResult<()> {
        let mut config = Self::load_config_file(&self.path)?;
        Self::apply_env_overrides(&mut config, &self.env_overrides)?;
        config.validate()?;
        *self.config.write().await = config;
        info!("手动重载配置成功");
        Ok(())
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> ConfigResult<ClientConfig> {
        if !path.exists() {
            return Err(ConfigError::Load(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("读取配置文件失败: {}: {e}", path.display()))
        })?;

        Ok(toml::from_str(&config_content)?)
    }

    /// 构建环境变量覆盖映射
    fn build_env_overrides() -> HashMap<String, String> {
        let overrides: HashMap<String, String> = ENV_OVERRIDES
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| ((*key).to_string(), value)))
            .collect();

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut ClientConfig,
        overrides: &HashMap<String, String>,
    ) -> ConfigResult<()> {
        for (key, value) in overrides {
            debug!("应用环境变量覆盖: {} = {}", key, value);

            match key.as_str() {
                "AUTH_CLIENT_BASE_URL" => config.api.base_url.clone_from(value),
                "AUTH_CLIENT_REFRESH_PATH" => config.auth.refresh_path.clone_from(value),
                "AUTH_CLIENT_REQUEST_TIMEOUT" => {
                    config.api.request_timeout_seconds = value.parse().map_err(|e| {
                        ConfigError::invalid(format!("无效的请求超时: {value}: {e}"))
                    })?;
                }
                "AUTH_CLIENT_REFRESH_TIMEOUT" => {
                    config.auth.refresh_timeout_seconds = value.parse().map_err(|e| {
                        ConfigError::invalid(format!("无效的刷新超时: {value}: {e}"))
                    })?;
                }
                "AUTH_CLIENT_LOG_LEVEL" => config.logging.level.clone_from(value),
                _ => {
                    warn!("未知的配置覆盖，忽略: {}", key);
                }
            }
        }
        Ok(())
    }
}
