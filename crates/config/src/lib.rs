//! 统一配置中心
//!
//! 提供中继服务的全局配置管理，包括：
//! - 监听地址与静态资源目录
//! - 房间存储（SQLite）
//! - 广播分发队列
//! - 心跳与空房间回收
//!
//! 加载顺序：默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> `APP_*` 环境变量。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 广播分发配置
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// 心跳配置
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// 安全配置
    #[serde(default)]
    pub security: SecurityConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 浏览器客户端目录，相对路径按工作目录解析（仓库自带 `static/`）
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: "static".to_string(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://chat.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// 分发队列满时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 拒绝新消息，错误返回给发送方
    #[default]
    RejectNew,
    /// 丢弃队列中最旧的一条
    DropOldest,
}

/// 广播器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub write_timeout_ms: u64,
}

impl DispatchConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow: OverflowPolicy::RejectNew,
            write_timeout_ms: 5_000,
        }
    }
}

/// 心跳与空房间回收配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub ping_interval_secs: u64,
    pub idle_timeout_secs: u64,
    /// 通过 HTTP 创建但一直没人加入的房间的保留时间
    pub empty_room_ttl_secs: u64,
}

impl HeartbeatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn empty_room_ttl(&self) -> Duration {
        Duration::from_secs(self.empty_room_ttl_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            idle_timeout_secs: 90,
            empty_room_ttl_secs: 300,
        }
    }
}

/// 安全配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub bcrypt_cost: Option<u32>,
}

impl AppConfig {
    /// 默认值 + 可选配置文件 + 环境变量
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.capacity == 0 {
            return Err(ConfigError::InvalidDispatchConfig(
                "dispatch capacity must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidDispatchConfig(
                "write timeout must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat.ping_interval_secs == 0 {
            return Err(ConfigError::InvalidHeartbeatConfig(
                "ping interval must be greater than 0".to_string(),
            ));
        }

        // 空闲超时必须覆盖至少一个 ping 周期，否则健康连接也会被踢掉
        if self.heartbeat.idle_timeout_secs <= self.heartbeat.ping_interval_secs {
            return Err(ConfigError::InvalidHeartbeatConfig(
                "idle timeout must be longer than the ping interval".to_string(),
            ));
        }

        if let Some(cost) = self.security.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidServerConfig(
                    "bcrypt cost must be between 4 and 31".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid dispatch configuration: {0}")]
    InvalidDispatchConfig(String),
    #[error("Invalid heartbeat configuration: {0}")]
    InvalidHeartbeatConfig(String),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}
