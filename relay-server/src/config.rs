//! 配置加载
//!
//! 所有字段都有默认值，TOML 文件只需写出要覆盖的部分:
//! ```toml
//! max_capacity = 5
//!
//! [stream]
//! host = "127.0.0.1"
//! port = 5000
//!
//! [datagram]
//! port = 6000
//! idle_timeout_secs = 300
//! ```

use std::path::Path;
use std::time::Duration;

use protocol::{
    DEFAULT_DATAGRAM_HOST, DEFAULT_DATAGRAM_PORT, DEFAULT_MAX_CAPACITY, DEFAULT_STREAM_HOST,
    DEFAULT_STREAM_PORT, HANDSHAKE_TIMEOUT_SECS, IDLE_TIMEOUT_SECS, SWEEP_INTERVAL_SECS,
};
use serde::Deserialize;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// 中继配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 两种传输合计的最大在线人数
    pub max_capacity: usize,
    /// 流式（TCP）传输
    pub stream: StreamConfig,
    /// 数据报（UDP）传输
    pub datagram: DatagramConfig,
}

/// 流式传输配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    /// 连接后必须在此时间内发送名字
    pub handshake_timeout_secs: u64,
}

/// 数据报传输配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatagramConfig {
    pub host: String,
    pub port: u16,
    /// 超过此时间没有收到数据报的会话会被清理
    pub idle_timeout_secs: u64,
    /// 空闲清理扫描间隔
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            stream: StreamConfig::default(),
            datagram: DatagramConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STREAM_HOST.to_string(),
            port: DEFAULT_STREAM_PORT,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DATAGRAM_HOST.to_string(),
            port: DEFAULT_DATAGRAM_PORT,
            idle_timeout_secs: IDLE_TIMEOUT_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

impl RelayConfig {
    /// 从 TOML 文件加载配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_capacity == 0 {
            return Err(ConfigError::Invalid("max_capacity must be at least 1".into()));
        }
        if self.stream.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream.handshake_timeout_secs must be positive".into(),
            ));
        }
        if self.datagram.idle_timeout_secs == 0 || self.datagram.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "datagram timeouts must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl StreamConfig {
    /// 监听地址 "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl DatagramConfig {
    /// 监听地址 "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
