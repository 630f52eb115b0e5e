//! 命令行参数

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, RelayConfig};

/// 多协议文本聊天中继（TCP + UDP）
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML 配置文件，命令行参数覆盖其中的值
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 流式（TCP）监听地址
    #[arg(long)]
    pub stream_host: Option<String>,

    /// 流式（TCP）监听端口，0 表示由系统分配
    #[arg(long)]
    pub stream_port: Option<u16>,

    /// 数据报（UDP）绑定地址
    #[arg(long)]
    pub datagram_host: Option<String>,

    /// 数据报（UDP）绑定端口
    #[arg(long)]
    pub datagram_port: Option<u16>,

    /// 两种传输合计的最大在线人数
    #[arg(long)]
    pub max_capacity: Option<usize>,

    /// 数据报会话无流量多少秒后被移除
    #[arg(long)]
    pub idle_timeout: Option<u64>,
}

impl Cli {
    /// 合并配置文件与命令行参数
    pub fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)?,
            None => RelayConfig::default(),
        };

        if let Some(host) = self.stream_host {
            config.stream.host = host;
        }
        if let Some(port) = self.stream_port {
            config.stream.port = port;
        }
        if let Some(host) = self.datagram_host {
            config.datagram.host = host;
        }
        if let Some(port) = self.datagram_port {
            config.datagram.port = port;
        }
        if let Some(max) = self.max_capacity {
            config.max_capacity = max;
        }
        if let Some(secs) = self.idle_timeout {
            config.datagram.idle_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}
