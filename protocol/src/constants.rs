//! 协议常量定义

use std::time::Duration;

/// 帧分隔符
pub const FRAME_DELIMITER: u8 = b'\n';

/// 流式连接建立后发送的名字提示（不带分隔符）
pub const NAME_PROMPT: &str = "Name: ";

/// 退出命令
pub const QUIT_COMMAND: &str = "/salir";

/// 私聊命令
pub const PRIVATE_COMMAND: &str = "/priv";

/// 名字最大长度（字节）
pub const MAX_NAME_LEN: usize = 20;

/// 单条消息帧最大大小（不含分隔符）
pub const MAX_FRAME_SIZE: usize = 8192;

/// 数据报接收缓冲区大小
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// 默认最大在线人数
pub const DEFAULT_MAX_CAPACITY: usize = 5;

/// 流式传输默认地址
pub const DEFAULT_STREAM_HOST: &str = "127.0.0.1";
pub const DEFAULT_STREAM_PORT: u16 = 5000;

/// 数据报传输默认地址
pub const DEFAULT_DATAGRAM_HOST: &str = "127.0.0.1";
pub const DEFAULT_DATAGRAM_PORT: u16 = 6000;

/// 握手超时（秒）- 连接后必须在此时间内发送名字
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;

/// 数据报会话空闲超时（秒）
pub const IDLE_TIMEOUT_SECS: u64 = 300;

/// 空闲清理扫描间隔（秒）
pub const SWEEP_INTERVAL_SECS: u64 = 5;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 时间戳格式: dd/mm/yyyy hh:mm:ss AM|PM
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %I:%M:%S %p";
