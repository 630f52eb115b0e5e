//! 错误类型定义

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 帧大小超限（在上限内未出现分隔符）
    #[error("Frame too large: more than {max} bytes without delimiter")]
    FrameTooLarge { max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
