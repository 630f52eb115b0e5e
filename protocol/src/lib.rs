//! 聊天中继共享协议库
//!
//! 包含:
//! - 命令语法 (Command)
//! - 消息模型与线路格式 (Message, MessageKind)
//! - 传输层抽象 (Transport trait)
//! - 换行分帧编解码 (Codec)
//! - 连接封装 (Connection)

mod command;
mod message;
mod constants;
mod transport;
mod codec;
mod connection;
mod error;

pub use command::Command;
pub use message::{timestamp_now, Message, MessageKind};
pub use constants::*;
pub use transport::{Transport, TransportListener, TransportConfig, TcpTransport, TcpListener};
pub use codec::{FrameReader, FrameWriter};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
