//! 中继错误类型
//!
//! 会话级错误（名字冲突、满员、找不到用户、命令格式错误、名字非法）只回给发送者，
//! 其 Display 就是线路上 `ERROR: ` 后面的文本。

use protocol::{Message, ProtocolError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum RelayError {
    /// 名字已被占用
    #[error("Usuario ya existe")]
    NameTaken,

    /// 在线人数已达上限
    #[error("Servidor lleno. Maximo {max} usuarios.")]
    ServerFull { max: usize },

    /// 私聊目标不存在
    #[error("Usuario no encontrado")]
    UserNotFound,

    /// `/priv` 缺少目标或正文
    #[error("Comando mal formado")]
    MalformedCommand,

    /// 名字为空、过长或含空白
    #[error("Nombre invalido")]
    InvalidName,

    /// 投递目标的传输已关闭或不可用
    #[error("transport closed: {0}")]
    TransportClosed(String),

    /// 启动时绑定地址失败
    #[error("failed to bind {transport} transport on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// 构造绑定错误
    pub fn bind(transport: &'static str, addr: &str, err: ProtocolError) -> Self {
        let source = match err {
            ProtocolError::Io(e) => e,
            other => std::io::Error::other(other),
        };
        RelayError::Bind {
            transport,
            addr: addr.to_string(),
            source,
        }
    }

    /// 只回给发送者的错误消息
    pub fn notice(&self) -> Message {
        Message::error(self.to_string())
    }
}
