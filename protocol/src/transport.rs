//! 传输层抽象
//!
//! 流式会话处理只依赖 Transport trait，具体使用 TCP。
//! 数据报传输没有连接概念，直接由服务端持有 UdpSocket，不在此抽象。
//!
//! 服务端只用到监听、`peer_addr` 和 `split`。客户端一侧（[`Transport::connect`]、
//! [`TransportConfig`] 及连接超时）供基于本 crate 编写的外部客户端使用。

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ProtocolError, Result};
use crate::CONNECT_TIMEOUT;

/// 传输层配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 是否禁用 Nagle 算法（TCP nodelay）
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

/// 可靠字节流传输
pub trait Transport: Send + Sync + Sized {
    /// 读取端类型
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// 写入端类型
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// 建立连接（客户端使用）
    ///
    /// # Arguments
    /// * `addr` - 服务器地址，格式为 "host:port"
    /// * `config` - 传输配置
    fn connect(
        addr: &str,
        config: &TransportConfig,
    ) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 对端地址
    fn peer_addr(&self) -> Result<SocketAddr>;

    /// 分离读写端，写入端可交给独立的写任务
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 传输层监听器（服务端使用）
pub trait TransportListener: Send + Sync + Sized {
    /// 对应的传输类型
    type Transport: Transport;

    /// 绑定地址并开始监听
    fn bind(addr: &str) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 接受新连接
    fn accept(&self) -> impl std::future::Future<Output = Result<Self::Transport>> + Send;

    /// 实际绑定的地址（绑定端口 0 时可获知系统分配的端口）
    fn local_addr(&self) -> Result<SocketAddr>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 传输实现
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    async fn connect(addr: &str, config: &TransportConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;

        stream.set_nodelay(config.nodelay)?;

        Ok(Self { stream })
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}

impl TcpTransport {
    /// 从已有的 TcpStream 创建（服务端 accept 后使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        // 聊天消息短小，关闭 Nagle 减少延迟
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

/// TCP 监听器实现
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

impl TransportListener for TcpListener {
    type Transport = TcpTransport;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    async fn accept(&self) -> Result<TcpTransport> {
        let (stream, _addr) = self.listener.accept().await?;
        TcpTransport::from_stream(stream)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_listener_bind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_tcp_connect_and_accept() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_handle = tokio::spawn(async move {
            TcpTransport::connect(&addr.to_string(), &TransportConfig::default()).await
        });

        let server_transport = listener.accept().await.unwrap();
        let client_transport = client_handle.await.unwrap().unwrap();

        // 服务端看到的对端地址就是客户端的本地地址
        assert_eq!(
            server_transport.peer_addr().unwrap(),
            client_transport.stream.local_addr().unwrap()
        );
    }

    #[tokio::test]
    async fn test_bind_in_use_fails() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap();
        assert!(TcpListener::bind(&addr.to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::connect(&addr.to_string(), &TransportConfig::default()).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}
