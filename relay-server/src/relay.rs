//! 中继进程
//!
//! 同时运行流式监听和数据报循环，两者共用一个注册表。

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use protocol::Message;
use tracing::info;

use crate::broadcaster::Broadcaster;
use crate::config::RelayConfig;
use crate::datagram::DatagramServer;
use crate::error::RelayError;
use crate::registry::Registry;
use crate::router::Router;
use crate::stream::StreamServer;

/// 关闭时发给所有会话的通知
const SHUTDOWN_NOTICE: &str = "Servidor cerrando";

/// 关闭通知发出后留给写任务刷新的时间
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// 会话处理共用的状态
#[derive(Debug, Clone)]
pub struct Context {
    pub registry: Arc<Registry>,
    pub router: Router,
    pub broadcaster: Broadcaster,
}

impl Context {
    pub fn new(max_capacity: usize) -> Self {
        let registry = Arc::new(Registry::new(max_capacity));
        Self {
            router: Router::new(Arc::clone(&registry)),
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
        }
    }
}

/// 中继
pub struct Relay {
    stream: StreamServer,
    datagram: DatagramServer,
    ctx: Context,
}

impl Relay {
    /// 绑定两种传输，任一失败则整体启动失败
    pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let ctx = Context::new(config.max_capacity);
        let stream = StreamServer::bind(
            &config.stream.address(),
            ctx.clone(),
            config.stream.handshake_timeout(),
        )
        .await?;
        let datagram = DatagramServer::bind(
            &config.datagram.address(),
            ctx.clone(),
            config.datagram.idle_timeout(),
            config.datagram.sweep_interval(),
        )
        .await?;

        Ok(Self {
            stream,
            datagram,
            ctx,
        })
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream.local_addr()
    }

    pub fn datagram_addr(&self) -> SocketAddr {
        self.datagram.local_addr()
    }

    /// 运行直到 `shutdown` 完成，然后通知所有会话
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let Relay {
            stream,
            datagram,
            ctx,
        } = self;

        info!(
            "Relay running (capacity {})",
            ctx.registry.max_capacity()
        );

        tokio::select! {
            _ = stream.run() => {}
            _ = datagram.run() => {}
            _ = shutdown => {
                info!("Received shutdown signal, closing relay...");
            }
        }

        let notified = ctx
            .broadcaster
            .broadcast(&Message::notice(SHUTDOWN_NOTICE), None)
            .await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        info!("Relay shutdown complete, {} sessions notified", notified);
    }
}
