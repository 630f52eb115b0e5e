//! 流式会话处理
//!
//! 每个 TCP 连接一个任务，状态机:
//! ```text
//! AwaitingName ──注册成功──▶ Active ──退出/断开/错误──▶ Closed
//!       └──────────满员/重名/超时───────────────────────▲
//! ```
//! 写入端由独立的写任务独占，其他会话通过有界队列投递，不会被慢速对端阻塞。

use std::net::SocketAddr;
use std::time::Duration;

use protocol::{
    Connection, FrameReader, FrameWriter, Message, ProtocolError, TcpListener, Transport,
    TransportListener, NAME_PROMPT,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::registry::SessionHandle;
use crate::relay::Context;
use crate::router::Delivery;

/// 每个会话的发送队列长度（帧）
const OUTBOUND_QUEUE: usize = 64;

/// 会话结束后等待写任务刷完队列的上限
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// accept 失败后的退避
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 流式传输监听器
pub struct StreamServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Context,
    handshake_timeout: Duration,
}

impl StreamServer {
    /// 绑定监听地址，失败即启动失败
    pub async fn bind(
        addr: &str,
        ctx: Context,
        handshake_timeout: Duration,
    ) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::bind("stream", addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::bind("stream", addr, e))?;
        Ok(Self {
            listener,
            local_addr,
            ctx,
            handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 接受连接，每个连接派生独立任务
    pub async fn run(self) {
        info!("Stream transport listening on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok(transport) => {
                    let ctx = self.ctx.clone();
                    let handshake_timeout = self.handshake_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(transport, ctx, handshake_timeout).await {
                            debug!("Stream session error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// 会话状态
#[derive(Debug, PartialEq, Eq)]
enum SessionState {
    AwaitingName,
    Active { name: String },
    Closed,
}

impl SessionState {
    fn activate(&mut self, name: String) {
        if *self == SessionState::AwaitingName {
            *self = SessionState::Active { name };
        }
    }

    /// 转入 Closed；只有从 Active 转入的那一次返回名字
    fn close(&mut self) -> Option<String> {
        match std::mem::replace(self, SessionState::Closed) {
            SessionState::Active { name } => Some(name),
            _ => None,
        }
    }
}

/// 处理单个流式连接
pub async fn handle_connection<T: Transport>(
    transport: T,
    ctx: Context,
    handshake_timeout: Duration,
) -> anyhow::Result<()> {
    let peer = transport.peer_addr()?;
    let mut conn = Connection::new(transport);
    let mut state = SessionState::AwaitingName;

    debug!("New stream connection from {}", peer);
    conn.prompt(NAME_PROMPT).await?;

    // 握手：读取一帧作为名字
    let name = match timeout(handshake_timeout, conn.recv()).await {
        Ok(Ok(line)) => line.trim().to_string(),
        Ok(Err(e)) => {
            debug!("Handshake from {} failed: {}", peer, e);
            return Ok(());
        }
        Err(_) => {
            debug!("Handshake timeout for {}", peer);
            conn.shutdown().await?;
            return Ok(());
        }
    };

    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let handle = match ctx
        .registry
        .register(&name, SessionHandle::Stream { tx, peer })
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            info!("Rejected stream session {:?} from {}: {}", name, peer, e);
            conn.send(&e.notice().render()).await?;
            conn.shutdown().await?;
            return Ok(());
        }
    };
    state.activate(name.clone());
    let online = ctx.registry.len().await;
    info!("{} connected from {} (stream), {} online", name, peer, online);

    // 握手时多读到的数据留在读取器缓冲中，不会丢失
    let (mut reader, writer) = conn.split();
    let mut writer_task = tokio::spawn(write_loop(writer, rx));
    ctx.broadcaster
        .broadcast(&Message::join(&name), Some(name.as_str()))
        .await;

    // 写任务先结束说明写端已失效，会话同样走离开流程
    let mut writer_done = false;
    let result = tokio::select! {
        result = read_loop(&mut reader, &ctx, &name, &handle) => result,
        _ = &mut writer_task => {
            warn!("Writer for {} stopped, closing session", name);
            writer_done = true;
            Ok(())
        }
    };

    leave(&mut state, &ctx).await;

    // 注册表和本地都不再持有发送端后，写任务刷完队列自行退出
    drop(handle);
    if !writer_done && timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        warn!("Writer for {} did not drain in time", name);
        writer_task.abort();
    }

    result
}

/// Active 状态下的读循环，正常退出（/salir 或对端关闭）返回 Ok
async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut FrameReader<R>,
    ctx: &Context,
    name: &str,
    handle: &SessionHandle,
) -> anyhow::Result<()> {
    loop {
        match reader.read_frame().await {
            Ok(line) => match ctx.router.route(name, &line).await {
                Delivery::Quit => {
                    debug!("{} requested quit", name);
                    return Ok(());
                }
                delivery => ctx.broadcaster.deliver(name, handle, delivery).await,
            },
            Err(ProtocolError::ConnectionClosed) => {
                debug!("{} closed the connection", name);
                return Ok(());
            }
            Err(e) => {
                warn!("Error receiving from {}: {}", name, e);
                return Err(e.into());
            }
        }
    }
}

/// 离开流程：注销并通知其他人，多次调用只生效一次
async fn leave(state: &mut SessionState, ctx: &Context) {
    let Some(name) = state.close() else {
        return;
    };
    if let Some(session) = ctx.registry.unregister(&name).await {
        info!(
            "{} disconnected (stream), joined at {}",
            session.name,
            session.joined_at.format("%H:%M:%S")
        );
        ctx.broadcaster.broadcast(&Message::leave(&name), None).await;
    }
}

/// 写任务：按顺序写出队列中的帧，所有发送端释放后关闭写端
///
/// 写失败时立即返回，由 [`handle_connection`] 据此结束会话。
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<String>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_frame(&frame).await {
            debug!("Write failed: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}
