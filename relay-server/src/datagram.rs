//! 数据报会话处理
//!
//! 没有连接概念：单个接收循环按发送地址区分会话。未知地址的第一个数据报是注册名字，
//! 之后的数据报都是消息。会话不会主动断开，靠 `last_seen` 判断活跃度并清理空闲会话。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use protocol::{Message, MAX_DATAGRAM_SIZE};
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::registry::SessionHandle;
use crate::relay::Context;
use crate::router::Delivery;

/// 已注册的数据报对端
#[derive(Debug)]
struct Peer {
    name: String,
    last_seen: Instant,
}

/// 数据报传输循环，单一任务独占对端表
pub struct DatagramServer {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    ctx: Context,
    peers: HashMap<SocketAddr, Peer>,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl DatagramServer {
    /// 绑定地址，失败即启动失败
    pub async fn bind(
        addr: &str,
        ctx: Context,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Result<Self, RelayError> {
        let bind_error = |source| RelayError::Bind {
            transport: "datagram",
            addr: addr.to_string(),
            source,
        };
        let socket = UdpSocket::bind(addr).await.map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
            ctx,
            peers: HashMap::new(),
            idle_timeout,
            sweep_interval,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 一次处理一个数据报，定期清理空闲会话
    pub async fn run(mut self) {
        info!("Datagram transport listening on {}", self.local_addr);

        let socket = Arc::clone(&self.socket);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut sweep = interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((n, addr)) => self.handle_datagram(addr, &buf[..n], Instant::now()).await,
                        // 某些平台上对端端口不可达会在这里以错误形式报告
                        Err(e) => warn!("Datagram receive error: {}", e),
                    }
                }
                now = sweep.tick() => {
                    self.evict_idle(now).await;
                }
            }
        }
    }

    /// 处理一个数据报
    async fn handle_datagram(&mut self, addr: SocketAddr, payload: &[u8], now: Instant) {
        let text = String::from_utf8_lossy(payload);
        let text = text.trim();

        let name = match self.peers.get_mut(&addr) {
            Some(peer) => {
                peer.last_seen = now;
                peer.name.clone()
            }
            None => {
                self.register(addr, text, now).await;
                return;
            }
        };

        let handle = self.handle_for(addr);
        match self.ctx.router.route(&name, text).await {
            Delivery::Quit => {
                self.depart(addr, "quit").await;
            }
            delivery => self.ctx.broadcaster.deliver(&name, &handle, delivery).await,
        }
    }

    /// 未知地址的第一个数据报：注册
    async fn register(&mut self, addr: SocketAddr, name: &str, now: Instant) {
        match self.ctx.registry.register(name, self.handle_for(addr)).await {
            Ok(_) => {
                self.peers.insert(
                    addr,
                    Peer {
                        name: name.to_string(),
                        last_seen: now,
                    },
                );
                let online = self.ctx.registry.len().await;
                info!("{} connected from {} (datagram), {} online", name, addr, online);
                self.ctx
                    .broadcaster
                    .broadcast(&Message::join(name), Some(name))
                    .await;
            }
            Err(e) => {
                info!("Rejected datagram session {:?} from {}: {}", name, addr, e);
                self.ctx
                    .broadcaster
                    .unicast(name, &self.handle_for(addr), &e.notice().render());
            }
        }
    }

    /// 清理空闲超过 idle_timeout 的会话，返回被清理的名字
    async fn evict_idle(&mut self, now: Instant) -> Vec<String> {
        let expired: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, peer)| now.saturating_duration_since(peer.last_seen) >= self.idle_timeout)
            .map(|(addr, _)| *addr)
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for addr in expired {
            if let Some(name) = self.depart(addr, "idle timeout").await {
                evicted.push(name);
            }
        }
        evicted
    }

    /// 离开流程：移出对端表、注销并通知其他人
    async fn depart(&mut self, addr: SocketAddr, reason: &str) -> Option<String> {
        let peer = self.peers.remove(&addr)?;
        if let Some(session) = self.ctx.registry.unregister(&peer.name).await {
            info!(
                "{} disconnected from {} (datagram, {}), joined at {}",
                session.name,
                addr,
                reason,
                session.joined_at.format("%H:%M:%S")
            );
            self.ctx
                .broadcaster
                .broadcast(&Message::leave(&peer.name), None)
                .await;
        } else {
            debug!("{} was already unregistered", peer.name);
        }
        Some(peer.name)
    }

    fn handle_for(&self, addr: SocketAddr) -> SessionHandle {
        SessionHandle::Datagram {
            socket: Arc::clone(&self.socket),
            addr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const IDLE: Duration = Duration::from_secs(60);

    async fn server(capacity: usize) -> DatagramServer {
        DatagramServer::bind(
            "127.0.0.1:0",
            Context::new(capacity),
            IDLE,
            Duration::from_secs(1),
        )
        .await
        .unwrap()
    }

    async fn client() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv(socket: &UdpSocket) -> String {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let n = timeout(Duration::from_secs(2), socket.recv(&mut buf))
            .await
            .expect("timed out waiting for a datagram")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    async fn nothing_pending(socket: &UdpSocket) -> bool {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        timeout(Duration::from_millis(100), socket.recv(&mut buf))
            .await
            .is_err()
    }

    #[tokio::test]
    async fn test_first_datagram_registers() {
        let mut server = server(5).await;
        let (alice, alice_addr) = client().await;
        let (bob, bob_addr) = client().await;
        let now = Instant::now();

        server.handle_datagram(alice_addr, b"alice\n", now).await;
        server.handle_datagram(bob_addr, b"bob", now).await;
        assert_eq!(server.ctx.registry.len().await, 2);
        assert_eq!(recv(&alice).await, "*** bob se unio al chat ***");

        server.handle_datagram(alice_addr, b"hola", now).await;
        let line = recv(&bob).await;
        assert!(line.starts_with("[alice] [Fecha:"));
        assert!(line.ends_with("] hola"));
        assert!(nothing_pending(&alice).await);
    }

    #[tokio::test]
    async fn test_registration_rejected_when_full() {
        let mut server = server(1).await;
        let (_alice, alice_addr) = client().await;
        let (bob, bob_addr) = client().await;
        let now = Instant::now();

        server.handle_datagram(alice_addr, b"alice", now).await;
        server.handle_datagram(bob_addr, b"bob", now).await;
        assert_eq!(recv(&bob).await, "ERROR: Servidor lleno. Maximo 1 usuarios.");
        assert!(!server.peers.contains_key(&bob_addr));

        // 被拒绝的地址下一个数据报仍按注册处理
        server.ctx.registry.unregister("alice").await;
        server.peers.remove(&alice_addr);
        server.handle_datagram(bob_addr, b"bob", now).await;
        assert!(server.ctx.registry.lookup("bob").await.is_some());
    }

    #[tokio::test]
    async fn test_name_taken() {
        let mut server = server(5).await;
        let (_first, first_addr) = client().await;
        let (second, second_addr) = client().await;
        let now = Instant::now();

        server.handle_datagram(first_addr, b"alice", now).await;
        server.handle_datagram(second_addr, b"alice", now).await;
        assert_eq!(recv(&second).await, "ERROR: Usuario ya existe");
        assert_eq!(server.peers.len(), 1);
    }

    #[tokio::test]
    async fn test_private_and_unknown_target() {
        let mut server = server(5).await;
        let (alice, alice_addr) = client().await;
        let (bob, bob_addr) = client().await;
        let now = Instant::now();

        server.handle_datagram(alice_addr, b"alice", now).await;
        server.handle_datagram(bob_addr, b"bob", now).await;
        recv(&alice).await; // bob 的加入通知

        server.handle_datagram(alice_addr, b"/priv bob psst", now).await;
        assert!(recv(&bob).await.ends_with("[PRIVADO de alice] psst"));
        assert!(recv(&alice).await.starts_with("[PRIVADO para bob] [Fecha:"));

        server.handle_datagram(alice_addr, b"/priv ghost hi", now).await;
        assert_eq!(recv(&alice).await, "ERROR: Usuario no encontrado");
        assert!(nothing_pending(&bob).await);
    }

    #[tokio::test]
    async fn test_quit_frees_slot() {
        let mut server = server(5).await;
        let (alice, alice_addr) = client().await;
        let (_bob, bob_addr) = client().await;
        let now = Instant::now();

        server.handle_datagram(alice_addr, b"alice", now).await;
        server.handle_datagram(bob_addr, b"bob", now).await;
        recv(&alice).await;

        server.handle_datagram(bob_addr, b"/salir", now).await;
        assert_eq!(recv(&alice).await, "*** bob salio del chat ***");
        assert!(server.ctx.registry.lookup("bob").await.is_none());
        assert!(!server.peers.contains_key(&bob_addr));
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let mut server = server(2).await;
        let (alice, alice_addr) = client().await;
        let (_bob, bob_addr) = client().await;
        let start = Instant::now();

        server.handle_datagram(alice_addr, b"alice", start).await;
        server.handle_datagram(bob_addr, b"bob", start).await;
        recv(&alice).await;

        // alice 之后还有活动，bob 一直沉默
        server
            .handle_datagram(alice_addr, b"sigo aqui", start + IDLE / 2)
            .await;

        assert!(server.evict_idle(start + IDLE / 2).await.is_empty());

        let evicted = server.evict_idle(start + IDLE).await;
        assert_eq!(evicted, vec!["bob".to_string()]);
        assert_eq!(recv(&alice).await, "*** bob salio del chat ***");
        assert_eq!(server.ctx.registry.len().await, 1);

        // 空出的名额可以重新使用
        let (_carol, carol_addr) = client().await;
        server.handle_datagram(carol_addr, b"carol", start + IDLE).await;
        assert!(server.ctx.registry.lookup("carol").await.is_some());
    }
}
