//! 消息路由
//!
//! 把一行原始文本解析为命令并决定投递计划，自身不做任何 I/O。

use std::sync::Arc;

use protocol::{Command, Message};

use crate::error::RelayError;
use crate::registry::{Registry, SessionHandle};

/// 投递计划
#[derive(Debug)]
pub enum Delivery {
    /// 空行，什么也不做
    Ignore,
    /// 发送者请求断开
    Quit,
    /// 发给除发送者外的所有人
    Broadcast(Message),
    /// 发给一个目标，并给发送者回执
    Private {
        target: String,
        to: SessionHandle,
        message: Message,
    },
    /// 只回给发送者（会话级错误）
    Reply(Message),
}

#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// 为 `sender` 发来的一行文本生成投递计划
    pub async fn route(&self, sender: &str, line: &str) -> Delivery {
        match Command::parse(line) {
            Command::Empty => Delivery::Ignore,
            Command::Quit => Delivery::Quit,
            Command::Broadcast { body } => Delivery::Broadcast(Message::broadcast(sender, body)),
            Command::Malformed => Delivery::Reply(RelayError::MalformedCommand.notice()),
            Command::Private { target, body } => match self.registry.lookup(&target).await {
                Some(to) => Delivery::Private {
                    message: Message::private(sender, &target, body),
                    target,
                    to,
                },
                None => Delivery::Reply(RelayError::UserNotFound.notice()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::stream_handle;
    use protocol::MessageKind;

    async fn router_with(names: &[&str]) -> Router {
        let registry = Arc::new(Registry::new(5));
        for (i, name) in names.iter().enumerate() {
            let (handle, _rx) = stream_handle(i as u16);
            registry.register(name, handle).await.unwrap();
        }
        Router::new(registry)
    }

    #[tokio::test]
    async fn test_route_broadcast() {
        let router = router_with(&["alice"]).await;
        match router.route("alice", "hello").await {
            Delivery::Broadcast(msg) => {
                assert_eq!(msg.kind, MessageKind::Broadcast);
                assert_eq!(msg.sender.as_deref(), Some("alice"));
                assert_eq!(msg.body, "hello");
            }
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_private_to_known_user() {
        let router = router_with(&["alice", "bob"]).await;
        match router.route("alice", "/priv bob hola que tal").await {
            Delivery::Private {
                target,
                to,
                message,
            } => {
                assert_eq!(target, "bob");
                assert_eq!(to.peer().port(), 1);
                assert_eq!(
                    message.kind,
                    MessageKind::Private {
                        target: "bob".to_string()
                    }
                );
                assert_eq!(message.body, "hola que tal");
            }
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_private_unknown_user() {
        let router = router_with(&["alice"]).await;
        match router.route("alice", "/priv ghost hi").await {
            Delivery::Reply(msg) => assert_eq!(msg.render(), "ERROR: Usuario no encontrado"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_route_malformed_quit_and_empty() {
        let router = router_with(&["alice"]).await;
        match router.route("alice", "/priv bob").await {
            Delivery::Reply(msg) => assert_eq!(msg.render(), "ERROR: Comando mal formado"),
            other => panic!("unexpected delivery: {other:?}"),
        }
        assert!(matches!(router.route("alice", "/salir").await, Delivery::Quit));
        assert!(matches!(router.route("alice", "  ").await, Delivery::Ignore));
    }
}
