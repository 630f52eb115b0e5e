//! 消息扇出
//!
//! 广播在注册表快照上进行，单个接收者失败只记录日志，不影响其他接收者。

use std::sync::Arc;

use protocol::Message;
use tracing::{debug, warn};

use crate::registry::{Registry, SessionHandle};
use crate::router::Delivery;

#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// 发给快照中除 `exclude` 外的所有会话，返回成功投递的数量
    pub async fn broadcast(&self, message: &Message, exclude: Option<&str>) -> usize {
        let frame = message.render();
        let recipients = self.registry.snapshot().await;

        let mut delivered = 0;
        for (name, handle) in recipients {
            if Some(name.as_str()) == exclude {
                continue;
            }
            if self.unicast(&name, &handle, &frame) {
                delivered += 1;
            }
        }
        delivered
    }

    /// 单播一帧，失败只记录日志
    pub fn unicast(&self, name: &str, handle: &SessionHandle, frame: &str) -> bool {
        match handle.deliver(frame) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to deliver to {} ({} {}): {}",
                    name,
                    handle.transport(),
                    handle.peer(),
                    e
                );
                false
            }
        }
    }

    /// 执行路由给出的投递计划
    ///
    /// `reply_to` 是发送者自己的出口，用于回执和错误。
    pub async fn deliver(&self, sender: &str, reply_to: &SessionHandle, delivery: Delivery) {
        match delivery {
            Delivery::Ignore | Delivery::Quit => {}
            Delivery::Broadcast(message) => {
                let delivered = self.broadcast(&message, Some(sender)).await;
                debug!("{} broadcast to {} sessions", sender, delivered);
            }
            Delivery::Private {
                target,
                to,
                message,
            } => {
                self.unicast(&target, &to, &message.render());
                if let Some(confirmation) = message.render_confirmation() {
                    self.unicast(sender, reply_to, &confirmation);
                }
            }
            Delivery::Reply(message) => {
                self.unicast(sender, reply_to, &message.render());
            }
        }
    }
}
