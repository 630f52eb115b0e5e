//! 消息模型与线路格式

use chrono::Local;

use crate::TIMESTAMP_FORMAT;

/// 消息类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// 群发
    Broadcast,
    /// 私聊
    Private { target: String },
    /// 用户加入通知
    SystemJoin,
    /// 用户离开通知
    SystemLeave,
    /// 只回给发送者的错误
    SystemError,
    /// 服务器通知（如关闭）
    SystemNotice,
}

/// 一条待投递的消息，不落盘
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// 发送者名字，系统消息为 None
    pub sender: Option<String>,
    /// 正文；加入/离开通知中为对应的用户名
    pub body: String,
    /// 发送时格式化的时间
    pub timestamp: String,
}

/// 按线路格式生成当前本地时间
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

impl Message {
    fn new(kind: MessageKind, sender: Option<&str>, body: impl Into<String>) -> Self {
        Self {
            kind,
            sender: sender.map(str::to_string),
            body: body.into(),
            timestamp: timestamp_now(),
        }
    }

    pub fn broadcast(sender: &str, body: impl Into<String>) -> Self {
        Self::new(MessageKind::Broadcast, Some(sender), body)
    }

    pub fn private(sender: &str, target: &str, body: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Private {
                target: target.to_string(),
            },
            Some(sender),
            body,
        )
    }

    pub fn join(name: &str) -> Self {
        Self::new(MessageKind::SystemJoin, None, name)
    }

    pub fn leave(name: &str) -> Self {
        Self::new(MessageKind::SystemLeave, None, name)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::SystemError, None, text)
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(MessageKind::SystemNotice, None, text)
    }

    /// 覆盖时间戳
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// 渲染为接收者看到的文本（不含帧分隔符）
    ///
    /// 私聊消息渲染的是收件人视角，发送者的回执见 [`Message::render_confirmation`]。
    pub fn render(&self) -> String {
        let sender = self.sender.as_deref().unwrap_or_default();
        match &self.kind {
            MessageKind::Broadcast => {
                format!("[{}] [Fecha:{}] {}", sender, self.timestamp, self.body)
            }
            MessageKind::Private { .. } => {
                format!("[{}] [PRIVADO de {}] {}", self.timestamp, sender, self.body)
            }
            MessageKind::SystemJoin => format!("*** {} se unio al chat ***", self.body),
            MessageKind::SystemLeave => format!("*** {} salio del chat ***", self.body),
            MessageKind::SystemError => format!("ERROR: {}", self.body),
            MessageKind::SystemNotice => format!("*** {} ***", self.body),
        }
    }

    /// 私聊回执（发给发送者），其他类型返回 None
    pub fn render_confirmation(&self) -> Option<String> {
        match &self.kind {
            MessageKind::Private { target } => Some(format!(
                "[PRIVADO para {}] [Fecha:{}] {}",
                target, self.timestamp, self.body
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FECHA: &str = "19/10/2026 03:04:05 PM";

    #[test]
    fn test_render_broadcast() {
        let msg = Message::broadcast("alice", "hello").with_timestamp(FECHA);
        assert_eq!(msg.render(), "[alice] [Fecha:19/10/2026 03:04:05 PM] hello");
        assert_eq!(msg.render_confirmation(), None);
    }

    #[test]
    fn test_render_private_both_sides() {
        let msg = Message::private("alice", "bob", "hola bob").with_timestamp(FECHA);
        assert_eq!(
            msg.render(),
            "[19/10/2026 03:04:05 PM] [PRIVADO de alice] hola bob"
        );
        assert_eq!(
            msg.render_confirmation().as_deref(),
            Some("[PRIVADO para bob] [Fecha:19/10/2026 03:04:05 PM] hola bob")
        );
    }

    #[test]
    fn test_render_system_messages() {
        assert_eq!(Message::join("carol").render(), "*** carol se unio al chat ***");
        assert_eq!(Message::leave("carol").render(), "*** carol salio del chat ***");
        assert_eq!(
            Message::error("Usuario ya existe").render(),
            "ERROR: Usuario ya existe"
        );
        assert!(Message::join("carol").sender.is_none());
    }

    #[test]
    fn test_timestamp_format() {
        let ts = timestamp_now();
        // dd/mm/yyyy hh:mm:ss AM|PM
        assert_eq!(ts.len(), 22);
        assert_eq!(&ts[2..3], "/");
        assert_eq!(&ts[5..6], "/");
        assert!(ts.ends_with("AM") || ts.ends_with("PM"));
    }
}
