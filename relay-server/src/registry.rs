//! 会话注册表
//!
//! 名字到会话的唯一映射，两种传输共用。所有修改和快照都经过同一把写/读锁，
//! 投递 I/O 只在快照上进行，不持有锁。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use protocol::MAX_NAME_LEN;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::error::RelayError;

/// 投递到某个会话的出口
#[derive(Debug, Clone)]
pub enum SessionHandle {
    /// 流式会话：写任务独占写入端，这里只持有其发送队列
    Stream {
        tx: mpsc::Sender<String>,
        peer: SocketAddr,
    },
    /// 数据报会话：没有连接，只有对端地址
    Datagram {
        socket: Arc<UdpSocket>,
        addr: SocketAddr,
    },
}

impl SessionHandle {
    /// 尽力投递一帧，不等待
    ///
    /// 流式会话队列已满或已关闭、数据报发送失败都返回 `TransportClosed`，
    /// 由调用方记录日志后继续。
    pub fn deliver(&self, frame: &str) -> Result<(), RelayError> {
        match self {
            SessionHandle::Stream { tx, .. } => {
                tx.try_send(frame.to_string()).map_err(|e| match e {
                    TrySendError::Full(_) => RelayError::TransportClosed("outbound queue full".into()),
                    TrySendError::Closed(_) => RelayError::TransportClosed("session closed".into()),
                })
            }
            SessionHandle::Datagram { socket, addr } => socket
                .try_send_to(frame.as_bytes(), *addr)
                .map(|_| ())
                .map_err(|e| RelayError::TransportClosed(e.to_string())),
        }
    }

    /// 对端地址
    pub fn peer(&self) -> SocketAddr {
        match self {
            SessionHandle::Stream { peer, .. } => *peer,
            SessionHandle::Datagram { addr, .. } => *addr,
        }
    }

    /// 传输名称，用于日志
    pub fn transport(&self) -> &'static str {
        match self {
            SessionHandle::Stream { .. } => "stream",
            SessionHandle::Datagram { .. } => "datagram",
        }
    }
}

/// 一个已注册的参与者
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub handle: SessionHandle,
    /// 仅供参考
    pub joined_at: DateTime<Local>,
}

/// 注册表
#[derive(Debug)]
pub struct Registry {
    sessions: RwLock<HashMap<String, Session>>,
    max_capacity: usize,
}

/// 名字必须非空、不超过 MAX_NAME_LEN 字节且不含空白
pub fn validate_name(name: &str) -> Result<(), RelayError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.chars().any(char::is_whitespace) {
        return Err(RelayError::InvalidName);
    }
    Ok(())
}

impl Registry {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_capacity,
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// 注册会话
    ///
    /// 容量检查、重名检查和插入在同一次写锁内完成。
    pub async fn register(
        &self,
        name: &str,
        handle: SessionHandle,
    ) -> Result<SessionHandle, RelayError> {
        validate_name(name)?;

        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_capacity {
            return Err(RelayError::ServerFull {
                max: self.max_capacity,
            });
        }
        if sessions.contains_key(name) {
            return Err(RelayError::NameTaken);
        }

        sessions.insert(
            name.to_string(),
            Session {
                name: name.to_string(),
                handle: handle.clone(),
                joined_at: Local::now(),
            },
        );
        Ok(handle)
    }

    /// 移除会话，不存在时什么也不做
    ///
    /// 只有真正移除了会话才返回 Some，调用方据此保证离开通知只发一次。
    pub async fn unregister(&self, name: &str) -> Option<Session> {
        self.sessions.write().await.remove(name)
    }

    pub async fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(name)
            .map(|session| session.handle.clone())
    }

    /// 当前所有会话的时间点副本
    pub async fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(name, session)| (name.clone(), session.handle.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
