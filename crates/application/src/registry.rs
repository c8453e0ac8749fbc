//! 连接注册表
//!
//! 记录所有存活连接及其当前所在房间。所有修改和快照读取都在同一把锁下完成，
//! 分发器遍历 `members_of` 的结果时不会看到注销到一半的连接。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ConnectionId, RoomName};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ApplicationError;

/// 写往客户端的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// 已编码的 JSON 消息帧
    Frame(Arc<str>),
    /// 心跳 ping
    Ping,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket closed")]
    Closed,
    #[error("socket write failed: {0}")]
    Write(String),
    #[error("socket write timed out")]
    Timeout,
}

/// 连接的写端。只有广播分发器会调用 `send`。
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, outbound: Outbound) -> Result<(), TransportError>;

    /// 立即让对应会话的读循环退出，之后的 `send` 都会失败。不做任何 I/O。
    fn shutdown(&self);

    /// 尽力发送 Close 帧并关闭底层 socket；隐含 `shutdown`
    async fn close(&self);
}

/// 注册表中连接的可克隆句柄
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Arc<dyn FrameSink>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, sink: Arc<dyn FrameSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send(&self, outbound: Outbound) -> Result<(), TransportError> {
        self.sink.send(outbound).await
    }

    pub fn shutdown(&self) {
        self.sink.shutdown()
    }

    pub async fn close(&self) {
        self.sink.close().await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish()
    }
}

struct Entry {
    handle: ConnectionHandle,
    username: String,
    room: Option<RoomName>,
    last_seen: Instant,
}

/// `unregister` 的结果，只交给真正完成移除的调用方
#[derive(Debug)]
pub struct Departed {
    pub handle: ConnectionHandle,
    pub username: String,
    /// 连接离开时所在的房间；调用方负责对它执行一次 `leave`
    pub room: Option<RoomName>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        let id = handle.id();
        let mut connections = self.connections.lock().await;
        connections.insert(
            id,
            Entry {
                handle,
                username: String::new(),
                room: None,
                last_seen: Instant::now(),
            },
        );
        tracing::debug!(connection_id = %id, total = connections.len(), "connection registered");
    }

    /// 幂等：连接不存在时返回 `None`
    pub async fn unregister(&self, id: ConnectionId) -> Option<Departed> {
        let entry = self.connections.lock().await.remove(&id)?;
        tracing::debug!(connection_id = %id, room = ?entry.room, "connection unregistered");
        Some(Departed {
            handle: entry.handle,
            username: entry.username,
            room: entry.room,
        })
    }

    /// 绑定到新房间并返回之前的房间
    pub async fn set_room(
        &self,
        id: ConnectionId,
        room: RoomName,
        username: String,
    ) -> Result<Option<RoomName>, ApplicationError> {
        let mut connections = self.connections.lock().await;
        let entry = connections
            .get_mut(&id)
            .ok_or(ApplicationError::ConnectionNotFound)?;
        entry.username = username;
        Ok(entry.room.replace(room))
    }

    /// 房间成员快照
    pub async fn members_of(&self, room: &RoomName) -> Vec<ConnectionHandle> {
        let connections = self.connections.lock().await;
        connections
            .values()
            .filter(|entry| entry.room.as_ref() == Some(room))
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// 所有连接的快照
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        let connections = self.connections.lock().await;
        connections.values().map(|entry| entry.handle.clone()).collect()
    }

    pub async fn room_of(&self, id: ConnectionId) -> Option<RoomName> {
        let connections = self.connections.lock().await;
        connections.get(&id).and_then(|entry| entry.room.clone())
    }

    pub async fn username_of(&self, id: ConnectionId) -> Option<String> {
        let connections = self.connections.lock().await;
        connections.get(&id).map(|entry| entry.username.clone())
    }

    /// 更新最后活跃时间
    pub async fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.connections.lock().await.get_mut(&id) {
            entry.last_seen = Instant::now();
        }
    }

    /// 超过 `idle_timeout` 没有任何入站数据的连接
    pub async fn stale(&self, idle_timeout: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        let connections = self.connections.lock().await;
        connections
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > idle_timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}
