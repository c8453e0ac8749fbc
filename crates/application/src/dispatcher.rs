//! 广播分发器
//!
//! `typing` / `message` 帧进入有界队列，由唯一的后台 worker 按到达顺序取出
//! 并写往各个 socket。心跳 ping 走同一个 worker 的独立通道：按连接合并，
//! 不占队列容量，也不受溢出策略影响。这里是所有出站写操作的唯一入口，
//! 同一连接上不会出现并发写。
//!
//! 写失败（包括超时）的连接会被注销、关闭，并对其所在房间执行一次 `leave`，
//! 不影响同一条消息发往其他成员。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use config::{DispatchConfig, OverflowPolicy};
use domain::{ChatFrame, ConnectionId, RoomName};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::lifecycle::RoomLifecycleTracker;
use crate::registry::{ConnectionHandle, ConnectionRegistry, Outbound, TransportError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },
}

#[derive(Debug)]
struct Broadcast {
    room: RoomName,
    frame: ChatFrame,
}

/// worker 取出的一项
enum Dispatch {
    Broadcast(Broadcast),
    Ping(ConnectionHandle),
}

#[derive(Default)]
struct Lanes {
    broadcasts: VecDeque<Broadcast>,
    /// 同一连接在被写出之前重复的 ping 只保留一个
    pings: HashMap<ConnectionId, ConnectionHandle>,
}

struct DispatchQueue {
    lanes: Mutex<Lanes>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl DispatchQueue {
    fn push(&self, broadcast: Broadcast) -> Result<(), DispatchError> {
        {
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            if lanes.broadcasts.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::RejectNew => {
                        return Err(DispatchError::QueueFull {
                            capacity: self.capacity,
                        });
                    }
                    OverflowPolicy::DropOldest => {
                        if let Some(dropped) = lanes.broadcasts.pop_front() {
                            tracing::warn!(room = %dropped.room, "dispatch queue full, dropping oldest frame");
                        }
                    }
                }
            }
            lanes.broadcasts.push_back(broadcast);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn push_ping(&self, connection: ConnectionHandle) {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pings
            .insert(connection.id(), connection);
        self.notify.notify_one();
    }

    /// ping 先于排队中的广播写出
    async fn pop(&self) -> Dispatch {
        loop {
            {
                let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
                let next_ping = lanes.pings.keys().next().copied();
                if let Some(connection) = next_ping.and_then(|id| lanes.pings.remove(&id)) {
                    return Dispatch::Ping(connection);
                }
                if let Some(broadcast) = lanes.broadcasts.pop_front() {
                    return Dispatch::Broadcast(broadcast);
                }
            }
            self.notify.notified().await;
        }
    }

    fn len(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .broadcasts
            .len()
    }

    fn pending_pings(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pings
            .len()
    }
}

/// 入队端，可以在多个会话之间克隆共享
#[derive(Clone)]
pub struct DispatchHandle {
    queue: Arc<DispatchQueue>,
}

impl DispatchHandle {
    /// 提交一条需要扇出到 `room` 的消息
    pub fn submit(&self, room: RoomName, frame: ChatFrame) -> Result<(), DispatchError> {
        self.queue.push(Broadcast { room, frame })
    }

    /// 由同一个 worker 发送心跳 ping，不会被队列容量拒绝
    pub fn ping(&self, connection: ConnectionHandle) {
        self.queue.push_ping(connection)
    }

    /// 排队中的广播数
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_pings(&self) -> usize {
        self.queue.pending_pings()
    }
}

pub struct BroadcastDispatcher {
    queue: Arc<DispatchQueue>,
    registry: Arc<ConnectionRegistry>,
    tracker: Arc<RoomLifecycleTracker>,
    write_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        config: &DispatchConfig,
    ) -> (Self, DispatchHandle) {
        let queue = Arc::new(DispatchQueue {
            lanes: Mutex::new(Lanes {
                broadcasts: VecDeque::with_capacity(config.capacity.min(1024)),
                pings: HashMap::new(),
            }),
            notify: Notify::new(),
            capacity: config.capacity.max(1),
            policy: config.overflow,
        });
        let dispatcher = Self {
            queue: queue.clone(),
            registry,
            tracker,
            write_timeout: config.write_timeout(),
        };
        (dispatcher, DispatchHandle { queue })
    }

    /// 在后台启动唯一的分发 worker
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!("broadcast dispatcher started");
        loop {
            match self.queue.pop().await {
                Dispatch::Broadcast(Broadcast { room, frame }) => self.fan_out(&room, &frame).await,
                Dispatch::Ping(connection) => {
                    if let Err(err) = self.write(&connection, Outbound::Ping).await {
                        tracing::warn!(connection_id = %connection.id(), error = %err, "Failed to send ping");
                        evict(&self.registry, &self.tracker, connection.id(), "ping failed").await;
                    }
                }
            }
        }
    }

    async fn fan_out(&self, room: &RoomName, frame: &ChatFrame) {
        let payload: Arc<str> = match frame.encode() {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::warn!(room = %room, error = %err, "failed to serialize websocket payload");
                return;
            }
        };

        let members = self.registry.members_of(room).await;
        tracing::debug!(room = %room, members = members.len(), kind = ?frame.frame_type, "fan-out");

        for member in members {
            if let Err(err) = self.write(&member, Outbound::Frame(payload.clone())).await {
                tracing::warn!(
                    connection_id = %member.id(),
                    room = %room,
                    error = %err,
                    "delivery failed, evicting connection"
                );
                evict(&self.registry, &self.tracker, member.id(), "write failed").await;
            }
        }
    }

    async fn write(
        &self,
        connection: &ConnectionHandle,
        outbound: Outbound,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout(self.write_timeout, connection.send(outbound)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// 注销并关闭连接。只有真正完成注销的调用方会执行 `leave`，
/// 所以多个路径同时驱逐同一连接时房间计数只会减一次。
///
/// 被驱逐的 socket 往往已经写不动了，Close 帧放到后台发送，不阻塞调用方。
pub(crate) async fn evict(
    registry: &ConnectionRegistry,
    tracker: &RoomLifecycleTracker,
    id: ConnectionId,
    reason: &str,
) -> bool {
    let Some(departed) = registry.unregister(id).await else {
        return false;
    };

    departed.handle.shutdown();
    let closing = departed.handle.clone();
    tokio::spawn(async move { closing.close().await });
    if let Some(room) = &departed.room {
        tracker.leave(room).await;
    }

    tracing::info!(connection_id = %id, room = ?departed.room, reason, "connection evicted");
    true
}
