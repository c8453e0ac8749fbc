//! 房间生命周期
//!
//! 按房间统计在线成员数，并驱动房间存储的创建和删除：
//! - 计数从无到 1 时确保房间记录存在
//! - 计数降到 0 时删除计数并删除房间记录
//!
//! 同一房间的 join / leave / 过期回收先拿到该房间的顺序锁，再在计数表的锁内
//! 修改计数并决定是否创建或删除，存储调用在释放计数表锁之后、释放顺序锁之前
//! 完成。两个并发的 `leave` 不会都决定删除，同一房间的创建和删除按决定的顺序
//! 落到存储上，而其他房间的操作不会等待这次存储调用。
//! 存储失败只记录日志，不回滚内存中的计数。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::RoomName;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::repository::RoomStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomSlot {
    /// 通过 HTTP 创建、尚无人加入
    Pending { created_at: Instant },
    Live(usize),
}

pub struct RoomLifecycleTracker {
    store: Arc<dyn RoomStore>,
    rooms: Mutex<HashMap<RoomName, RoomSlot>>,
    /// 每个房间的顺序锁
    gates: Mutex<HashMap<RoomName, Arc<Mutex<()>>>>,
}

impl RoomLifecycleTracker {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self {
            store,
            rooms: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub async fn join(&self, room: &RoomName) {
        let order = self.lock_room(room).await;
        let (count, needs_record) = {
            let mut rooms = self.rooms.lock().await;
            let (count, needs_record) = match rooms.get(room).copied() {
                Some(RoomSlot::Live(count)) => (count + 1, false),
                // 记录已由创建接口写入
                Some(RoomSlot::Pending { .. }) => (1, false),
                None => (1, true),
            };
            rooms.insert(room.clone(), RoomSlot::Live(count));
            (count, needs_record)
        };

        if needs_record {
            self.ensure_record(room).await;
        }

        tracing::debug!(room = %room, count, "room joined");
        self.unlock_room(room, order).await;
    }

    pub async fn leave(&self, room: &RoomName) {
        let order = self.lock_room(room).await;
        let remaining = {
            let mut rooms = self.rooms.lock().await;
            match rooms.get_mut(room) {
                Some(RoomSlot::Live(count)) => {
                    *count = count.saturating_sub(1);
                    let remaining = *count;
                    if remaining == 0 {
                        rooms.remove(room);
                    }
                    Some(remaining)
                }
                _ => None,
            }
        };

        match remaining {
            None => tracing::debug!(room = %room, "leave for untracked room ignored"),
            Some(0) => match self.store.delete_room(room).await {
                Ok(_) => tracing::info!(room = %room, "Room deleted due to inactivity"),
                Err(err) => tracing::error!(room = %room, error = %err, "Failed to delete room"),
            },
            Some(count) => tracing::debug!(room = %room, count, "room left"),
        }
        self.unlock_room(room, order).await;
    }

    /// 创建接口插入新房间后调用，房间进入待加入状态
    pub async fn track_created(&self, room: &RoomName) {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(room.clone()).or_insert(RoomSlot::Pending {
            created_at: Instant::now(),
        });
    }

    /// 删除创建后超过 `ttl` 仍无人加入的房间，返回被回收的房间
    pub async fn sweep_expired(&self, ttl: Duration) -> Vec<RoomName> {
        let candidates: Vec<RoomName> = {
            let now = Instant::now();
            let rooms = self.rooms.lock().await;
            rooms
                .iter()
                .filter_map(|(name, slot)| match slot {
                    RoomSlot::Pending { created_at } if now.duration_since(*created_at) > ttl => {
                        Some(name.clone())
                    }
                    _ => None,
                })
                .collect()
        };

        let mut expired = Vec::new();
        for room in candidates {
            let order = self.lock_room(&room).await;
            // 拿到顺序锁之前可能已有人加入
            let still_pending = {
                let now = Instant::now();
                let mut rooms = self.rooms.lock().await;
                match rooms.get(&room) {
                    Some(RoomSlot::Pending { created_at })
                        if now.duration_since(*created_at) > ttl =>
                    {
                        rooms.remove(&room);
                        true
                    }
                    _ => false,
                }
            };

            if still_pending {
                match self.store.delete_room(&room).await {
                    Ok(_) => tracing::info!(room = %room, "Empty room expired"),
                    Err(err) => tracing::error!(room = %room, error = %err, "Failed to delete expired room"),
                }
                expired.push(room.clone());
            }
            self.unlock_room(&room, order).await;
        }

        expired
    }

    pub async fn live_count(&self, room: &RoomName) -> usize {
        match self.rooms.lock().await.get(room) {
            Some(RoomSlot::Live(count)) => *count,
            _ => 0,
        }
    }

    async fn lock_room(&self, room: &RoomName) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            gates.entry(room.clone()).or_default().clone()
        };
        gate.lock_owned().await
    }

    /// 释放顺序锁；没有其他人在等待且房间已不再跟踪时回收这把锁
    async fn unlock_room(&self, room: &RoomName, order: OwnedMutexGuard<()>) {
        let gate = OwnedMutexGuard::mutex(&order).clone();
        drop(order);

        let mut gates = self.gates.lock().await;
        // 表里一份、这里一份
        if Arc::strong_count(&gate) == 2 && !self.rooms.lock().await.contains_key(room) {
            gates.remove(room);
        }
    }

    async fn ensure_record(&self, room: &RoomName) {
        let exists = match self.store.room_exists(room).await {
            Ok(exists) => exists,
            Err(err) => {
                tracing::error!(room = %room, error = %err, "Failed to check room existence");
                return;
            }
        };
        if exists {
            return;
        }

        match self.store.create_room(room, None).await {
            Ok(_) => tracing::info!(room = %room, "Room created on first join"),
            Err(err) => tracing::error!(room = %room, error = %err, "Failed to create room"),
        }
    }
}
