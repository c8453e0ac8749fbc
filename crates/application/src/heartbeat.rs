//! 心跳与空闲连接回收
//!
//! 每个周期：
//! 1. 驱逐超过 `idle_timeout` 没有任何入站数据的连接
//! 2. 通过分发器的 ping 通道给其余连接发送 ping（客户端回 pong 会刷新活跃时间）
//! 3. 回收创建后一直无人加入的房间

use std::sync::Arc;

use config::HeartbeatConfig;
use domain::RoomName;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::{evict, DispatchHandle};
use crate::lifecycle::RoomLifecycleTracker;
use crate::registry::ConnectionRegistry;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub evicted: usize,
    pub pinged: usize,
    pub expired_rooms: Vec<RoomName>,
}

pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    tracker: Arc<RoomLifecycleTracker>,
    dispatcher: DispatchHandle,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        dispatcher: DispatchHandle,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            dispatcher,
            config,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.ping_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = self.tick().await;
            if report.evicted > 0 || !report.expired_rooms.is_empty() {
                tracing::info!(
                    evicted = report.evicted,
                    pinged = report.pinged,
                    expired_rooms = report.expired_rooms.len(),
                    "heartbeat sweep"
                );
            }
        }
    }

    pub async fn tick(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();

        for id in self.registry.stale(self.config.idle_timeout()).await {
            if evict(&self.registry, &self.tracker, id, "idle timeout").await {
                report.evicted += 1;
            }
        }

        for connection in self.registry.connections().await {
            self.dispatcher.ping(connection);
            report.pinged += 1;
        }

        report.expired_rooms = self
            .tracker
            .sweep_expired(self.config.empty_room_ttl())
            .await;
        report
    }
}
