use std::sync::Arc;
use std::time::Duration;

use application::{ConnectionRegistry, DispatchHandle, RoomLifecycleTracker, RoomService};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub tracker: Arc<RoomLifecycleTracker>,
    pub dispatcher: DispatchHandle,
    pub room_service: Arc<RoomService>,
    /// 关闭 socket 时等待 Close 帧写出的上限
    pub close_grace: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        dispatcher: DispatchHandle,
        room_service: Arc<RoomService>,
        close_grace: Duration,
    ) -> Self {
        Self {
            registry,
            tracker,
            dispatcher,
            room_service,
            close_grace,
        }
    }
}
