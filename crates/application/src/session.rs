//! 单个连接的会话状态机
//!
//! `Unbound` --join--> `Joined(room)` --join(other)--> `Joined(other)`，
//! 读出错、关闭或被驱逐后进入 `Terminated`。
//!
//! 会话本身不写 socket，`typing` / `message` 只会提交给广播分发器，
//! 且只允许发往自己已加入的房间。

use std::sync::Arc;

use domain::{ChatFrame, ConnectionId, FrameType, RoomName};

use crate::dispatcher::DispatchHandle;
use crate::error::ApplicationError;
use crate::lifecycle::RoomLifecycleTracker;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Joined(RoomName),
    Terminated,
}

pub struct Session {
    id: ConnectionId,
    state: SessionState,
    registry: Arc<ConnectionRegistry>,
    tracker: Arc<RoomLifecycleTracker>,
    dispatcher: DispatchHandle,
}

impl Session {
    /// 注册连接并进入 `Unbound` 状态
    pub async fn open(
        connection: ConnectionHandle,
        registry: Arc<ConnectionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        dispatcher: DispatchHandle,
    ) -> Self {
        let id = connection.id();
        registry.register(connection).await;
        tracing::info!(connection_id = %id, "WebSocket 连接已建立");

        Self {
            id,
            state: SessionState::Unbound,
            registry,
            tracker,
            dispatcher,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// 处理一帧原始文本。返回错误时帧已被丢弃；只有 `is_terminal` 的错误需要结束会话。
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ApplicationError> {
        self.registry.touch(self.id).await;
        let frame = ChatFrame::decode(text)?;
        self.handle_frame(frame).await
    }

    pub async fn handle_frame(&mut self, frame: ChatFrame) -> Result<(), ApplicationError> {
        if self.state == SessionState::Terminated {
            return Err(ApplicationError::ConnectionNotFound);
        }

        let frame = frame.sanitized();
        let room = RoomName::parse(&frame.room)?;

        match frame.frame_type {
            FrameType::Join => self.join(room, frame.username).await,
            FrameType::Typing | FrameType::Message => self.forward(room, frame),
        }
    }

    /// 任何入站数据（包括 pong）都算作活跃
    pub async fn heard_from_peer(&self) {
        self.registry.touch(self.id).await;
    }

    async fn join(&mut self, room: RoomName, username: String) -> Result<(), ApplicationError> {
        if let SessionState::Joined(current) = &self.state {
            if *current == room {
                self.registry.set_room(self.id, room, username).await.map_err(|err| {
                    self.state = SessionState::Terminated;
                    err
                })?;
                return Ok(());
            }
        }

        // 先计数再发布绑定：并发驱逐拿到的房间一定已经计过数
        self.tracker.join(&room).await;
        match self.registry.set_room(self.id, room.clone(), username).await {
            Ok(previous) => {
                if let Some(previous) = previous {
                    self.tracker.leave(&previous).await;
                }
                tracing::info!(connection_id = %self.id, room = %room, "joined room");
                self.state = SessionState::Joined(room);
                Ok(())
            }
            Err(err) => {
                // 连接已被驱逐，撤销刚才的计数
                self.tracker.leave(&room).await;
                self.state = SessionState::Terminated;
                Err(err)
            }
        }
    }

    fn forward(&self, room: RoomName, frame: ChatFrame) -> Result<(), ApplicationError> {
        match &self.state {
            SessionState::Joined(current) if *current == room => {
                self.dispatcher.submit(room, frame)?;
                Ok(())
            }
            _ => Err(ApplicationError::NotRoomMember {
                room: room.to_string(),
            }),
        }
    }

    /// 结束会话：注销连接，并在本会话完成注销时离开房间（恰好一次）
    pub async fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;

        match self.registry.unregister(self.id).await {
            Some(departed) => {
                departed.handle.close().await;
                if let Some(room) = &departed.room {
                    self.tracker.leave(room).await;
                }
                tracing::info!(connection_id = %self.id, room = ?departed.room, "WebSocket连接已断开");
            }
            None => {
                tracing::debug!(connection_id = %self.id, "connection already evicted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::BroadcastDispatcher;
    use crate::registry::testing::*;
    use crate::registry::Outbound;
    use crate::repository::memory::MemoryRoomStore;
    use crate::repository::RoomStore;
    use config::DispatchConfig;
    use domain::{DomainError, EncryptedContent};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        store: Arc<MemoryRoomStore>,
        registry: Arc<ConnectionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        dispatcher: Option<BroadcastDispatcher>,
        handle: DispatchHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryRoomStore::new());
            let registry = Arc::new(ConnectionRegistry::new());
            let tracker = Arc::new(RoomLifecycleTracker::new(store.clone()));
            let (dispatcher, handle) = BroadcastDispatcher::new(
                registry.clone(),
                tracker.clone(),
                &DispatchConfig::default(),
            );
            Self {
                store,
                registry,
                tracker,
                dispatcher: Some(dispatcher),
                handle,
            }
        }

        async fn session(&self, sink: Arc<RecordingSink>) -> Session {
            Session::open(
                handle(sink),
                self.registry.clone(),
                self.tracker.clone(),
                self.handle.clone(),
            )
            .await
        }
    }

    fn frame(frame_type: FrameType, username: &str, room: &str) -> ChatFrame {
        ChatFrame {
            frame_type,
            username: username.into(),
            content: EncryptedContent {
                encrypted: vec![1, 2, 3],
                iv: vec![9],
            },
            room: room.into(),
        }
    }

    fn room(name: &str) -> RoomName {
        RoomName::parse(name).unwrap()
    }

    #[tokio::test]
    async fn join_binds_connection_and_counts_member() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;
        assert_eq!(session.state(), &SessionState::Unbound);

        session
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();

        assert_eq!(session.state(), &SessionState::Joined(room("general")));
        assert_eq!(fx.registry.room_of(session.id()).await, Some(room("general")));
        assert_eq!(fx.tracker.live_count(&room("general")).await, 1);
        assert!(fx.store.room_exists(&room("general")).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_room_name_keeps_previous_state() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;
        session
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();

        let err = session
            .handle_frame(frame(FrameType::Join, "alice", "../etc"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::ValidationError { .. })
        ));
        assert!(!err.is_terminal());
        assert_eq!(session.state(), &SessionState::Joined(room("general")));
        assert_eq!(fx.tracker.live_count(&room("general")).await, 1);
    }

    #[tokio::test]
    async fn malformed_text_is_dropped() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;

        let err = session.handle_text("{\"type\":").await.unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::MalformedFrame { .. })
        ));
        assert_eq!(session.state(), &SessionState::Unbound);
    }

    #[tokio::test]
    async fn rejoin_moves_membership_between_rooms() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;

        session
            .handle_frame(frame(FrameType::Join, "alice", "one"))
            .await
            .unwrap();
        session
            .handle_frame(frame(FrameType::Join, "alice", "two"))
            .await
            .unwrap();

        assert_eq!(session.state(), &SessionState::Joined(room("two")));
        assert_eq!(fx.tracker.live_count(&room("one")).await, 0);
        assert!(!fx.store.room_exists(&room("one")).await.unwrap());
        assert_eq!(fx.tracker.live_count(&room("two")).await, 1);
    }

    #[tokio::test]
    async fn rejoin_same_room_keeps_count_and_record() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;

        session
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();
        session
            .handle_frame(frame(FrameType::Join, "alicia", "general"))
            .await
            .unwrap();

        assert_eq!(fx.tracker.live_count(&room("general")).await, 1);
        assert_eq!(fx.store.delete_calls(), 0);
        assert_eq!(
            fx.registry.username_of(session.id()).await.as_deref(),
            Some("alicia")
        );
    }

    #[tokio::test]
    async fn message_outside_joined_room_is_rejected() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink).await;

        let err = session
            .handle_frame(frame(FrameType::Message, "alice", "general"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotRoomMember { .. }));

        session
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();
        let err = session
            .handle_frame(frame(FrameType::Typing, "alice", "random"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::NotRoomMember { .. }));
        assert_eq!(fx.handle.pending(), 0);
    }

    #[tokio::test]
    async fn message_in_joined_room_reaches_members() {
        let mut fx = Fixture::new();
        let (a_sink, mut rx_a) = RecordingSink::new();
        let (b_sink, mut rx_b) = RecordingSink::new();
        let mut alice = fx.session(a_sink).await;
        let mut bob = fx.session(b_sink).await;
        alice
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();
        bob.handle_frame(frame(FrameType::Join, "bob", "general"))
            .await
            .unwrap();

        let worker = fx.dispatcher.take().unwrap().spawn();
        let sent = frame(FrameType::Message, "alice", "general");
        alice.handle_frame(sent.clone()).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let outbound = timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            match outbound {
                Outbound::Frame(text) => assert_eq!(ChatFrame::decode(&text).unwrap(), sent),
                Outbound::Ping => panic!("unexpected ping"),
            }
        }
        worker.abort();
    }

    #[tokio::test]
    async fn terminate_leaves_room_exactly_once() {
        let fx = Fixture::new();
        let (a_sink, _rx_a) = RecordingSink::new();
        let (b_sink, _rx_b) = RecordingSink::new();
        let mut alice = fx.session(a_sink).await;
        let mut bob = fx.session(b_sink).await;
        alice
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();
        bob.handle_frame(frame(FrameType::Join, "bob", "general"))
            .await
            .unwrap();

        alice.terminate().await;
        alice.terminate().await;
        assert_eq!(alice.state(), &SessionState::Terminated);
        assert_eq!(fx.tracker.live_count(&room("general")).await, 1);
        assert!(fx.store.room_exists(&room("general")).await.unwrap());

        bob.terminate().await;
        assert_eq!(fx.tracker.live_count(&room("general")).await, 0);
        assert!(!fx.store.room_exists(&room("general")).await.unwrap());
        assert!(fx.registry.is_empty().await);
    }

    #[tokio::test]
    async fn evicted_session_does_not_leave_twice() {
        let fx = Fixture::new();
        let (sink, _rx) = RecordingSink::new();
        let mut session = fx.session(sink.clone()).await;
        session
            .handle_frame(frame(FrameType::Join, "alice", "general"))
            .await
            .unwrap();

        crate::dispatcher::evict(&fx.registry, &fx.tracker, session.id(), "test").await;
        assert!(sink.is_closed());
        assert_eq!(fx.store.delete_calls(), 1);

        let err = session
            .handle_frame(frame(FrameType::Join, "alice", "other"))
            .await
            .unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(fx.tracker.live_count(&room("other")).await, 0);

        session.terminate().await;
        assert_eq!(fx.store.delete_calls(), 2);
        assert_eq!(fx.tracker.live_count(&room("general")).await, 0);
    }
}
