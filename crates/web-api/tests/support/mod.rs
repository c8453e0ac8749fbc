#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use application::repository::memory::MemoryRoomStore;
use application::{
    BroadcastDispatcher, ConnectionRegistry, HeartbeatMonitor, RoomLifecycleTracker, RoomService,
    RoomStore,
};
use config::{DispatchConfig, HeartbeatConfig};
use domain::RoomName;
use futures_util::{SinkExt, StreamExt};
use infrastructure::BcryptPasswordHasher;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryRoomStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub tracker: Arc<RoomLifecycleTracker>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(None).await
    }

    /// 同时运行心跳任务
    pub async fn start_with_heartbeat(config: HeartbeatConfig) -> Self {
        Self::start_with(Some(config)).await
    }

    async fn start_with(heartbeat: Option<HeartbeatConfig>) -> Self {
        let store = Arc::new(MemoryRoomStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let tracker = Arc::new(RoomLifecycleTracker::new(store.clone()));
        let dispatch_config = DispatchConfig::default();
        let (dispatcher, dispatch_handle) =
            BroadcastDispatcher::new(registry.clone(), tracker.clone(), &dispatch_config);
        dispatcher.spawn();
        if let Some(config) = heartbeat {
            HeartbeatMonitor::new(
                registry.clone(),
                tracker.clone(),
                dispatch_handle.clone(),
                config,
            )
            .spawn();
        }

        let room_service = Arc::new(RoomService::new(
            store.clone(),
            Arc::new(BcryptPasswordHasher::new(Some(4))),
            tracker.clone(),
        ));
        let state = AppState::new(
            registry.clone(),
            tracker.clone(),
            dispatch_handle,
            room_service,
            dispatch_config.write_timeout(),
        );
        // 仓库自带的浏览器客户端
        let static_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../static");
        let app = router(state, static_dir);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            store,
            registry,
            tracker,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self) -> Client {
        let (socket, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("websocket connect");
        socket
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_json(client: &mut Client, value: &Value) {
    client
        .send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取下一条文本帧，跳过 ping/pong
pub async fn next_json(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    return serde_json::from_str::<Value>(text.as_str()).expect("json frame")
                }
                Some(Ok(TungsteniteMessage::Ping(_))) | Some(Ok(TungsteniteMessage::Pong(_))) => {
                    continue
                }
                other => panic!("unexpected websocket message: {:?}", other),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("frame within timeout")
}

/// 在超时时间内没有收到文本帧
pub async fn assert_silent(client: &mut Client, wait: Duration) {
    if let Ok(Some(Ok(TungsteniteMessage::Text(text)))) =
        tokio::time::timeout(wait, client.next()).await
    {
        panic!("unexpected frame: {}", text.as_str());
    }
}

const WAIT_LIMIT: Duration = Duration::from_secs(5);

impl TestServer {
    /// 轮询直到房间在线人数等于 `expected`
    pub async fn wait_for_count(&self, room: &str, expected: usize) {
        let room = RoomName::parse(room).expect("room name");
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.tracker.live_count(&room).await != expected {
            assert!(Instant::now() < deadline, "{room} never reached {expected} members");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// 轮询直到房间记录存在与否符合预期
    pub async fn wait_for_record(&self, room: &str, exists: bool) {
        let room = RoomName::parse(room).expect("room name");
        let deadline = Instant::now() + WAIT_LIMIT;
        while self.store.room_exists(&room).await.expect("room store") != exists {
            assert!(Instant::now() < deadline, "record for {room} never became {exists}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn wait_for_no_connections(&self) {
        let deadline = Instant::now() + WAIT_LIMIT;
        while !self.registry.is_empty().await {
            assert!(Instant::now() < deadline, "connections never drained");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
