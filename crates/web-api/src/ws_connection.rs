//! WebSocket 连接驱动
//!
//! socket 拆成两半：写端包装成 [`WsSink`] 注册到连接表，只由广播分发器写；
//! 读端留在本任务里驱动 [`Session`]。驱逐时 `WsSink::shutdown` 会取消令牌，
//! 让读循环退出；Close 帧随后在后台尽力发送。

use std::sync::Arc;
use std::time::Duration;

use application::{ApplicationError, ConnectionHandle, FrameSink, Outbound, Session, TransportError};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::ConnectionId;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub struct WsSink {
    sender: Mutex<SplitSink<WebSocket, WsMessage>>,
    shutdown: CancellationToken,
    close_grace: Duration,
}

impl WsSink {
    pub fn new(
        sender: SplitSink<WebSocket, WsMessage>,
        shutdown: CancellationToken,
        close_grace: Duration,
    ) -> Self {
        Self {
            sender: Mutex::new(sender),
            shutdown,
            close_grace,
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&self, outbound: Outbound) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let message = match outbound {
            Outbound::Frame(text) => WsMessage::Text(text.to_string().into()),
            Outbound::Ping => WsMessage::Ping(Bytes::new()),
        };

        self.sender
            .lock()
            .await
            .send(message)
            .await
            .map_err(|err| TransportError::Write(err.to_string()))
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn close(&self) {
        // 先唤醒读循环，再尽力发送 Close 帧
        FrameSink::shutdown(self);

        let closing = async {
            let mut sender = self.sender.lock().await;
            if let Err(err) = sender.send(WsMessage::Close(None)).await {
                tracing::debug!(error = %err, "close frame not delivered");
            }
        };
        if tokio::time::timeout(self.close_grace, closing).await.is_err() {
            tracing::debug!("close frame timed out");
        }
    }
}

/// 运行单个 WebSocket 连接直到对端断开或被驱逐
pub async fn serve_socket(socket: WebSocket, state: AppState) {
    let (sender, mut incoming) = socket.split();
    let shutdown = CancellationToken::new();
    let sink = Arc::new(WsSink::new(sender, shutdown.clone(), state.close_grace));
    let connection = ConnectionHandle::new(ConnectionId::new(), sink);

    let mut session = Session::open(
        connection,
        state.registry.clone(),
        state.tracker.clone(),
        state.dispatcher.clone(),
    )
    .await;
    let connection_id = session.id();

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(connection_id = %connection_id, "read loop cancelled");
                break;
            }
            message = incoming.next() => message,
        };

        let outcome = match message {
            Some(Ok(WsMessage::Text(text))) => session.handle_text(text.as_str()).await,
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => session.handle_text(text).await,
                Err(_) => {
                    session.heard_from_peer().await;
                    tracing::debug!(connection_id = %connection_id, "non-utf8 binary frame ignored");
                    Ok(())
                }
            },
            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {
                session.heard_from_peer().await;
                Ok(())
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                tracing::debug!(connection_id = %connection_id, "peer closed");
                break;
            }
            Some(Err(err)) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "WebSocket read failed");
                break;
            }
        };

        if let Err(err) = outcome {
            if err.is_terminal() {
                break;
            }
            log_dropped_frame(connection_id, &err);
        }
    }

    session.terminate().await;
}

fn log_dropped_frame(connection_id: ConnectionId, err: &ApplicationError) {
    match err {
        ApplicationError::Dispatch(_) => {
            tracing::warn!(connection_id = %connection_id, error = %err, "frame dropped")
        }
        _ => tracing::debug!(connection_id = %connection_id, error = %err, "frame ignored"),
    }
}
