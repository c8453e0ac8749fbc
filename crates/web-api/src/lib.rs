//! Web API 层。
//!
//! 提供 Axum 路由：房间创建/加入的 HTTP 接口、WebSocket 升级和静态文件，
//! 将请求委托给应用层的会话和房间服务。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
pub use ws_connection::WsSink;
