//! 应用层服务
//!
//! HTTP 侧的用例：创建房间、校验加入房间的密码。

pub mod room_service;

pub use room_service::{CreateRoomOutcome, RoomCredentials, RoomService};
