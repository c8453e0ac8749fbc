//! 应用层实现。
//!
//! 这里是中继的并发核心：连接注册表、房间生命周期计数、广播分发器、
//! 会话状态机与心跳，以及创建/加入房间的用例服务。对外部适配器
//! （房间存储、密码哈希、socket 写端）只依赖 trait。

pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;
pub mod session;

pub use dispatcher::{BroadcastDispatcher, DispatchError, DispatchHandle};
pub use error::ApplicationError;
pub use heartbeat::{HeartbeatMonitor, HeartbeatReport};
pub use lifecycle::RoomLifecycleTracker;
pub use password::{PasswordHasher, PasswordHasherError};
pub use registry::{ConnectionHandle, ConnectionRegistry, FrameSink, Outbound, TransportError};
pub use repository::RoomStore;
pub use services::{CreateRoomOutcome, RoomCredentials, RoomService};
pub use session::{Session, SessionState};
