//! 聊天中继核心领域模型
//!
//! 包含房间名、连接标识、消息帧等值对象，以及输入清洗与校验规则。

pub mod errors;
pub mod frame;
pub mod sanitize;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use frame::*;
pub use sanitize::{sanitize, validate_room_name};
pub use value_objects::*;
