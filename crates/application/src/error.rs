use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::dispatcher::DispatchError;
use crate::password::PasswordHasherError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("room not found")]
    RoomNotFound,
    #[error("authorization failed")]
    Authorization,
    /// 连接已被注销（断开或被驱逐）
    #[error("connection not found")]
    ConnectionNotFound,
    #[error("not a member of room {room}")]
    NotRoomMember { room: String },
}

impl ApplicationError {
    /// 会话遇到此类错误后必须结束
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationError::ConnectionNotFound)
    }
}
