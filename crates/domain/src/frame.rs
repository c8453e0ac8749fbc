//! WebSocket 消息帧
//!
//! 入站和出站使用同一种 JSON 结构。`content` 是客户端加密后的密文与 IV，
//! 服务端不解释其内容，只原样转发。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Join,
    Typing,
    Message,
}

/// 端到端加密后的消息体
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    #[serde(default)]
    pub encrypted: Vec<i64>,
    #[serde(default)]
    pub iv: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: EncryptedContent,
    #[serde(default)]
    pub room: String,
}

impl ChatFrame {
    pub fn decode(text: &str) -> Result<Self, DomainError> {
        serde_json::from_str(text).map_err(|err| DomainError::malformed_frame(err.to_string()))
    }

    pub fn encode(&self) -> Result<String, DomainError> {
        serde_json::to_string(self).map_err(|err| DomainError::malformed_frame(err.to_string()))
    }

    /// 清洗用户名和房间名；密文保持不变。
    pub fn sanitized(mut self) -> Self {
        self.username = sanitize(&self.username);
        self.room = sanitize(&self.room);
        self
    }
}
