//! 房间密码
//!
//! 房间密码只以哈希形式落库。空密码创建的是开放房间：不存哈希，任何密码都能进入。

use async_trait::async_trait;
use domain::{PasswordHash, RoomRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordHasherError {
    #[error("failed to hash room password: {0}")]
    Hash(String),
    #[error("failed to check room password: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }
}

/// 房间密码的哈希与校验
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError>;

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError>;

    /// 新房间要保存的密码；空密码得到开放房间
    async fn protect(&self, plaintext: &str) -> Result<Option<PasswordHash>, PasswordHasherError> {
        if plaintext.is_empty() {
            return Ok(None);
        }
        self.hash(plaintext).await.map(Some)
    }

    /// 开放房间接受任何密码
    async fn admits(&self, room: &RoomRecord, plaintext: &str) -> Result<bool, PasswordHasherError> {
        match &room.password {
            None => Ok(true),
            Some(hashed) => self.verify(plaintext, hashed).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::RoomName;

    struct ReversingHasher;

    #[async_trait]
    impl PasswordHasher for ReversingHasher {
        async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
            PasswordHash::new(plaintext.chars().rev().collect::<String>())
                .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
        }

        async fn verify(
            &self,
            plaintext: &str,
            hashed: &PasswordHash,
        ) -> Result<bool, PasswordHasherError> {
            Ok(plaintext.chars().rev().collect::<String>() == hashed.as_str())
        }
    }

    fn record(password: Option<PasswordHash>) -> RoomRecord {
        RoomRecord {
            name: RoomName::parse("vault").unwrap(),
            password,
        }
    }

    #[tokio::test]
    async fn empty_password_makes_an_open_room() {
        let hasher = ReversingHasher;
        assert!(hasher.protect("").await.unwrap().is_none());

        let open = record(None);
        assert!(hasher.admits(&open, "").await.unwrap());
        assert!(hasher.admits(&open, "anything").await.unwrap());
    }

    #[tokio::test]
    async fn protected_room_checks_the_hash() {
        let hasher = ReversingHasher;
        let stored = hasher.protect("hunter2").await.unwrap();
        let vault = record(stored);

        assert!(hasher.admits(&vault, "hunter2").await.unwrap());
        assert!(!hasher.admits(&vault, "hunter3").await.unwrap());
        assert!(!hasher.admits(&vault, "").await.unwrap());
    }
}
