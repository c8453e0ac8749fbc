use std::sync::Arc;

use domain::{RoomName, RoomRecord};
use serde::Deserialize;

use crate::error::ApplicationError;
use crate::lifecycle::RoomLifecycleTracker;
use crate::password::PasswordHasher;
use crate::repository::RoomStore;

/// 创建 / 加入房间的请求体
#[derive(Debug, Clone, Deserialize)]
pub struct RoomCredentials {
    pub name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateRoomOutcome {
    Created,
    /// 房间已存在且密码匹配
    AlreadyExists,
}

pub struct RoomService {
    store: Arc<dyn RoomStore>,
    password_hasher: Arc<dyn PasswordHasher>,
    tracker: Arc<RoomLifecycleTracker>,
}

impl RoomService {
    pub fn new(
        store: Arc<dyn RoomStore>,
        password_hasher: Arc<dyn PasswordHasher>,
        tracker: Arc<RoomLifecycleTracker>,
    ) -> Self {
        Self {
            store,
            password_hasher,
            tracker,
        }
    }

    /// 空密码创建的是开放房间
    pub async fn create_room(
        &self,
        request: RoomCredentials,
    ) -> Result<CreateRoomOutcome, ApplicationError> {
        let name = RoomName::parse(&request.name)?;

        if let Some(record) = self.store.find_room(&name).await? {
            self.verify_password(&record, &request.password).await?;
            return Ok(CreateRoomOutcome::AlreadyExists);
        }

        let password = self.password_hasher.protect(&request.password).await?;

        if !self.store.create_room(&name, password).await? {
            // 并发创建时对方先写入了
            let record = self
                .store
                .find_room(&name)
                .await?
                .ok_or(ApplicationError::RoomNotFound)?;
            self.verify_password(&record, &request.password).await?;
            return Ok(CreateRoomOutcome::AlreadyExists);
        }

        self.tracker.track_created(&name).await;
        tracing::info!(room = %name, protected = !request.password.is_empty(), "room created");
        Ok(CreateRoomOutcome::Created)
    }

    pub async fn join_room(&self, request: RoomCredentials) -> Result<(), ApplicationError> {
        let name = RoomName::parse(&request.name)?;
        let record = self
            .store
            .find_room(&name)
            .await?
            .ok_or(ApplicationError::RoomNotFound)?;
        self.verify_password(&record, &request.password).await
    }

    async fn verify_password(
        &self,
        record: &RoomRecord,
        plaintext: &str,
    ) -> Result<(), ApplicationError> {
        if self.password_hasher.admits(record, plaintext).await? {
            Ok(())
        } else {
            tracing::warn!(room = %record.name, "room password mismatch");
            Err(ApplicationError::Authorization)
        }
    }
}
