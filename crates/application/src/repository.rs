use async_trait::async_trait;
use domain::{PasswordHash, RepositoryError, RoomName, RoomRecord};

/// 房间的持久化存储：房间名 -> 密码
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// 插入新房间；房间已存在时返回 `Ok(false)`
    async fn create_room(
        &self,
        name: &RoomName,
        password: Option<PasswordHash>,
    ) -> Result<bool, RepositoryError>;

    async fn room_exists(&self, name: &RoomName) -> Result<bool, RepositoryError>;

    async fn find_room(&self, name: &RoomName) -> Result<Option<RoomRecord>, RepositoryError>;

    /// 删除房间；房间不存在时返回 `Ok(false)`
    async fn delete_room(&self, name: &RoomName) -> Result<bool, RepositoryError>;
}

/// 内存实现的房间存储（用于测试和本地开发）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryRoomStore {
        rooms: RwLock<HashMap<RoomName, Option<PasswordHash>>>,
        creates: AtomicUsize,
        deletes: AtomicUsize,
    }

    impl MemoryRoomStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// create_room 被调用的次数
        pub fn create_calls(&self) -> usize {
            self.creates.load(Ordering::SeqCst)
        }

        /// delete_room 被调用的次数
        pub fn delete_calls(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoomStore for MemoryRoomStore {
        async fn create_room(
            &self,
            name: &RoomName,
            password: Option<PasswordHash>,
        ) -> Result<bool, RepositoryError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let mut rooms = self.rooms.write().await;
            if rooms.contains_key(name) {
                return Ok(false);
            }
            rooms.insert(name.clone(), password);
            Ok(true)
        }

        async fn room_exists(&self, name: &RoomName) -> Result<bool, RepositoryError> {
            Ok(self.rooms.read().await.contains_key(name))
        }

        async fn find_room(&self, name: &RoomName) -> Result<Option<RoomRecord>, RepositoryError> {
            let rooms = self.rooms.read().await;
            Ok(rooms.get(name).map(|password| RoomRecord {
                name: name.clone(),
                password: password.clone(),
            }))
        }

        async fn delete_room(&self, name: &RoomName) -> Result<bool, RepositoryError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(self.rooms.write().await.remove(name).is_some())
        }
    }
}
