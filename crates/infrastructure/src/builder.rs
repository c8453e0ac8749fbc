use std::sync::Arc;

use config::{DatabaseConfig, SecurityConfig};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_sqlite_pool, SqliteRoomStore},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub room_store: Arc<SqliteRoomStore>,
    pub password_hasher: Arc<BcryptPasswordHasher>,
}

impl Infrastructure {
    /// 打开房间库并执行迁移
    pub async fn connect(
        database: &DatabaseConfig,
        security: &SecurityConfig,
    ) -> Result<Self, InfrastructureError> {
        let pool = create_sqlite_pool(&database.url, database.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(url = %database.url, "room store ready");

        Ok(Self {
            room_store: Arc::new(SqliteRoomStore::new(pool)),
            password_hasher: Arc::new(BcryptPasswordHasher::new(security.bcrypt_cost)),
        })
    }
}
