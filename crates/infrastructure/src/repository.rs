use application::RoomStore;
use async_trait::async_trait;
use domain::{PasswordHash, RepositoryError, RoomName, RoomRecord};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

pub async fn create_sqlite_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[derive(Debug, FromRow)]
struct RoomRow {
    name: String,
    password_hash: Option<String>,
}

impl TryFrom<RoomRow> for RoomRecord {
    type Error = RepositoryError;

    fn try_from(value: RoomRow) -> Result<Self, Self::Error> {
        let name = RoomName::parse(&value.name).map_err(|err| invalid_data(err.to_string()))?;
        let password = match value.password_hash {
            Some(hash) => Some(PasswordHash::new(hash).map_err(|err| invalid_data(err.to_string()))?),
            None => None,
        };
        Ok(RoomRecord { name, password })
    }
}

#[derive(Clone)]
pub struct SqliteRoomStore {
    pool: SqlitePool,
}

impl SqliteRoomStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn create_room(
        &self,
        name: &RoomName,
        password: Option<PasswordHash>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO rooms (name, password_hash) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name.as_str())
        .bind(password.as_ref().map(PasswordHash::as_str))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn room_exists(&self, name: &RoomName) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM rooms WHERE name = ?")
            .bind(name.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(count > 0)
    }

    async fn find_room(&self, name: &RoomName) -> Result<Option<RoomRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, RoomRow>(
            "SELECT name, password_hash FROM rooms WHERE name = ?",
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.map(RoomRecord::try_from).transpose()
    }

    async fn delete_room(&self, name: &RoomName) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM rooms WHERE name = ?")
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }
}
