use super::SwapRepository;
use crate::error::Error;
use crate::swap::Swap;
use crate::swap::SwapFilter;
use crate::swap::SwapOrder;
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteRow;
use sqlx::Pool;
use sqlx::QueryBuilder;
use sqlx::Row;
use sqlx::Sqlite;
use std::path::Path;

/// SQLite-based persistent implementation of [`SwapRepository`].
///
/// One table keyed by swap id, with the full swap JSON in the `payload`
/// column and `kind`/`status`/`created_at` denormalised for filtering. All
/// filter values are bound parameters.
#[derive(Clone)]
pub struct SqliteSwapRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSwapRepository {
    /// Create a new SQLite swap repository at `db_path`.
    ///
    /// The database file and parent directories are created if missing, and
    /// migrations are applied.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, Error> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::storage(format!("failed to create database directory: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| Error::storage(format!("failed to connect to database: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::storage(format!("failed to run migrations: {e}")))?;

        Ok(Self { pool })
    }

    fn row_to_swap(row: &SqliteRow) -> Result<Swap, Error> {
        let payload: String = row.get("payload");

        serde_json::from_str(&payload)
            .map_err(|e| Error::storage(format!("failed to deserialize swap payload: {e}")))
    }
}

#[async_trait]
impl SwapRepository for SqliteSwapRepository {
    async fn save(&self, swap: &Swap) -> Result<(), Error> {
        let payload = serde_json::to_string(swap)
            .map_err(|e| Error::storage(format!("failed to serialize swap: {e}")))?;

        sqlx::query(
            "INSERT INTO swaps (id, kind, status, created_at, payload) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             kind = excluded.kind, \
             status = excluded.status, \
             created_at = excluded.created_at, \
             payload = excluded.payload",
        )
        .bind(swap.id())
        .bind(swap.kind().as_str())
        .bind(swap.status().as_str())
        .bind(swap.created_at() as i64)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to save swap: {e}")))?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM swaps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to delete swap: {e}")))?;

        Ok(())
    }

    async fn get_all(&self, filter: &SwapFilter) -> Result<Vec<Swap>, Error> {
        if filter.is_vacuous() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT payload FROM swaps");

        let mut has_where = false;
        let mut prefix = |query: &mut QueryBuilder<Sqlite>| {
            if has_where {
                query.push(" AND ");
            } else {
                query.push(" WHERE ");
                has_where = true;
            }
        };

        if let Some(ids) = &filter.ids {
            prefix(&mut query);
            query.push("id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
            query.push(")");
        }

        if let Some(statuses) = &filter.statuses {
            prefix(&mut query);
            query.push("status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            query.push(")");
        }

        if let Some(kinds) = &filter.kinds {
            prefix(&mut query);
            query.push("kind IN (");
            let mut separated = query.separated(", ");
            for kind in kinds {
                separated.push_bind(kind.as_str());
            }
            query.push(")");
        }

        match filter.order {
            Some(SwapOrder::CreatedAtAsc) => {
                query.push(" ORDER BY created_at ASC, id ASC");
            }
            Some(SwapOrder::CreatedAtDesc) => {
                query.push(" ORDER BY created_at DESC, id DESC");
            }
            None => {}
        }

        let rows: Vec<SqliteRow> = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to query swaps: {e}")))?;

        rows.iter().map(Self::row_to_swap).collect()
    }

    async fn clear(&self) -> Result<(), Error> {
        sqlx::query("DELETE FROM swaps")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to clear swaps: {e}")))?;

        Ok(())
    }
}
