use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use tinylink_core::error::{Result, StorageError};
use tinylink_core::{ReadRepository, Record, Repository, ShortCode, Stats};
use tracing::{debug, info};

const INSERT_RECORD: &str = r#"
    INSERT INTO short_urls (short_code, original_url, owner_id)
    VALUES ($1, $2, $3)
    ON CONFLICT (original_url) DO NOTHING
    RETURNING short_code
"#;

const SELECT_CODE_BY_URL: &str = r#"
    SELECT short_code
    FROM short_urls
    WHERE original_url = $1
"#;

const DATABASE_EXISTS: &str = "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)";

/// Database every server has, used to create the target one.
const MAINTENANCE_DATABASE: &str = "postgres";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL implementation of the repository contract.
///
/// Original URLs are unique: inserting a URL that is already stored writes
/// nothing and reports the existing code through
/// [`StorageError::UniqueViolation`]. Batches run in one READ COMMITTED
/// transaction and are all-or-nothing. Deletion only sets `is_deleted`.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the database named in `database_url` if the server lacks it.
    ///
    /// Migrations cannot create a database, so this runs before
    /// [`connect`](Self::connect). When the target database accepts a
    /// connection nothing else happens.
    pub async fn ensure_database(database_url: &str) -> Result<()> {
        let options = PgConnectOptions::from_str(database_url).map_err(map_sqlx_error)?;
        let Some(database) = options.get_database().map(str::to_owned) else {
            return Ok(());
        };

        if let Ok(conn) = PgConnection::connect_with(&options).await {
            return conn.close().await.map_err(map_sqlx_error);
        }

        let mut conn = PgConnection::connect_with(&options.database(MAINTENANCE_DATABASE))
            .await
            .map_err(map_sqlx_error)?;

        let exists: bool = sqlx::query_scalar(DATABASE_EXISTS)
            .bind(&database)
            .fetch_one(&mut conn)
            .await
            .map_err(map_sqlx_error)?;

        if !exists {
            sqlx::query(&format!("CREATE DATABASE {}", quote_identifier(&database)))
                .execute(&mut conn)
                .await
                .map_err(map_sqlx_error)?;
            info!(%database, "created database");
        }

        conn.close().await.map_err(map_sqlx_error)
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_urls` table and its indexes if they are missing.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("migration failed: {e}")))?;
        info!("database schema is up to date");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin_read_committed(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(tx)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get_record(&self, code: &ShortCode) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM short_urls
            WHERE short_code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn get_user_records(&self, owner_id: &str) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            r#"
            SELECT original_url, short_code, owner_id
            FROM short_urls
            WHERE owner_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(Record {
                    original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
                    short_code: ShortCode::new(
                        row.try_get::<String, _>("short_code")
                            .map_err(map_sqlx_error)?,
                    ),
                    owner_id: row.try_get("owner_id").map_err(map_sqlx_error)?,
                    deleted: false,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<Stats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT owner_id) AS users
            FROM short_urls
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(Stats {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn add_record(&self, record: Record) -> Result<()> {
        let inserted = sqlx::query(INSERT_RECORD)
            .bind(record.short_code.as_str())
            .bind(&record.original_url)
            .bind(&record.owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if inserted.is_some() {
            return Ok(());
        }

        let existing_code: String = sqlx::query_scalar(SELECT_CODE_BY_URL)
            .bind(&record.original_url)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        debug!(%existing_code, "original url already shortened");
        Err(StorageError::UniqueViolation { existing_code })
    }

    async fn add_records(&self, records: Vec<Record>) -> Result<()> {
        let mut seen = HashSet::with_capacity(records.len());
        if let Some(record) = records
            .iter()
            .find(|record| !seen.insert(record.original_url.as_str()))
        {
            return Err(StorageError::InvalidData(format!(
                "url appears twice in one batch: {}",
                record.original_url
            )));
        }

        let mut tx = self.begin_read_committed().await?;

        // dropping `tx` on any early return rolls the batch back
        for record in &records {
            let inserted = sqlx::query(INSERT_RECORD)
                .bind(record.short_code.as_str())
                .bind(&record.original_url)
                .bind(&record.owner_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            if inserted.is_none() {
                let existing_code: String = sqlx::query_scalar(SELECT_CODE_BY_URL)
                    .bind(&record.original_url)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;

                debug!(%existing_code, "batch rejected, url already shortened");
                return Err(StorageError::UniqueViolation { existing_code });
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn delete_urls(&self, owner_id: &str, codes: &[ShortCode]) -> Result<()> {
        if codes.is_empty() {
            return Ok(());
        }

        let codes: Vec<String> = codes.iter().map(ToString::to_string).collect();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            UPDATE short_urls
            SET is_deleted = TRUE
            WHERE owner_id = $1
              AND short_code = ANY($2)
            "#,
        )
        .bind(owner_id)
        .bind(&codes)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(owner_id, marked = result.rows_affected(), "marked records deleted");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("tinylink"), r#""tinylink""#);
        assert_eq!(quote_identifier(r#"odd"name"#), r#""odd""name""#);
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::Query(_)
        ));
    }
}
