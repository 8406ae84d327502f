/// SQLite-backed gateway
///
/// A self-hosted stand-in for the hosted backend with the same table layout,
/// filter semantics and counter procedures. Rows are produced by SQLite's
/// `json_object` so they reach the access layer in the same JSON shape the
/// REST backend returns.
use crate::{
    error::{GalleryError, GalleryResult, GatewayError, GatewayResult},
    gateway::{
        DataGateway, Filter, SelectQuery, Table, RPC_DECREMENT_LIKES, RPC_INCREMENT_DOWNLOADS,
        RPC_INCREMENT_LIKES,
    },
    models::Wallpaper,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Arguments, Sqlite,
};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite gateway options
#[derive(Debug, Clone)]
pub struct SqliteGatewayOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
    /// Serve the counter procedures; when off, rpc calls are rejected
    /// the way a backend without the functions installed would
    pub counter_procedures: bool,
}

impl Default for SqliteGatewayOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
            counter_procedures: true,
        }
    }
}

/// Gateway over a local SQLite database
///
/// `ILike` folds case with SQLite's `lower()`, which only handles ASCII.
/// Non-ASCII letters in titles and categories match case-sensitively here,
/// unlike the REST backend.
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
    options: SqliteGatewayOptions,
}

impl SqliteGateway {
    /// Open (or create) a database file and run migrations
    pub async fn connect(path: &Path, options: SqliteGatewayOptions) -> GalleryResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(if options.enable_wal {
                        SqliteJournalMode::Wal
                    } else {
                        SqliteJournalMode::Delete
                    })
                    .foreign_keys(true)
                    .busy_timeout(std::time::Duration::from_secs(5)),
            )
            .await?;

        info!("Opened gallery database at {}", path.display());
        Self::with_pool(pool, options).await
    }

    /// Private in-memory database
    pub async fn in_memory(options: SqliteGatewayOptions) -> GalleryResult<Self> {
        // A single connection that never recycles keeps the memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;

        Self::with_pool(pool, options).await
    }

    async fn with_pool(pool: SqlitePool, options: SqliteGatewayOptions) -> GalleryResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| GalleryError::Internal(format!("Migration failed: {}", e)))?;

        Ok(Self { pool, options })
    }

    /// Insert wallpapers, typically the fallback dataset into an empty database
    pub async fn seed_wallpapers(&self, wallpapers: &[Wallpaper]) -> GatewayResult<usize> {
        for wallpaper in wallpapers {
            self.insert(Table::Wallpapers, wallpaper.to_row()).await?;
        }
        info!("Seeded {} wallpapers", wallpapers.len());
        Ok(wallpapers.len())
    }

    async fn adjust_counter(&self, function: &str, set: &str, args: &Value) -> GatewayResult<Value> {
        let wallpaper_id = args
            .get("wallpaper_id")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Rejected {
                status: 400,
                message: format!("{} requires a wallpaper_id argument", function),
            })?;

        let sql = format!("UPDATE wallpapers SET {}, updated_at = ? WHERE id = ?", set);

        sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(wallpaper_id)
            .execute(&self.pool)
            .await?;

        Ok(Value::Null)
    }
}

#[async_trait]
impl DataGateway for SqliteGateway {
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Value>> {
        query.validate()?;

        let mut binds = Vec::new();
        let fields = query
            .selected_columns()
            .into_iter()
            .map(|c| format!("'{}', {}", c, column_expr(query.table, c)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT json_object({}) FROM {}{}",
            fields,
            query.table.as_str(),
            where_clause(&query.filters, &mut binds)
        );

        if !query.order.is_empty() {
            let order = query
                .order
                .iter()
                .map(|o| format!("{} {}", o.column, if o.ascending { "ASC" } else { "DESC" }))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::from(limit as i64));
        }

        debug!("sqlite select: {}", sql);

        let rows: Vec<String> = sqlx::query_scalar_with::<Sqlite, _, _>(&sql, build_args(&binds)?)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| serde_json::from_str(r).map_err(GatewayError::from))
            .collect()
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        for filter in filters {
            filter.validate(table)?;
        }

        let mut binds = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            table.as_str(),
            where_clause(filters, &mut binds)
        );

        let count: i64 = sqlx::query_scalar_with::<Sqlite, _, _>(&sql, build_args(&binds)?)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn insert(&self, table: Table, row: Value) -> GatewayResult<()> {
        let obj = row_object(table, &row)?;
        if obj.is_empty() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: format!("empty {} row", table.as_str()),
            });
        }

        let columns: Vec<&str> = obj.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.as_str(),
            columns.join(", "),
            placeholders
        );
        let binds: Vec<Value> = obj.values().cloned().collect();

        sqlx::query_with::<Sqlite, _>(&sql, build_args(&binds)?)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> GatewayResult<u64> {
        let obj = row_object(table, &patch)?;
        if obj.is_empty() {
            return Ok(0);
        }
        for filter in filters {
            filter.validate(table)?;
        }

        let assignments = obj
            .keys()
            .map(|k| format!("{} = ?", k))
            .collect::<Vec<_>>()
            .join(", ");
        let mut binds: Vec<Value> = obj.values().cloned().collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            table.as_str(),
            assignments,
            where_clause(filters, &mut binds)
        );

        let result = sqlx::query_with::<Sqlite, _>(&sql, build_args(&binds)?)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        for filter in filters {
            filter.validate(table)?;
        }

        let mut binds = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            table.as_str(),
            where_clause(filters, &mut binds)
        );

        let result = sqlx::query_with::<Sqlite, _>(&sql, build_args(&binds)?)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn rpc(&self, function: &str, args: Value) -> GatewayResult<Value> {
        let set = counter_assignment(function).filter(|_| self.options.counter_procedures);
        match set {
            Some(set) => self.adjust_counter(function, set, &args).await,
            None => Err(GatewayError::Rejected {
                status: 404,
                message: format!("function {} does not exist", function),
            }),
        }
    }
}

/// SET clause behind each counter procedure
fn counter_assignment(function: &str) -> Option<&'static str> {
    match function {
        RPC_INCREMENT_LIKES => Some("likes = likes + 1"),
        RPC_DECREMENT_LIKES => Some("likes = MAX(likes - 1, 0)"),
        RPC_INCREMENT_DOWNLOADS => Some("downloads = downloads + 1"),
        _ => None,
    }
}

fn row_object(table: Table, row: &Value) -> GatewayResult<&serde_json::Map<String, Value>> {
    let obj = row.as_object().ok_or_else(|| GatewayError::Rejected {
        status: 400,
        message: format!("{} row must be a JSON object", table.as_str()),
    })?;
    for key in obj.keys() {
        table.check_column(key)?;
    }
    Ok(obj)
}

/// SQL expression producing a column's JSON value
fn column_expr(table: Table, column: &str) -> String {
    match (table, column) {
        (Table::Wallpapers, "tags") => "json(tags)".to_string(),
        (Table::Wallpapers, "is_featured") => {
            "json(CASE WHEN is_featured THEN 'true' ELSE 'false' END)".to_string()
        }
        _ => column.to_string(),
    }
}

fn where_clause(filters: &[Filter], binds: &mut Vec<Value>) -> String {
    if filters.is_empty() {
        return String::new();
    }

    let terms = filters
        .iter()
        .map(|f| predicate(f, binds))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(" WHERE {}", terms)
}

/// Columns are validated against the table before reaching here
fn predicate(filter: &Filter, binds: &mut Vec<Value>) -> String {
    match filter {
        Filter::Eq(col, v) => {
            binds.push(v.clone());
            format!("{} = ?", col)
        }
        Filter::ILike(col, pattern) => {
            binds.push(Value::String(pattern.clone()));
            // lower() folds ASCII only
            format!("lower({}) LIKE lower(?) ESCAPE '\\'", col)
        }
        Filter::In(col, values) => {
            if values.is_empty() {
                return "0".to_string();
            }
            binds.extend(values.iter().cloned());
            format!("{} IN ({})", col, vec!["?"; values.len()].join(", "))
        }
        Filter::Gt(col, v) => {
            binds.push(v.clone());
            format!("{} > ?", col)
        }
        Filter::Or(inner) => {
            if inner.is_empty() {
                return "0".to_string();
            }
            let terms = inner
                .iter()
                .map(|f| predicate(f, binds))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("({})", terms)
        }
    }
}

fn build_args(values: &[Value]) -> GatewayResult<SqliteArguments<'static>> {
    let mut args = SqliteArguments::default();

    for value in values {
        let added = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Bool(b) => args.add(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => args.add(i),
                None => args.add(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => args.add(s.clone()),
            // Arrays and objects are stored as JSON text
            other => args.add(other.to_string()),
        };
        added.map_err(|e| GatewayError::Decode(format!("Failed to bind argument: {}", e)))?;
    }

    Ok(args)
}
