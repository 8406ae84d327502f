/// Remote Data Gateway
///
/// Row-level access to the hosted backend: select, count, insert, update,
/// delete and remote counter procedures against the four gallery tables.
/// Supports multiple backend implementations (REST, SQLite, offline).

pub mod offline;
pub mod query;
pub mod rest;
pub mod sqlite;

pub use offline::OfflineGateway;
pub use query::{Filter, Order, SelectQuery};
pub use rest::{RestGateway, RestGatewayConfig};
pub use sqlite::{SqliteGateway, SqliteGatewayOptions};

use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use serde_json::Value;

/// Remote procedure bumping a wallpaper's like counter
pub const RPC_INCREMENT_LIKES: &str = "increment_likes";
/// Remote procedure lowering a wallpaper's like counter (floor zero)
pub const RPC_DECREMENT_LIKES: &str = "decrement_likes";
/// Remote procedure bumping a wallpaper's download counter
pub const RPC_INCREMENT_DOWNLOADS: &str = "increment_downloads";

/// Logical tables touched by the gallery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Wallpapers,
    Users,
    UserLikes,
    UserDownloads,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Wallpapers => "wallpapers",
            Table::Users => "users",
            Table::UserLikes => "user_likes",
            Table::UserDownloads => "user_downloads",
        }
    }

    /// Columns the client is allowed to reference
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Wallpapers => &[
                "id",
                "title",
                "description",
                "category",
                "url",
                "alt_text",
                "width",
                "height",
                "file_size",
                "format",
                "resolution",
                "downloads",
                "likes",
                "tags",
                "created_at",
                "updated_at",
                "is_featured",
            ],
            Table::Users => &["id", "email", "created_at", "updated_at"],
            Table::UserLikes | Table::UserDownloads => {
                &["id", "user_id", "wallpaper_id", "created_at"]
            }
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Reject a column that does not belong to this table
    pub fn check_column(&self, column: &str) -> GatewayResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(GatewayError::Rejected {
                status: 400,
                message: format!("column {}.{} does not exist", self.as_str(), column),
            })
        }
    }
}

/// Data gateway backend trait
///
/// Implementations translate the query model into their own wire format.
/// Rows travel as JSON objects so the access layer decodes them into typed
/// models in one place.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Select rows matching a query
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Value>>;

    /// Count rows matching the filters
    async fn count(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64>;

    /// Insert a single row
    async fn insert(&self, table: Table, row: Value) -> GatewayResult<()>;

    /// Patch matching rows, returning how many were touched
    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> GatewayResult<u64>;

    /// Delete matching rows, returning how many were removed
    async fn delete(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64>;

    /// Invoke a remote procedure
    async fn rpc(&self, function: &str, args: Value) -> GatewayResult<Value>;
}
