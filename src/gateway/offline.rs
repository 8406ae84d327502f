/// Gateway used when no backend is configured
use crate::{
    error::{GatewayError, GatewayResult},
    gateway::{DataGateway, Filter, SelectQuery, Table},
};
use async_trait::async_trait;
use serde_json::Value;

/// Every call fails as unavailable, so callers take their fallback path
#[derive(Debug, Clone, Default)]
pub struct OfflineGateway;

impl OfflineGateway {
    pub fn new() -> Self {
        Self
    }

    fn unavailable<T>(&self, what: &str) -> GatewayResult<T> {
        Err(GatewayError::Unavailable(format!(
            "no backend configured ({})",
            what
        )))
    }
}

#[async_trait]
impl DataGateway for OfflineGateway {
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Value>> {
        self.unavailable(query.table.as_str())
    }

    async fn count(&self, table: Table, _filters: &[Filter]) -> GatewayResult<u64> {
        self.unavailable(table.as_str())
    }

    async fn insert(&self, table: Table, _row: Value) -> GatewayResult<()> {
        self.unavailable(table.as_str())
    }

    async fn update(&self, table: Table, _patch: Value, _filters: &[Filter]) -> GatewayResult<u64> {
        self.unavailable(table.as_str())
    }

    async fn delete(&self, table: Table, _filters: &[Filter]) -> GatewayResult<u64> {
        self.unavailable(table.as_str())
    }

    async fn rpc(&self, function: &str, _args: Value) -> GatewayResult<Value> {
        self.unavailable(function)
    }
}
