/// REST gateway speaking the PostgREST dialect used by hosted backends
///
/// Tables live under `{base}/rest/v1/{table}` and remote procedures under
/// `{base}/rest/v1/rpc/{function}`. Filters are encoded as query parameters
/// (`col=eq.value`, `col=ilike.*text*`, `col=in.("a","b")`, `or=(...)`).
use crate::{
    error::{GalleryError, GalleryResult, GatewayError, GatewayResult},
    gateway::{DataGateway, Filter, SelectQuery, Table},
};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

/// REST gateway configuration
#[derive(Debug, Clone)]
pub struct RestGatewayConfig {
    /// Project URL, e.g. https://xyzcompany.supabase.co
    pub base_url: String,
    /// Public (anon) API key
    pub api_key: String,
    /// User-Agent header for HTTP requests
    pub user_agent: String,
}

impl RestGatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            user_agent: format!("wallpaper-gallery/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// PostgREST-backed gateway
#[derive(Clone)]
pub struct RestGateway {
    http_client: Client,
    config: RestGatewayConfig,
}

impl RestGateway {
    /// Create a new REST gateway
    pub fn new(config: RestGatewayConfig) -> GalleryResult<Self> {
        // No request timeout: a hung request simply never settles
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| GalleryError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table.as_str()
        )
    }

    fn rpc_url(&self, function: &str) -> String {
        format!(
            "{}/rest/v1/rpc/{}",
            self.config.base_url.trim_end_matches('/'),
            function
        )
    }

    fn request(&self, method: Method, url: &str, params: &[(String, String)]) -> RequestBuilder {
        let url = with_query_string(url, params);
        debug!("{} {}", method, url);

        self.http_client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Request failed: {}", e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(GatewayError::Rejected { status, message })
    }
}

#[async_trait]
impl DataGateway for RestGateway {
    async fn select(&self, query: &SelectQuery) -> GatewayResult<Vec<Value>> {
        query.validate()?;

        let request = self.request(
            Method::GET,
            &self.table_url(query.table),
            &select_params(query),
        );
        let response = self.send(request).await?;

        response.json::<Vec<Value>>().await.map_err(|e| {
            GatewayError::Decode(format!(
                "Failed to parse {} rows: {}",
                query.table.as_str(),
                e
            ))
        })
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        for filter in filters {
            filter.validate(table)?;
        }

        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filters.iter().map(filter_param));

        let request = self
            .request(Method::HEAD, &self.table_url(table), &params)
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;

        content_range_total(response.headers()).ok_or_else(|| {
            GatewayError::Decode(format!("Missing count for {}", table.as_str()))
        })
    }

    async fn insert(&self, table: Table, row: Value) -> GatewayResult<()> {
        check_row_columns(table, &row)?;

        let request = self
            .request(Method::POST, &self.table_url(table), &[])
            .header("Prefer", "return=minimal")
            .json(&row);
        self.send(request).await?;

        Ok(())
    }

    async fn update(&self, table: Table, patch: Value, filters: &[Filter]) -> GatewayResult<u64> {
        check_row_columns(table, &patch)?;
        for filter in filters {
            filter.validate(table)?;
        }

        let params: Vec<_> = filters.iter().map(filter_param).collect();
        let request = self
            .request(Method::PATCH, &self.table_url(table), &params)
            .header("Prefer", "return=minimal,count=exact")
            .json(&patch);
        let response = self.send(request).await?;

        Ok(content_range_total(response.headers()).unwrap_or(0))
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> GatewayResult<u64> {
        for filter in filters {
            filter.validate(table)?;
        }

        let params: Vec<_> = filters.iter().map(filter_param).collect();
        let request = self
            .request(Method::DELETE, &self.table_url(table), &params)
            .header("Prefer", "return=minimal,count=exact");
        let response = self.send(request).await?;

        Ok(content_range_total(response.headers()).unwrap_or(0))
    }

    async fn rpc(&self, function: &str, args: Value) -> GatewayResult<Value> {
        let request = self
            .request(Method::POST, &self.rpc_url(function), &[])
            .json(&args);
        let response = self.send(request).await?;

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Decode(format!("Failed to read rpc body: {}", e)))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn check_row_columns(table: Table, row: &Value) -> GatewayResult<()> {
    let obj = row.as_object().ok_or_else(|| GatewayError::Rejected {
        status: 400,
        message: format!("{} row must be a JSON object", table.as_str()),
    })?;
    obj.keys().try_for_each(|k| table.check_column(k))
}

/// Query parameters for a select
fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), select_list(query))];
    params.extend(query.filters.iter().map(filter_param));

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }

    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    params
}

fn select_list(query: &SelectQuery) -> String {
    if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    }
}

/// Top-level filter as a `(key, value)` query parameter
fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(col, v) => (col.clone(), format!("eq.{}", plain_value(v))),
        Filter::ILike(col, pattern) => (col.clone(), format!("ilike.{}", wildcard(pattern))),
        Filter::In(col, values) => (col.clone(), format!("in.({})", quoted_list(values))),
        Filter::Gt(col, v) => (col.clone(), format!("gt.{}", plain_value(v))),
        Filter::Or(inner) => ("or".to_string(), format!("({})", logic_list(inner))),
    }
}

/// Filter nested inside a logic group: `col.op.value`
fn logic_term(filter: &Filter) -> String {
    match filter {
        Filter::Eq(col, v) => format!("{}.eq.{}", col, logic_value(&plain_value(v))),
        Filter::ILike(col, pattern) => {
            format!("{}.ilike.{}", col, logic_value(&wildcard(pattern)))
        }
        Filter::In(col, values) => format!("{}.in.({})", col, quoted_list(values)),
        Filter::Gt(col, v) => format!("{}.gt.{}", col, logic_value(&plain_value(v))),
        Filter::Or(inner) => format!("or({})", logic_list(inner)),
    }
}

fn logic_list(filters: &[Filter]) -> String {
    filters.iter().map(logic_term).collect::<Vec<_>>().join(",")
}

/// PostgREST accepts `*` in place of `%` inside URLs.
///
/// Escaped characters pass through for the database. Every `*` reaching
/// PostgREST becomes `%`, so a literal `*` is sent as the single-character
/// wildcard `_`.
fn wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            '%' => out.push('*'),
            '*' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

fn plain_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Quote values that would break a logic group
fn logic_value(raw: &str) -> String {
    if raw.contains([',', '(', ')', ':', '"', '\\']) {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw.to_string()
    }
}

fn quoted_list(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            other => plain_value(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn with_query_string(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", url, query)
}

/// Total from a `Content-Range: 0-24/3573` or `*/0` header
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let range = headers.get("content-range")?.to_str().ok()?;
    parse_content_range_total(range)
}

fn parse_content_range_total(range: &str) -> Option<u64> {
    let (_, total) = range.rsplit_once('/')?;
    total.trim().parse().ok()
}
