/// Backend-neutral query model
use crate::error::GatewayResult;
use crate::gateway::Table;
use serde_json::Value;

/// Row predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// column = value
    Eq(String, Value),
    /// Case-insensitive pattern match. `%` and `_` are wildcards, `\` escapes them.
    ILike(String, String),
    /// column is one of values
    In(String, Vec<Value>),
    /// column > value
    Gt(String, Value),
    /// Any of the nested filters
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn ilike(column: &str, pattern: impl Into<String>) -> Self {
        Filter::ILike(column.to_string(), pattern.into())
    }

    pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(column.to_string(), value.into())
    }

    /// Substring pattern for `ILike`; `needle` matches literally
    pub fn contains_pattern(needle: &str) -> String {
        let mut pattern = String::with_capacity(needle.len() + 2);
        pattern.push('%');
        for c in needle.chars() {
            if matches!(c, '\\' | '%' | '_') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }

    /// Ensure every referenced column exists on the table
    pub fn validate(&self, table: Table) -> GatewayResult<()> {
        match self {
            Filter::Eq(c, _) | Filter::ILike(c, _) | Filter::In(c, _) | Filter::Gt(c, _) => {
                table.check_column(c)
            }
            Filter::Or(inner) => inner.iter().try_for_each(|f| f.validate(table)),
        }
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A select against one table
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: Table,
    /// Empty means all columns
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn on(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Columns to return, expanding the empty list to the full table
    pub fn selected_columns(&self) -> Vec<&str> {
        if self.columns.is_empty() {
            self.table.columns().to_vec()
        } else {
            self.columns.iter().map(String::as_str).collect()
        }
    }

    pub fn validate(&self) -> GatewayResult<()> {
        for column in &self.columns {
            self.table.check_column(column)?;
        }
        for filter in &self.filters {
            filter.validate(self.table)?;
        }
        for order in &self.order {
            self.table.check_column(&order.column)?;
        }
        Ok(())
    }
}
