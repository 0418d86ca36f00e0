//! Common types shared across Table API calls.
//!
//! This module defines the request description sent to the transport,
//! pagination, display-value modes, and the `{"result": ...}` envelopes.

use serde::{Deserialize, Serialize};

use crate::error::NowError;
use crate::query::EncodedQuery;

/// A single ServiceNow record: field name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// How reference and choice fields are returned.
///
/// Mirrors `sysparm_display_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub enum DisplayValue {
    /// Raw stored values (sys_ids for references).
    #[default]
    False,
    /// Human-readable display text.
    True,
    /// Both, as `{"value": ..., "display_value": ...}` pairs.
    All,
}

impl DisplayValue {
    /// The `sysparm_display_value` parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayValue::False => "false",
            DisplayValue::True => "true",
            DisplayValue::All => "all",
        }
    }
}

impl std::str::FromStr for DisplayValue {
    type Err = NowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "false" => Ok(DisplayValue::False),
            "true" => Ok(DisplayValue::True),
            "all" => Ok(DisplayValue::All),
            other => Err(NowError::validation(format!(
                "display_value must be one of: true, false, all (got {:?})",
                other
            ))),
        }
    }
}

impl TryFrom<serde_json::Value> for DisplayValue {
    type Error = NowError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Bool(true) => Ok(DisplayValue::True),
            serde_json::Value::Bool(false) => Ok(DisplayValue::False),
            serde_json::Value::String(s) => s.parse(),
            other => Err(NowError::validation(format!(
                "display_value must be one of: true, false, all (got {})",
                other
            ))),
        }
    }
}

impl From<DisplayValue> for String {
    fn from(mode: DisplayValue) -> Self {
        mode.as_str().to_string()
    }
}

/// Pagination for list calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// Maximum number of records (`sysparm_limit`).
    pub limit: Option<u32>,
    /// Number of records to skip (`sysparm_offset`).
    pub offset: Option<u32>,
}

impl Page {
    /// Validates caller-supplied pagination.
    ///
    /// A limit of zero means "server default" and is dropped.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` for negative or out-of-range values.
    pub fn from_input(limit: Option<i64>, offset: Option<i64>) -> Result<Self, NowError> {
        let convert = |name: &str, value: i64| {
            u32::try_from(value).map_err(|_| {
                NowError::validation(format!(
                    "{} must be a non-negative integer (got {})",
                    name, value
                ))
            })
        };
        Ok(Self {
            limit: limit.map(|v| convert("limit", v)).transpose()?.filter(|&v| v > 0),
            offset: offset.map(|v| convert("offset", v)).transpose()?,
        })
    }

    /// Uses `limit` when no limit was supplied.
    pub fn or_limit(mut self, limit: u32) -> Self {
        self.limit = self.limit.or(Some(limit));
        self
    }
}

/// Everything needed for one `GET /api/now/table/...` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRequest {
    /// Table name, e.g. `incident`.
    pub table: String,
    /// Fetch one record by sys_id instead of listing.
    pub sys_id: Option<String>,
    /// `sysparm_query`.
    pub query: Option<EncodedQuery>,
    /// `sysparm_fields`, comma-joined on the wire.
    pub fields: Vec<String>,
    /// Pagination.
    pub page: Page,
    /// `sysparm_display_value`.
    pub display_value: DisplayValue,
}

impl TableRequest {
    /// A list request against `table`.
    pub fn list(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sys_id: None,
            query: None,
            fields: Vec::new(),
            page: Page::default(),
            display_value: DisplayValue::default(),
        }
    }

    /// A single-record request against `table`.
    pub fn single(table: impl Into<String>, sys_id: impl Into<String>) -> Self {
        Self {
            sys_id: Some(sys_id.into()),
            ..Self::list(table)
        }
    }

    /// Sets the encoded query.
    pub fn with_query(mut self, query: Option<EncodedQuery>) -> Self {
        self.query = query;
        self
    }

    /// Sets the field projection.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    /// Sets pagination.
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    /// Sets the display-value mode.
    pub fn with_display_value(mut self, mode: DisplayValue) -> Self {
        self.display_value = mode;
        self
    }

    /// Query-string parameters, in a fixed order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(query) = &self.query {
            pairs.push(("sysparm_query", query.to_string()));
        }
        if !self.fields.is_empty() {
            pairs.push(("sysparm_fields", self.fields.join(",")));
        }
        if let Some(limit) = self.page.limit {
            pairs.push(("sysparm_limit", limit.to_string()));
        }
        if let Some(offset) = self.page.offset {
            pairs.push(("sysparm_offset", offset.to_string()));
        }
        pairs.push(("sysparm_display_value", self.display_value.as_str().to_string()));
        pairs
    }
}

/// `{"result": [...]}` returned by list calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope {
    /// Matching records (empty when nothing matched).
    #[serde(default)]
    pub result: Vec<Record>,
}

/// `{"result": {...}}` returned by single-record calls.
#[derive(Debug, Clone, Deserialize)]
pub struct SingleEnvelope {
    /// The record.
    pub result: Record,
}

/// The payload printed for a successful command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
    /// A list of records (possibly empty).
    Records(Vec<Record>),
    /// One record, or `{}` when a lookup found nothing.
    Record(Record),
    /// Combined catalog search.
    Catalog {
        /// Matching categories.
        categories: Vec<Record>,
        /// Matching items.
        items: Vec<Record>,
    },
    /// A catalog request with its requested items.
    RequestStatus {
        /// The `sc_request` record, or `{}` when not found.
        request: Record,
        /// Requested items; absent when the request was not found.
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Vec<Record>>,
    },
}

impl ResultSet {
    /// The empty object used for misses that are not errors.
    pub fn empty() -> Self {
        ResultSet::Record(Record::new())
    }
}
