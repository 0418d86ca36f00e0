//! Request parsing.
//!
//! Turns the caller's JSON object into a [`RequestSpec`]: the action is
//! resolved against the domain's table, every key is checked against the
//! action's closed vocabulary, and every value is converted to its typed form.
//! All of this happens before a client exists, so a bad request never reaches
//! the network.
//!
//! # Input Sanitization
//!
//! String values are trimmed. Blank strings count as absent.

use serde_json::{Map, Value};

use crate::error::NowError;
use crate::models::{DisplayValue, Page};
use crate::query::{scalar_text, Clause, ClauseValue, OrderBy, Operator};

use super::domains::{ActionKind, ActionSpec, Domain, FilterBinding, FilterKind};

/// Keys accepted by every action.
const UNIVERSAL_KEYS: &[&str] = &[
    "action",
    "fields",
    "limit",
    "offset",
    "order_by",
    "display_value",
];

/// Keys accepted only by list actions.
const LIST_KEYS: &[&str] = &["query", "conditions"];

/// Helper function to trim an optional string.
fn trim_option(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Which side of a CI relationship to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// The CI is the parent.
    Parent,
    /// The CI is the child.
    Child,
    /// Either side.
    #[default]
    Both,
}

/// How a catalog request is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRef {
    /// By `sys_id`.
    SysId(String),
    /// By request number, e.g. `REQ0010001`.
    Number(String),
}

/// Typed, validated arguments for one action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionArgs {
    /// See [`ActionKind::Get`].
    Get {
        /// Record sys_id.
        sys_id: String,
    },
    /// See [`ActionKind::Find`].
    Find {
        /// Key value.
        key: String,
        /// Extra named filters.
        filters: Vec<Clause>,
    },
    /// See [`ActionKind::Query`].
    Query {
        /// Named filters.
        filters: Vec<Clause>,
    },
    /// See [`ActionKind::Search`].
    Search {
        /// Text searched for.
        term: String,
        /// Extra named filters.
        filters: Vec<Clause>,
    },
    /// See [`ActionKind::Lookup`].
    Lookup {
        /// Key value.
        key: String,
        /// Extra named filters.
        filters: Vec<Clause>,
    },
    /// See [`ActionKind::Latest`].
    Latest,
    /// See [`ActionKind::Relationships`].
    Relationships {
        /// CI sys_id.
        sys_id: String,
        /// Side of the relationship.
        direction: Direction,
        /// Extra named filters.
        filters: Vec<Clause>,
    },
    /// See [`ActionKind::CatalogSearch`].
    CatalogSearch {
        /// Text searched for.
        term: String,
        /// Search categories.
        categories: bool,
        /// Search items.
        items: bool,
        /// Restrict both searches to active records.
        active_only: bool,
    },
    /// See [`ActionKind::RequestStatus`].
    RequestStatus {
        /// The request.
        target: RequestRef,
        /// Also fetch its requested items.
        include_items: bool,
    },
}

/// A fully validated request for one domain action.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Domain the request targets.
    pub domain: Domain,
    /// Resolved action.
    pub action: &'static ActionSpec,
    /// Action arguments.
    pub args: ActionArgs,
    /// Caller projection; `None` means the action default.
    pub fields: Option<Vec<String>>,
    /// Pagination.
    pub page: Page,
    /// Ordering.
    pub order_by: Option<OrderBy>,
    /// Reference field shape.
    pub display_value: DisplayValue,
    /// Raw encoded-query fragment, appended verbatim.
    pub raw_query: Option<String>,
    /// Structured conditions, in input order.
    pub conditions: Vec<Clause>,
}

impl RequestSpec {
    /// Parses and validates caller input for `domain`.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` for a missing or unknown action, an
    /// unknown key, a missing required parameter, or a malformed value.
    pub fn parse(domain: Domain, input: Value) -> Result<Self, NowError> {
        let params = match input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(NowError::validation(format!(
                    "input must be a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        let spec = domain.spec();
        let action_name = match params.get("action") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => trim_option(Some(s)),
            Some(other) => Some(other.to_string()),
        };
        let Some(action_name) = action_name else {
            return Err(NowError::validation(format!(
                "action is required. Valid actions: {}",
                spec.action_names()
            )));
        };
        let action = spec.action(&action_name).ok_or_else(|| {
            NowError::validation(format!(
                "Invalid action: {}. Valid actions: {}",
                action_name,
                spec.action_names()
            ))
        })?;

        let input = Input {
            action,
            params: &params,
        };
        input.check_keys()?;

        let fields = input.fields()?;
        let page = Page::from_input(input.integer("limit")?, input.integer("offset")?)?;
        let order_by = match input.get("order_by") {
            None => None,
            Some(Value::String(s)) => Some(s.parse::<OrderBy>()?),
            Some(_) => return Err(NowError::validation("order_by must be a string")),
        };
        let display_value = match input.get("display_value") {
            None => DisplayValue::default(),
            Some(value) => DisplayValue::try_from(value.clone())?,
        };
        let raw_query = input.fragment("query")?;
        let conditions = input.conditions()?;
        let args = input.args()?;

        tracing::debug!(
            domain = %domain,
            action = action.name,
            conditions = conditions.len(),
            "Parsed request"
        );

        Ok(Self {
            domain,
            action,
            args,
            fields,
            page,
            order_by,
            display_value,
            raw_query,
            conditions,
        })
    }

    /// The caller projection, or the given default.
    pub fn fields_or(&self, default: &[&str]) -> Vec<String> {
        match &self.fields {
            Some(fields) => fields.clone(),
            None => default.iter().map(|f| f.to_string()).collect(),
        }
    }
}

fn listed(keys: &[&str], key: &str) -> bool {
    keys.iter().any(|k| *k == key)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Borrowed view of the input object for one action.
struct Input<'a> {
    action: &'static ActionSpec,
    params: &'a Map<String, Value>,
}

impl<'a> Input<'a> {
    /// A present, non-null value.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.params.get(key).filter(|v| !v.is_null())
    }

    fn check_keys(&self) -> Result<(), NowError> {
        let kind_params = self.action.kind.params();
        let is_list = self.action.kind.is_list();
        let accepted = |key: &str| {
            listed(UNIVERSAL_KEYS, key)
                || listed(&kind_params, key)
                || self.action.filters.iter().any(|f| f.param == key)
                || (is_list && listed(LIST_KEYS, key))
        };

        let mut unknown: Vec<&str> = self
            .params
            .keys()
            .map(String::as_str)
            .filter(|k| !accepted(*k))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();

        let mut allowed: Vec<&str> = kind_params;
        allowed.extend(self.action.filters.iter().map(|f| f.param));
        if is_list {
            allowed.extend_from_slice(LIST_KEYS);
        }
        allowed.extend(UNIVERSAL_KEYS.iter().filter(|k| **k != "action"));

        Err(NowError::validation(format!(
            "Unknown parameter(s) for {} action: {}. Accepted: {}",
            self.action.name,
            unknown.join(", "),
            allowed.join(", ")
        )))
    }

    /// A scalar parameter as trimmed text; blank is absent.
    fn text(&self, key: &str) -> Result<Option<String>, NowError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match scalar_text(value) {
                Some(text) => Ok(trim_option(Some(&text))),
                None => Err(NowError::validation(format!(
                    "{} must be a string, got {}",
                    key,
                    json_type(value)
                ))),
            },
        }
    }

    /// A caller-supplied encoded-query fragment, kept byte for byte.
    /// Blank fragments are absent.
    fn fragment(&self, key: &str) -> Result<Option<String>, NowError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(NowError::validation(format!(
                "{} must be a string, got {}",
                key,
                json_type(other)
            ))),
        }
    }

    /// A required scalar parameter.
    fn require(&self, key: &str) -> Result<String, NowError> {
        self.text(key)?.ok_or_else(|| {
            NowError::validation(format!(
                "{} is required for {} action",
                key, self.action.name
            ))
        })
    }

    /// A boolean parameter, accepting JSON booleans and `"true"`/`"false"`.
    fn flag(&self, key: &str) -> Result<Option<bool>, NowError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
            Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
            Some(other) => Err(NowError::validation(format!(
                "{} must be true or false, got {}",
                key, other
            ))),
        }
    }

    /// A signed integer parameter; range checks happen in [`Page::from_input`].
    fn integer(&self, key: &str) -> Result<Option<i64>, NowError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| NowError::validation(format!("{} must be an integer", key))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| NowError::validation(format!("{} must be an integer", key))),
            Some(other) => Err(NowError::validation(format!(
                "{} must be an integer, got {}",
                key,
                json_type(other)
            ))),
        }
    }

    /// `fields` as a comma-separated string or an array of strings.
    fn fields(&self) -> Result<Option<Vec<String>>, NowError> {
        let fields: Vec<String> = match self.get("fields") {
            None => return Ok(None),
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        NowError::validation("fields must be a string or an array of strings")
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(NowError::validation(
                    "fields must be a string or an array of strings",
                ))
            }
        };
        let fields: Vec<String> = fields
            .iter()
            .filter_map(|f| trim_option(Some(f)))
            .collect();
        Ok(Some(fields).filter(|f| !f.is_empty()))
    }

    fn conditions(&self) -> Result<Vec<Clause>, NowError> {
        match self.get("conditions") {
            None => Ok(Vec::new()),
            Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())
                .map_err(|e| NowError::validation(format!("invalid conditions: {}", e))),
            Some(_) => Err(NowError::validation(
                "conditions must be an array of {field, op, value} objects",
            )),
        }
    }

    /// Clauses for the action's named filters, in configuration order.
    fn filters(&self) -> Result<Vec<Clause>, NowError> {
        let mut clauses = Vec::new();
        for binding in self.action.filters {
            if let Some(clause) = self.filter(binding)? {
                clauses.push(clause);
            }
        }
        Ok(clauses)
    }

    fn filter(&self, binding: &FilterBinding) -> Result<Option<Clause>, NowError> {
        let field = binding.field;
        match binding.kind {
            FilterKind::Flag => Ok(self
                .flag(binding.param)?
                .map(|b| Clause::eq(field, b.to_string()))),
            FilterKind::Text | FilterKind::NullableRef => {
                if let Some(value @ Value::Array(_)) = self.get(binding.param) {
                    return match ClauseValue::from_json(value)? {
                        ClauseValue::Many(items) if !items.is_empty() => {
                            Ok(Some(Clause::new(field, Operator::In, items)))
                        }
                        _ => Err(NowError::validation(format!(
                            "{} requires at least one value",
                            binding.param
                        ))),
                    };
                }
                let Some(text) = self.text(binding.param)? else {
                    return Ok(None);
                };
                if binding.kind == FilterKind::NullableRef && text.eq_ignore_ascii_case("null") {
                    return Ok(Some(Clause::is_empty(field)));
                }
                Ok(Some(Clause::eq(field, text)))
            }
        }
    }

    fn args(&self) -> Result<ActionArgs, NowError> {
        let args = match self.action.kind {
            ActionKind::Get { .. } => ActionArgs::Get {
                sys_id: self.require("sys_id")?,
            },
            ActionKind::Find { param, .. } => ActionArgs::Find {
                key: self.require(param)?,
                filters: self.filters()?,
            },
            ActionKind::Query => ActionArgs::Query {
                filters: self.filters()?,
            },
            ActionKind::Search { .. } => ActionArgs::Search {
                term: self.require("search_term")?,
                filters: self.filters()?,
            },
            ActionKind::Lookup { param, .. } => ActionArgs::Lookup {
                key: self.require(param)?,
                filters: self.filters()?,
            },
            ActionKind::Latest { .. } => ActionArgs::Latest,
            ActionKind::Relationships => ActionArgs::Relationships {
                sys_id: self.require("sys_id")?,
                direction: self.direction()?,
                filters: self.filters()?,
            },
            ActionKind::CatalogSearch { .. } => ActionArgs::CatalogSearch {
                term: self.require("search_term")?,
                categories: self.flag("search_categories")?.unwrap_or(true),
                items: self.flag("search_items")?.unwrap_or(true),
                active_only: self.flag("active_only")?.unwrap_or(true),
            },
            ActionKind::RequestStatus { .. } => {
                let target = match (self.text("request_sys_id")?, self.text("request_number")?) {
                    (Some(sys_id), _) => RequestRef::SysId(sys_id),
                    (None, Some(number)) => RequestRef::Number(number),
                    (None, None) => {
                        return Err(NowError::validation(format!(
                            "Either request_number or request_sys_id is required for {} action",
                            self.action.name
                        )))
                    }
                };
                ActionArgs::RequestStatus {
                    target,
                    include_items: self.flag("include_items")?.unwrap_or(true),
                }
            }
        };
        Ok(args)
    }

    fn direction(&self) -> Result<Direction, NowError> {
        match self.text("direction")?.as_deref().map(str::to_ascii_lowercase) {
            None => Ok(Direction::Both),
            Some(d) => match d.as_str() {
                "parent" => Ok(Direction::Parent),
                "child" => Ok(Direction::Child),
                "both" => Ok(Direction::Both),
                _ => Err(NowError::validation(format!(
                    "direction must be one of: parent, child, both (got {:?})",
                    d
                ))),
            },
        }
    }
}
