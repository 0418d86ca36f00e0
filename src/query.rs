//! Encoded query construction.
//!
//! ServiceNow filters records with a single "encoded query" string: clauses of
//! the form `field OPERATOR value` joined by `^` (AND) or `^OR` (OR), with
//! optional `ORDERBY`/`ORDERBYDESC` directives at the end.
//!
//! [`QueryBuilder`] renders clauses in exactly the order they are added, so
//! the same input always yields a byte-identical [`EncodedQuery`].
//!
//! # Example
//!
//! ```
//! use now_query::query::{Clause, OrderBy, QueryBuilder};
//!
//! let query = QueryBuilder::new()
//!     .and(Clause::eq("active", "true"))?
//!     .raw(Some("state=1^ORstate=2"))
//!     .order_by(Some(&"-opened_at".parse::<OrderBy>()?))
//!     .build()
//!     .unwrap();
//! assert_eq!(query.as_str(), "active=true^state=1^ORstate=2^ORDERBYDESCopened_at");
//! # Ok::<(), now_query::error::NowError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NowError;

/// Units accepted by the relative date operators.
const RELATIVE_UNITS: &[&str] = &["minute", "hour", "dayofweek", "month", "quarter", "year"];

/// A comparison operator with its fixed encoded-query token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `LIKE` (contains, case-insensitive)
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `STARTSWITH`
    StartsWith,
    /// `ENDSWITH`
    EndsWith,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `IN` (comma-separated set)
    In,
    /// `NOT IN`
    NotIn,
    /// `ISEMPTY`
    IsEmpty,
    /// `ISNOTEMPTY`
    IsNotEmpty,
    /// `ON` (date)
    On,
    /// `NOTON` (date)
    NotOn,
    /// `<` (date before)
    Before,
    /// `>` (date after)
    After,
    /// `BETWEEN` (two dates joined by `@`)
    Between,
    /// `RELATIVEGT` (`unit@ago|ahead@n`)
    RelativeAfter,
    /// `RELATIVELT` (`unit@ago|ahead@n`)
    RelativeBefore,
}

impl Operator {
    /// Every operator, in parse-precedence order.
    pub const ALL: [Operator; 21] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Like,
        Operator::NotLike,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
        Operator::In,
        Operator::NotIn,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
        Operator::On,
        Operator::NotOn,
        Operator::Before,
        Operator::After,
        Operator::Between,
        Operator::RelativeAfter,
        Operator::RelativeBefore,
    ];

    /// The token written into the encoded query.
    pub fn encoding(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::StartsWith => "STARTSWITH",
            Operator::EndsWith => "ENDSWITH",
            Operator::Lt | Operator::Before => "<",
            Operator::Gt | Operator::After => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsEmpty => "ISEMPTY",
            Operator::IsNotEmpty => "ISNOTEMPTY",
            Operator::On => "ON",
            Operator::NotOn => "NOTON",
            Operator::Between => "BETWEEN",
            Operator::RelativeAfter => "RELATIVEGT",
            Operator::RelativeBefore => "RELATIVELT",
        }
    }

    /// The snake_case name accepted in JSON input.
    pub fn name(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "not_eq",
            Operator::Like => "contains",
            Operator::NotLike => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Lt => "lt",
            Operator::Gt => "gt",
            Operator::Le => "le",
            Operator::Ge => "ge",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::On => "on",
            Operator::NotOn => "not_on",
            Operator::Before => "before",
            Operator::After => "after",
            Operator::Between => "between",
            Operator::RelativeAfter => "relative_after",
            Operator::RelativeBefore => "relative_before",
        }
    }

    /// True for operators that test for emptiness and take no value.
    pub fn is_emptiness(self) -> bool {
        matches!(self, Operator::IsEmpty | Operator::IsNotEmpty)
    }

    /// True for set-membership operators.
    pub fn is_set(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding())
    }
}

impl FromStr for Operator {
    type Err = NowError;

    /// Parses either an encoded token (`IN`, `>=`, `LIKE`) or a name (`in`, `ge`, `contains`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Operator::ALL
            .iter()
            .copied()
            .find(|op| op.encoding().eq_ignore_ascii_case(s))
            .or_else(|| {
                Operator::ALL
                    .iter()
                    .copied()
                    .find(|op| op.name().eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| NowError::validation(format!("unknown operator: {:?}", s)))
    }
}

impl TryFrom<String> for Operator {
    type Error = NowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.encoding().to_string()
    }
}

/// The operand of a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseValue {
    /// No operand (only valid for emptiness operators).
    Empty,
    /// A single operand, rendered verbatim.
    One(String),
    /// A list operand, for set membership and date ranges.
    Many(Vec<String>),
}

impl ClauseValue {
    /// Converts a JSON value into an operand.
    ///
    /// Strings and numbers are taken verbatim, booleans become `true`/`false`,
    /// `null` is [`ClauseValue::Empty`], and arrays of scalars become a list.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` for objects and nested arrays.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, NowError> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(ClauseValue::Empty),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    scalar_text(item).ok_or_else(|| {
                        NowError::validation("list values must be strings, numbers or booleans")
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ClauseValue::Many),
            other => scalar_text(other)
                .map(ClauseValue::One)
                .ok_or_else(|| NowError::validation("filter values cannot be objects")),
        }
    }
}

/// Renders a scalar JSON value as encoded-query text.
pub(crate) fn scalar_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl From<&str> for ClauseValue {
    fn from(value: &str) -> Self {
        ClauseValue::One(value.to_string())
    }
}

impl From<String> for ClauseValue {
    fn from(value: String) -> Self {
        ClauseValue::One(value)
    }
}

impl From<Vec<String>> for ClauseValue {
    fn from(values: Vec<String>) -> Self {
        ClauseValue::Many(values)
    }
}

/// One `field OPERATOR value` condition.
///
/// Deserializes from `{"field": "state", "op": "IN", "value": ["1", "2"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawClause")]
pub struct Clause {
    field: String,
    operator: Operator,
    value: ClauseValue,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClause {
    field: String,
    #[serde(alias = "operator")]
    op: Operator,
    #[serde(default)]
    value: serde_json::Value,
}

impl TryFrom<RawClause> for Clause {
    type Error = NowError;

    fn try_from(raw: RawClause) -> Result<Self, Self::Error> {
        let field = raw.field.trim();
        if field.is_empty() || field.contains('^') || field.contains(char::is_whitespace) {
            return Err(NowError::validation(format!(
                "invalid condition field name: {:?}",
                raw.field
            )));
        }
        Ok(Clause::new(field, raw.op, ClauseValue::from_json(&raw.value)?))
    }
}

impl Clause {
    /// Creates a clause.
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<ClauseValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field=value`
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Eq, ClauseValue::One(value.into()))
    }

    /// `fieldLIKEvalue`
    pub fn like(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Like, ClauseValue::One(value.into()))
    }

    /// `fieldISEMPTY`
    pub fn is_empty(field: impl Into<String>) -> Self {
        Self::new(field, Operator::IsEmpty, ClauseValue::Empty)
    }

    /// The field this clause constrains.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The clause operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Renders the clause as `field` + operator token + value, without whitespace.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` when a non-emptiness operator has no
    /// value, when a single-value operator gets a list, or when a `BETWEEN` or
    /// relative operand is malformed.
    pub fn render(&self) -> Result<String, NowError> {
        let op = self.operator;
        let operand = match (op, &self.value) {
            (op, _) if op.is_emptiness() => String::new(),
            (_, ClauseValue::Empty) => {
                return Err(NowError::validation(format!(
                    "operator {} on field '{}' requires a value",
                    op.name(),
                    self.field
                )))
            }
            (Operator::Between, value) => render_between(&self.field, value)?,
            (Operator::RelativeAfter | Operator::RelativeBefore, value) => {
                format!("@{}", render_relative(&self.field, value)?)
            }
            (op, ClauseValue::Many(items)) if op.is_set() => {
                if items.is_empty() {
                    return Err(NowError::validation(format!(
                        "operator {} on field '{}' requires at least one value",
                        op.name(),
                        self.field
                    )));
                }
                items.join(",")
            }
            (_, ClauseValue::One(value)) => value.clone(),
            (op, ClauseValue::Many(_)) => {
                return Err(NowError::validation(format!(
                    "operator {} on field '{}' takes a single value",
                    op.name(),
                    self.field
                )))
            }
        };
        Ok(format!("{}{}{}", self.field, op.encoding(), operand))
    }
}

fn render_between(field: &str, value: &ClauseValue) -> Result<String, NowError> {
    let parts: Vec<&str> = match value {
        ClauseValue::One(s) => s.split('@').collect(),
        ClauseValue::Many(items) => items.iter().map(String::as_str).collect(),
        ClauseValue::Empty => Vec::new(),
    };
    if parts.len() != 2 || parts.iter().any(|p| p.trim().is_empty() || p.contains('@')) {
        return Err(NowError::validation(format!(
            "between on field '{}' needs two dates joined by '@'",
            field
        )));
    }
    Ok(parts.join("@"))
}

fn render_relative(field: &str, value: &ClauseValue) -> Result<String, NowError> {
    let parts: Vec<&str> = match value {
        ClauseValue::One(s) => s.trim_start_matches('@').split('@').collect(),
        ClauseValue::Many(items) => items.iter().map(String::as_str).collect(),
        ClauseValue::Empty => Vec::new(),
    };
    let malformed = || {
        NowError::validation(format!(
            "relative date on field '{}' must look like 'hour@ago@3' (units: {})",
            field,
            RELATIVE_UNITS.join(", ")
        ))
    };

    let [unit, direction, amount] = parts.as_slice() else {
        return Err(malformed());
    };
    if !RELATIVE_UNITS.contains(unit)
        || !matches!(*direction, "ago" | "ahead")
        || amount.parse::<u32>().is_err()
    {
        return Err(malformed());
    }
    Ok(format!("{}@{}@{}", unit, direction, amount))
}

/// Sort directive carried inside the encoded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    field: String,
    descending: bool,
}

impl OrderBy {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// `ORDERBYfield` or `ORDERBYDESCfield`.
    pub fn directive(&self) -> String {
        if self.descending {
            format!("ORDERBYDESC{}", self.field)
        } else {
            format!("ORDERBY{}", self.field)
        }
    }
}

impl FromStr for OrderBy {
    type Err = NowError;

    /// Parses `field` (ascending) or `-field` (descending).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (field, descending) = match s.strip_prefix('-') {
            Some(rest) => (rest.trim(), true),
            None => (s, false),
        };
        if field.is_empty() || field.contains('^') || field.contains(char::is_whitespace) {
            return Err(NowError::validation(format!(
                "order_by must be a field name, optionally prefixed with '-', got {:?}",
                s
            )));
        }
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }
}

/// An immutable, fully rendered encoded query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EncodedQuery(String);

impl EncodedQuery {
    /// The query text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the query, returning its text.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EncodedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EncodedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Accumulates clauses in order and renders an [`EncodedQuery`].
///
/// Clauses and disjunction groups are joined with `^`. The raw fragment is
/// appended after every clause and the ordering directive after that,
/// regardless of the order the builder methods are called in.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    parts: Vec<String>,
    raw: Option<String>,
    order: Option<OrderBy>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// ANDs one clause onto the query.
    ///
    /// # Errors
    ///
    /// Propagates [`Clause::render`] failures.
    pub fn and(mut self, clause: Clause) -> Result<Self, NowError> {
        self.parts.push(clause.render()?);
        Ok(self)
    }

    /// ANDs a group of clauses joined by `^OR`.
    ///
    /// ServiceNow binds `^OR` tighter than `^`, so `a^b^ORc` means
    /// `a AND (b OR c)`. An empty group adds nothing.
    ///
    /// # Errors
    ///
    /// Propagates [`Clause::render`] failures.
    pub fn and_any<I>(mut self, clauses: I) -> Result<Self, NowError>
    where
        I: IntoIterator<Item = Clause>,
    {
        let rendered = clauses
            .into_iter()
            .map(|c| c.render())
            .collect::<Result<Vec<_>, _>>()?;
        if !rendered.is_empty() {
            self.parts.push(rendered.join("^OR"));
        }
        Ok(self)
    }

    /// Sets the raw fragment, appended verbatim after every clause.
    ///
    /// Blank fragments are ignored; anything else is never parsed or altered.
    pub fn raw(mut self, fragment: Option<&str>) -> Self {
        self.raw = fragment
            .filter(|f| !f.trim().is_empty())
            .map(str::to_string);
        self
    }

    /// Sets the ordering directive.
    pub fn order_by(mut self, order: Option<&OrderBy>) -> Self {
        self.order = order.cloned();
        self
    }

    /// True when nothing would be rendered.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.raw.is_none() && self.order.is_none()
    }

    /// Renders the query, or `None` when there is nothing to filter or sort on.
    pub fn build(self) -> Option<EncodedQuery> {
        let mut parts = self.parts;
        parts.extend(self.raw);
        parts.extend(self.order.map(|o| o.directive()));

        if parts.is_empty() {
            None
        } else {
            Some(EncodedQuery(parts.join("^")))
        }
    }
}

/// Builds an encoded query from clauses, a raw fragment and an ordering.
///
/// # Errors
///
/// Returns `NowError::Validation` if any clause is malformed.
pub fn build_query(
    clauses: &[Clause],
    raw: Option<&str>,
    order: Option<&OrderBy>,
) -> Result<Option<EncodedQuery>, NowError> {
    let builder = clauses
        .iter()
        .cloned()
        .try_fold(QueryBuilder::new(), QueryBuilder::and)?;
    Ok(builder.raw(raw).order_by(order).build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(field: &str, op: Operator, value: ClauseValue) -> String {
        Clause::new(field, op, value).render().unwrap()
    }

    #[test]
    fn test_operator_encoding_table() {
        let one = |s: &str| ClauseValue::One(s.to_string());
        let cases = [
            (Operator::Eq, one("1"), "state=1"),
            (Operator::NotEq, one("1"), "state!=1"),
            (Operator::Like, one("mail"), "stateLIKEmail"),
            (Operator::NotLike, one("mail"), "stateNOT LIKEmail"),
            (Operator::StartsWith, one("mail"), "stateSTARTSWITHmail"),
            (Operator::EndsWith, one("mail"), "stateENDSWITHmail"),
            (Operator::Lt, one("3"), "state<3"),
            (Operator::Gt, one("3"), "state>3"),
            (Operator::Le, one("3"), "state<=3"),
            (Operator::Ge, one("3"), "state>=3"),
            (Operator::In, one("1,2"), "stateIN1,2"),
            (Operator::NotIn, one("1,2"), "stateNOT IN1,2"),
            (Operator::IsEmpty, ClauseValue::Empty, "stateISEMPTY"),
            (Operator::IsNotEmpty, ClauseValue::Empty, "stateISNOTEMPTY"),
            (Operator::On, one("2024-01-01"), "stateON2024-01-01"),
            (Operator::NotOn, one("2024-01-01"), "stateNOTON2024-01-01"),
            (Operator::Before, one("2024-01-01"), "state<2024-01-01"),
            (Operator::After, one("2024-01-01"), "state>2024-01-01"),
            (
                Operator::Between,
                one("2024-01-01@2024-02-01"),
                "stateBETWEEN2024-01-01@2024-02-01",
            ),
            (
                Operator::RelativeAfter,
                one("hour@ago@3"),
                "stateRELATIVEGT@hour@ago@3",
            ),
            (
                Operator::RelativeBefore,
                one("month@ahead@1"),
                "stateRELATIVELT@month@ahead@1",
            ),
        ];
        assert_eq!(cases.len(), Operator::ALL.len());
        for (op, value, expected) in cases {
            assert_eq!(render("state", op, value), expected, "operator {:?}", op);
        }
    }

    #[test]
    fn test_in_with_list() {
        let clause = Clause::new(
            "state",
            Operator::In,
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
        );
        assert_eq!(clause.render().unwrap(), "stateIN1,2,3");
    }

    #[test]
    fn test_clause_deserializes_from_json() {
        let clause: Clause =
            serde_json::from_value(json!({"field": "state", "op": "IN", "value": ["1", "2", "3"]}))
                .unwrap();
        assert_eq!(clause.render().unwrap(), "stateIN1,2,3");

        let clause: Clause =
            serde_json::from_value(json!({"field": "priority", "op": "le", "value": 2})).unwrap();
        assert_eq!(clause.render().unwrap(), "priority<=2");

        let clause: Clause =
            serde_json::from_value(json!({"field": "assigned_to", "operator": "ISEMPTY"}))
                .unwrap();
        assert_eq!(clause.render().unwrap(), "assigned_toISEMPTY");
    }

    #[test]
    fn test_clause_rejects_bad_field() {
        let result: Result<Clause, _> =
            serde_json::from_value(json!({"field": "a^b", "op": "=", "value": "1"}));
        assert!(result.is_err());
        let result: Result<Clause, _> =
            serde_json::from_value(json!({"field": "", "op": "=", "value": "1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("IN".parse::<Operator>().unwrap(), Operator::In);
        assert_eq!("contains".parse::<Operator>().unwrap(), Operator::Like);
        assert_eq!("NOT LIKE".parse::<Operator>().unwrap(), Operator::NotLike);
        assert_eq!("<".parse::<Operator>().unwrap(), Operator::Lt);
        assert_eq!("before".parse::<Operator>().unwrap(), Operator::Before);
        assert_eq!("relativegt".parse::<Operator>().unwrap(), Operator::RelativeAfter);
        assert!("~=".parse::<Operator>().is_err());
    }

    #[test]
    fn test_missing_value_rejected() {
        let err = Clause::new("state", Operator::Eq, ClauseValue::Empty)
            .render()
            .unwrap_err();
        assert!(matches!(err, NowError::Validation(_)));
        assert!(err.to_string().contains("requires a value"));
    }

    #[test]
    fn test_emptiness_ignores_value() {
        let clause = Clause::new("parent", Operator::IsEmpty, "ignored");
        assert_eq!(clause.render().unwrap(), "parentISEMPTY");
    }

    #[test]
    fn test_between_validation() {
        let bad = ["2024-01-01", "2024-01-01@", "@2024-01-01", "a@b@c"];
        for value in bad {
            let err = Clause::new("opened_at", Operator::Between, value)
                .render()
                .unwrap_err();
            assert!(matches!(err, NowError::Validation(_)), "value {}", value);
        }
        let clause = Clause::new(
            "opened_at",
            Operator::Between,
            vec!["2024-01-01".to_string(), "2024-01-31".to_string()],
        );
        assert_eq!(
            clause.render().unwrap(),
            "opened_atBETWEEN2024-01-01@2024-01-31"
        );
    }

    #[test]
    fn test_relative_validation() {
        for value in ["hour@ago", "week@ago@1", "hour@later@1", "hour@ago@x"] {
            assert!(
                Clause::new("opened_at", Operator::RelativeAfter, value)
                    .render()
                    .is_err(),
                "value {}",
                value
            );
        }
        let clause = Clause::new("opened_at", Operator::RelativeAfter, "@dayofweek@ago@7");
        assert_eq!(
            clause.render().unwrap(),
            "opened_atRELATIVEGT@dayofweek@ago@7"
        );
    }

    #[test]
    fn test_single_value_operator_rejects_list() {
        let clause = Clause::new("state", Operator::Eq, vec!["1".to_string()]);
        assert!(clause.render().is_err());
    }

    #[test]
    fn test_raw_fragment_appended_verbatim() {
        let query = QueryBuilder::new()
            .and(Clause::eq("active", "true"))
            .unwrap()
            .raw(Some("state=1^ORstate=2"))
            .build()
            .unwrap();
        assert_eq!(query.as_str(), "active=true^state=1^ORstate=2");
    }

    #[test]
    fn test_raw_fragment_alone() {
        let query = QueryBuilder::new().raw(Some("priority<=2")).build().unwrap();
        assert_eq!(query.as_str(), "priority<=2");
    }

    #[test]
    fn test_blank_raw_ignored() {
        assert!(QueryBuilder::new().raw(Some("  ")).build().is_none());
        assert!(QueryBuilder::new().build().is_none());
    }

    #[test]
    fn test_any_group() {
        let query = QueryBuilder::new()
            .and(Clause::eq("sys_class_name", "cmdb_ci_server"))
            .unwrap()
            .and_any(vec![
                Clause::like("name", "web"),
                Clause::like("asset_tag", "web"),
            ])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            query.as_str(),
            "sys_class_name=cmdb_ci_server^nameLIKEweb^ORasset_tagLIKEweb"
        );
    }

    #[test]
    fn test_order_by_parse_and_render() {
        let asc: OrderBy = "number".parse().unwrap();
        let desc: OrderBy = "-sys_created_on".parse().unwrap();
        assert_eq!(asc.directive(), "ORDERBYnumber");
        assert_eq!(desc.directive(), "ORDERBYDESCsys_created_on");
        assert!("-".parse::<OrderBy>().is_err());
        assert!("".parse::<OrderBy>().is_err());
        assert!("a^b".parse::<OrderBy>().is_err());
    }

    #[test]
    fn test_order_comes_after_raw() {
        let order = OrderBy::desc("opened_at");
        let query = QueryBuilder::new()
            .order_by(Some(&order))
            .raw(Some("active=true"))
            .and(Clause::eq("state", "1"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            query.as_str(),
            "state=1^active=true^ORDERBYDESCopened_at"
        );
    }

    #[test]
    fn test_order_alone() {
        let query = QueryBuilder::new()
            .order_by(Some(&OrderBy::asc("name")))
            .build()
            .unwrap();
        assert_eq!(query.as_str(), "ORDERBYname");
    }

    #[test]
    fn test_build_query_is_deterministic() {
        let clauses = vec![
            Clause::eq("state", "1"),
            Clause::new("urgency", Operator::In, "1,2"),
            Clause::is_empty("assigned_to"),
        ];
        let order = OrderBy::asc("number");
        let first = build_query(&clauses, Some("active=true"), Some(&order)).unwrap();
        let second = build_query(&clauses, Some("active=true"), Some(&order)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.unwrap().as_str(),
            "state=1^urgencyIN1,2^assigned_toISEMPTY^active=true^ORDERBYnumber"
        );
    }

    #[test]
    fn test_clause_value_from_json() {
        assert_eq!(
            ClauseValue::from_json(&json!(true)).unwrap(),
            ClauseValue::One("true".to_string())
        );
        assert_eq!(
            ClauseValue::from_json(&json!(-2)).unwrap(),
            ClauseValue::One("-2".to_string())
        );
        assert_eq!(
            ClauseValue::from_json(&json!(null)).unwrap(),
            ClauseValue::Empty
        );
        assert!(ClauseValue::from_json(&json!({"a": 1})).is_err());
        assert!(ClauseValue::from_json(&json!([[1]])).is_err());
    }
}
