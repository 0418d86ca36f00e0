//! Domain request dispatch.
//!
//! One engine serves all six domains. [`RequestSpec::parse`] validates the
//! input against the domain's action table; [`Dispatcher::execute`] turns the
//! validated request into one or two Table API reads and normalizes the
//! records for the requested display-value mode.

mod domains;
mod input;

pub use domains::{ActionKind, ActionSpec, Domain, DomainSpec, FilterBinding, FilterKind, Miss};
pub use input::{ActionArgs, Direction, RequestRef, RequestSpec};

use serde_json::Value;

use crate::client::ServiceNowClient;
use crate::error::NowError;
use crate::models::{Page, Record, ResultSet, TableRequest};
use crate::normalize::{normalize_record, normalize_records};
use crate::query::{Clause, EncodedQuery, OrderBy, QueryBuilder};

/// Column used to order `latest` results.
const CREATED_ON: &str = "sys_created_on";

/// Executes validated requests against a [`ServiceNowClient`].
#[derive(Clone)]
pub struct Dispatcher {
    client: ServiceNowClient,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(client: ServiceNowClient) -> Self {
        Self { client }
    }

    /// Parses `input` for `domain` and executes it.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` before any network call when the input
    /// is invalid, otherwise whatever [`Dispatcher::execute`] returns.
    pub async fn run(&self, domain: Domain, input: Value) -> Result<ResultSet, NowError> {
        let spec = RequestSpec::parse(domain, input)?;
        self.execute(&spec).await
    }

    /// Executes a validated request.
    ///
    /// # Errors
    ///
    /// Returns `NowError::NotFound` for misses on actions configured to fail,
    /// and propagates client errors untouched.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ResultSet, NowError> {
        let action = spec.action;
        tracing::debug!(
            domain = %spec.domain,
            action = action.name,
            table = action.table,
            "Dispatching request"
        );

        match (&spec.args, action.kind) {
            (ActionArgs::Get { sys_id }, ActionKind::Get { miss, label }) => {
                let request = self
                    .base(spec, action.table, action.default_fields)
                    .with_page(Page::default());
                let request = TableRequest {
                    sys_id: Some(sys_id.clone()),
                    ..request
                };
                let found = match self.client.get_record(&request).await {
                    Ok(record) => record,
                    Err(NowError::NotFound { .. }) => None,
                    Err(e) => return Err(e),
                };
                self.single(spec, found, miss, || {
                    format!("{} with sys_id '{}'", label, sys_id)
                })
            }

            (
                ActionArgs::Find { key, filters },
                ActionKind::Find {
                    field, miss, label, ..
                },
            ) => {
                let builder = QueryBuilder::new().and(Clause::eq(field, key.as_str()))?;
                let query = add_all(builder, filters)?.build();
                let request = self
                    .base(spec, action.table, action.default_fields)
                    .with_query(query)
                    .with_page(Page {
                        limit: Some(1),
                        offset: None,
                    });
                let found = self.client.get_records(&request).await?.into_iter().next();
                self.single(spec, found, miss, || {
                    format!("{} with {} '{}'", label, field, key)
                })
            }

            (ActionArgs::Query { filters }, ActionKind::Query) => {
                let builder = add_all(QueryBuilder::new(), filters)?;
                self.list(spec, builder, spec.page, spec.order_by.as_ref())
                    .await
            }

            (ActionArgs::Search { term, filters }, ActionKind::Search { columns }) => {
                let builder = add_all(QueryBuilder::new(), filters)?
                    .and_any(columns.iter().map(|c| Clause::like(*c, term.as_str())))?;
                self.list(spec, builder, spec.page, spec.order_by.as_ref())
                    .await
            }

            (ActionArgs::Lookup { key, filters }, ActionKind::Lookup { field, .. }) => {
                let builder = QueryBuilder::new().and(Clause::eq(field, key.as_str()))?;
                let builder = add_all(builder, filters)?;
                self.list(spec, builder, spec.page, spec.order_by.as_ref())
                    .await
            }

            (ActionArgs::Latest, ActionKind::Latest { default_limit }) => {
                let newest = OrderBy::desc(CREATED_ON);
                let order = spec.order_by.as_ref().unwrap_or(&newest);
                self.list(
                    spec,
                    QueryBuilder::new(),
                    spec.page.or_limit(default_limit),
                    Some(order),
                )
                .await
            }

            (
                ActionArgs::Relationships {
                    sys_id,
                    direction,
                    filters,
                },
                ActionKind::Relationships,
            ) => {
                let parent = Clause::eq("parent", sys_id.as_str());
                let child = Clause::eq("child", sys_id.as_str());
                let builder = match direction {
                    Direction::Parent => QueryBuilder::new().and(parent)?,
                    Direction::Child => QueryBuilder::new().and(child)?,
                    Direction::Both => QueryBuilder::new().and_any([parent, child])?,
                };
                let builder = add_all(builder, filters)?;
                self.list(spec, builder, spec.page, spec.order_by.as_ref())
                    .await
            }

            (
                ActionArgs::CatalogSearch {
                    term,
                    categories,
                    items,
                    active_only,
                },
                ActionKind::CatalogSearch {
                    category_table,
                    category_fields,
                    item_table,
                    item_fields,
                },
            ) => {
                let categories = if *categories {
                    let request = self
                        .base(spec, category_table, category_fields)
                        .with_query(catalog_search(
                            &["title", "description"],
                            term,
                            *active_only,
                        )?);
                    self.records(spec, &request).await?
                } else {
                    Vec::new()
                };
                let items = if *items {
                    let request = self
                        .base(spec, item_table, item_fields)
                        .with_query(catalog_search(
                            &["name", "short_description", "description"],
                            term,
                            *active_only,
                        )?);
                    self.records(spec, &request).await?
                } else {
                    Vec::new()
                };
                Ok(ResultSet::Catalog { categories, items })
            }

            (
                ActionArgs::RequestStatus {
                    target,
                    include_items,
                },
                ActionKind::RequestStatus {
                    item_table,
                    item_fields,
                },
            ) => {
                let base = self.base(spec, action.table, action.default_fields);
                let request = match target {
                    RequestRef::SysId(sys_id) => {
                        let request = TableRequest {
                            sys_id: Some(sys_id.clone()),
                            ..base
                        };
                        match self.client.get_record(&request).await {
                            Ok(record) => record,
                            Err(NowError::NotFound { .. }) => None,
                            Err(e) => return Err(e),
                        }
                    }
                    RequestRef::Number(number) => {
                        let query = QueryBuilder::new()
                            .and(Clause::eq("number", number.as_str()))?
                            .build();
                        let request = base.with_query(query).with_page(Page {
                            limit: Some(1),
                            offset: None,
                        });
                        self.client.get_records(&request).await?.into_iter().next()
                    }
                };

                let Some(request) = request else {
                    tracing::debug!("Catalog request not found");
                    return Ok(ResultSet::empty());
                };

                let request_id = record_id(&request).or_else(|| match target {
                    RequestRef::SysId(sys_id) => Some(sys_id.clone()),
                    RequestRef::Number(_) => None,
                });
                let items = match request_id {
                    Some(id) if *include_items => {
                        let query = QueryBuilder::new()
                            .and(Clause::eq("request", id))?
                            .build();
                        let request = self
                            .base(spec, item_table, item_fields)
                            .with_query(query)
                            .with_page(Page::default());
                        Some(self.records(spec, &request).await?)
                    }
                    _ => None,
                };

                Ok(ResultSet::RequestStatus {
                    request: normalize_record(request, spec.display_value),
                    items,
                })
            }

            (args, kind) => Err(NowError::validation(format!(
                "arguments {:?} do not match action kind {:?}",
                args, kind
            ))),
        }
    }

    /// A request against `table` with the caller's projection, pagination
    /// and display-value mode.
    fn base(&self, spec: &RequestSpec, table: &str, default_fields: &[&str]) -> TableRequest {
        TableRequest::list(table)
            .with_fields(spec.fields_or(default_fields))
            .with_page(spec.page)
            .with_display_value(spec.display_value)
    }

    /// Runs a list action: conditions, raw fragment and ordering are added
    /// after the action's own clauses.
    async fn list(
        &self,
        spec: &RequestSpec,
        builder: QueryBuilder,
        page: Page,
        order: Option<&OrderBy>,
    ) -> Result<ResultSet, NowError> {
        let query = add_all(builder, &spec.conditions)?
            .raw(spec.raw_query.as_deref())
            .order_by(order)
            .build();
        let request = self
            .base(spec, spec.action.table, spec.action.default_fields)
            .with_query(query)
            .with_page(page);
        Ok(ResultSet::Records(self.records(spec, &request).await?))
    }

    async fn records(
        &self,
        spec: &RequestSpec,
        request: &TableRequest,
    ) -> Result<Vec<Record>, NowError> {
        let records = self.client.get_records(request).await?;
        tracing::debug!(table = %request.table, count = records.len(), "Fetched records");
        Ok(normalize_records(records, spec.display_value))
    }

    fn single(
        &self,
        spec: &RequestSpec,
        found: Option<Record>,
        miss: Miss,
        describe: impl FnOnce() -> String,
    ) -> Result<ResultSet, NowError> {
        match (found, miss) {
            (Some(record), _) => Ok(ResultSet::Record(normalize_record(
                record,
                spec.display_value,
            ))),
            (None, Miss::Empty) => Ok(ResultSet::empty()),
            (None, Miss::NotFound) => Err(NowError::not_found(describe())),
        }
    }
}

fn add_all(builder: QueryBuilder, clauses: &[Clause]) -> Result<QueryBuilder, NowError> {
    clauses
        .iter()
        .cloned()
        .try_fold(builder, QueryBuilder::and)
}

/// `LIKE` disjunction over `columns`, optionally restricted to active records.
fn catalog_search(
    columns: &[&str],
    term: &str,
    active_only: bool,
) -> Result<Option<EncodedQuery>, NowError> {
    let builder =
        QueryBuilder::new().and_any(columns.iter().map(|c| Clause::like(*c, term)))?;
    let builder = if active_only {
        builder.and(Clause::eq("active", "true"))?
    } else {
        builder
    };
    Ok(builder.build())
}

/// The raw sys_id of a fetched record, whatever the display-value mode.
fn record_id(record: &Record) -> Option<String> {
    let id = match record.get("sys_id")? {
        Value::Object(pair) => pair.get("value")?,
        other => other,
    };
    id.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}
