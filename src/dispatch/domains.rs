//! Per-domain configuration.
//!
//! Each ITSM domain is a static table of actions. An action names the table it
//! reads, how it behaves ([`ActionKind`]), which named filters it accepts and
//! how each binds to an encoded-query clause, and the field projection used
//! when the caller does not pass `fields`.

use std::fmt;

use clap::ValueEnum;

/// What a single-record lookup does when nothing matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Miss {
    /// Fail with `NotFoundError`.
    NotFound,
    /// Succeed with `{}`.
    Empty,
}

/// How a named filter value becomes a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// `field=value`, or `fieldINa,b` for arrays.
    Text,
    /// Boolean flag rendered as `field=true` / `field=false`.
    Flag,
    /// Like `Text`, but the literal `"null"` means `fieldISEMPTY`.
    NullableRef,
}

/// Binding from an input key to a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterBinding {
    /// Input key.
    pub param: &'static str,
    /// Column the clause constrains.
    pub field: &'static str,
    /// Value handling.
    pub kind: FilterKind,
}

const fn text(param: &'static str) -> FilterBinding {
    FilterBinding {
        param,
        field: param,
        kind: FilterKind::Text,
    }
}

const fn flag(param: &'static str) -> FilterBinding {
    FilterBinding {
        param,
        field: param,
        kind: FilterKind::Flag,
    }
}

const fn renamed(param: &'static str, field: &'static str) -> FilterBinding {
    FilterBinding {
        param,
        field,
        kind: FilterKind::Text,
    }
}

/// Behavior of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Fetch one record by `sys_id`.
    Get {
        /// Result on a miss.
        miss: Miss,
        /// Record description used in not-found messages.
        label: &'static str,
    },
    /// Fetch the first record whose `field` equals the `param` value.
    Find {
        /// Required input key.
        param: &'static str,
        /// Column it matches.
        field: &'static str,
        /// Result on a miss.
        miss: Miss,
        /// Record description used in not-found messages.
        label: &'static str,
    },
    /// List records matching named filters.
    Query,
    /// List records where any of `columns` contains `search_term`.
    Search {
        /// Columns searched with `LIKE`.
        columns: &'static [&'static str],
    },
    /// List records whose `field` equals the required `param` value.
    Lookup {
        /// Required input key.
        param: &'static str,
        /// Column it matches.
        field: &'static str,
    },
    /// Newest records first.
    Latest {
        /// Limit used when the caller gives none.
        default_limit: u32,
    },
    /// CI relationships from the relationship table.
    Relationships,
    /// Text search across catalog categories and items.
    CatalogSearch {
        /// Category table.
        category_table: &'static str,
        /// Category projection.
        category_fields: &'static [&'static str],
        /// Item table.
        item_table: &'static str,
        /// Item projection.
        item_fields: &'static [&'static str],
    },
    /// A catalog request plus its requested items.
    RequestStatus {
        /// Requested-item table.
        item_table: &'static str,
        /// Requested-item projection.
        item_fields: &'static [&'static str],
    },
}

impl ActionKind {
    /// True for actions returning an arbitrary number of records, which
    /// also accept `query` and `conditions`.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            ActionKind::Query
                | ActionKind::Search { .. }
                | ActionKind::Lookup { .. }
                | ActionKind::Latest { .. }
                | ActionKind::Relationships
        )
    }

    /// Input keys this kind reads besides its named filters.
    pub fn params(&self) -> Vec<&'static str> {
        match self {
            ActionKind::Get { .. } => vec!["sys_id"],
            ActionKind::Find { param, .. } | ActionKind::Lookup { param, .. } => vec![*param],
            ActionKind::Query | ActionKind::Latest { .. } => Vec::new(),
            ActionKind::Search { .. } => vec!["search_term"],
            ActionKind::Relationships => vec!["sys_id", "direction"],
            ActionKind::CatalogSearch { .. } => vec![
                "search_term",
                "search_categories",
                "search_items",
                "active_only",
            ],
            ActionKind::RequestStatus { .. } => {
                vec!["request_number", "request_sys_id", "include_items"]
            }
        }
    }
}

/// One action of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    /// Value of the `action` input key.
    pub name: &'static str,
    /// Primary table.
    pub table: &'static str,
    /// Behavior.
    pub kind: ActionKind,
    /// Named filters, in the order their clauses are rendered.
    pub filters: &'static [FilterBinding],
    /// Projection used when `fields` is not given.
    pub default_fields: &'static [&'static str],
}

/// All actions of a domain.
#[derive(Debug)]
pub struct DomainSpec {
    /// Domain name as used on the command line.
    pub name: &'static str,
    /// Actions, in documentation order.
    pub actions: &'static [ActionSpec],
}

impl DomainSpec {
    /// Looks up an action by name.
    pub fn action(&self, name: &str) -> Option<&'static ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Comma-separated action names, for error messages.
    pub fn action_names(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The ITSM domains the tool can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Domain {
    /// Incidents (`incident`).
    Incidents,
    /// Change requests (`change_request`).
    Changes,
    /// Problems (`problem`).
    Problems,
    /// Service catalog categories, items and requests.
    Catalog,
    /// Configuration items and their relationships.
    Cmdb,
    /// Companies (`core_company`).
    Companies,
}

impl Domain {
    /// Every domain.
    pub const ALL: [Domain; 6] = [
        Domain::Incidents,
        Domain::Changes,
        Domain::Problems,
        Domain::Catalog,
        Domain::Cmdb,
        Domain::Companies,
    ];

    /// The domain's action table.
    pub fn spec(self) -> &'static DomainSpec {
        match self {
            Domain::Incidents => &INCIDENTS,
            Domain::Changes => &CHANGES,
            Domain::Problems => &PROBLEMS,
            Domain::Catalog => &CATALOG,
            Domain::Cmdb => &CMDB,
            Domain::Companies => &COMPANIES,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

// ============================================================================
// Incidents
// ============================================================================

const INCIDENT_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "state",
    "urgency",
    "impact",
    "priority",
    "assignment_group",
    "assigned_to",
    "caller_id",
    "category",
    "subcategory",
    "opened_at",
    "opened_by",
    "resolved_at",
    "resolved_by",
    "closed_at",
    "closed_by",
    "close_code",
    "close_notes",
    "active",
    "sys_created_on",
    "sys_updated_on",
];

static INCIDENTS: DomainSpec = DomainSpec {
    name: "incidents",
    actions: &[
        ActionSpec {
            name: "get",
            table: "incident",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Incident",
            },
            filters: &[],
            default_fields: INCIDENT_FIELDS,
        },
        ActionSpec {
            name: "get_by_number",
            table: "incident",
            kind: ActionKind::Find {
                param: "number",
                field: "number",
                miss: Miss::NotFound,
                label: "Incident",
            },
            filters: &[],
            default_fields: INCIDENT_FIELDS,
        },
        ActionSpec {
            name: "query",
            table: "incident",
            kind: ActionKind::Query,
            filters: &[
                text("state"),
                text("urgency"),
                text("impact"),
                text("assignment_group"),
                flag("active"),
            ],
            default_fields: INCIDENT_FIELDS,
        },
    ],
};

// ============================================================================
// Changes
// ============================================================================

const CHANGE_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "state",
    "type",
    "risk",
    "priority",
    "assignment_group",
    "assigned_to",
    "requested_by",
    "category",
    "start_date",
    "end_date",
    "planned_start_date",
    "planned_end_date",
    "work_start",
    "work_end",
    "opened_at",
    "opened_by",
    "closed_at",
    "closed_by",
    "close_code",
    "close_notes",
    "active",
    "approval",
    "phase",
    "reason",
    "conflict_status",
    "cab_required",
    "sys_created_on",
    "sys_updated_on",
];

static CHANGES: DomainSpec = DomainSpec {
    name: "changes",
    actions: &[
        ActionSpec {
            name: "get",
            table: "change_request",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Change request",
            },
            filters: &[],
            default_fields: CHANGE_FIELDS,
        },
        ActionSpec {
            name: "get_by_number",
            table: "change_request",
            kind: ActionKind::Find {
                param: "number",
                field: "number",
                miss: Miss::Empty,
                label: "Change request",
            },
            filters: &[],
            default_fields: CHANGE_FIELDS,
        },
        ActionSpec {
            name: "query",
            table: "change_request",
            kind: ActionKind::Query,
            filters: &[
                text("state"),
                text("type"),
                text("risk"),
                text("assignment_group"),
                flag("active"),
            ],
            default_fields: CHANGE_FIELDS,
        },
    ],
};

// ============================================================================
// Problems
// ============================================================================

const PROBLEM_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "state",
    "priority",
    "assignment_group",
    "assigned_to",
    "opened_at",
    "opened_by",
    "resolved_at",
    "resolved_by",
    "closed_at",
    "closed_by",
    "close_notes",
    "active",
    "known_error",
    "first_reported_by_task",
    "cause_notes",
    "fix_notes",
    "workaround",
    "major_problem",
    "problem_state",
    "resolution_code",
    "related_incidents",
    "sys_created_on",
    "sys_updated_on",
];

static PROBLEMS: DomainSpec = DomainSpec {
    name: "problems",
    actions: &[
        ActionSpec {
            name: "get",
            table: "problem",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Problem",
            },
            filters: &[],
            default_fields: PROBLEM_FIELDS,
        },
        ActionSpec {
            name: "get_by_number",
            table: "problem",
            kind: ActionKind::Find {
                param: "number",
                field: "number",
                miss: Miss::Empty,
                label: "Problem",
            },
            filters: &[],
            default_fields: PROBLEM_FIELDS,
        },
        ActionSpec {
            name: "query",
            table: "problem",
            kind: ActionKind::Query,
            filters: &[
                text("state"),
                text("priority"),
                text("assignment_group"),
                flag("known_error"),
                flag("active"),
            ],
            default_fields: PROBLEM_FIELDS,
        },
    ],
};

// ============================================================================
// Service catalog
// ============================================================================

const CATEGORY_FIELDS: &[&str] = &[
    "sys_id",
    "title",
    "description",
    "parent",
    "active",
    "icon",
    "order",
    "sc_catalog",
    "sys_created_on",
    "sys_updated_on",
];

const ITEM_FIELDS: &[&str] = &[
    "sys_id",
    "name",
    "short_description",
    "description",
    "category",
    "price",
    "active",
    "order",
    "availability",
    "icon",
    "picture",
    "sys_created_on",
    "sys_updated_on",
];

const REQUEST_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "request_state",
    "stage",
    "requested_for",
    "opened_by",
    "opened_at",
    "closed_at",
    "closed_by",
    "active",
    "approval",
    "price",
    "sys_created_on",
    "sys_updated_on",
];

const REQ_ITEM_FIELDS: &[&str] = &[
    "sys_id",
    "number",
    "short_description",
    "description",
    "request",
    "cat_item",
    "stage",
    "state",
    "quantity",
    "price",
    "opened_by",
    "opened_at",
    "closed_at",
    "closed_by",
    "active",
    "sys_created_on",
    "sys_updated_on",
];

static CATALOG: DomainSpec = DomainSpec {
    name: "catalog",
    actions: &[
        ActionSpec {
            name: "get_category",
            table: "sc_category",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Category",
            },
            filters: &[],
            default_fields: CATEGORY_FIELDS,
        },
        ActionSpec {
            name: "get_item",
            table: "sc_cat_item",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Catalog item",
            },
            filters: &[],
            default_fields: ITEM_FIELDS,
        },
        ActionSpec {
            name: "categories",
            table: "sc_category",
            kind: ActionKind::Query,
            filters: &[
                FilterBinding {
                    param: "parent",
                    field: "parent",
                    kind: FilterKind::NullableRef,
                },
                flag("active"),
            ],
            default_fields: CATEGORY_FIELDS,
        },
        ActionSpec {
            name: "items",
            table: "sc_cat_item",
            kind: ActionKind::Query,
            filters: &[text("category"), flag("active")],
            default_fields: ITEM_FIELDS,
        },
        ActionSpec {
            name: "search",
            table: "sc_cat_item",
            kind: ActionKind::CatalogSearch {
                category_table: "sc_category",
                category_fields: CATEGORY_FIELDS,
                item_table: "sc_cat_item",
                item_fields: ITEM_FIELDS,
            },
            filters: &[],
            default_fields: ITEM_FIELDS,
        },
        ActionSpec {
            name: "status",
            table: "sc_request",
            kind: ActionKind::RequestStatus {
                item_table: "sc_req_item",
                item_fields: REQ_ITEM_FIELDS,
            },
            filters: &[],
            default_fields: REQUEST_FIELDS,
        },
        ActionSpec {
            name: "query_requests",
            table: "sc_request",
            kind: ActionKind::Query,
            filters: &[
                text("request_state"),
                text("stage"),
                text("requested_for"),
                text("opened_by"),
                flag("active"),
            ],
            default_fields: REQUEST_FIELDS,
        },
    ],
};

// ============================================================================
// CMDB
// ============================================================================

const CI_FIELDS: &[&str] = &[
    "sys_id",
    "name",
    "sys_class_name",
    "asset_tag",
    "serial_number",
    "ip_address",
    "mac_address",
    "dns_domain",
    "fqdn",
    "operational_status",
    "install_status",
    "location",
    "department",
    "company",
    "assigned_to",
    "managed_by",
    "owned_by",
    "supported_by",
    "manufacturer",
    "model_id",
    "model_number",
    "vendor",
    "cost",
    "cost_center",
    "purchase_date",
    "warranty_expiration",
    "first_discovered",
    "last_discovered",
    "discovery_source",
    "environment",
    "short_description",
    "comments",
    "active",
    "sys_created_on",
    "sys_updated_on",
];

const RELATIONSHIP_FIELDS: &[&str] = &[
    "sys_id",
    "parent",
    "child",
    "type",
    "connection_strength",
    "port",
    "sys_created_on",
    "sys_updated_on",
];

const CI_CLASS: FilterBinding = renamed("ci_class", "sys_class_name");

static CMDB: DomainSpec = DomainSpec {
    name: "cmdb",
    actions: &[
        ActionSpec {
            name: "get",
            table: "cmdb_ci",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "CI",
            },
            filters: &[],
            default_fields: CI_FIELDS,
        },
        ActionSpec {
            name: "get_by_name",
            table: "cmdb_ci",
            kind: ActionKind::Find {
                param: "name",
                field: "name",
                miss: Miss::NotFound,
                label: "CI",
            },
            filters: &[CI_CLASS],
            default_fields: CI_FIELDS,
        },
        ActionSpec {
            name: "query",
            table: "cmdb_ci",
            kind: ActionKind::Query,
            filters: &[CI_CLASS, text("operational_status"), text("location")],
            default_fields: CI_FIELDS,
        },
        ActionSpec {
            name: "search",
            table: "cmdb_ci",
            kind: ActionKind::Search {
                columns: &["name", "asset_tag", "serial_number"],
            },
            filters: &[CI_CLASS],
            default_fields: CI_FIELDS,
        },
        ActionSpec {
            name: "relationships",
            table: "cmdb_rel_ci",
            kind: ActionKind::Relationships,
            filters: &[renamed("relationship_type", "type")],
            default_fields: RELATIONSHIP_FIELDS,
        },
        ActionSpec {
            name: "by_ip",
            table: "cmdb_ci",
            kind: ActionKind::Lookup {
                param: "ip_address",
                field: "ip_address",
            },
            filters: &[CI_CLASS],
            default_fields: CI_FIELDS,
        },
        ActionSpec {
            name: "by_serial",
            table: "cmdb_ci",
            kind: ActionKind::Lookup {
                param: "serial_number",
                field: "serial_number",
            },
            filters: &[CI_CLASS],
            default_fields: CI_FIELDS,
        },
    ],
};

// ============================================================================
// Companies
// ============================================================================

const COMPANY_FIELDS: &[&str] = &[
    "sys_id",
    "name",
    "street",
    "city",
    "state",
    "zip",
    "country",
    "phone",
    "fax",
    "website",
    "stock_symbol",
    "notes",
    "contact",
    "primary",
    "parent",
    "customer",
    "vendor",
    "manufacturer",
    "active",
    "sys_created_on",
    "sys_updated_on",
];

static COMPANIES: DomainSpec = DomainSpec {
    name: "companies",
    actions: &[
        ActionSpec {
            name: "get",
            table: "core_company",
            kind: ActionKind::Get {
                miss: Miss::NotFound,
                label: "Company",
            },
            filters: &[],
            default_fields: COMPANY_FIELDS,
        },
        ActionSpec {
            name: "get_by_name",
            table: "core_company",
            kind: ActionKind::Find {
                param: "name",
                field: "name",
                miss: Miss::Empty,
                label: "Company",
            },
            filters: &[],
            default_fields: COMPANY_FIELDS,
        },
        ActionSpec {
            name: "query",
            table: "core_company",
            kind: ActionKind::Query,
            filters: &[
                text("name"),
                text("city"),
                text("state"),
                text("country"),
                flag("customer"),
                flag("vendor"),
                flag("manufacturer"),
                flag("active"),
            ],
            default_fields: COMPANY_FIELDS,
        },
        ActionSpec {
            name: "search",
            table: "core_company",
            kind: ActionKind::Search {
                columns: &["name", "city", "stock_symbol"],
            },
            filters: &[],
            default_fields: COMPANY_FIELDS,
        },
        ActionSpec {
            name: "latest",
            table: "core_company",
            kind: ActionKind::Latest { default_limit: 10 },
            filters: &[],
            default_fields: COMPANY_FIELDS,
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_action_names_unique_per_domain() {
        for domain in Domain::ALL {
            let spec = domain.spec();
            let names: HashSet<_> = spec.actions.iter().map(|a| a.name).collect();
            assert_eq!(names.len(), spec.actions.len(), "domain {}", domain);
        }
    }

    #[test]
    fn test_filter_params_do_not_shadow_action_params() {
        for domain in Domain::ALL {
            for action in domain.spec().actions {
                for filter in action.filters {
                    assert!(
                        !action.kind.params().contains(&filter.param),
                        "{}.{} filter {} collides",
                        domain,
                        action.name,
                        filter.param
                    );
                }
            }
        }
    }

    #[test]
    fn test_key_params_are_accepted() {
        for domain in Domain::ALL {
            for action in domain.spec().actions {
                if let ActionKind::Find { param, .. } | ActionKind::Lookup { param, .. } =
                    action.kind
                {
                    assert_eq!(action.kind.params(), vec![param]);
                }
            }
        }
    }

    #[test]
    fn test_action_names_message() {
        assert_eq!(
            Domain::Incidents.spec().action_names(),
            "get, get_by_number, query"
        );
        assert_eq!(
            Domain::Cmdb.spec().action_names(),
            "get, get_by_name, query, search, relationships, by_ip, by_serial"
        );
    }

    #[test]
    fn test_domain_display_matches_cli_name() {
        for domain in Domain::ALL {
            let value = domain.to_possible_value().unwrap();
            assert_eq!(value.get_name(), domain.to_string());
        }
    }

    #[test]
    fn test_not_found_configuration() {
        let miss = |domain: Domain, action: &str| match domain.spec().action(action).unwrap().kind
        {
            ActionKind::Get { miss, .. } | ActionKind::Find { miss, .. } => miss,
            _ => panic!("not a single-record action"),
        };
        assert_eq!(miss(Domain::Incidents, "get"), Miss::NotFound);
        assert_eq!(miss(Domain::Incidents, "get_by_number"), Miss::NotFound);
        assert_eq!(miss(Domain::Changes, "get"), Miss::NotFound);
        assert_eq!(miss(Domain::Changes, "get_by_number"), Miss::Empty);
        assert_eq!(miss(Domain::Problems, "get"), Miss::NotFound);
        assert_eq!(miss(Domain::Problems, "get_by_number"), Miss::Empty);
        assert_eq!(miss(Domain::Catalog, "get_item"), Miss::NotFound);
        assert_eq!(miss(Domain::Cmdb, "get"), Miss::NotFound);
        assert_eq!(miss(Domain::Cmdb, "get_by_name"), Miss::NotFound);
        assert_eq!(miss(Domain::Companies, "get"), Miss::NotFound);
        assert_eq!(miss(Domain::Companies, "get_by_name"), Miss::Empty);
    }

    #[test]
    fn test_every_get_by_sys_id_fails_on_miss() {
        for domain in Domain::ALL {
            for action in domain.spec().actions {
                if let ActionKind::Get { miss, .. } = action.kind {
                    assert_eq!(miss, Miss::NotFound, "{} {}", domain, action.name);
                }
            }
        }
    }
}
