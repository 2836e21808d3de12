// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Compiling a prepared filter to a SQL predicate.
//!
//! The store injects the rendered predicate into its own list-query WHERE
//! clause, so unauthorized rows are never fetched. Column names come from a
//! per-table [`SqlFilterConfig`]. A condition over a column the table does
//! not have is dropped, which matches in-process evaluation: a row from
//! such a table projects an empty value for that field, and an empty value
//! never satisfies the condition.
//!
//! ACL columns are JSON objects mapping a user or group ID to an array of
//! action strings, matched with SQLite's `json_extract`/`json_each`.

use crate::authorizer::RbacError;
use crate::filter::{FilterCond, FilterExpr, PreparedFilter};

/// Column mapping for one table.
#[derive(Debug, Clone, Default)]
pub struct SqlFilterConfig {
	owner_column: Option<String>,
	org_column: Option<String>,
	acl_user_column: Option<String>,
	acl_group_column: Option<String>,
}

impl SqlFilterConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_owner_column(mut self, column: &str) -> Self {
		self.owner_column = Some(column.to_string());
		self
	}

	pub fn with_org_column(mut self, column: &str) -> Self {
		self.org_column = Some(column.to_string());
		self
	}

	pub fn with_acl_columns(mut self, user_column: &str, group_column: &str) -> Self {
		self.acl_user_column = Some(user_column.to_string());
		self.acl_group_column = Some(group_column.to_string());
		self
	}
}

pub(crate) fn compile(
	filter: &PreparedFilter,
	config: &SqlFilterConfig,
) -> Result<String, RbacError> {
	let conds = match &filter.expr {
		FilterExpr::Allow => return Ok("1 = 1".to_string()),
		FilterExpr::Deny(_) => return Ok("1 = 0".to_string()),
		FilterExpr::AnyOf(conds) => conds,
	};

	let action = filter.action.as_str();
	let mut parts: Vec<String> = Vec::new();
	for cond in conds {
		match cond {
			FilterCond::OwnerIs(id) => {
				if let Some(column) = &config.owner_column {
					parts.push(format!("{} = '{}'", column, escape(id)));
				}
			}
			FilterCond::OrgIn(ids) => {
				if let Some(column) = &config.org_column {
					let list = ids
						.iter()
						.map(|id| format!("'{}'", escape(id)))
						.collect::<Vec<_>>()
						.join(", ");
					parts.push(format!("{column} IN ({list})"));
				}
			}
			FilterCond::AclUser(id) => {
				if let Some(column) = &config.acl_user_column {
					parts.push(acl_exists(column, id, action));
				}
			}
			FilterCond::AclGroups(groups) => {
				if let Some(column) = &config.acl_group_column {
					for group in groups {
						parts.push(acl_exists(column, group, action));
					}
				}
			}
		}
	}

	if parts.is_empty() {
		// Every remaining condition referenced a column the table does not
		// have, so no row can match.
		return Ok("1 = 0".to_string());
	}
	Ok(format!("({})", parts.join(" OR ")))
}

/// True when the JSON ACL object grants `key` the action or the wildcard.
fn acl_exists(column: &str, key: &str, action: &str) -> String {
	format!(
		"EXISTS (SELECT 1 FROM json_each(json_extract({column}, '$.\"{key}\"')) \
		 WHERE json_each.value IN ('{action}', '*'))",
		column = column,
		key = escape_json_key(key),
		action = action,
	)
}

fn escape(value: &str) -> String {
	value.replace('\'', "''")
}

/// Keys are UUID strings; anything that could terminate the path literal is
/// stripped rather than escaped.
fn escape_json_key(value: &str) -> String {
	escape(value).replace('"', "")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::AuthContext;
	use crate::filter::PreparedAuthorized;
	use crate::object::resource_type;
	use crate::subject::{permissions, Action, Permission, Role, Scope, Subject};
	use std::collections::HashMap;

	fn subject(id: &str, roles: Vec<Role>) -> Subject {
		Subject {
			id: id.to_string(),
			friendly_name: String::new(),
			roles,
			groups: Vec::new(),
			scope: Scope::all(),
		}
	}

	fn prepare(subject: &Subject, action: Action) -> PreparedFilter {
		PreparedFilter::build(subject, action, resource_type::WORKSPACE)
	}

	fn workspaces_config() -> SqlFilterConfig {
		SqlFilterConfig::new()
			.with_owner_column("workspaces.owner_id")
			.with_org_column("workspaces.organization_id")
	}

	#[test]
	fn site_grant_compiles_to_true() {
		let subject = subject(
			"u1",
			vec![Role {
				name: "owner".to_string(),
				display_name: String::new(),
				site: permissions([(resource_type::WILDCARD, vec![Action::All])]),
				org: HashMap::new(),
				user: Vec::new(),
			}],
		);
		let sql = prepare(&subject, Action::Read)
			.compile_to_sql(&workspaces_config())
			.unwrap();
		assert_eq!(sql, "1 = 1");
	}

	#[test]
	fn negate_compiles_to_false() {
		let subject = subject(
			"u1",
			vec![Role {
				name: "denied".to_string(),
				display_name: String::new(),
				site: vec![Permission {
					resource_type: resource_type::WORKSPACE.to_string(),
					action: Action::Read,
					negate: true,
				}],
				org: HashMap::new(),
				user: Vec::new(),
			}],
		);
		let sql = prepare(&subject, Action::Read)
			.compile_to_sql(&workspaces_config())
			.unwrap();
		assert_eq!(sql, "1 = 0");
	}

	#[test]
	fn owner_and_org_conditions_render_without_acl_columns() {
		let mut org = HashMap::new();
		org.insert(
			"org-1".to_string(),
			permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
		);
		let subject = subject(
			"u1",
			vec![Role {
				name: "member".to_string(),
				display_name: String::new(),
				site: Vec::new(),
				org,
				user: permissions([(resource_type::WILDCARD, vec![Action::All])]),
			}],
		);
		let sql = prepare(&subject, Action::Read)
			.compile_to_sql(&workspaces_config())
			.unwrap();
		assert_eq!(
			sql,
			"(workspaces.organization_id IN ('org-1') OR workspaces.owner_id = 'u1')"
		);
	}

	#[test]
	fn acl_columns_render_exists_clauses() {
		let mut subject = subject("u1", Vec::new());
		subject.groups.push("g1".to_string());
		let sql = PreparedFilter::build(&subject, Action::Update, resource_type::TEMPLATE)
			.compile_to_sql(
				&SqlFilterConfig::new()
					.with_owner_column("templates.created_by")
					.with_org_column("templates.organization_id")
					.with_acl_columns("templates.user_acl", "templates.group_acl"),
			)
			.unwrap();
		assert!(sql.contains("json_extract(templates.user_acl, '$.\"u1\"')"), "got: {sql}");
		assert!(sql.contains("json_extract(templates.group_acl, '$.\"g1\"')"), "got: {sql}");
		assert!(sql.contains("IN ('update', '*')"), "got: {sql}");
	}

	#[test]
	fn no_matching_columns_compiles_to_false() {
		// Only ACL conditions remain and the table has no ACL columns.
		let subject = subject("u1", Vec::new());
		let sql = prepare(&subject, Action::Read)
			.compile_to_sql(&workspaces_config())
			.unwrap();
		assert_eq!(sql, "1 = 0");
	}

	#[test]
	fn single_quotes_are_escaped() {
		let mut member = Role {
			name: "member".to_string(),
			display_name: String::new(),
			site: Vec::new(),
			org: HashMap::new(),
			user: permissions([(resource_type::WILDCARD, vec![Action::All])]),
		};
		member.org.insert(
			"o'rg".to_string(),
			permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
		);
		let subject = subject("u'1", vec![member]);
		let sql = prepare(&subject, Action::Read)
			.compile_to_sql(&workspaces_config())
			.unwrap();
		assert!(sql.contains("workspaces.owner_id = 'u''1'"), "got: {sql}");
		assert!(sql.contains("IN ('o''rg')"), "got: {sql}");
	}

	#[test]
	fn compiled_predicate_agrees_with_in_process_check() {
		// Spot check that "1 = 1" and "1 = 0" line up with authorize().
		let allowed = subject(
			"u1",
			vec![Role {
				name: "owner".to_string(),
				display_name: String::new(),
				site: permissions([(resource_type::WILDCARD, vec![Action::All])]),
				org: HashMap::new(),
				user: Vec::new(),
			}],
		);
		let denied = subject("u2", Vec::new());
		let ctx = AuthContext::new();
		let object = crate::object::RbacObject::workspace();

		let allow_filter = prepare(&allowed, Action::Read);
		assert_eq!(
			allow_filter.compile_to_sql(&workspaces_config()).unwrap(),
			"1 = 1"
		);
		assert!(allow_filter.authorize(&ctx, &object).is_ok());

		let deny_filter = prepare(&denied, Action::Read);
		assert_eq!(
			deny_filter.compile_to_sql(&workspaces_config()).unwrap(),
			"1 = 0"
		);
		assert!(deny_filter.authorize(&ctx, &object).is_err());
	}
}
