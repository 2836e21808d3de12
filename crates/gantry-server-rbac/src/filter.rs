// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prepared authorization filters.
//!
//! [`PreparedFilter`] partially evaluates the policy for a known subject,
//! action, and resource type, leaving the object fields unknown. Everything
//! decidable up front (scope, negated permissions, site-level grants) is
//! folded into a constant; what remains is a disjunction of conditions over
//! the object's owner, organization, and ACL lists. The same structure
//! authorizes objects in-process and compiles to a SQL predicate, so the
//! two paths cannot drift apart.

use crate::authorizer::{self, DenyReason, RbacError, UnauthorizedDetail};
use crate::context::AuthContext;
use crate::object::{Objecter, RbacObject};
use crate::sql::{self, SqlFilterConfig};
use crate::subject::{Action, Subject};
use crate::Authorizer;

/// A compiled, reusable authorization predicate for one resource type.
///
/// Lives only for the duration of building one query or filtering one
/// result set.
pub trait PreparedAuthorized: Send + Sync {
	/// In-process re-check with the same semantics as a full
	/// `Authorizer::authorize` call for this subject and action.
	fn authorize(&self, ctx: &AuthContext, object: &RbacObject) -> Result<(), RbacError>;

	/// Renders a boolean SQL predicate equivalent to `authorize(row)`
	/// succeeding for every row of the resource type, for injection into
	/// the store's own list-query construction.
	fn compile_to_sql(&self, config: &SqlFilterConfig) -> Result<String, RbacError>;
}

/// The partially evaluated policy.
#[derive(Debug, Clone)]
pub struct PreparedFilter {
	pub(crate) subject: Subject,
	pub(crate) action: Action,
	pub(crate) resource_type: String,
	pub(crate) expr: FilterExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterExpr {
	/// The subject may act on every row of the type.
	Allow,
	/// The subject may act on no row, for the recorded reason.
	Deny(DenyReason),
	/// The subject may act on rows matching any condition.
	AnyOf(Vec<FilterCond>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FilterCond {
	/// The row is owned by the subject.
	OwnerIs(String),
	/// The row belongs to one of these organizations.
	OrgIn(Vec<String>),
	/// The row's user ACL grants the subject the action.
	AclUser(String),
	/// The row's group ACL grants one of the subject's groups the action.
	AclGroups(Vec<String>),
}

impl PreparedFilter {
	/// Partially evaluates the policy. Input validation happens in
	/// `Authorizer::prepare`.
	pub(crate) fn build(subject: &Subject, action: Action, resource_type: &str) -> Self {
		let expr = Self::build_expr(subject, action, resource_type);
		Self {
			subject: subject.clone(),
			action,
			resource_type: resource_type.to_string(),
			expr,
		}
	}

	fn build_expr(subject: &Subject, action: Action, resource_type: &str) -> FilterExpr {
		if !subject.scope.allows(resource_type, action) {
			return FilterExpr::Deny(DenyReason::Scope);
		}

		for role in &subject.roles {
			for perm in role.all_permissions() {
				if perm.negate && perm.matches(resource_type, action) {
					return FilterExpr::Deny(DenyReason::Negated);
				}
			}
		}

		let mut conds = vec![FilterCond::AclUser(subject.id.clone())];
		if !subject.groups.is_empty() {
			conds.push(FilterCond::AclGroups(subject.groups.clone()));
		}

		let mut org_ids: Vec<String> = Vec::new();
		let mut owner_grant = false;
		for role in &subject.roles {
			if role
				.site
				.iter()
				.any(|p| !p.negate && p.matches(resource_type, action))
			{
				return FilterExpr::Allow;
			}
			for (org_id, perms) in &role.org {
				if perms.iter().any(|p| !p.negate && p.matches(resource_type, action))
					&& !org_ids.contains(org_id)
				{
					org_ids.push(org_id.clone());
				}
			}
			if role
				.user
				.iter()
				.any(|p| !p.negate && p.matches(resource_type, action))
			{
				owner_grant = true;
			}
		}
		// Deterministic order keeps compiled SQL stable across runs.
		org_ids.sort();
		if !org_ids.is_empty() {
			conds.push(FilterCond::OrgIn(org_ids));
		}
		if owner_grant {
			conds.push(FilterCond::OwnerIs(subject.id.clone()));
		}

		FilterExpr::AnyOf(conds)
	}

	fn matches(&self, cond: &FilterCond, object: &RbacObject) -> bool {
		match cond {
			FilterCond::OwnerIs(id) => !object.owner_id.is_empty() && object.owner_id == *id,
			FilterCond::OrgIn(ids) => !object.org_id.is_empty() && ids.contains(&object.org_id),
			FilterCond::AclUser(id) => authorizer::acl_grants(&object.acl_user_list, id, self.action),
			FilterCond::AclGroups(groups) => groups
				.iter()
				.any(|g| authorizer::acl_grants(&object.acl_group_list, g, self.action)),
		}
	}

	fn deny(&self, object: &RbacObject, reason: DenyReason) -> RbacError {
		RbacError::Forbidden(Box::new(UnauthorizedDetail::new(
			&self.subject,
			self.action,
			object,
			reason,
		)))
	}
}

impl PreparedAuthorized for PreparedFilter {
	fn authorize(&self, ctx: &AuthContext, object: &RbacObject) -> Result<(), RbacError> {
		if ctx.is_cancelled() {
			return Err(RbacError::Cancelled);
		}
		if object.resource_type != self.resource_type {
			return Err(RbacError::InvalidInput(format!(
				"prepared for resource type {:?}, got {:?}",
				self.resource_type, object.resource_type
			)));
		}
		match &self.expr {
			FilterExpr::Allow => Ok(()),
			FilterExpr::Deny(reason) => Err(self.deny(object, *reason)),
			FilterExpr::AnyOf(conds) => {
				if conds.iter().any(|c| self.matches(c, object)) {
					Ok(())
				} else {
					Err(self.deny(object, DenyReason::NoGrant))
				}
			}
		}
	}

	fn compile_to_sql(&self, config: &SqlFilterConfig) -> Result<String, RbacError> {
		sql::compile(self, config)
	}
}

/// How many objects justify the cost of preparing a filter. Below this,
/// direct evaluation is faster.
const PREPARED_FILTER_THRESHOLD: usize = 10;

/// Retains only the objects the subject may perform the action on.
///
/// All objects must be of the same resource type. This cost scales linearly
/// with the number of objects; unbounded result sets should use
/// [`PreparedAuthorized::compile_to_sql`] in the query instead.
pub fn filter<T: Objecter>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	subject: &Subject,
	action: Action,
	objects: Vec<T>,
) -> Result<Vec<T>, RbacError> {
	if objects.is_empty() {
		return Ok(objects);
	}
	let object_type = objects[0].rbac_object().resource_type;
	let mut filtered = Vec::with_capacity(objects.len());

	if objects.len() < PREPARED_FILTER_THRESHOLD {
		for object in objects {
			let rbac_object = check_uniform(&object_type, object.rbac_object())?;
			match auth.authorize(ctx, subject, action, &rbac_object) {
				Ok(()) => filtered.push(object),
				Err(RbacError::Forbidden(_)) => {}
				Err(err) => return Err(err),
			}
		}
		return Ok(filtered);
	}

	let prepared = auth.prepare(ctx, subject, action, &object_type)?;
	for object in objects {
		let rbac_object = check_uniform(&object_type, object.rbac_object())?;
		match prepared.authorize(ctx, &rbac_object) {
			Ok(()) => filtered.push(object),
			Err(RbacError::Forbidden(_)) => {}
			Err(err) => return Err(err),
		}
	}
	Ok(filtered)
}

fn check_uniform(expected: &str, object: RbacObject) -> Result<RbacObject, RbacError> {
	if object.resource_type != expected {
		return Err(RbacError::InvalidInput(format!(
			"object types must be uniform across the set ({:?}), found {:?}",
			expected, object.resource_type
		)));
	}
	Ok(object)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::authorizer::{evaluate, PolicyAuthorizer};
	use crate::object::resource_type;
	use crate::subject::{permissions, Permission, Role, Scope};
	use std::collections::HashMap;

	fn subject(id: &str) -> Subject {
		Subject {
			id: id.to_string(),
			friendly_name: String::new(),
			roles: Vec::new(),
			groups: Vec::new(),
			scope: Scope::all(),
		}
	}

	fn org_role(org_id: &str, perms: Vec<Permission>) -> Role {
		let mut org = HashMap::new();
		org.insert(org_id.to_string(), perms);
		Role {
			name: format!("org:{org_id}"),
			display_name: String::new(),
			site: Vec::new(),
			org,
			user: Vec::new(),
		}
	}

	#[test]
	fn site_grant_compiles_to_allow() {
		let mut subject = subject("u1");
		subject.roles.push(Role {
			name: "owner".to_string(),
			display_name: String::new(),
			site: permissions([(resource_type::WILDCARD, vec![Action::All])]),
			org: HashMap::new(),
			user: Vec::new(),
		});
		let filter = PreparedFilter::build(&subject, Action::Read, resource_type::WORKSPACE);
		assert_eq!(filter.expr, FilterExpr::Allow);
	}

	#[test]
	fn negate_compiles_to_deny() {
		let mut subject = subject("u1");
		subject.roles.push(Role {
			name: "conflicted".to_string(),
			display_name: String::new(),
			site: vec![
				Permission {
					resource_type: resource_type::WILDCARD.to_string(),
					action: Action::All,
					negate: false,
				},
				Permission {
					resource_type: resource_type::WORKSPACE.to_string(),
					action: Action::Delete,
					negate: true,
				},
			],
			org: HashMap::new(),
			user: Vec::new(),
		});
		let filter = PreparedFilter::build(&subject, Action::Delete, resource_type::WORKSPACE);
		assert_eq!(filter.expr, FilterExpr::Deny(DenyReason::Negated));
	}

	#[test]
	fn org_and_user_grants_become_conditions() {
		let mut subject = subject("u1");
		subject.roles.push(org_role(
			"org-1",
			permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
		));
		subject.roles.push(Role {
			name: "member".to_string(),
			display_name: String::new(),
			site: Vec::new(),
			org: HashMap::new(),
			user: permissions([(resource_type::WILDCARD, vec![Action::All])]),
		});

		let filter = PreparedFilter::build(&subject, Action::Read, resource_type::WORKSPACE);
		let FilterExpr::AnyOf(conds) = &filter.expr else {
			panic!("expected conditions, got {:?}", filter.expr);
		};
		assert!(conds.contains(&FilterCond::OrgIn(vec!["org-1".to_string()])));
		assert!(conds.contains(&FilterCond::OwnerIs("u1".to_string())));

		let ctx = AuthContext::new();
		assert!(filter
			.authorize(&ctx, &RbacObject::workspace().in_org("org-1"))
			.is_ok());
		assert!(filter
			.authorize(&ctx, &RbacObject::workspace().with_owner("u1"))
			.is_ok());
		assert!(filter
			.authorize(&ctx, &RbacObject::workspace().in_org("org-2"))
			.is_err());
	}

	#[test]
	fn resource_type_mismatch_is_rejected() {
		let filter = PreparedFilter::build(&subject("u1"), Action::Read, resource_type::WORKSPACE);
		let err = filter
			.authorize(&AuthContext::new(), &RbacObject::template())
			.unwrap_err();
		assert!(matches!(err, RbacError::InvalidInput(_)));
	}

	#[test]
	fn filter_rejects_mixed_types() {
		let auth = PolicyAuthorizer::new();
		let objects = vec![RbacObject::workspace(), RbacObject::template()];
		let err = filter(
			&auth,
			&AuthContext::new(),
			&subject("u1"),
			Action::Read,
			objects,
		)
		.unwrap_err();
		assert!(matches!(err, RbacError::InvalidInput(_)));
	}

	#[test]
	fn filter_retains_authorized_objects_on_both_paths() {
		let auth = PolicyAuthorizer::new();
		let ctx = AuthContext::new();
		let mut subject = subject("u1");
		subject.roles.push(org_role(
			"org-1",
			permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
		));

		// Two objects exercises the direct path, twelve the prepared path.
		for count in [2usize, 12] {
			let objects: Vec<RbacObject> = (0..count)
				.map(|i| {
					let org = if i % 2 == 0 { "org-1" } else { "org-2" };
					RbacObject::workspace().in_org(org)
				})
				.collect();
			let kept = filter(&auth, &ctx, &subject, Action::Read, objects).unwrap();
			assert_eq!(kept.len(), count / 2);
			assert!(kept.iter().all(|o| o.org_id == "org-1"));
		}
	}

	mod property_tests {
		use super::*;
		use proptest::prelude::*;

		fn arb_action() -> impl Strategy<Value = Action> {
			prop_oneof![
				Just(Action::Create),
				Just(Action::Read),
				Just(Action::Update),
				Just(Action::Delete),
			]
		}

		fn arb_subject() -> impl Strategy<Value = Subject> {
			(
				0usize..3,          // subject id pool
				any::<bool>(),      // site wildcard grant
				any::<bool>(),      // negate on workspace read
				any::<bool>(),      // user-level wildcard grant
				prop::collection::vec(0usize..3, 0..3), // org grants
				any::<bool>(),      // member of group g1
			)
				.prop_map(|(id, site, negate, user, orgs, grouped)| {
					let mut role = Role {
						name: "generated".to_string(),
						display_name: String::new(),
						site: Vec::new(),
						org: HashMap::new(),
						user: Vec::new(),
					};
					if site {
						role.site = permissions([(resource_type::WILDCARD, vec![Action::All])]);
					}
					if negate {
						role.site.push(Permission {
							resource_type: resource_type::WORKSPACE.to_string(),
							action: Action::Read,
							negate: true,
						});
					}
					if user {
						role.user = permissions([(resource_type::WILDCARD, vec![Action::All])]);
					}
					for org in orgs {
						role.org.insert(
							format!("o{org}"),
							permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
						);
					}
					Subject {
						id: format!("u{id}"),
						friendly_name: String::new(),
						roles: vec![role],
						groups: if grouped { vec!["g1".to_string()] } else { Vec::new() },
						scope: Scope::all(),
					}
				})
		}

		fn arb_object() -> impl Strategy<Value = RbacObject> {
			(
				prop::option::of(0usize..3), // owner
				prop::option::of(0usize..3), // org
				any::<bool>(),               // user acl entry for u0
				any::<bool>(),               // group acl entry for g1
			)
				.prop_map(|(owner, org, acl_user, acl_group)| {
					let mut object = RbacObject::workspace();
					if let Some(owner) = owner {
						object = object.with_owner(&format!("u{owner}"));
					}
					if let Some(org) = org {
						object = object.in_org(&format!("o{org}"));
					}
					if acl_user {
						object
							.acl_user_list
							.insert("u0".to_string(), vec![Action::Read]);
					}
					if acl_group {
						object
							.acl_group_list
							.insert("g1".to_string(), vec![Action::All]);
					}
					object
				})
		}

		proptest! {
			/// The prepared filter must agree with full evaluation for
			/// every subject/object pair.
			#[test]
			fn prepared_filter_matches_full_evaluation(
				subject in arb_subject(),
				object in arb_object(),
				action in arb_action(),
			) {
				let full = evaluate(&subject, action, &object).is_ok();
				let prepared = PreparedFilter::build(&subject, action, resource_type::WORKSPACE);
				let via_filter = prepared.authorize(&AuthContext::new(), &object).is_ok();
				prop_assert_eq!(full, via_filter);
			}
		}
	}
}
