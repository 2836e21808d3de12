// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The policy evaluator.
//!
//! [`PolicyAuthorizer`] implements the [`Authorizer`] contract as a pure
//! function over the subject, action, and object. Evaluation precedence,
//! highest first:
//!
//! 1. The subject's scope is intersected with its role-derived permissions;
//!    an action the scope disallows is denied regardless of any grant
//! 2. Any matching negated permission across the subject's roles denies,
//!    irrespective of other grants
//! 3. An ACL entry on the object matching the subject or one of its groups
//!    allows
//! 4. Role grants, checked site level (wildcard resource type included),
//!    then organization level scoped to the object's organization, then
//!    user level when the subject owns the object
//! 5. Default deny
//!
//! Denials carry an [`UnauthorizedDetail`] for the diagnostic log only; the
//! error surfaced to callers never describes which rule denied.

use serde::Serialize;
use std::fmt;
use tracing::instrument;

use crate::context::AuthContext;
use crate::filter::{PreparedAuthorized, PreparedFilter};
use crate::object::RbacObject;
use crate::subject::{Action, Subject};

/// Errors produced by policy evaluation.
#[derive(Debug, thiserror::Error)]
pub enum RbacError {
	/// The policy denied the action. The boxed detail is for logging only.
	#[error("forbidden")]
	Forbidden(Box<UnauthorizedDetail>),

	/// Evaluation was aborted because the caller's context was cancelled.
	/// Must never be conflated with a denial.
	#[error("authorization cancelled")]
	Cancelled,

	/// The check itself was malformed (empty resource type, wildcard
	/// action, mixed-type filter input).
	#[error("invalid authorization input: {0}")]
	InvalidInput(String),
}

/// Why evaluation denied. Logged, never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
	/// The subject's scope does not cover the action.
	Scope,
	/// An explicit negated permission matched.
	Negated,
	/// No grant matched.
	NoGrant,
}

impl fmt::Display for DenyReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DenyReason::Scope => write!(f, "scope"),
			DenyReason::Negated => write!(f, "negated"),
			DenyReason::NoGrant => write!(f, "no_grant"),
		}
	}
}

/// Full decision context for a denial: the inputs and the rule stage that
/// denied. Written to the diagnostic log at the point of denial.
#[derive(Debug, Clone, Serialize)]
pub struct UnauthorizedDetail {
	pub subject_id: String,
	pub subject_name: String,
	pub roles: Vec<String>,
	pub groups: Vec<String>,
	pub scope: String,
	pub action: Action,
	pub object: RbacObject,
	pub reason: DenyReason,
}

impl UnauthorizedDetail {
	pub(crate) fn new(
		subject: &Subject,
		action: Action,
		object: &RbacObject,
		reason: DenyReason,
	) -> Self {
		Self {
			subject_id: subject.id.clone(),
			subject_name: subject.friendly_name.clone(),
			roles: subject.role_names(),
			groups: subject.groups.clone(),
			scope: subject.scope.name.clone(),
			action,
			object: object.clone(),
			reason,
		}
	}
}

/// The evaluation contract consumed by the authorizing store.
///
/// Implementations must be safe for concurrent read-only use and must not
/// mutate shared policy state while evaluating.
pub trait Authorizer: Send + Sync {
	/// Returns `Ok(())` if the subject may perform the action on the
	/// object. Repeated calls with unchanged inputs return the same result
	/// and produce no observable side effect.
	fn authorize(
		&self,
		ctx: &AuthContext,
		subject: &Subject,
		action: Action,
		object: &RbacObject,
	) -> Result<(), RbacError>;

	/// Partially evaluates the policy for the subject and action, leaving
	/// the object fields unknown. The result authorizes individual objects
	/// in-process or compiles to a SQL predicate for list queries.
	fn prepare(
		&self,
		ctx: &AuthContext,
		subject: &Subject,
		action: Action,
		resource_type: &str,
	) -> Result<Box<dyn PreparedAuthorized>, RbacError>;
}

/// The concrete evaluator. Stateless; policy data lives on the subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyAuthorizer;

impl PolicyAuthorizer {
	pub fn new() -> Self {
		Self
	}
}

impl Authorizer for PolicyAuthorizer {
	#[instrument(
		level = "debug",
		skip(self, ctx, subject, object),
		fields(
			subject_id = %subject.id,
			action = %action,
			resource_type = %object.resource_type,
		)
	)]
	fn authorize(
		&self,
		ctx: &AuthContext,
		subject: &Subject,
		action: Action,
		object: &RbacObject,
	) -> Result<(), RbacError> {
		if ctx.is_cancelled() {
			return Err(RbacError::Cancelled);
		}
		validate_inputs(action, &object.resource_type)?;

		match evaluate(subject, action, object) {
			Ok(()) => Ok(()),
			Err(reason) => Err(RbacError::Forbidden(Box::new(UnauthorizedDetail::new(
				subject, action, object, reason,
			)))),
		}
	}

	fn prepare(
		&self,
		ctx: &AuthContext,
		subject: &Subject,
		action: Action,
		resource_type: &str,
	) -> Result<Box<dyn PreparedAuthorized>, RbacError> {
		if ctx.is_cancelled() {
			return Err(RbacError::Cancelled);
		}
		validate_inputs(action, resource_type)?;
		Ok(Box::new(PreparedFilter::build(subject, action, resource_type)))
	}
}

fn validate_inputs(action: Action, resource_type: &str) -> Result<(), RbacError> {
	if resource_type.is_empty() {
		return Err(RbacError::InvalidInput(
			"object resource type must not be empty".to_string(),
		));
	}
	if action == Action::All {
		return Err(RbacError::InvalidInput(
			"the wildcard action cannot be authorized directly".to_string(),
		));
	}
	Ok(())
}

/// The pure decision function. Returns the deny reason so callers can build
/// the diagnostic detail without this function allocating on the allow path.
pub(crate) fn evaluate(
	subject: &Subject,
	action: Action,
	object: &RbacObject,
) -> Result<(), DenyReason> {
	if !subject.scope.allows(&object.resource_type, action) {
		return Err(DenyReason::Scope);
	}

	for role in &subject.roles {
		for perm in role.all_permissions() {
			if perm.negate && perm.matches(&object.resource_type, action) {
				return Err(DenyReason::Negated);
			}
		}
	}

	if acl_grants(&object.acl_user_list, &subject.id, action) {
		return Ok(());
	}
	for group in &subject.groups {
		if acl_grants(&object.acl_group_list, group, action) {
			return Ok(());
		}
	}

	for role in &subject.roles {
		if grants(&role.site, &object.resource_type, action) {
			return Ok(());
		}
		if !object.org_id.is_empty() {
			if let Some(perms) = role.org.get(&object.org_id) {
				if grants(perms, &object.resource_type, action) {
					return Ok(());
				}
			}
		}
		if !object.owner_id.is_empty() && object.owner_id == subject.id {
			if grants(&role.user, &object.resource_type, action) {
				return Ok(());
			}
		}
	}

	Err(DenyReason::NoGrant)
}

fn grants(perms: &[crate::subject::Permission], resource: &str, action: Action) -> bool {
	perms.iter().any(|p| !p.negate && p.matches(resource, action))
}

pub(crate) fn acl_grants(
	acl: &std::collections::HashMap<String, Vec<Action>>,
	key: &str,
	action: Action,
) -> bool {
	acl
		.get(key)
		.map(|actions| actions.contains(&action) || actions.contains(&Action::All))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::object::resource_type;
	use crate::subject::{permissions, Permission, Role, Scope};
	use std::collections::HashMap;
	use uuid::Uuid;

	fn subject(id: &str, roles: Vec<Role>) -> Subject {
		Subject {
			id: id.to_string(),
			friendly_name: "test".to_string(),
			roles,
			groups: Vec::new(),
			scope: Scope::all(),
		}
	}

	fn role(name: &str, site: Vec<Permission>) -> Role {
		Role {
			name: name.to_string(),
			display_name: name.to_string(),
			site,
			org: HashMap::new(),
			user: Vec::new(),
		}
	}

	fn org_role(name: &str, org_id: &str, perms: Vec<Permission>) -> Role {
		let mut org = HashMap::new();
		org.insert(org_id.to_string(), perms);
		Role {
			name: name.to_string(),
			display_name: name.to_string(),
			site: Vec::new(),
			org,
			user: Vec::new(),
		}
	}

	fn authorize(subject: &Subject, action: Action, object: &RbacObject) -> Result<(), RbacError> {
		PolicyAuthorizer::new().authorize(&AuthContext::new(), subject, action, object)
	}

	mod org_scoping {
		use super::*;

		#[test]
		fn org_scoped_read_allows_only_that_org() {
			let org_a = Uuid::new_v4().to_string();
			let org_b = Uuid::new_v4().to_string();
			let subject = subject(
				"user-1",
				vec![org_role(
					"org-reader",
					&org_a,
					permissions([(resource_type::TEMPLATE, vec![Action::Read])]),
				)],
			);

			let in_a = RbacObject::template().in_org(&org_a);
			let in_b = RbacObject::template().in_org(&org_b);
			assert!(authorize(&subject, Action::Read, &in_a).is_ok());
			assert!(matches!(
				authorize(&subject, Action::Read, &in_b),
				Err(RbacError::Forbidden(_))
			));
		}

		#[test]
		fn org_grant_does_not_apply_to_site_level_objects() {
			let org_a = Uuid::new_v4().to_string();
			let subject = subject(
				"user-1",
				vec![org_role(
					"org-reader",
					&org_a,
					permissions([(resource_type::TEMPLATE, vec![Action::Read])]),
				)],
			);
			let no_org = RbacObject::template();
			assert!(authorize(&subject, Action::Read, &no_org).is_err());
		}
	}

	mod negation {
		use super::*;

		#[test]
		fn negate_wins_over_site_wildcard() {
			let mut site = permissions([(resource_type::WILDCARD, vec![Action::All])]);
			site.push(Permission {
				resource_type: resource_type::WORKSPACE.to_string(),
				action: Action::Delete,
				negate: true,
			});
			let subject = subject("user-1", vec![role("almost-owner", site)]);

			let workspace = RbacObject::workspace().with_owner("user-1");
			assert!(matches!(
				authorize(&subject, Action::Delete, &workspace),
				Err(RbacError::Forbidden(_))
			));
			// Other actions on the same object remain granted.
			assert!(authorize(&subject, Action::Read, &workspace).is_ok());
		}

		#[test]
		fn negate_wins_over_acl_entry() {
			let mut acl = HashMap::new();
			acl.insert("user-1".to_string(), vec![Action::Update]);
			let mut subject = subject("user-1", Vec::new());
			subject.roles.push(role(
				"denier",
				vec![Permission {
					resource_type: resource_type::TEMPLATE.to_string(),
					action: Action::Update,
					negate: true,
				}],
			));

			let object = RbacObject::template().with_acl_user_list(acl);
			assert!(authorize(&subject, Action::Update, &object).is_err());
		}
	}

	mod acl {
		use super::*;

		#[test]
		fn group_acl_allows_without_role_grant() {
			let mut subject = subject("user-1", Vec::new());
			subject.groups.push("group-1".to_string());

			let mut acl = HashMap::new();
			acl.insert("group-1".to_string(), vec![Action::Update]);
			let object = RbacObject::template().with_acl_group_list(acl);

			assert!(authorize(&subject, Action::Update, &object).is_ok());
			assert!(authorize(&subject, Action::Delete, &object).is_err());
		}

		#[test]
		fn user_acl_allows_listed_user_only() {
			let mut acl = HashMap::new();
			acl.insert("user-1".to_string(), vec![Action::Read]);
			let object = RbacObject::template().with_acl_user_list(acl);

			let listed = subject("user-1", Vec::new());
			let other = subject("user-2", Vec::new());
			assert!(authorize(&listed, Action::Read, &object).is_ok());
			assert!(authorize(&other, Action::Read, &object).is_err());
		}

		#[test]
		fn wildcard_acl_entry_grants_all_actions() {
			let mut acl = HashMap::new();
			acl.insert("user-1".to_string(), vec![Action::All]);
			let object = RbacObject::template().with_acl_user_list(acl);
			let subject = subject("user-1", Vec::new());

			assert!(authorize(&subject, Action::Delete, &object).is_ok());
		}
	}

	mod scope {
		use super::*;

		#[test]
		fn scope_restriction_beats_role_grant() {
			let mut subject = subject(
				"user-1",
				vec![role(
					"owner",
					permissions([(resource_type::WILDCARD, vec![Action::All])]),
				)],
			);
			subject.scope = Scope {
				name: "workspace-read".to_string(),
				site: permissions([(resource_type::WORKSPACE, vec![Action::Read])]),
			};

			let workspace = RbacObject::workspace();
			let template = RbacObject::template();
			assert!(authorize(&subject, Action::Read, &workspace).is_ok());
			assert!(authorize(&subject, Action::Update, &workspace).is_err());
			assert!(authorize(&subject, Action::Read, &template).is_err());
		}
	}

	mod user_level {
		use super::*;

		#[test]
		fn user_grant_applies_only_to_owned_objects() {
			let mut member = role("member", Vec::new());
			member.user = permissions([(resource_type::WILDCARD, vec![Action::All])]);
			let subject = subject("user-1", vec![member]);

			let own = RbacObject::workspace().with_owner("user-1");
			let other = RbacObject::workspace().with_owner("user-2");
			assert!(authorize(&subject, Action::Delete, &own).is_ok());
			assert!(authorize(&subject, Action::Delete, &other).is_err());
		}
	}

	mod contract {
		use super::*;

		#[test]
		fn empty_resource_type_is_rejected() {
			let subject = subject("user-1", Vec::new());
			let object = RbacObject::default();
			assert!(matches!(
				authorize(&subject, Action::Read, &object),
				Err(RbacError::InvalidInput(_))
			));
		}

		#[test]
		fn wildcard_action_is_rejected() {
			let subject = subject("user-1", Vec::new());
			let object = RbacObject::workspace();
			assert!(matches!(
				authorize(&subject, Action::All, &object),
				Err(RbacError::InvalidInput(_))
			));
		}

		#[test]
		fn cancelled_context_reports_cancellation_not_denial() {
			let ctx = AuthContext::new();
			ctx.cancellation().cancel();
			let subject = subject("user-1", Vec::new());
			let object = RbacObject::workspace();
			assert!(matches!(
				PolicyAuthorizer::new().authorize(&ctx, &subject, Action::Read, &object),
				Err(RbacError::Cancelled)
			));
		}

		#[test]
		fn evaluation_is_deterministic() {
			let org = Uuid::new_v4().to_string();
			let subject = subject(
				"user-1",
				vec![org_role(
					"org-reader",
					&org,
					permissions([(resource_type::TEMPLATE, vec![Action::Read])]),
				)],
			);
			let object = RbacObject::template().in_org(&org);
			for _ in 0..3 {
				assert!(authorize(&subject, Action::Read, &object).is_ok());
				assert!(authorize(&subject, Action::Update, &object).is_err());
			}
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

		proptest! {
			#[test]
			fn site_wildcard_allows_any_action(
				subject_uuid in any::<u128>(),
				owner_uuid in any::<u128>(),
				action in arb_action(),
			) {
				let subject = subject(
					&Uuid::from_u128(subject_uuid).to_string(),
					vec![role(
						"owner",
						permissions([(resource_type::WILDCARD, vec![Action::All])]),
					)],
				);
				let object = RbacObject::workspace()
					.with_owner(&Uuid::from_u128(owner_uuid).to_string());
				prop_assert!(authorize(&subject, action, &object).is_ok());
			}

			#[test]
			fn no_roles_and_no_acl_always_denies(
				subject_uuid in any::<u128>(),
				action in arb_action(),
			) {
				let subject = subject(&Uuid::from_u128(subject_uuid).to_string(), Vec::new());
				let object = RbacObject::workspace();
				prop_assert!(authorize(&subject, action, &object).is_err());
			}

			#[test]
			fn negate_always_denies_regardless_of_grants(
				subject_uuid in any::<u128>(),
				action in arb_action(),
			) {
				let id = Uuid::from_u128(subject_uuid).to_string();
				let mut site = permissions([(resource_type::WILDCARD, vec![Action::All])]);
				site.push(Permission {
					resource_type: resource_type::WORKSPACE.to_string(),
					action,
					negate: true,
				});
				let subject = subject(&id, vec![role("conflicted", site)]);
				let object = RbacObject::workspace().with_owner(&id);
				prop_assert!(authorize(&subject, action, &object).is_err());
			}
		}
	}
}
