// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Builtin role definitions.
//!
//! Roles are configuration data consumed by the evaluator, not policy
//! logic. The constructors here are the deployment defaults; org-scoped
//! roles take the organization they apply to.

use std::collections::HashMap;

use crate::authorizer::RbacError;
use crate::object::resource_type;
use crate::subject::{permissions, Action, Permission, Role, Scope, Subject};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_MEMBER: &str = "member";
pub const ROLE_AUDITOR: &str = "auditor";
pub const ROLE_TEMPLATE_ADMIN: &str = "template-admin";
pub const ROLE_USER_ADMIN: &str = "user-admin";
pub const ROLE_ORG_ADMIN: &str = "organization-admin";
pub const ROLE_ORG_MEMBER: &str = "organization-member";

fn role(name: &str, display_name: &str, site: Vec<Permission>) -> Role {
	Role {
		name: name.to_string(),
		display_name: display_name.to_string(),
		site,
		org: HashMap::new(),
		user: Vec::new(),
	}
}

/// Full deployment-wide control.
pub fn owner() -> Role {
	role(
		ROLE_OWNER,
		"Owner",
		permissions([(resource_type::WILDCARD, vec![Action::All])]),
	)
}

/// The default role every user holds. Grants full control over resources
/// the user owns and read access to the platform surfaces everyone sees.
pub fn member() -> Role {
	let mut member = role(
		ROLE_MEMBER,
		"Member",
		permissions([
			(resource_type::USER, vec![Action::Read]),
			(resource_type::ORGANIZATION, vec![Action::Read]),
		]),
	);
	member.user = permissions([(resource_type::WILDCARD, vec![Action::All])]);
	member
}

/// Read-only access to audit logs.
pub fn auditor() -> Role {
	role(
		ROLE_AUDITOR,
		"Auditor",
		permissions([
			(resource_type::AUDIT_LOG, vec![Action::Read]),
			(resource_type::TEMPLATE, vec![Action::Read]),
		]),
	)
}

/// Manages templates across all organizations.
pub fn template_admin() -> Role {
	role(
		ROLE_TEMPLATE_ADMIN,
		"Template Admin",
		permissions([
			(
				resource_type::TEMPLATE,
				vec![Action::Create, Action::Read, Action::Update, Action::Delete],
			),
			(resource_type::ORGANIZATION, vec![Action::Read]),
			(resource_type::GROUP, vec![Action::Read]),
			(resource_type::USER, vec![Action::Read]),
			(resource_type::WORKSPACE, vec![Action::Read]),
		]),
	)
}

/// Manages users and their organization memberships.
pub fn user_admin() -> Role {
	role(
		ROLE_USER_ADMIN,
		"User Admin",
		permissions([
			(
				resource_type::USER,
				vec![Action::Create, Action::Read, Action::Update, Action::Delete],
			),
			(
				resource_type::ORGANIZATION_MEMBER,
				vec![Action::Create, Action::Read, Action::Update, Action::Delete],
			),
			(resource_type::ORGANIZATION, vec![Action::Read]),
			(resource_type::GROUP, vec![Action::Read]),
		]),
	)
}

/// Full control within one organization.
pub fn org_admin(org_id: &str) -> Role {
	let mut role = role(ROLE_ORG_ADMIN, "Organization Admin", Vec::new());
	role.name = format!("{ROLE_ORG_ADMIN}:{org_id}");
	role.org.insert(
		org_id.to_string(),
		permissions([(resource_type::WILDCARD, vec![Action::All])]),
	);
	role
}

/// Baseline membership in one organization.
pub fn org_member(org_id: &str) -> Role {
	let mut role = role(ROLE_ORG_MEMBER, "Organization Member", Vec::new());
	role.name = format!("{ROLE_ORG_MEMBER}:{org_id}");
	role.org.insert(
		org_id.to_string(),
		permissions([
			(resource_type::ORGANIZATION, vec![Action::Read]),
			(resource_type::ORGANIZATION_MEMBER, vec![Action::Read]),
			(resource_type::TEMPLATE, vec![Action::Read]),
			(resource_type::GROUP, vec![Action::Read]),
		]),
	);
	role
}

/// Looks up a builtin role by name. Org-scoped roles require `org_id`.
pub fn role_by_name(name: &str, org_id: Option<&str>) -> Result<Role, RbacError> {
	match (name, org_id) {
		(ROLE_OWNER, None) => Ok(owner()),
		(ROLE_MEMBER, None) => Ok(member()),
		(ROLE_AUDITOR, None) => Ok(auditor()),
		(ROLE_TEMPLATE_ADMIN, None) => Ok(template_admin()),
		(ROLE_USER_ADMIN, None) => Ok(user_admin()),
		(ROLE_ORG_ADMIN, Some(org_id)) => Ok(org_admin(org_id)),
		(ROLE_ORG_MEMBER, Some(org_id)) => Ok(org_member(org_id)),
		(ROLE_ORG_ADMIN | ROLE_ORG_MEMBER, None) => Err(RbacError::InvalidInput(format!(
			"role {name:?} requires an organization"
		))),
		_ => Err(RbacError::InvalidInput(format!(
			"{name:?} is not a builtin role"
		))),
	}
}

/// A subject with the given roles and no scope restriction, as produced by
/// the authentication layer for an ordinary user session.
pub fn user_subject(id: &str, friendly_name: &str, roles: Vec<Role>) -> Subject {
	Subject {
		id: id.to_string(),
		friendly_name: friendly_name.to_string(),
		roles,
		groups: Vec::new(),
		scope: Scope::all(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::authorizer::{Authorizer, PolicyAuthorizer};
	use crate::context::AuthContext;
	use crate::object::RbacObject;

	fn allowed(subject: &Subject, action: Action, object: &RbacObject) -> bool {
		PolicyAuthorizer::new()
			.authorize(&AuthContext::new(), subject, action, object)
			.is_ok()
	}

	#[test]
	fn owner_can_do_everything() {
		let subject = user_subject("u1", "admin", vec![owner()]);
		assert!(allowed(&subject, Action::Delete, &RbacObject::workspace()));
		assert!(allowed(&subject, Action::Create, &RbacObject::template().in_org("o1")));
	}

	#[test]
	fn member_controls_own_resources_only() {
		let subject = user_subject("u1", "alice", vec![member()]);
		let own = RbacObject::workspace().with_owner("u1");
		let other = RbacObject::workspace().with_owner("u2");
		assert!(allowed(&subject, Action::Delete, &own));
		assert!(!allowed(&subject, Action::Read, &other));
	}

	#[test]
	fn auditor_reads_audit_logs_only() {
		let subject = user_subject("u1", "aud", vec![auditor()]);
		assert!(allowed(&subject, Action::Read, &RbacObject::audit_log()));
		assert!(!allowed(&subject, Action::Create, &RbacObject::audit_log()));
		assert!(!allowed(&subject, Action::Read, &RbacObject::workspace()));
	}

	#[test]
	fn org_admin_is_confined_to_its_org() {
		let subject = user_subject("u1", "oa", vec![org_admin("o1")]);
		assert!(allowed(&subject, Action::Delete, &RbacObject::template().in_org("o1")));
		assert!(!allowed(&subject, Action::Delete, &RbacObject::template().in_org("o2")));
	}

	#[test]
	fn org_member_reads_org_surfaces() {
		let subject = user_subject("u1", "om", vec![org_member("o1")]);
		assert!(allowed(&subject, Action::Read, &RbacObject::template().in_org("o1")));
		assert!(!allowed(&subject, Action::Update, &RbacObject::template().in_org("o1")));
		assert!(!allowed(&subject, Action::Read, &RbacObject::template().in_org("o2")));
	}

	#[test]
	fn role_by_name_resolves_builtins() {
		assert_eq!(role_by_name(ROLE_OWNER, None).unwrap().name, ROLE_OWNER);
		assert!(role_by_name(ROLE_ORG_ADMIN, Some("o1")).is_ok());
		assert!(role_by_name(ROLE_ORG_ADMIN, None).is_err());
		assert!(role_by_name("no-such-role", None).is_err());
	}
}
