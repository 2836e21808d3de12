// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! System bypass identities.
//!
//! Fixed pseudo-subjects used by internal background subsystems instead of
//! end-user authentication. Each carries the nil UUID, a single role with a
//! minimal enumerated permission set, and no scope restriction.
//!
//! Obtaining one of these contexts is an explicit, auditable decision.
//! Every call site should say which subsystem it is acting as and why, the
//! same way an impersonation would be called out in review.

use std::collections::HashMap;
use uuid::Uuid;

use gantry_server_rbac::{
	permissions, resource_type, Action, AuthContext, Permission, Role, Scope, Subject,
};

fn system_subject(name: &str, display_name: &str, site: Vec<Permission>) -> Subject {
	Subject {
		id: Uuid::nil().to_string(),
		friendly_name: name.to_string(),
		roles: vec![Role {
			name: name.to_string(),
			display_name: display_name.to_string(),
			site,
			org: HashMap::new(),
			user: Vec::new(),
		}],
		groups: Vec::new(),
		scope: Scope::all(),
	}
}

/// Context for the provisioner daemon: claims build jobs and updates the
/// workspaces they belong to.
pub fn as_provisioner_daemon(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"provisionerd",
		"Provisioner Daemon",
		permissions([
			(resource_type::SYSTEM, vec![Action::All]),
			(resource_type::TEMPLATE, vec![Action::Read, Action::Update]),
			(resource_type::USER, vec![Action::Read]),
			(
				resource_type::WORKSPACE,
				vec![Action::Read, Action::Update, Action::Delete],
			),
		]),
	))
}

/// Context for the autostart scheduler: reads eligible workspaces and
/// triggers their builds.
pub fn as_autostart(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"autostart",
		"Autostart Daemon",
		permissions([
			(resource_type::SYSTEM, vec![Action::All]),
			(resource_type::TEMPLATE, vec![Action::Read, Action::Update]),
			(resource_type::WORKSPACE, vec![Action::Read, Action::Update]),
			(resource_type::USER, vec![Action::Read]),
		]),
	))
}

/// Context for the hang detector: finds provisioner jobs that stopped
/// heartbeating and fails them.
pub fn as_hang_detector(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"hangdetector",
		"Hang Detector Daemon",
		permissions([
			(resource_type::SYSTEM, vec![Action::All]),
			(resource_type::TEMPLATE, vec![Action::Read]),
			(resource_type::WORKSPACE, vec![Action::Read, Action::Update]),
		]),
	))
}

/// Context for database maintenance: purges expired rows.
pub fn as_db_purge(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"dbpurge",
		"Database Maintenance",
		permissions([
			(resource_type::SYSTEM, vec![Action::All]),
			(resource_type::AUDIT_LOG, vec![Action::Read, Action::Delete]),
		]),
	))
}

/// Context for the notifier: drains the notification queue.
pub fn as_notifier(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"notifier",
		"Notifier",
		permissions([
			(
				resource_type::NOTIFICATION_MESSAGE,
				vec![Action::Create, Action::Read, Action::Update],
			),
			(resource_type::USER, vec![Action::Read]),
		]),
	))
}

/// Context for miscellaneous internal operations (login plumbing, caches).
/// Deliberately broad on reads, enumerated on writes, no deletes outside
/// API keys. Prefer one of the narrower identities when it fits.
pub fn as_system_restricted(ctx: &AuthContext) -> AuthContext {
	ctx.as_actor(system_subject(
		"system",
		"Gantry",
		permissions([
			(resource_type::WILDCARD, vec![Action::Read]),
			(resource_type::SYSTEM, vec![Action::All]),
			(
				resource_type::API_KEY,
				vec![Action::Create, Action::Update, Action::Delete],
			),
			(resource_type::GROUP, vec![Action::Create, Action::Update]),
			(resource_type::ORGANIZATION, vec![Action::Create]),
			(resource_type::ORGANIZATION_MEMBER, vec![Action::Create]),
			(
				resource_type::USER,
				vec![Action::Create, Action::Update, Action::Delete],
			),
			(resource_type::WORKSPACE, vec![Action::Update]),
			(resource_type::AUDIT_LOG, vec![Action::Create]),
			(
				resource_type::NOTIFICATION_MESSAGE,
				vec![Action::Create, Action::Read, Action::Update],
			),
		]),
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use gantry_server_rbac::{Authorizer, PolicyAuthorizer, RbacObject};

	fn allowed(ctx: &AuthContext, action: Action, object: &RbacObject) -> bool {
		PolicyAuthorizer::new()
			.authorize(ctx, ctx.actor().unwrap(), action, object)
			.is_ok()
	}

	#[test]
	fn provisioner_daemon_updates_workspaces_but_not_users() {
		let ctx = as_provisioner_daemon(&AuthContext::new());
		assert!(allowed(&ctx, Action::Update, &RbacObject::workspace().with_owner("u1")));
		assert!(allowed(&ctx, Action::Read, &RbacObject::user().with_owner("u1")));
		assert!(!allowed(&ctx, Action::Update, &RbacObject::user().with_owner("u1")));
	}

	#[test]
	fn notifier_is_confined_to_its_queue() {
		let ctx = as_notifier(&AuthContext::new());
		assert!(allowed(&ctx, Action::Create, &RbacObject::notification_message()));
		assert!(!allowed(&ctx, Action::Read, &RbacObject::workspace()));
		assert!(!allowed(&ctx, Action::Update, &RbacObject::system()));
	}

	#[test]
	fn db_purge_deletes_audit_logs_only() {
		let ctx = as_db_purge(&AuthContext::new());
		assert!(allowed(&ctx, Action::Delete, &RbacObject::audit_log()));
		assert!(!allowed(&ctx, Action::Delete, &RbacObject::workspace()));
	}

	#[test]
	fn system_restricted_reads_everything_but_deletes_almost_nothing() {
		let ctx = as_system_restricted(&AuthContext::new());
		assert!(allowed(&ctx, Action::Read, &RbacObject::workspace()));
		assert!(allowed(&ctx, Action::Read, &RbacObject::template()));
		assert!(allowed(&ctx, Action::Delete, &RbacObject::api_key()));
		assert!(!allowed(&ctx, Action::Delete, &RbacObject::workspace()));
		assert!(!allowed(&ctx, Action::Delete, &RbacObject::organization()));
	}

	#[test]
	fn system_subjects_use_the_nil_uuid() {
		let ctx = as_autostart(&AuthContext::new());
		assert_eq!(ctx.actor().unwrap().id, Uuid::nil().to_string());
	}
}
