// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subjects, roles, permissions, and scopes.
//!
//! A [`Subject`] is the identity an operation runs on behalf of: an
//! authenticated user, an API token, or one of the fixed system identities.
//! Its effective permissions are the union of its role grants, intersected
//! with its [`Scope`] before any evaluation happens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::object::resource_type;

/// Actions that can be performed on a resource.
///
/// [`Action::All`] is the wildcard. It is valid inside permission tables and
/// ACL entries but is never a valid input to an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	Create,
	Read,
	Update,
	Delete,
	#[serde(rename = "*")]
	All,
}

impl Action {
	/// The string form used in ACL columns and compiled SQL predicates.
	pub fn as_str(&self) -> &'static str {
		match self {
			Action::Create => "create",
			Action::Read => "read",
			Action::Update => "update",
			Action::Delete => "delete",
			Action::All => "*",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

/// A single grant or denial of an action on a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
	pub resource_type: String,
	pub action: Action,
	/// An explicit deny. A matching negated permission wins over every
	/// grant, including ACL entries.
	pub negate: bool,
}

impl Permission {
	/// Returns true if this permission applies to the given resource type
	/// and action, honoring the wildcard on either field.
	pub fn matches(&self, resource: &str, action: Action) -> bool {
		(self.resource_type == resource || self.resource_type == resource_type::WILDCARD)
			&& (self.action == action || self.action == Action::All)
	}
}

/// Builds a permission list from a `(resource type, actions)` table.
///
/// This is the constructor used for role definitions and system identities,
/// keeping the grant tables readable at the call site.
pub fn permissions<I>(table: I) -> Vec<Permission>
where
	I: IntoIterator<Item = (&'static str, Vec<Action>)>,
{
	let mut perms = Vec::new();
	for (resource, actions) in table {
		for action in actions {
			perms.push(Permission {
				resource_type: resource.to_string(),
				action,
				negate: false,
			});
		}
	}
	perms
}

/// A named bundle of permissions assignable to a subject.
///
/// Site permissions apply deployment-wide, org permissions apply to objects
/// in the keyed organization, and user permissions apply only to objects
/// owned by the subject itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
	pub name: String,
	pub display_name: String,
	pub site: Vec<Permission>,
	/// Organization ID to permissions granted within that organization.
	pub org: HashMap<String, Vec<Permission>>,
	pub user: Vec<Permission>,
}

impl Role {
	/// Iterates every permission in the role regardless of level.
	pub(crate) fn all_permissions(&self) -> impl Iterator<Item = &Permission> {
		self
			.site
			.iter()
			.chain(self.org.values().flatten())
			.chain(self.user.iter())
	}
}

/// A restriction intersected with role-derived permissions before any
/// evaluation. A narrowly scoped API token carries a scope listing only the
/// actions the token may exercise; [`Scope::all`] imposes no restriction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
	pub name: String,
	pub site: Vec<Permission>,
}

impl Scope {
	/// The unrestricted scope.
	pub fn all() -> Self {
		Self {
			name: "all".to_string(),
			site: vec![Permission {
				resource_type: resource_type::WILDCARD.to_string(),
				action: Action::All,
				negate: false,
			}],
		}
	}

	/// Returns true if the scope permits the action on the resource type.
	pub fn allows(&self, resource: &str, action: Action) -> bool {
		self
			.site
			.iter()
			.any(|p| !p.negate && p.matches(resource, action))
	}
}

impl Default for Scope {
	fn default() -> Self {
		Self::all()
	}
}

const REMOVE_ACTOR_ID: &str = "remove-actor";

/// The identity an operation runs on behalf of.
///
/// Subjects are immutable once attached to a context. The ID is the user's
/// UUID in string form; system identities use the nil UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
	pub id: String,
	/// Used for logging and debugging only, never for decisions.
	pub friendly_name: String,
	pub roles: Vec<Role>,
	/// Group IDs the subject belongs to, matched against object group ACLs.
	pub groups: Vec<String>,
	pub scope: Scope,
}

impl Subject {
	/// The sentinel subject that strips any actor from a derived context.
	/// Used when a nested call must run unauthenticated by design.
	pub fn remove_actor() -> Self {
		Self {
			id: REMOVE_ACTOR_ID.to_string(),
			friendly_name: String::new(),
			roles: Vec::new(),
			groups: Vec::new(),
			scope: Scope::all(),
		}
	}

	pub fn is_remove_actor(&self) -> bool {
		self.id == REMOVE_ACTOR_ID
	}

	/// Role names, for logging and audit events.
	pub fn role_names(&self) -> Vec<String> {
		self.roles.iter().map(|r| r.name.clone()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn permission_matches_exact() {
		let perm = Permission {
			resource_type: "workspace".to_string(),
			action: Action::Read,
			negate: false,
		};
		assert!(perm.matches("workspace", Action::Read));
		assert!(!perm.matches("workspace", Action::Update));
		assert!(!perm.matches("template", Action::Read));
	}

	#[test]
	fn permission_matches_wildcard_resource() {
		let perm = Permission {
			resource_type: "*".to_string(),
			action: Action::Delete,
			negate: false,
		};
		assert!(perm.matches("workspace", Action::Delete));
		assert!(perm.matches("template", Action::Delete));
		assert!(!perm.matches("workspace", Action::Read));
	}

	#[test]
	fn permission_matches_wildcard_action() {
		let perm = Permission {
			resource_type: "workspace".to_string(),
			action: Action::All,
			negate: false,
		};
		assert!(perm.matches("workspace", Action::Create));
		assert!(perm.matches("workspace", Action::Delete));
		assert!(!perm.matches("template", Action::Read));
	}

	#[test]
	fn permissions_builder_expands_actions() {
		let perms = permissions([
			("workspace", vec![Action::Read, Action::Update]),
			("template", vec![Action::Read]),
		]);
		assert_eq!(perms.len(), 3);
		assert!(perms.iter().all(|p| !p.negate));
		assert!(perms[0].matches("workspace", Action::Read));
		assert!(perms[2].matches("template", Action::Read));
	}

	#[test]
	fn scope_all_allows_everything() {
		let scope = Scope::all();
		assert!(scope.allows("workspace", Action::Delete));
		assert!(scope.allows("anything", Action::Create));
	}

	#[test]
	fn narrow_scope_restricts() {
		let scope = Scope {
			name: "workspace-read".to_string(),
			site: permissions([("workspace", vec![Action::Read])]),
		};
		assert!(scope.allows("workspace", Action::Read));
		assert!(!scope.allows("workspace", Action::Update));
		assert!(!scope.allows("template", Action::Read));
	}

	#[test]
	fn remove_actor_sentinel_round_trips() {
		let sentinel = Subject::remove_actor();
		assert!(sentinel.is_remove_actor());
	}

	#[test]
	fn action_serializes_wildcard_as_star() {
		let json = serde_json::to_string(&Action::All).unwrap();
		assert_eq!(json, "\"*\"");
		let json = serde_json::to_string(&Action::Read).unwrap();
		assert_eq!(json, "\"read\"");
	}
}
