// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authorization-relevant projection of a store row.
//!
//! An [`RbacObject`] is constructed transiently from a row immediately
//! before an authorization check and discarded afterwards; it is never
//! persisted. Store row types implement [`Objecter`] to describe their own
//! projection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::authorizer::RbacError;
use crate::subject::Action;

/// Resource type names used in permission tables and objects.
pub mod resource_type {
	pub const WILDCARD: &str = "*";
	pub const USER: &str = "user";
	pub const ORGANIZATION: &str = "organization";
	pub const ORGANIZATION_MEMBER: &str = "organization_member";
	pub const GROUP: &str = "group";
	pub const TEMPLATE: &str = "template";
	pub const WORKSPACE: &str = "workspace";
	pub const API_KEY: &str = "api_key";
	pub const AUDIT_LOG: &str = "audit_log";
	pub const NOTIFICATION_MESSAGE: &str = "notification_message";
	/// Internal plumbing with no per-row ownership. Guarded by the system
	/// identities rather than user roles.
	pub const SYSTEM: &str = "system";
}

/// The object side of an authorization check.
///
/// Empty strings mean "not set" for `owner_id` and `org_id`; the resource
/// type must never be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbacObject {
	pub resource_type: String,
	/// Row ID, carried for logging only.
	pub id: String,
	pub owner_id: String,
	pub org_id: String,
	/// Per-object override granting specific users actions independent of
	/// their roles.
	pub acl_user_list: HashMap<String, Vec<Action>>,
	/// Per-object override granting specific groups actions independent of
	/// member roles.
	pub acl_group_list: HashMap<String, Vec<Action>>,
}

impl RbacObject {
	pub fn new(resource: &str) -> Self {
		Self {
			resource_type: resource.to_string(),
			..Default::default()
		}
	}

	pub fn user() -> Self {
		Self::new(resource_type::USER)
	}

	pub fn organization() -> Self {
		Self::new(resource_type::ORGANIZATION)
	}

	pub fn organization_member() -> Self {
		Self::new(resource_type::ORGANIZATION_MEMBER)
	}

	pub fn group() -> Self {
		Self::new(resource_type::GROUP)
	}

	pub fn template() -> Self {
		Self::new(resource_type::TEMPLATE)
	}

	pub fn workspace() -> Self {
		Self::new(resource_type::WORKSPACE)
	}

	pub fn api_key() -> Self {
		Self::new(resource_type::API_KEY)
	}

	pub fn audit_log() -> Self {
		Self::new(resource_type::AUDIT_LOG)
	}

	pub fn notification_message() -> Self {
		Self::new(resource_type::NOTIFICATION_MESSAGE)
	}

	pub fn system() -> Self {
		Self::new(resource_type::SYSTEM)
	}

	pub fn with_id(mut self, id: &str) -> Self {
		self.id = id.to_string();
		self
	}

	pub fn with_owner(mut self, owner_id: &str) -> Self {
		self.owner_id = owner_id.to_string();
		self
	}

	pub fn in_org(mut self, org_id: &str) -> Self {
		self.org_id = org_id.to_string();
		self
	}

	pub fn with_acl_user_list(mut self, acl: HashMap<String, Vec<Action>>) -> Self {
		self.acl_user_list = acl;
		self
	}

	pub fn with_acl_group_list(mut self, acl: HashMap<String, Vec<Action>>) -> Self {
		self.acl_group_list = acl;
		self
	}

	/// Rejects objects that must not be retained beyond a single check.
	///
	/// ACL lists change at runtime, so a cached object carrying them would
	/// silently grant or deny with stale data. An empty resource type would
	/// make every later check fail closed in a confusing place.
	pub fn assert_cacheable(&self) -> Result<(), RbacError> {
		if self.resource_type.is_empty() {
			return Err(RbacError::InvalidInput(
				"cached rbac object must have a resource type".to_string(),
			));
		}
		if !self.acl_user_list.is_empty() || !self.acl_group_list.is_empty() {
			return Err(RbacError::InvalidInput(
				"cached rbac object must not carry ACL lists".to_string(),
			));
		}
		Ok(())
	}
}

/// Implemented by store row types to expose their authorization projection.
pub trait Objecter {
	fn rbac_object(&self) -> RbacObject;
}

impl Objecter for RbacObject {
	fn rbac_object(&self) -> RbacObject {
		self.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builders_set_fields() {
		let object = RbacObject::workspace()
			.with_id("ws-1")
			.with_owner("user-1")
			.in_org("org-1");
		assert_eq!(object.resource_type, resource_type::WORKSPACE);
		assert_eq!(object.id, "ws-1");
		assert_eq!(object.owner_id, "user-1");
		assert_eq!(object.org_id, "org-1");
		assert!(object.acl_user_list.is_empty());
	}

	#[test]
	fn cacheable_rejects_acl_lists() {
		let mut acl = HashMap::new();
		acl.insert("user-1".to_string(), vec![Action::Read]);

		assert!(RbacObject::template().assert_cacheable().is_ok());
		assert!(RbacObject::template()
			.with_acl_user_list(acl.clone())
			.assert_cacheable()
			.is_err());
		assert!(RbacObject::template()
			.with_acl_group_list(acl)
			.assert_cacheable()
			.is_err());
	}

	#[test]
	fn cacheable_rejects_empty_type() {
		let object = RbacObject::default();
		assert!(object.assert_cacheable().is_err());
	}
}
