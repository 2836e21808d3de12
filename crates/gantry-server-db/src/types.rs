// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Row and parameter types for the store surface.
//!
//! Row types implement [`Objecter`] to expose their authorization
//! projection; the projection is built transiently right before a check and
//! never persisted. Provisioner jobs and notification messages have no
//! per-row projection: those operations are guarded by the system resource
//! instead.

use chrono::{DateTime, Utc};
use gantry_server_rbac::{Action, Objecter, RbacObject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A JSON ACL column: user or group ID to granted actions.
pub type AclList = HashMap<String, Vec<Action>>;

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Objecter for User {
	fn rbac_object(&self) -> RbacObject {
		// A user row is owned by the user it describes.
		RbacObject::user()
			.with_id(&self.id.to_string())
			.with_owner(&self.id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertUserParams {
	pub id: Uuid,
	pub username: String,
	pub email: String,
}

#[derive(Debug, Clone)]
pub struct UpdateUserProfileParams {
	pub id: Uuid,
	pub username: String,
	pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListUsersParams {
	pub deleted: bool,
	pub limit: i64,
	pub offset: i64,
}

// =============================================================================
// Organizations
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
	pub id: Uuid,
	pub name: String,
	pub display_name: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Objecter for Organization {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::organization()
			.with_id(&self.id.to_string())
			.in_org(&self.id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertOrganizationParams {
	pub id: Uuid,
	pub name: String,
	pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateOrganizationParams {
	pub id: Uuid,
	pub name: String,
	pub display_name: String,
}

// =============================================================================
// Organization members
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMember {
	pub organization_id: Uuid,
	pub user_id: Uuid,
	pub roles: Vec<String>,
	pub created_at: DateTime<Utc>,
}

impl Objecter for OrganizationMember {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::organization_member()
			.in_org(&self.organization_id.to_string())
			.with_owner(&self.user_id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertOrganizationMemberParams {
	pub organization_id: Uuid,
	pub user_id: Uuid,
	pub roles: Vec<String>,
}

/// Identifies one membership row.
#[derive(Debug, Clone, Copy)]
pub struct OrganizationMemberParams {
	pub organization_id: Uuid,
	pub user_id: Uuid,
}

// =============================================================================
// Groups
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
	pub created_at: DateTime<Utc>,
}

impl Objecter for Group {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::group()
			.with_id(&self.id.to_string())
			.in_org(&self.organization_id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertGroupParams {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupMemberParams {
	pub group_id: Uuid,
	pub user_id: Uuid,
}

// =============================================================================
// Templates
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
	pub display_name: String,
	pub created_by: Uuid,
	pub deleted: bool,
	/// Per-template override: user ID to granted actions.
	pub user_acl: AclList,
	/// Per-template override: group ID to granted actions.
	pub group_acl: AclList,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Objecter for Template {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::template()
			.with_id(&self.id.to_string())
			.in_org(&self.organization_id.to_string())
			.with_acl_user_list(self.user_acl.clone())
			.with_acl_group_list(self.group_acl.clone())
	}
}

#[derive(Debug, Clone)]
pub struct InsertTemplateParams {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
	pub display_name: String,
	pub created_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct TemplateByOrganizationAndNameParams {
	pub organization_id: Uuid,
	pub name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTemplateMetaParams {
	pub id: Uuid,
	pub name: String,
	pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTemplateAclParams {
	pub id: Uuid,
	pub user_acl: AclList,
	pub group_acl: AclList,
}

#[derive(Debug, Clone, Default)]
pub struct ListTemplatesParams {
	pub organization_id: Option<Uuid>,
	pub deleted: bool,
}

// =============================================================================
// Workspaces
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
	pub id: Uuid,
	pub owner_id: Uuid,
	pub organization_id: Uuid,
	pub template_id: Uuid,
	pub name: String,
	/// Cron expression controlling automatic start, if enabled.
	pub autostart_schedule: Option<String>,
	pub last_used_at: DateTime<Utc>,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Objecter for Workspace {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::workspace()
			.with_id(&self.id.to_string())
			.with_owner(&self.owner_id.to_string())
			.in_org(&self.organization_id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertWorkspaceParams {
	pub id: Uuid,
	pub owner_id: Uuid,
	pub organization_id: Uuid,
	pub template_id: Uuid,
	pub name: String,
	pub autostart_schedule: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkspaceByOwnerAndNameParams {
	pub owner_id: Uuid,
	pub name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateWorkspaceParams {
	pub id: Uuid,
	pub name: String,
}

#[derive(Debug, Clone)]
pub struct UpdateWorkspaceAutostartParams {
	pub id: Uuid,
	pub autostart_schedule: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateWorkspaceLastUsedAtParams {
	pub id: Uuid,
	pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BatchUpdateWorkspaceLastUsedAtParams {
	pub ids: Vec<Uuid>,
	pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ListWorkspacesParams {
	pub owner_id: Option<Uuid>,
	pub organization_id: Option<Uuid>,
	pub template_id: Option<Uuid>,
	pub deleted: bool,
}

// =============================================================================
// Provisioner jobs
// =============================================================================

/// Background build work executed by provisioner daemons. Guarded by the
/// system resource; there is no per-row projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerJob {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub job_type: String,
	pub input: serde_json::Value,
	pub worker_id: Option<Uuid>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InsertProvisionerJobParams {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub job_type: String,
	pub input: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AcquireProvisionerJobParams {
	pub worker_id: Uuid,
	pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdateProvisionerJobCompletedParams {
	pub id: Uuid,
	pub completed_at: DateTime<Utc>,
	pub error: Option<String>,
}

// =============================================================================
// API keys
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
	pub id: Uuid,
	pub user_id: Uuid,
	/// SHA-256 of the secret; the plaintext is never stored.
	pub token_hash: String,
	/// Scope name restricting what the key may do, "all" for unrestricted.
	pub scope: String,
	pub expires_at: DateTime<Utc>,
	pub last_used_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

impl Objecter for ApiKey {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::api_key()
			.with_id(&self.id.to_string())
			.with_owner(&self.user_id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertApiKeyParams {
	pub id: Uuid,
	pub user_id: Uuid,
	pub token_hash: String,
	pub scope: String,
	pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Audit logs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
	pub id: Uuid,
	pub time: DateTime<Utc>,
	pub actor_id: Uuid,
	pub action: String,
	pub resource_type: String,
	pub resource_id: String,
}

impl Objecter for AuditLog {
	fn rbac_object(&self) -> RbacObject {
		RbacObject::audit_log().with_id(&self.id.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct InsertAuditLogParams {
	pub id: Uuid,
	pub actor_id: Uuid,
	pub action: String,
	pub resource_type: String,
	pub resource_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListAuditLogsParams {
	pub limit: i64,
	pub offset: i64,
}

// =============================================================================
// Notification messages
// =============================================================================

/// Queued outbound notification. Guarded by the system resource; only the
/// notifier subsystem touches these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
	pub id: Uuid,
	pub user_id: Uuid,
	pub payload: serde_json::Value,
	pub sent_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EnqueueNotificationMessageParams {
	pub id: Uuid,
	pub user_id: Uuid,
	pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
	use super::*;
	use gantry_server_rbac::resource_type;

	#[test]
	fn user_row_is_owned_by_itself() {
		let id = Uuid::new_v4();
		let user = User {
			id,
			username: "alice".to_string(),
			email: "alice@example.com".to_string(),
			deleted: false,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		let object = user.rbac_object();
		assert_eq!(object.resource_type, resource_type::USER);
		assert_eq!(object.owner_id, id.to_string());
	}

	#[test]
	fn template_projection_carries_acls() {
		let mut user_acl = AclList::new();
		user_acl.insert(Uuid::new_v4().to_string(), vec![Action::Read]);
		let template = Template {
			id: Uuid::new_v4(),
			organization_id: Uuid::new_v4(),
			name: "base".to_string(),
			display_name: "Base".to_string(),
			created_by: Uuid::new_v4(),
			deleted: false,
			user_acl: user_acl.clone(),
			group_acl: AclList::new(),
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		let object = template.rbac_object();
		assert_eq!(object.acl_user_list, user_acl);
		assert_eq!(object.org_id, template.organization_id.to_string());
	}

	#[test]
	fn workspace_projection_has_owner_and_org() {
		let workspace = Workspace {
			id: Uuid::new_v4(),
			owner_id: Uuid::new_v4(),
			organization_id: Uuid::new_v4(),
			template_id: Uuid::new_v4(),
			name: "dev".to_string(),
			autostart_schedule: None,
			last_used_at: Utc::now(),
			deleted: false,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		let object = workspace.rbac_object();
		assert_eq!(object.owner_id, workspace.owner_id.to_string());
		assert_eq!(object.org_id, workspace.organization_id.to_string());
		assert!(object.acl_user_list.is_empty());
	}
}
