// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The store contract.
//!
//! [`Store`] is the single source of truth for the persistence surface.
//! Every subsystem consumes it behind `Arc<dyn Store>`, which lets the
//! authorization decorator slot in as a drop-in replacement: the decorator
//! implements this same trait, so adding an operation here without a
//! corresponding wrapper fails the build.
//!
//! Every operation takes the request context first and returns the row (or
//! a `NotFound` error on absence). `list_authorized_*` variants accept a
//! prepared authorization filter which implementations compile against
//! their own column layout during query construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use gantry_server_rbac::{AuthContext, PreparedAuthorized};

use crate::error::Result;
use crate::types::*;

/// The closure run inside a transaction. It receives the transactional
/// store handle; the caller's context provides the actor as usual.
pub type TxFn = Box<dyn FnOnce(Arc<dyn Store>) -> BoxFuture<'static, Result<()>> + Send>;

#[async_trait]
pub trait Store: Send + Sync {
	/// Names of decorators already wrapping this store, innermost first.
	/// Used to keep wrapping idempotent.
	fn wrappers(&self) -> Vec<&'static str> {
		Vec::new()
	}

	// ==== Infrastructure ====================================================

	/// Connectivity check; returns the round-trip latency.
	async fn ping(&self, ctx: &AuthContext) -> Result<Duration>;

	/// Takes the advisory lock, waiting until it is free.
	async fn acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<()>;

	/// Takes the advisory lock if free; returns whether it was taken.
	async fn try_acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<bool>;

	/// Releases an advisory lock taken by `acquire_lock`.
	async fn release_lock(&self, ctx: &AuthContext, id: i64) -> Result<()>;

	/// Runs `f` against a store handle bound to one transaction.
	async fn in_tx(&self, ctx: &AuthContext, f: TxFn) -> Result<()>;

	// ==== Users =============================================================

	async fn insert_user(&self, ctx: &AuthContext, params: InsertUserParams) -> Result<User>;
	async fn get_user_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<User>;
	async fn get_user_by_email(&self, ctx: &AuthContext, email: &str) -> Result<User>;
	async fn list_users(&self, ctx: &AuthContext, params: ListUsersParams) -> Result<Vec<User>>;
	async fn list_authorized_users(
		&self,
		ctx: &AuthContext,
		params: ListUsersParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<User>>;
	async fn update_user_profile(
		&self,
		ctx: &AuthContext,
		params: UpdateUserProfileParams,
	) -> Result<User>;
	/// Soft delete; the row stays for audit trails.
	async fn update_user_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;
	async fn all_user_ids(&self, ctx: &AuthContext) -> Result<Vec<Uuid>>;
	async fn get_user_count(&self, ctx: &AuthContext) -> Result<i64>;

	// ==== Organizations =====================================================

	async fn insert_organization(
		&self,
		ctx: &AuthContext,
		params: InsertOrganizationParams,
	) -> Result<Organization>;
	async fn get_organization_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Organization>;
	async fn get_organization_by_name(
		&self,
		ctx: &AuthContext,
		name: &str,
	) -> Result<Organization>;
	async fn list_organizations_by_user_id(
		&self,
		ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<Organization>>;
	async fn update_organization(
		&self,
		ctx: &AuthContext,
		params: UpdateOrganizationParams,
	) -> Result<Organization>;
	async fn delete_organization(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;

	// ==== Organization members ==============================================

	async fn insert_organization_member(
		&self,
		ctx: &AuthContext,
		params: InsertOrganizationMemberParams,
	) -> Result<OrganizationMember>;
	async fn get_organization_member(
		&self,
		ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<OrganizationMember>;
	async fn list_organization_members(
		&self,
		ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<OrganizationMember>>;
	async fn delete_organization_member(
		&self,
		ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<()>;

	// ==== Groups ============================================================

	async fn insert_group(&self, ctx: &AuthContext, params: InsertGroupParams) -> Result<Group>;
	async fn get_group_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Group>;
	async fn list_groups_by_organization_id(
		&self,
		ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<Group>>;
	async fn delete_group_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;
	async fn insert_group_member(&self, ctx: &AuthContext, params: GroupMemberParams)
		-> Result<()>;
	async fn delete_group_member(&self, ctx: &AuthContext, params: GroupMemberParams)
		-> Result<()>;
	async fn get_group_member_ids(&self, ctx: &AuthContext, group_id: Uuid) -> Result<Vec<Uuid>>;

	// ==== Templates =========================================================

	async fn insert_template(
		&self,
		ctx: &AuthContext,
		params: InsertTemplateParams,
	) -> Result<Template>;
	async fn get_template_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Template>;
	async fn get_template_by_organization_and_name(
		&self,
		ctx: &AuthContext,
		params: TemplateByOrganizationAndNameParams,
	) -> Result<Template>;
	async fn list_templates(
		&self,
		ctx: &AuthContext,
		params: ListTemplatesParams,
	) -> Result<Vec<Template>>;
	async fn list_authorized_templates(
		&self,
		ctx: &AuthContext,
		params: ListTemplatesParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Template>>;
	async fn update_template_meta(
		&self,
		ctx: &AuthContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template>;
	async fn update_template_acl(
		&self,
		ctx: &AuthContext,
		params: UpdateTemplateAclParams,
	) -> Result<Template>;
	/// Soft delete; deleted templates stop appearing in default listings.
	async fn update_template_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;

	// ==== Workspaces ========================================================

	async fn insert_workspace(
		&self,
		ctx: &AuthContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace>;
	async fn get_workspace_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Workspace>;
	async fn get_workspace_by_owner_and_name(
		&self,
		ctx: &AuthContext,
		params: WorkspaceByOwnerAndNameParams,
	) -> Result<Workspace>;
	async fn list_workspaces(
		&self,
		ctx: &AuthContext,
		params: ListWorkspacesParams,
	) -> Result<Vec<Workspace>>;
	async fn list_authorized_workspaces(
		&self,
		ctx: &AuthContext,
		params: ListWorkspacesParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Workspace>>;
	async fn update_workspace(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace>;
	async fn update_workspace_autostart(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceAutostartParams,
	) -> Result<()>;
	async fn update_workspace_last_used_at(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceLastUsedAtParams,
	) -> Result<()>;
	async fn batch_update_workspace_last_used_at(
		&self,
		ctx: &AuthContext,
		params: BatchUpdateWorkspaceLastUsedAtParams,
	) -> Result<()>;
	/// Soft delete; the row stays for audit trails.
	async fn update_workspace_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;
	/// Workspaces whose autostart schedule may be due. Consumed by the
	/// autostart subsystem under its system identity.
	async fn get_workspaces_eligible_for_autostart(
		&self,
		ctx: &AuthContext,
		now: DateTime<Utc>,
	) -> Result<Vec<Workspace>>;

	// ==== Provisioner jobs ==================================================

	async fn insert_provisioner_job(
		&self,
		ctx: &AuthContext,
		params: InsertProvisionerJobParams,
	) -> Result<ProvisionerJob>;
	async fn get_provisioner_job_by_id(
		&self,
		ctx: &AuthContext,
		id: Uuid,
	) -> Result<ProvisionerJob>;
	/// Claims the oldest unstarted job for a worker. `NotFound` when the
	/// queue is empty.
	async fn acquire_provisioner_job(
		&self,
		ctx: &AuthContext,
		params: AcquireProvisionerJobParams,
	) -> Result<ProvisionerJob>;
	async fn update_provisioner_job_completed(
		&self,
		ctx: &AuthContext,
		params: UpdateProvisionerJobCompletedParams,
	) -> Result<()>;
	/// Jobs started before the cutoff that never completed. Consumed by the
	/// hang detector under its system identity.
	async fn get_hung_provisioner_jobs(
		&self,
		ctx: &AuthContext,
		updated_before: DateTime<Utc>,
	) -> Result<Vec<ProvisionerJob>>;

	// ==== API keys ==========================================================

	async fn insert_api_key(&self, ctx: &AuthContext, params: InsertApiKeyParams)
		-> Result<ApiKey>;
	async fn get_api_key_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<ApiKey>;
	async fn list_api_keys_by_user_id(
		&self,
		ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<ApiKey>>;
	async fn delete_api_key_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;

	// ==== Audit logs ========================================================

	async fn insert_audit_log(
		&self,
		ctx: &AuthContext,
		params: InsertAuditLogParams,
	) -> Result<AuditLog>;
	async fn list_audit_logs_offset(
		&self,
		ctx: &AuthContext,
		params: ListAuditLogsParams,
	) -> Result<Vec<AuditLog>>;
	/// Deletes logs older than the cutoff. Consumed by the database
	/// maintenance subsystem under its system identity.
	async fn purge_audit_logs_before(
		&self,
		ctx: &AuthContext,
		before: DateTime<Utc>,
	) -> Result<()>;

	// ==== Notification messages =============================================

	async fn enqueue_notification_message(
		&self,
		ctx: &AuthContext,
		params: EnqueueNotificationMessageParams,
	) -> Result<NotificationMessage>;
	async fn list_pending_notification_messages(
		&self,
		ctx: &AuthContext,
		limit: i64,
	) -> Result<Vec<NotificationMessage>>;
	async fn update_notification_message_sent(&self, ctx: &AuthContext, id: Uuid) -> Result<()>;
}
