// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authorizing store decorator.
//!
//! [`AuthzStore`] wraps any [`Store`] and enforces a positive policy
//! decision on every operation before the inner store runs. It implements
//! the same trait, so it drops in wherever a store is consumed; the
//! compiler enforces method coverage, because adding a `Store` operation
//! without a wrapper here fails the build.
//!
//! The only unauthorized pass-throughs are pure infrastructure: `ping`,
//! the advisory lock operations, the `in_tx` entry point itself, and
//! `wrappers`. Everything else requires an actor and a policy decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use gantry_server_db::store::{Store, TxFn};
use gantry_server_db::types::*;
use gantry_server_db::Result;
use gantry_server_rbac::{
	resource_type, Action, AuthContext, Authorizer, PreparedAuthorized, RbacObject,
};

use crate::wrappers;

/// Identifies this decorator in [`Store::wrappers`].
pub const WRAP_NAME: &str = "gantry-server-authz.store";

/// Store decorator that authorizes every operation against the actor in
/// the request context.
pub struct AuthzStore {
	db: Arc<dyn Store>,
	auth: Arc<dyn Authorizer>,
}

impl AuthzStore {
	/// Wraps `db` with authorization enforcement.
	///
	/// Idempotent: a store already wrapped by this constructor is returned
	/// unchanged, so accidental double-wrapping cannot double-charge
	/// authorization checks or inflate audit counts.
	pub fn new(db: Arc<dyn Store>, auth: Arc<dyn Authorizer>) -> Arc<dyn Store> {
		if db.wrappers().contains(&WRAP_NAME) {
			return db;
		}
		Arc::new(Self { db, auth })
	}

	/// Authorizes `action` on `object` for the actor in context. Used for
	/// operations whose target is not a fetched row (system surfaces,
	/// whole-type checks).
	fn authorize_context(
		&self,
		ctx: &AuthContext,
		action: Action,
		object: &RbacObject,
	) -> Result<()> {
		let actor = wrappers::require_actor(ctx)?;
		self
			.auth
			.authorize(ctx, actor, action, object)
			.map_err(wrappers::deny_error)
	}
}

#[async_trait]
impl Store for AuthzStore {
	fn wrappers(&self) -> Vec<&'static str> {
		let mut wrapped = self.db.wrappers();
		wrapped.push(WRAP_NAME);
		wrapped
	}

	// ==== Infrastructure (unauthorized pass-throughs) =======================

	async fn ping(&self, ctx: &AuthContext) -> Result<Duration> {
		self.db.ping(ctx).await
	}

	async fn acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<()> {
		self.db.acquire_lock(ctx, id).await
	}

	async fn try_acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<bool> {
		self.db.try_acquire_lock(ctx, id).await
	}

	async fn release_lock(&self, ctx: &AuthContext, id: i64) -> Result<()> {
		self.db.release_lock(ctx, id).await
	}

	async fn in_tx(&self, ctx: &AuthContext, f: TxFn) -> Result<()> {
		let auth = self.auth.clone();
		self
			.db
			.in_tx(
				ctx,
				Box::new(move |tx| {
					// Re-wrap the transactional handle so every operation
					// inside the transaction stays authorized under the
					// actor the caller's context already holds.
					let wrapped = AuthzStore::new(tx, auth);
					f(wrapped)
				}),
			)
			.await
	}

	// ==== Users =============================================================

	async fn insert_user(&self, ctx: &AuthContext, params: InsertUserParams) -> Result<User> {
		wrappers::insert(self.auth.as_ref(), ctx, RbacObject::user(), || {
			self.db.insert_user(ctx, params)
		})
		.await
	}

	async fn get_user_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<User> {
		wrappers::fetch(self.auth.as_ref(), ctx, || self.db.get_user_by_id(ctx, id)).await
	}

	async fn get_user_by_email(&self, ctx: &AuthContext, email: &str) -> Result<User> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_user_by_email(ctx, email)
		})
		.await
	}

	async fn list_users(&self, ctx: &AuthContext, params: ListUsersParams) -> Result<Vec<User>> {
		let prepared =
			wrappers::prepare_sql_filter(self.auth.as_ref(), ctx, Action::Read, resource_type::USER)?;
		self
			.db
			.list_authorized_users(ctx, params, Some(prepared.as_ref()))
			.await
	}

	async fn list_authorized_users(
		&self,
		ctx: &AuthContext,
		params: ListUsersParams,
		_prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<User>> {
		// The filter is always re-derived from the context; a caller-supplied
		// one could be weaker than the actor's actual permissions.
		self.list_users(ctx, params).await
	}

	async fn update_user_profile(
		&self,
		ctx: &AuthContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		let id = params.id;
		wrappers::update_with_return(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_user_by_id(ctx, id),
			|| self.db.update_user_profile(ctx, params),
		)
		.await
	}

	async fn update_user_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_user_by_id(ctx, id),
			|| self.db.update_user_deleted_by_id(ctx, id),
		)
		.await
	}

	async fn all_user_ids(&self, ctx: &AuthContext) -> Result<Vec<Uuid>> {
		// Technically only reads users, but only system callers need the
		// full ID set.
		self.authorize_context(ctx, Action::Read, &RbacObject::system())?;
		self.db.all_user_ids(ctx).await
	}

	async fn get_user_count(&self, ctx: &AuthContext) -> Result<i64> {
		self.authorize_context(ctx, Action::Read, &RbacObject::system())?;
		self.db.get_user_count(ctx).await
	}

	// ==== Organizations =====================================================

	async fn insert_organization(
		&self,
		ctx: &AuthContext,
		params: InsertOrganizationParams,
	) -> Result<Organization> {
		wrappers::insert(self.auth.as_ref(), ctx, RbacObject::organization(), || {
			self.db.insert_organization(ctx, params)
		})
		.await
	}

	async fn get_organization_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Organization> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_organization_by_id(ctx, id)
		})
		.await
	}

	async fn get_organization_by_name(
		&self,
		ctx: &AuthContext,
		name: &str,
	) -> Result<Organization> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_organization_by_name(ctx, name)
		})
		.await
	}

	async fn list_organizations_by_user_id(
		&self,
		ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<Organization>> {
		wrappers::fetch_with_post_filter(self.auth.as_ref(), ctx, || {
			self.db.list_organizations_by_user_id(ctx, user_id)
		})
		.await
	}

	async fn update_organization(
		&self,
		ctx: &AuthContext,
		params: UpdateOrganizationParams,
	) -> Result<Organization> {
		let id = params.id;
		wrappers::update_with_return(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_organization_by_id(ctx, id),
			|| self.db.update_organization(ctx, params),
		)
		.await
	}

	async fn delete_organization(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_organization_by_id(ctx, id),
			|| self.db.delete_organization(ctx, id),
		)
		.await
	}

	// ==== Organization members ==============================================

	async fn insert_organization_member(
		&self,
		ctx: &AuthContext,
		params: InsertOrganizationMemberParams,
	) -> Result<OrganizationMember> {
		let object = RbacObject::organization_member()
			.in_org(&params.organization_id.to_string())
			.with_owner(&params.user_id.to_string());
		wrappers::insert(self.auth.as_ref(), ctx, object, || {
			self.db.insert_organization_member(ctx, params)
		})
		.await
	}

	async fn get_organization_member(
		&self,
		ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<OrganizationMember> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_organization_member(ctx, params)
		})
		.await
	}

	async fn list_organization_members(
		&self,
		ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<OrganizationMember>> {
		wrappers::fetch_with_post_filter(self.auth.as_ref(), ctx, || {
			self.db.list_organization_members(ctx, organization_id)
		})
		.await
	}

	async fn delete_organization_member(
		&self,
		ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_organization_member(ctx, params),
			|| self.db.delete_organization_member(ctx, params),
		)
		.await
	}

	// ==== Groups ============================================================

	async fn insert_group(&self, ctx: &AuthContext, params: InsertGroupParams) -> Result<Group> {
		let object = RbacObject::group().in_org(&params.organization_id.to_string());
		wrappers::insert(self.auth.as_ref(), ctx, object, || {
			self.db.insert_group(ctx, params)
		})
		.await
	}

	async fn get_group_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Group> {
		wrappers::fetch(self.auth.as_ref(), ctx, || self.db.get_group_by_id(ctx, id)).await
	}

	async fn list_groups_by_organization_id(
		&self,
		ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<Group>> {
		wrappers::fetch_with_post_filter(self.auth.as_ref(), ctx, || {
			self.db.list_groups_by_organization_id(ctx, organization_id)
		})
		.await
	}

	async fn delete_group_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_group_by_id(ctx, id),
			|| self.db.delete_group_by_id(ctx, id),
		)
		.await
	}

	async fn insert_group_member(
		&self,
		ctx: &AuthContext,
		params: GroupMemberParams,
	) -> Result<()> {
		// Membership changes are an update to the group.
		wrappers::update(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_group_by_id(ctx, params.group_id),
			|| self.db.insert_group_member(ctx, params),
		)
		.await
	}

	async fn delete_group_member(
		&self,
		ctx: &AuthContext,
		params: GroupMemberParams,
	) -> Result<()> {
		wrappers::update(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_group_by_id(ctx, params.group_id),
			|| self.db.delete_group_member(ctx, params),
		)
		.await
	}

	async fn get_group_member_ids(&self, ctx: &AuthContext, group_id: Uuid) -> Result<Vec<Uuid>> {
		wrappers::fetch_and_query(
			self.auth.as_ref(),
			ctx,
			Action::Read,
			|| self.db.get_group_by_id(ctx, group_id),
			|| self.db.get_group_member_ids(ctx, group_id),
		)
		.await
	}

	// ==== Templates =========================================================

	async fn insert_template(
		&self,
		ctx: &AuthContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		let object = RbacObject::template().in_org(&params.organization_id.to_string());
		wrappers::insert(self.auth.as_ref(), ctx, object, || {
			self.db.insert_template(ctx, params)
		})
		.await
	}

	async fn get_template_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Template> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_template_by_id(ctx, id)
		})
		.await
	}

	async fn get_template_by_organization_and_name(
		&self,
		ctx: &AuthContext,
		params: TemplateByOrganizationAndNameParams,
	) -> Result<Template> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_template_by_organization_and_name(ctx, params)
		})
		.await
	}

	async fn list_templates(
		&self,
		ctx: &AuthContext,
		params: ListTemplatesParams,
	) -> Result<Vec<Template>> {
		let prepared = wrappers::prepare_sql_filter(
			self.auth.as_ref(),
			ctx,
			Action::Read,
			resource_type::TEMPLATE,
		)?;
		self
			.db
			.list_authorized_templates(ctx, params, Some(prepared.as_ref()))
			.await
	}

	async fn list_authorized_templates(
		&self,
		ctx: &AuthContext,
		params: ListTemplatesParams,
		_prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Template>> {
		self.list_templates(ctx, params).await
	}

	async fn update_template_meta(
		&self,
		ctx: &AuthContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		let id = params.id;
		wrappers::update_with_return(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_template_by_id(ctx, id),
			|| self.db.update_template_meta(ctx, params),
		)
		.await
	}

	async fn update_template_acl(
		&self,
		ctx: &AuthContext,
		params: UpdateTemplateAclParams,
	) -> Result<Template> {
		let id = params.id;
		wrappers::update_with_return(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_template_by_id(ctx, id),
			|| self.db.update_template_acl(ctx, params),
		)
		.await
	}

	async fn update_template_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_template_by_id(ctx, id),
			|| self.db.update_template_deleted_by_id(ctx, id),
		)
		.await
	}

	// ==== Workspaces ========================================================

	async fn insert_workspace(
		&self,
		ctx: &AuthContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		let object = RbacObject::workspace()
			.with_owner(&params.owner_id.to_string())
			.in_org(&params.organization_id.to_string());
		wrappers::insert(self.auth.as_ref(), ctx, object, || {
			self.db.insert_workspace(ctx, params)
		})
		.await
	}

	async fn get_workspace_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<Workspace> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_workspace_by_id(ctx, id)
		})
		.await
	}

	async fn get_workspace_by_owner_and_name(
		&self,
		ctx: &AuthContext,
		params: WorkspaceByOwnerAndNameParams,
	) -> Result<Workspace> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_workspace_by_owner_and_name(ctx, params)
		})
		.await
	}

	async fn list_workspaces(
		&self,
		ctx: &AuthContext,
		params: ListWorkspacesParams,
	) -> Result<Vec<Workspace>> {
		let prepared = wrappers::prepare_sql_filter(
			self.auth.as_ref(),
			ctx,
			Action::Read,
			resource_type::WORKSPACE,
		)?;
		self
			.db
			.list_authorized_workspaces(ctx, params, Some(prepared.as_ref()))
			.await
	}

	async fn list_authorized_workspaces(
		&self,
		ctx: &AuthContext,
		params: ListWorkspacesParams,
		_prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Workspace>> {
		self.list_workspaces(ctx, params).await
	}

	async fn update_workspace(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		let id = params.id;
		wrappers::update_with_return(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_workspace_by_id(ctx, id),
			|| self.db.update_workspace(ctx, params),
		)
		.await
	}

	async fn update_workspace_autostart(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceAutostartParams,
	) -> Result<()> {
		let id = params.id;
		wrappers::update(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_workspace_by_id(ctx, id),
			|| self.db.update_workspace_autostart(ctx, params),
		)
		.await
	}

	async fn update_workspace_last_used_at(
		&self,
		ctx: &AuthContext,
		params: UpdateWorkspaceLastUsedAtParams,
	) -> Result<()> {
		let id = params.id;
		wrappers::update(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_workspace_by_id(ctx, id),
			|| self.db.update_workspace_last_used_at(ctx, params),
		)
		.await
	}

	async fn batch_update_workspace_last_used_at(
		&self,
		ctx: &AuthContext,
		params: BatchUpdateWorkspaceLastUsedAtParams,
	) -> Result<()> {
		// Could target any workspace; checking each row defeats the point
		// of batching. Requires a site-wide workspace update grant.
		self.authorize_context(ctx, Action::Update, &RbacObject::workspace())?;
		self.db.batch_update_workspace_last_used_at(ctx, params).await
	}

	async fn update_workspace_deleted_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_workspace_by_id(ctx, id),
			|| self.db.update_workspace_deleted_by_id(ctx, id),
		)
		.await
	}

	async fn get_workspaces_eligible_for_autostart(
		&self,
		ctx: &AuthContext,
		now: DateTime<Utc>,
	) -> Result<Vec<Workspace>> {
		self.authorize_context(ctx, Action::Read, &RbacObject::system())?;
		self.db.get_workspaces_eligible_for_autostart(ctx, now).await
	}

	// ==== Provisioner jobs (system surface) =================================

	async fn insert_provisioner_job(
		&self,
		ctx: &AuthContext,
		params: InsertProvisionerJobParams,
	) -> Result<ProvisionerJob> {
		self.authorize_context(ctx, Action::Create, &RbacObject::system())?;
		self.db.insert_provisioner_job(ctx, params).await
	}

	async fn get_provisioner_job_by_id(
		&self,
		ctx: &AuthContext,
		id: Uuid,
	) -> Result<ProvisionerJob> {
		self.authorize_context(ctx, Action::Read, &RbacObject::system())?;
		self.db.get_provisioner_job_by_id(ctx, id).await
	}

	async fn acquire_provisioner_job(
		&self,
		ctx: &AuthContext,
		params: AcquireProvisionerJobParams,
	) -> Result<ProvisionerJob> {
		self.authorize_context(ctx, Action::Update, &RbacObject::system())?;
		self.db.acquire_provisioner_job(ctx, params).await
	}

	async fn update_provisioner_job_completed(
		&self,
		ctx: &AuthContext,
		params: UpdateProvisionerJobCompletedParams,
	) -> Result<()> {
		self.authorize_context(ctx, Action::Update, &RbacObject::system())?;
		self.db.update_provisioner_job_completed(ctx, params).await
	}

	async fn get_hung_provisioner_jobs(
		&self,
		ctx: &AuthContext,
		updated_before: DateTime<Utc>,
	) -> Result<Vec<ProvisionerJob>> {
		self.authorize_context(ctx, Action::Read, &RbacObject::system())?;
		self.db.get_hung_provisioner_jobs(ctx, updated_before).await
	}

	// ==== API keys ==========================================================

	async fn insert_api_key(
		&self,
		ctx: &AuthContext,
		params: InsertApiKeyParams,
	) -> Result<ApiKey> {
		let object = RbacObject::api_key().with_owner(&params.user_id.to_string());
		wrappers::insert(self.auth.as_ref(), ctx, object, || {
			self.db.insert_api_key(ctx, params)
		})
		.await
	}

	async fn get_api_key_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<ApiKey> {
		wrappers::fetch(self.auth.as_ref(), ctx, || {
			self.db.get_api_key_by_id(ctx, id)
		})
		.await
	}

	async fn list_api_keys_by_user_id(
		&self,
		ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<ApiKey>> {
		wrappers::fetch_with_post_filter(self.auth.as_ref(), ctx, || {
			self.db.list_api_keys_by_user_id(ctx, user_id)
		})
		.await
	}

	async fn delete_api_key_by_id(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		wrappers::delete(
			self.auth.as_ref(),
			ctx,
			|| self.db.get_api_key_by_id(ctx, id),
			|| self.db.delete_api_key_by_id(ctx, id),
		)
		.await
	}

	// ==== Audit logs ========================================================

	async fn insert_audit_log(
		&self,
		ctx: &AuthContext,
		params: InsertAuditLogParams,
	) -> Result<AuditLog> {
		wrappers::insert(self.auth.as_ref(), ctx, RbacObject::audit_log(), || {
			self.db.insert_audit_log(ctx, params)
		})
		.await
	}

	async fn list_audit_logs_offset(
		&self,
		ctx: &AuthContext,
		params: ListAuditLogsParams,
	) -> Result<Vec<AuditLog>> {
		wrappers::fetch_with_post_filter(self.auth.as_ref(), ctx, || {
			self.db.list_audit_logs_offset(ctx, params)
		})
		.await
	}

	async fn purge_audit_logs_before(
		&self,
		ctx: &AuthContext,
		before: DateTime<Utc>,
	) -> Result<()> {
		self.authorize_context(ctx, Action::Delete, &RbacObject::audit_log())?;
		self.db.purge_audit_logs_before(ctx, before).await
	}

	// ==== Notification messages =============================================

	async fn enqueue_notification_message(
		&self,
		ctx: &AuthContext,
		params: EnqueueNotificationMessageParams,
	) -> Result<NotificationMessage> {
		self.authorize_context(ctx, Action::Create, &RbacObject::notification_message())?;
		self.db.enqueue_notification_message(ctx, params).await
	}

	async fn list_pending_notification_messages(
		&self,
		ctx: &AuthContext,
		limit: i64,
	) -> Result<Vec<NotificationMessage>> {
		self.authorize_context(ctx, Action::Read, &RbacObject::notification_message())?;
		self.db.list_pending_notification_messages(ctx, limit).await
	}

	async fn update_notification_message_sent(&self, ctx: &AuthContext, id: Uuid) -> Result<()> {
		self.authorize_context(ctx, Action::Update, &RbacObject::notification_message())?;
		self.db.update_notification_message_sent(ctx, id).await
	}
}
