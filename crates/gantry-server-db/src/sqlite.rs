// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite implementation of the [`Store`] trait.
//!
//! All IDs are UUIDs stored as TEXT, timestamps are RFC3339 TEXT, and ACL
//! columns are JSON objects. The `list_authorized_*` operations compile the
//! prepared authorization filter against this file's column configurations
//! and splice the predicate into the WHERE clause, so unauthorized rows are
//! never fetched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use gantry_server_rbac::{AuthContext, PreparedAuthorized, RbacError, SqlFilterConfig};

use crate::error::{DbError, Result};
use crate::store::{Store, TxFn};
use crate::types::*;

/// Column configuration for compiling authorization filters against the
/// workspaces table. Workspaces carry no ACL columns.
fn workspace_filter_config() -> SqlFilterConfig {
	SqlFilterConfig::new()
		.with_owner_column("workspaces.owner_id")
		.with_org_column("workspaces.organization_id")
}

/// Templates are organization resources with ACL columns and no owner in
/// their authorization projection.
fn template_filter_config() -> SqlFilterConfig {
	SqlFilterConfig::new()
		.with_org_column("templates.organization_id")
		.with_acl_columns("templates.user_acl", "templates.group_acl")
}

/// A user row is owned by the user it describes.
fn user_filter_config() -> SqlFilterConfig {
	SqlFilterConfig::new().with_owner_column("users.id")
}

/// SQLite-backed store.
///
/// `in_tx` serializes transaction bodies with an async mutex: SQLite has a
/// single writer anyway, and the callers of `in_tx` need mutual exclusion
/// rather than rollback.
#[derive(Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
	tx_lock: Arc<Mutex<()>>,
	advisory_locks: Arc<Mutex<HashSet<i64>>>,
}

impl SqliteStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			pool,
			tx_lock: Arc::new(Mutex::new(())),
			advisory_locks: Arc::new(Mutex::new(HashSet::new())),
		}
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	/// Create the schema. Idempotent.
	pub async fn migrate(&self) -> Result<()> {
		for statement in SCHEMA {
			sqlx::query(statement).execute(&self.pool).await?;
		}
		tracing::debug!("database schema ready");
		Ok(())
	}

	// ==== Row fetch helpers =================================================

	async fn user_by_id(&self, id: Uuid) -> Result<User> {
		let row = sqlx::query(
			"SELECT id, username, email, deleted, created_at, updated_at FROM users WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
		row_to_user(&row)
	}

	async fn organization_by_id(&self, id: Uuid) -> Result<Organization> {
		let row = sqlx::query(
			"SELECT id, name, display_name, created_at, updated_at FROM organizations WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("organization {id}")))?;
		row_to_organization(&row)
	}

	async fn group_by_id(&self, id: Uuid) -> Result<Group> {
		let row = sqlx::query(
			"SELECT id, organization_id, name, created_at FROM \"groups\" WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("group {id}")))?;
		row_to_group(&row)
	}

	async fn template_by_id(&self, id: Uuid) -> Result<Template> {
		let row = sqlx::query(&format!(
			"SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("template {id}")))?;
		row_to_template(&row)
	}

	async fn workspace_by_id(&self, id: Uuid) -> Result<Workspace> {
		let row = sqlx::query(&format!(
			"SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("workspace {id}")))?;
		row_to_workspace(&row)
	}

	async fn provisioner_job_by_id(&self, id: Uuid) -> Result<ProvisionerJob> {
		let row = sqlx::query(&format!(
			"SELECT {JOB_COLUMNS} FROM provisioner_jobs WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("provisioner job {id}")))?;
		row_to_provisioner_job(&row)
	}
}

const TEMPLATE_COLUMNS: &str = "id, organization_id, name, display_name, created_by, deleted, \
	user_acl, group_acl, created_at, updated_at";
const WORKSPACE_COLUMNS: &str = "id, owner_id, organization_id, template_id, name, \
	autostart_schedule, last_used_at, deleted, created_at, updated_at";
const JOB_COLUMNS: &str = "id, organization_id, job_type, input, worker_id, started_at, \
	completed_at, error, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
	// ==== Infrastructure ====================================================

	async fn ping(&self, ctx: &AuthContext) -> Result<Duration> {
		if ctx.is_cancelled() {
			return Err(DbError::Cancelled);
		}
		let start = Instant::now();
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(start.elapsed())
	}

	async fn acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<()> {
		loop {
			if ctx.is_cancelled() {
				return Err(DbError::Cancelled);
			}
			if self.advisory_locks.lock().await.insert(id) {
				return Ok(());
			}
			tokio::time::sleep(Duration::from_millis(25)).await;
		}
	}

	async fn try_acquire_lock(&self, ctx: &AuthContext, id: i64) -> Result<bool> {
		if ctx.is_cancelled() {
			return Err(DbError::Cancelled);
		}
		Ok(self.advisory_locks.lock().await.insert(id))
	}

	async fn release_lock(&self, _ctx: &AuthContext, id: i64) -> Result<()> {
		self.advisory_locks.lock().await.remove(&id);
		Ok(())
	}

	async fn in_tx(&self, ctx: &AuthContext, f: TxFn) -> Result<()> {
		if ctx.is_cancelled() {
			return Err(DbError::Cancelled);
		}
		let _guard = self.tx_lock.lock().await;
		f(Arc::new(self.clone())).await
	}

	// ==== Users =============================================================

	#[tracing::instrument(skip(self, _ctx, params), fields(user_id = %params.id))]
	async fn insert_user(&self, _ctx: &AuthContext, params: InsertUserParams) -> Result<User> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO users (id, username, email, deleted, created_at, updated_at) \
			 VALUES (?, ?, ?, 0, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(&params.username)
		.bind(&params.email)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(User {
			id: params.id,
			username: params.username,
			email: params.email,
			deleted: false,
			created_at: now,
			updated_at: now,
		})
	}

	async fn get_user_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<User> {
		self.user_by_id(id).await
	}

	async fn get_user_by_email(&self, _ctx: &AuthContext, email: &str) -> Result<User> {
		let row = sqlx::query(
			"SELECT id, username, email, deleted, created_at, updated_at FROM users \
			 WHERE email = ? AND deleted = 0",
		)
		.bind(email)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("user with email {email:?}")))?;
		row_to_user(&row)
	}

	async fn list_users(&self, ctx: &AuthContext, params: ListUsersParams) -> Result<Vec<User>> {
		self.list_authorized_users(ctx, params, None).await
	}

	async fn list_authorized_users(
		&self,
		_ctx: &AuthContext,
		params: ListUsersParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<User>> {
		let mut sql = String::from(
			"SELECT id, username, email, deleted, created_at, updated_at FROM users \
			 WHERE deleted = ?",
		);
		if let Some(prepared) = prepared {
			let predicate = compile_filter(prepared, &user_filter_config())?;
			sql.push_str(&format!(" AND {predicate}"));
		}
		sql.push_str(" ORDER BY created_at, id LIMIT ? OFFSET ?");

		let rows = sqlx::query(&sql)
			.bind(params.deleted as i32)
			.bind(if params.limit <= 0 { -1 } else { params.limit })
			.bind(params.offset.max(0))
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_user).collect()
	}

	async fn update_user_profile(
		&self,
		_ctx: &AuthContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		let done = sqlx::query(
			"UPDATE users SET username = ?, email = ?, updated_at = ? WHERE id = ? AND deleted = 0",
		)
		.bind(&params.username)
		.bind(&params.email)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("user {}", params.id)));
		}
		self.user_by_id(params.id).await
	}

	async fn update_user_deleted_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("UPDATE users SET deleted = 1, updated_at = ? WHERE id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("user {id}")));
		}
		Ok(())
	}

	async fn all_user_ids(&self, _ctx: &AuthContext) -> Result<Vec<Uuid>> {
		let rows = sqlx::query("SELECT id FROM users WHERE deleted = 0 ORDER BY created_at")
			.fetch_all(&self.pool)
			.await?;
		rows
			.iter()
			.map(|r| parse_uuid(&r.get::<String, _>("id")))
			.collect()
	}

	async fn get_user_count(&self, _ctx: &AuthContext) -> Result<i64> {
		let row = sqlx::query("SELECT COUNT(*) AS n FROM users WHERE deleted = 0")
			.fetch_one(&self.pool)
			.await?;
		Ok(row.get::<i64, _>("n"))
	}

	// ==== Organizations =====================================================

	#[tracing::instrument(skip(self, _ctx, params), fields(org_id = %params.id))]
	async fn insert_organization(
		&self,
		_ctx: &AuthContext,
		params: InsertOrganizationParams,
	) -> Result<Organization> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO organizations (id, name, display_name, created_at, updated_at) \
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(&params.name)
		.bind(&params.display_name)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(Organization {
			id: params.id,
			name: params.name,
			display_name: params.display_name,
			created_at: now,
			updated_at: now,
		})
	}

	async fn get_organization_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<Organization> {
		self.organization_by_id(id).await
	}

	async fn get_organization_by_name(
		&self,
		_ctx: &AuthContext,
		name: &str,
	) -> Result<Organization> {
		let row = sqlx::query(
			"SELECT id, name, display_name, created_at, updated_at FROM organizations \
			 WHERE name = ?",
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("organization {name:?}")))?;
		row_to_organization(&row)
	}

	async fn list_organizations_by_user_id(
		&self,
		_ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<Organization>> {
		let rows = sqlx::query(
			"SELECT o.id, o.name, o.display_name, o.created_at, o.updated_at \
			 FROM organizations o \
			 JOIN organization_members m ON m.organization_id = o.id \
			 WHERE m.user_id = ? ORDER BY o.created_at",
		)
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_organization).collect()
	}

	async fn update_organization(
		&self,
		_ctx: &AuthContext,
		params: UpdateOrganizationParams,
	) -> Result<Organization> {
		let done = sqlx::query(
			"UPDATE organizations SET name = ?, display_name = ?, updated_at = ? WHERE id = ?",
		)
		.bind(&params.name)
		.bind(&params.display_name)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("organization {}", params.id)));
		}
		self.organization_by_id(params.id).await
	}

	async fn delete_organization(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("DELETE FROM organizations WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("organization {id}")));
		}
		Ok(())
	}

	// ==== Organization members ==============================================

	async fn insert_organization_member(
		&self,
		_ctx: &AuthContext,
		params: InsertOrganizationMemberParams,
	) -> Result<OrganizationMember> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO organization_members (organization_id, user_id, roles, created_at) \
			 VALUES (?, ?, ?, ?)",
		)
		.bind(params.organization_id.to_string())
		.bind(params.user_id.to_string())
		.bind(serde_json::to_string(&params.roles)?)
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(OrganizationMember {
			organization_id: params.organization_id,
			user_id: params.user_id,
			roles: params.roles,
			created_at: now,
		})
	}

	async fn get_organization_member(
		&self,
		_ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<OrganizationMember> {
		let row = sqlx::query(
			"SELECT organization_id, user_id, roles, created_at FROM organization_members \
			 WHERE organization_id = ? AND user_id = ?",
		)
		.bind(params.organization_id.to_string())
		.bind(params.user_id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| {
			DbError::NotFound(format!(
				"member {} of organization {}",
				params.user_id, params.organization_id
			))
		})?;
		row_to_organization_member(&row)
	}

	async fn list_organization_members(
		&self,
		_ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<OrganizationMember>> {
		let rows = sqlx::query(
			"SELECT organization_id, user_id, roles, created_at FROM organization_members \
			 WHERE organization_id = ? ORDER BY created_at",
		)
		.bind(organization_id.to_string())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_organization_member).collect()
	}

	async fn delete_organization_member(
		&self,
		_ctx: &AuthContext,
		params: OrganizationMemberParams,
	) -> Result<()> {
		let done = sqlx::query(
			"DELETE FROM organization_members WHERE organization_id = ? AND user_id = ?",
		)
		.bind(params.organization_id.to_string())
		.bind(params.user_id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"member {} of organization {}",
				params.user_id, params.organization_id
			)));
		}
		Ok(())
	}

	// ==== Groups ============================================================

	async fn insert_group(&self, _ctx: &AuthContext, params: InsertGroupParams) -> Result<Group> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO \"groups\" (id, organization_id, name, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.organization_id.to_string())
		.bind(&params.name)
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(Group {
			id: params.id,
			organization_id: params.organization_id,
			name: params.name,
			created_at: now,
		})
	}

	async fn get_group_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<Group> {
		self.group_by_id(id).await
	}

	async fn list_groups_by_organization_id(
		&self,
		_ctx: &AuthContext,
		organization_id: Uuid,
	) -> Result<Vec<Group>> {
		let rows = sqlx::query(
			"SELECT id, organization_id, name, created_at FROM \"groups\" \
			 WHERE organization_id = ? ORDER BY name",
		)
		.bind(organization_id.to_string())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_group).collect()
	}

	async fn delete_group_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("DELETE FROM \"groups\" WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("group {id}")));
		}
		Ok(())
	}

	async fn insert_group_member(
		&self,
		_ctx: &AuthContext,
		params: GroupMemberParams,
	) -> Result<()> {
		sqlx::query("INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)")
			.bind(params.group_id.to_string())
			.bind(params.user_id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	async fn delete_group_member(
		&self,
		_ctx: &AuthContext,
		params: GroupMemberParams,
	) -> Result<()> {
		let done = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
			.bind(params.group_id.to_string())
			.bind(params.user_id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!(
				"member {} of group {}",
				params.user_id, params.group_id
			)));
		}
		Ok(())
	}

	async fn get_group_member_ids(&self, _ctx: &AuthContext, group_id: Uuid) -> Result<Vec<Uuid>> {
		let rows = sqlx::query("SELECT user_id FROM group_members WHERE group_id = ?")
			.bind(group_id.to_string())
			.fetch_all(&self.pool)
			.await?;
		rows
			.iter()
			.map(|r| parse_uuid(&r.get::<String, _>("user_id")))
			.collect()
	}

	// ==== Templates =========================================================

	#[tracing::instrument(skip(self, _ctx, params), fields(template_id = %params.id))]
	async fn insert_template(
		&self,
		_ctx: &AuthContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO templates (id, organization_id, name, display_name, created_by, \
			 deleted, user_acl, group_acl, created_at, updated_at) \
			 VALUES (?, ?, ?, ?, ?, 0, '{}', '{}', ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.organization_id.to_string())
		.bind(&params.name)
		.bind(&params.display_name)
		.bind(params.created_by.to_string())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(Template {
			id: params.id,
			organization_id: params.organization_id,
			name: params.name,
			display_name: params.display_name,
			created_by: params.created_by,
			deleted: false,
			user_acl: AclList::new(),
			group_acl: AclList::new(),
			created_at: now,
			updated_at: now,
		})
	}

	async fn get_template_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<Template> {
		self.template_by_id(id).await
	}

	async fn get_template_by_organization_and_name(
		&self,
		_ctx: &AuthContext,
		params: TemplateByOrganizationAndNameParams,
	) -> Result<Template> {
		let row = sqlx::query(&format!(
			"SELECT {TEMPLATE_COLUMNS} FROM templates \
			 WHERE organization_id = ? AND name = ? AND deleted = 0"
		))
		.bind(params.organization_id.to_string())
		.bind(&params.name)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("template {:?}", params.name)))?;
		row_to_template(&row)
	}

	async fn list_templates(
		&self,
		ctx: &AuthContext,
		params: ListTemplatesParams,
	) -> Result<Vec<Template>> {
		self.list_authorized_templates(ctx, params, None).await
	}

	async fn list_authorized_templates(
		&self,
		_ctx: &AuthContext,
		params: ListTemplatesParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Template>> {
		let mut sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE deleted = ?");
		if params.organization_id.is_some() {
			sql.push_str(" AND organization_id = ?");
		}
		if let Some(prepared) = prepared {
			let predicate = compile_filter(prepared, &template_filter_config())?;
			sql.push_str(&format!(" AND {predicate}"));
		}
		sql.push_str(" ORDER BY name");

		let mut query = sqlx::query(&sql).bind(params.deleted as i32);
		if let Some(org_id) = params.organization_id {
			query = query.bind(org_id.to_string());
		}
		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(row_to_template).collect()
	}

	async fn update_template_meta(
		&self,
		_ctx: &AuthContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		let done = sqlx::query(
			"UPDATE templates SET name = ?, display_name = ?, updated_at = ? \
			 WHERE id = ? AND deleted = 0",
		)
		.bind(&params.name)
		.bind(&params.display_name)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("template {}", params.id)));
		}
		self.template_by_id(params.id).await
	}

	async fn update_template_acl(
		&self,
		_ctx: &AuthContext,
		params: UpdateTemplateAclParams,
	) -> Result<Template> {
		let done = sqlx::query(
			"UPDATE templates SET user_acl = ?, group_acl = ?, updated_at = ? \
			 WHERE id = ? AND deleted = 0",
		)
		.bind(serde_json::to_string(&params.user_acl)?)
		.bind(serde_json::to_string(&params.group_acl)?)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("template {}", params.id)));
		}
		self.template_by_id(params.id).await
	}

	async fn update_template_deleted_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("UPDATE templates SET deleted = 1, updated_at = ? WHERE id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("template {id}")));
		}
		Ok(())
	}

	// ==== Workspaces ========================================================

	#[tracing::instrument(skip(self, _ctx, params), fields(workspace_id = %params.id))]
	async fn insert_workspace(
		&self,
		_ctx: &AuthContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO workspaces (id, owner_id, organization_id, template_id, name, \
			 autostart_schedule, last_used_at, deleted, created_at, updated_at) \
			 VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.owner_id.to_string())
		.bind(params.organization_id.to_string())
		.bind(params.template_id.to_string())
		.bind(&params.name)
		.bind(&params.autostart_schedule)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(Workspace {
			id: params.id,
			owner_id: params.owner_id,
			organization_id: params.organization_id,
			template_id: params.template_id,
			name: params.name,
			autostart_schedule: params.autostart_schedule,
			last_used_at: now,
			deleted: false,
			created_at: now,
			updated_at: now,
		})
	}

	async fn get_workspace_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<Workspace> {
		self.workspace_by_id(id).await
	}

	async fn get_workspace_by_owner_and_name(
		&self,
		_ctx: &AuthContext,
		params: WorkspaceByOwnerAndNameParams,
	) -> Result<Workspace> {
		let row = sqlx::query(&format!(
			"SELECT {WORKSPACE_COLUMNS} FROM workspaces \
			 WHERE owner_id = ? AND name = ? AND deleted = 0"
		))
		.bind(params.owner_id.to_string())
		.bind(&params.name)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("workspace {:?}", params.name)))?;
		row_to_workspace(&row)
	}

	async fn list_workspaces(
		&self,
		ctx: &AuthContext,
		params: ListWorkspacesParams,
	) -> Result<Vec<Workspace>> {
		self.list_authorized_workspaces(ctx, params, None).await
	}

	async fn list_authorized_workspaces(
		&self,
		_ctx: &AuthContext,
		params: ListWorkspacesParams,
		prepared: Option<&dyn PreparedAuthorized>,
	) -> Result<Vec<Workspace>> {
		let mut sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE deleted = ?");
		if params.owner_id.is_some() {
			sql.push_str(" AND owner_id = ?");
		}
		if params.organization_id.is_some() {
			sql.push_str(" AND organization_id = ?");
		}
		if params.template_id.is_some() {
			sql.push_str(" AND template_id = ?");
		}
		if let Some(prepared) = prepared {
			let predicate = compile_filter(prepared, &workspace_filter_config())?;
			sql.push_str(&format!(" AND {predicate}"));
		}
		sql.push_str(" ORDER BY created_at, id");

		let mut query = sqlx::query(&sql).bind(params.deleted as i32);
		if let Some(owner_id) = params.owner_id {
			query = query.bind(owner_id.to_string());
		}
		if let Some(org_id) = params.organization_id {
			query = query.bind(org_id.to_string());
		}
		if let Some(template_id) = params.template_id {
			query = query.bind(template_id.to_string());
		}
		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(row_to_workspace).collect()
	}

	async fn update_workspace(
		&self,
		_ctx: &AuthContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		let done = sqlx::query(
			"UPDATE workspaces SET name = ?, updated_at = ? WHERE id = ? AND deleted = 0",
		)
		.bind(&params.name)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {}", params.id)));
		}
		self.workspace_by_id(params.id).await
	}

	async fn update_workspace_autostart(
		&self,
		_ctx: &AuthContext,
		params: UpdateWorkspaceAutostartParams,
	) -> Result<()> {
		let done = sqlx::query(
			"UPDATE workspaces SET autostart_schedule = ?, updated_at = ? \
			 WHERE id = ? AND deleted = 0",
		)
		.bind(&params.autostart_schedule)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {}", params.id)));
		}
		Ok(())
	}

	async fn update_workspace_last_used_at(
		&self,
		_ctx: &AuthContext,
		params: UpdateWorkspaceLastUsedAtParams,
	) -> Result<()> {
		let done = sqlx::query("UPDATE workspaces SET last_used_at = ? WHERE id = ?")
			.bind(params.last_used_at.to_rfc3339())
			.bind(params.id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {}", params.id)));
		}
		Ok(())
	}

	async fn batch_update_workspace_last_used_at(
		&self,
		_ctx: &AuthContext,
		params: BatchUpdateWorkspaceLastUsedAtParams,
	) -> Result<()> {
		for id in &params.ids {
			sqlx::query("UPDATE workspaces SET last_used_at = ? WHERE id = ?")
				.bind(params.last_used_at.to_rfc3339())
				.bind(id.to_string())
				.execute(&self.pool)
				.await?;
		}
		Ok(())
	}

	async fn update_workspace_deleted_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("UPDATE workspaces SET deleted = 1, updated_at = ? WHERE id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {id}")));
		}
		Ok(())
	}

	async fn get_workspaces_eligible_for_autostart(
		&self,
		_ctx: &AuthContext,
		now: DateTime<Utc>,
	) -> Result<Vec<Workspace>> {
		// Coarse eligibility only; precise schedule matching happens in the
		// autostart scheduler.
		let rows = sqlx::query(&format!(
			"SELECT {WORKSPACE_COLUMNS} FROM workspaces \
			 WHERE deleted = 0 AND autostart_schedule IS NOT NULL AND last_used_at <= ? \
			 ORDER BY created_at"
		))
		.bind(now.to_rfc3339())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_workspace).collect()
	}

	// ==== Provisioner jobs ==================================================

	async fn insert_provisioner_job(
		&self,
		_ctx: &AuthContext,
		params: InsertProvisionerJobParams,
	) -> Result<ProvisionerJob> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO provisioner_jobs (id, organization_id, job_type, input, created_at, \
			 updated_at) VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.organization_id.to_string())
		.bind(&params.job_type)
		.bind(serde_json::to_string(&params.input)?)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(ProvisionerJob {
			id: params.id,
			organization_id: params.organization_id,
			job_type: params.job_type,
			input: params.input,
			worker_id: None,
			started_at: None,
			completed_at: None,
			error: None,
			created_at: now,
			updated_at: now,
		})
	}

	async fn get_provisioner_job_by_id(
		&self,
		_ctx: &AuthContext,
		id: Uuid,
	) -> Result<ProvisionerJob> {
		self.provisioner_job_by_id(id).await
	}

	async fn acquire_provisioner_job(
		&self,
		_ctx: &AuthContext,
		params: AcquireProvisionerJobParams,
	) -> Result<ProvisionerJob> {
		let row = sqlx::query(
			"SELECT id FROM provisioner_jobs WHERE started_at IS NULL ORDER BY created_at LIMIT 1",
		)
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound("no pending provisioner jobs".to_string()))?;
		let id = parse_uuid(&row.get::<String, _>("id"))?;

		// A concurrent worker may have claimed it between the two statements.
		let done = sqlx::query(
			"UPDATE provisioner_jobs SET worker_id = ?, started_at = ?, updated_at = ? \
			 WHERE id = ? AND started_at IS NULL",
		)
		.bind(params.worker_id.to_string())
		.bind(params.started_at.to_rfc3339())
		.bind(Utc::now().to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound("no pending provisioner jobs".to_string()));
		}
		self.provisioner_job_by_id(id).await
	}

	async fn update_provisioner_job_completed(
		&self,
		_ctx: &AuthContext,
		params: UpdateProvisionerJobCompletedParams,
	) -> Result<()> {
		let done = sqlx::query(
			"UPDATE provisioner_jobs SET completed_at = ?, error = ?, updated_at = ? WHERE id = ?",
		)
		.bind(params.completed_at.to_rfc3339())
		.bind(&params.error)
		.bind(Utc::now().to_rfc3339())
		.bind(params.id.to_string())
		.execute(&self.pool)
		.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("provisioner job {}", params.id)));
		}
		Ok(())
	}

	async fn get_hung_provisioner_jobs(
		&self,
		_ctx: &AuthContext,
		updated_before: DateTime<Utc>,
	) -> Result<Vec<ProvisionerJob>> {
		let rows = sqlx::query(&format!(
			"SELECT {JOB_COLUMNS} FROM provisioner_jobs \
			 WHERE started_at IS NOT NULL AND completed_at IS NULL AND updated_at < ? \
			 ORDER BY created_at"
		))
		.bind(updated_before.to_rfc3339())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_provisioner_job).collect()
	}

	// ==== API keys ==========================================================

	async fn insert_api_key(
		&self,
		_ctx: &AuthContext,
		params: InsertApiKeyParams,
	) -> Result<ApiKey> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO api_keys (id, user_id, token_hash, scope, expires_at, last_used_at, \
			 created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.user_id.to_string())
		.bind(&params.token_hash)
		.bind(&params.scope)
		.bind(params.expires_at.to_rfc3339())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(ApiKey {
			id: params.id,
			user_id: params.user_id,
			token_hash: params.token_hash,
			scope: params.scope,
			expires_at: params.expires_at,
			last_used_at: now,
			created_at: now,
		})
	}

	async fn get_api_key_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<ApiKey> {
		let row = sqlx::query(
			"SELECT id, user_id, token_hash, scope, expires_at, last_used_at, created_at \
			 FROM api_keys WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("api key {id}")))?;
		row_to_api_key(&row)
	}

	async fn list_api_keys_by_user_id(
		&self,
		_ctx: &AuthContext,
		user_id: Uuid,
	) -> Result<Vec<ApiKey>> {
		let rows = sqlx::query(
			"SELECT id, user_id, token_hash, scope, expires_at, last_used_at, created_at \
			 FROM api_keys WHERE user_id = ? ORDER BY created_at",
		)
		.bind(user_id.to_string())
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_api_key).collect()
	}

	async fn delete_api_key_by_id(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("DELETE FROM api_keys WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("api key {id}")));
		}
		Ok(())
	}

	// ==== Audit logs ========================================================

	async fn insert_audit_log(
		&self,
		_ctx: &AuthContext,
		params: InsertAuditLogParams,
	) -> Result<AuditLog> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO audit_logs (id, time, actor_id, action, resource_type, resource_id) \
			 VALUES (?, ?, ?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(now.to_rfc3339())
		.bind(params.actor_id.to_string())
		.bind(&params.action)
		.bind(&params.resource_type)
		.bind(&params.resource_id)
		.execute(&self.pool)
		.await?;
		Ok(AuditLog {
			id: params.id,
			time: now,
			actor_id: params.actor_id,
			action: params.action,
			resource_type: params.resource_type,
			resource_id: params.resource_id,
		})
	}

	async fn list_audit_logs_offset(
		&self,
		_ctx: &AuthContext,
		params: ListAuditLogsParams,
	) -> Result<Vec<AuditLog>> {
		let rows = sqlx::query(
			"SELECT id, time, actor_id, action, resource_type, resource_id FROM audit_logs \
			 ORDER BY time DESC LIMIT ? OFFSET ?",
		)
		.bind(if params.limit <= 0 { -1 } else { params.limit })
		.bind(params.offset.max(0))
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_audit_log).collect()
	}

	async fn purge_audit_logs_before(
		&self,
		_ctx: &AuthContext,
		before: DateTime<Utc>,
	) -> Result<()> {
		sqlx::query("DELETE FROM audit_logs WHERE time < ?")
			.bind(before.to_rfc3339())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	// ==== Notification messages =============================================

	async fn enqueue_notification_message(
		&self,
		_ctx: &AuthContext,
		params: EnqueueNotificationMessageParams,
	) -> Result<NotificationMessage> {
		let now = Utc::now();
		sqlx::query(
			"INSERT INTO notification_messages (id, user_id, payload, created_at) \
			 VALUES (?, ?, ?, ?)",
		)
		.bind(params.id.to_string())
		.bind(params.user_id.to_string())
		.bind(serde_json::to_string(&params.payload)?)
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(NotificationMessage {
			id: params.id,
			user_id: params.user_id,
			payload: params.payload,
			sent_at: None,
			created_at: now,
		})
	}

	async fn list_pending_notification_messages(
		&self,
		_ctx: &AuthContext,
		limit: i64,
	) -> Result<Vec<NotificationMessage>> {
		let rows = sqlx::query(
			"SELECT id, user_id, payload, sent_at, created_at FROM notification_messages \
			 WHERE sent_at IS NULL ORDER BY created_at LIMIT ?",
		)
		.bind(if limit <= 0 { -1 } else { limit })
		.fetch_all(&self.pool)
		.await?;
		rows.iter().map(row_to_notification_message).collect()
	}

	async fn update_notification_message_sent(&self, _ctx: &AuthContext, id: Uuid) -> Result<()> {
		let done = sqlx::query("UPDATE notification_messages SET sent_at = ? WHERE id = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		if done.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("notification message {id}")));
		}
		Ok(())
	}
}

// ==== Row mapping ===========================================================

fn parse_uuid(value: &str) -> Result<Uuid> {
	Uuid::parse_str(value).map_err(|e| DbError::Internal(format!("invalid uuid {value:?}: {e}")))
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(value)
		.map(|t| t.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid timestamp {value:?}: {e}")))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
	value.map(|v| parse_ts(&v)).transpose()
}

fn compile_filter(
	prepared: &dyn PreparedAuthorized,
	config: &SqlFilterConfig,
) -> Result<String> {
	match prepared.compile_to_sql(config) {
		Ok(predicate) => Ok(format!("({predicate})")),
		Err(RbacError::Cancelled) => Err(DbError::Cancelled),
		Err(e) => Err(DbError::Internal(format!(
			"compile authorization filter: {e}"
		))),
	}
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
	Ok(User {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		username: row.get("username"),
		email: row.get("email"),
		deleted: row.get::<i64, _>("deleted") != 0,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
		updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
	})
}

fn row_to_organization(row: &sqlx::sqlite::SqliteRow) -> Result<Organization> {
	Ok(Organization {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		name: row.get("name"),
		display_name: row.get("display_name"),
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
		updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
	})
}

fn row_to_organization_member(row: &sqlx::sqlite::SqliteRow) -> Result<OrganizationMember> {
	Ok(OrganizationMember {
		organization_id: parse_uuid(&row.get::<String, _>("organization_id"))?,
		user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
		roles: serde_json::from_str(&row.get::<String, _>("roles"))?,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
	})
}

fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group> {
	Ok(Group {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		organization_id: parse_uuid(&row.get::<String, _>("organization_id"))?,
		name: row.get("name"),
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
	})
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<Template> {
	Ok(Template {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		organization_id: parse_uuid(&row.get::<String, _>("organization_id"))?,
		name: row.get("name"),
		display_name: row.get("display_name"),
		created_by: parse_uuid(&row.get::<String, _>("created_by"))?,
		deleted: row.get::<i64, _>("deleted") != 0,
		user_acl: serde_json::from_str(&row.get::<String, _>("user_acl"))?,
		group_acl: serde_json::from_str(&row.get::<String, _>("group_acl"))?,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
		updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
	})
}

fn row_to_workspace(row: &sqlx::sqlite::SqliteRow) -> Result<Workspace> {
	Ok(Workspace {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
		organization_id: parse_uuid(&row.get::<String, _>("organization_id"))?,
		template_id: parse_uuid(&row.get::<String, _>("template_id"))?,
		name: row.get("name"),
		autostart_schedule: row.get("autostart_schedule"),
		last_used_at: parse_ts(&row.get::<String, _>("last_used_at"))?,
		deleted: row.get::<i64, _>("deleted") != 0,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
		updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
	})
}

fn row_to_provisioner_job(row: &sqlx::sqlite::SqliteRow) -> Result<ProvisionerJob> {
	let worker_id: Option<String> = row.get("worker_id");
	Ok(ProvisionerJob {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		organization_id: parse_uuid(&row.get::<String, _>("organization_id"))?,
		job_type: row.get("job_type"),
		input: serde_json::from_str(&row.get::<String, _>("input"))?,
		worker_id: worker_id.map(|w| parse_uuid(&w)).transpose()?,
		started_at: parse_opt_ts(row.get("started_at"))?,
		completed_at: parse_opt_ts(row.get("completed_at"))?,
		error: row.get("error"),
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
		updated_at: parse_ts(&row.get::<String, _>("updated_at"))?,
	})
}

fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKey> {
	Ok(ApiKey {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
		token_hash: row.get("token_hash"),
		scope: row.get("scope"),
		expires_at: parse_ts(&row.get::<String, _>("expires_at"))?,
		last_used_at: parse_ts(&row.get::<String, _>("last_used_at"))?,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
	})
}

fn row_to_audit_log(row: &sqlx::sqlite::SqliteRow) -> Result<AuditLog> {
	Ok(AuditLog {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		time: parse_ts(&row.get::<String, _>("time"))?,
		actor_id: parse_uuid(&row.get::<String, _>("actor_id"))?,
		action: row.get("action"),
		resource_type: row.get("resource_type"),
		resource_id: row.get("resource_id"),
	})
}

fn row_to_notification_message(row: &sqlx::sqlite::SqliteRow) -> Result<NotificationMessage> {
	Ok(NotificationMessage {
		id: parse_uuid(&row.get::<String, _>("id"))?,
		user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
		payload: serde_json::from_str(&row.get::<String, _>("payload"))?,
		sent_at: parse_opt_ts(row.get("sent_at"))?,
		created_at: parse_ts(&row.get::<String, _>("created_at"))?,
	})
}

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id TEXT PRIMARY KEY,
		username TEXT NOT NULL UNIQUE,
		email TEXT NOT NULL UNIQUE,
		deleted INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS organizations (
		id TEXT PRIMARY KEY,
		name TEXT NOT NULL UNIQUE,
		display_name TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS organization_members (
		organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		roles TEXT NOT NULL DEFAULT '[]',
		created_at TEXT NOT NULL,
		PRIMARY KEY (organization_id, user_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS "groups" (
		id TEXT PRIMARY KEY,
		organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
		name TEXT NOT NULL,
		created_at TEXT NOT NULL,
		UNIQUE (organization_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS group_members (
		group_id TEXT NOT NULL REFERENCES "groups"(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		PRIMARY KEY (group_id, user_id)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS templates (
		id TEXT PRIMARY KEY,
		organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
		name TEXT NOT NULL,
		display_name TEXT NOT NULL,
		created_by TEXT NOT NULL,
		deleted INTEGER NOT NULL DEFAULT 0,
		user_acl TEXT NOT NULL DEFAULT '{}',
		group_acl TEXT NOT NULL DEFAULT '{}',
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE (organization_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS workspaces (
		id TEXT PRIMARY KEY,
		owner_id TEXT NOT NULL REFERENCES users(id),
		organization_id TEXT NOT NULL REFERENCES organizations(id),
		template_id TEXT NOT NULL REFERENCES templates(id),
		name TEXT NOT NULL,
		autostart_schedule TEXT,
		last_used_at TEXT NOT NULL,
		deleted INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL,
		UNIQUE (owner_id, name)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS provisioner_jobs (
		id TEXT PRIMARY KEY,
		organization_id TEXT NOT NULL,
		job_type TEXT NOT NULL,
		input TEXT NOT NULL DEFAULT 'null',
		worker_id TEXT,
		started_at TEXT,
		completed_at TEXT,
		error TEXT,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS api_keys (
		id TEXT PRIMARY KEY,
		user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
		token_hash TEXT NOT NULL,
		scope TEXT NOT NULL DEFAULT 'all',
		expires_at TEXT NOT NULL,
		last_used_at TEXT NOT NULL,
		created_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_api_keys_token_hash ON api_keys(token_hash)",
	r#"
	CREATE TABLE IF NOT EXISTS audit_logs (
		id TEXT PRIMARY KEY,
		time TEXT NOT NULL,
		actor_id TEXT NOT NULL,
		action TEXT NOT NULL,
		resource_type TEXT NOT NULL,
		resource_id TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_audit_logs_time ON audit_logs(time)",
	r#"
	CREATE TABLE IF NOT EXISTS notification_messages (
		id TEXT PRIMARY KEY,
		user_id TEXT NOT NULL,
		payload TEXT NOT NULL,
		sent_at TEXT,
		created_at TEXT NOT NULL
	)
	"#,
];

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_store;

	fn ctx() -> AuthContext {
		AuthContext::new()
	}

	#[tokio::test]
	async fn user_round_trip() {
		let store = create_test_store().await;
		let id = Uuid::new_v4();
		let inserted = store
			.insert_user(
				&ctx(),
				InsertUserParams {
					id,
					username: "alice".to_string(),
					email: "alice@example.com".to_string(),
				},
			)
			.await
			.unwrap();
		let fetched = store.get_user_by_id(&ctx(), id).await.unwrap();
		assert_eq!(inserted.id, fetched.id);
		assert_eq!(fetched.username, "alice");

		let by_email = store
			.get_user_by_email(&ctx(), "alice@example.com")
			.await
			.unwrap();
		assert_eq!(by_email.id, id);
	}

	#[tokio::test]
	async fn missing_rows_return_not_found() {
		let store = create_test_store().await;
		let err = store.get_user_by_id(&ctx(), Uuid::new_v4()).await.unwrap_err();
		assert!(err.is_not_found());
		let err = store
			.get_workspace_by_id(&ctx(), Uuid::new_v4())
			.await
			.unwrap_err();
		assert!(err.is_not_found());
	}

	#[tokio::test]
	async fn soft_deleted_users_leave_default_listing() {
		let store = create_test_store().await;
		let id = Uuid::new_v4();
		store
			.insert_user(
				&ctx(),
				InsertUserParams {
					id,
					username: "bob".to_string(),
					email: "bob@example.com".to_string(),
				},
			)
			.await
			.unwrap();
		store.update_user_deleted_by_id(&ctx(), id).await.unwrap();

		let listed = store
			.list_users(&ctx(), ListUsersParams::default())
			.await
			.unwrap();
		assert!(listed.is_empty());
		// The row itself survives for audit trails.
		assert!(store.get_user_by_id(&ctx(), id).await.unwrap().deleted);
	}

	#[tokio::test]
	async fn template_acl_round_trips_through_json() {
		let store = create_test_store().await;
		let org = store
			.insert_organization(
				&ctx(),
				InsertOrganizationParams {
					id: Uuid::new_v4(),
					name: "acme".to_string(),
					display_name: "Acme".to_string(),
				},
			)
			.await
			.unwrap();
		let template = store
			.insert_template(
				&ctx(),
				InsertTemplateParams {
					id: Uuid::new_v4(),
					organization_id: org.id,
					name: "base".to_string(),
					display_name: "Base".to_string(),
					created_by: Uuid::new_v4(),
				},
			)
			.await
			.unwrap();

		let mut user_acl = AclList::new();
		user_acl.insert(
			Uuid::new_v4().to_string(),
			vec![gantry_server_rbac::Action::Read],
		);
		let updated = store
			.update_template_acl(
				&ctx(),
				UpdateTemplateAclParams {
					id: template.id,
					user_acl: user_acl.clone(),
					group_acl: AclList::new(),
				},
			)
			.await
			.unwrap();
		assert_eq!(updated.user_acl, user_acl);

		let fetched = store.get_template_by_id(&ctx(), template.id).await.unwrap();
		assert_eq!(fetched.user_acl, user_acl);
	}

	#[tokio::test]
	async fn provisioner_job_queue_acquires_oldest_first() {
		let store = create_test_store().await;
		let org_id = Uuid::new_v4();
		let first = Uuid::new_v4();
		let second = Uuid::new_v4();
		for id in [first, second] {
			store
				.insert_provisioner_job(
					&ctx(),
					InsertProvisionerJobParams {
						id,
						organization_id: org_id,
						job_type: "workspace_build".to_string(),
						input: serde_json::json!({"workspace": id.to_string()}),
					},
				)
				.await
				.unwrap();
		}

		let worker = Uuid::new_v4();
		let acquired = store
			.acquire_provisioner_job(
				&ctx(),
				AcquireProvisionerJobParams {
					worker_id: worker,
					started_at: Utc::now(),
				},
			)
			.await
			.unwrap();
		assert_eq!(acquired.id, first);
		assert_eq!(acquired.worker_id, Some(worker));
	}

	#[tokio::test]
	async fn advisory_locks_are_exclusive() {
		let store = create_test_store().await;
		assert!(store.try_acquire_lock(&ctx(), 7).await.unwrap());
		assert!(!store.try_acquire_lock(&ctx(), 7).await.unwrap());
		store.release_lock(&ctx(), 7).await.unwrap();
		assert!(store.try_acquire_lock(&ctx(), 7).await.unwrap());
	}
}
