// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test helpers: in-memory pools and seeded stores.

use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

use crate::sqlite::SqliteStore;
use crate::types::{
	InsertOrganizationParams, InsertTemplateParams, InsertUserParams, InsertWorkspaceParams,
	Organization, Template, User, Workspace,
};
use gantry_server_rbac::AuthContext;

pub async fn create_test_pool() -> SqlitePool {
	SqlitePool::connect(":memory:").await.unwrap()
}

/// An in-memory store with the full schema applied.
pub async fn create_test_store() -> SqliteStore {
	let store = SqliteStore::new(create_test_pool().await);
	store.migrate().await.unwrap();
	store
}

/// Inserts a user with generated fields.
pub async fn seed_user(store: &SqliteStore, username: &str) -> User {
	use crate::store::Store;
	store
		.insert_user(
			&AuthContext::new(),
			InsertUserParams {
				id: Uuid::new_v4(),
				username: username.to_string(),
				email: format!("{username}@example.com"),
			},
		)
		.await
		.unwrap()
}

/// Inserts an organization with generated fields.
pub async fn seed_organization(store: &SqliteStore, name: &str) -> Organization {
	use crate::store::Store;
	store
		.insert_organization(
			&AuthContext::new(),
			InsertOrganizationParams {
				id: Uuid::new_v4(),
				name: name.to_string(),
				display_name: name.to_string(),
			},
		)
		.await
		.unwrap()
}

/// Inserts a template owned by `created_by` in `org`.
pub async fn seed_template(store: &SqliteStore, org: &Organization, created_by: &User) -> Template {
	use crate::store::Store;
	let id = Uuid::new_v4();
	store
		.insert_template(
			&AuthContext::new(),
			InsertTemplateParams {
				id,
				organization_id: org.id,
				name: format!("template-{id}"),
				display_name: "Template".to_string(),
				created_by: created_by.id,
			},
		)
		.await
		.unwrap()
}

/// Inserts a workspace for `owner` in `org` built from `template`.
pub async fn seed_workspace(
	store: &SqliteStore,
	org: &Organization,
	template: &Template,
	owner: &User,
) -> Workspace {
	use crate::store::Store;
	let id = Uuid::new_v4();
	store
		.insert_workspace(
			&AuthContext::new(),
			InsertWorkspaceParams {
				id,
				owner_id: owner.id,
				organization_id: org.id,
				template_id: template.id,
				name: format!("ws-{id}"),
				autostart_schedule: None,
			},
		)
		.await
		.unwrap()
}
