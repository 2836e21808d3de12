// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Generic operation wrappers.
//!
//! These functions turn an unauthorized store operation into an authorized
//! one with an identical shape, so every decorator method is a one-line
//! composition instead of bespoke logic. Each wrapper requires an actor in
//! context before doing any authorization-relevant work, and translates
//! evaluator denials through [`deny_error`]: full decision internals go to
//! the diagnostic log, the caller gets the generic error.

use std::future::Future;

use gantry_server_db::DbError;
use gantry_server_rbac::{
	filter as rbac_filter, Action, AuthContext, Authorizer, Objecter, PreparedAuthorized,
	RbacError, RbacObject, Subject,
};

/// Returns the actor attached to the context, or `NoActor`, which callers
/// must treat as "not found", never as "forbidden".
pub(crate) fn require_actor(ctx: &AuthContext) -> Result<&Subject, DbError> {
	ctx.actor().ok_or(DbError::NoActor)
}

/// Translates an evaluator error into the caller-visible taxonomy.
///
/// A denial is logged once here with its full decision context and then
/// collapsed to the generic `NotAuthorized`. A cancellation is propagated
/// as `Cancelled` and never reclassified as a denial.
pub(crate) fn deny_error(err: RbacError) -> DbError {
	match err {
		RbacError::Cancelled => DbError::Cancelled,
		RbacError::Forbidden(detail) => {
			tracing::debug!(
				subject_id = %detail.subject_id,
				subject_name = %detail.subject_name,
				roles = ?detail.roles,
				groups = ?detail.groups,
				scope = %detail.scope,
				action = %detail.action,
				resource_type = %detail.object.resource_type,
				resource_id = %detail.object.id,
				reason = %detail.reason,
				"unauthorized"
			);
			DbError::NotAuthorized
		}
		RbacError::InvalidInput(message) => DbError::Internal(message),
	}
}

/// Wraps a point read. The read **always** runs, even when the actor will
/// turn out to be unauthorized, because the row's details are required to
/// evaluate authorization. The only side effect of a denied call is that
/// already-necessary read.
pub(crate) async fn fetch<T, F, Fut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	read: F,
) -> Result<T, DbError>
where
	T: Objecter,
	F: FnOnce() -> Fut + Send,
	Fut: Future<Output = Result<T, DbError>> + Send,
{
	let actor = require_actor(ctx)?;
	let object = read().await?;
	auth
		.authorize(ctx, actor, Action::Read, &object.rbac_object())
		.map_err(deny_error)?;
	Ok(object)
}

/// Wraps an insert. `Create` is authorized against the caller-supplied
/// descriptor of the not-yet-existing row; on denial the insert closure is
/// never invoked, so a denied create writes nothing.
pub(crate) async fn insert<T, F, Fut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	object: RbacObject,
	ins: F,
) -> Result<T, DbError>
where
	F: FnOnce() -> Fut + Send,
	Fut: Future<Output = Result<T, DbError>> + Send,
{
	let actor = require_actor(ctx)?;
	auth
		.authorize(ctx, actor, Action::Create, &object)
		.map_err(deny_error)?;
	ins().await
}

/// The general primitive: fetch an object, authorize `action` against it,
/// then run the query and surface its result. The fetched object is used
/// only for the authorization check.
pub(crate) async fn fetch_and_query<T, R, FF, FFut, QF, QFut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	action: Action,
	fetch_fn: FF,
	query_fn: QF,
) -> Result<R, DbError>
where
	T: Objecter,
	FF: FnOnce() -> FFut + Send,
	FFut: Future<Output = Result<T, DbError>> + Send,
	QF: FnOnce() -> QFut + Send,
	QFut: Future<Output = Result<R, DbError>> + Send,
{
	let actor = require_actor(ctx)?;
	let object = fetch_fn().await?;
	auth
		.authorize(ctx, actor, action, &object.rbac_object())
		.map_err(deny_error)?;
	query_fn().await
}

/// `fetch_and_query` for operations that only report an error.
pub(crate) async fn fetch_and_exec<T, FF, FFut, EF, EFut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	action: Action,
	fetch_fn: FF,
	exec_fn: EF,
) -> Result<(), DbError>
where
	T: Objecter,
	FF: FnOnce() -> FFut + Send,
	FFut: Future<Output = Result<T, DbError>> + Send,
	EF: FnOnce() -> EFut + Send,
	EFut: Future<Output = Result<(), DbError>> + Send,
{
	fetch_and_query(auth, ctx, action, fetch_fn, exec_fn).await
}

/// Fetch, authorize `Update`, then run the mutation.
pub(crate) async fn update<T, FF, FFut, EF, EFut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	fetch_fn: FF,
	exec_fn: EF,
) -> Result<(), DbError>
where
	T: Objecter,
	FF: FnOnce() -> FFut + Send,
	FFut: Future<Output = Result<T, DbError>> + Send,
	EF: FnOnce() -> EFut + Send,
	EFut: Future<Output = Result<(), DbError>> + Send,
{
	fetch_and_exec(auth, ctx, Action::Update, fetch_fn, exec_fn).await
}

/// Fetch, authorize `Update`, then run the mutation and surface its result.
pub(crate) async fn update_with_return<T, R, FF, FFut, QF, QFut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	fetch_fn: FF,
	query_fn: QF,
) -> Result<R, DbError>
where
	T: Objecter,
	FF: FnOnce() -> FFut + Send,
	FFut: Future<Output = Result<T, DbError>> + Send,
	QF: FnOnce() -> QFut + Send,
	QFut: Future<Output = Result<R, DbError>> + Send,
{
	fetch_and_query(auth, ctx, Action::Update, fetch_fn, query_fn).await
}

/// Fetch, authorize `Delete`, then run the deletion (hard or soft).
pub(crate) async fn delete<T, FF, FFut, EF, EFut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	fetch_fn: FF,
	exec_fn: EF,
) -> Result<(), DbError>
where
	T: Objecter,
	FF: FnOnce() -> FFut + Send,
	FFut: Future<Output = Result<T, DbError>> + Send,
	EF: FnOnce() -> EFut + Send,
	EFut: Future<Output = Result<(), DbError>> + Send,
{
	fetch_and_exec(auth, ctx, Action::Delete, fetch_fn, exec_fn).await
}

/// Runs the full, unauthorized list and keeps only rows the actor may
/// read. Acceptable for small, bounded result sets; unbounded lists should
/// push a compiled filter into the query via [`prepare_sql_filter`].
pub(crate) async fn fetch_with_post_filter<T, F, Fut>(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	list: F,
) -> Result<Vec<T>, DbError>
where
	T: Objecter,
	F: FnOnce() -> Fut + Send,
	Fut: Future<Output = Result<Vec<T>, DbError>> + Send,
{
	let actor = require_actor(ctx)?.clone();
	let objects = list().await?;
	rbac_filter(auth, ctx, &actor, Action::Read, objects).map_err(deny_error)
}

/// Prepares an authorization filter for a list query. The store compiles
/// it against its own column layout during query construction.
pub(crate) fn prepare_sql_filter(
	auth: &dyn Authorizer,
	ctx: &AuthContext,
	action: Action,
	resource_type: &str,
) -> Result<Box<dyn PreparedAuthorized>, DbError> {
	let actor = require_actor(ctx)?;
	auth
		.prepare(ctx, actor, action, resource_type)
		.map_err(deny_error)
}
