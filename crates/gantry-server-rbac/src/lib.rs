// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! RBAC policy evaluation for the Gantry control plane.
//!
//! This crate answers one question: is this subject allowed to perform this
//! action on this object. It provides:
//!
//! - [`Subject`], [`Role`], [`Permission`], [`Scope`]: who is asking
//! - [`RbacObject`]: the authorization-relevant projection of a store row
//! - [`Authorizer`] / [`PolicyAuthorizer`]: the evaluation contract and the
//!   concrete evaluator
//! - [`PreparedAuthorized`] / [`PreparedFilter`]: a partially evaluated
//!   decision reusable in-process or compiled to a SQL predicate
//! - [`AuthContext`]: the per-request carrier for the acting subject and
//!   cancellation
//!
//! # Design Principles
//!
//! 1. **Pure evaluation**: policy decisions are deterministic functions of
//!    their inputs and never touch the database
//! 2. **Deny by default**: an action is allowed only by an explicit grant,
//!    and any matching negated permission wins over every grant
//! 3. **Push filters down**: list queries should use [`PreparedFilter`]
//!    compiled to SQL rather than filtering rows after the fetch

pub mod authorizer;
pub mod context;
pub mod filter;
pub mod object;
pub mod roles;
pub mod sql;
pub mod subject;

pub use authorizer::{Authorizer, DenyReason, PolicyAuthorizer, RbacError, UnauthorizedDetail};
pub use context::AuthContext;
pub use filter::{filter, PreparedAuthorized, PreparedFilter};
pub use object::{resource_type, Objecter, RbacObject};
pub use sql::SqlFilterConfig;
pub use subject::{permissions, Action, Permission, Role, Scope, Subject};
