// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The per-request carrier for the acting subject and cancellation.
//!
//! Every store operation takes an [`AuthContext`] as its first argument.
//! Authentication middleware attaches the subject once per request; system
//! jobs derive a context from one of the fixed system identities. Absence
//! of an actor is a valid state and only becomes an error when an
//! authorization-requiring operation executes.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::subject::Subject;

/// Request-scoped context: at most one subject plus a cancellation token.
///
/// Contexts are cheap to clone and derive; the subject is shared, never
/// copied or mutated.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
	actor: Option<Arc<Subject>>,
	cancel: CancellationToken,
}

impl AuthContext {
	/// A fresh context with no actor and its own cancellation token.
	pub fn new() -> Self {
		Self::default()
	}

	/// A context without an actor, cancelled when `cancel` is cancelled.
	pub fn with_cancellation(cancel: CancellationToken) -> Self {
		Self {
			actor: None,
			cancel,
		}
	}

	/// Derives a context with the given subject attached.
	///
	/// Attaching [`Subject::remove_actor`] instead strips any actor from
	/// the derived context, for nested calls that must run unauthenticated
	/// by design.
	pub fn as_actor(&self, subject: Subject) -> Self {
		let actor = if subject.is_remove_actor() {
			None
		} else {
			Some(Arc::new(subject))
		};
		Self {
			actor,
			cancel: self.cancel.clone(),
		}
	}

	/// The subject attached to this context, if any.
	pub fn actor(&self) -> Option<&Subject> {
		self.actor.as_deref()
	}

	pub fn cancellation(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::subject::Scope;

	fn subject(id: &str) -> Subject {
		Subject {
			id: id.to_string(),
			friendly_name: String::new(),
			roles: Vec::new(),
			groups: Vec::new(),
			scope: Scope::all(),
		}
	}

	#[test]
	fn new_context_has_no_actor() {
		let ctx = AuthContext::new();
		assert!(ctx.actor().is_none());
		assert!(!ctx.is_cancelled());
	}

	#[test]
	fn as_actor_attaches_subject() {
		let ctx = AuthContext::new().as_actor(subject("user-1"));
		assert_eq!(ctx.actor().unwrap().id, "user-1");
	}

	#[test]
	fn derived_context_does_not_mutate_parent() {
		let parent = AuthContext::new();
		let _child = parent.as_actor(subject("user-1"));
		assert!(parent.actor().is_none());
	}

	#[test]
	fn remove_actor_sentinel_strips_actor() {
		let ctx = AuthContext::new().as_actor(subject("user-1"));
		let stripped = ctx.as_actor(Subject::remove_actor());
		assert!(stripped.actor().is_none());
		// The original context keeps its actor.
		assert!(ctx.actor().is_some());
	}

	#[test]
	fn cancellation_flows_to_derived_contexts() {
		let token = CancellationToken::new();
		let ctx = AuthContext::with_cancellation(token.clone());
		let derived = ctx.as_actor(subject("user-1"));
		assert!(!derived.is_cancelled());
		token.cancel();
		assert!(derived.is_cancelled());
	}
}
