// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The store's canonical error type.
//!
//! The authorization layer returns the same type as the store it decorates,
//! so the taxonomy lives here. `NoActor` and `NotAuthorized` both classify
//! as "not found" through [`DbError::is_not_found`]: callers must not be
//! able to distinguish a denied row from an absent one, or resource
//! existence leaks to unauthorized callers. `Cancelled` is never produced
//! from a denial and is never collapsed into "not found".

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// No authorization actor in the request context. Classified as "not
	/// found", never as "forbidden".
	#[error("no authorization actor in context")]
	NoActor,

	/// The policy denied the operation. Deliberately carries no detail; the
	/// decision internals are logged at the point of denial.
	#[error("unauthorized")]
	NotAuthorized,

	/// The caller's context was cancelled. Distinct from a denial so
	/// upstream retry and timeout handling keeps working.
	#[error("operation cancelled")]
	Cancelled,
}

impl DbError {
	/// True for every condition the API layer maps to a 404: genuinely
	/// absent rows, missing actors, and policy denials.
	pub fn is_not_found(&self) -> bool {
		match self {
			DbError::NotFound(_) | DbError::NoActor | DbError::NotAuthorized => true,
			DbError::Sqlx(sqlx::Error::RowNotFound) => true,
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn denial_and_absence_collapse_to_not_found() {
		assert!(DbError::NotFound("workspace".to_string()).is_not_found());
		assert!(DbError::NoActor.is_not_found());
		assert!(DbError::NotAuthorized.is_not_found());
		assert!(DbError::Sqlx(sqlx::Error::RowNotFound).is_not_found());
	}

	#[test]
	fn cancellation_is_not_collapsed() {
		assert!(!DbError::Cancelled.is_not_found());
		assert!(!DbError::Internal("boom".to_string()).is_not_found());
	}
}
