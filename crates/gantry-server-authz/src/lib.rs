// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization enforcement for the Gantry store.
//!
//! This crate sits between every caller and the persistent store and
//! guarantees that no data is read, written, or listed without a positive
//! policy decision:
//!
//! - [`AuthzStore`]: the store decorator. Wrap the real store once at
//!   startup; everything downstream consumes the decorated handle.
//! - [`system`]: fixed identities for internal background subsystems
//!   (provisioner daemon, autostart, hang detector, maintenance, notifier).
//! - Generic operation wrappers (internal) that give the hundreds of store
//!   operations a uniform authorization contract instead of per-operation
//!   bespoke logic.
//!
//! # Error contract
//!
//! Callers see three outcomes beyond ordinary store errors: `NoActor` when
//! the context carries no subject, the generic `NotAuthorized` on denial
//! (with full decision internals logged at debug severity, never returned),
//! and `Cancelled` when evaluation was aborted by the caller's context.
//! `NoActor` and `NotAuthorized` classify as "not found" so a denied row is
//! indistinguishable from an absent one.

pub mod store;
pub mod system;

mod wrappers;

pub use store::{AuthzStore, WRAP_NAME};
