// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Immutable audit events for administrative and financial state changes.
//!
//! Every admin mutation in the engine (commission cancel/adjust, config
//! update, withdrawal approve/reject/release) writes exactly one
//! [`AuditEvent`] in the same transaction as the change itself.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used
)]

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Actor type for scheduled jobs and event handlers.
pub const ACTOR_SYSTEM: &str = "system";
/// Actor type for administrators.
pub const ACTOR_ADMIN: &str = "admin";
/// Actor type for affiliates acting on their own account.
pub const ACTOR_AFFILIATE: &str = "affiliate";

/// Represents the entity performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The unique identifier for this actor.
    pub id: String,
    /// The type of actor (`system`, `admin`, `affiliate`).
    pub actor_type: String,
}

impl Actor {
    /// Creates a new Actor.
    ///
    /// # Arguments
    ///
    /// * `id` - The unique identifier for this actor
    /// * `actor_type` - The type of actor
    #[must_use]
    pub const fn new(id: String, actor_type: String) -> Self {
        Self { id, actor_type }
    }

    /// The engine itself, e.g. the reconciler or an event handler.
    #[must_use]
    pub fn system() -> Self {
        Self::new(String::from(ACTOR_SYSTEM), String::from(ACTOR_SYSTEM))
    }

    #[must_use]
    pub fn admin(id: &str) -> Self {
        Self::new(id.to_string(), String::from(ACTOR_ADMIN))
    }

    #[must_use]
    pub fn affiliate(id: &str) -> Self {
        Self::new(id.to_string(), String::from(ACTOR_AFFILIATE))
    }

    /// Returns true for administrator actors.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.actor_type == ACTOR_ADMIN
    }
}

/// Represents the reason or trigger for an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cause {
    /// A unique identifier for this cause (request id, job run id).
    pub id: String,
    /// A description of the cause, usually the admin-supplied reason.
    pub description: String,
}

impl Cause {
    /// Creates a new Cause.
    ///
    /// # Arguments
    ///
    /// * `id` - The unique identifier for this cause
    /// * `description` - A description of what triggered this action
    #[must_use]
    pub const fn new(id: String, description: String) -> Self {
        Self { id, description }
    }
}

/// Represents the specific action performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// The name of the action (e.g. `CancelCommission`, `ApproveWithdrawal`).
    pub name: String,
    /// Optional additional details about the action.
    pub details: Option<String>,
}

impl Action {
    /// Creates a new Action.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the action
    /// * `details` - Optional additional details
    #[must_use]
    pub const fn new(name: String, details: Option<String>) -> Self {
        Self { name, details }
    }
}

/// Serialized state of the affected entity at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// JSON rendering of the relevant fields.
    pub data: String,
}

impl StateSnapshot {
    /// Creates a new `StateSnapshot`.
    #[must_use]
    pub const fn new(data: String) -> Self {
        Self { data }
    }

    /// Snapshot for an entity that did not exist before the action.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            data: String::new(),
        }
    }
}

/// The entity an audit event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// e.g. `commission`, `withdrawal`, `config`.
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }
}

/// An immutable audit event representing a state transition.
///
/// Audit events capture:
/// - Which entity changed
/// - Who performed the action (actor)
/// - Why it was performed (cause)
/// - What action was performed (action)
/// - The state before and after the transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub entity: EntityRef,
    /// The actor who initiated this state change.
    pub actor: Actor,
    /// The cause or reason for this state change.
    pub cause: Cause,
    /// The action that was performed.
    pub action: Action,
    /// The state before the transition.
    pub before: StateSnapshot,
    /// The state after the transition.
    pub after: StateSnapshot,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

impl AuditEvent {
    /// Creates a new `AuditEvent`.
    ///
    /// # Arguments
    ///
    /// * `entity` - The entity that changed
    /// * `actor` - The actor who initiated the change
    /// * `cause` - The reason for the change
    /// * `action` - The action that was performed
    /// * `before` - The state before the transition
    /// * `after` - The state after the transition
    /// * `occurred_at` - When the change was committed
    #[must_use]
    pub const fn new(
        entity: EntityRef,
        actor: Actor,
        cause: Cause,
        action: Action,
        before: StateSnapshot,
        after: StateSnapshot,
        occurred_at: OffsetDateTime,
    ) -> Self {
        Self {
            entity,
            actor,
            cause,
            action,
            before,
            after,
            occurred_at,
        }
    }
}
