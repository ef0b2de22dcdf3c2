// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::error::StoreError;
use crate::store::LedgerTx;
use affilink_audit::{Action, Actor, AuditEvent, Cause, EntityRef, StateSnapshot};
use affilink_domain::generate_id;
use serde::Serialize;
use time::OffsetDateTime;

/// Serializes `value` into an audit snapshot.
pub(crate) fn snapshot<T: Serialize>(value: &T) -> StateSnapshot {
    StateSnapshot::new(serde_json::to_string(value).unwrap_or_default())
}

/// Appends one audit event through the given transaction.
#[allow(clippy::too_many_arguments)]
pub(crate) fn record_audit_event(
    tx: &mut dyn LedgerTx,
    entity: EntityRef,
    actor: &Actor,
    reason: &str,
    action: &str,
    details: Option<String>,
    before: StateSnapshot,
    after: StateSnapshot,
    now: OffsetDateTime,
) -> Result<(), StoreError> {
    let event: AuditEvent = AuditEvent::new(
        entity,
        actor.clone(),
        Cause::new(generate_id("cause", now), reason.to_string()),
        Action::new(action.to_string(), details),
        before,
        after,
        now,
    );
    tx.append_audit_event(&event)
}
