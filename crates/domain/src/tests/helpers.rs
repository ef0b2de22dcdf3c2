// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

use crate::{
    CalculationDetails, CalculationType, Commission, CommissionId, CommissionStatus,
    CommissionType, Cents, HoldSchedule, ProfileId, ProfileKind,
};
use time::OffsetDateTime;
use time::macros::datetime;

pub fn test_now() -> OffsetDateTime {
    datetime!(2026-05-04 09:30 UTC)
}

pub fn create_test_commission(
    id: &str,
    amount: Cents,
    status: CommissionStatus,
    created_at: OffsetDateTime,
) -> Commission {
    let schedule: HoldSchedule = HoldSchedule::compute(created_at, 72, 24).unwrap();
    Commission {
        id: CommissionId::new(id),
        referrer_id: ProfileId::new("referrer"),
        referrer_kind: ProfileKind::Chatter,
        referee_id: ProfileId::new("referee"),
        commission_type: CommissionType::RecurringCall,
        source_type: CommissionType::RecurringCall.source_type(),
        source_id: format!("call-{id}"),
        dedupe_key: format!("call-{id}"),
        amount,
        currency: String::from("EUR"),
        calculation: CalculationDetails {
            calculation_type: CalculationType::Fixed,
            base_amount: None,
            rate_applied: None,
            fixed_component: Some(amount),
            used_captured_rates: false,
            breakdown: String::from("fixed"),
        },
        status,
        description: String::from("test commission"),
        created_at,
        hold_until: schedule.hold_until,
        available_at: schedule.available_at,
        validated_at: None,
        released_at: None,
        paid_at: None,
        cancelled_at: None,
        cancelled_by: None,
        cancellation_reason: None,
        withdrawal_id: None,
        adjustments: Vec::new(),
    }
}
