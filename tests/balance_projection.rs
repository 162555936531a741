mod common;

use accrual_engine::services::projection::ProjectionRequest;
use accrual_engine::{ConsumptionMode, TimePoint, Transaction, TransactionType, Unit};
use common::{date, days, engine, monthly_policy, upfront_policy, year_2025};
use rust_decimal_macros::dec;

#[tokio::test]
async fn consume_ahead_january_draws_on_full_entitlement() {
    let policy = monthly_policy("pto-standard", dec!(20), ConsumptionMode::ConsumeAhead);
    let fixture = engine(vec![policy.clone()], vec![]).await;

    let outcome = fixture
        .projection
        .project(ProjectionRequest {
            entity_id: "emp-1",
            policy: &policy,
            period: year_2025(),
            as_of: Some(date(2025, 1, 15)),
            schedule: None,
            requested: days(dec!(15)),
            allow_negative: false,
        })
        .await
        .unwrap();

    assert!(outcome.is_valid);
    let accrued = outcome.balance.accrued_to_date.value;
    assert!(
        (accrued - dec!(1.6667)).abs() < dec!(0.001),
        "accrued_to_date was {accrued}"
    );
    let entitlement = outcome.balance.total_entitlement.value;
    assert!(
        (entitlement - dec!(20)).abs() < dec!(0.001),
        "total_entitlement was {entitlement}"
    );
    assert!((outcome.remaining.value - dec!(5)).abs() < dec!(0.001));
}

#[tokio::test]
async fn consume_up_to_accrued_rejects_january_request() {
    let policy = monthly_policy("pto-standard", dec!(20), ConsumptionMode::ConsumeUpToAccrued);
    let fixture = engine(vec![policy.clone()], vec![]).await;

    let outcome = fixture
        .projection
        .project(ProjectionRequest {
            entity_id: "emp-1",
            policy: &policy,
            period: year_2025(),
            as_of: Some(date(2025, 1, 31)),
            schedule: None,
            requested: days(dec!(10)),
            allow_negative: false,
        })
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert_eq!(
        outcome.validation_error.expect("validation error").code(),
        "insufficient_balance"
    );
}

#[tokio::test]
async fn pending_reservation_blocks_overcommitment() {
    let policy = upfront_policy("pto-standard", dec!(20));
    let fixture = engine(vec![policy.clone()], vec![]).await;

    fixture
        .ledger
        .append(Transaction::new(
            "emp-1",
            "pto-standard",
            "time_off",
            TimePoint::day(date(2025, 2, 3)),
            days(dec!(-5)),
            TransactionType::Pending,
        ))
        .await
        .unwrap();

    let outcome = fixture
        .projection
        .project(ProjectionRequest {
            entity_id: "emp-1",
            policy: &policy,
            period: year_2025(),
            as_of: None,
            schedule: None,
            requested: days(dec!(16)),
            allow_negative: false,
        })
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert_eq!(outcome.balance.pending.value, dec!(5));
    assert_eq!(
        outcome.validation_error.expect("validation error").code(),
        "insufficient_balance"
    );
}

#[tokio::test]
async fn reversal_restores_the_pre_consumption_balance() {
    let policy = upfront_policy("pto-standard", dec!(20));
    let fixture = engine(vec![policy.clone()], vec![]).await;

    let probe = || {
        fixture.projection.project(ProjectionRequest {
            entity_id: "emp-1",
            policy: &policy,
            period: year_2025(),
            as_of: None,
            schedule: None,
            requested: days(dec!(0)),
            allow_negative: true,
        })
    };

    let before = probe().await.unwrap().balance;

    let consumption = Transaction::new(
        "emp-1",
        "pto-standard",
        "time_off",
        TimePoint::day(date(2025, 3, 10)),
        days(dec!(-4)),
        TransactionType::Consumption,
    );
    let consumption_id = consumption.id;
    fixture.ledger.append(consumption).await.unwrap();

    let during = probe().await.unwrap().balance;
    assert_eq!(during.total_consumed.value, dec!(4));

    fixture
        .ledger
        .append(
            Transaction::new(
                "emp-1",
                "pto-standard",
                "time_off",
                TimePoint::day(date(2025, 3, 11)),
                days(dec!(4)),
                TransactionType::Reversal,
            )
            .with_reference(consumption_id.to_string()),
        )
        .await
        .unwrap();

    let after = probe().await.unwrap().balance;
    assert_eq!(after.current(), before.current());
    assert_eq!(after.total_consumed.value, before.total_consumed.value);
    assert_eq!(
        after.available(ConsumptionMode::ConsumeAhead),
        before.available(ConsumptionMode::ConsumeAhead)
    );
}

#[tokio::test]
async fn balance_at_matches_projection_current_for_settled_ledgers() {
    let policy = upfront_policy("pto-standard", dec!(20));
    let fixture = engine(vec![policy.clone()], vec![]).await;

    fixture
        .ledger
        .append(Transaction::new(
            "emp-1",
            "pto-standard",
            "time_off",
            TimePoint::day(date(2025, 1, 1)),
            days(dec!(20)),
            TransactionType::Grant,
        ))
        .await
        .unwrap();
    fixture
        .ledger
        .append(Transaction::new(
            "emp-1",
            "pto-standard",
            "time_off",
            TimePoint::day(date(2025, 5, 20)),
            days(dec!(-7)),
            TransactionType::Consumption,
        ))
        .await
        .unwrap();

    let summed = fixture
        .ledger
        .balance_at(
            "emp-1",
            "pto-standard",
            TimePoint::day(date(2025, 12, 31)),
            Unit::Days,
        )
        .await
        .unwrap();
    assert_eq!(summed.value, dec!(13));

    let outcome = fixture
        .projection
        .project(ProjectionRequest {
            entity_id: "emp-1",
            policy: &policy,
            period: year_2025(),
            as_of: None,
            schedule: None,
            requested: days(dec!(0)),
            allow_negative: true,
        })
        .await
        .unwrap();
    assert_eq!(outcome.balance.current().value, dec!(13));
}
