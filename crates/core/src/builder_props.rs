//! Property-based tests for document construction.
//!
//! - Line-sum: every built document's total equals the sum of its lines.
//! - Sign: receipt amounts are positive; deposit totals net refunds and fees.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use ledgersync_shared::types::{Currency, Money, PaymentId, PayoutId, RefundId, UserId};

use crate::amount::AmountNormalizer;
use crate::builder::{RepresentationBuilder, ResolvedLine};
use crate::client::Ref;
use crate::payout::PayoutAggregator;
use crate::record::{
    Classification, LinkedTransaction, Payment, Payout, RecordKind, Refund, SyncState, SyncStatus,
};
use crate::resolver::FeeLineRefs;

/// Strategy to generate positive minor-unit amounts (0.01 to 100,000.00).
fn positive_minor() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy to generate currencies, including a zero-exponent one.
fn currency() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::Usd),
        Just(Currency::Eur),
        Just(Currency::Gbp),
        Just(Currency::Jpy),
    ]
}

fn resolved(amount_minor: i64) -> ResolvedLine {
    ResolvedLine {
        amount_minor,
        item: Ref::id("1"),
        class: Ref::named("2", "Events"),
        description: None,
    }
}

fn payment(amount: Money) -> Payment {
    Payment {
        id: PaymentId::new(),
        user_id: UserId::new(),
        amount,
        classification: Classification::new("event"),
        components: vec![],
        description: None,
        processor_reference: None,
        txn_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        sync: SyncState::pending(),
    }
}

fn synced_link(kind: RecordKind, amount_minor: i64, n: usize) -> LinkedTransaction {
    LinkedTransaction {
        kind,
        id: uuid::Uuid::new_v4(),
        amount_minor,
        currency: Currency::Usd,
        status: SyncStatus::Synced,
        external_id: Some(format!("{}-{n}", kind.as_str())),
    }
}

fn line_sum(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* split payment, the sales receipt total equals the sum of its
    /// lines and the payment amount, and every line is positive.
    #[test]
    fn prop_sales_receipt_line_sum(
        components in prop::collection::vec(positive_minor(), 1..6),
        currency in currency(),
    ) {
        let total_minor: i64 = components.iter().sum();
        let p = payment(Money::new(total_minor, currency));
        let lines: Vec<ResolvedLine> = components.iter().copied().map(resolved).collect();

        let receipt = RepresentationBuilder::sales_receipt(&p, Ref::id("C"), Ref::id("A"), &lines)
            .unwrap();

        prop_assert_eq!(receipt.total_amt, line_sum(receipt.line.iter().map(|l| l.amount)));
        prop_assert_eq!(receipt.total_amt, AmountNormalizer::from_minor(total_minor, currency));
        prop_assert!(receipt.total_amt > Decimal::ZERO);
        prop_assert!(receipt.line.iter().all(|l| l.amount > Decimal::ZERO));
        prop_assert_eq!(receipt.total_amt.scale(), 2);
    }

    /// *For any* refund, the unit price equals the refund magnitude.
    #[test]
    fn prop_refund_unit_price_is_magnitude(amount in positive_minor()) {
        let origin = payment(Money::new(amount, Currency::Usd));
        let refund = Refund {
            id: RefundId::new(),
            payment_id: origin.id,
            amount: Money::new(amount, Currency::Usd),
            entity_type: None,
            property: None,
            reason: None,
            processor_reference: None,
            txn_date: origin.txn_date,
            sync: SyncState::pending(),
        };

        let receipt = RepresentationBuilder::refund_receipt(
            &refund, &origin, Ref::id("C"), Ref::id("A"), &resolved(amount),
        ).unwrap();

        let detail = receipt.line[0].sales_item_line_detail.clone().unwrap();
        prop_assert_eq!(detail.unit_price, AmountNormalizer::magnitude(amount, Currency::Usd));
        prop_assert_eq!(receipt.total_amt, receipt.line[0].amount);
    }

    /// *For any* payout with linked transactions, the deposit total equals
    /// payments minus refunds minus fees, and equals the line sum.
    #[test]
    fn prop_deposit_nets_refunds_and_fees(
        payments in prop::collection::vec(positive_minor(), 1..5),
        refunds in prop::collection::vec(positive_minor(), 0..3),
        fee in 0i64..10_000i64,
    ) {
        let mut links: Vec<LinkedTransaction> = payments
            .iter()
            .enumerate()
            .map(|(n, a)| synced_link(RecordKind::Payment, *a, n))
            .collect();
        links.extend(
            refunds
                .iter()
                .enumerate()
                .map(|(n, a)| synced_link(RecordKind::Refund, *a, n)),
        );

        let net: i64 = payments.iter().sum::<i64>() - refunds.iter().sum::<i64>() - fee;
        let payout = Payout {
            id: PayoutId::new(),
            amount: Money::new(net, Currency::Usd),
            fee_total_minor: fee,
            processor_reference: None,
            arrival_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            sync: SyncState::pending(),
        };
        let fee_refs = FeeLineRefs {
            item: Ref::id("9"),
            class: Ref::named("2", "Administration"),
            account: Ref::named("8", "Stripe Fees"),
        };

        let deposit = PayoutAggregator::build_deposit(
            &payout,
            &links,
            &Ref::id("B"),
            &Ref::id("U"),
            Some(&fee_refs),
        ).unwrap();

        prop_assert_eq!(deposit.total_amt, line_sum(deposit.line.iter().map(|l| l.amount)));
        prop_assert_eq!(deposit.total_amt, AmountNormalizer::from_minor(net, Currency::Usd));
        let expected_lines = payments.len() + refunds.len() + usize::from(fee != 0);
        prop_assert_eq!(deposit.line.len(), expected_lines);
    }
}
