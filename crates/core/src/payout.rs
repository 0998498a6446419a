//! Payout aggregation into a bank deposit.
//!
//! A payout with linked transactions becomes one deposit line per settled
//! document plus an optional processor fee line. A payout without links is
//! deposited as a single line for its own recorded amount.

use tracing::warn;

use ledgersync_shared::types::PayoutId;

use crate::amount::AmountNormalizer;
use crate::builder::RepresentationBuilder;
use crate::client::{Deposit, DepositLineDetail, Line, Ref};
use crate::error::SyncError;
use crate::record::{LinkedTransaction, Payout, RecordKind};
use crate::resolver::FeeLineRefs;

/// Builds deposits for payouts.
pub struct PayoutAggregator;

impl PayoutAggregator {
    /// Checks that every linked transaction is synced.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::TransactionsNotFullySynced` with the number of
    /// links still unsynced.
    pub fn ensure_all_synced(
        payout_id: PayoutId,
        links: &[LinkedTransaction],
    ) -> Result<(), SyncError> {
        let unsynced = links
            .iter()
            .filter(|l| !l.status.is_synced() || l.external_id.is_none())
            .count();

        if unsynced > 0 {
            return Err(SyncError::TransactionsNotFullySynced {
                payout_id,
                unsynced,
            });
        }
        Ok(())
    }

    /// Whether the deposit for this payout gets a fee line.
    #[must_use]
    pub fn wants_fee_line(payout: &Payout, links: &[LinkedTransaction]) -> bool {
        !links.is_empty() && payout.fee_total_minor != 0
    }

    /// Builds the deposit for a payout.
    ///
    /// Payment lines are positive and refund lines negative, each linked to
    /// its external document. The fee line is added only when `fee` is
    /// given and [`Self::wants_fee_line`] holds. The total is always the
    /// exact line sum.
    ///
    /// # Errors
    ///
    /// `TransactionsNotFullySynced` if a link is unsynced. `InvalidRecord`
    /// for a link in another currency, a link that is not a payment or
    /// refund, or a negative payout without links.
    pub fn build_deposit(
        payout: &Payout,
        links: &[LinkedTransaction],
        deposit_to: &Ref,
        clearing_account: &Ref,
        fee: Option<&FeeLineRefs>,
    ) -> Result<Deposit, SyncError> {
        let currency = payout.amount.currency;

        let line = if links.is_empty() {
            if payout.amount.is_negative() {
                return Err(SyncError::InvalidRecord(format!(
                    "payout {} has a negative amount",
                    payout.id
                )));
            }
            vec![
                Line::deposit(
                    AmountNormalizer::from_money(payout.amount),
                    Self::clearing_detail(clearing_account),
                )
                .described(format!("Payout {}", payout.id)),
            ]
        } else {
            Self::ensure_all_synced(payout.id, links)?;

            if let Some(foreign) = links.iter().find(|l| l.currency != currency) {
                return Err(SyncError::InvalidRecord(format!(
                    "payout {} is in {} but linked {} {} is in {}",
                    payout.id,
                    currency,
                    foreign.kind,
                    foreign.id,
                    foreign.currency
                )));
            }

            let mut lines = links
                .iter()
                .map(|link| {
                    let external_id = link.external_id.clone().unwrap_or_default();
                    let amount = match link.kind {
                        RecordKind::Payment => {
                            AmountNormalizer::magnitude(link.amount_minor, currency)
                        }
                        RecordKind::Refund => AmountNormalizer::outflow(link.amount_minor, currency),
                        RecordKind::Payout => {
                            return Err(SyncError::InvalidRecord(format!(
                                "payout {} links another payout",
                                payout.id
                            )));
                        }
                    };
                    Ok(Line::deposit(amount, Self::clearing_detail(clearing_account))
                        .linked_to(external_id, link.kind.document_type()))
                })
                .collect::<Result<Vec<_>, SyncError>>()?;

            if let Some(fee) = fee.filter(|_| Self::wants_fee_line(payout, links)) {
                lines.push(
                    Line::deposit(
                        AmountNormalizer::outflow(payout.fee_total_minor, currency),
                        DepositLineDetail {
                            account_ref: fee.account.clone(),
                            class_ref: Some(fee.class.clone()),
                            item_ref: Some(fee.item.clone()),
                        },
                    )
                    .described("Processor fees"),
                );
            }
            lines
        };

        let total_amt = RepresentationBuilder::total(&line);
        let recorded = AmountNormalizer::from_money(payout.amount);
        if total_amt != recorded {
            warn!(
                payout_id = %payout.id,
                total = %total_amt,
                recorded = %recorded,
                "deposit total differs from recorded payout amount"
            );
        }

        Ok(Deposit {
            deposit_to_account_ref: deposit_to.clone(),
            line,
            total_amt,
            txn_date: payout.arrival_date,
            private_note: Some(match &payout.processor_reference {
                Some(reference) => format!("Payout {reference}"),
                None => format!("Payout {}", payout.id),
            }),
            currency_ref: Ref::id(currency.to_string()),
        })
    }

    fn clearing_detail(clearing_account: &Ref) -> DepositLineDetail {
        DepositLineDetail {
            account_ref: clearing_account.clone(),
            class_ref: None,
            item_ref: None,
        }
    }
}
