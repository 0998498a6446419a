//! External representation builder for payments and refunds.
//!
//! Lines are built from already-resolved references, so everything here is
//! pure. Amounts on receipts are positive magnitudes; the document type
//! carries the direction.

use rust_decimal::Decimal;

use ledgersync_shared::types::Currency;

use crate::amount::AmountNormalizer;
use crate::client::{Line, Ref, RefundReceipt, SalesReceipt};
use crate::error::SyncError;
use crate::record::{Payment, Refund};

/// A line component with its external references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    /// Amount in minor units.
    pub amount_minor: i64,
    /// Catalog item.
    pub item: Ref,
    /// Classification.
    pub class: Ref,
    /// Line description.
    pub description: Option<String>,
}

/// Builds sales receipts and refund receipts.
pub struct RepresentationBuilder;

impl RepresentationBuilder {
    /// Builds the sales receipt for a payment.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRecord` if there are no lines or the
    /// lines do not add up to the payment amount.
    pub fn sales_receipt(
        payment: &Payment,
        customer: Ref,
        deposit_to: Ref,
        lines: &[ResolvedLine],
    ) -> Result<SalesReceipt, SyncError> {
        let currency = payment.amount.currency;
        let line = Self::receipt_lines(lines, currency)?;
        let total_amt = Self::total(&line);

        let expected = AmountNormalizer::from_money(payment.amount);
        if total_amt != expected {
            return Err(SyncError::InvalidRecord(format!(
                "payment {} lines total {total_amt} but amount is {expected}",
                payment.id
            )));
        }

        let private_note = match &payment.processor_reference {
            Some(reference) => format!("Payment {} ({reference})", payment.id),
            None => format!("Payment {}", payment.id),
        };

        Ok(SalesReceipt {
            customer_ref: customer,
            deposit_to_account_ref: deposit_to,
            line,
            total_amt,
            txn_date: payment.txn_date,
            private_note: Some(private_note),
            currency_ref: Self::currency_ref(currency),
        })
    }

    /// Builds the refund receipt for a refund of `origin`.
    ///
    /// The private note names the payment's external document when it is
    /// known, otherwise the refund's own reference.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidRecord` for a zero-amount line.
    pub fn refund_receipt(
        refund: &Refund,
        origin: &Payment,
        customer: Ref,
        refund_from: Ref,
        line: &ResolvedLine,
    ) -> Result<RefundReceipt, SyncError> {
        let currency = refund.amount.currency;
        let line = Self::receipt_lines(std::slice::from_ref(line), currency)?;
        let total_amt = Self::total(&line);

        Ok(RefundReceipt {
            customer_ref: customer,
            refund_from_account_ref: refund_from,
            line,
            total_amt,
            txn_date: refund.txn_date,
            private_note: Some(Self::refund_note(refund, origin)),
            currency_ref: Self::currency_ref(currency),
        })
    }

    fn refund_note(refund: &Refund, origin: &Payment) -> String {
        if let Some(external_id) = &origin.sync.external_id {
            return format!("Refund of SalesReceipt {external_id}");
        }
        match &refund.processor_reference {
            Some(reference) => format!("Refund {reference}"),
            None => format!("Refund {}", refund.id),
        }
    }

    fn receipt_lines(lines: &[ResolvedLine], currency: Currency) -> Result<Vec<Line>, SyncError> {
        if lines.is_empty() {
            return Err(SyncError::InvalidRecord(
                "document has no lines".to_string(),
            ));
        }

        lines
            .iter()
            .map(|resolved| {
                if resolved.amount_minor == 0 {
                    return Err(SyncError::InvalidRecord(
                        "line amount is zero".to_string(),
                    ));
                }
                Ok(Line::sales_item(
                    AmountNormalizer::magnitude(resolved.amount_minor, currency),
                    resolved.item.clone(),
                    resolved.class.clone(),
                    resolved.description.clone(),
                ))
            })
            .collect()
    }

    /// Document total: the exact sum of its line amounts.
    #[must_use]
    pub fn total(lines: &[Line]) -> Decimal {
        AmountNormalizer::sum(lines.iter().map(|l| &l.amount))
    }

    fn currency_ref(currency: Currency) -> Ref {
        Ref::id(currency.to_string())
    }
}
