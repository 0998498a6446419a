//! Request and response shapes for the accounting API.
//!
//! Field names follow the external API (PascalCase). Amounts serialize as
//! decimal strings so the two fractional digits survive the wire.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ClientError;

/// Reference to an external entity: id plus optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    /// External id.
    pub value: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Ref {
    /// Reference by id only.
    #[must_use]
    pub fn id(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: None,
        }
    }

    /// Reference by id with a display name.
    #[must_use]
    pub fn named(value: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            name: Some(name.into()),
        }
    }
}

/// Line detail discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetailType {
    /// Item sale line on a sales or refund receipt.
    SalesItemLineDetail,
    /// Line on a bank deposit.
    DepositLineDetail,
}

/// Item/class detail for a receipt line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalesItemLineDetail {
    /// Catalog item.
    pub item_ref: Ref,
    /// Quantity; always 1.
    pub qty: u32,
    /// Unit price, equal to the line amount.
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    /// Classification.
    pub class_ref: Ref,
}

/// Account/class detail for a deposit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DepositLineDetail {
    /// Account the line posts against.
    pub account_ref: Ref,
    /// Classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_ref: Option<Ref>,
    /// Catalog item, used by the fee line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_ref: Option<Ref>,
}

/// Link from a deposit line to the document it settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LinkedTxn {
    /// External id of the settled document.
    pub txn_id: String,
    /// External document type (`SalesReceipt`, `RefundReceipt`).
    pub txn_type: String,
}

/// A document line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Line {
    /// Line amount with two fractional digits.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Which detail object the line carries.
    pub detail_type: DetailType,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Receipt line detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_item_line_detail: Option<SalesItemLineDetail>,
    /// Deposit line detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_line_detail: Option<DepositLineDetail>,
    /// Settled documents, for deposit lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_txn: Vec<LinkedTxn>,
}

impl Line {
    /// Receipt line: quantity 1 with unit price equal to the amount.
    #[must_use]
    pub fn sales_item(
        amount: Decimal,
        item_ref: Ref,
        class_ref: Ref,
        description: Option<String>,
    ) -> Self {
        Self {
            amount,
            detail_type: DetailType::SalesItemLineDetail,
            description,
            sales_item_line_detail: Some(SalesItemLineDetail {
                item_ref,
                qty: 1,
                unit_price: amount,
                class_ref,
            }),
            deposit_line_detail: None,
            linked_txn: Vec::new(),
        }
    }

    /// Deposit line posting against an account.
    #[must_use]
    pub fn deposit(amount: Decimal, detail: DepositLineDetail) -> Self {
        Self {
            amount,
            detail_type: DetailType::DepositLineDetail,
            description: None,
            sales_item_line_detail: None,
            deposit_line_detail: Some(detail),
            linked_txn: Vec::new(),
        }
    }

    /// Adds a settled-document link.
    #[must_use]
    pub fn linked_to(mut self, txn_id: impl Into<String>, txn_type: impl Into<String>) -> Self {
        self.linked_txn.push(LinkedTxn {
            txn_id: txn_id.into(),
            txn_type: txn_type.into(),
        });
        self
    }

    /// Sets the line description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sales receipt for a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SalesReceipt {
    /// Paying customer.
    pub customer_ref: Ref,
    /// Clearing account that receives the funds.
    pub deposit_to_account_ref: Ref,
    /// One line per payment component.
    pub line: Vec<Line>,
    /// Sum of line amounts.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amt: Decimal,
    /// Transaction date.
    pub txn_date: NaiveDate,
    /// Internal note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_note: Option<String>,
    /// Currency code.
    pub currency_ref: Ref,
}

/// Refund receipt for a refund. The document type carries the direction;
/// amounts are positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RefundReceipt {
    /// Refunded customer.
    pub customer_ref: Ref,
    /// Account the refund is paid from.
    pub refund_from_account_ref: Ref,
    /// Refund line.
    pub line: Vec<Line>,
    /// Sum of line amounts.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amt: Decimal,
    /// Transaction date.
    pub txn_date: NaiveDate,
    /// Origin reference for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_note: Option<String>,
    /// Currency code.
    pub currency_ref: Ref,
}

/// Bank deposit for a payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deposit {
    /// Bank account receiving the payout.
    pub deposit_to_account_ref: Ref,
    /// Settled documents and the fee line.
    pub line: Vec<Line>,
    /// Sum of line amounts.
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amt: Decimal,
    /// Arrival date.
    pub txn_date: NaiveDate,
    /// Processor payout reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_note: Option<String>,
    /// Currency code.
    pub currency_ref: Ref,
}

/// Customer creation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerParams {
    /// Display name; must be unique externally.
    pub display_name: String,
    /// Primary email address.
    #[serde(
        rename = "PrimaryEmailAddr",
        default,
        skip_serializing_if = "Option::is_none",
        with = "email_addr"
    )]
    pub email: Option<String>,
}

/// Item provisioning options for find-or-create.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemOptions {
    /// Income account a newly created item posts to.
    pub income_account_id: Option<String>,
    /// Item description.
    pub description: Option<String>,
}

/// A document created externally.
///
/// Only the fields the engine reads are typed; the full response is kept
/// verbatim in `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalDocument {
    /// External id.
    pub id: String,
    /// Total as reported back.
    pub total_amt: Option<Decimal>,
    /// Optimistic-locking token.
    pub sync_token: Option<String>,
    /// Entire response body.
    pub raw: Value,
}

impl ExternalDocument {
    /// Extracts a document from a response shaped `{ "<Entity>": { "Id": ... } }`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if the entity or its id is missing.
    pub fn from_response(entity: &str, raw: Value) -> Result<Self, ClientError> {
        let body = raw
            .get(entity)
            .ok_or_else(|| ClientError::Decode(format!("response has no {entity} object")))?;

        let id = match body.get("Id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Err(ClientError::Decode(format!("{entity} response has no Id"))),
        };

        let total_amt = match body.get("TotalAmt") {
            Some(Value::String(s)) => s.parse().ok(),
            Some(Value::Number(n)) => n.to_string().parse().ok(),
            _ => None,
        };

        let sync_token = body
            .get("SyncToken")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self {
            id,
            total_amt,
            sync_token,
            raw,
        })
    }
}

mod email_addr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct EmailAddr {
        #[serde(rename = "Address")]
        address: String,
    }

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(email: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        email
            .as_ref()
            .map(|address| EmailAddr {
                address: address.clone(),
            })
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<EmailAddr>::deserialize(d)?.map(|e| e.address))
    }
}
