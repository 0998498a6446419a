//! In-memory accounting system.
//!
//! Records every call and created document, and can be told to fail a
//! given operation. Used by the engine's tests and by embedders that want
//! a dry-run target.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use super::{
    AccountingClient, ClientError, CustomerParams, Deposit, ExternalDocument, ItemOptions,
    RefundReceipt, SalesReceipt,
};

/// Operations exposed by [`AccountingClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_customer`
    CreateCustomer,
    /// `create_sales_receipt`
    CreateSalesReceipt,
    /// `create_refund_receipt`
    CreateRefundReceipt,
    /// `create_deposit`
    CreateDeposit,
    /// `query_account_by_name`
    QueryAccount,
    /// `query_class_by_name`
    QueryClass,
    /// `get_or_create_item`
    GetOrCreateItem,
}

#[derive(Default)]
struct State {
    next_id: u64,
    accounts: HashMap<String, String>,
    classes: HashMap<String, String>,
    items: HashMap<String, String>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, ClientError>,
    customers: Vec<CustomerParams>,
    sales_receipts: Vec<SalesReceipt>,
    refund_receipts: Vec<RefundReceipt>,
    deposits: Vec<Deposit>,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn enter(&mut self, op: Operation) -> Result<(), ClientError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Fake [`AccountingClient`] backed by maps.
#[derive(Default)]
pub struct InMemoryAccounting {
    state: Mutex<State>,
}

impl InMemoryAccounting {
    /// Empty chart of accounts, no classes, no items.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chart of accounts and classes matching the default sync configuration.
    #[must_use]
    pub fn seeded() -> Self {
        let client = Self::new();
        for account in ["Undeposited Funds", "Bank Account", "Stripe Fees"] {
            client.add_account(account);
        }
        for class in ["Events", "Administration", "Tahoe", "Clear Lake"] {
            client.add_class(class);
        }
        client
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an account and returns its id.
    pub fn add_account(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.accounts.insert(name.to_string(), id.clone());
        id
    }

    /// Adds a class and returns its id.
    pub fn add_class(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.classes.insert(name.to_string(), id.clone());
        id
    }

    /// Adds an item and returns its id.
    pub fn add_item(&self, name: &str) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.items.insert(name.to_string(), id.clone());
        id
    }

    /// Id of a known account.
    pub fn account_id(&self, name: &str) -> Option<String> {
        self.lock().accounts.get(name).cloned()
    }

    /// Id of a known class.
    pub fn class_id(&self, name: &str) -> Option<String> {
        self.lock().classes.get(name).cloned()
    }

    /// Id of a known item.
    pub fn item_id(&self, name: &str) -> Option<String> {
        self.lock().items.get(name).cloned()
    }

    /// Makes every subsequent call of `op` fail with `err`.
    pub fn fail_on(&self, op: Operation, err: ClientError) {
        self.lock().failures.insert(op, err);
    }

    /// Stops failing `op`.
    pub fn clear_failure(&self, op: Operation) {
        self.lock().failures.remove(&op);
    }

    /// Number of calls made to `op`, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Customers created so far.
    pub fn customers(&self) -> Vec<CustomerParams> {
        self.lock().customers.clone()
    }

    /// Sales receipts created so far.
    pub fn sales_receipts(&self) -> Vec<SalesReceipt> {
        self.lock().sales_receipts.clone()
    }

    /// Refund receipts created so far.
    pub fn refund_receipts(&self) -> Vec<RefundReceipt> {
        self.lock().refund_receipts.clone()
    }

    /// Deposits created so far.
    pub fn deposits(&self) -> Vec<Deposit> {
        self.lock().deposits.clone()
    }
}

fn document(entity: &str, id: &str, total: impl ToString) -> Result<ExternalDocument, ClientError> {
    let raw = json!({
        entity: {
            "Id": id,
            "SyncToken": "0",
            "TotalAmt": total.to_string(),
        }
    });
    ExternalDocument::from_response(entity, raw)
}

#[async_trait]
impl AccountingClient for InMemoryAccounting {
    async fn create_customer(&self, params: &CustomerParams) -> Result<String, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::CreateCustomer)?;
        state.customers.push(params.clone());
        Ok(state.allocate_id())
    }

    async fn create_sales_receipt(
        &self,
        receipt: &SalesReceipt,
    ) -> Result<ExternalDocument, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::CreateSalesReceipt)?;
        state.sales_receipts.push(receipt.clone());
        let id = state.allocate_id();
        document("SalesReceipt", &id, receipt.total_amt)
    }

    async fn create_refund_receipt(
        &self,
        receipt: &RefundReceipt,
    ) -> Result<ExternalDocument, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::CreateRefundReceipt)?;
        state.refund_receipts.push(receipt.clone());
        let id = state.allocate_id();
        document("RefundReceipt", &id, receipt.total_amt)
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<ExternalDocument, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::CreateDeposit)?;
        state.deposits.push(deposit.clone());
        let id = state.allocate_id();
        document("Deposit", &id, deposit.total_amt)
    }

    async fn query_account_by_name(&self, name: &str) -> Result<Option<String>, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::QueryAccount)?;
        Ok(state.accounts.get(name).cloned())
    }

    async fn query_class_by_name(&self, name: &str) -> Result<Option<String>, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::QueryClass)?;
        Ok(state.classes.get(name).cloned())
    }

    async fn get_or_create_item(
        &self,
        name: &str,
        _options: &ItemOptions,
    ) -> Result<String, ClientError> {
        let mut state = self.lock();
        state.enter(Operation::GetOrCreateItem)?;
        if let Some(id) = state.items.get(name) {
            return Ok(id.clone());
        }
        let id = state.allocate_id();
        state.items.insert(name.to_string(), id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_call_counting() {
        let client = InMemoryAccounting::seeded();
        let id = client.query_class_by_name("Events").await.unwrap();
        assert_eq!(id, client.class_id("Events"));
        assert_eq!(client.query_class_by_name("Nope").await.unwrap(), None);
        assert_eq!(client.calls(Operation::QueryClass), 2);
        assert_eq!(client.calls(Operation::QueryAccount), 0);
    }

    #[tokio::test]
    async fn test_get_or_create_item_is_stable() {
        let client = InMemoryAccounting::new();
        let first = client
            .get_or_create_item("Events", &ItemOptions::default())
            .await
            .unwrap();
        let second = client
            .get_or_create_item("Events", &ItemOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(client.item_id("Events"), Some(first));
    }

    #[tokio::test]
    async fn test_fail_on_operation() {
        let client = InMemoryAccounting::new();
        client.fail_on(Operation::CreateCustomer, ClientError::Timeout);

        let params = CustomerParams {
            display_name: "A".into(),
            email: None,
        };
        assert!(matches!(
            client.create_customer(&params).await,
            Err(ClientError::Timeout)
        ));
        assert!(client.customers().is_empty());

        client.clear_failure(Operation::CreateCustomer);
        assert!(client.create_customer(&params).await.is_ok());
        assert_eq!(client.calls(Operation::CreateCustomer), 2);
    }
}
