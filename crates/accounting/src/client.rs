//! Accounting API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use ledgersync_core::client::{
    AccountingClient, ClientError, CustomerParams, Deposit, ExternalDocument, ItemOptions,
    RefundReceipt, SalesReceipt,
};
use ledgersync_shared::config::AccountingConfig;

use crate::fault::{entity_id, escape, fault_message};

/// Client for a QuickBooks-style `/v3/company/{realm}` REST API.
#[derive(Clone)]
pub struct QboClient {
    http: Client,
    base_url: String,
    realm_id: String,
    access_token: String,
    minor_version: u32,
}

impl QboClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &AccountingConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            realm_id: config.realm_id.clone(),
            access_token: config.access_token.clone(),
            minor_version: config.minor_version,
        })
    }

    fn company_url(&self, resource: &str) -> String {
        format!("{}/v3/company/{}/{resource}", self.base_url, self.realm_id)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .query(&[("minorversion", self.minor_version)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        debug!(status = %status, "Accounting API response");

        let value: Value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| {
                if status.is_success() {
                    ClientError::Decode(e.to_string())
                } else {
                    ClientError::Rejected {
                        status: status.as_u16(),
                        message: format!("HTTP {}", status.as_u16()),
                        detail: Some(Value::String(body.clone())),
                    }
                }
            })?
        };

        if status.is_success() {
            Ok(value)
        } else {
            Err(ClientError::Rejected {
                status: status.as_u16(),
                message: fault_message(&value, status.as_u16()),
                detail: Some(value),
            })
        }
    }

    async fn create<T: Serialize + Sync>(
        &self,
        resource: &str,
        entity: &str,
        body: &T,
    ) -> Result<ExternalDocument, ClientError> {
        let request = self.http.post(self.company_url(resource)).json(body);
        let response = self.send(request).await?;
        ExternalDocument::from_response(entity, response)
    }

    /// Runs a query and returns the matching entities.
    async fn query(&self, entity: &str, query: &str) -> Result<Vec<Value>, ClientError> {
        let request = self
            .http
            .get(self.company_url("query"))
            .query(&[("query", query)]);
        let response = self.send(request).await?;

        Ok(response["QueryResponse"][entity]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_name(&self, entity: &str, name: &str) -> Result<Option<String>, ClientError> {
        let query = format!(
            "SELECT Id, Name FROM {entity} WHERE Name = '{}'",
            escape(name)
        );
        let found = self.query(entity, &query).await?;
        Ok(found.first().and_then(entity_id))
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(err.to_string())
    }
}

#[async_trait]
impl AccountingClient for QboClient {
    async fn create_customer(&self, params: &CustomerParams) -> Result<String, ClientError> {
        Ok(self.create("customer", "Customer", params).await?.id)
    }

    async fn create_sales_receipt(
        &self,
        receipt: &SalesReceipt,
    ) -> Result<ExternalDocument, ClientError> {
        self.create("salesreceipt", "SalesReceipt", receipt).await
    }

    async fn create_refund_receipt(
        &self,
        receipt: &RefundReceipt,
    ) -> Result<ExternalDocument, ClientError> {
        self.create("refundreceipt", "RefundReceipt", receipt).await
    }

    async fn create_deposit(&self, deposit: &Deposit) -> Result<ExternalDocument, ClientError> {
        self.create("deposit", "Deposit", deposit).await
    }

    async fn query_account_by_name(&self, name: &str) -> Result<Option<String>, ClientError> {
        self.find_by_name("Account", name).await
    }

    async fn query_class_by_name(&self, name: &str) -> Result<Option<String>, ClientError> {
        self.find_by_name("Class", name).await
    }

    async fn get_or_create_item(
        &self,
        name: &str,
        options: &ItemOptions,
    ) -> Result<String, ClientError> {
        if let Some(id) = self.find_by_name("Item", name).await? {
            return Ok(id);
        }

        let mut item = json!({
            "Name": name,
            "Type": "Service",
        });
        if let Some(account) = &options.income_account_id {
            item["IncomeAccountRef"] = json!({ "value": account });
        }
        if let Some(description) = &options.description {
            item["Description"] = json!(description);
        }

        Ok(self.create("item", "Item", &item).await?.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgersync_core::client::{Line, Ref};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, timeout_secs: u64) -> QboClient {
        QboClient::new(&AccountingConfig {
            base_url: server.uri(),
            realm_id: "realm-1".to_string(),
            access_token: "test_token".to_string(),
            minor_version: 75,
            timeout_secs,
        })
        .unwrap()
    }

    fn receipt() -> SalesReceipt {
        SalesReceipt {
            customer_ref: Ref::id("58"),
            deposit_to_account_ref: Ref::named("4", "Undeposited Funds"),
            line: vec![Line::sales_item(
                dec!(100.00),
                Ref::id("7"),
                Ref::named("300", "Events"),
                None,
            )],
            total_amt: dec!(100.00),
            txn_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            private_note: None,
            currency_ref: Ref::id("USD"),
        }
    }

    #[tokio::test]
    async fn test_account_query_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/company/realm-1/query"))
            .and(query_param("minorversion", "75"))
            .and(query_param(
                "query",
                "SELECT Id, Name FROM Account WHERE Name = 'Bank Account'",
            ))
            .and(header("authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "QueryResponse": {"Account": [{"Id": "35", "Name": "Bank Account"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server, 5)
            .query_account_by_name("Bank Account")
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("35"));
    }

    #[tokio::test]
    async fn test_class_query_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/company/realm-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"QueryResponse": {}})))
            .mount(&server)
            .await;

        let id = client(&server, 5).query_class_by_name("Tahoe").await.unwrap();
        assert_eq!(id, None);
    }

    #[tokio::test]
    async fn test_query_escapes_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param(
                "query",
                "SELECT Id, Name FROM Account WHERE Name = 'Owner''s Draw'",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "QueryResponse": {"Account": [{"Id": "50"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server, 5)
            .query_account_by_name("Owner's Draw")
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("50"));
    }

    #[tokio::test]
    async fn test_create_sales_receipt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/company/realm-1/salesreceipt"))
            .and(body_partial_json(json!({
                "TotalAmt": "100.00",
                "CustomerRef": {"value": "58"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "SalesReceipt": {"Id": "145", "SyncToken": "0", "TotalAmt": 100.0},
                "time": "2026-03-01T10:00:00.000-08:00"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let document = client(&server, 5)
            .create_sales_receipt(&receipt())
            .await
            .unwrap();
        assert_eq!(document.id, "145");
        assert_eq!(document.sync_token.as_deref(), Some("0"));
        assert_eq!(document.raw["time"], "2026-03-01T10:00:00.000-08:00");
    }

    #[tokio::test]
    async fn test_validation_fault_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/company/realm-1/salesreceipt"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "Fault": {
                    "Error": [{"Message": "Business Validation Error", "Detail": "Invalid account"}],
                    "type": "ValidationFault"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server, 5)
            .create_sales_receipt(&receipt())
            .await
            .unwrap_err();
        match err {
            ClientError::Rejected {
                status,
                message,
                detail,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid account");
                assert_eq!(detail.unwrap()["Fault"]["type"], "ValidationFault");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_or_create_item_creates_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/company/realm-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"QueryResponse": {}})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/company/realm-1/item"))
            .and(body_partial_json(json!({
                "Name": "Events",
                "Type": "Service",
                "IncomeAccountRef": {"value": "79"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Item": {"Id": "9", "Name": "Events"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = ItemOptions {
            income_account_id: Some("79".to_string()),
            description: None,
        };
        let id = client(&server, 5)
            .get_or_create_item("Events", &options)
            .await
            .unwrap();
        assert_eq!(id, "9");
    }

    #[tokio::test]
    async fn test_get_or_create_item_reuses_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/company/realm-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "QueryResponse": {"Item": [{"Id": "7", "Name": "Events"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let id = client(&server, 5)
            .get_or_create_item("Events", &ItemOptions::default())
            .await
            .unwrap();
        assert_eq!(id, "7");
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"QueryResponse": {}}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(&server, 1)
            .query_class_by_name("Events")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }
}
