//! Transaction sources
//!
//! The aggregator is an external collaborator: it returns raw transactions
//! for an access token and a date range. Its errors are opaque to the
//! pipeline and surface as `TransactionFetch`.

use crate::config::PlaidConfig;
use crate::error::LedgerError;
use crate::models::RawTransaction;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Trait for a raw transaction provider
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn fetch(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawTransaction>>;
}

//
// ================= Plaid =================
//

pub struct PlaidSource {
    client: Client,
    client_id: String,
    secret: String,
    base_url: String,
}

impl PlaidSource {
    pub fn new(config: &PlaidConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, mut body: Value) -> Result<Value> {
        body["client_id"] = json!(self.client_id);
        body["secret"] = json!(self.secret);

        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::TransactionFetch(format!("request to {} failed: {}", path, e)))?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| LedgerError::TransactionFetch(format!("invalid JSON response: {}", e)))?;

        if !status.is_success() {
            let code = body
                .get("error_code")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            return Err(LedgerError::TransactionFetch(format!(
                "aggregator returned {} for {}: {}",
                status, path, code
            )));
        }

        Ok(body)
    }

    /// Create a Link token for the front end to start the account-link flow.
    ///
    /// Link hands back a public token, which `exchange_public_token` turns
    /// into an access token.
    pub async fn create_link_token(&self, client_user_id: &str) -> Result<String> {
        let body = self
            .post_json("/link/token/create", link_token_request(client_user_id))
            .await?;
        info!("Link token created");
        required_str(&body, "link_token")
    }

    /// Exchange a Link public token for a long-lived access token.
    ///
    /// Returns `(access_token, item_id)`. Callers follow up with
    /// `Session::link_account`.
    pub async fn exchange_public_token(&self, public_token: &str) -> Result<(String, String)> {
        let body = self
            .post_json(
                "/item/public_token/exchange",
                json!({ "public_token": public_token }),
            )
            .await?;

        Ok((
            required_str(&body, "access_token")?,
            required_str(&body, "item_id")?,
        ))
    }
}

const LINK_CLIENT_NAME: &str = "Personal Finance Agent";

fn link_token_request(client_user_id: &str) -> Value {
    json!({
        "user": { "client_user_id": client_user_id },
        "client_name": LINK_CLIENT_NAME,
        "products": ["transactions"],
        "country_codes": ["CA"],
        "language": "en",
    })
}

fn required_str(body: &Value, name: &str) -> Result<String> {
    body.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::TransactionFetch(format!("missing '{}' in aggregator response", name)))
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<RawTransaction>,
}

#[async_trait]
impl TransactionSource for PlaidSource {
    async fn fetch(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawTransaction>> {
        debug!(%start_date, %end_date, "Fetching transactions from aggregator");

        let body = self
            .post_json(
                "/transactions/get",
                json!({
                    "access_token": access_token,
                    "start_date": start_date.to_string(),
                    "end_date": end_date.to_string(),
                }),
            )
            .await?;

        let parsed: TransactionsResponse = serde_json::from_value(body)
            .map_err(|e| LedgerError::TransactionFetch(format!("unexpected transactions payload: {}", e)))?;

        info!(count = parsed.transactions.len(), "Fetched transactions");
        Ok(parsed.transactions)
    }
}

//
// ================= Static source =================
//

/// Fixed in-memory source. Records every fetch it serves.
pub struct StaticSource {
    transactions: Vec<RawTransaction>,
    fail_with: Option<String>,
    calls: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl StaticSource {
    pub fn new(transactions: Vec<RawTransaction>) -> Self {
        Self {
            transactions,
            fail_with: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A source whose every fetch fails with the given message
    pub fn failing(message: &str) -> Self {
        Self {
            transactions: Vec::new(),
            fail_with: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, NaiveDate, NaiveDate)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl TransactionSource for StaticSource {
    async fn fetch(
        &self,
        access_token: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<RawTransaction>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((access_token.to_string(), start_date, end_date));
        }

        match &self.fail_with {
            Some(message) => Err(LedgerError::TransactionFetch(message.clone())),
            None => Ok(self
                .transactions
                .iter()
                .filter(|t| t.date >= start_date && t.date <= end_date)
                .cloned()
                .collect()),
        }
    }
}
