//! Ingestion pipeline
//!
//! CACHE? → FETCH → RULES → BATCH CLASSIFY → MASK → CACHE WRITE
//!
//! One model round trip per ingestion, regardless of how many transactions
//! need classification.

use crate::categorizer::BatchCategorizer;
use crate::error::LedgerError;
use crate::llm::{LanguageModel, TokenUsage};
use crate::masking::mask_pii;
use crate::models::{
    Bucket, CacheSnapshot, Category, ProcessedTransaction, RawTransaction, FALLBACK_CATEGORY,
};
use crate::rules::{PreClassifier, RuleOutcome};
use crate::session::Session;
use crate::source::TransactionSource;
use crate::Result;
use chrono::{Duration, Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Length of the trailing fetch window, ending today
pub const FETCH_WINDOW_DAYS: i64 = 30;

pub fn fetch_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today - Duration::days(FETCH_WINDOW_DAYS), today)
}

/// A transaction whose category is settled but whose name is still raw
struct Resolved<'a> {
    raw: &'a RawTransaction,
    bucket: Bucket,
    category: Category,
    amount: f64,
}

impl Resolved<'_> {
    fn into_processed(self) -> ProcessedTransaction {
        ProcessedTransaction {
            date: self.raw.date.to_string(),
            name: mask_pii(&self.raw.name),
            amount: self.amount,
            category: self.category,
        }
    }
}

/// A snapshot plus the model tokens spent producing it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingestion {
    pub snapshot: CacheSnapshot,
    pub usage: TokenUsage,
}

pub struct TransactionPipeline {
    source: Arc<dyn TransactionSource>,
    categorizer: BatchCategorizer,
}

impl TransactionPipeline {
    pub fn new(source: Arc<dyn TransactionSource>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            source,
            categorizer: BatchCategorizer::new(model),
        }
    }

    /// Processed transactions for the session's linked account.
    ///
    /// A cached snapshot is returned verbatim. Otherwise the trailing window
    /// is fetched, classified, masked and cached. Nothing is cached when the
    /// fetch fails.
    pub async fn get_processed_transactions(&self, session: &Session) -> Result<CacheSnapshot> {
        Ok(self.load(session).await?.snapshot)
    }

    /// Same as `get_processed_transactions`, also reporting the tokens spent.
    /// A cache hit costs nothing.
    pub async fn load(&self, session: &Session) -> Result<Ingestion> {
        if let Some(snapshot) = session.cache().read().await? {
            debug!(transactions = snapshot.len(), "Serving transactions from cache");
            return Ok(Ingestion {
                snapshot,
                usage: TokenUsage::default(),
            });
        }

        let access_token = session
            .access_token()
            .await
            .filter(|t| !t.trim().is_empty())
            .ok_or(LedgerError::NoAccessToken)?;

        let ingestion = self
            .ingest(&access_token, Local::now().date_naive())
            .await?;

        session.cache().write(&ingestion.snapshot).await?;
        Ok(ingestion)
    }

    /// Fetch and process one window without touching the cache
    pub async fn ingest(&self, access_token: &str, today: NaiveDate) -> Result<Ingestion> {
        let (start_date, end_date) = fetch_window(today);

        let raw = self
            .source
            .fetch(access_token, start_date, end_date)
            .await
            .map_err(|e| match e {
                LedgerError::TransactionFetch(_) => e,
                other => LedgerError::TransactionFetch(other.to_string()),
            })?;

        info!(
            fetched = raw.len(),
            %start_date,
            %end_date,
            "Fetched transactions, classifying"
        );

        Ok(self.process(&raw).await)
    }

    /// Classify and mask a batch of raw transactions.
    ///
    /// Incoming keeps input order. Outgoing holds the rule-decided entries in
    /// input order followed by the model-classified leftovers in input order.
    pub async fn process(&self, raw: &[RawTransaction]) -> Ingestion {
        let mut decided = Vec::with_capacity(raw.len());
        let mut leftovers = Vec::new();

        for tx in raw {
            match PreClassifier::classify(tx) {
                RuleOutcome::Decided {
                    bucket,
                    category,
                    amount,
                } => decided.push(Resolved {
                    raw: tx,
                    bucket,
                    category,
                    amount,
                }),
                RuleOutcome::Undecided => leftovers.push(tx),
            }
        }

        let names: Vec<String> = leftovers.iter().map(|t| t.name.clone()).collect();
        let categorized = self.categorizer.categorize(&names).await;
        let category_map = categorized.categories;

        debug!(
            by_rule = decided.len(),
            by_model = leftovers.len(),
            "Classification complete"
        );

        let classified = leftovers.into_iter().map(|tx| {
            let category = category_map.get(&tx.name).copied().unwrap_or_else(|| {
                warn!("Classifier map missed a name, using fallback");
                FALLBACK_CATEGORY
            });
            Resolved {
                raw: tx,
                bucket: Bucket::Outgoing,
                category,
                amount: tx.amount,
            }
        });

        // names are masked only now that every category is settled
        let mut snapshot = CacheSnapshot::default();
        for resolved in decided.into_iter().chain(classified) {
            match resolved.bucket {
                Bucket::Incoming => snapshot.incoming.push(resolved.into_processed()),
                Bucket::Outgoing => snapshot.outgoing.push(resolved.into_processed()),
            }
        }

        Ingestion {
            snapshot,
            usage: categorized.usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::source::StaticSource;
    use crate::cache::CACHE_KEY;
    use crate::store::{InMemoryStore, KeyValueStore};
    use serde_json::{json, Value};

    /// Reads work, every write fails
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.0.get(key).await
        }

        async fn put(&self, _key: &str, _value: &Value) -> Result<()> {
            Err(LedgerError::Storage("disk full".to_string()))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key).await
        }
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    fn tx(name: &str, amount: f64) -> RawTransaction {
        RawTransaction::new(today(), name, amount)
    }

    fn scenario() -> Vec<RawTransaction> {
        vec![
            tx("Direct Deposit Co", -1000.0),
            tx("Coffee Shop", 4.50),
            tx("CD Deposit", 200.0),
        ]
    }

    fn linked_session() -> Session {
        Session::with_access_token(Arc::new(InMemoryStore::new()), "access-sandbox-1")
    }

    #[tokio::test]
    async fn test_scenario_split_and_order() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new([r#"[{"id": 1, "category": "Restaurants"}]"#]));
        let pipeline = TransactionPipeline::new(source, model.clone());

        let snapshot = pipeline
            .get_processed_transactions(&linked_session())
            .await
            .unwrap();

        assert_eq!(snapshot.incoming.len(), 1);
        assert_eq!(snapshot.incoming[0].category, Category::Income);
        assert_eq!(snapshot.incoming[0].amount, 1000.0);

        assert_eq!(snapshot.outgoing.len(), 2);
        assert_eq!(snapshot.outgoing[0].category, Category::SavingsTransfers);
        assert_eq!(snapshot.outgoing[0].amount, 200.0);
        assert_eq!(snapshot.outgoing[1].category, Category::Restaurants);
        assert_eq!(snapshot.outgoing[1].amount, 4.50);
        assert_eq!(snapshot.outgoing[1].name, mask_pii("Coffee Shop"));

        // only the undecided name reached the model, in one call
        assert_eq!(model.call_count(), 1);
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("1. Coffee Shop"));
        assert!(!prompt.contains("CD Deposit"));
    }

    #[tokio::test]
    async fn test_every_transaction_lands_once_with_non_negative_amount() {
        let raw = vec![
            tx("Payroll Deposit", -500.0),
            tx("Refund XYZ", -42.50),
            tx("Interest Earned", -1.25),
            tx("Transfer to Savings", 300.0),
            tx("Grocery Mart", 88.10),
            tx("Card Check", 0.0),
            tx("Gym Membership", 40.0),
        ];
        let source = Arc::new(StaticSource::new(raw.clone()));
        let model = Arc::new(ScriptedModel::new(["not json at all"]));
        let pipeline = TransactionPipeline::new(source, model);

        let snapshot = pipeline.process(&raw).await.snapshot;

        assert_eq!(snapshot.incoming.len() + snapshot.outgoing.len(), raw.len());
        assert!(snapshot
            .incoming
            .iter()
            .chain(snapshot.outgoing.iter())
            .all(|t| t.amount >= 0.0));

        let incoming: Vec<Category> = snapshot.incoming.iter().map(|t| t.category).collect();
        assert_eq!(
            incoming,
            vec![Category::Income, Category::Refund, Category::Interest]
        );
        assert_eq!(snapshot.incoming[1].amount, 42.50);

        // model output was unusable: leftovers fall back, order preserved
        let outgoing: Vec<Category> = snapshot.outgoing.iter().map(|t| t.category).collect();
        assert_eq!(
            outgoing,
            vec![
                Category::SavingsTransfers,
                FALLBACK_CATEGORY,
                FALLBACK_CATEGORY,
                FALLBACK_CATEGORY,
            ]
        );
        assert_eq!(snapshot.outgoing[1].name, mask_pii("Grocery Mart"));
        assert_eq!(snapshot.outgoing[3].name, mask_pii("Gym Membership"));
    }

    #[tokio::test]
    async fn test_cached_snapshot_is_served_without_fetch() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new([r#"[{"id": 1, "category": "Restaurants"}]"#]));
        let pipeline = TransactionPipeline::new(source.clone(), model.clone());
        let session = linked_session();

        let first = pipeline.get_processed_transactions(&session).await.unwrap();
        let second = pipeline.get_processed_transactions(&session).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(source.call_count(), 1);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_relink_forces_refetch() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new([
            r#"[{"id": 1, "category": "Restaurants"}]"#,
            r#"[{"id": 1, "category": "Groceries"}]"#,
        ]));
        let pipeline = TransactionPipeline::new(source.clone(), model);
        let session = linked_session();

        pipeline.get_processed_transactions(&session).await.unwrap();
        session.link_account("access-sandbox-2").await.unwrap();
        let refreshed = pipeline.get_processed_transactions(&session).await.unwrap();

        assert_eq!(source.call_count(), 2);
        assert_eq!(source.calls()[1].0, "access-sandbox-2");
        assert_eq!(refreshed.outgoing[1].category, Category::Groceries);
    }

    #[tokio::test]
    async fn test_missing_token_does_not_fetch() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let pipeline = TransactionPipeline::new(source.clone(), model);

        let session = Session::new(Arc::new(InMemoryStore::new()));
        let err = pipeline.get_processed_transactions(&session).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoAccessToken));

        let blank = Session::with_access_token(Arc::new(InMemoryStore::new()), "  ");
        let err = pipeline.get_processed_transactions(&blank).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoAccessToken));

        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_surfaced_and_not_cached() {
        let source = Arc::new(StaticSource::failing("ITEM_LOGIN_REQUIRED"));
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let pipeline = TransactionPipeline::new(source, model.clone());
        let session = linked_session();

        let err = pipeline.get_processed_transactions(&session).await.unwrap_err();
        assert!(matches!(err, LedgerError::TransactionFetch(_)));
        assert!(session.cache().read().await.unwrap().is_none());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_classifier_outage_still_caches_fallback() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        model.push_error("429 Too Many Requests");
        let pipeline = TransactionPipeline::new(source, model);
        let session = linked_session();

        let snapshot = pipeline.get_processed_transactions(&session).await.unwrap();
        assert_eq!(snapshot.outgoing[1].category, FALLBACK_CATEGORY);
        assert_eq!(session.cache().read().await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_fetch_uses_trailing_thirty_days() {
        let source = Arc::new(StaticSource::new(vec![]));
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let pipeline = TransactionPipeline::new(source.clone(), model.clone());

        let anchor = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let ingestion = pipeline.ingest("tok", anchor).await.unwrap();
        let snapshot = ingestion.snapshot;

        assert!(snapshot.is_empty());
        let (_, start, end) = source.calls()[0].clone();
        assert_eq!(end, anchor);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        // nothing to classify, no model call
        assert_eq!(model.call_count(), 0);
        assert_eq!(ingestion.usage, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_surfaced_without_fetch() {
        let store = Arc::new(InMemoryStore::new());
        store.put(CACHE_KEY, &json!({"incoming": 1})).await.unwrap();

        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let pipeline = TransactionPipeline::new(source.clone(), model.clone());
        let session = Session::with_access_token(store, "tok");

        let err = pipeline.get_processed_transactions(&session).await.unwrap_err();
        assert_eq!(err.kind(), "STORAGE_ERROR");
        assert_eq!(source.call_count(), 0);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_surfaced() {
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new([r#"[{"id": 1, "category": "Restaurants"}]"#]));
        let pipeline = TransactionPipeline::new(source.clone(), model);
        let session = Session::with_access_token(Arc::new(ReadOnlyStore(InMemoryStore::new())), "tok");

        let err = pipeline.get_processed_transactions(&session).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(source.call_count(), 1);
        assert!(session.cache().read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_reports_classifier_tokens_once() {
        let reply = r#"[{"id": 1, "category": "Restaurants"}]"#;
        let source = Arc::new(StaticSource::new(scenario()));
        let model = Arc::new(ScriptedModel::new([reply]));
        let pipeline = TransactionPipeline::new(source, model.clone());
        let session = linked_session();

        let fresh = pipeline.load(&session).await.unwrap();
        assert_eq!(fresh.usage, TokenUsage::estimate(&model.prompts()[0], reply));

        let cached = pipeline.load(&session).await.unwrap();
        assert_eq!(cached.snapshot, fresh.snapshot);
        assert_eq!(cached.usage, TokenUsage::default());
    }
}
