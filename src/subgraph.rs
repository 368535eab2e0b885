//! Subgraph Sync Cron
//!
//! Polls the indexer's `_meta` endpoint on a short interval so the keeper's
//! logs always show how far behind the subgraph is. Same single-flight
//! guard as the maintenance scheduler, but a single request per tick: there
//! is no batch here and nothing to partially fail.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const META_QUERY: &str = r#"
query Meta {
  _meta {
    block { number hash }
    deployment
    hasIndexingErrors
  }
}"#;

// ============================================
// WIRE TYPES
// ============================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphMeta {
    pub block: MetaBlock,
    pub deployment: String,
    pub has_indexing_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaBlock {
    pub number: u64,
    pub hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    data: Option<MetaData>,
}

#[derive(Debug, Deserialize)]
struct MetaData {
    #[serde(rename = "_meta")]
    meta: SubgraphMeta,
}

fn parse_meta_response(body: &str) -> eyre::Result<SubgraphMeta> {
    let response: MetaResponse = serde_json::from_str(body)?;
    response
        .data
        .map(|d| d.meta)
        .ok_or_else(|| eyre::eyre!("subgraph response carried no data"))
}

// ============================================
// CRON
// ============================================

#[derive(Clone)]
pub struct SubgraphSync {
    client: reqwest::Client,
    endpoint: String,
    interval: Duration,
    guard: Arc<Mutex<()>>,
}

impl SubgraphSync {
    pub fn new(endpoint: String, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            interval,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run(&self) {
        info!("subgraph sync started, polling every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let sync = self.clone();
            tokio::spawn(async move {
                sync.tick().await;
            });
        }
    }

    pub async fn tick(&self) {
        let _sync_guard = match self.guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("subgraph sync tick skipped: previous fetch still in progress");
                return;
            }
        };

        match self.fetch_meta().await {
            Ok(meta) => {
                if meta.has_indexing_errors {
                    warn!(
                        "subgraph {} reports indexing errors at block {}",
                        meta.deployment, meta.block.number
                    );
                } else {
                    info!(
                        "subgraph {} indexed through block {}",
                        meta.deployment, meta.block.number
                    );
                }
            }
            Err(e) => {
                warn!("subgraph meta fetch failed: {e}");
            }
        }
    }

    async fn fetch_meta(&self) -> eyre::Result<SubgraphMeta> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": META_QUERY }))
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        parse_meta_response(&body)
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_response() {
        let body = r#"{"data":{"_meta":{
            "block":{"number":21450012,"hash":"0xabc"},
            "deployment":"QmRz2AbCdEf",
            "hasIndexingErrors":false
        }}}"#;

        let meta = parse_meta_response(body).unwrap();
        assert_eq!(meta.block.number, 21_450_012);
        assert_eq!(meta.deployment, "QmRz2AbCdEf");
        assert!(!meta.has_indexing_errors);
    }

    #[test]
    fn test_parse_meta_without_hash() {
        let body = r#"{"data":{"_meta":{
            "block":{"number":7},
            "deployment":"Qm",
            "hasIndexingErrors":true
        }}}"#;

        let meta = parse_meta_response(body).unwrap();
        assert_eq!(meta.block.number, 7);
        assert!(meta.block.hash.is_none());
        assert!(meta.has_indexing_errors);
    }

    #[test]
    fn test_parse_meta_missing_data() {
        assert!(parse_meta_response(r#"{"errors":[{"message":"nope"}]}"#).is_err());
    }
}
