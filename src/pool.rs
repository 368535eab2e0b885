//! Pool Store - Eligibility Queries
//!
//! The keeper never owns pool state. Pools are written by the trade
//! settlement side of the exchange; this module only reads them back,
//! filtered down to the ones that still have outstanding trades and
//! therefore need an on-chain maintenance call.

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::debug;

// ============================================
// POOL MODEL
// ============================================

/// One liquidity pool as stored by the exchange backend.
///
/// Amount fields are decimal strings of arbitrary-precision integers.
/// They are kept as strings end to end; parse with [`Pool::token_amount_raw`]
/// when a numeric value is needed. Never parse them as floats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    /// Unique pair identifier within the store.
    pub pair_id: String,

    /// Owner address.
    pub user: String,

    /// Base token balance (decimal string).
    pub token_amount: String,

    /// Derivative token balance (decimal string).
    pub d_token_amount: String,

    /// Count of trades waiting for on-chain settlement.
    /// A pool is eligible for maintenance iff this is > 0.
    #[serde(default)]
    pub outstanding_trades: u64,
}

impl Pool {
    pub fn is_eligible(&self) -> bool {
        self.outstanding_trades > 0
    }

    /// Parse the base token balance into a U256.
    pub fn token_amount_raw(&self) -> Result<U256, SelectionError> {
        U256::from_str(&self.token_amount)
            .map_err(|e| SelectionError::Malformed(format!("tokenAmount: {e}")))
    }

    /// Parse the derivative token balance into a U256.
    pub fn d_token_amount_raw(&self) -> Result<U256, SelectionError> {
        U256::from_str(&self.d_token_amount)
            .map_err(|e| SelectionError::Malformed(format!("dTokenAmount: {e}")))
    }
}

// ============================================
// ERRORS
// ============================================

/// Failure to obtain the eligible-pool list.
///
/// This is the only error that aborts a whole maintenance cycle: with no
/// pool list there is nothing to process. Everything past selection is
/// per-pool data, not a fault.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("pool store unreachable: {0}")]
    Unreachable(String),

    #[error("pool store returned a malformed response: {0}")]
    Malformed(String),
}

// ============================================
// STORE CONTRACT
// ============================================

/// Read-only view of the pool store.
///
/// `find_eligible_pools` must return `Ok(vec![])` for an empty result set -
/// an exchange with no pending trades is the normal idle state, not an error.
/// The returned order is the store's order and the pipeline preserves it.
#[async_trait]
pub trait PoolStore: Send + Sync {
    async fn find_eligible_pools(&self) -> Result<Vec<Pool>, SelectionError>;
}

// ============================================
// GRAPHQL-BACKED STORE
// ============================================

const ELIGIBLE_POOLS_QUERY: &str = r#"
query EligiblePools {
  pools(where: { outstandingTrades_gt: 0 }) {
    pairId
    user
    tokenAmount
    dTokenAmount
    outstandingTrades
  }
}"#;

/// Pool store backed by the exchange's GraphQL CRUD API.
pub struct GraphqlPoolStore {
    client: reqwest::Client,
    endpoint: String,
}

impl GraphqlPoolStore {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl PoolStore for GraphqlPoolStore {
    async fn find_eligible_pools(&self) -> Result<Vec<Pool>, SelectionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": ELIGIBLE_POOLS_QUERY }))
            .send()
            .await
            .map_err(|e| SelectionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SelectionError::Unreachable(format!(
                "pool store responded with HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SelectionError::Unreachable(e.to_string()))?;

        let pools = parse_pools_response(&body)?;
        debug!("pool store returned {} eligible pools", pools.len());
        Ok(pools)
    }
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    data: Option<PoolsData>,
    errors: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    pools: Vec<Pool>,
}

/// Parse a GraphQL pools response body. Split out from the HTTP call so the
/// wire-shape handling is testable without a server.
fn parse_pools_response(body: &str) -> Result<Vec<Pool>, SelectionError> {
    let response: PoolsResponse =
        serde_json::from_str(body).map_err(|e| SelectionError::Malformed(e.to_string()))?;

    if let Some(errors) = response.errors {
        if !errors.is_empty() {
            return Err(SelectionError::Malformed(format!(
                "graphql errors: {}",
                serde_json::to_string(&errors).unwrap_or_default()
            )));
        }
    }

    match response.data {
        Some(data) => Ok(data.pools),
        None => Err(SelectionError::Malformed(
            "response carried neither data nor errors".to_string(),
        )),
    }
}

// ============================================
// TESTS
// ============================================
