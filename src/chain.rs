//! Chain Client - Maintenance Transaction Submission
//!
//! Signs and submits one `maintenance(pairId)` call to the router contract
//! per eligible pool, then tracks the transaction to a receipt. Submission
//! can fail synchronously (node unreachable, tx rejected); the confirmation
//! wait is left unbounded here and bounded by the pipeline's timeout.

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;

// ============================================
// ROUTER INTERFACE
// ============================================

sol! {
    /// Exchange router. `maintenance` settles the outstanding trades of one
    /// pool; the keeper is its only caller.
    interface IRouter {
        function maintenance(string calldata pairId) external;
    }
}

// ============================================
// TYPES
// ============================================

/// Handle for one in-flight maintenance transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub pair_id: String,
    pub tx_hash: TxHash,
}

/// What the chain reported once a submitted transaction reached a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    Failed(String),
}

/// A submission that never made it on-chain. Per-pool and recorded, never
/// propagated: one pool's bad nonce must not abort the batch.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

// ============================================
// CLIENT CONTRACT
// ============================================

/// Submit-and-track contract against the chain.
///
/// `await_confirmation` is unbounded by design: the execution pipeline wraps
/// it in `tokio::time::timeout` so the confirmation bound is enforced the
/// same way for every implementation, mocks included.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn submit(&self, pair_id: &str) -> Result<SubmissionHandle, SubmissionError>;

    async fn await_confirmation(&self, handle: &SubmissionHandle) -> ConfirmationStatus;
}

// ============================================
// ROUTER CLIENT
// ============================================

/// Production chain client: alloy HTTP provider with a wallet filler, one
/// EOA signing every maintenance call.
pub struct RouterClient {
    provider: DynProvider,
    router: Address,
    receipt_poll_interval: Duration,
}

impl RouterClient {
    pub fn new(config: &Config) -> Result<Self> {
        let key = config
            .private_key
            .as_deref()
            .ok_or_else(|| eyre!("PRIVATE_KEY is required to submit maintenance transactions"))?;

        let signer = PrivateKeySigner::from_str(key.trim_start_matches("0x"))
            .map_err(|e| eyre!("failed to parse PRIVATE_KEY: {e}"))?;
        info!("keeper signer loaded: {:?}", signer.address());

        let router = Address::from_str(&config.router_address)
            .map_err(|e| eyre!("failed to parse ROUTER_ADDRESS: {e}"))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(config.rpc_url.parse()?)
            .erased();

        Ok(Self {
            provider,
            router,
            receipt_poll_interval: config.receipt_poll_interval,
        })
    }

    /// ABI-encoded calldata for `maintenance(pairId)`.
    fn maintenance_calldata(pair_id: &str) -> Bytes {
        let call = IRouter::maintenanceCall {
            pairId: pair_id.to_string(),
        };
        Bytes::from(call.abi_encode())
    }
}

#[async_trait]
impl ChainClient for RouterClient {
    async fn submit(&self, pair_id: &str) -> Result<SubmissionHandle, SubmissionError> {
        let tx = TransactionRequest::default()
            .to(self.router)
            .input(Self::maintenance_calldata(pair_id).into());

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| SubmissionError::Rpc(e.to_string()))?;

        let tx_hash = *pending.tx_hash();
        info!("maintenance transaction sent for pool {pair_id}: {tx_hash}");

        Ok(SubmissionHandle {
            pair_id: pair_id.to_string(),
            tx_hash,
        })
    }

    async fn await_confirmation(&self, handle: &SubmissionHandle) -> ConfirmationStatus {
        // Poll for the receipt until the caller's timeout cuts us off.
        // Transient RPC errors are worth retrying inside the bound.
        loop {
            match self.provider.get_transaction_receipt(handle.tx_hash).await {
                Ok(Some(receipt)) => {
                    return if receipt.status() {
                        debug!(
                            "maintenance transaction mined for pool {}: {}",
                            handle.pair_id, handle.tx_hash
                        );
                        ConfirmationStatus::Confirmed
                    } else {
                        ConfirmationStatus::Failed("transaction reverted on-chain".to_string())
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("receipt poll failed for {}: {e}", handle.tx_hash);
                }
            }

            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

// ============================================
// TESTS
// ============================================
