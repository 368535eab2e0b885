//! Keeper Configuration
//!
//! All knobs come from environment variables (with a `.env` file picked up
//! via dotenvy), each with a sane default where one exists. A TOML file can
//! stand in for the environment in deployments that prefer files.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// Chain RPC endpoint (Alchemy/Infura recommended)
    pub rpc_url: String,

    /// Chain ID (1 = Ethereum Mainnet)
    pub chain_id: u64,

    // ========== Signing ==========
    /// Keeper signing key (KEEP SECRET!)
    pub private_key: Option<String>,

    /// Router contract address - target of every maintenance call
    pub router_address: String,

    // ========== Scheduling ==========
    /// Maintenance cycle cadence
    pub maintenance_interval: Duration,

    /// Subgraph sync cadence
    pub subgraph_sync_interval: Duration,

    /// Upper bound on waiting for one transaction's confirmation
    pub confirmation_timeout: Duration,

    /// How often to poll for a receipt while inside the bound
    pub receipt_poll_interval: Duration,

    // ========== Endpoints ==========
    /// GraphQL endpoint of the exchange CRUD API (pool store)
    pub pool_store_url: String,

    /// Subgraph indexer endpoint (empty disables the sync cron)
    pub subgraph_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),

            private_key: env::var("PRIVATE_KEY").ok(),
            router_address: env::var("ROUTER_ADDRESS").unwrap_or_default(),

            maintenance_interval: secs_from_env("MAINTENANCE_INTERVAL_SECS", 60),
            subgraph_sync_interval: secs_from_env("SUBGRAPH_SYNC_INTERVAL_SECS", 5),
            confirmation_timeout: secs_from_env("CONFIRMATION_TIMEOUT_SECS", 120),
            receipt_poll_interval: secs_from_env("RECEIPT_POLL_INTERVAL_SECS", 3),

            pool_store_url: env::var("POOL_STORE_URL")
                .unwrap_or_else(|_| "http://localhost:3000/graphql".to_string()),
            subgraph_url: env::var("SUBGRAPH_URL").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration before the keeper starts submitting.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!(
                "Invalid RPC_URL - please set a valid Alchemy/Infura URL"
            ));
        }

        if self.private_key.is_none() {
            return Err(eyre::eyre!(
                "PRIVATE_KEY is required - the keeper signs every maintenance call"
            ));
        }

        if self.router_address.is_empty() {
            return Err(eyre::eyre!("ROUTER_ADDRESS is required"));
        }
        if self
            .router_address
            .parse::<alloy_primitives::Address>()
            .is_err()
        {
            return Err(eyre::eyre!(
                "ROUTER_ADDRESS is not a valid address: {}",
                self.router_address
            ));
        }

        if self.maintenance_interval.is_zero() {
            return Err(eyre::eyre!("MAINTENANCE_INTERVAL_SECS must be > 0"));
        }
        if self.subgraph_sync_interval.is_zero() {
            return Err(eyre::eyre!("SUBGRAPH_SYNC_INTERVAL_SECS must be > 0"));
        }
        if self.confirmation_timeout.is_zero() {
            return Err(eyre::eyre!("CONFIRMATION_TIMEOUT_SECS must be > 0"));
        }
        if self.receipt_poll_interval >= self.confirmation_timeout {
            return Err(eyre::eyre!(
                "RECEIPT_POLL_INTERVAL_SECS must be shorter than CONFIRMATION_TIMEOUT_SECS"
            ));
        }

        Ok(())
    }

    /// Print configuration summary.
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              DEX KEEPER - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:            {:^38} ║", self.chain_id);
        println!("║ Router:              {:^38} ║", self.router_address);
        println!("║ Signer Key:          {:^38} ║",
            if self.private_key.is_some() { "✓ Configured" } else { "✗ Not Set" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SCHEDULING                                                 ║");
        println!("║ • Maintenance tick:  {:>36}s ║", self.maintenance_interval.as_secs());
        println!("║ • Subgraph sync:     {:>36}s ║", self.subgraph_sync_interval.as_secs());
        println!("║ • Confirm timeout:   {:>36}s ║", self.confirmation_timeout.as_secs());
        println!("║ • Receipt poll:      {:>36}s ║", self.receipt_poll_interval.as_secs());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ENDPOINTS                                                  ║");
        println!("║ • Pool store:        {:^38} ║", truncate(&self.pool_store_url, 38));
        println!("║ • Subgraph:          {:^38} ║",
            match &self.subgraph_url {
                Some(url) => truncate(url, 38),
                None => "✗ Sync Disabled".to_string(),
            }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            chain_id: 1,
            private_key: None,
            router_address: String::new(),
            maintenance_interval: Duration::from_secs(60),
            subgraph_sync_interval: Duration::from_secs(5),
            confirmation_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(3),
            pool_store_url: "http://localhost:3000/graphql".to_string(),
            subgraph_url: None,
        }
    }
}

fn secs_from_env(key: &str, default: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max.saturating_sub(1)])
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            private_key: Some(
                "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
            ),
            router_address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_intervals() {
        let config = Config::default();
        assert_eq!(config.maintenance_interval, Duration::from_secs(60));
        assert_eq!(config.subgraph_sync_interval, Duration::from_secs(5));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_signing_key() {
        let mut config = valid_config();
        config.private_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_router_address() {
        let mut config = valid_config();
        config.router_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        config.router_address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = valid_config();
        config.maintenance_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.confirmation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_poll_must_fit_inside_timeout() {
        let mut config = valid_config();
        config.receipt_poll_interval = Duration::from_secs(300);
        assert!(config.validate().is_err());
    }
}
