// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::broker::WsListenerConfig;
use crate::chain_client::CasinoChainClient;
use crate::deposit_validator::DepositPolicy;
use crate::key_bag::{KeyBag, SigningRole};
use crate::metrics::OracleMetrics;
use crate::offset_store::OffsetStore;
use crate::retry::RetryPolicy;
use anyhow::anyhow;
use casino_oracle_config::Config;
use casino_oracle_keys::keypair_file::{read_eos_key, read_rsa_key};
use daobet_types::{Checksum256, Name, PublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/casino/config.yaml";

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    // The port that the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    // Default tracing filter, RUST_LOG takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    80
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrokerConfig {
    // File holding the offset to resume the event topic from.
    pub topic_offset_path: PathBuf,
    pub url: String,
    pub topic_id: u32,
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_reconnection_delay_secs")]
    pub reconnection_delay_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_reconnection_attempts() -> u32 {
    3
}

fn default_reconnection_delay_secs() -> u64 {
    3
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockchainConfig {
    // Key co-signing deposit transactions.
    pub deposit_key_path: PathBuf,
    // Key signing sgdicesecond transactions.
    pub signidice_key_path: PathBuf,
    pub signidice_account: Name,
    // PEM file with the RSA key used for signidice digests.
    pub rsa_key_path: PathBuf,
    // Chain API endpoint.
    pub url: String,
    pub chain_id: Checksum256,
    pub platform_account: Name,
    pub platform_pub_key: PublicKey,
    pub casino_account: Name,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    #[serde(default = "default_retry_amount")]
    pub retry_amount: usize,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry_amount: default_retry_amount(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_retry_amount() -> usize {
    3
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    3
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BonusConfig {
    pub admin_account: Name,
    // Without it every bonus administration push fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_key_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CasinoNodeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub blockchain: BlockchainConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub bonus: BonusConfig,
}

impl Config for CasinoNodeConfig {}

impl CasinoNodeConfig {
    /// Loads key material and the stored offset, and builds the chain client.
    /// Every failure here is fatal for the node.
    pub async fn validate(
        &self,
        metrics: Arc<OracleMetrics>,
    ) -> anyhow::Result<CasinoServerConfig> {
        info!("Starting config validation");
        let blockchain = &self.blockchain;

        let deposit_key = read_eos_key(&blockchain.deposit_key_path)?;
        let signidice_key = read_eos_key(&blockchain.signidice_key_path)?;
        let mut keys = KeyBag::new()
            .with_key(SigningRole::Deposit, deposit_key)
            .with_key(SigningRole::Signidice, signidice_key);
        match &self.bonus.admin_key_path {
            Some(path) => keys.insert(SigningRole::BonusAdmin, read_eos_key(path)?),
            None => warn!("No bonus admin key configured, bonus administration is disabled"),
        }
        info!("Loaded signing keys: {:?}", keys);

        let rsa_key = read_rsa_key(&blockchain.rsa_key_path)?;

        let offset_store = OffsetStore::new(&self.broker.topic_offset_path);
        let initial_offset = offset_store
            .read()
            .await
            .map_err(|e| anyhow!("Failed to read initial offset: {}", e))?;
        info!("Resuming event topic from offset {}", initial_offset);

        if self.http.retry_amount == 0 {
            return Err(anyhow!("http retry-amount must be at least 1"));
        }

        let chain_client = Arc::new(CasinoChainClient::with_metrics(&blockchain.url, metrics));
        info!("Config validation complete");
        Ok(CasinoServerConfig {
            server_port: self.server.port,
            keys,
            rsa_key: Arc::new(rsa_key),
            deposit_policy: DepositPolicy {
                casino_account: blockchain.casino_account,
                platform_account: blockchain.platform_account,
                platform_pub_key: blockchain.platform_pub_key,
                chain_id: blockchain.chain_id,
            },
            signidice_account: blockchain.signidice_account,
            casino_account: blockchain.casino_account,
            bonus_admin_account: self.bonus.admin_account,
            retry_policy: RetryPolicy::from(&self.http),
            chain_client,
            offset_store,
            initial_offset,
            topic_id: self.broker.topic_id,
            broker: WsListenerConfig {
                url: self.broker.url.clone(),
                token: self.broker.token.clone(),
                reconnection_attempts: self.broker.reconnection_attempts,
                reconnection_delay: Duration::from_secs(self.broker.reconnection_delay_secs),
            },
        })
    }
}

pub struct CasinoServerConfig {
    pub server_port: u16,
    pub keys: KeyBag,
    pub rsa_key: Arc<RsaPrivateKey>,
    pub deposit_policy: DepositPolicy,
    pub signidice_account: Name,
    pub casino_account: Name,
    pub bonus_admin_account: Name,
    pub retry_policy: RetryPolicy,
    pub chain_client: Arc<CasinoChainClient>,
    pub offset_store: OffsetStore,
    pub initial_offset: u64,
    pub topic_id: u32,
    pub broker: WsListenerConfig,
}
