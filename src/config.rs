use alloy_primitives::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{str::FromStr, time::Duration};

use crate::{
    error::{AppError, AppResult},
    execution::EvmConfig,
    ledger::LedgerConfig,
    settlement::{gas::gwei_to_wei, CoordinatorConfig, LoopConfig},
};

/// Optional config file, looked up next to the binary's working directory
const CONFIG_FILE: &str = "reconciler";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub contract_address: String,
    pub sender_address: String,
    pub max_gas_price_gwei: Decimal,
    pub poll_interval_seconds: u64,
    pub gas_recheck_interval_seconds: u64,
    pub receipt_timeout_seconds: u64,
    pub receipt_poll_interval_millis: u64,
    pub billing_period_seconds: i64,
    pub payment_gas_limit: u64,
    pub attempt_history_limit: usize,
    pub webhook_host: String,
    pub webhook_port: u16,
}

impl Config {
    /// Defaults, then `reconciler.toml` if present, then environment variables
    pub fn from_env() -> AppResult<Self> {
        let settings = config::Config::builder()
            .set_default("rpc_url", "http://127.0.0.1:8545")?
            .set_default("max_gas_price_gwei", "20")?
            .set_default("poll_interval_seconds", 60)?
            .set_default("gas_recheck_interval_seconds", 300)?
            .set_default("receipt_timeout_seconds", 120)?
            .set_default("receipt_poll_interval_millis", 2000)?
            .set_default("billing_period_seconds", 30 * 24 * 60 * 60)?
            .set_default("payment_gas_limit", 200_000)?
            .set_default("attempt_history_limit", 256)?
            .set_default("webhook_host", "0.0.0.0")?
            .set_default("webhook_port", 5000)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.contract()?;
        self.sender()?;

        if self.max_gas_price_wei().is_none() {
            return Err(AppError::Config(format!(
                "max_gas_price_gwei must be a non-negative amount, got {}",
                self.max_gas_price_gwei
            )));
        }
        if self.poll_interval_seconds == 0 || self.gas_recheck_interval_seconds == 0 {
            return Err(AppError::Config("intervals must be at least one second".into()));
        }
        if self.billing_period_seconds <= 0 {
            return Err(AppError::Config("billing_period_seconds must be positive".into()));
        }
        Ok(())
    }

    fn contract(&self) -> AppResult<Address> {
        parse_address("contract_address", &self.contract_address)
    }

    fn sender(&self) -> AppResult<Address> {
        parse_address("sender_address", &self.sender_address)
    }

    pub fn max_gas_price_wei(&self) -> Option<u128> {
        gwei_to_wei(self.max_gas_price_gwei)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.webhook_host, self.webhook_port)
    }

    pub fn evm(&self) -> AppResult<EvmConfig> {
        Ok(EvmConfig {
            rpc_url: self.rpc_url.clone(),
            contract_address: self.contract()?,
            sender_address: self.sender()?,
            gas_limit: self.payment_gas_limit,
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_millis),
        })
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_gas_price: self.max_gas_price_wei().unwrap_or(0),
            gas_recheck_interval: Duration::from_secs(self.gas_recheck_interval_seconds),
            receipt_timeout: Duration::from_secs(self.receipt_timeout_seconds),
        }
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            billing_period: chrono::Duration::seconds(self.billing_period_seconds),
            history_limit: self.attempt_history_limit,
        }
    }

    pub fn reconciliation(&self) -> LoopConfig {
        LoopConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
        }
    }
}

fn parse_address(field: &str, raw: &str) -> AppResult<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| AppError::Config(format!("{} {:?} is not a valid address: {}", field, raw, e)))
}
