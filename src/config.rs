//! Service configuration loaded from environment variables.

use std::str::FromStr;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::amm::BPS_DENOMINATOR;
use crate::error::ServiceError;
use crate::market::EngineConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Identities ===
    /// Engine address; oracle callbacks target it and custody lives there.
    pub engine_address: String,

    /// Address oracle callbacks must originate from.
    pub oracle_address: String,

    /// Comma-separated addresses allowed to create, mint, assert and trade.
    #[serde(default)]
    pub authorized_callers: String,

    /// Collateral credited to every authorized caller at startup.
    #[serde(default)]
    pub initial_balance: u64,

    // === Assertions ===
    /// Currency bonds are quoted and posted in.
    #[serde(default = "default_bond_currency")]
    pub bond_currency: String,

    /// Liveness window requested for every assertion.
    #[serde(default = "default_liveness")]
    pub assertion_liveness_seconds: u64,

    /// Oracle identifier attached to every assertion.
    #[serde(default = "default_identifier")]
    pub assertion_identifier: String,

    /// Minimum bond the local oracle quotes.
    #[serde(default)]
    pub oracle_minimum_bond: u64,

    /// How often the liveness driver sweeps expired assertions.
    #[serde(default = "default_poll_interval")]
    pub oracle_poll_interval_seconds: u64,

    // === Venue ===
    /// Venue fee in basis points.
    #[serde(default = "default_fee_bps")]
    pub amm_fee_bps: u32,

    /// Virtual reserve seeded on both sides of every new market.
    #[serde(default = "default_virtual_liquidity")]
    pub amm_virtual_liquidity: u64,

    // === Server Configuration ===
    /// HTTP server port for the API and metrics.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit JSON log lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_bond_currency() -> String {
    "USDC".to_string()
}

fn default_liveness() -> u64 {
    7_200 // 2 hours
}

fn default_identifier() -> String {
    "ASSERT_TRUTH".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_fee_bps() -> u32 {
    100 // 1%
}

fn default_virtual_liquidity() -> u64 {
    1_000_000
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        parse_address("ENGINE_ADDRESS", &self.engine_address)?;
        parse_address("ORACLE_ADDRESS", &self.oracle_address)?;
        self.parse_authorized_callers()?;

        if self.bond_currency.trim().is_empty() {
            return Err("BOND_CURRENCY must not be empty".to_string());
        }

        if self.assertion_liveness_seconds == 0 {
            return Err("ASSERTION_LIVENESS_SECONDS must be greater than 0".to_string());
        }

        if u128::from(self.amm_fee_bps) >= BPS_DENOMINATOR {
            return Err("AMM_FEE_BPS must be less than 10000".to_string());
        }

        if self.amm_virtual_liquidity == 0 {
            return Err("AMM_VIRTUAL_LIQUIDITY must be greater than 0".to_string());
        }

        if self.oracle_poll_interval_seconds == 0 {
            return Err("ORACLE_POLL_INTERVAL_SECONDS must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Engine address.
    pub fn engine(&self) -> Result<Address, ServiceError> {
        parse_address("ENGINE_ADDRESS", &self.engine_address).map_err(ServiceError::InvalidConfig)
    }

    /// Oracle callback address.
    pub fn oracle(&self) -> Result<Address, ServiceError> {
        parse_address("ORACLE_ADDRESS", &self.oracle_address).map_err(ServiceError::InvalidConfig)
    }

    /// Addresses on the allow list.
    pub fn authorized(&self) -> Result<Vec<Address>, ServiceError> {
        self.parse_authorized_callers()
            .map_err(ServiceError::InvalidConfig)
    }

    /// Engine parameters derived from this configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ServiceError> {
        Ok(EngineConfig {
            address: self.engine()?,
            bond_currency: self.bond_currency.clone(),
            liveness_seconds: self.assertion_liveness_seconds,
            identifier: self.assertion_identifier.clone(),
            amm_fee_bps: self.amm_fee_bps,
            amm_virtual_liquidity: u128::from(self.amm_virtual_liquidity),
        })
    }

    /// Tracing filter directive, widened to debug for this crate when
    /// `verbose` is set.
    pub fn log_filter(&self, verbose: bool) -> String {
        if verbose {
            "claim_market=debug,info".to_string()
        } else {
            self.rust_log.clone()
        }
    }

    fn parse_authorized_callers(&self) -> Result<Vec<Address>, String> {
        self.authorized_callers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_address("AUTHORIZED_CALLERS", s))
            .collect()
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address, String> {
    Address::from_str(value.trim())
        .map_err(|e| format!("{} has invalid address {:?}: {}", name, value, e))
}
