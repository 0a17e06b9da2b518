// src/config.rs
//! Process configuration.
//!
//! Raw values come from the command line or the environment through [`Args`] and
//! are validated exactly once by `Config::try_from(args)`.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use ethers::types::{Address, U256};
use rand::Rng;
use reqwest::Url;

use crate::error::{Result, UserOpError};

#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// JSON-RPC endpoint of the execution node
    #[clap(long, env = "ETH_RPC_URL", default_value = "http://localhost:8545")]
    pub eth_rpc_url: String,

    /// JSON-RPC endpoint of the bundler
    #[clap(long, env = "BUNDLER_URL", default_value = "http://localhost:3000/rpc")]
    pub bundler_url: String,

    /// Base URL of the email relayer
    #[clap(long, env = "RELAYER_URL")]
    pub relayer_url: String,

    /// DKIM registry the relayer checks email signatures against
    #[clap(long, env = "DKIM_CONTRACT_ADDR")]
    pub dkim_contract_addr: String,

    /// Chain name the relayer should use
    #[clap(long, env = "RELAYER_CHAIN", default_value = "dev")]
    pub relayer_chain: String,

    #[clap(long, env = "CODE_EXISTS_IN_EMAIL", default_value_t = true, action = clap::ArgAction::Set)]
    pub code_exists_in_email: bool,

    /// Headroom added to verification gas limits, in percent
    #[clap(long, env = "VERIFICATION_GAS_MARGIN", default_value_t = 100)]
    pub verification_gas_margin: u64,

    /// Headroom added to pre-verification gas, in percent
    #[clap(long, env = "PRE_VERIFICATION_GAS_MARGIN", default_value_t = 10)]
    pub pre_verification_gas_margin: u64,

    #[clap(long, env = "RECEIPT_POLL_INTERVAL_MS", default_value_t = 100)]
    pub receipt_poll_interval_ms: u64,

    #[clap(long, env = "RECEIPT_MAX_ATTEMPTS", default_value_t = 200)]
    pub receipt_max_attempts: u32,

    #[clap(long, env = "SIGNING_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub signing_poll_interval_ms: u64,

    #[clap(long, env = "SIGNING_TIMEOUT_MS", default_value_t = 120_000)]
    pub signing_timeout_ms: u64,

    #[clap(long, env = "POLL_BACKOFF", value_enum, default_value_t = BackoffKind::Fixed)]
    pub poll_backoff: BackoffKind,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub eth_rpc_url: Url,
    pub bundler_url: Url,
    pub relayer_url: Url,
    pub dkim_contract: Address,
    pub relayer_chain: String,
    pub code_exists_in_email: bool,
    pub gas: GasPolicy,
    pub receipt_poll: PollPolicy,
    pub receipt_max_attempts: u32,
    pub signing_poll: PollPolicy,
    pub signing_timeout: Duration,
    pub log_level: String,
}

impl TryFrom<Args> for Config {
    type Error = UserOpError;

    fn try_from(args: Args) -> Result<Self> {
        if args.receipt_max_attempts == 0 {
            return Err(UserOpError::Configuration(
                "receipt max attempts must be at least 1".to_string(),
            ));
        }
        if args.receipt_poll_interval_ms == 0 || args.signing_poll_interval_ms == 0 {
            return Err(UserOpError::Configuration(
                "poll intervals must be positive".to_string(),
            ));
        }
        if args.signing_timeout_ms == 0 {
            return Err(UserOpError::Configuration(
                "signing timeout must be positive".to_string(),
            ));
        }

        let backoff = match args.poll_backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::exponential(),
        };

        Ok(Self {
            eth_rpc_url: parse_url("ETH_RPC_URL", &args.eth_rpc_url)?,
            bundler_url: parse_url("BUNDLER_URL", &args.bundler_url)?,
            relayer_url: parse_url("RELAYER_URL", &args.relayer_url)?,
            dkim_contract: args.dkim_contract_addr.parse().map_err(|e| {
                UserOpError::Configuration(format!(
                    "DKIM_CONTRACT_ADDR {:?}: {e}",
                    args.dkim_contract_addr
                ))
            })?,
            relayer_chain: args.relayer_chain,
            code_exists_in_email: args.code_exists_in_email,
            gas: GasPolicy {
                verification_margin_percent: args.verification_gas_margin,
                pre_verification_margin_percent: args.pre_verification_gas_margin,
            },
            receipt_poll: PollPolicy {
                interval: Duration::from_millis(args.receipt_poll_interval_ms),
                backoff,
            },
            receipt_max_attempts: args.receipt_max_attempts,
            signing_poll: PollPolicy {
                interval: Duration::from_millis(args.signing_poll_interval_ms),
                backoff,
            },
            signing_timeout: Duration::from_millis(args.signing_timeout_ms),
            log_level: args.log_level,
        })
    }
}

fn parse_url(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| UserOpError::Configuration(format!("{name} {raw:?}: {e}")))
}

/// Safety margins applied on top of the bundler's gas estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub verification_margin_percent: u64,
    pub pre_verification_margin_percent: u64,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            verification_margin_percent: 100,
            pre_verification_margin_percent: 10,
        }
    }
}

impl GasPolicy {
    pub fn pad_verification(&self, estimate: U256) -> U256 {
        with_margin(estimate, self.verification_margin_percent)
    }

    pub fn pad_pre_verification(&self, estimate: U256) -> U256 {
        with_margin(estimate, self.pre_verification_margin_percent)
    }
}

fn with_margin(value: U256, percent: u64) -> U256 {
    value.saturating_add(value.saturating_mul(U256::from(percent)) / U256::from(100u64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Interval grows by `factor` each attempt up to `max_interval`. With `jitter`
    /// every delay is drawn uniformly from its upper half.
    Exponential {
        factor: u32,
        max_interval: Duration,
        jitter: bool,
    },
}

impl Backoff {
    pub const fn exponential() -> Self {
        Self::Exponential {
            factor: 2,
            max_interval: Duration::from_secs(10),
            jitter: true,
        }
    }
}

/// Sleep schedule between two polls of a remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub const fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// Delay before the given attempt, counting from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                factor,
                max_interval,
                jitter,
            } => {
                let growth = factor.checked_pow(attempt).unwrap_or(u32::MAX);
                let delay = self.interval.saturating_mul(growth).min(max_interval);
                if jitter && !delay.is_zero() {
                    rand::thread_rng().gen_range(delay / 2..=delay)
                } else {
                    delay
                }
            }
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(100))
    }
}
