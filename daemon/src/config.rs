// Runtime configuration, sourced from the environment at startup.
// Missing or malformed required values are fatal.

use std::str::FromStr;

use custos_common::{
    config::{
        DEFAULT_ACTIVITY_CHECK_INTERVAL_MINUTES, DEFAULT_BALANCE_STALE_SECONDS,
        DEFAULT_INACTIVITY_THRESHOLD_HOURS, DEFAULT_RECONCILE_INTERVAL_SECONDS,
        DEFAULT_REMOVAL_THRESHOLD_HOURS, DEFAULT_THRESHOLD, DEFAULT_TIME_LOCK_SECONDS,
        MAX_MULTISIG_MEMBERS, MIN_MULTISIG_MEMBERS,
    },
    crypto::{Address, Keypair},
};

use crate::error::CoreError;

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_NETWORK: &str = "devnet";
// Devnet USDC mint
pub const DEFAULT_STABLECOIN_MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

#[derive(Clone)]
pub struct Config {
    pub rpc_url: String,
    pub network: String,
    pub stablecoin_mint: Address,

    // Multisig bootstrap
    pub member_keys: Vec<Keypair>,
    // 0 means "every member must approve"
    pub default_threshold: u8,
    pub default_time_lock: u64,
    pub min_members: usize,
    pub max_members: usize,

    // Activity sweeper
    pub inactivity_threshold_hours: u64,
    pub removal_threshold_hours: u64,
    pub check_interval_minutes: u64,

    // Reconciler
    pub reconcile_interval_seconds: u64,
    pub balance_stale_seconds: u64,
    pub known_faucets: Vec<Address>,

    pub auto_start_monitoring: bool,

    // Fee routing
    pub fee_wallet: Address,
    pub treasury_key: Keypair,

    // Forwarded to the embedding HTTP layer for CORS enforcement
    pub allowed_origins: Vec<String>,
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn env_address(name: &str, default: Option<&str>) -> Result<Address, CoreError> {
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => match default {
            Some(default) => default.to_string(),
            None => return Err(CoreError::Config(format!("{} is required", name))),
        },
    };
    raw.parse()
        .map_err(|err| CoreError::Config(format!("invalid address in {}: {}", name, err)))
}

fn env_keypair(name: &str) -> Result<Option<Keypair>, CoreError> {
    match std::env::var(name) {
        Ok(raw) => Keypair::from_base58(raw.trim())
            .map(Some)
            .map_err(|err| CoreError::Config(format!("invalid key in {}: {}", name, err))),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool, CoreError> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(CoreError::Config(format!(
                "invalid boolean for {}: {}",
                name, other
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn env_address_list(name: &str) -> Result<Vec<Address>, CoreError> {
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => return Ok(Vec::new()),
    };
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|err| CoreError::Config(format!("invalid address in {}: {}", name, err)))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        let mut member_keys = Vec::new();
        for index in 1..=MAX_MULTISIG_MEMBERS {
            let name = format!("MULTISIG_MEMBER_{}_PRIVATE_KEY", index);
            if let Some(keypair) = env_keypair(&name)? {
                member_keys.push(keypair);
            }
        }

        let treasury_key = env_keypair("TREASURY_PRIVATE_KEY")?
            .ok_or_else(|| CoreError::Config("TREASURY_PRIVATE_KEY is required".to_string()))?;
        let fee_wallet = env_address("FEE_WALLET_ADDRESS", None)?;

        let allowed_origins = env_string("ALLOWED_ORIGINS", "")
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            rpc_url: env_string("RPC_URL", DEFAULT_RPC_URL),
            network: env_string("SOLANA_NETWORK", DEFAULT_NETWORK),
            stablecoin_mint: env_address("STABLECOIN_MINT", Some(DEFAULT_STABLECOIN_MINT))?,
            member_keys,
            default_threshold: env_parse("MULTISIG_DEFAULT_THRESHOLD", DEFAULT_THRESHOLD)?,
            default_time_lock: env_parse("MULTISIG_DEFAULT_TIME_LOCK", DEFAULT_TIME_LOCK_SECONDS)?,
            min_members: env_parse("MULTISIG_MIN_MEMBERS", MIN_MULTISIG_MEMBERS)?,
            max_members: env_parse("MULTISIG_MAX_MEMBERS", MAX_MULTISIG_MEMBERS)?,
            inactivity_threshold_hours: env_parse(
                "INACTIVITY_THRESHOLD_HOURS",
                DEFAULT_INACTIVITY_THRESHOLD_HOURS,
            )?,
            removal_threshold_hours: env_parse(
                "REMOVAL_THRESHOLD_HOURS",
                DEFAULT_REMOVAL_THRESHOLD_HOURS,
            )?,
            check_interval_minutes: env_parse(
                "CHECK_INTERVAL_MINUTES",
                DEFAULT_ACTIVITY_CHECK_INTERVAL_MINUTES,
            )?,
            reconcile_interval_seconds: DEFAULT_RECONCILE_INTERVAL_SECONDS,
            balance_stale_seconds: env_parse(
                "BALANCE_SYNC_STALE_SECONDS",
                DEFAULT_BALANCE_STALE_SECONDS,
            )?,
            known_faucets: env_address_list("KNOWN_FAUCET_ADDRESSES")?,
            auto_start_monitoring: env_bool("AUTO_START_BLOCKCHAIN_MONITORING", false)?,
            fee_wallet,
            treasury_key,
            allowed_origins,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let count = self.member_keys.len();
        if count < self.min_members || count > self.max_members {
            return Err(CoreError::Config(format!(
                "{} multisig member keys configured, expected between {} and {}",
                count, self.min_members, self.max_members
            )));
        }

        let mut addresses: Vec<Address> =
            self.member_keys.iter().map(|key| key.address()).collect();
        addresses.sort();
        addresses.dedup();
        if addresses.len() != count {
            return Err(CoreError::Config(
                "multisig member keys must be distinct".to_string(),
            ));
        }

        if self.default_threshold as usize > count {
            return Err(CoreError::Config(format!(
                "threshold {} exceeds the {} configured members",
                self.default_threshold, count
            )));
        }

        Ok(())
    }

    /// Effective approval threshold for a member count; 0 in configuration
    /// means every member.
    pub fn effective_threshold(&self, member_count: usize) -> u8 {
        if self.default_threshold == 0 {
            member_count as u8
        } else {
            self.default_threshold
        }
    }

    pub fn member_addresses(&self) -> Vec<Address> {
        self.member_keys.iter().map(|key| key.address()).collect()
    }

    pub fn inactivity_threshold_seconds(&self) -> u64 {
        self.inactivity_threshold_hours * 3600
    }

    pub fn removal_threshold_seconds(&self) -> u64 {
        self.removal_threshold_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(members: usize) -> Config {
        Config {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            stablecoin_mint: DEFAULT_STABLECOIN_MINT.parse().unwrap(),
            member_keys: (0..members).map(|_| Keypair::generate()).collect(),
            default_threshold: 0,
            default_time_lock: DEFAULT_TIME_LOCK_SECONDS,
            min_members: MIN_MULTISIG_MEMBERS,
            max_members: MAX_MULTISIG_MEMBERS,
            inactivity_threshold_hours: DEFAULT_INACTIVITY_THRESHOLD_HOURS,
            removal_threshold_hours: DEFAULT_REMOVAL_THRESHOLD_HOURS,
            check_interval_minutes: DEFAULT_ACTIVITY_CHECK_INTERVAL_MINUTES,
            reconcile_interval_seconds: DEFAULT_RECONCILE_INTERVAL_SECONDS,
            balance_stale_seconds: DEFAULT_BALANCE_STALE_SECONDS,
            known_faucets: Vec::new(),
            auto_start_monitoring: false,
            fee_wallet: Keypair::generate().address(),
            treasury_key: Keypair::generate(),
            allowed_origins: Vec::new(),
        }
    }

    #[test]
    fn member_count_bounds_are_enforced() {
        assert!(base_config(1).validate().is_err());
        assert!(base_config(2).validate().is_ok());
        assert!(base_config(3).validate().is_ok());
        assert!(base_config(4).validate().is_err());
    }

    #[test]
    fn zero_threshold_means_all_members() {
        let config = base_config(3);
        assert_eq!(config.effective_threshold(3), 3);

        let mut config = base_config(3);
        config.default_threshold = 2;
        assert_eq!(config.effective_threshold(3), 2);
    }

    #[test]
    fn threshold_cannot_exceed_members() {
        let mut config = base_config(2);
        config.default_threshold = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_member_keys_are_rejected() {
        let mut config = base_config(2);
        config.member_keys = vec![config.member_keys[0].clone(), config.member_keys[0].clone()];
        assert!(config.validate().is_err());
    }
}
