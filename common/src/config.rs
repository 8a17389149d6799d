pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 8 decimals numbers
pub const COIN_DECIMALS: u8 = 8;
// 100 000 000 atomic units to represent 1 whole coin
pub const COIN_VALUE: u64 = 10u64.pow(COIN_DECIMALS as u32);

// Transfer fee rate: 0.001% of the gross amount
// Expressed as a divisor so the fee stays exact integer math:
// fee = gross / FEE_RATE_DIVISOR, rounded down at atomic precision
pub const FEE_RATE_DIVISOR: u64 = 100_000;

// Maximum gross amount accepted for a single governed wallet transfer
pub const MAX_WALLET_TRANSFER: u64 = 1_000_000 * COIN_VALUE;

// Multisig defaults
// A threshold of 0 in configuration means "every member must approve"
pub const DEFAULT_THRESHOLD: u8 = 0;
pub const DEFAULT_TIME_LOCK_SECONDS: u64 = 5;
pub const MIN_MULTISIG_MEMBERS: usize = 2;
pub const MAX_MULTISIG_MEMBERS: usize = 3;

// Member activity sweeper defaults
pub const DEFAULT_INACTIVITY_THRESHOLD_HOURS: u64 = 24;
pub const DEFAULT_REMOVAL_THRESHOLD_HOURS: u64 = 48;
pub const DEFAULT_ACTIVITY_CHECK_INTERVAL_MINUTES: u64 = 60;

// Balance reconciler defaults
pub const DEFAULT_RECONCILE_INTERVAL_SECONDS: u64 = 300;
pub const DEFAULT_BALANCE_STALE_SECONDS: u64 = 300;
// The inbound scan restarts this far before the last sync point so a
// transfer landing around the sync instant is never skipped
pub const RECONCILE_OVERLAP_SECONDS: u64 = 60;
// Maximum inbound transfers fetched per wallet per sweep
pub const INBOUND_PAGE_SIZE: usize = 100;

// Deposits at or below this amount coming from a known faucet or the
// system program are classified as airdrops
pub const AIRDROP_MAX_AMOUNT: u64 = 2 * COIN_VALUE;
// Well-known system program address on Solana-family chains
pub const SYSTEM_PROGRAM_ADDRESS: &str = "11111111111111111111111111111111";

// Chain client timeouts in seconds
pub const CHAIN_READ_TIMEOUT_SECS: u64 = 10;
pub const CHAIN_SUBMIT_TIMEOUT_SECS: u64 = 15;

// Periodic jobs spread their wake-ups by up to this percentage of the
// interval in either direction
pub const SCHEDULER_JITTER_PERCENT: u64 = 10;

// Static checks
const _: () = assert!(MIN_MULTISIG_MEMBERS <= MAX_MULTISIG_MEMBERS);
const _: () = assert!(FEE_RATE_DIVISOR > 0);
const _: () = assert!(AIRDROP_MAX_AMOUNT < MAX_WALLET_TRANSFER);
