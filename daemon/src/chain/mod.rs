// Chain client seam. The backend only ever talks to the chain through
// this trait; deployments wire an RPC-backed implementation, tests and
// local runs use the simulated one.

mod simulated;

pub use simulated::{SimulatedChain, SubmittedTransfer};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use custos_common::{
    config::{CHAIN_READ_TIMEOUT_SECS, CHAIN_SUBMIT_TIMEOUT_SECS},
    crypto::{Address, Keypair},
    currency::Currency,
    time::TimestampSeconds,
    tokio::timeout,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("rate limited by the chain endpoint")]
    RateLimited,

    #[error("chain request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("insufficient funds on chain")]
    InsufficientFunds,
}

/// An inbound transfer observed on chain.
#[derive(Debug, Clone)]
pub struct InboundTransfer {
    pub tx_hash: String,
    pub sender: Address,
    // None for native transfers, the token mint otherwise
    pub mint: Option<Address>,
    pub amount: u64,
    pub timestamp: TimestampSeconds,
}

/// Read and submit operations the core consumes.
///
/// Reads are idempotent. `submit_transfer` is not: callers persist their
/// intent before submitting and reconcile afterwards.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_native_balance(&self, address: &Address) -> Result<u64, ChainError>;

    /// Token balance of `address` for `mint`; 0 when the token account
    /// does not exist.
    async fn get_token_balance(&self, address: &Address, mint: &Address)
        -> Result<u64, ChainError>;

    async fn list_inbound_transfers(
        &self,
        address: &Address,
        since: TimestampSeconds,
        max: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError>;

    async fn submit_transfer(
        &self,
        from: &Keypair,
        to: &Address,
        amount: u64,
        currency: Currency,
    ) -> Result<String, ChainError>;
}

/// Bounds every chain call with the configured timeouts.
pub struct BoundedChain<C> {
    inner: C,
    read_timeout: Duration,
    submit_timeout: Duration,
}

impl<C: ChainClient> BoundedChain<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            read_timeout: Duration::from_secs(CHAIN_READ_TIMEOUT_SECS),
            submit_timeout: Duration::from_secs(CHAIN_SUBMIT_TIMEOUT_SECS),
        }
    }
}

#[async_trait]
impl<C: ChainClient> ChainClient for BoundedChain<C> {
    async fn get_native_balance(&self, address: &Address) -> Result<u64, ChainError> {
        timeout(self.read_timeout, self.inner.get_native_balance(address))
            .await
            .map_err(|_| ChainError::Timeout)?
    }

    async fn get_token_balance(
        &self,
        address: &Address,
        mint: &Address,
    ) -> Result<u64, ChainError> {
        timeout(self.read_timeout, self.inner.get_token_balance(address, mint))
            .await
            .map_err(|_| ChainError::Timeout)?
    }

    async fn list_inbound_transfers(
        &self,
        address: &Address,
        since: TimestampSeconds,
        max: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError> {
        timeout(
            self.read_timeout,
            self.inner.list_inbound_transfers(address, since, max),
        )
        .await
        .map_err(|_| ChainError::Timeout)?
    }

    async fn submit_transfer(
        &self,
        from: &Keypair,
        to: &Address,
        amount: u64,
        currency: Currency,
    ) -> Result<String, ChainError> {
        timeout(
            self.submit_timeout,
            self.inner.submit_transfer(from, to, amount, currency),
        )
        .await
        .map_err(|_| ChainError::Timeout)?
    }
}
