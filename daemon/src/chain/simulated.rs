// In-memory chain double. Balances, inbound queues and scripted submit
// failures are all controlled by the caller, which makes the execution
// paths of the engines fully deterministic under test.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use sha3::{Digest, Sha3_256};

use custos_common::{
    crypto::{Address, Keypair},
    currency::Currency,
    time::TimestampSeconds,
};

use super::{ChainClient, ChainError, InboundTransfer};

#[derive(Debug, Clone)]
pub struct SubmittedTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub currency: Currency,
    pub tx_hash: String,
}

#[derive(Default)]
struct SimState {
    native: HashMap<Address, u64>,
    tokens: HashMap<(Address, Address), u64>,
    inbound: HashMap<Address, Vec<InboundTransfer>>,
    // Scripted outcomes, popped per submit: None lets the submit through
    scripted_submits: VecDeque<Option<ChainError>>,
    submitted: Vec<SubmittedTransfer>,
    sequence: u64,
}

#[derive(Default)]
pub struct SimulatedChain {
    state: Mutex<SimState>,
}

impl SimulatedChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("simulated chain lock poisoned")
    }

    pub fn set_native_balance(&self, address: Address, amount: u64) {
        self.lock().native.insert(address, amount);
    }

    pub fn set_token_balance(&self, address: Address, mint: Address, amount: u64) {
        self.lock().tokens.insert((address, mint), amount);
    }

    pub fn push_inbound(&self, address: Address, transfer: InboundTransfer) {
        self.lock().inbound.entry(address).or_default().push(transfer);
    }

    /// Script the next `submit_transfer` call to fail.
    pub fn fail_next_submit(&self, error: ChainError) {
        self.lock().scripted_submits.push_back(Some(error));
    }

    /// Let the next `submit_transfer` through; combined with
    /// `fail_next_submit` this targets a later call in a sequence.
    pub fn allow_next_submit(&self) {
        self.lock().scripted_submits.push_back(None);
    }

    pub fn submitted(&self) -> Vec<SubmittedTransfer> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn get_native_balance(&self, address: &Address) -> Result<u64, ChainError> {
        Ok(self.lock().native.get(address).copied().unwrap_or(0))
    }

    async fn get_token_balance(
        &self,
        address: &Address,
        mint: &Address,
    ) -> Result<u64, ChainError> {
        // Missing token account reads as zero, like the real chain
        Ok(self
            .lock()
            .tokens
            .get(&(*address, *mint))
            .copied()
            .unwrap_or(0))
    }

    async fn list_inbound_transfers(
        &self,
        address: &Address,
        since: TimestampSeconds,
        max: usize,
    ) -> Result<Vec<InboundTransfer>, ChainError> {
        let state = self.lock();
        let transfers = state
            .inbound
            .get(address)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|transfer| transfer.timestamp >= since)
                    .take(max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(transfers)
    }

    async fn submit_transfer(
        &self,
        from: &Keypair,
        to: &Address,
        amount: u64,
        currency: Currency,
    ) -> Result<String, ChainError> {
        let mut state = self.lock();
        if let Some(Some(error)) = state.scripted_submits.pop_front() {
            return Err(error);
        }

        state.sequence += 1;
        let mut hasher = Sha3_256::new();
        hasher.update(state.sequence.to_be_bytes());
        hasher.update(from.address().as_bytes());
        hasher.update(to.as_bytes());
        let tx_hash = bs58::encode(hasher.finalize()).into_string();

        state.submitted.push(SubmittedTransfer {
            from: from.address(),
            to: *to,
            amount,
            currency,
            tx_hash: tx_hash.clone(),
        });
        Ok(tx_hash)
    }
}
