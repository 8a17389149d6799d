use std::sync::Arc;

use crate::{chain::ChainClient, config::Config, fee::FeeEngine, storage::Store};

/// The backend core. Engines for proposals, transfers, activity tracking
/// and reconciliation are implemented across their modules as methods on
/// this type; everything shares one store, one chain client and one
/// configuration.
pub struct Custodian {
    store: Arc<Store>,
    chain: Arc<dyn ChainClient>,
    config: Arc<Config>,
    fees: FeeEngine,
}

impl Custodian {
    pub fn new(store: Arc<Store>, chain: Arc<dyn ChainClient>, config: Arc<Config>) -> Self {
        let fees = FeeEngine::new(config.treasury_key.clone(), config.fee_wallet);
        Self {
            store,
            chain,
            config,
            fees,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fees(&self) -> &FeeEngine {
        &self.fees
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }
}
