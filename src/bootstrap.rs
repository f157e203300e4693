use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::{
    api::handler::AppState,
    config::Config,
    error::AppResult,
    execution::{ChainClient, EvmChainClient},
    ledger::SubscriberLedger,
    settlement::{gas::wei_to_gwei, PaymentAttemptCoordinator, ReconciliationLoop},
};

/// Wired components, ready to be started
pub struct Components {
    pub state: AppState,
    pub reconciler: ReconciliationLoop,
}

pub fn initialize_components(
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> AppResult<Components> {
    info!("Initializing application components ...");

    let ledger = Arc::new(SubscriberLedger::new(config.ledger()));
    info!("✅ Subscriber ledger initialized");

    let evm = config.evm()?;
    info!("🔗 Chain RPC: {} (contract {})", evm.rpc_url, config.contract_address);
    let client: Arc<dyn ChainClient> = Arc::new(EvmChainClient::new(evm));

    let coordinator_config = config.coordinator();
    info!(
        "⛽ Gas gate: {} gwei max, recheck every {:?}, receipt timeout {:?}",
        wei_to_gwei(coordinator_config.max_gas_price),
        coordinator_config.gas_recheck_interval,
        coordinator_config.receipt_timeout
    );
    let coordinator = Arc::new(PaymentAttemptCoordinator::new(
        coordinator_config,
        ledger.clone(),
        client.clone(),
        shutdown,
    ));

    let reconciler = ReconciliationLoop::new(
        config.reconciliation(),
        ledger.clone(),
        client,
        coordinator,
    );

    Ok(Components {
        state: AppState::new(ledger),
        reconciler,
    })
}
