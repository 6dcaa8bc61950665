//! Backend selection and engine wiring.
//!
//! `DATABASE_URL` set → Postgres engine; otherwise the in-memory engine (dev
//! and tests). Allocation policies come from the `ALLOCATION_POLICIES` JSON
//! override or the shipped print-shop defaults.

use std::sync::Arc;
use std::time::Duration;

use printdesk_infra::{InMemoryEngine, PostgresEngine};
use printdesk_orders::{AllocationPolicies, OrderLedger};
use printdesk_payments::PaymentReconciler;
use printdesk_rolls::{RollAllocator, RollStore};

const DEFAULT_OP_TIMEOUT_MS: u64 = 5_000;

/// The engine contracts the routes talk to.
#[derive(Clone)]
pub struct AppServices {
    pub rolls: Arc<dyn RollStore>,
    pub allocator: Arc<dyn RollAllocator>,
    pub ledger: Arc<dyn OrderLedger>,
    pub reconciler: Arc<dyn PaymentReconciler>,
}

impl AppServices {
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: RollStore + RollAllocator + OrderLedger + PaymentReconciler + 'static,
    {
        Self {
            rolls: engine.clone(),
            allocator: engine.clone(),
            ledger: engine.clone(),
            reconciler: engine,
        }
    }

    pub fn in_memory(policies: AllocationPolicies) -> Self {
        Self::from_engine(Arc::new(InMemoryEngine::new(policies)))
    }
}

pub async fn build_services() -> anyhow::Result<AppServices> {
    let policies = match std::env::var("ALLOCATION_POLICIES") {
        Ok(json) => AllocationPolicies::from_json(&json)?,
        Err(_) => AllocationPolicies::print_shop_defaults()?,
    };

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let op_timeout = std::env::var("OP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_OP_TIMEOUT_MS);
            let engine =
                PostgresEngine::connect(&url, policies, Duration::from_millis(op_timeout)).await?;
            tracing::info!("using postgres backend");
            Ok(AppServices::from_engine(Arc::new(engine)))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory backend");
            Ok(AppServices::in_memory(policies))
        }
    }
}
