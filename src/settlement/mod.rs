// Subscription payment reconciliation engine
pub mod coordinator;
pub mod gas;
pub mod scheduler;

pub use coordinator::{AttemptDisposition, CoordinatorConfig, PaymentAttemptCoordinator};
pub use scheduler::{CycleReport, LoopConfig, ReconciliationLoop};
