//! Storage cost estimation contract

use crate::provider::ProviderType;

/// Inputs to a cost estimate for keeping exported images in cloud storage
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    pub provider: ProviderType,
    /// Provider-specific class name ("hot", "standard", "STANDARD_IA", ...)
    pub storage_class: String,
    pub size_gb: f64,
    pub duration_days: u32,
    /// Data transferred out of the cloud
    pub transfer_gb: f64,
    pub requests: u64,
}

/// Estimates the cost of storing and retrieving exports
pub trait CostEstimator: Send + Sync {
    /// Total cost in the estimator's currency, `None` if the provider or
    /// storage class is unknown to it
    fn estimate_cost(&self, query: &CostQuery) -> Option<f64>;
}
