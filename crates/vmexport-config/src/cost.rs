//! Flat-rate storage cost estimation
//!
//! Built-in list prices (USD, US regions) can be overridden or extended from
//! the `costs` section of the config file.

use serde::Deserialize;
use vmexport_core::{CostEstimator, CostQuery, ProviderType};

/// Price of one storage class
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StorageRate {
    pub provider: ProviderType,
    pub storage_class: String,
    pub per_gb_month: f64,
    #[serde(default)]
    pub egress_per_gb: f64,
    #[serde(default)]
    pub per_1000_requests: f64,
    #[serde(default)]
    pub retrieval_per_gb: f64,
    /// Billed minimum retention; shorter storage is charged up to this
    #[serde(default)]
    pub minimum_days: u32,
}

/// `costs` section of the config file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CostSettings {
    pub currency: String,
    pub rates: Vec<StorageRate>,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            rates: Vec::new(),
        }
    }
}

fn rate(
    provider: ProviderType,
    storage_class: &str,
    per_gb_month: f64,
    egress_per_gb: f64,
    per_1000_requests: f64,
    retrieval_per_gb: f64,
    minimum_days: u32,
) -> StorageRate {
    StorageRate {
        provider,
        storage_class: storage_class.to_string(),
        per_gb_month,
        egress_per_gb,
        per_1000_requests,
        retrieval_per_gb,
        minimum_days,
    }
}

fn builtin_rates() -> Vec<StorageRate> {
    use ProviderType::{Aws, Azure, Gcp};
    vec![
        rate(Aws, "standard", 0.023, 0.09, 0.005, 0.0, 0),
        rate(Aws, "standard_ia", 0.0125, 0.09, 0.005, 0.0, 30),
        rate(Aws, "onezone_ia", 0.01, 0.09, 0.005, 0.0, 30),
        rate(Aws, "glacier", 0.004, 0.09, 0.005, 0.01, 90),
        rate(Aws, "deep_archive", 0.00099, 0.09, 0.005, 0.02, 180),
        rate(Azure, "hot", 0.0184, 0.087, 0.0005, 0.0, 0),
        rate(Azure, "cool", 0.01, 0.087, 0.0005, 0.01, 30),
        rate(Azure, "archive", 0.002, 0.087, 0.0005, 0.02, 180),
        rate(Gcp, "standard", 0.02, 0.12, 0.005, 0.0, 0),
        rate(Gcp, "nearline", 0.01, 0.12, 0.005, 0.01, 30),
        rate(Gcp, "coldline", 0.004, 0.12, 0.005, 0.02, 90),
        rate(Gcp, "archive", 0.0012, 0.12, 0.005, 0.05, 365),
    ]
}

/// [`CostEstimator`] over a fixed rate table
#[derive(Debug, Clone)]
pub struct FlatRateEstimator {
    currency: String,
    rates: Vec<StorageRate>,
}

impl Default for FlatRateEstimator {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            rates: builtin_rates(),
        }
    }
}

impl FlatRateEstimator {
    /// Built-in rates with `settings` layered on top
    pub fn from_settings(settings: &CostSettings) -> Self {
        let mut estimator = Self {
            currency: settings.currency.clone(),
            rates: builtin_rates(),
        };
        for custom in &settings.rates {
            match estimator.rates.iter_mut().find(|r| {
                r.provider == custom.provider
                    && r.storage_class.eq_ignore_ascii_case(&custom.storage_class)
            }) {
                Some(existing) => *existing = custom.clone(),
                None => estimator.rates.push(custom.clone()),
            }
        }
        estimator
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn rate(&self, provider: ProviderType, storage_class: &str) -> Option<&StorageRate> {
        self.rates
            .iter()
            .find(|r| r.provider == provider && r.storage_class.eq_ignore_ascii_case(storage_class))
    }

    /// Storage class an export lands in unless told otherwise
    pub fn default_storage_class(provider: ProviderType) -> Option<&'static str> {
        match provider {
            ProviderType::Azure => Some("hot"),
            ProviderType::Gcp | ProviderType::Aws => Some("standard"),
            _ => None,
        }
    }
}

impl CostEstimator for FlatRateEstimator {
    fn estimate_cost(&self, query: &CostQuery) -> Option<f64> {
        let rate = self.rate(query.provider, &query.storage_class)?;

        let months = f64::from(query.duration_days) / 30.0;
        let storage = query.size_gb * rate.per_gb_month * months;
        let transfer = query.transfer_gb * rate.egress_per_gb;
        let requests = query.requests as f64 / 1000.0 * rate.per_1000_requests;
        let retrieval = query.transfer_gb * rate.retrieval_per_gb;
        let early_delete = if query.duration_days < rate.minimum_days {
            let remaining = f64::from(rate.minimum_days - query.duration_days) / 30.0;
            query.size_gb * rate.per_gb_month * remaining
        } else {
            0.0
        };

        let total = storage + transfer + requests + retrieval + early_delete;
        Some((total * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(provider: ProviderType, class: &str) -> CostQuery {
        CostQuery {
            provider,
            storage_class: class.to_string(),
            size_gb: 100.0,
            duration_days: 30,
            transfer_gb: 0.0,
            requests: 0,
        }
    }

    #[test]
    fn test_storage_cost() {
        let estimator = FlatRateEstimator::default();
        assert_eq!(estimator.estimate_cost(&query(ProviderType::Aws, "standard")), Some(2.3));
        assert_eq!(estimator.estimate_cost(&query(ProviderType::Azure, "HOT")), Some(1.84));

        let with_egress = CostQuery {
            transfer_gb: 100.0,
            ..query(ProviderType::Gcp, "standard")
        };
        assert_eq!(estimator.estimate_cost(&with_egress), Some(14.0));
    }

    #[test]
    fn test_early_deletion_is_billed() {
        let estimator = FlatRateEstimator::default();
        let short = CostQuery {
            duration_days: 30,
            ..query(ProviderType::Gcp, "coldline")
        };
        // 30 days stored + 60 days early deletion at 0.004/GB-month
        assert_eq!(estimator.estimate_cost(&short), Some(1.2));
    }

    #[test]
    fn test_unknown_class() {
        let estimator = FlatRateEstimator::default();
        assert_eq!(estimator.estimate_cost(&query(ProviderType::Aws, "tape")), None);
        assert_eq!(estimator.estimate_cost(&query(ProviderType::VSphere, "standard")), None);
    }

    #[test]
    fn test_settings_override_builtin() {
        let settings = CostSettings {
            currency: "EUR".to_string(),
            rates: vec![
                rate(ProviderType::Azure, "hot", 0.02, 0.0, 0.0, 0.0, 0),
                rate(ProviderType::Aws, "tape", 0.001, 0.0, 0.0, 0.0, 0),
            ],
        };
        let estimator = FlatRateEstimator::from_settings(&settings);
        assert_eq!(estimator.currency(), "EUR");
        assert_eq!(estimator.estimate_cost(&query(ProviderType::Azure, "hot")), Some(2.0));
        assert_eq!(estimator.estimate_cost(&query(ProviderType::Aws, "tape")), Some(0.1));
        assert!(estimator.rate(ProviderType::Gcp, "standard").is_some());
    }
}
