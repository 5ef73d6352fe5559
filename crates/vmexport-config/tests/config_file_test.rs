use std::fs;
use vmexport_config::{
    CONFIG_PATH_ENV, ConfigError, FlatRateEstimator, VmexportConfig, find_config_file_from,
};
use vmexport_core::{CostEstimator, CostQuery, ExportOptions, ProviderType};

const FULL_CONFIG: &str = r#"
default_profile: aws-prod
providers:
  aws-prod:
    type: aws
    region: eu-central-1
    username: AKIAEXAMPLE
    password_env: VMEXPORT_IT_AWS_SECRET
    metadata:
      s3_bucket: prod-vm-exports
      s3_prefix: nightly/
transfer:
  enable_checkpoints: true
  checkpoint_interval_secs: 15
costs:
  currency: EUR
  rates:
    - provider: aws
      storage_class: standard
      per_gb_month: 0.025
      egress_per_gb: 0.09
"#;

#[test]
fn test_load_discovered_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".vmexport.yaml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let found = temp_env::with_var_unset(CONFIG_PATH_ENV, || {
        find_config_file_from(dir.path(), None).unwrap()
    });
    let config = VmexportConfig::load(&found).unwrap();

    let (name, profile) = config.profile(None).unwrap();
    let provider_config = temp_env::with_var("VMEXPORT_IT_AWS_SECRET", Some("hunter2"), || {
        profile.to_provider_config(name).unwrap()
    });
    assert_eq!(provider_config.provider_type, Some(ProviderType::Aws));
    assert_eq!(provider_config.username.as_deref(), Some("AKIAEXAMPLE"));
    assert_eq!(provider_config.password.as_deref(), Some("hunter2"));
    assert_eq!(provider_config.region.as_deref(), Some("eu-central-1"));

    let mut opts = ExportOptions::new(dir.path());
    config.transfer.apply(&mut opts);
    let transfer = opts.transfer_options().unwrap();
    assert!(transfer.enable_checkpoints);
    assert_eq!(transfer.checkpoint_interval.as_secs(), 15);

    let estimator = FlatRateEstimator::from_settings(&config.costs);
    let cost = estimator.estimate_cost(&CostQuery {
        provider: ProviderType::Aws,
        storage_class: "standard".into(),
        size_gb: 200.0,
        duration_days: 30,
        transfer_gb: 0.0,
        requests: 0,
    });
    assert_eq!(cost, Some(5.0));
    assert_eq!(estimator.currency(), "EUR");
}

#[test]
fn test_parse_error_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vmexport.yaml");
    fs::write(&path, "providers:\n  broken:\n    type: azure\n    port: not-a-number\n").unwrap();

    match VmexportConfig::load(&path) {
        Err(err @ ConfigError::Parse { .. }) => {
            assert!(err.to_string().contains("vmexport.yaml"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}
