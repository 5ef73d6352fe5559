use anyhow::bail;
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use vmexport::progress::BarReporter;
use vmexport::utils::{format_bytes, meta_value};
use vmexport_config::{FlatRateEstimator, VmexportConfig};
use vmexport_core::{
    CancelToken, CostEstimator, CostQuery, ExportOptions, ExportResult, Provider, ProviderType,
};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const COST_HINT_DAYS: u32 = 30;

pub struct ExportArgs {
    pub vm: String,
    pub output: PathBuf,
    pub format: Option<String>,
    pub parallel: Option<usize>,
    pub bandwidth_limit: Option<u64>,
    pub checkpoint: bool,
    pub resume: bool,
    pub meta: Vec<(String, String)>,
    pub quiet: bool,
}

fn build_options(args: &ExportArgs, config: Option<&VmexportConfig>) -> ExportOptions {
    let mut opts = ExportOptions::new(&args.output);
    if let Some(format) = &args.format {
        opts.format = format.clone();
    }
    if let Some(parallel) = args.parallel {
        opts.parallel_disks = parallel;
    }
    for (key, value) in &args.meta {
        opts.metadata.insert(key.clone(), meta_value(value));
    }
    if let Some(limit) = args.bandwidth_limit {
        opts.metadata.insert("bandwidth_limit".into(), json!(limit));
    }
    if args.checkpoint || args.resume {
        opts.metadata.insert("enable_checkpoints".into(), json!(true));
    }
    if args.resume {
        opts.metadata.insert("resume_from_checkpoint".into(), json!(true));
    }

    // Command-line values win over config defaults
    if let Some(config) = config {
        config.transfer.apply(&mut opts);
    }
    opts
}

pub async fn handle(
    provider: &dyn Provider,
    args: ExportArgs,
    config: Option<&VmexportConfig>,
) -> anyhow::Result<()> {
    let mut opts = build_options(&args, config);
    let reporter = (!args.quiet).then(|| Arc::new(BarReporter::new(&args.vm)));
    if let Some(reporter) = &reporter {
        opts = opts.with_progress_reporter(reporter.clone());
    }

    println!(
        "{} {} → {}",
        "Exporting".blue(),
        args.vm.cyan(),
        args.output.display()
    );

    let cancel = CancelToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Interrupt received, cancelling export...".yellow());
                cancel.cancel();
            }
        })
    };

    let outcome = provider.export_vm(&args.vm, &opts, &cancel).await;
    watcher.abort();

    let results = match outcome {
        Ok(results) => {
            if let Some(reporter) = &reporter {
                reporter.finish_success();
            }
            results
        }
        Err(e) if e.is_cancelled() => {
            if let Some(reporter) = &reporter {
                reporter.abandon("cancelled");
            }
            bail!("Export of {} cancelled", args.vm);
        }
        Err(e) => {
            if let Some(reporter) = &reporter {
                reporter.abandon("failed");
            }
            return Err(e.into());
        }
    };

    print_summary(&results);
    let estimator = config
        .map(|c| FlatRateEstimator::from_settings(&c.costs))
        .unwrap_or_default();
    print_cost_hint(&estimator, provider.provider_type(), &results);
    Ok(())
}

fn location(result: &ExportResult) -> String {
    if !result.local_path.as_os_str().is_empty() {
        return result.local_path.display().to_string();
    }
    result
        .remote_url()
        .or(result.image_name.as_deref())
        .unwrap_or_default()
        .to_string()
}

fn print_summary(results: &[ExportResult]) {
    println!();
    println!("{}", "✓ Export complete".green().bold());
    println!(
        "{}",
        format!("{:<28} {:<8} {:<6} {:>10}  {}", "DISK", "TYPE", "FORMAT", "SIZE", "LOCATION").bold()
    );
    for result in results {
        println!(
            "{:<28} {:<8} {:<6} {:>10}  {}",
            result.disk_name.cyan(),
            result.disk_type,
            result.format,
            format_bytes(result.size_bytes),
            location(result).dimmed()
        );
    }
}

/// Size in GB used for the estimate: downloaded bytes, or the declared disk
/// size when the image stayed in cloud storage
fn billed_size_gb(results: &[ExportResult]) -> f64 {
    results
        .iter()
        .map(|r| {
            if r.size_bytes > 0 {
                r.size_bytes as f64 / GIB
            } else {
                r.disk_size_gb.unwrap_or(0) as f64
            }
        })
        .sum()
}

fn print_cost_hint(estimator: &FlatRateEstimator, provider: ProviderType, results: &[ExportResult]) {
    let Some(storage_class) = FlatRateEstimator::default_storage_class(provider) else {
        return;
    };
    let size_gb = billed_size_gb(results);
    if size_gb <= 0.0 {
        return;
    }

    let query = CostQuery {
        provider,
        storage_class: storage_class.to_string(),
        size_gb,
        duration_days: COST_HINT_DAYS,
        transfer_gb: size_gb,
        requests: results.len() as u64,
    };
    if let Some(cost) = estimator.estimate_cost(&query) {
        println!();
        println!(
            "{} keeping {:.1} GB in {} storage for {} days and downloading it once: {:.2} {}",
            "Estimated cost of".dimmed(),
            size_gb,
            storage_class,
            COST_HINT_DAYS,
            cost,
            estimator.currency()
        );
    }
}
