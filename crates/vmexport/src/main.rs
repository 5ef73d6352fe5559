mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vmexport::utils::parse_key_value;
use vmexport::{default_registry, resolve_target};
use vmexport_config::VmexportConfig;

#[derive(Parser)]
#[command(name = "vmexport")]
#[command(about = "Export cloud virtual machines to local disk images", long_about = None)]
struct Cli {
    /// Profile from the config file
    #[arg(short, long, global = true, env = "VMEXPORT_PROFILE")]
    profile: Option<String>,
    /// Provider type (azure, gcp, aws)
    #[arg(short = 'P', long, global = true)]
    provider: Option<String>,
    /// Config file, bypassing discovery
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the providers built into this binary and their capabilities
    Providers,
    /// Check that the provider accepts the configured credentials
    Validate,
    /// List VMs
    List {
        /// Glob pattern on the VM name
        #[arg(short, long)]
        name: Option<String>,
        /// Power state, e.g. "running"
        #[arg(short, long)]
        state: Option<String>,
        #[arg(short, long)]
        location: Option<String>,
        /// Required tag, KEY=VALUE (repeatable)
        #[arg(short, long = "tag", value_parser = parse_key_value)]
        tags: Vec<(String, String)>,
        #[arg(long)]
        json: bool,
    },
    /// Case-insensitive search over names, states, locations and tags
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one VM
    Show {
        /// VM name or ID
        vm: String,
        #[arg(long)]
        json: bool,
    },
    /// Export every disk of a VM
    Export {
        /// VM name or ID
        vm: String,
        /// Directory for disk images, manifest and metadata
        #[arg(short, long, default_value = "exports")]
        output: PathBuf,
        /// Image format (provider default when omitted)
        #[arg(short, long)]
        format: Option<String>,
        /// Disks exported concurrently
        #[arg(short = 'j', long)]
        parallel: Option<usize>,
        /// Download limit in bytes per second
        #[arg(long)]
        bandwidth_limit: Option<u64>,
        /// Write checkpoints so an interrupted download can resume
        #[arg(long)]
        checkpoint: bool,
        /// Resume from existing checkpoints
        #[arg(long)]
        resume: bool,
        /// Provider-specific option, KEY=VALUE (repeatable)
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        meta: Vec<(String, String)>,
        /// No progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show version
    Version,
}

fn load_config(explicit: Option<&PathBuf>) -> anyhow::Result<Option<VmexportConfig>> {
    match explicit {
        Some(path) => Ok(Some(VmexportConfig::load(path)?)),
        None => Ok(vmexport_config::load_config()?.map(|(path, config)| {
            tracing::debug!(path = %path.display(), "Using config file");
            config
        })),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("vmexport {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let registry = default_registry();
    if matches!(cli.command, Commands::Providers) {
        return commands::providers::handle(&registry);
    }

    let config = load_config(cli.config.as_ref())?;
    let target = resolve_target(
        config.as_ref(),
        cli.profile.as_deref(),
        cli.provider.as_deref(),
    )?;
    let mut provider = commands::connect(&registry, &target).await?;

    let outcome = match cli.command {
        Commands::Validate => commands::validate::handle(provider.as_ref()).await,
        Commands::List {
            name,
            state,
            location,
            tags,
            json,
        } => {
            let filter = vmexport_core::VmFilter {
                name_pattern: name,
                state,
                location,
                tags: tags.into_iter().collect(),
                ..Default::default()
            };
            commands::list::handle(provider.as_ref(), &filter, json).await
        }
        Commands::Search { query, json } => {
            commands::list::handle_search(provider.as_ref(), &query, json).await
        }
        Commands::Show { vm, json } => commands::show::handle(provider.as_ref(), &vm, json).await,
        Commands::Export {
            vm,
            output,
            format,
            parallel,
            bandwidth_limit,
            checkpoint,
            resume,
            meta,
            quiet,
        } => {
            let args = commands::export::ExportArgs {
                vm,
                output,
                format,
                parallel,
                bandwidth_limit,
                checkpoint,
                resume,
                meta,
                quiet,
            };
            commands::export::handle(provider.as_ref(), args, config.as_ref()).await
        }
        Commands::Providers | Commands::Version => {
            unreachable!("handled before connecting")
        }
    };

    if let Err(e) = provider.disconnect().await {
        tracing::warn!(error = %e, "Disconnect failed");
    }
    outcome
}
