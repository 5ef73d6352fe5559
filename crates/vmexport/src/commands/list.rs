use colored::Colorize;
use vmexport_core::{Provider, VmFilter, VmInfo};

pub async fn handle(provider: &dyn Provider, filter: &VmFilter, json: bool) -> anyhow::Result<()> {
    let vms = provider.list_vms(filter).await?;
    print_vms(&vms, json)
}

pub async fn handle_search(provider: &dyn Provider, query: &str, json: bool) -> anyhow::Result<()> {
    let vms = provider.search_vms(query).await?;
    print_vms(&vms, json)
}

fn state_colored(state: &str) -> colored::ColoredString {
    let lower = state.to_lowercase();
    if lower.contains("running") {
        state.green()
    } else if lower.contains("stop") || lower.contains("terminated") || lower.contains("deallocated") {
        state.red()
    } else {
        state.yellow()
    }
}

fn print_vms(vms: &[VmInfo], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(vms)?);
        return Ok(());
    }

    if vms.is_empty() {
        println!("{}", "No VMs found".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<28} {:<16} {:<18} {:>5} {:>8} {:<30}",
            "NAME", "STATE", "LOCATION", "CPUS", "DISK GB", "IP ADDRESSES"
        )
        .bold()
    );
    println!("{}", "─".repeat(110).dimmed());

    for vm in vms {
        let cpus = if vm.num_cpus == 0 {
            "-".to_string()
        } else {
            vm.num_cpus.to_string()
        };
        println!(
            "{:<28} {:<16} {:<18} {:>5} {:>8} {:<30}",
            vm.name.cyan(),
            state_colored(&vm.state),
            vm.location,
            cpus,
            vm.storage_gb,
            vm.ip_addresses.join(", ").dimmed()
        );
    }
    println!();
    println!("{} VM(s)", vms.len());
    Ok(())
}
