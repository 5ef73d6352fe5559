use colored::Colorize;
use vmexport_core::Provider;

pub async fn handle(provider: &dyn Provider, identifier: &str, json: bool) -> anyhow::Result<()> {
    let vm = provider.get_vm(identifier).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&vm)?);
        return Ok(());
    }

    println!("{}", vm.name.cyan().bold());
    println!("  ID:        {}", vm.id);
    println!("  Provider:  {}", vm.provider);
    println!("  State:     {}", vm.state);
    println!("  Location:  {}", vm.location);
    if !vm.guest_os.is_empty() {
        println!("  Guest OS:  {}", vm.guest_os);
    }
    if vm.num_cpus > 0 {
        println!("  CPUs:      {}", vm.num_cpus);
    }
    if vm.memory_mb > 0 {
        println!("  Memory:    {} MB", vm.memory_mb);
    }
    println!("  Storage:   {} GB", vm.storage_gb);
    if !vm.ip_addresses.is_empty() {
        println!("  IPs:       {}", vm.ip_addresses.join(", "));
    }
    if let Some(created) = vm.created_at {
        println!("  Created:   {}", created.to_rfc3339());
    }

    let disks = vm.disk_names();
    if !disks.is_empty() {
        println!();
        println!("{}", "Disks:".bold());
        for (i, disk) in disks.iter().enumerate() {
            let role = if i == 0 { "boot" } else { "data" };
            println!("  - {} ({})", disk, role.dimmed());
        }
    }

    if !vm.tags.is_empty() {
        println!();
        println!("{}", "Tags:".bold());
        let mut tags: Vec<_> = vm.tags.iter().collect();
        tags.sort();
        for (key, value) in tags {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    let mut keys: Vec<_> = vm.metadata.keys().filter(|k| *k != "disk_names").collect();
    if !keys.is_empty() {
        keys.sort();
        println!();
        println!("{}", "Metadata:".bold());
        for key in keys {
            let value = &vm.metadata[key];
            let rendered = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            println!("  {}: {}", key, rendered.dimmed());
        }
    }
    Ok(())
}
