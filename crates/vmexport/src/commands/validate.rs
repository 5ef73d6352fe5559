use colored::Colorize;
use vmexport_core::Provider;

pub async fn handle(provider: &dyn Provider) -> anyhow::Result<()> {
    println!("{}", "Validating credentials...".blue());

    match provider.validate_credentials().await {
        Ok(()) => {
            println!("{}", "✓ Credentials are valid".green().bold());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", "✗ Credential check failed".red().bold());
            eprintln!("  {}", e);
            Err(e.into())
        }
    }
}
