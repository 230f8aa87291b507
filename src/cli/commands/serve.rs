//! API server command.

use console::style;

use crate::config::Settings;

/// Start the API server and the processing worker.
pub async fn cmd_serve(settings: &Settings) -> anyhow::Result<()> {
    println!("{} Preparing database...", style("→").cyan());
    match settings.database() {
        Ok(_) => println!("  {} Database ready", style("✓").green()),
        Err(e) => {
            eprintln!("  {} Database initialization failed: {}", style("✗").red(), e);
            return Err(e);
        }
    }

    println!(
        "{} Starting invox server at http://{}:{}",
        style("→").cyan(),
        settings.server.host,
        settings.server.port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings).await
}
