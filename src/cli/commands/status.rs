//! Job status command.

use console::style;

use crate::config::Settings;
use crate::services::{StatusError, StatusService};

pub fn cmd_status(settings: &Settings, job_id: &str, tenant: &str) -> anyhow::Result<()> {
    let db = settings.database()?;
    let service = StatusService::new(&db);
    match service.job_status(job_id, tenant) {
        Ok(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Err(StatusError::NotFound) => {
            eprintln!("{} Job not found", style("✗").red());
            Err(anyhow::anyhow!("job not found"))
        }
        Err(e) => Err(e.into()),
    }
}
