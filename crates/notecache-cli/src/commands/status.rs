//! Status command handler

use anyhow::Result;

use notecache_core::Config;

use crate::output::{Output, OutputFormat};
use crate::scope::Scope;

/// Show store contents and sync state
pub fn show(scope: &Scope<'_>, config: &Config, user: Option<&str>, output: &Output) -> Result<()> {
    let db_path = match user {
        Some(name) => config.user_db_path(name),
        None => config.notes_db_path(),
    };
    let status = scope.sync_status();
    let pending = scope.pending_changes();
    let folders = scope.list_folders().len();
    let deleted = scope.list_deleted().len();

    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({
            "store": scope.label(),
            "database": db_path,
            "counts": {
                "records": scope.len(),
                "folders": folders,
                "deleted": deleted
            },
            "sync": status,
            "pending_changes": pending
        }))?,
        OutputFormat::Quiet => {
            println!("{}", if status.is_healthy() { "ok" } else { "error" });
        }
        OutputFormat::Human => {
            println!("Store:     {}", scope.label());
            println!("Database:  {}", db_path.display());
            println!();
            println!("Records:   {}", scope.len());
            println!("Folders:   {}", folders);
            println!("In trash:  {}", deleted);
            println!();
            output.print_status(&status, pending);
        }
    }

    Ok(())
}
