//! Folder command handlers

use anyhow::{Context, Result};

use notecache_core::ROOT_KEY;

use crate::output::Output;
use crate::scope::Scope;

/// List every active folder
pub fn list(scope: &Scope<'_>, output: &Output) -> Result<()> {
    output.print_records(&scope.list_folders())
}

/// Print the folder tree below `key` (the root by default)
pub fn tree(scope: &Scope<'_>, key: Option<String>, output: &Output) -> Result<()> {
    let key = match key {
        Some(key) if key != ROOT_KEY => scope.resolve_id(&key)?,
        _ => ROOT_KEY.to_string(),
    };
    let nodes = scope
        .build_folder_tree(&key)
        .context("Failed to build folder tree")?;
    output.print_tree(&nodes)
}
