//! Note command handlers
//!
//! Every mutation that changes which folder counts a note (adding it,
//! moving it, trashing, restoring or removing it) refreshes the note counts
//! of the affected folder chains.

use anyhow::{bail, Context, Result};

use notecache_core::{Record, RecordPatch, ALL_NOTES, ROOT_KEY, UNFILED_NOTES};

use crate::output::{short_id, Output, OutputFormat};
use crate::scope::Scope;

/// Create a note, or a folder with `folder`
pub fn add(
    scope: &mut Scope<'_>,
    folder: bool,
    title: String,
    content: Option<String>,
    parent: Option<String>,
    output: &Output,
) -> Result<()> {
    let parent_id = match parent {
        Some(parent) => resolve_parent(scope, &parent)?,
        None => None,
    };

    let mut record = if folder {
        if content.is_some() {
            bail!("Folders have no content");
        }
        Record::folder(title)
    } else {
        Record::note(title, content.unwrap_or_default())
    };
    if let Some(parent_id) = parent_id {
        record = record.in_folder(parent_id);
    }

    let added = scope.add(record);
    refresh_counts(scope, &added)?;

    output.success(&format!("Added {} {}", added.item_type, short_id(&added.id)));
    if output.format == OutputFormat::Quiet {
        println!("{}", added.id);
    }
    Ok(())
}

/// Show one record
pub fn show(scope: &Scope<'_>, id: &str, output: &Output) -> Result<()> {
    let id = scope.resolve_id(id)?;
    let record = scope
        .get(&id)
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;
    output.print_record(record)
}

/// Change title, content or parent
pub fn edit(
    scope: &mut Scope<'_>,
    id: &str,
    title: Option<String>,
    content: Option<String>,
    parent: Option<String>,
    output: &Output,
) -> Result<()> {
    if title.is_none() && content.is_none() && parent.is_none() {
        bail!("Nothing to change. Pass --title, --content or --parent.");
    }

    let id = scope.resolve_id(id)?;
    let before = scope
        .get(&id)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;

    let mut patch = RecordPatch::new();
    if let Some(title) = title {
        patch = patch.title(title);
    }
    if let Some(content) = content {
        patch = patch.content(content);
    }
    if let Some(parent) = parent {
        let parent_id = resolve_parent(scope, &parent)?;
        if let Some(new_parent) = parent_id.as_deref() {
            if scope.is_in_subtree(&id, new_parent) {
                bail!(
                    "Cannot move {} into itself or one of its subfolders",
                    short_id(&id)
                );
            }
        }
        patch = patch.parent(parent_id.as_deref());
    }

    let moved = patch.moves();
    let after = scope
        .update(&id, patch)
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;

    if moved {
        refresh_counts(scope, &before)?;
        refresh_counts(scope, &after)?;
    }

    output.success(&format!("Updated {}", short_id(&after.id)));
    Ok(())
}

/// List records under a parent key
pub fn list(scope: &Scope<'_>, key: Option<String>, all: bool, output: &Output) -> Result<()> {
    let key = match key {
        Some(key) => resolve_key(scope, &key)?,
        None => ROOT_KEY.to_string(),
    };
    output.print_records(&scope.query_by_parent(&key, all))
}

/// Print the note count under a parent key
pub fn count(scope: &Scope<'_>, key: &str, output: &Output) -> Result<()> {
    let key = resolve_key(scope, key)?;
    let count = scope.count_by_parent(&key);

    match output.format {
        OutputFormat::Json => output.json(&serde_json::json!({"key": key, "count": count}))?,
        OutputFormat::Quiet => println!("{}", count),
        OutputFormat::Human => println!("{} note(s) under {}", count, key),
    }
    Ok(())
}

/// Soft-delete a record
pub fn trash(scope: &mut Scope<'_>, id: &str, output: &Output) -> Result<()> {
    let id = scope.resolve_id(id)?;
    let record = scope
        .soft_delete(&id)
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;
    refresh_counts(scope, &record)?;

    output.success(&format!("Moved {} to trash", short_id(&record.id)));
    Ok(())
}

/// Bring a soft-deleted record back
pub fn restore(scope: &mut Scope<'_>, id: &str, output: &Output) -> Result<()> {
    let id = scope.resolve_id(id)?;
    let record = scope
        .restore(&id)
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;
    refresh_counts(scope, &record)?;

    output.success(&format!("Restored {}", short_id(&record.id)));
    Ok(())
}

/// Remove a record for good
pub fn remove(scope: &mut Scope<'_>, id: &str, output: &Output) -> Result<()> {
    let id = scope.resolve_id(id)?;
    if !scope.query_by_parent(&id, true).is_empty() {
        bail!("Folder {} is not empty", short_id(&id));
    }

    let record = scope
        .delete(&id)
        .ok_or_else(|| anyhow::anyhow!("Record not found: {}", id))?;
    refresh_counts(scope, &record)?;

    output.success(&format!("Removed {}", short_id(&record.id)));
    Ok(())
}

/// List the trash
pub fn deleted(scope: &Scope<'_>, output: &Output) -> Result<()> {
    output.print_records(&scope.list_deleted())
}

/// Recompute folder counts above `record`
fn refresh_counts(scope: &mut Scope<'_>, record: &Record) -> Result<()> {
    scope
        .propagate_count_up_to_root(record)
        .context("Failed to update folder counts")
}

/// Parent argument to an id; `root` or an empty string means no parent
fn resolve_parent(scope: &Scope<'_>, parent: &str) -> Result<Option<String>> {
    if parent.is_empty() || parent == ROOT_KEY {
        return Ok(None);
    }
    let id = scope.resolve_id(parent)?;
    match scope.get(&id) {
        Some(record) if record.is_folder() => Ok(Some(id)),
        _ => bail!("Not a folder: {}", parent),
    }
}

/// Listing key: reserved keys pass through, anything else is an id prefix
fn resolve_key(scope: &Scope<'_>, key: &str) -> Result<String> {
    match key {
        ROOT_KEY | ALL_NOTES | UNFILED_NOTES => Ok(key.to_string()),
        _ => scope.resolve_id(key),
    }
}
