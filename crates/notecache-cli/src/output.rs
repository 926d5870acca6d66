//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag, ids only)

use anyhow::{Context, Result};
use serde::Serialize;

use notecache_core::{FolderNode, Record, SearchHit, SyncStatus};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a value as pretty JSON
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
        println!("{}", text);
        Ok(())
    }

    /// Print a single record in full
    pub fn print_record(&self, record: &Record) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", record.id);
                println!("Type:     {}", record.item_type);
                println!("Title:    {}", record.title);
                println!("Parent:   {}", record.parent_key());
                if record.is_folder() {
                    println!("Notes:    {}", record.note_count);
                }
                if record.is_soft_deleted() {
                    println!("Deleted:  yes");
                }
                println!("Created:  {}", record.created);
                println!("Updated:  {}", record.updated);
                if !record.content.is_empty() {
                    println!();
                    println!("{}", record.content);
                }
            }
            OutputFormat::Json => self.json(record)?,
            OutputFormat::Quiet => println!("{}", record.id),
        }
        Ok(())
    }

    /// Print a list of records, one line each
    pub fn print_records(&self, records: &[&Record]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if records.is_empty() {
                    println!("No records found.");
                    return Ok(());
                }
                for record in records {
                    println!("{}", summary_line(record));
                }
                println!("\n{} record(s)", records.len());
            }
            OutputFormat::Json => self.json(records)?,
            OutputFormat::Quiet => {
                for record in records {
                    println!("{}", record.id);
                }
            }
        }
        Ok(())
    }

    /// Print a folder tree, indented by depth
    pub fn print_tree(&self, nodes: &[FolderNode]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if nodes.is_empty() {
                    println!("No folders found.");
                    return Ok(());
                }
                for node in nodes {
                    print_node(node, 0);
                }
                let total: usize = nodes.iter().map(FolderNode::size).sum();
                println!("\n{} folder(s)", total);
            }
            OutputFormat::Json => self.json(nodes)?,
            OutputFormat::Quiet => {
                for node in nodes {
                    print_node_ids(node);
                }
            }
        }
        Ok(())
    }

    /// Print keyword search results with their folder labels
    pub fn print_hits(&self, hits: &[SearchHit]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if hits.is_empty() {
                    println!("No matches.");
                    return Ok(());
                }
                for hit in hits {
                    println!(
                        "{} | {} | {}",
                        short_id(&hit.record.id),
                        truncate(&hit.folder_name, 20),
                        truncate(&hit.record.title, 45)
                    );
                }
                println!("\n{} match(es)", hits.len());
            }
            OutputFormat::Json => self.json(hits)?,
            OutputFormat::Quiet => {
                for hit in hits {
                    println!("{}", hit.record.id);
                }
            }
        }
        Ok(())
    }

    /// Print sync status
    pub fn print_status(&self, status: &SyncStatus, pending: usize) {
        println!(
            "Last sync: {}",
            status.last_sync_time.as_deref().unwrap_or("never")
        );
        println!("Pending:   {} change(s)", pending);
        match &status.error {
            Some(error) => println!("Error:     {}", error),
            None => println!("Error:     none"),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_node(node: &FolderNode, depth: usize) {
    println!(
        "{}{} {} ({})",
        "  ".repeat(depth),
        short_id(&node.record.id),
        node.record.title,
        node.record.note_count
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn print_node_ids(node: &FolderNode) {
    println!("{}", node.record.id);
    for child in &node.children {
        print_node_ids(child);
    }
}

/// One-line summary: short id, kind marker, title, content preview
fn summary_line(record: &Record) -> String {
    let marker = if record.is_folder() { "/" } else { " " };
    let deleted = if record.is_soft_deleted() { " [deleted]" } else { "" };
    format!(
        "{} |{}{}{} | {}",
        short_id(&record.id),
        marker,
        truncate(&record.title, 35),
        deleted,
        truncate_line(&record.content, 40)
    )
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((index, _)) => &id[..index],
        None => id,
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(truncate_line("", 20), "");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_summary_line_marks_folders_and_deleted() {
        let folder = Record::folder("Work").with_id("f1");
        assert!(summary_line(&folder).contains("/Work"));

        let mut note = Record::note("Plan", "first\nsecond").with_id("n1");
        note.is_deleted = Some(1);
        let line = summary_line(&note);
        assert!(line.contains("[deleted]"));
        assert!(line.ends_with("first"));
    }
}
