//! Search command handler

use anyhow::{Context, Result};

use notecache_core::{SearchHit, ROOT_KEY};

use crate::output::Output;
use crate::scope::Scope;

/// Label for hits found directly under the search root
const TOP_LABEL: &str = "All notes";

/// Search note content in memory, or title and content in the database
pub async fn search(
    scope: &Scope<'_>,
    keyword: &str,
    parent: Option<String>,
    persisted: bool,
    output: &Output,
) -> Result<()> {
    let hits = if persisted {
        scope
            .search_in_persisted_store(keyword)
            .await
            .into_iter()
            .map(|record| {
                let folder_name = folder_label(scope, record.parent_id.as_deref());
                SearchHit {
                    record,
                    folder_name,
                }
            })
            .collect()
    } else {
        let (key, label) = match parent {
            Some(parent) if parent != ROOT_KEY => {
                let id = scope.resolve_id(&parent)?;
                let label = folder_label(scope, Some(&id));
                (id, label)
            }
            _ => (ROOT_KEY.to_string(), TOP_LABEL.to_string()),
        };
        scope
            .search_by_keyword(&key, &label, keyword)
            .context("Search failed")?
    };

    output.print_hits(&hits)
}

/// Title of the folder `parent_id`, or the top label at the root
fn folder_label(scope: &Scope<'_>, parent_id: Option<&str>) -> String {
    parent_id
        .and_then(|id| scope.get(id))
        .map(|folder| folder.title.clone())
        .unwrap_or_else(|| TOP_LABEL.to_string())
}
