//! Data models for notecache
//!
//! Notes and folders share a single [`Record`] type, told apart by
//! [`ItemType`]. Folders form a tree through `parent_id`; a record without a
//! parent lives at the root.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timestamp;

/// Parent key of records without a parent
pub const ROOT_KEY: &str = "root";

/// Listing key selecting every active note regardless of parent
pub const ALL_NOTES: &str = "allnotes";

/// Listing key selecting active notes that sit at the root
pub const UNFILED_NOTES: &str = "unfilednotes";

/// Value of `is_deleted` for soft-deleted records
pub const DELETED: i64 = 1;

/// Value of `is_deleted` for records that were explicitly restored or created active
pub const ACTIVE: i64 = 0;

/// Bucket key for a parent id
pub fn parent_key(parent_id: Option<&str>) -> &str {
    match parent_id {
        Some(id) if !id.is_empty() => id,
        _ => ROOT_KEY,
    }
}

/// Kind of record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Note,
    Folder,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Note => "note",
            ItemType::Folder => "folder",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(ItemType::Note),
            "folder" => Some(ItemType::Folder),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note or folder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Unique identifier
    pub id: String,
    /// Note or folder
    pub item_type: ItemType,
    /// Containing folder, `None` for the root
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Creation time (timestamp string)
    #[serde(default)]
    pub created: String,
    /// Last logical mutation (timestamp string)
    #[serde(default)]
    pub updated: String,
    /// `Some(1)` when soft-deleted; `Some(0)` and `None` both mean active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<i64>,
    /// Cached number of notes below a folder, recursive through subfolders
    #[serde(default)]
    pub note_count: i64,
    #[serde(default)]
    pub version: i64,
}

impl Record {
    /// Create a new note at the root
    pub fn note(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_type(ItemType::Note, title.into(), content.into())
    }

    /// Create a new empty folder at the root
    pub fn folder(title: impl Into<String>) -> Self {
        Self::with_type(ItemType::Folder, title.into(), String::new())
    }

    fn with_type(item_type: ItemType, title: String, content: String) -> Self {
        let now = timestamp::now();
        Self {
            id: Uuid::new_v4().to_string(),
            item_type,
            parent_id: None,
            title,
            content,
            created: now.clone(),
            updated: now,
            is_deleted: Some(ACTIVE),
            note_count: 0,
            version: 1,
        }
    }

    /// Builder: place the record under `parent_id`
    pub fn in_folder(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Builder: replace the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn is_note(&self) -> bool {
        self.item_type == ItemType::Note
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    /// Active unless explicitly soft-deleted; a missing flag counts as active
    pub fn is_active(&self) -> bool {
        self.is_deleted != Some(DELETED)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.is_deleted == Some(DELETED)
    }

    /// Bucket key in the by-parent index
    pub fn parent_key(&self) -> &str {
        parent_key(self.parent_id.as_deref())
    }

    /// Value of a sortable column, by persisted column name
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "title" => Some(&self.title),
            "created" => Some(&self.created),
            "updated" => Some(&self.updated),
            "item_type" => Some(self.item_type.as_str()),
            "parent_id" => Some(self.parent_key()),
            _ => None,
        }
    }

    /// Merge a patch over this record
    ///
    /// `updated` is taken from the patch when present, otherwise set to now.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(item_type) = patch.item_type {
            self.item_type = item_type;
        }
        if let Some(parent_id) = patch.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(created) = patch.created {
            self.created = created;
        }
        if let Some(is_deleted) = patch.is_deleted {
            self.is_deleted = is_deleted;
        }
        if let Some(note_count) = patch.note_count {
            self.note_count = note_count;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        self.updated = patch.updated.unwrap_or_else(timestamp::now);
    }
}

/// Partial update of a [`Record`]
///
/// Unset fields are left untouched. `parent_id` and `is_deleted` are nested
/// options so a patch can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub item_type: Option<ItemType>,
    pub parent_id: Option<Option<String>>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub is_deleted: Option<Option<i64>>,
    pub note_count: Option<i64>,
    pub version: Option<i64>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Move under `parent_id`, or to the root with `None`
    pub fn parent(mut self, parent_id: Option<&str>) -> Self {
        self.parent_id = Some(parent_id.map(str::to_string));
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.is_deleted = Some(Some(if deleted { DELETED } else { ACTIVE }));
        self
    }

    pub fn note_count(mut self, count: i64) -> Self {
        self.note_count = Some(count);
        self
    }

    /// Pin `updated` instead of stamping the current time
    pub fn updated(mut self, updated: impl Into<String>) -> Self {
        self.updated = Some(updated.into());
        self
    }

    /// Whether applying this patch can move the record between parent buckets
    pub fn moves(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// A folder and its subfolders
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FolderNode {
    pub record: Record,
    pub children: Vec<FolderNode>,
}

impl FolderNode {
    /// Number of folders in this subtree, including this one
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(FolderNode::size).sum::<usize>()
    }
}

/// A note matched by keyword search, labelled with the folder it was found in
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: Record,
    pub folder_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_new() {
        let note = Record::note("Title", "Body");
        assert!(note.is_note());
        assert!(note.is_active());
        assert_eq!(note.parent_key(), ROOT_KEY);
        assert_eq!(note.created, note.updated);
        assert!(!note.id.is_empty());
    }

    #[test]
    fn test_folder_in_folder() {
        let folder = Record::folder("Inner").in_folder("outer");
        assert!(folder.is_folder());
        assert_eq!(folder.parent_key(), "outer");
    }

    #[test]
    fn test_parent_key_treats_empty_as_root() {
        assert_eq!(parent_key(None), ROOT_KEY);
        assert_eq!(parent_key(Some("")), ROOT_KEY);
        assert_eq!(parent_key(Some("abc")), "abc");
    }

    #[test]
    fn test_missing_deleted_flag_is_active() {
        let mut note = Record::note("t", "c");
        note.is_deleted = None;
        assert!(note.is_active());
        note.is_deleted = Some(ACTIVE);
        assert!(note.is_active());
        note.is_deleted = Some(DELETED);
        assert!(!note.is_active());
        assert!(note.is_soft_deleted());
    }

    #[test]
    fn test_apply_patch() {
        let mut note = Record::note("Old", "Body").with_id("n1");
        let before = note.updated.clone();

        note.apply(RecordPatch::new().title("New").parent(Some("f1")));

        assert_eq!(note.id, "n1");
        assert_eq!(note.title, "New");
        assert_eq!(note.content, "Body");
        assert_eq!(note.parent_id.as_deref(), Some("f1"));
        assert!(note.updated > before);
    }

    #[test]
    fn test_apply_patch_pins_updated_and_clears_parent() {
        let mut note = Record::note("t", "c").in_folder("f1");
        note.apply(
            RecordPatch::new()
                .parent(None)
                .updated("2020-01-01 00:00:00.000Z"),
        );
        assert!(note.parent_id.is_none());
        assert_eq!(note.updated, "2020-01-01 00:00:00.000Z");
    }

    #[test]
    fn test_item_type_parse() {
        assert_eq!(ItemType::parse("note"), Some(ItemType::Note));
        assert_eq!(ItemType::parse("folder"), Some(ItemType::Folder));
        assert_eq!(ItemType::parse("link"), None);
        assert_eq!(format!("{}", ItemType::Folder), "folder");
    }

    #[test]
    fn test_record_deserializes_without_optional_fields() {
        let json = r#"{"id":"a","item_type":"note","title":"t","content":"c"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "a");
        assert!(record.parent_id.is_none());
        assert!(record.is_deleted.is_none());
        assert!(record.is_active());
        assert_eq!(record.note_count, 0);
    }

    #[test]
    fn test_search_hit_flattens_record() {
        let hit = SearchHit {
            record: Record::note("t", "c").with_id("n1"),
            folder_name: "Inbox".to_string(),
        };
        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["id"], "n1");
        assert_eq!(value["folder_name"], "Inbox");
    }

    #[test]
    fn test_folder_node_size() {
        let leaf = FolderNode {
            record: Record::folder("leaf"),
            children: Vec::new(),
        };
        let root = FolderNode {
            record: Record::folder("root"),
            children: vec![leaf.clone(), leaf],
        };
        assert_eq!(root.size(), 3);
    }
}
