//! Inventory record model
//!
//! One record is one node in the remote inventory tree: a directory, a
//! link into another owner's tree, or an object. The API returns records
//! as JSON; snapshots keep the raw form verbatim, while traversal and
//! normalization work on the typed view parsed here.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scheme used by record references
pub const RESREC_SCHEME: &str = "resrec:///";

/// Record type as reported by the API.
///
/// Future record types deserialize as `Unknown` and are ignored by both
/// traversal and normalization instead of failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Directory,
    Link,
    Object,
    #[serde(other)]
    Unknown,
}

/// Typed view of one inventory listing entry.
///
/// Optional fields are populated per record type: `asset_uri` for links,
/// `thumbnail_uri` and `tags` for objects. The raw listing carries many
/// more presentation fields; those stay in the raw JSON and never reach
/// this struct.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub record_type: RecordType,
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub asset_uri: Option<String>,
    #[serde(default)]
    pub thumbnail_uri: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl InventoryRecord {
    /// Parse the typed view out of a raw listing entry.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| {
            let id = value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("<no id>");
            Error::MalformedRecord(format!("{id}: {e}"))
        })
    }

    /// Full inventory path of this record (`parent\name`).
    pub fn full_path(&self) -> String {
        format!("{}\\{}", self.path, self.name)
    }

    /// Canonical record reference (`resrec:///{id}`).
    pub fn resrec_uri(&self) -> String {
        format!("{RESREC_SCHEME}{}", self.id)
    }
}

/// Structured `resrec:///` reference.
///
/// Two shapes exist: `resrec:///{recordId}` (canonical record reference)
/// and `resrec:///{ownerId}/{recordId}` (link target in another owner's
/// tree). Anything else is a malformed record, not a silent miscompute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResrecRef {
    pub owner_id: Option<String>,
    pub record_id: String,
}

impl ResrecRef {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix(RESREC_SCHEME)
            .ok_or_else(|| Error::MalformedRecord(format!("bad resrec scheme: {uri}")))?;

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [record_id] => Ok(Self {
                owner_id: None,
                record_id: (*record_id).to_string(),
            }),
            [owner_id, record_id] => Ok(Self {
                owner_id: Some((*owner_id).to_string()),
                record_id: (*record_id).to_string(),
            }),
            _ => Err(Error::MalformedRecord(format!(
                "resrec reference has {} segments: {uri}",
                segments.len()
            ))),
        }
    }
}

/// Owner and path a link record resolves to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub owner_id: String,
    pub path: String,
}

/// One row destined for the catalog, already routed to its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    Item {
        name: String,
        link: String,
        path: String,
        thumbnail: String,
    },
    PublicFolder {
        name: String,
        link: String,
        path: String,
    },
    World {
        name: String,
        link: String,
        tags: String,
        path: String,
    },
}

/// Final backslash segment of an inventory path, used for snapshot naming.
pub fn final_segment(path: &str) -> &str {
    path.rsplit('\\').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_type_unknown_catch_all() {
        let rec: InventoryRecord = serde_json::from_value(json!({
            "recordType": "unknown_future_type",
            "id": "R-1",
            "name": "mystery",
            "path": "Inventory"
        }))
        .unwrap();
        assert_eq!(rec.record_type, RecordType::Unknown);
    }

    #[test]
    fn typed_view_of_object_record() {
        let rec = InventoryRecord::from_value(&json!({
            "recordType": "object",
            "id": "R-obj",
            "name": "Lamp",
            "path": "Inventory\\Props",
            "thumbnailUri": "resdb:///abcdef.webp",
            "tags": ["light", "prop"],
            "isPublic": true,
            "visits": 7
        }))
        .unwrap();
        assert_eq!(rec.record_type, RecordType::Object);
        assert_eq!(rec.full_path(), "Inventory\\Props\\Lamp");
        assert_eq!(rec.resrec_uri(), "resrec:///R-obj");
    }

    #[test]
    fn resrec_parse_both_shapes() {
        let canonical = ResrecRef::parse("resrec:///R-1").unwrap();
        assert_eq!(canonical.owner_id, None);
        assert_eq!(canonical.record_id, "R-1");

        let link = ResrecRef::parse("resrec:///U-owner/R-2").unwrap();
        assert_eq!(link.owner_id.as_deref(), Some("U-owner"));
        assert_eq!(link.record_id, "R-2");
    }

    #[test]
    fn resrec_parse_rejects_bad_shapes() {
        assert!(ResrecRef::parse("resdb:///abc").is_err());
        assert!(ResrecRef::parse("resrec:///a/b/c").is_err());
        assert!(ResrecRef::parse("resrec:///").is_err());
    }

    #[test]
    fn final_segment_of_path() {
        assert_eq!(final_segment("Inventory\\Props\\Lights"), "Lights");
        assert_eq!(final_segment("Inventory"), "Inventory");
    }
}
