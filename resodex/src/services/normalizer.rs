//! Record normalization
//!
//! Two passes over the raw snapshots:
//!
//! - **prune**: strips presentation-only fields, adds the derived
//!   `resrecUri`/`thumbnailUrl` fields to objects, and partitions records
//!   into per-category JSON files (directories, links, and 27 name-letter
//!   buckets for objects).
//! - **classify**: turns one typed record into its catalog entry — links
//!   become public-folder rows, objects become items unless a `world_orb`
//!   tag reroutes them into the worlds table with a substituted link.

use std::path::{Path, PathBuf};

use serde_json::Value;

use resodex_common::records::{CatalogEntry, InventoryRecord, RecordType};
use resodex_common::{Error, Result};

/// Fields dropped during pruning; transient or presentation-only, never
/// carried into the catalog.
const STRIPPED_FIELDS: [&str; 13] = [
    "version",
    "isPublic",
    "isForPatrons",
    "isListed",
    "isReadOnly",
    "isDeleted",
    "creationTime",
    "lastModificationTime",
    "randomOrder",
    "visits",
    "rating",
    "ownerName",
    "ownerId",
];

/// Object bucket labels: one file per starting letter plus a catch-all.
const BUCKET_LETTERS: [&str; 27] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S",
    "T", "U", "V", "W", "X", "Y", "Z", "1",
];

const WORLD_ORB_TAG: &str = "world_orb";
const WORLD_URL_PREFIX: &str = "world_url";
// "world_url:" — stripped off the tag following a world orb marker
const WORLD_URL_STRIP: usize = 10;
// "resdb:///" prefix and ".webp"-length extension on thumbnail URIs
const THUMBNAIL_PREFIX: usize = 9;
const THUMBNAIL_SUFFIX: usize = 5;

/// Counters for one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub snapshots_read: usize,
    pub directories: usize,
    pub links: usize,
    pub objects: usize,
    pub records_skipped: usize,
}

/// Normalizes raw inventory records.
pub struct Normalizer {
    asset_url: String,
}

impl Normalizer {
    pub fn new(asset_url: &str) -> Self {
        Self {
            asset_url: asset_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetchable thumbnail URL from the templated `thumbnailUri`: drop the
    /// scheme prefix and the extension, prepend the asset host.
    pub fn thumbnail_url(&self, thumbnail_uri: &str) -> Result<String> {
        let hash = thumbnail_uri
            .get(THUMBNAIL_PREFIX..thumbnail_uri.len().saturating_sub(THUMBNAIL_SUFFIX))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::MalformedRecord(format!("thumbnail URI too short: {thumbnail_uri}"))
            })?;
        Ok(format!("{}/{hash}", self.asset_url))
    }

    /// Route one typed record to its catalog entry.
    ///
    /// Directories and unknown record types produce no entry. An object
    /// missing the fields its type requires is a malformed record, not a
    /// batch failure.
    pub fn classify(&self, record: &InventoryRecord) -> Result<Option<CatalogEntry>> {
        match record.record_type {
            RecordType::Directory | RecordType::Unknown => Ok(None),
            RecordType::Link => Ok(Some(CatalogEntry::PublicFolder {
                name: record.name.clone(),
                link: record.resrec_uri(),
                path: record.path.clone(),
            })),
            RecordType::Object => self.classify_object(record).map(Some),
        }
    }

    fn classify_object(&self, record: &InventoryRecord) -> Result<CatalogEntry> {
        let tags = record.tags.as_ref().ok_or_else(|| {
            Error::MalformedRecord(format!("{}: object has no tags", record.id))
        })?;

        // Every tag except world_url markers, space-terminated, in order.
        let mut tag_string = String::new();
        let mut world_link: Option<String> = None;

        for (index, tag) in tags.iter().enumerate() {
            if !tag.starts_with(WORLD_URL_PREFIX) {
                tag_string.push_str(tag);
                tag_string.push(' ');
            }

            if tag == WORLD_ORB_TAG {
                let url_tag = tags.get(index + 1).ok_or_else(|| {
                    Error::MalformedRecord(format!(
                        "{}: world_orb is the final tag, no world reference follows",
                        record.id
                    ))
                })?;
                world_link = Some(url_tag.get(WORLD_URL_STRIP..).unwrap_or("").to_string());
            }
        }

        if let Some(link) = world_link {
            Ok(CatalogEntry::World {
                name: record.name.clone(),
                link,
                tags: tag_string,
                path: record.path.clone(),
            })
        } else {
            let thumbnail_uri = record.thumbnail_uri.as_deref().ok_or_else(|| {
                Error::MalformedRecord(format!("{}: object has no thumbnailUri", record.id))
            })?;
            Ok(CatalogEntry::Item {
                name: record.name.clone(),
                link: record.resrec_uri(),
                path: record.path.clone(),
                thumbnail: self.thumbnail_url(thumbnail_uri)?,
            })
        }
    }

    /// Prune every snapshot in `dump_dir` into per-category files under
    /// `parsed_dir`. Each output file is serialized once as a single valid
    /// JSON array.
    pub fn prune_all(&self, dump_dir: &Path, parsed_dir: &Path) -> Result<PruneStats> {
        std::fs::create_dir_all(parsed_dir)?;

        let mut stats = PruneStats::default();
        let mut directories: Vec<Value> = Vec::new();
        let mut links: Vec<Value> = Vec::new();
        let mut buckets: [Vec<Value>; 27] = Default::default();

        for snapshot in snapshot_files(dump_dir)? {
            let contents = std::fs::read_to_string(&snapshot)?;
            let listing: Vec<Value> = serde_json::from_str(&contents).map_err(|e| {
                Error::Storage(format!("corrupt snapshot {}: {e}", snapshot.display()))
            })?;
            stats.snapshots_read += 1;

            for mut raw in listing {
                let record = match InventoryRecord::from_value(&raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(file = %snapshot.display(), "skipping record: {e}");
                        stats.records_skipped += 1;
                        continue;
                    }
                };

                if let Some(map) = raw.as_object_mut() {
                    for field in STRIPPED_FIELDS {
                        map.remove(field);
                    }
                }

                match record.record_type {
                    RecordType::Directory => {
                        directories.push(raw);
                        stats.directories += 1;
                    }
                    RecordType::Link => {
                        links.push(raw);
                        stats.links += 1;
                    }
                    RecordType::Object => {
                        let thumbnail_uri = record.thumbnail_uri.as_deref().unwrap_or("");
                        let thumbnail_url = match self.thumbnail_url(thumbnail_uri) {
                            Ok(url) => url,
                            Err(e) => {
                                tracing::warn!(record = %record.id, "skipping object: {e}");
                                stats.records_skipped += 1;
                                continue;
                            }
                        };
                        if let Some(map) = raw.as_object_mut() {
                            map.insert("resrecUri".into(), Value::String(record.resrec_uri()));
                            map.insert("thumbnailUrl".into(), Value::String(thumbnail_url));
                        }
                        buckets[bucket_index(&record.name)].push(raw);
                        stats.objects += 1;
                    }
                    RecordType::Unknown => {
                        tracing::debug!(record = %record.id, "ignoring unknown record type");
                        stats.records_skipped += 1;
                    }
                }
            }
        }

        write_array(&parsed_dir.join("_directories.json"), &directories)?;
        write_array(&parsed_dir.join("_links.json"), &links)?;
        for (bucket, letter) in buckets.iter().zip(BUCKET_LETTERS) {
            write_array(&parsed_dir.join(format!("obj_{letter}.json")), bucket)?;
        }

        tracing::info!(
            snapshots = stats.snapshots_read,
            directories = stats.directories,
            links = stats.links,
            objects = stats.objects,
            skipped = stats.records_skipped,
            "prune complete"
        );
        Ok(stats)
    }
}

/// Bucket index from the uppercased first character of a name: A–Z map to
/// 0–25, anything else (digits, symbols, empty, non-ASCII) to the 27th
/// catch-all bucket.
pub fn bucket_index(name: &str) -> usize {
    match name.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some(c @ 'A'..='Z') => (c as u8 - b'A') as usize,
        _ => 26,
    }
}

/// Snapshot files in a dump directory, sorted by name for deterministic
/// processing order. Side files (leading underscore) are excluded.
pub fn snapshot_files(dump_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dump_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("INV_") && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_array(path: &Path, entries: &[Value]) -> Result<()> {
    let serialized = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, serialized)
        .map_err(|e| Error::Storage(format!("writing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new("https://assets.example")
    }

    fn object_record(name: &str, tags: Vec<&str>) -> InventoryRecord {
        InventoryRecord::from_value(&json!({
            "recordType": "object",
            "id": "R-obj",
            "name": name,
            "path": "Inventory\\Props",
            "thumbnailUri": "resdb:///abcdef.webp",
            "tags": tags,
        }))
        .unwrap()
    }

    #[test]
    fn thumbnail_url_derivation() {
        let url = normalizer().thumbnail_url("resdb:///abcdef.webp").unwrap();
        assert_eq!(url, "https://assets.example/abcdef");
    }

    #[test]
    fn thumbnail_url_rejects_short_uri() {
        assert!(normalizer().thumbnail_url("resdb:///").is_err());
        assert!(normalizer().thumbnail_url("").is_err());
    }

    #[test]
    fn object_without_orb_becomes_item() {
        let record = object_record("Lamp", vec!["light", "prop"]);
        let entry = normalizer().classify(&record).unwrap().unwrap();
        assert_eq!(
            entry,
            CatalogEntry::Item {
                name: "Lamp".into(),
                link: "resrec:///R-obj".into(),
                path: "Inventory\\Props".into(),
                thumbnail: "https://assets.example/abcdef".into(),
            }
        );
    }

    #[test]
    fn world_orb_reroutes_to_world_with_stripped_link() {
        let record = object_record(
            "Sky Temple",
            vec!["color_red", "world_orb", "world_url:abc123xyz"],
        );
        let entry = normalizer().classify(&record).unwrap().unwrap();
        match entry {
            CatalogEntry::World { link, tags, .. } => {
                // "world_url:" (10 chars) stripped from the following tag
                assert_eq!(link, "abc123xyz");
                assert!(tags.contains("color_red"));
                assert!(!tags.contains("world_url"));
                // tag string keeps the orb marker and trailing spaces
                assert_eq!(tags, "color_red world_orb ");
            }
            other => panic!("expected World, got {other:?}"),
        }
    }

    #[test]
    fn world_orb_as_final_tag_is_malformed() {
        let record = object_record("Broken Orb", vec!["world_orb"]);
        let err = normalizer().classify(&record).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
        assert!(err.to_string().contains("R-obj"));
    }

    #[test]
    fn link_record_becomes_public_folder() {
        let record = InventoryRecord::from_value(&json!({
            "recordType": "link",
            "id": "L1",
            "name": "Shared Props",
            "path": "Inventory",
            "assetUri": "resrec:///U-other/R-dir",
        }))
        .unwrap();
        let entry = normalizer().classify(&record).unwrap().unwrap();
        assert_eq!(
            entry,
            CatalogEntry::PublicFolder {
                name: "Shared Props".into(),
                link: "resrec:///L1".into(),
                path: "Inventory".into(),
            }
        );
    }

    #[test]
    fn directory_and_unknown_produce_no_entry() {
        let directory = InventoryRecord::from_value(&json!({
            "recordType": "directory",
            "id": "D-1",
            "name": "Props",
            "path": "Inventory",
        }))
        .unwrap();
        assert!(normalizer().classify(&directory).unwrap().is_none());

        let unknown = InventoryRecord::from_value(&json!({
            "recordType": "unknown_future_type",
            "id": "X-1",
            "name": "???",
            "path": "Inventory",
        }))
        .unwrap();
        assert!(normalizer().classify(&unknown).unwrap().is_none());
    }

    #[test]
    fn object_without_tags_is_malformed() {
        let record = InventoryRecord::from_value(&json!({
            "recordType": "object",
            "id": "R-untagged",
            "name": "Thing",
            "path": "Inventory",
            "thumbnailUri": "resdb:///abcdef.webp",
        }))
        .unwrap();
        assert!(matches!(
            normalizer().classify(&record),
            Err(Error::MalformedRecord(_))
        ));
    }

    #[test]
    fn bucket_index_letters_and_catch_all() {
        assert_eq!(bucket_index("Apple"), 0);
        assert_eq!(bucket_index("apple"), 0);
        assert_eq!(bucket_index("Zebra"), 25);
        assert_eq!(bucket_index("42 cube"), 26);
        assert_eq!(bucket_index(""), 26);
        assert_eq!(bucket_index("Ω thing"), 26);
    }

    #[test]
    fn prune_partitions_and_writes_valid_arrays() {
        let dump = tempfile::tempdir().unwrap();
        let parsed = tempfile::tempdir().unwrap();

        let listing = json!([
            {
                "recordType": "directory", "id": "D-1", "name": "Props",
                "path": "Inventory", "isPublic": true, "visits": 3
            },
            {
                "recordType": "link", "id": "L-1", "name": "Shared",
                "path": "Inventory", "assetUri": "resrec:///U-x/R-y",
                "rating": 0.5
            },
            {
                "recordType": "object", "id": "O-1", "name": "Lamp",
                "path": "Inventory", "thumbnailUri": "resdb:///abcdef.webp",
                "tags": ["light"], "ownerName": "someone"
            },
            {
                "recordType": "unknown_future_type", "id": "U-1",
                "name": "???", "path": "Inventory"
            }
        ]);
        std::fs::write(
            dump.path().join("INV_Inventory.json"),
            serde_json::to_string(&listing).unwrap(),
        )
        .unwrap();

        let stats = normalizer().prune_all(dump.path(), parsed.path()).unwrap();
        assert_eq!(stats.snapshots_read, 1);
        assert_eq!(stats.directories, 1);
        assert_eq!(stats.links, 1);
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.records_skipped, 1);

        // every output parses as a valid JSON array
        let dirs: Vec<Value> = serde_json::from_str(
            &std::fs::read_to_string(parsed.path().join("_directories.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].get("isPublic").is_none());
        assert!(dirs[0].get("visits").is_none());

        let lamps: Vec<Value> = serde_json::from_str(
            &std::fs::read_to_string(parsed.path().join("obj_L.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(lamps[0]["resrecUri"], "resrec:///O-1");
        assert_eq!(lamps[0]["thumbnailUrl"], "https://assets.example/abcdef");
        assert!(lamps[0].get("ownerName").is_none());

        // all 27 bucket files exist, empty ones included
        for letter in BUCKET_LETTERS {
            let bucket: Vec<Value> = serde_json::from_str(
                &std::fs::read_to_string(parsed.path().join(format!("obj_{letter}.json")))
                    .unwrap(),
            )
            .unwrap();
            if letter != "L" {
                assert!(bucket.is_empty());
            }
        }
    }
}
