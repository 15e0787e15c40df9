//! Inventory tree traversal
//!
//! Walks the remote inventory breadth-first from one or more roots. Each
//! visited directory is persisted verbatim as a JSON snapshot before its
//! children are enqueued, so a partially failed dump still leaves every
//! completed directory on disk. Link records are resolved eagerly to
//! their true owner and path; failures of a single link never abort the
//! walk.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use resodex_common::config::{inventory_path, RootSpec};
use resodex_common::records::{
    final_segment, InventoryRecord, RecordType, ResolvedLink, ResrecRef,
};
use resodex_common::{Error, Result};

use crate::auth::AuthContext;
use crate::services::resonite_client::RecordSource;

/// Side file collecting every resolved link target of one dump invocation.
pub const RESOLVED_LINKS_FILE: &str = "_resolved_links.json";

/// Counters for one dump invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub directories_visited: usize,
    pub records_seen: usize,
    pub links_resolved: usize,
    pub links_failed: usize,
    pub snapshots_written: usize,
    pub records_skipped: usize,
}

impl DumpStats {
    fn merge(&mut self, other: DumpStats) {
        self.directories_visited += other.directories_visited;
        self.records_seen += other.records_seen;
        self.links_resolved += other.links_resolved;
        self.links_failed += other.links_failed;
        self.snapshots_written += other.snapshots_written;
        self.records_skipped += other.records_skipped;
    }
}

/// Breadth-first walker over one owner's inventory tree.
pub struct TraversalEngine<'a, S: RecordSource> {
    source: &'a S,
    dump_dir: PathBuf,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl<'a, S: RecordSource> TraversalEngine<'a, S> {
    pub fn new(source: &'a S, dump_dir: &Path, retry_attempts: u32, retry_backoff_ms: u64) -> Self {
        Self {
            source,
            dump_dir: dump_dir.to_path_buf(),
            retry_attempts,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
        }
    }

    /// Traverse every configured root, each with its own frontier and
    /// owner identity, then write the aggregated resolved-link side file.
    pub async fn dump_all(&self, roots: &[RootSpec], auth: &AuthContext) -> Result<DumpStats> {
        if roots.is_empty() {
            return Err(Error::Config("no traversal roots configured".into()));
        }

        std::fs::create_dir_all(&self.dump_dir)?;

        let mut stats = DumpStats::default();
        let mut resolved = Vec::new();

        for root in roots {
            let start = inventory_path(&root.path);
            tracing::info!(owner = %root.owner, path = %start, "dumping root");
            let root_stats = self
                .dump_root(&root.owner, &start, auth, &mut resolved)
                .await?;
            stats.merge(root_stats);
        }

        self.write_json_file(Path::new(RESOLVED_LINKS_FILE), &serde_json::to_value(&resolved)?)?;

        tracing::info!(
            directories = stats.directories_visited,
            records = stats.records_seen,
            links_resolved = stats.links_resolved,
            links_failed = stats.links_failed,
            "dump complete"
        );
        Ok(stats)
    }

    /// Walk one root. The frontier is FIFO; a path enters it exactly once
    /// (the visited set makes a repeated path a no-op instead of an
    /// unbounded loop on a cyclic tree).
    async fn dump_root(
        &self,
        owner: &str,
        start_path: &str,
        auth: &AuthContext,
        resolved: &mut Vec<ResolvedLink>,
    ) -> Result<DumpStats> {
        let mut stats = DumpStats::default();
        let mut frontier: VecDeque<String> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        frontier.push_back(start_path.to_string());
        visited.insert(start_path.to_string());

        while let Some(path) = frontier.pop_front() {
            let listing = match self.list_with_retry(owner, &path, auth).await {
                Ok(listing) => listing,
                Err(Error::NotFound(what)) => {
                    // Branch no longer exists remotely; skip it, keep walking
                    tracing::warn!(path = %path, "directory not found, skipping branch: {what}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            stats.directories_visited += 1;
            stats.records_seen += listing.len();

            self.write_snapshot(&path, &listing)?;
            stats.snapshots_written += 1;

            for raw in &listing {
                let record = match InventoryRecord::from_value(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(path = %path, "skipping malformed record: {e}");
                        stats.records_skipped += 1;
                        continue;
                    }
                };

                match record.record_type {
                    RecordType::Directory => {
                        let child = record.full_path();
                        tracing::debug!(dir = %child, "queued directory");
                        if visited.insert(child.clone()) {
                            frontier.push_back(child);
                        } else {
                            tracing::warn!(dir = %child, "path already visited, skipping repeat");
                        }
                    }
                    RecordType::Link => {
                        match self.resolve_record_link(&record, auth).await {
                            Ok(target) => {
                                stats.links_resolved += 1;
                                resolved.push(target);
                            }
                            Err(Error::NotFound(what)) => {
                                stats.links_failed += 1;
                                tracing::warn!(
                                    record = %record.id,
                                    "link target gone, dropping link: {what}"
                                );
                            }
                            Err(Error::MalformedRecord(what)) => {
                                stats.records_skipped += 1;
                                tracing::warn!("skipping malformed link: {what}");
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    RecordType::Object => {}
                    RecordType::Unknown => {
                        tracing::debug!(record = %record.id, "ignoring unknown record type");
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn resolve_record_link(
        &self,
        record: &InventoryRecord,
        auth: &AuthContext,
    ) -> Result<ResolvedLink> {
        let asset_uri = record.asset_uri.as_deref().ok_or_else(|| {
            Error::MalformedRecord(format!("{}: link record has no assetUri", record.id))
        })?;
        let reference = ResrecRef::parse(asset_uri)?;
        let owner = reference.owner_id.as_deref().ok_or_else(|| {
            Error::MalformedRecord(format!(
                "{}: link target {asset_uri} names no owner",
                record.id
            ))
        })?;

        let mut attempt = 0;
        loop {
            match self
                .source
                .resolve_link(owner, &reference.record_id, auth)
                .await
            {
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(
                        record = %reference.record_id,
                        attempt,
                        "transient fault resolving link, retrying: {e}"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn list_with_retry(
        &self,
        owner: &str,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<Value>> {
        let mut attempt = 0;
        loop {
            match self.source.list_children(owner, path, auth).await {
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::warn!(path = %path, attempt, "transient fault listing, retrying: {e}");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    fn write_snapshot(&self, path: &str, listing: &[Value]) -> Result<()> {
        let name = snapshot_name(path);
        self.write_json_file(Path::new(&name), &Value::Array(listing.to_vec()))
    }

    /// All-or-nothing file write: serialize to a temp file beside the
    /// target, then rename into place.
    fn write_json_file(&self, name: &Path, body: &Value) -> Result<()> {
        let target = self.dump_dir.join(name);
        let tmp = target.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(body)?;
        std::fs::write(&tmp, serialized).map_err(|e| {
            Error::Storage(format!("writing {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &target)
            .map_err(|e| Error::Storage(format!("committing {}: {e}", target.display())))?;
        tracing::debug!(file = %target.display(), "snapshot written");
        Ok(())
    }
}

/// Snapshot file name for a directory path, deterministic from the final
/// path segment.
pub fn snapshot_name(path: &str) -> String {
    format!("INV_{}.json", final_segment(path))
}
