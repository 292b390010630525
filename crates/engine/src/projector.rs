#![forbid(unsafe_code)]

use crate::serializer::{CacheDocument, CacheSerializeError, CacheSerializer, PublishedCulture};
use cms_core::{ContentId, ContentNode, NuCacheRow, Version, VersionId};
use cms_storage::{StoreError, StoreTx};
use sha2::Digest as _;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Debug)]
pub enum ProjectionError {
    Store(StoreError),
    Serialize(CacheSerializeError),
}

impl std::fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "cache projection: {err}"),
            Self::Serialize(err) => write!(f, "cache serialization: {err}"),
        }
    }
}

impl std::error::Error for ProjectionError {}

impl From<StoreError> for ProjectionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<CacheSerializeError> for ProjectionError {
    fn from(value: CacheSerializeError) -> Self {
        Self::Serialize(value)
    }
}

/// Serialized published view plus its content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projection {
    pub data: Vec<u8>,
    pub data_hash: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub projected: usize,
    pub invalidated: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheDiscrepancyKind {
    /// Node is published but has no row.
    Missing,
    /// Row exists for a node that is not published.
    Orphaned,
    /// Row content differs from a fresh projection.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheDiscrepancy {
    pub content_id: ContentId,
    pub kind: CacheDiscrepancyKind,
}

/// Materializes published state into the `nucache` table.
///
/// Every method runs inside the caller's transaction so a projection failure
/// rolls back the state change that triggered it.
#[derive(Clone)]
pub struct NuCacheProjector {
    serializer: Arc<dyn CacheSerializer>,
}

impl std::fmt::Debug for NuCacheProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NuCacheProjector").finish_non_exhaustive()
    }
}

impl NuCacheProjector {
    pub fn new(serializer: Arc<dyn CacheSerializer>) -> Self {
        Self { serializer }
    }

    /// Builds the published view of `node` without writing anything.
    /// `None` when no culture is published.
    pub fn project(
        &self,
        tx: &StoreTx<'_>,
        node: &ContentNode,
    ) -> Result<Option<Projection>, ProjectionError> {
        if !node.published || node.trashed {
            return Ok(None);
        }
        let states = tx.variant_states(node.id)?;
        let mut versions: BTreeMap<VersionId, Version> = BTreeMap::new();
        for state in states.values().filter(|state| state.published) {
            if let Some(version_id) = state.published_version_id {
                if !versions.contains_key(&version_id) {
                    versions.insert(version_id, tx.require_version(version_id)?);
                }
            }
        }
        // Shared values follow the most recently published version.
        let Some(invariant_source) = versions.values().next_back() else {
            return Ok(None);
        };

        let cultures = states
            .values()
            .filter(|state| state.published)
            .filter_map(|state| {
                let version = versions.get(&state.published_version_id?)?;
                Some(PublishedCulture {
                    culture: &state.culture,
                    name: version
                        .names
                        .get(&state.culture)
                        .map(String::as_str)
                        .or(state.name.as_deref()),
                    published_at_ms: state.published_at_ms,
                    version,
                })
            })
            .collect();

        let doc = CacheDocument {
            node,
            cultures,
            invariant_source,
        };
        let data = self.serializer.serialize(&doc)?;
        let data_hash = sha256_hex(&data);
        Ok(Some(Projection { data, data_hash }))
    }

    /// Re-projects one node. Writes nothing (and keeps `rv`) when the output is
    /// unchanged; drops the row when nothing is published.
    pub fn resnapshot(
        &self,
        tx: &StoreTx<'_>,
        content_id: ContentId,
        now_ms: i64,
    ) -> Result<Option<NuCacheRow>, ProjectionError> {
        let node = tx.require_content(content_id)?;
        match self.project(tx, &node)? {
            Some(projection) => Ok(Some(tx.nucache_upsert(
                content_id,
                &projection.data,
                &projection.data_hash,
                now_ms,
            )?)),
            None => {
                tx.nucache_delete(content_id)?;
                Ok(None)
            }
        }
    }

    pub fn invalidate(&self, tx: &StoreTx<'_>, content_id: ContentId) -> Result<bool, StoreError> {
        tx.nucache_delete(content_id)
    }

    pub fn rebuild_all(&self, tx: &StoreTx<'_>, now_ms: i64) -> Result<RebuildReport, ProjectionError> {
        let mut report = RebuildReport::default();
        for node in tx.all_contents()? {
            match self.resnapshot(tx, node.id, now_ms)? {
                Some(_) => report.projected += 1,
                None => report.invalidated += 1,
            }
        }
        Ok(report)
    }

    /// Compares every node's cache row with what a projection would write now.
    pub fn verify(&self, tx: &StoreTx<'_>) -> Result<Vec<CacheDiscrepancy>, ProjectionError> {
        let mut out = Vec::new();
        for node in tx.all_contents()? {
            let expected = self.project(tx, &node)?;
            let actual = tx.nucache_row(node.id)?;
            let kind = match (expected, actual) {
                (Some(_), None) => Some(CacheDiscrepancyKind::Missing),
                (None, Some(_)) => Some(CacheDiscrepancyKind::Orphaned),
                (Some(expected), Some(actual)) if expected.data_hash != actual.data_hash => {
                    Some(CacheDiscrepancyKind::Stale)
                }
                _ => None,
            };
            if let Some(kind) = kind {
                out.push(CacheDiscrepancy {
                    content_id: node.id,
                    kind,
                });
            }
        }
        Ok(out)
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let digest = sha2::Sha256::digest(data);
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
