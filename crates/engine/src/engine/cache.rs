#![forbid(unsafe_code)]

use super::{PublishEngine, load_node, projection_status, store_status};
use crate::locks::CancellationToken;
use crate::projector::{CacheDiscrepancy, RebuildReport};
use cms_core::{ContentId, NuCacheRow, OperationStatus};

impl PublishEngine {
    /// Re-projects one node's cache row from its committed state.
    pub fn resnapshot(&self, content_id: ContentId) -> Result<Option<NuCacheRow>, OperationStatus> {
        let _guard = self
            .locks
            .acquire(content_id, &CancellationToken::default())?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        load_node(&tx, content_id)?;
        let row = self
            .projector
            .resnapshot(&tx, content_id, self.clock.now_ms())
            .map_err(projection_status)?;
        tx.commit().map_err(store_status)?;
        Ok(row)
    }

    /// Re-projects every node in one transaction. Rows whose bytes are
    /// unchanged keep their `rv`.
    pub fn rebuild_cache(&self) -> Result<RebuildReport, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let report = self
            .projector
            .rebuild_all(&tx, self.clock.now_ms())
            .map_err(projection_status)?;
        tx.commit().map_err(store_status)?;
        tracing::info!(
            projected = report.projected,
            invalidated = report.invalidated,
            "cache rebuilt"
        );
        Ok(report)
    }

    pub fn verify_cache(&self) -> Result<Vec<CacheDiscrepancy>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        let discrepancies = self.projector.verify(&tx).map_err(projection_status)?;
        if !discrepancies.is_empty() {
            tracing::warn!(count = discrepancies.len(), "cache disagrees with content state");
        }
        Ok(discrepancies)
    }
}
