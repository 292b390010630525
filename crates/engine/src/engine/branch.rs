#![forbid(unsafe_code)]

use super::{BranchFilter, BranchReport, PublishEngine, PublishRequest, load_live_node, store_status};
use crate::locks::CancellationToken;
use cms_core::{ContentId, ContentNode, Culture, OperationStatus};
use std::collections::HashSet;

impl PublishEngine {
    /// Publishes `root` and then its descendants, parents before children.
    ///
    /// Every node runs in its own transaction under its own lock. A node whose
    /// parent failed is reported `PathNotPublished` without being attempted;
    /// a skipped node takes its whole subtree with it. Variant descendants publish the requested cultures they have content
    /// for; invariant ones publish their single slot.
    pub fn publish_branch(
        &self,
        root_id: ContentId,
        cultures: &[Culture],
        filter: BranchFilter,
        cancel: &CancellationToken,
    ) -> Result<BranchReport, OperationStatus> {
        cancel.check()?;
        let nodes = self.branch_nodes(root_id)?;

        let mut report = BranchReport::default();
        let mut failed: HashSet<ContentId> = HashSet::new();
        let mut skipped: HashSet<ContentId> = HashSet::new();

        for (index, node) in nodes.iter().enumerate() {
            let is_root = index == 0;
            let parent = node.parent_id.filter(|_| !is_root);
            if parent.is_some_and(|id| skipped.contains(&id)) {
                skipped.insert(node.id);
                continue;
            }
            if cancel.is_cancelled() {
                report.results.push((node.id, Err(OperationStatus::Cancelled)));
                failed.insert(node.id);
                continue;
            }
            if parent.is_some_and(|id| failed.contains(&id)) {
                report
                    .results
                    .push((node.id, Err(OperationStatus::PathNotPublished)));
                failed.insert(node.id);
                continue;
            }
            if !is_root && !filter.include_unpublished && !node.published {
                skipped.insert(node.id);
                continue;
            }

            let targets = if is_root {
                cultures.to_vec()
            } else {
                match self.branch_cultures(node, cultures)? {
                    Some(targets) => targets,
                    None => {
                        tracing::debug!(content_id = %node.id, "branch node has none of the requested cultures");
                        skipped.insert(node.id);
                        continue;
                    }
                }
            };

            let result = self.publish(
                PublishRequest::new(node.id, targets)
                    .force(filter.force_republish)
                    .cancel_with(cancel.clone()),
            );
            if result.is_err() {
                failed.insert(node.id);
            }
            report.results.push((node.id, result));
        }

        tracing::info!(
            root = %root_id,
            succeeded = report.succeeded().count(),
            failed = failed.len(),
            skipped = skipped.len(),
            "branch publish finished"
        );
        Ok(report)
    }

    fn branch_nodes(&self, root_id: ContentId) -> Result<Vec<ContentNode>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        let root = load_live_node(&tx, root_id)?;
        let mut nodes = vec![root.clone()];
        nodes.extend(
            tx.descendants(&root)
                .map_err(store_status)?
                .into_iter()
                .filter(|node| !node.trashed),
        );
        Ok(nodes)
    }

    /// `None` when a variant node has content for none of the requested cultures.
    fn branch_cultures(
        &self,
        node: &ContentNode,
        requested: &[Culture],
    ) -> Result<Option<Vec<Culture>>, OperationStatus> {
        if !self.policy.is_variant(node) {
            return Ok(Some(Vec::new()));
        }
        if requested.is_empty() {
            return Ok(Some(Vec::new()));
        }
        let available: Vec<Culture> = self
            .variant_states(node.id)?
            .into_values()
            .filter(|state| state.available)
            .map(|state| state.culture)
            .collect();
        let targets: Vec<Culture> = requested
            .iter()
            .filter(|culture| available.contains(culture))
            .cloned()
            .collect();
        Ok((!targets.is_empty()).then_some(targets))
    }
}
