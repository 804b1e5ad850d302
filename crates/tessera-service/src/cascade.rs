// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cascading delete across the reference graph contributed by all consumers.
//!
//! Traversal is iterative and post-order: every descendant is deleted before
//! its ancestor. Identifiable objects are visited at most once per call;
//! consecutive objects without an id are bounded by the configured depth.

use std::collections::HashSet;
use std::sync::Arc;

use tessera_core::{Persistable, Reference, ReferenceCollector, TesseraError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ConsumerService;

/// What a single [`ConsumerService::cascade_delete`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Objects deleted through the manager.
    pub deleted: usize,
    /// Deletes the manager refused. Their siblings and ancestors were still processed.
    pub failed: usize,
    /// Edges to objects already visited in this call.
    pub skipped: usize,
    /// Edges dropped because a run of id-less objects exceeded the maximum depth.
    pub truncated: usize,
}

enum Step {
    Visit {
        target: Arc<dyn Persistable>,
        /// Length of the id-less run this target would extend.
        depth: usize,
    },
    Delete(Arc<dyn Persistable>),
}

impl ConsumerService {
    /// Ask every distinct registered consumer for the references of `object`.
    ///
    /// A consumer that fails is logged and skipped; the others still report.
    pub async fn collect_references(
        &self,
        object: &dyn Persistable,
        collector: &mut dyn ReferenceCollector,
    ) {
        let consumers = self.inner.registry.snapshot().await.distinct_consumers();
        for consumer in consumers {
            if let Err(e) = consumer.collect_references(object, collector).await {
                warn!(
                    consumer = %consumer.type_name(),
                    object_type = %object.type_name(),
                    error = %e,
                    "reference collection failed"
                );
            }
        }
    }

    async fn child_targets(&self, object: &dyn Persistable) -> Vec<Arc<dyn Persistable>> {
        let mut references: Vec<Reference> = Vec::new();
        self.collect_references(object, &mut references).await;
        references
            .into_iter()
            .filter(Reference::is_child)
            .map(|r| r.target)
            .collect()
    }

    /// Delete every object transitively CHILD-linked from `object`, but not
    /// `object` itself.
    ///
    /// Fails only when no persistence manager exists yet. Per-object failures
    /// are logged and counted in the report.
    pub async fn cascade_delete(
        &self,
        object: &dyn Persistable,
    ) -> Result<CascadeReport, TesseraError> {
        let manager = self.manager().ok_or(TesseraError::ManagerUnavailable)?;
        let max_depth = self.inner.config.max_cascade_depth;

        let mut report = CascadeReport::default();
        let mut visited: HashSet<Uuid> = HashSet::new();
        // A cycle back to the root must never delete it.
        if let Some(id) = object.object_id() {
            visited.insert(id);
        }

        let mut stack: Vec<Step> = self
            .child_targets(object)
            .await
            .into_iter()
            .rev()
            .map(|target| Step::Visit { target, depth: 1 })
            .collect();

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit { target, depth } => {
                    // Identified objects end an id-less run; only such runs count.
                    let run = match target.object_id() {
                        Some(id) => {
                            if !visited.insert(id) {
                                debug!(type_name = %target.type_name(), %id, "already visited");
                                report.skipped += 1;
                                continue;
                            }
                            0
                        }
                        None if depth > max_depth => {
                            warn!(
                                type_name = %target.type_name(),
                                max_depth,
                                "cascade depth limit reached; edge skipped"
                            );
                            report.truncated += 1;
                            continue;
                        }
                        None => depth,
                    };

                    let children = self.child_targets(target.as_ref()).await;
                    stack.push(Step::Delete(target));
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|child| Step::Visit {
                                target: child,
                                depth: run + 1,
                            }),
                    );
                }
                Step::Delete(target) => match manager.delete(target.as_ref()).await {
                    Ok(()) => {
                        debug!(type_name = %target.type_name(), id = ?target.object_id(), "cascade deleted");
                        report.deleted += 1;
                    }
                    Err(e) => {
                        warn!(
                            type_name = %target.type_name(),
                            id = ?target.object_id(),
                            error = %e,
                            "cascade delete failed"
                        );
                        report.failed += 1;
                    }
                },
            }
        }

        debug!(
            root = %object.type_name(),
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            truncated = report.truncated,
            "cascade finished"
        );
        Ok(report)
    }
}
