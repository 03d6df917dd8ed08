//! Snapshot reconciliation.
//!
//! One generic loop turns "fresh snapshot vs. stored records" into adds,
//! patches and evictions. Categories only supply the hooks of [`Category`]:
//! how to find and normalize their entries, when a record is active, which
//! fields are diffed, and how derived histories evolve.

pub mod context;
pub mod pipeline;

#[cfg(test)]
mod tests;

use anyhow::{Context as _, Result};
use serde_json::Value;

use crate::engine::diff::record_difference;
use crate::engine::patch::{patch, Patch};
use crate::store::{Record, Table};

pub use context::PassContext;
pub use pipeline::{PassReport, Pipeline};

/// Per-category hooks for [`reconcile`].
pub trait Category: Send + Sync + 'static {
    type Record: Record;

    /// Table name.
    fn name(&self) -> &str;

    /// Raw entries of this category inside a snapshot.
    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value>;

    /// Stable id of a raw entry.
    fn id(&self, raw: &Value) -> Option<String>;

    fn normalize(&self, raw: &Value, ctx: &mut PassContext) -> Result<Self::Record>;

    fn is_active(&self, record: &Self::Record, now: i64) -> bool;

    /// Called for every fresh record that passed [`Category::is_active`],
    /// before it is compared with the stored one.
    fn on_active(&self, _record: &Self::Record, _ctx: &mut PassContext) {}

    /// Top-level fields compared by the default [`Category::diff`].
    fn diff_fields(&self) -> &'static [&'static str];

    /// Patches that bring `stored` up to `fresh`. Empty patches are ignored.
    fn diff(&self, stored: &Self::Record, fresh: &Self::Record) -> Result<Vec<Patch>> {
        Ok(vec![record_difference(stored, fresh, self.diff_fields())?])
    }

    /// Called once on a record before it is first stored.
    fn on_create(&self, _record: &mut Self::Record, _now: i64) {}

    /// Advances derived histories of `stored` from `fresh`.
    ///
    /// Mutates `stored` in place and returns a patch only when the change is
    /// worth persisting.
    fn track(&self, _stored: &mut Self::Record, _fresh: &Self::Record, _now: i64) -> Option<Patch> {
        None
    }

    /// Closes derived histories before the record is archived.
    fn finalize(&self, _record: &mut Self::Record, _now: i64) {}
}

/// What one reconciliation pass changed in a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Applies one snapshot to `table`.
pub fn reconcile<C: Category>(
    category: &C,
    table: &mut Table<C::Record>,
    snapshot: &Value,
    ctx: &mut PassContext,
) -> Result<ChangeSet> {
    let now = ctx.now;
    let mut old_ids = table.id_set();
    let mut changes = ChangeSet::default();

    for raw in category.entries(snapshot) {
        let Some(id) = category.id(raw) else {
            log::warn!("[RECONCILE] {}: entry without id skipped", category.name());
            continue;
        };

        let fresh = category
            .normalize(raw, ctx)
            .with_context(|| format!("normalize {} entry {id}", category.name()))?;
        if !category.is_active(&fresh, now) {
            continue;
        }
        category.on_active(&fresh, ctx);

        let patches = match table.get_mut(&id) {
            None => None,
            Some(stored) => {
                let mut applied = Vec::new();
                for diff in category.diff(stored, &fresh)? {
                    if diff.is_empty() {
                        continue;
                    }
                    patch(stored, &diff).with_context(|| format!("patch {id}"))?;
                    applied.push(diff);
                }
                applied.extend(category.track(stored, &fresh, now));
                Some(applied)
            }
        };

        match patches {
            None => {
                let mut record = fresh;
                category.on_create(&mut record, now);
                table.add(&id, record, true);
                log::debug!("[RECONCILE] {}: added {id}", category.name());
                changes.added.push(id.clone());
            }
            Some(applied) if !applied.is_empty() => {
                for diff in &applied {
                    table.update_tmp(&id, diff);
                }
                log::trace!("[RECONCILE] {}: {id} changed ({} patches)", category.name(), applied.len());
                changes.updated.push(id.clone());
            }
            Some(_) => {}
        }

        old_ids.remove(&id);
    }

    for id in old_ids {
        if let Some(record) = table.get_mut(&id) {
            category.finalize(record, now);
        }
        table.move_tmp(&id);
        log::debug!("[RECONCILE] {}: archived {id}", category.name());
        changes.removed.push(id);
    }

    table.set_last_update(now);
    Ok(changes)
}
