//! Result Assembler
//!
//! Attaches fetched children to their parents by writing per-parent
//! linkage. Assembly only overwrites entries, so running it twice over the
//! same node yields the same linkage.

use super::node::{Cardinality, LinkKeys, Linkage, ParentLink, PlanNode, ResourceIdentifier};
use crate::storage::{Record, RecordKey};
use std::collections::BTreeMap;

/// Write linkage for every child link of `parent`
pub fn assemble(parent: &mut PlanNode) {
    for child in &parent.children {
        let Some(link) = &child.link else {
            continue;
        };

        for (parent_id, linkage) in link_children(link, &child.records) {
            parent
                .linkage
                .entry(parent_id)
                .or_default()
                .insert(link.relationship.clone(), linkage);
        }
    }
}

/// Linkage per covered parent id for one child node
fn link_children(link: &ParentLink, children: &[Record]) -> Vec<(RecordKey, Linkage)> {
    match &link.keys {
        LinkKeys::ChildForeignKey { foreign_key } => {
            let mut by_parent: BTreeMap<RecordKey, Vec<&Record>> = BTreeMap::new();
            for child in children {
                if let Some(key) = child.key(foreign_key) {
                    by_parent.entry(key).or_default().push(child);
                }
            }

            link.parents
                .iter()
                .map(|pid| {
                    let matched = by_parent.get(pid).map(Vec::as_slice).unwrap_or_default();
                    (pid.clone(), linkage(link.cardinality, matched))
                })
                .collect()
        }
        LinkKeys::ParentForeignKey { targets } => {
            let by_id: BTreeMap<&RecordKey, &Record> =
                children.iter().map(|c| (&c.id, c)).collect();

            link.parents
                .iter()
                .map(|pid| {
                    let matched: Vec<&Record> = targets
                        .get(pid)
                        .and_then(|target| by_id.get(target).copied())
                        .into_iter()
                        .collect();
                    (pid.clone(), linkage(link.cardinality, &matched))
                })
                .collect()
        }
        LinkKeys::Join { targets, .. } => link
            .parents
            .iter()
            .map(|pid| {
                let matched: Vec<&Record> = match targets.get(pid) {
                    Some(ids) => children.iter().filter(|c| ids.contains(&c.id)).collect(),
                    None => Vec::new(),
                };
                (pid.clone(), linkage(link.cardinality, &matched))
            })
            .collect(),
    }
}

fn linkage(cardinality: Cardinality, matched: &[&Record]) -> Linkage {
    match cardinality {
        Cardinality::One => Linkage::One(matched.first().map(|r| ResourceIdentifier::of(r))),
        Cardinality::Many => Linkage::Many(
            matched
                .iter()
                .map(|r| ResourceIdentifier::of(r))
                .collect(),
        ),
    }
}
