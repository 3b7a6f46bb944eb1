//! Pedigree reconciliation
//!
//! Turns the raw pedigree slots of a detail page into relationship triples
//! that reference records in the store. Every referenced ancestor is looked up
//! by studbook id and created as a stub when absent; the store's atomic
//! insert-if-absent keeps this idempotent across runs and across workers.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::horse::{HorseRef, PedigreeEntry, TaprootRef};
use crate::domain::pedigree::{PedigreeNode, PedigreeTree, relationship_triples};
use crate::domain::repositories::HorseRepository;
use crate::domain::value_objects::StudbookId;

/// Result of reconciling one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledPedigree {
    /// Fully resolved triples, subject first
    pub triples: Vec<PedigreeEntry>,
    pub taproot: Option<TaprootRef>,
    /// Stub records created by this call
    pub stubs_created: usize,
    /// Nodes whose lookup or stub insert failed
    pub unresolved: usize,
}

pub struct PedigreeReconciler {
    horses: Arc<dyn HorseRepository>,
}

impl PedigreeReconciler {
    pub fn new(horses: Arc<dyn HorseRepository>) -> Self {
        Self { horses }
    }

    /// Resolve every pedigree node and the taproot, then rebuild the triples.
    ///
    /// Store failures only drop the affected triples; they never fail the call.
    pub async fn reconcile(&self, tree: &PedigreeTree, taproot: Option<&PedigreeNode>) -> ReconciledPedigree {
        let layout = relationship_triples();

        // Flatten in triple order, first occurrence of an id wins
        let mut unique: BTreeMap<StudbookId, &PedigreeNode> = BTreeMap::new();
        let mut order: Vec<StudbookId> = Vec::new();
        for triple in &layout {
            for slot in [triple.horse, triple.sire, triple.dam] {
                let Some(node) = tree.get(slot) else { continue };
                let Some(studbook_id) = node.studbook_id() else {
                    debug!(slot, name = %node.name, "Skipping pedigree node without usable link");
                    continue;
                };
                if !unique.contains_key(&studbook_id) {
                    unique.insert(studbook_id, node);
                    order.push(studbook_id);
                }
            }
        }

        let mut result = ReconciledPedigree::default();
        let mut resolved: BTreeMap<StudbookId, HorseRef> = BTreeMap::new();
        for studbook_id in order {
            let name = unique[&studbook_id].name.trim();
            if let Some(horse) = self.resolve(studbook_id, name, &mut result).await {
                resolved.insert(studbook_id, horse);
            }
        }

        result.triples = layout
            .iter()
            .filter_map(|triple| {
                let member = |slot: usize| {
                    tree.get(slot)
                        .and_then(PedigreeNode::studbook_id)
                        .and_then(|id| resolved.get(&id).cloned())
                };
                Some(PedigreeEntry {
                    horse: member(triple.horse)?,
                    father: member(triple.sire)?,
                    mother: member(triple.dam)?,
                })
            })
            .collect();

        if let Some(node) = taproot {
            if let Some(studbook_id) = node.studbook_id() {
                let horse = match resolved.get(&studbook_id) {
                    Some(horse) => Some(horse.clone()),
                    None => self.resolve(studbook_id, node.name.trim(), &mut result).await,
                };
                result.taproot = horse.map(|horse| TaprootRef {
                    name: horse.name,
                    studbook_id,
                    id: horse.id,
                });
            }
        }

        debug!(
            triples = result.triples.len(),
            stubs_created = result.stubs_created,
            unresolved = result.unresolved,
            "Pedigree reconciled"
        );
        result
    }

    async fn resolve(
        &self,
        studbook_id: StudbookId,
        name: &str,
        result: &mut ReconciledPedigree,
    ) -> Option<HorseRef> {
        let lookup = match self.horses.find_by_studbook_id(studbook_id).await {
            Ok(Some(horse)) => return Some(horse.to_ref()),
            Ok(None) => self.horses.insert_stub_if_absent(studbook_id, name).await,
            Err(e) => Err(e),
        };

        match lookup {
            Ok((horse, created)) => {
                if created {
                    result.stubs_created += 1;
                    debug!(studbook_id, name, "Created pedigree stub");
                }
                Some(horse.to_ref())
            }
            Err(e) => {
                warn!(studbook_id, error = %e, "Failed to resolve pedigree node");
                result.unresolved += 1;
                None
            }
        }
    }
}
