//! Pedigree tree layout
//!
//! A detail page lists 15 pedigree links (`a.PedigreeItem`) in a fixed order:
//! the subject sits in slot 7, its sire in slot 3 and its dam in slot 11, and
//! so on up to the great-grandparents. The layout is a static table consumed
//! generically, so deepening the tree only means extending the table.

use serde::{Deserialize, Serialize};

use super::value_objects::{StudbookId, extract_studbook_id};

pub const PEDIGREE_SLOT_COUNT: usize = 15;

/// Position of a slot relative to its child in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    Subject,
    Sire,
    Dam,
}

/// One entry of the layout table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedigreeSlot {
    pub slot: usize,
    pub role: SlotRole,
    /// Slot of the horse this slot is a parent of
    pub child_slot: Option<usize>,
}

const fn slot(slot: usize, role: SlotRole, child_slot: Option<usize>) -> PedigreeSlot {
    PedigreeSlot { slot, role, child_slot }
}

/// Page order of `a.PedigreeItem` links mapped onto the tree
pub static PEDIGREE_LAYOUT: [PedigreeSlot; PEDIGREE_SLOT_COUNT] = [
    slot(0, SlotRole::Sire, Some(3)),
    slot(1, SlotRole::Sire, Some(0)),
    slot(2, SlotRole::Dam, Some(0)),
    slot(3, SlotRole::Sire, Some(7)),
    slot(4, SlotRole::Dam, Some(3)),
    slot(5, SlotRole::Sire, Some(4)),
    slot(6, SlotRole::Dam, Some(4)),
    slot(7, SlotRole::Subject, None),
    slot(8, SlotRole::Sire, Some(11)),
    slot(9, SlotRole::Sire, Some(8)),
    slot(10, SlotRole::Dam, Some(8)),
    slot(11, SlotRole::Dam, Some(7)),
    slot(12, SlotRole::Dam, Some(11)),
    slot(13, SlotRole::Sire, Some(12)),
    slot(14, SlotRole::Dam, Some(12)),
];

/// `{horse, sire, dam}` slot indices derived from the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripleSlots {
    pub horse: usize,
    pub sire: usize,
    pub dam: usize,
}

fn parent_of(child: usize, role: SlotRole) -> Option<usize> {
    PEDIGREE_LAYOUT
        .iter()
        .find(|entry| entry.child_slot == Some(child) && entry.role == role)
        .map(|entry| entry.slot)
}

fn generation_of(slot: usize) -> usize {
    let mut generation = 0;
    let mut current = slot;
    while let Some(child) = PEDIGREE_LAYOUT.get(current).and_then(|entry| entry.child_slot) {
        generation += 1;
        current = child;
    }
    generation
}

/// Every slot that has both parents in the layout, subject first then by generation
#[must_use]
pub fn relationship_triples() -> Vec<TripleSlots> {
    let mut triples: Vec<(usize, TripleSlots)> = PEDIGREE_LAYOUT
        .iter()
        .filter_map(|entry| {
            let sire = parent_of(entry.slot, SlotRole::Sire)?;
            let dam = parent_of(entry.slot, SlotRole::Dam)?;
            Some((
                generation_of(entry.slot),
                TripleSlots { horse: entry.slot, sire, dam },
            ))
        })
        .collect();
    triples.sort_by_key(|(generation, triple)| (*generation, triple.horse));
    triples.into_iter().map(|(_, triple)| triple).collect()
}

/// Raw pedigree link as found on the page
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PedigreeNode {
    pub name: String,
    pub link: String,
}

impl PedigreeNode {
    #[must_use]
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: link.into(),
        }
    }

    /// Studbook id embedded in the link; `None` when name or link are unusable
    #[must_use]
    pub fn studbook_id(&self) -> Option<StudbookId> {
        if self.name.trim().is_empty() || self.link.trim().is_empty() {
            return None;
        }
        extract_studbook_id(&self.link)
    }
}

/// The 15 pedigree slots of a detail page, any of which may be missing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PedigreeTree {
    slots: Vec<Option<PedigreeNode>>,
}

impl PedigreeTree {
    /// Build from links in page order; extra links beyond the layout are ignored
    #[must_use]
    pub fn from_page_order(nodes: Vec<PedigreeNode>) -> Self {
        let mut slots: Vec<Option<PedigreeNode>> = nodes.into_iter().map(Some).collect();
        slots.resize(PEDIGREE_SLOT_COUNT, None);
        slots.truncate(PEDIGREE_SLOT_COUNT);
        Self { slots }
    }

    #[must_use]
    pub fn from_slots(mut slots: Vec<Option<PedigreeNode>>) -> Self {
        slots.resize(PEDIGREE_SLOT_COUNT, None);
        slots.truncate(PEDIGREE_SLOT_COUNT);
        Self { slots }
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&PedigreeNode> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    #[must_use]
    pub fn subject(&self) -> Option<&PedigreeNode> {
        PEDIGREE_LAYOUT
            .iter()
            .find(|entry| entry.role == SlotRole::Subject)
            .and_then(|entry| self.get(entry.slot))
    }
}
