//! The gene: one editable fragment of a chromosome's format tree
//! (SPEC_FULL.md §3, §4.3).
use crate::mutate::Mutate;
use serde::{Deserialize, Serialize};

/// Arena index addressing a gene within its owning chromosome. See
/// SPEC_FULL.md §3 Supplement: this crate represents the gene tree as a flat
/// arena (`Chromosome::genes: Vec<GeneNode>`) rather than object references,
/// so a `GeneId` is simply the node's index.
pub type GeneId = usize;

/// The sentinel chunk tag excluded from `is_equal` pairing (mirrors the
/// reference's "same tag, not IEND" check for the chunk-format plugin).
pub const SENTINEL_TAG: [u8; 4] = *b"IEND";

/// One node of a chromosome's gene tree: an owned byte payload, its children
/// (addressed by `GeneId`, never by upward parent pointer — parents are
/// recovered by tree walk, per SPEC_FULL.md §9), and the chunk-format
/// metadata this crate's one concrete parser plugin attaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneNode {
    pub data: Vec<u8>,
    pub children: Vec<GeneId>,
    pub tag: [u8; 4],
}

impl GeneNode {
    pub fn new(data: Vec<u8>, tag: [u8; 4]) -> Self {
        Self {
            data,
            children: Vec::new(),
            tag,
        }
    }

    /// True when this gene should be excluded from mutation — a zero-length
    /// payload carries nothing fuzzable.
    pub fn anomaly(&self) -> bool {
        self.data.is_empty()
    }

    /// "Similar gene" predicate used by recombinators: same chunk tag, and
    /// not the sentinel (terminal) chunk.
    pub fn is_equal(&self, other: &GeneNode) -> bool {
        self.tag == other.tag && self.tag != SENTINEL_TAG
    }

    pub fn children_number(&self) -> usize {
        self.children.len()
    }

    /// Appends `child` to the children list, or inserts it at `index` when given.
    pub fn add_child(&mut self, child: GeneId, index: Option<usize>) {
        match index {
            Some(index) => self.children.insert(index.min(self.children.len()), child),
            None => self.children.push(child),
        }
    }

    pub fn remove_child(&mut self, target: GeneId) {
        if let Some(pos) = self.children.iter().position(|c| *c == target) {
            self.children.remove(pos);
        }
    }

    /// Replaces `target` with `new` in place, returning the id that occupied
    /// that slot. Unlike the reference's `replace_child` (a latent no-op:
    /// it reassigns `children[index] = target`, the old value, rather than
    /// `new`), this installs `new` at that index — see SPEC_FULL.md §4.3
    /// Supplement.
    pub fn replace_child(&mut self, target: GeneId, new: GeneId) -> Option<GeneId> {
        let pos = self.children.iter().position(|c| *c == target)?;
        let old = self.children[pos];
        self.children[pos] = new;
        Some(old)
    }

    pub fn mutate(&mut self, mutator: &dyn Mutate, howmany: usize) {
        if self.anomaly() {
            return;
        }
        self.data = mutator.mutate(&self.data, howmany);
    }
}
