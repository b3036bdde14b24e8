//! The chromosome: one candidate input, represented as an arena of genes
//! plus lineage/fitness bookkeeping (SPEC_FULL.md §3, §4.3).
use crate::gene::{GeneId, GeneNode};
use crate::trace::Trace;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raised by `find_parent`/`remove_gene`/`replace_gene` when a gene id does
/// not belong to the chromosome at all (neither a root nor reachable from
/// one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gene is not a member of this chromosome")]
pub struct NotMember;

/// One candidate input: a forest of gene trees plus the bookkeeping the
/// evolutionary loop needs (SPEC_FULL.md §3 "Chromosome").
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub uid: u64,
    pub roots: Vec<GeneId>,
    pub genes: Vec<GeneNode>,
    pub fitness: f64,
    pub metrics: HashMap<String, f64>,
    pub trace: Option<Trace>,
    /// `cid` of the (recombinator, mutator) pair that produced this
    /// chromosome; `None` for seed-originated individuals.
    pub fuzzer: Option<String>,
}

/// The side-channel serialization payload (SPEC_FULL.md §6.4): exactly the
/// tuple `(genes, metrics, uid, trace)` the reference pickles — fitness and
/// the fuzzer tag are deliberately not part of this exchange format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChromosomeBlob {
    pub version: u8,
    pub roots: Vec<GeneId>,
    pub genes: Vec<GeneNode>,
    pub metrics: HashMap<String, f64>,
    pub uid: u64,
    pub trace: Option<Trace>,
}

const BLOB_VERSION: u8 = 1;

impl Chromosome {
    pub fn new_uid(rng: &mut dyn RngCore) -> u64 {
        rng.next_u64()
    }

    pub fn empty(rng: &mut dyn RngCore) -> Self {
        Self {
            uid: Self::new_uid(rng),
            roots: Vec::new(),
            genes: Vec::new(),
            fitness: 0.0,
            metrics: HashMap::new(),
            trace: None,
            fuzzer: None,
        }
    }

    /// Appends a new node to the arena and returns its id.
    pub fn alloc(&mut self, node: GeneNode) -> GeneId {
        self.genes.push(node);
        self.genes.len() - 1
    }

    pub fn node(&self, id: GeneId) -> &GeneNode {
        &self.genes[id]
    }

    pub fn node_mut(&mut self, id: GeneId) -> &mut GeneNode {
        &mut self.genes[id]
    }

    /// The root-level genes.
    pub fn get_genes(&self) -> &[GeneId] {
        &self.roots
    }

    /// All genes, in pre-order: each root followed by its descendants.
    pub fn get_all_genes(&self) -> Vec<GeneId> {
        let mut out = Vec::with_capacity(self.genes.len());
        for &root in &self.roots {
            self.collect_preorder(root, &mut out);
        }
        out
    }

    fn collect_preorder(&self, id: GeneId, out: &mut Vec<GeneId>) {
        out.push(id);
        for &child in &self.genes[id].children {
            self.collect_preorder(child, out);
        }
    }

    /// Finds the parent of `child`. `Ok(None)` means `child` is a root;
    /// `Err(NotMember)` means it does not belong to this chromosome at all.
    pub fn find_parent(&self, child: GeneId) -> Result<Option<GeneId>, NotMember> {
        if self.roots.contains(&child) {
            return Ok(None);
        }
        for &root in &self.roots {
            if let Some(parent) = self.find_parent_under(root, child) {
                return Ok(Some(parent));
            }
        }
        Err(NotMember)
    }

    fn find_parent_under(&self, node: GeneId, target: GeneId) -> Option<GeneId> {
        if self.genes[node].children.contains(&target) {
            return Some(node);
        }
        for &child in &self.genes[node].children.clone() {
            if let Some(parent) = self.find_parent_under(child, target) {
                return Some(parent);
            }
        }
        None
    }

    /// Replaces `target` with `new`, splicing into the root list if `target`
    /// is a root, or delegating to the parent's `replace_child` otherwise.
    /// Returns the id that was replaced.
    pub fn replace_gene(&mut self, target: GeneId, new: GeneId) -> Result<GeneId, NotMember> {
        if let Some(pos) = self.roots.iter().position(|r| *r == target) {
            let old = self.roots[pos];
            self.roots[pos] = new;
            return Ok(old);
        }
        let parent = self.find_parent(target)?.ok_or(NotMember)?;
        self.node_mut(parent)
            .replace_child(target, new)
            .ok_or(NotMember)
    }

    /// Removes `target` from the chromosome (root list, or its parent's
    /// children). Leaves the arena slot allocated but unreachable.
    pub fn remove_gene(&mut self, target: GeneId) -> Result<(), NotMember> {
        match self.find_parent(target)? {
            Some(parent) => {
                self.node_mut(parent).remove_child(target);
                Ok(())
            }
            None => {
                self.roots.retain(|r| *r != target);
                Ok(())
            }
        }
    }

    /// Appends a new top-level (root) gene.
    pub fn add_gene(&mut self, gene: GeneId) {
        self.roots.push(gene);
    }

    /// Deep-copies the sub-tree rooted at `source` (which may belong to
    /// `self` or another chromosome's arena slice) into `self`'s arena,
    /// returning the id of the copied root.
    pub fn deep_copy_subtree(&mut self, source_arena: &[GeneNode], source: GeneId) -> GeneId {
        let node = &source_arena[source];
        let mut copy = GeneNode::new(node.data.clone(), node.tag);
        let children: Vec<GeneId> = node
            .children
            .iter()
            .map(|&c| self.deep_copy_subtree(source_arena, c))
            .collect();
        copy.children = children;
        self.alloc(copy)
    }

    /// Deep clone with a fresh uid (SPEC_FULL.md §4.3 "clone").
    pub fn clone_with_fresh_uid(&self, rng: &mut dyn RngCore) -> Self {
        let mut clone = self.clone();
        clone.uid = Self::new_uid(rng);
        clone
    }

    /// Parses `path` via `deserializer` into a fresh chromosome's root genes.
    pub fn deserialize(
        deserializer: &dyn crate::parser::Deserializer,
        path: &std::path::Path,
        rng: &mut dyn RngCore,
    ) -> Result<Self, crate::error::CampaignError> {
        deserializer.deserialize(path, rng)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Serializes the gene forest into the target's input bytes, via the
    /// format serializer.
    pub fn serialize(&self, serializer: &dyn crate::parser::Serializer) -> Vec<u8> {
        serializer.serialize(self)
    }

    /// The side-channel serialization: `bincode`-encodes the versioned
    /// `(version, roots, genes, metrics, uid, trace)` blob (§6.4). `version`
    /// is just `ChromosomeBlob`'s leading field, not a separate prefix byte,
    /// so `loads` can hand the whole buffer straight back to `bincode`.
    pub fn dumps(&self) -> Result<Vec<u8>, bincode::Error> {
        let blob = ChromosomeBlob {
            version: BLOB_VERSION,
            roots: self.roots.clone(),
            genes: self.genes.clone(),
            metrics: self.metrics.clone(),
            uid: self.uid,
            trace: self.trace.clone(),
        };
        bincode::serialize(&blob)
    }

    pub fn loads(data: &[u8]) -> Result<Self, bincode::Error> {
        let blob: ChromosomeBlob = bincode::deserialize(data)?;
        Ok(Self {
            uid: blob.uid,
            roots: blob.roots,
            genes: blob.genes,
            fitness: 0.0,
            metrics: blob.metrics,
            trace: blob.trace,
            fuzzer: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> rand::rngs::SmallRng {
        rand::rngs::SmallRng::seed_from_u64(42)
    }

    fn simple_tree(rng: &mut dyn RngCore) -> Chromosome {
        // root -> child1, child2; child1 -> grandchild
        let mut c = Chromosome::empty(rng);
        let grandchild = c.alloc(GeneNode::new(vec![9], *b"IDAT"));
        let mut child1 = GeneNode::new(vec![1], *b"IDAT");
        child1.children.push(grandchild);
        let child1 = c.alloc(child1);
        let child2 = c.alloc(GeneNode::new(vec![2], *b"tEXt"));
        let mut root = GeneNode::new(vec![0], *b"IHDR");
        root.children.push(child1);
        root.children.push(child2);
        let root = c.alloc(root);
        c.add_gene(root);
        c
    }

    #[test]
    fn get_all_genes_is_preorder() {
        let mut r = rng();
        let c = simple_tree(&mut r);
        let all = c.get_all_genes();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], c.roots[0]);
    }

    #[test]
    fn find_parent_root_is_none() {
        let mut r = rng();
        let c = simple_tree(&mut r);
        assert_eq!(c.find_parent(c.roots[0]), Ok(None));
    }

    #[test]
    fn find_parent_nonmember_errs() {
        let mut r = rng();
        let c = simple_tree(&mut r);
        assert_eq!(c.find_parent(999), Err(NotMember));
    }

    #[test]
    fn find_parent_and_children_consistent() {
        let mut r = rng();
        let c = simple_tree(&mut r);
        for &g in &c.get_all_genes() {
            match c.find_parent(g).unwrap() {
                None => assert!(c.roots.contains(&g)),
                Some(parent) => assert!(c.node(parent).children.contains(&g)),
            }
        }
    }

    #[test]
    fn clone_gets_fresh_uid() {
        let mut r = rng();
        let c = simple_tree(&mut r);
        let c2 = c.clone_with_fresh_uid(&mut r);
        assert_ne!(c.uid, c2.uid);
        assert_eq!(c.genes.len(), c2.genes.len());
    }

    #[test]
    fn dumps_loads_round_trips_everything_but_fitness_and_fuzzer() {
        let mut r = rng();
        let mut c = simple_tree(&mut r);
        c.metrics.insert("BasicBlockCoverage".into(), 0.5);
        c.fitness = 3.0;
        c.fuzzer = Some("Null_Null".into());
        let blob = c.dumps().unwrap();
        let restored = Chromosome::loads(&blob).unwrap();
        assert_eq!(restored.uid, c.uid);
        assert_eq!(restored.metrics, c.metrics);
        assert_eq!(restored.genes.len(), c.genes.len());
        assert_eq!(restored.fitness, 0.0);
        assert_eq!(restored.fuzzer, None);
    }

    #[test]
    fn remove_gene_detaches_from_parent() {
        let mut r = rng();
        let mut c = simple_tree(&mut r);
        let root = c.roots[0];
        let child2 = c.node(root).children[1];
        c.remove_gene(child2).unwrap();
        assert!(!c.node(root).children.contains(&child2));
    }

    #[test]
    fn replace_gene_at_root() {
        let mut r = rng();
        let mut c = simple_tree(&mut r);
        let new_node = c.alloc(GeneNode::new(vec![42], *b"zTXt"));
        let old_root = c.roots[0];
        let old = c.replace_gene(old_root, new_node).unwrap();
        assert_eq!(old, old_root);
        assert_eq!(c.roots[0], new_node);
    }
}
