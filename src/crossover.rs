//! Recombinators: structural crossover operators over two chromosomes'
//! gene trees (SPEC_FULL.md §4.6). Unlike the mutators, these need an RNG
//! and know about the tree shape, so they operate through `Chromosome`'s
//! tree-editing API rather than raw bytes.
pub mod dispatch;

use crate::chromosome::Chromosome;
use crate::gene::GeneId;
use crate::mutate::Mutate;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Structural crossover over two chromosomes, producing two (possibly
/// unchanged) chromosomes in place.
pub trait Recombine: std::fmt::Debug {
    fn recombine(
        &self,
        chr1: &mut Chromosome,
        chr2: &mut Chromosome,
        mutator: &dyn Mutate,
        rng: &mut dyn RngCore,
    );
}

/// Fuzzes `gene` in place with `mutator`, using a fixed window size; no-ops
/// on an anomalous (empty) gene. Mirrors the reference's bare `gene.mutate`
/// call, which always passes a single default-sized window.
const DEFAULT_HOWMANY: usize = 4;

fn mutate_gene(chr: &mut Chromosome, gene: GeneId, mutator: &dyn Mutate) {
    chr.node_mut(gene).mutate(mutator, DEFAULT_HOWMANY);
}

/// Picks one gene uniformly from each chromosome's full gene list.
fn choose_any(chr1: &Chromosome, chr2: &Chromosome, rng: &mut dyn RngCore) -> Option<(GeneId, GeneId)> {
    let all1 = chr1.get_all_genes();
    let all2 = chr2.get_all_genes();
    if all1.is_empty() || all2.is_empty() {
        return None;
    }
    Some((*all1.choose(rng)?, *all2.choose(rng)?))
}

/// Picks one non-root gene from each chromosome, scanning in a shuffled
/// order and returning the first hit, matching the reference's
/// `random.sample` + linear-scan idiom.
fn choose_children(chr: &Chromosome, rng: &mut dyn RngCore) -> Option<GeneId> {
    let mut all = chr.get_all_genes();
    all.shuffle(rng);
    all.into_iter().find(|g| !chr.get_genes().contains(g))
}

fn choose_children_pair(
    chr1: &Chromosome,
    chr2: &Chromosome,
    rng: &mut dyn RngCore,
) -> Option<(GeneId, GeneId)> {
    let child1 = choose_children(chr1, rng)?;
    let child2 = choose_children(chr2, rng)?;
    Some((child1, child2))
}

/// Finds a pair of genes with matching `is_equal` tags, scanning `chr1` in
/// shuffled order against `chr2` in its natural order.
fn choose_similar(
    chr1: &Chromosome,
    chr2: &Chromosome,
    rng: &mut dyn RngCore,
) -> Option<(GeneId, GeneId)> {
    let mut all1 = chr1.get_all_genes();
    all1.shuffle(rng);
    let all2 = chr2.get_all_genes();
    for g1 in all1 {
        for &g2 in &all2 {
            if chr2.node(g2).is_equal(chr1.node(g1)) {
                return Some((g1, g2));
            }
        }
    }
    None
}

/// Inserts `gene` (from `src_arena`) into `chr` next to `anchor`: as a
/// sibling under `anchor`'s parent if it has one, otherwise as an
/// additional root spliced in at `anchor`'s root position.
fn insert_copy_beside(chr: &mut Chromosome, src_arena: &[crate::gene::GeneNode], gene: GeneId, anchor: GeneId) -> GeneId {
    let copy = chr.deep_copy_subtree(src_arena, gene);
    match chr.find_parent(anchor) {
        Ok(Some(parent)) => chr.node_mut(parent).add_child(copy, None),
        _ => {
            let index = chr.get_genes().iter().position(|r| *r == anchor).unwrap_or(0);
            let mut roots = chr.get_genes().to_vec();
            roots.insert(index, copy);
            chr.roots = roots;
        }
    }
    copy
}

/// Mutates one gene in each chromosome; no structural change.
#[derive(Clone, Debug, Default)]
pub struct Null;

impl Recombine for Null {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_any(chr1, chr2, rng) else { return };
        mutate_gene(chr1, g1, mutator);
        mutate_gene(chr2, g2, mutator);
    }
}

/// Swaps a chosen gene with its parent in each chromosome: the gene takes
/// the parent's sibling subtree as its own children, and the former parent
/// becomes its sole child at the sibling index it used to occupy.
#[derive(Clone, Debug, Default)]
pub struct ParentChildrenSwap;

impl ParentChildrenSwap {
    fn swap_with_parent(chr: &mut Chromosome, child: GeneId) {
        let Ok(Some(parent)) = chr.find_parent(child) else { return };
        let Some(index) = chr.node(parent).children.iter().position(|c| *c == child) else { return };
        let siblings = std::mem::take(&mut chr.node_mut(parent).children);
        let child_children = std::mem::take(&mut chr.node_mut(child).children);
        chr.node_mut(parent).children = child_children;
        let mut new_child_children = siblings;
        new_child_children[index] = parent;
        chr.node_mut(child).children = new_child_children;
        // `parent` occupied a slot in its own parent's children (or the root
        // list); that slot must now point at `child`, or the swapped-in
        // subtree is unreachable from the tree.
        let _ = chr.replace_gene(parent, child);
    }
}

impl Recombine for ParentChildrenSwap {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, _mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((c1, c2)) = choose_children_pair(chr1, chr2, rng) else { return };
        Self::swap_with_parent(chr1, c1);
        Self::swap_with_parent(chr2, c2);
    }
}

/// Permutes the children list of the parent of a chosen non-root gene, in
/// each chromosome.
#[derive(Clone, Debug, Default)]
pub struct ShuffleSiblings;

impl Recombine for ShuffleSiblings {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, _mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((c1, c2)) = choose_children_pair(chr1, chr2, rng) else { return };
        if let Ok(Some(parent)) = chr1.find_parent(c1) {
            chr1.node_mut(parent).children.shuffle(rng);
        }
        if let Ok(Some(parent)) = chr2.find_parent(c2) {
            chr2.node_mut(parent).children.shuffle(rng);
        }
    }
}

/// Deep-copies both chosen genes, mutates each copy, then swaps the copies
/// across chromosomes via `replace_gene` — two independently mutated
/// copies genuinely cross (SPEC_FULL.md §4.6 Supplement).
#[derive(Clone, Debug, Default)]
pub struct RandomGeneSwap;

impl Recombine for RandomGeneSwap {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((old1, old2)) = choose_any(chr1, chr2, rng) else { return };
        let arena1 = chr1.genes.clone();
        let arena2 = chr2.genes.clone();
        let copy1_in_2 = chr2.deep_copy_subtree(&arena1, old1);
        let copy2_in_1 = chr1.deep_copy_subtree(&arena2, old2);
        mutate_gene(chr1, copy2_in_1, mutator);
        mutate_gene(chr2, copy1_in_2, mutator);
        let _ = chr2.replace_gene(old2, copy1_in_2);
        let _ = chr1.replace_gene(old1, copy2_in_1);
    }
}

/// Deletes one chosen gene from each chromosome.
#[derive(Clone, Debug, Default)]
pub struct RemoveGene;

impl Recombine for RemoveGene {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, _mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_any(chr1, chr2, rng) else { return };
        let _ = chr1.remove_gene(g1);
        let _ = chr2.remove_gene(g2);
    }
}

/// Deep-copies and mutates one chosen gene per chromosome, inserting the
/// copy beside its own origin (sibling under the shared parent, or an
/// extra root) — on its own chromosome only. The reference's dual-chromosome
/// insertion for this operator reads as a bug local to it, not reproduced
/// here (SPEC_FULL.md §4.6 Supplement, §9 Open Question resolution).
#[derive(Clone, Debug, Default)]
pub struct DuplicateGene;

impl Recombine for DuplicateGene {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_any(chr1, chr2, rng) else { return };
        let arena1 = chr1.genes.clone();
        let copy1 = insert_copy_beside(chr1, &arena1, g1, g1);
        mutate_gene(chr1, copy1, mutator);
        let arena2 = chr2.genes.clone();
        let copy2 = insert_copy_beside(chr2, &arena2, g2, g2);
        mutate_gene(chr2, copy2, mutator);
    }
}

/// Deep-copies and mutates a chosen gene from each chromosome, inserting
/// each copy into the *other* chromosome beside that chromosome's own
/// chosen gene.
#[derive(Clone, Debug, Default)]
pub struct RandomGeneInsert;

impl Recombine for RandomGeneInsert {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_any(chr1, chr2, rng) else { return };
        cross_insert(chr1, chr2, g1, g2, mutator);
    }
}

/// Same as `RandomGeneInsert` but the gene pair is chosen by tag equality
/// rather than uniformly at random.
#[derive(Clone, Debug, Default)]
pub struct SimilarGeneInsert;

impl Recombine for SimilarGeneInsert {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_similar(chr1, chr2, rng) else { return };
        cross_insert(chr1, chr2, g1, g2, mutator);
    }
}

fn cross_insert(chr1: &mut Chromosome, chr2: &mut Chromosome, g1: GeneId, g2: GeneId, mutator: &dyn Mutate) {
    let arena1 = chr1.genes.clone();
    let arena2 = chr2.genes.clone();
    let copy1_in_2 = insert_copy_beside(chr2, &arena1, g1, g2);
    mutate_gene(chr2, copy1_in_2, mutator);
    let copy2_in_1 = insert_copy_beside(chr1, &arena2, g2, g1);
    mutate_gene(chr1, copy2_in_1, mutator);
}

/// Same cross-insertion as `RandomGeneInsert`, gene pair chosen by tag
/// equality and each copy inserted as a sibling of the similar gene.
#[derive(Clone, Debug, Default)]
pub struct AdditiveSimilarGeneCrossOver;

impl Recombine for AdditiveSimilarGeneCrossOver {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let Some((g1, g2)) = choose_similar(chr1, chr2, rng) else { return };
        cross_insert(chr1, chr2, g1, g2, mutator);
    }
}

/// Chooses a similar-tagged pair and swaps them via `RandomGeneSwap`'s
/// independent-copy semantics; falls back to `RandomGeneSwap`'s own
/// uniform selection when no similar pair exists.
#[derive(Clone, Debug, Default)]
pub struct SimilarGeneSwap;

impl Recombine for SimilarGeneSwap {
    fn recombine(&self, chr1: &mut Chromosome, chr2: &mut Chromosome, mutator: &dyn Mutate, rng: &mut dyn RngCore) {
        let pair = choose_similar(chr1, chr2, rng).or_else(|| choose_any(chr1, chr2, rng));
        let Some((old1, old2)) = pair else { return };
        let arena1 = chr1.genes.clone();
        let arena2 = chr2.genes.clone();
        let copy1_in_2 = chr2.deep_copy_subtree(&arena1, old1);
        let copy2_in_1 = chr1.deep_copy_subtree(&arena2, old2);
        mutate_gene(chr1, copy2_in_1, mutator);
        mutate_gene(chr2, copy1_in_2, mutator);
        let _ = chr2.replace_gene(old2, copy1_in_2);
        let _ = chr1.replace_gene(old1, copy2_in_1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gene::GeneNode;
    use crate::mutate::Null as NullMutator;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    fn tree(rng: &mut dyn RngCore) -> Chromosome {
        let mut c = Chromosome::empty(rng);
        let leaf = c.alloc(GeneNode::new(vec![1, 2], *b"IDAT"));
        let mut root = GeneNode::new(vec![0], *b"IHDR");
        root.children.push(leaf);
        let root = c.alloc(root);
        c.add_gene(root);
        c
    }

    #[test]
    fn null_recombinator_preserves_structure() {
        let mut r = rng();
        let mut c1 = tree(&mut r);
        let mut c2 = tree(&mut r);
        let before = (c1.genes.len(), c2.genes.len());
        Null.recombine(&mut c1, &mut c2, &NullMutator, &mut r);
        assert_eq!((c1.genes.len(), c2.genes.len()), before);
    }

    #[test]
    fn remove_gene_shrinks_tree() {
        let mut r = rng();
        let mut c1 = tree(&mut r);
        let mut c2 = tree(&mut r);
        let roots_before = c1.get_genes().len();
        RemoveGene.recombine(&mut c1, &mut c2, &NullMutator, &mut r);
        assert!(c1.get_genes().len() <= roots_before);
    }

    #[test]
    fn duplicate_gene_only_touches_own_chromosome() {
        let mut r = rng();
        let mut c1 = tree(&mut r);
        let mut c2 = tree(&mut r);
        let c2_before = c2.genes.len();
        DuplicateGene.recombine(&mut c1, &mut c2, &NullMutator, &mut r);
        assert!(c1.genes.len() > 2);
        // Grows by the chosen gene's whole subtree size (1 for the leaf, 2
        // if the root — and its child — gets picked), not always exactly 1.
        assert!(c2.genes.len() > c2_before);
    }

    #[test]
    fn random_gene_swap_changes_both_chromosomes() {
        let mut r = rng();
        let mut c1 = tree(&mut r);
        let mut c2 = tree(&mut r);
        let before1 = c1.genes.len();
        let before2 = c2.genes.len();
        RandomGeneSwap.recombine(&mut c1, &mut c2, &NullMutator, &mut r);
        assert!(c1.genes.len() > before1);
        assert!(c2.genes.len() > before2);
    }

    #[test]
    fn parent_children_swap_keeps_both_genes_reachable() {
        let mut r = rng();
        let mut c1 = tree(&mut r);
        let mut c2 = tree(&mut r);
        let total_before = c1.genes.len();
        let old_root = c1.roots[0];
        let old_leaf = c1.node(old_root).children[0];

        ParentChildrenSwap.recombine(&mut c1, &mut c2, &NullMutator, &mut r);

        // Every gene that existed before the swap must still be reachable
        // from the roots afterward — the swap repositions nodes, it must
        // never orphan one.
        assert_eq!(c1.get_all_genes().len(), total_before);
        assert_eq!(c1.roots, vec![old_leaf]);
        assert_eq!(c1.node(old_leaf).children, vec![old_root]);
    }

    #[test]
    fn choose_similar_finds_matching_tag() {
        let mut r = rng();
        let c1 = tree(&mut r);
        let c2 = tree(&mut r);
        let pair = choose_similar(&c1, &c2, &mut r);
        assert!(pair.is_some());
    }
}
