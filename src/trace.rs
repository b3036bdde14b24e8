//! Per-run coverage trace (SPEC_FULL.md §3, §4.2).
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Coverage recorded during one analyzed run, partitioned by image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    pub images: Vec<String>,
    pub set_per_image: FxHashMap<String, FxHashSet<u64>>,
    pub total: u64,
    pub has_crashed: bool,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&mut self, image: &str) {
        if !self.set_per_image.contains_key(image) {
            self.images.push(image.to_string());
            self.set_per_image.insert(image.to_string(), FxHashSet::default());
        }
    }

    /// Records a basic block hit. `bbl` is the block's start address, as
    /// returned by `BlockCache::lookup`.
    pub fn add_bbl(&mut self, image: &str, bbl: u64) {
        self.set_per_image.entry(image.to_string()).or_default().insert(bbl);
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sum of per-image set sizes: the number of distinct basic blocks hit.
    pub fn unique_total(&self) -> u64 {
        self.set_per_image.values().map(|s| s.len() as u64).sum()
    }

    /// Yields, per image, `self[image] \ other[image]`. Both traces must
    /// track the same set of images.
    pub fn difference_per_image<'a>(
        &'a self,
        other: &'a Trace,
    ) -> impl Iterator<Item = (&'a str, FxHashSet<u64>)> + 'a {
        assert_eq!(
            self.set_per_image.len(),
            other.set_per_image.len(),
            "difference_per_image requires traces over the same image set"
        );
        self.images.iter().map(move |img| {
            let this = self.set_per_image.get(img.as_str()).cloned().unwrap_or_default();
            let empty = FxHashSet::default();
            let that = other.set_per_image.get(img.as_str()).unwrap_or(&empty);
            let diff: FxHashSet<u64> = this.difference(that).copied().collect();
            (img.as_str(), diff)
        })
    }

    /// Fraction of `self`'s unique blocks absent from `other`. Despite the
    /// name, this is a *distance* (0 = identical coverage, 1 = disjoint),
    /// not a similarity; the reference computes it this way and the naming
    /// quirk is preserved deliberately (SPEC_FULL.md §4.2, §9).
    pub fn similarity(&self, other: &Trace) -> f64 {
        assert_eq!(
            self.set_per_image.len(),
            other.set_per_image.len(),
            "similarity requires traces over the same image set"
        );
        let mut faults = 0u64;
        for img in &self.images {
            let this = self.set_per_image.get(img.as_str());
            let that = other.set_per_image.get(img.as_str());
            if let (Some(this), Some(that)) = (this, that) {
                faults += this.difference(that).count() as u64;
            }
        }
        let unique = self.unique_total();
        if unique == 0 {
            0.0
        } else {
            faults as f64 / unique as f64
        }
    }

    /// Unions `other` into `self`: images, per-image sets, and totals.
    pub fn update(&mut self, other: &Trace) {
        for img in &other.images {
            self.add_image(img);
            if let Some(src) = other.set_per_image.get(img) {
                self.set_per_image.get_mut(img).unwrap().extend(src.iter().copied());
            }
        }
        self.total += other.total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_with(images: &[&str], hits: &[(&str, &[u64])]) -> Trace {
        let mut t = Trace::new();
        for img in images {
            t.add_image(img);
        }
        for (img, bbls) in hits {
            for bbl in *bbls {
                t.add_bbl(img, *bbl);
            }
        }
        t
    }

    #[test]
    fn unique_total_sums_per_image_sets() {
        let t = trace_with(&["a", "b"], &[("a", &[1, 2]), ("b", &[3])]);
        assert_eq!(t.unique_total(), 3);
        assert_eq!(t.total(), 3);
    }

    #[test]
    fn update_unions_images_and_totals() {
        let mut t1 = trace_with(&["a"], &[("a", &[1, 2])]);
        let t2 = trace_with(&["a"], &[("a", &[2, 3])]);
        t1.update(&t2);
        assert_eq!(t1.set_per_image["a"].len(), 3);
        assert_eq!(t1.total(), 4);
    }

    #[test]
    fn similarity_is_a_distance() {
        let t1 = trace_with(&["a"], &[("a", &[1, 2, 3])]);
        let t2 = trace_with(&["a"], &[("a", &[1, 2, 3])]);
        assert_eq!(t1.similarity(&t2), 0.0);

        let t3 = trace_with(&["a"], &[("a", &[4, 5, 6])]);
        assert_eq!(t1.similarity(&t3), 1.0);
    }

    #[test]
    fn difference_per_image_requires_equal_image_sets() {
        let t1 = trace_with(&["a"], &[]);
        t1.difference_per_image(&t1).for_each(drop);
    }
}
