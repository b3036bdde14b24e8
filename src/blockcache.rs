//! Interval map from instruction address to the containing basic block, plus
//! the disassembler dump parser (SPEC_FULL.md §4.1, §6.2).
use std::collections::BTreeMap;

/// A half-open interval `[start, end)` of relative offsets within one image.
pub type BasicBlock = (u64, u64);

/// Per-image interval cache: `start -> (start, end)`.
///
/// Direct lookups are keyed by block start. A lookup for an address inside a
/// block, but not equal to its start, is resolved by a `BTreeMap::range`
/// search for the greatest key `<= addr` and then memoized under that
/// address so repeat queries become O(1). Memoized entries share the same
/// map as canonical ones; only canonical insertions (`key == start`)
/// increment `total`.
#[derive(Debug, Clone, Default)]
pub struct BlockCache {
    cache: BTreeMap<u64, BasicBlock>,
    total: u64,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of canonical basic blocks known to this cache.
    pub fn count(&self) -> u64 {
        self.total
    }

    /// Inserts `(start, end)` at key `start`. If `start` is a fresh canonical
    /// key, increments `total`.
    pub fn add(&mut self, start: u64, end: u64) {
        if !self.is_canonical_member(start) {
            self.total += 1;
        }
        self.cache.insert(start, (start, end));
    }

    fn is_canonical_member(&self, start: u64) -> bool {
        matches!(self.cache.get(&start), Some((s, _)) if *s == start)
    }

    /// Looks up the basic block containing `addr`. Direct hits return
    /// immediately; otherwise the greatest key `<= addr` is found and
    /// accepted if `start < addr < end`, then memoized under `addr`.
    pub fn lookup(&mut self, addr: u64) -> Option<BasicBlock> {
        if let Some(block) = self.cache.get(&addr) {
            return Some(*block);
        }
        let (start, end) = *self.cache.range(..=addr).next_back().map(|(_, v)| v)?;
        if start < addr && addr < end {
            self.cache.insert(addr, (start, end));
            Some((start, end))
        } else {
            None
        }
    }

    pub fn iter_blocks(&self) -> impl Iterator<Item = BasicBlock> + '_ {
        self.cache
            .iter()
            .filter(|(k, (s, _))| **k == *s)
            .map(|(_, v)| *v)
    }

    /// Parses a sectioned disassembler dump. Only lines within the `##BBLS##`
    /// section (`hex_start,hex_end,fname`) are consumed.
    pub fn parse_dump<'a, I: IntoIterator<Item = &'a str>>(lines: I) -> Self {
        #[derive(PartialEq)]
        enum Mode {
            None,
            Image,
            Functions,
            Bbls,
        }
        let mut mode = Mode::None;
        let mut cache = Self::new();

        for line in lines {
            if line.contains("##IMAGE##") {
                mode = Mode::Image;
            } else if line.contains("##FUNCTIONS##") {
                mode = Mode::Functions;
            } else if line.contains("##BBLS##") {
                mode = Mode::Bbls;
            } else if mode == Mode::Bbls {
                let mut parts = line.splitn(3, ',');
                let (Some(start), Some(end)) = (parts.next(), parts.next()) else {
                    continue;
                };
                let (Ok(start), Ok(end)) = (
                    u64::from_str_radix(start.trim().trim_start_matches("0x"), 16),
                    u64::from_str_radix(end.trim().trim_start_matches("0x"), 16),
                ) else {
                    continue;
                };
                cache.add(start, end);
            }
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_hits_exact_start() {
        let mut cache = BlockCache::new();
        cache.add(0x10, 0x20);
        assert_eq!(cache.lookup(0x10), Some((0x10, 0x20)));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn lookup_memoizes_inner_address() {
        let mut cache = BlockCache::new();
        cache.add(0x10, 0x20);
        assert_eq!(cache.lookup(0x15), Some((0x10, 0x20)));
        // memoized, but not canonical: total unchanged
        assert_eq!(cache.count(), 1);
        assert_eq!(cache.lookup(0x15), Some((0x10, 0x20)));
    }

    #[test]
    fn lookup_misses_outside_blocks() {
        let mut cache = BlockCache::new();
        cache.add(0x10, 0x20);
        cache.add(0x30, 0x40);
        assert_eq!(cache.lookup(0x25), None);
        assert_eq!(cache.lookup(0x05), None);
        assert_eq!(cache.lookup(0x20), None); // end is exclusive, no block starts here
    }

    #[test]
    fn parse_dump_consumes_only_bbls_section() {
        let dump = "##IMAGE##\nfoo.exe\n##FUNCTIONS##\nsub_401000\n##BBLS##\n\
                    0x1000,0x1010,sub_401000\n0x1010,0x1020,sub_401000\n";
        let cache = BlockCache::parse_dump(dump.lines());
        assert_eq!(cache.count(), 2);
        let mut cache = cache;
        assert_eq!(cache.lookup(0x1000), Some((0x1000, 0x1010)));
        assert_eq!(cache.lookup(0x1015), Some((0x1010, 0x1020)));
    }
}
