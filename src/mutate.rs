//! Byte- and line-level mutators (SPEC_FULL.md §4.5).
//!
//! Every mutator takes the bytes under fuzzing plus a small "howmany" hint
//! and returns the fuzzed bytes. The hint's exact meaning (a repeat count, a
//! window width, a line count) varies per mutator, matching the reference.
//! None take an RNG parameter; each reaches for `rand::thread_rng()`
//! internally, which keeps `Gene::mutate`'s call site (`gene.rs`) free of a
//! generic RNG type.
pub mod dispatch;

use rand::Rng;

pub trait Mutate: std::fmt::Debug {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8>;
}

/// Does nothing. Useful as a lottery candidate baseline.
#[derive(Clone, Debug, Default)]
pub struct Null;

impl Mutate for Null {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        data.to_vec()
    }
}

/// Deletes everything.
#[derive(Clone, Debug, Default)]
pub struct Purge;

impl Mutate for Purge {
    fn mutate(&self, _data: &[u8], _howmany: usize) -> Vec<u8> {
        Vec::new()
    }
}

/// Overwrites `howmany` random byte positions with a uniformly random byte.
#[derive(Clone, Debug, Default)]
pub struct RandomByte;

impl Mutate for RandomByte {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.len() < 2 {
            return data.to_vec();
        }
        let mut fuzzed = data.to_vec();
        let mut rng = rand::thread_rng();
        for _ in 0..howmany {
            let index = rng.gen_range(0..fuzzed.len());
            fuzzed[index] = rng.gen_range(0..=0xFFu16) as u8;
        }
        fuzzed
    }
}

/// Inserts `howmany` random bytes at a random position.
#[derive(Clone, Debug, Default)]
pub struct AddRandomData;

impl Mutate for AddRandomData {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let additional: Vec<u8> = (0..howmany).map(|_| rng.gen_range(0..=0xFFu16) as u8).collect();
        let index = rng.gen_range(0..=data.len());
        let mut fuzzed = Vec::with_capacity(data.len() + additional.len());
        fuzzed.extend_from_slice(&data[..index]);
        fuzzed.extend_from_slice(&additional);
        fuzzed.extend_from_slice(&data[index..]);
        fuzzed
    }
}

/// Removes one random byte.
#[derive(Clone, Debug, Default)]
pub struct RemoveByte;

impl Mutate for RemoveByte {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..data.len());
        let mut fuzzed = Vec::with_capacity(data.len() - 1);
        fuzzed.extend_from_slice(&data[..index]);
        fuzzed.extend_from_slice(&data[index + 1..]);
        fuzzed
    }
}

/// Duplicates a random byte in place. Preserves the reference's quirk: if
/// `data.len() > howmany`, `howmany` is bumped up to `data.len()` instead of
/// being left alone, so longer inputs redraw more times — but each draw
/// rebuilds from the original `data`, so only the final draw's duplication
/// ends up in the result; the result always grows by exactly one byte
/// (SPEC_FULL.md §9 Open Question #2 — kept literally, not "fixed").
#[derive(Clone, Debug, Default)]
pub struct DuplicateByte;

impl Mutate for DuplicateByte {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut howmany = howmany;
        if data.len() > howmany {
            howmany = data.len();
        }
        let mut rng = rand::thread_rng();
        // Each iteration rebuilds from the original `data`, not the previous
        // iteration's result — only the last draw's duplication survives.
        let mut fuzzed = data.to_vec();
        for _ in 0..howmany {
            let index = rng.gen_range(0..data.len());
            let byte = data[index];
            fuzzed = data.to_vec();
            fuzzed.insert(index, byte);
        }
        fuzzed
    }
}

/// Overwrites one random byte with `0x00`.
#[derive(Clone, Debug, Default)]
pub struct ByteNullifier;

impl Mutate for ByteNullifier {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut fuzzed = data.to_vec();
        let index = rand::thread_rng().gen_range(0..fuzzed.len());
        fuzzed[index] = 0;
        fuzzed
    }
}

/// Ors `0x80` into one random byte.
#[derive(Clone, Debug, Default)]
pub struct SetHighBitFromByte;

impl Mutate for SetHighBitFromByte {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut fuzzed = data.to_vec();
        let index = rand::thread_rng().gen_range(0..fuzzed.len());
        fuzzed[index] |= 0x80;
        fuzzed
    }
}

/// Increases `howmany` random bytes by one, wrapping `0xFF` to `0x00`.
#[derive(Clone, Debug, Default)]
pub struct IncreaseByOne;

impl Mutate for IncreaseByOne {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut fuzzed = data.to_vec();
        let mut rng = rand::thread_rng();
        let howmany = if fuzzed.len() < howmany {
            rng.gen_range(1..=fuzzed.len())
        } else {
            howmany
        };
        for _ in 0..howmany {
            let index = rng.gen_range(0..fuzzed.len());
            fuzzed[index] = fuzzed[index].wrapping_add(1);
        }
        fuzzed
    }
}

/// Decreases `howmany` random bytes by one, wrapping `0x00` to `0xFF`.
#[derive(Clone, Debug, Default)]
pub struct DecreaseByOne;

impl Mutate for DecreaseByOne {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.is_empty() {
            return data.to_vec();
        }
        let mut fuzzed = data.to_vec();
        let mut rng = rand::thread_rng();
        let howmany = if fuzzed.len() < howmany {
            rng.gen_range(0..fuzzed.len())
        } else {
            howmany
        };
        for _ in 0..howmany {
            let index = rng.gen_range(0..fuzzed.len());
            fuzzed[index] = fuzzed[index].wrapping_sub(1);
        }
        fuzzed
    }
}

/// Increases `howmany` consecutive bytes starting at a random offset, each
/// by a progressively larger addend (`+0, +1, +2, ...`). On overflow past
/// `0xFF` the addend is reduced by `0xFF`, not `0x100` — the reference's
/// `addend -= 0xFF` (mutators.py) — so this is not plain `u8` wrapping; see
/// SPEC_FULL.md §4.5 Supplement. No-ops if `data` is shorter than `howmany`.
#[derive(Clone, Debug, Default)]
pub struct ProgressiveIncrease;

impl Mutate for ProgressiveIncrease {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.len() < howmany || howmany == 0 {
            return data.to_vec();
        }
        let index = rand::thread_rng().gen_range(0..=data.len() - howmany);
        let mut fuzzed = data.to_vec();
        for (i, byte) in fuzzed[index..index + howmany].iter_mut().enumerate() {
            let mut addend = i as i32;
            if addend + *byte as i32 > 0xFF {
                addend -= 0xFF;
            }
            *byte = (*byte as i32 + addend) as u8;
        }
        fuzzed
    }
}

/// Decreases `howmany` consecutive bytes starting at a random offset, each
/// by a progressively larger subtrahend (`-0, -1, -2, ...`). On underflow
/// the byte reflects to `subtrahend - byte` rather than wrapping — the
/// reference's `subtrahend - ord(byte)` branch (mutators.py) — see
/// SPEC_FULL.md §4.5 Supplement. No-ops if `data` is shorter than `howmany`.
#[derive(Clone, Debug, Default)]
pub struct ProgressiveDecrease;

impl Mutate for ProgressiveDecrease {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        if data.len() < howmany || howmany == 0 {
            return data.to_vec();
        }
        let index = rand::thread_rng().gen_range(0..=data.len() - howmany);
        let mut fuzzed = data.to_vec();
        for (subtrahend, byte) in fuzzed[index..index + howmany].iter_mut().enumerate() {
            let subtrahend = subtrahend as i32;
            let value = *byte as i32;
            *byte = (if value >= subtrahend { value - subtrahend } else { subtrahend - value }) as u8;
        }
        fuzzed
    }
}

/// Swaps two non-overlapping runs of `width` bytes each.
fn swap_run(data: &[u8], width: usize) -> Vec<u8> {
    if data.len() < 2 * width {
        return data.to_vec();
    }
    let mut rng = rand::thread_rng();
    let rnd1 = rng.gen_range(0..=data.len() - width);
    let rnd2 = if rnd1 >= width {
        rng.gen_range(0..=rnd1 - width)
    } else if rnd1 + width <= data.len() - width {
        rng.gen_range(rnd1 + width..=data.len() - width)
    } else {
        return data.to_vec();
    };

    let min = rnd1.min(rnd2);
    let max = rnd1.max(rnd2);
    let mut fuzzed = Vec::with_capacity(data.len());
    fuzzed.extend_from_slice(&data[..min]);
    fuzzed.extend_from_slice(&data[max..max + width]);
    fuzzed.extend_from_slice(&data[min + width..max]);
    fuzzed.extend_from_slice(&data[min..min + width]);
    fuzzed.extend_from_slice(&data[max + width..]);
    fuzzed
}

/// Swaps two non-overlapping single bytes.
#[derive(Clone, Debug, Default)]
pub struct SwapByte;

impl Mutate for SwapByte {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        swap_run(data, 1)
    }
}

/// Swaps two non-overlapping 2-byte runs.
#[derive(Clone, Debug, Default)]
pub struct SwapWord;

impl Mutate for SwapWord {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        swap_run(data, 2)
    }
}

/// Swaps two non-overlapping 4-byte runs.
#[derive(Clone, Debug, Default)]
pub struct SwapDword;

impl Mutate for SwapDword {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        swap_run(data, 4)
    }
}

fn split_lines(data: &[u8]) -> Vec<Vec<u8>> {
    data.split(|&b| b == b'\n').map(|s| s.to_vec()).collect()
}

fn join_lines(lines: &[Vec<u8>]) -> Vec<u8> {
    lines.join(&b'\n')
}

/// Removes `to_be_removed` randomly chosen lines. If there are fewer lines
/// than that, purges everything (matching the reference's blunt guard).
#[derive(Clone, Debug, Default)]
pub struct RemoveLines;

impl Mutate for RemoveLines {
    fn mutate(&self, data: &[u8], to_be_removed: usize) -> Vec<u8> {
        let mut lines = split_lines(data);
        if lines.len() < to_be_removed {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        for _ in 0..to_be_removed {
            if lines.is_empty() {
                break;
            }
            let index = rng.gen_range(0..lines.len());
            lines.remove(index);
        }
        join_lines(&lines)
    }
}

/// Duplicates one randomly chosen line, inserting it `repeat` times in
/// place.
#[derive(Clone, Debug, Default)]
pub struct RepeatLine;

impl Mutate for RepeatLine {
    fn mutate(&self, data: &[u8], repeat: usize) -> Vec<u8> {
        let mut lines = split_lines(data);
        if lines.is_empty() {
            return data.to_vec();
        }
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..lines.len());
        let target = lines[index].clone();
        for _ in 0..repeat {
            lines.insert(index, target.clone());
        }
        join_lines(&lines)
    }
}

/// Swaps two randomly chosen (possibly identical) lines.
#[derive(Clone, Debug, Default)]
pub struct SwapLines;

impl Mutate for SwapLines {
    fn mutate(&self, data: &[u8], _howmany: usize) -> Vec<u8> {
        let mut lines = split_lines(data);
        if lines.len() < 2 {
            return data.to_vec();
        }
        let mut rng = rand::thread_rng();
        let i1 = rng.gen_range(0..lines.len() - 1);
        let i2 = rng.gen_range(0..lines.len() - 1);
        lines.swap(i1, i2);
        join_lines(&lines)
    }
}

/// Swaps `howmany` adjacent line pairs at random offsets.
#[derive(Clone, Debug, Default)]
pub struct SwapAdjacentLines;

impl Mutate for SwapAdjacentLines {
    fn mutate(&self, data: &[u8], howmany: usize) -> Vec<u8> {
        let mut lines = split_lines(data);
        if lines.len() < 3 {
            return data.to_vec();
        }
        let mut rng = rand::thread_rng();
        for _ in 0..howmany {
            let index = rng.gen_range(0..lines.len() - 1);
            lines.swap(index, index + 1);
        }
        join_lines(&lines)
    }
}

/// Replaces up to `attribs` quoted decimal numbers (`"123"`) with a random
/// `u32` value rendered back into quotes.
#[derive(Clone, Debug, Default)]
pub struct QuotedTextualNumber;

impl Mutate for QuotedTextualNumber {
    fn mutate(&self, data: &[u8], attribs: usize) -> Vec<u8> {
        if attribs == 0 {
            return data.to_vec();
        }
        let mut matches = Vec::new();
        let mut i = 0;
        while i < data.len() {
            if data[i] == b'"' {
                let mut j = i + 1;
                while j < data.len() && data[j].is_ascii_digit() {
                    j += 1;
                }
                if j > i + 1 && j < data.len() && data[j] == b'"' {
                    matches.push((i, j + 1));
                    i = j + 1;
                    continue;
                }
            }
            i += 1;
        }
        if matches.is_empty() {
            return data.to_vec();
        }
        let mut rng = rand::thread_rng();
        let take = attribs.min(matches.len());
        let mut chosen = Vec::with_capacity(take);
        for _ in 0..take {
            let pick = rng.gen_range(0..matches.len());
            chosen.push(matches.remove(pick));
        }
        chosen.sort_by(|a, b| b.0.cmp(&a.0));

        let mut fuzzed = data.to_vec();
        for (start, end) in chosen {
            let replacement = format!("\"{}\"", rng.gen_range(0u32..=0xFFFFFFFFu32));
            fuzzed.splice(start..end, replacement.into_bytes());
        }
        fuzzed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_purge() {
        assert_eq!(Null.mutate(b"abc", 3), b"abc");
        assert_eq!(Purge.mutate(b"abc", 0), Vec::<u8>::new());
    }

    #[test]
    fn remove_byte_shortens_by_one() {
        let out = RemoveByte.mutate(b"abcd", 1);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn add_random_data_grows_by_howmany() {
        let out = AddRandomData.mutate(b"abcd", 3);
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn duplicate_byte_quirk_uses_len_when_len_exceeds_howmany() {
        // howmany is bumped to len(data) = 5, but each loop iteration
        // rebuilds from the original data, so only the final draw's
        // duplication survives: the result grows by exactly one byte.
        let out = DuplicateByte.mutate(b"abcde", 1);
        assert_eq!(out.len(), 5 + 1);
    }

    #[test]
    fn progressive_increase_noop_when_too_short() {
        let out = ProgressiveIncrease.mutate(b"ab", 8);
        assert_eq!(out, b"ab");
    }

    #[test]
    fn progressive_increase_applies_increasing_addends() {
        // addends start at 0: byte i gets +i, not +(i+1).
        let out = ProgressiveIncrease.mutate(&[0, 0, 0], 3);
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn progressive_increase_overflow_subtracts_0xff_not_0x100() {
        // addend i on byte 0xFF: once i + 0xFF > 0xFF, addend becomes
        // i - 0xFF, giving 0xFF + (i - 0xFF) = i, one more than the mod-256
        // wrap (i - 1) would produce.
        let out = ProgressiveIncrease.mutate(&[0xFF, 0xFF, 0xFF], 3);
        assert_eq!(out, vec![0xFF, 1, 2]);
    }

    #[test]
    fn progressive_decrease_applies_increasing_subtrahends_with_reflection() {
        // subtrahends start at 0: 5-0=5, 1-1=0, reflect 2-0=2 (not wrap to 253).
        let out = ProgressiveDecrease.mutate(&[5, 1, 0], 3);
        assert_eq!(out, vec![5, 0, 2]);
    }

    #[test]
    fn byte_nullifier_zeroes_one_byte() {
        let out = ByteNullifier.mutate(b"aaaa", 1);
        assert_eq!(out.iter().filter(|&&b| b == 0).count(), 1);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn swap_byte_noop_when_too_short() {
        assert_eq!(SwapByte.mutate(b"a", 2), b"a");
    }

    #[test]
    fn swap_word_preserves_length() {
        let out = SwapWord.mutate(b"abcdefgh", 4);
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn remove_lines_purges_when_too_few() {
        let out = RemoveLines.mutate(b"a\nb", 5);
        assert!(out.is_empty());
    }

    #[test]
    fn repeat_line_grows_line_count() {
        let out = RepeatLine.mutate(b"a\nb\nc", 2);
        let count = out.split(|&b| b == b'\n').count();
        assert_eq!(count, 3 + 2);
    }

    #[test]
    fn swap_adjacent_lines_preserves_line_count() {
        let out = SwapAdjacentLines.mutate(b"a\nb\nc\nd", 1);
        assert_eq!(out.split(|&b| b == b'\n').count(), 4);
    }

    #[test]
    fn quoted_textual_number_replaces_quoted_digits() {
        let out = QuotedTextualNumber.mutate(b"width=\"42\" height=\"7\"", 1);
        assert_ne!(out, b"width=\"42\" height=\"7\"");
    }

    #[test]
    fn quoted_textual_number_noop_without_match() {
        let out = QuotedTextualNumber.mutate(b"no quotes here", 1);
        assert_eq!(out, b"no quotes here");
    }

    #[test]
    fn increase_by_one_wraps_at_max() {
        let out = IncreaseByOne.mutate(&[0xFF], 1);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn decrease_by_one_wraps_at_zero() {
        let out = DecreaseByOne.mutate(&[0x00], 1);
        assert_eq!(out, vec![0xFF]);
    }
}
