//! The one concrete parser plugin this crate ships: a length-prefixed,
//! CRC-trailed chunk container (SPEC_FULL.md §4.4). Grounded on
//! `examples/original_source/chromosome/parsers/PNG.py`: an 8-byte
//! signature followed by `{length, tag, payload, crc}` chunks, with the
//! payload of chunks tagged `IDAT` treated as one logical zlib stream that
//! is inflated for mutation and re-deflated (re-chunked across the same
//! chunk count) on serialization.
use crate::chromosome::Chromosome;
use crate::error::CampaignError;
use crate::gene::GeneNode;
use crate::parser::{Deserializer, Serializer};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::RngCore;
use std::io::{Read, Write};
use std::path::Path;

/// The 8-byte file signature, emitted verbatim on serialization.
pub const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

const IDAT: [u8; 4] = *b"IDAT";

/// Parses the chunk container into one root gene per chunk.
pub struct ChunkedDeserializer;

impl Deserializer for ChunkedDeserializer {
    fn deserialize(&self, path: &Path, rng: &mut dyn RngCore) -> Result<Chromosome, CampaignError> {
        let bytes = std::fs::read(path)
            .map_err(|e| CampaignError::Parse(format!("could not read {}: {e}", path.display())))?;
        if bytes.len() < SIGNATURE.len() || bytes[..SIGNATURE.len()] != SIGNATURE {
            return Err(CampaignError::Parse(format!(
                "{} does not start with the expected signature",
                path.display()
            )));
        }

        let mut chunks = Vec::new();
        let mut cursor = SIGNATURE.len();
        while cursor < bytes.len() {
            if cursor + 12 > bytes.len() {
                return Err(CampaignError::Parse("truncated chunk header".into()));
            }
            let length = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
            let mut tag = [0u8; 4];
            tag.copy_from_slice(&bytes[cursor + 4..cursor + 8]);
            let payload_start = cursor + 8;
            let payload_end = payload_start
                .checked_add(length)
                .ok_or_else(|| CampaignError::Parse("chunk length overflow".into()))?;
            if payload_end + 4 > bytes.len() {
                return Err(CampaignError::Parse("chunk payload runs past end of file".into()));
            }
            let payload = bytes[payload_start..payload_end].to_vec();
            cursor = payload_end + 4;
            chunks.push((tag, payload));
        }

        inflate_idat_chunks(&mut chunks);

        let mut chromosome = Chromosome::empty(rng);
        for (tag, payload) in chunks {
            let node = GeneNode::new(payload, tag);
            let id = chromosome.alloc(node);
            chromosome.add_gene(id);
        }
        Ok(chromosome)
    }
}

/// Serializes a chromosome's root genes back into the chunk container.
pub struct ChunkedSerializer;

impl Serializer for ChunkedSerializer {
    fn serialize(&self, chromosome: &Chromosome) -> Vec<u8> {
        let mut chunks: Vec<(usize, [u8; 4], Vec<u8>)> = chromosome
            .get_genes()
            .iter()
            .map(|&id| {
                let node = chromosome.node(id);
                (id, node.tag, node.data.clone())
            })
            .collect();

        deflate_idat_chunks(&mut chunks);

        let mut out = Vec::with_capacity(SIGNATURE.len() + chunks.len() * 16);
        out.extend_from_slice(&SIGNATURE);
        for (_, tag, payload) in &chunks {
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(tag);
            out.extend_from_slice(payload);
            out.extend_from_slice(&chunk_crc(tag, payload).to_be_bytes());
        }
        out
    }
}

/// Recomputes a chunk's CRC-32 over `tag || payload`, per SPEC_FULL.md §4.4.
fn chunk_crc(tag: &[u8; 4], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(tag);
    hasher.update(payload);
    hasher.finalize()
}

/// Concatenates every `IDAT`-tagged chunk's payload and inflates it in
/// place, so mutation targets the logical (uncompressed) stream rather than
/// raw deflate bytes. No-ops if there are no `IDAT` chunks, or if the
/// concatenated stream fails to inflate (malformed seed, left untouched so
/// deserialization still yields genes for every other chunk).
fn inflate_idat_chunks(chunks: &mut [([u8; 4], Vec<u8>)]) {
    let indices: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, (tag, _))| *tag == IDAT)
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return;
    }

    let mut compressed = Vec::new();
    for &i in &indices {
        compressed.extend_from_slice(&chunks[i].1);
    }

    let mut inflated = Vec::new();
    match ZlibDecoder::new(&compressed[..]).read_to_end(&mut inflated) {
        Ok(_) => redistribute(chunks, &indices, &inflated),
        Err(err) => log::warn!("failed to inflate IDAT stream, leaving chunks raw: {err}"),
    }
}

/// Re-deflates the logical stream held across `IDAT`-tagged genes and
/// re-chunks it across the same number of chunks the chromosome started
/// with (lengths of individual chunks may differ from the original;
/// semantic equivalence, not byte-equivalence, is the contract — SPEC_FULL.md
/// §4.4, §8 scenario 6).
fn deflate_idat_chunks(chunks: &mut [(usize, [u8; 4], Vec<u8>)]) {
    let indices: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, (_, tag, _))| *tag == IDAT)
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return;
    }

    let mut datastream = Vec::new();
    for &i in &indices {
        datastream.extend_from_slice(&chunks[i].2);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&datastream).expect("writing to an in-memory encoder cannot fail");
    let compressed = encoder.finish().expect("finishing an in-memory encoder cannot fail");

    let chunk_count = indices.len();
    let chunk_len = compressed.len().div_ceil(chunk_count).max(1);
    for (cnt, &i) in indices.iter().enumerate() {
        let start = (cnt * chunk_len).min(compressed.len());
        let end = if i == *indices.last().unwrap() {
            compressed.len()
        } else {
            (start + chunk_len).min(compressed.len())
        };
        chunks[i].2 = compressed[start..end].to_vec();
    }
}

/// Splits `inflated` back across the chunks named by `indices`, mirroring
/// the reference's `ceil(len / count)`-sized, last-chunk-takes-remainder
/// split.
fn redistribute(chunks: &mut [([u8; 4], Vec<u8>)], indices: &[usize], inflated: &[u8]) {
    let chunk_len = inflated.len().div_ceil(indices.len()).max(1);
    for (cnt, &i) in indices.iter().enumerate() {
        let start = (cnt * chunk_len).min(inflated.len());
        let end = if i == *indices.last().unwrap() {
            inflated.len()
        } else {
            (start + chunk_len).min(inflated.len())
        };
        chunks[i].1 = inflated[start..end].to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::io::Write as _;

    fn build_file(chunks: &[([u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        for (tag, payload) in chunks {
            out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            out.extend_from_slice(tag);
            out.extend_from_slice(payload);
            out.extend_from_slice(&chunk_crc(tag, payload).to_be_bytes());
        }
        out
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn rejects_bad_signature() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"not a chunk file").unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(ChunkedDeserializer.deserialize(tmp.path(), &mut rng).is_err());
    }

    #[test]
    fn deserialize_yields_one_gene_per_chunk() {
        let comp = deflate(b"hello world");
        let file = build_file(&[(*b"IHDR", b"header"), (*b"IDAT", &comp), (*b"IEND", b"")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &file).unwrap();

        let mut rng = SmallRng::seed_from_u64(2);
        let chromosome = ChunkedDeserializer.deserialize(tmp.path(), &mut rng).unwrap();
        assert_eq!(chromosome.get_genes().len(), 3);
        let idat = chromosome.node(chromosome.get_genes()[1]);
        assert_eq!(idat.data, b"hello world");
    }

    #[test]
    fn round_trip_without_mutation_is_semantically_equivalent() {
        let comp = deflate(b"the quick brown fox jumps over the lazy dog");
        let file = build_file(&[(*b"IHDR", b"header"), (*b"IDAT", &comp), (*b"IEND", b"")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &file).unwrap();

        let mut rng = SmallRng::seed_from_u64(3);
        let chromosome = ChunkedDeserializer.deserialize(tmp.path(), &mut rng).unwrap();
        let serialized = ChunkedSerializer.serialize(&chromosome);

        assert_eq!(&serialized[..SIGNATURE.len()], &SIGNATURE);

        // re-parse and check the logical (inflated) payload is unchanged
        let tmp2 = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp2.path(), &serialized).unwrap();
        let mut rng2 = SmallRng::seed_from_u64(4);
        let reparsed = ChunkedDeserializer.deserialize(tmp2.path(), &mut rng2).unwrap();
        let idat = reparsed.node(reparsed.get_genes()[1]);
        assert_eq!(idat.data, b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn malformed_idat_stream_is_left_raw_instead_of_failing_the_parse() {
        let file = build_file(&[(*b"IHDR", b"header"), (*b"IDAT", b"not zlib data"), (*b"IEND", b"")]);
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), &file).unwrap();

        let mut rng = SmallRng::seed_from_u64(5);
        let chromosome = ChunkedDeserializer.deserialize(tmp.path(), &mut rng).unwrap();
        assert_eq!(chromosome.get_genes().len(), 3);
        let idat = chromosome.node(chromosome.get_genes()[1]);
        assert_eq!(idat.data, b"not zlib data");
    }

    #[test]
    fn crc_covers_tag_and_payload() {
        let a = chunk_crc(b"IDAT", b"abc");
        let b = chunk_crc(b"IDAT", b"abd");
        assert_ne!(a, b);
    }
}
