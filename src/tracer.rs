//! Disassembler-dump ingestion and the trace-pipe protocol (SPEC_FULL.md
//! §4.10, §6.3). Grounded on `examples/original_source/tracer.py`'s
//! `Tracer` class and binary trace-file format.
use crate::blockcache::BlockCache;
use crate::campaign::Campaign;
use crate::chromosome::Chromosome;
use crate::error::CampaignError;
use crate::parser::Serializer;
use crate::trace::Trace;
use crate::watchdog::Watchdog;
use rustc_hash::FxHashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Owns the per-image `BlockCache`s, and drives one target execution per
/// `analyze` call: stage input, create a pipe, launch the target, arm the
/// watchdog, block reading the pipe, parse the trace.
pub struct Tracer {
    caches: FxHashMap<String, BlockCache>,
    command: String,
    whitelist: Vec<PathBuf>,
    timeout: Duration,
}

impl Tracer {
    /// Runs the configured disassembler against every whitelisted image and
    /// builds the per-image `BlockCache`s from its dump output. Mirrors
    /// `Tracer.initialize_campaign`/`disassemble`.
    pub fn setup(
        disassembler_path: &Path,
        whitelist: Vec<PathBuf>,
        command: String,
        timeout: u64,
    ) -> Result<Self, CampaignError> {
        let mut caches = FxHashMap::default();
        for target in &whitelist {
            let output = std::process::Command::new(disassembler_path)
                .arg(target)
                .output()
                .map_err(|e| CampaignError::Analysis(format!("disassembler failed on {}: {e}", target.display())))?;
            if !output.status.success() {
                return Err(CampaignError::Analysis(format!(
                    "disassembler exited with {} for {}",
                    output.status,
                    target.display()
                )));
            }
            let dump = String::from_utf8_lossy(&output.stdout);
            let basename = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| target.display().to_string());
            caches.insert(basename, BlockCache::parse_dump(dump.lines()));
        }
        Ok(Self {
            caches,
            command,
            whitelist,
            timeout: Duration::from_secs(timeout),
        })
    }

    #[cfg(test)]
    fn with_caches(caches: FxHashMap<String, BlockCache>, command: String, timeout: u64) -> Self {
        Self {
            caches,
            command,
            whitelist: Vec::new(),
            timeout: Duration::from_secs(timeout),
        }
    }

    pub fn caches(&self) -> &FxHashMap<String, BlockCache> {
        &self.caches
    }

    /// Serializes and stages `chromosome`, runs the target against it over a
    /// fresh named pipe, and returns the resulting trace.
    pub fn analyze(
        &mut self,
        campaign: &Campaign,
        chromosome: &Chromosome,
        serializer: &dyn Serializer,
    ) -> Result<Trace, CampaignError> {
        let bytes = chromosome.serialize(serializer);
        let staged = campaign.stage_input(chromosome.uid, &bytes)?;
        let pipe_path = campaign.pipe_path(chromosome.uid);

        nix::unistd::mkfifo(&pipe_path, nix::sys::stat::Mode::from_bits_truncate(0o600))
            .map_err(|e| CampaignError::Analysis(format!("mkfifo failed for {}: {e}", pipe_path.display())))?;

        let cmd = self.command.replacen("%s", &staged.to_string_lossy(), 1);
        let whitelist_names: Vec<String> = self
            .whitelist
            .iter()
            .map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
            .collect();

        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .env("CHORONZON_TRACE_PIPE", &pipe_path)
            .env("CHORONZON_WHITELIST", whitelist_names.join(":"))
            .spawn()
            .map_err(|e| CampaignError::Analysis(format!("failed to launch target: {e}")))?;

        let watchdog = Watchdog::arm(child.id() as i32, self.timeout);

        // Opening the FIFO for reading blocks until the target opens it for
        // writing; EOF arrives once the target closes its end.
        let mut pipe = std::fs::File::open(&pipe_path)
            .map_err(|e| CampaignError::Analysis(format!("failed to open trace pipe: {e}")))?;
        let trace = self.parse_trace(&mut pipe);

        let _ = child.wait();
        watchdog.mark_exited();
        watchdog.cancel();
        campaign.delete_pipe(&pipe_path);

        trace
    }

    /// Parses the binary trace-pipe framing (SPEC_FULL.md §6.3): a 1-byte
    /// image count, per-image `{2-byte LE length, name}`, then repeating
    /// `{8-byte LE image_index, 8-byte LE bbl_offset}` records. The sentinel
    /// `image_index == u64::MAX` terminates the stream; `bbl_offset == 0xC`
    /// means a clean exit, anything else marks the trace as crashed.
    fn parse_trace(&mut self, reader: &mut impl Read) -> Result<Trace, CampaignError> {
        let mut trace = Trace::new();

        let mut count_buf = [0u8; 1];
        reader
            .read_exact(&mut count_buf)
            .map_err(|e| CampaignError::Analysis(format!("failed to read trace image count: {e}")))?;
        let image_count = count_buf[0] as usize;

        let mut images = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            let mut len_buf = [0u8; 2];
            reader
                .read_exact(&mut len_buf)
                .map_err(|e| CampaignError::Analysis(format!("failed to read image name length: {e}")))?;
            let len = u16::from_le_bytes(len_buf) as usize;
            let mut name_buf = vec![0u8; len];
            reader
                .read_exact(&mut name_buf)
                .map_err(|e| CampaignError::Analysis(format!("failed to read image name: {e}")))?;
            let name = String::from_utf8_lossy(&name_buf).into_owned();
            let basename = Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(name);
            trace.add_image(&basename);
            images.push(basename);
        }

        let mut record = [0u8; 16];
        loop {
            match reader.read_exact(&mut record) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(CampaignError::Analysis(format!("failed to read trace record: {e}"))),
            }
            let image_index = u64::from_le_bytes(record[0..8].try_into().unwrap());
            let bbl_offset = u64::from_le_bytes(record[8..16].try_into().unwrap());

            if image_index == u64::MAX {
                if bbl_offset != 0xC {
                    trace.has_crashed = true;
                }
                break;
            }

            let Some(image) = images.get(image_index as usize) else { continue };
            if let Some(cache) = self.caches.get_mut(image) {
                if let Some((start, _end)) = cache.lookup(bbl_offset) {
                    trace.add_bbl(image, start);
                }
            }
        }

        Ok(trace)
    }
}
