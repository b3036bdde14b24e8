//! The on-disk campaign workspace: seed staging, named-pipe naming, the
//! chromosome archive, the crash archive, and the peer-exchange drop
//! directory (SPEC_FULL.md §4.10 Ambient stack, §5 "Shared resources").
//!
//! The reference implementation (`examples/original_source/campaign.py`)
//! makes this a process-wide singleton. Per SPEC_FULL.md §9 this crate
//! threads an explicit `Campaign` value through constructors instead; tests
//! build one per case from a fresh `tempfile::tempdir()`.
use crate::error::CampaignError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Owns every directory a running campaign touches. Directories are created
/// eagerly in `new` so later operations never race on "does this dir exist".
#[derive(Debug)]
pub struct Campaign {
    pub root: PathBuf,
    pub staging_dir: PathBuf,
    pub pipe_dir: PathBuf,
    pub chromosome_dir: PathBuf,
    pub crash_dir: PathBuf,
    pub generations_dir: PathBuf,
    pub shared_dir: Option<PathBuf>,
    /// Filenames already pulled from or pushed to `shared_dir`, so a peer's
    /// chromosome is never re-ingested (mirrors `Campaign.shared_files`).
    processed: Mutex<HashSet<String>>,
}

impl Campaign {
    /// Creates (or reuses) `root/name` with its standard subdirectories.
    pub fn new(root: &Path, name: &str) -> Result<Self, CampaignError> {
        let campaign_dir = root.join(name);
        let staging_dir = campaign_dir.join(".tmp");
        let pipe_dir = campaign_dir.join(".pipes");
        let chromosome_dir = campaign_dir.join(".chromo");
        let crash_dir = campaign_dir.join("crashes");
        let generations_dir = campaign_dir.join("generations");

        for dir in [
            &campaign_dir,
            &staging_dir,
            &pipe_dir,
            &chromosome_dir,
            &crash_dir,
            &generations_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self {
            root: campaign_dir,
            staging_dir,
            pipe_dir,
            chromosome_dir,
            crash_dir,
            generations_dir,
            shared_dir: None,
            processed: Mutex::new(HashSet::new()),
        })
    }

    /// Registers (and creates) the shared drop directory used for
    /// peer-instance exchange (`ChromosomeShared` configuration key).
    pub fn with_shared_dir(mut self, path: &Path) -> Result<Self, CampaignError> {
        std::fs::create_dir_all(path)?;
        self.shared_dir = Some(path.to_path_buf());
        Ok(self)
    }

    /// Copies every file of `source` into a named subdirectory of the
    /// campaign (used to stage the initial seed corpus).
    pub fn copy_directory(&self, source: &Path, name: &str) -> Result<PathBuf, CampaignError> {
        let dest = self.root.join(name);
        std::fs::create_dir_all(&dest)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::copy(entry.path(), dest.join(entry.file_name()))?;
            }
        }
        Ok(dest)
    }

    /// Writes `data` to a fresh staging file named after `uid`, returning its
    /// path. This is the file the target is pointed at for one analysis run.
    pub fn stage_input(&self, uid: u64, data: &[u8]) -> Result<PathBuf, CampaignError> {
        let path = self.staging_dir.join(uid.to_string());
        atomic_write(&path, data)?;
        Ok(path)
    }

    /// Picks a fresh named-pipe path under `pipe_dir`, not colliding with an
    /// existing file (mirrors `Campaign.create_pipe`'s retry loop).
    pub fn pipe_path(&self, uid: u64) -> PathBuf {
        let mut candidate = self.pipe_dir.join(format!("pipe{uid}"));
        let mut salt: u32 = 0;
        while candidate.exists() {
            candidate = self.pipe_dir.join(format!("pipe{uid}-{salt}"));
            salt += 1;
        }
        candidate
    }

    pub fn delete_pipe(&self, path: &Path) {
        if let Err(err) = std::fs::remove_file(path) {
            log::warn!("could not delete pipe {}: {err}", path.display());
        }
    }

    /// Persists a chromosome's side-channel blob under the archive,
    /// overwriting any prior version. Uses rename-on-write so a concurrent
    /// reader (a peer instance walking the shared dir) never observes a
    /// partially written file (SPEC_FULL.md §5).
    pub fn store_chromosome(&self, uid: u64, blob: &[u8]) -> Result<PathBuf, CampaignError> {
        let path = self.chromosome_dir.join(uid.to_string());
        atomic_write(&path, blob)?;
        Ok(path)
    }

    pub fn chromosome_path(&self, uid: u64) -> PathBuf {
        self.chromosome_dir.join(uid.to_string())
    }

    pub fn load_chromosome(&self, uid: u64) -> Result<Vec<u8>, CampaignError> {
        let path = self.chromosome_path(uid);
        std::fs::read(&path).map_err(|e| {
            CampaignError::Analysis(format!("chromosome {uid} missing on disk: {e}"))
        })
    }

    pub fn delete_chromosome(&self, uid: u64) -> Result<(), CampaignError> {
        let path = self.chromosome_path(uid);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Archives a crashing chromosome's serialized (target-native) bytes.
    pub fn archive_crash(&self, uid: u64, serialized: &[u8]) -> Result<PathBuf, CampaignError> {
        let path = self.crash_dir.join(uid.to_string());
        atomic_write(&path, serialized)?;
        Ok(path)
    }

    /// Creates (if needed) the per-epoch directory used when
    /// `KeepGenerations` is set, returning its path.
    pub fn generation_dir(&self, epoch: u64) -> Result<PathBuf, CampaignError> {
        let dir = self.generations_dir.join(epoch.to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// True if `filename` was already pushed to or pulled from the shared
    /// directory by this instance.
    pub fn already_processed(&self, filename: &str) -> bool {
        self.processed.lock().unwrap().contains(filename)
    }

    /// Dumps `blob` into the shared directory under `filename`, marking it
    /// processed so this instance never re-ingests its own drop.
    pub fn dump_to_shared(&self, filename: &str, blob: &[u8]) -> Result<(), CampaignError> {
        let Some(shared) = &self.shared_dir else {
            return Ok(());
        };
        if self.already_processed(filename) {
            return Ok(());
        }
        atomic_write(&shared.join(filename), blob)?;
        self.processed.lock().unwrap().insert(filename.to_string());
        Ok(())
    }

    /// Lists entries in the shared directory not yet processed by this
    /// instance, reading each one's bytes.
    pub fn poll_shared(&self) -> Result<Vec<(String, Vec<u8>)>, CampaignError> {
        let Some(shared) = &self.shared_dir else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for entry in std::fs::read_dir(shared)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.already_processed(&name) {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            self.processed.lock().unwrap().insert(name.clone());
            out.push((name, bytes));
        }
        Ok(out)
    }
}

/// Writes `data` to `path` via a temp file plus rename, so a reader never
/// observes a partial write (SPEC_FULL.md §5 "atomic file-writes").
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), CampaignError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    use std::io::Write;
    tmp.write_all(data)?;
    tmp.persist(path)
        .map_err(|e| CampaignError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_standard_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        let campaign = Campaign::new(tmp.path(), "test-campaign").unwrap();
        assert!(campaign.staging_dir.is_dir());
        assert!(campaign.chromosome_dir.is_dir());
        assert!(campaign.crash_dir.is_dir());
    }

    #[test]
    fn store_and_load_chromosome_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let campaign = Campaign::new(tmp.path(), "c").unwrap();
        campaign.store_chromosome(42, b"hello").unwrap();
        assert_eq!(campaign.load_chromosome(42).unwrap(), b"hello");
        campaign.delete_chromosome(42).unwrap();
        assert!(campaign.load_chromosome(42).is_err());
    }

    #[test]
    fn shared_dir_tracks_already_processed() {
        let tmp = tempfile::tempdir().unwrap();
        let shared = tmp.path().join("shared");
        let campaign = Campaign::new(tmp.path(), "c")
            .unwrap()
            .with_shared_dir(&shared)
            .unwrap();
        campaign.dump_to_shared("123", b"abc").unwrap();
        assert!(campaign.already_processed("123"));
        let polled = campaign.poll_shared().unwrap();
        assert!(polled.is_empty(), "own drop must not be re-ingested");
    }

    #[test]
    fn pipe_path_avoids_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let campaign = Campaign::new(tmp.path(), "c").unwrap();
        let p1 = campaign.pipe_path(1);
        std::fs::write(&p1, b"").unwrap();
        let p2 = campaign.pipe_path(1);
        assert_ne!(p1, p2);
    }
}
