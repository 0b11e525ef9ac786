//! Incremental unpacking of dump sections into accumulation files and
//! per-category block output.
//!
//! [Unpacker::process] is the batch entry point: sections from each dump
//! file are merged into their stream's accumulation file in input order,
//! then every touched stream is scanned for complete SIO blocks over the
//! byte ranges its [FileState] still marks unresolved. Streams are mutually
//! independent and are resolved in parallel. State is loaded once at run
//! start and committed once at run end.

pub mod frame;
pub mod interval;
pub mod route;
pub mod state;

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, error, trace, warn};

use crate::dump::{read_sections, Section, SectionInfo};
use crate::{Error, Result};

pub use frame::{FrameScanner, ResolvedFrame, SioHeader};
pub use interval::IntervalSet;
pub use route::{CategoryMap, Router, UnmappedPolicy};
pub use state::{FileState, StateStore};

/// State store file name within the data directory.
pub const STATE_FILE: &str = "mdd-state.json";

/// Batch processor for `.mdd` dump files.
///
/// ```no_run
/// use mdd::unpack::Unpacker;
///
/// let sections = Unpacker::new("data")
///     .process(&["unit_364-2013-206-2-0.mdd"])
///     .unwrap();
/// ```
pub struct Unpacker {
    data_dir: PathBuf,
    state_path: PathBuf,
    categories: CategoryMap,
    unmapped: UnmappedPolicy,
}

impl Unpacker {
    /// Create an unpacker writing accumulation files, category output, and
    /// state to `data_dir`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        let state_path = data_dir.join(STATE_FILE);
        Unpacker {
            data_dir,
            state_path,
            categories: CategoryMap::default(),
            unmapped: UnmappedPolicy::default(),
        }
    }

    /// Use a non-default instrument-ID to category table.
    #[must_use]
    pub fn with_categories(mut self, categories: CategoryMap) -> Self {
        self.categories = categories;
        self
    }

    /// Use a non-default policy for blocks with unmapped instrument IDs.
    #[must_use]
    pub fn with_unmapped_policy(mut self, policy: UnmappedPolicy) -> Self {
        self.unmapped = policy;
        self
    }

    /// Keep the state store somewhere other than the data directory.
    #[must_use]
    pub fn with_state_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.state_path = path.as_ref().to_path_buf();
        self
    }

    /// Process a batch of dump files.
    ///
    /// Returns the metadata of every section discovered across the batch,
    /// for external reporting; see [crate::dump::summary].
    ///
    /// A dump file that cannot be opened or parsed is logged and skipped; a
    /// stream whose accumulation or output files cannot be written is logged
    /// and abandoned for this run. Neither stops the batch.
    ///
    /// # Errors
    /// Failure to load or commit the state store.
    pub fn process<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<SectionInfo>> {
        fs::create_dir_all(&self.data_dir)?;
        let mut store = StateStore::load(&self.state_path)?;

        let mut infos: Vec<SectionInfo> = Vec::new();
        let mut touched: BTreeSet<String> = BTreeSet::new();
        for path in paths {
            let path = path.as_ref();
            let file = match File::open(path) {
                Ok(file) => file,
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot open dump file; skipping");
                    continue;
                }
            };
            debug!(path = %path.display(), "reading dump");
            for zult in read_sections(BufReader::new(file)) {
                match zult {
                    Ok(section) => {
                        let name = section.file_name();
                        match merge_section(&self.data_dir, store.entry(&name), &section) {
                            Ok(()) => {
                                touched.insert(name);
                                infos.push(section.info());
                            }
                            Err(Error::InvalidRange { start, end }) => {
                                warn!(%name, start, end, "malformed section range; skipping");
                            }
                            Err(err) => {
                                error!(%name, %err, "accumulation write failed; skipping section");
                            }
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), %err, "abandoning dump file");
                        break;
                    }
                }
            }
        }

        // Streams are independent; resolve them in parallel, each worker
        // exclusively owning its stream's files and state.
        let touched: Vec<String> = touched.into_iter().collect();
        let resolved: Vec<(String, FileState, Option<Error>)> = touched
            .par_iter()
            .map(|name| {
                let mut state = store.get(name).cloned().unwrap_or_default();
                let zult = resolve_stream(
                    &self.data_dir,
                    name,
                    &mut state,
                    &self.categories,
                    &self.unmapped,
                );
                (name.clone(), state, zult.err())
            })
            .collect();

        for (name, state, err) in resolved {
            if let Some(err) = err {
                error!(stream = %name, %err, "block resolution failed; stream abandoned this run");
            }
            store.insert(name, state);
        }

        store.save(&self.state_path)?;
        Ok(infos)
    }
}

/// Fold one section into its stream's accumulation file and [FileState].
///
/// A section is skipped when it carries no information: its range neither
/// extends the file nor intersects any unresolved bytes. Otherwise its bytes
/// are written at their stream offsets. Writing past the current end
/// zero-fills any gap below `start`, and the whole newly covered range
/// `[old length, end)` (gap included) joins the unresolved set so the
/// scanner visits it once real bytes arrive. Overlapping rewrites carry
/// identical content, since every dump re-reads the same logical stream.
fn merge_section(data_dir: &Path, state: &mut FileState, section: &Section) -> Result<()> {
    if section.start >= section.end {
        return Err(Error::InvalidRange {
            start: section.start,
            end: section.end,
        });
    }

    let len = state.file_size;
    let grows = section.end > len;
    if !grows && !state.unprocessed_data.intersects(section.start, section.end) {
        trace!(
            name = %section.file_name(),
            start = section.start,
            end = section.end,
            "section already covered; skipping"
        );
        return Ok(());
    }

    let path = data_dir.join(section.file_name());
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(&path)?;
    file.seek(SeekFrom::Start(section.start))?;
    file.write_all(&section.data)?;
    debug!(
        name = %section.file_name(),
        start = section.start,
        end = section.end,
        grows,
        "merged section"
    );

    if grows {
        state.unprocessed_data.insert(len, section.end);
        state.file_size = section.end;
    }
    Ok(())
}

/// Scan a stream's unresolved spans for complete blocks, route them, and
/// update its [FileState]. Returns the number of blocks resolved.
fn resolve_stream(
    data_dir: &Path,
    name: &str,
    state: &mut FileState,
    categories: &CategoryMap,
    unmapped: &UnmappedPolicy,
) -> Result<usize> {
    let acc = fs::read(data_dir.join(name))?;
    let mut router = Router::new(data_dir, name, state.output_index, categories, unmapped);

    let spans = state.unprocessed_data.spans().to_vec();
    let mut resolved = 0usize;
    for (start, end) in spans {
        for frame in FrameScanner::new(&acc, start as usize, end as usize) {
            router.route(&frame)?;
            state.unprocessed_data.subtract(frame.start, frame.end);
            resolved += 1;
        }
    }

    if resolved > 0 {
        state.output_index += 1;
    }
    debug!(
        stream = name,
        resolved,
        unresolved = ?state.unprocessed_data.spans(),
        "stream scan complete"
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn section(start: u64, data: &[u8]) -> Section {
        Section {
            node: 58,
            port: 1,
            start,
            end: start + data.len() as u64,
            time: DateTime::from_timestamp(1_374_783_660, 0).unwrap(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn merge_appends_and_tracks_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::default();

        merge_section(dir.path(), &mut state, &section(0, &[1, 2, 3, 4])).unwrap();
        assert_eq!(state.file_size, 4);
        assert_eq!(state.unprocessed_data.spans(), &[(0, 4)]);

        merge_section(dir.path(), &mut state, &section(4, &[5, 6])).unwrap();
        assert_eq!(state.file_size, 6);
        assert_eq!(state.unprocessed_data.spans(), &[(0, 6)]);

        let acc = fs::read(dir.path().join("node58p1.dat")).unwrap();
        assert_eq!(acc, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn merge_gap_zero_fills_and_covers_hole() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::default();

        merge_section(dir.path(), &mut state, &section(0, &[1, 2])).unwrap();
        merge_section(dir.path(), &mut state, &section(6, &[7, 8])).unwrap();
        assert_eq!(state.file_size, 8);
        // the hole [2, 6) is part of the single unresolved range
        assert_eq!(state.unprocessed_data.spans(), &[(0, 8)]);

        let acc = fs::read(dir.path().join("node58p1.dat")).unwrap();
        assert_eq!(acc, vec![1, 2, 0, 0, 0, 0, 7, 8]);
    }

    #[test]
    fn merge_skips_fully_resolved_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::default();

        merge_section(dir.path(), &mut state, &section(0, &[1, 2, 3, 4])).unwrap();
        state.unprocessed_data.subtract(0, 4); // pretend all resolved

        // same range again: no write, no state change
        fs::write(dir.path().join("node58p1.dat"), [9, 9, 9, 9]).unwrap();
        merge_section(dir.path(), &mut state, &section(0, &[1, 2, 3, 4])).unwrap();
        assert_eq!(
            fs::read(dir.path().join("node58p1.dat")).unwrap(),
            vec![9, 9, 9, 9]
        );
        assert_eq!(state.file_size, 4);
    }

    #[test]
    fn merge_rewrites_overlap_still_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::default();

        merge_section(dir.path(), &mut state, &section(0, &[0, 0])).unwrap();
        merge_section(dir.path(), &mut state, &section(6, &[7, 8])).unwrap();

        // hole [2, 6) is unresolved, so a later dump covering it is written
        // even though it does not extend the file
        merge_section(dir.path(), &mut state, &section(2, &[3, 4, 5, 6])).unwrap();
        let acc = fs::read(dir.path().join("node58p1.dat")).unwrap();
        assert_eq!(acc, vec![0, 0, 3, 4, 5, 6, 7, 8]);
        assert_eq!(state.file_size, 8);
        assert_eq!(state.unprocessed_data.spans(), &[(0, 8)]);
    }

    #[test]
    fn merge_rejects_malformed_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FileState::default();
        let mut bad = section(10, &[1]);
        bad.end = 10;
        bad.data.clear();
        let err = merge_section(dir.path(), &mut state, &bad).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
        assert_eq!(state, FileState::default());
    }
}
