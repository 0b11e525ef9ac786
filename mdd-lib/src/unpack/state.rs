use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::interval::IntervalSet;
use crate::Result;

/// Per-stream processing state, persisted between runs.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Byte ranges of the accumulation not yet resolved into decoded blocks.
    /// Always sorted, non-overlapping, and within `0..file_size`.
    pub unprocessed_data: IntervalSet,
    /// Current accumulation file length.
    pub file_size: u64,
    /// Output generation counter; incremented once per run that resolves at
    /// least one new block for the stream.
    pub output_index: u32,
}

/// The persisted state for all streams in a data directory, keyed by
/// accumulation file name.
///
/// Passed explicitly into every operation that reads or updates stream
/// state: callers load once at run start and save once at run end, so a run
/// either fully commits or leaves the prior state untouched.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore(BTreeMap<String, FileState>);

impl StateStore {
    /// Load the store from `path`. A missing file is a first run and yields
    /// an empty store.
    pub fn load(path: &Path) -> Result<StateStore> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no prior state");
                return Ok(StateStore::default());
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Persist the store to `path` atomically, via a temp file in the same
    /// directory renamed over the destination.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut w, self)?;
            w.flush()?;
        }
        tmp.persist(path).map_err(|err| err.error)?;
        trace!(path = %path.display(), streams = self.0.len(), "state saved");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FileState> {
        self.0.get(name)
    }

    /// State for `name`, created empty on first sight.
    pub fn entry(&mut self, name: &str) -> &mut FileState {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn insert(&mut self, name: String, state: FileState) {
        self.0.insert(name, state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileState)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(&dir.path().join("mdd-state.json")).unwrap();
        assert_eq!(store, StateStore::default());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdd-state.json");

        let mut store = StateStore::default();
        let state = store.entry("node58p1.dat");
        state.unprocessed_data.insert(4059, 4060);
        state.file_size = 4060;
        state.output_index = 1;
        store.save(&path).unwrap();

        let loaded = StateStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        let state = loaded.get("node58p1.dat").unwrap();
        assert_eq!(state.unprocessed_data.spans(), &[(4059, 4060)]);
        assert_eq!(state.file_size, 4060);
        assert_eq!(state.output_index, 1);
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mdd-state.json");

        let mut store = StateStore::default();
        store.entry("node58p1.dat").file_size = 10;
        store.save(&path).unwrap();

        store.entry("node58p1.dat").file_size = 20;
        store.save(&path).unwrap();

        let loaded = StateStore::load(&path).unwrap();
        assert_eq!(loaded.get("node58p1.dat").unwrap().file_size, 20);
    }
}
