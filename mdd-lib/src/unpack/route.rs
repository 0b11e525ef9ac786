use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::frame::ResolvedFrame;
use crate::Result;

/// Default instrument-ID to category table, as deployed on the mooring
/// platform controllers.
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("PS", "status"),
    ("CS", "status"),
    ("WA", "wa_wfp"),
    ("WC", "wc_wfp"),
    ("WE", "we_wfp"),
    ("AD", "adcps"),
    ("CT", "ctdmo"),
    ("CO", "ctdmo"),
    ("DO", "dosta"),
    ("FL", "flort"),
    ("PH", "phsen"),
];

/// Maps instrument identifiers to named output categories.
///
/// New instrument categories only require a table entry; nothing in the
/// scanner or router branches on specific identifiers.
#[derive(Debug, Clone)]
pub struct CategoryMap(HashMap<String, String>);

impl Default for CategoryMap {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_CATEGORIES)
    }
}

impl CategoryMap {
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        CategoryMap(
            pairs
                .iter()
                .map(|&(id, cat)| (id.to_string(), cat.to_string()))
                .collect(),
        )
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }
}

/// What to do with a block whose instrument ID has no category.
///
/// The block is consumed from the unresolved set either way; the policy only
/// decides whether its bytes appear in any output file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Discard the block's output (observed controller-side behavior).
    #[default]
    Drop,
    /// Write the block to the named catch-all category.
    Bucket(String),
}

/// Appends decoded blocks to category output files for one stream.
///
/// Files are named `{stem}_{index}.{category}_{equipment}.dat` and created
/// lazily on first write. `index` is the stream's output sequence number at
/// run start, so a new run generation never touches a prior generation's
/// files.
pub struct Router<'a> {
    data_dir: &'a Path,
    stem: String,
    index: u32,
    categories: &'a CategoryMap,
    unmapped: &'a UnmappedPolicy,
    files: HashMap<PathBuf, File>,
}

impl<'a> Router<'a> {
    pub fn new(
        data_dir: &'a Path,
        file_name: &str,
        index: u32,
        categories: &'a CategoryMap,
        unmapped: &'a UnmappedPolicy,
    ) -> Self {
        Router {
            data_dir,
            stem: file_name.trim_end_matches(".dat").to_string(),
            index,
            categories,
            unmapped,
            files: HashMap::new(),
        }
    }

    /// Append a resolved block (header bytes plus decoded payload and
    /// terminal) to its category file. Returns false if the block was
    /// dropped by policy.
    pub fn route(&mut self, frame: &ResolvedFrame) -> Result<bool> {
        let category = match self.categories.get(&frame.header.id) {
            Some(category) => category,
            None => match self.unmapped {
                UnmappedPolicy::Drop => {
                    debug!(
                        id = %frame.header.id,
                        offset = frame.start,
                        "no category for instrument id; dropping block"
                    );
                    return Ok(false);
                }
                UnmappedPolicy::Bucket(category) => category,
            },
        };

        let path = self.data_dir.join(format!(
            "{}_{}.{}_{}.dat",
            self.stem, self.index, category, frame.header.equipment
        ));
        let file = match self.files.entry(path) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                trace!(path = %e.key().display(), "creating category output");
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(e.key())?;
                e.insert(file)
            }
        };
        file.write_all(frame.header_bytes)?;
        file.write_all(&frame.block)?;
        Ok(true)
    }
}
