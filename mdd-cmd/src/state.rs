use std::io::{stdout, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mdd::unpack::{StateStore, STATE_FILE};

use crate::info::Format;

pub fn show(data_dir: &Path, format: &Format) -> Result<()> {
    let path = data_dir.join(STATE_FILE);
    let store = StateStore::load(&path)
        .with_context(|| format!("loading state from {path:?}"))?;

    match format {
        Format::Json => serde_json::to_writer_pretty(stdout(), &store).context("serializing to json"),
        Format::Text => {
            let mut out = stdout();
            writeln!(out, "stream             length  index  unresolved")?;
            for (name, state) in store.iter() {
                let spans: Vec<String> = state
                    .unprocessed_data
                    .spans()
                    .iter()
                    .map(|(s, e)| format!("[{s}, {e})"))
                    .collect();
                writeln!(
                    out,
                    "{name:<16} {:>8}  {:>5}  {}",
                    state.file_size,
                    state.output_index,
                    if spans.is_empty() {
                        "none".to_string()
                    } else {
                        spans.join(" ")
                    }
                )?;
            }
            Ok(())
        }
    }
}
