//! JSON Lines export of stored business records

use crate::storage::ResultStore;
use crate::SweepError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every stored record to `path`, one JSON object per line
///
/// # Returns
///
/// The number of records written
pub fn export_jsonl<S: ResultStore>(store: &S, path: &Path) -> Result<u64, SweepError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let written = write_jsonl(store, &mut writer)?;
    writer.flush()?;

    tracing::info!("Exported {} records to {}", written, path.display());
    Ok(written)
}

/// Writes every stored record to `writer`, one JSON object per line
pub fn write_jsonl<S: ResultStore, W: Write>(store: &S, writer: &mut W) -> Result<u64, SweepError> {
    let mut written = 0;

    for record in store.iterate() {
        serde_json::to_writer(&mut *writer, &record?)?;
        writer.write_all(b"\n")?;
        written += 1;
    }

    Ok(written)
}
