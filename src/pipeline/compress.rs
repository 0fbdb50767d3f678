//! Concatenation of every cleaned revision into one text file.

use crate::error::Result;
use crate::storage::DumpStorage;

/// Write all cleaned texts, oldest first, separated by blank lines.
///
/// Returns the number of revisions written.
pub async fn compress(storage: &DumpStorage) -> Result<usize> {
    let names = storage.list_clean().await?;
    let mut texts = Vec::with_capacity(names.len());
    for name in &names {
        match storage.read_clean(name).await? {
            Some(clean) => texts.push(clean.content),
            None => log::warn!("Cleaned revision {name} vanished while compressing"),
        }
    }

    storage.write_compressed(&texts.join("\n\n")).await?;
    log::info!(
        "Compressed {} cleaned revisions into {}",
        texts.len(),
        storage.root().join(crate::storage::local::COMPRESS_FILE).display()
    );
    Ok(texts.len())
}
