use crate::dictionary::KmerDictionary;
use crate::dictionary_format::InstrumentPlacement;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

pub(crate) fn warn_if_leading(placement: InstrumentPlacement) {
    if placement == InstrumentPlacement::Leading {
        warn!(
            "Instrument columns placed before k-mer columns; models trained on trailing-instrument matrices are not compatible"
        );
    }
}

/// Build a k-mer dictionary from a corpus-wide KMC dump and persist it
pub fn build<P: AsRef<Path>>(
    all_kmers: P,
    placement: InstrumentPlacement,
    output: Option<&PathBuf>,
) -> Result<KmerDictionary> {
    let start_time = Instant::now();
    let path = all_kmers.as_ref();

    info!("Building k-mer dictionary from {}", path.display());
    let dictionary = KmerDictionary::from_kmc_dump(path)?.with_placement(placement);

    warn_if_leading(placement);
    if dictionary.is_empty() {
        warn!("No k-mers found in {}", path.display());
    }

    dictionary.write(output)?;

    info!(
        "Dictionary: {} k-mers (k={}), fingerprint {}, built in {:.2?}",
        dictionary.len(),
        dictionary.kmer_length(),
        dictionary.fingerprint_hex(),
        start_time.elapsed()
    );

    Ok(dictionary)
}
