//! Inference-time projection of one genome onto a persisted dictionary.

use crate::dictionary::KmerDictionary;
use crate::matrix::{feature_names, layout_features, KmerHeaders};
use crate::metadata::Instrument;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Feature columns of one genome, laid out exactly as the feature columns of
/// a training matrix built from the same dictionary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub genome_id: Option<String>,
    pub instrument: Option<Instrument>,
    pub values: Vec<u32>,
    /// K-mers of the genome that are not in the dictionary
    pub dropped_kmers: u64,
    pub dictionary_fingerprint: String,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn with_genome_id<S: Into<String>>(mut self, genome_id: S) -> Self {
        self.genome_id = Some(genome_id.into());
        self
    }

    /// Header line plus one value line
    pub fn write_csv<W: Write>(
        &self,
        dictionary: &KmerDictionary,
        headers: KmerHeaders,
        writer: W,
    ) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(feature_names(dictionary, headers, dictionary.placement()))
            .context("Failed to write vector header")?;
        csv_writer
            .write_record(self.values.iter().map(|v| v.to_string()))
            .context("Failed to write vector")?;
        csv_writer.flush().context("Failed to flush vector")?;
        Ok(())
    }
}

/// Project k-mer counts onto the dictionary. Unknown k-mers are dropped and
/// counted; an unknown instrument leaves all three instrument slots at 0.
pub fn assemble_row(
    counts: &[(String, u32)],
    dictionary: &KmerDictionary,
    instrument: Option<Instrument>,
) -> FeatureVector {
    let mut frequencies = vec![0u32; dictionary.len()];
    let dropped_kmers = dictionary.fill_frequencies(counts, &mut frequencies);

    FeatureVector {
        genome_id: None,
        instrument,
        values: layout_features(&frequencies, instrument, dictionary.placement()),
        dropped_kmers,
        dictionary_fingerprint: dictionary.fingerprint_hex(),
    }
}
