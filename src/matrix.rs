//! Training matrix assembly.
//!
//! Column layout for a dictionary of N k-mers with trailing placement:
//! `genome_id, 0..N-1, alinity, panther, cepheid, ct_value`. With leading
//! placement the instrument block moves in front of the k-mers. Either way
//! the feature columns between `genome_id` and `ct_value` are exactly the
//! columns of an inference vector built from the same dictionary.

use crate::counts::GenomeCounts;
use crate::dictionary::KmerDictionary;
use crate::dictionary_format::InstrumentPlacement;
use crate::metadata::{one_hot, Instrument, MetadataTable};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const GENOME_ID_COLUMN: &str = "genome_id";
pub const CT_VALUE_COLUMN: &str = "ct_value";
/// Identifier, three instrument columns and the target
pub const AUXILIARY_COLUMNS: usize = 5;

/// How k-mer columns are named in the matrix header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KmerHeaders {
    /// Column index, `0..N-1`
    #[default]
    Index,
    /// The k-mer itself
    Sequence,
}

/// Feature columns (no identifier, no target) in placement order
pub fn feature_names(
    dictionary: &KmerDictionary,
    headers: KmerHeaders,
    placement: InstrumentPlacement,
) -> Vec<String> {
    let kmer_names = dictionary
        .kmers()
        .iter()
        .enumerate()
        .map(|(i, kmer)| match headers {
            KmerHeaders::Index => i.to_string(),
            KmerHeaders::Sequence => kmer.clone(),
        });
    let instrument_names = Instrument::ALL.iter().map(|i| i.column_name().to_string());

    match placement {
        InstrumentPlacement::Trailing => kmer_names.chain(instrument_names).collect(),
        InstrumentPlacement::Leading => instrument_names.chain(kmer_names).collect(),
    }
}

/// Concatenate the k-mer block and the instrument block in placement order
pub fn layout_features(
    frequencies: &[u32],
    instrument: Option<Instrument>,
    placement: InstrumentPlacement,
) -> Vec<u32> {
    let slots = one_hot(instrument).map(u32::from);
    let mut features = Vec::with_capacity(frequencies.len() + slots.len());
    match placement {
        InstrumentPlacement::Trailing => {
            features.extend_from_slice(frequencies);
            features.extend_from_slice(&slots);
        }
        InstrumentPlacement::Leading => {
            features.extend_from_slice(&slots);
            features.extend_from_slice(frequencies);
        }
    }
    features
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub genome_id: String,
    /// Indexed by dictionary column
    pub frequencies: Vec<u32>,
    pub instrument: Option<Instrument>,
    /// `None` when the metadata row has no usable Ct value
    pub ct_value: Option<f64>,
}

impl FeatureRow {
    pub fn features(&self, placement: InstrumentPlacement) -> Vec<u32> {
        layout_features(&self.frequencies, self.instrument, placement)
    }
}

/// Counters for one assembly pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub genomes_in: usize,
    pub rows: usize,
    /// Genomes with no metadata row
    pub missing_metadata: Vec<String>,
    /// Genomes kept with an empty Ct value because their metadata row has none
    pub missing_target: Vec<String>,
    /// Genomes whose instrument label is not one of the known instruments
    pub unknown_instrument: Vec<String>,
    pub unknown_kmers_dropped: u64,
}

/// Outcome of adding one genome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Added { dropped_kmers: u64 },
    MissingMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    placement: InstrumentPlacement,
    kmer_count: usize,
    rows: Vec<FeatureRow>,
    stats: AssemblyStats,
}

impl FeatureMatrix {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.kmer_count + AUXILIARY_COLUMNS
    }

    pub fn placement(&self) -> InstrumentPlacement {
        self.placement
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    pub fn column_names(&self, dictionary: &KmerDictionary, headers: KmerHeaders) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_columns());
        names.push(GENOME_ID_COLUMN.to_string());
        names.extend(feature_names(dictionary, headers, self.placement));
        names.push(CT_VALUE_COLUMN.to_string());
        names
    }

    /// Write the matrix as CSV with a header row
    pub fn write_csv<W: Write>(
        &self,
        dictionary: &KmerDictionary,
        headers: KmerHeaders,
        writer: W,
    ) -> Result<()> {
        if dictionary.len() != self.kmer_count || dictionary.placement() != self.placement {
            return Err(anyhow::anyhow!(
                "Matrix was assembled with {} k-mer columns ({} placement) but the dictionary has {} ({} placement)",
                self.kmer_count,
                self.placement.as_str(),
                dictionary.len(),
                dictionary.placement().as_str()
            ));
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(self.column_names(dictionary, headers))
            .context("Failed to write matrix header")?;

        for row in &self.rows {
            csv_writer.write_field(&row.genome_id)?;
            for value in row.features(self.placement) {
                csv_writer.write_field(value.to_string())?;
            }
            match row.ct_value {
                Some(ct_value) => csv_writer.write_field(ct_value.to_string())?,
                None => csv_writer.write_field("")?,
            }
            csv_writer
                .write_record(None::<&[u8]>)
                .with_context(|| format!("Failed to write matrix row {}", row.genome_id))?;
        }

        csv_writer.flush().context("Failed to flush matrix")?;
        Ok(())
    }
}

/// Streams genomes into matrix rows against a fixed dictionary and metadata table
pub struct MatrixAssembler<'a> {
    dictionary: &'a KmerDictionary,
    metadata: &'a MetadataTable,
    rows: Vec<FeatureRow>,
    stats: AssemblyStats,
}

impl<'a> MatrixAssembler<'a> {
    /// `expected_genomes` reserves one row slot per genome input
    pub fn new(
        dictionary: &'a KmerDictionary,
        metadata: &'a MetadataTable,
        expected_genomes: usize,
    ) -> Self {
        Self {
            dictionary,
            metadata,
            rows: Vec::with_capacity(expected_genomes),
            stats: AssemblyStats::default(),
        }
    }

    /// Add one genome. Only genomes without metadata produce no row.
    pub fn push(&mut self, genome: GenomeCounts) -> RowOutcome {
        self.stats.genomes_in += 1;

        let Some(record) = self.metadata.resolve(&genome.genome_id) else {
            warn!("No metadata for genome {}; excluded", genome.genome_id);
            self.stats.missing_metadata.push(genome.genome_id);
            return RowOutcome::MissingMetadata;
        };
        if record.ct_value.is_none() {
            warn!("No Ct value for genome {}; ct_value left empty", genome.genome_id);
            self.stats.missing_target.push(genome.genome_id.clone());
        }
        if record.instrument.is_none() {
            warn!(
                "Unrecognised instrument {:?} for genome {}; instrument columns left at 0",
                record.instrument_label, genome.genome_id
            );
            self.stats.unknown_instrument.push(genome.genome_id.clone());
        }

        let mut frequencies = vec![0u32; self.dictionary.len()];
        let dropped_kmers = self
            .dictionary
            .fill_frequencies(&genome.counts, &mut frequencies);
        if dropped_kmers > 0 {
            debug!(
                "Genome {}: {} k-mer(s) not in dictionary",
                genome.genome_id, dropped_kmers
            );
        }
        self.stats.unknown_kmers_dropped += dropped_kmers;

        self.rows.push(FeatureRow {
            genome_id: genome.genome_id,
            frequencies,
            instrument: record.instrument,
            ct_value: record.ct_value,
        });
        self.stats.rows += 1;

        RowOutcome::Added { dropped_kmers }
    }

    pub fn finish(mut self) -> FeatureMatrix {
        self.rows.shrink_to_fit();
        FeatureMatrix {
            placement: self.dictionary.placement(),
            kmer_count: self.dictionary.len(),
            rows: self.rows,
            stats: self.stats,
        }
    }
}

/// Assemble a matrix from in-memory genome counts, in iteration order
pub fn assemble<I>(
    genomes: I,
    dictionary: &KmerDictionary,
    metadata: &MetadataTable,
) -> FeatureMatrix
where
    I: IntoIterator<Item = GenomeCounts>,
{
    let genomes = genomes.into_iter();
    let mut assembler = MatrixAssembler::new(dictionary, metadata, genomes.size_hint().0);
    for genome in genomes {
        assembler.push(genome);
    }
    assembler.finish()
}

/// Assemble a matrix from KMC dump files. Any unreadable file aborts the pass.
pub fn assemble_files(
    paths: &[PathBuf],
    dictionary: &KmerDictionary,
    metadata: &MetadataTable,
    quiet: bool,
) -> Result<FeatureMatrix> {
    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb =
            ProgressBar::with_draw_target(Some(paths.len() as u64), ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {pos}/{len} genomes ({elapsed})")?
                .progress_chars("=> "),
        );
        pb.set_message("Assembling matrix");
        pb
    };

    let mut assembler = MatrixAssembler::new(dictionary, metadata, paths.len());
    for path in paths {
        let genome = GenomeCounts::load(path)?;
        progress.set_message(genome.genome_id.clone());
        assembler.push(genome);
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(assembler.finish())
}
