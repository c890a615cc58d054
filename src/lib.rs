//! # kmerframe
//!
//! Turns KMC k-mer counts into a fixed-schema feature matrix for Ct value
//! regression, and projects single genomes onto the same schema at
//! inference time using the persisted k-mer dictionary.
//!
//! This crate provides both a library and a binary.
//!
#![doc = include_str!("../README.md")]

pub mod counts;
pub mod dictionary;
mod dictionary_build;
pub mod dictionary_format;
mod dictionary_info;
pub mod error;
pub mod matrix;
mod matrix_build;
pub mod metadata;
pub mod output;
pub mod row;
mod row_build;

// Re-export the important structures and functions for library users
pub use counts::{derive_genome_id, find_count_files, GenomeCounts};
pub use dictionary::{build as build_dictionary, info as dictionary_info, KmerDictionary};
pub use dictionary_format::{DictionaryHeader, InstrumentPlacement};
pub use error::KmerFrameError;
pub use matrix::{assemble, AssemblyStats, FeatureMatrix, FeatureRow, KmerHeaders, MatrixAssembler};
pub use matrix_build::{run as run_matrix, MatrixSummary};
pub use metadata::{Instrument, MetadataColumns, MetadataRecord, MetadataTable};
pub use row::{assemble_row, FeatureVector};
pub use row_build::{run as run_row, OutputFormat};

use anyhow::Result;
use output::DEFAULT_COMPRESSION_LEVEL;
use std::path::{Path, PathBuf};

pub const DEFAULT_MATRIX_NAME: &str = "kmr_df.csv";
pub const DEFAULT_DICTIONARY_NAME: &str = "kmr_dictionary.bin";

/// Where the matrix pipeline takes its dictionary from
#[derive(Debug, Clone, PartialEq)]
pub enum DictionarySource {
    /// Build from a corpus-wide KMC dump and persist it next to the matrix
    KmcDump(PathBuf),
    /// Reuse a dictionary persisted by an earlier run
    Persisted(PathBuf),
}

impl DictionarySource {
    pub fn path(&self) -> &Path {
        match self {
            DictionarySource::KmcDump(path) | DictionarySource::Persisted(path) => path,
        }
    }
}

/// Configuration for building a standalone dictionary
pub struct DictionaryConfig {
    /// Corpus-wide KMC dump listing every k-mer
    pub all_kmers_path: PathBuf,

    /// Path to output file (None or - for stdout)
    pub output_path: Option<PathBuf>,

    pub placement: InstrumentPlacement,
}

impl DictionaryConfig {
    pub fn new<P: AsRef<Path>>(all_kmers_path: P) -> Self {
        Self {
            all_kmers_path: all_kmers_path.as_ref().to_path_buf(),
            output_path: None,
            placement: InstrumentPlacement::default(),
        }
    }

    /// Set output path
    pub fn with_output<P: AsRef<Path>>(mut self, output_path: P) -> Self {
        self.output_path = Some(output_path.as_ref().to_path_buf());
        self
    }

    /// Set instrument placement
    pub fn with_placement(mut self, placement: InstrumentPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Execute dictionary build with this configuration
    pub fn execute(&self) -> Result<KmerDictionary> {
        build_dictionary(
            &self.all_kmers_path,
            self.placement,
            self.output_path.as_ref(),
        )
    }
}

/// Configuration for the training matrix pipeline
pub struct MatrixConfig {
    pub dictionary_source: DictionarySource,

    /// Directory holding one KMC dump per genome
    pub counts_dir: PathBuf,

    /// Metadata CSV with genome id, instrument and Ct value
    pub metadata_path: PathBuf,

    pub metadata_columns: MetadataColumns,

    /// Directory receiving the matrix and dictionary (created if missing)
    pub output_dir: PathBuf,

    /// Matrix file name (detects .gz, .zst and .xz)
    pub matrix_name: String,

    pub dictionary_name: String,

    /// Only count files whose name starts with this prefix
    pub prefix: Option<String>,

    /// Ignored when reusing a persisted dictionary
    pub placement: InstrumentPlacement,

    pub kmer_headers: KmerHeaders,

    pub compression_level: u8,

    /// Path to JSON summary file
    pub summary_path: Option<PathBuf>,

    /// Suppress progress reporting
    pub quiet: bool,
}

impl MatrixConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        dictionary_source: DictionarySource,
        counts_dir: P,
        metadata_path: Q,
    ) -> Self {
        Self {
            dictionary_source,
            counts_dir: counts_dir.as_ref().to_path_buf(),
            metadata_path: metadata_path.as_ref().to_path_buf(),
            metadata_columns: MetadataColumns::default(),
            output_dir: PathBuf::from("output"),
            matrix_name: DEFAULT_MATRIX_NAME.to_string(),
            dictionary_name: DEFAULT_DICTIONARY_NAME.to_string(),
            prefix: None,
            placement: InstrumentPlacement::default(),
            kmer_headers: KmerHeaders::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            summary_path: None,
            quiet: false,
        }
    }

    pub fn with_metadata_columns(mut self, metadata_columns: MetadataColumns) -> Self {
        self.metadata_columns = metadata_columns;
        self
    }

    /// Set the output directory
    pub fn with_output_dir<P: AsRef<Path>>(mut self, output_dir: P) -> Self {
        self.output_dir = output_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_matrix_name<S: Into<String>>(mut self, matrix_name: S) -> Self {
        self.matrix_name = matrix_name.into();
        self
    }

    pub fn with_dictionary_name<S: Into<String>>(mut self, dictionary_name: S) -> Self {
        self.dictionary_name = dictionary_name.into();
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_placement(mut self, placement: InstrumentPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_kmer_headers(mut self, kmer_headers: KmerHeaders) -> Self {
        self.kmer_headers = kmer_headers;
        self
    }

    pub fn with_compression_level(mut self, compression_level: u8) -> Self {
        self.compression_level = compression_level;
        self
    }

    /// Set the summary path
    pub fn with_summary<P: AsRef<Path>>(mut self, summary_path: P) -> Self {
        self.summary_path = Some(summary_path.as_ref().to_path_buf());
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Execute the matrix pipeline with this configuration
    pub fn execute(&self) -> Result<MatrixSummary> {
        run_matrix(self)
    }
}

/// Where the inference path takes the genome's instrument from
#[derive(Debug, Clone)]
pub enum InstrumentSource {
    /// An instrument label given directly, e.g. `PANTHER`
    Label(String),
    /// Looked up by genome id in a metadata table
    Metadata {
        path: PathBuf,
        columns: MetadataColumns,
    },
}

/// Configuration for projecting one genome onto a persisted dictionary
pub struct RowConfig {
    pub dictionary_path: PathBuf,

    /// KMC dump of the genome
    pub counts_path: PathBuf,

    pub instrument_source: InstrumentSource,

    /// Overrides the id derived from the dump file name
    pub genome_id: Option<String>,

    /// Reject the dictionary unless its fingerprint matches
    pub expected_fingerprint: Option<String>,

    /// Path to output file (- for stdout; detects .gz, .zst and .xz)
    pub output_path: PathBuf,

    pub output_format: OutputFormat,

    pub kmer_headers: KmerHeaders,

    pub compression_level: u8,
}

impl RowConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        dictionary_path: P,
        counts_path: Q,
        instrument_source: InstrumentSource,
    ) -> Self {
        Self {
            dictionary_path: dictionary_path.as_ref().to_path_buf(),
            counts_path: counts_path.as_ref().to_path_buf(),
            instrument_source,
            genome_id: None,
            expected_fingerprint: None,
            output_path: PathBuf::from("-"),
            output_format: OutputFormat::default(),
            kmer_headers: KmerHeaders::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn with_genome_id<S: Into<String>>(mut self, genome_id: S) -> Self {
        self.genome_id = Some(genome_id.into());
        self
    }

    pub fn with_expected_fingerprint<S: Into<String>>(mut self, fingerprint: S) -> Self {
        self.expected_fingerprint = Some(fingerprint.into());
        self
    }

    /// Set the output path
    pub fn with_output<P: AsRef<Path>>(mut self, output_path: P) -> Self {
        self.output_path = output_path.as_ref().to_path_buf();
        self
    }

    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    pub fn with_kmer_headers(mut self, kmer_headers: KmerHeaders) -> Self {
        self.kmer_headers = kmer_headers;
        self
    }

    pub fn with_compression_level(mut self, compression_level: u8) -> Self {
        self.compression_level = compression_level;
        self
    }

    /// Execute the row projection with this configuration
    pub fn execute(&self) -> Result<FeatureVector> {
        run_row(self)
    }
}
