use crate::counts::find_count_files;
use crate::dictionary::KmerDictionary;
use crate::dictionary_build::warn_if_leading;
use crate::dictionary_format::InstrumentPlacement;
use crate::matrix::assemble_files;
use crate::metadata::MetadataTable;
use crate::output::OutputWriter;
use crate::{DictionarySource, MatrixConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{info, warn};

// JSON summary structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixSummary {
    pub version: String,
    pub dictionary_source: String,
    pub counts_dir: String,
    pub metadata: String,
    pub matrix: String,
    pub dictionary: Option<String>,
    pub placement: String,
    pub kmer_length: usize,
    pub kmer_count: usize,
    pub fingerprint: String,
    pub columns: usize,
    pub genomes_in: usize,
    pub rows: usize,
    pub missing_metadata: Vec<String>,
    pub missing_target: Vec<String>,
    pub unknown_instrument: Vec<String>,
    pub unknown_kmers_dropped: u64,
    pub time: f64,
}

// Temporary files are created next to their target so the final rename stays on one filesystem
fn stage_next_to(path: &Path) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))
}

fn load_dictionary(
    source: &DictionarySource,
    placement: InstrumentPlacement,
) -> Result<KmerDictionary> {
    match source {
        DictionarySource::KmcDump(path) => {
            info!("Building k-mer dictionary from {}", path.display());
            Ok(KmerDictionary::from_kmc_dump(path)?.with_placement(placement))
        }
        DictionarySource::Persisted(path) => {
            info!("Loading k-mer dictionary from {}", path.display());
            KmerDictionary::load(path)
        }
    }
}

/// Build the dictionary, assemble the training matrix and write both
pub fn run(config: &MatrixConfig) -> Result<MatrixSummary> {
    let start_time = Instant::now();
    let version = env!("CARGO_PKG_VERSION");

    info!("kmerframe v{}; mode: matrix", version);

    let dictionary = load_dictionary(&config.dictionary_source, config.placement)?;
    warn_if_leading(dictionary.placement());
    info!(
        "Dictionary: {} k-mers (k={}), {} instrument placement, fingerprint {}",
        dictionary.len(),
        dictionary.kmer_length(),
        dictionary.placement().as_str(),
        dictionary.fingerprint_hex()
    );

    let metadata = MetadataTable::load(&config.metadata_path, &config.metadata_columns)?;
    info!("Metadata: {} genome(s)", metadata.len());

    let count_files = find_count_files(&config.counts_dir, config.prefix.as_deref())?;
    info!("Found {} k-mer count file(s)", count_files.len());

    let matrix = assemble_files(&count_files, &dictionary, &metadata, config.quiet)?;
    let stats = matrix.stats();

    if !stats.missing_metadata.is_empty() {
        warn!(
            "Excluded {} genome(s) without metadata",
            stats.missing_metadata.len()
        );
    }
    if !stats.missing_target.is_empty() {
        warn!(
            "{} genome(s) have no Ct value; their ct_value cell is empty",
            stats.missing_target.len()
        );
    }
    if stats.unknown_kmers_dropped > 0 {
        warn!(
            "Dropped {} k-mer observation(s) absent from the dictionary",
            stats.unknown_kmers_dropped
        );
    }

    // Both outputs are staged and only renamed into place once every write succeeded
    let matrix_path = config.output_dir.join(&config.matrix_name);
    if let Some(parent) = matrix_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    let staged_matrix = stage_next_to(&matrix_path)?;
    let mut writer = OutputWriter::from_file(
        staged_matrix.reopen()?,
        &matrix_path,
        config.compression_level,
    )?;
    matrix.write_csv(&dictionary, config.kmer_headers, &mut writer)?;
    writer.finish().context("Failed to finish matrix output")?;

    let staged_dictionary = match config.dictionary_source {
        DictionarySource::KmcDump(_) => {
            let path = config.output_dir.join(&config.dictionary_name);
            let mut staged = stage_next_to(&path)?;
            dictionary.write_to(staged.as_file_mut())?;
            Some((staged, path))
        }
        DictionarySource::Persisted(_) => None,
    };

    let dictionary_path = match staged_dictionary {
        Some((staged, path)) => {
            staged
                .persist(&path)
                .with_context(|| format!("Failed to write dictionary: {}", path.display()))?;
            Some(path)
        }
        None => None,
    };
    staged_matrix
        .persist(&matrix_path)
        .with_context(|| format!("Failed to write matrix: {}", matrix_path.display()))?;

    let total_time = start_time.elapsed();
    info!(
        "Wrote {} row(s) x {} column(s) to {} in {:.2?}",
        matrix.n_rows(),
        matrix.n_columns(),
        matrix_path.display(),
        total_time
    );

    let summary = MatrixSummary {
        version: format!("kmerframe {}", version),
        dictionary_source: config.dictionary_source.path().to_string_lossy().to_string(),
        counts_dir: config.counts_dir.to_string_lossy().to_string(),
        metadata: config.metadata_path.to_string_lossy().to_string(),
        matrix: matrix_path.to_string_lossy().to_string(),
        dictionary: dictionary_path.map(|p| p.to_string_lossy().to_string()),
        placement: dictionary.placement().as_str().to_string(),
        kmer_length: dictionary.kmer_length(),
        kmer_count: dictionary.len(),
        fingerprint: dictionary.fingerprint_hex(),
        columns: matrix.n_columns(),
        genomes_in: stats.genomes_in,
        rows: stats.rows,
        missing_metadata: stats.missing_metadata.clone(),
        missing_target: stats.missing_target.clone(),
        unknown_instrument: stats.unknown_instrument.clone(),
        unknown_kmers_dropped: stats.unknown_kmers_dropped,
        time: total_time.as_secs_f64(),
    };

    if let Some(summary_file) = &config.summary_path {
        let file = File::create(summary_file)
            .with_context(|| format!("Failed to create summary: {}", summary_file.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &summary).context("Failed to write summary")?;
        info!("Summary saved to {}", summary_file.display());
    }

    Ok(summary)
}
