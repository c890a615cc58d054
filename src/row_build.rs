use crate::counts::{derive_genome_id, load_counts};
use crate::dictionary::KmerDictionary;
use crate::metadata::{Instrument, MetadataTable};
use crate::output::get_writer;
use crate::row::{assemble_row, FeatureVector};
use crate::{InstrumentSource, RowConfig};
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Instant;
use tracing::{info, warn};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

fn resolve_instrument(source: &InstrumentSource, genome_id: &str) -> Result<Option<Instrument>> {
    let label = match source {
        InstrumentSource::Label(label) => label.clone(),
        InstrumentSource::Metadata { path, columns } => {
            let metadata = MetadataTable::load(path, columns)?;
            match metadata.resolve(genome_id) {
                Some(record) => record.instrument_label.clone(),
                None => {
                    warn!(
                        "No metadata for genome {}; instrument columns left at 0",
                        genome_id
                    );
                    return Ok(None);
                }
            }
        }
    };

    let instrument = Instrument::parse(&label);
    if instrument.is_none() {
        warn!(
            "Unrecognised instrument {:?} for genome {}; instrument columns left at 0",
            label, genome_id
        );
    }
    Ok(instrument)
}

/// Project one genome's k-mer counts onto a persisted dictionary and write the vector
pub fn run(config: &RowConfig) -> Result<FeatureVector> {
    let start_time = Instant::now();

    let dictionary = KmerDictionary::load(&config.dictionary_path)?;
    if let Some(expected) = &config.expected_fingerprint {
        dictionary.check_fingerprint(expected)?;
    }
    info!(
        "Dictionary: {} k-mers (k={}), {} instrument placement, fingerprint {}",
        dictionary.len(),
        dictionary.kmer_length(),
        dictionary.placement().as_str(),
        dictionary.fingerprint_hex()
    );

    let genome_id = config
        .genome_id
        .clone()
        .unwrap_or_else(|| derive_genome_id(&config.counts_path));
    let counts = load_counts(&config.counts_path)?;
    let instrument = resolve_instrument(&config.instrument_source, &genome_id)?;

    let vector = assemble_row(&counts, &dictionary, instrument).with_genome_id(&genome_id);
    if vector.dropped_kmers > 0 {
        warn!(
            "Genome {}: {} of {} k-mer(s) not in the dictionary were dropped",
            genome_id,
            vector.dropped_kmers,
            counts.len()
        );
    }

    let mut writer = get_writer(&config.output_path, config.compression_level)?;
    match config.output_format {
        OutputFormat::Csv => vector.write_csv(&dictionary, config.kmer_headers, &mut writer)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &vector)
                .context("Failed to write vector")?;
            writeln!(writer)?;
        }
    }
    writer.finish().context("Failed to finish vector output")?;

    info!(
        "Built {}-column vector for genome {} in {:.2?}",
        vector.len(),
        genome_id,
        start_time.elapsed()
    );

    Ok(vector)
}
