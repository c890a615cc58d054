use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use kmerframe::{
    DictionaryConfig, DictionarySource, InstrumentPlacement, InstrumentSource, KmerHeaders,
    MatrixConfig, MetadataColumns, OutputFormat, RowConfig, DEFAULT_DICTIONARY_NAME,
    DEFAULT_MATRIX_NAME,
};
use std::path::PathBuf;

fn parse_placement(placement: &str) -> InstrumentPlacement {
    match placement {
        "trailing" => InstrumentPlacement::Trailing,
        "leading" => InstrumentPlacement::Leading,
        _ => unreachable!("clap should have validated the placement"),
    }
}

fn parse_kmer_headers(headers: &str) -> KmerHeaders {
    match headers {
        "index" => KmerHeaders::Index,
        "sequence" => KmerHeaders::Sequence,
        _ => unreachable!("clap should have validated the k-mer headers"),
    }
}

/// Metadata column name overrides shared by the matrix and row commands
#[derive(Args)]
struct ColumnArgs {
    /// Metadata column holding the genome id (default: genome_id or "Genome ID")
    #[arg(long = "id-column")]
    id_column: Option<String>,

    /// Metadata column holding the instrument (default: INSTRUMENT)
    #[arg(long = "instrument-column")]
    instrument_column: Option<String>,

    /// Metadata column holding the Ct value (default: ct_value or "Ct value")
    #[arg(long = "ct-column")]
    ct_column: Option<String>,
}

impl ColumnArgs {
    fn to_columns(&self) -> MetadataColumns {
        let mut columns = MetadataColumns::default();
        if let Some(name) = &self.id_column {
            columns = columns.with_genome_id(name.clone());
        }
        if let Some(name) = &self.instrument_column {
            columns = columns.with_instrument(name.clone());
        }
        if let Some(name) = &self.ct_column {
            columns = columns.with_ct_value(name.clone());
        }
        columns
    }
}

#[derive(Parser)]
#[command(author, version, about = "Schema-consistent k-mer feature matrices for Ct value regression", long_about = None)]
struct Cli {
    /// Only report warnings and errors; no progress bar
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and inspect k-mer dictionaries
    Dictionary {
        #[command(subcommand)]
        command: DictionaryCommands,
    },

    /// Build the training matrix (and its dictionary) from per-genome KMC dumps
    #[command(group(ArgGroup::new("source").required(true).args(["all_kmers", "dictionary"])))]
    Matrix {
        /// Directory containing one KMC dump (*.kmrs) per genome
        counts_dir: PathBuf,

        /// Path to metadata CSV with genome id, instrument and Ct value
        #[arg(short = 'c', long = "csv")]
        metadata: PathBuf,

        /// KMC dump of all genomes concatenated; builds a new dictionary
        #[arg(short = 'a', long = "all-kmers")]
        all_kmers: Option<PathBuf>,

        /// Reuse a persisted dictionary instead of building one
        #[arg(long = "dictionary")]
        dictionary: Option<PathBuf>,

        /// Output directory for the matrix and dictionary
        #[arg(short = 'o', long = "output-dir", default_value = "output")]
        output_dir: PathBuf,

        /// Matrix file name (detects .gz, .zst and .xz)
        #[arg(short = 'd', long = "df-name", default_value = DEFAULT_MATRIX_NAME)]
        matrix_name: String,

        /// Dictionary file name
        #[arg(short = 'i', long = "dictionary-name", default_value = DEFAULT_DICTIONARY_NAME)]
        dictionary_name: String,

        /// Only use count files whose names start with this prefix (e.g. MCoV-)
        #[arg(short = 'p', long = "prefix")]
        prefix: Option<String>,

        /// Position of the instrument columns relative to the k-mer columns
        #[arg(long = "placement", default_value = "trailing", value_parser = ["trailing", "leading"])]
        placement: String,

        /// Name k-mer columns by index or by sequence
        #[arg(long = "kmer-headers", default_value = "index", value_parser = ["index", "sequence"])]
        kmer_headers: String,

        /// Compression level for .gz (1-9), .zst (1-22) or .xz (0-9) output
        #[arg(long = "compression-level", default_value_t = 2)]
        compression_level: u8,

        /// Path to JSON summary file
        #[arg(short = 's', long = "summary")]
        summary: Option<PathBuf>,

        #[command(flatten)]
        columns: ColumnArgs,
    },

    /// Project one genome's KMC dump onto a persisted dictionary
    #[command(group(ArgGroup::new("instrument_source").required(true).args(["metadata", "instrument"])))]
    Row {
        /// Persisted dictionary used to build the training matrix
        dictionary: PathBuf,

        /// KMC dump of the genome
        counts: PathBuf,

        /// Metadata CSV used to look up the genome's instrument
        #[arg(short = 'c', long = "csv")]
        metadata: Option<PathBuf>,

        /// Instrument label (ALINITY, PANTHER or CEPHEID)
        #[arg(long = "instrument")]
        instrument: Option<String>,

        /// Genome id (default: derived from the dump file name)
        #[arg(short = 'n', long = "genome-id")]
        genome_id: Option<String>,

        /// Fail unless the dictionary has this fingerprint (see `dictionary info`)
        #[arg(long = "expect-fingerprint")]
        expect_fingerprint: Option<String>,

        /// Path to output file (- for stdout)
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(short = 'f', long = "format", default_value = "csv", value_parser = ["csv", "json"])]
        format: String,

        /// Name k-mer columns by index or by sequence
        #[arg(long = "kmer-headers", default_value = "index", value_parser = ["index", "sequence"])]
        kmer_headers: String,

        #[command(flatten)]
        columns: ColumnArgs,
    },
}

#[derive(Subcommand)]
enum DictionaryCommands {
    /// Build a dictionary from a corpus-wide KMC dump
    Build {
        /// KMC dump of all genomes concatenated
        all_kmers: PathBuf,

        /// Path to output file (- for stdout)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Position of the instrument columns relative to the k-mer columns
        #[arg(long = "placement", default_value = "trailing", value_parser = ["trailing", "leading"])]
        placement: String,
    },

    /// Show information about a dictionary
    Info {
        /// Path to dictionary file
        dictionary: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Use RUST_LOG if set, otherwise info (warn when quiet). Logs go to stderr.
    let default_filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Dictionary { command } => match command {
            DictionaryCommands::Build {
                all_kmers,
                output,
                placement,
            } => {
                let mut config =
                    DictionaryConfig::new(&all_kmers).with_placement(parse_placement(&placement));
                if let Some(output) = output {
                    config = config.with_output(output);
                }
                config.execute().context("Failed to build dictionary")?;
            }
            DictionaryCommands::Info { dictionary } => {
                let mut stdout = std::io::stdout().lock();
                kmerframe::dictionary_info(&dictionary, &mut stdout)
                    .context("Failed to read dictionary")?;
            }
        },
        Commands::Matrix {
            counts_dir,
            metadata,
            all_kmers,
            dictionary,
            output_dir,
            matrix_name,
            dictionary_name,
            prefix,
            placement,
            kmer_headers,
            compression_level,
            summary,
            columns,
        } => {
            let dictionary_source = match (all_kmers, dictionary) {
                (Some(path), _) => DictionarySource::KmcDump(path),
                (None, Some(path)) => DictionarySource::Persisted(path),
                (None, None) => unreachable!("clap should have required a dictionary source"),
            };

            let mut config = MatrixConfig::new(dictionary_source, &counts_dir, &metadata)
                .with_metadata_columns(columns.to_columns())
                .with_output_dir(&output_dir)
                .with_matrix_name(matrix_name)
                .with_dictionary_name(dictionary_name)
                .with_placement(parse_placement(&placement))
                .with_kmer_headers(parse_kmer_headers(&kmer_headers))
                .with_compression_level(compression_level)
                .with_quiet(cli.quiet);
            if let Some(prefix) = prefix {
                config = config.with_prefix(prefix);
            }
            if let Some(summary) = summary {
                config = config.with_summary(summary);
            }

            config.execute().context("Failed to build feature matrix")?;
        }
        Commands::Row {
            dictionary,
            counts,
            metadata,
            instrument,
            genome_id,
            expect_fingerprint,
            output,
            format,
            kmer_headers,
            columns,
        } => {
            let instrument_source = match (instrument, metadata) {
                (Some(label), _) => InstrumentSource::Label(label),
                (None, Some(path)) => InstrumentSource::Metadata {
                    path,
                    columns: columns.to_columns(),
                },
                (None, None) => unreachable!("clap should have required an instrument source"),
            };

            let output_format = match format.as_str() {
                "csv" => OutputFormat::Csv,
                "json" => OutputFormat::Json,
                _ => unreachable!("clap should have validated the format"),
            };

            let mut config = RowConfig::new(&dictionary, &counts, instrument_source)
                .with_output(&output)
                .with_output_format(output_format)
                .with_kmer_headers(parse_kmer_headers(&kmer_headers));
            if let Some(genome_id) = genome_id {
                config = config.with_genome_id(genome_id);
            }
            if let Some(fingerprint) = expect_fingerprint {
                config = config.with_expected_fingerprint(fingerprint);
            }

            config.execute().context("Failed to build feature vector")?;
        }
    }

    Ok(())
}
