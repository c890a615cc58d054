//! Reading k-mer count dumps produced by KMC (`kmc_tools transform ... dump`).
//!
//! Each line holds a k-mer and its frequency separated by whitespace. Blank
//! lines are ignored. Files may be gzip, zstd or xz compressed.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

const INPUT_BUFFER_SIZE: usize = 1024 * 1024;
const COMPRESSED_EXTENSIONS: &[&str] = &[".gz", ".zst", ".xz"];
const DUMP_EXTENSION: &str = ".kmrs";

/// K-mer counts of one genome, read once and consumed by one row
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeCounts {
    pub genome_id: String,
    pub counts: Vec<(String, u32)>,
}

impl GenomeCounts {
    pub fn new<S: Into<String>>(genome_id: S, counts: Vec<(String, u32)>) -> Self {
        Self {
            genome_id: genome_id.into(),
            counts,
        }
    }

    /// Read the dump at `path`, deriving the genome id from the file name
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Ok(Self::new(derive_genome_id(path), load_counts(path)?))
    }
}

/// Open a text input, decompressing by extension
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let name = path.to_string_lossy().to_lowercase();

    let compressed = COMPRESSED_EXTENSIONS.iter().any(|ext| name.ends_with(ext));
    let reader: Box<dyn Read + Send> = if compressed {
        let (reader, _format) = niffler::send::from_path(path)
            .with_context(|| format!("Failed to open compressed file {}", path.display()))?;
        reader
    } else {
        Box::new(File::open(path).with_context(|| format!("Failed to open {}", path.display()))?)
    };

    Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, reader)))
}

/// Split one dump line into k-mer and frequency. `None` for blank lines.
fn parse_count_line(line: &str, line_number: usize) -> Result<Option<(&str, u32)>> {
    let mut fields = line.split_whitespace();
    let Some(kmer) = fields.next() else {
        return Ok(None);
    };
    let frequency = fields
        .next()
        .with_context(|| format!("Line {}: missing frequency for k-mer {}", line_number, kmer))?;
    let frequency: u32 = frequency.parse().with_context(|| {
        format!(
            "Line {}: invalid frequency {:?} for k-mer {}",
            line_number, frequency, kmer
        )
    })?;

    Ok(Some((kmer, frequency)))
}

/// Read every (k-mer, frequency) pair in file order
pub fn read_counts<R: BufRead>(reader: R) -> Result<Vec<(String, u32)>> {
    let mut counts = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read k-mer counts")?;
        if let Some((kmer, frequency)) = parse_count_line(&line, i + 1)? {
            counts.push((kmer.to_string(), frequency));
        }
    }
    Ok(counts)
}

pub fn load_counts<P: AsRef<Path>>(path: P) -> Result<Vec<(String, u32)>> {
    let path = path.as_ref();
    read_counts(open_text(path)?).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Read only the k-mer column, in file order. Frequencies are not validated.
pub fn read_kmers<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut kmers = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read k-mer list")?;
        if let Some(kmer) = line.split_whitespace().next() {
            kmers.push(kmer.to_string());
        }
    }
    Ok(kmers)
}

/// Derive a genome id from a dump file name, e.g. `MCoV-123_kmc.10.kmrs.gz` -> `MCoV-123`
pub fn derive_genome_id(path: &Path) -> String {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");

    let mut name = filename;
    for ext in COMPRESSED_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped;
            break;
        }
    }
    if let Some(stripped) = name.strip_suffix(DUMP_EXTENSION) {
        name = stripped;
    }

    // k-mer size suffix, e.g. ".10"
    if let Some((stem, k)) = name.rsplit_once('.') {
        if !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()) {
            name = stem;
        }
    }
    if let Some(stripped) = name.strip_suffix("_kmc") {
        name = stripped;
    }

    if name.is_empty() {
        filename.to_string()
    } else {
        name.to_string()
    }
}

/// Find all k-mer dump files in a directory (non-recursive, following symlinks)
pub fn find_count_files(dir_path: &Path, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut count_files = Vec::new();

    let entries = std::fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read directory: {}", dir_path.display()))?;

    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read directory entry in {}", dir_path.display()))?;
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(prefix) = prefix {
            if !name.starts_with(prefix) {
                continue;
            }
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to access: {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }

        let lower = name.to_lowercase();
        let is_dump = lower.ends_with(DUMP_EXTENSION)
            || COMPRESSED_EXTENSIONS
                .iter()
                .any(|ext| lower.ends_with(&format!("{}{}", DUMP_EXTENSION, ext)));
        if is_dump {
            count_files.push(path);
        }
    }

    if count_files.is_empty() {
        return Err(anyhow::anyhow!(
            "Directory contains no k-mer count files: {}. Expected files ending in {}",
            dir_path.display(),
            DUMP_EXTENSION
        ));
    }

    // Sort for deterministic ordering
    count_files.sort();

    Ok(count_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_counts() {
        let input = "AAAA\t5\nCCCC 12\n\nGGGG   1\n";
        let counts = read_counts(Cursor::new(input)).unwrap();
        assert_eq!(
            counts,
            vec![
                ("AAAA".to_string(), 5),
                ("CCCC".to_string(), 12),
                ("GGGG".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_read_counts_rejects_bad_frequency() {
        assert!(read_counts(Cursor::new("AAAA five\n")).is_err());
        assert!(read_counts(Cursor::new("AAAA\n")).is_err());
    }

    #[test]
    fn test_read_kmers_ignores_frequency() {
        let kmers = read_kmers(Cursor::new("AAAA 3\nCCCC\n\nGGGG x\n")).unwrap();
        assert_eq!(kmers, vec!["AAAA", "CCCC", "GGGG"]);
    }

    #[test]
    fn test_derive_genome_id() {
        let cases = [
            ("MCoV-123_kmc.10.kmrs", "MCoV-123"),
            ("/data/kmc_output/MCoV-9_kmc.10.kmrs.gz", "MCoV-9"),
            ("sample.kmrs", "sample"),
            ("sample_kmc.kmrs.zst", "sample"),
            ("genome.v2.kmrs", "genome.v2"),
            (".kmrs", ".kmrs"),
        ];
        for (input, expected) in cases {
            assert_eq!(derive_genome_id(Path::new(input)), expected, "{}", input);
        }
    }

    #[test]
    fn test_find_count_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "MCoV-2_kmc.10.kmrs",
            "MCoV-1_kmc.10.kmrs.gz",
            "other_kmc.10.kmrs",
            "MCoV-3.fasta",
            ".hidden.kmrs",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let all = find_count_files(dir.path(), None).unwrap();
        assert_eq!(all.len(), 3);

        let filtered = find_count_files(dir.path(), Some("MCoV-")).unwrap();
        let names: Vec<_> = filtered
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["MCoV-1_kmc.10.kmrs.gz", "MCoV-2_kmc.10.kmrs"]);
    }

    #[test]
    fn test_find_count_files_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_count_files(dir.path(), None).is_err());
    }
}
