use crate::counts::{open_text, read_kmers};
use crate::dictionary_format::{format_fingerprint, DictionaryHeader, InstrumentPlacement};
use crate::error::KmerFrameError;
use anyhow::{Context, Result};
use bincode::serde::{decode_from_std_read, encode_into_std_write};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

const MAX_PREALLOCATED_KMERS: u64 = 1 << 20;

// Re-export dictionary operations
pub use crate::dictionary_build::build;
pub use crate::dictionary_info::info;

/// Mapping from k-mer to feature column, in first-seen order.
///
/// Indices are dense in `0..len()` and never reassigned. The dictionary is
/// read-only once built; consumers borrow it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KmerDictionary {
    kmers: Vec<String>,
    index: FxHashMap<String, u32>,
    placement: InstrumentPlacement,
}

impl KmerDictionary {
    /// Assign each distinct k-mer the next unused column. Repeats keep their first column.
    pub fn build<I, S>(kmers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dictionary = Self::default();
        for kmer in kmers {
            dictionary.insert(kmer.as_ref());
        }
        dictionary
    }

    fn insert(&mut self, kmer: &str) {
        if self.index.contains_key(kmer) {
            return;
        }
        self.index.insert(kmer.to_string(), self.kmers.len() as u32);
        self.kmers.push(kmer.to_string());
    }

    /// Build from a corpus-wide KMC dump (first column of every line)
    pub fn from_kmc_dump<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let kmers = read_kmers(open_text(path)?)
            .with_context(|| format!("Failed to read k-mers from {}", path.display()))?;
        Ok(Self::build(kmers))
    }

    pub fn with_placement(mut self, placement: InstrumentPlacement) -> Self {
        self.placement = placement;
        self
    }

    pub fn placement(&self) -> InstrumentPlacement {
        self.placement
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    /// Column of a k-mer within the k-mer block
    #[inline]
    pub fn get(&self, kmer: &str) -> Option<usize> {
        self.index.get(kmer).map(|&i| i as usize)
    }

    /// Write each known k-mer's frequency at its column and return how many
    /// k-mers were not in the dictionary. A k-mer seen twice keeps its last frequency.
    pub fn fill_frequencies(&self, counts: &[(String, u32)], frequencies: &mut [u32]) -> u64 {
        debug_assert_eq!(frequencies.len(), self.len());
        let mut dropped = 0;
        for (kmer, frequency) in counts {
            match self.get(kmer) {
                Some(column) => frequencies[column] = *frequency,
                None => dropped += 1,
            }
        }
        dropped
    }

    /// K-mers in column order
    pub fn kmers(&self) -> &[String] {
        &self.kmers
    }

    /// Length of the first k-mer (0 when empty)
    pub fn kmer_length(&self) -> usize {
        self.kmers.first().map_or(0, |k| k.len())
    }

    /// xxh3 over the placement and the ordered k-mers. Any change to
    /// column identity changes the fingerprint.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.placement.as_str().as_bytes());
        hasher.update(b"\n");
        for kmer in &self.kmers {
            hasher.update(kmer.as_bytes());
            hasher.update(b"\n");
        }
        hasher.digest()
    }

    pub fn fingerprint_hex(&self) -> String {
        format_fingerprint(self.fingerprint())
    }

    pub fn header(&self) -> Result<DictionaryHeader> {
        DictionaryHeader::new(
            self.kmer_length(),
            self.len(),
            self.placement,
            self.fingerprint(),
        )
    }

    /// Reject a dictionary other than the one a model was trained with
    pub fn check_fingerprint(&self, expected: &str) -> Result<()> {
        let actual = self.fingerprint_hex();
        if !expected.trim().eq_ignore_ascii_case(&actual) {
            return Err(KmerFrameError::SchemaMismatch {
                expected: expected.trim().to_string(),
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Load a persisted dictionary, checking the stored fingerprint
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open dictionary file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let header: DictionaryHeader =
            decode_from_std_read(&mut reader, bincode::config::standard())
                .context("Failed to deserialize dictionary header")?;
        header.validate()?;

        let count: u64 = decode_from_std_read(&mut reader, bincode::config::standard())
            .context("Failed to deserialize k-mer count")?;
        if count != header.kmer_count {
            return Err(anyhow::anyhow!(
                "Dictionary header declares {} k-mers but body declares {}",
                header.kmer_count,
                count
            ));
        }

        // The count is untrusted; a short body fails to decode below
        let capacity = count.min(MAX_PREALLOCATED_KMERS) as usize;
        let mut dictionary = KmerDictionary {
            kmers: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            placement: header.placement,
        };
        for _ in 0..count {
            let kmer: String = decode_from_std_read(&mut reader, bincode::config::standard())
                .context("Failed to deserialize k-mer")?;
            dictionary.insert(&kmer);
        }

        let computed = dictionary.fingerprint();
        if dictionary.len() as u64 != count || computed != header.fingerprint {
            return Err(KmerFrameError::CorruptDictionary {
                stored: header.fingerprint_hex(),
                computed: format_fingerprint(computed),
            }
            .into());
        }

        Ok(dictionary)
    }

    /// Write the dictionary to a file or stdout
    pub fn write(&self, output_path: Option<&PathBuf>) -> Result<()> {
        match output_path {
            Some(path) if path.to_string_lossy() != "-" => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                self.write_to(file)
            }
            _ => self.write_to(io::stdout().lock()),
        }
    }

    /// Serialize header, count and k-mers to any writer
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);

        encode_into_std_write(self.header()?, &mut writer, bincode::config::standard())
            .context("Failed to serialize dictionary header")?;

        // Count first so the loader can pre-allocate
        let count = self.kmers.len() as u64;
        encode_into_std_write(count, &mut writer, bincode::config::standard())
            .context("Failed to serialize k-mer count")?;

        for kmer in &self.kmers {
            encode_into_std_write(kmer, &mut writer, bincode::config::standard())
                .context("Failed to serialize k-mer")?;
        }

        writer.flush().context("Failed to flush dictionary")?;
        Ok(())
    }
}
