use crate::dictionary::KmerDictionary;
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Show info about a persisted dictionary
pub fn info<P: AsRef<Path>, W: Write>(dictionary_path: P, writer: &mut W) -> Result<()> {
    let dictionary = KmerDictionary::load(&dictionary_path)?;
    let header = dictionary.header()?;

    writeln!(writer, "Dictionary information:")?;
    writeln!(writer, "  Format version: {}", header.format_version)?;
    writeln!(writer, "  K-mer length (k): {}", header.kmer_length())?;
    writeln!(writer, "  K-mer count: {}", header.kmer_count)?;
    writeln!(writer, "  Instrument placement: {}", header.placement.as_str())?;
    writeln!(writer, "  Feature columns: {}", dictionary.len() + 3)?;
    writeln!(writer, "  Fingerprint: {}", header.fingerprint_hex())?;

    Ok(())
}
