use crate::error::KmerFrameError;
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u8 = 1;

/// Where the three instrument one-hot columns sit relative to the k-mer block.
///
/// The same placement is applied to the training matrix and to every
/// inference vector built from a dictionary, so it is stored in the header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstrumentPlacement {
    /// `k-mers..., alinity, panther, cepheid` (training matrix order)
    #[default]
    Trailing,
    /// `alinity, panther, cepheid, k-mers...` (legacy inference vector order)
    Leading,
}

impl InstrumentPlacement {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentPlacement::Trailing => "trailing",
            InstrumentPlacement::Leading => "leading",
        }
    }
}

/// Serializable header for the dictionary file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DictionaryHeader {
    pub format_version: u8,
    pub kmer_length: u16,
    pub kmer_count: u64,
    pub placement: InstrumentPlacement,
    pub fingerprint: u64,
}

impl DictionaryHeader {
    pub fn new(
        kmer_length: usize,
        kmer_count: usize,
        placement: InstrumentPlacement,
        fingerprint: u64,
    ) -> anyhow::Result<Self> {
        let kmer_length =
            u16::try_from(kmer_length).map_err(|_| KmerFrameError::KmerTooLong(kmer_length))?;
        Ok(DictionaryHeader {
            format_version: FORMAT_VERSION,
            kmer_length,
            kmer_count: kmer_count as u64,
            placement,
            fingerprint,
        })
    }

    /// Validate header
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(KmerFrameError::UnsupportedVersion(self.format_version).into());
        }

        Ok(())
    }

    /// Get k
    pub fn kmer_length(&self) -> usize {
        self.kmer_length as usize
    }

    pub fn fingerprint_hex(&self) -> String {
        format_fingerprint(self.fingerprint)
    }
}

pub fn format_fingerprint(fingerprint: u64) -> String {
    format!("{:016x}", fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = DictionaryHeader::new(10, 3, InstrumentPlacement::Trailing, 0xabc).unwrap();

        assert_eq!(header.format_version, 1);
        assert_eq!(header.kmer_length(), 10);
        assert_eq!(header.kmer_count, 3);
        assert_eq!(header.fingerprint_hex(), "0000000000000abc");
    }

    #[test]
    fn test_header_validation() {
        let valid_header = DictionaryHeader::new(10, 0, InstrumentPlacement::Leading, 0).unwrap();
        assert!(valid_header.validate().is_ok());

        let invalid_header = DictionaryHeader {
            format_version: 2,
            ..valid_header
        };
        let err = invalid_header.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<KmerFrameError>(),
            Some(&KmerFrameError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_long_kmers_keep_their_length() {
        let header = DictionaryHeader::new(256, 1, InstrumentPlacement::Trailing, 0).unwrap();
        assert_eq!(header.kmer_length(), 256);

        let err = DictionaryHeader::new(70_000, 1, InstrumentPlacement::Trailing, 0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<KmerFrameError>(),
            Some(&KmerFrameError::KmerTooLong(70_000))
        );
    }

    #[test]
    fn test_default_placement_is_trailing() {
        assert_eq!(InstrumentPlacement::default(), InstrumentPlacement::Trailing);
        assert_eq!(InstrumentPlacement::Leading.as_str(), "leading");
    }
}
