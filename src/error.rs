use thiserror::Error;

/// Errors a caller may want to match on. I/O and parse failures are
/// reported through `anyhow` with context instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KmerFrameError {
    /// The dictionary does not match the one the model was trained with
    #[error("Dictionary fingerprint mismatch: expected {expected}, found {actual}")]
    SchemaMismatch {
        /// Fingerprint the caller required
        expected: String,
        /// Fingerprint of the loaded dictionary
        actual: String,
    },

    /// The stored fingerprint disagrees with the stored k-mers
    #[error("Corrupt dictionary: header fingerprint {stored} but k-mers hash to {computed}")]
    CorruptDictionary { stored: String, computed: String },

    #[error("Unsupported dictionary format version: {0}")]
    UnsupportedVersion(u8),

    #[error("K-mer length {0} exceeds the maximum of {max}", max = u16::MAX)]
    KmerTooLong(usize),

    /// A required column is absent from the metadata table header
    #[error("Metadata table has no {role} column (looked for: {candidates})")]
    MissingColumn {
        role: &'static str,
        candidates: String,
    },
}
