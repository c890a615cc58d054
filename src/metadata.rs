//! Genome metadata: the testing instrument and Ct value of each genome,
//! indexed by genome identifier.

use crate::counts::open_text;
use crate::error::KmerFrameError;
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Testing instrument, one-hot encoded in the order of [`Instrument::ALL`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    Alinity,
    Panther,
    Cepheid,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [
        Instrument::Alinity,
        Instrument::Panther,
        Instrument::Cepheid,
    ];

    /// Parse a metadata label such as `PANTHER` (case and surrounding whitespace ignored)
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|instrument| instrument.column_name().eq_ignore_ascii_case(label))
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            Instrument::Alinity => "alinity",
            Instrument::Panther => "panther",
            Instrument::Cepheid => "cepheid",
        }
    }

    /// Offset within the three instrument columns
    pub fn offset(&self) -> usize {
        match self {
            Instrument::Alinity => 0,
            Instrument::Panther => 1,
            Instrument::Cepheid => 2,
        }
    }
}

/// At most one slot set; all zero for an unknown instrument
pub fn one_hot(instrument: Option<Instrument>) -> [u8; 3] {
    let mut slots = [0; 3];
    if let Some(instrument) = instrument {
        slots[instrument.offset()] = 1;
    }
    slots
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    /// Label as written in the table
    pub instrument_label: String,
    pub instrument: Option<Instrument>,
    pub ct_value: Option<f64>,
}

impl MetadataRecord {
    pub fn new<S: Into<String>>(instrument_label: S, ct_value: Option<f64>) -> Self {
        let instrument_label = instrument_label.into();
        Self {
            instrument: Instrument::parse(&instrument_label),
            instrument_label,
            ct_value,
        }
    }
}

/// Header names accepted for each metadata column, matched case-insensitively
#[derive(Debug, Clone)]
pub struct MetadataColumns {
    pub genome_id: Vec<String>,
    pub instrument: Vec<String>,
    pub ct_value: Vec<String>,
}

impl Default for MetadataColumns {
    fn default() -> Self {
        Self {
            genome_id: vec!["genome_id".to_string(), "Genome ID".to_string()],
            instrument: vec!["INSTRUMENT".to_string()],
            ct_value: vec!["ct_value".to_string(), "Ct value".to_string()],
        }
    }
}

impl MetadataColumns {
    pub fn with_genome_id<S: Into<String>>(mut self, name: S) -> Self {
        self.genome_id = vec![name.into()];
        self
    }

    pub fn with_instrument<S: Into<String>>(mut self, name: S) -> Self {
        self.instrument = vec![name.into()];
        self
    }

    pub fn with_ct_value<S: Into<String>>(mut self, name: S) -> Self {
        self.ct_value = vec![name.into()];
        self
    }
}

fn find_column(headers: &csv::StringRecord, candidates: &[String]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(candidate))
    })
}

fn parse_ct_value(cell: &str) -> Option<f64> {
    let value: f64 = cell.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Metadata indexed by genome id. The first row for an id wins.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    records: FxHashMap<String, MetadataRecord>,
    duplicates: usize,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the id is already present; returns whether it was inserted
    pub fn insert<S: Into<String>>(&mut self, genome_id: S, record: MetadataRecord) -> bool {
        let genome_id = genome_id.into();
        if self.records.contains_key(&genome_id) {
            self.duplicates += 1;
            return false;
        }
        self.records.insert(genome_id, record);
        true
    }

    /// Parse a CSV table with a header row. The Ct column is optional.
    ///
    /// Header names are trimmed; genome ids are kept verbatim for exact matching.
    pub fn from_reader<R: Read>(reader: R, columns: &MetadataColumns) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .context("Failed to read metadata header")?
            .clone();

        let id_column = find_column(&headers, &columns.genome_id).ok_or_else(|| {
            KmerFrameError::MissingColumn {
                role: "genome id",
                candidates: columns.genome_id.join(", "),
            }
        })?;
        let instrument_column = find_column(&headers, &columns.instrument).ok_or_else(|| {
            KmerFrameError::MissingColumn {
                role: "instrument",
                candidates: columns.instrument.join(", "),
            }
        })?;
        let ct_column = find_column(&headers, &columns.ct_value);
        if ct_column.is_none() {
            debug!("Metadata table has no Ct value column");
        }

        let mut table = Self::new();
        for (i, record) in csv_reader.records().enumerate() {
            let record =
                record.with_context(|| format!("Failed to read metadata row {}", i + 1))?;
            let Some(genome_id) = record.get(id_column).filter(|id| !id.trim().is_empty()) else {
                continue;
            };
            let instrument_label = record.get(instrument_column).unwrap_or_default();
            let ct_value = ct_column
                .and_then(|c| record.get(c))
                .and_then(parse_ct_value);

            table.insert(genome_id, MetadataRecord::new(instrument_label, ct_value));
        }

        if table.duplicates > 0 {
            warn!(
                "Metadata table contains {} duplicate genome id row(s); using the first occurrence of each",
                table.duplicates
            );
        }

        Ok(table)
    }

    pub fn load<P: AsRef<Path>>(path: P, columns: &MetadataColumns) -> Result<Self> {
        let path = path.as_ref();
        Self::from_reader(open_text(path)?, columns)
            .with_context(|| format!("Failed to load metadata from {}", path.display()))
    }

    /// Exact-match lookup. Absence is an expected outcome, not an error.
    pub fn resolve(&self, genome_id: &str) -> Option<&MetadataRecord> {
        self.records.get(genome_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows skipped because their id was already present
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_instrument_parse() {
        assert_eq!(Instrument::parse("ALINITY"), Some(Instrument::Alinity));
        assert_eq!(Instrument::parse(" panther "), Some(Instrument::Panther));
        assert_eq!(Instrument::parse("Cepheid"), Some(Instrument::Cepheid));
        assert_eq!(Instrument::parse("HOLOGIC"), None);
        assert_eq!(Instrument::parse(""), None);
    }

    #[test]
    fn test_one_hot() {
        assert_eq!(one_hot(Some(Instrument::Alinity)), [1, 0, 0]);
        assert_eq!(one_hot(Some(Instrument::Panther)), [0, 1, 0]);
        assert_eq!(one_hot(Some(Instrument::Cepheid)), [0, 0, 1]);
        assert_eq!(one_hot(None), [0, 0, 0]);
    }

    #[test]
    fn test_resolve_training_columns() {
        let csv = "genome_id,INSTRUMENT,ct_value\nMCoV-1,PANTHER,18.5\nMCoV-2,CEPHEID,\n";
        let table = MetadataTable::from_reader(Cursor::new(csv), &MetadataColumns::default())
            .unwrap();

        let first = table.resolve("MCoV-1").unwrap();
        assert_eq!(first.instrument, Some(Instrument::Panther));
        assert_eq!(first.ct_value, Some(18.5));

        let second = table.resolve("MCoV-2").unwrap();
        assert_eq!(second.instrument, Some(Instrument::Cepheid));
        assert_eq!(second.ct_value, None);

        assert!(table.resolve("MCoV-3").is_none());
        assert!(table.resolve("mcov-1").is_none());
    }

    #[test]
    fn test_resolve_inference_columns_without_ct() {
        let csv = "Genome ID,Instrument\nMCoV-7,ALINITY\n";
        let table = MetadataTable::from_reader(Cursor::new(csv), &MetadataColumns::default())
            .unwrap();
        let record = table.resolve("MCoV-7").unwrap();
        assert_eq!(record.instrument, Some(Instrument::Alinity));
        assert_eq!(record.ct_value, None);
    }

    #[test]
    fn test_first_match_wins() {
        let csv = "genome_id,INSTRUMENT,ct_value\nA,PANTHER,20\nA,CEPHEID,30\nB,ALINITY,25\n";
        let table = MetadataTable::from_reader(Cursor::new(csv), &MetadataColumns::default())
            .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.duplicates(), 1);
        assert_eq!(table.resolve("A").unwrap().ct_value, Some(20.0));
    }

    #[test]
    fn test_genome_ids_match_exactly() {
        let csv = " genome_id , INSTRUMENT ,ct_value\n\
                    \x20MCoV-1 , cepheid , 22.5 \n\
                    MCoV-2,PANTHER,30\n";
        let table = MetadataTable::from_reader(Cursor::new(csv), &MetadataColumns::default())
            .unwrap();
        assert_eq!(table.resolve("MCoV-1"), None);

        let padded = table.resolve(" MCoV-1 ").unwrap();
        assert_eq!(padded.ct_value, Some(22.5));
        assert_eq!(
            Instrument::parse(&padded.instrument_label),
            Some(Instrument::Cepheid)
        );
        assert!(table.resolve("MCoV-2").is_some());
    }

    #[test]
    fn test_missing_instrument_column() {
        let csv = "genome_id,ct_value\nA,20\n";
        let err = MetadataTable::from_reader(Cursor::new(csv), &MetadataColumns::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KmerFrameError>(),
            Some(KmerFrameError::MissingColumn { role: "instrument", .. })
        ));
    }

    #[test]
    fn test_custom_columns() {
        let csv = "sample,device,ct\nS1,panther,31.2\n";
        let columns = MetadataColumns::default()
            .with_genome_id("sample")
            .with_instrument("device")
            .with_ct_value("ct");
        let table = MetadataTable::from_reader(Cursor::new(csv), &columns).unwrap();
        assert_eq!(
            table.resolve("S1"),
            Some(&MetadataRecord::new("panther", Some(31.2)))
        );
    }
}
