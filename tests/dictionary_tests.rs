use bincode::serde::encode_into_std_write;
use kmerframe::{
    DictionaryConfig, DictionaryHeader, InstrumentPlacement, KmerDictionary, KmerFrameError,
};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn create_test_dump(path: &Path) {
    // Repeated k-mers as they appear in a concatenated dump
    let content = "ACGTACGTAC\t12\nCCCCCGGGGG\t3\nACGTACGTAC\t7\nTTTTTAAAAA\t1\n";
    fs::write(path, content).unwrap();
}

fn write_raw_dictionary(path: &Path, header: &DictionaryHeader, kmers: &[&str]) {
    write_raw_dictionary_with_count(path, header, kmers.len() as u64, kmers);
}

fn write_raw_dictionary_with_count(
    path: &Path,
    header: &DictionaryHeader,
    count: u64,
    kmers: &[&str],
) {
    let mut writer = BufWriter::new(File::create(path).unwrap());
    let config = bincode::config::standard();
    encode_into_std_write(header, &mut writer, config).unwrap();
    encode_into_std_write(count, &mut writer, config).unwrap();
    for kmer in kmers {
        encode_into_std_write(kmer.to_string(), &mut writer, config).unwrap();
    }
}

#[test]
fn test_build_from_dump_and_reload() {
    let temp_dir = tempdir().unwrap();
    let dump_path = temp_dir.path().join("concat_KMC.10.kmrs");
    let dict_path = temp_dir.path().join("kmr_dictionary.bin");
    create_test_dump(&dump_path);

    let built = DictionaryConfig::new(&dump_path)
        .with_output(&dict_path)
        .execute()
        .unwrap();
    assert_eq!(built.kmers(), &["ACGTACGTAC", "CCCCCGGGGG", "TTTTTAAAAA"]);
    assert_eq!(built.kmer_length(), 10);

    let loaded = KmerDictionary::load(&dict_path).unwrap();
    assert_eq!(loaded, built);
    assert_eq!(loaded.fingerprint_hex(), built.fingerprint_hex());
    for (i, kmer) in built.kmers().iter().enumerate() {
        assert_eq!(loaded.get(kmer), Some(i));
    }
}

#[test]
fn test_placement_survives_persistence() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("leading.bin");

    let dictionary =
        KmerDictionary::build(["AAAA", "CCCC"]).with_placement(InstrumentPlacement::Leading);
    dictionary.write(Some(&dict_path)).unwrap();

    let loaded = KmerDictionary::load(&dict_path).unwrap();
    assert_eq!(loaded.placement(), InstrumentPlacement::Leading);
    assert_eq!(loaded.header().unwrap().placement, InstrumentPlacement::Leading);
}

#[test]
fn test_empty_dictionary() {
    let temp_dir = tempdir().unwrap();
    let dump_path = temp_dir.path().join("empty.kmrs");
    let dict_path = temp_dir.path().join("empty.bin");
    fs::write(&dump_path, "\n").unwrap();

    let built = DictionaryConfig::new(&dump_path)
        .with_output(&dict_path)
        .execute()
        .unwrap();
    assert!(built.is_empty());
    assert_eq!(built.kmer_length(), 0);

    let loaded = KmerDictionary::load(&dict_path).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn test_gzipped_dump() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let temp_dir = tempdir().unwrap();
    let dump_path = temp_dir.path().join("concat.kmrs.gz");
    let mut encoder = GzEncoder::new(File::create(&dump_path).unwrap(), Compression::default());
    encoder.write_all(b"GGGG 2\nAAAA 1\n").unwrap();
    encoder.finish().unwrap();

    let dictionary = KmerDictionary::from_kmc_dump(&dump_path).unwrap();
    assert_eq!(dictionary.kmers(), &["GGGG", "AAAA"]);
}

#[test]
fn test_tampered_kmers_rejected() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("tampered.bin");

    // Header fingerprint belongs to a different column order
    let stored = KmerDictionary::build(["AAAA", "CCCC"]);
    write_raw_dictionary(&dict_path, &stored.header().unwrap(), &["CCCC", "AAAA"]);

    let err = KmerDictionary::load(&dict_path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<KmerFrameError>(),
        Some(KmerFrameError::CorruptDictionary { .. })
    ));
}

#[test]
fn test_unsupported_version_rejected() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("future.bin");

    let dictionary = KmerDictionary::build(["AAAA"]);
    let mut header = dictionary.header().unwrap();
    header.format_version = 99;
    write_raw_dictionary(&dict_path, &header, &["AAAA"]);

    let err = KmerDictionary::load(&dict_path).unwrap_err();
    assert_eq!(
        err.downcast_ref::<KmerFrameError>(),
        Some(&KmerFrameError::UnsupportedVersion(99))
    );
}

#[test]
fn test_truncated_file_rejected() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("truncated.bin");

    let dictionary = KmerDictionary::build(["AAAA", "CCCC", "GGGG"]);
    dictionary.write(Some(&dict_path)).unwrap();
    let bytes = fs::read(&dict_path).unwrap();
    fs::write(&dict_path, &bytes[..bytes.len() - 3]).unwrap();

    assert!(KmerDictionary::load(&dict_path).is_err());
}

#[test]
fn test_forged_count_rejected_without_allocating() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("forged.bin");

    let dictionary = KmerDictionary::build(["AAAA"]);
    let mut header = dictionary.header().unwrap();
    header.kmer_count = u64::MAX;
    write_raw_dictionary_with_count(&dict_path, &header, u64::MAX, &["AAAA"]);

    let result = std::panic::catch_unwind(|| KmerDictionary::load(&dict_path));
    assert!(matches!(result, Ok(Err(_))));
}

#[test]
fn test_missing_dictionary_file() {
    let missing = PathBuf::from("/nonexistent/kmr_dictionary.bin");
    assert!(KmerDictionary::load(&missing).is_err());
}

#[test]
fn test_dictionary_info() {
    let temp_dir = tempdir().unwrap();
    let dict_path = temp_dir.path().join("dict.bin");
    let dictionary = KmerDictionary::build(["ACGTA", "CCGTA"]);
    dictionary.write(Some(&dict_path)).unwrap();

    let mut out = Vec::new();
    kmerframe::dictionary_info(&dict_path, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("K-mer length (k): 5"));
    assert!(text.contains("K-mer count: 2"));
    assert!(text.contains("Instrument placement: trailing"));
    assert!(text.contains("Feature columns: 5"));
    assert!(text.contains(&dictionary.fingerprint_hex()));
}
