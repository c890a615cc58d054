use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use liblzma::write::XzEncoder;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use zstd::stream::write::Encoder as ZstdEncoder;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024 * 1024; // Opt: 8MB output buffer
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 2;

/// Output sink, compressed according to the output file extension.
///
/// Call [`OutputWriter::finish`] once everything is written: compressed
/// streams only become complete when their trailer is written, and errors
/// from doing so are lost if the writer is just dropped.
pub enum OutputWriter {
    Stdout(BufWriter<io::Stdout>),
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Zstd(ZstdEncoder<'static, BufWriter<File>>),
    Xz(XzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    /// Wrap an already open file, choosing compression from `name`
    pub fn from_file(file: File, name: &Path, compression_level: u8) -> Result<Self> {
        let buffered_file = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);

        match name.to_string_lossy() {
            p if p.ends_with(".gz") => {
                validate_compression_level(compression_level, 1, 9, "gzip")?;
                Ok(OutputWriter::Gzip(GzEncoder::new(
                    buffered_file,
                    flate2::Compression::new(compression_level as u32),
                )))
            }
            p if p.ends_with(".zst") => {
                validate_compression_level(compression_level, 1, 22, "zstd")?;
                Ok(OutputWriter::Zstd(ZstdEncoder::new(
                    buffered_file,
                    compression_level as i32,
                )?))
            }
            p if p.ends_with(".xz") => {
                validate_compression_level(compression_level, 0, 9, "xz")?;
                Ok(OutputWriter::Xz(XzEncoder::new(
                    buffered_file,
                    compression_level as u32,
                )))
            }
            _ => Ok(OutputWriter::Plain(buffered_file)),
        }
    }

    /// Write any compression trailer and flush everything to the underlying file
    pub fn finish(self) -> Result<()> {
        let mut inner = match self {
            OutputWriter::Stdout(mut writer) => {
                writer.flush().context("Failed to flush stdout")?;
                return Ok(());
            }
            OutputWriter::Plain(writer) => writer,
            OutputWriter::Gzip(encoder) => encoder
                .finish()
                .context("Failed to finish gzip stream")?,
            OutputWriter::Zstd(encoder) => encoder
                .finish()
                .context("Failed to finish zstd stream")?,
            OutputWriter::Xz(encoder) => encoder
                .finish()
                .context("Failed to finish xz stream")?,
        };
        inner.flush().context("Failed to flush output file")?;
        Ok(())
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Stdout(w) => w.write(buf),
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf),
            OutputWriter::Zstd(w) => w.write(buf),
            OutputWriter::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Stdout(w) => w.flush(),
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush(),
            OutputWriter::Zstd(w) => w.flush(),
            OutputWriter::Xz(w) => w.flush(),
        }
    }
}

/// Validate compression level for the given format
fn validate_compression_level(level: u8, min: u8, max: u8, format: &str) -> Result<()> {
    if level < min || level > max {
        Err(anyhow::anyhow!(
            "Invalid {} compression level {}. Must be between {} and {}.",
            format,
            level,
            min,
            max
        ))
    } else {
        Ok(())
    }
}

/// Return a writer for the output path (`-` for stdout), compressing by extension
pub fn get_writer(output_path: &Path, compression_level: u8) -> Result<OutputWriter> {
    if output_path.to_string_lossy() == "-" {
        return Ok(OutputWriter::Stdout(BufWriter::with_capacity(
            OUTPUT_BUFFER_SIZE,
            io::stdout(),
        )));
    }

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    OutputWriter::from_file(file, output_path, compression_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_validate_compression_level() {
        assert!(validate_compression_level(5, 1, 9, "gzip").is_ok());
        assert!(validate_compression_level(0, 1, 9, "gzip").is_err());
        assert!(validate_compression_level(23, 1, 22, "zstd").is_err());
    }

    #[test]
    fn test_gzip_output_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv.gz");

        let mut writer = get_writer(&path, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(matches!(writer, OutputWriter::Gzip(_)));
        writer.write_all(b"genome_id,0\n").unwrap();
        writer.finish().unwrap();

        let mut decoder = flate2::read::GzDecoder::new(File::open(&path).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "genome_id,0\n");
    }

    #[test]
    fn test_xz_finish_writes_complete_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv.xz");

        let mut writer = get_writer(&path, 6).unwrap();
        writer.write_all(b"a,b\n1,2\n").unwrap();
        writer.finish().unwrap();

        let mut decoder = liblzma::read::XzDecoder::new(File::open(&path).unwrap());
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        assert_eq!(text, "a,b\n1,2\n");
    }

    #[test]
    fn test_extension_from_name_not_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.tmp");
        let file = File::create(&staged).unwrap();

        let writer = OutputWriter::from_file(file, Path::new("kmr_df.csv.zst"), 3).unwrap();
        assert!(matches!(writer, OutputWriter::Zstd(_)));
        writer.finish().unwrap();
    }
}
