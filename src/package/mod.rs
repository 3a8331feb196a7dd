// src/package/mod.rs

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::{ExtendedFileOptions, FileOptions};
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::Config;
use crate::generate::{fill_pattern, GeneratedPair};
use crate::series::MonthKey;

/// Bundle the DATA/META pair for one ISIN-month into the submission archive.
///
/// Entries are stored by bare filename, no directory nesting. Rerunning
/// overwrites any prior archive for the same ISIN-month.
pub fn package_pair(
    cfg: &Config,
    isin: &str,
    month: MonthKey,
    pair: &GeneratedPair,
) -> Result<PathBuf> {
    let timestamp = month.file_timestamp();
    let path = cfg
        .output_dir
        .join(fill_pattern(&cfg.zip_file_pattern, isin, &timestamp));

    let file = File::create(&path).with_context(|| format!("creating `{}`", path.display()))?;
    let mut zip = ZipWriter::new(file);
    append_entry(&mut zip, &pair.meta)?;
    append_entry(&mut zip, &pair.data)?;
    zip.finish()
        .with_context(|| format!("finalizing `{}`", path.display()))?;

    info!(path = %path.display(), "wrote submission archive");
    Ok(path)
}

fn append_entry(zip: &mut ZipWriter<File>, source: &Path) -> Result<()> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("`{}` has no filename", source.display()))?;
    let options: FileOptions<'_, ExtendedFileOptions> =
        FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(name.as_str(), options)?;
    let bytes =
        fs::read(source).with_context(|| format!("reading `{}`", source.display()))?;
    zip.write_all(&bytes)?;
    Ok(())
}

/// Confirm the archive holds exactly the expected DATA and META entries.
pub fn verify_archive(path: &Path, pair: &GeneratedPair) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening `{}`", path.display()))?;
    let archive =
        ZipArchive::new(file).with_context(|| format!("reading `{}`", path.display()))?;

    let mut names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
    names.sort();

    let (data_name, meta_name) = pair.entry_names()?;
    let mut expected = vec![data_name, meta_name];
    expected.sort();

    if names != expected {
        bail!(
            "archive `{}` holds {:?}, expected {:?}",
            path.display(),
            names,
            expected
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture_pair(dir: &Path) -> GeneratedPair {
        let data = dir.join("ITBI_IT0000000001_DATA_20250930.xls");
        let meta = dir.join("ITBI_IT0000000001_META_20250930.xls");
        fs::write(&data, b"data bytes").unwrap();
        fs::write(&meta, b"meta bytes").unwrap();
        GeneratedPair { data, meta }
    }

    #[test]
    fn archive_holds_exactly_the_pair() {
        let tmp = tempdir().unwrap();
        let cfg = Config {
            output_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };
        let pair = fixture_pair(tmp.path());
        let month = MonthKey::new(2025, 9).unwrap();

        let archive = package_pair(&cfg, "IT0000000001", month, &pair).unwrap();
        assert_eq!(
            archive.file_name().unwrap().to_string_lossy(),
            "ITBI_IT0000000001_20250930.zip"
        );

        let file = File::open(&archive).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);

        let mut names: Vec<String> = zip.file_names().map(|n| n.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            [
                "ITBI_IT0000000001_DATA_20250930.xls",
                "ITBI_IT0000000001_META_20250930.xls",
            ]
        );

        // entries are flat copies of the generated files
        let mut entry = zip
            .by_name("ITBI_IT0000000001_DATA_20250930.xls")
            .unwrap();
        let mut contents = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, b"data bytes");

        verify_archive(&archive, &pair).unwrap();
    }

    #[test]
    fn repackaging_overwrites_prior_archive() {
        let tmp = tempdir().unwrap();
        let cfg = Config {
            output_dir: tmp.path().to_path_buf(),
            ..Config::default()
        };
        let pair = fixture_pair(tmp.path());
        let month = MonthKey::new(2025, 9).unwrap();

        let first = package_pair(&cfg, "IT0000000001", month, &pair).unwrap();
        let second = package_pair(&cfg, "IT0000000001", month, &pair).unwrap();
        assert_eq!(first, second);

        let file = File::open(&second).unwrap();
        let zip = ZipArchive::new(file).unwrap();
        assert_eq!(zip.len(), 2);
    }

    #[test]
    fn verify_rejects_missing_entry() {
        let tmp = tempdir().unwrap();
        let pair = fixture_pair(tmp.path());

        // archive with only one of the two files
        let archive_path = tmp.path().join("ITBI_IT0000000001_20250930.zip");
        let mut zip = ZipWriter::new(File::create(&archive_path).unwrap());
        append_entry(&mut zip, &pair.data).unwrap();
        zip.finish().unwrap();

        assert!(verify_archive(&archive_path, &pair).is_err());
    }
}
