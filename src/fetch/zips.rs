// src/fetch/zips.rs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use url::Url;
use zip::ZipArchive;

/// Download the auctions ZIP and save it under `dest_dir` using the URL's
/// filename. Returns the full path of the saved file.
pub async fn download_auction_zip(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let url = Url::parse(url_str).with_context(|| format!("bad download URL `{}`", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("auctions.zip");
    let dest_path = dest_dir.as_ref().join(filename);

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let resp = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("downloading `{}`", url_str))?;
    let bytes = resp.bytes().await?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing `{}`", dest_path.display()))?;

    info!(bytes = bytes.len(), dest = %dest_path.display(), "downloaded auctions ZIP");
    Ok(dest_path)
}

/// Extract the first spreadsheet entry of the downloaded ZIP into `dest_dir`,
/// flattening any directory prefix. Returns the extracted workbook path.
pub fn extract_workbook(zip_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating `{}`", dest_dir.display()))?;
    let file =
        File::open(zip_path).with_context(|| format!("opening `{}`", zip_path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("reading `{}`", zip_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let lower = name.to_lowercase();
        if !(lower.ends_with(".xls") || lower.ends_with(".xlsx")) {
            continue;
        }

        let base = Path::new(&name)
            .file_name()
            .with_context(|| format!("ZIP entry `{}` has no filename", name))?;
        let dest = dest_dir.join(base);
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        std::fs::write(&dest, &buf)
            .with_context(|| format!("writing `{}`", dest.display()))?;
        info!(entry = %name, dest = %dest.display(), "extracted workbook");
        return Ok(dest);
    }

    bail!("no spreadsheet entry in `{}`", zip_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::{ExtendedFileOptions, FileOptions};
    use zip::CompressionMethod;

    fn stored() -> FileOptions<'static, ExtendedFileOptions> {
        FileOptions::default().compression_method(CompressionMethod::Stored)
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            zip.start_file(*name, stored()).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_first_spreadsheet_flattened() {
        let tmp = tempdir().unwrap();
        let zip_path = tmp.path().join("aste_corrente.zip");
        write_zip(
            &zip_path,
            &[
                ("readme.txt", b"ignore me"),
                ("aste/aste_corrente_20250930.xls", b"workbook bytes"),
            ],
        );

        let out_dir = tmp.path().join("extracted");
        let dest = extract_workbook(&zip_path, &out_dir).unwrap();

        assert_eq!(dest, out_dir.join("aste_corrente_20250930.xls"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"workbook bytes");
    }

    #[test]
    fn no_spreadsheet_is_an_error() {
        let tmp = tempdir().unwrap();
        let zip_path = tmp.path().join("nodata.zip");
        write_zip(&zip_path, &[("readme.txt", b"nothing here")]);

        assert!(extract_workbook(&zip_path, tmp.path()).is_err());
    }
}
