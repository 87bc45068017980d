use anyhow::{anyhow, Context};
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::DB_FILE_NAME;
use crate::db;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/sast.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "sast-backup-v1";

/// Bundles are read and written only below `<data_dir>/backups`.
pub const BACKUP_DIR: &str = "backups";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
}

/// Resolves a client-supplied bundle name inside the backup directory.
/// Absolute paths and `.`/`..` components yield `None`.
pub fn bundle_path(data_dir: &Path, name: &str) -> Option<PathBuf> {
    let rel = Path::new(name);
    let mut components = rel.components().peekable();
    components.peek()?;
    if !components.all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(data_dir.join(BACKUP_DIR).join(rel))
}

fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = f.read(&mut buf).context("failed to read for checksum")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Writes a consistent snapshot of the live database into a zip bundle.
pub fn export_bundle(conn: &Connection, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let snapshot = out_path.with_extension("snapshot.sqlite3");
    if snapshot.exists() {
        let _ = std::fs::remove_file(&snapshot);
    }
    conn.execute("VACUUM INTO ?", [snapshot.to_string_lossy().to_string()])
        .context("failed to snapshot database")?;
    let result = write_bundle(&snapshot, out_path);
    let _ = std::fs::remove_file(&snapshot);
    result
}

fn write_bundle(snapshot: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_sha256 = sha256_file(snapshot)?;
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": db::now_rfc3339(),
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(snapshot)
        .with_context(|| format!("failed to open snapshot {}", snapshot.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256,
    })
}

/// Restores a bundle into `data_dir`, replacing the database file. The caller
/// must reopen its connection afterwards.
pub fn import_bundle(in_path: &Path, data_dir: &Path) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.to_string_lossy()
        )
    })?;

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let tmp_dst = data_dir.join(format!("{}.importing", DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    {
        let mut db_out = File::create(&tmp_dst).with_context(|| {
            format!(
                "failed to create temp database {}",
                tmp_dst.to_string_lossy()
            )
        })?;
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/sast.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
        db_out
            .flush()
            .context("failed to flush extracted database")?;
    }

    let actual_sha = sha256_file(&tmp_dst)?;
    if !expected_sha.is_empty() && actual_sha != expected_sha {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(anyhow!(
            "database checksum mismatch: manifest {} != bundle {}",
            expected_sha,
            actual_sha
        ));
    }

    // Refuse anything that does not open as a database with our schema.
    {
        let check = Connection::open(&tmp_dst).context("extracted database does not open")?;
        db::init_schema(&check).context("extracted database has an incompatible schema")?;
    }

    let dst = data_dir.join(DB_FILE_NAME);
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
        db_sha256: actual_sha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_round_trip_restores_rows() {
        let src = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(src.path()).expect("open");
        conn.execute(
            "INSERT INTO programs(id, name) VALUES('p1', 'BSIT')",
            [],
        )
        .expect("insert");

        let bundle = src.path().join("out/backup.zip");
        let exported = export_bundle(&conn, &bundle).expect("export");
        assert_eq!(exported.bundle_format, BUNDLE_FORMAT_V1);
        assert_eq!(exported.db_sha256.len(), 64);

        let dst = tempfile::tempdir().expect("tempdir");
        let imported = import_bundle(&bundle, dst.path()).expect("import");
        assert_eq!(imported.db_sha256, exported.db_sha256);

        let restored = db::open_db(dst.path()).expect("reopen");
        let name: String = restored
            .query_row("SELECT name FROM programs WHERE id = 'p1'", [], |r| r.get(0))
            .expect("program restored");
        assert_eq!(name, "BSIT");
    }

    #[test]
    fn bundle_names_stay_inside_the_backup_dir() {
        let data = Path::new("/srv/sast");
        assert_eq!(
            bundle_path(data, "2024/term-end.zip"),
            Some(PathBuf::from("/srv/sast/backups/2024/term-end.zip"))
        );
        assert_eq!(bundle_path(data, "../sast.sqlite3"), None);
        assert_eq!(bundle_path(data, "nested/../../escape.zip"), None);
        assert_eq!(bundle_path(data, "/etc/passwd"), None);
        assert_eq!(bundle_path(data, "./x.zip"), None);
        assert_eq!(bundle_path(data, ""), None);
    }

    #[test]
    fn non_zip_input_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bogus = dir.path().join("bogus.zip");
        std::fs::write(&bogus, b"not a zip").expect("write");
        assert!(import_bundle(&bogus, dir.path()).is_err());
        assert!(!dir.path().join(DB_FILE_NAME).exists());
    }
}
