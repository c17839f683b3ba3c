use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::{db_path, DB_FILE_NAME};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/examd.sqlite3";
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
pub const BUNDLE_FORMAT_V1: &str = "examd-workspace-v1";
pub const LEGACY_SQLITE: &str = "legacy-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub db_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: Option<String>,
    #[serde(default)]
    exported_at: Option<String>,
    db_sha256: String,
    #[serde(default)]
    db_bytes: Option<u64>,
}

enum Source {
    Bundle,
    RawSqlite,
}

impl Source {
    fn sniff(path: &Path) -> anyhow::Result<Self> {
        let mut f = File::open(path)
            .with_context(|| format!("cannot open backup {}", path.display()))?;
        let mut head = [0u8; 4];
        let n = f.read(&mut head).context("cannot read backup header")?;
        Ok(if n == head.len() && head == ZIP_MAGIC {
            Source::Bundle
        } else {
            Source::RawSqlite
        })
    }
}

fn digest(path: &Path) -> anyhow::Result<(String, u64)> {
    let mut f = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let n = std::io::copy(&mut f, &mut hasher)
        .with_context(|| format!("cannot read {}", path.display()))?;
    Ok((format!("{:x}", hasher.finalize()), n))
}

/// Writes the workspace database into a zip bundle next to a manifest.
/// Callers hold the connection lock so the file is not written concurrently.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_file = db_path(workspace_path);
    if !db_file.is_file() {
        bail!("no database in workspace {}", workspace_path.display());
    }
    let (db_sha256, db_bytes) = digest(&db_file)?;

    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    let out = File::create(out_path)
        .with_context(|| format!("cannot create bundle {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        exported_at: Some(chrono::Utc::now().to_rfc3339()),
        db_sha256: db_sha256.clone(),
        db_bytes: Some(db_bytes),
    };
    zip.start_file(MANIFEST_ENTRY, opts)?;
    serde_json::to_writer_pretty(&mut zip, &manifest).context("writing manifest")?;

    zip.start_file(DB_ENTRY, opts)?;
    let mut db_in = File::open(&db_file)?;
    std::io::copy(&mut db_in, &mut zip).context("writing database entry")?;
    zip.finish().context("finalizing bundle")?;

    tracing::info!(path = %out_path.display(), db_bytes, "workspace bundle written");
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        db_sha256,
        db_bytes,
    })
}

/// Replaces the workspace database with the one in `in_path`. The current
/// connection must be closed first. A failed import leaves the old file.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("cannot create workspace {}", workspace_path.display()))?;
    let staged = workspace_path.join(format!("{DB_FILE_NAME}.importing"));
    let _ = std::fs::remove_file(&staged);

    let detected = match Source::sniff(in_path)? {
        Source::RawSqlite => {
            std::fs::copy(in_path, &staged)
                .with_context(|| format!("cannot copy {}", in_path.display()))?;
            LEGACY_SQLITE
        }
        Source::Bundle => {
            if let Err(e) = unpack_bundle(in_path, &staged) {
                let _ = std::fs::remove_file(&staged);
                return Err(e);
            }
            BUNDLE_FORMAT_V1
        }
    };

    // rename over an existing file is not atomic on every platform
    let dst = db_path(workspace_path);
    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("cannot replace {}", dst.display()))?;
    }
    std::fs::rename(&staged, &dst)
        .with_context(|| format!("cannot move restored database to {}", dst.display()))?;

    tracing::info!(path = %in_path.display(), format = detected, "workspace restored");
    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
    })
}

fn unpack_bundle(in_path: &Path, staged: &Path) -> anyhow::Result<()> {
    let f = File::open(in_path)
        .with_context(|| format!("cannot open bundle {}", in_path.display()))?;
    let mut archive = ZipArchive::new(f).context("not a valid zip archive")?;

    let manifest: Manifest = {
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle has no manifest.json")?;
        serde_json::from_reader(entry).context("manifest.json is malformed")?
    };
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    {
        let mut entry = archive
            .by_name(DB_ENTRY)
            .context("bundle has no database entry")?;
        let mut out = File::create(staged)
            .with_context(|| format!("cannot create {}", staged.display()))?;
        std::io::copy(&mut entry, &mut out).context("extracting database")?;
        out.flush()?;
    }

    let (actual, _) = digest(staged)?;
    if actual != manifest.db_sha256 {
        bail!("database checksum mismatch");
    }
    Ok(())
}
