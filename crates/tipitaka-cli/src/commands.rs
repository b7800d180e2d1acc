//! Admin commands over a corpus database: validate, import, export, inspect.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use tipitaka_core::{DataPaths, Error};
use tipitaka_store::audit::audit_connection;
use tipitaka_store::{
    AuditReport, CascadeReport, ChunkTree, CorpusBatch, CorpusStore, StoreStats,
};

/// Trees committed per transaction during import.
pub const IMPORT_BATCH_TREES: usize = 500;

/// Audit an existing database without creating or altering anything.
pub fn validate(db_path: &Path) -> anyhow::Result<AuditReport> {
    if !db_path.exists() {
        bail!("Database not found: {}", db_path.display());
    }
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(audit_connection(&conn)?)
}

/// Import JSON Lines chunk trees. Returns the number of trees written.
///
/// Each batch of trees is atomic; a failing batch aborts the import and
/// leaves earlier batches committed.
pub fn import_jsonl(store: &CorpusStore, input: &Path) -> anyhow::Result<usize> {
    let file = File::open(input).with_context(|| format!("Cannot open {}", input.display()))?;
    let reader = BufReader::new(file);

    let mut batch = CorpusBatch::default();
    let mut pending = 0usize;
    let mut imported = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tree: ChunkTree = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid chunk tree", input.display(), line_no + 1))?;
        batch.push_tree(&tree);
        pending += 1;

        if pending >= IMPORT_BATCH_TREES {
            flush(store, &mut batch, &mut pending, &mut imported)?;
        }
    }
    flush(store, &mut batch, &mut pending, &mut imported)?;

    info!("Imported {} chunk trees from {}", imported, input.display());
    Ok(imported)
}

fn flush(
    store: &CorpusStore,
    batch: &mut CorpusBatch,
    pending: &mut usize,
    imported: &mut usize,
) -> anyhow::Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let report = store
        .insert_batch(batch)
        .with_context(|| format!("Import stopped after {} chunk trees", imported))?;
    *imported += *pending;
    info!(
        "Committed {} chunks, {} sub-chunks, {} sentences ({} trees so far)",
        report.chunks, report.sub_chunks, report.sentences, imported
    );
    *batch = CorpusBatch::default();
    *pending = 0;
    Ok(())
}

/// Write every chunk tree as JSON Lines. Returns the number of trees written.
pub fn export_jsonl(store: &CorpusStore, out: impl Write) -> anyhow::Result<usize> {
    let mut writer = BufWriter::new(out);
    let total = store.for_each_tree(|tree| {
        serde_json::to_writer(&mut writer, &tree)?;
        writer.write_all(b"\n")?;
        Ok(())
    })?;
    writer.flush()?;
    Ok(total)
}

/// Timestamped export file under the exports directory.
pub fn default_export_path(paths: &DataPaths) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    paths.exports.join(format!("tipitaka_{}.jsonl", stamp))
}

/// Write the flattened chunk/sub-chunk/sentence join as JSON Lines.
pub fn write_wide_rows(
    store: &CorpusStore,
    chunk_id: Option<&str>,
    out: impl Write,
) -> anyhow::Result<usize> {
    let rows = store.wide_rows(chunk_id)?;
    let mut writer = BufWriter::new(out);
    for row in &rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Load one chunk tree, failing with `NotFound` for an unknown id.
pub fn show_chunk(store: &CorpusStore, chunk_id: &str) -> anyhow::Result<ChunkTree> {
    store
        .load_tree(chunk_id)?
        .ok_or_else(|| Error::NotFound(format!("chunk {}", chunk_id)).into())
}

/// Delete a chunk and its parts, failing with `NotFound` for an unknown id.
pub fn delete_chunk(store: &CorpusStore, chunk_id: &str) -> anyhow::Result<CascadeReport> {
    let report = store.delete_chunk(chunk_id)?;
    if report.is_empty() {
        return Err(Error::NotFound(format!("chunk {}", chunk_id)).into());
    }
    Ok(report)
}

/// Print store statistics to stdout.
pub fn print_stats(stats: &StoreStats) {
    println!("=== Tipitaka Corpus ===");
    println!();
    println!("Chunks:             {}", stats.total_chunks);
    println!("Sub-chunks:         {}", stats.total_sub_chunks);
    println!("Sentences:          {}", stats.total_sentences);
    println!("Tokens:             {}", stats.total_tokens);
    println!("Database:           {}", stats.db_path);
    println!("Size:               {:.2} MB", stats.db_size_mb);
}

/// Print an audit report to stdout.
pub fn print_report(report: &AuditReport) {
    println!("=== Tipitaka Audit Report ===");
    println!();
    println!("Schema valid:       {}", if report.schema_valid { "YES" } else { "NO" });
    println!("Chunks:             {}", report.chunks);
    println!("Sub-chunks:         {}", report.sub_chunks);
    println!("Sentences:          {}", report.sentences);
    println!("Chunks w/o parts:   {}", report.chunks_without_sub_chunks);
    println!("Sub-chunks w/o sentences: {}", report.sub_chunks_without_sentences);

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.is_healthy() {
        println!("Status: OK");
    } else {
        warn!("Audit failed with {} errors", report.errors.len());
        println!("Status: INVALID");
    }
}
