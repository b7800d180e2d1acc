//! SQLite-backed corpus store: Chunk → SubChunk → Sentence.
//!
//! Referential integrity and cascading deletes are delegated to SQLite's
//! foreign keys, which every connection switches on before use. Multi-row
//! writes run inside one transaction so readers never see partial trees.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, warn};

use crate::schema::{PRAGMAS_SQL, SCHEMA_SQL};
use crate::types::*;
use tipitaka_core::{CorpusConfig, Error, OrderPolicy, Result};

const CHUNK_COLUMNS: &str = "chunk_id, pali_text, token_count, order_idx";
const SUB_CHUNK_COLUMNS: &str = "sub_chunk_id, chunk_id, pali_text, token_count, order_idx";
const SENTENCE_COLUMNS: &str = "sentence_id, sub_chunk_id, pali_text, order_idx";

const INSERT_CHUNK_SQL: &str =
    "INSERT INTO Chunk (chunk_id, pali_text, token_count, order_idx) VALUES (?1, ?2, ?3, ?4)";
const INSERT_SUB_CHUNK_SQL: &str = "INSERT INTO SubChunk \
     (sub_chunk_id, chunk_id, pali_text, token_count, order_idx) VALUES (?1, ?2, ?3, ?4, ?5)";
const INSERT_SENTENCE_SQL: &str = "INSERT INTO Sentence \
     (sentence_id, sub_chunk_id, pali_text, order_idx) VALUES (?1, ?2, ?3, ?4)";

/// SQLite store for the three-level corpus hierarchy.
pub struct CorpusStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    order_policy: OrderPolicy,
}

impl CorpusStore {
    /// Open or create the store at `db_path`. Parent directories are created.
    pub fn open(db_path: impl AsRef<Path>, order_policy: OrderPolicy) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path).map_err(db_err)?;
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(db_err)?;
        let store = Self::from_connection(conn, db_path, order_policy)?;

        info!(
            "CorpusStore initialized: {} chunks, {} sub-chunks, {} sentences, policy={:?}, path={}",
            store.count_chunks()?,
            store.count_sub_chunks()?,
            store.count_sentences()?,
            order_policy,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Open the store described by a [`CorpusConfig`].
    pub fn open_with_config(config: &CorpusConfig) -> Result<Self> {
        Self::open(&config.data_paths.db_file, config.order_policy)
    }

    /// Private in-memory store; contents vanish on drop.
    pub fn open_in_memory(order_policy: OrderPolicy) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn, PathBuf::from(":memory:"), order_policy)
    }

    fn from_connection(
        conn: Connection,
        db_path: PathBuf,
        order_policy: OrderPolicy,
    ) -> Result<Self> {
        Self::configure_connection(&conn)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            order_policy,
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(PRAGMAS_SQL).map_err(db_err)?;
        let enforced: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .map_err(db_err)?;
        if enforced != 1 {
            return Err(Error::Config(
                "SQLite refused to enable foreign key enforcement".to_string(),
            ));
        }
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn order_policy(&self) -> OrderPolicy {
        self.order_policy
    }

    /// Run `f` against the locked connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    // ---------------------------------------------------------------
    // Create
    // ---------------------------------------------------------------

    /// Insert a chunk. Fails with `ConstraintViolation` if `chunk_id` exists.
    pub fn create_chunk(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.conn.lock();
        insert_chunk(&conn, chunk)?;
        debug!("Created chunk {}", chunk.chunk_id);
        Ok(())
    }

    /// Insert a sub-chunk under an existing chunk.
    pub fn create_sub_chunk(&self, sub_chunk: &SubChunk) -> Result<()> {
        let conn = self.conn.lock();
        if self.order_policy == OrderPolicy::Reject {
            check_sub_chunk_order(&conn, sub_chunk)?;
        }
        insert_sub_chunk(&conn, sub_chunk)?;
        debug!(
            "Created sub-chunk {} under {}",
            sub_chunk.sub_chunk_id, sub_chunk.chunk_id
        );
        Ok(())
    }

    /// Insert a sentence under an existing sub-chunk.
    pub fn create_sentence(&self, sentence: &Sentence) -> Result<()> {
        let conn = self.conn.lock();
        if self.order_policy == OrderPolicy::Reject {
            check_sentence_order(&conn, sentence)?;
        }
        insert_sentence(&conn, sentence)?;
        debug!(
            "Created sentence {} under {}",
            sentence.sentence_id, sentence.sub_chunk_id
        );
        Ok(())
    }

    /// Insert every row of `batch` in one transaction.
    ///
    /// Foreign keys are deferred to commit, so rows may arrive in any order
    /// across levels. Any failure rolls the whole batch back.
    pub fn insert_batch(&self, batch: &CorpusBatch) -> Result<BatchReport> {
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")
            .map_err(db_err)?;

        for chunk in &batch.chunks {
            insert_chunk(&tx, chunk)?;
        }
        for sub_chunk in &batch.sub_chunks {
            insert_sub_chunk(&tx, sub_chunk)?;
        }
        for sentence in &batch.sentences {
            insert_sentence(&tx, sentence)?;
        }

        if self.order_policy == OrderPolicy::Reject {
            for sub_chunk in &batch.sub_chunks {
                check_sub_chunk_order(&tx, sub_chunk)?;
            }
            for sentence in &batch.sentences {
                check_sentence_order(&tx, sentence)?;
            }
        }

        tx.commit().map_err(|e| classify(e, "batch commit"))?;

        let report = BatchReport {
            chunks: batch.chunks.len(),
            sub_chunks: batch.sub_chunks.len(),
            sentences: batch.sentences.len(),
        };
        debug!(
            "Inserted batch: {} chunks, {} sub-chunks, {} sentences",
            report.chunks, report.sub_chunks, report.sentences
        );
        Ok(report)
    }

    /// Insert a chunk with its full subtree atomically.
    pub fn insert_tree(&self, tree: &ChunkTree) -> Result<BatchReport> {
        self.insert_batch(&CorpusBatch::from(tree))
    }

    // ---------------------------------------------------------------
    // Read
    // ---------------------------------------------------------------

    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let conn = self.conn.lock();
        query_chunk(&conn, chunk_id)
    }

    pub fn get_sub_chunk(&self, sub_chunk_id: &str) -> Result<Option<SubChunk>> {
        let conn = self.conn.lock();
        query_sub_chunk(&conn, sub_chunk_id)
    }

    pub fn get_sentence(&self, sentence_id: &str) -> Result<Option<Sentence>> {
        let conn = self.conn.lock();
        query_sentence(&conn, sentence_id)
    }

    /// All chunks in `order_idx` order.
    pub fn list_chunks(&self) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        query_chunks(&conn)
    }

    /// Sub-chunks of a chunk, ascending by `order_idx` (ties by id).
    pub fn list_sub_chunks(&self, chunk_id: &str) -> Result<Vec<SubChunk>> {
        let conn = self.conn.lock();
        query_sub_chunks(&conn, chunk_id)
    }

    /// Sentences of a sub-chunk, ascending by `order_idx` (ties by id).
    pub fn list_sentences(&self, sub_chunk_id: &str) -> Result<Vec<Sentence>> {
        let conn = self.conn.lock();
        query_sentences(&conn, sub_chunk_id)
    }

    /// Load a chunk and its ordered subtree.
    pub fn load_tree(&self, chunk_id: &str) -> Result<Option<ChunkTree>> {
        let conn = self.conn.lock();
        match query_chunk(&conn, chunk_id)? {
            Some(chunk) => build_tree(&conn, chunk).map(Some),
            None => Ok(None),
        }
    }

    /// Visit every chunk tree in chunk `order_idx` order.
    ///
    /// The connection stays locked for the whole walk.
    pub fn for_each_tree<F>(&self, mut f: F) -> Result<usize>
    where
        F: FnMut(ChunkTree) -> Result<()>,
    {
        let conn = self.conn.lock();
        let chunks = query_chunks(&conn)?;
        let total = chunks.len();
        for chunk in chunks {
            f(build_tree(&conn, chunk)?)?;
        }
        Ok(total)
    }

    /// Rebuild a chunk's text from its sub-chunks, joined by single spaces.
    pub fn reconstruct_chunk_text(&self, chunk_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        if query_chunk(&conn, chunk_id)?.is_none() {
            return Ok(None);
        }
        let parts: Vec<String> = query_sub_chunks(&conn, chunk_id)?
            .into_iter()
            .map(|sc| sc.pali_text)
            .collect();
        Ok(Some(parts.join(" ")))
    }

    /// Flattened chunk/sub-chunk/sentence join, walked in `order_idx` order.
    ///
    /// Sub-chunks without sentences appear once with empty sentence columns.
    /// Chunks without sub-chunks do not appear.
    pub fn wide_rows(&self, chunk_id: Option<&str>) -> Result<Vec<WideRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT c.chunk_id, c.pali_text AS chunk_text, \
                        s.sub_chunk_id, s.pali_text AS sub_chunk_text, \
                        t.sentence_id, t.pali_text AS sentence_text \
                 FROM Chunk c \
                 JOIN SubChunk s ON s.chunk_id = c.chunk_id \
                 LEFT JOIN Sentence t ON t.sub_chunk_id = s.sub_chunk_id \
                 WHERE ?1 IS NULL OR c.chunk_id = ?1 \
                 ORDER BY c.order_idx, c.chunk_id, s.order_idx, s.sub_chunk_id, \
                          t.order_idx, t.sentence_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![chunk_id], |row| {
                Ok(WideRow {
                    chunk_id: row.get("chunk_id")?,
                    chunk_text: row.get("chunk_text")?,
                    sub_chunk_id: row.get("sub_chunk_id")?,
                    sub_chunk_text: row.get("sub_chunk_text")?,
                    sentence_id: row.get("sentence_id")?,
                    sentence_text: row.get("sentence_text")?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    // ---------------------------------------------------------------
    // Update
    // ---------------------------------------------------------------

    /// Overwrite a chunk's non-key fields. Returns whether the chunk exists.
    pub fn update_chunk(&self, chunk: &Chunk) -> Result<bool> {
        let conn = self.conn.lock();
        let count = conn
            .prepare_cached(
                "UPDATE Chunk SET pali_text = ?2, token_count = ?3, order_idx = ?4 \
                 WHERE chunk_id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                chunk.chunk_id,
                chunk.pali_text,
                chunk.token_count,
                chunk.order_idx
            ])
            .map_err(|e| classify(e, &format!("Chunk {}", chunk.chunk_id)))?;
        Ok(count > 0)
    }

    /// Overwrite a sub-chunk's non-key fields, including its parent reference.
    pub fn update_sub_chunk(&self, sub_chunk: &SubChunk) -> Result<bool> {
        let conn = self.conn.lock();
        if self.order_policy == OrderPolicy::Reject {
            check_sub_chunk_order(&conn, sub_chunk)?;
        }
        let count = conn
            .prepare_cached(
                "UPDATE SubChunk SET chunk_id = ?2, pali_text = ?3, token_count = ?4, \
                 order_idx = ?5 WHERE sub_chunk_id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                sub_chunk.sub_chunk_id,
                sub_chunk.chunk_id,
                sub_chunk.pali_text,
                sub_chunk.token_count,
                sub_chunk.order_idx
            ])
            .map_err(|e| {
                classify(
                    e,
                    &format!("SubChunk {} -> Chunk {}", sub_chunk.sub_chunk_id, sub_chunk.chunk_id),
                )
            })?;
        Ok(count > 0)
    }

    /// Overwrite a sentence's non-key fields, including its parent reference.
    pub fn update_sentence(&self, sentence: &Sentence) -> Result<bool> {
        let conn = self.conn.lock();
        if self.order_policy == OrderPolicy::Reject {
            check_sentence_order(&conn, sentence)?;
        }
        let count = conn
            .prepare_cached(
                "UPDATE Sentence SET sub_chunk_id = ?2, pali_text = ?3, order_idx = ?4 \
                 WHERE sentence_id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                sentence.sentence_id,
                sentence.sub_chunk_id,
                sentence.pali_text,
                sentence.order_idx
            ])
            .map_err(|e| {
                classify(
                    e,
                    &format!(
                        "Sentence {} -> SubChunk {}",
                        sentence.sentence_id, sentence.sub_chunk_id
                    ),
                )
            })?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Delete
    // ---------------------------------------------------------------

    /// Delete a chunk with all of its sub-chunks and their sentences.
    ///
    /// Runs in one transaction. If any descendant survives the cascade the
    /// delete is rolled back and `CascadeFailure` is returned. Deleting an
    /// unknown chunk is a no-op with an empty report.
    pub fn delete_chunk(&self, chunk_id: &str) -> Result<CascadeReport> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        let sub_chunk_ids: Vec<String> = {
            let mut stmt = tx
                .prepare_cached("SELECT sub_chunk_id FROM SubChunk WHERE chunk_id = ?1")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![chunk_id], |row| row.get(0))
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<String>>>()
                .map_err(db_err)?
        };
        let sentences = count_sentences_under(&tx, &sub_chunk_ids)?;

        let deleted = tx
            .execute("DELETE FROM Chunk WHERE chunk_id = ?1", params![chunk_id])
            .map_err(|e| {
                if is_foreign_key_failure(&e) {
                    warn!("Cascade delete of {} refused by a non-cascading key", chunk_id);
                    Error::CascadeFailure(format!(
                        "chunk {}: children reference it without ON DELETE CASCADE",
                        chunk_id
                    ))
                } else {
                    db_err(e)
                }
            })?;
        if deleted == 0 {
            return Ok(CascadeReport::default());
        }

        let surviving_sub_chunks: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM SubChunk WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        let surviving_sentences = count_sentences_under(&tx, &sub_chunk_ids)?;
        if surviving_sub_chunks > 0 || surviving_sentences > 0 {
            tx.rollback().map_err(db_err)?;
            warn!(
                "Cascade delete of {} left {} sub-chunks and {} sentences; rolled back",
                chunk_id, surviving_sub_chunks, surviving_sentences
            );
            return Err(Error::CascadeFailure(format!(
                "chunk {}: {} sub-chunks and {} sentences survived the delete",
                chunk_id, surviving_sub_chunks, surviving_sentences
            )));
        }

        tx.commit().map_err(db_err)?;

        let report = CascadeReport {
            chunks: deleted,
            sub_chunks: sub_chunk_ids.len(),
            sentences,
        };
        info!(
            "Deleted chunk {} ({} sub-chunks, {} sentences)",
            chunk_id, report.sub_chunks, report.sentences
        );
        Ok(report)
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    pub fn count_chunks(&self) -> Result<i64> {
        self.with_conn(|conn| count_rows(conn, "Chunk"))
    }

    pub fn count_sub_chunks(&self) -> Result<i64> {
        self.with_conn(|conn| count_rows(conn, "SubChunk"))
    }

    pub fn count_sentences(&self) -> Result<i64> {
        self.with_conn(|conn| count_rows(conn, "Sentence"))
    }

    /// Get store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        let total_chunks = self.count_chunks()?;
        let total_sub_chunks = self.count_sub_chunks()?;
        let total_sentences = self.count_sentences()?;
        let total_tokens: i64 = self.with_conn(|conn| {
            conn.query_row("SELECT COALESCE(SUM(token_count), 0) FROM Chunk", [], |row| {
                row.get(0)
            })
            .map_err(db_err)
        })?;

        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total_chunks,
            total_sub_chunks,
            total_sentences,
            total_tokens,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }
}

// ---------------------------------------------------------------
// Statement helpers (operate on a locked connection or transaction)
// ---------------------------------------------------------------

fn insert_chunk(conn: &Connection, chunk: &Chunk) -> Result<()> {
    conn.prepare_cached(INSERT_CHUNK_SQL)
        .map_err(db_err)?
        .execute(params![
            chunk.chunk_id,
            chunk.pali_text,
            chunk.token_count,
            chunk.order_idx
        ])
        .map_err(|e| classify(e, &format!("Chunk {}", chunk.chunk_id)))?;
    Ok(())
}

fn insert_sub_chunk(conn: &Connection, sub_chunk: &SubChunk) -> Result<()> {
    conn.prepare_cached(INSERT_SUB_CHUNK_SQL)
        .map_err(db_err)?
        .execute(params![
            sub_chunk.sub_chunk_id,
            sub_chunk.chunk_id,
            sub_chunk.pali_text,
            sub_chunk.token_count,
            sub_chunk.order_idx
        ])
        .map_err(|e| {
            classify(
                e,
                &format!("SubChunk {} -> Chunk {}", sub_chunk.sub_chunk_id, sub_chunk.chunk_id),
            )
        })?;
    Ok(())
}

fn insert_sentence(conn: &Connection, sentence: &Sentence) -> Result<()> {
    conn.prepare_cached(INSERT_SENTENCE_SQL)
        .map_err(db_err)?
        .execute(params![
            sentence.sentence_id,
            sentence.sub_chunk_id,
            sentence.pali_text,
            sentence.order_idx
        ])
        .map_err(|e| {
            classify(
                e,
                &format!(
                    "Sentence {} -> SubChunk {}",
                    sentence.sentence_id, sentence.sub_chunk_id
                ),
            )
        })?;
    Ok(())
}

/// Fail if another sub-chunk of the same chunk holds this `order_idx`.
fn check_sub_chunk_order(conn: &Connection, sub_chunk: &SubChunk) -> Result<()> {
    let taken: i64 = conn
        .prepare_cached(
            "SELECT COUNT(*) FROM SubChunk \
             WHERE chunk_id = ?1 AND order_idx = ?2 AND sub_chunk_id != ?3",
        )
        .map_err(db_err)?
        .query_row(
            params![sub_chunk.chunk_id, sub_chunk.order_idx, sub_chunk.sub_chunk_id],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    if taken > 0 {
        return Err(Error::DuplicateOrder {
            parent: sub_chunk.chunk_id.clone(),
            order_idx: sub_chunk.order_idx,
        });
    }
    Ok(())
}

/// Fail if another sentence of the same sub-chunk holds this `order_idx`.
fn check_sentence_order(conn: &Connection, sentence: &Sentence) -> Result<()> {
    let taken: i64 = conn
        .prepare_cached(
            "SELECT COUNT(*) FROM Sentence \
             WHERE sub_chunk_id = ?1 AND order_idx = ?2 AND sentence_id != ?3",
        )
        .map_err(db_err)?
        .query_row(
            params![sentence.sub_chunk_id, sentence.order_idx, sentence.sentence_id],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    if taken > 0 {
        return Err(Error::DuplicateOrder {
            parent: sentence.sub_chunk_id.clone(),
            order_idx: sentence.order_idx,
        });
    }
    Ok(())
}

fn query_chunk(conn: &Connection, chunk_id: &str) -> Result<Option<Chunk>> {
    let sql = format!("SELECT {} FROM Chunk WHERE chunk_id = ?1", CHUNK_COLUMNS);
    conn.prepare_cached(&sql)
        .map_err(db_err)?
        .query_row(params![chunk_id], row_to_chunk)
        .optional()
        .map_err(db_err)
}

fn query_sub_chunk(conn: &Connection, sub_chunk_id: &str) -> Result<Option<SubChunk>> {
    let sql = format!("SELECT {} FROM SubChunk WHERE sub_chunk_id = ?1", SUB_CHUNK_COLUMNS);
    conn.prepare_cached(&sql)
        .map_err(db_err)?
        .query_row(params![sub_chunk_id], row_to_sub_chunk)
        .optional()
        .map_err(db_err)
}

fn query_sentence(conn: &Connection, sentence_id: &str) -> Result<Option<Sentence>> {
    let sql = format!("SELECT {} FROM Sentence WHERE sentence_id = ?1", SENTENCE_COLUMNS);
    conn.prepare_cached(&sql)
        .map_err(db_err)?
        .query_row(params![sentence_id], row_to_sentence)
        .optional()
        .map_err(db_err)
}

fn query_chunks(conn: &Connection) -> Result<Vec<Chunk>> {
    let sql = format!("SELECT {} FROM Chunk ORDER BY order_idx, chunk_id", CHUNK_COLUMNS);
    let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
    let rows = stmt.query_map([], row_to_chunk).map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn query_sub_chunks(conn: &Connection, chunk_id: &str) -> Result<Vec<SubChunk>> {
    let sql = format!(
        "SELECT {} FROM SubChunk WHERE chunk_id = ?1 ORDER BY order_idx, sub_chunk_id",
        SUB_CHUNK_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params![chunk_id], row_to_sub_chunk)
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn query_sentences(conn: &Connection, sub_chunk_id: &str) -> Result<Vec<Sentence>> {
    let sql = format!(
        "SELECT {} FROM Sentence WHERE sub_chunk_id = ?1 ORDER BY order_idx, sentence_id",
        SENTENCE_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params![sub_chunk_id], row_to_sentence)
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn build_tree(conn: &Connection, chunk: Chunk) -> Result<ChunkTree> {
    let mut sub_chunks = Vec::new();
    for sub_chunk in query_sub_chunks(conn, &chunk.chunk_id)? {
        let sentences = query_sentences(conn, &sub_chunk.sub_chunk_id)?;
        sub_chunks.push(SubChunkTree {
            sub_chunk,
            sentences,
        });
    }
    Ok(ChunkTree { chunk, sub_chunks })
}

fn count_sentences_under(conn: &Connection, sub_chunk_ids: &[String]) -> Result<usize> {
    let mut stmt = conn
        .prepare_cached("SELECT COUNT(*) FROM Sentence WHERE sub_chunk_id = ?1")
        .map_err(db_err)?;
    let mut total = 0usize;
    for id in sub_chunk_ids {
        let n: i64 = stmt.query_row(params![id], |row| row.get(0)).map_err(db_err)?;
        total += usize::try_from(n).unwrap_or(0);
    }
    Ok(total)
}

/// Table names are fixed identifiers from the schema, never caller input.
pub(crate) fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0)).map_err(db_err)
}

// ---------------------------------------------------------------
// Row mapping and error classification
// ---------------------------------------------------------------

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    Ok(Chunk {
        chunk_id: row.get("chunk_id")?,
        pali_text: row.get("pali_text")?,
        token_count: row.get("token_count")?,
        order_idx: row.get("order_idx")?,
    })
}

fn row_to_sub_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubChunk> {
    Ok(SubChunk {
        sub_chunk_id: row.get("sub_chunk_id")?,
        chunk_id: row.get("chunk_id")?,
        pali_text: row.get("pali_text")?,
        token_count: row.get("token_count")?,
        order_idx: row.get("order_idx")?,
    })
}

fn row_to_sentence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sentence> {
    Ok(Sentence {
        sentence_id: row.get("sentence_id")?,
        sub_chunk_id: row.get("sub_chunk_id")?,
        pali_text: row.get("pali_text")?,
        order_idx: row.get("order_idx")?,
    })
}

pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

fn is_foreign_key_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                && (code.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                    || message
                        .as_deref()
                        .is_some_and(|m| m.contains("FOREIGN KEY constraint failed")))
        }
        _ => false,
    }
}

/// Map a write failure onto the integrity taxonomy where possible.
fn classify(err: rusqlite::Error, context: &str) -> Error {
    if is_foreign_key_failure(&err) {
        return Error::ForeignKeyViolation(context.to_string());
    }
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            let message = message.as_deref().unwrap_or_default();
            if code.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || code.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || message.contains("UNIQUE constraint failed")
                || message.contains("PRIMARY KEY constraint failed")
            {
                return Error::ConstraintViolation(format!("{} already exists", context));
            }
        }
    }
    Error::Database(format!("{}: {}", context, err))
}
