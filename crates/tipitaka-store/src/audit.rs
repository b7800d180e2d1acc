//! Corpus audit: schema conformance plus data-quality checks.
//!
//! Errors mean the database breaks the schema contract (missing tables or
//! indexes, wrong keys, parent references that do not cascade, or rows that
//! fail `PRAGMA foreign_key_check`). Warnings are data-quality findings the
//! schema tolerates: duplicate sibling `order_idx` and sub-chunk token sums
//! that disagree with their chunk.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::schema::{
    REQUIRED_COLUMNS, REQUIRED_FOREIGN_KEYS, REQUIRED_INDEXES, REQUIRED_PRIMARY_KEYS,
};
use crate::sqlite::{count_rows, db_err, CorpusStore};
use tipitaka_core::Result;

/// Siblings sharing one `order_idx` under the same parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCollision {
    /// `SubChunk` or `Sentence`.
    pub table: String,
    pub parent_id: String,
    pub order_idx: i64,
    pub siblings: i64,
}

/// A chunk whose sub-chunk token counts do not add up to its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMismatch {
    pub chunk_id: String,
    pub chunk_tokens: i64,
    pub sub_chunk_tokens: i64,
}

/// Result of auditing a corpus database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub schema_valid: bool,
    pub chunks: i64,
    pub sub_chunks: i64,
    pub sentences: i64,
    pub chunks_without_sub_chunks: i64,
    pub sub_chunks_without_sentences: i64,
    pub order_collisions: Vec<OrderCollision>,
    pub token_mismatches: Vec<TokenMismatch>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.schema_valid && self.errors.is_empty()
    }
}

/// Audit the database behind an open store.
pub fn audit(store: &CorpusStore) -> Result<AuditReport> {
    store.with_conn(audit_connection)
}

/// Audit any connection, e.g. a read-only handle on a database built elsewhere.
pub fn audit_connection(conn: &Connection) -> Result<AuditReport> {
    let mut report = AuditReport::default();

    check_schema(conn, &mut report)?;
    if !report.errors.is_empty() {
        return Ok(report);
    }
    report.schema_valid = true;

    report.chunks = count_rows(conn, "Chunk")?;
    report.sub_chunks = count_rows(conn, "SubChunk")?;
    report.sentences = count_rows(conn, "Sentence")?;

    check_foreign_keys(conn, &mut report)?;

    report.chunks_without_sub_chunks = conn
        .query_row(
            "SELECT COUNT(*) FROM Chunk c WHERE NOT EXISTS \
             (SELECT 1 FROM SubChunk s WHERE s.chunk_id = c.chunk_id)",
            [],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    report.sub_chunks_without_sentences = conn
        .query_row(
            "SELECT COUNT(*) FROM SubChunk s WHERE NOT EXISTS \
             (SELECT 1 FROM Sentence t WHERE t.sub_chunk_id = s.sub_chunk_id)",
            [],
            |row| row.get(0),
        )
        .map_err(db_err)?;

    report.order_collisions = find_order_collisions(conn, "SubChunk", "chunk_id")?;
    report
        .order_collisions
        .extend(find_order_collisions(conn, "Sentence", "sub_chunk_id")?);
    for c in &report.order_collisions {
        report.warnings.push(format!(
            "{} siblings of {} share order_idx {} in {}",
            c.siblings, c.parent_id, c.order_idx, c.table
        ));
    }

    report.token_mismatches = find_token_mismatches(conn)?;
    for m in &report.token_mismatches {
        report.warnings.push(format!(
            "chunk {} has token_count {} but its sub-chunks sum to {}",
            m.chunk_id, m.chunk_tokens, m.sub_chunk_tokens
        ));
    }

    if report.errors.is_empty() && report.warnings.is_empty() {
        info!(
            "Audit clean: {} chunks, {} sub-chunks, {} sentences",
            report.chunks, report.sub_chunks, report.sentences
        );
    } else {
        warn!(
            "Audit found {} errors and {} warnings",
            report.errors.len(),
            report.warnings.len()
        );
    }
    Ok(report)
}

fn check_schema(conn: &Connection, report: &mut AuditReport) -> Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        if !sqlite_object_exists(conn, "table", table)? {
            report.errors.push(format!("Missing required table: {}", table));
            continue;
        }
        let present = column_names(conn, table)?;
        for col in columns.iter() {
            if !present.iter().any(|p| p == col) {
                report
                    .errors
                    .push(format!("{} table missing column: {}", table, col));
            }
        }
    }
    for index in REQUIRED_INDEXES {
        if !sqlite_object_exists(conn, "index", index)? {
            report.errors.push(format!("Missing required index: {}", index));
        }
    }
    for (table, column) in REQUIRED_PRIMARY_KEYS {
        if !sqlite_object_exists(conn, "table", table)? {
            continue;
        }
        let pk = primary_key_columns(conn, table)?;
        if pk != [*column] {
            report.errors.push(format!(
                "{} primary key is ({}), expected ({})",
                table,
                pk.join(", "),
                column
            ));
        }
    }
    for (table, column, parent) in REQUIRED_FOREIGN_KEYS {
        if !sqlite_object_exists(conn, "table", table)? {
            continue;
        }
        let found = foreign_keys(conn, table)?
            .into_iter()
            .find(|fk| fk.from == *column && fk.parent == *parent);
        match found {
            None => report.errors.push(format!(
                "{}.{} has no foreign key to {}",
                table, column, parent
            )),
            Some(fk) if !fk.on_delete.eq_ignore_ascii_case("CASCADE") => {
                report.errors.push(format!(
                    "{}.{} foreign key to {} does not cascade on delete (ON DELETE {})",
                    table, column, parent, fk.on_delete
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

struct ForeignKey {
    parent: String,
    from: String,
    on_delete: String,
}

fn foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn
        .prepare("SELECT \"table\", \"from\", on_delete FROM pragma_foreign_key_list(?1)")
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![table], |row| {
            Ok(ForeignKey {
                parent: row.get(0)?,
                from: row.get(1)?,
                on_delete: row.get(2)?,
            })
        })
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn primary_key_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

/// Rows whose parent is missing; only possible if they were written with enforcement off.
fn check_foreign_keys(conn: &Connection, report: &mut AuditReport) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "SELECT \"table\", parent, COUNT(*) FROM pragma_foreign_key_check \
             GROUP BY \"table\", parent ORDER BY \"table\"",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(db_err)?;
    for row in rows {
        let (table, parent, count) = row.map_err(db_err)?;
        report.errors.push(format!(
            "{} {} rows reference a missing {}",
            count, table, parent
        ));
    }
    Ok(())
}

/// `table` and `parent_col` are fixed schema identifiers.
fn find_order_collisions(
    conn: &Connection,
    table: &str,
    parent_col: &str,
) -> Result<Vec<OrderCollision>> {
    let sql = format!(
        "SELECT {parent}, order_idx, COUNT(*) FROM {table} \
         GROUP BY {parent}, order_idx HAVING COUNT(*) > 1 \
         ORDER BY {parent}, order_idx",
        parent = parent_col,
        table = table
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(OrderCollision {
                table: table.to_string(),
                parent_id: row.get(0)?,
                order_idx: row.get(1)?,
                siblings: row.get(2)?,
            })
        })
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn find_token_mismatches(conn: &Connection) -> Result<Vec<TokenMismatch>> {
    let mut stmt = conn
        .prepare(
            "SELECT c.chunk_id, c.token_count, SUM(s.token_count) AS sub_tokens \
             FROM Chunk c JOIN SubChunk s ON s.chunk_id = c.chunk_id \
             GROUP BY c.chunk_id \
             HAVING c.token_count != SUM(s.token_count) \
             ORDER BY c.order_idx, c.chunk_id",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(TokenMismatch {
                chunk_id: row.get(0)?,
                chunk_tokens: row.get(1)?,
                sub_chunk_tokens: row.get(2)?,
            })
        })
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

fn sqlite_object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
            params![kind, name],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(count > 0)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .map_err(db_err)?;
    let rows = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))
        .map_err(db_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, Sentence, SubChunk};
    use tipitaka_core::OrderPolicy;

    fn store_with(chunk_tokens: i64, sub_tokens: &[(&str, i64, i64)]) -> CorpusStore {
        let store = CorpusStore::open_in_memory(OrderPolicy::Tolerate).unwrap();
        store
            .create_chunk(&Chunk {
                chunk_id: "chunk_000001".into(),
                pali_text: "Namo tassa".into(),
                token_count: chunk_tokens,
                order_idx: 1,
            })
            .unwrap();
        for (id, tokens, order_idx) in sub_tokens {
            store
                .create_sub_chunk(&SubChunk {
                    sub_chunk_id: (*id).into(),
                    chunk_id: "chunk_000001".into(),
                    pali_text: "Namo".into(),
                    token_count: *tokens,
                    order_idx: *order_idx,
                })
                .unwrap();
        }
        store
    }

    #[test]
    fn test_clean_corpus() {
        let store = store_with(400, &[("sc_000001_001", 200, 1), ("sc_000001_002", 200, 2)]);
        store
            .create_sentence(&Sentence {
                sentence_id: "s_000001_001_001".into(),
                sub_chunk_id: "sc_000001_001".into(),
                pali_text: "Namo tassa.".into(),
                order_idx: 1,
            })
            .unwrap();

        let report = audit(&store).unwrap();
        assert!(report.is_healthy());
        assert!(report.warnings.is_empty());
        assert_eq!(report.chunks, 1);
        assert_eq!(report.sub_chunks, 2);
        assert_eq!(report.sentences, 1);
        assert_eq!(report.chunks_without_sub_chunks, 0);
        assert_eq!(report.sub_chunks_without_sentences, 1);
    }

    #[test]
    fn test_duplicate_sibling_order_is_warning() {
        let store = store_with(400, &[("sc_000001_001", 200, 1), ("sc_000001_002", 200, 1)]);

        let report = audit(&store).unwrap();
        assert!(report.is_healthy());
        assert_eq!(
            report.order_collisions,
            vec![OrderCollision {
                table: "SubChunk".into(),
                parent_id: "chunk_000001".into(),
                order_idx: 1,
                siblings: 2,
            }]
        );
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_token_sum_mismatch_is_warning() {
        let store = store_with(500, &[("sc_000001_001", 200, 1), ("sc_000001_002", 200, 2)]);

        let report = audit(&store).unwrap();
        assert!(report.is_healthy());
        assert_eq!(
            report.token_mismatches,
            vec![TokenMismatch {
                chunk_id: "chunk_000001".into(),
                chunk_tokens: 500,
                sub_chunk_tokens: 400,
            }]
        );
    }

    #[test]
    fn test_chunk_without_sub_chunks_is_not_a_mismatch() {
        let store = store_with(8000, &[]);

        let report = audit(&store).unwrap();
        assert!(report.token_mismatches.is_empty());
        assert_eq!(report.chunks_without_sub_chunks, 1);
    }

    #[test]
    fn test_orphans_written_without_enforcement_are_errors() {
        let store = store_with(200, &[("sc_000001_001", 200, 1)]);
        store
            .with_conn(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = OFF;
                     INSERT INTO Sentence (sentence_id, sub_chunk_id, pali_text, order_idx)
                     VALUES ('s_x', 'sc_missing', 'orphan', 1);
                     PRAGMA foreign_keys = ON;",
                )
                .map_err(db_err)
            })
            .unwrap();

        let report = audit(&store).unwrap();
        assert!(!report.is_healthy());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Sentence"));
    }

    const CHUNK_AND_INDEXES: &str = "CREATE TABLE Chunk (
           chunk_id TEXT PRIMARY KEY, pali_text TEXT NOT NULL,
           token_count INTEGER NOT NULL, order_idx INTEGER NOT NULL);
         CREATE INDEX idx_subchunk_chunk ON SubChunk(chunk_id, order_idx);
         CREATE INDEX idx_sentence_subchunk ON Sentence(sub_chunk_id, order_idx);";

    fn conn_with_children(sub_chunk_fk: &str, sentence_fk: &str) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            "CREATE TABLE SubChunk (
               sub_chunk_id TEXT PRIMARY KEY, chunk_id TEXT NOT NULL{},
               pali_text TEXT NOT NULL, token_count INTEGER NOT NULL,
               order_idx INTEGER NOT NULL);
             CREATE TABLE Sentence (
               sentence_id TEXT PRIMARY KEY, sub_chunk_id TEXT NOT NULL{},
               pali_text TEXT NOT NULL, order_idx INTEGER NOT NULL);
             {}",
            sub_chunk_fk, sentence_fk, CHUNK_AND_INDEXES
        ))
        .unwrap();
        conn
    }

    #[test]
    fn test_tables_without_foreign_keys_are_invalid() {
        let conn = conn_with_children("", "");

        let report = audit_connection(&conn).unwrap();
        assert!(!report.schema_valid);
        assert!(!report.is_healthy());
        assert!(report
            .errors
            .iter()
            .any(|e| e == "SubChunk.chunk_id has no foreign key to Chunk"));
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Sentence.sub_chunk_id has no foreign key to SubChunk"));
    }

    #[test]
    fn test_foreign_key_without_cascade_is_invalid() {
        let conn = conn_with_children(
            " REFERENCES Chunk(chunk_id)",
            " REFERENCES SubChunk(sub_chunk_id) ON DELETE CASCADE",
        );

        let report = audit_connection(&conn).unwrap();
        assert!(!report.schema_valid);
        assert_eq!(
            report.errors,
            vec!["SubChunk.chunk_id foreign key to Chunk does not cascade on delete \
                  (ON DELETE NO ACTION)"
                .to_string()]
        );
    }

    #[test]
    fn test_wrong_primary_key_is_invalid() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(crate::schema::SCHEMA_SQL).unwrap();
        conn.execute_batch(
            "DROP TABLE Sentence;
             CREATE TABLE Sentence (
               sentence_id TEXT NOT NULL,
               sub_chunk_id TEXT NOT NULL
                 REFERENCES SubChunk(sub_chunk_id) ON DELETE CASCADE,
               pali_text TEXT NOT NULL, order_idx INTEGER NOT NULL);
             CREATE INDEX idx_sentence_subchunk ON Sentence(sub_chunk_id, order_idx);",
        )
        .unwrap();

        let report = audit_connection(&conn).unwrap();
        assert_eq!(
            report.errors,
            vec!["Sentence primary key is (), expected (sentence_id)".to_string()]
        );
    }

    #[test]
    fn test_missing_schema_objects() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Chunk (chunk_id TEXT PRIMARY KEY, pali_text TEXT NOT NULL);",
        )
        .unwrap();

        let report = audit_connection(&conn).unwrap();
        assert!(!report.schema_valid);
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Chunk table missing column: token_count"));
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Missing required table: SubChunk"));
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Missing required index: idx_sentence_subchunk"));
    }
}
