//! Database schema SQL for the three-level corpus hierarchy.

/// Connection pragmas. `foreign_keys` must be on for cascades and parent checks.
pub const PRAGMAS_SQL: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA synchronous = NORMAL;
"#;

/// Core tables: Chunk, SubChunk, Sentence, plus the ordered child-lookup indexes.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS Chunk (
  chunk_id      TEXT PRIMARY KEY,
  pali_text     TEXT NOT NULL,
  token_count   INTEGER NOT NULL,
  order_idx     INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS SubChunk (
  sub_chunk_id  TEXT PRIMARY KEY,
  chunk_id      TEXT NOT NULL,
  pali_text     TEXT NOT NULL,
  token_count   INTEGER NOT NULL,
  order_idx     INTEGER NOT NULL,
  FOREIGN KEY (chunk_id) REFERENCES Chunk(chunk_id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS Sentence (
  sentence_id   TEXT PRIMARY KEY,
  sub_chunk_id  TEXT NOT NULL,
  pali_text     TEXT NOT NULL,
  order_idx     INTEGER NOT NULL,
  FOREIGN KEY (sub_chunk_id) REFERENCES SubChunk(sub_chunk_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_subchunk_chunk ON SubChunk(chunk_id, order_idx);
CREATE INDEX IF NOT EXISTS idx_sentence_subchunk ON Sentence(sub_chunk_id, order_idx);
"#;

/// Tables and the columns each must carry.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("Chunk", &["chunk_id", "pali_text", "token_count", "order_idx"]),
    (
        "SubChunk",
        &["sub_chunk_id", "chunk_id", "pali_text", "token_count", "order_idx"],
    ),
    (
        "Sentence",
        &["sentence_id", "sub_chunk_id", "pali_text", "order_idx"],
    ),
];

/// Secondary indexes required for ordered child lookup.
pub const REQUIRED_INDEXES: &[&str] = &["idx_subchunk_chunk", "idx_sentence_subchunk"];

/// Primary key column of each table.
pub const REQUIRED_PRIMARY_KEYS: &[(&str, &str)] = &[
    ("Chunk", "chunk_id"),
    ("SubChunk", "sub_chunk_id"),
    ("Sentence", "sentence_id"),
];

/// Parent references as (child table, column, parent table). All cascade on delete.
pub const REQUIRED_FOREIGN_KEYS: &[(&str, &str, &str)] = &[
    ("SubChunk", "chunk_id", "Chunk"),
    ("Sentence", "sub_chunk_id", "SubChunk"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
                 AND name IN ('Chunk', 'SubChunk', 'Sentence')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);

        for index in REQUIRED_INDEXES {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1",
                    [index],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(found, 1, "missing index {}", index);
        }
    }

    #[test]
    fn test_sub_chunk_lookup_uses_compound_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let mut stmt = conn
            .prepare(
                "EXPLAIN QUERY PLAN SELECT * FROM SubChunk WHERE chunk_id = ?1 ORDER BY order_idx",
            )
            .unwrap();
        let plan: Vec<String> = stmt
            .query_map(["dn1"], |row| row.get::<_, String>(3))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(plan.iter().any(|d| d.contains("idx_subchunk_chunk")));
    }
}
