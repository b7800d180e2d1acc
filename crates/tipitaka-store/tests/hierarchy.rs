//! End-to-end behaviour of the Chunk → SubChunk → Sentence hierarchy
//! through the public store API, on an on-disk database.

use tempfile::TempDir;
use tipitaka_core::{CorpusConfig, Error};
use tipitaka_store::{
    audit, Chunk, ChunkTree, CorpusBatch, CorpusStore, Sentence, SubChunk, SubChunkTree,
};

fn open_store() -> (CorpusStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = CorpusConfig::new(dir.path()).unwrap();
    let store = CorpusStore::open_with_config(&config).unwrap();
    (store, dir)
}

/// Build a tree with `subs` sub-chunks of `sents` sentences each, ids in the
/// `chunk_000001` / `sc_000001_001` / `s_000001_001_001` scheme.
fn make_tree(chunk_idx: i64, subs: i64, sents: i64) -> ChunkTree {
    let chunk_id = format!("chunk_{:06}", chunk_idx);
    let sub_chunks = (1..=subs)
        .map(|si| {
            let sub_chunk_id = format!("sc_{:06}_{:03}", chunk_idx, si);
            let sentences = (1..=sents)
                .map(|ti| Sentence {
                    sentence_id: format!("s_{:06}_{:03}_{:03}", chunk_idx, si, ti),
                    sub_chunk_id: sub_chunk_id.clone(),
                    pali_text: format!("Vākya {}.", ti),
                    order_idx: ti,
                })
                .collect();
            SubChunkTree {
                sub_chunk: SubChunk {
                    sub_chunk_id,
                    chunk_id: chunk_id.clone(),
                    pali_text: format!("Khaṇḍa {}", si),
                    token_count: 2,
                    order_idx: si,
                },
                sentences,
            }
        })
        .collect();
    ChunkTree {
        chunk: Chunk {
            chunk_id,
            pali_text: "Mūla".into(),
            token_count: 2 * subs,
            order_idx: chunk_idx,
        },
        sub_chunks,
    }
}

#[test]
fn dn1_cascade_scenario() {
    let (store, _dir) = open_store();
    store
        .create_chunk(&Chunk {
            chunk_id: "dn1".into(),
            pali_text: "Brahmajālasutta".into(),
            token_count: 1,
            order_idx: 0,
        })
        .unwrap();
    for (id, order_idx) in [("dn1.1", 0), ("dn1.2", 1)] {
        store
            .create_sub_chunk(&SubChunk {
                sub_chunk_id: id.into(),
                chunk_id: "dn1".into(),
                pali_text: id.into(),
                token_count: 1,
                order_idx,
            })
            .unwrap();
    }
    for (id, order_idx) in [("dn1.1.s1", 0), ("dn1.1.s2", 1)] {
        store
            .create_sentence(&Sentence {
                sentence_id: id.into(),
                sub_chunk_id: "dn1.1".into(),
                pali_text: id.into(),
                order_idx,
            })
            .unwrap();
    }

    let former_sub_chunks: Vec<String> = store
        .list_sub_chunks("dn1")
        .unwrap()
        .into_iter()
        .map(|sc| sc.sub_chunk_id)
        .collect();
    assert_eq!(former_sub_chunks, vec!["dn1.1", "dn1.2"]);

    store.delete_chunk("dn1").unwrap();

    assert!(store.list_sub_chunks("dn1").unwrap().is_empty());
    for id in &former_sub_chunks {
        assert!(store.list_sentences(id).unwrap().is_empty());
    }
    assert_eq!(store.count_sub_chunks().unwrap(), 0);
    assert_eq!(store.count_sentences().unwrap(), 0);
}

#[test]
fn sentence_with_missing_sub_chunk_is_rejected() {
    let (store, _dir) = open_store();
    store.insert_tree(&make_tree(1, 1, 2)).unwrap();
    let before = store.count_sentences().unwrap();

    let err = store
        .create_sentence(&Sentence {
            sentence_id: "x.s1".into(),
            sub_chunk_id: "x".into(),
            pali_text: "Itipi so bhagavā.".into(),
            order_idx: 0,
        })
        .unwrap_err();

    assert!(matches!(err, Error::ForeignKeyViolation(_)));
    assert!(err.is_integrity());
    assert_eq!(store.count_sentences().unwrap(), before);
}

#[test]
fn round_trip_reproduces_ordered_sequences() {
    let (store, _dir) = open_store();
    let trees: Vec<ChunkTree> = (1..=3).map(|i| make_tree(i, 4, 3)).collect();

    // One batch for the whole corpus, sentences first
    let mut batch = CorpusBatch::default();
    for tree in trees.iter().rev() {
        batch.push_tree(tree);
    }
    batch.sentences.reverse();
    let report = store.insert_batch(&batch).unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.sub_chunks, 12);
    assert_eq!(report.sentences, 36);

    for tree in &trees {
        let listed = store.list_sub_chunks(&tree.chunk.chunk_id).unwrap();
        let expected: Vec<SubChunk> = tree.sub_chunks.iter().map(|s| s.sub_chunk.clone()).collect();
        assert_eq!(listed, expected);

        for sc in &tree.sub_chunks {
            assert_eq!(
                store.list_sentences(&sc.sub_chunk.sub_chunk_id).unwrap(),
                sc.sentences
            );
        }
        assert_eq!(store.load_tree(&tree.chunk.chunk_id).unwrap().as_ref(), Some(tree));
    }

    let ordered: Vec<String> = store
        .list_chunks()
        .unwrap()
        .into_iter()
        .map(|c| c.chunk_id)
        .collect();
    assert_eq!(ordered, vec!["chunk_000001", "chunk_000002", "chunk_000003"]);

    let report = audit(&store).unwrap();
    assert!(report.is_healthy());
    assert!(report.warnings.is_empty());
}

#[test]
fn failed_tree_insert_leaves_no_rows() {
    let (store, _dir) = open_store();
    let mut tree = make_tree(7, 2, 2);
    tree.sub_chunks[1].sentences[0].sub_chunk_id = "sc_missing".into();

    let err = store.insert_tree(&tree).unwrap_err();
    assert!(matches!(err, Error::ForeignKeyViolation(_)));
    assert_eq!(store.count_chunks().unwrap(), 0);
    assert_eq!(store.count_sub_chunks().unwrap(), 0);
    assert_eq!(store.count_sentences().unwrap(), 0);
}

#[test]
fn wide_rows_cover_every_sentence() {
    let (store, _dir) = open_store();
    store.insert_tree(&make_tree(1, 2, 3)).unwrap();
    store.insert_tree(&make_tree(2, 1, 1)).unwrap();

    let rows = store.wide_rows(None).unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0].sentence_id.as_deref(), Some("s_000001_001_001"));
    assert_eq!(rows[6].chunk_id, "chunk_000002");
    assert_eq!(rows[3].sub_chunk_text, "Khaṇḍa 2");
}
