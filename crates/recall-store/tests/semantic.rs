//! Integration tests for vector indexing and semantic search
//!
//! All embeddings come from `KeywordEmbedder`, so scores are predictable:
//! a text's vector counts "apple", "banana" and "cherry".


use recall::RecallError;
use recall::types::{IndexMode, PutOp, SearchOp};
use recall::{Store, StoreOptions};
use serde_json::json;
use test_utils::{KeywordEmbedder, file_store, index_config, keys, semantic_store};

// ═══════════════════════════════════════
// RANKING
// ═══════════════════════════════════════

#[tokio::test]
async fn test_semantic_search_ranks_by_similarity() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;
    assert!(store.semantic_search_available());
    assert_eq!(store.dimensions(), Some(4));

    store.put(["docs"], "pie", json!({"text": "apple pie"})).await.unwrap();
    store.put(["docs"], "bread", json!({"text": "banana bread"})).await.unwrap();
    store.put(["docs"], "mix", json!({"text": "apple banana"})).await.unwrap();

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["pie", "mix", "bread"]);

    let scores: Vec<f64> = results.iter().map(|r| r.score.unwrap()).collect();
    assert!(scores[0] > 0.99);
    assert!(scores[0] > scores[1] && scores[1] > scores[2]);
}

#[tokio::test]
async fn test_semantic_search_with_filter_and_prefix() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    store.put(["docs", "en"], "a", json!({"text": "apple", "lang": "en"})).await.unwrap();
    store.put(["docs", "en"], "b", json!({"text": "apple", "lang": "fr"})).await.unwrap();
    store.put(["docs", "fr"], "c", json!({"text": "apple", "lang": "en"})).await.unwrap();

    let results = store
        .search(
            SearchOp::new(["docs", "en"])
                .query("apple")
                .filter(json!({"lang": "en"})),
        )
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a"]);
    assert!(results[0].score.is_some());
}

#[tokio::test]
async fn test_multiple_entries_per_item_keep_best_score() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["title", "tags[*]"]).await;

    store
        .put(["docs"], "x", json!({"title": "banana split", "tags": ["cherry", "apple"]}))
        .await
        .unwrap();
    store
        .put(["docs"], "y", json!({"title": "apple tart", "tags": []}))
        .await
        .unwrap();
    assert_eq!(store.stats().await.unwrap().vector_entries, 4);

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["x", "y"]);
    assert!(results.iter().all(|r| r.score.unwrap() > 0.99));
}

#[tokio::test]
async fn test_deleted_items_leave_no_semantic_hits() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
    store.put(["docs"], "b", json!({"text": "apple banana"})).await.unwrap();
    store.delete(["docs"], "a").await.unwrap();
    store.put(["docs"], "b", serde_json::Value::Null).await.unwrap();

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(store.stats().await.unwrap().vector_entries, 0);
}

// ═══════════════════════════════════════
// OVERFETCH
// ═══════════════════════════════════════

#[tokio::test]
async fn test_overfetch_reaches_pruned_results() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    for i in 0..10 {
        store.put(["noise"], format!("n{i}"), json!({"text": "apple"})).await.unwrap();
    }
    for i in 0..3 {
        store.put(["target"], format!("t{i}"), json!({"text": "cherry"})).await.unwrap();
    }

    // limit 3 fetches 15 candidates, enough to reach all 13 entries
    let results = store
        .search(SearchOp::new(["target"]).query("apple").limit(3))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn test_overfetch_shortfall_returns_fewer_results() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    for i in 0..20 {
        store.put(["noise"], format!("n{i:02}"), json!({"text": "apple"})).await.unwrap();
    }
    store.put(["target"], "t", json!({"text": "cherry"})).await.unwrap();

    // limit 1 fetches 5 candidates, all of them outside the prefix
    let results = store
        .search(SearchOp::new(["target"]).query("apple").limit(1))
        .await
        .unwrap();
    assert!(results.is_empty());

    // a larger page fetches deep enough
    let results = store
        .search(SearchOp::new(["target"]).query("apple").limit(5))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["t"]);
}

// ═══════════════════════════════════════
// BATCHED EMBEDDING
// ═══════════════════════════════════════

#[tokio::test]
async fn test_batch_embeds_each_distinct_text_once() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;
    embedder.reset_counts();

    store
        .batch(vec![
            PutOp::upsert(["docs"], "a", json!({"text": "apple pie"})).into(),
            PutOp::upsert(["docs"], "b", json!({"text": "apple pie"})).into(),
            PutOp::upsert(["docs"], "c", json!({"text": "cherry"})).into(),
            SearchOp::new(["docs"]).query("apple").into(),
            SearchOp::new(["other"]).query("apple").into(),
        ])
        .await
        .unwrap();

    assert_eq!(embedder.document_calls(), 1);
    assert_eq!(embedder.embedded_texts(), vec!["apple pie", "cherry"]);
    assert_eq!(embedder.query_calls(), 1);
    assert_eq!(store.stats().await.unwrap().vector_entries, 3);
}

#[tokio::test]
async fn test_embedding_failure_aborts_batch_without_writes() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;
    store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();

    embedder.set_failing(true);
    let err = store
        .batch(vec![
            PutOp::upsert(["docs"], "a", json!({"text": "banana"})).into(),
            PutOp::upsert(["docs"], "b", json!({"text": "cherry"})).into(),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, RecallError::Embedding(_)));

    let a = store.get(["docs"], "a").await.unwrap().unwrap();
    assert_eq!(a.value, json!({"text": "apple"}));
    assert!(store.get(["docs"], "b").await.unwrap().is_none());

    // semantic search needs the provider too
    assert!(matches!(
        store.search(SearchOp::new(["docs"]).query("apple")).await,
        Err(RecallError::Embedding(_))
    ));

    // writes that skip indexing still work
    store
        .put_with_index(["docs"], "c", json!({"text": "cherry"}), IndexMode::Disabled)
        .await
        .unwrap();
    assert!(store.get(["docs"], "c").await.unwrap().is_some());
}

#[tokio::test]
async fn test_index_disabled_drops_previous_entries() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
    assert_eq!(store.stats().await.unwrap().vector_entries, 1);

    store
        .put_with_index(["docs"], "a", json!({"text": "apple"}), IndexMode::Disabled)
        .await
        .unwrap();
    assert_eq!(store.stats().await.unwrap().vector_entries, 0);

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_dimension_mismatch_is_fatal() {
    let embedder = KeywordEmbedder::new();
    let options = StoreOptions::in_memory().with_index(index_config(&embedder, &[]).dims(8));
    let store = Store::new(options).await.unwrap();
    store.setup().await.unwrap();
    assert_eq!(store.dimensions(), Some(8));

    let err = store.put(["docs"], "a", json!("apple")).await.unwrap_err();
    assert!(matches!(
        err,
        RecallError::DimensionMismatch {
            expected: 8,
            actual: 4
        }
    ));
    assert!(store.get(["docs"], "a").await.unwrap().is_none());
}

// ═══════════════════════════════════════
// SETUP & REBUILDS
// ═══════════════════════════════════════

#[tokio::test]
async fn test_dimensions_learned_lazily_when_probe_fails() {
    let embedder = KeywordEmbedder::new();
    embedder.set_failing(true);
    let store = semantic_store(&embedder, &["text"]).await;
    assert!(!store.semantic_search_available());

    // queries fall back to the filter path without touching the provider
    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert!(results.is_empty());

    embedder.set_failing(false);
    store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
    assert!(store.semantic_search_available());
    assert_eq!(store.dimensions(), Some(4));

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a"]);
    assert!(results[0].score.unwrap() > 0.99);
}

#[tokio::test]
async fn test_provider_change_rebuilds_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let v1 = KeywordEmbedder::with(4, "test:v1");
        let store = file_store(&path, Some(index_config(&v1, &["text"]))).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
        store.put(["docs"], "b", json!({"text": "banana"})).await.unwrap();
        store.put(["docs"], "c", json!({"text": "cherry"})).await.unwrap();
    }

    let v2 = KeywordEmbedder::with(4, "test:v2");
    let store = file_store(&path, Some(index_config(&v2, &["text"]))).await;

    let mut texts = v2.embedded_texts();
    texts.sort();
    assert_eq!(texts, vec!["apple", "banana", "cherry"]);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.vector_entries, 3);
    assert_eq!(stats.provider.as_deref(), Some("test:v2"));

    let results = store
        .search(SearchOp::new(["docs"]).query("banana").limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["b"]);
}

#[tokio::test]
async fn test_failed_rebuild_is_retried_on_next_setup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let v1 = KeywordEmbedder::with(4, "test:v1");
        let store = file_store(&path, Some(index_config(&v1, &["text"]).dims(4))).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
        store.put(["docs"], "b", json!({"text": "banana"})).await.unwrap();
    }

    let v2 = KeywordEmbedder::with(4, "test:v2");
    v2.set_failing(true);
    let options = StoreOptions::file(&path).with_index(index_config(&v2, &["text"]).dims(4));
    let store = Store::new(options).await.unwrap();
    assert!(matches!(store.setup().await, Err(RecallError::Embedding(_))));

    v2.set_failing(false);
    store.setup().await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.items, 2);
    assert_eq!(stats.vector_entries, 2);

    let results = store
        .search(SearchOp::new(["docs"]).query("banana").limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["b"]);
}

#[tokio::test]
async fn test_provider_change_with_failed_probe_rebuilds_on_first_embed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let v1 = KeywordEmbedder::with(4, "test:v1");
        let store = file_store(&path, Some(index_config(&v1, &["text"]))).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
        store.put(["docs"], "b", json!({"text": "banana"})).await.unwrap();
    }

    let v2 = KeywordEmbedder::with(4, "test:v2");
    v2.set_failing(true);
    let store = file_store(&path, Some(index_config(&v2, &["text"]))).await;
    assert!(!store.semantic_search_available());
    assert_eq!(store.stats().await.unwrap().vector_entries, 0);

    v2.set_failing(false);
    store.put(["docs"], "c", json!({"text": "cherry"})).await.unwrap();
    assert_eq!(store.stats().await.unwrap().vector_entries, 3);

    let results = store
        .search(SearchOp::new(["docs"]).query("banana").limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["b"]);
}

#[tokio::test]
async fn test_same_provider_reopen_skips_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let embedder = KeywordEmbedder::new();
        let store = file_store(&path, Some(index_config(&embedder, &["text"]))).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
    }

    let embedder = KeywordEmbedder::new();
    let store = file_store(&path, Some(index_config(&embedder, &["text"]))).await;
    assert_eq!(embedder.document_calls(), 0);
    assert_eq!(embedder.query_calls(), 0);
    assert_eq!(store.dimensions(), Some(4));
    assert_eq!(store.stats().await.unwrap().vector_entries, 1);
}

#[tokio::test]
async fn test_dimension_change_recreates_vector_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let embedder = KeywordEmbedder::with(4, "test:keyword");
        let store = file_store(&path, Some(index_config(&embedder, &["text"]))).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
        store.put(["docs"], "b", json!({"text": "banana"})).await.unwrap();
    }

    let wider = KeywordEmbedder::with(6, "test:keyword");
    let store = file_store(&path, Some(index_config(&wider, &["text"]).dims(6))).await;
    assert_eq!(store.dimensions(), Some(6));
    assert_eq!(store.stats().await.unwrap().vector_entries, 2);

    let results = store
        .search(SearchOp::new(["docs"]).query("apple").limit(1))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a"]);
}

#[tokio::test]
async fn test_reindex_uses_default_fields() {
    let embedder = KeywordEmbedder::new();
    let store = semantic_store(&embedder, &["text"]).await;

    store
        .put_with_index(
            ["docs"],
            "a",
            json!({"text": "apple", "title": "cherry"}),
            IndexMode::Fields(vec!["title".into()]),
        )
        .await
        .unwrap();
    store.put(["docs"], "b", json!({"title": "no text field"})).await.unwrap();

    let before = store
        .search(SearchOp::new(["docs"]).query("cherry"))
        .await
        .unwrap();
    assert!(before[0].score.unwrap() > 0.99);

    let stats = store.reindex().await.unwrap();
    assert_eq!(stats.items, 2);
    assert_eq!(stats.entries, 1);

    let after = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert_eq!(keys(&after), vec!["a"]);
    assert!(after[0].score.unwrap() > 0.99);
}

#[tokio::test]
async fn test_reindex_requires_index() {
    let store = Store::in_memory().await.unwrap();
    assert!(matches!(store.reindex().await, Err(RecallError::Config(_))));
}

#[tokio::test]
async fn test_index_configured_after_items_exist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recall.db");

    {
        let store = file_store(&path, None).await;
        store.put(["docs"], "a", json!({"text": "apple"})).await.unwrap();
    }

    let embedder = KeywordEmbedder::new();
    let store = file_store(&path, Some(index_config(&embedder, &["text"]))).await;
    assert_eq!(store.stats().await.unwrap().vector_entries, 1);

    let results = store
        .search(SearchOp::new(["docs"]).query("apple"))
        .await
        .unwrap();
    assert_eq!(keys(&results), vec!["a"]);
}
