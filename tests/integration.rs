//! End-to-end pipeline tests: corpus ingestion, embedding, index build, and
//! statute resolution against a temporary store.

use statute_kg_search::config::Config;
use statute_kg_search::embedding::HashingEmbedder;
use statute_kg_search::graph::GraphStore;
use statute_kg_search::ingestion::IngestionPipeline;
use statute_kg_search::search::RetrievalEngine;
use statute_kg_search::vector::METADATA_FILE;
use std::sync::Arc;

const STATUTES: &str = concat!(
    "第 184 條\n",
    "因故意或過失，不法侵害他人之權利者，負損害賠償責任。\n",
    "口語化解釋: 故意或不小心害別人受損，就要賠償。\n",
    "\"\"\"\n",
    "第 191-2 條\n",
    "汽車、機車或其他非依軌道行駛之動力車輛，在使用中加損害於他人者，駕駛人應賠償因此所生之損害。\n",
    "口語化解釋: 開車或騎車撞傷別人，駕駛要賠償。\n",
    "\"\"\"\n",
    "第 193 條\n",
    "不法侵害他人之身體或健康者，對於被害人因此喪失或減少勞動能力時，應負損害賠償責任。\n",
    "口語化解釋: 害人受傷導致不能工作，要賠償損失。",
);

const CASES: &str = concat!(
    "\"一、被告於民國105年4月12日駕駛自小客車，疏未注意車前狀況，自後追撞原告駕駛之車輛，致原告受有頸部挫傷之傷害。",
    "二、按民法第184條第1項前段及第191條之2前段定有明文，被告應負損害賠償責任。",
    "（一）醫療費用190元。（二）車輛修復費用181,144元。\"\n",
    "\"一、被告騎乘機車行經路口，未禮讓行人，撞及徒步穿越馬路之原告，致原告受有右腿骨折之傷害，喪失工作能力三個月。",
    "二、依民法第184條及第193條規定請求賠償。",
    "（一）看護費用60,000元。\"",
);

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    store: Arc<GraphStore>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.db_path = dir.path().join("graph.db");
    config.vector.index_dir = dir.path().join("index");
    config.vector.dimension = 64;

    let store = Arc::new(GraphStore::open(&config.storage).await.unwrap());
    Fixture {
        _dir: dir,
        config,
        store,
    }
}

async fn ingest_and_embed(fx: &Fixture) {
    let pipeline = IngestionPipeline::new(&fx.config.ingestion, fx.store.clone());
    pipeline.ingest(STATUTES, CASES).await.unwrap();
    let embedder = HashingEmbedder::new(fx.config.vector.dimension);
    pipeline.apply_embeddings(&embedder).await.unwrap();
}

fn engine(fx: &Fixture) -> RetrievalEngine {
    let embedder = Arc::new(HashingEmbedder::new(fx.config.vector.dimension));
    RetrievalEngine::new(fx.store.clone(), embedder, &fx.config)
}

#[tokio::test]
async fn known_fact_text_resolves_to_its_cited_statutes() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;
    let engine = engine(&fx);

    // Query with the first case's own fact narrative, so the nearest fact is
    // Fact1 at distance zero and k=1 isolates its statutes.
    let statutes = engine
        .resolve_statutes(
            "被告於民國105年4月12日駕駛自小客車，疏未注意車前狀況，自後追撞原告駕駛之車輛，致原告受有頸部挫傷之傷害。",
            "",
            Some(1),
        )
        .await
        .unwrap();

    assert_eq!(
        statutes,
        vec!["民法第184條".to_string(), "民法第191-2條".to_string()]
    );
}

#[tokio::test]
async fn union_over_multiple_facts_is_sorted_and_deduplicated() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;
    let engine = engine(&fx);

    // k=5 with only two indexed facts consults both cases; 民法第184條 is
    // cited by both and must appear once.
    let statutes = engine
        .resolve_statutes("被告駕車撞及原告", "原告受有傷害", Some(5))
        .await
        .unwrap();

    assert_eq!(
        statutes,
        vec![
            "民法第184條".to_string(),
            "民法第191-2條".to_string(),
            "民法第193條".to_string()
        ]
    );
}

#[tokio::test]
async fn resolution_is_deterministic() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;
    let engine = engine(&fx);

    let first = engine
        .resolve_statutes("原告遭機車撞及受傷", "右腿骨折", None)
        .await
        .unwrap();
    let second = engine
        .resolve_statutes("原告遭機車撞及受傷", "右腿骨折", None)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_store_resolves_to_empty_list() {
    let fx = fixture().await;
    let engine = engine(&fx);

    let statutes = engine
        .resolve_statutes("任何描述", "任何傷害", None)
        .await
        .unwrap();
    assert!(statutes.is_empty());
}

#[tokio::test]
async fn corrupt_index_snapshot_self_heals() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;

    let before = engine(&fx)
        .resolve_statutes("被告駕車追撞原告", "頸部挫傷", Some(1))
        .await
        .unwrap();

    // Truncate the persisted side-table so it disagrees with the ANN
    // structure; a fresh engine must rebuild and answer identically.
    let meta_path = fx.config.vector.index_dir.join(METADATA_FILE);
    assert!(meta_path.exists());
    std::fs::write(&meta_path, b"garbage").unwrap();

    let after = engine(&fx)
        .resolve_statutes("被告駕車追撞原告", "頸部挫傷", Some(1))
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn drafting_payload_carries_explanations_and_user_text() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;
    let engine = engine(&fx);

    let payload = engine
        .drafting_payload(
            "被告騎乘機車未禮讓行人，撞及穿越馬路之原告",
            "右腿骨折，喪失工作能力三個月",
            "醫療費用與看護費用共計70,000元",
            Some(1),
        )
        .await
        .unwrap();

    assert_eq!(payload.injury_text, "右腿骨折，喪失工作能力三個月");
    assert!(!payload.resolved_statutes.is_empty());
    for statute in &payload.resolved_statutes {
        assert!(statute.id.starts_with("民法第"));
        assert!(!statute.text.is_empty());
        assert!(statute.explanation.is_some());
    }
}

#[tokio::test]
async fn double_ingestion_then_query_is_stable() {
    let fx = fixture().await;
    ingest_and_embed(&fx).await;
    let first = engine(&fx)
        .resolve_statutes("被告駕車追撞原告", "", Some(1))
        .await
        .unwrap();

    // Re-ingest, re-embed, and force an index rebuild
    ingest_and_embed(&fx).await;
    let engine = engine(&fx);
    engine.invalidate_index().unwrap();
    let second = engine
        .resolve_statutes("被告駕車追撞原告", "", Some(1))
        .await
        .unwrap();

    assert_eq!(first, second);
}
