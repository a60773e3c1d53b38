//! CSV export → store → query, end to end with the keyword embedder.

use std::collections::BTreeSet;

use crate::posts::{LoaderOptions, RecordLoader};
use crate::semantic::{IndexBuilder, PostStore, QueryEngine, SearchRequest};
use crate::tests::support::{build_store, post, write_posts_csv, KeywordEmbedder};

const EXPORT: &[&str] = &[
    "101;900;Mette Frederiksen;2024-02-01 09:00:00;12000;https://www.facebook.com/posts/101;;Vi skal investere i sundhed og flere sygeplejersker;DK;Politician",
    "102;900;;2024-02-02 10:00:00;800;https://www.facebook.com/posts/102;;Klimaet kræver grøn omstilling nu;DK;Politician",
    "103;901;;2024-02-03 11:00:00;45;https://www.facebook.com/posts/103;https://www.facebook.com/lars.lokke.rasmussen;Skattelettelser til de laveste lønninger;DK;Politician",
    "104;902;None;2024-02-04 12:00:00;1,200;https://www.facebook.com/posts/104;https://www.facebook.com/people/pia-olsen-dyhr-123456;Grøn omstilling og klima i hele landet;DK;Politician",
    "105;903;;2024-02-05 13:00:00;3;https://www.facebook.com/posts/105;https://www.facebook.com/profile.php?id=42;Ingen kan se hvem jeg er;DK;Politician",
    "106;904;Ole Birk;2024-02-06 14:00:00;70;https://www.facebook.com/posts/106;;   ;DK;Politician",
    "101;900;Mette Frederiksen;2024-02-01 09:00:00;12000;https://www.facebook.com/posts/101;;Gentaget opslag;DK;Politician",
];

fn build(dir: &std::path::Path, embedder: &KeywordEmbedder) -> PostStore {
    let csv = write_posts_csv(dir, EXPORT);
    let store_dir = dir.join("store");
    let loader = RecordLoader::open(&csv, LoaderOptions::default()).unwrap();
    IndexBuilder::new(2).build(&loader, embedder, &store_dir).unwrap();
    PostStore::open(&store_dir, embedder).unwrap()
}

#[test]
fn test_export_is_cleaned_and_indexed() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = KeywordEmbedder::new();
    let store = build(tmp.path(), &embedder);

    let ids: Vec<&str> = store.posts().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["101", "102", "103", "104"]);

    // 102 inherits from its page, 103 and 104 come from the URL slug
    assert_eq!(store.posts()[1].profile, "Mette Frederiksen");
    assert_eq!(store.posts()[2].profile, "Lars Lokke Rasmussen");
    assert_eq!(store.posts()[3].profile, "Pia Olsen Dyhr");
    assert_eq!(store.posts()[3].interactions, 1_200);

    assert!(store.posts().iter().all(|p| !p.text.trim().is_empty()));
    assert!(store.posts().iter().all(|p| !p.profile.trim().is_empty()));
}

#[test]
fn test_rebuild_yields_same_id_set() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = KeywordEmbedder::new();

    let first: BTreeSet<String> = build(tmp.path(), &embedder)
        .posts()
        .iter()
        .map(|p| p.id.clone())
        .collect();
    let second: BTreeSet<String> = build(tmp.path(), &embedder)
        .posts()
        .iter()
        .map(|p| p.id.clone())
        .collect();

    assert_eq!(first, second);
}

#[test]
fn test_result_count_bounded_by_top_k_and_matches() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = KeywordEmbedder::new();
    let store = build(tmp.path(), &embedder);
    let engine = QueryEngine::new(&embedder, &store);

    for top_k in [1, 2, 3, 10] {
        let mut request = SearchRequest::new("grøn omstilling");
        request.top_k = top_k;
        let hits = engine.search(&request).unwrap();
        assert_eq!(hits.len(), top_k.min(store.len()));
    }

    let mut request = SearchRequest::new("klima");
    request.top_k = 10;
    request.profile = Some("Mette Frederiksen".to_string());
    let hits = engine.search(&request).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.post.profile == "Mette Frederiksen"));

    request.profile = Some("Ukendt Person".to_string());
    assert!(engine.search(&request).unwrap().is_empty());
}

#[test]
fn test_scores_are_sorted_and_bounded() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = KeywordEmbedder::new();
    let store = build(tmp.path(), &embedder);
    let engine = QueryEngine::new(&embedder, &store);

    for boost in [false, true] {
        let mut request = SearchRequest::new("Grøn omstilling og klima i hele landet");
        request.top_k = 4;
        request.boost_interactions = boost;
        let hits = engine.search(&request).unwrap();

        assert_eq!(hits[0].post.id, "104");
        for pair in hits.windows(2) {
            assert!(pair[0].score() >= pair[1].score());
        }
        for hit in &hits {
            assert!((0.0..=1.0).contains(&hit.similarity));
            assert_eq!(hit.hybrid_score.is_some(), boost);
        }
    }
}

#[test]
fn test_min_interactions_above_all_records_returns_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("store");
    let embedder = KeywordEmbedder::new();
    build_store(
        &dir,
        &embedder,
        &[
            post("1", "A", "klima politik", 100),
            post("2", "A", "sundhedsreform", 5_000),
        ],
    );
    let store = PostStore::open(&dir, &embedder).unwrap();

    let mut request = SearchRequest::new("sundhed");
    request.min_interactions = Some(10_000);
    let hits = QueryEngine::new(&embedder, &store).search(&request).unwrap();
    assert!(hits.is_empty());

    request.min_interactions = Some(5_000);
    let hits = QueryEngine::new(&embedder, &store).search(&request).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.post.id.as_str()).collect();
    assert_eq!(ids, vec!["2"]);
}

#[test]
fn test_boost_flips_near_equal_candidates() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("store");

    // query on axis 0; "quiet" sits slightly closer than "viral"
    let mut query = vec![0.0; 256];
    query[0] = 1.0;
    let mut quiet = vec![0.0; 256];
    quiet[0] = 1.0;
    quiet[1] = 0.10;
    let mut viral = vec![0.0; 256];
    viral[0] = 1.0;
    viral[1] = 0.15;

    let embedder = KeywordEmbedder::new()
        .with_vector("trafik", query)
        .with_vector("stille opslag om trafik", quiet)
        .with_vector("viralt opslag om trafik", viral);
    build_store(
        &dir,
        &embedder,
        &[
            post("quiet", "A", "stille opslag om trafik", 4),
            post("viral", "B", "viralt opslag om trafik", 25_000),
        ],
    );
    let store = PostStore::open(&dir, &embedder).unwrap();
    let engine = QueryEngine::new(&embedder, &store);

    let mut request = SearchRequest::new("trafik");
    request.top_k = 2;
    let plain = engine.search(&request).unwrap();
    assert_eq!(plain[0].post.id, "quiet");
    assert!(plain[0].similarity > plain[1].similarity);

    request.boost_interactions = true;
    let boosted = engine.search(&request).unwrap();
    assert_eq!(boosted[0].post.id, "viral");
    assert!(boosted[0].hybrid_score.unwrap() >= boosted[1].hybrid_score.unwrap());
}

#[test]
fn test_boost_oversamples_before_truncating() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("store");

    let mut query = vec![0.0; 256];
    query[0] = 1.0;
    let close = |tilt: f32| {
        let mut v = vec![0.0; 256];
        v[0] = 1.0;
        v[1] = tilt;
        v
    };

    let embedder = KeywordEmbedder::new()
        .with_vector("vej", query)
        .with_vector("a", close(0.01))
        .with_vector("b", close(0.02))
        .with_vector("c", close(0.03));
    build_store(
        &dir,
        &embedder,
        &[post("a", "A", "a", 1), post("b", "A", "b", 2), post("c", "A", "c", 90_000)],
    );
    let store = PostStore::open(&dir, &embedder).unwrap();

    // top_k 1 without boost only sees "a"; with boost the pool of 3 holds "c"
    let mut request = SearchRequest::new("vej");
    request.top_k = 1;
    request.boost_interactions = true;
    let hits = QueryEngine::new(&embedder, &store).search(&request).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].post.id, "c");
}
