use localrag_core::config::EmbeddingSettings;
use localrag_core::memory::cosine_distance;
use localrag_embed::{get_default_embedder, HashEmbedder};
use localrag_core::traits::Embedder;

#[test]
fn fake_embedder_shapes_and_determinism() {
    let settings = EmbeddingSettings { use_fake: true, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), 1024, "embedding dim follows settings");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn disjoint_vocabularies_are_far_apart() {
    let embedder = HashEmbedder::new(256);
    let a = embedder.embed("how do solar panels work").expect("embed");
    let b = embedder.embed("recipe for sourdough bread").expect("embed");
    let same = embedder.embed("How do solar panels work").expect("embed");
    assert!(cosine_distance(&a, &same) < 1e-4, "case-insensitive tokens");
    assert!(cosine_distance(&a, &b) > 0.5);
}
