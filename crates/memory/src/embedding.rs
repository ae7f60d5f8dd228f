//! Deterministic fallback embedding and vector helpers.
//!
//! When no embedding provider is configured every memory is embedded with a
//! hash-bucketed, L2-normalised bag of tokens.  Tokens are hashed with SHA-256
//! so the same text maps to the same vector in every process and on every
//! platform, independent of call order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Vector length used when the caller does not ask for one.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// An async text → vector function.  Stored as an `Arc` so it can be cloned
/// across stages; the returned future is `Send + 'static` so it can be
/// `.await`ed from any task.
pub type EmbedFn = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<f64>>> + Send>>
        + Send
        + Sync,
>;

/// Wrap [`embed`] as an [`EmbedFn`].  This never fails.
pub fn deterministic_embed_fn(dimensions: usize) -> EmbedFn {
    Arc::new(move |text: String| {
        let vector = embed(&text, dimensions);
        Box::pin(async move { Ok::<_, anyhow::Error>(vector) })
    })
}

/// Lower-case `text` and split it on every non-alphanumeric character.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Embed `text` into a unit vector of `dimensions` components.
///
/// Each token lands in one bucket with a hash-derived sign and a weight of
/// `1 + ln(chars)`, so longer (rarer) tokens dominate short function words.
/// Token-less input, or input whose contributions cancel out exactly, maps to
/// a one-hot vector so the result is never "unusable".
pub fn embed(text: &str, dimensions: usize) -> Vec<f64> {
    let dimensions = dimensions.max(1);
    let mut vector = vec![0.0_f64; dimensions];
    let mut first_bucket = None;

    for token in tokenize(text) {
        let (bucket, sign) = bucket_for(&token, dimensions);
        if first_bucket.is_none() {
            first_bucket = Some(bucket);
        }
        let weight = 1.0 + (token.chars().count() as f64).ln();
        vector[bucket] += sign * weight;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        vector[first_bucket.unwrap_or(0)] = 1.0;
        return vector;
    }
    vector.iter_mut().for_each(|x| *x /= norm);
    vector
}

fn bucket_for(token: &str, dimensions: usize) -> (usize, f64) {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    let bucket = (u64::from_le_bytes(head) % dimensions as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    (bucket, sign)
}

/// A vector is usable when it has at least one finite, non-zero component.
pub fn is_usable(vector: &[f64]) -> bool {
    vector.iter().any(|x| x.is_finite() && *x != 0.0)
}

/// Cosine similarity in `[-1, 1]`.  Non-finite components count as zero;
/// mismatched lengths or zero-magnitude vectors yield `0.0`.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let finite = |x: f64| if x.is_finite() { x } else { 0.0 };
    let mut dot = 0.0;
    let mut mag_a = 0.0;
    let mut mag_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (finite(x), finite(y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let cosine = dot / (mag_a.sqrt() * mag_b.sqrt());
    if cosine.is_finite() {
        cosine.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine similarity mapped from `[-1, 1]` onto `[0, 1]`; `0.0` when either
/// vector is unusable.
pub fn compute_semantic_score(candidate: &[f64], query: &[f64]) -> f64 {
    if !is_usable(candidate) || !is_usable(query) {
        return 0.0;
    }
    ((cosine_similarity(candidate, query) + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f64]) -> f64 {
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    #[test]
    fn embedding_is_deterministic_and_unit_length() {
        let a = embed("The user adopted a greyhound named Biscuit", 256);
        let b = embed("The user adopted a greyhound named Biscuit", 256);
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        assert!((norm(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tokenization_ignores_case_and_punctuation() {
        assert_eq!(
            embed("Hello, WORLD!!", DEFAULT_DIMENSIONS),
            embed("hello world", DEFAULT_DIMENSIONS)
        );
        assert_eq!(tokenize("it's 5 o'clock"), vec!["it", "s", "5", "o", "clock"]);
    }

    #[test]
    fn empty_input_yields_one_hot_vector() {
        for text in ["", "   ", "?!.,"] {
            let v = embed(text, 32);
            assert!(is_usable(&v), "{text:?} produced an unusable vector");
            assert_eq!(v.iter().filter(|x| **x != 0.0).count(), 1);
            assert!((norm(&v) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_disjoint_text() {
        let query = embed("sourdough starter", 256);
        let close = embed("feeding the sourdough starter every morning", 256);
        let far = embed("quarterly tax filing deadline", 256);
        assert!(cosine_similarity(&close, &query) > cosine_similarity(&far, &query));
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let samples = [
            vec![1.0, 0.0, 0.0],
            vec![-3.0, 2.0, 0.5],
            vec![0.0, 0.0, 0.0],
            vec![f64::NAN, 1.0, 2.0],
            vec![1e300, -1e300, 5.0],
        ];
        for a in &samples {
            for b in &samples {
                let ab = cosine_similarity(a, b);
                let ba = cosine_similarity(b, a);
                assert_eq!(ab.to_bits(), ba.to_bits());
                assert!((-1.0..=1.0).contains(&ab));
                let s = compute_semantic_score(a, b);
                assert!((0.0..=1.0).contains(&s), "semantic score {s} out of range");
            }
        }
    }

    #[test]
    fn unusable_vectors_score_zero() {
        let q = vec![1.0, 0.0];
        assert_eq!(compute_semantic_score(&[], &q), 0.0);
        assert_eq!(compute_semantic_score(&[0.0, 0.0], &q), 0.0);
        assert_eq!(compute_semantic_score(&[f64::NAN, f64::INFINITY], &q), 0.0);
        assert!(!is_usable(&[f64::NAN, 0.0]));
        assert!(is_usable(&[f64::NAN, 0.5]));
    }

    #[tokio::test]
    async fn embed_fn_wraps_the_deterministic_embedder() {
        let f = deterministic_embed_fn(64);
        let v = f("remember the lighthouse".to_string()).await.unwrap();
        assert_eq!(v, embed("remember the lighthouse", 64));
    }
}
