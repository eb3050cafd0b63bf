//! In-process hashed bag-of-words embedder.
//!
//! Each lower-cased alphanumeric token is hashed with SHA-256 into one
//! signed bucket. Texts sharing words land close together, which is enough
//! for offline use and tests. It is not a semantic model.

use sha2::{Digest, Sha256};

use crate::normalize;

pub(crate) const MODEL_NAME: &str = "hashed-bow";

/// Embed `text` into a unit vector of length `dim`.
///
/// Stable across processes and platforms. Text with no tokens yields the
/// zero vector.
pub fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dim];
    if dim == 0 {
        return vector;
    }

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }

    normalize(vector)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hash_embed_deterministic() {
        let a = hash_embed("Debugging marathon, so tired", 128);
        let b = hash_embed("Debugging marathon, so tired", 128);
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert_eq!(hash_embed("Hello, WORLD!", 64), hash_embed("hello world", 64));
    }

    #[test]
    fn test_shared_words_are_closer() {
        let query = hash_embed("debugging", 256);
        let related = hash_embed("I love debugging at night", 256);
        let unrelated = hash_embed("Stressful deadline today", 256);
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        assert!(hash_embed("  ... ", 32).iter().all(|x| *x == 0.0));
    }
}
