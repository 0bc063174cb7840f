/**
 * MinHash Signatures
 *
 * DESIGN DECISION: k≈128 hash functions over character-shingles of
 * normalized source, banded into groups for candidate pruning
 * WHY: An ONNX embedding model needs a runtime and weights this crate
 * cannot assume are present; MinHash over shingles gets a usable semantic-
 * similarity proxy from pure hashing, recomputed only when code mutates
 *
 * REASONING CHAIN:
 * 1. Normalize source (lowercase, collapse whitespace) so formatting
 *    differences don't change the signature
 * 2. Slide a fixed-width character shingle window across the text
 * 3. For each of k hash-function seeds, keep the minimum hash over all
 *    shingles — the MinHash signature
 * 4. Two signatures' estimated Jaccard similarity is the fraction of
 *    matching positions
 * 5. Banding groups signature rows `r` at a time; two patterns sharing a
 *    full band are candidate near-duplicates, pruning pairwise comparison
 *    to only those sharing at least one band
 *
 * PATTERN: MinHash banded-LSH signature generator
 */

use sha2::{Digest, Sha256};

const SHINGLE_SIZE: usize = 5;
pub const SIGNATURE_SIZE: usize = 128;
const BAND_ROWS: usize = 4;

/// A precomputed MinHash signature over a Pattern's normalized source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Signature(pub Vec<u64>);

fn normalize(code: &str) -> String {
    code.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

fn shingles(normalized: &str) -> Vec<&str> {
    let bytes_len = normalized.len();
    if bytes_len < SHINGLE_SIZE {
        return vec![normalized];
    }
    let mut result = Vec::new();
    let chars: Vec<(usize, char)> = normalized.char_indices().collect();
    if chars.len() < SHINGLE_SIZE {
        return vec![normalized];
    }
    for window in chars.windows(SHINGLE_SIZE) {
        let start = window[0].0;
        let end_char = window[SHINGLE_SIZE - 1];
        let end = end_char.0 + end_char.1.len_utf8();
        result.push(&normalized[start..end]);
    }
    result
}

fn seeded_hash(seed: u64, shingle: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(shingle.as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[0..8].try_into().unwrap())
}

/// Computes a `SIGNATURE_SIZE`-wide MinHash signature for `code`.
pub fn signature(code: &str) -> Signature {
    let normalized = normalize(code);
    let shingle_list = shingles(&normalized);
    let mut mins = vec![u64::MAX; SIGNATURE_SIZE];

    for (seed, slot) in mins.iter_mut().enumerate() {
        for shingle in &shingle_list {
            let h = seeded_hash(seed as u64, shingle);
            if h < *slot {
                *slot = h;
            }
        }
    }

    Signature(mins)
}

/// Estimated Jaccard similarity: fraction of matching signature slots.
pub fn estimate_similarity(a: &Signature, b: &Signature) -> f64 {
    if a.0.len() != b.0.len() || a.0.is_empty() {
        return 0.0;
    }
    let matches = a.0.iter().zip(b.0.iter()).filter(|(x, y)| x == y).count();
    matches as f64 / a.0.len() as f64
}

/// Band keys for a signature: `SIGNATURE_SIZE / BAND_ROWS` bands, each a
/// hash of `BAND_ROWS` consecutive signature values. Two signatures
/// sharing any band key are LSH candidate near-duplicates.
pub fn band_keys(sig: &Signature) -> Vec<u64> {
    sig.0
        .chunks(BAND_ROWS)
        .map(|chunk| {
            let mut hasher = Sha256::new();
            for v in chunk {
                hasher.update(v.to_le_bytes());
            }
            let digest = hasher.finalize();
            u64::from_le_bytes(digest[0..8].try_into().unwrap())
        })
        .collect()
}

/// `true` when two signatures share at least one band — the LSH pruning
/// check run before a full pairwise `estimate_similarity`.
pub fn shares_band(a: &Signature, b: &Signature) -> bool {
    let bands_a = band_keys(a);
    let bands_b = band_keys(b);
    bands_a.iter().any(|k| bands_b.contains(k))
}

/// Short hex fingerprint of a signature's first band key, for log lines
/// that need to name a near-duplicate bucket without printing the full
/// 128-entry signature vector.
pub fn fingerprint_hex(sig: &Signature) -> String {
    band_keys(sig)
        .first()
        .map(|k| hex::encode(k.to_be_bytes()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_code_has_identical_signature() {
        let a = signature("function debounce(fn, ms) { return fn; }");
        let b = signature("function debounce(fn, ms) { return fn; }");
        assert_eq!(a, b);
        assert_eq!(estimate_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_whitespace_normalization() {
        let a = signature("function   debounce(fn,   ms)  {  return fn; }");
        let b = signature("function debounce(fn, ms) { return fn; }");
        assert_eq!(a, b);
    }

    #[test]
    fn test_unrelated_code_has_low_similarity() {
        let a = signature("function debounce(fn, ms) { return fn; }");
        let b = signature("class Stack { push(x) { this.items.push(x); } }");
        assert!(estimate_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_shares_band_for_near_identical() {
        let a = signature("function debounce(fn, ms) { let t; return fn; }");
        let b = signature("function debounce(fn, ms) { let t; return fn; }");
        assert!(shares_band(&a, &b));
    }
}
