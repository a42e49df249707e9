use crate::determinism::ids::sha256_hex;
use crate::determinism::json_canonical;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;

pub const ZERO_HASH_64: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A record that lives in a hash-chained NDJSON log.
///
/// The link hash is SHA-256 over the canonical JSON of the whole record with
/// the link hash itself forced to `ZERO_HASH_64`, so no key is ever omitted
/// from the hashed envelope.
pub trait ChainLink: Serialize + Clone {
    fn prev_hash(&self) -> &str;
    fn link_hash(&self) -> &str;
    fn set_prev_hash(&mut self, hash: String);
    fn set_link_hash(&mut self, hash: String);

    /// Record-level checks run before a link is sealed.
    fn validate(&self) -> CoreResult<()> {
        Ok(())
    }
}

pub fn is_hex64(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn compute_link_hash<T: ChainLink>(link: &T) -> CoreResult<String> {
    let mut l = link.clone();
    l.set_link_hash(ZERO_HASH_64.to_string());
    let bytes = json_canonical::to_canonical_bytes(&l)?;
    Ok(sha256_hex(&bytes))
}

pub fn seal<T: ChainLink>(mut link: T, prev_hash: &str) -> CoreResult<T> {
    if !is_hex64(prev_hash) {
        return Err(CoreError::InvalidInput(
            "prev hash must be 64 hex chars".to_string(),
        ));
    }
    link.set_prev_hash(prev_hash.to_string());
    link.validate()?;
    let h = compute_link_hash(&link)?;
    link.set_link_hash(h);
    Ok(link)
}

/// Checks that every link points at its predecessor and that every stored
/// hash matches a recomputation. Returns the hash of the last link.
pub fn verify_links<T: ChainLink>(links: &[T]) -> CoreResult<String> {
    let mut expected_prev = ZERO_HASH_64.to_string();
    for (i, link) in links.iter().enumerate() {
        if link.prev_hash() != expected_prev {
            return Err(CoreError::CorpusIntegrity(format!(
                "link {} does not point at its predecessor",
                i
            )));
        }
        let recomputed = compute_link_hash(link)?;
        if recomputed != link.link_hash() {
            return Err(CoreError::CorpusIntegrity(format!(
                "link {} hash mismatch (stored {}, computed {})",
                i,
                link.link_hash(),
                recomputed
            )));
        }
        expected_prev = recomputed;
    }
    Ok(expected_prev)
}
