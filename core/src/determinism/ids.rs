use sha2::{Digest, Sha256};
use ulid::Ulid;

pub fn fixture_id_ulid() -> String {
    format!("fx_{}", Ulid::new())
}

pub fn is_fixture_id(candidate: &str) -> bool {
    candidate
        .strip_prefix("fx_")
        .map(|rest| Ulid::from_string(rest).is_ok())
        .unwrap_or(false)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}
