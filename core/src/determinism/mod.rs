pub mod hash_chain;
pub mod ids;
pub mod json_canonical;
