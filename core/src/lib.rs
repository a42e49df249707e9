pub mod audit;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod determinism;
pub mod gate;
pub mod intake;
pub mod redaction;
pub mod validator;

pub mod error;
