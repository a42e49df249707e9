pub mod corpus;
pub mod detect;
pub mod profile;
pub mod render;
