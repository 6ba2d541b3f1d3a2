//! Moving issues between manifests and Linear.

pub mod pull;
pub mod push;
