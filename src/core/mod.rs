//! Core data model: entity kinds, identities and canonical records.

pub mod record;
pub mod types;
