//! HireLens evaluation worker library
//!
//! The processor is exposed as a library so integration tests can
//! drive it against in-memory stores; the binary wires it to SQS,
//! Postgres and the live LLM backend.

pub mod processor;
