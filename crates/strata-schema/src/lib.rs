//! # strata-schema
//!
//! JSON Schema registry for strata entities.
//!
//! Schemas are registered per entity name, either generated from a Rust
//! payload type with `schemars` or supplied as a raw schema document, and
//! checked with `jsonschema`. [`SchemaValidator`] plugs a registered schema
//! into the engine as its validation collaborator, so a save only reaches
//! persistence once the written fields satisfy the schema.

pub mod error;
pub mod registry;
pub mod validator;

pub use error::SchemaError;
pub use registry::SchemaRegistry;
pub use validator::SchemaValidator;
