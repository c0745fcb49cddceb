//! # strata-orm
//!
//! Entity-to-relation mapping engine.
//!
//! Binds a typed domain object to a single backing table (or a virtual/view
//! source), infers its schema once per type, converts values between storage
//! and domain form, tracks changes against a load snapshot, and projects
//! entities (including embedded relations) into ordered output documents.
//!
//! Query execution, key allocation and validation rules belong to the
//! collaborators in [`persistence`]; this crate only talks to them through
//! those traits.
//!
//! ```
//! use strata_orm::memory::MemoryDatabase;
//! use strata_orm::{Entity, EntityOptions, FieldDecl, Model, TypeTag, Value};
//!
//! struct Note;
//!
//! impl Model for Note {
//!     fn fields() -> Vec<FieldDecl> {
//!         vec![
//!             FieldDecl::new("id", TypeTag::Int),
//!             FieldDecl::new("body", TypeTag::String),
//!         ]
//!     }
//!
//!     fn options() -> EntityOptions {
//!         EntityOptions::table("notes").without_timestamps()
//!     }
//! }
//!
//! let memory = MemoryDatabase::new();
//! let mut note = Entity::new::<Note>(memory.database(), [("body", "hello")]);
//! assert!(note.save().unwrap());
//! assert_eq!(note.key(), &Value::Int(1));
//! assert_eq!(note.to_json(), r#"{"body":"hello","id":1}"#);
//! ```

pub mod binder;
pub mod entity;
pub mod error;
pub mod memory;
pub mod model;
pub mod persistence;
mod save;
pub mod schema;
mod shadow;
pub mod transform;
pub mod types;
pub mod value;
mod view;

pub use entity::{Entity, QueryScope};
pub use error::{EntityError, PersistenceError, ValidationError};
pub use model::{
    Accessors, BackingSource, BindAttr, BindRule, EntityOptions, FieldDecl, Model, ModelRef,
    TimestampField,
};
pub use persistence::{
    Criteria, Database, Persistence, Relation, RowDelete, RowWrite, Validator, WriteOutcome,
};
pub use schema::{Schema, SchemaResolver};
pub use types::{TransformContext, TypeTag};
pub use value::{Express, ExpressOp, IntoRow, Raw, Row, Value, dec, inc, raw};
