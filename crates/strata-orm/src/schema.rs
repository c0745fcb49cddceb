//! Per-type schema inference and the process-wide schema cache.
//!
//! A schema maps field name to [`TypeTag`]. Declared fields win; a type that
//! declares none is dynamic and takes its types from the options map, plus
//! column introspection when it is backed by a real table. Results are
//! computed once per concrete type and never invalidated.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use tracing::debug;

use crate::model::{Accessors, EntityOptions, ModelRef};
use crate::persistence::Persistence;
use crate::types::TypeTag;

/// Field name → semantic type for one concrete entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    model: &'static str,
    fields: IndexMap<String, TypeTag>,
}

impl Schema {
    #[must_use]
    pub fn new(model: &'static str, fields: IndexMap<String, TypeTag>) -> Self {
        Self { model, fields }
    }

    #[must_use]
    pub const fn model(&self) -> &'static str {
        self.model
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&TypeTag> {
        self.fields.get(field)
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeTag)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether the field holds an embedded entity.
    #[must_use]
    pub fn is_entity(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(TypeTag::is_entity)
    }
}

/// Field name as stored: verbatim in strict mode, snake_case otherwise.
#[must_use]
pub fn real_field_name(name: &str, strict: bool) -> String {
    if strict {
        name.to_string()
    } else {
        name.to_case(Case::Snake)
    }
}

type Cache<T> = RwLock<HashMap<TypeId, Arc<T>>>;

fn schemas() -> &'static Cache<Schema> {
    static SCHEMAS: OnceLock<Cache<Schema>> = OnceLock::new();
    SCHEMAS.get_or_init(Cache::default)
}

fn accessor_registries() -> &'static Cache<Accessors> {
    static ACCESSORS: OnceLock<Cache<Accessors>> = OnceLock::new();
    ACCESSORS.get_or_init(Cache::default)
}

/// Read-through lookup. `build` runs outside the lock, so two first uses of
/// the same type may both compute; the later equal result overwrites the
/// earlier one.
fn cached<T>(cache: &Cache<T>, key: TypeId, build: impl FnOnce() -> T) -> Arc<T> {
    if let Some(hit) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Arc::clone(hit);
    }
    let value = Arc::new(build());
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, Arc::clone(&value));
    value
}

/// Resolves and caches schemas and accessor registries per entity type.
pub struct SchemaResolver;

impl SchemaResolver {
    /// Schema of `model`, inferring it on first use.
    ///
    /// `persistence` is consulted only for dynamic, table-backed types.
    pub fn resolve(
        model: ModelRef,
        options: &EntityOptions,
        strict: bool,
        persistence: Option<&dyn Persistence>,
    ) -> Arc<Schema> {
        cached(schemas(), model.type_id(), || {
            Self::infer(model, options, strict, persistence)
        })
    }

    /// Cached schema, without inferring.
    #[must_use]
    pub fn cached(model: ModelRef) -> Option<Arc<Schema>> {
        schemas()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&model.type_id())
            .cloned()
    }

    /// Getter/setter overrides registered by `model`.
    #[must_use]
    pub fn accessors(model: ModelRef) -> Arc<Accessors> {
        cached(accessor_registries(), model.type_id(), || {
            let mut registry = Accessors::default();
            model.register_accessors(&mut registry);
            registry
        })
    }

    fn infer(
        model: ModelRef,
        options: &EntityOptions,
        strict: bool,
        persistence: Option<&dyn Persistence>,
    ) -> Schema {
        let declared = model.fields();
        let fields: IndexMap<String, TypeTag> = if !declared.is_empty() {
            declared
                .into_iter()
                .map(|decl| (real_field_name(&decl.name, strict), decl.ty))
                .collect()
        } else if options.source.is_detached() {
            options.types.clone()
        } else {
            let mut columns = persistence.map(|p| p.fields_type()).unwrap_or_default();
            columns.extend(options.types.iter().map(|(k, v)| (k.clone(), v.clone())));
            columns
        };
        debug!(model = model.name(), fields = fields.len(), "inferred entity schema");
        Schema::new(model.name(), fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDecl, Model};
    use pretty_assertions::assert_eq;

    struct Camel;

    impl Model for Camel {
        fn fields() -> Vec<FieldDecl> {
            vec![
                FieldDecl::new("userName", TypeTag::String),
                FieldDecl::new("id", TypeTag::Int),
            ]
        }
    }

    struct Dynamic;

    impl Model for Dynamic {
        fn options() -> EntityOptions {
            EntityOptions::virtual_source().field_type("score", TypeTag::Float)
        }
    }

    #[test]
    fn non_strict_names_are_snake_cased() {
        assert_eq!(real_field_name("userName", false), "user_name");
        assert_eq!(real_field_name("userName", true), "userName");

        let model = ModelRef::of::<Camel>();
        let schema = SchemaResolver::resolve(model, &model.options(), false, None);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["user_name", "id"]);
    }

    #[test]
    fn dynamic_virtual_types_come_from_options() {
        let model = ModelRef::of::<Dynamic>();
        let schema = SchemaResolver::resolve(model, &model.options(), true, None);
        assert_eq!(schema.get("score"), Some(&TypeTag::Float));
        assert_eq!(schema.len(), 1);
        assert!(SchemaResolver::cached(model).is_some());
    }
}
