//! Schema field cache (spec §4.4, component C4).
//!
//! Every compile looks up fields by name repeatedly (once per filter leaf,
//! once per select/include, once per order-by key); a linear scan over
//! `Model::fields` for each lookup is wasteful once a model has more than
//! a handful of fields. `SchemaFieldCache` memoizes a name -> index map
//! per model the first time it's touched, the way `drizzle-core`'s
//! generated column structs give O(1) field access for free at compile
//! time — here that has to happen at the start of a compile instead.

use std::collections::HashMap;

use crate::error::CompileError;
use crate::schema::{Field, Model};

/// Name -> field-index map for a single model.
#[derive(Debug)]
pub struct ModelIndex<'a> {
    model: &'a Model,
    by_name: HashMap<&'a str, usize>,
}

impl<'a> ModelIndex<'a> {
    fn build(model: &'a Model) -> Self {
        let by_name = model.fields.iter().enumerate().map(|(i, f)| (f.name.as_str(), i)).collect();
        Self { model, by_name }
    }

    pub fn get(&self, field_name: &str) -> Result<&'a Field, CompileError> {
        self.by_name
            .get(field_name)
            .map(|&i| &self.model.fields[i])
            .ok_or_else(|| CompileError::field_not_found(&self.model.name, field_name, &self.model.field_names()))
    }

    pub fn model(&self) -> &'a Model {
        self.model
    }
}

/// Caches a [`ModelIndex`] per model name for the lifetime of one compile.
/// Not shared across compiles: schemas are expected to be rebuilt (or at
/// least re-validated) per request in the common embedding pattern, and a
/// cross-compile cache would need invalidation machinery the spec
/// doesn't call for.
#[derive(Debug, Default)]
pub struct SchemaFieldCache<'a> {
    models: HashMap<&'a str, &'a Model>,
    indices: HashMap<&'a str, ModelIndex<'a>>,
}

impl<'a> SchemaFieldCache<'a> {
    pub fn new(models: &'a [Model]) -> Self {
        Self {
            models: models.iter().map(|m| (m.name.as_str(), m)).collect(),
            indices: HashMap::new(),
        }
    }

    pub fn model(&self, name: &str) -> Result<&'a Model, CompileError> {
        self.models.get(name).copied().ok_or_else(|| {
            CompileError::RelationError(format!("unknown model `{name}`"))
        })
    }

    /// Returns the memoized field index for `model_name`, building it on
    /// first access.
    pub fn index(&mut self, model_name: &str) -> Result<&ModelIndex<'a>, CompileError> {
        if !self.indices.contains_key(model_name) {
            let model = self.model(model_name)?;
            self.indices.insert(model.name.as_str(), ModelIndex::build(model));
        }
        Ok(self.indices.get(model_name).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    fn sample_model() -> Model {
        Model::new("User", "users")
            .field(Field::new("id", "id", FieldType::Int))
            .field(Field::new("email", "email", FieldType::String))
    }

    #[test]
    fn caches_index_across_lookups() {
        let models = vec![sample_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let idx1 = cache.index("User").unwrap().get("email").unwrap();
        let idx2 = cache.index("User").unwrap().get("email").unwrap();
        assert_eq!(idx1, idx2);
    }

    #[test]
    fn unknown_field_lists_available() {
        let models = vec![sample_model()];
        let mut cache = SchemaFieldCache::new(&models);
        let err = cache.index("User").unwrap().get("nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("id"));
        assert!(msg.contains("email"));
    }

    #[test]
    fn unknown_model_errors() {
        let models = vec![sample_model()];
        let mut cache = SchemaFieldCache::new(&models);
        assert!(cache.index("Nope").is_err());
    }
}
