use std::collections::{BTreeMap, BTreeSet};

use convert_case::{Case, Casing};

use super::field::{FieldDescriptor, Value};
use super::MapperError;

/// Validated schema of one kind of entity.
#[derive(Clone, Debug)]
pub struct EntityType {
    name: String,
    prefix: String,
    primary: Option<String>,
    fields: BTreeMap<String, FieldDescriptor>,
    indexes: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct EntityTypeBuilder {
    name: String,
    prefix: Option<String>,
    fields: Vec<(String, FieldDescriptor)>,
}

impl EntityTypeBuilder {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }

    pub fn build(self) -> Result<EntityType, MapperError> {
        let base = self.name.to_case(Case::Snake);

        let mut seen = BTreeSet::new();
        let duplicate = self.fields.iter().find(|(field, _)| !seen.insert(field.as_str()));
        if let Some((field, _)) = duplicate {
            return Err(MapperError::DuplicateField {
                entity_type: self.name.clone(),
                field: field.clone(),
            });
        }

        let mut primary: Option<(String, FieldDescriptor)> = None;
        for (field, descriptor) in &self.fields {
            if !descriptor.is_primary() {
                continue;
            }
            if let Some((first, _)) = &primary {
                return Err(MapperError::MultiplePrimaryFields {
                    entity_type: self.name.clone(),
                    first: first.clone(),
                    second: field.clone(),
                });
            }
            primary = Some((field.clone(), descriptor.clone()));
        }

        let prefix = match (self.prefix.filter(|prefix| !prefix.is_empty()), &primary) {
            (Some(prefix), _) => prefix,
            (None, Some((_, descriptor))) => descriptor
                .prefix_override()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{base}:")),
            (None, None) => {
                return Err(MapperError::TypeMissingPrefix { entity_type: self.name });
            }
        };

        let indexes: BTreeMap<String, String> = self
            .fields
            .iter()
            .filter(|(_, descriptor)| descriptor.is_indexed() && !descriptor.is_primary())
            .map(|(field, descriptor)| {
                let index_prefix = descriptor
                    .prefix_override()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{base}_{field}:"));
                (field.clone(), index_prefix)
            })
            .collect();

        // Enumeration globs `<prefix>*`, so no index key may fall under the entity prefix.
        let overlap = indexes.iter().find(|(_, index_prefix)| {
            index_prefix.starts_with(&prefix) || prefix.starts_with(index_prefix.as_str())
        });
        if let Some((field, index_prefix)) = overlap {
            return Err(MapperError::OverlappingPrefix {
                entity_type: self.name,
                field: field.clone(),
                prefix,
                index_prefix: index_prefix.clone(),
            });
        }

        Ok(EntityType {
            name: self.name,
            prefix,
            primary: primary.map(|(field, _)| field),
            fields: self.fields.into_iter().collect(),
            indexes,
        })
    }
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder { name: name.into(), prefix: None, fields: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn primary_field(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn is_primary(&self, field: &str) -> bool {
        self.primary.as_deref() == Some(field)
    }

    pub fn descriptor(&self, field: &str) -> Option<&FieldDescriptor> {
        self.fields.get(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Index prefix for `field`, if it is an indexed field.
    pub fn index_prefix(&self, field: &str) -> Option<&str> {
        self.indexes.get(field).map(String::as_str)
    }

    /// `(field, index prefix)` for every indexed field.
    pub fn indexes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.indexes.iter().map(|(field, prefix)| (field.as_str(), prefix.as_str()))
    }

    /// Full identity key for either a local id or an already prefixed key.
    pub fn identity_key(&self, id: &str) -> String {
        if id.starts_with(&self.prefix) {
            id.to_string()
        } else {
            format!("{}{id}", self.prefix)
        }
    }

    pub fn local_id<'a>(&self, id: &'a str) -> &'a str {
        id.strip_prefix(self.prefix.as_str()).unwrap_or(id)
    }

    pub fn decode(&self, field: &str, raw: &str) -> Result<Value, MapperError> {
        let Some(descriptor) = self.fields.get(field) else {
            return Ok(Value::coerce(raw));
        };

        let decoder = descriptor.decoder();
        decoder.decode(raw).ok_or_else(|| MapperError::Decode {
            field: field.to_string(),
            raw: raw.to_string(),
            decoder: decoder.name(),
        })
    }
}
