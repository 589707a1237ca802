//! Entity type schemas and the type registry.
//!
//! Schemas are plain static descriptors registered once at startup.
//! Relationship declarations name their inverse field on the target
//! type and are validated when the registry is built, so a mismatched
//! pair fails at construction rather than at the first mutation.

use crate::error::{CoreError, CoreResult};
use offgrid_store::{TableSchema, PRIMARY_KEY};
use offgrid_sync::{PushConfig, TRANSACTIONS_TABLE};
use std::collections::BTreeMap;

/// The kind of one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A plain persisted value.
    Property,
    /// The owning side of a one-to-many relationship: holds at most one
    /// reference to `target`; `inverse` is the collection field on the
    /// target that mirrors it.
    ManyToOne {
        /// Target entity type.
        target: String,
        /// The one-to-many field on the target.
        inverse: String,
    },
    /// The collection side of a many-to-one. Never set directly;
    /// mutated only as a side effect of the owning side. `via` is the
    /// many-to-one field on the target that points back here.
    OneToMany {
        /// Target entity type (the "many" side).
        target: String,
        /// The many-to-one field on the target.
        via: String,
    },
    /// A symmetric collection on both sides. `inverse` is the
    /// many-to-many field on the target.
    ManyToMany {
        /// Target entity type.
        target: String,
        /// The many-to-many field on the target.
        inverse: String,
    },
    /// Derived value; never persisted, never diffed.
    Computed,
    /// Behavior marker; never persisted, never diffed.
    Action,
}

impl FieldKind {
    /// True for field kinds that are written to the store and indexed.
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            FieldKind::Property | FieldKind::ManyToOne { .. } | FieldKind::ManyToMany { .. }
        )
    }
}

/// One entity type: a named field schema plus its push configuration.
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    fields: BTreeMap<String, FieldKind>,
    push: PushConfig,
}

impl EntityType {
    /// Creates a type with an `id` property and no other fields.
    pub fn new(name: impl Into<String>, push: PushConfig) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(PRIMARY_KEY.to_string(), FieldKind::Property);
        Self {
            name: name.into(),
            fields,
            push,
        }
    }

    /// Declares a property field.
    pub fn with_property(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldKind::Property);
        self
    }

    /// Declares the owning side of a one-to-many relationship.
    pub fn with_many_to_one(
        mut self,
        field: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            field.into(),
            FieldKind::ManyToOne {
                target: target.into(),
                inverse: inverse.into(),
            },
        );
        self
    }

    /// Declares the collection side of a one-to-many relationship.
    pub fn with_one_to_many(
        mut self,
        field: impl Into<String>,
        target: impl Into<String>,
        via: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            field.into(),
            FieldKind::OneToMany {
                target: target.into(),
                via: via.into(),
            },
        );
        self
    }

    /// Declares one side of a many-to-many relationship.
    pub fn with_many_to_many(
        mut self,
        field: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            field.into(),
            FieldKind::ManyToMany {
                target: target.into(),
                inverse: inverse.into(),
            },
        );
        self
    }

    /// Declares a computed field.
    pub fn with_computed(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldKind::Computed);
        self
    }

    /// Declares an action field.
    pub fn with_action(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), FieldKind::Action);
        self
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up one field's kind.
    pub fn field(&self, field: &str) -> Option<&FieldKind> {
        self.fields.get(field)
    }

    /// Iterates all declared fields.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(name, kind)| (name.as_str(), kind))
    }

    /// The type's push configuration.
    pub fn push_config(&self) -> &PushConfig {
        &self.push
    }

    /// The store table layout for this type: one index per persisted
    /// field, multi-entry for many-to-many fields.
    pub fn table_schema(&self) -> TableSchema {
        let mut schema = TableSchema::new(&self.name);
        for (field, kind) in &self.fields {
            match kind {
                FieldKind::ManyToMany { .. } => {
                    schema = schema.with_multi_entry_index(field);
                }
                k if k.is_persisted() => {
                    schema = schema.with_index(field);
                }
                _ => {}
            }
        }
        schema
    }
}

/// The validated set of entity types a graph is built from.
#[derive(Debug, Clone)]
pub struct Registry {
    types: BTreeMap<String, EntityType>,
}

impl Registry {
    /// Builds a registry, validating every relationship declaration.
    ///
    /// # Errors
    ///
    /// Fails with a schema error if a type reuses the reserved outbox
    /// table name, declares a `type` field, lacks an `id` property, or
    /// declares a relationship whose target type or inverse field does
    /// not line up.
    pub fn new(types: Vec<EntityType>) -> CoreResult<Self> {
        let mut map = BTreeMap::new();
        for ty in types {
            if ty.name == TRANSACTIONS_TABLE {
                return Err(CoreError::schema(format!(
                    "type name {TRANSACTIONS_TABLE:?} is reserved for the outbox"
                )));
            }
            if map.insert(ty.name.clone(), ty).is_some() {
                return Err(CoreError::schema("duplicate entity type name"));
            }
        }

        let registry = Self { types: map };
        for ty in registry.types.values() {
            registry.validate_type(ty)?;
        }
        Ok(registry)
    }

    fn validate_type(&self, ty: &EntityType) -> CoreResult<()> {
        if ty.field("type").is_some() {
            return Err(CoreError::schema(format!(
                "type {}: field name \"type\" is reserved for the type tag",
                ty.name
            )));
        }
        if ty.field(PRIMARY_KEY) != Some(&FieldKind::Property) {
            return Err(CoreError::schema(format!(
                "type {}: an \"id\" property is required",
                ty.name
            )));
        }

        for (field, kind) in ty.fields() {
            match kind {
                FieldKind::ManyToOne { target, inverse } => {
                    let expected = FieldKind::OneToMany {
                        target: ty.name.clone(),
                        via: field.to_string(),
                    };
                    self.check_inverse(ty, field, target, inverse, &expected)?;
                }
                FieldKind::OneToMany { target, via } => {
                    let expected = FieldKind::ManyToOne {
                        target: ty.name.clone(),
                        inverse: field.to_string(),
                    };
                    self.check_inverse(ty, field, target, via, &expected)?;
                }
                FieldKind::ManyToMany { target, inverse } => {
                    let expected = FieldKind::ManyToMany {
                        target: ty.name.clone(),
                        inverse: field.to_string(),
                    };
                    self.check_inverse(ty, field, target, inverse, &expected)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_inverse(
        &self,
        ty: &EntityType,
        field: &str,
        target: &str,
        inverse: &str,
        expected: &FieldKind,
    ) -> CoreResult<()> {
        let target_type = self.types.get(target).ok_or_else(|| {
            CoreError::schema(format!(
                "type {}: field {field:?} targets unknown type {target:?}",
                ty.name
            ))
        })?;
        match target_type.field(inverse) {
            Some(kind) if kind == expected => Ok(()),
            Some(_) => Err(CoreError::schema(format!(
                "type {}: field {field:?} names inverse {target}.{inverse} with a mismatched declaration",
                ty.name
            ))),
            None => Err(CoreError::schema(format!(
                "type {}: field {field:?} names missing inverse {target}.{inverse}",
                ty.name
            ))),
        }
    }

    /// Looks up a type by name.
    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    /// Looks up a type by name, failing with `UnknownType`.
    pub fn require(&self, name: &str) -> CoreResult<&EntityType> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownType(name.to_string()))
    }

    /// Iterates all registered types.
    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.values()
    }

    /// The store table layout for every registered type.
    pub fn table_schemas(&self) -> Vec<TableSchema> {
        self.types.values().map(EntityType::table_schema).collect()
    }
}
