use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::config::Settings;
use crate::datatype::{
    CodeHasher, StandardType, TypeClass, TypeCode, TypeDescriptor, TypeRef, LOCALE_LIMIT,
    LOCALIZED_STRING, parse_parametrized,
};
use crate::error::{ReldocError, Result};
use crate::persist::{PersistenceMode, SqliteStore, FIRST_DATA_IDENTITY};
use crate::reader::ObjectReader;
use crate::schema::{RelationalTypeDefinition, SchemaLoader, TypeDefinitionBuilder};
use crate::store::{in_transaction, Entity, EntityId, Payload, RelationalStore};

// ------------- TypeKeeper -------------
/// Owns the defined types seen so far, indexed by code and by identifier.
#[derive(Debug, Default)]
pub struct TypeKeeper {
    kept: HashMap<TypeCode, RelationalTypeDefinition, CodeHasher>,
    lookup: HashMap<String, TypeCode, CodeHasher>,
}

impl TypeKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    /// Keeps the definition (and its companion), replacing an older one of the same type.
    /// Returns whether the type was previously kept.
    pub fn keep(&mut self, definition: RelationalTypeDefinition) -> bool {
        if let Some(reference_type) = definition.reference_type() {
            self.keep(reference_type.clone());
        }
        let code = definition.descriptor().code();
        self.lookup.insert(definition.identifier().to_string(), code);
        match self.kept.entry(code) {
            Entry::Vacant(e) => {
                e.insert(definition);
                false
            }
            Entry::Occupied(mut e) => {
                e.insert(definition);
                true
            }
        }
    }
    pub fn get(&self, name: &str) -> Option<RelationalTypeDefinition> {
        self.lookup.get(name).and_then(|code| self.kept.get(code)).cloned()
    }
    pub fn lookup(&self, code: TypeCode) -> Option<RelationalTypeDefinition> {
        self.kept.get(&code).cloned()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

// ------------- Repository -------------
pub struct Repository {
    store: Box<dyn RelationalStore>,
    types: Mutex<TypeKeeper>,
}

impl Repository {
    /// Wraps a store, creating the standard type rows and the built-in
    /// localized string type unless they already exist.
    pub fn open(store: Box<dyn RelationalStore>) -> Result<Repository> {
        let repository = Repository {
            store,
            types: Mutex::new(TypeKeeper::new()),
        };
        in_transaction(repository.store(), || repository.bootstrap())?;
        Ok(repository)
    }
    pub fn new(mode: PersistenceMode) -> Result<Repository> {
        Repository::open(Box::new(SqliteStore::new(mode)?))
    }
    pub fn in_memory() -> Result<Repository> {
        Repository::new(PersistenceMode::InMemory)
    }
    pub fn from_settings(settings: &Settings) -> Result<Repository> {
        Repository::new(settings.persistence_mode()?)
    }
    fn bootstrap(&self) -> Result<()> {
        let mut created = 0;
        for standard in StandardType::ALL {
            if self.store.find_entity_by_id(standard.code())?.is_none() {
                self.store.insert_entity_with_id(
                    standard.code(),
                    StandardType::TypeDef.code(),
                    standard.identifier(),
                )?;
                created += 1;
            }
        }
        debug!("Created {} standard type rows", created);
        if self.find_type(LOCALIZED_STRING)?.is_none() {
            TypeDefinitionBuilder::new(LOCALIZED_STRING)
                .field("locale", StandardType::String)
                .limited_to(LOCALE_LIMIT)
                .field("value", StandardType::String)
                .build(self)?;
        }
        Ok(())
    }
    pub fn store(&self) -> &dyn RelationalStore {
        self.store.as_ref()
    }
    pub fn transaction<T>(&self, work: impl FnOnce() -> Result<T>) -> Result<T> {
        in_transaction(self.store(), work)
    }
    pub fn localized_string(&self) -> Result<RelationalTypeDefinition> {
        self.find_type(LOCALIZED_STRING)?
            .ok_or_else(|| ReldocError::UnknownType(LOCALIZED_STRING.to_string()))
    }

    // ------------- Schema catalog -------------
    pub(crate) fn keep(&self, definition: RelationalTypeDefinition) -> Result<()> {
        let previously_kept = self.types.lock()?.keep(definition);
        if previously_kept {
            debug!("Refreshed a kept type definition");
        }
        Ok(())
    }
    pub(crate) fn kept(&self, name: &str) -> Result<Option<RelationalTypeDefinition>> {
        Ok(self.types.lock()?.get(name))
    }
    pub(crate) fn kept_code(&self, code: TypeCode) -> Result<Option<RelationalTypeDefinition>> {
        Ok(self.types.lock()?.lookup(code))
    }
    /// Looks up a defined type, loading it from its rows when it has not been seen yet.
    pub fn find_type(&self, name: &str) -> Result<Option<RelationalTypeDefinition>> {
        if let Some(kept) = self.kept(name)? {
            return Ok(Some(kept));
        }
        SchemaLoader::new(self).definition(name)
    }
    pub fn type_by_name(&self, name: &str) -> Result<TypeRef> {
        SchemaLoader::new(self)
            .type_by_name(name)?
            .ok_or_else(|| ReldocError::UnknownType(name.to_string()))
    }
    pub fn type_by_code(&self, code: TypeCode) -> Result<TypeRef> {
        if let Some(kept) = self.kept_code(code)? {
            return Ok(kept.descriptor().clone());
        }
        SchemaLoader::new(self).type_by_code(code)
    }
    pub fn type_of(&self, entity: &Entity) -> Result<TypeRef> {
        self.type_by_code(entity.type_code)
    }
    /// Every defined type, companion reference types included.
    pub fn types(&self) -> Result<Vec<RelationalTypeDefinition>> {
        let mut definitions = Vec::new();
        for entity in self.store.find_entities_by_type(StandardType::TypeDef.code())? {
            if entity.id < FIRST_DATA_IDENTITY
                || entity.reference.contains('.')
                || parse_parametrized(&entity.reference).is_some()
            {
                continue;
            }
            if let Some(definition) = self.find_type(&entity.reference)? {
                definitions.push(definition);
            }
        }
        Ok(definitions)
    }
    /// The row backing a field type, created on demand for parametrized types.
    pub(crate) fn type_entity(&self, ty: &TypeRef) -> Result<EntityId> {
        match ty.class() {
            TypeClass::Standard(standard) => Ok(standard.code()),
            TypeClass::Defined => match self.store.find_entity_by_id(ty.code())? {
                Some(entity)
                    if entity.type_code == StandardType::TypeDef.code()
                        && entity.reference == ty.identifier() =>
                {
                    Ok(entity.id)
                }
                _ => Err(ReldocError::Schema(format!("cannot resolve field type {}", ty))),
            },
            TypeClass::Parametrized(_) => {
                let value_type = ty
                    .value_type()
                    .ok_or_else(|| ReldocError::Schema(format!("{} has no value type", ty)))?;
                self.type_entity(value_type)?;
                let typedef = StandardType::TypeDef.code();
                match self.store.find_entity_by_reference(ty.identifier(), typedef)? {
                    Some(entity) => Ok(entity.id),
                    None => self.store.insert_entity(typedef, ty.identifier()),
                }
            }
        }
    }

    // ------------- Data -------------
    pub fn find(&self, reference: &str, ty: &TypeDescriptor) -> Result<Option<Entity>> {
        self.store.find_entity_by_reference(reference, ty.code())
    }
    pub fn find_by_id(&self, id: EntityId) -> Result<Option<Entity>> {
        self.store.find_entity_by_id(id)
    }
    /// Every instance of the type, in creation order.
    pub fn all_of(&self, ty: &TypeDescriptor) -> Result<Vec<Entity>> {
        self.store.find_entities_by_type(ty.code())
    }
    pub fn reader(&self, entity: &Entity) -> Result<ObjectReader<'_>> {
        let ty = self.type_of(entity)?;
        Ok(ObjectReader::new(self, entity.clone(), ty))
    }
    /// Removes the entity and everything it owns. References pointing at it are left dangling.
    pub fn delete(&self, entity: &Entity) -> Result<()> {
        self.transaction(|| self.delete_owned(entity.id))?;
        info!("Deleted {}", entity);
        Ok(())
    }
    fn delete_owned(&self, id: EntityId) -> Result<()> {
        for edge in self.store.find_edges_by_parent(id)? {
            if let Payload::Child { .. } = edge.payload {
                self.delete_owned(edge.child)?;
            }
        }
        self.store.delete_entity(id)
    }
}
