//! Type definitions are data: a type is a TypeDef entity, each of its fields is a
//! TypeDef entity named `Type.field`, and an edge from the type to every field
//! carries the field name. Field rows never share a type code with instances.
//!
//! Field options hang off the field row as edges. A `type` edge points at the row
//! of the field type. Edges to the standard Name row carry the `mandatory` and
//! `identifier` flags, the Long row carries the length limit and the String row the
//! description. Type flags are Name row edges of the type itself.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::datatype::{
    array_of, map_of, parametrized, parse_parametrized, reference_of, CodeHasher, Decimal,
    FieldDescriptor, StandardType, TypeClass, TypeCode, TypeDescriptor, TypeFlags, TypeRef,
    REFERENCE_FIELD, REFERENCE_SUFFIX,
};
use crate::error::{ReldocError, Result};
use crate::persist::FIRST_DATA_IDENTITY;
use crate::repository::Repository;
use crate::store::{Entity, EntityId, Payload};

const TYPEDEF: TypeCode = StandardType::TypeDef.code();
const FLAG_ROW: EntityId = StandardType::Name.code();
const LIMIT_ROW: EntityId = StandardType::Long.code();
const DESCRIPTION_ROW: EntityId = StandardType::String.code();
const MANDATORY: &str = "mandatory";
const IDENTIFIER: &str = "identifier";
const VALUE_TYPE: &str = "type";
const ABSTRACT: &str = "abstract";
const MIXIN: &str = "mixin";
const QUERYABLE: &str = "queryable";

// ------------- RelationalTypeDefinition -------------
/// A type that has been written as rows, usable as a field type by later definitions.
#[derive(Debug, Clone)]
pub struct RelationalTypeDefinition {
    descriptor: TypeRef,
    entity: Entity,
    reference_type: Option<Box<RelationalTypeDefinition>>,
}

impl RelationalTypeDefinition {
    pub fn identifier(&self) -> &str {
        self.descriptor.identifier()
    }
    pub fn entity(&self) -> &Entity {
        &self.entity
    }
    pub fn descriptor(&self) -> &TypeRef {
        &self.descriptor
    }
    pub fn is_referencable(&self) -> bool {
        self.descriptor.is_referencable()
    }
    pub fn field_by_name(&self, name: &str) -> Result<&FieldDescriptor> {
        self.descriptor.field_or_err(name)
    }
    /// The companion `<Name>Ref` type of a referencable type.
    pub fn reference_type(&self) -> Option<&RelationalTypeDefinition> {
        self.reference_type.as_deref()
    }
}
impl From<&RelationalTypeDefinition> for TypeRef {
    fn from(definition: &RelationalTypeDefinition) -> Self {
        Arc::clone(&definition.descriptor)
    }
}
impl From<RelationalTypeDefinition> for TypeRef {
    fn from(definition: RelationalTypeDefinition) -> Self {
        definition.descriptor
    }
}

// ------------- TypeDefinitionBuilder -------------
pub struct TypeDefinitionBuilder {
    name: String,
    extending: Option<RelationalTypeDefinition>,
    fields: Vec<FieldDescriptor>,
    value_type: Option<TypeRef>,
    flags: TypeFlags,
    problems: Vec<String>,
}

impl TypeDefinitionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            extending: None,
            fields: Vec::new(),
            value_type: None,
            flags: TypeFlags::default(),
            problems: Vec::new(),
        }
    }
    /// Adds fields to a type that is already defined. Its flags stay as they are.
    pub fn extend(existing: &RelationalTypeDefinition) -> Self {
        Self {
            name: existing.identifier().to_string(),
            extending: Some(existing.clone()),
            fields: Vec::new(),
            value_type: existing.descriptor().value_type().cloned(),
            flags: existing.descriptor().flags(),
            problems: Vec::new(),
        }
    }
    pub fn field(mut self, name: &str, ty: impl Into<TypeRef>) -> Self {
        self.fields.push(FieldDescriptor::new(name, ty.into()));
        self
    }
    /// Points at a referencable type without embedding it.
    pub fn reference(mut self, name: &str, referencable: &RelationalTypeDefinition) -> Self {
        match referencable.reference_type() {
            Some(reference_type) => self.field(name, reference_type),
            None => {
                self.problems
                    .push(format!("{} is not referencable, field {} cannot point at it", referencable.identifier(), name));
                self
            }
        }
    }
    pub fn repeatable(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        let element = ty.into();
        self.field(name, array_of(&element))
    }
    /// A map field whose keys are the references of its elements.
    pub fn reference_map(self, name: &str, ty: impl Into<TypeRef>) -> Self {
        let element = ty.into();
        self.field(name, map_of(&element))
    }
    pub fn mandatory(self) -> Self {
        self.with_last_field("mandatory", |f| f.mandatory(true))
    }
    pub fn limited_to(self, limit: usize) -> Self {
        self.with_last_field("limited_to", |f| f.limited_to(Some(limit)))
    }
    pub fn described(self, description: &str) -> Self {
        self.with_last_field("described", |f| f.described(Some(description.to_string())))
    }
    fn with_last_field(mut self, option: &str, apply: impl FnOnce(FieldDescriptor) -> FieldDescriptor) -> Self {
        match self.fields.pop() {
            Some(last) => self.fields.push(apply(last)),
            None => self.problems.push(format!("{} given before any field of {}", option, self.name)),
        }
        self
    }
    pub fn referencable(mut self) -> Self {
        self.flags.referencable = true;
        self
    }
    pub fn queryable(mut self) -> Self {
        self.flags.queryable = true;
        self
    }
    pub fn abstract_type(mut self) -> Self {
        self.flags.is_abstract = true;
        self
    }
    pub fn mixin(mut self) -> Self {
        self.flags.mixin = true;
        self
    }
    fn value_type(mut self, value_type: TypeRef) -> Self {
        self.value_type = Some(value_type);
        self
    }
    /// Writes the type, its fields and its companion reference type as one unit.
    pub fn build(self, repository: &Repository) -> Result<RelationalTypeDefinition> {
        repository.transaction(|| self.define(repository))
    }
    fn define(self, repository: &Repository) -> Result<RelationalTypeDefinition> {
        let TypeDefinitionBuilder {
            name,
            extending,
            fields: declared,
            value_type,
            flags,
            problems,
        } = self;
        if let Some(problem) = problems.into_iter().next() {
            return Err(ReldocError::Schema(problem));
        }
        let store = repository.store();
        let mut staged = Vec::new();
        let (entity, mut fields, reference_type) = match extending {
            Some(existing) => (
                existing.entity.clone(),
                existing.descriptor.fields().to_vec(),
                existing.reference_type,
            ),
            None => {
                check_name(&name)?;
                if store.find_entity_by_reference(&name, TYPEDEF)?.is_some() {
                    return Err(ReldocError::Schema(format!("type {} is already defined", name)));
                }
                let id = store.insert_entity(TYPEDEF, &name)?;
                persist_flags(repository, id, flags)?;
                if flags.referencable {
                    staged.push(FieldDescriptor::new(REFERENCE_FIELD, StandardType::Name.descriptor()).identifying());
                }
                let entity = Entity {
                    id,
                    type_code: TYPEDEF,
                    reference: name.clone(),
                };
                (entity, Vec::new(), None)
            }
        };
        staged.extend(declared);
        for field in staged {
            if fields.iter().any(|f| f.name() == field.name()) {
                return Err(ReldocError::Schema(format!("{} already has a field {}", name, field.name())));
            }
            fields.push(persist_field(repository, &entity, field)?);
        }
        let descriptor = Arc::new(TypeDescriptor::defined(
            name.clone(),
            entity.id,
            flags,
            value_type,
            fields,
        ));
        let reference_type = match reference_type {
            Some(kept) => Some(kept),
            None if flags.referencable => Some(Box::new(
                TypeDefinitionBuilder::new(&format!("{}{}", name, REFERENCE_SUFFIX))
                    .value_type(Arc::clone(&descriptor))
                    .field(REFERENCE_FIELD, reference_of(&descriptor))
                    .define(repository)?,
            )),
            None => None,
        };
        let definition = RelationalTypeDefinition {
            descriptor,
            entity,
            reference_type,
        };
        repository.keep(definition.clone())?;
        info!(
            "Defined type {} with {} fields",
            definition.identifier(),
            definition.descriptor().fields().len()
        );
        Ok(definition)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['.', '<', '>']) {
        return Err(ReldocError::Schema(format!("'{}' is not a valid type name", name)));
    }
    Ok(())
}

fn persist_flags(repository: &Repository, id: EntityId, flags: TypeFlags) -> Result<()> {
    let set = [
        (flags.is_abstract, ABSTRACT),
        (flags.mixin, MIXIN),
        (flags.queryable, QUERYABLE),
    ];
    for (_, flag) in set.iter().filter(|(on, _)| *on) {
        repository
            .store()
            .insert_edge(id, FLAG_ROW, None, &Payload::Text(flag.to_string()))?;
    }
    Ok(())
}

fn persist_field(repository: &Repository, owner: &Entity, field: FieldDescriptor) -> Result<FieldDescriptor> {
    let store = repository.store();
    let type_entity = repository.type_entity(field.value_type())?;
    let id = store.insert_entity(TYPEDEF, &format!("{}.{}", owner.reference, field.name()))?;
    store.insert_edge(owner.id, id, None, &Payload::Text(field.name().to_string()))?;
    store.insert_edge(id, type_entity, None, &Payload::Text(VALUE_TYPE.to_string()))?;
    if field.is_mandatory() {
        store.insert_edge(id, FLAG_ROW, None, &Payload::Text(MANDATORY.to_string()))?;
    }
    if field.is_identifier() {
        store.insert_edge(id, FLAG_ROW, None, &Payload::Text(IDENTIFIER.to_string()))?;
    }
    if let Some(limit) = field.limit() {
        store.insert_edge(id, LIMIT_ROW, None, &Payload::Decimal(Decimal::from_long(limit as i64)))?;
    }
    if let Some(description) = field.description() {
        store.insert_edge(id, DESCRIPTION_ROW, None, &Payload::Text(description.to_string()))?;
    }
    debug!("Persisted field {} as entity {}", field, id);
    Ok(field.backed_by(id))
}

// ------------- SchemaLoader -------------
/// Rebuilds type definitions from their rows.
///
/// Types under construction are remembered so that mutually referring types
/// resolve to a partial descriptor instead of recursing forever.
pub(crate) struct SchemaLoader<'r> {
    repository: &'r Repository,
    loading: HashMap<String, TypeRef, CodeHasher>,
}

impl<'r> SchemaLoader<'r> {
    pub(crate) fn new(repository: &'r Repository) -> Self {
        Self {
            repository,
            loading: HashMap::default(),
        }
    }
    pub(crate) fn type_by_code(&mut self, code: TypeCode) -> Result<TypeRef> {
        if code < FIRST_DATA_IDENTITY {
            return Ok(StandardType::from_code(code)?.descriptor());
        }
        if let Some(kept) = self.repository.kept_code(code)? {
            return Ok(Arc::clone(kept.descriptor()));
        }
        let entity = self
            .repository
            .store()
            .find_entity_by_id(code)?
            .filter(|e| e.type_code == TYPEDEF)
            .ok_or_else(|| ReldocError::UnknownType(format!("code {}", code)))?;
        self.type_by_name(&entity.reference)?
            .ok_or(ReldocError::UnknownType(entity.reference))
    }
    pub(crate) fn type_by_name(&mut self, name: &str) -> Result<Option<TypeRef>> {
        if let Ok(standard) = StandardType::from_identifier(name) {
            return Ok(Some(standard.descriptor()));
        }
        if let Some((base, element)) = parse_parametrized(name) {
            return Ok(self
                .type_by_name(element)?
                .map(|value_type| parametrized(base, &value_type)));
        }
        if let Some(partial) = self.loading.get(name) {
            return Ok(Some(Arc::clone(partial)));
        }
        Ok(self.definition(name)?.map(|d| d.descriptor))
    }
    pub(crate) fn definition(&mut self, name: &str) -> Result<Option<RelationalTypeDefinition>> {
        if let Some(kept) = self.repository.kept(name)? {
            return Ok(Some(kept));
        }
        if self.loading.contains_key(name) || parse_parametrized(name).is_some() {
            return Ok(None);
        }
        let store = self.repository.store();
        let entity = match store.find_entity_by_reference(name, TYPEDEF)? {
            Some(entity) if entity.id >= FIRST_DATA_IDENTITY => entity,
            _ => return Ok(None),
        };
        self.loading.insert(
            name.to_string(),
            Arc::new(TypeDescriptor::defined(
                name.to_string(),
                entity.id,
                TypeFlags::default(),
                None,
                Vec::new(),
            )),
        );
        let mut fields = Vec::new();
        let mut flags = TypeFlags::default();
        for edge in store.find_edges_by_parent(entity.id)? {
            let Payload::Text(label) = &edge.payload else {
                continue;
            };
            if edge.child == FLAG_ROW {
                match label.as_str() {
                    ABSTRACT => flags.is_abstract = true,
                    MIXIN => flags.mixin = true,
                    QUERYABLE => flags.queryable = true,
                    _ => {}
                }
                continue;
            }
            let options = store.find_edges_by_parent(edge.child)?;
            let type_row = options
                .iter()
                .find(|option| option.payload.as_text() == Some(VALUE_TYPE))
                .ok_or_else(|| ReldocError::Store(format!("field {}.{} has no type", name, label)))?;
            let type_edge = type_row.id;
            let value_type = self.type_by_code(type_row.child)?;
            let mut field = FieldDescriptor::new(label, value_type).backed_by(edge.child);
            for option in options.iter().filter(|option| option.id != type_edge) {
                field = match (option.child, &option.payload) {
                    (FLAG_ROW, Payload::Text(flag)) if flag == MANDATORY => field.mandatory(true),
                    (FLAG_ROW, Payload::Text(flag)) if flag == IDENTIFIER => field.identifying(),
                    (LIMIT_ROW, Payload::Decimal(limit)) => field.limited_to(limit.to_long().map(|l| l as usize)),
                    (DESCRIPTION_ROW, Payload::Text(text)) => field.described(Some(text.clone())),
                    _ => field,
                };
            }
            fields.push(field);
        }
        let referencable = fields
            .iter()
            .any(|f| f.is_identifier() && f.name() == REFERENCE_FIELD);
        let value_type = if name.ends_with(REFERENCE_SUFFIX) {
            fields
                .iter()
                .find(|f| f.name() == REFERENCE_FIELD)
                .filter(|f| f.value_type().class() == TypeClass::Parametrized(StandardType::Reference))
                .and_then(|f| f.value_type().value_type().cloned())
        } else {
            None
        };
        flags.referencable = referencable;
        let descriptor = Arc::new(TypeDescriptor::defined(
            name.to_string(),
            entity.id,
            flags,
            value_type.clone(),
            fields,
        ));
        self.loading.insert(name.to_string(), Arc::clone(&descriptor));
        let companion = format!("{}{}", name, REFERENCE_SUFFIX);
        let reference_type = if referencable && !self.loading.contains_key(&companion) {
            self.definition(&companion)?.map(Box::new)
        } else {
            None
        };
        self.loading.remove(name);
        let definition = RelationalTypeDefinition {
            descriptor,
            entity,
            reference_type,
        };
        self.repository.keep(definition.clone())?;
        // a companion loaded before its owner attaches itself afterwards
        if let Some(owner) = value_type {
            if let Some(mut kept) = self.repository.kept(owner.identifier())? {
                if kept.is_referencable() && kept.reference_type.is_none() {
                    kept.reference_type = Some(Box::new(definition.clone()));
                    self.repository.keep(kept)?;
                }
            }
        }
        debug!("Loaded type {} from its rows", name);
        Ok(Some(definition))
    }
}
