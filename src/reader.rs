//! Read views over stored instances.
//!
//! Nothing is cached: every field access and every pass over a container goes
//! back to the store, so a view always reflects the rows as they are now.
use std::fmt;

use tracing::{trace, warn};

use crate::datatype::{parse_date, parse_datetime, parse_tagged, FieldDescriptor, TypeDescriptor, TypeRef, Value};
use crate::dispatch::{chain, conditional, delegating, dispatch, handler_fn, map_result, TypeHandler, TypeKind};
use crate::error::{ReldocError, Result};
use crate::repository::Repository;
use crate::store::{Edge, Entity, EntityId, Payload};

/// The shape every node of a document tree offers.
pub trait TreeNode<'r> {
    fn name(&self) -> &str;
    /// Present for scalars only.
    fn value(&self) -> Option<&Value>;
    fn type_descriptor(&self) -> &TypeRef;
    fn get_field(&self, name: &str) -> Result<Option<Node<'r>>>;
    fn items(&self) -> Result<Vec<(String, Node<'r>)>>;
}

// ------------- Value extraction -------------
/// Reads the value a scalar edge carries.
pub struct EdgeValue;

impl TypeHandler<Edge> for EdgeValue {
    type Output = Value;
    fn handle(&self, kind: &TypeKind<'_>, edge: &Edge) -> Result<Value> {
        match (kind, &edge.payload) {
            (_, Payload::Null) => Ok(Value::Null),
            (TypeKind::Binary | TypeKind::TypeDef, _) => kind.unsupported("values of this type are not stored"),
            (TypeKind::Any, Payload::Text(text)) => parse_tagged(text),
            (
                TypeKind::String
                | TypeKind::Name
                | TypeKind::Path
                | TypeKind::Uri
                | TypeKind::LocalizedString
                | TypeKind::Reference(_)
                | TypeKind::WeakReference(_),
                Payload::Text(text),
            ) => Ok(Value::Text(text.clone())),
            (TypeKind::Long, Payload::Decimal(d)) => d.to_long().map(Value::Long).ok_or_else(|| corrupt(kind, edge)),
            (TypeKind::Double, Payload::Decimal(d)) => d.to_double().map(Value::Double).ok_or_else(|| corrupt(kind, edge)),
            (TypeKind::Boolean, Payload::Decimal(d)) => Ok(Value::Boolean(d.is_one())),
            (TypeKind::Decimal, Payload::Decimal(d)) => Ok(Value::Decimal(d.clone())),
            (TypeKind::DateTime, Payload::Text(text)) => parse_datetime(text).map(Value::DateTime),
            (TypeKind::Date, Payload::Text(text)) => parse_date(text).map(Value::Date),
            _ => Err(corrupt(kind, edge)),
        }
    }
}

fn corrupt(kind: &TypeKind<'_>, edge: &Edge) -> ReldocError {
    ReldocError::Store(format!("edge {} does not hold a {} value", edge.id, kind.name()))
}

pub fn edge_value(ty: &TypeDescriptor, edge: &Edge) -> Result<Value> {
    dispatch(ty, edge, &EdgeValue)
}

// ------------- Nodes -------------
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarNode {
    name: String,
    ty: TypeRef,
    value: Value,
}

impl ScalarNode {
    pub fn get(&self) -> &Value {
        &self.value
    }
    pub fn into_value(self) -> Value {
        self.value
    }
}

#[derive(Clone)]
pub enum Node<'r> {
    Scalar(ScalarNode),
    Object(ObjectReader<'r>),
    Array(ArrayReader<'r>),
}

impl<'r> Node<'r> {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Scalar(scalar) => Some(&scalar.value),
            _ => None,
        }
    }
    pub fn as_object(&self) -> Option<&ObjectReader<'r>> {
        match self {
            Node::Object(object) => Some(object),
            _ => None,
        }
    }
    pub fn as_array(&self) -> Option<&ArrayReader<'r>> {
        match self {
            Node::Array(array) => Some(array),
            _ => None,
        }
    }
    fn renamed(self, name: String) -> Node<'r> {
        match self {
            Node::Scalar(scalar) => Node::Scalar(ScalarNode { name, ..scalar }),
            Node::Object(object) => Node::Object(ObjectReader { name, ..object }),
            Node::Array(array) => Node::Array(array),
        }
    }
}

impl<'r> TreeNode<'r> for Node<'r> {
    fn name(&self) -> &str {
        match self {
            Node::Scalar(scalar) => &scalar.name,
            Node::Object(object) => object.name(),
            Node::Array(array) => array.name(),
        }
    }
    fn value(&self) -> Option<&Value> {
        self.as_value()
    }
    fn type_descriptor(&self) -> &TypeRef {
        match self {
            Node::Scalar(scalar) => &scalar.ty,
            Node::Object(object) => object.type_descriptor(),
            Node::Array(array) => array.type_descriptor(),
        }
    }
    fn get_field(&self, name: &str) -> Result<Option<Node<'r>>> {
        match self {
            Node::Scalar(scalar) => Err(ReldocError::UnknownField {
                field: name.to_string(),
                type_name: scalar.ty.identifier().to_string(),
            }),
            Node::Object(object) => object.get_field(name),
            Node::Array(array) => array.get_field(name),
        }
    }
    fn items(&self) -> Result<Vec<(String, Node<'r>)>> {
        match self {
            Node::Scalar(_) => Ok(Vec::new()),
            Node::Object(object) => object.items(),
            Node::Array(array) => array.items(),
        }
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Scalar(scalar) => write!(f, "{}: {}", scalar.name, scalar.value),
            Node::Object(object) => write!(f, "{}: {}", object.name, object.entity),
            Node::Array(array) => write!(f, "{}: {}", array.field.name(), array.field.value_type()),
        }
    }
}

// ------------- Field dispatch -------------
struct FieldContext<'c, 'r> {
    repository: &'r Repository,
    parent: &'c Entity,
    field: &'c FieldDescriptor,
    edges: Vec<Edge>,
}

impl FieldContext<'_, '_> {
    fn first_edge(&self, kind: &TypeKind<'_>) -> Option<&Edge> {
        if self.edges.len() > 1 && !matches!(kind, TypeKind::LocalizedString) {
            warn!(
                "{} edges for single valued field {} of {}, using the first",
                self.edges.len(),
                self.field.name(),
                self.parent
            );
        }
        self.edges.first()
    }
}

fn scalar_node(kind: &TypeKind<'_>, context: &FieldContext<'_, '_>) -> Result<Option<ScalarNode>> {
    let Some(edge) = context.first_edge(kind) else {
        return Ok(None);
    };
    Ok(Some(ScalarNode {
        name: context.field.name().to_string(),
        ty: context.field.value_type().clone(),
        value: EdgeValue.handle(kind, edge)?,
    }))
}

fn structured_node<'r>(kind: &TypeKind<'_>, context: &FieldContext<'_, 'r>) -> Result<Option<Node<'r>>> {
    let repository = context.repository;
    let name = context.field.name();
    match kind {
        TypeKind::Array(_) | TypeKind::Map(_) => Ok(Some(Node::Array(ArrayReader {
            repository,
            parent: context.parent.clone(),
            field: context.field.clone(),
            keyed: matches!(kind, TypeKind::Map(_)),
        }))),
        TypeKind::Object(_) => match context.first_edge(kind) {
            Some(edge) => Ok(Some(Node::Object(child_object(repository, edge.child, name)?))),
            None => Ok(None),
        },
        TypeKind::Reference(target) => match context.first_edge(kind) {
            Some(edge) => Ok(referenced_object(repository, edge, *target, name)?.map(Node::Object)),
            None => Ok(None),
        },
        _ => kind.unsupported("not a structured type"),
    }
}

fn node_factory<'c, 'r>() -> impl TypeHandler<FieldContext<'c, 'r>, Output = Option<Node<'r>>> {
    conditional(
        handler_fn(|kind: &TypeKind<'_>, _context: &FieldContext<'c, 'r>| Ok(kind.is_scalar())),
        map_result(handler_fn(scalar_node), |scalar: Option<ScalarNode>| scalar.map(Node::Scalar)),
        handler_fn(structured_node),
    )
}

fn child_object<'r>(repository: &'r Repository, id: EntityId, name: &str) -> Result<ObjectReader<'r>> {
    let entity = repository
        .find_by_id(id)?
        .ok_or_else(|| ReldocError::Store(format!("entity {} is missing", id)))?;
    Ok(repository.reader(&entity)?.named(name))
}

fn referenced_object<'r>(
    repository: &'r Repository,
    edge: &Edge,
    target: Option<&TypeRef>,
    name: &str,
) -> Result<Option<ObjectReader<'r>>> {
    let Some(reference) = edge.payload.as_text() else {
        return Ok(None);
    };
    let target = target.ok_or_else(|| ReldocError::UnsupportedOperation {
        type_name: name.to_string(),
        reason: "the reference has no target type".to_string(),
    })?;
    let entity = repository
        .find(reference, target)?
        .ok_or_else(|| ReldocError::ReferenceResolution {
            reference: reference.to_string(),
            type_name: target.identifier().to_string(),
        })?;
    Ok(Some(repository.reader(&entity)?.named(name)))
}

fn belongs_to(edge: &Edge, field: &FieldDescriptor) -> bool {
    match &edge.payload {
        Payload::Child { field: name } => name == field.name(),
        _ => Some(edge.child) == field.entity(),
    }
}

fn field_edges(repository: &Repository, parent: EntityId, field: &FieldDescriptor) -> Result<Vec<Edge>> {
    Ok(repository
        .store()
        .find_edges_by_parent(parent)?
        .into_iter()
        .filter(|edge| belongs_to(edge, field))
        .collect())
}

// ------------- ObjectReader -------------
/// An immutable view of one stored instance.
#[derive(Clone)]
pub struct ObjectReader<'r> {
    repository: &'r Repository,
    name: String,
    entity: Entity,
    ty: TypeRef,
}

impl<'r> ObjectReader<'r> {
    pub(crate) fn new(repository: &'r Repository, entity: Entity, ty: TypeRef) -> Self {
        Self {
            repository,
            name: entity.reference.clone(),
            entity,
            ty,
        }
    }
    fn named(self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self
        }
    }
    pub fn entity(&self) -> &Entity {
        &self.entity
    }
    pub fn reference(&self) -> &str {
        &self.entity.reference
    }
    /// The text of a localized field in one locale.
    pub fn get_localized(&self, field: &str, locale: &str) -> Result<Option<String>> {
        Ok(self
            .localized(field)?
            .into_iter()
            .find(|(l, _)| l.as_deref() == Some(locale))
            .map(|(_, text)| text))
    }
    /// Every (locale, text) pair of a localized field, in the order they were set.
    pub fn localized(&self, field: &str) -> Result<Vec<(Option<String>, String)>> {
        let field = self.ty.field_or_err(field)?;
        let kind = TypeKind::of(field.value_type());
        if !matches!(kind, TypeKind::LocalizedString) {
            return kind.unsupported(&format!("{} is not localized", field.name()));
        }
        Ok(field_edges(self.repository, self.entity.id, field)?
            .into_iter()
            .filter_map(|edge| match edge.payload {
                Payload::Text(text) => Some((edge.locale, text)),
                _ => None,
            })
            .collect())
    }
}

impl<'r> TreeNode<'r> for ObjectReader<'r> {
    fn name(&self) -> &str {
        &self.name
    }
    fn value(&self) -> Option<&Value> {
        None
    }
    fn type_descriptor(&self) -> &TypeRef {
        &self.ty
    }
    fn get_field(&self, name: &str) -> Result<Option<Node<'r>>> {
        let field = self.ty.field_or_err(name)?;
        let context = FieldContext {
            repository: self.repository,
            parent: &self.entity,
            field,
            edges: field_edges(self.repository, self.entity.id, field)?,
        };
        let handler = chain(
            handler_fn(|kind: &TypeKind<'_>, context: &FieldContext<'_, 'r>| {
                trace!("Reading {} field {} of {}", kind.name(), context.field.name(), context.parent);
                Ok(())
            }),
            // the identifier is the entity reference, not an edge
            delegating(node_factory(), |_kind: &TypeKind<'_>, context: &FieldContext<'_, 'r>| {
                context.field.is_identifier().then(|| {
                    Ok(Some(Node::Scalar(ScalarNode {
                        name: context.field.name().to_string(),
                        ty: context.field.value_type().clone(),
                        value: Value::Text(context.parent.reference.clone()),
                    })))
                })
            }),
        );
        dispatch(field.value_type(), &context, &handler)
    }
    /// Fields that hold something, in declaration order.
    fn items(&self) -> Result<Vec<(String, Node<'r>)>> {
        let mut items = Vec::new();
        for field in self.ty.fields() {
            if let Some(node) = self.get_field(field.name())? {
                items.push((field.name().to_string(), node));
            }
        }
        Ok(items)
    }
}

/// Two views are equal when they show the same instance, whatever field they were reached through.
impl PartialEq for ObjectReader<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity && self.ty == other.ty
    }
}

impl fmt::Debug for ObjectReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("name", &self.name)
            .field("entity", &self.entity)
            .field("type", &self.ty.identifier())
            .finish()
    }
}

// ------------- ArrayReader -------------
/// The elements of an array or map field, in insertion order.
#[derive(Clone)]
pub struct ArrayReader<'r> {
    repository: &'r Repository,
    parent: Entity,
    field: FieldDescriptor,
    keyed: bool,
}

impl<'r> ArrayReader<'r> {
    pub fn is_map(&self) -> bool {
        self.keyed
    }
    pub fn element_type(&self) -> Result<&TypeRef> {
        self.field
            .value_type()
            .value_type()
            .ok_or_else(|| ReldocError::Schema(format!("{} has no element type", self.field)))
    }
    /// Starts a fresh pass over the stored elements. Elements are materialized as the iterator advances.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<(String, Node<'r>)>> + use<'r>> {
        let repository = self.repository;
        let element = self.element_type()?.clone();
        let field = self.field.name().to_string();
        let keyed = self.keyed;
        let edges = field_edges(repository, self.parent.id, &self.field)?;
        Ok(edges
            .into_iter()
            .enumerate()
            .map(move |(index, edge)| element_node(repository, &element, &field, keyed, index, &edge)))
    }
    pub fn len(&self) -> Result<usize> {
        Ok(field_edges(self.repository, self.parent.id, &self.field)?.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn element_node<'r>(
    repository: &'r Repository,
    element: &TypeRef,
    field: &str,
    keyed: bool,
    index: usize,
    edge: &Edge,
) -> Result<(String, Node<'r>)> {
    let kind = TypeKind::of(element);
    let node = match kind {
        TypeKind::Object(_) => Node::Object(child_object(repository, edge.child, field)?),
        TypeKind::Reference(target) => match referenced_object(repository, edge, target, field)? {
            Some(object) => Node::Object(object),
            None => Node::Scalar(ScalarNode {
                name: field.to_string(),
                ty: element.clone(),
                value: Value::Null,
            }),
        },
        TypeKind::Array(_) | TypeKind::Map(_) => return kind.unsupported("containers do not nest directly"),
        _ => Node::Scalar(ScalarNode {
            name: field.to_string(),
            ty: element.clone(),
            value: EdgeValue.handle(&kind, edge)?,
        }),
    };
    let key = match (&node, keyed) {
        (Node::Object(object), true) => object.reference().to_string(),
        (Node::Scalar(scalar), true) => scalar.value.to_string(),
        _ => index.to_string(),
    };
    Ok((key.clone(), node.renamed(key)))
}

impl<'r> TreeNode<'r> for ArrayReader<'r> {
    fn name(&self) -> &str {
        self.field.name()
    }
    fn value(&self) -> Option<&Value> {
        None
    }
    fn type_descriptor(&self) -> &TypeRef {
        self.field.value_type()
    }
    /// Looks an element up by key: the element reference for maps, the position for arrays.
    fn get_field(&self, name: &str) -> Result<Option<Node<'r>>> {
        for item in self.iter()? {
            let (key, node) = item?;
            if key == name {
                return Ok(Some(node));
            }
        }
        Ok(None)
    }
    fn items(&self) -> Result<Vec<(String, Node<'r>)>> {
        self.iter()?.collect()
    }
}
