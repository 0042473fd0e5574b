use tracing::debug;

use crate::datatype::{
    format_datetime, format_tagged, Decimal, FieldDescriptor, TypeDescriptor, TypeRef, Value, LOCALE_LIMIT,
};
use crate::dispatch::{
    conditional_or_none, conditional_or_throw, constant, dispatch, first_some, handler_fn, map_result,
    TypeHandler, TypeKind,
};
use crate::error::{ReldocError, Result};
use crate::repository::Repository;
use crate::store::{Entity, EntityId, Payload};

// ------------- Value construction -------------
/// Tells whether a value has a shape the declared type can hold.
pub struct ValueShape;

impl TypeHandler<Value> for ValueShape {
    type Output = bool;
    fn handle(&self, kind: &TypeKind<'_>, value: &Value) -> Result<bool> {
        Ok(match (kind, value) {
            (_, Value::Null) => true,
            (
                TypeKind::String | TypeKind::Name | TypeKind::Path | TypeKind::Uri | TypeKind::LocalizedString,
                Value::Text(_),
            ) => true,
            (TypeKind::Reference(_) | TypeKind::WeakReference(_), Value::Text(_) | Value::Entity(_)) => true,
            (TypeKind::Long, Value::Long(_)) => true,
            (TypeKind::Double, Value::Double(_) | Value::Long(_)) => true,
            (TypeKind::Decimal, Value::Decimal(_) | Value::Long(_)) => true,
            (TypeKind::Boolean, Value::Boolean(_)) => true,
            (TypeKind::DateTime, Value::DateTime(_)) => true,
            (TypeKind::Date, Value::Date(_)) => true,
            (TypeKind::Binary, Value::Binary(_)) => true,
            (TypeKind::Any, value) => !matches!(value, Value::Binary(_) | Value::Entity(_)),
            _ => false,
        })
    }
}

/// Turns a value into the payload stored on its edge.
pub struct ValuePayload;

impl TypeHandler<Value> for ValuePayload {
    type Output = Payload;
    fn handle(&self, kind: &TypeKind<'_>, value: &Value) -> Result<Payload> {
        match (kind, value) {
            (_, Value::Null) => Ok(Payload::Null),
            (TypeKind::Any, value) => format_tagged(value)
                .map(Payload::Text)
                .map_or_else(|| kind.unsupported(&format!("cannot store a {} value", value.shape())), Ok),
            (_, Value::Text(s)) if !matches!(kind, TypeKind::DateTime | TypeKind::Date) => Ok(Payload::Text(s.clone())),
            (TypeKind::WeakReference(_), Value::Entity(e)) => Ok(Payload::Text(e.reference.clone())),
            (TypeKind::Binary, _) => kind.unsupported("binary values cannot be stored"),
            (_, Value::Long(l)) => Ok(Payload::Decimal(Decimal::from_long(*l))),
            (_, Value::Double(d)) => Decimal::from_double(*d)
                .map(Payload::Decimal)
                .map_or_else(|| kind.unsupported(&format!("{} is not a finite number", d)), Ok),
            (_, Value::Boolean(b)) => Ok(Payload::Decimal(Decimal::from_bool(*b))),
            (_, Value::Decimal(d)) => Ok(Payload::Decimal(d.clone())),
            (_, Value::DateTime(d)) => Ok(Payload::Text(format_datetime(d))),
            (_, Value::Date(d)) => Ok(Payload::Text(d.to_string())),
            (_, value) => kind.unsupported(&format!("cannot store a {} value", value.shape())),
        }
    }
}

/// Null goes through as is, anything else must pass the shape check first.
pub fn payload_for(ty: &TypeDescriptor, value: &Value) -> Result<Payload> {
    let handlers: Vec<Box<dyn TypeHandler<Value, Output = Option<Payload>>>> = vec![
        Box::new(conditional_or_none::<Value, _, _, Payload>(
            handler_fn(|_kind: &TypeKind<'_>, value: &Value| Ok(value.is_null())),
            constant(Payload::Null),
        )),
        Box::new(map_result(
            conditional_or_throw::<_, _, Payload>(ValueShape, ValuePayload, "value does not match the declared type"),
            Some,
        )),
    ];
    dispatch(ty, value, &first_some(handlers))?.ok_or_else(|| ReldocError::UnsupportedOperation {
        type_name: ty.identifier().to_string(),
        reason: format!("no payload for a {} value", value.shape()),
    })
}

// ------------- ObjectBuilder -------------
enum Pending {
    Scalar {
        field: FieldDescriptor,
        locale: Option<String>,
        payload: Payload,
    },
    // resolved against the store when the builder commits
    Reference {
        field: FieldDescriptor,
        reference: String,
        target: TypeRef,
    },
    Nested {
        field: FieldDescriptor,
        builder: ObjectBuilder,
    },
}

impl Pending {
    fn field(&self) -> &FieldDescriptor {
        match self {
            Pending::Scalar { field, .. } | Pending::Reference { field, .. } | Pending::Nested { field, .. } => field,
        }
    }
}

// a pending field once its nested instance, if any, has been written
enum StagedEdge {
    Field(Pending),
    Child { field: FieldDescriptor, child: EntityId },
}

/// Stages the fields of one instance and writes them all in `build`.
pub struct ObjectBuilder {
    ty: TypeRef,
    reference: Option<String>,
    pending: Vec<Pending>,
}

impl ObjectBuilder {
    pub fn new(ty: impl Into<TypeRef>) -> Self {
        Self {
            ty: ty.into(),
            reference: None,
            pending: Vec::new(),
        }
    }
    pub fn type_descriptor(&self) -> &TypeRef {
        &self.ty
    }
    /// Replaces whatever was staged for the field.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let field = self.ty.field_or_err(field)?.clone();
        let value = value.into();
        if field.is_identifier() {
            return match value {
                Value::Text(reference) => {
                    check_limit(&field, &reference)?;
                    self.reference = Some(reference);
                    Ok(self)
                }
                other => Err(ReldocError::UnsupportedOperation {
                    type_name: self.ty.identifier().to_string(),
                    reason: format!("identifier {} needs text, got {}", field.name(), other.shape()),
                }),
            };
        }
        let staged = stage(&field, field.value_type(), value)?;
        self.pending.retain(|p| p.field().name() != field.name());
        self.pending.push(staged);
        Ok(self)
    }
    pub fn set_localized(mut self, field: &str, locale: &str, text: &str) -> Result<Self> {
        let field = self.ty.field_or_err(field)?.clone();
        let kind = TypeKind::of(field.value_type());
        if !matches!(kind, TypeKind::LocalizedString) {
            return kind.unsupported(&format!("{} is not localized", field.name()));
        }
        if locale.chars().count() > LOCALE_LIMIT {
            return Err(ReldocError::Schema(format!("locale '{}' is longer than {}", locale, LOCALE_LIMIT)));
        }
        check_limit(&field, text)?;
        self.pending.retain(|p| match p {
            Pending::Scalar { field: f, locale: l, .. } => f.name() != field.name() || l.as_deref() != Some(locale),
            _ => true,
        });
        self.pending.push(Pending::Scalar {
            field,
            locale: Some(locale.to_string()),
            payload: Payload::Text(text.to_string()),
        });
        Ok(self)
    }
    pub fn set_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }
    pub fn set_object(mut self, field: &str, builder: ObjectBuilder) -> Result<Self> {
        let field = self.ty.field_or_err(field)?.clone();
        if !matches!(TypeKind::of(field.value_type()), TypeKind::Object(_)) || **field.value_type() != *builder.ty {
            return Err(ReldocError::Schema(format!(
                "{}.{} holds {}, not {}",
                self.ty,
                field.name(),
                field.value_type(),
                builder.ty
            )));
        }
        self.pending.retain(|p| p.field().name() != field.name());
        self.pending.push(Pending::Nested { field, builder });
        Ok(self)
    }
    /// Appends one element to an array or map field.
    pub fn add(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let field = self.ty.field_or_err(field)?.clone();
        let element = element_type(&field)?;
        let staged = stage(&field, &element, value.into())?;
        self.pending.push(staged);
        Ok(self)
    }
    pub fn add_object(mut self, field: &str, builder: ObjectBuilder) -> Result<Self> {
        let field = self.ty.field_or_err(field)?.clone();
        let element = element_type(&field)?;
        if *element != *builder.ty {
            return Err(ReldocError::Schema(format!(
                "{}.{} holds {}, not {}",
                self.ty,
                field.name(),
                element,
                builder.ty
            )));
        }
        self.pending.push(Pending::Nested { field, builder });
        Ok(self)
    }
    /// Places the nested object in the one field whose type, or element type, is the builder's type.
    pub fn add_item(self, builder: ObjectBuilder) -> Result<Self> {
        let candidates: Vec<(String, bool)> = self
            .ty
            .fields()
            .iter()
            .filter_map(|f| {
                let ty = f.value_type();
                if **ty == *builder.ty {
                    Some((f.name().to_string(), false))
                } else {
                    match TypeKind::of(ty) {
                        TypeKind::Array(Some(element)) | TypeKind::Map(Some(element)) if **element == *builder.ty => {
                            Some((f.name().to_string(), true))
                        }
                        _ => None,
                    }
                }
            })
            .collect();
        match candidates.as_slice() {
            [(name, true)] => {
                let name = name.clone();
                self.add_object(&name, builder)
            }
            [(name, false)] => {
                let name = name.clone();
                self.set_object(&name, builder)
            }
            [] => Err(ReldocError::Schema(format!("{} has no field for {}", self.ty, builder.ty))),
            _ => Err(ReldocError::Schema(format!(
                "{} has {} fields for {}, the item is ambiguous",
                self.ty,
                candidates.len(),
                builder.ty
            ))),
        }
    }
    /// A builder for the object held by `field`.
    pub fn new_field_builder(&self, field: &str) -> Result<ObjectBuilder> {
        let field = self.ty.field_or_err(field)?;
        match TypeKind::of(field.value_type()) {
            TypeKind::Object(_) => Ok(ObjectBuilder::new(field.value_type().clone())),
            kind => kind.unsupported(&format!("{} does not hold an object", field.name())),
        }
    }
    /// A builder for one element of the container held by `field`.
    pub fn new_item_builder(&self, field: &str) -> Result<ObjectBuilder> {
        let field = self.ty.field_or_err(field)?;
        let element = element_type(field)?;
        match TypeKind::of(&element) {
            TypeKind::Object(_) => Ok(ObjectBuilder::new(element.clone())),
            kind => kind.unsupported(&format!("elements of {} are not objects", field.name())),
        }
    }
    /// Writes the instance, its edges and every nested instance, or nothing at all.
    pub fn build(self, repository: &Repository) -> Result<Entity> {
        repository.transaction(|| self.commit(repository))
    }
    fn commit(self, repository: &Repository) -> Result<Entity> {
        let store = repository.store();
        let ObjectBuilder { ty, reference, pending } = self;
        if ty.flags().is_abstract {
            return Err(ReldocError::Schema(format!("{} is abstract", ty)));
        }
        let reference = match reference {
            Some(reference) => reference,
            None if ty.is_referencable() => {
                return Err(ReldocError::Schema(format!("{} needs a reference before it is built", ty)));
            }
            None => random_reference(repository, &ty)?,
        };
        if repository.find(&reference, &ty)?.is_some() {
            return Err(ReldocError::Duplicate {
                reference,
                type_name: ty.identifier().to_string(),
            });
        }
        for field in ty.fields() {
            if field.is_mandatory() && !field.is_identifier() && !pending.iter().any(|p| p.field().name() == field.name()) {
                return Err(ReldocError::Schema(format!("mandatory field {}.{} is not set", ty, field.name())));
            }
        }
        let id = store.insert_entity(ty.code(), &reference)?;
        // nested instances first, so tokens may point at them or at the root
        let mut staged_edges = Vec::with_capacity(pending.len());
        for staged in pending {
            staged_edges.push(match staged {
                Pending::Nested { field, builder } => {
                    let child = builder.commit(repository)?;
                    StagedEdge::Child { field, child: child.id }
                }
                other => StagedEdge::Field(other),
            });
        }
        for staged in &staged_edges {
            if let StagedEdge::Field(Pending::Reference { reference, target, .. }) = staged {
                if repository.find(reference, target)?.is_none() {
                    return Err(ReldocError::ReferenceResolution {
                        reference: reference.clone(),
                        type_name: target.identifier().to_string(),
                    });
                }
            }
        }
        for staged in staged_edges {
            match staged {
                StagedEdge::Field(Pending::Scalar { field, locale, payload }) => {
                    store.insert_edge(id, field_row(&field)?, locale.as_deref(), &payload)?;
                }
                StagedEdge::Field(Pending::Reference { field, reference, .. }) => {
                    store.insert_edge(id, field_row(&field)?, None, &Payload::Text(reference))?;
                }
                StagedEdge::Field(Pending::Nested { field, .. }) => {
                    return Err(ReldocError::Schema(format!("{}.{} was not committed", ty, field.name())));
                }
                StagedEdge::Child { field, child } => {
                    store.insert_edge(
                        id,
                        child,
                        None,
                        &Payload::Child {
                            field: field.name().to_string(),
                        },
                    )?;
                }
            }
        }
        debug!("Built {} '{}' as entity {}", ty, reference, id);
        Ok(Entity {
            id,
            type_code: ty.code(),
            reference,
        })
    }
}

fn stage(field: &FieldDescriptor, ty: &TypeDescriptor, value: Value) -> Result<Pending> {
    let kind = TypeKind::of(ty);
    match kind {
        TypeKind::Reference(target) => {
            let target = match target {
                Some(target) => target.clone(),
                None => return kind.unsupported("the reference has no target type"),
            };
            let reference = match value {
                Value::Null => {
                    return Ok(Pending::Scalar {
                        field: field.clone(),
                        locale: None,
                        payload: Payload::Null,
                    });
                }
                Value::Text(reference) => reference,
                Value::Entity(entity) if entity.type_code == target.code() => entity.reference,
                Value::Entity(entity) => {
                    return Err(ReldocError::Schema(format!("{} is not a {}", entity, target)));
                }
                other => return kind.unsupported(&format!("cannot point at a {} value", other.shape())),
            };
            Ok(Pending::Reference {
                field: field.clone(),
                reference,
                target,
            })
        }
        TypeKind::Object(_) => kind.unsupported("objects are staged with a builder"),
        TypeKind::Array(_) | TypeKind::Map(_) => kind.unsupported("elements are staged one by one with add"),
        _ => {
            if let Value::Text(text) = &value {
                check_limit(field, text)?;
            }
            let payload = payload_for(ty, &value)?;
            Ok(Pending::Scalar {
                field: field.clone(),
                locale: None,
                payload,
            })
        }
    }
}

fn element_type(field: &FieldDescriptor) -> Result<TypeRef> {
    let kind = TypeKind::of(field.value_type());
    match kind {
        TypeKind::Array(Some(element)) | TypeKind::Map(Some(element)) => Ok(element.clone()),
        _ => kind.unsupported(&format!("{} is not an array or a map", field.name())),
    }
}

fn check_limit(field: &FieldDescriptor, text: &str) -> Result<()> {
    match field.limit() {
        Some(limit) if text.chars().count() > limit => Err(ReldocError::Schema(format!(
            "'{}' is longer than the {} characters {} allows",
            text,
            limit,
            field.name()
        ))),
        _ => Ok(()),
    }
}

fn field_row(field: &FieldDescriptor) -> Result<EntityId> {
    field
        .entity()
        .ok_or_else(|| ReldocError::Schema(format!("field {} has no stored definition", field.name())))
}

fn random_reference(repository: &Repository, ty: &TypeDescriptor) -> Result<String> {
    loop {
        let candidate = rand::random::<u32>().to_string();
        if repository.find(&candidate, ty)?.is_none() {
            return Ok(candidate);
        }
    }
}
