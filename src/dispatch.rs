//! Type dispatch: every type descriptor maps onto exactly one [`TypeKind`], and a
//! [`TypeHandler`] answers for all kinds in a single exhaustive match.
//!
//! Handlers compose through the small set of combinators below. Each combinator
//! still lets exactly one underlying handler produce the result.
use std::marker::PhantomData;

use crate::datatype::{StandardType, TypeClass, TypeDescriptor, TypeRef, LOCALIZED_STRING, REFERENCE_SUFFIX};
use crate::error::{ReldocError, Result};

#[derive(Debug, Clone, Copy)]
pub enum TypeKind<'a> {
    Any,
    String,
    Binary,
    Long,
    Double,
    DateTime,
    Boolean,
    Name,
    Path,
    Reference(Option<&'a TypeRef>),
    WeakReference(Option<&'a TypeRef>),
    Uri,
    Decimal,
    TypeDef,
    Date,
    Array(Option<&'a TypeRef>),
    Map(Option<&'a TypeRef>),
    Null,
    LocalizedString,
    Object(&'a TypeDescriptor),
}

impl<'a> TypeKind<'a> {
    pub fn of(ty: &'a TypeDescriptor) -> TypeKind<'a> {
        match ty.class() {
            TypeClass::Standard(standard) => TypeKind::standard(standard, None),
            TypeClass::Parametrized(standard) => TypeKind::standard(standard, ty.value_type()),
            TypeClass::Defined => {
                if ty.identifier() == LOCALIZED_STRING {
                    TypeKind::LocalizedString
                } else if ty.identifier().ends_with(REFERENCE_SUFFIX) {
                    TypeKind::Reference(ty.value_type())
                } else {
                    TypeKind::Object(ty)
                }
            }
        }
    }
    fn standard(standard: StandardType, value_type: Option<&'a TypeRef>) -> TypeKind<'a> {
        match standard {
            StandardType::Any => TypeKind::Any,
            StandardType::String => TypeKind::String,
            StandardType::Binary => TypeKind::Binary,
            StandardType::Long => TypeKind::Long,
            StandardType::Double => TypeKind::Double,
            StandardType::DateTime => TypeKind::DateTime,
            StandardType::Boolean => TypeKind::Boolean,
            StandardType::Name => TypeKind::Name,
            StandardType::Path => TypeKind::Path,
            StandardType::Reference => TypeKind::Reference(value_type),
            StandardType::WeakReference => TypeKind::WeakReference(value_type),
            StandardType::Uri => TypeKind::Uri,
            StandardType::Decimal => TypeKind::Decimal,
            StandardType::TypeDef => TypeKind::TypeDef,
            StandardType::Date => TypeKind::Date,
            StandardType::Array => TypeKind::Array(value_type),
            StandardType::Map => TypeKind::Map(value_type),
            StandardType::Null => TypeKind::Null,
        }
    }
    pub fn name(&self) -> &str {
        match self {
            TypeKind::Any => "Any",
            TypeKind::String => "String",
            TypeKind::Binary => "Binary",
            TypeKind::Long => "Long",
            TypeKind::Double => "Double",
            TypeKind::DateTime => "DateTime",
            TypeKind::Boolean => "Boolean",
            TypeKind::Name => "Name",
            TypeKind::Path => "Path",
            TypeKind::Reference(_) => "Reference",
            TypeKind::WeakReference(_) => "WeakReference",
            TypeKind::Uri => "Uri",
            TypeKind::Decimal => "Decimal",
            TypeKind::TypeDef => "TypeDef",
            TypeKind::Date => "Date",
            TypeKind::Array(_) => "Array",
            TypeKind::Map(_) => "Map",
            TypeKind::Null => "Null",
            TypeKind::LocalizedString => LOCALIZED_STRING,
            TypeKind::Object(ty) => ty.identifier(),
        }
    }
    /// Kinds whose values sit directly in an edge payload.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            TypeKind::Array(_) | TypeKind::Map(_) | TypeKind::Object(_) | TypeKind::Reference(_)
        )
    }
    pub fn unsupported<T>(&self, reason: &str) -> Result<T> {
        Err(ReldocError::UnsupportedOperation {
            type_name: self.name().to_string(),
            reason: reason.to_string(),
        })
    }
}

pub trait TypeHandler<C: ?Sized> {
    type Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<Self::Output>;
}

pub fn dispatch<C, H>(ty: &TypeDescriptor, context: &C, handler: &H) -> Result<H::Output>
where
    C: ?Sized,
    H: TypeHandler<C> + ?Sized,
{
    handler.handle(&TypeKind::of(ty), context)
}

impl<C: ?Sized, H: TypeHandler<C> + ?Sized> TypeHandler<C> for &H {
    type Output = H::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<Self::Output> {
        (**self).handle(kind, context)
    }
}
impl<C: ?Sized, H: TypeHandler<C> + ?Sized> TypeHandler<C> for Box<H> {
    type Output = H::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<Self::Output> {
        (**self).handle(kind, context)
    }
}

// ------------- Closures -------------
pub struct FnHandler<F>(F);

pub fn handler_fn<C, R, F>(f: F) -> FnHandler<F>
where
    C: ?Sized,
    F: Fn(&TypeKind<'_>, &C) -> Result<R>,
{
    FnHandler(f)
}

impl<C, R, F> TypeHandler<C> for FnHandler<F>
where
    C: ?Sized,
    F: Fn(&TypeKind<'_>, &C) -> Result<R>,
{
    type Output = R;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<R> {
        (self.0)(kind, context)
    }
}

// ------------- Combinators -------------
pub struct Constant<R, C: ?Sized> {
    value: R,
    context: PhantomData<fn(&C)>,
}

/// Ignores kind and context alike.
pub fn constant<C: ?Sized, R: Clone>(value: R) -> Constant<R, C> {
    Constant {
        value,
        context: PhantomData,
    }
}

impl<C: ?Sized, R: Clone> TypeHandler<C> for Constant<R, C> {
    type Output = R;
    fn handle(&self, _kind: &TypeKind<'_>, _context: &C) -> Result<R> {
        Ok(self.value.clone())
    }
}

pub struct Chain<A, B> {
    first: A,
    second: B,
}

/// Runs `first` for its effects, then answers with `second`.
pub fn chain<A, B>(first: A, second: B) -> Chain<A, B> {
    Chain { first, second }
}

impl<C: ?Sized, A: TypeHandler<C>, B: TypeHandler<C>> TypeHandler<C> for Chain<A, B> {
    type Output = B::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<B::Output> {
        self.first.handle(kind, context)?;
        self.second.handle(kind, context)
    }
}

pub struct Conditional<P, T, O> {
    predicate: P,
    then: T,
    otherwise: O,
}

/// Dispatches the predicate first and hands the kind to exactly one branch.
pub fn conditional<P, T, O>(predicate: P, then: T, otherwise: O) -> Conditional<P, T, O> {
    Conditional {
        predicate,
        then,
        otherwise,
    }
}

impl<C, P, T, O> TypeHandler<C> for Conditional<P, T, O>
where
    C: ?Sized,
    P: TypeHandler<C, Output = bool>,
    T: TypeHandler<C>,
    O: TypeHandler<C, Output = T::Output>,
{
    type Output = T::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<T::Output> {
        if self.predicate.handle(kind, context)? {
            self.then.handle(kind, context)
        } else {
            self.otherwise.handle(kind, context)
        }
    }
}

pub struct Unsupported<R> {
    reason: String,
    output: PhantomData<fn() -> R>,
}

impl<C: ?Sized, R> TypeHandler<C> for Unsupported<R> {
    type Output = R;
    fn handle(&self, kind: &TypeKind<'_>, _context: &C) -> Result<R> {
        kind.unsupported(&self.reason)
    }
}

/// Like [`conditional`], failing with an unsupported operation when the predicate says no.
pub fn conditional_or_throw<P, T, R>(predicate: P, then: T, reason: &str) -> Conditional<P, T, Unsupported<R>> {
    conditional(
        predicate,
        then,
        Unsupported {
            reason: reason.to_string(),
            output: PhantomData,
        },
    )
}

pub struct OrNone<T> {
    then: T,
}

impl<C: ?Sized, T: TypeHandler<C>> TypeHandler<C> for OrNone<T> {
    type Output = Option<T::Output>;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<Self::Output> {
        self.then.handle(kind, context).map(Some)
    }
}

/// Answers `None` when the predicate says no.
pub fn conditional_or_none<C: ?Sized, P, T, R: Clone>(
    predicate: P,
    then: T,
) -> Conditional<P, OrNone<T>, Constant<Option<R>, C>> {
    conditional(predicate, OrNone { then }, constant(None))
}

pub struct MapResult<H, F> {
    inner: H,
    f: F,
}

pub fn map_result<H, F>(inner: H, f: F) -> MapResult<H, F> {
    MapResult { inner, f }
}

impl<C, H, F, R> TypeHandler<C> for MapResult<H, F>
where
    C: ?Sized,
    H: TypeHandler<C>,
    F: Fn(H::Output) -> R,
{
    type Output = R;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<R> {
        self.inner.handle(kind, context).map(&self.f)
    }
}

pub struct MapContext<H, F> {
    inner: H,
    f: F,
}

/// Adapts a handler written for context `D` to context `C`.
pub fn map_context<H, F>(inner: H, f: F) -> MapContext<H, F> {
    MapContext { inner, f }
}

impl<C, D, H, F> TypeHandler<C> for MapContext<H, F>
where
    C: ?Sized,
    H: TypeHandler<D>,
    F: Fn(&C) -> D,
{
    type Output = H::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<H::Output> {
        self.inner.handle(kind, &(self.f)(context))
    }
}

pub struct Delegating<B, F> {
    base: B,
    overrides: F,
}

/// Passes every kind through to `base` unless `overrides` claims it.
pub fn delegating<B, F>(base: B, overrides: F) -> Delegating<B, F> {
    Delegating { base, overrides }
}

impl<C, B, F> TypeHandler<C> for Delegating<B, F>
where
    C: ?Sized,
    B: TypeHandler<C>,
    F: Fn(&TypeKind<'_>, &C) -> Option<Result<B::Output>>,
{
    type Output = B::Output;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<B::Output> {
        match (self.overrides)(kind, context) {
            Some(result) => result,
            None => self.base.handle(kind, context),
        }
    }
}

pub struct FirstSome<'h, C: ?Sized, R> {
    handlers: Vec<Box<dyn TypeHandler<C, Output = Option<R>> + 'h>>,
}

/// Tries each handler in turn and answers with the first `Some`.
pub fn first_some<'h, C: ?Sized, R>(
    handlers: Vec<Box<dyn TypeHandler<C, Output = Option<R>> + 'h>>,
) -> FirstSome<'h, C, R> {
    FirstSome { handlers }
}

impl<C: ?Sized, R> TypeHandler<C> for FirstSome<'_, C, R> {
    type Output = Option<R>;
    fn handle(&self, kind: &TypeKind<'_>, context: &C) -> Result<Option<R>> {
        for handler in &self.handlers {
            if let Some(result) = handler.handle(kind, context)? {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }
}
