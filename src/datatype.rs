// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamps in the database
use chrono::{NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::{BigDecimal, ToPrimitive};
// used to keep the one-to-one mapping between type codes and standard types
use bimap::BiMap;

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::ops;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{ReldocError, Result};
use crate::store::{Entity, EntityId};

pub type TypeCode = i64;
pub type TypeRef = Arc<TypeDescriptor>;
pub type CodeHasher = BuildHasherDefault<SeaHasher>;

/// Name of the built-in type whose values are stored as locale tagged text.
pub const LOCALIZED_STRING: &str = "LocalizedString";
/// Types whose identifier ends with this suffix point at another type.
pub const REFERENCE_SUFFIX: &str = "Ref";
/// The identifier field every referencable type carries.
pub const REFERENCE_FIELD: &str = "reference";
/// Longest locale tag a localized string accepts.
pub const LOCALE_LIMIT: usize = 5;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ------------- Standard types --------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardType {
    Any,
    String,
    Binary,
    Long,
    Double,
    DateTime,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Decimal,
    TypeDef,
    Date,
    Array,
    Map,
    Null,
}

impl StandardType {
    pub const ALL: [StandardType; 18] = [
        StandardType::Any,
        StandardType::String,
        StandardType::Binary,
        StandardType::Long,
        StandardType::Double,
        StandardType::DateTime,
        StandardType::Boolean,
        StandardType::Name,
        StandardType::Path,
        StandardType::Reference,
        StandardType::WeakReference,
        StandardType::Uri,
        StandardType::Decimal,
        StandardType::TypeDef,
        StandardType::Date,
        StandardType::Array,
        StandardType::Map,
        StandardType::Null,
    ];

    pub const fn code(self) -> TypeCode {
        match self {
            StandardType::Any => 0,
            StandardType::String => 1,
            StandardType::Binary => 2,
            StandardType::Long => 3,
            StandardType::Double => 4,
            StandardType::DateTime => 5,
            StandardType::Boolean => 6,
            StandardType::Name => 7,
            StandardType::Path => 8,
            StandardType::Reference => 9,
            StandardType::WeakReference => 10,
            StandardType::Uri => 11,
            StandardType::Decimal => 12,
            StandardType::TypeDef => 16,
            StandardType::Date => 17,
            StandardType::Array => 18,
            StandardType::Map => 19,
            StandardType::Null => 20,
        }
    }
    pub fn identifier(self) -> &'static str {
        match self {
            StandardType::Any => "Any",
            StandardType::String => "String",
            StandardType::Binary => "Binary",
            StandardType::Long => "Long",
            StandardType::Double => "Double",
            StandardType::DateTime => "DateTime",
            StandardType::Boolean => "Boolean",
            StandardType::Name => "Name",
            StandardType::Path => "Path",
            StandardType::Reference => "Reference",
            StandardType::WeakReference => "WeakReference",
            StandardType::Uri => "Uri",
            StandardType::Decimal => "Decimal",
            StandardType::TypeDef => "TypeDef",
            StandardType::Date => "Date",
            StandardType::Array => "Array",
            StandardType::Map => "Map",
            StandardType::Null => "Null",
        }
    }
    pub fn from_code(code: TypeCode) -> Result<StandardType> {
        CODES
            .get_by_left(&code)
            .copied()
            .ok_or_else(|| ReldocError::UnknownType(format!("code {}", code)))
    }
    pub fn from_identifier(identifier: &str) -> Result<StandardType> {
        CODES
            .right_values()
            .find(|t| t.identifier() == identifier)
            .copied()
            .ok_or_else(|| ReldocError::UnknownType(identifier.to_string()))
    }
    /// Array, Map, Reference and WeakReference take a value type.
    pub fn is_parametrized(self) -> bool {
        matches!(
            self,
            StandardType::Array | StandardType::Map | StandardType::Reference | StandardType::WeakReference
        )
    }
    pub fn descriptor(self) -> TypeRef {
        Arc::clone(&STANDARD[&self])
    }
}
impl fmt::Display for StandardType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

lazy_static! {
    static ref CODES: BiMap<TypeCode, StandardType> = StandardType::ALL
        .iter()
        .map(|t| (t.code(), *t))
        .collect();
    static ref STANDARD: HashMap<StandardType, TypeRef> = StandardType::ALL
        .iter()
        .map(|t| (*t, Arc::new(TypeDescriptor::standard(*t))))
        .collect();
    // memoized parametrized descriptors keyed on (base code, value identifier, value code)
    static ref PARAMETRIZED: Mutex<HashMap<(TypeCode, String, TypeCode), TypeRef, CodeHasher>> =
        Mutex::new(HashMap::default());
    static ref PARAMETRIZED_IDENTIFIER: Regex =
        Regex::new(r"^(Array|Map|Reference|WeakReference)<(.+)>$").expect("valid identifier pattern");
}

// ------------- Type descriptors --------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Standard(StandardType),
    Parametrized(StandardType),
    Defined,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeFlags {
    pub is_abstract: bool,
    pub mixin: bool,
    pub referencable: bool,
    pub queryable: bool,
}

#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    identifier: String,
    code: TypeCode,
    class: TypeClass,
    flags: TypeFlags,
    value_type: Option<TypeRef>,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    fn standard(standard: StandardType) -> Self {
        Self {
            identifier: standard.identifier().to_string(),
            code: standard.code(),
            class: TypeClass::Standard(standard),
            flags: TypeFlags::default(),
            value_type: None,
            fields: Vec::new(),
        }
    }
    /// A type described by rows: its code is the identity of its TypeDef entity.
    pub fn defined(
        identifier: String,
        code: TypeCode,
        flags: TypeFlags,
        value_type: Option<TypeRef>,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            identifier,
            code,
            class: TypeClass::Defined,
            flags,
            value_type,
            fields,
        }
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn code(&self) -> TypeCode {
        self.code
    }
    pub fn class(&self) -> TypeClass {
        self.class
    }
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }
    pub fn is_referencable(&self) -> bool {
        self.flags.referencable
    }
    pub fn is_defined(&self) -> bool {
        self.class == TypeClass::Defined
    }
    pub fn value_type(&self) -> Option<&TypeRef> {
        self.value_type.as_ref()
    }
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
    pub fn field_or_err(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| ReldocError::UnknownField {
            field: name.to_string(),
            type_name: self.identifier.clone(),
        })
    }
    pub fn identifier_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.identifier)
    }
    /// Same identity, no fields. Stands in for a type that is still being loaded.
    pub fn shallow(&self) -> TypeDescriptor {
        Self {
            identifier: self.identifier.clone(),
            code: self.code,
            class: self.class,
            flags: self.flags,
            value_type: None,
            fields: Vec::new(),
        }
    }
}
impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.code == other.code
    }
}
impl Eq for TypeDescriptor {}
impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
        self.code.hash(state);
    }
}
impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.identifier)
    }
}

pub fn array_of(value_type: &TypeRef) -> TypeRef {
    parametrized(StandardType::Array, value_type)
}
pub fn map_of(value_type: &TypeRef) -> TypeRef {
    parametrized(StandardType::Map, value_type)
}
pub fn reference_of(value_type: &TypeRef) -> TypeRef {
    parametrized(StandardType::Reference, value_type)
}
pub fn weak_reference_of(value_type: &TypeRef) -> TypeRef {
    parametrized(StandardType::WeakReference, value_type)
}
pub fn parametrized(base: StandardType, value_type: &TypeRef) -> TypeRef {
    let key = (base.code(), value_type.identifier.clone(), value_type.code);
    let mut memo = PARAMETRIZED.lock().unwrap_or_else(PoisonError::into_inner);
    let kept = memo.entry(key).or_insert_with(|| {
        Arc::new(TypeDescriptor {
            identifier: format!("{}<{}>", base.identifier(), value_type.identifier),
            code: base.code(),
            class: TypeClass::Parametrized(base),
            flags: TypeFlags::default(),
            value_type: Some(Arc::clone(value_type)),
            fields: Vec::new(),
        })
    });
    Arc::clone(kept)
}
/// Splits `Array<Color>` into its base type and the value type identifier.
pub fn parse_parametrized(identifier: &str) -> Option<(StandardType, &str)> {
    let captures = PARAMETRIZED_IDENTIFIER.captures(identifier)?;
    let base = StandardType::from_identifier(captures.get(1)?.as_str()).ok()?;
    Some((base, captures.get(2)?.as_str()))
}

impl From<StandardType> for TypeRef {
    fn from(standard: StandardType) -> Self {
        standard.descriptor()
    }
}

// ------------- Field descriptors --------------
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    name: String,
    value_type: TypeRef,
    mandatory: bool,
    identifier: bool,
    limit: Option<usize>,
    description: Option<String>,
    entity: Option<EntityId>,
}

impl FieldDescriptor {
    pub fn new(name: &str, value_type: TypeRef) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            mandatory: false,
            identifier: false,
            limit: None,
            description: None,
            entity: None,
        }
    }
    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }
    pub fn identifying(mut self) -> Self {
        self.identifier = true;
        self
    }
    pub fn limited_to(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
    pub fn described(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
    pub fn backed_by(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value_type(&self) -> &TypeRef {
        &self.value_type
    }
    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    /// The field descriptor row, present once the owning type is persisted.
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }
}
impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value_type)
    }
}

// ------------- Values --------------
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Binary(Vec<u8>),
    Entity(Entity),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }
    /// Short name of the runtime shape, used in error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Binary(_) => "binary",
            Value::Entity(_) => "entity",
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Long(l) => write!(f, "{}", l),
            Value::Double(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::DateTime(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
            Value::Date(d) => write!(f, "{}", d),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Entity(e) => write!(f, "{}", e),
        }
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}
impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}
impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::Decimal(Decimal(d))
    }
}
impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::DateTime(d)
    }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}
impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Value::Entity(e)
    }
}
impl From<&Entity> for Value {
    fn from(e: &Entity) -> Self {
        Value::Entity(e.clone())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}

pub fn format_datetime(d: &NaiveDateTime) -> String {
    d.format(DATETIME_FORMAT).to_string()
}
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| s.parse::<NaiveDateTime>())
        .map_err(|e| ReldocError::Store(format!("invalid datetime '{}': {}", s, e)))
}
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| ReldocError::Store(format!("invalid date '{}': {}", s, e)))
}

/// Text that keeps the shape of a scalar, as `shape:value`. Used where the declared type is `Any`.
pub fn format_tagged(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Binary(_) | Value::Entity(_) => None,
        Value::Double(d) if !d.is_finite() => None,
        value => Some(format!("{}:{}", value.shape(), value)),
    }
}
pub fn parse_tagged(s: &str) -> Result<Value> {
    let (shape, text) = s
        .split_once(':')
        .ok_or_else(|| ReldocError::Store(format!("'{}' carries no shape", s)))?;
    match shape {
        "text" => Ok(Value::Text(text.to_string())),
        "long" => text.parse().map(Value::Long).map_err(|e| invalid(shape, text, e)),
        "double" => text.parse().map(Value::Double).map_err(|e| invalid(shape, text, e)),
        "boolean" => text.parse().map(Value::Boolean).map_err(|e| invalid(shape, text, e)),
        "decimal" => text.parse().map(Value::Decimal),
        "datetime" => parse_datetime(text).map(Value::DateTime),
        "date" => parse_date(text).map(Value::Date),
        _ => Err(ReldocError::Store(format!("unknown shape '{}' in '{}'", shape, s))),
    }
}
fn invalid(shape: &str, text: &str, e: impl fmt::Display) -> ReldocError {
    ReldocError::Store(format!("invalid {} '{}': {}", shape, text, e))
}

// ------------- Decimal --------------
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(pub BigDecimal);

impl Decimal {
    pub fn from_long(l: i64) -> Decimal {
        Decimal(BigDecimal::from(l))
    }
    /// Goes through the shortest text form, so 0.1 stays 0.1.
    pub fn from_double(d: f64) -> Option<Decimal> {
        if !d.is_finite() {
            return None;
        }
        BigDecimal::from_str(&d.to_string()).ok().map(Decimal)
    }
    pub fn from_bool(b: bool) -> Decimal {
        Decimal(BigDecimal::from(if b { 1 } else { 0 }))
    }
    pub fn to_long(&self) -> Option<i64> {
        self.0.to_i64()
    }
    pub fn to_double(&self) -> Option<f64> {
        self.0.to_f64()
    }
    pub fn is_one(&self) -> bool {
        self.0 == BigDecimal::from(1)
    }
}
impl FromStr for Decimal {
    type Err = ReldocError;
    fn from_str(s: &str) -> Result<Decimal> {
        BigDecimal::from_str(s)
            .map(Decimal)
            .map_err(|e| ReldocError::Store(format!("invalid decimal '{}': {}", s, e)))
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl FromSql for Decimal {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        BigDecimal::from_str(text)
            .map(Decimal)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
impl ToSql for Decimal {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.to_string()))
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
