use core::fmt;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

use crate::func::{FuncValue, LeftArrowFn};

/// A value in the execution-context data tree.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(Mapping),
    /// An opaque host record with exposed fields and methods.
    Object(Rc<dyn Object>),
    Func(FuncValue),
    /// A left arrow function, callable via `<-`.
    LeftArrow(Rc<dyn LeftArrowFn>),
    /// A left arrow function still waiting for its argument.
    Lazy(Rc<dyn LeftArrowFn>),
}

/// Top-level kind classes; binary operands must agree on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    Seq,
    Map,
    Object,
    Func,
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Uint(_) => Kind::Uint,
            Value::Float(_) => Kind::Float,
            Value::String(_) => Kind::String,
            Value::Bytes(_) => Kind::Bytes,
            Value::Seq(_) => Kind::Seq,
            Value::Map(_) => Kind::Map,
            Value::Object(_) => Kind::Object,
            Value::Func(_) | Value::LeftArrow(_) | Value::Lazy(_) => Kind::Func,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            Kind::Null => "nil",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Seq => "array",
            Kind::Map => "map",
            Kind::Object => "object",
            Kind::Func => "function",
        }
    }

    pub fn is_func(&self) -> bool {
        self.kind() == Kind::Func
    }
}

/// An opaque host record. Name lookup resolves fields (case-exact first,
/// then case-insensitive); methods are resolved only at call sites and come
/// back already bound to their receiver.
pub trait Object {
    fn type_name(&self) -> &'static str {
        "object"
    }

    fn field(&self, name: &str) -> Option<Value>;

    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn method(&self, name: &str) -> Option<FuncValue> {
        let _ = name;
        None
    }
}

/// An insertion-ordered mapping. Keys are usually scalars but may be
/// function values restored from left arrow placeholders, so no hashing is
/// assumed.
#[derive(Clone, Default)]
pub struct Mapping {
    entries: Vec<(Value, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pair, replacing the value of an existing equal key.
    pub fn insert(&mut self, key: Value, value: Value) {
        for (k, v) in &mut self.entries {
            if equal(k, &key) == Some(true) {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| equal(k, key) == Some(true))
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, Value::String(key) if key == name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }
}

impl IntoIterator for Mapping {
    type Item = (Value, Value);
    type IntoIter = std::vec::IntoIter<(Value, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(Value, Value)> for Mapping {
    fn from_iter<T: IntoIterator<Item = (Value, Value)>>(iter: T) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::LeftArrow(a), Value::LeftArrow(b)) => Rc::ptr_eq(a, b),
            (Value::Lazy(a), Value::Lazy(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Uint(v) => write!(f, "Uint({v})"),
            Value::Float(v) => write!(f, "Float({v})"),
            Value::String(v) => write!(f, "String({v:?})"),
            Value::Bytes(v) => write!(f, "Bytes({v:?})"),
            Value::Seq(v) => f.debug_tuple("Seq").field(v).finish(),
            Value::Map(v) => f.debug_tuple("Map").field(v).finish(),
            Value::Object(v) => write!(f, "Object({})", v.type_name()),
            Value::Func(_) => write!(f, "Func"),
            Value::LeftArrow(_) => write!(f, "LeftArrow"),
            Value::Lazy(_) => write!(f, "Lazy"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Uint(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{}", value),
            Value::Bytes(value) => write!(f, "{:?}", value),
            Value::Seq(values) => {
                let values: Vec<String> = values.iter().map(|v| format!("{}", v)).collect();
                write!(f, "[{}]", values.join(", "))
            }
            Value::Map(mapping) => {
                let pairs = mapping
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "{{{}}}", pairs)
            }
            Value::Object(object) => write!(f, "{}", object.type_name()),
            Value::Func(_) | Value::LeftArrow(_) | Value::Lazy(_) => write!(f, "function"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Uint(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::Seq(values)
    }
}

impl From<Mapping> for Value {
    fn from(mapping: Mapping) -> Self {
        Value::Map(mapping)
    }
}

/// Structural equality for comparable kinds; `None` means the operands are
/// not comparable (arrays, maps, functions other than byte sequences).
pub(crate) fn equal(x: &Value, y: &Value) -> Option<bool> {
    match (x, y) {
        (Value::Null, Value::Null) => Some(true),
        (Value::Bool(a), Value::Bool(b)) => Some(a == b),
        (Value::Int(a), Value::Int(b)) => Some(a == b),
        (Value::Uint(a), Value::Uint(b)) => Some(a == b),
        (Value::Float(a), Value::Float(b)) => Some(a == b),
        (Value::String(a), Value::String(b)) => Some(a == b),
        (Value::Bytes(a), Value::Bytes(b)) => Some(a == b),
        _ => None,
    }
}

/// Name lookup against maps (exact key) and object fields (case-exact
/// first, then case-insensitive).
pub(crate) fn field(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Map(mapping) => mapping.get_str(name).cloned(),
        Value::Object(object) => object.field(name).or_else(|| {
            let fallback = object
                .field_names()
                .into_iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(name))?;
            object.field(&fallback)
        }),
        _ => None,
    }
}

/// Index lookup against sequences (0-based) and maps (scalar keys).
pub(crate) fn index(value: &Value, idx: &Value) -> Option<Value> {
    match (value, idx) {
        (Value::Seq(items), Value::Int(i)) => {
            let i = usize::try_from(*i).ok()?;
            items.get(i).cloned()
        }
        (Value::Seq(items), Value::Uint(i)) => {
            let i = usize::try_from(*i).ok()?;
            items.get(i).cloned()
        }
        (Value::Map(mapping), key) => mapping.get(key).cloned(),
        _ => None,
    }
}

pub(crate) fn method(value: &Value, name: &str) -> Option<FuncValue> {
    match value {
        Value::Object(object) => object.method(name),
        _ => None,
    }
}

/// Formal parameter kinds for function values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    Seq,
    Map,
    Func,
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        match self {
            ParamKind::Any => "any",
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Uint => "uint",
            ParamKind::Float => "float",
            ParamKind::String => "string",
            ParamKind::Bytes => "bytes",
            ParamKind::Seq => "array",
            ParamKind::Map => "map",
            ParamKind::Func => "function",
        }
    }
}

/// Lossless conversion of an argument to a formal parameter kind. `None`
/// means the value cannot represent the target exactly.
pub(crate) fn convert(value: Value, target: ParamKind) -> Option<Value> {
    match target {
        ParamKind::Any => Some(value),
        ParamKind::Bool => matches!(value, Value::Bool(_)).then_some(value),
        ParamKind::Int => match value {
            Value::Int(_) => Some(value),
            Value::Uint(u) => i64::try_from(u).ok().map(Value::Int),
            _ => None,
        },
        ParamKind::Uint => match value {
            Value::Uint(_) => Some(value),
            Value::Int(i) => u64::try_from(i).ok().map(Value::Uint),
            _ => None,
        },
        ParamKind::Float => match value {
            Value::Float(_) => Some(value),
            Value::Int(i) => {
                // The cast back saturates at the type bounds, so the upper
                // bound itself must be rejected explicitly.
                let f = i as f64;
                (f != (i64::MAX as f64) && f as i64 == i).then_some(Value::Float(f))
            }
            Value::Uint(u) => {
                let f = u as f64;
                (f != (u64::MAX as f64) && f as u64 == u).then_some(Value::Float(f))
            }
            _ => None,
        },
        ParamKind::String => match value {
            Value::String(_) => Some(value),
            Value::Bool(_) | Value::Int(_) | Value::Uint(_) | Value::Float(_) => {
                Some(Value::String(value.to_string()))
            }
            Value::Bytes(bytes) => String::from_utf8(bytes).ok().map(Value::String),
            _ => None,
        },
        ParamKind::Bytes => match value {
            Value::Bytes(_) => Some(value),
            Value::String(s) => Some(Value::Bytes(s.into_bytes())),
            _ => None,
        },
        ParamKind::Seq => matches!(value, Value::Seq(_)).then_some(value),
        ParamKind::Map => matches!(value, Value::Map(_)).then_some(value),
        ParamKind::Func => value.is_func().then_some(value),
    }
}

/// Converts a decoded YAML document into a `Value` tree, preserving mapping
/// order.
pub fn from_yaml(yaml: serde_yaml::Value) -> Result<Value> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Uint(u))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(anyhow!("unsupported number {n}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(items) => Ok(Value::Seq(
            items.into_iter().map(from_yaml).collect::<Result<_>>()?,
        )),
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Mapping::new();
            for (key, value) in mapping {
                out.insert(from_yaml(key)?, from_yaml(value)?);
            }
            Ok(Value::Map(out))
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

/// Converts a `Value` tree back into a YAML document. Objects marshal via
/// their exposed fields; function values cannot be represented.
pub fn to_yaml(value: &Value) -> Result<serde_yaml::Value> {
    match value {
        Value::Null => Ok(serde_yaml::Value::Null),
        Value::Bool(b) => Ok(serde_yaml::Value::Bool(*b)),
        Value::Int(i) => Ok(serde_yaml::Value::Number((*i).into())),
        Value::Uint(u) => Ok(serde_yaml::Value::Number((*u).into())),
        Value::Float(f) => Ok(serde_yaml::Value::Number((*f).into())),
        Value::String(s) => Ok(serde_yaml::Value::String(s.clone())),
        Value::Bytes(bytes) => Ok(serde_yaml::Value::Sequence(
            bytes
                .iter()
                .map(|b| serde_yaml::Value::Number((*b as u64).into()))
                .collect(),
        )),
        Value::Seq(items) => Ok(serde_yaml::Value::Sequence(
            items.iter().map(to_yaml).collect::<Result<_>>()?,
        )),
        Value::Map(mapping) => {
            let mut out = serde_yaml::Mapping::new();
            for (key, value) in mapping.iter() {
                out.insert(to_yaml(key)?, to_yaml(value)?);
            }
            Ok(serde_yaml::Value::Mapping(out))
        }
        Value::Object(object) => {
            let names = object.field_names();
            if names.is_empty() {
                bail!("cannot marshal {} as YAML", object.type_name());
            }
            let mut out = serde_yaml::Mapping::new();
            for name in names {
                let field = object
                    .field(&name)
                    .ok_or_else(|| anyhow!("cannot marshal {} as YAML", object.type_name()))?;
                out.insert(serde_yaml::Value::String(name), to_yaml(&field)?);
            }
            Ok(serde_yaml::Value::Mapping(out))
        }
        Value::Func(_) | Value::LeftArrow(_) | Value::Lazy(_) => {
            bail!("cannot marshal function as YAML")
        }
    }
}

/// Marshals a value as YAML text with the trailing newline trimmed.
pub fn marshal(value: &Value) -> Result<String> {
    let yaml = to_yaml(value)?;
    let text = serde_yaml::to_string(&yaml)?;
    Ok(text.strip_suffix('\n').unwrap_or(&text).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Response {
        code: i64,
    }

    impl Object for Response {
        fn type_name(&self) -> &'static str {
            "response"
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "Code" => Some(Value::Int(self.code)),
                _ => None,
            }
        }

        fn field_names(&self) -> Vec<String> {
            vec!["Code".to_string()]
        }
    }

    #[test]
    fn test_mapping_preserves_insertion_order() {
        let mut mapping = Mapping::new();
        mapping.insert(Value::from("b"), Value::from(1i64));
        mapping.insert(Value::from("a"), Value::from(2i64));
        mapping.insert(Value::from("b"), Value::from(3i64));

        let keys: Vec<String> = mapping.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(mapping.get_str("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_field_lookup_is_case_insensitive_on_objects() {
        let object = Value::Object(Rc::new(Response { code: 200 }));
        assert_eq!(field(&object, "Code"), Some(Value::Int(200)));
        assert_eq!(field(&object, "code"), Some(Value::Int(200)));
        assert_eq!(field(&object, "status"), None);
    }

    #[test]
    fn test_index_lookup() {
        let seq = Value::Seq(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(index(&seq, &Value::Int(1)), Some(Value::from("b")));
        assert_eq!(index(&seq, &Value::Int(2)), None);
        assert_eq!(index(&seq, &Value::Int(-1)), None);

        let map = Value::Map(Mapping::from_iter([
            (Value::Int(5), Value::from("five")),
            (Value::from("k"), Value::from("v")),
        ]));
        assert_eq!(index(&map, &Value::Int(5)), Some(Value::from("five")));
        assert_eq!(index(&map, &Value::from("k")), Some(Value::from("v")));
        assert_eq!(index(&map, &Value::Int(6)), None);
    }

    #[test]
    fn test_equal() {
        let tests = vec![
            (Value::Null, Value::Null, Some(true)),
            (Value::Int(1), Value::Int(1), Some(true)),
            (Value::Int(1), Value::Int(2), Some(false)),
            (Value::from("a"), Value::from("a"), Some(true)),
            (Value::Bytes(vec![1, 2]), Value::Bytes(vec![1, 2]), Some(true)),
            (Value::Bytes(vec![1, 2]), Value::Bytes(vec![1, 3]), Some(false)),
            (Value::Seq(vec![]), Value::Seq(vec![]), None),
            (Value::Map(Mapping::new()), Value::Map(Mapping::new()), None),
        ];

        for (x, y, expected) in tests {
            assert_eq!(equal(&x, &y), expected, "{x:?} == {y:?}");
        }
    }

    #[test]
    fn test_convert() {
        let tests = vec![
            (Value::Uint(7), ParamKind::Int, Some(Value::Int(7))),
            (Value::Uint(u64::MAX), ParamKind::Int, None),
            (Value::Int(-1), ParamKind::Uint, None),
            (Value::Int(3), ParamKind::Float, Some(Value::Float(3.0))),
            (Value::Int(i64::MAX), ParamKind::Float, None),
            (Value::Int(42), ParamKind::String, Some(Value::from("42"))),
            (Value::from("ab"), ParamKind::Bytes, Some(Value::Bytes(vec![b'a', b'b']))),
            (Value::from("x"), ParamKind::Int, None),
            (Value::Null, ParamKind::String, None),
            (Value::Null, ParamKind::Any, Some(Value::Null)),
        ];

        for (value, target, expected) in tests {
            assert_eq!(convert(value.clone(), target), expected, "{value:?} as {target:?}");
        }
    }

    #[test]
    fn test_yaml_round_trip_preserves_order() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("z: 1\na: 2\nm: 3\n").unwrap();
        let value = from_yaml(yaml).unwrap();
        let Value::Map(mapping) = &value else {
            panic!("expected map, got {value:?}");
        };
        let keys: Vec<String> = mapping.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string(), "m".to_string()]);

        assert_eq!(marshal(&value).unwrap(), "z: 1\na: 2\nm: 3");
    }

    #[test]
    fn test_marshal_trims_trailing_newline() {
        assert_eq!(marshal(&Value::from("world")).unwrap(), "world");
        assert_eq!(marshal(&Value::Int(14)).unwrap(), "14");
        assert_eq!(
            marshal(&Value::Seq(vec![Value::Int(1), Value::Int(2)])).unwrap(),
            "- 1\n- 2"
        );
    }

    #[test]
    fn test_marshal_object_uses_exposed_fields() {
        let object = Value::Object(Rc::new(Response { code: 200 }));
        assert_eq!(marshal(&object).unwrap(), "Code: 200");
    }
}
