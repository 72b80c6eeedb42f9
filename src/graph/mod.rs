//! In-memory object graph shipped inside a bundle.
//!
//! A payload is a tree of [`Node`]s. Objects carry a [`TypeRef`] pointing at
//! the module that declares their type; everything the rewriter and the
//! loader do operates on those references, never on encoded bytes.

pub mod codec;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use codec::{JsonCodec, PayloadCodec};

/// Location of a type: defining module (dotted path) plus the type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef {
    pub module: String,
    pub name: String,
}

impl TypeRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Parse `a.b.Name` into module `a.b` and name `Name`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (module, name) = qualified.rsplit_once('.')?;
        if module.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(module, name))
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// A typed object: its type location and named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectNode {
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    pub fields: BTreeMap<String, Node>,
}

impl ObjectNode {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Node) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Node> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned integers above `i64::MAX`.
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Node>),
    Map(BTreeMap<String, Node>),
    Object(ObjectNode),
}

/// Rust types that live in a shared source tree and know where.
pub trait Relocatable {
    /// Module and name of the type's declaration in the shared tree.
    fn type_ref() -> TypeRef;
}

/// Visitor over every type reference of a graph.
pub trait ReferenceVisitor {
    fn visit_type_ref(&mut self, type_ref: &mut TypeRef);
}

impl<F: FnMut(&mut TypeRef)> ReferenceVisitor for F {
    fn visit_type_ref(&mut self, type_ref: &mut TypeRef) {
        self(type_ref)
    }
}

impl Node {
    pub fn object(type_ref: TypeRef, fields: impl IntoIterator<Item = (String, Node)>) -> Self {
        Node::Object(ObjectNode {
            type_ref,
            fields: fields.into_iter().collect(),
        })
    }

    /// Convert any serializable value into untyped nodes (maps, lists, scalars).
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(Self::from_json(json))
    }

    /// Convert a [`Relocatable`] value into an object node. The value must
    /// serialize to a map; its entries become the object's fields.
    pub fn typed<T: Serialize + Relocatable>(value: &T) -> Result<Self> {
        match Self::from_serialize(value)? {
            Node::Map(fields) => Ok(Node::Object(ObjectNode {
                type_ref: T::type_ref(),
                fields,
            })),
            other => Err(Error::Codec(serde::ser::Error::custom(format!(
                "{} must serialize to a map of fields, got {}",
                T::type_ref(),
                other.kind_name()
            )))),
        }
    }

    /// Rebuild a Rust value from this graph. Objects contribute their fields
    /// as a map; type references are not consulted here.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }

    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Node::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::UInt(_) => "uint",
            Node::Float(_) => "float",
            Node::Str(_) => "str",
            Node::List(_) => "list",
            Node::Map(_) => "map",
            Node::Object(_) => "object",
        }
    }

    /// Drive `visitor` over every nested type reference, depth first.
    pub fn walk_type_refs_mut<V: ReferenceVisitor + ?Sized>(&mut self, visitor: &mut V) {
        match self {
            Node::List(items) => {
                for item in items {
                    item.walk_type_refs_mut(visitor);
                }
            }
            Node::Map(entries) => {
                for value in entries.values_mut() {
                    value.walk_type_refs_mut(visitor);
                }
            }
            Node::Object(obj) => {
                visitor.visit_type_ref(&mut obj.type_ref);
                for value in obj.fields.values_mut() {
                    value.walk_type_refs_mut(visitor);
                }
            }
            Node::Null
            | Node::Bool(_)
            | Node::Int(_)
            | Node::UInt(_)
            | Node::Float(_)
            | Node::Str(_) => {}
        }
    }

    /// Every type reference in the graph, in visiting order (duplicates kept).
    pub fn type_refs(&self) -> Vec<TypeRef> {
        let mut out = Vec::new();
        self.collect_type_refs(&mut out);
        out
    }

    /// Dotted field path of the first NaN or infinite float, if any.
    ///
    /// Payload codecs cannot carry those values, so packaging rejects them.
    pub fn non_finite_path(&self) -> Option<String> {
        fn walk(node: &Node, path: &mut Vec<String>) -> Option<String> {
            match node {
                Node::Float(f) if !f.is_finite() => Some(if path.is_empty() {
                    "<root>".to_string()
                } else {
                    path.join(".")
                }),
                Node::List(items) => items.iter().enumerate().find_map(|(i, item)| {
                    path.push(i.to_string());
                    let found = walk(item, path);
                    path.pop();
                    found
                }),
                Node::Map(fields) | Node::Object(ObjectNode { fields, .. }) => {
                    fields.iter().find_map(|(key, value)| {
                        path.push(key.clone());
                        let found = walk(value, path);
                        path.pop();
                        found
                    })
                }
                _ => None,
            }
        }
        walk(self, &mut Vec::new())
    }

    fn collect_type_refs(&self, out: &mut Vec<TypeRef>) {
        match self {
            Node::List(items) => items.iter().for_each(|n| n.collect_type_refs(out)),
            Node::Map(entries) => entries.values().for_each(|n| n.collect_type_refs(out)),
            Node::Object(obj) => {
                out.push(obj.type_ref.clone());
                obj.fields.values().for_each(|n| n.collect_type_refs(out));
            }
            _ => {}
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Node::Int(i),
                (None, Some(u)) => Node::UInt(u),
                (None, None) => Node::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Node::Str(s),
            Value::Array(items) => Node::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(entries) => Node::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::from(*i),
            Node::UInt(u) => Value::from(*u),
            Node::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Node::Str(s) => Value::String(s.clone()),
            Node::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Node::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Node::Object(obj) => Value::Object(
                obj.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}
