//! # Method & Type Descriptors
//!
//! The wire-safe description of a shared interface. The owner builds it once
//! and sends it whole in `NEW_CLASS`; the peer stores it verbatim and never
//! re-derives method order or ids on its own.
//!
//! ## Wire shape
//!
//! ```text
//! TypeDescriptor   = List[U16(id), String(name), List[MethodDescriptor...]]
//! MethodDescriptor = List[U16(id), String(signature), U8(call type)]
//! ```

use rmi_rpc::FromValue;
use rmi_rpc::IntoValue;
use rmi_rpc::Value;

use crate::call_type::CallType;
use crate::call_type::MethodShape;
use crate::call_type::call_type_of;
use crate::error::Error;
use crate::error::Result;
use crate::ids::InterfaceId;
use crate::ids::MethodId;

/// One exposed method of a shared interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub id: MethodId,
    pub signature: String,
    pub call_type: CallType,
}

/// One shared interface, numbered by the cache that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub id: InterfaceId,
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
}

impl TypeDescriptor {
    /// Describes an interface from its method shapes. Method ids follow
    /// declaration order.
    pub fn from_shapes(id: InterfaceId, name: &str, shapes: &[MethodShape]) -> Result<Self> {
        let methods = shapes
            .iter()
            .enumerate()
            .map(|(idx, shape)| {
                let id = u16::try_from(idx).map_err(|_| Error::IdsExhausted)?;
                Ok(MethodDescriptor {
                    id: MethodId(id),
                    signature: shape.signature(),
                    call_type: call_type_of(shape),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id, name: name.to_string(), methods })
    }

    pub fn method(&self, id: MethodId) -> Option<&MethodDescriptor> {
        self.methods.get(id.0 as usize)
    }

    /// Linear scan; callers cache the answer.
    pub fn method_by_signature(&self, signature: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.signature == signature)
    }

    pub fn to_value(&self) -> Value {
        let methods = self
            .methods
            .iter()
            .map(|m| {
                Value::List(vec![
                    m.id.0.into_value(),
                    m.signature.clone().into_value(),
                    m.call_type.into_value(),
                ])
            })
            .collect();

        Value::List(vec![self.id.0.into_value(), self.name.clone().into_value(), Value::List(methods)])
    }

    /// Decodes a descriptor sent by the peer. Any malformed field is a
    /// protocol violation.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = Fields::open(value, 3, "type descriptor")?;
        let id = InterfaceId(fields.next("type id")?);
        let name: String = fields.next("type name")?;
        let raw_methods: Vec<Value> = fields.next("method list")?;

        let methods = raw_methods
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| {
                let mut fields = Fields::open(raw, 3, "method descriptor")?;
                let method = MethodDescriptor {
                    id: MethodId(fields.next("method id")?),
                    signature: fields.next("method signature")?,
                    call_type: fields.next("call type")?,
                };
                if method.id.0 as usize != idx {
                    return Err(Error::ProtocolViolation(format!(
                        "{} has id {} at position {}",
                        method.signature, method.id, idx
                    )));
                }
                Ok(method)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { id, name, methods })
    }
}

/// Reads the fields of a fixed-length list in order.
struct Fields {
    items: std::vec::IntoIter<Value>,
    what: &'static str,
}

impl Fields {
    fn open(value: Value, len: usize, what: &'static str) -> Result<Self> {
        match value {
            Value::List(items) if items.len() == len => Ok(Self { items: items.into_iter(), what }),
            other => Err(Error::ProtocolViolation(format!(
                "malformed {}: expected list of {}, found {}",
                what,
                len,
                other.kind()
            ))),
        }
    }

    fn next<T: FromValue>(&mut self, field: &str) -> Result<T> {
        let value = self.items.next().unwrap_or(Value::Unit);
        T::from_value(value)
            .map_err(|e| Error::ProtocolViolation(format!("malformed {} in {}: {}", field, self.what, e)))
    }
}
