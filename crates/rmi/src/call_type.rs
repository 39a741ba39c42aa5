//! # Call-Type Policy
//!
//! Decides how a call to a shared method is delivered, from the method's
//! declared shape alone.
//!
//! ## Invariants
//!
//! - A method that returns a value is always `Synchronous`; the caller needs
//!   the result.
//! - A void method without a marker is `Synchronous` too.
//! - Only a void method with a marker is `Asynchronous` or `Unreliable`.

use rmi_rpc::FromValue;
use rmi_rpc::IntoValue;
use rmi_rpc::Value;
use rmi_rpc::ValueError;

/// Delivery semantics of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Wait for the reply; the call has a result.
    Synchronous,
    /// Reliable fire-and-forget on the object's channel.
    Asynchronous,
    /// Best-effort fire-and-forget on the unreliable channel.
    Unreliable,
}

impl CallType {
    fn as_tag(self) -> u8 {
        match self {
            CallType::Synchronous => 0,
            CallType::Asynchronous => 1,
            CallType::Unreliable => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CallType::Synchronous),
            1 => Some(CallType::Asynchronous),
            2 => Some(CallType::Unreliable),
            _ => None,
        }
    }
}

impl IntoValue for CallType {
    fn into_value(self) -> Value {
        Value::U8(self.as_tag())
    }
}

impl FromValue for CallType {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        let tag = u8::from_value(value)?;
        CallType::from_tag(tag).ok_or(ValueError { expected: "call type tag", found: "u8" })
    }
}

/// Marks a void method as fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncMarker {
    /// Delivered reliably and in order on the object's channel.
    Reliable,
    /// Delivered best-effort; may be dropped.
    Unreliable,
}

/// Static description of one method of a shared interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodShape {
    pub name: &'static str,
    pub params: &'static [&'static str],
    /// `None` for methods that return nothing.
    pub returns: Option<&'static str>,
    pub marker: Option<AsyncMarker>,
}

impl MethodShape {
    /// Canonical signature string: return type, name, parameter types.
    pub fn signature(&self) -> String {
        format!("{} {}({})", self.returns.unwrap_or("void"), self.name, self.params.join(","))
    }
}

/// Derives the call type of a method shape.
pub fn call_type_of(shape: &MethodShape) -> CallType {
    if shape.returns.is_some() {
        return CallType::Synchronous;
    }
    match shape.marker {
        None => CallType::Synchronous,
        Some(AsyncMarker::Reliable) => CallType::Asynchronous,
        Some(AsyncMarker::Unreliable) => CallType::Unreliable,
    }
}
