//! # Dynamic values
//!
//! Arguments and results cross the RPC boundary as `Value`s. The RPC layer
//! never looks inside them; turning a `Value` into bytes is the concern of
//! whatever carries the connection.
//!
//! `IntoValue` and `FromValue` bridge ordinary Rust types to `Value`. Decoding
//! is strict: a `U32` never silently becomes a `U64`.

/// A dynamically typed argument or result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    List(Vec<Value>),
    Option(Option<Box<Value>>),
}

impl Value {
    /// Short name of the value's kind, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::S8(_) => "s8",
            Value::S16(_) => "s16",
            Value::S32(_) => "s32",
            Value::S64(_) => "s64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Option(_) => "option",
        }
    }
}

/// A value did not have the shape the receiver expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ValueError {
    pub fn mismatch(expected: &'static str, found: &Value) -> Self {
        Self { expected, found: found.kind() }
    }
}

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value mismatch: expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueError {}

/// Converts a Rust value into a `Value`.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Converts a `Value` back into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

/// Invokes `$m` once per scalar that maps onto exactly one `Value` variant.
macro_rules! for_each_scalar {
    ($m:ident) => {
        $m!(bool, Bool, "bool");
        $m!(u8,   U8,   "u8");
        $m!(u16,  U16,  "u16");
        $m!(u32,  U32,  "u32");
        $m!(u64,  U64,  "u64");
        $m!(i8,   S8,   "s8");
        $m!(i16,  S16,  "s16");
        $m!(i32,  S32,  "s32");
        $m!(i64,  S64,  "s64");
        $m!(f32,  F32,  "f32");
        $m!(f64,  F64,  "f64");
        $m!(char, Char, "char");
    };
}

macro_rules! impl_scalar {
    ($ty:ty, $var:ident, $kind:literal) => {
        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                Value::$var(self)
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, ValueError> {
                match value {
                    Value::$var(v) => Ok(v),
                    other => Err(ValueError::mismatch($kind, &other)),
                }
            }
        }
    };
}

for_each_scalar!(impl_scalar);

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Unit
    }
}

impl FromValue for () {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Unit => Ok(()),
            other => Err(ValueError::mismatch("unit", &other)),
        }
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ValueError::mismatch("string", &other)),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch("list", &other)),
        }
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        Value::Option(self.map(|v| Box::new(v.into_value())))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Option(None) => Ok(None),
            Value::Option(Some(inner)) => T::from_value(*inner).map(Some),
            other => Err(ValueError::mismatch("option", &other)),
        }
    }
}
