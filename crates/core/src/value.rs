use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bitmask of the value kinds a socket accepts (`typeID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeMask(pub u32);

impl TypeMask {
    pub const NONE: TypeMask = TypeMask(0);
    pub const FLOAT: TypeMask = TypeMask(1 << 0);
    pub const INT: TypeMask = TypeMask(1 << 1);
    pub const BOOL: TypeMask = TypeMask(1 << 2);
    pub const VEC2: TypeMask = TypeMask(1 << 3);
    pub const VEC3: TypeMask = TypeMask(1 << 4);
    pub const STRING: TypeMask = TypeMask(1 << 5);
    /// Carried by control-flow sockets, which transport no data.
    pub const FLOW: TypeMask = TypeMask(1 << 6);
    pub const NUMBER: TypeMask = TypeMask(Self::FLOAT.0 | Self::INT.0 | Self::BOOL.0);
    pub const ANY: TypeMask = TypeMask(u32::MAX);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn intersects(self, other: TypeMask) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: TypeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for TypeMask {
    type Output = TypeMask;

    fn bitor(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for TypeMask {
    fn bitor_assign(&mut self, rhs: TypeMask) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TypeMask {
    type Output = TypeMask;

    fn bitand(self, rhs: TypeMask) -> TypeMask {
        TypeMask(self.0 & rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SocketValue {
    #[default]
    None,
    Float(f32),
    Int(i64),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    String(String),
}

impl SocketValue {
    pub fn kind(&self) -> TypeMask {
        match self {
            SocketValue::None => TypeMask::NONE,
            SocketValue::Float(_) => TypeMask::FLOAT,
            SocketValue::Int(_) => TypeMask::INT,
            SocketValue::Bool(_) => TypeMask::BOOL,
            SocketValue::Vec2(_) => TypeMask::VEC2,
            SocketValue::Vec3(_) => TypeMask::VEC3,
            SocketValue::String(_) => TypeMask::STRING,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, SocketValue::None)
    }

    /// Numeric view used by the arithmetic nodes; `None` and non-scalars read as absent.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            SocketValue::Float(v) => Some(*v),
            SocketValue::Int(v) => Some(*v as f32),
            SocketValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SocketValue::Int(v) => Some(*v),
            SocketValue::Float(v) => Some(*v as i64),
            SocketValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SocketValue::Bool(v) => Some(*v),
            SocketValue::Int(v) => Some(*v != 0),
            SocketValue::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }
}

impl fmt::Display for SocketValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketValue::None => write!(f, "none"),
            SocketValue::Float(v) => write!(f, "{v}"),
            SocketValue::Int(v) => write!(f, "{v}"),
            SocketValue::Bool(v) => write!(f, "{v}"),
            SocketValue::Vec2([x, y]) => write!(f, "({x}, {y})"),
            SocketValue::Vec3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            SocketValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<f32> for SocketValue {
    fn from(value: f32) -> Self {
        SocketValue::Float(value)
    }
}

impl From<i64> for SocketValue {
    fn from(value: i64) -> Self {
        SocketValue::Int(value)
    }
}

impl From<bool> for SocketValue {
    fn from(value: bool) -> Self {
        SocketValue::Bool(value)
    }
}

impl From<&str> for SocketValue {
    fn from(value: &str) -> Self {
        SocketValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_single_bits() {
        assert_eq!(SocketValue::Float(1.0).kind(), TypeMask::FLOAT);
        assert_eq!(SocketValue::None.kind(), TypeMask::NONE);
        assert!(TypeMask::NUMBER.contains(TypeMask::INT));
        assert!(!TypeMask::NUMBER.intersects(TypeMask::STRING));
    }

    #[test]
    fn numeric_views_coerce_scalars() {
        assert_eq!(SocketValue::Int(3).as_f32(), Some(3.0));
        assert_eq!(SocketValue::Bool(true).as_i64(), Some(1));
        assert_eq!(SocketValue::Vec2([1.0, 2.0]).as_f32(), None);
        assert_eq!(SocketValue::None.as_bool(), None);
    }

    #[test]
    fn value_serializes_with_kind_tag() {
        let json = serde_json::to_string(&SocketValue::Float(2.5)).unwrap();
        assert_eq!(json, r#"{"kind":"float","value":2.5}"#);
        let back: SocketValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SocketValue::Float(2.5));
    }
}
