//! Host-side values passed to and returned from shader functions.

use std::fmt;
use std::str::FromStr;

use crate::types::ScalarType;

/// A single scalar host value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
}

impl Scalar {
    /// The scalar type this value naturally has.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::I32(_) => ScalarType::I32,
            Self::U32(_) => ScalarType::U32,
            Self::F32(_) => ScalarType::F32,
        }
    }

    /// Reinterpret the scalar as a 32-bit word, the layout used in GPU buffers.
    pub fn to_bits(&self) -> u32 {
        match *self {
            Self::Bool(v) => v as u32,
            Self::I32(v) => v as u32,
            Self::U32(v) => v,
            Self::F32(v) => v.to_bits(),
        }
    }

    /// Rebuild a scalar of the given type from a 32-bit word.
    pub fn from_bits(ty: ScalarType, bits: u32) -> Self {
        match ty {
            ScalarType::Bool => Self::Bool(bits != 0),
            ScalarType::I32 => Self::I32(bits as i32),
            ScalarType::U32 => Self::U32(bits),
            ScalarType::F32 => Self::F32(f32::from_bits(bits)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}u"),
            // Debug formatting keeps the fractional part (`3.0`, not `3`).
            Self::F32(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! scalar_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Scalar {
            fn from(v: $ty) -> Self {
                Scalar::$variant(v)
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Scalar(Scalar::$variant(v))
            }
        }
    };
}

scalar_from!(bool, Bool);
scalar_from!(i32, I32);
scalar_from!(u32, U32);
scalar_from!(f32, F32);

/// Host floats are double precision; shader floats are not.
impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::F32(v as f32)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(Scalar::from(v))
    }
}

/// A host value: a scalar or a 2 to 4 component vector.
///
/// Arrays of 2, 3 or 4 scalars convert into vectors; other lengths do not.
///
/// ```compile_fail
/// let single = shadercall::Value::from([1.0f32]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
}

impl Value {
    /// The scalar components of this value (one for a scalar).
    pub fn components(&self) -> &[Scalar] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::Vector(v) => v,
        }
    }

    /// Returns the scalar if this value is one.
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Scalar(s) => Some(*s),
            Self::Vector(_) => None,
        }
    }

    /// Returns the value as `f32` if it is an `f32` scalar.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Scalar(Scalar::F32(v)) => Some(*v),
            _ => None,
        }
    }

    /// WGSL-style name of the value's type, e.g. `f32` or `vec3<f32>`.
    pub fn type_name(&self) -> String {
        match self {
            Self::Scalar(s) => s.scalar_type().to_string(),
            Self::Vector(v) => {
                let kind = match v.first() {
                    Some(first) if v.iter().all(|c| c.scalar_type() == first.scalar_type()) => {
                        first.scalar_type().to_string()
                    }
                    Some(_) => "mixed".to_string(),
                    None => "?".to_string(),
                };
                format!("vec{}<{kind}>", v.len())
            }
        }
    }

    /// Type name followed by the value, used in diagnostics.
    pub fn describe(&self) -> String {
        format!("{} {self}", self.type_name())
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

macro_rules! vector_from {
    ($($n:literal),*) => {
        $(
            impl<T: Into<Scalar>> From<[T; $n]> for Value {
                fn from(components: [T; $n]) -> Self {
                    Value::Vector(components.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

vector_from!(2, 3, 4);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Vector(v) => {
                write!(f, "[")?;
                for (i, c) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Error returned when a value literal cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseValueError(String);

impl fmt::Display for ParseValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value literal: {}", self.0)
    }
}

impl std::error::Error for ParseValueError {}

/// Parses value literals.
///
/// `true`/`false`, `7` or `7i` (i32), `7u` (u32), `1.5`, `1e3` or `2f` (f32),
/// and `[a, b, c]` vectors of 2 to 4 scalars sharing one type.
impl FromStr for Value {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[') {
            let inner = inner
                .strip_suffix(']')
                .ok_or_else(|| ParseValueError(format!("unterminated vector `{s}`")))?;
            let components = inner
                .split(',')
                .map(parse_scalar)
                .collect::<Result<Vec<_>, _>>()?;
            if !(2..=4).contains(&components.len()) {
                return Err(ParseValueError(format!(
                    "vectors have 2 to 4 components, got {}",
                    components.len()
                )));
            }
            let kind = components[0].scalar_type();
            if components.iter().any(|c| c.scalar_type() != kind) {
                return Err(ParseValueError(format!("mixed component types in `{s}`")));
            }
            return Ok(Value::Vector(components));
        }
        parse_scalar(s).map(Value::Scalar)
    }
}

fn parse_scalar(s: &str) -> Result<Scalar, ParseValueError> {
    let s = s.trim();
    let invalid = || ParseValueError(format!("`{s}`"));

    match s {
        "" => return Err(ParseValueError("empty literal".to_string())),
        "true" => return Ok(Scalar::Bool(true)),
        "false" => return Ok(Scalar::Bool(false)),
        _ => {}
    }

    if let Some(digits) = s.strip_suffix('u') {
        return digits.parse().map(Scalar::U32).map_err(|_| invalid());
    }
    if let Some(digits) = s.strip_suffix('i') {
        return digits.parse().map(Scalar::I32).map_err(|_| invalid());
    }
    if let Some(digits) = s.strip_suffix('f') {
        return digits.parse().map(Scalar::F32).map_err(|_| invalid());
    }
    if s.contains(['.', 'e', 'E']) {
        return s.parse().map(Scalar::F32).map_err(|_| invalid());
    }
    s.parse().map(Scalar::I32).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_host_values() {
        assert_eq!(Value::from(1.5f32), Value::Scalar(Scalar::F32(1.5)));
        assert_eq!(Value::from(1.5f64), Value::Scalar(Scalar::F32(1.5)));
        assert_eq!(Value::from(-3), Value::Scalar(Scalar::I32(-3)));
        assert_eq!(Value::from(3u32), Value::Scalar(Scalar::U32(3)));
        assert_eq!(
            Value::from([1.0f32, 2.0]),
            Value::Vector(vec![Scalar::F32(1.0), Scalar::F32(2.0)])
        );
        assert_eq!(Value::from([true, false, true]).type_name(), "vec3<bool>");
        assert_eq!(Value::from([1, 2, 3, 4]).type_name(), "vec4<i32>");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(3.0f32).to_string(), "3.0");
        assert_eq!(Value::from(7u32).to_string(), "7u");
        assert_eq!(Value::from([1.0f32, 2.5, 3.0]).to_string(), "[1.0, 2.5, 3.0]");
        assert_eq!(Value::from(true).describe(), "bool true");
        assert_eq!(Value::from([1u32, 2]).type_name(), "vec2<u32>");
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!("true".parse::<Value>().unwrap(), Value::from(true));
        assert_eq!("12".parse::<Value>().unwrap(), Value::from(12));
        assert_eq!("12i".parse::<Value>().unwrap(), Value::from(12));
        assert_eq!("12u".parse::<Value>().unwrap(), Value::from(12u32));
        assert_eq!("1.5".parse::<Value>().unwrap(), Value::from(1.5f32));
        assert_eq!("1e3".parse::<Value>().unwrap(), Value::from(1000.0f32));
        assert_eq!("2f".parse::<Value>().unwrap(), Value::from(2.0f32));
        assert_eq!(" -4 ".parse::<Value>().unwrap(), Value::from(-4));
    }

    #[test]
    fn test_parse_vectors() {
        assert_eq!(
            "[1.0, 2.0, 3.0]".parse::<Value>().unwrap(),
            Value::from([1.0f32, 2.0, 3.0])
        );
        assert!("[1.0]".parse::<Value>().is_err());
        assert!("[1, 2, 3, 4, 5]".parse::<Value>().is_err());
        assert!("[1, 2.0]".parse::<Value>().is_err());
        assert!("[1, 2".parse::<Value>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Value>().is_err());
        assert!("abc".parse::<Value>().is_err());
        assert!("-1u".parse::<Value>().is_err());
        assert!("1.0.0".parse::<Value>().is_err());
    }

    #[test]
    fn test_bits_roundtrip_layout() {
        assert_eq!(Scalar::F32(1.0).to_bits(), 0x3f80_0000);
        assert_eq!(Scalar::I32(-1).to_bits(), u32::MAX);
        assert_eq!(Scalar::from_bits(ScalarType::Bool, 1), Scalar::Bool(true));
        assert_eq!(Scalar::from_bits(ScalarType::I32, u32::MAX), Scalar::I32(-1));
    }
}
