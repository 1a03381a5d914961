//! Shader types reflected from compiled modules and the host value conversions they accept.

use std::fmt;

use crate::value::{Scalar, Value};

/// Scalar types that can cross the host/shader boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    I32,
    U32,
    F32,
}

/// `f32` represents every integer up to this magnitude exactly.
const F32_EXACT_INT: u32 = 1 << 24;

impl ScalarType {
    /// Convert a host scalar to this type, if the conversion is lossless.
    ///
    /// Integers widen to `f32` when their magnitude is at most 2^24; signed and
    /// unsigned integers convert into each other only when the value fits.
    /// Floats never narrow to integers.
    pub fn marshal(self, value: Scalar) -> Option<Scalar> {
        match (self, value) {
            (Self::Bool, Scalar::Bool(v)) => Some(Scalar::Bool(v)),
            (Self::I32, Scalar::I32(v)) => Some(Scalar::I32(v)),
            (Self::I32, Scalar::U32(v)) => i32::try_from(v).ok().map(Scalar::I32),
            (Self::U32, Scalar::U32(v)) => Some(Scalar::U32(v)),
            (Self::U32, Scalar::I32(v)) => u32::try_from(v).ok().map(Scalar::U32),
            (Self::F32, Scalar::F32(v)) => Some(Scalar::F32(v)),
            (Self::F32, Scalar::I32(v)) if v.unsigned_abs() <= F32_EXACT_INT => {
                Some(Scalar::F32(v as f32))
            }
            (Self::F32, Scalar::U32(v)) if v <= F32_EXACT_INT => Some(Scalar::F32(v as f32)),
            _ => None,
        }
    }

    pub(crate) fn from_naga(scalar: naga::Scalar) -> Option<Self> {
        match (scalar.kind, scalar.width) {
            (naga::ScalarKind::Bool, _) => Some(Self::Bool),
            (naga::ScalarKind::Sint, 4) => Some(Self::I32),
            (naga::ScalarKind::Uint, 4) => Some(Self::U32),
            (naga::ScalarKind::Float, 4) => Some(Self::F32),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
        })
    }
}

/// The declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Scalar(ScalarType),
    Vector { size: u8, scalar: ScalarType },
    /// A type the bridge cannot marshal (arrays, structs, matrices, pointers, ...).
    Opaque(String),
}

impl ShaderType {
    /// Convert a host value to this type, or `None` if it cannot be converted.
    pub fn marshal(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::Scalar(ty), Value::Scalar(s)) => ty.marshal(*s).map(Value::Scalar),
            (Self::Vector { size, scalar }, Value::Vector(components))
                if components.len() == *size as usize =>
            {
                components
                    .iter()
                    .map(|c| scalar.marshal(*c))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Vector)
            }
            _ => None,
        }
    }

    /// Scalar component type, if the type is marshalable.
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            Self::Scalar(s) | Self::Vector { scalar: s, .. } => Some(*s),
            Self::Opaque(_) => None,
        }
    }

    /// Whether values of this type can cross the host/shader boundary.
    pub fn is_marshalable(&self) -> bool {
        !matches!(self, Self::Opaque(_))
    }

    /// Number of 32-bit words a value of this type occupies in an argument buffer.
    pub fn word_count(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector { size, .. } => *size as usize,
            Self::Opaque(_) => 0,
        }
    }

    /// Reflect a naga type.
    pub(crate) fn from_naga(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Self {
        let ty = &module.types[ty];
        let reflected = match ty.inner {
            naga::TypeInner::Scalar(scalar) => ScalarType::from_naga(scalar).map(Self::Scalar),
            naga::TypeInner::Vector { size, scalar } => {
                ScalarType::from_naga(scalar).map(|scalar| Self::Vector {
                    size: size as u8,
                    scalar,
                })
            }
            _ => None,
        };
        reflected.unwrap_or_else(|| Self::Opaque(describe_naga_type(module, ty)))
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Vector { size, scalar } => write!(f, "vec{size}<{scalar}>"),
            Self::Opaque(name) => f.write_str(name),
        }
    }
}

fn describe_scalar(scalar: naga::Scalar) -> String {
    match scalar.kind {
        naga::ScalarKind::Bool => "bool".to_string(),
        naga::ScalarKind::Sint => format!("i{}", scalar.width * 8),
        naga::ScalarKind::Uint => format!("u{}", scalar.width * 8),
        naga::ScalarKind::Float => format!("f{}", scalar.width * 8),
        naga::ScalarKind::AbstractInt => "abstract-int".to_string(),
        naga::ScalarKind::AbstractFloat => "abstract-float".to_string(),
    }
}

fn describe_naga_type(module: &naga::Module, ty: &naga::Type) -> String {
    if let Some(name) = &ty.name {
        return name.clone();
    }
    match ty.inner {
        naga::TypeInner::Scalar(scalar) => describe_scalar(scalar),
        naga::TypeInner::Vector { size, scalar } => {
            format!("vec{}<{}>", size as u8, describe_scalar(scalar))
        }
        naga::TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!(
            "mat{}x{}<{}>",
            columns as u8,
            rows as u8,
            describe_scalar(scalar)
        ),
        naga::TypeInner::Array { base, size, .. } => {
            let base = describe_naga_type(module, &module.types[base]);
            match size {
                naga::ArraySize::Constant(n) => format!("array<{base}, {n}>"),
                _ => format!("array<{base}>"),
            }
        }
        naga::TypeInner::Pointer { base, .. } => {
            format!("ptr<{}>", describe_naga_type(module, &module.types[base]))
        }
        naga::TypeInner::Atomic(scalar) => format!("atomic<{}>", describe_scalar(scalar)),
        _ => "unsupported".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_widening() {
        let f32_ty = ShaderType::Scalar(ScalarType::F32);
        assert_eq!(f32_ty.marshal(&Value::from(1)), Some(Value::from(1.0f32)));
        assert_eq!(f32_ty.marshal(&Value::from(2u32)), Some(Value::from(2.0f32)));
        assert_eq!(f32_ty.marshal(&Value::from(true)), None);

        let exact = 16_777_216;
        assert_eq!(f32_ty.marshal(&Value::from(exact)), Some(Value::from(exact as f32)));
        assert_eq!(f32_ty.marshal(&Value::from(-exact)), Some(Value::from(-exact as f32)));
        assert_eq!(f32_ty.marshal(&Value::from(16_777_217)), None);
        assert_eq!(f32_ty.marshal(&Value::from(u32::MAX)), None);
        assert_eq!(f32_ty.marshal(&Value::from(i32::MIN)), None);
    }

    #[test]
    fn test_integer_conversions() {
        let i32_ty = ShaderType::Scalar(ScalarType::I32);
        let u32_ty = ShaderType::Scalar(ScalarType::U32);
        assert_eq!(i32_ty.marshal(&Value::from(5u32)), Some(Value::from(5)));
        assert_eq!(i32_ty.marshal(&Value::from(u32::MAX)), None);
        assert_eq!(u32_ty.marshal(&Value::from(5)), Some(Value::from(5u32)));
        assert_eq!(u32_ty.marshal(&Value::from(-1)), None);
        assert_eq!(i32_ty.marshal(&Value::from(1.0f32)), None);
    }

    #[test]
    fn test_vector_marshal() {
        let vec3 = ShaderType::Vector {
            size: 3,
            scalar: ScalarType::F32,
        };
        assert_eq!(
            vec3.marshal(&Value::from([1, 2, 3])),
            Some(Value::from([1.0f32, 2.0, 3.0]))
        );
        assert_eq!(vec3.marshal(&Value::from([1.0f32, 2.0])), None);
        assert_eq!(vec3.marshal(&Value::from(1.0f32)), None);
        assert_eq!(
            ShaderType::Scalar(ScalarType::F32).marshal(&Value::from([1.0f32, 2.0])),
            None
        );
    }

    #[test]
    fn test_opaque_rejects_everything() {
        let opaque = ShaderType::Opaque("array<f32, 4>".to_string());
        assert_eq!(opaque.marshal(&Value::from(1.0f32)), None);
        assert!(!opaque.is_marshalable());
        assert_eq!(opaque.to_string(), "array<f32, 4>");
    }

    #[test]
    fn test_reflect_from_naga() {
        let module = naga::front::wgsl::parse_str(
            "struct S { x: f32 }\n\
             fn f(a: f32, b: vec3<u32>, c: array<f32, 4>, d: S, e: mat2x2<f32>) -> f32 { return a; }",
        )
        .unwrap();
        let (_, function) = module.functions.iter().next().unwrap();
        let reflected: Vec<ShaderType> = function
            .arguments
            .iter()
            .map(|arg| ShaderType::from_naga(&module, arg.ty))
            .collect();
        assert_eq!(reflected[0], ShaderType::Scalar(ScalarType::F32));
        assert_eq!(
            reflected[1],
            ShaderType::Vector {
                size: 3,
                scalar: ScalarType::U32
            }
        );
        assert_eq!(reflected[2], ShaderType::Opaque("array<f32, 4>".to_string()));
        assert_eq!(reflected[3], ShaderType::Opaque("S".to_string()));
        assert_eq!(reflected[4], ShaderType::Opaque("mat2x2<f32>".to_string()));
        assert_eq!(reflected[1].word_count(), 3);
    }
}
