//! CPU execution backend.
//!
//! Evaluates the validated naga IR of a function directly on the host. It
//! serves as the reference executor for tests and CI machines without a
//! GPU, and as the fallback when no adapter is available.
//!
//! Integer arithmetic follows WGSL: addition, subtraction, and
//! multiplication wrap, `x / 0 == x`, `x % 0 == 0`, and shift amounts are
//! taken modulo the bit width. Float to integer conversions saturate.

use std::collections::HashMap;

use naga::{Expression, Handle, Statement};

use crate::error::{BridgeError, Result};
use crate::shader::CompiledShader;
use crate::signature::Signature;
use crate::types::ScalarType;
use crate::value::{Scalar, Value};

use super::{BackendType, ExecutionBackend, find_function};

/// Default number of statements a single invocation may execute.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Interprets naga IR on the CPU.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    step_limit: u64,
}

impl CpuBackend {
    /// Create a CPU backend with the default step limit.
    pub fn new() -> Self {
        Self::with_step_limit(DEFAULT_STEP_LIMIT)
    }

    /// Create a CPU backend that aborts an invocation after `step_limit` statements.
    pub fn with_step_limit(step_limit: u64) -> Self {
        Self { step_limit }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "CPU Interpreter"
    }

    fn kind(&self) -> BackendType {
        BackendType::Cpu
    }

    fn execute(
        &self,
        shader: &CompiledShader,
        signature: &Signature,
        arguments: &[Value],
    ) -> Result<Value> {
        let function = find_function(&shader.module, signature.name())?;
        let mut interpreter = Interpreter::new(&shader.module, self.step_limit);
        let arguments = arguments.iter().map(Val::from).collect();

        let result = interpreter
            .call(function, arguments)?
            .ok_or_else(|| fault(format!("`{}` returned no value", signature.name())))?;
        log::trace!(
            "CpuBackend: `{}` finished after {} steps",
            signature.name(),
            interpreter.steps
        );
        result.into_value()
    }
}

fn fault(message: impl Into<String>) -> BridgeError {
    BridgeError::Execution(message.into())
}

// ============================================================================
// Runtime values
// ============================================================================

/// Root of a pointer: a function-local or a module-scope private variable.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Root {
    Local(Handle<naga::LocalVariable>),
    Global(Handle<naga::GlobalVariable>),
}

/// A pointer into a variable, with an access chain of component indices.
#[derive(Debug, Clone, PartialEq)]
struct Pointer {
    root: Root,
    path: Vec<usize>,
}

/// Interpreter value. Arrays, structs, and matrices are `Composite`.
#[derive(Debug, Clone, PartialEq)]
enum Val {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
    Composite(Vec<Val>),
    Pointer(Pointer),
}

impl From<&Value> for Val {
    fn from(value: &Value) -> Self {
        match value {
            Value::Scalar(s) => Val::Scalar(*s),
            Value::Vector(v) => Val::Vector(v.clone()),
        }
    }
}

impl Val {
    fn into_value(self) -> Result<Value> {
        match self {
            Val::Scalar(s) => Ok(Value::Scalar(s)),
            Val::Vector(v) => Ok(Value::Vector(v)),
            other => Err(fault(format!("cannot return {other:?} to the host"))),
        }
    }

    fn scalar(&self) -> Result<Scalar> {
        match self {
            Val::Scalar(s) => Ok(*s),
            other => Err(fault(format!("expected a scalar, found {other:?}"))),
        }
    }

    fn bool(&self) -> Result<bool> {
        match self.scalar()? {
            Scalar::Bool(b) => Ok(b),
            other => Err(fault(format!("expected a bool, found {other}"))),
        }
    }

    fn index(&self) -> Result<usize> {
        match self.scalar()? {
            Scalar::I32(i) => Ok(i as u32 as usize),
            Scalar::U32(u) => Ok(u as usize),
            other => Err(fault(format!("invalid index {other}"))),
        }
    }

    /// Scalar components for component-wise operations.
    fn components(&self) -> Result<&[Scalar]> {
        match self {
            Val::Scalar(s) => Ok(std::slice::from_ref(s)),
            Val::Vector(v) => Ok(v),
            other => Err(fault(format!("expected a scalar or vector, found {other:?}"))),
        }
    }
}

/// Out of range indices select the last element, matching the bounds check
/// policy the GPU backend compiles with.
fn clamp_index(index: usize, len: usize) -> Result<usize> {
    match len {
        0 => Err(fault("index into an empty value".to_string())),
        len => Ok(index.min(len - 1)),
    }
}

fn read_path(value: &Val, path: &[usize]) -> Result<Val> {
    let Some((&index, rest)) = path.split_first() else {
        return Ok(value.clone());
    };
    match value {
        Val::Vector(components) if rest.is_empty() => {
            Ok(Val::Scalar(components[clamp_index(index, components.len())?]))
        }
        Val::Composite(items) => read_path(&items[clamp_index(index, items.len())?], rest),
        other => Err(fault(format!("cannot index into {other:?}"))),
    }
}

/// Index into a value, or extend a pointer's access chain.
fn access(base: Val, index: usize) -> Result<Val> {
    match base {
        Val::Pointer(mut pointer) => {
            pointer.path.push(index);
            Ok(Val::Pointer(pointer))
        }
        value => read_path(&value, &[index]),
    }
}

fn write_path(target: &mut Val, path: &[usize], new: Val) -> Result<()> {
    let Some((&index, rest)) = path.split_first() else {
        *target = new;
        return Ok(());
    };
    match target {
        Val::Vector(components) if rest.is_empty() => {
            let index = clamp_index(index, components.len())?;
            components[index] = new.scalar()?;
            Ok(())
        }
        Val::Composite(items) => {
            let index = clamp_index(index, items.len())?;
            write_path(&mut items[index], rest, new)
        }
        other => Err(fault(format!("cannot index into {other:?}"))),
    }
}

/// Apply `f` component-wise, broadcasting scalar operands over vectors.
fn combine(args: &[&Val], f: impl Fn(&[Scalar]) -> Result<Scalar>) -> Result<Val> {
    let mut width = None;
    for arg in args {
        if let Val::Vector(v) = arg {
            match width {
                None => width = Some(v.len()),
                Some(w) if w != v.len() => {
                    return Err(fault("vector operands differ in size"));
                }
                Some(_) => {}
            }
        }
    }

    let lanes = args
        .iter()
        .map(|arg| arg.components())
        .collect::<Result<Vec<_>>>()?;
    let lane = |i: usize| -> Vec<Scalar> {
        lanes
            .iter()
            .map(|c| if c.len() == 1 { c[0] } else { c[i] })
            .collect()
    };

    match width {
        None => Ok(Val::Scalar(f(&lane(0))?)),
        Some(w) => (0..w)
            .map(|i| f(&lane(i)))
            .collect::<Result<Vec<_>>>()
            .map(Val::Vector),
    }
}

fn float(s: Scalar) -> Result<f32> {
    match s {
        Scalar::F32(v) => Ok(v),
        other => Err(fault(format!("expected f32, found {other}"))),
    }
}

fn floats(v: &Val) -> Result<Vec<f32>> {
    v.components()?.iter().map(|c| float(*c)).collect()
}

// ============================================================================
// Scalar operations
// ============================================================================

fn literal(lit: &naga::Literal) -> Result<Scalar> {
    match *lit {
        naga::Literal::F32(v) => Ok(Scalar::F32(v)),
        naga::Literal::I32(v) => Ok(Scalar::I32(v)),
        naga::Literal::U32(v) => Ok(Scalar::U32(v)),
        naga::Literal::Bool(v) => Ok(Scalar::Bool(v)),
        naga::Literal::AbstractInt(v) => i32::try_from(v)
            .map(Scalar::I32)
            .map_err(|_| fault(format!("integer literal {v} out of range"))),
        naga::Literal::AbstractFloat(v) => Ok(Scalar::F32(v as f32)),
        other => Err(fault(format!("unsupported literal {other:?}"))),
    }
}

fn zero_scalar(ty: ScalarType) -> Scalar {
    match ty {
        ScalarType::Bool => Scalar::Bool(false),
        ScalarType::I32 => Scalar::I32(0),
        ScalarType::U32 => Scalar::U32(0),
        ScalarType::F32 => Scalar::F32(0.0),
    }
}

fn unary(op: naga::UnaryOperator, s: Scalar) -> Result<Scalar> {
    use naga::UnaryOperator as Op;
    match (op, s) {
        (Op::Negate, Scalar::F32(v)) => Ok(Scalar::F32(-v)),
        (Op::Negate, Scalar::I32(v)) => Ok(Scalar::I32(v.wrapping_neg())),
        (Op::LogicalNot, Scalar::Bool(v)) => Ok(Scalar::Bool(!v)),
        (Op::BitwiseNot, Scalar::I32(v)) => Ok(Scalar::I32(!v)),
        (Op::BitwiseNot, Scalar::U32(v)) => Ok(Scalar::U32(!v)),
        (op, s) => Err(fault(format!("unsupported unary {op:?} on {s}"))),
    }
}

fn binary(op: naga::BinaryOperator, a: Scalar, b: Scalar) -> Result<Scalar> {
    use naga::BinaryOperator as Op;
    use std::cmp::Ordering;

    let ordering = |a: Scalar, b: Scalar| -> Option<Ordering> {
        match (a, b) {
            (Scalar::F32(x), Scalar::F32(y)) => x.partial_cmp(&y),
            (Scalar::I32(x), Scalar::I32(y)) => Some(x.cmp(&y)),
            (Scalar::U32(x), Scalar::U32(y)) => Some(x.cmp(&y)),
            (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(&y)),
            _ => None,
        }
    };

    let result = match (op, a, b) {
        (Op::Add, Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(x + y),
        (Op::Add, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x.wrapping_add(y)),
        (Op::Add, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x.wrapping_add(y)),
        (Op::Subtract, Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(x - y),
        (Op::Subtract, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x.wrapping_sub(y)),
        (Op::Subtract, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x.wrapping_sub(y)),
        (Op::Multiply, Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(x * y),
        (Op::Multiply, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x.wrapping_mul(y)),
        (Op::Multiply, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x.wrapping_mul(y)),
        (Op::Divide, Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(x / y),
        (Op::Divide, Scalar::I32(x), Scalar::I32(y)) => {
            Scalar::I32(if y == 0 { x } else { x.wrapping_div(y) })
        }
        (Op::Divide, Scalar::U32(x), Scalar::U32(y)) => {
            Scalar::U32(if y == 0 { x } else { x / y })
        }
        (Op::Modulo, Scalar::F32(x), Scalar::F32(y)) => Scalar::F32(x % y),
        (Op::Modulo, Scalar::I32(x), Scalar::I32(y)) => {
            Scalar::I32(if y == 0 { 0 } else { x.wrapping_rem(y) })
        }
        (Op::Modulo, Scalar::U32(x), Scalar::U32(y)) => {
            Scalar::U32(if y == 0 { 0 } else { x % y })
        }
        (Op::Equal, a, b) => Scalar::Bool(ordering(a, b) == Some(Ordering::Equal)),
        (Op::NotEqual, a, b) => Scalar::Bool(ordering(a, b) != Some(Ordering::Equal)),
        (Op::Less, a, b) => Scalar::Bool(ordering(a, b) == Some(Ordering::Less)),
        (Op::LessEqual, a, b) => Scalar::Bool(matches!(
            ordering(a, b),
            Some(Ordering::Less | Ordering::Equal)
        )),
        (Op::Greater, a, b) => Scalar::Bool(ordering(a, b) == Some(Ordering::Greater)),
        (Op::GreaterEqual, a, b) => Scalar::Bool(matches!(
            ordering(a, b),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        (Op::And | Op::LogicalAnd, Scalar::Bool(x), Scalar::Bool(y)) => Scalar::Bool(x && y),
        (Op::InclusiveOr | Op::LogicalOr, Scalar::Bool(x), Scalar::Bool(y)) => {
            Scalar::Bool(x || y)
        }
        (Op::ExclusiveOr, Scalar::Bool(x), Scalar::Bool(y)) => Scalar::Bool(x ^ y),
        (Op::And, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x & y),
        (Op::And, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x & y),
        (Op::InclusiveOr, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x | y),
        (Op::InclusiveOr, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x | y),
        (Op::ExclusiveOr, Scalar::I32(x), Scalar::I32(y)) => Scalar::I32(x ^ y),
        (Op::ExclusiveOr, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x ^ y),
        (Op::ShiftLeft, Scalar::I32(x), Scalar::U32(y)) => Scalar::I32(x.wrapping_shl(y)),
        (Op::ShiftLeft, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x.wrapping_shl(y)),
        (Op::ShiftRight, Scalar::I32(x), Scalar::U32(y)) => Scalar::I32(x.wrapping_shr(y)),
        (Op::ShiftRight, Scalar::U32(x), Scalar::U32(y)) => Scalar::U32(x.wrapping_shr(y)),
        (op, a, b) => return Err(fault(format!("unsupported {op:?} on {a} and {b}"))),
    };
    Ok(result)
}

fn convert(target: naga::ScalarKind, s: Scalar) -> Result<Scalar> {
    use naga::ScalarKind as Kind;
    let converted = match (target, s) {
        (Kind::Float, Scalar::F32(v)) => Scalar::F32(v),
        (Kind::Float, Scalar::I32(v)) => Scalar::F32(v as f32),
        (Kind::Float, Scalar::U32(v)) => Scalar::F32(v as f32),
        (Kind::Float, Scalar::Bool(v)) => Scalar::F32(if v { 1.0 } else { 0.0 }),
        // `as` saturates and maps NaN to zero.
        (Kind::Sint, Scalar::F32(v)) => Scalar::I32(v as i32),
        (Kind::Sint, Scalar::I32(v)) => Scalar::I32(v),
        (Kind::Sint, Scalar::U32(v)) => Scalar::I32(v as i32),
        (Kind::Sint, Scalar::Bool(v)) => Scalar::I32(v as i32),
        (Kind::Uint, Scalar::F32(v)) => Scalar::U32(v as u32),
        (Kind::Uint, Scalar::I32(v)) => Scalar::U32(v as u32),
        (Kind::Uint, Scalar::U32(v)) => Scalar::U32(v),
        (Kind::Uint, Scalar::Bool(v)) => Scalar::U32(v as u32),
        (Kind::Bool, Scalar::F32(v)) => Scalar::Bool(v != 0.0),
        (Kind::Bool, Scalar::I32(v)) => Scalar::Bool(v != 0),
        (Kind::Bool, Scalar::U32(v)) => Scalar::Bool(v != 0),
        (Kind::Bool, Scalar::Bool(v)) => Scalar::Bool(v),
        (kind, s) => return Err(fault(format!("unsupported conversion of {s} to {kind:?}"))),
    };
    Ok(converted)
}

fn bitcast(target: naga::ScalarKind, s: Scalar) -> Result<Scalar> {
    let ty = match target {
        naga::ScalarKind::Float => ScalarType::F32,
        naga::ScalarKind::Sint => ScalarType::I32,
        naga::ScalarKind::Uint => ScalarType::U32,
        kind => return Err(fault(format!("unsupported bitcast to {kind:?}"))),
    };
    Ok(Scalar::from_bits(ty, s.to_bits()))
}

fn float_op(args: &[Scalar], f: impl Fn(&[f32]) -> f32) -> Result<Scalar> {
    let values = args.iter().map(|s| float(*s)).collect::<Result<Vec<_>>>()?;
    Ok(Scalar::F32(f(&values)))
}

fn math(fun: naga::MathFunction, args: &[Val]) -> Result<Val> {
    use naga::MathFunction as Mf;

    let refs: Vec<&Val> = args.iter().collect();
    let float1 = |f: fn(f32) -> f32| combine(&refs, |s| float_op(s, |v| f(v[0])));
    let float2 = |f: fn(f32, f32) -> f32| combine(&refs, |s| float_op(s, |v| f(v[0], v[1])));
    let float3 =
        |f: fn(f32, f32, f32) -> f32| combine(&refs, |s| float_op(s, |v| f(v[0], v[1], v[2])));

    match fun {
        Mf::Abs => combine(&refs, |s| match s[0] {
            Scalar::F32(v) => Ok(Scalar::F32(v.abs())),
            Scalar::I32(v) => Ok(Scalar::I32(v.wrapping_abs())),
            Scalar::U32(v) => Ok(Scalar::U32(v)),
            other => Err(fault(format!("abs of {other}"))),
        }),
        Mf::Min => combine(&refs, |s| match (s[0], s[1]) {
            (Scalar::F32(a), Scalar::F32(b)) => Ok(Scalar::F32(a.min(b))),
            (Scalar::I32(a), Scalar::I32(b)) => Ok(Scalar::I32(a.min(b))),
            (Scalar::U32(a), Scalar::U32(b)) => Ok(Scalar::U32(a.min(b))),
            (a, b) => Err(fault(format!("min of {a} and {b}"))),
        }),
        Mf::Max => combine(&refs, |s| match (s[0], s[1]) {
            (Scalar::F32(a), Scalar::F32(b)) => Ok(Scalar::F32(a.max(b))),
            (Scalar::I32(a), Scalar::I32(b)) => Ok(Scalar::I32(a.max(b))),
            (Scalar::U32(a), Scalar::U32(b)) => Ok(Scalar::U32(a.max(b))),
            (a, b) => Err(fault(format!("max of {a} and {b}"))),
        }),
        Mf::Clamp => combine(&refs, |s| match (s[0], s[1], s[2]) {
            (Scalar::F32(e), Scalar::F32(lo), Scalar::F32(hi)) => {
                Ok(Scalar::F32(e.max(lo).min(hi)))
            }
            (Scalar::I32(e), Scalar::I32(lo), Scalar::I32(hi)) => {
                Ok(Scalar::I32(e.max(lo).min(hi)))
            }
            (Scalar::U32(e), Scalar::U32(lo), Scalar::U32(hi)) => {
                Ok(Scalar::U32(e.max(lo).min(hi)))
            }
            (e, lo, hi) => Err(fault(format!("clamp of {e}, {lo}, {hi}"))),
        }),
        Mf::Sign => combine(&refs, |s| match s[0] {
            Scalar::F32(v) => Ok(Scalar::F32(if v == 0.0 { 0.0 } else { v.signum() })),
            Scalar::I32(v) => Ok(Scalar::I32(v.signum())),
            other => Err(fault(format!("sign of {other}"))),
        }),
        Mf::CountOneBits => combine(&refs, |s| match s[0] {
            Scalar::I32(v) => Ok(Scalar::I32(v.count_ones() as i32)),
            Scalar::U32(v) => Ok(Scalar::U32(v.count_ones())),
            other => Err(fault(format!("countOneBits of {other}"))),
        }),
        Mf::ReverseBits => combine(&refs, |s| match s[0] {
            Scalar::I32(v) => Ok(Scalar::I32(v.reverse_bits())),
            Scalar::U32(v) => Ok(Scalar::U32(v.reverse_bits())),
            other => Err(fault(format!("reverseBits of {other}"))),
        }),
        Mf::Saturate => float1(|x| x.clamp(0.0, 1.0)),
        Mf::Cos => float1(f32::cos),
        Mf::Cosh => float1(f32::cosh),
        Mf::Sin => float1(f32::sin),
        Mf::Sinh => float1(f32::sinh),
        Mf::Tan => float1(f32::tan),
        Mf::Tanh => float1(f32::tanh),
        Mf::Acos => float1(f32::acos),
        Mf::Asin => float1(f32::asin),
        Mf::Atan => float1(f32::atan),
        Mf::Radians => float1(f32::to_radians),
        Mf::Degrees => float1(f32::to_degrees),
        Mf::Ceil => float1(f32::ceil),
        Mf::Floor => float1(f32::floor),
        Mf::Round => float1(f32::round_ties_even),
        Mf::Fract => float1(|x| x - x.floor()),
        Mf::Trunc => float1(f32::trunc),
        Mf::Exp => float1(f32::exp),
        Mf::Exp2 => float1(f32::exp2),
        Mf::Log => float1(f32::ln),
        Mf::Log2 => float1(f32::log2),
        Mf::Sqrt => float1(f32::sqrt),
        Mf::InverseSqrt => float1(|x| 1.0 / x.sqrt()),
        Mf::Atan2 => float2(f32::atan2),
        Mf::Pow => float2(f32::powf),
        Mf::Step => float2(|edge, x| if x >= edge { 1.0 } else { 0.0 }),
        Mf::Fma => float3(f32::mul_add),
        Mf::Mix => float3(|a, b, t| a * (1.0 - t) + b * t),
        Mf::SmoothStep => float3(|lo, hi, x| {
            let t = ((x - lo) / (hi - lo)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        }),
        Mf::Dot => {
            let (a, b) = (&args[0], &args[1]);
            match (a, b) {
                (Val::Vector(x), Val::Vector(y)) if x.len() == y.len() => {
                    let mut acc = match x.first() {
                        Some(first) => zero_scalar(first.scalar_type()),
                        None => return Err(fault("dot of empty vectors")),
                    };
                    for (l, r) in x.iter().zip(y) {
                        let product = binary(naga::BinaryOperator::Multiply, *l, *r)?;
                        acc = binary(naga::BinaryOperator::Add, acc, product)?;
                    }
                    Ok(Val::Scalar(acc))
                }
                _ => Err(fault("dot requires two vectors of equal size")),
            }
        }
        Mf::Length => {
            let v = floats(&args[0])?;
            Ok(Val::Scalar(Scalar::F32(v.iter().map(|c| c * c).sum::<f32>().sqrt())))
        }
        Mf::Distance => {
            let (a, b) = (floats(&args[0])?, floats(&args[1])?);
            if a.len() != b.len() {
                return Err(fault("distance operands differ in size"));
            }
            let sum: f32 = a.iter().zip(&b).map(|(x, y)| (x - y) * (x - y)).sum();
            Ok(Val::Scalar(Scalar::F32(sum.sqrt())))
        }
        Mf::Normalize => {
            let v = floats(&args[0])?;
            let length = v.iter().map(|c| c * c).sum::<f32>().sqrt();
            Ok(Val::Vector(
                v.iter().map(|c| Scalar::F32(c / length)).collect(),
            ))
        }
        Mf::Cross => {
            let (a, b) = (floats(&args[0])?, floats(&args[1])?);
            if a.len() != 3 || b.len() != 3 {
                return Err(fault("cross requires two vec3 operands"));
            }
            Ok(Val::Vector(vec![
                Scalar::F32(a[1] * b[2] - a[2] * b[1]),
                Scalar::F32(a[2] * b[0] - a[0] * b[2]),
                Scalar::F32(a[0] * b[1] - a[1] * b[0]),
            ]))
        }
        other => Err(fault(format!("unsupported math function {other:?}"))),
    }
}

// ============================================================================
// Interpreter
// ============================================================================

/// Control flow outcome of executing a block.
enum Flow {
    Next,
    Break,
    Continue,
    Return(Option<Val>),
}

struct Frame<'a> {
    function: &'a naga::Function,
    arguments: Vec<Val>,
    locals: HashMap<Handle<naga::LocalVariable>, Val>,
    values: Vec<Option<Val>>,
}

struct Interpreter<'a> {
    module: &'a naga::Module,
    globals: HashMap<Handle<naga::GlobalVariable>, Val>,
    steps: u64,
    step_limit: u64,
}

impl<'a> Interpreter<'a> {
    fn new(module: &'a naga::Module, step_limit: u64) -> Self {
        Self {
            module,
            globals: HashMap::new(),
            steps: 0,
            step_limit,
        }
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(fault(format!(
                "step limit of {} exceeded",
                self.step_limit
            )));
        }
        Ok(())
    }

    fn call(
        &mut self,
        handle: Handle<naga::Function>,
        arguments: Vec<Val>,
    ) -> Result<Option<Val>> {
        let module = self.module;
        let function = &module.functions[handle];
        if arguments.len() != function.arguments.len() {
            return Err(fault(format!(
                "function expects {} arguments, got {}",
                function.arguments.len(),
                arguments.len()
            )));
        }

        let mut frame = Frame {
            function,
            arguments,
            locals: HashMap::new(),
            values: vec![None; function.expressions.len()],
        };

        for (local, variable) in function.local_variables.iter() {
            let initial = match variable.init {
                Some(init) => self.value(&mut frame, init)?,
                None => self.zero_value(variable.ty)?,
            };
            frame.locals.insert(local, initial);
        }

        match self.exec_block(&mut frame, &function.body)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn exec_block(&mut self, frame: &mut Frame<'a>, block: &'a naga::Block) -> Result<Flow> {
        for statement in block.iter() {
            match self.exec_statement(frame, statement)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_statement(&mut self, frame: &mut Frame<'a>, statement: &'a Statement) -> Result<Flow> {
        self.step()?;
        match statement {
            Statement::Emit(range) => {
                for handle in range.clone() {
                    let value = self.compute(frame, handle)?;
                    frame.values[handle.index()] = Some(value);
                }
            }
            Statement::Block(block) => return self.exec_block(frame, block),
            Statement::If {
                condition,
                accept,
                reject,
            } => {
                let branch = if self.value(frame, *condition)?.bool()? {
                    accept
                } else {
                    reject
                };
                return self.exec_block(frame, branch);
            }
            Statement::Switch { selector, cases } => {
                let selector = self.value(frame, *selector)?.scalar()?;
                let start = cases
                    .iter()
                    .position(|case| match (case.value, selector) {
                        (naga::SwitchValue::I32(v), Scalar::I32(s)) => v == s,
                        (naga::SwitchValue::U32(v), Scalar::U32(s)) => v == s,
                        _ => false,
                    })
                    .or_else(|| {
                        cases
                            .iter()
                            .position(|case| case.value == naga::SwitchValue::Default)
                    });
                if let Some(start) = start {
                    for case in &cases[start..] {
                        match self.exec_block(frame, &case.body)? {
                            Flow::Next if case.fall_through => continue,
                            Flow::Next | Flow::Break => break,
                            flow => return Ok(flow),
                        }
                    }
                }
            }
            Statement::Loop {
                body,
                continuing,
                break_if,
            } => loop {
                self.step()?;
                match self.exec_block(frame, body)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Next | Flow::Continue => {}
                }
                match self.exec_block(frame, continuing)? {
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Break => break,
                    Flow::Next | Flow::Continue => {}
                }
                if let Some(condition) = break_if
                    && self.value(frame, *condition)?.bool()?
                {
                    break;
                }
            },
            Statement::Break => return Ok(Flow::Break),
            Statement::Continue => return Ok(Flow::Continue),
            Statement::Return { value } => {
                let value = match value {
                    Some(handle) => Some(self.value(frame, *handle)?),
                    None => None,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Store { pointer, value } => {
                let pointer = self.value(frame, *pointer)?;
                let value = self.value(frame, *value)?;
                self.store(frame, pointer, value)?;
            }
            Statement::Call {
                function,
                arguments,
                result,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|arg| self.value(frame, *arg))
                    .collect::<Result<Vec<_>>>()?;
                let returned = self.call(*function, arguments)?;
                if let Some(result) = result {
                    let returned =
                        returned.ok_or_else(|| fault("called function returned no value"))?;
                    frame.values[result.index()] = Some(returned);
                }
            }
            Statement::Kill => return Err(fault("`discard` is not available in a function call")),
            other => return Err(fault(format!("unsupported statement {other:?}"))),
        }
        Ok(Flow::Next)
    }

    fn store(&mut self, frame: &mut Frame<'a>, pointer: Val, value: Val) -> Result<()> {
        let Val::Pointer(pointer) = pointer else {
            return Err(fault("store target is not a pointer"));
        };
        let target = match pointer.root {
            Root::Local(local) => frame
                .locals
                .get_mut(&local)
                .ok_or_else(|| fault("store to unknown local variable"))?,
            Root::Global(global) => {
                self.ensure_global(global)?;
                self.globals
                    .get_mut(&global)
                    .ok_or_else(|| fault("store to unknown global variable"))?
            }
        };
        write_path(target, &pointer.path, value)
    }

    fn load(&mut self, frame: &Frame<'a>, pointer: Val) -> Result<Val> {
        let Val::Pointer(pointer) = pointer else {
            return Err(fault("load source is not a pointer"));
        };
        let root = match pointer.root {
            Root::Local(local) => frame
                .locals
                .get(&local)
                .ok_or_else(|| fault("load from unknown local variable"))?,
            Root::Global(global) => {
                self.ensure_global(global)?;
                self.globals
                    .get(&global)
                    .ok_or_else(|| fault("load from unknown global variable"))?
            }
        };
        read_path(root, &pointer.path)
    }

    /// Initialize a `var<private>` global on first use.
    fn ensure_global(&mut self, handle: Handle<naga::GlobalVariable>) -> Result<()> {
        if self.globals.contains_key(&handle) {
            return Ok(());
        }
        let variable = &self.module.global_variables[handle];
        if variable.space != naga::AddressSpace::Private {
            return Err(fault(format!(
                "global `{}` in {:?} space is not accessible from a function call",
                variable.name.as_deref().unwrap_or("?"),
                variable.space
            )));
        }
        let initial = match variable.init {
            Some(init) => self.const_value(init)?,
            None => self.zero_value(variable.ty)?,
        };
        self.globals.insert(handle, initial);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Value of an expression, reusing the result of its last emission.
    fn value(&mut self, frame: &mut Frame<'a>, handle: Handle<Expression>) -> Result<Val> {
        if let Some(value) = &frame.values[handle.index()] {
            return Ok(value.clone());
        }
        let value = self.compute(frame, handle)?;
        frame.values[handle.index()] = Some(value.clone());
        Ok(value)
    }

    fn compute(&mut self, frame: &mut Frame<'a>, handle: Handle<Expression>) -> Result<Val> {
        let module = self.module;
        match &frame.function.expressions[handle] {
            Expression::Literal(lit) => literal(lit).map(Val::Scalar),
            Expression::Constant(constant) => self.const_value(module.constants[*constant].init),
            Expression::ZeroValue(ty) => self.zero_value(*ty),
            Expression::Compose { ty, components } => {
                let components = components
                    .iter()
                    .map(|c| self.value(frame, *c))
                    .collect::<Result<Vec<_>>>()?;
                self.compose(*ty, components)
            }
            Expression::Access { base, index } => {
                let base = self.value(frame, *base)?;
                let index = self.value(frame, *index)?.index()?;
                access(base, index)
            }
            Expression::AccessIndex { base, index } => {
                let base = self.value(frame, *base)?;
                access(base, *index as usize)
            }
            Expression::Splat { size, value } => {
                let value = self.value(frame, *value)?.scalar()?;
                Ok(Val::Vector(vec![value; *size as usize]))
            }
            Expression::Swizzle {
                size,
                vector,
                pattern,
            } => {
                let vector = self.value(frame, *vector)?;
                let components = vector.components()?;
                pattern[..*size as usize]
                    .iter()
                    .map(|c| {
                        components
                            .get(*c as usize)
                            .copied()
                            .ok_or_else(|| fault("swizzle component out of range"))
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Val::Vector)
            }
            Expression::FunctionArgument(index) => frame
                .arguments
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| fault(format!("missing function argument {index}"))),
            Expression::LocalVariable(local) => Ok(Val::Pointer(Pointer {
                root: Root::Local(*local),
                path: Vec::new(),
            })),
            Expression::GlobalVariable(global) => Ok(Val::Pointer(Pointer {
                root: Root::Global(*global),
                path: Vec::new(),
            })),
            Expression::Load { pointer } => {
                let pointer = self.value(frame, *pointer)?;
                self.load(frame, pointer)
            }
            Expression::Unary { op, expr } => {
                let value = self.value(frame, *expr)?;
                combine(&[&value], |s| unary(*op, s[0]))
            }
            Expression::Binary { op, left, right } => {
                let left = self.value(frame, *left)?;
                let right = self.value(frame, *right)?;
                combine(&[&left, &right], |s| binary(*op, s[0], s[1]))
            }
            Expression::Select {
                condition,
                accept,
                reject,
            } => {
                let condition = self.value(frame, *condition)?;
                let accept = self.value(frame, *accept)?;
                let reject = self.value(frame, *reject)?;
                match condition {
                    Val::Scalar(Scalar::Bool(true)) => Ok(accept),
                    Val::Scalar(Scalar::Bool(false)) => Ok(reject),
                    Val::Vector(_) => combine(&[&condition, &accept, &reject], |s| match s[0] {
                        Scalar::Bool(pick) => Ok(if pick { s[1] } else { s[2] }),
                        other => Err(fault(format!("select condition {other}"))),
                    }),
                    other => Err(fault(format!("invalid select condition {other:?}"))),
                }
            }
            Expression::Relational { fun, argument } => {
                let argument = self.value(frame, *argument)?;
                let components = argument.components()?;
                match fun {
                    naga::RelationalFunction::All => Ok(Val::Scalar(Scalar::Bool(
                        components.iter().all(|c| *c == Scalar::Bool(true)),
                    ))),
                    naga::RelationalFunction::Any => Ok(Val::Scalar(Scalar::Bool(
                        components.iter().any(|c| *c == Scalar::Bool(true)),
                    ))),
                    naga::RelationalFunction::IsNan => {
                        combine(&[&argument], |s| Ok(Scalar::Bool(float(s[0])?.is_nan())))
                    }
                    naga::RelationalFunction::IsInf => combine(&[&argument], |s| {
                        Ok(Scalar::Bool(float(s[0])?.is_infinite()))
                    }),
                }
            }
            Expression::Math {
                fun,
                arg,
                arg1,
                arg2,
                arg3,
            } => {
                let mut args = vec![self.value(frame, *arg)?];
                for extra in [arg1, arg2, arg3].into_iter().flatten() {
                    args.push(self.value(frame, *extra)?);
                }
                math(*fun, &args)
            }
            Expression::As {
                expr,
                kind,
                convert: width,
            } => {
                let value = self.value(frame, *expr)?;
                match width {
                    Some(_) => combine(&[&value], |s| convert(*kind, s[0])),
                    None => combine(&[&value], |s| bitcast(*kind, s[0])),
                }
            }
            Expression::CallResult(_) => Err(fault("call result used before the call")),
            other => Err(fault(format!("unsupported expression {other:?}"))),
        }
    }

    /// Evaluate a module-scope constant expression.
    fn const_value(&mut self, handle: Handle<Expression>) -> Result<Val> {
        let module = self.module;
        match &module.global_expressions[handle] {
            Expression::Literal(lit) => literal(lit).map(Val::Scalar),
            Expression::Constant(constant) => self.const_value(module.constants[*constant].init),
            Expression::ZeroValue(ty) => self.zero_value(*ty),
            Expression::Compose { ty, components } => {
                let components = components
                    .iter()
                    .map(|c| self.const_value(*c))
                    .collect::<Result<Vec<_>>>()?;
                self.compose(*ty, components)
            }
            Expression::Splat { size, value } => {
                let value = self.const_value(*value)?.scalar()?;
                Ok(Val::Vector(vec![value; *size as usize]))
            }
            other => Err(fault(format!("unsupported constant expression {other:?}"))),
        }
    }

    fn compose(&self, ty: Handle<naga::Type>, components: Vec<Val>) -> Result<Val> {
        match self.module.types[ty].inner {
            naga::TypeInner::Vector { .. } => {
                let mut scalars = Vec::new();
                for component in &components {
                    scalars.extend_from_slice(component.components()?);
                }
                Ok(Val::Vector(scalars))
            }
            _ => Ok(Val::Composite(components)),
        }
    }

    fn zero_value(&self, ty: Handle<naga::Type>) -> Result<Val> {
        let module = self.module;
        let zero = |scalar: naga::Scalar| {
            ScalarType::from_naga(scalar)
                .map(zero_scalar)
                .ok_or_else(|| fault(format!("unsupported scalar {scalar:?}")))
        };
        match &module.types[ty].inner {
            naga::TypeInner::Scalar(scalar) => zero(*scalar).map(Val::Scalar),
            naga::TypeInner::Vector { size, scalar } => {
                Ok(Val::Vector(vec![zero(*scalar)?; *size as usize]))
            }
            naga::TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column = Val::Vector(vec![zero(*scalar)?; *rows as usize]);
                Ok(Val::Composite(vec![column; *columns as usize]))
            }
            naga::TypeInner::Array {
                base,
                size: naga::ArraySize::Constant(count),
                ..
            } => {
                let element = self.zero_value(*base)?;
                Ok(Val::Composite(vec![element; count.get() as usize]))
            }
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .map(|member| self.zero_value(member.ty))
                .collect::<Result<Vec<_>>>()
                .map(Val::Composite),
            other => Err(fault(format!("cannot create a value of type {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::shader::compile_source;

    fn run(source: &str, name: &str, args: &[Value]) -> Result<Value> {
        run_with_limit(source, name, args, DEFAULT_STEP_LIMIT)
    }

    fn run_with_limit(source: &str, name: &str, args: &[Value], limit: u64) -> Result<Value> {
        let shader = compile_source(Path::new("test.wgsl"), source.to_string()).unwrap();
        let function = find_function(&shader.module, name).unwrap();
        let signature =
            Signature::from_naga(&shader.module, &shader.module.functions[function]).unwrap();
        CpuBackend::with_step_limit(limit).execute(&shader, &signature, args)
    }

    #[test]
    fn test_add() {
        let result = run(
            "fn add(a: f32, b: f32) -> f32 { return a + b; }",
            "add",
            &[Value::from(1.0f32), Value::from(2.0f32)],
        );
        assert_eq!(result.unwrap(), Value::from(3.0f32));
    }

    #[test]
    fn test_integer_semantics() {
        let source = r#"
fn div(a: i32, b: i32) -> i32 { return a / b; }
fn rem(a: u32, b: u32) -> u32 { return a % b; }
fn wrap(a: u32) -> u32 { return a + 1u; }
fn shift(a: u32, b: u32) -> u32 { return a << b; }
"#;
        assert_eq!(
            run(source, "div", &[Value::from(7), Value::from(0)]).unwrap(),
            Value::from(7)
        );
        assert_eq!(
            run(source, "div", &[Value::from(-7), Value::from(2)]).unwrap(),
            Value::from(-3)
        );
        assert_eq!(
            run(source, "rem", &[Value::from(7u32), Value::from(0u32)]).unwrap(),
            Value::from(0u32)
        );
        assert_eq!(
            run(source, "wrap", &[Value::from(u32::MAX)]).unwrap(),
            Value::from(0u32)
        );
        assert_eq!(
            run(source, "shift", &[Value::from(1u32), Value::from(33u32)]).unwrap(),
            Value::from(2u32)
        );
    }

    #[test]
    fn test_loops_and_locals() {
        let source = r#"
fn sum_to(n: u32) -> u32 {
    var total = 0u;
    for (var i = 1u; i <= n; i++) {
        total += i;
    }
    return total;
}

fn first_square_above(limit: i32) -> i32 {
    var i = 0;
    loop {
        if i * i > limit { break; }
        i += 1;
    }
    return i;
}
"#;
        assert_eq!(
            run(source, "sum_to", &[Value::from(10u32)]).unwrap(),
            Value::from(55u32)
        );
        assert_eq!(
            run(source, "first_square_above", &[Value::from(50)]).unwrap(),
            Value::from(8)
        );
    }

    #[test]
    fn test_vectors_and_builtins() {
        let source = r#"
fn scale(v: vec3<f32>, s: f32) -> vec3<f32> { return v * s; }
fn len(v: vec2<f32>) -> f32 { return length(v); }
fn swz(v: vec4<i32>) -> vec2<i32> { return v.wz; }
fn pick(flag: bool) -> f32 { return select(1.0, 2.0, flag); }
fn weighted(a: vec2<f32>, b: vec2<f32>) -> f32 { return dot(a, b) + clamp(5.0, 0.0, 1.0); }
"#;
        assert_eq!(
            run(source, "scale", &[Value::from([1.0f32, 2.0, 3.0]), Value::from(2.0f32)]).unwrap(),
            Value::from([2.0f32, 4.0, 6.0])
        );
        assert_eq!(
            run(source, "len", &[Value::from([3.0f32, 4.0])]).unwrap(),
            Value::from(5.0f32)
        );
        assert_eq!(
            run(source, "swz", &[Value::from([1, 2, 3, 4])]).unwrap(),
            Value::from([4, 3])
        );
        assert_eq!(
            run(source, "pick", &[Value::from(true)]).unwrap(),
            Value::from(2.0f32)
        );
        assert_eq!(
            run(
                source,
                "weighted",
                &[Value::from([1.0f32, 2.0]), Value::from([3.0f32, 4.0])]
            )
            .unwrap(),
            Value::from(12.0f32)
        );
    }

    #[test]
    fn test_switch_and_calls() {
        let source = r#"
const BASE: i32 = 100;

fn classify(x: i32) -> i32 {
    switch x {
        case 0: { return BASE; }
        case 1, 2: { return BASE + 1; }
        default: { return -1; }
    }
}

fn helper(x: f32) -> f32 { return x * x; }
fn outer(x: f32) -> f32 { return helper(x) + helper(x + 1.0); }
"#;
        assert_eq!(
            run(source, "classify", &[Value::from(0)]).unwrap(),
            Value::from(100)
        );
        assert_eq!(
            run(source, "classify", &[Value::from(2)]).unwrap(),
            Value::from(101)
        );
        assert_eq!(
            run(source, "classify", &[Value::from(9)]).unwrap(),
            Value::from(-1)
        );
        assert_eq!(
            run(source, "outer", &[Value::from(2.0f32)]).unwrap(),
            Value::from(13.0f32)
        );
    }

    #[test]
    fn test_arrays_structs_and_private_globals() {
        let source = r#"
struct Pair { a: f32, b: f32 }
var<private> counter: u32 = 5u;

fn pair_sum(x: f32) -> f32 {
    var p = Pair(x, 2.0 * x);
    p.b += 1.0;
    return p.a + p.b;
}

fn array_max(a: f32, b: f32, c: f32) -> f32 {
    var values = array<f32, 3>(a, b, c);
    var best = values[0];
    for (var i = 1u; i < 3u; i++) {
        best = max(best, values[i]);
    }
    return best;
}

fn bump() -> u32 {
    counter += 1u;
    return counter;
}
"#;
        assert_eq!(
            run(source, "pair_sum", &[Value::from(1.0f32)]).unwrap(),
            Value::from(4.0f32)
        );
        assert_eq!(
            run(
                source,
                "array_max",
                &[Value::from(1.0f32), Value::from(7.0f32), Value::from(3.0f32)]
            )
            .unwrap(),
            Value::from(7.0f32)
        );
        // Private globals start from their initializer on every invocation.
        assert_eq!(run(source, "bump", &[]).unwrap(), Value::from(6u32));
        assert_eq!(run(source, "bump", &[]).unwrap(), Value::from(6u32));
    }

    #[test]
    fn test_out_of_range_indices_clamp() {
        let source = r#"
fn pick(i: u32) -> f32 {
    var a = array<f32, 2>(1.0, 2.0);
    return a[i];
}

fn pick_signed(i: i32) -> f32 {
    var a = array<f32, 2>(1.0, 2.0);
    return a[i];
}

fn component(v: vec3<u32>, i: u32) -> u32 {
    return v[i];
}

fn store(i: u32) -> f32 {
    var a = array<f32, 3>(0.0, 0.0, 0.0);
    a[i] = 9.0;
    return a[0] + a[1] + 10.0 * a[2];
}
"#;
        assert_eq!(run(source, "pick", &[Value::from(5u32)]).unwrap(), Value::from(2.0f32));
        assert_eq!(run(source, "pick", &[Value::from(0u32)]).unwrap(), Value::from(1.0f32));
        assert_eq!(run(source, "pick_signed", &[Value::from(-1)]).unwrap(), Value::from(2.0f32));
        assert_eq!(
            run(source, "component", &[Value::from([4u32, 5, 6]), Value::from(9u32)]).unwrap(),
            Value::from(6u32)
        );
        assert_eq!(run(source, "store", &[Value::from(7u32)]).unwrap(), Value::from(90.0f32));
    }

    #[test]
    fn test_conversions() {
        let source = r#"
fn to_int(x: f32) -> i32 { return i32(x); }
fn to_float(x: u32) -> f32 { return f32(x); }
fn bits(x: f32) -> u32 { return bitcast<u32>(x); }
"#;
        assert_eq!(
            run(source, "to_int", &[Value::from(-2.75f32)]).unwrap(),
            Value::from(-2)
        );
        assert_eq!(
            run(source, "to_int", &[Value::from(1e20f32)]).unwrap(),
            Value::from(i32::MAX)
        );
        assert_eq!(
            run(source, "to_float", &[Value::from(3u32)]).unwrap(),
            Value::from(3.0f32)
        );
        assert_eq!(
            run(source, "bits", &[Value::from(1.0f32)]).unwrap(),
            Value::from(0x3f80_0000u32)
        );
    }

    #[test]
    fn test_step_limit() {
        let source = r#"
fn spin(n: u32) -> u32 {
    var i = 0u;
    loop {
        if i == n { break; }
        i += 1u;
    }
    return i;
}
"#;
        assert_eq!(
            run_with_limit(source, "spin", &[Value::from(10u32)], 10_000).unwrap(),
            Value::from(10u32)
        );
        let err = run_with_limit(source, "spin", &[Value::from(1_000_000u32)], 1_000).unwrap_err();
        assert!(matches!(err, BridgeError::Execution(msg) if msg.contains("step limit")));
    }

    #[test]
    fn test_storage_globals_are_rejected() {
        let source = r#"
@group(0) @binding(0) var<storage, read> data: array<f32>;
fn first() -> f32 { return data[0]; }
"#;
        let err = run(source, "first", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));
    }
}
