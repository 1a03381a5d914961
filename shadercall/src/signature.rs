//! Entry point signatures and argument binding.
//!
//! Arguments can be supplied positionally or by name. Both forms go through
//! [`Signature::bind`], so arity, name, and duplicate checks are identical
//! regardless of calling convention; the result is an [`ArgumentBinding`]
//! that lists one value per declared parameter in declaration order.

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::types::ShaderType;
use crate::value::Value;

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: ShaderType,
}

/// The calling contract of one exported function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    name: String,
    parameters: Vec<Parameter>,
    return_type: ShaderType,
}

/// Arguments as supplied by a caller, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Arguments {
    /// Values assigned left-to-right to the declared parameters.
    Positional(Vec<Value>),
    /// Values keyed by parameter name.
    Named(Vec<(String, Value)>),
}

impl Arguments {
    /// Positional arguments from anything convertible to [`Value`].
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Named arguments from `(name, value)` pairs.
    pub fn named<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Named(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// A validated assignment of one value to each declared parameter.
///
/// Only [`Signature::bind`] creates bindings, so a binding is always complete
/// for the signature it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentBinding {
    entries: Vec<(String, Value)>,
}

impl ArgumentBinding {
    /// Bound `(parameter, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Value bound to `parameter`.
    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, value)| value)
    }

    /// Bound values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<Parameter>,
        return_type: ShaderType,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            return_type,
        }
    }

    /// Reflect a naga function. Returns `None` for unnamed or `void` functions.
    pub(crate) fn from_naga(module: &naga::Module, function: &naga::Function) -> Option<Self> {
        let name = function.name.clone()?;
        let result = function.result.as_ref()?;
        let parameters = function
            .arguments
            .iter()
            .enumerate()
            .map(|(index, arg)| Parameter {
                name: arg.name.clone().unwrap_or_else(|| format!("arg{index}")),
                ty: ShaderType::from_naga(module, arg.ty),
            })
            .collect();
        Some(Self::new(
            name,
            parameters,
            ShaderType::from_naga(module, result.ty),
        ))
    }

    /// Exported function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters in order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Declared return type.
    pub fn return_type(&self) -> &ShaderType {
        &self.return_type
    }

    /// Index of the parameter called `name`.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    /// Validate arguments against this signature.
    pub fn bind(&self, arguments: Arguments) -> Result<ArgumentBinding> {
        match arguments {
            Arguments::Positional(values) => {
                if values.len() != self.parameters.len() {
                    return Err(BridgeError::ArityMismatch {
                        entry: self.name.clone(),
                        expected: self.parameters.len(),
                        found: values.len(),
                    });
                }
                Ok(ArgumentBinding {
                    entries: self
                        .parameters
                        .iter()
                        .map(|p| p.name.clone())
                        .zip(values)
                        .collect(),
                })
            }
            Arguments::Named(pairs) => self.bind_pairs(pairs),
        }
    }

    /// Bind values positionally.
    pub fn bind_positional<V: Into<Value>>(
        &self,
        values: impl IntoIterator<Item = V>,
    ) -> Result<ArgumentBinding> {
        self.bind(Arguments::positional(values))
    }

    /// Bind values by parameter name.
    pub fn bind_named<K: Into<String>, V: Into<Value>>(
        &self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<ArgumentBinding> {
        self.bind(Arguments::named(pairs))
    }

    fn bind_pairs(&self, pairs: Vec<(String, Value)>) -> Result<ArgumentBinding> {
        let mut slots: Vec<Option<Value>> = vec![None; self.parameters.len()];

        for (name, value) in pairs {
            let index = self
                .parameter_index(&name)
                .ok_or_else(|| BridgeError::UnknownArgument {
                    entry: self.name.clone(),
                    name: name.clone(),
                })?;
            if slots[index].replace(value).is_some() {
                return Err(BridgeError::DuplicateArgument {
                    entry: self.name.clone(),
                    parameter: name,
                });
            }
        }

        let entries = self
            .parameters
            .iter()
            .zip(slots)
            .map(|(param, slot)| {
                slot.map(|value| (param.name.clone(), value))
                    .ok_or_else(|| BridgeError::MissingArgument {
                        entry: self.name.clone(),
                        parameter: param.name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ArgumentBinding { entries })
    }

    /// Re-check a binding against this signature and convert every value to
    /// its declared type.
    ///
    /// The binding is validated through the same named path as
    /// [`bind`](Self::bind), so a binding produced for a different signature
    /// is rejected rather than silently reinterpreted.
    pub fn marshal(&self, binding: &ArgumentBinding) -> Result<Vec<Value>> {
        let rebound = self.bind_pairs(binding.entries.clone())?;
        self.parameters
            .iter()
            .zip(rebound.entries)
            .map(|(param, (_, value))| {
                param
                    .ty
                    .marshal(&value)
                    .ok_or_else(|| BridgeError::TypeMismatch {
                        parameter: param.name.clone(),
                        expected: param.ty.clone(),
                        found: value.describe(),
                    })
            })
            .collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}
