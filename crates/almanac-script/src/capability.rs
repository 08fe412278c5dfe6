//! Host capability sets exposed to scripts.
//!
//! A capability set is a named bundle of constants and functions declared
//! explicitly by the host. Functions sharing a name form an overload group;
//! each call is resolved against the group by argument count first and then
//! by whether every argument coerces to the declared parameter types.
//!
//! ```
//! use almanac_script::{CapabilitySet, NativeValue, ParamType};
//!
//! let math = CapabilitySet::builder("math")
//!     .constant("answer", 42)
//!     .function("add", [ParamType::Integer, ParamType::Integer], |args| {
//!         let a = args[0].as_i64().unwrap_or_default();
//!         let b = args[1].as_i64().unwrap_or_default();
//!         Ok(NativeValue::Integer(a + b))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let sum = math.call("add", vec![1.into(), 2.into()]).unwrap();
//! assert_eq!(sum, NativeValue::Integer(3));
//! ```

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{NativeMap, NativeValue};
use std::fmt;
use std::sync::Arc;

/// Signature of a native function bound into a capability set.
pub type NativeFn = Arc<dyn Fn(Vec<NativeValue>) -> RuntimeResult<NativeValue> + Send + Sync>;

type ConstantFn = Arc<dyn Fn() -> NativeValue + Send + Sync>;

/// Declared type of a function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Accepts any value as-is.
    Any,
    Bool,
    Integer,
    /// Accepts floats and integers.
    Float,
    Text,
    /// Accepts bytes and text.
    Bytes,
    Sequence,
    /// Accepts maps, and sequences as 1-based integer-keyed maps.
    Map,
    Capability,
    /// Consumes every remaining argument as one sequence. Must be last.
    Rest,
}

impl ParamType {
    /// Coerce a value to this parameter type, or `None` if it does not fit.
    pub fn coerce(self, value: &NativeValue) -> Option<NativeValue> {
        match (self, value) {
            (ParamType::Any | ParamType::Rest, v) => Some(v.clone()),
            (ParamType::Bool, NativeValue::Bool(_)) => Some(value.clone()),
            (ParamType::Integer, NativeValue::Integer(_)) => Some(value.clone()),
            (ParamType::Integer, NativeValue::Float(f)) => match NativeValue::from_number(*f) {
                v @ NativeValue::Integer(_) => Some(v),
                _ => None,
            },
            (ParamType::Float, NativeValue::Float(_)) => Some(value.clone()),
            (ParamType::Float, NativeValue::Integer(i)) => Some(NativeValue::Float(*i as f64)),
            (ParamType::Text, NativeValue::Text(_)) => Some(value.clone()),
            (ParamType::Bytes, NativeValue::Bytes(_)) => Some(value.clone()),
            (ParamType::Bytes, NativeValue::Text(s)) => Some(NativeValue::Bytes(s.as_bytes().to_vec())),
            (ParamType::Sequence, NativeValue::Sequence(_)) => Some(value.clone()),
            (ParamType::Map, NativeValue::Map(_)) => Some(value.clone()),
            (ParamType::Map, NativeValue::Sequence(items)) => Some(NativeValue::Map(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (NativeValue::Integer(i as i64 + 1), v.clone()))
                    .collect(),
            )),
            (ParamType::Capability, NativeValue::Capability(_)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::Bool => "bool",
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::Text => "text",
            ParamType::Bytes => "bytes",
            ParamType::Sequence => "sequence",
            ParamType::Map => "map",
            ParamType::Capability => "capability",
            ParamType::Rest => "...",
        }
    }
}

/// One native function registered under a script-visible name.
#[derive(Clone)]
pub struct FunctionBinding {
    params: Vec<ParamType>,
    func: NativeFn,
}

impl FunctionBinding {
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Whether the last parameter is a variadic tail.
    pub fn is_variadic(&self) -> bool {
        self.params.last() == Some(&ParamType::Rest)
    }

    /// Number of declared parameters, counting a variadic tail as one.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    fn invoke(&self, args: Vec<NativeValue>) -> RuntimeResult<NativeValue> {
        (self.func)(args)
    }

    /// Placeholder arguments for the zero-argument fast path.
    fn default_args(&self) -> Vec<NativeValue> {
        self.params
            .iter()
            .map(|p| match p {
                ParamType::Rest => NativeValue::Sequence(Vec::new()),
                _ => NativeValue::Absent,
            })
            .collect()
    }

    /// Positionally coerce call arguments, or `None` if any parameter rejects
    /// its argument (or has no argument at all).
    fn coerce_args(&self, args: &[NativeValue]) -> Option<Vec<NativeValue>> {
        let mut coerced = Vec::with_capacity(self.params.len());
        for (i, param) in self.params.iter().enumerate() {
            if *param == ParamType::Rest {
                let rest = args.get(i..).unwrap_or_default();
                coerced.push(NativeValue::Sequence(rest.to_vec()));
                return Some(coerced);
            }
            coerced.push(param.coerce(args.get(i)?)?);
        }
        Some(coerced)
    }

    fn signature(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(ParamType::as_str).collect();
        format!("({})", params.join(", "))
    }
}

impl fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
enum ConstantSource {
    Value(NativeValue),
    Provider(ConstantFn),
}

/// A named bundle of constants and overloaded functions.
///
/// Registration order is preserved and decides ties during overload
/// resolution.
#[derive(Clone)]
pub struct CapabilitySet {
    name: String,
    constants: Vec<(String, ConstantSource)>,
    functions: Vec<(String, Vec<FunctionBinding>)>,
}

impl CapabilitySet {
    /// Start declaring a capability set.
    pub fn builder(name: impl Into<String>) -> CapabilitySetBuilder {
        CapabilitySetBuilder {
            name: name.into(),
            constants: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Script-visible name of the set.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constant_names(&self) -> impl Iterator<Item = &str> {
        self.constants.iter().map(|(name, _)| name.as_str())
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }

    /// Current value of a constant.
    pub fn constant(&self, name: &str) -> Option<NativeValue> {
        self.constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| match source {
                ConstantSource::Value(v) => v.clone(),
                ConstantSource::Provider(f) => f(),
            })
    }

    /// Evaluate every constant once. Bindings take this snapshot when a set
    /// is bound into a script.
    pub fn snapshot_constants(&self) -> Vec<(String, NativeValue)> {
        self.constants
            .iter()
            .map(|(name, source)| {
                let value = match source {
                    ConstantSource::Value(v) => v.clone(),
                    ConstantSource::Provider(f) => f(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.bindings(name).is_some()
    }

    /// All bindings registered under `name`, in registration order.
    pub fn bindings(&self, name: &str) -> Option<&[FunctionBinding]> {
        self.functions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, group)| group.as_slice())
    }

    /// Resolve and invoke the overload of `name` that accepts `args`.
    ///
    /// Candidates are the bindings whose arity equals `args.len()`, in
    /// registration order, followed by the variadic binding if there is one.
    /// With no arguments the first candidate is invoked without coercion.
    pub fn call(&self, name: &str, args: Vec<NativeValue>) -> RuntimeResult<NativeValue> {
        let group = self
            .bindings(name)
            .ok_or_else(|| RuntimeError::NoSuchFunction {
                set: self.name.clone(),
                function: name.to_string(),
            })?;

        let arg_count = args.len();
        let mut candidates = group
            .iter()
            .filter(|b| !b.is_variadic() && b.param_count() == arg_count)
            .chain(group.iter().filter(|b| b.is_variadic()));

        if arg_count == 0 {
            if let Some(binding) = candidates.next() {
                return binding.invoke(binding.default_args());
            }
        } else {
            for binding in candidates {
                if let Some(coerced) = binding.coerce_args(&args) {
                    return binding.invoke(coerced);
                }
            }
        }

        Err(RuntimeError::NoSuitableFunction {
            function: name.to_string(),
            arg_count,
        })
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("name", &self.name)
            .field("constants", &self.constant_names().collect::<Vec<_>>())
            .field("functions", &self.function_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`CapabilitySet`].
pub struct CapabilitySetBuilder {
    name: String,
    constants: Vec<(String, ConstantSource)>,
    functions: Vec<(String, Vec<FunctionBinding>)>,
}

impl CapabilitySetBuilder {
    /// Add a constant with a fixed value.
    pub fn constant(mut self, name: impl Into<String>, value: impl Into<NativeValue>) -> Self {
        self.constants
            .push((name.into(), ConstantSource::Value(value.into())));
        self
    }

    /// Add a constant whose value is read each time the set is bound.
    pub fn constant_with<F>(mut self, name: impl Into<String>, provider: F) -> Self
    where
        F: Fn() -> NativeValue + Send + Sync + 'static,
    {
        self.constants
            .push((name.into(), ConstantSource::Provider(Arc::new(provider))));
        self
    }

    /// Add a function binding. Repeating a name adds an overload.
    pub fn function<F>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamType>,
        func: F,
    ) -> Self
    where
        F: Fn(Vec<NativeValue>) -> RuntimeResult<NativeValue> + Send + Sync + 'static,
    {
        let name = name.into();
        let binding = FunctionBinding {
            params: params.into_iter().collect(),
            func: Arc::new(func),
        };
        match self.functions.iter_mut().find(|(n, _)| *n == name) {
            Some((_, group)) => group.push(binding),
            None => self.functions.push((name, vec![binding])),
        }
        self
    }

    /// Validate the declarations and produce the set.
    pub fn build(self) -> RuntimeResult<CapabilitySet> {
        if self.name.is_empty() {
            return Err(RuntimeError::InvalidBinding(
                "Capability set name cannot be empty".to_string(),
            ));
        }

        for (name, _) in &self.constants {
            if name.is_empty() {
                return Err(RuntimeError::InvalidBinding(format!(
                    "Constant in '{}' has an empty name",
                    self.name
                )));
            }
            if self.functions.iter().any(|(f, _)| f == name) {
                return Err(RuntimeError::InvalidBinding(format!(
                    "'{}.{}' is declared as both a constant and a function",
                    self.name, name
                )));
            }
        }

        for (name, group) in &self.functions {
            if name.is_empty() {
                return Err(RuntimeError::InvalidBinding(format!(
                    "Function in '{}' has an empty name",
                    self.name
                )));
            }

            for binding in group {
                let rest_count = binding.params.iter().filter(|p| **p == ParamType::Rest).count();
                if rest_count > 1 || (rest_count == 1 && !binding.is_variadic()) {
                    return Err(RuntimeError::InvalidBinding(format!(
                        "'{}.{}{}': a variadic tail must be the last parameter",
                        self.name,
                        name,
                        binding.signature()
                    )));
                }
            }

            if group.iter().filter(|b| b.is_variadic()).count() > 1 {
                return Err(RuntimeError::InvalidBinding(format!(
                    "'{}.{}' has more than one variadic overload",
                    self.name, name
                )));
            }

            for (i, binding) in group.iter().enumerate() {
                if group[..i].iter().any(|earlier| earlier.params == binding.params) {
                    return Err(RuntimeError::InvalidBinding(format!(
                        "'{}.{}{}' is registered twice",
                        self.name,
                        name,
                        binding.signature()
                    )));
                }
            }
        }

        Ok(CapabilitySet {
            name: self.name,
            constants: self.constants,
            functions: self.functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(args: &[NativeValue]) -> i64 {
        args.iter().filter_map(NativeValue::as_i64).sum()
    }

    fn adder() -> CapabilitySet {
        CapabilitySet::builder("math")
            .function("add", [ParamType::Integer, ParamType::Integer], |args| {
                Ok(NativeValue::Integer(sum(&args)))
            })
            .function("add", [ParamType::Rest], |args| {
                let rest = args[0].as_sequence().unwrap_or_default();
                Ok(NativeValue::Text(format!("variadic:{}", sum(rest))))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_fixed_arity_preferred() {
        let set = adder();
        let result = set.call("add", vec![1.into(), 2.into()]).unwrap();
        assert_eq!(result, NativeValue::Integer(3));
    }

    #[test]
    fn test_variadic_fallback() {
        let set = adder();
        let result = set.call("add", vec![1.into(), 2.into(), 3.into()]).unwrap();
        assert_eq!(result, NativeValue::from("variadic:6"));
    }

    #[test]
    fn test_type_mismatch_falls_through_to_variadic() {
        let set = adder();
        let result = set.call("add", vec!["x".into(), 2.into()]).unwrap();
        assert_eq!(result, NativeValue::from("variadic:2"));
    }

    #[test]
    fn test_no_suitable_function() {
        let set = CapabilitySet::builder("math")
            .function("neg", [ParamType::Integer], |args| {
                Ok(NativeValue::Integer(-sum(&args)))
            })
            .build()
            .unwrap();

        let err = set.call("neg", vec!["nope".into()]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::NoSuitableFunction { arg_count: 1, .. }
        ));

        let err = set.call("neg", vec![1.into(), 2.into()]).unwrap_err();
        assert!(matches!(err, RuntimeError::NoSuitableFunction { .. }));
    }

    #[test]
    fn test_unknown_function() {
        let err = adder().call("sub", vec![]).unwrap_err();
        assert!(matches!(err, RuntimeError::NoSuchFunction { .. }));
    }

    #[test]
    fn test_zero_args_skip_coercion() {
        // The integer prefix would reject an absent argument if it were checked.
        let set = CapabilitySet::builder("t")
            .function("f", [ParamType::Integer, ParamType::Rest], |args| {
                Ok(NativeValue::Integer(args.len() as i64))
            })
            .build()
            .unwrap();

        assert_eq!(set.call("f", vec![]).unwrap(), NativeValue::Integer(2));
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let set = CapabilitySet::builder("t")
            .function("pick", [ParamType::Float], |_| Ok("float".into()))
            .function("pick", [ParamType::Integer], |_| Ok("integer".into()))
            .build()
            .unwrap();

        for _ in 0..3 {
            assert_eq!(set.call("pick", vec![1.into()]).unwrap(), "float".into());
        }
    }

    #[test]
    fn test_coercions() {
        assert_eq!(
            ParamType::Float.coerce(&NativeValue::Integer(2)),
            Some(NativeValue::Float(2.0))
        );
        assert_eq!(
            ParamType::Integer.coerce(&NativeValue::Float(2.0)),
            Some(NativeValue::Integer(2))
        );
        assert_eq!(ParamType::Integer.coerce(&NativeValue::Float(2.5)), None);
        assert_eq!(ParamType::Text.coerce(&NativeValue::Integer(1)), None);
        assert_eq!(
            ParamType::Bytes.coerce(&"ab".into()),
            Some(NativeValue::Bytes(b"ab".to_vec()))
        );

        let seq = NativeValue::Sequence(vec!["a".into()]);
        let map = ParamType::Map.coerce(&seq).unwrap();
        assert_eq!(
            map.as_map().unwrap().get(&NativeValue::Integer(1)),
            Some(&"a".into())
        );
    }

    #[test]
    fn test_missing_arguments_fail_coercion() {
        let set = CapabilitySet::builder("t")
            .function("f", [ParamType::Integer, ParamType::Integer, ParamType::Rest], |_| {
                Ok(NativeValue::Absent)
            })
            .build()
            .unwrap();

        assert!(set.call("f", vec![1.into()]).is_err());
        assert!(set.call("f", vec![1.into(), 2.into()]).is_ok());
    }

    #[test]
    fn test_constants() {
        let set = CapabilitySet::builder("info")
            .constant("version", "1.0")
            .constant_with("computed", || NativeValue::Integer(7))
            .build()
            .unwrap();

        assert_eq!(set.constant("version"), Some("1.0".into()));
        assert_eq!(set.constant("computed"), Some(NativeValue::Integer(7)));
        assert_eq!(set.constant("other"), None);
        assert_eq!(set.snapshot_constants().len(), 2);
    }

    #[test]
    fn test_invalid_declarations() {
        let two_variadics = CapabilitySet::builder("t")
            .function("f", [ParamType::Rest], |_| Ok(NativeValue::Absent))
            .function("f", [ParamType::Integer, ParamType::Rest], |_| Ok(NativeValue::Absent))
            .build();
        assert!(matches!(two_variadics, Err(RuntimeError::InvalidBinding(_))));

        let rest_not_last = CapabilitySet::builder("t")
            .function("f", [ParamType::Rest, ParamType::Integer], |_| Ok(NativeValue::Absent))
            .build();
        assert!(rest_not_last.is_err());

        let duplicate = CapabilitySet::builder("t")
            .function("f", [ParamType::Text], |_| Ok(NativeValue::Absent))
            .function("f", [ParamType::Text], |_| Ok(NativeValue::Absent))
            .build();
        assert!(duplicate.is_err());

        let clash = CapabilitySet::builder("t")
            .constant("f", 1)
            .function("f", [], |_| Ok(NativeValue::Absent))
            .build();
        assert!(clash.is_err());

        assert!(CapabilitySet::builder("").build().is_err());
    }
}
