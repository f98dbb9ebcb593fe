use core::fmt;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;

use crate::value::{self, Mapping, ParamKind, Value};

/// A callable host function with declared formal parameter kinds.
#[derive(Clone)]
pub struct FuncValue {
    params: Vec<ParamKind>,
    variadic: bool,
    f: Rc<dyn Fn(Vec<Value>) -> Result<Value>>,
}

impl FuncValue {
    pub fn new(params: Vec<ParamKind>, f: impl Fn(Vec<Value>) -> Result<Value> + 'static) -> Self {
        Self {
            params,
            variadic: false,
            f: Rc::new(f),
        }
    }

    /// A variadic function; the last declared parameter kind applies to every
    /// trailing argument.
    pub fn variadic(
        params: Vec<ParamKind>,
        f: impl Fn(Vec<Value>) -> Result<Value> + 'static,
    ) -> Self {
        Self {
            params,
            variadic: true,
            f: Rc::new(f),
        }
    }

    pub(crate) fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        if self.variadic {
            let min = self.params.len().saturating_sub(1);
            if args.len() < min {
                bail!(
                    "too few arguments to function: expected minimum argument number is {}. but specified {} arguments",
                    min,
                    args.len()
                );
            }
        } else if args.len() != self.params.len() {
            bail!(
                "expected function argument number is {} but specified {} arguments",
                self.params.len(),
                args.len()
            );
        }

        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let required = self.param_at(i);
            let is_null = matches!(arg, Value::Null);
            let got = arg.type_name();
            match value::convert(arg, required) {
                Some(v) => converted.push(v),
                None if is_null => {
                    bail!("can't use nil as {} in arguments[{i}] to {name}", required.name())
                }
                None => bail!(
                    "can't use {got} as {} in arguments[{i}] to {name}",
                    required.name()
                ),
            }
        }

        (self.f)(converted)
    }

    fn param_at(&self, i: usize) -> ParamKind {
        if self.variadic && i + 1 >= self.params.len() {
            self.params.last().copied().unwrap_or(ParamKind::Any)
        } else {
            self.params.get(i).copied().unwrap_or(ParamKind::Any)
        }
    }
}

impl PartialEq for FuncValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FuncValue")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

/// A left arrow function: its argument arrives as YAML text that the helper
/// decodes through the supplied unmarshaler before `exec` runs.
pub trait LeftArrowFn {
    fn unmarshal_arg(&self, unmarshal: ArgUnmarshaler<'_>) -> Result<Value>;

    fn exec(&self, arg: Value) -> Result<Value>;
}

/// Per-evaluation table of synthesised names for function values that were
/// replaced by `{{func-N}}` placeholders during re-serialisation.
#[derive(Debug, Default)]
pub struct FuncStash {
    funcs: IndexMap<String, Value>,
}

impl FuncStash {
    pub(crate) fn save(&mut self, f: Value) -> String {
        let name = format!("func-{}", self.funcs.len());
        self.funcs.insert(name.clone(), f);
        name
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.funcs.get(name)
    }
}

/// Decodes the re-serialised left arrow argument for a helper.
pub struct ArgUnmarshaler<'a> {
    text: &'a str,
    stash: &'a FuncStash,
}

impl<'a> ArgUnmarshaler<'a> {
    pub(crate) fn new(text: &'a str, stash: &'a FuncStash) -> Self {
        Self { text, stash }
    }

    /// The raw YAML text of the argument.
    pub fn text(&self) -> &str {
        self.text
    }

    /// Decodes into an order-preserving `Value` tree and restores stashed
    /// function values in place of their placeholders.
    pub fn decode(&self, dest: &mut Value) -> Result<()> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(self.text)
            .map_err(|err| anyhow!("failed to unmarshal left arrow function argument: {err}"))?;
        let value = value::from_yaml(yaml)?;
        *dest = restore(value, self.stash)?;
        Ok(())
    }

    /// Decodes into a typed destination. Unknown-key strictness is the
    /// destination's choice via `#[serde(deny_unknown_fields)]`. Function
    /// values cannot cross this boundary; helpers taking functions keep
    /// `Value` fields and use `decode`.
    pub fn decode_strict<T: DeserializeOwned>(&self) -> Result<T> {
        let mut value = Value::Null;
        self.decode(&mut value)?;
        let yaml = value::to_yaml(&value)?;
        serde_yaml::from_value(yaml)
            .map_err(|err| anyhow!("failed to unmarshal left arrow function argument: {err}"))
    }
}

/// Walks a decoded tree replacing every string of the placeholder form
/// `{{func-N}}` with the stashed function value it names.
fn restore(value: Value, stash: &FuncStash) -> Result<Value> {
    match value {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix("{{").and_then(|rest| rest.strip_suffix("}}")) {
                if let Some(f) = stash.get(name) {
                    return Ok(f.clone());
                }
            }
            Ok(Value::String(s))
        }
        Value::Seq(items) => Ok(Value::Seq(
            items
                .into_iter()
                .map(|item| restore(item, stash))
                .collect::<Result<_>>()?,
        )),
        Value::Map(mapping) => {
            let mut out = Mapping::new();
            for (key, value) in mapping {
                out.insert(restore(key, stash)?, restore(value, stash)?);
            }
            Ok(Value::Map(out))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn upper() -> FuncValue {
        FuncValue::new(vec![ParamKind::String], |args| match args.first() {
            Some(Value::String(s)) => Ok(Value::String(s.to_uppercase())),
            _ => Err(anyhow!("argument to `upper` not provided")),
        })
    }

    #[test]
    fn test_call_converts_arguments() {
        let result = upper().call("upper", vec![Value::from("hi")]).unwrap();
        assert_eq!(result, Value::from("HI"));

        // int converts to string losslessly
        let result = upper().call("upper", vec![Value::Int(7)]).unwrap();
        assert_eq!(result, Value::from("7"));
    }

    #[test]
    fn test_call_arity_errors() {
        let tests = vec![
            (vec![], "expected function argument number is 1 but specified 0 arguments"),
            (
                vec![Value::from("a"), Value::from("b")],
                "expected function argument number is 1 but specified 2 arguments",
            ),
            (
                vec![Value::Seq(vec![])],
                "can't use array as string in arguments[0] to upper",
            ),
            (
                vec![Value::Null],
                "can't use nil as string in arguments[0] to upper",
            ),
        ];

        for (args, expected) in tests {
            let error = upper().call("upper", args).unwrap_err();
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_variadic_call() {
        let sum = FuncValue::variadic(vec![ParamKind::Int], |args| {
            let mut total = 0i64;
            for arg in args {
                if let Value::Int(i) = arg {
                    total += i;
                }
            }
            Ok(Value::Int(total))
        });

        assert_eq!(sum.call("sum", vec![]).unwrap(), Value::Int(0));
        assert_eq!(
            sum.call("sum", vec![Value::Int(1), Value::Int(2), Value::Uint(3)])
                .unwrap(),
            Value::Int(6)
        );

        let max = FuncValue::variadic(vec![ParamKind::Int, ParamKind::Int], |args| {
            Ok(args.into_iter().max_by_key(|v| match v {
                Value::Int(i) => *i,
                _ => i64::MIN,
            }).unwrap_or(Value::Null))
        });
        let error = max.call("max", vec![]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "too few arguments to function: expected minimum argument number is 1. but specified 0 arguments"
        );
    }

    #[test]
    fn test_stash_names_follow_insertion_order() {
        let mut stash = FuncStash::default();
        assert_eq!(stash.save(Value::Func(upper())), "func-0");
        assert_eq!(stash.save(Value::Func(upper())), "func-1");
        assert_eq!(stash.save(Value::Func(upper())), "func-2");
    }

    #[test]
    fn test_decode_restores_stashed_functions() {
        let f = Value::Func(upper());
        let mut stash = FuncStash::default();
        let name = stash.save(f.clone());
        assert_eq!(name, "func-0");

        let text = "callback: '{{func-0}}'\nn: 1";
        let unmarshaler = ArgUnmarshaler::new(text, &stash);
        let mut decoded = Value::Null;
        unmarshaler.decode(&mut decoded).unwrap();

        let Value::Map(mapping) = decoded else {
            panic!("expected map");
        };
        assert_eq!(mapping.get_str("callback"), Some(&f));
        assert_eq!(mapping.get_str("n"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_decode_strict_rejects_unknown_keys() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(deny_unknown_fields)]
        struct EchoArg {
            msg: String,
        }

        let stash = FuncStash::default();

        let unmarshaler = ArgUnmarshaler::new("msg: hi", &stash);
        let arg: EchoArg = unmarshaler.decode_strict().unwrap();
        assert_eq!(arg, EchoArg { msg: "hi".to_string() });

        let unmarshaler = ArgUnmarshaler::new("msg: hi\nextra: 1", &stash);
        let error = unmarshaler.decode_strict::<EchoArg>().unwrap_err();
        assert!(
            error.to_string().contains("unknown field `extra`"),
            "unexpected error: {error}"
        );
    }
}
