use std::{cell::RefCell, panic, rc::Rc};

use anyhow::{anyhow, bail, Context, Result};
use log::trace;
use thiserror::Error;

use crate::{
    ast::Expr,
    func::{ArgUnmarshaler, FuncStash, FuncValue},
    lexer::Lexer,
    parser::Parser,
    token::Token,
    value::{self, Value},
};

/// Lookup of an absent name or index. The only error kind the engine itself
/// recovers from, via `defined()`.
#[derive(Debug, Error)]
#[error("\"{path}\" is not defined")]
pub struct NotDefined {
    path: String,
}

/// The representation of a parsed template.
#[derive(Debug)]
pub struct Template {
    src: String,
    expr: Expr,
    executing_left_arrow_arg: bool,
    stash: Rc<RefCell<FuncStash>>,
}

impl Template {
    /// Parses text as a template.
    pub fn new(src: &str) -> Result<Self> {
        let lexer = Lexer::new(src);
        let expr = Parser::new(lexer)
            .and_then(|mut parser| parser.parse_template())
            .with_context(|| format!("failed to parse \"{src}\""))?;
        Ok(Self {
            src: src.to_string(),
            expr,
            executing_left_arrow_arg: false,
            stash: Rc::new(RefCell::new(FuncStash::default())),
        })
    }

    /// Applies the parsed template to the data tree. Internal panics are
    /// recovered and reported as ordinary errors.
    pub fn execute(&self, data: &Value) -> Result<Value> {
        trace!("executing template {:?}", self.src);
        let result =
            panic::catch_unwind(panic::AssertUnwindSafe(|| self.execute_expr(&self.expr, data)));
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if self.src.contains('\n') {
                    Err(err.context(format!("failed to execute: \n{}\n", self.src)))
                } else {
                    Err(err.context(format!("failed to execute: {}", self.src)))
                }
            }
            Err(payload) => Err(anyhow!(
                "failed to execute: panic: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    fn execute_expr(&self, expr: &Expr, data: &Value) -> Result<Value> {
        match expr {
            Expr::StringLit(value) => Ok(Value::String(value.clone())),
            Expr::IntLit(value) => parse_int_literal(value),
            Expr::FloatLit(value) => value
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| anyhow!("invalid AST: \"{value}\" is not a float")),
            Expr::BoolLit(value) => Ok(Value::Bool(*value)),
            Expr::Ident(_) | Expr::Selector { .. } | Expr::Index { .. } => self.lookup(expr, data),
            Expr::Parameter { x, quoted } => self.execute_parameter(x.as_deref(), *quoted, data),
            Expr::Paren(x) => self.execute_expr(x, data),
            Expr::Unary { op, right } => {
                let right = self.execute_expr(right, data)?;
                self.execute_unary(op, right)
            }
            Expr::Binary { left, op, right } => self
                .execute_binary(left, op, right, data)
                .map_err(|err| err.context("invalid operation")),
            Expr::Conditional { cond, then, els } => self.execute_conditional(cond, then, els, data),
            Expr::Call { fun, args } => self.execute_call(fun, args, data),
            Expr::LeftArrow { fun, arg } => self.execute_left_arrow(fun, arg.as_deref(), data),
            Expr::Defined(arg) => self.execute_defined(arg, data),
        }
    }

    fn execute_parameter(&self, x: Option<&Expr>, quoted: bool, data: &Value) -> Result<Value> {
        let Some(x) = x else {
            return Ok(Value::String(String::new()));
        };
        let value = self.execute_expr(x, data)?;
        if self.executing_left_arrow_arg {
            // A left arrow function argument must be YAML text. Function
            // values cannot be marshalled; stash them and emit a placeholder
            // that the unmarshaler restores.
            if value.is_func() {
                let name = self.stash.borrow_mut().save(value);
                if quoted {
                    return Ok(Value::String(format!("'{{{{{name}}}}}'")));
                }
                return Ok(Value::String(format!("{{{{{name}}}}}")));
            }
            return Ok(Value::String(value::marshal(&value)?));
        }
        Ok(value)
    }

    fn execute_unary(&self, op: &Token, right: Value) -> Result<Value> {
        match op {
            Token::Minus => match right {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| anyhow!("-({n}) overflows int")),
                Value::Uint(n) => {
                    if n <= i64::MAX as u64 {
                        Ok(Value::Int(-(n as i64)))
                    } else if n == i64::MAX as u64 + 1 {
                        Ok(Value::Int(i64::MIN))
                    } else {
                        Err(anyhow!("-{n} overflows int"))
                    }
                }
                Value::Float(f) => Ok(Value::Float(-f)),
                other => bail!(
                    "unknown operation: operator {op} not defined on {}",
                    other.type_name()
                ),
            },
            Token::Bang => match right {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => bail!(
                    "unknown operation: operator {op} not defined on {}",
                    other.type_name()
                ),
            },
            _ => bail!("unknown operator: {op}"),
        }
    }

    fn execute_binary(&self, left: &Expr, op: &Token, right: &Expr, data: &Value) -> Result<Value> {
        let x = self.execute_expr(left, data)?;
        let y = self.execute_expr(right, data)?;

        if x.kind() != y.kind() {
            bail!(
                "{x} {op} {y}: mismatched types {} and {}",
                x.type_name(),
                y.type_name()
            );
        }

        match op {
            Token::Eq => {
                if let Some(b) = value::equal(&x, &y) {
                    return Ok(Value::Bool(b));
                }
            }
            Token::NotEq => {
                if let Some(b) = value::equal(&x, &y) {
                    return Ok(Value::Bool(!b));
                }
            }
            _ => {}
        }

        let rhs_is_param = matches!(right, Expr::Parameter { .. });
        match (&x, &y) {
            (Value::Int(a), Value::Int(b)) => self.eval_int_infix(*a, op, *b),
            (Value::Uint(a), Value::Uint(b)) => self.eval_uint_infix(*a, op, *b),
            (Value::Float(a), Value::Float(b)) => self.eval_float_infix(*a, op, *b),
            (Value::Bool(a), Value::Bool(b)) => self.eval_bool_infix(*a, op, *b),
            (Value::String(a), Value::String(b)) => self.eval_string_infix(a, op, b, rhs_is_param),
            (Value::Bytes(a), Value::Bytes(b)) => self.eval_bytes_infix(a, op, b),
            (Value::Null, Value::Null) => bail!("operator {op} not defined on nil"),
            _ => bail!(
                "operator {op} not defined on {x} (value of type {})",
                x.type_name()
            ),
        }
    }

    fn eval_int_infix(&self, a: i64, op: &Token, b: i64) -> Result<Value> {
        match op {
            Token::Plus => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| anyhow!("{a} + {b} overflows int")),
            Token::Minus => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| anyhow!("{a} - {b} overflows int")),
            Token::Asterisk => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| anyhow!("{a} * {b} overflows int")),
            Token::Slash => {
                if b == 0 {
                    bail!("division by 0");
                }
                a.checked_div(b)
                    .map(Value::Int)
                    .ok_or_else(|| anyhow!("{a} / {b} overflows int"))
            }
            Token::Percent => {
                if b == 0 {
                    bail!("division by 0");
                }
                Ok(Value::Int(a.checked_rem(b).unwrap_or(0)))
            }
            Token::Lt => Ok(Value::Bool(a < b)),
            Token::LtEq => Ok(Value::Bool(a <= b)),
            Token::Gt => Ok(Value::Bool(a > b)),
            Token::GtEq => Ok(Value::Bool(a >= b)),
            _ => bail!("operator {op} not defined on int"),
        }
    }

    fn eval_uint_infix(&self, a: u64, op: &Token, b: u64) -> Result<Value> {
        match op {
            Token::Plus => a
                .checked_add(b)
                .map(Value::Uint)
                .ok_or_else(|| anyhow!("{a} + {b} overflows uint")),
            Token::Minus => a
                .checked_sub(b)
                .map(Value::Uint)
                .ok_or_else(|| anyhow!("{a} - {b} overflows uint")),
            Token::Asterisk => a
                .checked_mul(b)
                .map(Value::Uint)
                .ok_or_else(|| anyhow!("{a} * {b} overflows uint")),
            Token::Slash => {
                if b == 0 {
                    bail!("division by 0");
                }
                Ok(Value::Uint(a / b))
            }
            Token::Percent => {
                if b == 0 {
                    bail!("division by 0");
                }
                Ok(Value::Uint(a % b))
            }
            Token::Lt => Ok(Value::Bool(a < b)),
            Token::LtEq => Ok(Value::Bool(a <= b)),
            Token::Gt => Ok(Value::Bool(a > b)),
            Token::GtEq => Ok(Value::Bool(a >= b)),
            _ => bail!("operator {op} not defined on uint"),
        }
    }

    fn eval_float_infix(&self, a: f64, op: &Token, b: f64) -> Result<Value> {
        match op {
            Token::Plus => Ok(Value::Float(a + b)),
            Token::Minus => Ok(Value::Float(a - b)),
            Token::Asterisk => Ok(Value::Float(a * b)),
            Token::Slash => {
                if b == 0.0 {
                    bail!("division by 0");
                }
                Ok(Value::Float(a / b))
            }
            Token::Lt => Ok(Value::Bool(a < b)),
            Token::LtEq => Ok(Value::Bool(a <= b)),
            Token::Gt => Ok(Value::Bool(a > b)),
            Token::GtEq => Ok(Value::Bool(a >= b)),
            _ => bail!("operator {op} not defined on float"),
        }
    }

    fn eval_bool_infix(&self, a: bool, op: &Token, b: bool) -> Result<Value> {
        // Both operands are already evaluated; && and || are eager.
        match op {
            Token::And => Ok(Value::Bool(a && b)),
            Token::Or => Ok(Value::Bool(a || b)),
            _ => bail!("operator {op} not defined on bool"),
        }
    }

    fn eval_string_infix(&self, a: &str, op: &Token, b: &str, rhs_is_param: bool) -> Result<Value> {
        match op {
            Token::Plus => {
                if self.executing_left_arrow_arg && rhs_is_param {
                    return Ok(Value::String(format!("{a}{}", add_indent(b, a))));
                }
                Ok(Value::String(format!("{a}{b}")))
            }
            Token::Lt => Ok(Value::Bool(a < b)),
            Token::LtEq => Ok(Value::Bool(a <= b)),
            Token::Gt => Ok(Value::Bool(a > b)),
            Token::GtEq => Ok(Value::Bool(a >= b)),
            _ => bail!("operator {op} not defined on string"),
        }
    }

    fn eval_bytes_infix(&self, a: &[u8], op: &Token, b: &[u8]) -> Result<Value> {
        match op {
            Token::Plus => Ok(Value::Bytes([a, b].concat())),
            Token::Lt => Ok(Value::Bool(a < b)),
            Token::LtEq => Ok(Value::Bool(a <= b)),
            Token::Gt => Ok(Value::Bool(a > b)),
            Token::GtEq => Ok(Value::Bool(a >= b)),
            _ => bail!("operator {op} not defined on bytes"),
        }
    }

    fn execute_conditional(
        &self,
        cond: &Expr,
        then: &Expr,
        els: &Expr,
        data: &Value,
    ) -> Result<Value> {
        let condition = self.execute_expr(cond, data)?;
        let Value::Bool(condition) = condition else {
            bail!(
                "invalid operation: operator ? not defined on {condition} (value of type {})",
                condition.type_name()
            );
        };
        if condition {
            self.execute_expr(then, data)
        } else {
            self.execute_expr(els, data)
        }
    }

    fn execute_defined(&self, arg: &Expr, data: &Value) -> Result<Value> {
        match arg {
            Expr::Ident(_) | Expr::Selector { .. } | Expr::Index { .. } => {
                match self.lookup(arg, data) {
                    Ok(_) => Ok(Value::Bool(true)),
                    Err(err) if err.downcast_ref::<NotDefined>().is_some() => {
                        Ok(Value::Bool(false))
                    }
                    Err(err) => Err(err),
                }
            }
            _ => bail!("invalid argument to defined()"),
        }
    }

    fn execute_call(&self, fun: &Expr, args: &[Expr], data: &Value) -> Result<Value> {
        let mut fn_name = String::from("function");
        let func = match fun {
            Expr::Selector { x, sel } => {
                // Fields are preferred over methods; a non-function field
                // shadows a same-named method.
                let receiver = self.execute_expr(x, data)?;
                fn_name = sel.clone();
                match value::field(&receiver, sel) {
                    Some(v) => as_func(v)?,
                    None => match value::method(&receiver, sel) {
                        Some(method) => method,
                        None => {
                            return Err(NotDefined {
                                path: path_of(fun),
                            }
                            .into())
                        }
                    },
                }
            }
            _ => {
                let v = self.execute_expr(fun, data)?;
                if let Expr::Ident(name) = fun {
                    fn_name = name.clone();
                }
                as_func(v)?
            }
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.execute_expr(arg, data)?);
        }
        func.call(&fn_name, values)
    }

    fn execute_left_arrow(&self, fun: &Expr, arg: Option<&Expr>, data: &Value) -> Result<Value> {
        let v = self.execute_expr(fun, data)?;
        let f = match v {
            Value::LeftArrow(f) => f,
            other => bail!("expect left arrow function but got {}", other.type_name()),
        };

        // Without an argument (e.g. in a map key position), hand back a lazy
        // handle for the enclosing document to complete.
        let Some(arg) = arg else {
            return Ok(Value::Lazy(f));
        };

        let child = Template {
            src: self.src.clone(),
            expr: arg.clone(),
            executing_left_arrow_arg: true,
            stash: Rc::clone(&self.stash),
        };
        let v = child.execute_expr(&child.expr, data)?;
        let Value::String(text) = v else {
            bail!("expect string but got {}", v.type_name());
        };

        let stash = self.stash.borrow();
        let arg_value = f.unmarshal_arg(ArgUnmarshaler::new(text.trim(), &stash))?;
        drop(stash);
        f.exec(arg_value)
    }

    fn lookup(&self, expr: &Expr, data: &Value) -> Result<Value> {
        match expr {
            Expr::Ident(name) => value::field(data, name).ok_or_else(|| {
                NotDefined {
                    path: format!(".{name}"),
                }
                .into()
            }),
            Expr::Selector { x, sel } => {
                let base = self.execute_expr(x, data)?;
                value::field(&base, sel).ok_or_else(|| {
                    NotDefined {
                        path: path_of(expr),
                    }
                    .into()
                })
            }
            Expr::Index { x, index } => {
                let base = self.execute_expr(x, data)?;
                let idx = self.execute_expr(index, data)?;
                value::index(&base, &idx).ok_or_else(|| {
                    NotDefined {
                        path: path_of(expr),
                    }
                    .into()
                })
            }
            _ => bail!("cannot look up {expr:?}"),
        }
    }
}

fn as_func(v: Value) -> Result<FuncValue> {
    match v {
        Value::Func(f) => Ok(f),
        _ => bail!("not function"),
    }
}

/// Renders a lookup chain as a dotted path for diagnostics, e.g.
/// `.items[2].code`.
fn path_of(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => format!(".{name}"),
        Expr::Selector { x, sel } => format!("{}.{sel}", path_of(x)),
        Expr::Index { x, index } => {
            let idx = match index.as_ref() {
                Expr::IntLit(value) => value.clone(),
                Expr::StringLit(value) => format!("{value:?}"),
                _ => "?".to_string(),
            };
            format!("{}[{idx}]", path_of(x))
        }
        _ => String::new(),
    }
}

/// Parses an integer literal, accepting decimal, hex `0x...`, and
/// leading-zero octal forms.
fn parse_int_literal(text: &str) -> Result<Value> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<i64>()
    };
    parsed
        .map(Value::Int)
        .map_err(|err| anyhow!("invalid AST: \"{text}\" is not an integer: {err}"))
}

/// Aligns the indent of a marshalled multi-line text with the last line of
/// the prefix it is being appended to:
///
/// ```text
/// add_indent("a: 1\nb: 2", "- ")
/// === before ===
/// - a: 1
/// b: 2
/// === after ===
/// - a: 1
///   b: 2
/// ```
fn add_indent(text: &str, pre: &str) -> String {
    if !text.contains('\n') || pre.is_empty() {
        return text.to_string();
    }
    let last_line = pre.rsplit('\n').next().unwrap_or("");
    let prefix = " ".repeat(last_line.chars().count());
    let mut out = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i != 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&prefix);
            }
        }
        out.push_str(line);
    }
    out
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
