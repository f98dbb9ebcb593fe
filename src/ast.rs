use crate::token::Token;

/// An expression tree node.
///
/// Integer and float literals keep their source text; radix handling and
/// range checks happen at evaluation time.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    StringLit(String),
    IntLit(String),
    FloatLit(String),
    BoolLit(bool),
    Ident(String),
    Selector {
        x: Box<Expr>,
        sel: String,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    /// An interpolation site, originally `{{...}}` or `'{{...}}'`.
    Parameter {
        x: Option<Box<Expr>>,
        quoted: bool,
    },
    Paren(Box<Expr>),
    Unary {
        op: Token,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `fun <- (arg)`; the argument tree is evaluated in re-serialisation
    /// mode and handed to the callee as YAML text. `arg` is `None` for the
    /// argless form `{{fun <-}}`.
    LeftArrow {
        fun: Box<Expr>,
        arg: Option<Box<Expr>>,
    },
    Defined(Box<Expr>),
}
