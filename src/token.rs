use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// Verbatim text outside `{{ }}` and inside left arrow arguments.
    RawText(String),
    Ident(String),
    Int(String),
    Float(String),
    Str(String),

    True,
    False,
    Defined,

    LdBrace,
    RdBrace,
    Arrow,

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Bang,

    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,

    Question,
    Colon,
    Dot,
    Comma,

    Lparen,
    Rparen,
    Lbracket,
    Rbracket,
}

impl Token {
    pub fn variant_eq(&self, other: Token) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&other)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::RawText(text) => write!(f, "{}", text),
            Token::Ident(ident) => write!(f, "{}", ident),
            Token::Int(value) => write!(f, "{}", value),
            Token::Float(value) => write!(f, "{}", value),
            Token::Str(value) => write!(f, "\"{}\"", value),

            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Defined => write!(f, "defined"),

            Token::LdBrace => write!(f, "{{{{"),
            Token::RdBrace => write!(f, "}}}}"),
            Token::Arrow => write!(f, "<-"),

            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Asterisk => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::Bang => write!(f, "!"),

            Token::Eq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),

            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),

            Token::Lparen => write!(f, "("),
            Token::Rparen => write!(f, ")"),
            Token::Lbracket => write!(f, "["),
            Token::Rbracket => write!(f, "]"),
        }
    }
}
