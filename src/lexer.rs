use anyhow::{bail, Result};

use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Verbatim text until the next `{{`.
    Raw,
    /// Inside `{{ ... }}`.
    Expr,
    /// Inside a left arrow argument `<- ( ... )`; verbatim text with paren
    /// balancing, re-entering `Expr` on nested `{{`.
    Arg { depth: usize },
}

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    modes: Vec<Mode>,
    arrow_pending: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            modes: vec![Mode::Raw],
            arrow_pending: false,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>> {
        match self.mode() {
            Mode::Raw => self.next_raw_token(),
            Mode::Expr => self.next_expr_token(),
            Mode::Arg { .. } => self.next_arg_token(),
        }
    }

    fn mode(&self) -> Mode {
        self.modes.last().copied().unwrap_or(Mode::Raw)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn starts_with(&self, pattern: &str) -> bool {
        pattern
            .chars()
            .enumerate()
            .all(|(i, ch)| self.peek_at(i) == Some(ch))
    }

    fn next_raw_token(&mut self) -> Result<Option<Token>> {
        if self.peek().is_none() {
            return Ok(None);
        }
        if self.starts_with("{{") {
            self.position += 2;
            self.modes.push(Mode::Expr);
            return Ok(Some(Token::LdBrace));
        }
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if self.starts_with("{{") {
                break;
            }
            text.push(ch);
            self.position += 1;
        }
        Ok(Some(Token::RawText(text)))
    }

    fn next_arg_token(&mut self) -> Result<Option<Token>> {
        if self.peek().is_none() {
            bail!(
                "unterminated left arrow function argument at offset {}",
                self.position
            );
        }
        if self.starts_with("{{") {
            self.position += 2;
            self.modes.push(Mode::Expr);
            return Ok(Some(Token::LdBrace));
        }
        let mut depth = match self.modes.last() {
            Some(Mode::Arg { depth }) => *depth,
            _ => 0,
        };
        if depth == 0 && self.peek() == Some(')') {
            self.position += 1;
            self.modes.pop();
            return Ok(Some(Token::Rparen));
        }
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if self.starts_with("{{") {
                break;
            }
            match ch {
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            text.push(ch);
            self.position += 1;
        }
        if let Some(Mode::Arg { depth: d }) = self.modes.last_mut() {
            *d = depth;
        }
        Ok(Some(Token::RawText(text)))
    }

    fn next_expr_token(&mut self) -> Result<Option<Token>> {
        while self.peek().is_some_and(|ch| ch.is_whitespace()) {
            self.position += 1;
        }

        let arrow_pending = self.arrow_pending;
        self.arrow_pending = false;

        let Some(ch) = self.peek() else {
            bail!("unterminated template at offset {}", self.position);
        };

        if self.starts_with("}}") {
            self.position += 2;
            self.modes.pop();
            return Ok(Some(Token::RdBrace));
        }

        for (pattern, token) in [
            ("<-", Token::Arrow),
            ("==", Token::Eq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
            ("&&", Token::And),
            ("||", Token::Or),
        ] {
            if self.starts_with(pattern) {
                self.position += 2;
                if token == Token::Arrow {
                    self.arrow_pending = true;
                }
                return Ok(Some(token));
            }
        }

        let token = match ch {
            '(' => {
                if arrow_pending {
                    self.modes.push(Mode::Arg { depth: 0 });
                }
                Some(Token::Lparen)
            }
            ')' => Some(Token::Rparen),
            '[' => Some(Token::Lbracket),
            ']' => Some(Token::Rbracket),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Asterisk),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '!' => Some(Token::Bang),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '?' => Some(Token::Question),
            ':' => Some(Token::Colon),
            '.' => Some(Token::Dot),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = token {
            self.position += 1;
            return Ok(Some(token));
        }

        match ch {
            '"' | '\'' => Ok(Some(self.read_string(ch)?)),
            _ if ch.is_ascii_digit() => Ok(Some(self.read_number())),
            _ if ch.is_alphabetic() || ch == '_' => Ok(Some(self.read_ident())),
            _ => bail!("unknown character '{ch}' at offset {}", self.position),
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start = self.position;
        self.position += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => bail!("unterminated string literal at offset {start}"),
                Some(ch) if ch == quote => {
                    self.position += 1;
                    return Ok(Token::Str(value));
                }
                Some('\\') => {
                    self.position += 1;
                    let Some(escaped) = self.peek() else {
                        bail!("unterminated string literal at offset {start}");
                    };
                    let ch = match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        other => {
                            bail!("invalid escape character '\\{other}' at offset {}", self.position)
                        }
                    };
                    value.push(ch);
                    self.position += 1;
                }
                Some(ch) => {
                    value.push(ch);
                    self.position += 1;
                }
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        if self.starts_with("0x") || self.starts_with("0X") {
            self.position += 2;
            while self.peek().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                self.position += 1;
            }
            return Token::Int(self.text_from(start));
        }
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.position += 1;
        }
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit()) {
            is_float = true;
            self.position += 1;
            while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                self.position += 1;
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                let mut ahead = 1;
                if matches!(self.peek_at(1), Some('+') | Some('-')) {
                    ahead = 2;
                }
                if self.peek_at(ahead).is_some_and(|ch| ch.is_ascii_digit()) {
                    self.position += ahead;
                    while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
                        self.position += 1;
                    }
                }
            }
        }
        let text = self.text_from(start);
        if is_float {
            Token::Float(text)
        } else {
            Token::Int(text)
        }
    }

    fn read_ident(&mut self) -> Token {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
        {
            self.position += 1;
        }
        match self.text_from(start).as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "defined" => Token::Defined,
            ident => Token::Ident(ident.to_string()),
        }
    }

    fn text_from(&self, start: usize) -> String {
        self.chars[start..self.position].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Result<Vec<Token>> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    #[test]
    fn test_raw_and_expression_tokens() {
        let tokens = lex("hello, {{ name }}!").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::RawText("hello, ".to_string()),
                Token::LdBrace,
                Token::Ident("name".to_string()),
                Token::RdBrace,
                Token::RawText("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_expression_tokens() {
        let tokens = lex(r#"{{ (a.b[0] + 0x1f) * -2.5e3 % 10 / 3 - 1 }}"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LdBrace,
                Token::Lparen,
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("b".to_string()),
                Token::Lbracket,
                Token::Int("0".to_string()),
                Token::Rbracket,
                Token::Plus,
                Token::Int("0x1f".to_string()),
                Token::Rparen,
                Token::Asterisk,
                Token::Minus,
                Token::Float("2.5e3".to_string()),
                Token::Percent,
                Token::Int("10".to_string()),
                Token::Slash,
                Token::Int("3".to_string()),
                Token::Minus,
                Token::Int("1".to_string()),
                Token::RdBrace,
            ]
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        let tokens =
            lex(r#"{{ defined(x) && true || false == !a != b <= c >= d < e > f ? "y" : 'n' }}"#)
                .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LdBrace,
                Token::Defined,
                Token::Lparen,
                Token::Ident("x".to_string()),
                Token::Rparen,
                Token::And,
                Token::True,
                Token::Or,
                Token::False,
                Token::Eq,
                Token::Bang,
                Token::Ident("a".to_string()),
                Token::NotEq,
                Token::Ident("b".to_string()),
                Token::LtEq,
                Token::Ident("c".to_string()),
                Token::GtEq,
                Token::Ident("d".to_string()),
                Token::Lt,
                Token::Ident("e".to_string()),
                Token::Gt,
                Token::Ident("f".to_string()),
                Token::Question,
                Token::Str("y".to_string()),
                Token::Colon,
                Token::Str("n".to_string()),
                Token::RdBrace,
            ]
        );
    }

    #[test]
    fn test_left_arrow_argument() {
        let tokens = lex(r#"{{ echo <- (msg: "hi (really)") }}"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LdBrace,
                Token::Ident("echo".to_string()),
                Token::Arrow,
                Token::Lparen,
                Token::RawText(r#"msg: "hi (really)""#.to_string()),
                Token::Rparen,
                Token::RdBrace,
            ]
        );
    }

    #[test]
    fn test_left_arrow_argument_with_interpolation() {
        let tokens = lex("{{ echo <- (msg: {{greeting}}) }}").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LdBrace,
                Token::Ident("echo".to_string()),
                Token::Arrow,
                Token::Lparen,
                Token::RawText("msg: ".to_string()),
                Token::LdBrace,
                Token::Ident("greeting".to_string()),
                Token::RdBrace,
                Token::Rparen,
                Token::RdBrace,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#"{{ "a\"b\n\t\\c" }}"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::LdBrace,
                Token::Str("a\"b\n\t\\c".to_string()),
                Token::RdBrace,
            ]
        );
    }

    #[test]
    fn test_lexer_errors() {
        let tests = vec![
            (r#"{{ "unterminated }}"#, "unterminated string literal at offset 3"),
            (r#"{{ "bad \q escape" }}"#, r#"invalid escape character '\q' at offset 9"#),
            ("{{ a @ b }}", "unknown character '@' at offset 5"),
            ("{{ a + b", "unterminated template at offset 8"),
            ("{{ f <- (a: 1", "unterminated left arrow function argument at offset 13"),
        ];

        for (input, expected) in tests {
            let error = lex(input).unwrap_err();
            assert_eq!(error.to_string(), expected, "input: {input}");
        }
    }
}
