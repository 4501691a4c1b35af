use crate::{EvalContext, EvalError};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(i64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    Bang,
    Tilde,
    LParen,
    RParen,
    End,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

#[derive(Debug)]
struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn lex_all(&mut self) -> Result<Vec<Token>, EvalError> {
        let mut out = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_end = matches!(token.kind, TokenKind::End);
            out.push(token);
            if is_end {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        self.skip_ws();
        if self.pos >= self.bytes.len() {
            return Ok(Token {
                kind: TokenKind::End,
                start: self.pos,
                end: self.pos,
            });
        }

        let start = self.pos;

        macro_rules! punct {
            ($literal:literal, $kind:expr) => {
                if self.starts_with($literal) {
                    self.pos += $literal.len();
                    return Ok(Token {
                        kind: $kind,
                        start,
                        end: self.pos,
                    });
                }
            };
        }

        punct!("<<", TokenKind::Shl);
        punct!(">>", TokenKind::Shr);

        let ch = self.bytes[self.pos] as char;
        match ch {
            '$' => return self.lex_radix(1, 16),
            '0' if matches!(self.peek_char(1), Some('x' | 'X')) => return self.lex_radix(2, 16),
            '0' if matches!(self.peek_char(1), Some('b' | 'B')) => return self.lex_radix(2, 2),
            '%' if matches!(self.peek_char(1), Some('0' | '1')) => return self.lex_radix(1, 2),
            '%' if matches!(self.peek_char(1), Some(next) if next.is_ascii_alphabetic()) => {
                return Ok(self.lex_ident(1));
            }
            '0'..='9' => return self.lex_radix(0, 10),
            'a'..='z' | 'A'..='Z' | '_' => return Ok(self.lex_ident(0)),
            _ => {}
        }

        punct!("+", TokenKind::Plus);
        punct!("-", TokenKind::Minus);
        punct!("*", TokenKind::Star);
        punct!("/", TokenKind::Slash);
        punct!("%", TokenKind::Percent);
        punct!("&", TokenKind::Amp);
        punct!("|", TokenKind::Pipe);
        punct!("^", TokenKind::Caret);
        punct!("!", TokenKind::Bang);
        punct!("~", TokenKind::Tilde);
        punct!("(", TokenKind::LParen);
        punct!(")", TokenKind::RParen);

        let token = self.input[start..].chars().next().unwrap_or(ch);
        Err(EvalError::UnexpectedToken {
            column: start + 1,
            token: format_token_for_message(&token.to_string()),
        })
    }

    /// Lexes digits of `radix` after a prefix of `prefix_len` bytes.
    fn lex_radix(&mut self, prefix_len: usize, radix: u32) -> Result<Token, EvalError> {
        let start = self.pos;
        self.pos += prefix_len;
        let digits_start = self.pos;
        while matches!(self.peek_char(0), Some(ch) if ch.is_digit(radix)) {
            self.pos += 1;
        }
        // `12ab` or `$1G` is one malformed literal, not a number followed by an identifier.
        while matches!(self.peek_char(0), Some(ch) if ch.is_ascii_alphanumeric() || ch == '_') {
            self.pos += 1;
        }

        let literal = &self.input[start..self.pos];
        let digits = &self.input[digits_start..self.pos];
        if digits.is_empty() {
            return Err(EvalError::InvalidNumber {
                literal: literal.to_string(),
            });
        }
        let value = i64::from_str_radix(digits, radix).map_err(|_| EvalError::InvalidNumber {
            literal: literal.to_string(),
        })?;
        Ok(Token {
            kind: TokenKind::Number(value),
            start,
            end: self.pos,
        })
    }

    fn lex_ident(&mut self, prefix_len: usize) -> Token {
        let start = self.pos;
        self.pos += prefix_len;
        while matches!(self.peek_char(0), Some(ch) if ch.is_ascii_alphanumeric() || ch == '_') {
            self.pos += 1;
        }
        Token {
            kind: TokenKind::Ident(self.input[start..self.pos].to_string()),
            start,
            end: self.pos,
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(0), Some(ch) if ch.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, value: &str) -> bool {
        self.input[self.pos..].starts_with(value)
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.bytes.get(self.pos + offset).map(|b| *b as char)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Number(i64),
    Ident {
        name: String,
        start: usize,
        end: usize,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy)]
enum UnaryOp {
    Plus,
    Minus,
    LogicalNot,
    BitNot,
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Self::BitOr => 1,
            Self::BitXor => 2,
            Self::BitAnd => 3,
            Self::Shl | Self::Shr => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Rem => 6,
        }
    }

    fn from_token(kind: &TokenKind) -> Option<Self> {
        let op = match kind {
            TokenKind::Star => Self::Mul,
            TokenKind::Slash => Self::Div,
            TokenKind::Percent => Self::Rem,
            TokenKind::Plus => Self::Add,
            TokenKind::Minus => Self::Sub,
            TokenKind::Shl => Self::Shl,
            TokenKind::Shr => Self::Shr,
            TokenKind::Amp => Self::BitAnd,
            TokenKind::Caret => Self::BitXor,
            TokenKind::Pipe => Self::BitOr,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug)]
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(&mut self) -> Result<Expr, EvalError> {
        let expr = self.parse_binary(0)?;
        if !matches!(self.current().kind, TokenKind::End) {
            return Err(self.unexpected_token());
        }
        Ok(expr)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = BinaryOp::from_token(&self.current().kind) {
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(precedence)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.current().kind {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Bang => UnaryOp::LogicalNot,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.parse_primary(),
        };
        self.bump();
        Ok(Expr::Unary {
            op,
            expr: Box::new(self.parse_unary()?),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.current().kind.clone() {
            TokenKind::Number(value) => {
                self.bump();
                Ok(Expr::Number(value))
            }
            TokenKind::Ident(name) => {
                let start = self.current().start;
                let end = self.current().end;
                self.bump();
                Ok(Expr::Ident { name, start, end })
            }
            TokenKind::LParen => {
                self.bump();
                let value = self.parse_binary(0)?;
                if !matches!(self.current().kind, TokenKind::RParen) {
                    return Err(self.unexpected_token());
                }
                self.bump();
                Ok(value)
            }
            TokenKind::End => Err(EvalError::UnexpectedEof),
            _ => Err(self.unexpected_token()),
        }
    }

    fn current(&self) -> &Token {
        // the lexer always terminates the stream with `End`, and `parse` stops there
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn unexpected_token(&self) -> EvalError {
        EvalError::UnexpectedToken {
            column: self.current().start + 1,
            token: self.current().kind.describe(),
        }
    }
}

fn format_token_for_message(token: &str) -> String {
    let escaped: String = token.chars().flat_map(char::escape_default).collect();
    format!("'{escaped}'")
}

impl TokenKind {
    fn describe(&self) -> String {
        let text = match self {
            Self::Number(_) => return "number literal".to_string(),
            Self::Ident(name) => return format_token_for_message(name),
            Self::End => return "end of expression".to_string(),
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Bang => "!",
            Self::Tilde => "~",
            Self::LParen => "(",
            Self::RParen => ")",
        };
        format!("'{text}'")
    }
}

fn evaluate_expr(expr: &Expr, context: &EvalContext) -> Result<i64, EvalError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Ident { name, start, end } => {
            context
                .get(name)
                .ok_or_else(|| EvalError::UnknownIdentifier {
                    name: name.clone(),
                    start: *start,
                    end: *end,
                })
        }
        Expr::Unary { op, expr } => {
            let value = evaluate_expr(expr, context)?;
            match op {
                UnaryOp::Plus => Ok(value),
                UnaryOp::Minus => value.checked_neg().ok_or(EvalError::Overflow),
                UnaryOp::LogicalNot => Ok(i64::from(value == 0)),
                UnaryOp::BitNot => Ok(!value),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate_expr(lhs, context)?;
            let rhs = evaluate_expr(rhs, context)?;
            apply_binary(*op, lhs, rhs)
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: i64, rhs: i64) -> Result<i64, EvalError> {
    let value = match op {
        BinaryOp::Mul => lhs.checked_mul(rhs),
        BinaryOp::Div | BinaryOp::Rem if rhs == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => lhs.checked_div(rhs),
        BinaryOp::Rem => lhs.checked_rem(rhs),
        BinaryOp::Add => lhs.checked_add(rhs),
        BinaryOp::Sub => lhs.checked_sub(rhs),
        BinaryOp::Shl | BinaryOp::Shr if !(0..64).contains(&rhs) => None,
        BinaryOp::Shl => lhs.checked_shl(rhs as u32),
        BinaryOp::Shr => lhs.checked_shr(rhs as u32),
        BinaryOp::BitAnd => Some(lhs & rhs),
        BinaryOp::BitXor => Some(lhs ^ rhs),
        BinaryOp::BitOr => Some(lhs | rhs),
    };
    value.ok_or(EvalError::Overflow)
}

pub(crate) fn evaluate(input: &str, context: &EvalContext) -> Result<i64, EvalError> {
    let mut lexer = Lexer::new(input);
    let tokens = lexer.lex_all()?;
    let mut parser = Parser::new(tokens);
    let expression = parser.parse()?;
    evaluate_expr(&expression, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str) -> Result<i64, EvalError> {
        evaluate(input, &EvalContext::default())
    }

    #[test]
    fn shifts_and_bitwise() {
        assert_eq!(eval("(1 << 4) | 3").expect("eval"), 19);
        assert_eq!(eval("$FF00 >> 8 & $0F").expect("eval"), 0x0F);
        assert_eq!(eval("1 | 2 ^ 3 & 6").expect("eval"), 1 | (2 ^ (3 & 6)));
    }

    #[test]
    fn parses_number_prefixes() {
        assert_eq!(eval("$FF").expect("eval"), 255);
        assert_eq!(eval("$0d + $0A").expect("eval"), 23);
        assert_eq!(eval("0x801").expect("eval"), 0x801);
        assert_eq!(eval("%1010 + 0b11").expect("eval"), 13);
    }

    #[test]
    fn rejects_invalid_literals() {
        assert_eq!(
            eval("$").expect_err("expected invalid number"),
            EvalError::InvalidNumber {
                literal: "$".to_string()
            }
        );
        assert_eq!(
            eval("12ab").expect_err("expected invalid number"),
            EvalError::InvalidNumber {
                literal: "12ab".to_string()
            }
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(eval("10 - 3 - 2").expect("eval"), 5);
        assert_eq!(eval("64 / 4 / 2").expect("eval"), 8);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-(2 + 3)").expect("eval"), -5);
        assert_eq!(eval("~0 & $FF").expect("eval"), 0xFF);
        assert_eq!(eval("!0 + !7").expect("eval"), 1);
    }

    #[test]
    fn percent_is_a_placeholder_or_remainder() {
        let mut context = EvalContext::default();
        context.set("%S", 0x1000);
        assert_eq!(evaluate("%S + 7 % 4", &context).expect("eval"), 0x1003);
    }

    #[test]
    fn reports_arithmetic_faults() {
        assert_eq!(eval("1 / 0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1 << 64"), Err(EvalError::Overflow));
        assert_eq!(eval("$7FFFFFFFFFFFFFFF + 1"), Err(EvalError::Overflow));
    }

    #[test]
    fn reports_unexpected_tokens() {
        assert_eq!(
            eval("(1 + 2"),
            Err(EvalError::UnexpectedToken {
                column: 7,
                token: "end of expression".to_string(),
            })
        );
        assert_eq!(eval("1 +"), Err(EvalError::UnexpectedEof));
        assert!(matches!(
            eval("1 @ 2"),
            Err(EvalError::UnexpectedToken { column: 3, .. })
        ));
    }
}
