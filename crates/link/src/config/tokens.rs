use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TokenKind {
    LBrace,
    RBrace,
    Colon,
    Semi,
    Comma,
    Eq,
    Str(String),
    Word,
}

#[derive(Debug, Clone)]
pub(super) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// A `key = value` pair. `text` is the unquoted string, or the source slice
/// covering every word of a bare value.
#[derive(Debug, Clone)]
pub(super) struct Attribute {
    pub key: String,
    pub text: String,
    pub quoted: bool,
    pub span: Range<usize>,
}

#[derive(Debug, Clone)]
pub(super) struct Statement {
    pub name: String,
    pub span: Range<usize>,
    pub attributes: Vec<Attribute>,
}

impl Statement {
    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .rev()
            .find(|attribute| attribute.key.eq_ignore_ascii_case(key))
    }
}

#[derive(Debug, Clone)]
pub(super) struct Block {
    pub name: String,
    pub statements: Vec<Statement>,
}

fn is_word_char(ch: char) -> bool {
    !ch.is_whitespace() && !matches!(ch, '{' | '}' | ':' | ';' | ',' | '=' | '"' | '#')
}

pub(super) fn tokenize(text: &str) -> Result<Vec<Token>, ConfigParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '#' {
            while chars.next_if(|(_, ch)| *ch != '\n').is_some() {}
            continue;
        }

        if text[start..].starts_with("/*") {
            let Some(len) = text[start + 2..].find("*/") else {
                return Err(ConfigParseError::Unterminated {
                    what: "comment",
                    span: start..text.len(),
                });
            };
            let end = start + 2 + len + 2;
            while chars.next_if(|(index, _)| *index < end).is_some() {}
            continue;
        }

        let punct = match ch {
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ':' => Some(TokenKind::Colon),
            ';' => Some(TokenKind::Semi),
            ',' => Some(TokenKind::Comma),
            '=' => Some(TokenKind::Eq),
            _ => None,
        };
        if let Some(kind) = punct {
            chars.next();
            tokens.push(Token {
                kind,
                span: start..start + 1,
            });
            continue;
        }

        if ch == '"' {
            chars.next();
            let Some(len) = text[start + 1..].find(['"', '\n']) else {
                return Err(ConfigParseError::Unterminated {
                    what: "string",
                    span: start..text.len(),
                });
            };
            let end = start + 1 + len;
            if !text[end..].starts_with('"') {
                return Err(ConfigParseError::Unterminated {
                    what: "string",
                    span: start..end,
                });
            }
            while chars.next_if(|(index, _)| *index <= end).is_some() {}
            tokens.push(Token {
                kind: TokenKind::Str(text[start + 1..end].to_string()),
                span: start..end + 1,
            });
            continue;
        }

        let mut end = start;
        while let Some(&(index, ch)) = chars.peek() {
            if !is_word_char(ch) || text[index..].starts_with("/*") {
                break;
            }
            end = index + ch.len_utf8();
            chars.next();
        }
        tokens.push(Token {
            kind: TokenKind::Word,
            span: start..end,
        });
    }

    Ok(tokens)
}

/// Recursive descent over `NAME { name: key = value, ...; ... }` blocks.
pub(super) struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(text: &'a str) -> Result<Self, ConfigParseError> {
        Ok(Self {
            text,
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    pub fn parse_blocks(mut self) -> Result<Vec<Block>, ConfigParseError> {
        let mut blocks = Vec::new();
        while self.peek().is_some() {
            blocks.push(self.parse_block()?);
        }
        Ok(blocks)
    }

    fn parse_block(&mut self) -> Result<Block, ConfigParseError> {
        let name = self.expect_word("block name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        loop {
            match self.peek().map(|token| &token.kind) {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(TokenKind::Semi) => self.pos += 1,
                Some(_) => statements.push(self.parse_statement()?),
                None => {
                    return Err(ConfigParseError::Unterminated {
                        what: "block",
                        span: name.start..self.text.len(),
                    });
                }
            }
        }
        Ok(Block {
            name: self.slice(&name).to_string(),
            statements,
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, ConfigParseError> {
        let span = self.expect_word("statement name")?;
        self.expect(&TokenKind::Colon, "':'")?;

        let mut attributes = Vec::new();
        loop {
            match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Semi) => {
                    self.pos += 1;
                    break;
                }
                Some(TokenKind::Comma) if !attributes.is_empty() => self.pos += 1,
                Some(TokenKind::Word) => attributes.push(self.parse_attribute()?),
                _ => return Err(self.unexpected("attribute or ';'")),
            }
        }

        Ok(Statement {
            name: self.slice(&span).to_string(),
            span,
            attributes,
        })
    }

    fn parse_attribute(&mut self) -> Result<Attribute, ConfigParseError> {
        let key_span = self.expect_word("attribute name")?;
        self.expect(&TokenKind::Eq, "'='")?;

        if let Some(Token {
            kind: TokenKind::Str(text),
            span,
        }) = self.peek().cloned()
        {
            self.pos += 1;
            return Ok(Attribute {
                key: self.slice(&key_span).to_string(),
                text,
                quoted: true,
                span,
            });
        }

        let mut span: Option<Range<usize>> = None;
        while let Some(token) = self.peek()
            && token.kind == TokenKind::Word
            && !self.starts_next_attribute()
        {
            let word = token.span.clone();
            span = Some(match span {
                Some(existing) => existing.start..word.end,
                None => word,
            });
            self.pos += 1;
        }
        let Some(span) = span else {
            return Err(self.unexpected("attribute value"));
        };

        Ok(Attribute {
            key: self.slice(&key_span).to_string(),
            text: self.slice(&span).to_string(),
            quoted: false,
            span,
        })
    }

    // `size = $100 start = $0801` without a comma
    fn starts_next_attribute(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|token| &token.kind),
            Some(TokenKind::Eq)
        )
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn slice(&self, span: &Range<usize>) -> &'a str {
        &self.text[span.clone()]
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<(), ConfigParseError> {
        match self.peek() {
            Some(token) if &token.kind == kind => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn expect_word(&mut self, expected: &'static str) -> Result<Range<usize>, ConfigParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Word,
                span,
            }) => {
                let span = span.clone();
                self.pos += 1;
                Ok(span)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &'static str) -> ConfigParseError {
        match self.peek() {
            Some(token) => ConfigParseError::Unexpected {
                expected,
                found: format!("'{}'", self.slice(&token.span)),
                span: token.span.clone(),
            },
            None => ConfigParseError::Unexpected {
                expected,
                found: "end of input".to_string(),
                span: self.text.len()..self.text.len(),
            },
        }
    }
}
