//! Parser for type expressions written as text
//!
//! Type comments (`# type: List[int]`) and quoted forward references
//! (`"Node"`) reach the engine as strings. This turns them into a small
//! syntax tree; the engine resolves the names.
//!
//! Grammar:
//! ```text
//! expr  := term ('|' term)*
//! term  := NAME ('[' args ']')? | STRING | '...' | '[' args? ']'
//! args  := expr (',' expr)*
//! ```

use thiserror::Error;

/// Parsed type expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Possibly dotted name: `int`, `typing.List`
    Name(String),
    /// `base[arg, ...]`
    Subscript { base: String, args: Vec<TypeExpr> },
    /// `a | b`
    Union(Vec<TypeExpr>),
    /// `[a, b]` (callable parameter lists)
    List(Vec<TypeExpr>),
    Ellipsis,
}

impl TypeExpr {
    /// Every name the expression refers to, in order
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeExpr::Name(n) => out.push(n),
            TypeExpr::Subscript { base, args } => {
                out.push(base);
                for a in args {
                    a.collect_names(out);
                }
            }
            TypeExpr::Union(items) | TypeExpr::List(items) => {
                for a in items {
                    a.collect_names(out);
                }
            }
            TypeExpr::Ellipsis => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeExprError {
    #[error("empty type expression")]
    Empty,
    #[error("unexpected '{found}' at offset {offset}")]
    Unexpected { found: String, offset: usize },
    #[error("unexpected end of type expression")]
    UnexpectedEnd,
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Str(String),
    LBracket,
    RBracket,
    Comma,
    Pipe,
    Ellipsis,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, TypeExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '[' => {
                out.push((i, Token::LBracket));
                i += 1;
            }
            ']' => {
                out.push((i, Token::RBracket));
                i += 1;
            }
            ',' => {
                out.push((i, Token::Comma));
                i += 1;
            }
            '|' => {
                out.push((i, Token::Pipe));
                i += 1;
            }
            '.' if chars[i..].starts_with(&['.', '.', '.']) => {
                out.push((i, Token::Ellipsis));
                i += 3;
            }
            '\'' | '"' => {
                let start = i;
                i += 1;
                let mut text = String::new();
                while i < chars.len() && chars[i] != c {
                    text.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(TypeExprError::UnterminatedString(start));
                }
                i += 1;
                out.push((start, Token::Str(text)));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                let mut text = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    text.push(chars[i]);
                    i += 1;
                }
                out.push((start, Token::Name(text)));
            }
            other => {
                return Err(TypeExprError::Unexpected {
                    found: other.to_string(),
                    offset: i,
                })
            }
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), TypeExprError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(TypeExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, want: Token) -> Result<(), TypeExprError> {
        let (offset, tok) = self.next()?;
        if tok == want {
            Ok(())
        } else {
            Err(unexpected(offset, &tok))
        }
    }

    fn expr(&mut self) -> Result<TypeExpr, TypeExprError> {
        let mut items = vec![self.term()?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            items.push(self.term()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            TypeExpr::Union(items)
        })
    }

    fn args(&mut self) -> Result<Vec<TypeExpr>, TypeExprError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            return Ok(args);
        }
        args.push(self.expr()?);
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.expr()?);
        }
        Ok(args)
    }

    fn term(&mut self) -> Result<TypeExpr, TypeExprError> {
        let (offset, tok) = self.next()?;
        match tok {
            Token::Name(name) => {
                if self.peek() == Some(&Token::LBracket) {
                    self.pos += 1;
                    let args = self.args()?;
                    self.expect(Token::RBracket)?;
                    Ok(TypeExpr::Subscript { base: name, args })
                } else {
                    Ok(TypeExpr::Name(name))
                }
            }
            Token::Str(inner) => parse_type_expr(&inner),
            Token::Ellipsis => Ok(TypeExpr::Ellipsis),
            Token::LBracket => {
                let args = self.args()?;
                self.expect(Token::RBracket)?;
                Ok(TypeExpr::List(args))
            }
            other => Err(unexpected(offset, &other)),
        }
    }
}

fn unexpected(offset: usize, tok: &Token) -> TypeExprError {
    let found = match tok {
        Token::Name(n) => n.clone(),
        Token::Str(s) => format!("{s:?}"),
        Token::LBracket => "[".to_string(),
        Token::RBracket => "]".to_string(),
        Token::Comma => ",".to_string(),
        Token::Pipe => "|".to_string(),
        Token::Ellipsis => "...".to_string(),
    };
    TypeExprError::Unexpected { found, offset }
}

/// Parse a type expression
pub fn parse_type_expr(src: &str) -> Result<TypeExpr, TypeExprError> {
    let tokens = tokenize(src.trim())?;
    if tokens.is_empty() {
        return Err(TypeExprError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((offset, tok)) => Err(unexpected(*offset, tok)),
    }
}
