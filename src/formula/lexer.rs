//! Tokenizer for formula text, built on logos.

use std::fmt;

use logos::Logos;

use crate::SimError;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    #[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),
    #[token("**")]
    StarStar,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "number {value}"),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::StarStar => f.write_str("'**'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spanned<'src> {
    pub token: Token<'src>,
    pub offset: usize,
}

/// Split `source` into tokens, failing on the first character outside the
/// formula alphabet.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<'_>>, SimError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let offset = lexer.span().start;
        match result {
            Ok(token) => tokens.push(Spanned { token, offset }),
            Err(()) => {
                return Err(SimError::Syntax {
                    position: offset,
                    message: format!("unexpected character '{}'", lexer.slice()),
                })
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn splits_operators_and_literals() {
        assert_eq!(
            kinds("2.5*x ** -1e2"),
            vec![
                Token::Number(2.5),
                Token::Star,
                Token::Ident("x"),
                Token::StarStar,
                Token::Minus,
                Token::Number(100.0),
            ]
        );
    }

    #[test]
    fn accepts_leading_and_trailing_dot_literals() {
        assert_eq!(kinds(".5 + 3."), vec![Token::Number(0.5), Token::Plus, Token::Number(3.0)]);
    }

    #[test]
    fn records_offsets() {
        let tokens = tokenize("  max(a,b)").unwrap();
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[2].offset, 6);
    }

    #[test]
    fn rejects_foreign_characters() {
        for source in ["a % b", "x ^ 2", "__import__('os')", "a; b", "x == 1"] {
            assert!(
                matches!(tokenize(source), Err(SimError::Syntax { .. })),
                "{source:?} tokenized"
            );
        }
    }

    #[test]
    fn error_points_at_offending_character() {
        let err = tokenize("1 + $").unwrap_err();
        assert!(matches!(err, SimError::Syntax { position: 4, .. }));
    }
}
