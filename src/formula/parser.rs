//! Recursive descent parser emitting postfix code
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr   := term (("+" | "-") term)*
//! term   := unary (("*" | "/") unary)*
//! unary  := ("-" | "+") unary | power
//! power  := atom ("**" unary)?
//! atom   := NUMBER | IDENT | IDENT "(" expr ("," expr)* ")" | "(" expr ")"
//! ```
//!
//! `**` is right-associative and binds tighter than a sign on its left, so
//! `-2 ** 2` is `-4` while `2 ** -1` is `0.5`.

use super::lexer::{tokenize, Spanned, Token};
use super::program::{BinaryOp, Function, Op};
use crate::SimError;

/// Nesting limit for parentheses, signs and exponents.
const MAX_DEPTH: usize = 256;

/// Output of a successful parse.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parsed {
    pub program: Vec<Op>,
    pub identifiers: Vec<String>,
    pub max_stack: usize,
}

pub(crate) fn parse(source: &str) -> Result<Parsed, SimError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(SimError::Syntax {
            position: 0,
            message: "formula is empty".to_string(),
        });
    }

    let mut parser = Parser {
        stream: TokenStream::new(&tokens, source.len()),
        program: Vec::new(),
        identifiers: Vec::new(),
        depth: 0,
        height: 0,
        max_stack: 0,
    };
    parser.expr()?;

    if let Some(spanned) = parser.stream.peek() {
        return Err(SimError::Syntax {
            position: spanned.offset,
            message: format!("unexpected {} after end of expression", spanned.token),
        });
    }

    Ok(Parsed {
        program: parser.program,
        identifiers: parser.identifiers,
        max_stack: parser.max_stack,
    })
}

/// Token cursor with one token of lookahead.
struct TokenStream<'a, 'src> {
    tokens: &'a [Spanned<'src>],
    pos: usize,
    end_offset: usize,
}

impl<'a, 'src> TokenStream<'a, 'src> {
    fn new(tokens: &'a [Spanned<'src>], end_offset: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end_offset,
        }
    }

    fn peek(&self) -> Option<&'a Spanned<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<Token<'src>> {
        self.peek().map(|spanned| spanned.token)
    }

    fn advance(&mut self) -> Option<&'a Spanned<'src>> {
        let spanned = self.tokens.get(self.pos);
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Offset of the current token, or the end of input.
    fn offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |spanned| spanned.offset)
    }

    fn expect(&mut self, expected: Token<'static>, context: &str) -> Result<(), SimError> {
        match self.peek() {
            Some(spanned) if spanned.token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(spanned) => Err(SimError::Syntax {
                position: spanned.offset,
                message: format!("expected {expected} {context}, found {}", spanned.token),
            }),
            None => Err(SimError::Syntax {
                position: self.end_offset,
                message: format!("expected {expected} {context}, found end of input"),
            }),
        }
    }
}

struct Parser<'a, 'src> {
    stream: TokenStream<'a, 'src>,
    program: Vec<Op>,
    identifiers: Vec<String>,
    depth: usize,
    height: isize,
    max_stack: usize,
}

impl Parser<'_, '_> {
    fn emit(&mut self, op: Op) {
        self.height += op.stack_effect();
        self.max_stack = self.max_stack.max(self.height.max(0) as usize);
        self.program.push(op);
    }

    fn slot(&mut self, name: &str) -> usize {
        match self.identifiers.iter().position(|known| known == name) {
            Some(slot) => slot,
            None => {
                self.identifiers.push(name.to_string());
                self.identifiers.len() - 1
            }
        }
    }

    fn expr(&mut self) -> Result<(), SimError> {
        self.term()?;
        loop {
            let op = match self.stream.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(()),
            };
            self.stream.advance();
            self.term()?;
            self.emit(Op::Binary(op));
        }
    }

    fn term(&mut self) -> Result<(), SimError> {
        self.unary()?;
        loop {
            let op = match self.stream.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(()),
            };
            self.stream.advance();
            self.unary()?;
            self.emit(Op::Binary(op));
        }
    }

    fn unary(&mut self) -> Result<(), SimError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SimError::Syntax {
                position: self.stream.offset(),
                message: format!("expression nested deeper than {MAX_DEPTH} levels"),
            });
        }

        let result = match self.stream.peek_token() {
            Some(Token::Minus) => {
                self.stream.advance();
                self.unary().map(|()| self.emit(Op::Neg))
            }
            Some(Token::Plus) => {
                self.stream.advance();
                self.unary()
            }
            _ => self.power(),
        };

        self.depth -= 1;
        result
    }

    fn power(&mut self) -> Result<(), SimError> {
        self.atom()?;
        if self.stream.peek_token() == Some(Token::StarStar) {
            self.stream.advance();
            self.unary()?;
            self.emit(Op::Binary(BinaryOp::Pow));
        }
        Ok(())
    }

    fn atom(&mut self) -> Result<(), SimError> {
        let offset = self.stream.offset();
        let Some(spanned) = self.stream.advance() else {
            return Err(SimError::Syntax {
                position: offset,
                message: "unexpected end of input".to_string(),
            });
        };

        match spanned.token {
            Token::Number(value) if value.is_finite() => {
                self.emit(Op::Const(value));
                Ok(())
            }
            Token::Number(_) => Err(SimError::Syntax {
                position: offset,
                message: "numeric literal is out of range".to_string(),
            }),
            Token::Ident(name) if self.stream.peek_token() == Some(Token::LParen) => {
                self.call(name, offset)
            }
            Token::Ident(name) if Function::from_name(name).is_some() => Err(SimError::Syntax {
                position: offset,
                message: format!("function '{name}' must be called with arguments"),
            }),
            Token::Ident(name) => {
                let slot = self.slot(name);
                self.emit(Op::Load(slot));
                Ok(())
            }
            Token::LParen => {
                self.expr()?;
                self.stream.expect(Token::RParen, "to close '('")
            }
            other => Err(SimError::Syntax {
                position: offset,
                message: format!("unexpected {other}"),
            }),
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<(), SimError> {
        let Some(function) = Function::from_name(name) else {
            return Err(SimError::UnknownFunction {
                name: name.to_string(),
                position: offset,
            });
        };

        self.stream.expect(Token::LParen, "after function name")?;
        let mut argc = 0;
        if self.stream.peek_token() != Some(Token::RParen) {
            loop {
                self.expr()?;
                argc += 1;
                if self.stream.peek_token() == Some(Token::Comma) {
                    self.stream.advance();
                } else {
                    break;
                }
            }
        }
        self.stream.expect(Token::RParen, "to close the argument list")?;

        if !function.arity().accepts(argc) {
            return Err(SimError::Syntax {
                position: offset,
                message: format!("{function} takes {}, got {argc}", function.arity()),
            });
        }

        self.emit(Op::Call { function, argc });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(source: &str) -> Vec<Op> {
        parse(source).unwrap().program
    }

    fn syntax_offset(source: &str) -> usize {
        match parse(source) {
            Err(SimError::Syntax { position, .. }) => position,
            other => panic!("{source:?}: expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            program("2 + 3 * 4"),
            vec![
                Op::Const(2.0),
                Op::Const(3.0),
                Op::Const(4.0),
                Op::Binary(BinaryOp::Mul),
                Op::Binary(BinaryOp::Add),
            ]
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        assert_eq!(
            program("a - b - c"),
            vec![
                Op::Load(0),
                Op::Load(1),
                Op::Binary(BinaryOp::Sub),
                Op::Load(2),
                Op::Binary(BinaryOp::Sub),
            ]
        );
    }

    #[test]
    fn power_is_right_associative_and_outranks_sign() {
        assert_eq!(
            program("-2 ** 3 ** 2"),
            vec![
                Op::Const(2.0),
                Op::Const(3.0),
                Op::Const(2.0),
                Op::Binary(BinaryOp::Pow),
                Op::Binary(BinaryOp::Pow),
                Op::Neg,
            ]
        );
    }

    #[test]
    fn identifiers_recorded_once_in_first_appearance_order() {
        let parsed = parse("y * x + y / sqrt(x)").unwrap();
        assert_eq!(parsed.identifiers, vec!["y".to_string(), "x".to_string()]);
    }

    #[test]
    fn max_stack_tracks_deepest_point() {
        assert_eq!(parse("1 + 2").unwrap().max_stack, 2);
        assert_eq!(parse("1 + (2 + (3 + 4))").unwrap().max_stack, 4);
        assert_eq!(parse("max(1, 2, 3)").unwrap().max_stack, 3);
    }

    #[test]
    fn unknown_call_target_is_reported_with_name() {
        match parse("1 + system(2)") {
            Err(SimError::UnknownFunction { name, position }) => {
                assert_eq!(name, "system");
                assert_eq!(position, 4);
            }
            other => panic!("expected unknown function, got {other:?}"),
        }
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        assert_eq!(syntax_offset(""), 0);
        assert_eq!(syntax_offset("   "), 0);
        assert_eq!(syntax_offset("1 +"), 3);
        assert_eq!(syntax_offset("(1 + 2"), 6);
        assert_eq!(syntax_offset("1 + 2)"), 5);
        assert_eq!(syntax_offset("2 x"), 2);
        assert_eq!(syntax_offset("* 3"), 0);
        assert_eq!(syntax_offset("sqrt + 1"), 0);
        assert_eq!(syntax_offset("max(1)"), 0);
        assert_eq!(syntax_offset("sqrt(1, 2)"), 0);
        assert_eq!(syntax_offset("pow(1,)"), 6);
        assert_eq!(syntax_offset("1e999"), 0);
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&deep), Err(SimError::Syntax { .. })));
        let signs = format!("{}1", "-".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse(&signs), Err(SimError::Syntax { .. })));
    }

    #[test]
    fn long_flat_chains_are_fine() {
        let chain = vec!["1"; 5_000].join(" + ");
        let parsed = parse(&chain).unwrap();
        assert_eq!(parsed.program.len(), 9_999);
        assert_eq!(parsed.max_stack, 2);
    }
}
