//! Recursive-descent parser, one function per precedence level.

use super::ast::{BinaryOp, Call, Expr, Literal, Reduction};
use super::lexer::{tokenize, Spanned, Token};
use super::ExpressionError;

/// Deepest nesting of parentheses, negations and calls accepted.
pub const MAX_DEPTH: usize = 128;

/// Parse an expression into its AST.
pub fn parse(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(src)?;
    if matches!(tokens.first().map(|s| &s.token), Some(Token::Eof) | None) {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if !matches!(parser.current(), Token::Eof) {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].pos
    }

    fn peek(&self) -> &Token {
        let next = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[next].token
    }

    /// Move past the current token. `Eof` is never passed.
    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn unexpected(&self) -> ExpressionError {
        self.error(format!("unexpected {}", self.current().describe()))
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        if *self.current() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {}, found {}",
                expected.describe(),
                self.current().describe()
            )))
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while matches!(self.current(), Token::Pipe) {
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.current(), Token::Amp) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn comparison_op(token: &Token) -> Option<BinaryOp> {
        match token {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::Ne),
            _ => None,
        }
    }

    /// Comparisons do not chain: `a < b < c` is an error.
    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive()?;
        let Some(op) = Self::comparison_op(self.current()) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if Self::comparison_op(self.current()).is_some() {
            return Err(self.error("comparisons cannot be chained; combine them with '&'"));
        }
        Ok(Self::binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
    }

    /// Every nested level passes through here, so the depth is counted once
    /// per level.
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "expression is nested deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let expr = self.parse_signed();
        self.depth -= 1;
        expr
    }

    fn parse_signed(&mut self) -> Result<Expr, ExpressionError> {
        if matches!(self.current(), Token::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.current().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(n)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if matches!(self.peek(), Token::LParen) {
                    return self.parse_call(name);
                }
                if Reduction::from_name(&name).is_some() {
                    return Err(self.error(format!("'{name}' is a function; call it as {name}(column)")));
                }
                self.advance();
                Ok(Expr::Column(name))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// `name ( arg, ... )` with the current token at `name`.
    fn parse_call(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let func = Reduction::from_name(&name)
            .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
        self.advance();
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if !matches!(self.current(), Token::RParen) {
            args.push(self.parse_or()?);
            while matches!(self.current(), Token::Comma) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        self.expect(Token::RParen)?;

        let max_args = match func {
            Reduction::Cagr => 3,
            Reduction::Mean => 1,
        };
        if args.is_empty() || args.len() > max_args {
            return Err(ExpressionError::Arity {
                function: name,
                expected: if max_args == 1 {
                    "1".into()
                } else {
                    format!("1 to {max_args}")
                },
                actual: args.len(),
            });
        }

        let argument = |message: String| ExpressionError::Argument {
            function: name.clone(),
            message,
        };

        let mut args = args.into_iter();
        let column = match args.next() {
            Some(Expr::Column(column)) => column,
            other => {
                let found = other.map_or_else(|| "nothing".to_string(), |e| e.to_string());
                return Err(argument(format!("expected a column name, found {found}")));
            }
        };

        let years = match args.next() {
            None => None,
            Some(Expr::Literal(Literal::Number(n)))
                if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 =>
            {
                Some(n as u32)
            }
            Some(other) => {
                return Err(argument(format!(
                    "years must be a whole number of at least 1, found {other}"
                )));
            }
        };

        let strict = match args.next() {
            None => false,
            Some(Expr::Literal(Literal::Bool(b))) => b,
            Some(other) => {
                return Err(argument(format!("strict must be true or false, found {other}")));
            }
        };

        Ok(Expr::Call(Call {
            func,
            column,
            years,
            strict,
        }))
    }
}
