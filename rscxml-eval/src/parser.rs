//! Recursive descent parser for the built-in expression language.
//!
//! The grammar, lowest precedence first:
//!
//! ```text
//! script     := stmt (separator stmt)*          separators: ';' and newlines
//! stmt       := if | assignment | expression
//! if         := 'if' '(' expression ')' block ('else' (if | block))?
//! block      := '{' script '}' | stmt
//! assignment := path '=' expression             (not '==')
//! expression := or
//! or         := and ('||' and)*
//! and        := equality ('&&' equality)*
//! equality   := relational (('==' | '!=') relational)*
//! relational := additive (('<=' | '>=' | '<' | '>') additive)*
//! additive   := multiplicative (('+' | '-') multiplicative)*
//! multiplicative := unary (('*' | '/' | '%') unary)*
//! unary      := ('!' | '-') unary | primary
//! primary    := number | string | 'true' | 'false' | 'null'
//!             | '(' expression ')' | path
//! path       := ident ('.' ident)*
//! ```
//!
//! Parse failures return the reason only; the evaluator attaches the
//! original expression text.

use serde_json::Value;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Top-level variable reference.
    Var(String),
    /// Property access on a structured value.
    Member(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A parsed script statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `path = expr`; the first path segment is the variable, the rest
    /// are nested properties.
    Assign { path: Vec<String>, expr: Expr },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
}

/// Parses a single side-effect-free expression; trailing input is an
/// error.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    let mut p = Parser::new(input);
    p.skip_whitespace();
    if p.at_end() {
        return Err("empty expression".to_string());
    }
    let expr = p.parse_expr()?;
    p.skip_whitespace();
    if !p.at_end() {
        return Err(format!("unexpected trailing input at offset {}", p.pos));
    }
    Ok(expr)
}

/// Parses a script: a sequence of statements.
pub fn parse_script(input: &str) -> Result<Vec<Stmt>, String> {
    let mut p = Parser::new(input);
    let stmts = p.parse_stmts()?;
    p.skip_whitespace();
    if !p.at_end() {
        return Err(format!("unexpected trailing input at offset {}", p.pos));
    }
    Ok(stmts)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    // ---- statements ----

    fn parse_stmts(&mut self) -> Result<Vec<Stmt>, String> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.at_end() || self.peek_char() == Some('}') {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        self.skip_whitespace();
        if self.peek_keyword("if") {
            return self.parse_if();
        }

        // Try an assignment: path '=' (but not '=='). Rewind on miss.
        let start = self.pos;
        if let Some(path) = self.try_parse_path() {
            self.skip_whitespace();
            if self.peek_char() == Some('=') && !self.peek_str("==") {
                self.pos += 1;
                self.skip_whitespace();
                let expr = self.parse_expr()?;
                return Ok(Stmt::Assign { path, expr });
            }
        }
        self.pos = start;

        Ok(Stmt::Expr(self.parse_expr()?))
    }

    fn parse_if(&mut self) -> Result<Stmt, String> {
        self.expect_keyword("if")?;
        self.skip_whitespace();
        self.expect_char('(')?;
        let cond = self.parse_expr()?;
        self.skip_whitespace();
        self.expect_char(')')?;
        let then = self.parse_block()?;
        self.skip_whitespace();
        let otherwise = if self.peek_keyword("else") {
            self.expect_keyword("else")?;
            self.skip_whitespace();
            if self.peek_keyword("if") {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.skip_whitespace();
        if self.peek_char() == Some('{') {
            self.pos += 1;
            let stmts = self.parse_stmts()?;
            self.skip_whitespace();
            self.expect_char('}')?;
            Ok(stmts)
        } else {
            Ok(vec![self.parse_stmt()?])
        }
    }

    fn try_parse_path(&mut self) -> Option<Vec<String>> {
        self.skip_whitespace();
        let first = self.parse_ident()?;
        if is_keyword(&first) {
            return None;
        }
        let mut path = vec![first];
        loop {
            let mark = self.pos;
            self.skip_whitespace();
            if self.peek_char() != Some('.') {
                self.pos = mark;
                break;
            }
            self.pos += 1;
            self.skip_whitespace();
            match self.parse_ident() {
                Some(seg) => path.push(seg),
                None => {
                    self.pos = mark;
                    break;
                }
            }
        }
        Some(path)
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        self.skip_whitespace();
        while self.peek_str("||") {
            self.pos += 2;
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;
        self.skip_whitespace();
        while self.peek_str("&&") {
            self.pos += 2;
            let right = self.parse_equality()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_relational()?;
        self.skip_whitespace();
        loop {
            let op = if self.peek_str("==") {
                BinOp::Eq
            } else if self.peek_str("!=") {
                BinOp::Ne
            } else {
                break;
            };
            self.pos += 2;
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_additive()?;
        self.skip_whitespace();
        loop {
            let (op, len) = if self.peek_str("<=") {
                (BinOp::Le, 2)
            } else if self.peek_str(">=") {
                (BinOp::Ge, 2)
            } else if self.peek_char() == Some('<') {
                (BinOp::Lt, 1)
            } else if self.peek_char() == Some('>') {
                (BinOp::Gt, 1)
            } else {
                break;
            };
            self.pos += len;
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        self.skip_whitespace();
        loop {
            let op = match self.peek_char() {
                Some('+') => BinOp::Add,
                Some('-') => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        self.skip_whitespace();
        loop {
            let op = match self.peek_char() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                Some('%') => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
            self.skip_whitespace();
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        self.skip_whitespace();
        if self.peek_char() == Some('!') && !self.peek_str("!=") {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.peek_char() == Some('-') {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        self.skip_whitespace();
        match self.peek_char() {
            None => Err("unexpected end of expression".to_string()),
            Some('(') => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.skip_whitespace();
                self.expect_char(')')?;
                Ok(expr)
            }
            Some('\'') | Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_path_expr(),
            Some(c) => Err(format!("unexpected character '{}'", c)),
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr, String> {
        let first = self
            .parse_ident()
            .ok_or_else(|| "expected identifier".to_string())?;
        let mut expr = match first.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => Expr::Var(first),
        };
        loop {
            let mark = self.pos;
            self.skip_whitespace();
            if self.peek_char() != Some('.') {
                self.pos = mark;
                break;
            }
            self.pos += 1;
            self.skip_whitespace();
            match self.parse_ident() {
                Some(seg) => expr = Expr::Member(Box::new(expr), seg),
                None => return Err("expected property name after '.'".to_string()),
            }
        }
        Ok(expr)
    }

    fn parse_ident(&mut self) -> Option<String> {
        let start = self.pos;
        match self.peek_char() {
            Some(c) if c.is_alphabetic() || c == '_' => self.pos += c.len_utf8(),
            _ => return None,
        }
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        Some(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<Expr, String> {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.')
            && self
                .input[self.pos + 1..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            self.pos += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        let text = &self.input[start..self.pos];
        let n: f64 = text
            .parse()
            .map_err(|_| format!("invalid number: '{}'", text))?;
        let value = if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Value::Number((n as i64).into())
        } else {
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| format!("unrepresentable number: '{}'", text))?
        };
        Ok(Expr::Literal(value))
    }

    fn parse_string(&mut self) -> Result<Expr, String> {
        let quote = self.peek_char().expect("caller checked quote");
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            if c == quote {
                return Ok(Expr::Literal(Value::String(out)));
            }
            if c == '\\' {
                let escaped = self
                    .peek_char()
                    .ok_or_else(|| "unterminated string".to_string())?;
                self.pos += escaped.len_utf8();
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                }
            } else {
                out.push(c);
            }
        }
        Err("unterminated string".to_string())
    }

    // ---- low-level helpers ----

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn skip_separators(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || c == ';' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// True if the next token is the given keyword (not a longer
    /// identifier starting with it).
    fn peek_keyword(&self, kw: &str) -> bool {
        self.peek_str(kw)
            && !self.input[self.pos + kw.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), String> {
        if self.peek_keyword(kw) {
            self.pos += kw.len();
            Ok(())
        } else {
            Err(format!("expected '{}'", kw))
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), String> {
        if self.peek_char() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(format!("expected '{}'", c))
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

fn is_keyword(s: &str) -> bool {
    matches!(s, "if" | "else" | "true" | "false" | "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arithmetic_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let e = parse_expression("1 + 2 * 3").unwrap();
        match e {
            Expr::Binary(BinOp::Add, _, right) => {
                assert!(matches!(*right, Expr::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_member_chain() {
        let e = parse_expression("forest.tree.branch.twig").unwrap();
        match e {
            Expr::Member(inner, prop) => {
                assert_eq!(prop, "twig");
                assert!(matches!(*inner, Expr::Member(_, _)));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_expression("42").unwrap(), Expr::Literal(json!(42)));
        assert_eq!(parse_expression("1.5").unwrap(), Expr::Literal(json!(1.5)));
        assert_eq!(
            parse_expression("'hi'").unwrap(),
            Expr::Literal(json!("hi"))
        );
        assert_eq!(
            parse_expression("\"hi\"").unwrap(),
            Expr::Literal(json!("hi"))
        );
        assert_eq!(
            parse_expression("true").unwrap(),
            Expr::Literal(json!(true))
        );
        assert_eq!(parse_expression("null").unwrap(), Expr::Literal(json!(null)));
    }

    #[test]
    fn test_parse_bad_expressions() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression(">").is_err());
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1 + 2").is_err());
        assert!(parse_expression("'unterminated").is_err());
        assert!(parse_expression("1 2").is_err());
        assert!(parse_expression("a.").is_err());
    }

    #[test]
    fn test_parse_script_statements() {
        let stmts = parse_script("x = 3; y = x * 2\nz = 'done'").unwrap();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Stmt::Assign { path, .. } if path == &vec!["x".to_string()]));
    }

    #[test]
    fn test_parse_if_else() {
        let stmts = parse_script("if (x > 1) { y = 1 } else { y = 2 }").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::If {
                then, otherwise, ..
            } => {
                assert_eq!(then.len(), 1);
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_else_if_chain() {
        let stmts = parse_script("if (a) { x = 1 } else if (b) { x = 2 } else { x = 3 }").unwrap();
        match &stmts[0] {
            Stmt::If { otherwise, .. } => {
                assert!(matches!(&otherwise[0], Stmt::If { .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_nested_assignment_path() {
        let stmts = parse_script("order.total = 10").unwrap();
        match &stmts[0] {
            Stmt::Assign { path, .. } => {
                assert_eq!(path, &vec!["order".to_string(), "total".to_string()]);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_equality_not_assignment() {
        let stmts = parse_script("x == 3").unwrap();
        assert!(matches!(
            &stmts[0],
            Stmt::Expr(Expr::Binary(BinOp::Eq, _, _))
        ));
    }
}
