use crate::analysis::ast::{
    AggFunction, Aggregate, BinaryOp, Expr, Pipeline, Script, Stage, Statement, UnaryOp,
};
use crate::analysis::lexer::{tokenize, Token, TokenKind};
use crate::analysis::AnalysisError;

const STAGES: &str = "where, select, derive, join, summarize, sort, limit, count";
const MAX_NESTING: usize = 64;

pub fn parse(source: &str) -> Result<Script, AnalysisError> {
    let tokens = tokenize(source)?;
    Parser { tokens, position: 0, depth: 0 }.script()
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    // Expression tree depth so far. Parentheses, prefix operators and each
    // link of an operator chain count against MAX_NESTING.
    depth: usize,
}

impl Parser {
    fn script(mut self) -> Result<Script, AnalysisError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at(&TokenKind::Eof) {
                break;
            }
            statements.push(self.statement()?);
            if !self.at(&TokenKind::Eof) && !self.at_separator() {
                return Err(self.unexpected("end of statement"));
            }
        }

        if statements.is_empty() {
            return Err(AnalysisError::Syntax { line: 1, message: "script is empty".to_string() });
        }
        Ok(Script { statements })
    }

    fn statement(&mut self) -> Result<Statement, AnalysisError> {
        if self.at_keyword("let") {
            self.advance();
            let name = self.ident("binding name")?;
            self.expect(&TokenKind::Assign, "`=`")?;
            let pipeline = self.pipeline()?;
            return Ok(Statement::Let { name, pipeline });
        }
        if self.at_keyword("print") {
            self.advance();
        }
        Ok(Statement::Emit { pipeline: self.pipeline()? })
    }

    fn pipeline(&mut self) -> Result<Pipeline, AnalysisError> {
        let line = self.line();
        let source = self.ident("table name")?;
        let mut stages = Vec::new();
        while self.pipe_follows() {
            self.skip_newlines();
            self.expect(&TokenKind::Pipe, "`|`")?;
            stages.push(self.stage()?);
        }
        Ok(Pipeline { source, stages, line })
    }

    fn stage(&mut self) -> Result<Stage, AnalysisError> {
        let line = self.line();
        let keyword = self.ident("stage name")?.to_ascii_lowercase();
        match keyword.as_str() {
            "where" | "filter" => Ok(Stage::Where(self.expr()?)),
            "select" => Ok(Stage::Select(self.ident_list("column name")?)),
            "derive" => {
                let mut columns = Vec::new();
                loop {
                    let name = self.ident("column name")?;
                    self.expect(&TokenKind::Assign, "`=`")?;
                    columns.push((name, self.expr()?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                Ok(Stage::Derive(columns))
            }
            "join" => {
                let source = self.ident("table name")?;
                self.keyword("on")?;
                let key = self.ident("key column")?;
                Ok(Stage::Join { source, key })
            }
            "summarize" | "aggregate" => {
                let mut aggregates = vec![self.aggregate()?];
                while self.eat(&TokenKind::Comma) {
                    aggregates.push(self.aggregate()?);
                }
                let by = if self.at_keyword("by") {
                    self.advance();
                    self.ident_list("group column")?
                } else {
                    Vec::new()
                };
                Ok(Stage::Summarize { aggregates, by })
            }
            "sort" => {
                if self.at_keyword("by") {
                    self.advance();
                }
                let column = self.ident("sort column")?;
                let descending = if self.at_keyword("desc") {
                    self.advance();
                    true
                } else {
                    if self.at_keyword("asc") {
                        self.advance();
                    }
                    false
                };
                Ok(Stage::Sort { column, descending })
            }
            "limit" | "head" => match self.advance().kind {
                TokenKind::Number(value) if value >= 0.0 && value.fract() == 0.0 => {
                    Ok(Stage::Limit(value as usize))
                }
                _ => Err(AnalysisError::Syntax {
                    line,
                    message: "limit expects a non-negative whole number".to_string(),
                }),
            },
            "count" => {
                if self.eat(&TokenKind::LParen) {
                    self.expect(&TokenKind::RParen, "`)`")?;
                }
                Ok(Stage::Count)
            }
            other => Err(AnalysisError::Syntax {
                line,
                message: format!("unknown stage `{other}` (expected one of: {STAGES})"),
            }),
        }
    }

    fn aggregate(&mut self) -> Result<Aggregate, AnalysisError> {
        let line = self.line();
        let name = self.ident("aggregate function")?;
        let function = AggFunction::from_name(&name).ok_or_else(|| AnalysisError::Syntax {
            line,
            message: format!(
                "unknown aggregate `{name}` (expected count, sum, mean, min, max, median, std, corr)"
            ),
        })?;

        self.expect(&TokenKind::LParen, "`(`")?;
        let args = if self.at(&TokenKind::RParen) {
            Vec::new()
        } else {
            self.ident_list("column name")?
        };
        self.expect(&TokenKind::RParen, "`)`")?;

        if !function.arity().contains(&args.len()) {
            return Err(AnalysisError::AggregateArity {
                function: function.name().to_string(),
                actual: args.len(),
            });
        }

        let alias = if self.at_keyword("as") {
            self.advance();
            Some(self.ident("alias")?)
        } else {
            None
        };
        Ok(Aggregate { function, args, alias })
    }

    fn expr(&mut self) -> Result<Expr, AnalysisError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, AnalysisError> {
        let mark = self.depth;
        let mut left = self.and_expr()?;
        while self.at_keyword("or") || self.at(&TokenKind::OrOr) {
            self.advance();
            self.enter()?;
            let right = self.and_expr()?;
            left = binary(BinaryOp::Or, left, right);
        }
        self.depth = mark;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, AnalysisError> {
        let mark = self.depth;
        let mut left = self.not_expr()?;
        while self.at_keyword("and") || self.at(&TokenKind::AndAnd) {
            self.advance();
            self.enter()?;
            let right = self.not_expr()?;
            left = binary(BinaryOp::And, left, right);
        }
        self.depth = mark;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, AnalysisError> {
        if self.at_keyword("not") || self.at(&TokenKind::Bang) {
            self.advance();
            self.enter()?;
            let expr = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, AnalysisError> {
        let left = self.additive()?;
        let op = match self.peek().kind {
            TokenKind::Eq | TokenKind::Assign => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(binary(op, left, right))
    }

    fn additive(&mut self) -> Result<Expr, AnalysisError> {
        let mark = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.multiplicative()?;
            left = binary(op, left, right);
        }
        self.depth = mark;
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, AnalysisError> {
        let mark = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.unary()?;
            left = binary(op, left, right);
        }
        self.depth = mark;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, AnalysisError> {
        if self.eat(&TokenKind::Minus) {
            self.enter()?;
            let expr = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, AnalysisError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("true") => Ok(Expr::Number(1.0)),
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("false") => Ok(Expr::Number(0.0)),
            TokenKind::Ident(name) => Ok(Expr::Column(name)),
            TokenKind::LParen => {
                self.enter()?;
                let expr = self.expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                self.depth -= 1;
                Ok(expr)
            }
            other => Err(AnalysisError::Syntax {
                line: token.line,
                message: format!("expected a value, found {}", describe(&other)),
            }),
        }
    }

    fn enter(&mut self) -> Result<(), AnalysisError> {
        if self.depth >= MAX_NESTING {
            return Err(AnalysisError::Syntax {
                line: self.line(),
                message: format!("expression is nested more than {MAX_NESTING} levels deep"),
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn ident_list(&mut self, what: &str) -> Result<Vec<String>, AnalysisError> {
        let mut names = vec![self.ident(what)?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.ident(what)?);
        }
        Ok(names)
    }

    fn ident(&mut self, what: &str) -> Result<String, AnalysisError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), AnalysisError> {
        if self.at_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{keyword}`")))
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), AnalysisError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(name) if name.eq_ignore_ascii_case(keyword))
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::Semicolon)
    }

    /// True when the next non-newline token is `|`, so pipelines may span lines.
    fn pipe_follows(&self) -> bool {
        self.tokens[self.position..]
            .iter()
            .find(|token| token.kind != TokenKind::Newline)
            .is_some_and(|token| token.kind == TokenKind::Pipe)
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while self.at_separator() {
            self.advance();
        }
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> AnalysisError {
        let token = self.peek();
        AnalysisError::Syntax {
            line: token.line,
            message: format!("expected {expected}, found {}", describe(&token.kind)),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("`{name}`"),
        TokenKind::Number(value) => format!("number {value}"),
        TokenKind::Newline => "end of line".to_string(),
        TokenKind::Eof => "end of script".to_string(),
        other => format!("{other:?}"),
    }
}
