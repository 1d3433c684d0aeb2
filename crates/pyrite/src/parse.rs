//! Recursive-descent parser producing the typed AST.
//!
//! Malformed input yields a `ParseError` with a human-readable expectation and
//! the offending line; token kinds never leak into messages (only
//! source-language spellings via [`Tok::describe`]).

use std::{fmt, sync::Arc};

use ahash::AHashSet;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    expressions::{
        AssignTarget, BinOp, BoolOpKind, CallArg, ClassDef, CmpOp, CompClause, Conversion, DictItem, ExceptClause,
        Expr, ExprLoc, FStringPart, FuncDef, Literal, MatchCase, Param, Params, Pattern, Stmt, StmtLoc, UnaryOp,
        UnpackItem, collect_assigned, contains_yield,
    },
    lex::{FsTok, Kw, LexError, Op, Tok, Token, lex},
};

/// Maximum nesting depth for expressions during parsing.
/// Prevents stack overflow from inputs like `((((((x))))))`.
pub(crate) const MAX_NESTING_DEPTH: u16 = 200;

/// A syntax error with the offending line.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    /// True when the failure is indentation-structural (`IndentationError`).
    pub indentation: bool,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            message: err.message,
            line: err.line,
            indentation: err.indentation,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parses a complete module source into a statement list.
pub(crate) fn parse(source: &str) -> ParseResult<Vec<StmtLoc>> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.parse_module()
}

/// Parses a single expression (used for f-string interpolations).
fn parse_expression_source(source: &str, line: u32) -> ParseResult<ExprLoc> {
    let tokens = lex(source).map_err(|mut e| {
        e.line = line;
        e
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_testlist()?;
    if !matches!(parser.current(), Tok::Newline | Tok::Eof) {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(ExprLoc { expr: expr.expr, line })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: u16,
}

impl Parser {
    fn current(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::Eof, |t| &t.tok)
    }

    fn peek(&self, offset: usize) -> &Tok {
        self.tokens.get(self.pos + offset).map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.current().clone();
        self.pos += 1;
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: self.line(),
            indentation: false,
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!("expected {expected}, found {}", self.current().describe()))
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.current() == &Tok::Op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op) -> ParseResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", op.text())))
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.current() == &Tok::Keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> ParseResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kw.text())))
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        match self.current() {
            Tok::Newline => {
                self.pos += 1;
                Ok(())
            }
            Tok::Eof | Tok::Dedent => Ok(()),
            _ => Err(self.unexpected("end of line")),
        }
    }

    fn expect_name(&mut self, what: &str) -> ParseResult<Arc<str>> {
        match self.current() {
            Tok::Name(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn enter(&mut self) -> ParseResult<DepthGuard<'_>> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error("expression is too deeply nested"));
        }
        Ok(DepthGuard { parser: self })
    }

    // ---- module & blocks -------------------------------------------------

    fn parse_module(&mut self) -> ParseResult<Vec<StmtLoc>> {
        let mut stmts = Vec::new();
        while !matches!(self.current(), Tok::Eof) {
            if matches!(self.current(), Tok::Newline) {
                self.pos += 1;
                continue;
            }
            self.parse_statement(&mut stmts)?;
        }
        Ok(stmts)
    }

    /// Parses a `:`-introduced suite: either an indented block or simple
    /// statements on the same line.
    fn parse_block(&mut self) -> ParseResult<Arc<[StmtLoc]>> {
        self.expect_op(Op::Colon)?;
        let mut stmts = Vec::new();
        if matches!(self.current(), Tok::Newline) {
            self.pos += 1;
            if !matches!(self.current(), Tok::Indent) {
                return Err(ParseError {
                    message: "expected an indented block".to_owned(),
                    line: self.line(),
                    indentation: true,
                });
            }
            self.pos += 1;
            while !matches!(self.current(), Tok::Dedent | Tok::Eof) {
                if matches!(self.current(), Tok::Newline) {
                    self.pos += 1;
                    continue;
                }
                self.parse_statement(&mut stmts)?;
            }
            if matches!(self.current(), Tok::Dedent) {
                self.pos += 1;
            }
        } else {
            // inline suite: `if x: y = 1; z = 2`
            self.parse_simple_statement_line(&mut stmts)?;
        }
        if stmts.is_empty() {
            return Err(ParseError {
                message: "expected an indented block".to_owned(),
                line: self.line(),
                indentation: true,
            });
        }
        Ok(stmts.into())
    }

    fn parse_statement(&mut self, out: &mut Vec<StmtLoc>) -> ParseResult<()> {
        let line = self.line();
        match self.current().clone() {
            Tok::Keyword(Kw::If) => {
                let stmt = self.parse_if()?;
                out.push(StmtLoc { stmt, line });
            }
            Tok::Keyword(Kw::While) => {
                self.pos += 1;
                let condition = self.parse_namedexpr()?;
                let body = self.parse_block()?;
                let orelse = self.parse_optional_else()?;
                out.push(StmtLoc {
                    stmt: Stmt::While {
                        condition,
                        body,
                        orelse,
                    },
                    line,
                });
            }
            Tok::Keyword(Kw::For) => {
                let stmt = self.parse_for()?;
                out.push(StmtLoc { stmt, line });
            }
            Tok::Keyword(Kw::Def) => {
                let def = self.parse_def(Vec::new())?;
                out.push(StmtLoc {
                    stmt: Stmt::Def(def),
                    line,
                });
            }
            Tok::Keyword(Kw::Class) => {
                let def = self.parse_class(Vec::new())?;
                out.push(StmtLoc {
                    stmt: Stmt::Class(def),
                    line,
                });
            }
            Tok::Op(Op::At) => {
                let stmt = self.parse_decorated()?;
                out.push(StmtLoc { stmt, line });
            }
            Tok::Keyword(Kw::Try) => {
                let stmt = self.parse_try()?;
                out.push(StmtLoc { stmt, line });
            }
            Tok::Keyword(Kw::With) => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    let cm = self.parse_expr()?;
                    let target = if self.eat_kw(Kw::As) {
                        let target_expr = self.parse_expr()?;
                        Some(self.expr_to_target(target_expr)?)
                    } else {
                        None
                    };
                    items.push((cm, target));
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                let body = self.parse_block()?;
                out.push(StmtLoc {
                    stmt: Stmt::With { items, body },
                    line,
                });
            }
            Tok::Keyword(Kw::Async) => {
                return Err(self.error("async/await is not supported; define a regular function instead"));
            }
            Tok::Name(name) if &*name == "match" && self.match_statement_ahead() => {
                match self.try_parse_match(line) {
                    Ok(stmt) => out.push(StmtLoc { stmt, line }),
                    Err(err) => return Err(err),
                }
            }
            _ => {
                self.parse_simple_statement_line(out)?;
            }
        }
        Ok(())
    }

    /// Parses one line of `;`-separated simple statements.
    fn parse_simple_statement_line(&mut self, out: &mut Vec<StmtLoc>) -> ParseResult<()> {
        loop {
            let stmt = self.parse_simple_statement()?;
            out.push(stmt);
            if self.eat_op(Op::Semi) {
                if matches!(self.current(), Tok::Newline | Tok::Eof | Tok::Dedent) {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect_newline()
    }

    fn parse_simple_statement(&mut self) -> ParseResult<StmtLoc> {
        let line = self.line();
        let stmt = match self.current().clone() {
            Tok::Keyword(Kw::Return) => {
                self.pos += 1;
                let value = if matches!(self.current(), Tok::Newline | Tok::Eof | Tok::Dedent | Tok::Op(Op::Semi)) {
                    None
                } else {
                    Some(self.parse_testlist()?)
                };
                Stmt::Return(value)
            }
            Tok::Keyword(Kw::Break) => {
                self.pos += 1;
                Stmt::Break
            }
            Tok::Keyword(Kw::Continue) => {
                self.pos += 1;
                Stmt::Continue
            }
            Tok::Keyword(Kw::Pass) => {
                self.pos += 1;
                Stmt::Pass
            }
            Tok::Keyword(Kw::Import) => self.parse_import()?,
            Tok::Keyword(Kw::From) => self.parse_from_import()?,
            Tok::Keyword(Kw::Raise) => {
                self.pos += 1;
                let exc = if matches!(self.current(), Tok::Newline | Tok::Eof | Tok::Dedent | Tok::Op(Op::Semi)) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let cause = if self.eat_kw(Kw::From) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Stmt::Raise { exc, cause }
            }
            Tok::Keyword(Kw::Assert) => {
                self.pos += 1;
                let condition = self.parse_expr()?;
                let message = if self.eat_op(Op::Comma) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Stmt::Assert { condition, message }
            }
            Tok::Keyword(Kw::Del) => {
                self.pos += 1;
                let mut targets = Vec::new();
                loop {
                    let expr = self.parse_expr()?;
                    targets.push(self.expr_to_target(expr)?);
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                Stmt::Del(targets)
            }
            Tok::Keyword(Kw::Global) => {
                self.pos += 1;
                let mut names = vec![self.expect_name("a name after 'global'")?];
                while self.eat_op(Op::Comma) {
                    names.push(self.expect_name("a name after ','")?);
                }
                Stmt::Global(names)
            }
            Tok::Keyword(Kw::Nonlocal) => {
                self.pos += 1;
                let mut names = vec![self.expect_name("a name after 'nonlocal'")?];
                while self.eat_op(Op::Comma) {
                    names.push(self.expect_name("a name after ','")?);
                }
                Stmt::Nonlocal(names)
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(StmtLoc { stmt, line })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let first = self.parse_testlist_star()?;

        // annotated assignment: `name: T` or `name: T = value`
        if self.current() == &Tok::Op(Op::Colon)
            && matches!(first.expr, Expr::Name(_) | Expr::Attr { .. } | Expr::Subscript { .. })
        {
            self.pos += 1;
            let annotation_expr = self.parse_expr()?;
            let annotation: Arc<str> = Arc::from(annotation_string(&annotation_expr.expr));
            let value = if self.eat_op(Op::Assign) {
                Some(self.parse_testlist_star()?)
            } else {
                None
            };
            let target = self.expr_to_target(first)?;
            return Ok(Stmt::AnnAssign {
                target,
                annotation,
                value,
            });
        }

        // augmented assignment
        if let Tok::Op(op) = self.current() {
            let aug = match op {
                Op::PlusEq => Some(BinOp::Add),
                Op::MinusEq => Some(BinOp::Sub),
                Op::StarEq => Some(BinOp::Mul),
                Op::SlashEq => Some(BinOp::Div),
                Op::DoubleSlashEq => Some(BinOp::FloorDiv),
                Op::PercentEq => Some(BinOp::Mod),
                Op::DoubleStarEq => Some(BinOp::Pow),
                Op::AmpEq => Some(BinOp::BitAnd),
                Op::PipeEq => Some(BinOp::BitOr),
                Op::CaretEq => Some(BinOp::BitXor),
                Op::ShlEq => Some(BinOp::Shl),
                Op::ShrEq => Some(BinOp::Shr),
                _ => None,
            };
            if let Some(op) = aug {
                self.pos += 1;
                let value = self.parse_testlist()?;
                let target = self.expr_to_target(first)?;
                if matches!(target, AssignTarget::Unpack(_)) {
                    return Err(self.error("augmented assignment target must be a single name, attribute or subscript"));
                }
                return Ok(Stmt::AugAssign { target, op, value });
            }
        }

        // chained plain assignment: a = b = value
        if self.current() == &Tok::Op(Op::Assign) {
            let mut target_exprs = vec![first];
            let mut value = None;
            while self.eat_op(Op::Assign) {
                let next = self.parse_testlist_star()?;
                if self.current() == &Tok::Op(Op::Assign) {
                    target_exprs.push(next);
                } else {
                    value = Some(next);
                }
            }
            let value = value.ok_or_else(|| self.unexpected("an expression after '='"))?;
            let targets = target_exprs
                .into_iter()
                .map(|e| self.expr_to_target(e))
                .collect::<ParseResult<Vec<_>>>()?;
            return Ok(Stmt::Assign { targets, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        self.expect_kw(Kw::If)?;
        let mut branches = Vec::new();
        let condition = self.parse_namedexpr()?;
        let body = self.parse_block()?;
        branches.push((condition, body));
        let mut orelse = None;
        loop {
            if self.current() == &Tok::Keyword(Kw::Elif) {
                self.pos += 1;
                let condition = self.parse_namedexpr()?;
                let body = self.parse_block()?;
                branches.push((condition, body));
                continue;
            }
            if self.current() == &Tok::Keyword(Kw::Else) {
                self.pos += 1;
                orelse = Some(self.parse_block()?);
            }
            break;
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_optional_else(&mut self) -> ParseResult<Option<Arc<[StmtLoc]>>> {
        if self.eat_kw(Kw::Else) {
            Ok(Some(self.parse_block()?))
        } else {
            Ok(None)
        }
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        self.expect_kw(Kw::For)?;
        // restricted target grammar: a full expression parse would swallow
        // the 'in' keyword as a comparison
        let target_expr = self.parse_target_list_comp()?;
        let target = self.expr_to_target(target_expr)?;
        self.expect_kw(Kw::In)?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let orelse = self.parse_optional_else()?;
        Ok(Stmt::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_decorated(&mut self) -> ParseResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op(Op::At) {
            decorators.push(self.parse_expr()?);
            self.expect_newline()?;
            while matches!(self.current(), Tok::Newline) {
                self.pos += 1;
            }
        }
        match self.current() {
            Tok::Keyword(Kw::Def) => Ok(Stmt::Def(self.parse_def(decorators)?)),
            Tok::Keyword(Kw::Class) => Ok(Stmt::Class(self.parse_class(decorators)?)),
            _ => Err(self.unexpected("'def' or 'class' after decorators")),
        }
    }

    fn parse_def(&mut self, decorators: Vec<ExprLoc>) -> ParseResult<FuncDef> {
        self.expect_kw(Kw::Def)?;
        let name = self.expect_name("a function name")?;
        self.expect_op(Op::LParen)?;
        let params = self.parse_params(true)?;
        self.expect_op(Op::RParen)?;
        if self.eat_op(Op::Arrow) {
            // return annotations are accepted and discarded
            let _ = self.parse_expr()?;
        }
        let body = self.parse_block()?;
        let mut assigned = AHashSet::new();
        collect_assigned(&body, &mut assigned);
        let is_generator = contains_yield(&body);
        Ok(FuncDef {
            name,
            params: Arc::new(params),
            body,
            assigned: Arc::new(assigned),
            is_generator,
            decorators,
        })
    }

    fn parse_params(&mut self, allow_annotations: bool) -> ParseResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        loop {
            match self.current().clone() {
                Tok::Op(Op::RParen) | Tok::Op(Op::Colon) => break,
                Tok::Op(Op::Slash) => {
                    // positional-only marker accepted and ignored
                    self.pos += 1;
                }
                Tok::Op(Op::Star) => {
                    self.pos += 1;
                    seen_star = true;
                    if let Tok::Name(name) = self.current().clone() {
                        self.pos += 1;
                        params.var_args = Some(name);
                    }
                }
                Tok::Op(Op::DoubleStar) => {
                    self.pos += 1;
                    let name = self.expect_name("a name after '**'")?;
                    params.var_kwargs = Some(name);
                }
                Tok::Name(name) => {
                    self.pos += 1;
                    let annotation = if allow_annotations && self.eat_op(Op::Colon) {
                        let ann = self.parse_expr()?;
                        Some(Arc::from(annotation_string(&ann.expr)))
                    } else {
                        None
                    };
                    let default = if self.eat_op(Op::Assign) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let param = Param {
                        name,
                        default,
                        annotation,
                    };
                    if seen_star {
                        params.kw_only.push(param);
                    } else {
                        params.args.push(param);
                    }
                }
                _ => return Err(self.unexpected("a parameter name")),
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_class(&mut self, decorators: Vec<ExprLoc>) -> ParseResult<ClassDef> {
        self.expect_kw(Kw::Class)?;
        let name = self.expect_name("a class name")?;
        let mut bases = Vec::new();
        if self.eat_op(Op::LParen) {
            while self.current() != &Tok::Op(Op::RParen) {
                bases.push(self.parse_expr()?);
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
            self.expect_op(Op::RParen)?;
        }
        let body = self.parse_block()?;
        Ok(ClassDef {
            name,
            bases,
            body,
            decorators,
        })
    }

    fn parse_try(&mut self) -> ParseResult<Stmt> {
        self.expect_kw(Kw::Try)?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.current() == &Tok::Keyword(Kw::Except) {
            self.pos += 1;
            let (exc_class, binding) = if self.current() == &Tok::Op(Op::Colon) {
                (None, None)
            } else {
                let class = self.parse_expr()?;
                let binding = if self.eat_kw(Kw::As) {
                    Some(self.expect_name("a name after 'as'")?)
                } else {
                    None
                };
                (Some(class), binding)
            };
            let handler_body = self.parse_block()?;
            handlers.push(ExceptClause {
                exc_class,
                binding,
                body: handler_body,
            });
        }
        let orelse = if self.eat_kw(Kw::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        let finally = if self.eat_kw(Kw::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handlers.is_empty() && finally.is_none() {
            return Err(self.error("expected 'except' or 'finally' after 'try' block"));
        }
        if orelse.is_some() && handlers.is_empty() {
            return Err(self.error("'else' clause requires at least one 'except' clause"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            orelse,
            finally,
        })
    }

    fn parse_import(&mut self) -> ParseResult<Stmt> {
        self.expect_kw(Kw::Import)?;
        let module = self.parse_dotted_name()?;
        let alias = if self.eat_kw(Kw::As) {
            Some(self.expect_name("a name after 'as'")?)
        } else {
            None
        };
        if self.current() == &Tok::Op(Op::Comma) {
            return Err(self.error("import one module per statement"));
        }
        Ok(Stmt::Import { module, alias })
    }

    fn parse_from_import(&mut self) -> ParseResult<Stmt> {
        self.expect_kw(Kw::From)?;
        let module = self.parse_dotted_name()?;
        self.expect_kw(Kw::Import)?;
        if self.current() == &Tok::Op(Op::Star) {
            return Err(self.error("'from ... import *' is not supported; import names explicitly"));
        }
        let parenthesized = self.eat_op(Op::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name("a name to import")?;
            let alias = if self.eat_kw(Kw::As) {
                Some(self.expect_name("a name after 'as'")?)
            } else {
                None
            };
            names.push((name, alias));
            if !self.eat_op(Op::Comma) {
                break;
            }
            if parenthesized && self.current() == &Tok::Op(Op::RParen) {
                break;
            }
        }
        if parenthesized {
            self.expect_op(Op::RParen)?;
        }
        Ok(Stmt::FromImport { module, names })
    }

    fn parse_dotted_name(&mut self) -> ParseResult<Arc<str>> {
        let mut name = self.expect_name("a module name")?.to_string();
        while self.eat_op(Op::Dot) {
            let part = self.expect_name("a name after '.'")?;
            name.push('.');
            name.push_str(&part);
        }
        Ok(Arc::from(name))
    }

    // ---- match statements ------------------------------------------------

    /// Heuristic lookahead deciding whether a leading `match` name starts a
    /// match statement (vs. an ordinary expression statement like `match = 5`).
    fn match_statement_ahead(&self) -> bool {
        match self.peek(1) {
            Tok::Op(op) => matches!(
                op,
                Op::LParen | Op::LBracket | Op::LBrace | Op::Minus | Op::Plus | Op::Tilde
            ),
            Tok::Name(_) | Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FString(_) => true,
            Tok::Keyword(kw) => matches!(kw, Kw::None | Kw::True | Kw::False | Kw::Not | Kw::Lambda),
            _ => false,
        }
    }

    fn try_parse_match(&mut self, line: u32) -> ParseResult<Stmt> {
        let saved = self.pos;
        match self.parse_match_inner() {
            Ok(stmt) => Ok(stmt),
            Err(err) => {
                // `match(x)` and friends are plain expressions; retry as such
                self.pos = saved;
                match self.parse_expression_statement() {
                    Ok(stmt) => {
                        self.expect_newline()?;
                        let _ = line;
                        Ok(stmt)
                    }
                    Err(_) => Err(err),
                }
            }
        }
    }

    fn parse_match_inner(&mut self) -> ParseResult<Stmt> {
        // consume the soft 'match' name
        self.pos += 1;
        let subject = self.parse_testlist()?;
        self.expect_op(Op::Colon)?;
        self.expect_newline()?;
        if !matches!(self.current(), Tok::Indent) {
            return Err(ParseError {
                message: "expected an indented block of 'case' clauses".to_owned(),
                line: self.line(),
                indentation: true,
            });
        }
        self.pos += 1;
        let mut cases = Vec::new();
        while !matches!(self.current(), Tok::Dedent | Tok::Eof) {
            if matches!(self.current(), Tok::Newline) {
                self.pos += 1;
                continue;
            }
            match self.current() {
                Tok::Name(n) if &**n == "case" => {
                    self.pos += 1;
                }
                _ => return Err(self.unexpected("'case'")),
            }
            let pattern = self.parse_pattern()?;
            let guard = if self.eat_kw(Kw::If) {
                Some(self.parse_namedexpr()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            cases.push(MatchCase { pattern, guard, body });
        }
        if matches!(self.current(), Tok::Dedent) {
            self.pos += 1;
        }
        if cases.is_empty() {
            return Err(self.error("expected at least one 'case' clause"));
        }
        Ok(Stmt::Match { subject, cases })
    }

    fn parse_pattern(&mut self) -> ParseResult<Pattern> {
        let first = self.parse_or_pattern()?;
        if self.eat_kw(Kw::As) {
            let name = self.expect_name("a name after 'as'")?;
            return Ok(Pattern::As(Box::new(first), name));
        }
        Ok(first)
    }

    fn parse_or_pattern(&mut self) -> ParseResult<Pattern> {
        let first = self.parse_closed_pattern()?;
        if self.current() != &Tok::Op(Op::Pipe) {
            return Ok(first);
        }
        let mut alts = vec![first];
        while self.eat_op(Op::Pipe) {
            alts.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern::Or(alts))
    }

    fn parse_closed_pattern(&mut self) -> ParseResult<Pattern> {
        match self.current().clone() {
            Tok::Int(value) => {
                self.pos += 1;
                Ok(Pattern::Literal(int_literal(value)))
            }
            Tok::Float(value) => {
                self.pos += 1;
                Ok(Pattern::Literal(Literal::Float(value)))
            }
            Tok::Str(value) => {
                self.pos += 1;
                Ok(Pattern::Literal(Literal::Str(Arc::from(value))))
            }
            Tok::Op(Op::Minus) => {
                self.pos += 1;
                match self.advance() {
                    Tok::Int(value) => Ok(Pattern::Literal(int_literal(-value))),
                    Tok::Float(value) => Ok(Pattern::Literal(Literal::Float(-value))),
                    _ => Err(self.unexpected("a number after '-'")),
                }
            }
            Tok::Keyword(Kw::None) => {
                self.pos += 1;
                Ok(Pattern::Literal(Literal::None))
            }
            Tok::Keyword(Kw::True) => {
                self.pos += 1;
                Ok(Pattern::Literal(Literal::Bool(true)))
            }
            Tok::Keyword(Kw::False) => {
                self.pos += 1;
                Ok(Pattern::Literal(Literal::Bool(false)))
            }
            Tok::Name(name) if &*name == "_" => {
                self.pos += 1;
                Ok(Pattern::Wildcard)
            }
            Tok::Name(name) => {
                self.pos += 1;
                if self.current() == &Tok::Op(Op::LParen) {
                    self.parse_class_pattern(name)
                } else {
                    Ok(Pattern::Capture(name))
                }
            }
            Tok::Op(Op::LBracket) => {
                self.pos += 1;
                let pattern = self.parse_sequence_pattern(Op::RBracket)?;
                Ok(pattern)
            }
            Tok::Op(Op::LParen) => {
                self.pos += 1;
                let pattern = self.parse_sequence_pattern(Op::RParen)?;
                Ok(pattern)
            }
            Tok::Op(Op::LBrace) => {
                self.pos += 1;
                let mut entries = Vec::new();
                while self.current() != &Tok::Op(Op::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect_op(Op::Colon)?;
                    let value = self.parse_pattern()?;
                    entries.push((key, value));
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RBrace)?;
                Ok(Pattern::Mapping(entries))
            }
            _ => Err(self.unexpected("a pattern")),
        }
    }

    fn parse_sequence_pattern(&mut self, close: Op) -> ParseResult<Pattern> {
        let mut items = Vec::new();
        let mut star = None;
        while self.current() != &Tok::Op(close) {
            if self.eat_op(Op::Star) {
                if star.is_some() {
                    return Err(self.error("only one starred pattern is allowed"));
                }
                let name = match self.current().clone() {
                    Tok::Name(n) if &*n == "_" => {
                        self.pos += 1;
                        None
                    }
                    Tok::Name(n) => {
                        self.pos += 1;
                        Some(n)
                    }
                    _ => return Err(self.unexpected("a name after '*'")),
                };
                star = Some((items.len(), name));
            } else {
                items.push(self.parse_pattern()?);
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(close)?;
        Ok(Pattern::Sequence { items, star })
    }

    fn parse_class_pattern(&mut self, class_name: Arc<str>) -> ParseResult<Pattern> {
        let line = self.line();
        self.expect_op(Op::LParen)?;
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        while self.current() != &Tok::Op(Op::RParen) {
            if let Tok::Name(name) = self.current().clone() {
                if self.peek(1) == &Tok::Op(Op::Assign) {
                    self.pos += 2;
                    let pattern = self.parse_pattern()?;
                    keyword.push((name, pattern));
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                    continue;
                }
            }
            positional.push(self.parse_pattern()?);
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RParen)?;
        Ok(Pattern::Class {
            class: ExprLoc {
                expr: Expr::Name(class_name),
                line,
            },
            positional,
            keyword,
        })
    }

    // ---- expressions -----------------------------------------------------

    /// Expression possibly followed by `:=` (walrus) when the LHS is a name.
    fn parse_namedexpr(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        if let Tok::Name(name) = self.current().clone() {
            if self.peek(1) == &Tok::Op(Op::Walrus) {
                self.pos += 2;
                let value = self.parse_expr()?;
                return Ok(ExprLoc {
                    expr: Expr::Walrus {
                        name,
                        value: Box::new(value),
                    },
                    line,
                });
            }
        }
        self.parse_expr()
    }

    /// A comma-separated expression list; a trailing or internal comma builds
    /// a tuple.
    fn parse_testlist(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_expr()?;
        if self.current() != &Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.ends_expression() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(ExprLoc {
            expr: Expr::Tuple(items),
            line,
        })
    }

    /// Like `parse_testlist` but allows starred elements (assignment RHS/LHS).
    fn parse_testlist_star(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_expr_or_starred()?;
        if self.current() != &Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.ends_expression() {
                break;
            }
            items.push(self.parse_expr_or_starred()?);
        }
        Ok(ExprLoc {
            expr: Expr::Tuple(items),
            line,
        })
    }

    fn parse_expr_or_starred(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        if self.eat_op(Op::Star) {
            let inner = self.parse_expr()?;
            return Ok(ExprLoc {
                expr: Expr::Starred(Box::new(inner)),
                line,
            });
        }
        self.parse_expr()
    }

    fn ends_expression(&self) -> bool {
        matches!(
            self.current(),
            Tok::Newline
                | Tok::Eof
                | Tok::Dedent
                | Tok::Op(Op::Assign | Op::RParen | Op::RBracket | Op::RBrace | Op::Colon | Op::Semi)
                | Tok::Keyword(Kw::In)
        )
    }

    /// Full conditional expression (ternary / lambda / yield).
    fn parse_expr(&mut self) -> ParseResult<ExprLoc> {
        let guard = self.enter()?;
        let result = guard.parser.parse_expr_inner();
        result
    }

    fn parse_expr_inner(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        match self.current() {
            Tok::Keyword(Kw::Lambda) => {
                self.pos += 1;
                let params = self.parse_params(false)?;
                self.expect_op(Op::Colon)?;
                let body = self.parse_expr()?;
                return Ok(ExprLoc {
                    expr: Expr::Lambda {
                        params: Arc::new(params),
                        body: Arc::new(body),
                    },
                    line,
                });
            }
            Tok::Keyword(Kw::Yield) => {
                self.pos += 1;
                if self.current() == &Tok::Keyword(Kw::From) {
                    self.pos += 1;
                    let inner = self.parse_expr()?;
                    return Ok(ExprLoc {
                        expr: Expr::YieldFrom(Box::new(inner)),
                        line,
                    });
                }
                let value = if self.ends_expression() {
                    None
                } else {
                    Some(Box::new(self.parse_testlist()?))
                };
                return Ok(ExprLoc {
                    expr: Expr::Yield(value),
                    line,
                });
            }
            Tok::Keyword(Kw::Await) => {
                return Err(self.error("async/await is not supported; call the function directly"));
            }
            _ => {}
        }
        let condition_or_value = self.parse_or()?;
        if self.current() == &Tok::Keyword(Kw::If) {
            self.pos += 1;
            let condition = self.parse_or()?;
            self.expect_kw(Kw::Else)?;
            let otherwise = self.parse_expr()?;
            return Ok(ExprLoc {
                expr: Expr::Ternary {
                    condition: Box::new(condition),
                    then: Box::new(condition_or_value),
                    otherwise: Box::new(otherwise),
                },
                line,
            });
        }
        Ok(condition_or_value)
    }

    fn parse_or(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_and()?;
        if self.current() != &Tok::Keyword(Kw::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::Or) {
            values.push(self.parse_and()?);
        }
        Ok(ExprLoc {
            expr: Expr::BoolOp {
                op: BoolOpKind::Or,
                values,
            },
            line,
        })
    }

    fn parse_and(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_not()?;
        if self.current() != &Tok::Keyword(Kw::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::And) {
            values.push(self.parse_not()?);
        }
        Ok(ExprLoc {
            expr: Expr::BoolOp {
                op: BoolOpKind::And,
                values,
            },
            line,
        })
    }

    fn parse_not(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        if self.eat_kw(Kw::Not) {
            let operand = self.parse_not()?;
            return Ok(ExprLoc {
                expr: Expr::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_bitor()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current() {
                Tok::Op(Op::Lt) => CmpOp::Lt,
                Tok::Op(Op::Le) => CmpOp::LtE,
                Tok::Op(Op::Gt) => CmpOp::Gt,
                Tok::Op(Op::Ge) => CmpOp::GtE,
                Tok::Op(Op::EqEq) => CmpOp::Eq,
                Tok::Op(Op::Ne) => CmpOp::NotEq,
                Tok::Keyword(Kw::In) => CmpOp::In,
                Tok::Keyword(Kw::Is) => {
                    if self.peek(1) == &Tok::Keyword(Kw::Not) {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                Tok::Keyword(Kw::Not) => {
                    if self.peek(1) == &Tok::Keyword(Kw::In) {
                        self.pos += 1;
                        CmpOp::NotIn
                    } else {
                        break;
                    }
                }
                _ => break,
            };
            self.pos += 1;
            let operand = self.parse_bitor()?;
            rest.push((op, operand));
        }
        if rest.is_empty() {
            return Ok(first);
        }
        Ok(ExprLoc {
            expr: Expr::Compare {
                first: Box::new(first),
                rest,
            },
            line,
        })
    }

    fn parse_bitor(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_bitxor()?;
        while self.current() == &Tok::Op(Op::Pipe) {
            let line = self.line();
            self.pos += 1;
            let right = self.parse_bitxor()?;
            left = binop(left, BinOp::BitOr, right, line);
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_bitand()?;
        while self.current() == &Tok::Op(Op::Caret) {
            let line = self.line();
            self.pos += 1;
            let right = self.parse_bitand()?;
            left = binop(left, BinOp::BitXor, right, line);
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_shift()?;
        while self.current() == &Tok::Op(Op::Amp) {
            let line = self.line();
            self.pos += 1;
            let right = self.parse_shift()?;
            left = binop(left, BinOp::BitAnd, right, line);
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.current() {
                Tok::Op(Op::Shl) => BinOp::Shl,
                Tok::Op(Op::Shr) => BinOp::Shr,
                _ => break,
            };
            let line = self.line();
            self.pos += 1;
            let right = self.parse_arith()?;
            left = binop(left, op, right, line);
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Tok::Op(Op::Plus) => BinOp::Add,
                Tok::Op(Op::Minus) => BinOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.pos += 1;
            let right = self.parse_term()?;
            left = binop(left, op, right, line);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> ParseResult<ExprLoc> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current() {
                Tok::Op(Op::Star) => BinOp::Mul,
                Tok::Op(Op::Slash) => BinOp::Div,
                Tok::Op(Op::DoubleSlash) => BinOp::FloorDiv,
                Tok::Op(Op::Percent) => BinOp::Mod,
                _ => break,
            };
            let line = self.line();
            self.pos += 1;
            let right = self.parse_factor()?;
            left = binop(left, op, right, line);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let op = match self.current() {
            Tok::Op(Op::Minus) => Some(UnaryOp::Neg),
            Tok::Op(Op::Plus) => Some(UnaryOp::Pos),
            Tok::Op(Op::Tilde) => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            let guard = self.enter()?;
            guard.parser.pos += 1;
            let operand = guard.parser.parse_factor()?;
            return Ok(ExprLoc {
                expr: Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                },
                line,
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult<ExprLoc> {
        let left = self.parse_postfix()?;
        if self.current() == &Tok::Op(Op::DoubleStar) {
            let line = self.line();
            self.pos += 1;
            // right-associative
            let right = self.parse_factor()?;
            return Ok(binop(left, BinOp::Pow, right, line));
        }
        Ok(left)
    }

    fn parse_postfix(&mut self) -> ParseResult<ExprLoc> {
        let mut value = self.parse_atom()?;
        loop {
            match self.current() {
                Tok::Op(Op::Dot) => {
                    let line = self.line();
                    self.pos += 1;
                    let name = self.expect_name("an attribute name after '.'")?;
                    value = ExprLoc {
                        expr: Expr::Attr {
                            value: Box::new(value),
                            name,
                        },
                        line,
                    };
                }
                Tok::Op(Op::LBracket) => {
                    let line = self.line();
                    self.pos += 1;
                    let index = self.parse_subscript()?;
                    self.expect_op(Op::RBracket)?;
                    value = ExprLoc {
                        expr: Expr::Subscript {
                            value: Box::new(value),
                            index: Box::new(index),
                        },
                        line,
                    };
                }
                Tok::Op(Op::LParen) => {
                    let line = self.line();
                    self.pos += 1;
                    let args = self.parse_call_args()?;
                    value = ExprLoc {
                        expr: Expr::Call {
                            callee: Box::new(value),
                            args,
                        },
                        line,
                    };
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_subscript(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let lower = if matches!(self.current(), Tok::Op(Op::Colon)) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if !self.eat_op(Op::Colon) {
            return lower.map(|b| *b).ok_or_else(|| self.unexpected("an index expression"));
        }
        let upper = if matches!(self.current(), Tok::Op(Op::Colon | Op::RBracket)) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let step = if self.eat_op(Op::Colon) {
            if matches!(self.current(), Tok::Op(Op::RBracket)) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            }
        } else {
            None
        };
        Ok(ExprLoc {
            expr: Expr::Slice { lower, upper, step },
            line,
        })
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<CallArg>> {
        let mut args = Vec::new();
        while self.current() != &Tok::Op(Op::RParen) {
            match self.current().clone() {
                Tok::Op(Op::Star) => {
                    self.pos += 1;
                    args.push(CallArg::Star(self.parse_expr()?));
                }
                Tok::Op(Op::DoubleStar) => {
                    self.pos += 1;
                    args.push(CallArg::DoubleStar(self.parse_expr()?));
                }
                Tok::Name(name) if self.peek(1) == &Tok::Op(Op::Assign) => {
                    self.pos += 2;
                    let value = self.parse_expr()?;
                    args.push(CallArg::Keyword(name.to_string(), value));
                }
                _ => {
                    let expr = self.parse_namedexpr()?;
                    // bare generator-expression argument: f(x for x in xs)
                    if self.current() == &Tok::Keyword(Kw::For) && args.is_empty() {
                        let genexp = self.parse_comprehension_tail_genexp(expr)?;
                        args.push(CallArg::Positional(genexp));
                        break;
                    }
                    args.push(CallArg::Positional(expr));
                }
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RParen)?;
        Ok(args)
    }

    fn parse_atom(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        match self.advance() {
            Tok::Int(value) => Ok(ExprLoc {
                expr: Expr::Literal(int_literal(value)),
                line,
            }),
            Tok::Float(value) => Ok(ExprLoc {
                expr: Expr::Literal(Literal::Float(value)),
                line,
            }),
            Tok::Str(first) => {
                // adjacent string literals concatenate
                let mut value = first;
                while let Tok::Str(next) = self.current() {
                    value.push_str(next);
                    self.pos += 1;
                }
                Ok(ExprLoc {
                    expr: Expr::Literal(Literal::Str(Arc::from(value))),
                    line,
                })
            }
            Tok::Bytes => Err(self.error("bytes literals are not supported")),
            Tok::FString(parts) => {
                let parts = self.convert_fstring_parts(parts)?;
                Ok(ExprLoc {
                    expr: Expr::FString(parts),
                    line,
                })
            }
            Tok::Keyword(Kw::None) => Ok(ExprLoc {
                expr: Expr::Literal(Literal::None),
                line,
            }),
            Tok::Keyword(Kw::True) => Ok(ExprLoc {
                expr: Expr::Literal(Literal::Bool(true)),
                line,
            }),
            Tok::Keyword(Kw::False) => Ok(ExprLoc {
                expr: Expr::Literal(Literal::Bool(false)),
                line,
            }),
            Tok::Name(name) => Ok(ExprLoc {
                expr: Expr::Name(name),
                line,
            }),
            Tok::Op(Op::LParen) => self.parse_paren(line),
            Tok::Op(Op::LBracket) => self.parse_list_display(line),
            Tok::Op(Op::LBrace) => self.parse_brace_display(line),
            Tok::Keyword(Kw::Await) => Err(self.error("async/await is not supported; call the function directly")),
            other => Err(self.error(format!("expected an expression, found {}", other.describe()))),
        }
    }

    fn parse_paren(&mut self, line: u32) -> ParseResult<ExprLoc> {
        if self.eat_op(Op::RParen) {
            return Ok(ExprLoc {
                expr: Expr::Tuple(Vec::new()),
                line,
            });
        }
        // parenthesized yield
        if matches!(self.current(), Tok::Keyword(Kw::Yield)) {
            let inner = self.parse_expr()?;
            self.expect_op(Op::RParen)?;
            return Ok(inner);
        }
        let first = if self.current() == &Tok::Op(Op::Star) {
            self.parse_expr_or_starred()?
        } else {
            self.parse_namedexpr()?
        };
        if self.current() == &Tok::Keyword(Kw::For) {
            let genexp = self.parse_comprehension_tail_genexp(first)?;
            self.expect_op(Op::RParen)?;
            return Ok(genexp);
        }
        if self.current() == &Tok::Op(Op::Comma) {
            let mut items = vec![first];
            while self.eat_op(Op::Comma) {
                if self.current() == &Tok::Op(Op::RParen) {
                    break;
                }
                items.push(self.parse_expr_or_starred()?);
            }
            self.expect_op(Op::RParen)?;
            return Ok(ExprLoc {
                expr: Expr::Tuple(items),
                line,
            });
        }
        self.expect_op(Op::RParen)?;
        Ok(first)
    }

    fn parse_list_display(&mut self, line: u32) -> ParseResult<ExprLoc> {
        if self.eat_op(Op::RBracket) {
            return Ok(ExprLoc {
                expr: Expr::List(Vec::new()),
                line,
            });
        }
        let first = self.parse_expr_or_starred()?;
        if self.current() == &Tok::Keyword(Kw::For) {
            let clauses = self.parse_comp_clauses()?;
            self.expect_op(Op::RBracket)?;
            return Ok(ExprLoc {
                expr: Expr::ListComp {
                    elt: Box::new(first),
                    clauses,
                },
                line,
            });
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.current() == &Tok::Op(Op::RBracket) {
                break;
            }
            items.push(self.parse_expr_or_starred()?);
        }
        self.expect_op(Op::RBracket)?;
        Ok(ExprLoc {
            expr: Expr::List(items),
            line,
        })
    }

    fn parse_brace_display(&mut self, line: u32) -> ParseResult<ExprLoc> {
        if self.eat_op(Op::RBrace) {
            return Ok(ExprLoc {
                expr: Expr::Dict(Vec::new()),
                line,
            });
        }
        // dict splat
        if self.eat_op(Op::DoubleStar) {
            let mapping = self.parse_expr()?;
            let mut items = vec![DictItem::DoubleStar(mapping)];
            while self.eat_op(Op::Comma) {
                if self.current() == &Tok::Op(Op::RBrace) {
                    break;
                }
                items.push(self.parse_dict_item()?);
            }
            self.expect_op(Op::RBrace)?;
            return Ok(ExprLoc {
                expr: Expr::Dict(items),
                line,
            });
        }
        let first = self.parse_expr_or_starred()?;
        if self.eat_op(Op::Colon) {
            let value = self.parse_expr()?;
            if self.current() == &Tok::Keyword(Kw::For) {
                let clauses = self.parse_comp_clauses()?;
                self.expect_op(Op::RBrace)?;
                return Ok(ExprLoc {
                    expr: Expr::DictComp {
                        key: Box::new(first),
                        value: Box::new(value),
                        clauses,
                    },
                    line,
                });
            }
            let mut items = vec![DictItem::Pair(first, value)];
            while self.eat_op(Op::Comma) {
                if self.current() == &Tok::Op(Op::RBrace) {
                    break;
                }
                items.push(self.parse_dict_item()?);
            }
            self.expect_op(Op::RBrace)?;
            return Ok(ExprLoc {
                expr: Expr::Dict(items),
                line,
            });
        }
        if self.current() == &Tok::Keyword(Kw::For) {
            let clauses = self.parse_comp_clauses()?;
            self.expect_op(Op::RBrace)?;
            return Ok(ExprLoc {
                expr: Expr::SetComp {
                    elt: Box::new(first),
                    clauses,
                },
                line,
            });
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.current() == &Tok::Op(Op::RBrace) {
                break;
            }
            items.push(self.parse_expr_or_starred()?);
        }
        self.expect_op(Op::RBrace)?;
        Ok(ExprLoc {
            expr: Expr::Set(items),
            line,
        })
    }

    fn parse_dict_item(&mut self) -> ParseResult<DictItem> {
        if self.eat_op(Op::DoubleStar) {
            return Ok(DictItem::DoubleStar(self.parse_expr()?));
        }
        let key = self.parse_expr()?;
        self.expect_op(Op::Colon)?;
        let value = self.parse_expr()?;
        Ok(DictItem::Pair(key, value))
    }

    fn parse_comp_clauses(&mut self) -> ParseResult<Vec<CompClause>> {
        let mut clauses = Vec::new();
        loop {
            if self.eat_kw(Kw::For) {
                let target_expr = self.parse_target_list_comp()?;
                let target = self.expr_to_target(target_expr)?;
                self.expect_kw(Kw::In)?;
                let iter = self.parse_or()?;
                clauses.push(CompClause::For { target, iter });
            } else if self.eat_kw(Kw::If) {
                let condition = self.parse_or()?;
                clauses.push(CompClause::If(condition));
            } else {
                break;
            }
        }
        Ok(clauses)
    }

    /// A comprehension `for` target: like a target list but stops at `in`.
    fn parse_target_list_comp(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        let first = self.parse_comp_target_atom()?;
        if self.current() != &Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.current() == &Tok::Keyword(Kw::In) {
                break;
            }
            items.push(self.parse_comp_target_atom()?);
        }
        Ok(ExprLoc {
            expr: Expr::Tuple(items),
            line,
        })
    }

    fn parse_comp_target_atom(&mut self) -> ParseResult<ExprLoc> {
        let line = self.line();
        if self.eat_op(Op::Star) {
            let inner = self.parse_comp_target_atom()?;
            return Ok(ExprLoc {
                expr: Expr::Starred(Box::new(inner)),
                line,
            });
        }
        let mut value = match self.advance() {
            Tok::Name(name) => ExprLoc {
                expr: Expr::Name(name),
                line,
            },
            Tok::Op(Op::LParen) => {
                let inner = self.parse_target_list_comp()?;
                self.expect_op(Op::RParen)?;
                inner
            }
            Tok::Op(Op::LBracket) => {
                let inner = self.parse_target_list_comp()?;
                self.expect_op(Op::RBracket)?;
                inner
            }
            other => return Err(self.error(format!("expected a name, found {}", other.describe()))),
        };
        // attribute / subscript trailers are valid assignment targets
        loop {
            match self.current() {
                Tok::Op(Op::Dot) => {
                    let line = self.line();
                    self.pos += 1;
                    let name = self.expect_name("an attribute name after '.'")?;
                    value = ExprLoc {
                        expr: Expr::Attr {
                            value: Box::new(value),
                            name,
                        },
                        line,
                    };
                }
                Tok::Op(Op::LBracket) => {
                    let line = self.line();
                    self.pos += 1;
                    let index = self.parse_subscript()?;
                    self.expect_op(Op::RBracket)?;
                    value = ExprLoc {
                        expr: Expr::Subscript {
                            value: Box::new(value),
                            index: Box::new(index),
                        },
                        line,
                    };
                }
                _ => break,
            }
        }
        Ok(value)
    }

    /// Desugars `elt for ... in ...` into a generator body.
    fn parse_comprehension_tail_genexp(&mut self, elt: ExprLoc) -> ParseResult<ExprLoc> {
        let line = elt.line;
        let clauses = self.parse_comp_clauses()?;
        let body = desugar_genexp(elt, &clauses);
        Ok(ExprLoc {
            expr: Expr::GenExp { body },
            line,
        })
    }

    // ---- f-strings --------------------------------------------------------

    fn convert_fstring_parts(&mut self, parts: Vec<FsTok>) -> ParseResult<Vec<FStringPart>> {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                FsTok::Literal(text) => out.push(FStringPart::Literal(Arc::from(text))),
                FsTok::Expr { source, line } => {
                    let (expr_src, conversion, spec_src) = split_interpolation(&source);
                    let expr = parse_expression_source(expr_src.trim(), line)?;
                    let spec = match spec_src {
                        Some(spec_text) => Some(self.convert_spec(spec_text, line)?),
                        None => None,
                    };
                    out.push(FStringPart::Expr {
                        expr: Box::new(expr),
                        conversion,
                        spec,
                    });
                }
            }
        }
        Ok(out)
    }

    /// A format spec may itself contain `{expr}` interpolations.
    fn convert_spec(&mut self, spec: &str, line: u32) -> ParseResult<Vec<FStringPart>> {
        let mut parts = Vec::new();
        let chars: Vec<char> = spec.chars().collect();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '{' {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(Arc::from(literal.as_str())));
                    literal.clear();
                }
                let mut depth = 1usize;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth == 0 {
                        break;
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(ParseError {
                        message: "expected '}' in format spec".to_owned(),
                        line,
                        indentation: false,
                    });
                }
                let source: String = chars[start..j].iter().collect();
                let expr = parse_expression_source(source.trim(), line)?;
                parts.push(FStringPart::Expr {
                    expr: Box::new(expr),
                    conversion: None,
                    spec: None,
                });
                i = j + 1;
                continue;
            }
            literal.push(chars[i]);
            i += 1;
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(Arc::from(literal.as_str())));
        }
        Ok(parts)
    }

    // ---- target conversion -------------------------------------------------

    /// Converts an expression into an assignment target, or reports which part
    /// cannot be assigned to.
    fn expr_to_target(&self, expr: ExprLoc) -> ParseResult<AssignTarget> {
        match expr.expr {
            Expr::Name(name) => Ok(AssignTarget::Name(name)),
            Expr::Attr { value, name } => Ok(AssignTarget::Attr { value, name }),
            Expr::Subscript { value, index } => Ok(AssignTarget::Subscript { value, index }),
            Expr::Tuple(items) | Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut seen_star = false;
                for item in items {
                    if let Expr::Starred(inner) = item.expr {
                        if seen_star {
                            return Err(ParseError {
                                message: "multiple starred expressions in assignment".to_owned(),
                                line: item.line,
                                indentation: false,
                            });
                        }
                        seen_star = true;
                        out.push(UnpackItem::Starred(self.expr_to_target(*inner)?));
                    } else {
                        out.push(UnpackItem::Target(self.expr_to_target(item)?));
                    }
                }
                Ok(AssignTarget::Unpack(out))
            }
            Expr::Starred(_) => Err(ParseError {
                message: "starred assignment target must be in a list or tuple".to_owned(),
                line: expr.line,
                indentation: false,
            }),
            _ => Err(ParseError {
                message: "cannot assign to this expression".to_owned(),
                line: expr.line,
                indentation: false,
            }),
        }
    }
}

struct DepthGuard<'a> {
    parser: &'a mut Parser,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.parser.depth -= 1;
    }
}

fn binop(left: ExprLoc, op: BinOp, right: ExprLoc, line: u32) -> ExprLoc {
    ExprLoc {
        expr: Expr::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        line,
    }
}

fn int_literal(value: BigInt) -> Literal {
    match value.to_i64() {
        Some(small) => Literal::Int(small),
        None => Literal::BigInt(Arc::new(value)),
    }
}

/// Splits a raw f-string interpolation into (expression, conversion, spec).
///
/// The conversion (`!r`/`!s`) and format spec (`:...`) are only recognised at
/// bracket/quote depth zero, so `{d['a']}` and `{f(x, y)}` survive intact.
fn split_interpolation(source: &str) -> (&str, Option<Conversion>, Option<&str>) {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut conversion = None;
    let mut expr_end = source.len();
    let mut spec_start = None;
    let mut i = 0;
    while i < chars.len() {
        let (byte_pos, c) = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '!' if depth == 0 => {
                // != is a comparison, not a conversion
                if chars.get(i + 1).map(|&(_, c)| c) == Some('=') {
                    i += 2;
                    continue;
                }
                match chars.get(i + 1).map(|&(_, c)| c) {
                    Some('r') => {
                        conversion = Some(Conversion::Repr);
                        expr_end = byte_pos;
                        if chars.get(i + 2).map(|&(_, c)| c) == Some(':') {
                            spec_start = chars.get(i + 3).map(|&(p, _)| p).or(Some(source.len()));
                        }
                        break;
                    }
                    Some('s') => {
                        conversion = Some(Conversion::Str);
                        expr_end = byte_pos;
                        if chars.get(i + 2).map(|&(_, c)| c) == Some(':') {
                            spec_start = chars.get(i + 3).map(|&(p, _)| p).or(Some(source.len()));
                        }
                        break;
                    }
                    _ => {}
                }
            }
            ':' if depth == 0 => {
                expr_end = byte_pos;
                spec_start = chars.get(i + 1).map(|&(p, _)| p).or(Some(source.len()));
                break;
            }
            _ => {}
        }
        i += 1;
    }
    let expr = &source[..expr_end];
    let spec = spec_start.map(|p| &source[p..]);
    (expr, conversion, spec)
}

/// Renders an annotation expression as an opaque string for later use by the
/// dispatcher's parameter binding ("int", "Item", "list[int]").
fn annotation_string(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.to_string(),
        Expr::Literal(Literal::Str(s)) => s.to_string(),
        Expr::Literal(Literal::None) => "None".to_owned(),
        Expr::Attr { value, name } => format!("{}.{name}", annotation_string(&value.expr)),
        Expr::Subscript { value, index } => {
            format!("{}[{}]", annotation_string(&value.expr), annotation_string(&index.expr))
        }
        Expr::Tuple(items) | Expr::List(items) => items
            .iter()
            .map(|e| annotation_string(&e.expr))
            .collect::<Vec<_>>()
            .join(", "),
        Expr::BinOp {
            left,
            op: BinOp::BitOr,
            right,
        } => format!("{} | {}", annotation_string(&left.expr), annotation_string(&right.expr)),
        _ => "object".to_owned(),
    }
}

/// Builds the generator body for a generator expression: nested `for`/`if`
/// statements around a single `yield elt`.
fn desugar_genexp(elt: ExprLoc, clauses: &[CompClause]) -> Arc<[StmtLoc]> {
    let line = elt.line;
    let mut body: Arc<[StmtLoc]> = Arc::from(vec![StmtLoc {
        stmt: Stmt::Expr(ExprLoc {
            expr: Expr::Yield(Some(Box::new(elt))),
            line,
        }),
        line,
    }]);
    for clause in clauses.iter().rev() {
        let stmt = match clause {
            CompClause::For { target, iter } => Stmt::For {
                target: target.clone(),
                iter: iter.clone(),
                body,
                orelse: None,
            },
            CompClause::If(condition) => Stmt::If {
                branches: vec![(condition.clone(), body)],
                orelse: None,
            },
        };
        body = Arc::from(vec![StmtLoc { stmt, line }]);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<StmtLoc> {
        parse(source).unwrap()
    }

    #[test]
    fn assignment_forms() {
        let stmts = parse_ok("x = 1\nx += 2\nx: int = 3\na, *b = [1, 2, 3]\n");
        assert!(matches!(stmts[0].stmt, Stmt::Assign { .. }));
        assert!(matches!(stmts[1].stmt, Stmt::AugAssign { .. }));
        assert!(matches!(stmts[2].stmt, Stmt::AnnAssign { .. }));
        let Stmt::Assign { targets, .. } = &stmts[3].stmt else {
            panic!("expected assignment");
        };
        assert!(matches!(targets[0], AssignTarget::Unpack(_)));
    }

    #[test]
    fn chained_comparison_single_node() {
        let stmts = parse_ok("r = a < b < c\n");
        let Stmt::Assign { value, .. } = &stmts[0].stmt else {
            panic!("expected assignment");
        };
        let Expr::Compare { rest, .. } = &value.expr else {
            panic!("expected comparison chain, got {:?}", value.expr);
        };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn match_is_soft_keyword() {
        let stmts = parse_ok("match = 5\nmatch(1)\n");
        assert!(matches!(stmts[0].stmt, Stmt::Assign { .. }));
        assert!(matches!(stmts[1].stmt, Stmt::Expr(_)));
    }

    #[test]
    fn match_statement_parses() {
        let src = "match x:\n    case 0:\n        y = 1\n    case [a, *rest]:\n        y = 2\n    case _:\n        y = 3\n";
        let stmts = parse_ok(src);
        let Stmt::Match { cases, .. } = &stmts[0].stmt else {
            panic!("expected match statement");
        };
        assert_eq!(cases.len(), 3);
        assert!(matches!(cases[2].pattern, Pattern::Wildcard));
    }

    #[test]
    fn generator_detection() {
        let stmts = parse_ok("def f():\n    yield 1\n\ndef g():\n    return 1\n");
        let Stmt::Def(f) = &stmts[0].stmt else { panic!() };
        let Stmt::Def(g) = &stmts[1].stmt else { panic!() };
        assert!(f.is_generator);
        assert!(!g.is_generator);
    }

    #[test]
    fn nested_def_yield_does_not_make_outer_generator() {
        let stmts = parse_ok("def f():\n    def g():\n        yield 1\n    return g\n");
        let Stmt::Def(f) = &stmts[0].stmt else { panic!() };
        assert!(!f.is_generator);
    }

    #[test]
    fn syntax_error_wording() {
        let err = parse("if x\n    pass\n").unwrap_err();
        assert!(err.message.contains("':'"), "message was: {}", err.message);
        assert_eq!(err.line, 1);
        // raw token names never leak
        assert!(!err.message.contains("Op("));
        assert!(!err.message.contains("Tok"));
    }

    #[test]
    fn bytes_literal_rejected() {
        let err = parse("x = b'abc'\n").unwrap_err();
        assert!(err.message.contains("bytes literals are not supported"));
    }

    #[test]
    fn fstring_conversion_and_spec() {
        let stmts = parse_ok("s = f\"{x!r:>10}\"\n");
        let Stmt::Assign { value, .. } = &stmts[0].stmt else { panic!() };
        let Expr::FString(parts) = &value.expr else { panic!() };
        let FStringPart::Expr { conversion, spec, .. } = &parts[0] else {
            panic!()
        };
        assert_eq!(*conversion, Some(Conversion::Repr));
        assert!(spec.is_some());
    }

    #[test]
    fn fstring_ne_comparison_not_conversion() {
        let stmts = parse_ok("s = f\"{a != b}\"\n");
        let Stmt::Assign { value, .. } = &stmts[0].stmt else { panic!() };
        let Expr::FString(parts) = &value.expr else { panic!() };
        let FStringPart::Expr { conversion, .. } = &parts[0] else { panic!() };
        assert!(conversion.is_none());
    }

    #[test]
    fn genexp_in_call() {
        let stmts = parse_ok("t = sum(x * x for x in range(10))\n");
        let Stmt::Assign { value, .. } = &stmts[0].stmt else { panic!() };
        let Expr::Call { args, .. } = &value.expr else { panic!() };
        assert!(matches!(
            &args[0],
            CallArg::Positional(ExprLoc {
                expr: Expr::GenExp { .. },
                ..
            })
        ));
    }

    #[test]
    fn comprehension_clause_order() {
        let stmts = parse_ok("r = [x + y for x in a if x for y in b if y > x]\n");
        let Stmt::Assign { value, .. } = &stmts[0].stmt else { panic!() };
        let Expr::ListComp { clauses, .. } = &value.expr else { panic!() };
        assert_eq!(clauses.len(), 4);
        assert!(matches!(clauses[0], CompClause::For { .. }));
        assert!(matches!(clauses[1], CompClause::If(_)));
        assert!(matches!(clauses[2], CompClause::For { .. }));
        assert!(matches!(clauses[3], CompClause::If(_)));
    }

    #[test]
    fn decorated_def() {
        let stmts = parse_ok("@app.get(\"/x\")\ndef handler():\n    return 1\n");
        let Stmt::Def(def) = &stmts[0].stmt else { panic!() };
        assert_eq!(def.decorators.len(), 1);
    }

    #[test]
    fn async_rejected_with_feature_message() {
        let err = parse("async def f():\n    pass\n").unwrap_err();
        assert!(err.message.contains("async/await is not supported"));
    }

    #[test]
    fn deep_nesting_rejected() {
        let source = format!("x = {}1{}\n", "(".repeat(300), ")".repeat(300));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nested"));
    }

    #[test]
    fn slice_forms() {
        parse_ok("a[1:2]\na[:2]\na[1:]\na[::2]\na[::-1]\n");
    }

    #[test]
    fn ternary_and_walrus() {
        parse_ok("y = (n := 10) if flag else 0\nwhile (chunk := read()) != '':\n    pass\n");
    }
}
