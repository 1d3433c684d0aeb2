//! Typed AST produced by the parser and consumed by the evaluator.
//!
//! Every statement and expression node carries the source line it started on;
//! error messages lean on those lines, so the parser must never fabricate them.

use std::sync::Arc;

use ahash::AHashSet;
use num_bigint::BigInt;

/// Binary arithmetic / bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
}

impl BinOp {
    /// Symbol used in error messages ("unsupported operand type(s) for +").
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }

    /// Dunder method name consulted on instances for this operator.
    pub(crate) fn dunder(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::Div => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::BitOr => "__or__",
            Self::BitXor => "__xor__",
            Self::BitAnd => "__and__",
            Self::Shl => "__lshift__",
            Self::Shr => "__rshift__",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Invert,
    Not,
}

/// Comparison operators usable in (chained) comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

/// Boolean connectives with short-circuit semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoolOpKind {
    And,
    Or,
}

/// Literal constants embedded in the AST.
#[derive(Debug, Clone)]
pub(crate) enum Literal {
    None,
    Bool(bool),
    Int(i64),
    /// Integer literals exceeding the i64 range.
    BigInt(Arc<BigInt>),
    Float(f64),
    Str(Arc<str>),
}

/// One piece of an f-string: either literal text or an interpolation.
#[derive(Debug, Clone)]
pub(crate) enum FStringPart {
    Literal(Arc<str>),
    Expr {
        expr: Box<ExprLoc>,
        /// `!r` or `!s` conversion, if present.
        conversion: Option<Conversion>,
        /// Format spec after `:`; itself a sequence of parts so nested
        /// interpolations like `{x:{width}}` work.
        spec: Option<Vec<FStringPart>>,
    },
}

/// Conversion flag inside an f-string interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    Repr,
    Str,
}

/// One `for`/`if` clause of a comprehension, in source order.
#[derive(Debug, Clone)]
pub(crate) enum CompClause {
    For { target: AssignTarget, iter: ExprLoc },
    If(ExprLoc),
}

/// A single callsite argument.
#[derive(Debug, Clone)]
pub(crate) enum CallArg {
    Positional(ExprLoc),
    Keyword(String, ExprLoc),
    /// `*expr` splat.
    Star(ExprLoc),
    /// `**expr` splat.
    DoubleStar(ExprLoc),
}

/// An expression with its source line.
#[derive(Debug, Clone)]
pub(crate) struct ExprLoc {
    pub expr: Expr,
    pub line: u32,
}

/// Expression nodes.
#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Name(Arc<str>),
    BinOp {
        left: Box<ExprLoc>,
        op: BinOp,
        right: Box<ExprLoc>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<ExprLoc>,
    },
    /// A comparison chain `a < b <= c`; short-circuits on first false link.
    Compare {
        first: Box<ExprLoc>,
        rest: Vec<(CmpOp, ExprLoc)>,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<CallArg>,
    },
    Attr {
        value: Box<ExprLoc>,
        name: Arc<str>,
    },
    Subscript {
        value: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    Slice {
        lower: Option<Box<ExprLoc>>,
        upper: Option<Box<ExprLoc>>,
        step: Option<Box<ExprLoc>>,
    },
    List(Vec<ExprLoc>),
    /// A `*expr` element inside a list/tuple/set display or call.
    Starred(Box<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Set(Vec<ExprLoc>),
    Dict(Vec<DictItem>),
    ListComp {
        elt: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    SetComp {
        elt: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    DictComp {
        key: Box<ExprLoc>,
        value: Box<ExprLoc>,
        clauses: Vec<CompClause>,
    },
    /// Generator expression, desugared at parse time into a generator body:
    /// nested `For`/`If` statements around a single `yield elt`.
    GenExp {
        body: Arc<[StmtLoc]>,
    },
    Lambda {
        params: Arc<Params>,
        body: Arc<ExprLoc>,
    },
    Ternary {
        condition: Box<ExprLoc>,
        then: Box<ExprLoc>,
        otherwise: Box<ExprLoc>,
    },
    Walrus {
        name: Arc<str>,
        value: Box<ExprLoc>,
    },
    Yield(Option<Box<ExprLoc>>),
    YieldFrom(Box<ExprLoc>),
    FString(Vec<FStringPart>),
}

/// A `key: value` entry or `**mapping` splat in a dict display.
#[derive(Debug, Clone)]
pub(crate) enum DictItem {
    Pair(ExprLoc, ExprLoc),
    DoubleStar(ExprLoc),
}

/// Assignment target shapes (simple statements, `for` targets, comprehensions).
#[derive(Debug, Clone)]
pub(crate) enum AssignTarget {
    Name(Arc<str>),
    Attr {
        value: Box<ExprLoc>,
        name: Arc<str>,
    },
    Subscript {
        value: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Tuple/list pattern with at most one starred element.
    Unpack(Vec<UnpackItem>),
}

#[derive(Debug, Clone)]
pub(crate) enum UnpackItem {
    Target(AssignTarget),
    Starred(AssignTarget),
}

/// One declared parameter with optional default and annotation.
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub name: Arc<str>,
    pub default: Option<ExprLoc>,
    /// Parameter annotation rendered as an opaque string ("int", "Item").
    pub annotation: Option<Arc<str>>,
}

/// A full parameter list.
#[derive(Debug, Clone, Default)]
pub(crate) struct Params {
    /// Positional-or-keyword parameters.
    pub args: Vec<Param>,
    /// `*args` name.
    pub var_args: Option<Arc<str>>,
    /// Keyword-only parameters (after `*` or `*args`).
    pub kw_only: Vec<Param>,
    /// `**kwargs` name.
    pub var_kwargs: Option<Arc<str>>,
}

impl Params {
    /// Iterates over declared names in binding order.
    pub(crate) fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.args
            .iter()
            .map(|p| &p.name)
            .chain(self.var_args.iter())
            .chain(self.kw_only.iter().map(|p| &p.name))
            .chain(self.var_kwargs.iter())
    }
}

/// A function definition (also backs lambdas after desugaring).
#[derive(Debug, Clone)]
pub(crate) struct FuncDef {
    pub name: Arc<str>,
    pub params: Arc<Params>,
    pub body: Arc<[StmtLoc]>,
    /// Names assigned anywhere in the body; drives local-vs-enclosing
    /// resolution and `UnboundLocalError`.
    pub assigned: Arc<AHashSet<Arc<str>>>,
    /// True when the body contains `yield`/`yield from` at this def's level.
    pub is_generator: bool,
    pub decorators: Vec<ExprLoc>,
}

/// A class definition.
#[derive(Debug, Clone)]
pub(crate) struct ClassDef {
    pub name: Arc<str>,
    pub bases: Vec<ExprLoc>,
    pub body: Arc<[StmtLoc]>,
    pub decorators: Vec<ExprLoc>,
}

/// One `except` clause.
#[derive(Debug, Clone)]
pub(crate) struct ExceptClause {
    /// `None` for a bare `except:`. A tuple expression means a disjunction.
    pub exc_class: Option<ExprLoc>,
    pub binding: Option<Arc<str>>,
    pub body: Arc<[StmtLoc]>,
}

/// One `case` clause of a `match` statement.
#[derive(Debug, Clone)]
pub(crate) struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<ExprLoc>,
    pub body: Arc<[StmtLoc]>,
}

/// `match` patterns.
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    /// Literal constant (possibly a negative numeric).
    Literal(Literal),
    /// `_`
    Wildcard,
    /// Bare name capture.
    Capture(Arc<str>),
    /// `p1 | p2 | ...`
    Or(Vec<Pattern>),
    /// `[p, q, *rest]` - matches list/tuple arity ignoring the starred slot.
    Sequence {
        items: Vec<Pattern>,
        /// Index of the starred element and its capture name, if present.
        star: Option<(usize, Option<Arc<str>>)>,
    },
    /// `{"k": p, ...}` - listed keys must be present; extra keys permitted.
    Mapping(Vec<(ExprLoc, Pattern)>),
    /// `Cls(pos..., kw=p...)`
    Class {
        class: ExprLoc,
        positional: Vec<Pattern>,
        keyword: Vec<(Arc<str>, Pattern)>,
    },
    /// `p as name`
    As(Box<Pattern>, Arc<str>),
}

/// A statement with its source line.
#[derive(Debug, Clone)]
pub(crate) struct StmtLoc {
    pub stmt: Stmt,
    pub line: u32,
}

/// Statement nodes.
#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(ExprLoc),
    Assign {
        targets: Vec<AssignTarget>,
        value: ExprLoc,
    },
    AnnAssign {
        target: AssignTarget,
        annotation: Arc<str>,
        value: Option<ExprLoc>,
    },
    AugAssign {
        target: AssignTarget,
        op: BinOp,
        value: ExprLoc,
    },
    If {
        branches: Vec<(ExprLoc, Arc<[StmtLoc]>)>,
        orelse: Option<Arc<[StmtLoc]>>,
    },
    While {
        condition: ExprLoc,
        body: Arc<[StmtLoc]>,
        orelse: Option<Arc<[StmtLoc]>>,
    },
    For {
        target: AssignTarget,
        iter: ExprLoc,
        body: Arc<[StmtLoc]>,
        orelse: Option<Arc<[StmtLoc]>>,
    },
    Return(Option<ExprLoc>),
    Break,
    Continue,
    Pass,
    Def(FuncDef),
    Class(ClassDef),
    Import {
        module: Arc<str>,
        alias: Option<Arc<str>>,
    },
    FromImport {
        module: Arc<str>,
        names: Vec<(Arc<str>, Option<Arc<str>>)>,
    },
    Try {
        body: Arc<[StmtLoc]>,
        handlers: Vec<ExceptClause>,
        orelse: Option<Arc<[StmtLoc]>>,
        finally: Option<Arc<[StmtLoc]>>,
    },
    Raise {
        exc: Option<ExprLoc>,
        /// `raise X from Y` - evaluated then discarded (no cause chaining).
        cause: Option<ExprLoc>,
    },
    With {
        items: Vec<(ExprLoc, Option<AssignTarget>)>,
        body: Arc<[StmtLoc]>,
    },
    Assert {
        condition: ExprLoc,
        message: Option<ExprLoc>,
    },
    Del(Vec<AssignTarget>),
    Match {
        subject: ExprLoc,
        cases: Vec<MatchCase>,
    },
    Global(Vec<Arc<str>>),
    Nonlocal(Vec<Arc<str>>),
}

/// Collects every name assigned (in the local-scope sense) by a block.
///
/// Walks statements without descending into nested `def`/`class`/lambda bodies;
/// comprehension clause targets are likewise excluded because comprehensions
/// get their own frame. Walrus targets are included: they bind in the nearest
/// function scope.
pub(crate) fn collect_assigned(body: &[StmtLoc], out: &mut AHashSet<Arc<str>>) {
    for stmt in body {
        collect_assigned_stmt(&stmt.stmt, out);
    }
}

fn collect_assigned_stmt(stmt: &Stmt, out: &mut AHashSet<Arc<str>>) {
    match stmt {
        Stmt::Assign { targets, value } => {
            for target in targets {
                collect_target(target, out);
            }
            collect_walrus(&value.expr, out);
        }
        Stmt::AnnAssign { target, value, .. } => {
            collect_target(target, out);
            if let Some(value) = value {
                collect_walrus(&value.expr, out);
            }
        }
        Stmt::AugAssign { target, value, .. } => {
            collect_target(target, out);
            collect_walrus(&value.expr, out);
        }
        Stmt::Expr(e) => collect_walrus(&e.expr, out),
        Stmt::If { branches, orelse } => {
            for (cond, body) in branches {
                collect_walrus(&cond.expr, out);
                collect_assigned(body, out);
            }
            if let Some(orelse) = orelse {
                collect_assigned(orelse, out);
            }
        }
        Stmt::While {
            condition,
            body,
            orelse,
        } => {
            collect_walrus(&condition.expr, out);
            collect_assigned(body, out);
            if let Some(orelse) = orelse {
                collect_assigned(orelse, out);
            }
        }
        Stmt::For {
            target,
            iter,
            body,
            orelse,
        } => {
            collect_target(target, out);
            collect_walrus(&iter.expr, out);
            collect_assigned(body, out);
            if let Some(orelse) = orelse {
                collect_assigned(orelse, out);
            }
        }
        Stmt::Return(Some(e)) => collect_walrus(&e.expr, out),
        Stmt::Def(def) => {
            out.insert(def.name.clone());
        }
        Stmt::Class(def) => {
            out.insert(def.name.clone());
        }
        Stmt::Import { module, alias } => {
            let bound = alias.clone().unwrap_or_else(|| {
                // `import a.b` binds `a`; plain names bind themselves
                match module.split('.').next() {
                    Some(first) if first.len() != module.len() => Arc::from(first),
                    _ => module.clone(),
                }
            });
            out.insert(bound);
        }
        Stmt::FromImport { names, .. } => {
            for (name, alias) in names {
                out.insert(alias.clone().unwrap_or_else(|| name.clone()));
            }
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finally,
        } => {
            collect_assigned(body, out);
            for handler in handlers {
                if let Some(binding) = &handler.binding {
                    out.insert(binding.clone());
                }
                collect_assigned(&handler.body, out);
            }
            if let Some(orelse) = orelse {
                collect_assigned(orelse, out);
            }
            if let Some(finally) = finally {
                collect_assigned(finally, out);
            }
        }
        Stmt::With { items, body } => {
            for (cm, target) in items {
                collect_walrus(&cm.expr, out);
                if let Some(target) = target {
                    collect_target(target, out);
                }
            }
            collect_assigned(body, out);
        }
        Stmt::Match { subject, cases } => {
            collect_walrus(&subject.expr, out);
            for case in cases {
                collect_pattern(&case.pattern, out);
                collect_assigned(&case.body, out);
            }
        }
        Stmt::Del(targets) => {
            for target in targets {
                collect_target(target, out);
            }
        }
        Stmt::Raise { .. }
        | Stmt::Assert { .. }
        | Stmt::Break
        | Stmt::Continue
        | Stmt::Pass
        | Stmt::Return(None)
        | Stmt::Global(_)
        | Stmt::Nonlocal(_) => {}
    }
}

fn collect_target(target: &AssignTarget, out: &mut AHashSet<Arc<str>>) {
    match target {
        AssignTarget::Name(name) => {
            out.insert(name.clone());
        }
        AssignTarget::Unpack(items) => {
            for item in items {
                match item {
                    UnpackItem::Target(t) | UnpackItem::Starred(t) => collect_target(t, out),
                }
            }
        }
        AssignTarget::Attr { .. } | AssignTarget::Subscript { .. } => {}
    }
}

fn collect_pattern(pattern: &Pattern, out: &mut AHashSet<Arc<str>>) {
    match pattern {
        Pattern::Capture(name) => {
            out.insert(name.clone());
        }
        Pattern::Or(alts) => {
            for p in alts {
                collect_pattern(p, out);
            }
        }
        Pattern::Sequence { items, star } => {
            for p in items {
                collect_pattern(p, out);
            }
            if let Some((_, Some(name))) = star {
                out.insert(name.clone());
            }
        }
        Pattern::Mapping(entries) => {
            for (_, p) in entries {
                collect_pattern(p, out);
            }
        }
        Pattern::Class {
            positional, keyword, ..
        } => {
            for p in positional {
                collect_pattern(p, out);
            }
            for (_, p) in keyword {
                collect_pattern(p, out);
            }
        }
        Pattern::As(inner, name) => {
            collect_pattern(inner, out);
            out.insert(name.clone());
        }
        Pattern::Literal(_) | Pattern::Wildcard => {}
    }
}

/// Walks an expression collecting walrus targets (without entering nested
/// function bodies).
fn collect_walrus(expr: &Expr, out: &mut AHashSet<Arc<str>>) {
    match expr {
        Expr::Walrus { name, value } => {
            out.insert(name.clone());
            collect_walrus(&value.expr, out);
        }
        Expr::BinOp { left, right, .. } => {
            collect_walrus(&left.expr, out);
            collect_walrus(&right.expr, out);
        }
        Expr::UnaryOp { operand, .. } => collect_walrus(&operand.expr, out),
        Expr::BoolOp { values, .. } => {
            for v in values {
                collect_walrus(&v.expr, out);
            }
        }
        Expr::Compare { first, rest } => {
            collect_walrus(&first.expr, out);
            for (_, e) in rest {
                collect_walrus(&e.expr, out);
            }
        }
        Expr::Call { callee, args } => {
            collect_walrus(&callee.expr, out);
            for arg in args {
                match arg {
                    CallArg::Positional(e) | CallArg::Star(e) | CallArg::DoubleStar(e) => {
                        collect_walrus(&e.expr, out);
                    }
                    CallArg::Keyword(_, e) => collect_walrus(&e.expr, out),
                }
            }
        }
        Expr::Attr { value, .. } => collect_walrus(&value.expr, out),
        Expr::Subscript { value, index } => {
            collect_walrus(&value.expr, out);
            collect_walrus(&index.expr, out);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                collect_walrus(&part.expr, out);
            }
        }
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
            for e in items {
                collect_walrus(&e.expr, out);
            }
        }
        Expr::Starred(e) => collect_walrus(&e.expr, out),
        Expr::Dict(items) => {
            for item in items {
                match item {
                    DictItem::Pair(k, v) => {
                        collect_walrus(&k.expr, out);
                        collect_walrus(&v.expr, out);
                    }
                    DictItem::DoubleStar(e) => collect_walrus(&e.expr, out),
                }
            }
        }
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            collect_walrus(&condition.expr, out);
            collect_walrus(&then.expr, out);
            collect_walrus(&otherwise.expr, out);
        }
        Expr::Yield(Some(e)) => collect_walrus(&e.expr, out),
        Expr::YieldFrom(e) => collect_walrus(&e.expr, out),
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Expr { expr, .. } = part {
                    collect_walrus(&expr.expr, out);
                }
            }
        }
        // comprehensions and lambdas get their own frames
        Expr::ListComp { .. }
        | Expr::SetComp { .. }
        | Expr::DictComp { .. }
        | Expr::GenExp { .. }
        | Expr::Lambda { .. }
        | Expr::Literal(_)
        | Expr::Name(_)
        | Expr::Yield(None) => {}
    }
}

/// Returns true if the block contains a `yield`/`yield from` at this function's
/// level (nested defs and lambdas do not count).
pub(crate) fn contains_yield(body: &[StmtLoc]) -> bool {
    body.iter().any(|s| stmt_contains_yield(&s.stmt))
}

fn stmt_contains_yield(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Expr(e) | Stmt::Return(Some(e)) => expr_contains_yield(&e.expr),
        Stmt::Assign { targets: _, value } => expr_contains_yield(&value.expr),
        Stmt::AnnAssign { value, .. } => value.as_ref().is_some_and(|v| expr_contains_yield(&v.expr)),
        Stmt::AugAssign { value, .. } => expr_contains_yield(&value.expr),
        Stmt::If { branches, orelse } => {
            branches
                .iter()
                .any(|(c, b)| expr_contains_yield(&c.expr) || contains_yield(b))
                || orelse.as_ref().is_some_and(|b| contains_yield(b))
        }
        Stmt::While {
            condition,
            body,
            orelse,
        } => {
            expr_contains_yield(&condition.expr)
                || contains_yield(body)
                || orelse.as_ref().is_some_and(|b| contains_yield(b))
        }
        Stmt::For { iter, body, orelse, .. } => {
            expr_contains_yield(&iter.expr)
                || contains_yield(body)
                || orelse.as_ref().is_some_and(|b| contains_yield(b))
        }
        Stmt::Try {
            body,
            handlers,
            orelse,
            finally,
        } => {
            contains_yield(body)
                || handlers.iter().any(|h| contains_yield(&h.body))
                || orelse.as_ref().is_some_and(|b| contains_yield(b))
                || finally.as_ref().is_some_and(|b| contains_yield(b))
        }
        Stmt::With { items, body } => {
            items.iter().any(|(cm, _)| expr_contains_yield(&cm.expr)) || contains_yield(body)
        }
        Stmt::Match { subject, cases } => {
            expr_contains_yield(&subject.expr) || cases.iter().any(|c| contains_yield(&c.body))
        }
        _ => false,
    }
}

fn expr_contains_yield(expr: &Expr) -> bool {
    match expr {
        Expr::Yield(_) | Expr::YieldFrom(_) => true,
        Expr::BinOp { left, right, .. } => expr_contains_yield(&left.expr) || expr_contains_yield(&right.expr),
        Expr::UnaryOp { operand, .. } => expr_contains_yield(&operand.expr),
        Expr::BoolOp { values, .. } => values.iter().any(|v| expr_contains_yield(&v.expr)),
        Expr::Compare { first, rest } => {
            expr_contains_yield(&first.expr) || rest.iter().any(|(_, e)| expr_contains_yield(&e.expr))
        }
        Expr::Call { callee, args } => {
            expr_contains_yield(&callee.expr)
                || args.iter().any(|arg| match arg {
                    CallArg::Positional(e) | CallArg::Star(e) | CallArg::DoubleStar(e) | CallArg::Keyword(_, e) => {
                        expr_contains_yield(&e.expr)
                    }
                })
        }
        Expr::Attr { value, .. } => expr_contains_yield(&value.expr),
        Expr::Subscript { value, index } => expr_contains_yield(&value.expr) || expr_contains_yield(&index.expr),
        Expr::List(items) | Expr::Tuple(items) | Expr::Set(items) => {
            items.iter().any(|e| expr_contains_yield(&e.expr))
        }
        Expr::Starred(e) | Expr::Walrus { value: e, .. } => expr_contains_yield(&e.expr),
        Expr::Dict(items) => items.iter().any(|item| match item {
            DictItem::Pair(k, v) => expr_contains_yield(&k.expr) || expr_contains_yield(&v.expr),
            DictItem::DoubleStar(e) => expr_contains_yield(&e.expr),
        }),
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            expr_contains_yield(&condition.expr)
                || expr_contains_yield(&then.expr)
                || expr_contains_yield(&otherwise.expr)
        }
        Expr::FString(parts) => parts.iter().any(|part| match part {
            FStringPart::Expr { expr, .. } => expr_contains_yield(&expr.expr),
            FStringPart::Literal(_) => false,
        }),
        _ => false,
    }
}
