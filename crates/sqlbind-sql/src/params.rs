//! Parameter references and their syntactic context
//!
//! Parameters are found twice: once on the token stream, which gives exact
//! byte positions and the surface syntax (`$1`, `?`, `@name`,
//! `sqlbind.arg(name)`), and once on the syntax tree, which gives the
//! enclosing expression and the FROM scope a reference is evaluated in. The
//! two are joined by matching the k-th occurrence of each placeholder text,
//! so the tree is walked in source order. MySQL's `LIMIT offset, count` is
//! the one clause the tree stores out of order; the scan marks its offset.

use sqlbind_core::Engine;
use sqlparser::ast::{
    visit_expressions, Assignment, BinaryOperator, Cte, Expr, FromTable, Function, FunctionArg,
    FunctionArgExpr, FunctionArguments, GroupByExpr, Ident, Insert, JoinConstraint, JoinOperator,
    ObjectName, OnConflictAction, OnInsert, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins, UnaryOperator, Value, Visit,
};
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::ParserError;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::{ControlFlow, Range};

use crate::parser::ParseError;
use crate::source::LineIndex;

/// Namespace of the helper functions (`sqlbind.arg`, `sqlbind.narg`, `sqlbind.embed`)
pub const HELPER_NAMESPACE: &str = "sqlbind";

/// Surface syntax of a parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// `$N`
    Dollar(usize),

    /// `?`
    Question,

    /// `sqlbind.arg(name)`, `sqlbind.narg(name)` or `@name`
    Named(String),

    /// Any other placeholder the tokenizer accepts (`:name`, `?1`, `$name`)
    Other(String),
}

/// A parameter found on the token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: PlaceholderKind,

    /// Placeholder text as written (`$1`, `?`) or `@name` for named parameters
    pub text: String,

    /// Byte range of the reference; the whole helper call for named parameters
    pub span: Range<usize>,

    /// Helper call wrapping a positional placeholder, e.g. `sqlbind.narg($1)`
    pub wrapper: Option<Range<usize>>,

    /// Declared with `narg`
    pub nullable: bool,

    /// `N` of `$N`; assigned to named parameters by the rewriter
    pub number: usize,

    /// Offset of a `LIMIT offset, count` clause, which the tree stores
    /// after the count
    pub limit_offset: bool,
}

impl Placeholder {
    fn positional(text: &str, span: Range<usize>) -> Self {
        let kind = if text == "?" {
            PlaceholderKind::Question
        } else if let Some(n) = text.strip_prefix('$').and_then(|n| n.parse().ok()) {
            PlaceholderKind::Dollar(n)
        } else {
            PlaceholderKind::Other(text.to_string())
        };
        let number = match kind {
            PlaceholderKind::Dollar(n) => n,
            _ => 0,
        };

        Self {
            kind,
            text: text.to_string(),
            span,
            wrapper: None,
            nullable: false,
            number,
            limit_offset: false,
        }
    }

    fn named(name: &str, span: Range<usize>, nullable: bool) -> Self {
        Self {
            kind: PlaceholderKind::Named(name.to_string()),
            text: format!("@{}", name),
            span,
            wrapper: None,
            nullable,
            number: 0,
            limit_offset: false,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            PlaceholderKind::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self.kind, PlaceholderKind::Named(_))
    }
}

/// A `sqlbind.embed(table)` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedCall {
    /// Table name or alias as written
    pub table: String,

    /// Byte range of the call
    pub span: Range<usize>,
}

/// Everything the token scan found in a statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedParams {
    pub placeholders: Vec<Placeholder>,
    pub embeds: Vec<EmbedCall>,
}

impl ScannedParams {
    pub fn has_dollar(&self) -> bool {
        self.placeholders.iter().any(|p| matches!(p.kind, PlaceholderKind::Dollar(_)))
    }

    pub fn has_question(&self) -> bool {
        self.placeholders.iter().any(|p| p.kind == PlaceholderKind::Question)
    }

    pub fn has_named(&self) -> bool {
        self.placeholders.iter().any(Placeholder::is_named)
    }
}

enum HelperCall {
    Named { name: String, nullable: bool },
    Wrapped { text: String, span: Range<usize>, nullable: bool },
    Embed { table: String },
}

type Spanned = (Token, Range<usize>);

/// Match `sqlbind.<func>(<arg>)` at the start of `tokens`
fn helper_call(tokens: &[Spanned]) -> Option<(HelperCall, Range<usize>)> {
    let [(Token::Word(ns), start), (Token::Period, _), (Token::Word(func), _), (Token::LParen, _), (arg, arg_span), (Token::RParen, end), ..] =
        tokens
    else {
        return None;
    };
    if ns.quote_style.is_some() || !ns.value.eq_ignore_ascii_case(HELPER_NAMESPACE) {
        return None;
    }

    let call = start.start..end.end;
    let func = func.value.to_lowercase();
    let helper = match (func.as_str(), arg) {
        ("arg" | "narg", Token::Word(w)) => HelperCall::Named {
            name: w.value.clone(),
            nullable: func == "narg",
        },
        ("arg" | "narg", Token::SingleQuotedString(s)) => HelperCall::Named {
            name: s.clone(),
            nullable: func == "narg",
        },
        ("arg" | "narg", Token::Placeholder(p)) => HelperCall::Wrapped {
            text: p.clone(),
            span: arg_span.clone(),
            nullable: func == "narg",
        },
        ("embed", Token::Word(w)) => HelperCall::Embed { table: w.value.clone() },
        _ => return None,
    };
    Some((helper, call))
}

/// Find every parameter reference and embed call in a statement's text
pub fn scan_parameters(
    dialect: &dyn Dialect,
    engine: Engine,
    sql: &str,
) -> Result<ScannedParams, ParseError> {
    let index = LineIndex::new(sql);
    let tokens: Vec<Spanned> = Tokenizer::new(dialect, sql)
        .tokenize_with_location()
        .map_err(|e| ParseError::new(ParserError::TokenizerError(e.to_string()), 0))?
        .into_iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .map(|t| {
            let start = index.offset(t.span.start.line, t.span.start.column);
            let end = index.offset(t.span.end.line, t.span.end.column);
            (t.token, start..end)
        })
        .collect();

    let mut scanned = ScannedParams::default();
    let mut i = 0;
    while i < tokens.len() {
        if let Some((helper, call)) = helper_call(&tokens[i..]) {
            match helper {
                HelperCall::Named { name, nullable } => {
                    scanned.placeholders.push(Placeholder::named(&name, call, nullable));
                }
                HelperCall::Wrapped { text, span, nullable } => {
                    let mut placeholder = Placeholder::positional(&text, span);
                    placeholder.wrapper = Some(call);
                    placeholder.nullable = nullable;
                    scanned.placeholders.push(placeholder);
                }
                HelperCall::Embed { table } => {
                    scanned.embeds.push(EmbedCall { table, span: call });
                }
            }
            i += 6;
            continue;
        }

        let (token, span) = &tokens[i];
        match token {
            Token::Placeholder(text) => {
                let mut placeholder = Placeholder::positional(text, span.clone());
                placeholder.limit_offset = i > 0
                    && matches!(&tokens[i - 1].0, Token::Word(w) if w.keyword == Keyword::LIMIT)
                    && matches!(tokens.get(i + 1), Some((Token::Comma, _)));
                scanned.placeholders.push(placeholder);
            }
            Token::AtSign | Token::Colon if engine != Engine::MySql => {
                if let Some((Token::Word(word), next)) = tokens.get(i + 1) {
                    let adjacent = span.end == next.start && word.quote_style.is_none();
                    if adjacent && *token == Token::AtSign {
                        let call = span.start..next.end;
                        scanned.placeholders.push(Placeholder::named(&word.value, call, false));
                        i += 2;
                        continue;
                    }
                    if adjacent && engine == Engine::Sqlite {
                        let text = format!(":{}", word.value);
                        scanned
                            .placeholders
                            .push(Placeholder::positional(&text, span.start..next.end));
                        i += 2;
                        continue;
                    }
                }
            }
            Token::Word(word)
                if engine == Engine::MySql
                    && word.quote_style.is_none()
                    && word.value.starts_with('@')
                    && !word.value.starts_with("@@") =>
            {
                scanned
                    .placeholders
                    .push(Placeholder::named(&word.value[1..], span.clone(), false));
            }
            _ => {}
        }
        i += 1;
    }

    Ok(scanned)
}

/// Expression context a parameter appears in, ordered by how much it tells
/// about the parameter's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Cast,
    Comparison,
    Arithmetic,
    Concat,
    PatternMatch,
    LimitOffset,
    Between,
    InList,
    BoolAndOr,
    Target,
    OtherOperator,
    Not,
    FunctionArgument,
    HelperArgument,
    NullTest,
    Other,
    IsOperator,
    None,
}

impl ContextKind {
    pub const fn score(self) -> u8 {
        match self {
            Self::Cast | Self::Comparison => 100,
            Self::Arithmetic | Self::Concat | Self::PatternMatch | Self::LimitOffset => 90,
            Self::Between => 75,
            Self::InList => 70,
            Self::BoolAndOr | Self::Target => 60,
            Self::OtherOperator | Self::Not => 50,
            Self::FunctionArgument => 40,
            Self::HelperArgument => 30,
            Self::NullTest => 20,
            Self::Other => 10,
            Self::IsOperator | Self::None => 0,
        }
    }
}

fn binary_context(op: &BinaryOperator) -> ContextKind {
    use BinaryOperator::*;

    match op {
        Eq | NotEq | Lt | LtEq | Gt | GtEq | Spaceship => ContextKind::Comparison,
        Plus | Minus | Multiply | Divide | Modulo | MyIntegerDivide => ContextKind::Arithmetic,
        StringConcat => ContextKind::Concat,
        And | Or | Xor => ContextKind::BoolAndOr,
        PGLikeMatch | PGILikeMatch | PGNotLikeMatch | PGNotILikeMatch | PGRegexMatch
        | PGRegexIMatch | PGRegexNotMatch | PGRegexNotIMatch => ContextKind::PatternMatch,
        _ => ContextKind::OtherOperator,
    }
}

/// Helper function kind, if `func` is `sqlbind.<name>`
pub fn helper_name(func: &Function) -> Option<String> {
    match func.name.0.as_slice() {
        [ns, name] if ns.quote_style.is_none() && ns.value.eq_ignore_ascii_case(HELPER_NAMESPACE) => {
            Some(name.value.to_lowercase())
        }
        _ => None,
    }
}

/// Unnamed and named expression arguments of a function call
pub fn function_args(func: &Function) -> Vec<&Expr> {
    match &func.args {
        FunctionArguments::List(list) => list
            .args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                | FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => Some(e),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// ON / USING / NATURAL of a join, if it has one
pub fn join_constraint(op: &JoinOperator) -> Option<&JoinConstraint> {
    match op {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c) => Some(c),
        _ => None,
    }
}

/// Strip redundant parentheses
pub fn unnest(mut expr: &Expr) -> &Expr {
    while let Expr::Nested(inner) = expr {
        expr = inner;
    }
    expr
}

/// Lookup-only link from a parameter to what encloses it
#[derive(Debug, Clone, Copy)]
pub enum Parent<'a> {
    /// Operand or argument of an expression
    Expr(&'a Expr),

    /// Item of a select list or RETURNING clause
    SelectItem,

    /// Argument of a set-returning function in FROM
    TableFunctionArg,

    /// LIMIT value
    Limit,

    /// OFFSET value
    Offset,

    /// Position `index` of an INSERT VALUES row
    InsertValue {
        index: usize,
        column: Option<&'a Ident>,
    },

    /// Value of an UPDATE SET (or upsert) assignment
    Assignment(&'a Assignment),

    /// Clause root such as WHERE, HAVING, GROUP BY or ORDER BY
    Clause,

    /// Nothing encloses the reference
    None,
}

impl Parent<'_> {
    pub fn context(&self) -> ContextKind {
        match self {
            Parent::Expr(expr) => match expr {
                Expr::Cast { .. } => ContextKind::Cast,
                Expr::BinaryOp { op, .. } => binary_context(op),
                Expr::AnyOp { .. } | Expr::AllOp { .. } => ContextKind::Comparison,
                Expr::UnaryOp { op: UnaryOperator::Not, .. } => ContextKind::Not,
                Expr::UnaryOp { op: UnaryOperator::Minus | UnaryOperator::Plus, .. } => {
                    ContextKind::Arithmetic
                }
                Expr::UnaryOp { .. } => ContextKind::OtherOperator,
                Expr::Like { .. } | Expr::ILike { .. } | Expr::SimilarTo { .. } => {
                    ContextKind::PatternMatch
                }
                Expr::IsNull(_) | Expr::IsNotNull(_) => ContextKind::NullTest,
                Expr::IsDistinctFrom(..) | Expr::IsNotDistinctFrom(..) => ContextKind::IsOperator,
                Expr::Between { .. } => ContextKind::Between,
                Expr::InList { .. } | Expr::InSubquery { .. } => ContextKind::InList,
                Expr::Function(func) if helper_name(func).is_some() => ContextKind::HelperArgument,
                Expr::Function(_) => ContextKind::FunctionArgument,
                _ => ContextKind::Other,
            },
            Parent::SelectItem | Parent::Assignment(_) => ContextKind::Target,
            Parent::TableFunctionArg => ContextKind::FunctionArgument,
            Parent::Limit | Parent::Offset => ContextKind::LimitOffset,
            Parent::InsertValue { .. } | Parent::Clause => ContextKind::Other,
            Parent::None => ContextKind::None,
        }
    }
}

pub type ScopeId = usize;

/// Table written by an INSERT
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub name: &'a ObjectName,
    pub alias: Option<&'a Ident>,
}

/// Relations visible to the expressions of one SELECT or DML statement
#[derive(Debug, Clone, Default)]
pub struct Scope<'a> {
    pub parent: Option<ScopeId>,
    pub ctes: Vec<&'a Cte>,
    pub from: Vec<&'a TableWithJoins>,
    pub target: Option<Target<'a>>,
}

/// One parameter reference with its context
#[derive(Debug, Clone)]
pub struct ParamRef<'a> {
    /// Positional number; 0 until assigned for `?` style references
    pub number: usize,

    /// Byte offset in the statement text
    pub location: usize,

    /// Declared name, for named parameters
    pub name: Option<String>,

    /// Declared with `narg`
    pub nullable: bool,

    /// The parameter expression itself, when known
    pub node: Option<&'a Expr>,

    pub parent: Parent<'a>,
    pub scope: ScopeId,
}

impl ParamRef<'_> {
    pub fn score(&self) -> u8 {
        self.parent.context().score()
    }
}

/// All parameter references of a statement plus the scope arena they point into
#[derive(Debug, Clone, Default)]
pub struct ParamSet<'a> {
    pub refs: Vec<ParamRef<'a>>,
    pub scopes: Vec<Scope<'a>>,
}

/// Token scan and syntax tree disagree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("parameter {0} could not be matched to the statement text")]
    Unmatched(String),
}

/// Lookup key shared by the token scan and the tree walk
fn param_key(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Value(Value::Placeholder(p)) => Some(p.clone()),
        Expr::UnaryOp { op: UnaryOperator::PGAbs, expr } => match expr.as_ref() {
            Expr::Identifier(id) if id.quote_style.is_none() => Some(format!("@{}", id.value)),
            _ => None,
        },
        Expr::Identifier(id)
            if id.quote_style.is_none() && id.value.starts_with('@') && !id.value.starts_with("@@") =>
        {
            Some(id.value.clone())
        }
        Expr::Function(func) => match helper_name(func).as_deref() {
            Some("arg" | "narg") => match function_args(func).as_slice() {
                [Expr::Identifier(id)] => Some(format!("@{}", id.value)),
                [Expr::Value(Value::SingleQuotedString(s))] => Some(format!("@{}", s)),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// Whether `expr` is a parameter reference in any accepted surface form
pub fn is_parameter(expr: &Expr) -> bool {
    param_key(expr).is_some()
}

#[derive(Debug)]
struct Found<'a> {
    key: String,
    node: Option<&'a Expr>,
    parent: Parent<'a>,
    scope: ScopeId,
}

#[derive(Default)]
struct Walker<'a> {
    scopes: Vec<Scope<'a>>,
    found: Vec<Found<'a>>,
}

impl<'a> Walker<'a> {
    fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        self.scopes.len() - 1
    }

    fn statement(&mut self, statement: &'a Statement, scope: ScopeId) {
        match statement {
            Statement::Query(query) => {
                self.query(query, scope);
            }
            Statement::Insert(insert) => self.insert(insert, scope),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                self.scopes[scope].from.push(table);
                if let Some(from) = from {
                    self.scopes[scope].from.push(from);
                }
                self.table_with_joins(table, scope);
                for assignment in assignments {
                    self.expr(&assignment.value, Parent::Assignment(assignment), scope);
                }
                if let Some(from) = from {
                    self.table_with_joins(from, scope);
                }
                if let Some(selection) = selection {
                    self.expr(selection, Parent::Clause, scope);
                }
                if let Some(returning) = returning {
                    self.select_items(returning, scope);
                }
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                self.scopes[scope].from.extend(tables.iter());
                if let Some(using) = &delete.using {
                    self.scopes[scope].from.extend(using.iter());
                }
                for table in self.scopes[scope].from.clone() {
                    self.table_with_joins(table, scope);
                }
                if let Some(selection) = &delete.selection {
                    self.expr(selection, Parent::Clause, scope);
                }
                if let Some(returning) = &delete.returning {
                    self.select_items(returning, scope);
                }
                for order in &delete.order_by {
                    self.expr(&order.expr, Parent::Clause, scope);
                }
                if let Some(limit) = &delete.limit {
                    self.expr(limit, Parent::Limit, scope);
                }
            }
            other => self.fallback(other, scope),
        }
    }

    fn insert(&mut self, insert: &'a Insert, scope: ScopeId) {
        self.scopes[scope].target = Some(Target {
            name: &insert.table_name,
            alias: insert.table_alias.as_ref(),
        });

        if let Some(source) = &insert.source {
            match source.body.as_ref() {
                SetExpr::Values(values) if source.with.is_none() => {
                    for row in &values.rows {
                        for (index, value) in row.iter().enumerate() {
                            let parent = Parent::InsertValue {
                                index,
                                column: insert.columns.get(index),
                            };
                            self.expr(value, parent, scope);
                        }
                    }
                }
                _ => {
                    self.query(source, scope);
                }
            }
        }

        match &insert.on {
            Some(OnInsert::DuplicateKeyUpdate(assignments)) => {
                for assignment in assignments {
                    self.expr(&assignment.value, Parent::Assignment(assignment), scope);
                }
            }
            Some(OnInsert::OnConflict(conflict)) => {
                if let OnConflictAction::DoUpdate(update) = &conflict.action {
                    for assignment in &update.assignments {
                        self.expr(&assignment.value, Parent::Assignment(assignment), scope);
                    }
                    if let Some(selection) = &update.selection {
                        self.expr(selection, Parent::Clause, scope);
                    }
                }
            }
            Some(other) => self.fallback(other, scope),
            None => {}
        }

        if let Some(returning) = &insert.returning {
            self.select_items(returning, scope);
        }
    }

    /// Walk a query in its own scope nested under `outer`; returns the scope
    /// ORDER BY / LIMIT were evaluated in
    fn query(&mut self, query: &'a Query, outer: ScopeId) -> ScopeId {
        let scope = self.push_scope(Some(outer));
        if let Some(with) = &query.with {
            self.scopes[scope].ctes.extend(with.cte_tables.iter());
            for cte in &with.cte_tables {
                self.query(&cte.query, scope);
            }
        }

        let body = self.set_expr(&query.body, scope);

        if let Some(order_by) = &query.order_by {
            for order in &order_by.exprs {
                self.expr(&order.expr, Parent::Clause, body);
            }
        }
        if let Some(limit) = &query.limit {
            self.expr(limit, Parent::Limit, body);
        }
        if let Some(offset) = &query.offset {
            self.expr(&offset.value, Parent::Offset, body);
        }
        body
    }

    fn set_expr(&mut self, body: &'a SetExpr, scope: ScopeId) -> ScopeId {
        match body {
            SetExpr::Select(select) => self.select(select, scope),
            SetExpr::Query(query) => self.query(query, scope),
            SetExpr::SetOperation { left, right, .. } => {
                let left = self.set_expr(left, scope);
                self.set_expr(right, scope);
                left
            }
            SetExpr::Values(values) => {
                for row in &values.rows {
                    for value in row {
                        self.expr(value, Parent::Clause, scope);
                    }
                }
                scope
            }
            other => {
                self.fallback(other, scope);
                scope
            }
        }
    }

    fn select(&mut self, select: &'a Select, outer: ScopeId) -> ScopeId {
        let scope = self.push_scope(Some(outer));
        self.scopes[scope].from = select.from.iter().collect();

        self.select_items(&select.projection, scope);
        for table in &select.from {
            self.table_with_joins(table, scope);
        }
        if let Some(selection) = &select.selection {
            self.expr(selection, Parent::Clause, scope);
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.expr(expr, Parent::Clause, scope);
            }
        }
        if let Some(having) = &select.having {
            self.expr(having, Parent::Clause, scope);
        }
        scope
    }

    fn select_items(&mut self, items: &'a [SelectItem], scope: ScopeId) {
        for item in items {
            match item {
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.expr(expr, Parent::SelectItem, scope);
                }
                _ => {}
            }
        }
    }

    fn table_with_joins(&mut self, table: &'a TableWithJoins, scope: ScopeId) {
        self.table_factor(&table.relation, scope);
        for join in &table.joins {
            self.table_factor(&join.relation, scope);
            if let Some(JoinConstraint::On(on)) = join_constraint(&join.join_operator) {
                self.expr(on, Parent::Clause, scope);
            }
        }
    }

    fn table_factor(&mut self, factor: &'a TableFactor, scope: ScopeId) {
        match factor {
            TableFactor::Derived { subquery, .. } => {
                self.query(subquery, scope);
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.table_with_joins(table_with_joins, scope);
            }
            TableFactor::Table { args: Some(args), .. } => {
                for arg in &args.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                        | FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => {
                            self.expr(e, Parent::TableFunctionArg, scope);
                        }
                        other => self.fallback(other, scope),
                    }
                }
            }
            TableFactor::Table { .. } => {}
            other => self.fallback(other, scope),
        }
    }

    fn expr(&mut self, expr: &'a Expr, parent: Parent<'a>, scope: ScopeId) {
        if let Some(key) = param_key(expr) {
            self.found.push(Found {
                key,
                node: Some(expr),
                parent,
                scope,
            });
            return;
        }

        let here = Parent::Expr(expr);
        match expr {
            Expr::Nested(inner) => self.expr(inner, parent, scope),
            Expr::BinaryOp { left, right, .. }
            | Expr::AnyOp { left, right, .. }
            | Expr::AllOp { left, right, .. }
            | Expr::IsDistinctFrom(left, right)
            | Expr::IsNotDistinctFrom(left, right) => {
                self.expr(left, here, scope);
                self.expr(right, here, scope);
            }
            Expr::UnaryOp { expr: inner, .. }
            | Expr::Cast { expr: inner, .. }
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsNotTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::IsNotFalse(inner) => self.expr(inner, here, scope),
            Expr::Between { expr: inner, low, high, .. } => {
                self.expr(inner, here, scope);
                self.expr(low, here, scope);
                self.expr(high, here, scope);
            }
            Expr::InList { expr: inner, list, .. } => {
                self.expr(inner, here, scope);
                for item in list {
                    self.expr(item, here, scope);
                }
            }
            Expr::InSubquery { expr: inner, subquery, .. } => {
                self.expr(inner, here, scope);
                self.query(subquery, scope);
            }
            Expr::Like { expr: inner, pattern, .. }
            | Expr::ILike { expr: inner, pattern, .. }
            | Expr::SimilarTo { expr: inner, pattern, .. } => {
                self.expr(inner, here, scope);
                self.expr(pattern, here, scope);
            }
            Expr::Function(func) => {
                match &func.args {
                    FunctionArguments::Subquery(query) => {
                        self.query(query, scope);
                    }
                    _ => {
                        for arg in function_args(func) {
                            self.expr(arg, here, scope);
                        }
                    }
                }
                if let Some(filter) = &func.filter {
                    self.expr(filter, Parent::Clause, scope);
                }
                if let Some(over) = &func.over {
                    self.fallback(over, scope);
                }
            }
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                if let Some(operand) = operand {
                    self.expr(operand, here, scope);
                }
                for (condition, result) in conditions.iter().zip(results) {
                    self.expr(condition, here, scope);
                    self.expr(result, here, scope);
                }
                if let Some(else_result) = else_result {
                    self.expr(else_result, here, scope);
                }
            }
            Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
                self.query(query, scope);
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.expr(item, here, scope);
                }
            }
            Expr::Identifier(_)
            | Expr::CompoundIdentifier(_)
            | Expr::Value(_)
            | Expr::TypedString { .. } => {}
            other => self.fallback(other, scope),
        }
    }

    /// Collect parameters below a node the walker does not model
    fn fallback<V: Visit>(&mut self, node: &V, scope: ScopeId) {
        let found = &mut self.found;
        let _ = visit_expressions(node, |expr| {
            if let Some(key) = param_key(expr) {
                found.push(Found {
                    key,
                    node: None,
                    parent: Parent::Clause,
                    scope,
                });
            }
            ControlFlow::<()>::Continue(())
        });
    }
}

/// Join the token scan with the syntax tree
///
/// The returned references are in source order.
pub fn find_parameters<'a>(
    statement: &'a Statement,
    placeholders: &[Placeholder],
) -> Result<ParamSet<'a>, ParamError> {
    let mut walker = Walker::default();
    let root = walker.push_scope(None);
    walker.statement(statement, root);

    let mut lexical: HashMap<&str, VecDeque<&Placeholder>> = HashMap::new();
    for placeholder in placeholders {
        lexical
            .entry(placeholder.text.as_str())
            .or_default()
            .push_back(placeholder);
    }

    let mut refs = Vec::with_capacity(walker.found.len());
    let mut found = walker.found.into_iter().peekable();
    while let Some(current) = found.next() {
        let placeholder = take(&mut lexical, &current.key)?;

        if matches!(current.parent, Parent::Limit) && placeholder.limit_offset {
            let offset = found.next_if(|next| {
                matches!(next.parent, Parent::Offset) && next.key == current.key
            });
            if let Some(offset) = offset {
                let count = take(&mut lexical, &offset.key)?;
                refs.push(param_ref(offset, placeholder));
                refs.push(param_ref(current, count));
                continue;
            }
        }
        refs.push(param_ref(current, placeholder));
    }

    if let Some(left) = lexical.values().find_map(|queue| queue.front()) {
        return Err(ParamError::Unmatched(left.text.clone()));
    }

    refs.sort_by_key(|r| r.location);
    Ok(ParamSet {
        refs,
        scopes: walker.scopes,
    })
}

fn take<'p>(
    lexical: &mut HashMap<&'p str, VecDeque<&'p Placeholder>>,
    key: &str,
) -> Result<&'p Placeholder, ParamError> {
    lexical
        .get_mut(key)
        .and_then(VecDeque::pop_front)
        .ok_or_else(|| ParamError::Unmatched(key.to_string()))
}

fn param_ref<'a>(found: Found<'a>, placeholder: &Placeholder) -> ParamRef<'a> {
    ParamRef {
        number: placeholder.number,
        location: placeholder.span.start,
        name: placeholder.name().map(str::to_string),
        nullable: placeholder.nullable,
        node: found.node,
        parent: found.parent,
        scope: found.scope,
    }
}

/// One representative reference per parameter number
///
/// For each number the reference with the highest context score wins; on a
/// tie the earliest reference is kept. Without `$N` numbering, references
/// numbered 0 receive the lowest unused numbers in source order. The result
/// is ordered by number for `$N` style and by location otherwise.
pub fn unique_param_refs<'a>(refs: Vec<ParamRef<'a>>, dollar: bool) -> Vec<ParamRef<'a>> {
    let mut best: BTreeMap<usize, ParamRef<'a>> = BTreeMap::new();
    let mut unnumbered = Vec::new();

    for param in refs {
        if param.number == 0 {
            unnumbered.push(param);
            continue;
        }
        match best.get(&param.number) {
            Some(current) if current.score() >= param.score() => {}
            _ => {
                best.insert(param.number, param);
            }
        }
    }

    let mut used: BTreeSet<usize> = best.keys().copied().collect();
    let mut out: Vec<ParamRef<'a>> = best.into_values().collect();

    if !dollar {
        let mut next = 1;
        for mut param in unnumbered {
            while used.contains(&next) {
                next += 1;
            }
            param.number = next;
            used.insert(next);
            out.push(param);
        }
    }

    if dollar {
        out.sort_by_key(|p| p.number);
    } else {
        out.sort_by_key(|p| p.location);
    }
    out
}
