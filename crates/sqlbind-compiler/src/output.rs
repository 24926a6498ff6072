//! Output column inference
//!
//! Determines the columns a statement produces without executing it: the
//! FROM clause is resolved against the catalog into an [`Env`], then every
//! select item (or RETURNING item) is typed from its expression.

use sqlbind_catalog::{column_type, ident_name, named_type, Catalog, CatalogError};
use sqlbind_core::{Column, LogicalType, Nullability};
use sqlbind_sql::params::{function_args, helper_name, is_parameter, join_constraint};
use sqlparser::ast::{
    BinaryOperator, Cte, DataType, Delete, Expr, FromTable, Function, Ident, Insert,
    JoinConstraint, JoinOperator, ObjectName, Query, Select, SelectItem, SetExpr, Statement,
    TableAlias, TableFactor, TableWithJoins, UnaryOperator, Value, With,
};

use crate::scope::{Env, Relation, ResolveError};

/// Resolves relations and expression types against a catalog
pub struct Resolver<'c> {
    catalog: &'c Catalog,
}

impl<'c> Resolver<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    /// Columns produced by `statement`; empty for statements that return no rows
    pub fn output_columns(&self, statement: &Statement) -> Result<Vec<Column>, ResolveError> {
        match statement {
            Statement::Query(query) => self.query(query, &Env::new()),
            Statement::Insert(Insert {
                returning: Some(items),
                ..
            })
            | Statement::Update {
                returning: Some(items),
                ..
            }
            | Statement::Delete(Delete {
                returning: Some(items),
                ..
            }) => {
                let env = self.statement_env(statement)?;
                self.select_items(items, &env)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Scope of the top-level select list or RETURNING clause of `statement`
    pub fn statement_env(&self, statement: &Statement) -> Result<Env, ResolveError> {
        let mut env = Env::new().child();
        match statement {
            Statement::Query(query) => return self.query_env(query, &Env::new()),
            Statement::Insert(insert) => {
                env.add_relation(self.target_relation(&insert.table_name, insert.table_alias.as_ref())?);
            }
            Statement::Update { table, from, .. } => {
                self.add_table_with_joins(&mut env, table)?;
                if let Some(from) = from {
                    self.add_table_with_joins(&mut env, from)?;
                }
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                self.add_from(&mut env, tables)?;
                if let Some(using) = &delete.using {
                    self.add_from(&mut env, using)?;
                }
            }
            _ => {}
        }
        Ok(env)
    }

    fn query_env(&self, query: &Query, outer: &Env) -> Result<Env, ResolveError> {
        let env = self.with_ctes(query.with.as_ref(), outer)?;
        self.set_expr_env(&query.body, &env)
    }

    fn set_expr_env(&self, body: &SetExpr, env: &Env) -> Result<Env, ResolveError> {
        match body {
            SetExpr::Select(select) => self.select_env(select, env),
            SetExpr::Query(query) => self.query_env(query, env),
            SetExpr::SetOperation { left, .. } => self.set_expr_env(left, env),
            _ => Ok(env.clone()),
        }
    }

    /// The table written by an INSERT, as a relation
    pub fn target_relation(
        &self,
        name: &ObjectName,
        alias: Option<&Ident>,
    ) -> Result<Relation, ResolveError> {
        let table = self.catalog.resolve_table(name).map_err(relation_error)?;
        Ok(Relation {
            name: alias.map(ident_name).unwrap_or_else(|| table.id.name.clone()),
            table: Some(table.id.clone()),
            aliased: alias.is_some(),
            columns: table.columns.clone(),
            nullable: false,
        })
    }

    /// Output columns of a query nested in `outer`
    pub fn query(&self, query: &Query, outer: &Env) -> Result<Vec<Column>, ResolveError> {
        let env = self.with_ctes(query.with.as_ref(), outer)?;
        self.set_expr(&query.body, &env)
    }

    /// A child scope of `outer` holding the CTEs of `with`
    pub fn with_ctes(&self, with: Option<&With>, outer: &Env) -> Result<Env, ResolveError> {
        let mut env = outer.child();
        if let Some(with) = with {
            for cte in &with.cte_tables {
                self.add_cte(&mut env, cte)?;
            }
        }
        Ok(env)
    }

    pub fn add_cte(&self, env: &mut Env, cte: &Cte) -> Result<(), ResolveError> {
        let mut columns = self.query(&cte.query, env)?;
        rename_columns(&mut columns, &cte.alias);
        env.add_cte(ident_name(&cte.alias.name), columns);
        Ok(())
    }

    fn set_expr(&self, body: &SetExpr, env: &Env) -> Result<Vec<Column>, ResolveError> {
        match body {
            SetExpr::Select(select) => {
                let env = self.select_env(select, env)?;
                self.select_items(&select.projection, &env)
            }
            SetExpr::Query(query) => self.query(query, env),
            // Set operations take their shape from the left branch
            SetExpr::SetOperation { left, .. } => self.set_expr(left, env),
            SetExpr::Values(values) => match values.rows.first() {
                Some(row) => row
                    .iter()
                    .enumerate()
                    .map(|(i, expr)| {
                        let mut column = self.expr_column(expr, env)?;
                        column.name = format!("column{}", i + 1);
                        Ok(column)
                    })
                    .collect(),
                None => Ok(Vec::new()),
            },
            SetExpr::Insert(statement) | SetExpr::Update(statement) => {
                self.output_columns(statement)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Scope of a SELECT: `env` plus the relations of its FROM clause
    pub fn select_env(&self, select: &Select, env: &Env) -> Result<Env, ResolveError> {
        let mut env = env.child();
        self.add_from(&mut env, &select.from)?;
        Ok(env)
    }

    pub fn add_from(&self, env: &mut Env, from: &[TableWithJoins]) -> Result<(), ResolveError> {
        for table in from {
            self.add_table_with_joins(env, table)?;
        }
        Ok(())
    }

    pub fn add_table_with_joins(&self, env: &mut Env, table: &TableWithJoins) -> Result<(), ResolveError> {
        let start = env.relation_count();
        self.add_table_factor(env, &table.relation)?;

        for join in &table.joins {
            let before = env.relation_count();
            self.add_table_factor(env, &join.relation)?;
            let after = env.relation_count();

            match &join.join_operator {
                JoinOperator::LeftOuter(_) => env.make_nullable(before..after),
                JoinOperator::RightOuter(_) => env.make_nullable(start..before),
                JoinOperator::FullOuter(_) => env.make_nullable(start..after),
                _ => {}
            }

            match join_constraint(&join.join_operator) {
                Some(JoinConstraint::Using(columns)) => {
                    for column in columns {
                        env.add_using(using_column(column));
                    }
                }
                Some(JoinConstraint::Natural) => {
                    let shared: Vec<String> = env.relations()[before..after]
                        .iter()
                        .flat_map(|r| r.columns.iter().map(|c| c.name.clone()))
                        .filter(|name| {
                            env.relations()[start..before]
                                .iter()
                                .any(|r| r.columns.iter().any(|c| &c.name == name))
                        })
                        .collect();
                    for name in shared {
                        env.add_using(name);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn add_table_factor(&self, env: &mut Env, factor: &TableFactor) -> Result<(), ResolveError> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                if args.is_some() {
                    // Set-returning function such as generate_series(...)
                    let function = name.0.last().map(ident_name).unwrap_or_default();
                    let column_name = alias
                        .as_ref()
                        .map(|a| ident_name(&a.name))
                        .unwrap_or_else(|| function.clone());
                    let mut relation = Relation::new(column_name.clone(), vec![Column::any(column_name)]);
                    if let Some(alias) = alias {
                        rename_columns(&mut relation.columns, alias);
                    }
                    env.add_relation(relation);
                    return Ok(());
                }
                let relation = self.table_relation(name, alias.as_ref(), env)?;
                env.add_relation(relation);
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let mut columns = self.query(subquery, env)?;
                let name = match alias {
                    Some(alias) => {
                        rename_columns(&mut columns, alias);
                        ident_name(&alias.name)
                    }
                    None => String::new(),
                };
                let mut relation = Relation::new(name, columns);
                relation.aliased = alias.is_some();
                env.add_relation(relation);
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.add_table_with_joins(env, table_with_joins)?,
            TableFactor::UNNEST { alias, .. } | TableFactor::Function { alias, .. } => {
                let name = alias.as_ref().map(|a| ident_name(&a.name)).unwrap_or_default();
                env.add_relation(Relation::new(name.clone(), vec![Column::any(name)]));
            }
            _ => {}
        }
        Ok(())
    }

    /// A table reference: a CTE when one is in scope, otherwise a catalog table
    fn table_relation(
        &self,
        name: &ObjectName,
        alias: Option<&TableAlias>,
        env: &Env,
    ) -> Result<Relation, ResolveError> {
        if let [single] = name.0.as_slice() {
            let cte_name = ident_name(single);
            if let Some(columns) = env.cte(&cte_name) {
                let mut relation = Relation::new(cte_name, columns.to_vec());
                if let Some(alias) = alias {
                    relation.name = ident_name(&alias.name);
                    relation.aliased = true;
                    rename_columns(&mut relation.columns, alias);
                }
                return Ok(relation);
            }
        }

        let mut relation = self.target_relation(name, alias.map(|a| &a.name))?;
        if let Some(alias) = alias {
            rename_columns(&mut relation.columns, alias);
        }
        Ok(relation)
    }

    /// Columns of a select list or RETURNING clause
    pub fn select_items(&self, items: &[SelectItem], env: &Env) -> Result<Vec<Column>, ResolveError> {
        let mut columns = Vec::new();
        for item in items {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    if let Some(embed) = self.embed_column(expr, env)? {
                        columns.push(embed);
                        continue;
                    }
                    let mut column = self.expr_column(expr, env)?;
                    column.name = output_name(expr);
                    columns.push(column);
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    let mut column = self.expr_column(expr, env)?;
                    column.name = ident_name(alias);
                    columns.push(column);
                }
                SelectItem::Wildcard(_) => {
                    for relation in env.relations() {
                        columns.extend(relation.all_columns());
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let relation_name = name.0.last().map(ident_name).unwrap_or_default();
                    let relation = env
                        .relation(&relation_name)
                        .ok_or(ResolveError::RelationNotFound(relation_name))?;
                    columns.extend(relation.all_columns());
                }
            }
        }
        Ok(columns)
    }

    /// `sqlbind.embed(t)`: one column standing for the whole of `t`
    fn embed_column(&self, expr: &Expr, env: &Env) -> Result<Option<Column>, ResolveError> {
        let Expr::Function(func) = expr else {
            return Ok(None);
        };
        if helper_name(func).as_deref() != Some("embed") {
            return Ok(None);
        }

        let name = match function_args(func).as_slice() {
            [Expr::Identifier(ident)] => ident_name(ident),
            _ => return Err(ResolveError::InvalidReference(func.to_string())),
        };
        let relation = env
            .relation(&name)
            .ok_or_else(|| ResolveError::RelationNotFound(name.clone()))?;
        let table = relation
            .table
            .clone()
            .ok_or_else(|| ResolveError::InvalidReference(format!("sqlbind.embed({}) must name a table", name)))?;

        let mut column = Column::new(name, table.name.clone())
            .with_nullability(Nullability::from_not_null(!relation.nullable));
        column.embed_table = Some(table);
        Ok(Some(column))
    }

    /// Type, nullability and origin of an expression
    ///
    /// The returned column keeps the name of the column it reads, if any.
    pub fn expr_column(&self, expr: &Expr, env: &Env) -> Result<Column, ResolveError> {
        if is_parameter(expr) {
            return Ok(Column::any(""));
        }

        match expr {
            Expr::Identifier(ident) => env.column(&[ident_name(ident)]),
            Expr::CompoundIdentifier(idents) => {
                let parts: Vec<String> = idents.iter().map(ident_name).collect();
                env.column(&parts)
            }
            Expr::Nested(inner) => self.expr_column(inner, env),
            Expr::Value(value) => Ok(literal(value)),
            Expr::TypedString { data_type, .. } => {
                Ok(self.data_type_column(data_type).with_nullability(Nullability::No))
            }
            Expr::Cast { expr, data_type, .. } => {
                let inner = self.expr_column(expr, env)?;
                Ok(self.data_type_column(data_type).with_nullability(inner.nullable))
            }
            Expr::BinaryOp { left, op, right } => self.binary_op(left, op, right, env),
            Expr::UnaryOp { op, expr } => {
                let inner = self.expr_column(expr, env)?;
                match op {
                    UnaryOperator::Not => Ok(typed("boolean").with_nullability(inner.nullable)),
                    _ => Ok(derived(inner)),
                }
            }
            Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::IsTrue(inner)
            | Expr::IsNotTrue(inner)
            | Expr::IsFalse(inner)
            | Expr::IsNotFalse(inner) => {
                self.expr_column(inner, env)?;
                Ok(typed("boolean").with_nullability(Nullability::No))
            }
            Expr::IsDistinctFrom(left, right) | Expr::IsNotDistinctFrom(left, right) => {
                self.expr_column(left, env)?;
                self.expr_column(right, env)?;
                Ok(typed("boolean").with_nullability(Nullability::No))
            }
            Expr::Exists { subquery, .. } => {
                self.query(subquery, env)?;
                Ok(typed("boolean").with_nullability(Nullability::No))
            }
            Expr::InSubquery { expr, subquery, .. } => {
                let inner = self.expr_column(expr, env)?;
                self.query(subquery, env)?;
                Ok(typed("boolean").with_nullability(inner.nullable))
            }
            Expr::InList { expr, list, .. } => {
                let inner = self.expr_column(expr, env)?;
                for item in list {
                    self.expr_column(item, env)?;
                }
                Ok(typed("boolean").with_nullability(inner.nullable))
            }
            Expr::Between { expr, low, high, .. } => {
                let inner = self.expr_column(expr, env)?;
                self.expr_column(low, env)?;
                self.expr_column(high, env)?;
                Ok(typed("boolean").with_nullability(inner.nullable))
            }
            Expr::Like { expr, pattern, .. }
            | Expr::ILike { expr, pattern, .. }
            | Expr::SimilarTo { expr, pattern, .. } => {
                let inner = self.expr_column(expr, env)?;
                self.expr_column(pattern, env)?;
                Ok(typed("boolean").with_nullability(inner.nullable))
            }
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                let inner = self.expr_column(left, env)?;
                self.expr_column(right, env)?;
                Ok(typed("boolean").with_nullability(inner.nullable))
            }
            Expr::Function(func) => self.function(func, env),
            Expr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => {
                if let Some(operand) = operand {
                    self.expr_column(operand, env)?;
                }
                for condition in conditions {
                    self.expr_column(condition, env)?;
                }
                let mut branches = results
                    .iter()
                    .map(|r| self.expr_column(r, env))
                    .collect::<Result<Vec<_>, _>>()?;
                match else_result {
                    Some(else_result) => branches.push(self.expr_column(else_result, env)?),
                    None => branches.push(Column::any("").with_nullability(Nullability::Yes)),
                }
                Ok(merge_branches(branches))
            }
            Expr::Subquery(query) => {
                let columns = self.query(query, env)?;
                Ok(columns
                    .into_iter()
                    .next()
                    .map(|c| c.with_nullability(Nullability::Yes))
                    .unwrap_or_else(|| Column::any("")))
            }
            Expr::Substring { .. } | Expr::Trim { .. } | Expr::Overlay { .. } => Ok(typed("text")),
            Expr::Position { .. } => Ok(typed("integer")),
            Expr::Extract { .. } => Ok(typed("numeric")),
            _ => Ok(Column::any("")),
        }
    }

    fn binary_op(
        &self,
        left: &Expr,
        op: &BinaryOperator,
        right: &Expr,
        env: &Env,
    ) -> Result<Column, ResolveError> {
        let left = self.expr_column(left, env)?;
        let right = self.expr_column(right, env)?;
        let nullable = combine_nullability(left.nullable, right.nullable);

        let column = match op {
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
            | BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Xor
            | BinaryOperator::PGRegexMatch
            | BinaryOperator::PGRegexIMatch
            | BinaryOperator::PGRegexNotMatch
            | BinaryOperator::PGRegexNotIMatch => typed("boolean"),
            BinaryOperator::StringConcat => typed("text"),
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => {
                if left.data_type == "any" {
                    derived(right)
                } else {
                    derived(left)
                }
            }
            _ => Column::any(""),
        };
        Ok(column.with_nullability(nullable))
    }

    fn function(&self, func: &Function, env: &Env) -> Result<Column, ResolveError> {
        let name = func
            .name
            .0
            .last()
            .map(|i| i.value.to_lowercase())
            .unwrap_or_default();
        let args = function_args(func)
            .into_iter()
            .map(|arg| self.expr_column(arg, env))
            .collect::<Result<Vec<_>, _>>()?;
        let first = args.first().cloned().map(derived).unwrap_or_else(|| Column::any(""));
        let all_not_null = args.iter().all(Column::is_not_null);

        let column = match name.as_str() {
            "count" => typed("bigint").with_nullability(Nullability::No),
            "sum" | "min" | "max" => first.with_nullability(Nullability::Yes),
            "avg" => typed("numeric").with_nullability(Nullability::Yes),
            "coalesce" | "ifnull" => {
                let not_null = args.iter().any(Column::is_not_null);
                first.with_nullability(Nullability::from_not_null(not_null))
            }
            "nullif" => first.with_nullability(Nullability::Yes),
            "greatest" | "least" | "abs" | "round" | "ceil" | "ceiling" | "floor" => {
                first.with_nullability(Nullability::from_not_null(all_not_null))
            }
            "concat" | "concat_ws" => typed("text").with_nullability(Nullability::No),
            "lower" | "upper" | "trim" | "ltrim" | "rtrim" | "btrim" | "replace" | "substr"
            | "substring" | "left" | "right" | "lpad" | "rpad" | "initcap" | "reverse"
            | "repeat" | "md5" | "format" | "to_char" => {
                typed("text").with_nullability(Nullability::from_not_null(all_not_null))
            }
            "string_agg" | "group_concat" => typed("text").with_nullability(Nullability::Yes),
            "length" | "char_length" | "character_length" | "octet_length" | "strpos" => {
                typed("integer").with_nullability(Nullability::from_not_null(all_not_null))
            }
            "now" | "current_timestamp" | "transaction_timestamp" | "statement_timestamp"
            | "clock_timestamp" => typed("timestamptz").with_nullability(Nullability::No),
            "localtimestamp" => typed("timestamp").with_nullability(Nullability::No),
            "current_date" => typed("date").with_nullability(Nullability::No),
            "current_time" => typed("timetz").with_nullability(Nullability::No),
            "random" => typed("double precision").with_nullability(Nullability::No),
            "array_agg" => first.with_array(true).with_nullability(Nullability::Yes),
            "json_agg" | "json_build_object" | "json_build_array" | "to_json" => {
                typed("json").with_nullability(Nullability::Unknown)
            }
            "jsonb_agg" | "jsonb_build_object" | "jsonb_build_array" | "to_jsonb" => {
                typed("jsonb").with_nullability(Nullability::Unknown)
            }
            _ => Column::any(""),
        };
        Ok(column)
    }

    /// Catalog column type for a DDL data type, resolving enum names
    pub fn data_type_column(&self, data_type: &DataType) -> Column {
        let ty = column_type(data_type);
        let logical = match (&ty.logical, self.catalog.find_enum(&ty.name)) {
            (LogicalType::Unknown, Some(e)) => LogicalType::Enum {
                name: e.name.clone(),
            },
            (logical, _) => logical.clone(),
        };
        Column::new("", ty.name)
            .with_logical_type(logical)
            .with_array(ty.is_array)
    }
}

fn relation_error(error: CatalogError) -> ResolveError {
    match error {
        CatalogError::TableNotFound(id) => ResolveError::RelationNotFound(id.name),
        other => ResolveError::InvalidReference(other.to_string()),
    }
}

/// Column of a canonical type name
pub(crate) fn typed(type_name: &str) -> Column {
    let ty = named_type(type_name);
    Column::new("", ty.name).with_logical_type(ty.logical)
}

/// Strip the origin of a column whose value was computed from it
pub(crate) fn derived(mut column: Column) -> Column {
    column.name = String::new();
    column.table = None;
    column.table_alias = None;
    column.embed_table = None;
    column.comment = None;
    column
}

fn literal(value: &Value) -> Column {
    let column = match value {
        Value::Number(n, _) if n.contains(['.', 'e', 'E']) => typed("numeric"),
        Value::Number(..) => typed("integer"),
        Value::Boolean(_) => typed("boolean"),
        Value::Null => return Column::any("").with_nullability(Nullability::Yes),
        Value::Placeholder(_) => return Column::any(""),
        _ => typed("text"),
    };
    column.with_nullability(Nullability::No)
}

fn combine_nullability(left: Nullability, right: Nullability) -> Nullability {
    match (left, right) {
        (Nullability::No, Nullability::No) => Nullability::No,
        (Nullability::Yes, _) | (_, Nullability::Yes) => Nullability::Yes,
        _ => Nullability::Unknown,
    }
}

fn merge_branches(branches: Vec<Column>) -> Column {
    let nullable = branches
        .iter()
        .map(|c| c.nullable)
        .reduce(combine_nullability)
        .unwrap_or(Nullability::Unknown);
    branches
        .into_iter()
        .find(|c| c.data_type != "any")
        .map(derived)
        .unwrap_or_else(|| Column::any(""))
        .with_nullability(nullable)
}

/// Name of an unaliased select item
fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident_name(ident),
        Expr::CompoundIdentifier(idents) => idents.last().map(ident_name).unwrap_or_default(),
        Expr::Nested(inner) | Expr::Cast { expr: inner, .. } => output_name(inner),
        Expr::Function(func) => func
            .name
            .0
            .last()
            .map(|i| i.value.to_lowercase())
            .unwrap_or_default(),
        Expr::Exists { .. } => "exists".to_string(),
        Expr::Case { .. } => "case".to_string(),
        _ => String::new(),
    }
}

/// Apply `AS alias (a, b, ...)` column renames
fn rename_columns(columns: &mut [Column], alias: &TableAlias) {
    for (column, rename) in columns.iter_mut().zip(&alias.columns) {
        column.name = ident_name(&rename.name);
    }
}

fn using_column(column: &impl std::fmt::Display) -> String {
    let text = column.to_string();
    let last = text.rsplit('.').next().unwrap_or(&text);
    match last.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(quoted) => quoted.to_string(),
        None => last.trim_matches('`').to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbind_sql::{SqlEngine, SqlParser};

    fn catalog() -> Catalog {
        let parser = SqlParser::postgres();
        let mut catalog = Catalog::new("public");
        let ddl = "
            CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL, bio TEXT);
            CREATE TABLE books (id SERIAL PRIMARY KEY, author_id BIGINT NOT NULL, title TEXT NOT NULL, price NUMERIC(10, 2));
        ";
        for parsed in parser.parse(ddl).unwrap() {
            catalog.apply_statement(&parsed.statement, false).unwrap();
        }
        catalog
    }

    fn output(sql: &str) -> Result<Vec<Column>, ResolveError> {
        let catalog = catalog();
        let statement = SqlParser::postgres().parse(sql).unwrap().remove(0).statement;
        Resolver::new(&catalog).output_columns(&statement)
    }

    fn summary(columns: &[Column]) -> Vec<(String, String, Nullability)> {
        columns
            .iter()
            .map(|c| (c.name.clone(), c.data_type.clone(), c.nullable))
            .collect()
    }

    fn col(name: &str, ty: &str, nullable: Nullability) -> (String, String, Nullability) {
        (name.to_string(), ty.to_string(), nullable)
    }

    #[test]
    fn plain_columns_and_aliases() {
        let columns = output("SELECT id, name AS author, bio FROM authors").unwrap();
        assert_eq!(
            summary(&columns),
            vec![
                col("id", "bigint", Nullability::No),
                col("author", "text", Nullability::No),
                col("bio", "text", Nullability::Yes),
            ]
        );
        assert!(columns[0].table.is_some());
    }

    #[test]
    fn star_expansion() {
        let columns = output("SELECT * FROM authors").unwrap();
        assert_eq!(columns.len(), 3);

        let columns = output("SELECT b.*, a.name FROM books b JOIN authors a ON a.id = b.author_id").unwrap();
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].table_alias.as_deref(), Some("b"));
    }

    #[test]
    fn left_join_side_is_nullable() {
        let columns =
            output("SELECT a.name, b.title FROM authors a LEFT JOIN books b ON b.author_id = a.id").unwrap();
        assert_eq!(columns[0].nullable, Nullability::No);
        assert_eq!(columns[1].nullable, Nullability::Yes);

        let columns =
            output("SELECT a.name, b.title FROM authors a RIGHT JOIN books b ON b.author_id = a.id").unwrap();
        assert_eq!(columns[0].nullable, Nullability::Yes);
        assert_eq!(columns[1].nullable, Nullability::No);
    }

    #[test]
    fn functions_and_operators() {
        let columns = output(
            "SELECT count(*), max(price), lower(name), price * 2, now(), authors.id = 1 AS is_first FROM authors JOIN books ON books.author_id = authors.id",
        )
        .unwrap();
        assert_eq!(
            summary(&columns),
            vec![
                col("count", "bigint", Nullability::No),
                col("max", "numeric", Nullability::Yes),
                col("lower", "text", Nullability::No),
                col("", "numeric", Nullability::Yes),
                col("now", "timestamptz", Nullability::No),
                col("is_first", "boolean", Nullability::No),
            ]
        );
    }

    #[test]
    fn unknown_references_fail() {
        assert_eq!(
            output("SELECT id FROM missing"),
            Err(ResolveError::RelationNotFound("missing".to_string()))
        );
        assert_eq!(
            output("SELECT nope FROM authors"),
            Err(ResolveError::ColumnNotFound("nope".to_string()))
        );
        assert_eq!(
            output("SELECT id FROM authors JOIN books ON true"),
            Err(ResolveError::AmbiguousColumn("id".to_string()))
        );
    }

    #[test]
    fn ctes_derived_tables_and_set_operations() {
        let columns = output(
            "WITH prolific AS (SELECT author_id, count(*) AS n FROM books GROUP BY author_id) SELECT author_id, n FROM prolific",
        )
        .unwrap();
        assert_eq!(
            summary(&columns),
            vec![col("author_id", "bigint", Nullability::No), col("n", "bigint", Nullability::No)]
        );

        let columns = output("SELECT t.x FROM (SELECT name AS x FROM authors) AS t").unwrap();
        assert_eq!(summary(&columns), vec![col("x", "text", Nullability::No)]);

        let columns = output("SELECT name FROM authors UNION SELECT title FROM books").unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "name");
    }

    #[test]
    fn case_and_subqueries() {
        let columns = output(
            "SELECT CASE WHEN bio IS NULL THEN 'none' ELSE bio END AS about, (SELECT count(*) FROM books) AS total, EXISTS (SELECT 1 FROM books) FROM authors",
        )
        .unwrap();
        assert_eq!(
            summary(&columns),
            vec![
                col("about", "text", Nullability::Yes),
                col("total", "bigint", Nullability::Yes),
                col("exists", "boolean", Nullability::No),
            ]
        );
    }

    #[test]
    fn returning_clause() {
        let columns = output("INSERT INTO authors (name) VALUES ('x') RETURNING id, name").unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].data_type, "bigint");

        let columns = output("DELETE FROM books WHERE id = 1 RETURNING *").unwrap();
        assert_eq!(columns.len(), 4);

        assert!(output("UPDATE books SET title = 'x'").unwrap().is_empty());
    }

    #[test]
    fn embed_column_carries_table() {
        let columns =
            output("SELECT sqlbind.embed(authors), books.title FROM authors JOIN books ON books.author_id = authors.id")
                .unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "authors");
        assert_eq!(
            columns[0].embed_table.as_ref().map(|t| t.name.as_str()),
            Some("authors")
        );
    }

    #[test]
    fn casts_keep_nullability() {
        let columns = output("SELECT bio::varchar, CAST(id AS text) AS id_text FROM authors").unwrap();
        assert_eq!(
            summary(&columns),
            vec![col("bio", "varchar", Nullability::Yes), col("id_text", "text", Nullability::No)]
        );
    }
}
