//! Parameter type binding
//!
//! Each representative parameter reference is typed from the expression that
//! encloses it: the other side of a comparison, the tested value of BETWEEN
//! or IN, a cast, the target column of an INSERT or assignment.

use sqlbind_catalog::ident_name;
use sqlbind_core::{Column, Nullability};
use sqlbind_sql::params::unnest;
use sqlbind_sql::validate::insert_values;
use sqlbind_sql::{NamedParams, ParamRef, ParamSet, Parent, Scope, ScopeId};
use sqlparser::ast::{
    Assignment, AssignmentTarget, BinaryOperator, Expr, Ident, Insert, UnaryOperator,
};

use crate::output::{derived, typed, Resolver};
use crate::query::Parameter;
use crate::scope::{Env, Relation, ResolveError};

impl Resolver<'_> {
    /// Bind every representative reference, in the order given
    pub fn bind_parameters(
        &self,
        set: &ParamSet<'_>,
        refs: &[ParamRef<'_>],
        named: &NamedParams,
    ) -> Result<Vec<Parameter>, ResolveError> {
        refs.iter()
            .map(|param| {
                let env = self.scope_env(&set.scopes, param.scope)?;
                let mut column = self.param_column(param, &set.scopes[param.scope], &env)?;

                let name = named
                    .get(param.number)
                    .map(|p| p.name.clone())
                    .or_else(|| param.name.clone());
                if let Some(name) = name {
                    column.name = name;
                    column.is_named_param = true;
                }
                let nullable = param.nullable || named.is_nullable(param.number);
                column.nullable = Nullability::from_not_null(!nullable);

                Ok(Parameter {
                    number: param.number,
                    column,
                })
            })
            .collect()
    }

    /// Relations visible from scope `id`
    ///
    /// The INSERT target is only visible to expressions of the INSERT itself,
    /// not to a SELECT feeding it.
    pub fn scope_env(&self, scopes: &[Scope<'_>], id: ScopeId) -> Result<Env, ResolveError> {
        self.scope_env_at(scopes, id, true)
    }

    fn scope_env_at(&self, scopes: &[Scope<'_>], id: ScopeId, leaf: bool) -> Result<Env, ResolveError> {
        let scope = scopes
            .get(id)
            .ok_or_else(|| ResolveError::InvalidReference(format!("scope {}", id)))?;
        let outer = match scope.parent {
            Some(parent) => self.scope_env_at(scopes, parent, false)?,
            None => Env::new(),
        };

        let mut env = outer.child();
        for cte in &scope.ctes {
            self.add_cte(&mut env, cte)?;
        }
        for table in &scope.from {
            self.add_table_with_joins(&mut env, table)?;
        }
        if leaf {
            if let Some(target) = &scope.target {
                let relation = self.target_relation(target.name, target.alias)?;
                let mut excluded = relation.clone();
                excluded.name = "excluded".to_string();
                excluded.aliased = true;
                env.add_relation(relation);
                env.add_relation(excluded);
            }
        }
        Ok(env)
    }

    fn param_column(&self, param: &ParamRef<'_>, scope: &Scope<'_>, env: &Env) -> Result<Column, ResolveError> {
        match param.parent {
            Parent::Expr(parent) => self.enclosing_expr(parent, param.node, env),
            Parent::Limit => Ok(named_integer("limit")),
            Parent::Offset => Ok(named_integer("offset")),
            Parent::InsertValue { index, column } => {
                let target = scope
                    .target
                    .ok_or_else(|| ResolveError::InvalidReference("INSERT without target".to_string()))?;
                let relation = self.target_relation(target.name, target.alias)?;
                insert_column(&relation, index, column)
            }
            Parent::Assignment(assignment) => self.assignment_column(assignment, scope, env),
            Parent::SelectItem | Parent::TableFunctionArg | Parent::Clause | Parent::None => {
                Ok(Column::any(""))
            }
        }
    }

    fn enclosing_expr(&self, parent: &Expr, node: Option<&Expr>, env: &Env) -> Result<Column, ResolveError> {
        let is_param = |expr: &Expr| node.is_some_and(|n| std::ptr::eq(unnest(expr), n));

        match parent {
            Expr::Cast { data_type, .. } => Ok(self.data_type_column(data_type)),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::And | BinaryOperator::Or | BinaryOperator::Xor => Ok(typed("boolean")),
                _ => {
                    let other = if is_param(left) { right } else { left };
                    self.operand(other, env)
                }
            },
            Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
                if is_param(right) {
                    Ok(self.operand(left, env)?.with_array(true))
                } else {
                    Ok(self.operand(right, env)?.with_array(false))
                }
            }
            Expr::Like { expr, pattern, .. }
            | Expr::ILike { expr, pattern, .. }
            | Expr::SimilarTo { expr, pattern, .. } => {
                let other = if is_param(expr) { pattern } else { expr };
                self.operand(other, env)
            }
            Expr::Between { expr, low, high, .. } => {
                if is_param(expr) {
                    let bound = if is_param(low) { high } else { low };
                    return self.operand(bound, env);
                }
                let mut column = self.operand(expr, env)?;
                if !column.name.is_empty() {
                    let prefix = if is_param(low) { "from" } else { "to" };
                    column.name = format!("{}_{}", prefix, column.name);
                }
                Ok(column)
            }
            Expr::InList { expr, list, .. } => {
                if is_param(expr) {
                    match list.iter().find(|item| !is_param(*item)) {
                        Some(item) => self.operand(item, env),
                        None => Ok(Column::any("")),
                    }
                } else {
                    self.operand(expr, env)
                }
            }
            Expr::InSubquery { subquery, .. } => {
                let columns = self.query(subquery, env)?;
                Ok(columns.into_iter().next().unwrap_or_else(|| Column::any("")))
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                ..
            } => Ok(typed("boolean")),
            _ => Ok(Column::any("")),
        }
    }

    /// The operand a parameter is compared with
    fn operand(&self, expr: &Expr, env: &Env) -> Result<Column, ResolveError> {
        let column = self.expr_column(expr, env)?;
        Ok(match unnest(expr) {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => column,
            _ => derived(column),
        })
    }

    fn assignment_column(
        &self,
        assignment: &Assignment,
        scope: &Scope<'_>,
        env: &Env,
    ) -> Result<Column, ResolveError> {
        let AssignmentTarget::ColumnName(target) = &assignment.target else {
            return Ok(Column::any(""));
        };
        let parts: Vec<String> = target.0.iter().map(ident_name).collect();
        let Some((column, qualifier)) = parts.split_last() else {
            return Ok(Column::any(""));
        };

        let relation = match qualifier.last() {
            Some(name) => env
                .relation(name)
                .cloned()
                .ok_or_else(|| ResolveError::RelationNotFound(name.clone()))?,
            None => match scope.target {
                Some(target) => self.target_relation(target.name, target.alias)?,
                None => env
                    .relations()
                    .first()
                    .cloned()
                    .ok_or_else(|| ResolveError::ColumnNotFound(column.clone()))?,
            },
        };

        relation.column(column).ok_or_else(|| ResolveError::TargetColumnNotFound {
            table: relation_table_name(&relation),
            column: column.clone(),
        })
    }

    /// INSERT column lists must name existing columns, and rows without a
    /// column list may not be longer than the table
    pub fn check_insert(&self, insert: &Insert) -> Result<(), ResolveError> {
        let relation = self.target_relation(&insert.table_name, insert.table_alias.as_ref())?;
        for column in &insert.columns {
            let name = ident_name(column);
            if relation.column(&name).is_none() {
                return Err(ResolveError::TargetColumnNotFound {
                    table: relation_table_name(&relation),
                    column: name,
                });
            }
        }

        if insert.columns.is_empty() {
            if let Some(rows) = insert_values(insert) {
                if rows.iter().any(|row| row.len() > relation.columns.len()) {
                    return Err(ResolveError::TooManyValues);
                }
            }
        }
        Ok(())
    }
}

fn named_integer(name: &str) -> Column {
    let mut column = typed("integer");
    column.name = name.to_string();
    column
}

fn insert_column(relation: &Relation, index: usize, column: Option<&Ident>) -> Result<Column, ResolveError> {
    match column {
        Some(ident) => {
            let name = ident_name(ident);
            relation
                .column(&name)
                .ok_or_else(|| ResolveError::TargetColumnNotFound {
                    table: relation_table_name(relation),
                    column: name,
                })
        }
        None => relation
            .all_columns()
            .into_iter()
            .nth(index)
            .ok_or(ResolveError::TooManyValues),
    }
}

fn relation_table_name(relation: &Relation) -> String {
    relation
        .table
        .as_ref()
        .map(|t| t.name.clone())
        .unwrap_or_else(|| relation.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbind_catalog::Catalog;
    use sqlbind_sql::rewrite::named_parameters;
    use sqlbind_sql::{find_parameters, scan_parameters, unique_param_refs, SqlEngine, SqlParser};

    fn catalog(parser: &SqlParser) -> Catalog {
        let mut catalog = Catalog::new(parser.engine().default_schema());
        let ddl = "
            CREATE TABLE users (id BIGINT PRIMARY KEY, email TEXT NOT NULL, age INT, created_at TIMESTAMP NOT NULL);
            CREATE TABLE posts (id INT PRIMARY KEY, user_id BIGINT NOT NULL, title TEXT NOT NULL);
        ";
        for parsed in parser.parse(ddl).unwrap() {
            catalog.apply_statement(&parsed.statement, false).unwrap();
        }
        catalog
    }

    fn bind_with(parser: &SqlParser, sql: &str) -> Result<Vec<Parameter>, ResolveError> {
        let catalog = catalog(parser);
        let statement = parser.parse(sql).unwrap().remove(0).statement;
        let dollar = parser.engine().uses_dollar_params();

        let mut scanned = scan_parameters(parser.dialect(), parser.engine(), sql).unwrap();
        let (named, _) = named_parameters(&mut scanned, dollar);
        let set = find_parameters(&statement, &scanned.placeholders).unwrap();
        let refs = unique_param_refs(set.refs.clone(), dollar);

        Resolver::new(&catalog).bind_parameters(&set, &refs, &named)
    }

    fn bind(sql: &str) -> Vec<(String, String, bool)> {
        bind_with(&SqlParser::postgres(), sql)
            .unwrap()
            .into_iter()
            .map(|p| {
                let not_null = p.column.is_not_null();
                (p.column.name, p.column.data_type, not_null)
            })
            .collect()
    }

    fn param(name: &str, ty: &str) -> (String, String, bool) {
        (name.to_string(), ty.to_string(), true)
    }

    #[test]
    fn comparison_takes_other_operand() {
        assert_eq!(
            bind("SELECT id FROM users WHERE email = $1 AND $2 < age"),
            vec![param("email", "text"), param("age", "integer")]
        );
    }

    #[test]
    fn best_context_wins_for_reused_number() {
        // NULL test scores below the comparison, so $1 is typed from `age`
        assert_eq!(
            bind("SELECT id FROM users WHERE $1 IS NULL OR age = $1"),
            vec![param("age", "integer")]
        );
    }

    #[test]
    fn between_in_cast_and_limit() {
        assert_eq!(
            bind("SELECT id FROM users WHERE created_at BETWEEN $1 AND $2 AND id IN ($3, $4) AND $5::text <> email LIMIT $6 OFFSET $7"),
            vec![
                param("from_created_at", "timestamp"),
                param("to_created_at", "timestamp"),
                param("id", "bigint"),
                param("id", "bigint"),
                param("", "text"),
                param("limit", "integer"),
                param("offset", "integer"),
            ]
        );
    }

    #[test]
    fn any_marks_arrays() {
        let params = bind_with(&SqlParser::postgres(), "SELECT id FROM users WHERE id = ANY($1)").unwrap();
        assert_eq!(params[0].column.data_type, "bigint");
        assert!(params[0].column.is_array);
    }

    #[test]
    fn insert_and_update_targets() {
        assert_eq!(
            bind("INSERT INTO users (id, email) VALUES ($1, $2)"),
            vec![param("id", "bigint"), param("email", "text")]
        );
        assert_eq!(
            bind("UPDATE posts SET title = $1 WHERE id = $2"),
            vec![param("title", "text"), param("id", "integer")]
        );
        assert_eq!(
            bind("INSERT INTO users VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO UPDATE SET email = excluded.email"),
            vec![
                param("id", "bigint"),
                param("email", "text"),
                param("age", "integer"),
                param("created_at", "timestamp"),
            ]
        );
    }

    #[test]
    fn named_and_nullable_parameters() {
        let params = bind_with(
            &SqlParser::postgres(),
            "SELECT id FROM users WHERE email = sqlbind.arg(address) AND age > sqlbind.narg(min_age)",
        )
        .unwrap();
        assert_eq!(params[0].column.name, "address");
        assert!(params[0].column.is_named_param);
        assert!(params[0].column.is_not_null());
        assert_eq!(params[1].column.name, "min_age");
        assert_eq!(params[1].column.data_type, "integer");
        assert_eq!(params[1].column.nullable, Nullability::Yes);
    }

    #[test]
    fn correlated_subquery_sees_outer_scope() {
        assert_eq!(
            bind("SELECT id FROM users u WHERE EXISTS (SELECT 1 FROM posts p WHERE p.user_id = u.id AND p.title = $1)"),
            vec![param("title", "text")]
        );
    }

    #[test]
    fn question_style_numbers_by_position() {
        let params = bind_with(&SqlParser::mysql(), "SELECT id FROM users WHERE age > ? AND email = ?").unwrap();
        let numbers: Vec<usize> = params.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(params[1].column.name, "email");

        let params =
            bind_with(&SqlParser::mysql(), "SELECT id FROM users WHERE email = @email AND age > @min_age").unwrap();
        let names: Vec<(usize, &str)> = params.iter().map(|p| (p.number, p.column.name.as_str())).collect();
        assert_eq!(names, vec![(1, "email"), (2, "min_age")]);
        assert!(params.iter().all(|p| p.column.is_named_param));
    }

    #[test]
    fn unknown_targets_fail() {
        assert_eq!(
            bind_with(&SqlParser::postgres(), "UPDATE posts SET body = $1"),
            Err(ResolveError::TargetColumnNotFound {
                table: "posts".to_string(),
                column: "body".to_string()
            })
        );
        assert_eq!(
            bind_with(&SqlParser::postgres(), "SELECT id FROM users WHERE nickname = $1"),
            Err(ResolveError::ColumnNotFound("nickname".to_string()))
        );
    }
}
