//! Schema and query compilation passes
//!
//! The schema pass applies every DDL statement to the catalog. The query
//! pass then compiles each named statement against the finished catalog:
//!
//! 1. placeholder style and INSERT arity checks
//! 2. metadata comment (name, command, options)
//! 3. named parameter rewrite, command and option validation
//! 4. parameter discovery, representative selection and type binding
//! 5. output columns, embed expansion and the final SQL text
//!
//! Errors are collected per file and statement; a pass fails once, at the
//! end, with every error it found.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sqlbind_catalog::{remove_rollback_statements, statement_kind, Catalog};
use sqlbind_core::{DiagnosticCode, Engine, MultiError, SqlPackage};
use sqlbind_sql::rewrite::{apply_edits, expand_embed, named_parameters};
use sqlbind_sql::source::strip_comments;
use sqlbind_sql::{
    find_parameters, parse_query_flags, parse_query_name_and_type, scan_parameters, unique_param_refs, validate,
    ParseError, ParsedStatement, QueryMetadata, RewriteError, SqlEngine, SqlParser,
};
use sqlparser::ast::Statement;
use tracing::{debug, info};

use crate::error::{CompileError, QueryError};
use crate::files::sql_files;
use crate::options::QueryOptions;
use crate::output::Resolver;
use crate::query::{CompileResult, Query};

/// Compiles one package: a schema and the queries written against it
pub struct Compiler<E: SqlEngine = SqlParser> {
    parser: E,
    catalog: Catalog,
}

impl Compiler<SqlParser> {
    /// Compiler using the built-in parser for `engine`
    pub fn new(engine: Engine) -> Self {
        Self::with_parser(SqlParser::from_engine(engine))
    }
}

impl<E: SqlEngine> Compiler<E> {
    /// Compiler starting from an empty catalog
    pub fn with_parser(parser: E) -> Self {
        let catalog = Catalog::new(parser.engine().default_schema());
        Self { parser, catalog }
    }

    /// Compiler for queries against an already built catalog
    pub fn with_catalog(parser: E, catalog: Catalog) -> Self {
        Self { parser, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn parser(&self) -> &E {
        &self.parser
    }

    /// Run both passes and hand the result over
    ///
    /// Query files are still compiled when the schema pass failed so that
    /// the error covers both.
    pub fn compile(
        mut self,
        schema_paths: &[PathBuf],
        query_paths: &[PathBuf],
    ) -> Result<CompileResult, CompileError> {
        let mut errors = MultiError::new();
        match self.parse_catalog(schema_paths) {
            Ok(()) => {}
            Err(CompileError::Multi(schema_errors)) => errors.extend(schema_errors),
            Err(other) => return Err(other),
        }

        match self.parse_queries(query_paths) {
            Ok(queries) if errors.is_empty() => Ok(CompileResult {
                catalog: self.catalog,
                queries,
            }),
            Ok(_) => Err(errors.into()),
            Err(CompileError::Multi(query_errors)) => {
                errors.extend(query_errors);
                Err(errors.into())
            }
            Err(_) if !errors.is_empty() => Err(errors.into()),
            Err(other) => Err(other),
        }
    }

    /// Apply every schema file to the catalog
    ///
    /// Files are applied last to first so that objects declared in later
    /// files exist before the earlier files use them. The first file as
    /// given supplies the main table and the raw schema SQL.
    pub fn parse_catalog(&mut self, schema_paths: &[PathBuf]) -> Result<(), CompileError> {
        let files = sql_files(schema_paths)?;
        let mut errors = MultiError::new();
        let first = files.len().saturating_sub(1);

        for (i, path) in files.iter().rev().enumerate() {
            let filename = path.display().to_string();
            let is_first_file = i == first;

            let blob = match fs::read_to_string(path) {
                Ok(blob) => blob,
                Err(err) => {
                    errors.add(&filename, "", 0, DiagnosticCode::IoError, err);
                    continue;
                }
            };
            let contents = remove_rollback_statements(&blob);
            let statements = match self.parser.parse(&contents) {
                Ok(statements) => statements,
                Err(err) => {
                    errors.add(&filename, &contents, err.location, DiagnosticCode::SqlParseError, err);
                    continue;
                }
            };
            debug!("Applying {} schema statement(s) from {}", statements.len(), filename);

            let mut table_defined = false;
            for parsed in &statements {
                let location = parsed.span.location;
                if let Err(err) = self
                    .catalog
                    .apply_statement(&parsed.statement, !table_defined && is_first_file)
                {
                    errors.add(&filename, &contents, location, DiagnosticCode::CatalogError, err);
                    continue;
                }

                let defining_table = Catalog::is_creating_new_table_layout(&parsed.statement);
                if table_defined && defining_table {
                    errors.add(
                        &filename,
                        &contents,
                        location,
                        DiagnosticCode::CatalogError,
                        "only one table creation is allowed per schema.sql file",
                    );
                }
                table_defined |= defining_table;
            }

            if is_first_file {
                self.catalog.add_raw_sql(contents);
            }
        }

        info!(
            "Schema pass: {} file(s), {} table(s), {} error(s)",
            files.len(),
            self.catalog.tables().count(),
            errors.len()
        );
        errors.into_result(()).map_err(CompileError::from)
    }

    /// Compile every named statement of the query files
    pub fn parse_queries(&self, query_paths: &[PathBuf]) -> Result<Vec<Query>, CompileError> {
        let files = sql_files(query_paths)?;
        let mut errors = MultiError::new();
        let mut names: HashSet<String> = HashSet::new();
        let mut sources: Vec<(String, String)> = Vec::new();
        let mut compiled: Vec<(Query, usize, usize)> = Vec::new();

        for path in &files {
            let filename = path.display().to_string();
            let src = match fs::read_to_string(path) {
                Ok(src) => src,
                Err(err) => {
                    errors.add(&filename, "", 0, DiagnosticCode::IoError, err);
                    continue;
                }
            };
            let file_index = sources.len();
            sources.push((filename, src));
            let (filename, src) = &sources[file_index];

            let statements = match self.parser.parse(src) {
                Ok(statements) => statements,
                Err(err) => {
                    errors.add(filename, src, err.location, DiagnosticCode::SqlParseError, err);
                    continue;
                }
            };
            debug!("Compiling {} statement(s) from {}", statements.len(), filename);

            for parsed in &statements {
                let location = parsed.span.location;
                let mut query = match self.parse_query(src, parsed) {
                    Ok(Some(query)) => query,
                    Ok(None) => continue,
                    Err(err) => {
                        let offset = err.location().unwrap_or(location);
                        errors.add(filename, src, offset, err.code(), err);
                        continue;
                    }
                };

                if !names.insert(query.name.clone()) {
                    errors.add(
                        filename,
                        src,
                        location,
                        DiagnosticCode::DuplicateQueryName,
                        format!("duplicate query name: {}", query.name),
                    );
                    continue;
                }
                query.filename = base_name(path);
                compiled.push((query, file_index, location));
            }
        }

        let known: HashSet<&str> = names.iter().map(String::as_str).collect();
        for (query, file_index, location) in &mut compiled {
            match QueryOptions::parse(&query.raw_options, &known) {
                Ok(options) => query.options = options,
                Err(err) => {
                    let (filename, src) = &sources[*file_index];
                    errors.add(filename, src, *location, DiagnosticCode::OptionError, err);
                }
            }
        }

        info!(
            "Query pass: {} file(s), {} query(s), {} error(s)",
            files.len(),
            compiled.len(),
            errors.len()
        );
        if !errors.is_empty() {
            return Err(errors.into());
        }
        if compiled.is_empty() {
            let paths: Vec<String> = query_paths.iter().map(|p| p.display().to_string()).collect();
            return Err(CompileError::NoQueries(paths.join(",")));
        }
        Ok(compiled.into_iter().map(|(query, ..)| query).collect())
    }

    /// Compile one statement of `src`
    ///
    /// Returns `Ok(None)` for statements that are skipped: unsupported
    /// statement kinds and statements without a `name:` line.
    pub fn parse_query(&self, src: &str, parsed: &ParsedStatement) -> Result<Option<Query>, QueryError> {
        let statement = &parsed.statement;
        let engine = self.parser.engine();
        let dollar = engine.uses_dollar_params();
        let raw = parsed.raw(src);

        let mut scanned = scan_parameters(self.parser.dialect(), engine, raw)
            .map_err(|e| ParseError::new(e.error, parsed.span.location + e.location))?;
        validate::param_style(&scanned, engine)?;

        let insert_into_table = match statement {
            Statement::Insert(insert) => {
                validate::insert_stmt(insert)?;
                Some(self.catalog.table_id(&insert.table_name)?)
            }
            Statement::Query(_)
            | Statement::Update { .. }
            | Statement::Delete(_)
            | Statement::Truncate { .. }
            | Statement::Call(_) => None,
            other => {
                debug!(
                    "Skipping unsupported statement at offset {}: {}",
                    parsed.span.location,
                    statement_kind(other)
                );
                return Ok(None);
            }
        };

        if !parsed.span.terminated {
            return Err(QueryError::MissingSemicolon);
        }

        let syntax = self.parser.comment_syntax();
        let Some(QueryMetadata { name, cmd, mut options }) = parse_query_name_and_type(raw.trim(), syntax)? else {
            debug!("Skipping statement without a name at offset {}", parsed.span.location);
            return Ok(None);
        };

        let (named, mut edits) = named_parameters(&mut scanned, dollar);
        validate::cmd(statement, &name, cmd, &scanned)?;
        validate::default_options(statement, &name, &mut options)?;

        let set = find_parameters(statement, &scanned.placeholders)?;
        let refs = unique_param_refs(set.refs.clone(), dollar);

        let resolver = Resolver::new(&self.catalog);
        if let Statement::Insert(insert) = statement {
            resolver.check_insert(insert)?;
        }
        let params = resolver.bind_parameters(&set, &refs, &named)?;
        let columns = resolver.output_columns(statement)?;

        if !scanned.embeds.is_empty() {
            let env = resolver.statement_env(statement)?;
            for embed in &scanned.embeds {
                let relation = env
                    .relation(&embed.table)
                    .or_else(|| env.relation(&embed.table.to_lowercase()))
                    .ok_or_else(|| RewriteError::UnknownEmbedTable(embed.table.clone()))?;
                let names: Vec<&str> = relation.columns.iter().map(|c| c.name.as_str()).collect();
                edits.push(expand_embed(&self.parser, embed, &embed.table, &names));
            }
        }

        let expanded = apply_edits(&self.parser, raw, &edits)?;
        let (sql, comments) = strip_comments(&expanded, syntax);
        let flags = parse_query_flags(&comments);

        debug!("Compiled {} ({}): {} param(s), {} column(s)", name, cmd, params.len(), columns.len());
        Ok(Some(Query {
            name,
            cmd,
            sql,
            params,
            columns,
            insert_into_table,
            comments,
            flags,
            filename: String::new(),
            raw_options: options,
            options: QueryOptions::default(),
        }))
    }
}

/// Compile a configured package, resolving its paths against `root`
pub fn compile_package(package: &SqlPackage, root: &Path) -> Result<CompileResult, CompileError> {
    info!("Compiling package {} ({})", package.name, package.engine);
    Compiler::new(package.engine).compile(&package.schema_paths(root), &package.query_paths(root))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlbind_sql::Cmd;

    fn compiler(ddl: &str) -> Compiler {
        let parser = SqlParser::postgres();
        let mut catalog = Catalog::new(parser.engine().default_schema());
        for parsed in parser.parse(ddl).unwrap() {
            catalog.apply_statement(&parsed.statement, false).unwrap();
        }
        Compiler::with_catalog(parser, catalog)
    }

    fn compile_one(compiler: &Compiler, src: &str) -> Result<Option<Query>, QueryError> {
        let parsed = compiler.parser().parse(src).unwrap();
        compiler.parse_query(src, &parsed[0])
    }

    const AUTHORS: &str = "CREATE TABLE authors (id BIGSERIAL PRIMARY KEY, name text NOT NULL, bio text);";

    #[test]
    fn compiles_named_select() {
        let compiler = compiler(AUTHORS);
        let query = compile_one(
            &compiler,
            "-- name: GetAuthor :one\n-- Fetch one author\nSELECT id, name, bio FROM authors WHERE id = sqlbind.arg(author_id);",
        )
        .unwrap()
        .unwrap();

        assert_eq!(query.name, "GetAuthor");
        assert_eq!(query.cmd, Cmd::One);
        assert_eq!(query.sql, "SELECT id, name, bio FROM authors WHERE id = $1");
        assert_eq!(query.comments, vec![" Fetch one author".to_string()]);
        assert_eq!(query.params.len(), 1);
        assert_eq!(query.params[0].column.name, "author_id");
        assert!(query.params[0].column.is_named_param);
        assert_eq!(
            query.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["id", "name", "bio"]
        );
        assert_eq!(query.raw_options.get("count_intent").map(String::as_str), Some("true"));
    }

    #[test]
    fn unnamed_and_unsupported_statements_are_skipped() {
        let compiler = compiler(AUTHORS);
        assert!(compile_one(&compiler, "SELECT 1;").unwrap().is_none());
        assert!(compile_one(&compiler, "-- name: MakeIndex :exec\nCREATE INDEX idx ON authors (name);")
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_semicolon_is_reported() {
        let compiler = compiler(AUTHORS);
        let err = compile_one(&compiler, "-- name: ListAuthors :many\nSELECT id FROM authors").unwrap_err();
        assert_eq!(err.to_string(), "missing semicolon at end of file");
    }

    #[test]
    fn insert_records_target_table() {
        let compiler = compiler(AUTHORS);
        let query = compile_one(
            &compiler,
            "-- name: CreateAuthor :one\nINSERT INTO authors (name, bio) VALUES ($1, $2) RETURNING id;",
        )
        .unwrap()
        .unwrap();

        let table = query.insert_into_table.unwrap();
        assert_eq!((table.schema.as_str(), table.name.as_str()), ("public", "authors"));
        assert_eq!(query.params[0].column.name, "name");
        assert_eq!(query.params[1].column.name, "bio");
        assert_eq!(query.raw_options.get("allow_replica").map(String::as_str), Some("false"));
    }

    #[test]
    fn embed_expands_to_columns() {
        let compiler = compiler(AUTHORS);
        let query = compile_one(
            &compiler,
            "-- name: AuthorRows :many\nSELECT sqlbind.embed(a) FROM authors a;",
        )
        .unwrap()
        .unwrap();
        assert_eq!(query.sql, "SELECT a.id, a.name, a.bio FROM authors a");
        assert_eq!(query.columns.len(), 1);
    }

    #[test]
    fn embed_of_unknown_table_fails() {
        let compiler = compiler(AUTHORS);
        let err = compile_one(&compiler, "-- name: Bad :many\nSELECT sqlbind.embed(b) FROM authors a;").unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::ResolutionError);
    }

    #[test]
    fn set_returning_function_in_from() {
        let compiler = compiler(AUTHORS);
        let query = compile_one(&compiler, "-- name: Series :many\nSELECT g FROM generate_series(1, $1) AS g;")
            .unwrap()
            .unwrap();
        assert_eq!(query.params.len(), 1);
        assert_eq!(query.params[0].number, 1);
        assert_eq!(
            query.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["g"]
        );
    }

    #[test]
    fn unknown_column_fails() {
        let compiler = compiler(AUTHORS);
        let err = compile_one(&compiler, "-- name: Bad :many\nSELECT nope FROM authors;").unwrap_err();
        assert_eq!(err.to_string(), "column \"nope\" does not exist");
    }
}
