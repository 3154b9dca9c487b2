//! Lineage edge extraction from SQL statements.
//!
//! Only write statements (INSERT ... SELECT, CREATE TABLE AS SELECT, MERGE)
//! produce edges. The write target is the first relation of the statement;
//! every other distinct relation becomes a source, scored by how deeply it is
//! nested in subqueries. Unparseable SQL yields no edges, never an error.

use sqlparser::ast::{ObjectName, Query, Statement, Visit, Visitor};
use sqlparser::dialect::{
    GenericDialect, MySqlDialect, PostgreSqlDialect, SnowflakeDialect,
};
use sqlparser::parser::Parser;
use std::ops::ControlFlow;

use crate::models::Dialect;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEdge {
    pub source: String,
    pub target: String,
    pub confidence: f64,
}

/// Parse a SQL string and extract source→target lineage edges.
pub fn extract_edges(sql: &str, dialect: Dialect) -> Vec<ParsedEdge> {
    let statements = match parse(sql, dialect) {
        Ok(statements) => statements,
        Err(_) => return Vec::new(),
    };

    let mut edges = Vec::new();

    for statement in &statements {
        if !is_write_statement(statement) {
            continue;
        }

        let mut collector = RelationCollector::default();
        let _ = statement.visit(&mut collector);

        let mut relations = collector.relations.into_iter();
        let Some((target, _)) = relations.next() else {
            continue;
        };

        let mut seen = vec![target.clone()];
        for (source, query_depth) in relations {
            if seen.contains(&source) {
                continue;
            }
            seen.push(source.clone());
            edges.push(ParsedEdge {
                source,
                target: target.clone(),
                confidence: confidence_for_depth(query_depth),
            });
        }
    }

    edges
}

fn parse(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, sqlparser::parser::ParserError> {
    match dialect {
        Dialect::Mysql | Dialect::Starrocks | Dialect::Doris => {
            Parser::parse_sql(&MySqlDialect {}, sql)
        },
        Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
        Dialect::Snowflake => Parser::parse_sql(&SnowflakeDialect {}, sql),
    }
    .or_else(|_| Parser::parse_sql(&GenericDialect {}, sql))
}

fn is_write_statement(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Insert { .. } | Statement::CreateTable { .. } | Statement::Merge { .. }
    )
}

/// The statement's own relations sit at query depth 0 (the write target, a
/// MERGE source). Depth 1 is the top-level SELECT feeding the write; each
/// additional level is one subquery of nesting.
fn confidence_for_depth(query_depth: usize) -> f64 {
    match query_depth.saturating_sub(1) {
        0 => 1.0,
        1 | 2 => 0.8,
        _ => 0.6,
    }
}

#[derive(Default)]
struct RelationCollector {
    query_depth: usize,
    relations: Vec<(String, usize)>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.query_depth = self.query_depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push((object_name_to_fqn(relation), self.query_depth));
        ControlFlow::Continue(())
    }
}

/// `[catalog, schema, name]` joined with `.`, missing segments omitted.
fn object_name_to_fqn(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|ident| ident.value.as_str())
        .collect::<Vec<_>>()
        .join(".")
}
