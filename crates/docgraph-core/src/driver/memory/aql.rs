//! AQL subset parser for the in-process driver, using pest.

use pest::iterators::Pair;
use pest::Parser as PestParser;
use pest_derive::Parser;

use crate::driver::{Direction, DriverError, DriverResult};

#[derive(Parser)]
#[grammar = "driver/memory/aql.pest"]
struct AqlParser;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    /// `FOR x IN coll [FILTER ..]* [SORT ..] [LIMIT ..] <terminal>`
    Scan(ScanStatement),
    /// `FOR v, e, p IN a..b DIR start GRAPH g [OPTIONS {..}] [FILTER ..]* [LIMIT ..] RETURN expr`
    Traversal(TraversalStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanStatement {
    pub var: String,
    pub source: Source,
    pub filters: Vec<Expr>,
    pub sort: Vec<SortKey>,
    pub limit: Option<Limit>,
    pub terminal: Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TraversalStatement {
    pub vertex_var: String,
    pub edge_var: String,
    pub path_var: String,
    pub min_depth: u32,
    pub max_depth: u32,
    pub direction: Direction,
    pub start: Expr,
    pub graph: Expr,
    pub options: Option<Expr>,
    pub filters: Vec<Expr>,
    pub limit: Option<Limit>,
    pub ret: Expr,
}

/// Collection named literally or through a `@@` bind parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Source {
    Bind(String),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortKey {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Limit {
    pub offset: Option<Expr>,
    pub count: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    Return(Expr),
    Count { into: String, ret: String },
    Update {
        var: String,
        with: Expr,
        target: Source,
        ret: Option<Expr>,
    },
    Remove {
        var: String,
        target: Source,
        ret: Option<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(serde_json::Value),
    Bind(String),
    Path(Vec<String>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Call(String, Vec<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

fn syntax(message: impl Into<String>) -> DriverError {
    DriverError::Query {
        message: message.into(),
        position: None,
    }
}

fn syntax_at(pair: &Pair<'_, Rule>, message: impl Into<String>) -> DriverError {
    DriverError::Query {
        message: message.into(),
        position: Some(pair.as_span().start()),
    }
}

/// Parses one statement.
pub(crate) fn parse(input: &str) -> DriverResult<Statement> {
    let mut pairs = AqlParser::parse(Rule::query, input).map_err(|e| {
        let position = match e.location {
            pest::error::InputLocation::Pos(p) => p,
            pest::error::InputLocation::Span((s, _)) => s,
        };
        DriverError::Query {
            message: e.to_string(),
            position: Some(position),
        }
    })?;

    let query = pairs.next().ok_or_else(|| syntax("empty query"))?;
    let stmt = query
        .into_inner()
        .find(|p| matches!(p.as_rule(), Rule::collection_stmt | Rule::traversal_stmt))
        .ok_or_else(|| syntax("expected FOR statement"))?;

    match stmt.as_rule() {
        Rule::traversal_stmt => parse_traversal(stmt).map(Statement::Traversal),
        _ => parse_scan(stmt).map(Statement::Scan),
    }
}

fn parse_scan(pair: Pair<'_, Rule>) -> DriverResult<ScanStatement> {
    let mut var = None;
    let mut source = None;
    let mut filters = Vec::new();
    let mut sort = Vec::new();
    let mut limit = None;
    let mut terminal = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => var = Some(inner.as_str().to_string()),
            Rule::source => source = Some(parse_source(inner)?),
            Rule::filter_clause => filters.push(parse_clause_expr(inner)?),
            Rule::sort_clause => sort = parse_sort(inner)?,
            Rule::limit_clause => limit = Some(parse_limit(inner)?),
            Rule::terminal => terminal = Some(parse_terminal(inner)?),
            _ => {}
        }
    }

    Ok(ScanStatement {
        var: var.ok_or_else(|| syntax("expected loop variable"))?,
        source: source.ok_or_else(|| syntax("expected collection"))?,
        filters,
        sort,
        limit,
        terminal: terminal.ok_or_else(|| syntax("expected RETURN, COLLECT, UPDATE or REMOVE"))?,
    })
}

fn parse_traversal(pair: Pair<'_, Rule>) -> DriverResult<TraversalStatement> {
    let mut vars = Vec::with_capacity(3);
    let mut depth = None;
    let mut direction = None;
    let mut exprs = Vec::with_capacity(3);
    let mut options = None;
    let mut filters = Vec::new();
    let mut limit = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => vars.push(inner.as_str().to_string()),
            Rule::depth_range => depth = Some(parse_depth(inner)?),
            Rule::direction => direction = Some(parse_direction(&inner)?),
            Rule::expr => exprs.push(parse_expr(inner)?),
            Rule::options_clause => {
                let object = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::object)
                    .ok_or_else(|| syntax("expected OPTIONS object"))?;
                options = Some(parse_object(object)?);
            }
            Rule::filter_clause => filters.push(parse_clause_expr(inner)?),
            Rule::limit_clause => limit = Some(parse_limit(inner)?),
            _ => {}
        }
    }

    let [vertex_var, edge_var, path_var]: [String; 3] = vars
        .try_into()
        .map_err(|_| syntax("expected three traversal variables"))?;
    let [start, graph, ret]: [Expr; 3] = exprs
        .try_into()
        .map_err(|_| syntax("expected start vertex, graph and RETURN expression"))?;
    let (min_depth, max_depth) = depth.ok_or_else(|| syntax("expected depth range"))?;

    Ok(TraversalStatement {
        vertex_var,
        edge_var,
        path_var,
        min_depth,
        max_depth,
        direction: direction.ok_or_else(|| syntax("expected direction"))?,
        start,
        graph,
        options,
        filters,
        limit,
        ret,
    })
}

fn parse_source(pair: Pair<'_, Rule>) -> DriverResult<Source> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| syntax("expected collection"))?;
    match inner.as_rule() {
        Rule::collection_bind => Ok(Source::Bind(inner.as_str()[2..].to_string())),
        _ => Ok(Source::Name(inner.as_str().to_string())),
    }
}

fn parse_depth(pair: Pair<'_, Rule>) -> DriverResult<(u32, u32)> {
    let mut bounds = pair.into_inner().map(|p| {
        p.as_str()
            .parse::<u32>()
            .map_err(|e| syntax_at(&p, format!("invalid depth: {e}")))
    });
    let min = bounds.next().ok_or_else(|| syntax("expected depth"))??;
    let max = bounds.next().ok_or_else(|| syntax("expected depth"))??;
    if min > max {
        return Err(syntax(format!("invalid depth range {min}..{max}")));
    }
    Ok((min, max))
}

fn parse_direction(pair: &Pair<'_, Rule>) -> DriverResult<Direction> {
    let keyword = pair
        .clone()
        .into_inner()
        .next()
        .ok_or_else(|| syntax_at(pair, "expected direction"))?;
    match keyword.as_rule() {
        Rule::outbound_kw => Ok(Direction::Outbound),
        Rule::inbound_kw => Ok(Direction::Inbound),
        _ => Ok(Direction::Any),
    }
}

fn parse_clause_expr(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let expr = pair
        .clone()
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .ok_or_else(|| syntax_at(&pair, "expected expression"))?;
    parse_expr(expr)
}

fn parse_sort(pair: Pair<'_, Rule>) -> DriverResult<Vec<SortKey>> {
    let mut keys = Vec::new();
    for item in pair.into_inner().filter(|p| p.as_rule() == Rule::sort_item) {
        let mut expr = None;
        let mut descending = false;
        for inner in item.into_inner() {
            match inner.as_rule() {
                Rule::expr => expr = Some(parse_expr(inner)?),
                Rule::sort_dir => {
                    descending = inner
                        .into_inner()
                        .next()
                        .is_some_and(|k| k.as_rule() == Rule::desc_kw);
                }
                _ => {}
            }
        }
        keys.push(SortKey {
            expr: expr.ok_or_else(|| syntax("expected sort expression"))?,
            descending,
        });
    }
    Ok(keys)
}

fn parse_limit(pair: Pair<'_, Rule>) -> DriverResult<Limit> {
    let mut exprs = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::expr)
        .map(parse_expr)
        .collect::<DriverResult<Vec<_>>>()?;
    match exprs.len() {
        1 => Ok(Limit {
            offset: None,
            count: exprs.remove(0),
        }),
        2 => {
            let count = exprs.remove(1);
            Ok(Limit {
                offset: Some(exprs.remove(0)),
                count,
            })
        }
        _ => Err(syntax("expected LIMIT count or LIMIT offset, count")),
    }
}

fn parse_terminal(pair: Pair<'_, Rule>) -> DriverResult<Terminal> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| syntax("expected terminal clause"))?;

    match inner.as_rule() {
        Rule::return_clause => parse_clause_expr(inner).map(Terminal::Return),
        Rule::count_clause => {
            let idents: Vec<String> = inner
                .into_inner()
                .filter(|p| p.as_rule() == Rule::ident)
                .map(|p| p.as_str().to_string())
                .collect();
            match idents.as_slice() {
                [into, ret] => Ok(Terminal::Count {
                    into: into.clone(),
                    ret: ret.clone(),
                }),
                _ => Err(syntax("expected COLLECT WITH COUNT INTO var RETURN var")),
            }
        }
        Rule::update_clause => {
            let mut var = None;
            let mut with = None;
            let mut target = None;
            let mut ret = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::ident => var = Some(part.as_str().to_string()),
                    Rule::expr => with = Some(parse_expr(part)?),
                    Rule::source => target = Some(parse_source(part)?),
                    Rule::return_clause => ret = Some(parse_clause_expr(part)?),
                    _ => {}
                }
            }
            Ok(Terminal::Update {
                var: var.ok_or_else(|| syntax("expected UPDATE variable"))?,
                with: with.ok_or_else(|| syntax("expected UPDATE document"))?,
                target: target.ok_or_else(|| syntax("expected UPDATE collection"))?,
                ret,
            })
        }
        Rule::remove_clause => {
            let mut var = None;
            let mut target = None;
            let mut ret = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::ident => var = Some(part.as_str().to_string()),
                    Rule::source => target = Some(parse_source(part)?),
                    Rule::return_clause => ret = Some(parse_clause_expr(part)?),
                    _ => {}
                }
            }
            Ok(Terminal::Remove {
                var: var.ok_or_else(|| syntax("expected REMOVE variable"))?,
                target: target.ok_or_else(|| syntax("expected REMOVE collection"))?,
                ret,
            })
        }
        _ => Err(syntax_at(&inner, "unknown terminal clause")),
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn parse_expr(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let or_expr = pair
        .clone()
        .into_inner()
        .next()
        .ok_or_else(|| syntax_at(&pair, "expected expression"))?;
    parse_or_expr(or_expr)
}

fn parse_or_expr(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let mut inner = pair.into_inner().filter(|p| p.as_rule() == Rule::and_expr);

    let first = inner.next().ok_or_else(|| syntax("expected condition"))?;
    let mut result = parse_and_expr(first)?;

    for and_expr in inner {
        let right = parse_and_expr(and_expr)?;
        result = Expr::Or(Box::new(result), Box::new(right));
    }

    Ok(result)
}

fn parse_and_expr(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let mut inner = pair.into_inner().filter(|p| p.as_rule() == Rule::not_expr);

    let first = inner.next().ok_or_else(|| syntax("expected condition"))?;
    let mut result = parse_not_expr(first)?;

    for not_expr in inner {
        let right = parse_not_expr(not_expr)?;
        result = Expr::And(Box::new(result), Box::new(right));
    }

    Ok(result)
}

fn parse_not_expr(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let mut negations = 0usize;
    let mut comparison = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_op => negations += 1,
            Rule::comparison => comparison = Some(parse_comparison(inner)?),
            _ => {}
        }
    }

    let mut expr = comparison.ok_or_else(|| syntax("expected comparison"))?;
    for _ in 0..negations {
        expr = Expr::Not(Box::new(expr));
    }
    Ok(expr)
}

fn parse_comparison(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let mut operands = Vec::with_capacity(2);
    let mut op = None;
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::compare_op {
            op = Some(parse_compare_op(&inner)?);
        } else {
            operands.push(parse_operand(inner)?);
        }
    }

    match (op, operands.len()) {
        (None, 1) => Ok(operands.remove(0)),
        (Some(op), 2) => {
            let right = operands.remove(1);
            let left = operands.remove(0);
            Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
        }
        _ => Err(syntax("malformed comparison")),
    }
}

fn parse_compare_op(pair: &Pair<'_, Rule>) -> DriverResult<CompareOp> {
    let inner = pair
        .clone()
        .into_inner()
        .next()
        .ok_or_else(|| syntax_at(pair, "expected operator"))?;
    Ok(match inner.as_rule() {
        Rule::eq_op => CompareOp::Eq,
        Rule::ne_op => CompareOp::Ne,
        Rule::le_op => CompareOp::Le,
        Rule::ge_op => CompareOp::Ge,
        Rule::lt_op => CompareOp::Lt,
        Rule::gt_op => CompareOp::Gt,
        Rule::not_in_op => CompareOp::NotIn,
        _ => CompareOp::In,
    })
}

fn parse_operand(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    match pair.as_rule() {
        Rule::null_lit => Ok(Expr::Literal(serde_json::Value::Null)),
        Rule::true_lit => Ok(Expr::Literal(serde_json::Value::Bool(true))),
        Rule::false_lit => Ok(Expr::Literal(serde_json::Value::Bool(false))),
        Rule::number => parse_number(&pair).map(Expr::Literal),
        Rule::string => parse_string(pair).map(|s| Expr::Literal(serde_json::Value::String(s))),
        Rule::bind_var => Ok(Expr::Bind(pair.as_str()[1..].to_string())),
        Rule::attribute_path => Ok(Expr::Path(
            pair.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        Rule::function_call => {
            let mut inner = pair.into_inner();
            let name = inner
                .next()
                .ok_or_else(|| syntax("expected function name"))?
                .as_str()
                .to_string();
            let args = inner
                .filter(|p| p.as_rule() == Rule::expr)
                .map(parse_expr)
                .collect::<DriverResult<Vec<_>>>()?;
            Ok(Expr::Call(name, args))
        }
        Rule::array => pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::expr)
            .map(parse_expr)
            .collect::<DriverResult<Vec<_>>>()
            .map(Expr::Array),
        Rule::object => parse_object(pair),
        Rule::expr => parse_expr(pair),
        _ => Err(syntax_at(&pair, "unexpected operand")),
    }
}

fn parse_object(pair: Pair<'_, Rule>) -> DriverResult<Expr> {
    let mut entries = Vec::new();
    for entry in pair.into_inner().filter(|p| p.as_rule() == Rule::object_entry) {
        let mut key = None;
        let mut value = None;
        for part in entry.into_inner() {
            match part.as_rule() {
                Rule::object_key => {
                    let k = part
                        .into_inner()
                        .next()
                        .ok_or_else(|| syntax("expected object key"))?;
                    key = Some(if k.as_rule() == Rule::string {
                        parse_string(k)?
                    } else {
                        k.as_str().to_string()
                    });
                }
                Rule::expr => value = Some(parse_expr(part)?),
                _ => {}
            }
        }
        entries.push((
            key.ok_or_else(|| syntax("expected object key"))?,
            value.ok_or_else(|| syntax("expected object value"))?,
        ));
    }
    Ok(Expr::Object(entries))
}

fn parse_number(pair: &Pair<'_, Rule>) -> DriverResult<serde_json::Value> {
    let text = pair.as_str();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(serde_json::Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .ok_or_else(|| syntax_at(pair, format!("invalid number '{text}'")))
}

fn parse_string(pair: Pair<'_, Rule>) -> DriverResult<String> {
    let raw = pair
        .into_inner()
        .next()
        .map(|p| p.as_str())
        .unwrap_or_default();

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Ok(out)
}
