//! Snapshot query language
//!
//! A MongoDB-style subset evaluated in memory over records rendered as JSON
//! documents: field filters with comparison, membership, existence and regex
//! operators combined through `$and`/`$or`/`$nor`, multi-key sorts, and
//! inclusion or exclusion projections. Field paths may be dotted.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use ahsnap_ingest::CanonicalRecord;

use crate::error::{ApiError, ApiResult};

/// Compiled regexes are capped to keep hostile patterns cheap
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Parse a JSON parameter that must hold an object
pub fn parse_object(raw: &str) -> ApiResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).map_err(|_| ApiError::InvalidJson)? {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::InvalidDataType),
    }
}

/// Resolve a dotted path; numeric segments index into arrays
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

// ============================================================================
// Filter
// ============================================================================

#[derive(Debug, Clone)]
pub enum Filter {
    /// Every clause matches (top-level keys and `$and`)
    All(Vec<Filter>),
    /// At least one clause matches (`$or`)
    Any(Vec<Filter>),
    /// No clause matches (`$nor`)
    NoneOf(Vec<Filter>),
    Field { path: String, ops: Vec<Op> },
}

#[derive(Debug, Clone)]
pub enum Op {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
}

impl Filter {
    pub fn parse(map: &Map<String, Value>) -> ApiResult<Self> {
        let mut clauses = Vec::with_capacity(map.len());

        for (key, value) in map {
            let clause = match key.as_str() {
                "$and" => Filter::All(parse_clauses(key, value)?),
                "$or" => Filter::Any(parse_clauses(key, value)?),
                "$nor" => Filter::NoneOf(parse_clauses(key, value)?),
                op if op.starts_with('$') => {
                    return Err(ApiError::BadRequest(format!("Unknown operator {}", op)));
                },
                path => Filter::Field {
                    path: path.to_string(),
                    ops: parse_ops(value)?,
                },
            };
            clauses.push(clause);
        }

        Ok(Filter::All(clauses))
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All(clauses) => clauses.iter().all(|f| f.matches(doc)),
            Filter::Any(clauses) => clauses.iter().any(|f| f.matches(doc)),
            Filter::NoneOf(clauses) => !clauses.iter().any(|f| f.matches(doc)),
            Filter::Field { path, ops } => {
                let field = lookup(doc, path);
                ops.iter().all(|op| op.matches(field))
            },
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::All(Vec::new())
    }
}

fn parse_clauses(op: &str, value: &Value) -> ApiResult<Vec<Filter>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} expects a non-empty array", op)))?;

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Filter::parse(map),
            _ => Err(ApiError::InvalidDataType),
        })
        .collect()
}

fn parse_ops(value: &Value) -> ApiResult<Vec<Op>> {
    let map = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        other => return Ok(vec![Op::Eq(other.clone())]),
    };

    let options = map.get("$options").and_then(Value::as_str).unwrap_or_default();
    let mut ops = Vec::with_capacity(map.len());

    for (op, arg) in map {
        let parsed = match op.as_str() {
            "$eq" => Op::Eq(arg.clone()),
            "$ne" => Op::Ne(arg.clone()),
            "$gt" => Op::Gt(arg.clone()),
            "$gte" => Op::Gte(arg.clone()),
            "$lt" => Op::Lt(arg.clone()),
            "$lte" => Op::Lte(arg.clone()),
            "$in" => Op::In(array_arg(op, arg)?),
            "$nin" => Op::Nin(array_arg(op, arg)?),
            "$exists" => Op::Exists(truthy(arg)),
            "$regex" => Op::Regex(compile_regex(arg, options)?),
            "$options" if map.contains_key("$regex") => continue,
            other => return Err(ApiError::BadRequest(format!("Unknown operator {}", other))),
        };
        ops.push(parsed);
    }

    Ok(ops)
}

fn array_arg(op: &str, arg: &Value) -> ApiResult<Vec<Value>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest(format!("{} expects an array", op)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

fn compile_regex(pattern: &Value, options: &str) -> ApiResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| ApiError::BadRequest("$regex expects a string".to_string()))?;

    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| ApiError::BadRequest(format!("Invalid regular expression: {}", e)))
}

impl Op {
    pub fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Op::Eq(target) => equals(field, target),
            Op::Ne(target) => !equals(field, target),
            Op::Gt(target) => compares(field, target, |o| o == Ordering::Greater),
            Op::Gte(target) => compares(field, target, |o| o != Ordering::Less),
            Op::Lt(target) => compares(field, target, |o| o == Ordering::Less),
            Op::Lte(target) => compares(field, target, |o| o != Ordering::Greater),
            Op::In(targets) => targets.iter().any(|t| equals(field, t)),
            Op::Nin(targets) => !targets.iter().any(|t| equals(field, t)),
            Op::Exists(wanted) => field.is_some() == *wanted,
            Op::Regex(re) => match field {
                Some(Value::String(s)) => re.is_match(s),
                Some(Value::Array(items)) => {
                    items.iter().filter_map(Value::as_str).any(|s| re.is_match(s))
                },
                _ => false,
            },
        }
    }
}

/// Equality where an array field matches when any element does
fn equals(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None => target.is_null(),
        Some(value) if same(value, target) => true,
        Some(Value::Array(items)) => !target.is_array() && items.iter().any(|i| same(i, target)),
        Some(_) => false,
    }
}

fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordered comparison, only between numbers or between strings
fn compares(field: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Value| match (value, target) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .is_some_and(&accept),
        (Value::String(x), Value::String(y)) => accept(x.cmp(y)),
        _ => false,
    };

    match field {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
        None => false,
    }
}

// ============================================================================
// Sort
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Sort {
    /// (path, descending)
    keys: Vec<(String, bool)>,
}

impl Sort {
    pub fn parse(map: &Map<String, Value>) -> ApiResult<Self> {
        let keys = map
            .iter()
            .map(|(path, direction)| {
                let descending = match direction {
                    Value::Number(n) => match n.as_f64() {
                        Some(d) if d > 0.0 => false,
                        Some(d) if d < 0.0 => true,
                        _ => return Err(ApiError::InvalidDataType),
                    },
                    Value::String(s) => match s.to_lowercase().as_str() {
                        "asc" | "ascending" => false,
                        "desc" | "descending" => true,
                        _ => return Err(ApiError::InvalidDataType),
                    },
                    _ => return Err(ApiError::InvalidDataType),
                };
                Ok((path.clone(), descending))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(Self { keys })
    }

    pub fn apply(&self, docs: &mut [Value]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (path, descending) in &self.keys {
            let ordering = total_order(lookup(a, path), lookup(b, path));
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Missing and null sort first, then numbers, strings, objects, arrays, booleans
fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

// ============================================================================
// Projection
// ============================================================================

#[derive(Debug, Clone)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// `None` for an empty projection
    pub fn parse(map: &Map<String, Value>) -> ApiResult<Option<Self>> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for (path, flag) in map {
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64() != Some(0.0),
                _ => return Err(ApiError::InvalidDataType),
            };
            if keep {
                include.push(path.clone());
            } else {
                exclude.push(path.clone());
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(Projection::Include(include))),
            (true, false) => Ok(Some(Projection::Exclude(exclude))),
            (false, false) => Err(ApiError::BadRequest(
                "Cannot mix inclusion and exclusion in a projection".to_string(),
            )),
        }
    }

    pub fn apply(&self, doc: Value) -> Value {
        match self {
            Projection::Include(paths) => {
                let mut out = Value::Object(Map::new());
                for path in paths {
                    if let Some(value) = lookup(&doc, path) {
                        set_path(&mut out, path, value.clone());
                    }
                }
                out
            },
            Projection::Exclude(paths) => {
                let mut doc = doc;
                for path in paths {
                    remove_path(&mut doc, path);
                }
                doc
            },
        }
    }
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let Value::Object(map) = doc else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        },
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_path(child, rest, value);
        },
    }
}

fn remove_path(doc: &mut Value, path: &str) {
    let Value::Object(map) = doc else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.remove(path);
        },
        Some((head, rest)) => {
            if let Some(child) = map.get_mut(head) {
                remove_path(child, rest);
            }
        },
    }
}

// ============================================================================
// Query
// ============================================================================

/// A parsed request against the snapshot
#[derive(Debug, Clone, Default)]
pub struct SnapshotQuery {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub projection: Option<Projection>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl SnapshotQuery {
    /// Build from query-string parameters (long or one-letter names)
    ///
    /// With `page` the window is one page of `page_size` records; otherwise
    /// `limit`, when given and non-zero, caps the result.
    pub fn from_params(params: &HashMap<String, String>, page_size: usize) -> ApiResult<Self> {
        let param = |long: &str, short: &str| {
            params
                .get(long)
                .or_else(|| params.get(short))
                .map(String::as_str)
        };

        let filter = match param("query", "q") {
            Some(raw) => Filter::parse(&parse_object(raw)?)?,
            None => Filter::default(),
        };

        let sort = param("sort", "s")
            .map(|raw| parse_object(raw).and_then(|map| Sort::parse(&map)))
            .transpose()?;

        let projection = match param("filter", "f") {
            Some(raw) => Projection::parse(&parse_object(raw)?)?,
            None => None,
        };

        let page = param("page", "p").map(parse_count).transpose()?;
        // a zero limit means no limit
        let limit = param("limit", "l")
            .map(parse_count)
            .transpose()?
            .filter(|&n| n > 0);

        let (skip, limit) = match page {
            Some(page) => (page.saturating_mul(page_size), Some(page_size)),
            None => (0, limit),
        };

        Ok(Self {
            filter,
            sort,
            projection,
            skip,
            limit,
        })
    }

    pub fn execute(&self, records: &[CanonicalRecord]) -> ApiResult<Vec<Value>> {
        let mut docs = Vec::new();
        for record in records {
            let doc = serde_json::to_value(record)
                .map_err(|e| ApiError::Internal(format!("Failed to render record: {}", e)))?;
            if self.filter.matches(&doc) {
                docs.push(doc);
            }
        }

        if let Some(sort) = &self.sort {
            sort.apply(&mut docs);
        }

        Ok(docs
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|doc| match &self.projection {
                Some(projection) => projection.apply(doc),
                None => doc,
            })
            .collect())
    }
}

fn parse_count(raw: &str) -> ApiResult<usize> {
    raw.trim().parse().map_err(|_| ApiError::InvalidDataType)
}
