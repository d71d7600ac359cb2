//! Query Builder
//!
//! Pure, stateless construction of SQL text from table/column metadata:
//! cacheable INSERT/UPDATE templates with named placeholders, ad hoc
//! SELECT assembly, and translation of request-adapter filter/sort/range
//! criteria into SQL fragments.
//!
//! Caller-supplied *values* never reach generated SQL unescaped: write
//! paths bind them as named parameters, and the criteria translation
//! escapes every scalar before it is interpolated into a fragment.

use once_cell::sync::Lazy;
use regex::Regex;

/// `sort(+field)` / `sort(-field)` request keys.
static SORT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sort\(([+_-])(.+)\)$").expect("sort key pattern"));

/// Values carrying a verbatim `BETWEEN x AND y` range.
static BETWEEN_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^BETWEEN\s+.+\s+AND\s+.+$").expect("between pattern"));

/// `items=start-end` range headers; both bounds may be empty.
static RANGE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"items=(\d*)-(\d*)").expect("range pattern"));

/// Escapes a scalar for inclusion inside a single-quoted SQL literal.
pub fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Quotes a scalar as a SQL string literal.
pub fn quote(text: &str) -> String {
    format!("'{}'", escape_literal(text))
}

/// Builds a cacheable INSERT template with named placeholders.
///
/// Produces `INSERT [OR REPLACE] INTO table(c1,c2) VALUES (:c1,:c2)` and
/// the ordered parameter-name list matching the placeholders.
pub fn build_insert<S: AsRef<str>>(
    table: &str,
    columns: &[S],
    replace: bool,
) -> (String, Vec<String>) {
    let names: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    let placeholders: Vec<String> = names.iter().map(|c| format!(":{c}")).collect();
    let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
    let sql = format!(
        "{verb} INTO {table}({}) VALUES ({})",
        names.join(","),
        placeholders.join(",")
    );
    (sql, names)
}

/// Builds a cacheable UPDATE template with named placeholders.
///
/// Produces `UPDATE table SET c1 = :c1, … WHERE id = :id`; the id column
/// is appended to the returned parameter list.
pub fn build_update<S: AsRef<str>>(
    table: &str,
    columns: &[S],
    id_column: &str,
) -> (String, Vec<String>) {
    let mut names: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    let assignments: Vec<String> = names.iter().map(|c| format!("{c} = :{c}")).collect();
    let sql = format!(
        "UPDATE {table} SET {} WHERE {id_column} = :{id_column}",
        assignments.join(",")
    );
    names.push(id_column.to_string());
    (sql, names)
}

/// Per-call description of a SELECT: table, columns, AND-joined filter
/// fragments, and optional group/order/limit clauses.
///
/// `build` assembles the clauses in the fixed order WHERE, GROUP BY,
/// ORDER BY, LIMIT; absent fragments are omitted entirely.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    table: String,
    columns: Vec<String>,
    distinct: bool,
    with_rowid: bool,
    filters: Vec<String>,
    group_by: Option<String>,
    order_by: Option<String>,
    limit: Option<String>,
}

impl QuerySpec {
    pub fn new(table: &str) -> Self {
        QuerySpec {
            table: table.to_string(),
            ..QuerySpec::default()
        }
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Prefixes the column list with ROWID.
    pub fn with_rowid(mut self) -> Self {
        self.with_rowid = true;
        self
    }

    /// Adds a WHERE fragment; fragments are joined with AND.
    pub fn filter(mut self, fragment: &str) -> Self {
        if !fragment.is_empty() {
            self.filters.push(fragment.to_string());
        }
        self
    }

    /// Adds every fragment from the slice.
    pub fn filters<S: AsRef<str>>(mut self, fragments: &[S]) -> Self {
        for fragment in fragments {
            self = self.filter(fragment.as_ref());
        }
        self
    }

    pub fn group_by(mut self, clause: Option<&str>) -> Self {
        self.group_by = clause.filter(|c| !c.is_empty()).map(String::from);
        self
    }

    pub fn order_by(mut self, clause: Option<&str>) -> Self {
        self.order_by = clause.filter(|c| !c.is_empty()).map(String::from);
        self
    }

    pub fn limit(mut self, clause: Option<&str>) -> Self {
        self.limit = clause.filter(|c| !c.is_empty()).map(String::from);
        self
    }

    /// Assembles the SELECT statement.
    pub fn build(&self) -> String {
        let column_list = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };
        let column_list = if self.with_rowid {
            format!("ROWID,{column_list}")
        } else {
            column_list
        };

        let mut sql = if self.distinct {
            format!("SELECT DISTINCT {column_list} FROM {}", self.table)
        } else {
            format!("SELECT {column_list} FROM {}", self.table)
        };
        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }
        if let Some(group) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }
        if let Some(order) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = &self.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(limit);
        }
        sql
    }
}

/// Translates a `sort(<+|-><field>)` request key into an ORDER BY term.
///
/// `-` sorts descending; `+` (or the `_` some clients send for an
/// unencoded space) sorts ascending. Returns `None` when the key is not
/// a sort key.
pub fn sort_clause(key: &str) -> Option<String> {
    let captures = SORT_KEY.captures(key)?;
    let field = captures.get(2)?.as_str();
    if captures.get(1)?.as_str() == "-" {
        Some(format!("{field} DESC"))
    } else {
        Some(format!("{field} ASC"))
    }
}

/// Translates a request filter pair into a WHERE fragment.
///
/// A `BETWEEN x AND y` value passes through verbatim; a value containing
/// a `*` wildcard becomes a LIKE clause with `*` replaced by `%`;
/// anything else becomes an equality clause. Scalar values are escaped
/// before interpolation.
pub fn filter_clause(field: &str, value: &str) -> String {
    if BETWEEN_VALUE.is_match(value) {
        format!("{field} {value}")
    } else if value.contains('*') {
        format!("{field} LIKE '{}'", escape_literal(&value.replace('*', "%")))
    } else {
        format!("{field} = '{}'", escape_literal(value))
    }
}

/// Filter and sort criteria accumulated from a request adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filters: Vec<String>,
    pub sorts: Vec<String>,
}

impl Criteria {
    /// Collects criteria from request key/value pairs: sort keys become
    /// ORDER BY terms, everything else becomes a WHERE fragment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut criteria = Criteria::default();
        for (key, value) in pairs {
            if let Some(sort) = sort_clause(key.as_ref()) {
                criteria.sorts.push(sort);
            } else {
                criteria
                    .filters
                    .push(filter_clause(key.as_ref(), value.as_ref()));
            }
        }
        criteria
    }

    /// AND-joined WHERE text, or `None` when no filters were collected.
    pub fn where_clause(&self) -> Option<String> {
        if self.filters.is_empty() {
            None
        } else {
            Some(self.filters.join(" AND "))
        }
    }

    /// Comma-joined ORDER BY text, or `None` when no sorts were collected.
    pub fn order_clause(&self) -> Option<String> {
        if self.sorts.is_empty() {
            None
        } else {
            Some(self.sorts.join(","))
        }
    }
}

/// A row range requested by a client, as offset and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: u64,
    /// Number of rows requested; 0 when the range was open-ended.
    pub count: u64,
}

impl Range {
    /// Parses an `items=start-end` range header value. An empty start
    /// means offset 0; an empty end means open-ended.
    pub fn parse(header: &str) -> Option<Range> {
        let captures = RANGE_HEADER.captures(header)?;
        let start = captures.get(1)?.as_str();
        let start: u64 = if start.is_empty() {
            0
        } else {
            start.parse().ok()?
        };
        let end = captures.get(2)?.as_str();
        let count = if end.is_empty() {
            0
        } else {
            let end: u64 = end.parse().ok()?;
            end.checked_sub(start)?.checked_add(1)?
        };
        Some(Range {
            offset: start,
            count,
        })
    }

    /// Renders the range as a LIMIT clause body, or `None` when open-ended.
    pub fn limit_clause(&self) -> Option<String> {
        if self.count == 0 {
            None
        } else {
            Some(format!("{} OFFSET {}", self.count, self.offset))
        }
    }
}
