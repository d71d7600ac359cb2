//! Record Retrieval
//!
//! Read operations on `Database`, shaping rows into ordered vectors,
//! id-keyed mappings, id/label lists, or grouped hierarchies. All
//! operations run on the owning connection and see uncommitted rows from
//! the open batch transaction.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::ToSql;
use serde::Serialize;
use tracing::{debug, error};

use crate::core::{BatchliteError, Result};

use super::builder::QuerySpec;
use super::row::{record_from_row, value_to_string, Record};
use super::Database;

/// One entry of an id/label list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub id: String,
    pub label: String,
}

/// Description of a grouped retrieval: a parent table of groups and a
/// child table of items joined on the group id.
///
/// Runs one query per group; intended for small group counts such as
/// playlists or menu sections.
#[derive(Debug, Clone, Default)]
pub struct GroupQuery {
    pub group_table: String,
    pub group_columns: Vec<String>,
    /// Column identifying the group. Carries the same name in both
    /// tables: it keys the result mapping and joins the item rows to
    /// their group.
    pub group_id: String,
    pub item_table: String,
    pub item_columns: Vec<String>,
    /// Column of `item_table` keying each group's item mapping.
    pub item_id: String,
    pub item_where: Option<String>,
    pub group_order: Option<String>,
    pub item_order: Option<String>,
}

/// A group's own fields plus its items keyed by item id.
#[derive(Debug, Clone, Default)]
pub struct RecordGroup {
    pub fields: Record,
    pub items: HashMap<String, Record>,
}

fn query_error(sql: &str, err: rusqlite::Error) -> BatchliteError {
    error!("query failed: {}: {}", sql, err);
    BatchliteError::Query(err.to_string())
}

impl Database {
    /// Runs a SELECT and materializes every row in result order.
    fn query_records(&self, sql: &str) -> Result<Vec<Record>> {
        self.query_records_with(sql, &[])
    }

    fn query_records_with(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Record>> {
        debug!("sql = {}", sql);
        let mut stmt = self.conn.prepare(sql).map_err(|e| query_error(sql, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params).map_err(|e| query_error(sql, e))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|e| query_error(sql, e))? {
            records.push(record_from_row(row, &columns).map_err(|e| query_error(sql, e))?);
        }
        Ok(records)
    }

    /// Retrieves all rows of `table` matching the AND-joined filter
    /// fragments, in result order. `with_rowid` prefixes the column list
    /// with ROWID.
    pub fn retrieve_records<S: AsRef<str>>(
        &self,
        table: &str,
        filters: &[S],
        with_rowid: bool,
    ) -> Result<Vec<Record>> {
        let mut spec = QuerySpec::new(table).filters(filters);
        if with_rowid {
            spec = spec.with_rowid();
        }
        self.query_records(&spec.build())
    }

    /// Retrieves the rows of an arbitrary SELECT, in result order.
    pub fn retrieve_records_sql(&self, sql: &str) -> Result<Vec<Record>> {
        self.query_records(sql)
    }

    /// Retrieves the rows of an arbitrary SELECT keyed by the
    /// stringified value of `id_column`. On duplicate keys the last row
    /// wins.
    pub fn retrieve_records_keyed(
        &self,
        sql: &str,
        id_column: &str,
    ) -> Result<HashMap<String, Record>> {
        let mut keyed = HashMap::new();
        for record in self.query_records(sql)? {
            let key = record.get(id_column).map(value_to_string).unwrap_or_default();
            keyed.insert(key, record);
        }
        Ok(keyed)
    }

    /// Retrieves a single row. When the statement yields several rows
    /// the last one wins; an empty result is `None`, not an error.
    pub fn retrieve_record_sql(&self, sql: &str) -> Result<Option<Record>> {
        Ok(self.query_records(sql)?.pop())
    }

    /// Retrieves an ordered id/label list of the distinct pairs. With no
    /// `label_column` the id doubles as the label.
    pub fn retrieve_list(
        &self,
        table: &str,
        id_column: &str,
        label_column: Option<&str>,
        filter: Option<&str>,
        group: Option<&str>,
        order: Option<&str>,
    ) -> Result<Vec<ListItem>> {
        let label_column = label_column.unwrap_or(id_column);
        let columns: Vec<&str> = if label_column == id_column {
            vec![id_column]
        } else {
            vec![id_column, label_column]
        };
        let sql = QuerySpec::new(table)
            .columns(&columns)
            .distinct()
            .filter(filter.unwrap_or(""))
            .group_by(group)
            .order_by(order)
            .build();

        let items = self
            .query_records(&sql)?
            .into_iter()
            .map(|record| {
                let id = record.get(id_column).map(value_to_string).unwrap_or_default();
                let label = record
                    .get(label_column)
                    .map(value_to_string)
                    .unwrap_or_else(|| id.clone());
                ListItem { id, label }
            })
            .collect();
        Ok(items)
    }

    /// Retrieves an id → label mapping. On duplicate ids the last row
    /// wins; result order is not preserved.
    pub fn retrieve_options(
        &self,
        table: &str,
        id_column: &str,
        label_column: Option<&str>,
        filter: Option<&str>,
        group: Option<&str>,
        order: Option<&str>,
    ) -> Result<HashMap<String, String>> {
        let items = self.retrieve_list(table, id_column, label_column, filter, group, order)?;
        Ok(items
            .into_iter()
            .map(|item| (item.id, item.label))
            .collect())
    }

    /// Retrieves distinct column combinations, fully materialized.
    pub fn retrieve_columns<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filter: Option<&str>,
        group: Option<&str>,
        order: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Vec<Record>> {
        let sql = QuerySpec::new(table)
            .columns(columns)
            .distinct()
            .filter(filter.unwrap_or(""))
            .group_by(group)
            .order_by(order)
            .limit(limit)
            .build();
        self.query_records(&sql)
    }

    /// Streams the selected columns of every matching row through `f`
    /// one at a time without materializing the result set. Duplicate
    /// rows are delivered as-is. Returns the number of rows delivered.
    /// The traversal is finite and not restartable.
    pub fn retrieve_columns_for_each<S, F>(
        &self,
        table: &str,
        columns: &[S],
        filter: Option<&str>,
        group: Option<&str>,
        order: Option<&str>,
        mut f: F,
    ) -> Result<usize>
    where
        S: AsRef<str>,
        F: FnMut(Record),
    {
        let sql = QuerySpec::new(table)
            .columns(columns)
            .filter(filter.unwrap_or(""))
            .group_by(group)
            .order_by(order)
            .build();
        debug!("sql = {}", sql);

        let mut stmt = self.conn.prepare(&sql).map_err(|e| query_error(&sql, e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([]).map_err(|e| query_error(&sql, e))?;
        let mut delivered = 0;
        while let Some(row) = rows.next().map_err(|e| query_error(&sql, e))? {
            f(record_from_row(row, &names).map_err(|e| query_error(&sql, e))?);
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Retrieves the selected columns of the first row matching
    /// `id_column = id`, with the id bound as a parameter.
    pub fn retrieve_values<S: AsRef<str>>(
        &self,
        table: &str,
        value_columns: &[S],
        id_column: &str,
        id: &Value,
        extra_where: Option<&str>,
    ) -> Result<Option<Record>> {
        let column_list: Vec<&str> = value_columns.iter().map(|c| c.as_ref()).collect();
        let mut sql = format!(
            "SELECT {} FROM {table} WHERE {id_column} = ?1",
            column_list.join(",")
        );
        if let Some(clause) = extra_where {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        let mut records = self.query_records_with(&sql, &[id as &dyn ToSql])?;
        if records.is_empty() {
            Ok(None)
        } else {
            Ok(Some(records.remove(0)))
        }
    }

    /// Retrieves a single scalar, optionally constrained to
    /// `key = value` (bound as a parameter) and an extra WHERE fragment.
    /// When several rows match the last one wins.
    pub fn retrieve_value(
        &self,
        table: &str,
        value_column: &str,
        key: Option<(&str, Value)>,
        extra_where: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut sql = format!("SELECT {value_column} FROM {table}");
        let mut clauses: Vec<String> = Vec::new();
        if let Some((column, _)) = &key {
            clauses.push(format!("{column} = ?1"));
        }
        if let Some(clause) = extra_where {
            clauses.push(clause.to_string());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        debug!("sql = {}", sql);

        let params: Vec<&dyn ToSql> = match &key {
            Some((_, value)) => vec![value as &dyn ToSql],
            None => Vec::new(),
        };
        let mut stmt = self.conn.prepare(&sql).map_err(|e| query_error(&sql, e))?;
        let mut rows = stmt.query(params.as_slice()).map_err(|e| query_error(&sql, e))?;
        let mut last = None;
        while let Some(row) = rows.next().map_err(|e| query_error(&sql, e))? {
            last = Some(row.get(0).map_err(|e| query_error(&sql, e))?);
        }
        Ok(last)
    }

    /// Retrieves a two-level hierarchy: the groups of
    /// `query.group_table` keyed by group id, each carrying its items
    /// from `query.item_table` keyed by item id. The group id is bound
    /// as a parameter of each item query. Groups with no items are
    /// dropped from the result.
    pub fn retrieve_group(&self, query: &GroupQuery) -> Result<HashMap<String, RecordGroup>> {
        let mut group_columns: Vec<&str> =
            query.group_columns.iter().map(String::as_str).collect();
        if !group_columns.iter().any(|c| *c == query.group_id) {
            group_columns.push(&query.group_id);
        }
        let group_sql = QuerySpec::new(&query.group_table)
            .columns(&group_columns)
            .order_by(query.group_order.as_deref())
            .build();
        let groups = self.query_records(&group_sql)?;

        let item_sql = QuerySpec::new(&query.item_table)
            .columns(&query.item_columns)
            .filter(&format!("{} = ?1", query.group_id))
            .filter(query.item_where.as_deref().unwrap_or(""))
            .order_by(query.item_order.as_deref())
            .build();

        let mut result = HashMap::new();
        for fields in groups {
            let group_id = match fields.get(&query.group_id) {
                Some(value) => value.clone(),
                None => continue,
            };
            let mut items = HashMap::new();
            for item in self.query_records_with(&item_sql, &[&group_id as &dyn ToSql])? {
                let key = item.get(&query.item_id).map(value_to_string).unwrap_or_default();
                items.insert(key, item);
            }
            if items.is_empty() {
                continue;
            }
            result.insert(value_to_string(&group_id), RecordGroup { fields, items });
        }
        Ok(result)
    }
}
