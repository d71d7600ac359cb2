//! Property-based tests for SQL generation and criteria translation
//!
//! These tests verify the correctness of the query builder through
//! property-based testing, ensuring that:
//! - Generated templates are deterministic and well-formed
//! - Escaping never lets a quote terminate a literal early
//! - Criteria and range translation round-trips against live SQLite

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rusqlite::types::Value;

    use batchlite::db::builder::{
        build_insert, build_update, escape_literal, filter_clause, quote, sort_clause, Criteria,
        QuerySpec, Range,
    };
    use batchlite::{Database, DatabaseConfig};

    // Test infrastructure

    fn memory_db() -> Database {
        let mut db = Database::open(&DatabaseConfig::new(":memory:")).unwrap();
        db.execute_one("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)", false)
            .unwrap();
        db
    }

    fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,29}".prop_map(|s: String| s)
    }

    fn arb_columns() -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set(arb_identifier(), 1..8)
            .prop_map(|set| set.into_iter().collect())
    }

    proptest! {
        #[test]
        fn insert_template_placeholder_count_matches_columns(
            table in arb_identifier(),
            columns in arb_columns(),
            replace in any::<bool>(),
        ) {
            let (sql, params) = build_insert(&table, &columns, replace);
            prop_assert_eq!(params.len(), columns.len());
            prop_assert_eq!(sql.matches(':').count(), columns.len());
            prop_assert!(sql.ends_with(')'));
            prop_assert_eq!(replace, sql.starts_with("INSERT OR REPLACE"));
        }

        #[test]
        fn update_template_appends_id_parameter(
            table in arb_identifier(),
            columns in arb_columns(),
            id_column in arb_identifier(),
        ) {
            let (sql, params) = build_update(&table, &columns, &id_column);
            prop_assert_eq!(params.len(), columns.len() + 1);
            prop_assert_eq!(params.last().map(String::as_str), Some(id_column.as_str()));
            let expected = format!("WHERE {id_column} = :{id_column}");
            prop_assert!(sql.contains(&expected));
        }

        #[test]
        fn escaping_doubles_every_quote(text in ".*") {
            let escaped = escape_literal(&text);
            // Every quote in the escaped text is part of a '' pair.
            let mut chars = escaped.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\'' {
                    prop_assert_eq!(chars.next(), Some('\''));
                }
            }
            prop_assert_eq!(quote(&text).len(), escaped.len() + 2);
        }

        #[test]
        fn quoted_literal_round_trips_through_sqlite(text in "[^\u{0}]{0,50}") {
            let db = memory_db();
            let value = db
                .retrieve_value("(SELECT 1)", &format!("{} AS v", quote(&text)), None, None)
                .unwrap();
            prop_assert_eq!(value, Some(Value::Text(text)));
        }

        #[test]
        fn sort_clause_keeps_field_name(field in arb_identifier()) {
            prop_assert_eq!(
                sort_clause(&format!("sort(+{field})")),
                Some(format!("{field} ASC"))
            );
            prop_assert_eq!(
                sort_clause(&format!("sort(-{field})")),
                Some(format!("{field} DESC"))
            );
            prop_assert_eq!(sort_clause(&field), None);
        }

        #[test]
        fn filter_clause_is_safe_against_quotes(
            field in arb_identifier(),
            value in "[^*]{0,40}",
        ) {
            let clause = filter_clause(&field, &value);
            // An embedded quote must never leave the literal unbalanced.
            prop_assert_eq!(clause.matches('\'').count() % 2, 0);
            prop_assert!(clause.starts_with(&field));
        }

        #[test]
        fn criteria_partition_filters_and_sorts(
            fields in prop::collection::vec(arb_identifier(), 0..5),
            sorts in prop::collection::vec(arb_identifier(), 0..5),
        ) {
            let pairs: Vec<(String, String)> = fields
                .iter()
                .map(|f| (f.clone(), "x".to_string()))
                .chain(sorts.iter().map(|s| (format!("sort(+{s})"), String::new())))
                .collect();
            let criteria = Criteria::from_pairs(pairs);
            prop_assert_eq!(criteria.filters.len(), fields.len());
            prop_assert_eq!(criteria.sorts.len(), sorts.len());
            prop_assert_eq!(criteria.where_clause().is_none(), fields.is_empty());
            prop_assert_eq!(criteria.order_clause().is_none(), sorts.is_empty());
        }

        #[test]
        fn range_parse_is_consistent(start in 0u64..10_000, span in 0u64..500) {
            let range = Range::parse(&format!("items={start}-{}", start + span)).unwrap();
            prop_assert_eq!(range.offset, start);
            prop_assert_eq!(range.count, span + 1);
            prop_assert_eq!(
                range.limit_clause(),
                Some(format!("{} OFFSET {}", span + 1, start))
            );

            let open = Range::parse(&format!("items={start}-")).unwrap();
            prop_assert_eq!(open.count, 0);
            prop_assert_eq!(open.limit_clause(), None);
        }

        #[test]
        fn query_spec_clause_order_is_fixed(
            table in arb_identifier(),
            filters in prop::collection::vec(arb_identifier(), 0..4),
            order in prop::option::of(arb_identifier()),
            limit in prop::option::of(1u64..100),
        ) {
            let fragments: Vec<String> =
                filters.iter().map(|f| format!("{f} = 1")).collect();
            let sql = QuerySpec::new(&table)
                .filters(&fragments)
                .order_by(order.as_deref())
                .limit(limit.map(|l| l.to_string()).as_deref())
                .build();

            let expected_prefix = format!("SELECT * FROM {table}");
            prop_assert!(sql.starts_with(&expected_prefix));
            prop_assert_eq!(sql.contains(" WHERE "), !filters.is_empty());
            prop_assert_eq!(sql.contains(" ORDER BY "), order.is_some());
            prop_assert_eq!(sql.contains(" LIMIT "), limit.is_some());
            if let (Some(w), Some(o)) = (sql.find(" WHERE "), sql.find(" ORDER BY ")) {
                prop_assert!(w < o);
            }
            if let (Some(o), Some(l)) = (sql.find(" ORDER BY "), sql.find(" LIMIT ")) {
                prop_assert!(o < l);
            }
        }
    }
}
