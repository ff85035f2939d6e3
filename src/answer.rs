//! Collapse a result set into display text.

use crate::database::{ResultSet, SqlValue};

/// Single cell → its value as text (`NULL` becomes `"0"`, since a lone
/// scalar is almost always a count or sum). Anything else → indented JSON of
/// all rows, keys in result-column order, non-ASCII kept as is.
pub fn reduce(result: &ResultSet) -> String {
    if let [row] = result.rows.as_slice() {
        if let [(_, value)] = row.cells() {
            return match value {
                SqlValue::Null => "0".to_string(),
                other => other.to_string(),
            };
        }
    }

    serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Row;

    fn single(value: SqlValue) -> ResultSet {
        ResultSet {
            columns: vec!["cnt".into()],
            rows: vec![Row::new(vec![("cnt".into(), value)])],
        }
    }

    #[test]
    fn scalar_is_returned_as_text() {
        assert_eq!(reduce(&single(SqlValue::Integer(42))), "42");
        assert_eq!(reduce(&single(SqlValue::Text("Анна".into()))), "Анна");
        assert_eq!(reduce(&single(SqlValue::Real(2.5))), "2.5");
    }

    #[test]
    fn null_scalar_becomes_zero() {
        assert_eq!(reduce(&single(SqlValue::Null)), "0");
    }

    #[test]
    fn multiple_rows_become_indented_json() {
        let rs = ResultSet {
            columns: vec!["username".into(), "views".into()],
            rows: vec![
                Row::new(vec![
                    ("username".into(), SqlValue::Text("анна".into())),
                    ("views".into(), SqlValue::Integer(10)),
                ]),
                Row::new(vec![
                    ("username".into(), SqlValue::Text("boris".into())),
                    ("views".into(), SqlValue::Null),
                ]),
            ],
        };
        let text = reduce(&rs);
        assert_eq!(
            text,
            "[\n  {\n    \"username\": \"анна\",\n    \"views\": 10\n  },\n  {\n    \"username\": \"boris\",\n    \"views\": null\n  }\n]"
        );
    }

    #[test]
    fn one_row_with_many_columns_is_not_a_scalar() {
        let rs = ResultSet {
            columns: vec!["a".into(), "b".into()],
            rows: vec![Row::new(vec![
                ("a".into(), SqlValue::Integer(1)),
                ("b".into(), SqlValue::Integer(2)),
            ])],
        };
        assert!(reduce(&rs).starts_with('['));
    }

    #[test]
    fn empty_result() {
        assert_eq!(reduce(&ResultSet::default()), "[]");
    }
}
