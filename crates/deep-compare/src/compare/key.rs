//! Row matching keys.

use crate::core::Row;

use super::criteria::ResolvedCriteria;

/// Derive the matching key of a row.
///
/// Parts are `name:value` pairs, sorted and joined with `|`. With an include
/// list only those columns are used; otherwise every column is used except
/// excluded ones and, while `skip_id_columns` is set, columns named `id`
/// (case-insensitive). Byte values are formatted as text.
pub fn derive_key(row: &Row, criteria: &ResolvedCriteria) -> String {
    let mut parts: Vec<String> = if criteria.columns.is_empty() {
        row.iter()
            .filter(|(col, _)| !criteria.is_excluded(col))
            .filter(|(col, _)| !criteria.skip_id_columns || !col.eq_ignore_ascii_case("id"))
            .map(|(col, val)| format!("{}:{}", col, val.normalized()))
            .collect()
    } else {
        criteria
            .columns
            .iter()
            .filter(|col| !criteria.is_excluded(col))
            .filter_map(|col| row.get(col).map(|val| format!("{}:{}", col, val.normalized())))
            .collect()
    };

    parts.sort();
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria(exclude: &[&str]) -> ResolvedCriteria {
        ResolvedCriteria::excluding(exclude)
    }

    #[test]
    fn test_sorted_and_joined() {
        let row = Row::from_json(json!({"user_id": 7, "amount": 10}));
        assert_eq!(derive_key(&row, &criteria(&[])), "amount:10|user_id:7");
    }

    #[test]
    fn test_storage_order_independent() {
        let a = Row::new().with("b", "x").with("a", 1).with("c", true);
        let b = Row::new().with("c", true).with("a", 1).with("b", "x");
        assert_eq!(derive_key(&a, &criteria(&[])), derive_key(&b, &criteria(&[])));
    }

    #[test]
    fn test_id_skipped_unless_included() {
        let row = Row::from_json(json!({"ID": 1, "name": "ann"}));
        assert_eq!(derive_key(&row, &criteria(&[])), "name:ann");

        let mut with_pk = criteria(&[]);
        with_pk.skip_id_columns = false;
        assert_eq!(derive_key(&row, &with_pk), "ID:1|name:ann");
    }

    #[test]
    fn test_include_list_skips_excluded_and_absent() {
        let row = Row::from_json(json!({"id": 1, "name": "ann", "email": "a@x"}));
        let resolved = ResolvedCriteria::new(
            vec!["name".into(), "email".into(), "missing".into(), "id".into()],
            &["email".to_string()],
            Vec::new(),
            false,
        );
        // Include lists bypass the id heuristic.
        assert_eq!(derive_key(&row, &resolved), "id:1|name:ann");
    }

    #[test]
    fn test_bytes_formatted_as_text() {
        let bytes = Row::new().with("code", b"AB".to_vec());
        let text = Row::new().with("code", "AB");
        assert_eq!(derive_key(&bytes, &criteria(&[])), derive_key(&text, &criteria(&[])));
    }

    #[test]
    fn test_all_excluded_collapses_to_empty_key() {
        let a = Row::from_json(json!({"x": 1, "y": 2}));
        let b = Row::from_json(json!({"x": 3, "y": 4}));
        let c = criteria(&["x", "y"]);
        assert_eq!(derive_key(&a, &c), "");
        assert_eq!(derive_key(&a, &c), derive_key(&b, &c));
    }
}
