//! Corrective SQL script rendering.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::core::ReferencingColumn;
use crate::postgres::quote_ident;

/// Render a transaction that repoints every referencing column from
/// `old_id` to `new_id` and then deletes the `old_id` row.
///
/// Each UPDATE only touches rows still holding `old_id`, so running the
/// script twice changes nothing the second time.
pub fn render_corrective_script(
    schema: &str,
    table: &str,
    pk_column: &str,
    old_id: &str,
    new_id: &str,
    constraints: &[ReferencingColumn],
    generated_at: DateTime<Utc>,
) -> String {
    let old = sql_literal(old_id);
    let new = sql_literal(new_id);
    let mut script = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(script, "-- Generated FK Update Script");
    let _ = writeln!(script, "-- Target table: {}.{}", schema, table);
    let _ = writeln!(
        script,
        "-- Update FK references from ID {} to ID {}",
        old_id, new_id
    );
    let _ = writeln!(
        script,
        "-- Generated at: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(script, "-- WARNING: Review this script before execution!");
    let _ = writeln!(script);
    let _ = writeln!(script, "BEGIN;");
    let _ = writeln!(script);
    let _ = writeln!(script, "-- Update foreign key references");

    for (i, fk) in constraints.iter().enumerate() {
        if i > 0 {
            let _ = writeln!(script);
        }
        let _ = writeln!(
            script,
            "-- Table: {}.{}, Column: {} ({})",
            fk.schema, fk.table_name, fk.column_name, fk.constraint_name
        );
        let column = quote_ident(&fk.column_name);
        let _ = writeln!(
            script,
            "UPDATE {}.{} SET {} = {} WHERE {} = {};",
            quote_ident(&fk.schema),
            quote_ident(&fk.table_name),
            column,
            new,
            column,
            old
        );
    }
    if constraints.is_empty() {
        let _ = writeln!(script, "-- No foreign key constraints reference this table");
    }

    let _ = writeln!(script);
    let _ = writeln!(script, "-- Delete original record");
    let _ = writeln!(
        script,
        "DELETE FROM {}.{} WHERE {} = {};",
        quote_ident(schema),
        quote_ident(table),
        quote_ident(pk_column),
        old
    );
    let _ = writeln!(script);
    let _ = writeln!(script, "COMMIT;");
    let _ = writeln!(script);
    let _ = writeln!(script, "-- Script execution completed");
    let _ = writeln!(script, "-- Verify results and check referential integrity");

    script
}

/// Integers verbatim, anything else as a quoted string literal.
pub fn sql_literal(value: &str) -> String {
    if value.parse::<i64>().is_ok() {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}
