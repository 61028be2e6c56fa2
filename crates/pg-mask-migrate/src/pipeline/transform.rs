//! Transform stage: masks configured columns and tracks the cursor maximum.

use crate::config::TableSpec;
use crate::core::value::RowSet;
use crate::masking::MaskingEngine;

/// Masked rows plus the watermark candidate they imply.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub rows: RowSet,
    /// Highest integer cursor value seen, seeded from the current watermark.
    pub watermark: i64,
}

/// Mask `rows` according to the table's rules.
///
/// Rules naming columns absent from the result are ignored. Only integer
/// cursor values move the watermark.
pub fn transform(mut rows: RowSet, spec: &TableSpec, engine: &MaskingEngine, watermark: i64) -> Transformed {
    let cursor_idx = rows.column_index(&spec.incremental_column);
    let masked: Vec<(usize, _)> = spec
        .columns
        .iter()
        .filter_map(|(column, rule)| rows.column_index(column).map(|idx| (idx, rule)))
        .collect();

    let mut max = watermark;
    for row in &mut rows.rows {
        if let Some(value) = cursor_idx.and_then(|i| row.get(i)).and_then(|v| v.as_i64()) {
            max = max.max(value);
        }
        for (idx, rule) in &masked {
            if let Some(cell) = row.get_mut(*idx) {
                *cell = engine.apply(rule, cell);
            }
        }
    }

    Transformed { rows, watermark: max }
}
