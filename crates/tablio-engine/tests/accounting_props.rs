//! Property tests for import run accounting

use std::sync::Arc;

use proptest::prelude::*;
use tablio_engine::audit::AuditLog;
use tablio_engine::storage::MemoryDatabase;
use tablio_engine::{ChunkProcessor, FieldDef, ImportOutcome, ImportPolicy, RunContext, TableSchema};

#[derive(Debug, Clone, Copy)]
enum Row {
    Good,
    Bad,
    Blank,
}

fn row_strategy() -> impl Strategy<Value = Row> {
    prop_oneof![
        6 => Just(Row::Good),
        3 => Just(Row::Bad),
        1 => Just(Row::Blank),
    ]
}

fn schema() -> TableSchema {
    TableSchema::new("items")
        .field(FieldDef::text("code").required())
        .field(FieldDef::integer("qty"))
        .unique_key(["code"])
        .versioned()
}

fn render(rows: &[Row]) -> String {
    let mut csv = String::from("code,qty\n");
    for (i, row) in rows.iter().enumerate() {
        match row {
            Row::Good => csv.push_str(&format!("I{},{}\n", i, i)),
            Row::Bad => csv.push_str(&format!("I{},not-a-number\n", i)),
            Row::Blank => csv.push_str(",\n"),
        }
    }
    csv
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_row_is_accounted_for(
        rows in prop::collection::vec(row_strategy(), 0..60),
        chunk_size in 0usize..12,
        rate in 0u8..=100,
    ) {
        let db = Arc::new(MemoryDatabase::new().with_table(schema()).unwrap());
        let processor = ChunkProcessor::new(db.clone(), db.clone());
        let policy = ImportPolicy::builder()
            .chunk_size(chunk_size)
            .error_tolerance_rate(rate)
            .build()
            .unwrap();
        let ctx = RunContext::new("prop");

        let summary = processor
            .run(render(&rows).as_bytes(), "items.csv", &schema(), &policy, &ctx)
            .unwrap();
        let entries = db.entries(&ctx.batch_id).unwrap();

        // logged rows and counters agree
        prop_assert_eq!(
            summary.rows_imported + summary.rows_skipped + summary.rows_discarded,
            entries.len() as u64
        );
        prop_assert_eq!(
            summary.rows_read,
            summary.header_rows + summary.blank_rows + entries.len() as u64
        );
        prop_assert_eq!(db.records("items").unwrap().len() as u64, summary.rows_imported);

        // row numbers are unique and increasing
        prop_assert!(entries.windows(2).all(|w| w[0].row_number < w[1].row_number));

        match summary.outcome {
            ImportOutcome::Completed => {
                prop_assert_eq!(summary.rows_read, rows.len() as u64 + 1);
            }
            ImportOutcome::Aborted { error_count, error_limit } => {
                prop_assert!(chunk_size > 0);
                prop_assert!(error_count > error_limit);
                prop_assert_eq!(entries.len(), summary.chunks * chunk_size);
            }
        }
    }
}
