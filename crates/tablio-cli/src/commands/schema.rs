//! `tablio schema` command implementation

use crate::commands::open_database;
use crate::config::Config;
use crate::error::Result;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use tablio_engine::{SchemaCatalog, TableSchema};

/// Show the fields, unique key and bookkeeping columns of a table
pub async fn run(config: &Config, table: &str, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let schema = db.table(table)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else {
        print_schema(&schema);
    }
    Ok(())
}

fn print_schema(schema: &TableSchema) {
    println!("{} {}", "Table:".cyan().bold(), schema.name);
    println!("{}", fields_table(schema));

    let unique_key = if schema.has_unique_key() {
        schema.unique_key.join(", ")
    } else {
        "(none; every row is inserted)".to_string()
    };
    println!("  Unique key: {}", unique_key);
    println!("  Versioned:  {}", yes_no(schema.versioned));
    println!("  Stamped:    {}", yes_no(schema.stamped));
}

fn fields_table(schema: &TableSchema) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Field", "Kind", "Required", "Max length"]);

    for field in &schema.fields {
        table.add_row(vec![
            field.name.clone(),
            field.kind.as_str().to_string(),
            yes_no(field.required).to_string(),
            field.max_length.map(|n| n.to_string()).unwrap_or_default(),
        ]);
    }
    table
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
