//! CSV import and export of datasets.

use crate::domain::data::{Dataset, Value};
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::info;

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let file = File::open(path).with_context(|| format!("Failed to open dataset {}", path.display()))?;
    let dataset = read_dataset(BufReader::new(file))?;
    info!(
        "Loaded dataset {:?}: {} rows, {} columns",
        path,
        dataset.n_rows(),
        dataset.n_columns()
    );
    Ok(dataset)
}

pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        bail!("CSV has no columns");
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Invalid CSV record {}", line + 1))?;
        for (column, cell) in columns.iter_mut().zip(record.iter()) {
            column.push(parse_cell(cell));
        }
    }

    let mut dataset = Dataset::new();
    for (name, values) in headers.into_iter().zip(columns) {
        dataset.push_column(name, values)?;
    }
    Ok(dataset)
}

pub fn write_dataset<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let names = dataset.column_names();
    wtr.write_record(&names).context("Failed to write CSV header")?;

    let columns: Vec<&[Value]> = names.iter().filter_map(|name| dataset.column(name)).collect();
    for row in 0..dataset.n_rows() {
        let record: Vec<String> = columns.iter().map(|column| format_cell(&column[row])).collect();
        wtr.write_record(&record)
            .with_context(|| format!("Failed to write CSV row {}", row + 1))?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

pub fn save_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_dataset(dataset, file)?;
    info!("Saved dataset {:?}: {} rows", path, dataset.n_rows());
    Ok(())
}

fn parse_cell(cell: &str) -> Value {
    let cell = cell.trim();
    match cell {
        "" | "NA" => Value::Null,
        "TRUE" | "true" => Value::Bool(true),
        "FALSE" | "false" => Value::Bool(false),
        _ => match cell.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(cell.to_string()),
        },
    }
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "NA".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Number(n) if n.is_nan() => "NA".to_string(),
        Value::Number(n) => n.to_string(),
        Value::Text(s) => s.clone(),
        Value::Vector(items) => items.iter().map(format_cell).collect::<Vec<_>>().join(";"),
    }
}
