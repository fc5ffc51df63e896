use std::path::Path;

use log::{debug, info};
use snafu::prelude::*;

use crate::classvote::*;

/// Guesses the input type from the extension when it is not given.
fn input_type_for(path: &str, input_type: Option<&str>) -> CliResult<String> {
    if let Some(t) = input_type {
        return Ok(t.to_lowercase());
    }
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
    {
        Some(ext) => Ok(ext),
        None => whatever!(
            "Cannot guess the type of {}, use --input-type csv or xlsx",
            path
        ),
    }
}

/// Reads the parent names of a roster file.
pub fn read_names(
    path: &str,
    input_type: Option<&str>,
    has_header: bool,
    worksheet: Option<&str>,
) -> CliResult<Vec<String>> {
    let input_type = input_type_for(path, input_type)?;
    info!("Reading parents from {:?} as {}", path, input_type);
    let cells = match input_type.as_str() {
        "csv" => io_csv::read_csv_names(path)?,
        "xlsx" | "excel" => io_excel::read_excel_names(path, worksheet)?,
        x => whatever!("Input type {:?} is not supported (csv or xlsx)", x),
    };
    Ok(clean_names(cells, has_header))
}

/// Drops the header and the blank cells.
pub fn clean_names(cells: Vec<String>, has_header: bool) -> Vec<String> {
    let skip = if has_header { 1 } else { 0 };
    let res: Vec<String> = cells
        .into_iter()
        .skip(skip)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    debug!("clean_names: {:?}", res);
    res
}

/// Letters and digits only, as used in the report file names.
pub fn simplify_class_name(class_name: &str) -> String {
    class_name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
