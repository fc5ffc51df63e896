// Primitives for reading CSV rosters.

use log::debug;
use snafu::prelude::*;

use crate::classvote::*;

/// The first field of every line. Lines may have different lengths.
pub fn read_csv_names(path: &str) -> CliResult<Vec<String>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut res: Vec<String> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 1;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_csv_names: lineno: {:?} line: {:?}", lineno, line);
        res.push(line.get(0).unwrap_or("").to_string());
    }
    Ok(res)
}
