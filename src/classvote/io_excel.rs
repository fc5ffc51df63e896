use calamine::{open_workbook, DataType, Range, Reader, Xlsx};
use log::debug;
use snafu::prelude::*;

use crate::classvote::*;

fn get_range(path: &str, worksheet: Option<&str>) -> CliResult<Range<DataType>> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let range = match worksheet {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    };
    range
        .context(EmptyExcelSnafu {})?
        .context(OpeningExcelSnafu { path })
}

/// The first cell of every row of the worksheet (the first one by default).
pub fn read_excel_names(path: &str, worksheet: Option<&str>) -> CliResult<Vec<String>> {
    let wrange = get_range(path, worksheet)?;
    let mut res: Vec<String> = Vec::new();
    for (idx, row) in wrange.rows().enumerate() {
        debug!("read_excel_names: idx: {:?} row: {:?}", idx, row);
        res.push(read_name_cell(row.get(0), idx as u64 + 1)?);
    }
    Ok(res)
}

fn read_name_cell(cell: Option<&DataType>, lineno: u64) -> CliResult<String> {
    match cell {
        Some(DataType::String(s)) => Ok(s.clone()),
        Some(DataType::Empty) | None => Ok("".to_string()),
        Some(x) => Err(CliError::ExcelWrongCellType {
            lineno,
            content: format!("{:?}", x),
        }),
    }
}
