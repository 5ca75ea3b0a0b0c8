use crate::error::BatchError;
use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
use serde::Serialize;
use std::io::Cursor;

/// One recipient. `index` is the 0-based input row; names need not be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub index: usize,
    pub display_name: String,
}

impl Record {
    /// Builds a record from the first cell of a row, falling back to
    /// `user-<row number>` when the cell is missing or blank.
    pub fn from_cell(index: usize, cell: Option<&str>) -> Self {
        let display_name = match cell.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => fallback_label(index),
        };
        Self {
            index,
            display_name,
        }
    }
}

pub fn fallback_label(index: usize) -> String {
    format!("user-{}", index + 1)
}

/// Records from an in-memory list of first-column values.
pub fn records_from_names<I, S>(names: I) -> Vec<Record>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| Record::from_cell(index, Some(name.as_ref())))
        .collect()
}

/// Reads the first column of CSV text. When `has_header` is set the first
/// non-empty row is skipped. Quoted fields may contain commas, doubled quotes and line
/// breaks; rows that are entirely empty are ignored.
pub fn records_from_csv(input: &str, has_header: bool) -> Vec<Record> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let rows = csv_first_cells(input);
    let skip = usize::from(has_header);
    rows.into_iter()
        .filter(|row| !row.blank_line)
        .skip(skip)
        .enumerate()
        .map(|(index, row)| Record::from_cell(index, row.first.as_deref()))
        .collect()
}

/// Reads the first column of the first worksheet of an `.xlsx` workbook.
/// Header and empty-row handling match [`records_from_csv`].
pub fn records_from_xlsx(bytes: &[u8], has_header: bool) -> Result<Vec<Record>, BatchError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|err| BatchError::format(format!("unreadable workbook: {err}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BatchError::format("workbook has no worksheets"))?
        .map_err(|err| BatchError::format(format!("unreadable worksheet: {err}")))?;

    // The range starts at the first used cell; column A may be empty.
    let first_column_used = range.start().is_some_and(|(_, col)| col == 0);
    let skip = usize::from(has_header);
    let records = range
        .rows()
        .filter(|row| row.iter().any(|cell| !is_empty_cell(cell)))
        .skip(skip)
        .enumerate()
        .map(|(index, row)| {
            let first = row
                .first()
                .filter(|_| first_column_used)
                .filter(|cell| !is_empty_cell(cell))
                .map(|cell| cell.to_string());
            Record::from_cell(index, first.as_deref())
        })
        .collect();
    Ok(records)
}

fn is_empty_cell(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// One name per line; blank lines are skipped.
pub fn records_from_lines(input: &str) -> Vec<Record> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    records_from_names(input.lines().filter(|line| !line.trim().is_empty()))
}

#[derive(Debug, Default)]
struct CsvRow {
    first: Option<String>,
    blank_line: bool,
}

fn csv_first_cells(input: &str) -> Vec<CsvRow> {
    let mut rows = Vec::new();
    let mut chars = input.chars().peekable();
    let mut field = String::new();
    let mut first: Option<String> = None;
    let mut in_quotes = false;
    let mut column = 0usize;
    let mut row_has_content = false;

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' => {
                in_quotes = true;
                row_has_content = true;
            }
            ',' => {
                if column == 0 {
                    first = Some(std::mem::take(&mut field));
                }
                field.clear();
                column += 1;
                row_has_content = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if column == 0 {
                    first = Some(std::mem::take(&mut field));
                }
                rows.push(CsvRow {
                    blank_line: !row_has_content,
                    first: first.take().filter(|_| row_has_content),
                });
                field.clear();
                column = 0;
                row_has_content = false;
            }
            _ => {
                field.push(ch);
                row_has_content = true;
            }
        }
    }
    if row_has_content || column > 0 {
        if column == 0 {
            first = Some(field);
        }
        rows.push(CsvRow {
            first,
            blank_line: false,
        });
    }
    rows
}
