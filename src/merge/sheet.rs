//! First-sheet spreadsheet I/O.

use std::io::Write;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Reader, Xlsx};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{DocProperties, ExcelDateTime, Format, Workbook, XlsxError};

use crate::error::{PipelineError, Result};

const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// A header row plus data rows, read from the first worksheet of a workbook.
///
/// Rows are rebased to start at `A1` and padded to the header width. Blank
/// rows between data rows are kept as rows; trailing blank rows are not.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub path: PathBuf,
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Data>>,
}

impl Sheet {
    pub fn read(path: &Path) -> Result<Self> {
        let mut workbook: Xlsx<_> =
            open_workbook(path).map_err(|e| PipelineError::spreadsheet(path, e))?;

        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| PipelineError::spreadsheet(path, "workbook has no worksheets"))?;
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| PipelineError::spreadsheet(path, e))?;

        let mut rows = range.rows();
        let header: Vec<String> = rows
            .next()
            .ok_or_else(|| PipelineError::spreadsheet(path, "worksheet has no header row"))?
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut rows: Vec<Vec<Data>> = rows
            .map(|row| {
                let mut row = row.to_vec();
                row.resize(header.len(), Data::Empty);
                row
            })
            .collect();
        while rows
            .last()
            .is_some_and(|row| row.iter().all(is_blank))
        {
            rows.pop();
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            header,
            rows,
        })
    }

    /// Index of the column headed `name`.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Numeric value of a quantity cell. Empty cells have no value.
    ///
    /// `row` is the zero-based data row, reported one-based after the header.
    pub fn quantity(&self, row: usize, column: usize) -> Result<Option<Decimal>> {
        let cell = &self.rows[row][column];
        let invalid = || PipelineError::InvalidCell {
            path: self.path.clone(),
            column: self.header[column].clone(),
            row: row + 2,
            value: cell.to_string(),
        };

        match cell {
            Data::Empty => Ok(None),
            Data::Int(value) => Ok(Some(Decimal::from(*value))),
            Data::Float(value) => Decimal::from_f64(*value)
                .map(|d| Some(d.normalize()))
                .ok_or_else(invalid),
            Data::String(value) if value.trim().is_empty() => Ok(None),
            Data::String(value) => value
                .trim()
                .parse::<Decimal>()
                .map(Some)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    /// Serialize as a single-sheet workbook.
    ///
    /// The document creation time is pinned so identical sheets produce
    /// identical files.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let created = ExcelDateTime::from_ymd(2000, 1, 1)?;
        workbook.set_properties(&DocProperties::new().set_creation_datetime(&created));

        let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let worksheet = workbook.add_worksheet();
        if !self.name.is_empty() && self.name != DEFAULT_SHEET_NAME {
            worksheet.set_name(&self.name)?;
        }

        for (col, title) in self.header.iter().enumerate() {
            worksheet.write_string(0, col_index(col)?, title)?;
        }

        for (i, row) in self.rows.iter().enumerate() {
            let row_num = row_index(i + 1)?;
            for (col, cell) in row.iter().enumerate() {
                let col = col_index(col)?;
                match cell {
                    Data::Empty => {}
                    Data::Int(value) => {
                        worksheet.write_number(row_num, col, *value as f64)?;
                    }
                    Data::Float(value) => {
                        worksheet.write_number(row_num, col, *value)?;
                    }
                    Data::Bool(value) => {
                        worksheet.write_boolean(row_num, col, *value)?;
                    }
                    Data::DateTime(value) => {
                        worksheet.write_number_with_format(
                            row_num,
                            col,
                            value.as_f64(),
                            &date_format,
                        )?;
                    }
                    Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
                        worksheet.write_string(row_num, col, value)?;
                    }
                    Data::Error(value) => {
                        worksheet.write_string(row_num, col, value.to_string())?;
                    }
                }
            }
        }

        workbook.save_to_buffer()
    }

    /// Write the workbook to `path` via a temporary sibling file, so a failed
    /// write never leaves a truncated output behind.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let bytes = self
            .to_xlsx()
            .map_err(|e| PipelineError::spreadsheet(path, e))?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new()
            .prefix(".stocksync-")
            .suffix(".xlsx.tmp")
            .tempfile_in(parent)
            .map_err(|e| {
                PipelineError::io(format!("Failed to create temp file in {}", parent.display()), e)
            })?;

        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| PipelineError::io(format!("Failed to write {}", path.display()), e))?;
        tmp.persist(path)
            .map_err(|e| PipelineError::io(format!("Failed to replace {}", path.display()), e.error))?;

        Ok(())
    }
}

/// Textual identity of a product id cell. Integral numbers render without a
/// fractional part so `101` and `"101"` name the same product.
pub fn product_key(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(format!("{}", *value as i64))
        }
        other => Some(other.to_string()),
    }
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(value) => value.trim().is_empty(),
        _ => false,
    }
}

fn row_index(i: usize) -> Result<u32, XlsxError> {
    u32::try_from(i).map_err(|_| XlsxError::RowColumnLimitError)
}

fn col_index(i: usize) -> Result<u16, XlsxError> {
    u16::try_from(i).map_err(|_| XlsxError::RowColumnLimitError)
}
