//! Streams result rows into the JSON response document.
//!
//! Each row is assembled into a [`ResultRow`] before anything is written, so
//! a mid-stream failure leaves a well-formed document behind.

use std::io::{self, Write};

use rusqlite::types::ValueRef;
use rusqlite::{Row, Statement};

use crate::compiler::SYNTHETIC_COLUMN_PREFIX;

/// Fields whose values are percent-encoded rather than emitted verbatim.
const URL_ENCODED_FIELDS: [&str; 3] = ["filename", "directory", "cover"];

const SUBDIR_COLUMN: &str = "subdir";

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("failed to step result rows: {0}")]
    Step(#[source] rusqlite::Error),
    #[error("unexpected column name {name:?} at position {index}")]
    UnexpectedColumnName { index: usize, name: String },
    #[error("unexpected value type for column {name:?} at position {index}")]
    UnexpectedType { index: usize, name: String },
    #[error("failed to write response: {0}")]
    Write(#[from] io::Error),
}

impl SerializeError {
    pub fn code(&self) -> u32 {
        match self {
            SerializeError::Step(_) => 0x101,
            SerializeError::UnexpectedColumnName { index, .. }
            | SerializeError::UnexpectedType { index, .. } => 0x300 | (*index as u32 & 0xff),
            SerializeError::Write(_) => 0x400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    /// Already percent-encoded where the field requires it.
    Text(String),
}

/// One output record, in result-column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    pub fields: Vec<(String, FieldValue)>,
}

impl ResultRow {
    fn push(&mut self, name: &str, value: FieldValue) {
        self.fields.push((name.to_string(), value));
    }

    /// Builds a record from one engine row, applying the field rules.
    pub fn from_row(row: &Row<'_>, column_names: &[String]) -> Result<Self, SerializeError> {
        let mut record = Self::default();
        for (index, column_name) in column_names.iter().enumerate() {
            if column_name.starts_with(SYNTHETIC_COLUMN_PREFIX) {
                continue;
            }
            let is_subdir = column_name == SUBDIR_COLUMN;
            let name = if is_subdir {
                "directory"
            } else if column_name.contains(' ') || column_name.contains('(') {
                return Err(SerializeError::UnexpectedColumnName {
                    index,
                    name: column_name.clone(),
                });
            } else {
                column_name.as_str()
            };

            let value = match row.get_ref(index).map_err(SerializeError::Step)? {
                // Directory-only rows from the browse union end here.
                ValueRef::Null if name == "filename" => break,
                ValueRef::Null => FieldValue::Null,
                ValueRef::Integer(number) => FieldValue::Integer(number),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    FieldValue::Text(encode_text(name, bytes))
                }
                ValueRef::Real(_) => {
                    return Err(SerializeError::UnexpectedType {
                        index,
                        name: column_name.clone(),
                    })
                }
            };
            record.push(name, value);

            if is_subdir {
                break;
            }
        }
        Ok(record)
    }
}

fn encode_text(field: &str, bytes: &[u8]) -> String {
    if URL_ENCODED_FIELDS.contains(&field) {
        percent_encode(bytes)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Percent-encodes everything except ASCII alphanumerics and `-._/`.
pub fn percent_encode(bytes: &[u8]) -> String {
    urlencoding::encode_binary(bytes)
        .replace("%2F", "/")
        .replace('~', "%7E")
}

/// Incremental writer for the `{"results": [...], "start", "count", "error"}`
/// document.
pub struct ResultWriter<'w, W: Write> {
    out: &'w mut W,
    rows: usize,
}

impl<'w, W: Write> ResultWriter<'w, W> {
    pub fn begin(out: &'w mut W) -> io::Result<Self> {
        out.write_all(b"{\n  \"results\": [")?;
        Ok(Self { out, rows: 0 })
    }

    pub fn write_row(&mut self, row: &ResultRow) -> io::Result<()> {
        let mut buffer = Vec::new();
        let row_separator: &[u8] = if self.rows == 0 { b"\n" } else { b",\n" };
        buffer.extend_from_slice(row_separator);
        buffer.extend_from_slice(b"    {");
        for (position, (name, value)) in row.fields.iter().enumerate() {
            let field_separator: &[u8] = if position == 0 { b"\n" } else { b",\n" };
            buffer.extend_from_slice(field_separator);
            buffer.extend_from_slice(b"      ");
            serde_json::to_writer(&mut buffer, name)?;
            buffer.extend_from_slice(b": ");
            serde_json::to_writer(&mut buffer, value)?;
        }
        buffer.extend_from_slice(b"\n    }");
        self.out.write_all(&buffer)?;
        self.rows += 1;
        Ok(())
    }

    /// Closes the document; `count` is the number of rows actually written.
    pub fn finish(mut self, start: u32, error: u32) -> io::Result<usize> {
        writeln!(self.out, "\n  ],")?;
        writeln!(self.out, "  \"start\": {start},")?;
        writeln!(self.out, "  \"count\": {},", self.rows)?;
        writeln!(self.out, "  \"error\": {error}")?;
        writeln!(self.out, "}}")?;
        self.out.flush()?;
        Ok(self.rows)
    }
}

/// Steps `stmt` to completion, writing one record per row.
pub fn stream_rows<W: Write>(
    stmt: &mut Statement<'_>,
    writer: &mut ResultWriter<'_, W>,
) -> Result<(), SerializeError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(SerializeError::Step)? {
        let record = ResultRow::from_row(row, &column_names)?;
        writer.write_row(&record)?;
    }
    Ok(())
}
