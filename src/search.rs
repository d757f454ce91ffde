//! One request: parse, compile, execute, serialize.

use std::io::Write;

use log::{debug, error};
use rusqlite::Connection;

use crate::compiler::{CompileError, CompiledStatement};
use crate::query::QueryRequest;
use crate::serializer::{stream_rows, ResultWriter, SerializeError};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

impl SearchError {
    /// Value reported in the document's `error` field.
    pub fn code(&self) -> u32 {
        match self {
            SearchError::Compile(err) => err.code(),
            SearchError::Serialize(err) => err.code(),
        }
    }

    fn log(&self) {
        match self {
            SearchError::Compile(err) => {
                error!("query.build: Error 0x{:03x} (SQL error: {})", err.code(), err)
            }
            SearchError::Serialize(err) => {
                error!("query_run: Error 0x{:03x} ({})", err.code(), err)
            }
        }
    }
}

/// Answers `raw_query` against `conn`, always writing a complete document.
/// Returns the number of result rows written.
pub fn handle_request<W: Write>(
    conn: &Connection,
    raw_query: &str,
    out: &mut W,
) -> Result<usize, SearchError> {
    let request = QueryRequest::parse(raw_query);
    let compiled = CompiledStatement::compile(&request);
    debug!(
        "Compiled {:?} request: {} (bindings={}, placeholders={})",
        request.mode,
        compiled.sql(),
        compiled.bindings().len(),
        compiled.placeholder_count()
    );

    let mut writer = ResultWriter::begin(out).map_err(SerializeError::Write)?;
    let outcome = match compiled.prepare(conn) {
        Ok(mut stmt) => stream_rows(&mut stmt, &mut writer).map_err(SearchError::from),
        Err(err) => Err(SearchError::from(err)),
    };
    let code = outcome.as_ref().err().map(SearchError::code).unwrap_or(0);
    let finished = writer.finish(request.start, code);

    if let Err(err) = &outcome {
        err.log();
    }
    outcome?;
    let rows = finished.map_err(SerializeError::Write)?;
    debug!("Returned {} rows from offset {}", rows, request.start);
    Ok(rows)
}
