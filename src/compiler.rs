//! Compiles a [`QueryRequest`] into parameterized SQL.
//!
//! Identifiers only ever come from [`Column::name`]; every client value
//! travels as a numbered `?N` binding.

use std::collections::BTreeSet;

use rusqlite::{Connection, Statement};

use crate::column::Column;
use crate::query::{Filter, Mode, QueryRequest};
use crate::subdir;

/// Result columns starting with this marker exist only for sorting and are
/// never serialized.
pub const SYNTHETIC_COLUMN_PREFIX: char = '_';

const PROJECTED_COLUMNS: [&str; 11] = [
    "directory",
    "filename",
    "title",
    "artist",
    "album",
    "cover",
    "genre",
    "tracknumber",
    "tracktotal",
    "year",
    "duration",
];

const TRACK_SOURCE: &str = "FROM track \
     LEFT JOIN album USING (albumid) \
     LEFT JOIN artist USING (artistid) \
     LEFT JOIN genre USING (genreid)";

const PREPARE_ERROR_CODE: u32 = 0x700;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("failed to prepare statement: {0}")]
    Prepare(#[source] rusqlite::Error),
    #[error("failed to bind parameter {index}: {source}")]
    Bind {
        index: usize,
        #[source]
        source: rusqlite::Error,
    },
}

impl CompileError {
    pub fn code(&self) -> u32 {
        match self {
            CompileError::Prepare(_) => PREPARE_ERROR_CODE,
            CompileError::Bind { index, .. } => PREPARE_ERROR_CODE | (*index as u32 & 0xff),
        }
    }
}

/// SQL text plus the values for `?1..?N`, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    sql: String,
    bindings: Vec<String>,
}

impl CompiledStatement {
    pub fn compile(request: &QueryRequest) -> Self {
        let mut builder = StatementBuilder::new(synthetic_sort_columns(request));
        builder.push_select();

        let mut browse_binding = None;
        for filter in &request.filters {
            let binding = match request.mode {
                Mode::Tracks => builder.push_track_lookup(filter),
                Mode::Search => builder.push_match(filter, MatchKind::Substring),
                Mode::Exact | Mode::Browse => builder.push_match(filter, MatchKind::Equal),
            };
            if request.mode == Mode::Browse && filter.column == Column::Directory {
                browse_binding = binding;
            }
        }

        if request.mode == Mode::Browse {
            let prefix_binding = match browse_binding {
                Some(binding) => binding,
                None => builder.push_root_directory(),
            };
            builder.push_subdirectory_union(prefix_binding);
        }

        builder.push_group(&request.group);
        builder.push_order(request);
        builder.push_window(request.start, request.count);
        builder.finish()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }

    /// Number of distinct `?N` placeholders in the SQL text.
    pub fn placeholder_count(&self) -> usize {
        let mut numbers = BTreeSet::new();
        for (position, _) in self.sql.match_indices('?') {
            let digits: String = self.sql[position + 1..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(number) = digits.parse::<usize>() {
                numbers.insert(number);
            }
        }
        numbers.len()
    }

    /// Prepares the statement and binds every value.
    pub fn prepare<'conn>(&self, conn: &'conn Connection) -> Result<Statement<'conn>, CompileError> {
        let mut stmt = conn.prepare(&self.sql).map_err(CompileError::Prepare)?;
        for (offset, value) in self.bindings.iter().enumerate() {
            let index = offset + 1;
            stmt.raw_bind_parameter(index, value.as_str())
                .map_err(|source| CompileError::Bind { index, source })?;
        }
        Ok(stmt)
    }
}

#[derive(Debug, Clone, Copy)]
enum MatchKind {
    Substring,
    Equal,
}

impl MatchKind {
    fn operator(self) -> &'static str {
        match self {
            MatchKind::Substring => "LIKE",
            MatchKind::Equal => "=",
        }
    }

    fn binding(self, value: &str) -> String {
        match self {
            MatchKind::Substring => format!("%{value}%"),
            MatchKind::Equal => value.to_string(),
        }
    }
}

/// Text cast columns for raw columns used in `sort`, so a `UNION` can sort
/// on them.
fn synthetic_sort_columns(request: &QueryRequest) -> String {
    let mut seen = Vec::new();
    let mut columns = String::new();
    for spec in &request.sort {
        if spec.column.is_raw() && !seen.contains(&spec.column) {
            seen.push(spec.column);
            let name = spec.column.name();
            columns.push_str(&format!(
                ", CAST({name} AS TEXT) AS {SYNTHETIC_COLUMN_PREFIX}{name}_text"
            ));
        }
    }
    columns
}

fn comparison(column: Column, kind: MatchKind, placeholder: usize, or_null: bool) -> String {
    let compare = format!("{} {} ?{placeholder}", column.text_expr(), kind.operator());
    if or_null {
        format!("{compare} OR {} IS NULL", column.name())
    } else {
        compare
    }
}

struct StatementBuilder {
    sql: String,
    bindings: Vec<String>,
    conditions: usize,
    synthetic_columns: String,
}

impl StatementBuilder {
    fn new(synthetic_columns: String) -> Self {
        Self {
            sql: String::new(),
            bindings: Vec::new(),
            conditions: 0,
            synthetic_columns,
        }
    }

    fn bind(&mut self, value: String) -> usize {
        self.bindings.push(value);
        self.bindings.len()
    }

    fn push_condition(&mut self, conjunction: &str, condition: &str) {
        if self.conditions == 0 {
            self.sql.push_str(" WHERE ");
        } else {
            self.sql.push(' ');
            self.sql.push_str(conjunction);
            self.sql.push(' ');
        }
        self.sql.push_str(condition);
        self.conditions += 1;
    }

    fn push_select(&mut self) {
        self.sql.push_str("SELECT ");
        self.sql.push_str(&PROJECTED_COLUMNS.join(", "));
        self.sql.push_str(&self.synthetic_columns);
        self.sql.push(' ');
        self.sql.push_str(TRACK_SOURCE);
    }

    fn push_track_lookup(&mut self, filter: &Filter) -> Option<usize> {
        if filter.column != Column::Filename {
            return None;
        }
        let placeholder = self.bind(filter.value.clone());
        self.push_condition(
            "OR",
            &format!("(directory || '/' || filename) = ?{placeholder}"),
        );
        Some(placeholder)
    }

    fn push_match(&mut self, filter: &Filter, kind: MatchKind) -> Option<usize> {
        let placeholder = self.bind(kind.binding(&filter.value));
        let or_null = filter.value.is_empty();
        let condition = if filter.column == Column::Any {
            let disjuncts: Vec<String> = Column::concrete()
                .map(|column| comparison(column, kind, placeholder, or_null))
                .collect();
            format!("({})", disjuncts.join(" OR "))
        } else if or_null {
            format!("({})", comparison(filter.column, kind, placeholder, true))
        } else {
            comparison(filter.column, kind, placeholder, false)
        };
        self.push_condition("AND", &condition);
        Some(placeholder)
    }

    /// Browsing without a `directory` filter lists the root.
    fn push_root_directory(&mut self) -> usize {
        let placeholder = self.bind(String::new());
        self.push_condition("AND", &format!("directory = ?{placeholder}"));
        placeholder
    }

    fn push_subdirectory_union(&mut self, prefix_binding: usize) {
        self.sql.push_str(&format!(
            " UNION ALL SELECT {}(directory, ?{prefix_binding}) AS subdir",
            subdir::SQL_FUNCTION_NAME
        ));
        for name in &PROJECTED_COLUMNS[1..] {
            self.sql.push_str(&format!(", NULL AS {name}"));
        }
        self.sql.push_str(&self.synthetic_columns);
        self.sql.push_str(
            " FROM track LEFT JOIN album USING (albumid) WHERE subdir NOT NULL GROUP BY subdir",
        );
    }

    fn push_group(&mut self, group: &[Column]) {
        if group.is_empty() {
            return;
        }
        let names: Vec<&str> = group.iter().map(|column| column.name()).collect();
        self.sql.push_str(" GROUP BY ");
        self.sql.push_str(&names.join(", "));
    }

    fn push_order(&mut self, request: &QueryRequest) {
        if request.sort.is_empty() {
            return;
        }
        let terms: Vec<String> = request
            .sort
            .iter()
            .map(|spec| {
                format!(
                    "{} COLLATE NOCASE {}",
                    spec.column.name(),
                    spec.direction.as_sql()
                )
            })
            .collect();
        self.sql.push_str(" ORDER BY ");
        self.sql.push_str(&terms.join(", "));
    }

    fn push_window(&mut self, start: u32, count: u32) {
        self.sql
            .push_str(&format!(" LIMIT {count} OFFSET {start}"));
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement {
            sql: self.sql,
            bindings: self.bindings,
        }
    }
}
