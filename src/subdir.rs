//! Path-hierarchy helper used by browse mode.
//!
//! ```text
//! subdir("listened/ABBA/Greatest Hits", "listened") = "listened/ABBA"
//! subdir("listened/ABBA/Greatest Hits", "")         = "listened"
//! subdir("listened/ABBA/Greatest Hits", "temp")     = NULL
//! subdir("listened", "listened")                    = NULL
//! ```

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

/// Name under which [`subdir`] is registered with SQLite.
pub const SQL_FUNCTION_NAME: &str = "subdir";

/// Returns `path` cut one level below `prefix`, or `None` when `path` has
/// nothing beneath `prefix`. Paths are raw bytes and need not be UTF-8.
pub fn subdir<'a>(path: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    let prefix_len = prefix
        .iter()
        .rposition(|byte| *byte != b'/')
        .map_or(0, |last| last + 1);
    let prefix = &prefix[..prefix_len];
    let rest = path.strip_prefix(prefix)?;

    let component_start = if prefix.is_empty() {
        if path.is_empty() {
            return None;
        }
        0
    } else {
        if rest.first() != Some(&b'/') {
            return None;
        }
        prefix.len() + 1
    };

    let component_end = path[component_start..]
        .iter()
        .position(|byte| *byte == b'/')
        .map_or(path.len(), |offset| component_start + offset);
    Some(&path[..component_end])
}

fn path_argument<'a>(ctx: &'a Context<'_>, index: usize, name: &str) -> rusqlite::Result<ValueRef<'a>> {
    match ctx.get_raw(index) {
        value @ (ValueRef::Text(_) | ValueRef::Blob(_)) => Ok(value),
        ValueRef::Null => Err(rusqlite::Error::UserFunctionError(
            format!("{name} parameter was NULL").into(),
        )),
        _ => Err(rusqlite::Error::UserFunctionError(
            format!("{name} parameter must be text").into(),
        )),
    }
}

fn argument_bytes<'a>(value: ValueRef<'a>) -> &'a [u8] {
    match value {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes,
        _ => &[],
    }
}

// Text paths stay text so they sort and compare alongside the plain
// `directory` rows of the union; anything else comes back as a blob.
fn sql_subdir(ctx: &Context<'_>) -> rusqlite::Result<Option<Value>> {
    let path = path_argument(ctx, 0, "path")?;
    let prefix = path_argument(ctx, 1, "prefix")?;
    let is_text = matches!(path, ValueRef::Text(_));
    let Some(found) = subdir(argument_bytes(path), argument_bytes(prefix)) else {
        return Ok(None);
    };
    Ok(Some(match std::str::from_utf8(found) {
        Ok(text) if is_text => Value::Text(text.to_string()),
        _ => Value::Blob(found.to_vec()),
    }))
}

/// Registers `subdir(path, prefix)` as a deterministic scalar function.
pub fn register(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        SQL_FUNCTION_NAME,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        sql_subdir,
    )
}
