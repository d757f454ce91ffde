//! Request model and the permissive query-string parser.
//!
//! Parsing never fails: unknown keys, unresolvable columns, and malformed
//! numbers are dropped or defaulted.

use crate::column::Column;

pub const DEFAULT_COUNT: u32 = 100;

/// Query shape requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Case-insensitive substring match.
    #[default]
    Search,
    /// Equality match.
    Exact,
    /// Equality match plus the immediate subdirectories of `directory`.
    Browse,
    /// Lookup of specific tracks by `directory/filename`.
    Tracks,
}

impl Mode {
    /// Unrecognized values fall back to [`Mode::Search`].
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("browse") {
            Mode::Browse
        } else if value.eq_ignore_ascii_case("tracks") {
            Mode::Tracks
        } else if value.eq_ignore_ascii_case("exact") {
            Mode::Exact
        } else {
            Mode::Search
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parses `<column>[+|-]`. The later of the last `+` and the last `-`
    /// decides the direction; everything from it onward is discarded.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let plus = token.rfind('+');
        let minus = token.rfind('-');
        let (name, direction) = match (plus, minus) {
            (Some(p), Some(m)) if m > p => (&token[..m], SortDirection::Descending),
            (None, Some(m)) => (&token[..m], SortDirection::Descending),
            (Some(p), _) => (&token[..p], SortDirection::Ascending),
            (None, None) => (token, SortDirection::Ascending),
        };
        let name = name.trim_end();
        if name.is_empty() {
            return None;
        }
        Column::from_name(name).map(|column| SortSpec { column, direction })
    }
}

/// A column filter as supplied by the client, value not yet escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: Column,
    pub value: String,
}

/// Fully parsed search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub mode: Mode,
    pub sort: Vec<SortSpec>,
    pub group: Vec<Column>,
    pub start: u32,
    pub count: u32,
    pub filters: Vec<Filter>,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            mode: Mode::Search,
            sort: Vec::new(),
            group: Vec::new(),
            start: 0,
            count: DEFAULT_COUNT,
            filters: Vec::new(),
        }
    }
}

impl QueryRequest {
    /// Parses a URL query string such as `mode=browse&directory=listened`.
    pub fn parse(query_string: &str) -> Self {
        let mut request = Self::default();
        let query_string = query_string.strip_prefix('?').unwrap_or(query_string);

        for pair in query_string.split('&').filter(|pair| !pair.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key);
            let value = decode_component(raw_value);
            request.apply(&key, value);
        }

        request
    }

    fn apply(&mut self, key: &str, value: String) {
        if key.eq_ignore_ascii_case("mode") {
            self.mode = Mode::parse(&value);
        } else if key.eq_ignore_ascii_case("group") {
            self.group
                .extend(value.split(',').filter_map(Column::from_name));
        } else if key.eq_ignore_ascii_case("sort") {
            self.sort.extend(value.split(',').filter_map(SortSpec::parse));
        } else if key.eq_ignore_ascii_case("start") {
            self.start = parse_non_negative(&value);
        } else if key.eq_ignore_ascii_case("count") {
            self.count = parse_non_negative(&value);
        } else if let Some(column) = Column::from_name(key) {
            self.filters.push(Filter { column, value });
        }
    }
}

/// Percent-decodes a form component, treating `+` as a space.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// `atoi`-style integer prefix parse, clamped to `0..=u32::MAX`.
fn parse_non_negative(value: &str) -> u32 {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let mut parsed: u64 = 0;
    let mut seen_digit = false;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        seen_digit = true;
        parsed = parsed
            .saturating_mul(10)
            .saturating_add(u64::from(byte - b'0'));
    }
    if negative || !seen_digit {
        return 0;
    }
    u32::try_from(parsed).unwrap_or(u32::MAX)
}
