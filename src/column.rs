//! Whitelist of track columns that clients may filter, group, or sort on.
//!
//! Client-supplied names never reach SQL text directly; they are resolved
//! into a [`Column`] first and only its canonical name is interpolated.

/// Queryable track column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Pseudo-column matching against every concrete column.
    Any,
    Directory,
    Filename,
    Title,
    Album,
    Artist,
    Genre,
    TrackNumber,
}

struct ColumnDef {
    column: Column,
    name: &'static str,
    raw: bool,
}

// Raw columns are stored as blobs and need a text cast before comparison.
const COLUMNS: [ColumnDef; 8] = [
    ColumnDef {
        column: Column::Any,
        name: "any",
        raw: false,
    },
    ColumnDef {
        column: Column::Directory,
        name: "directory",
        raw: true,
    },
    ColumnDef {
        column: Column::Filename,
        name: "filename",
        raw: true,
    },
    ColumnDef {
        column: Column::Title,
        name: "title",
        raw: false,
    },
    ColumnDef {
        column: Column::Album,
        name: "album",
        raw: false,
    },
    ColumnDef {
        column: Column::Artist,
        name: "artist",
        raw: false,
    },
    ColumnDef {
        column: Column::Genre,
        name: "genre",
        raw: false,
    },
    ColumnDef {
        column: Column::TrackNumber,
        name: "tracknumber",
        raw: false,
    },
];

impl Column {
    /// Resolves a client-supplied name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        COLUMNS
            .iter()
            .rev()
            .find(|def| def.name.eq_ignore_ascii_case(name))
            .map(|def| def.column)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        COLUMNS.get(index).map(|def| def.column)
    }

    /// Number of whitelisted columns, including `any`.
    pub const fn count() -> usize {
        COLUMNS.len()
    }

    /// Every column except the `any` pseudo-column, in whitelist order.
    pub fn concrete() -> impl Iterator<Item = Column> {
        (0..Self::count())
            .filter_map(Self::from_index)
            .filter(|column| *column != Column::Any)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lowercase name, safe for SQL identifier position.
    pub fn name(self) -> &'static str {
        COLUMNS[self.index()].name
    }

    pub fn is_raw(self) -> bool {
        COLUMNS[self.index()].raw
    }

    /// Expression comparing this column as text.
    pub fn text_expr(self) -> String {
        if self.is_raw() {
            format!("CAST({} AS TEXT)", self.name())
        } else {
            self.name().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, COLUMNS};

    #[test]
    fn test_every_whitelist_entry_round_trips_through_name_and_index() {
        for (index, def) in COLUMNS.iter().enumerate() {
            let column = Column::from_name(def.name).expect("whitelisted name should resolve");
            assert_eq!(column.name(), def.name);
            assert_eq!(column.index(), index);
            assert_eq!(Column::from_index(index), Some(column));
        }
        assert_eq!(Column::count(), 8);
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(Column::from_name("ARTIST"), Some(Column::Artist));
        assert_eq!(Column::from_name("TrackNumber"), Some(Column::TrackNumber));
        assert_eq!(Column::from_name("Any"), Some(Column::Any));
    }

    #[test]
    fn test_unknown_names_and_indices_do_not_resolve() {
        assert_eq!(Column::from_name(""), None);
        assert_eq!(Column::from_name("year"), None);
        assert_eq!(Column::from_name("artist; DROP TABLE track"), None);
        assert_eq!(Column::from_name(" artist"), None);
        assert_eq!(Column::from_index(Column::count()), None);
    }

    #[test]
    fn test_raw_columns_are_cast_to_text() {
        assert!(Column::Directory.is_raw());
        assert!(Column::Filename.is_raw());
        assert!(!Column::Title.is_raw());
        assert_eq!(Column::Filename.text_expr(), "CAST(filename AS TEXT)");
        assert_eq!(Column::Genre.text_expr(), "genre");
    }

    #[test]
    fn test_concrete_columns_skip_any() {
        let names: Vec<&str> = Column::concrete().map(Column::name).collect();
        assert_eq!(
            names,
            vec![
                "directory",
                "filename",
                "title",
                "album",
                "artist",
                "genre",
                "tracknumber"
            ]
        );
    }
}
