use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::subdir;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite open: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite create function: {0}")]
    RegisterFunction(#[source] rusqlite::Error),
}

/// Read-only handle to the track index with `subdir` registered.
pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn open_read_only(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| DbError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, DbError> {
        subdir::register(&conn).map_err(DbError::RegisterFunction)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::DbManager;
    use rusqlite::{params, Connection};

    fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE album (
                albumid INTEGER PRIMARY KEY,
                album TEXT,
                cover BLOB,
                year INTEGER
            );
            CREATE TABLE artist (
                artistid INTEGER PRIMARY KEY,
                artist TEXT
            );
            CREATE TABLE genre (
                genreid INTEGER PRIMARY KEY,
                genre TEXT
            );
            CREATE TABLE track (
                trackid INTEGER PRIMARY KEY,
                directory BLOB NOT NULL,
                filename BLOB NOT NULL,
                title TEXT,
                tracknumber INTEGER,
                tracktotal INTEGER,
                duration INTEGER,
                albumid INTEGER REFERENCES album(albumid),
                artistid INTEGER REFERENCES artist(artistid),
                genreid INTEGER REFERENCES genre(genreid)
            );",
        )
    }

    fn insert_track(
        conn: &Connection,
        directory: &str,
        filename: &str,
        title: Option<&str>,
        tracknumber: Option<i64>,
        album_artist_genre: (Option<i64>, Option<i64>, Option<i64>),
    ) -> Result<(), rusqlite::Error> {
        let (albumid, artistid, genreid) = album_artist_genre;
        conn.execute(
            "INSERT INTO track (directory, filename, title, tracknumber, tracktotal, duration,
                                albumid, artistid, genreid)
             VALUES (?1, ?2, ?3, ?4, 12, 180, ?5, ?6, ?7)",
            params![directory, filename, title, tracknumber, albumid, artistid, genreid],
        )?;
        Ok(())
    }

    /// Small in-memory library:
    ///
    /// ```text
    /// loose.ogg
    /// incoming/new track.flac
    /// listened/ABBA/Greatest Hits/{Dancing Queen,Waterloo}.mp3
    /// listened/ABBA/Arrival/Money, Money, Money.mp3
    /// listened/Queen/Bohemian Rhapsody.mp3
    /// ```
    pub(crate) fn seeded_library() -> DbManager {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO album VALUES (1, 'Greatest Hits', 'listened/ABBA/Greatest Hits/cover art.jpg', 1992);
             INSERT INTO album VALUES (2, 'Arrival', NULL, 1976);
             INSERT INTO artist VALUES (1, 'ABBA');
             INSERT INTO artist VALUES (2, 'Queen');
             INSERT INTO genre VALUES (1, 'Pop');
             INSERT INTO genre VALUES (2, 'Rock');",
        )
        .expect("lookup rows");

        let tracks: [(&str, &str, Option<&str>, Option<i64>, (Option<i64>, Option<i64>, Option<i64>)); 6] = [
            ("", "loose.ogg", None, None, (None, None, None)),
            ("incoming", "new track.flac", Some("New \"Track\""), None, (None, None, None)),
            ("listened/ABBA/Greatest Hits", "Dancing Queen.mp3", Some("Dancing Queen"), Some(1), (Some(1), Some(1), Some(1))),
            ("listened/ABBA/Greatest Hits", "Waterloo.mp3", Some("Waterloo"), Some(2), (Some(1), Some(1), Some(1))),
            ("listened/ABBA/Arrival", "Money, Money, Money.mp3", Some("Money, Money, Money"), Some(3), (Some(2), Some(1), Some(1))),
            ("listened/Queen", "Bohemian Rhapsody.mp3", Some("Bohemian Rhapsody"), Some(11), (None, Some(2), Some(2))),
        ];
        for (directory, filename, title, tracknumber, ids) in tracks {
            insert_track(&conn, directory, filename, title, tracknumber, ids).expect("track row");
        }

        DbManager::from_connection(conn).expect("register functions")
    }
}

#[cfg(test)]
mod tests {
    use super::{DbError, DbManager};
    use std::path::Path;

    #[test]
    fn test_open_missing_database_reports_path() {
        let path = Path::new("/nonexistent/quasar-search/library.db");
        let err = match DbManager::open_read_only(path) {
            Ok(_) => panic!("opening a missing read-only database should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, DbError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/quasar-search/library.db"));
    }

    #[test]
    fn test_seeded_library_has_subdir_registered() {
        let db = super::test_support::seeded_library();
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(DISTINCT subdir(directory, 'listened')) FROM track",
                [],
                |row| row.get(0),
            )
            .expect("subdir query");
        assert_eq!(count, 2);
    }
}
