//! SQLite-backed store.
//!
//! One [`Database`] per call scope; every pipeline call that writes more
//! than one row opens its own transaction on the wrapped connection.
//! Timestamps are stored as RFC 3339 text and are always offset-aware.

pub mod models;
mod schema;

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection};

use crate::errors::{IngestError, Result};
pub use models::{
    ContentKind, ImportCounts, NewTrip, Photo, PhotoContent, PhotoContentInfo, Track,
    TrackPoint, TrackSegment, Trip, TripUpdate, Waypoint,
};
pub use schema::SCHEMA;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Cascading deletes depend on this; SQLite defaults it off.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Raw connection access for pipeline modules that manage their own
    /// transactions.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // Trip operations
    // ========================================================================

    pub fn create_trip(&self, new: &NewTrip) -> Result<Trip> {
        let zone = new.zone.as_deref().unwrap_or("UTC");
        self.conn.execute(
            r#"
            INSERT INTO trips (name, start_time, end_time, zone, title, brief, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                new.name,
                new.start.map(|dt| dt.to_rfc3339()),
                new.end.map(|dt| dt.to_rfc3339()),
                zone,
                new.title,
                new.brief,
                new.description,
            ],
        )?;
        self.trip(self.conn.last_insert_rowid())
    }

    pub fn trip(&self, trip_id: i64) -> Result<Trip> {
        let row = self.conn.query_row(
            r#"
            SELECT id, name, start_time, end_time, zone, title, brief, description
            FROM trips WHERE id = ?
            "#,
            [trip_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            },
        );
        let (id, name, start, end, zone, title, brief, description) = match row {
            Ok(values) => values,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(IngestError::TripNotFound(trip_id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Trip {
            id,
            name,
            start: parse_time_column(start)?,
            end: parse_time_column(end)?,
            zone,
            title,
            brief,
            description,
        })
    }

    /// Apply a partial update. Changing the zone never rewrites stored
    /// instants; it only affects how later naive timestamps are read.
    pub fn update_trip(&self, trip_id: i64, update: &TripUpdate) -> Result<Trip> {
        let current = self.trip(trip_id)?;
        let name = update.name.clone().unwrap_or(current.name);
        let start = update.start.or(current.start);
        let end = update.end.or(current.end);
        let zone = update.zone.clone().unwrap_or(current.zone);
        let title = update.title.clone().or(current.title);
        let brief = update.brief.clone().or(current.brief);
        let description = update.description.clone().or(current.description);
        self.conn.execute(
            r#"
            UPDATE trips
            SET name = ?, start_time = ?, end_time = ?, zone = ?, title = ?, brief = ?, description = ?
            WHERE id = ?
            "#,
            params![
                name,
                start.map(|dt| dt.to_rfc3339()),
                end.map(|dt| dt.to_rfc3339()),
                zone,
                title,
                brief,
                description,
                trip_id,
            ],
        )?;
        self.trip(trip_id)
    }

    /// Remove a trip; the store cascades to tracks, segments, points,
    /// waypoints, photos and photo content.
    pub fn delete_trip(&self, trip_id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM trips WHERE id = ?", [trip_id])?;
        Ok(())
    }

    pub fn trip_zone(&self, trip_id: i64) -> Result<String> {
        match self.conn.query_row(
            "SELECT zone FROM trips WHERE id = ?",
            [trip_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(zone) => Ok(zone),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(IngestError::TripNotFound(trip_id)),
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // Track hierarchy reads
    // ========================================================================

    pub fn tracks_for_trip(&self, trip_id: i64) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, name, description FROM tracks WHERE trip_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map([trip_id], |row| {
            Ok(Track {
                id: row.get(0)?,
                trip_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn segments_for_track(&self, track_id: i64) -> Result<Vec<TrackSegment>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, track_id FROM track_segments WHERE track_id = ? ORDER BY id")?;
        let rows = stmt.query_map([track_id], |row| {
            Ok(TrackSegment {
                id: row.get(0)?,
                track_id: row.get(1)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Points of a segment in chronological order (untimed points first,
    /// then by recorded instant).
    pub fn points_for_segment(&self, segment_id: i64) -> Result<Vec<TrackPoint>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, segment_id, time, latitude, longitude, elevation
            FROM track_points WHERE segment_id = ? ORDER BY time
            "#,
        )?;
        let raw = stmt.query_map([segment_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
            ))
        })?;
        let mut points = Vec::new();
        for row in raw {
            let (id, segment_id, time, latitude, longitude, elevation) = row?;
            points.push(TrackPoint {
                id,
                segment_id,
                time: parse_time_column(time)?,
                latitude,
                longitude,
                elevation,
            });
        }
        Ok(points)
    }

    pub fn waypoints_for_trip(&self, trip_id: i64) -> Result<Vec<Waypoint>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, trip_id, name, description, time, latitude, longitude, elevation
            FROM waypoints WHERE trip_id = ? ORDER BY id
            "#,
        )?;
        let raw = stmt.query_map([trip_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<f64>>(7)?,
            ))
        })?;
        let mut waypoints = Vec::new();
        for row in raw {
            let (id, trip_id, name, description, time, latitude, longitude, elevation) = row?;
            waypoints.push(Waypoint {
                id,
                trip_id,
                name,
                description,
                time: parse_time_column(time)?,
                latitude,
                longitude,
                elevation,
            });
        }
        Ok(waypoints)
    }

    pub fn delete_track(&self, track_id: i64) -> Result<()> {
        self.conn.execute("DELETE FROM tracks WHERE id = ?", [track_id])?;
        Ok(())
    }

    // ========================================================================
    // Photo reads
    // ========================================================================

    pub fn photo(&self, photo_id: i64) -> Result<Photo> {
        let row = self.conn.query_row(
            r#"
            SELECT id, trip_id, name, format, time, description
            FROM photos WHERE id = ?
            "#,
            [photo_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        );
        let (id, trip_id, name, format, time, description) = match row {
            Ok(values) => values,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(IngestError::PhotoNotFound(photo_id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Photo {
            id,
            trip_id,
            name,
            format,
            time: parse_time_column(time)?,
            description,
        })
    }

    pub fn photos_for_trip(&self, trip_id: i64) -> Result<Vec<Photo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, trip_id, name, format, time, description
            FROM photos WHERE trip_id = ? ORDER BY id
            "#,
        )?;
        let raw = stmt.query_map([trip_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut photos = Vec::new();
        for row in raw {
            let (id, trip_id, name, format, time, description) = row?;
            photos.push(Photo {
                id,
                trip_id,
                name,
                format,
                time: parse_time_column(time)?,
                description,
            });
        }
        Ok(photos)
    }

    pub fn photo_content(&self, photo_id: i64, kind: ContentKind) -> Result<Option<PhotoContent>> {
        let row = self.conn.query_row(
            r#"
            SELECT id, photo_id, kind, size_bytes, sha256, data
            FROM photo_content WHERE photo_id = ? AND kind = ?
            "#,
            params![photo_id, kind.as_str()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                ))
            },
        );
        let (id, photo_id, kind, size_bytes, sha256, data) = match row {
            Ok(values) => values,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(PhotoContent {
            id,
            photo_id,
            kind: ContentKind::from_db(&kind)?,
            size_bytes,
            sha256,
            data,
        }))
    }

    pub fn content_info_for_photo(&self, photo_id: i64) -> Result<Vec<PhotoContentInfo>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, photo_id, kind, size_bytes, sha256
            FROM photo_content WHERE photo_id = ? ORDER BY id
            "#,
        )?;
        let raw = stmt.query_map([photo_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut infos = Vec::new();
        for row in raw {
            let (id, photo_id, kind, size_bytes, sha256) = row?;
            infos.push(PhotoContentInfo {
                id,
                photo_id,
                kind: ContentKind::from_db(&kind)?,
                size_bytes,
                sha256,
            });
        }
        Ok(infos)
    }
}

pub(crate) fn parse_time_column(value: Option<String>) -> Result<Option<DateTime<FixedOffset>>> {
    match value {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(Some)
            .map_err(|_| IngestError::UnparsableTimestamp(text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn create_and_fetch_trip() {
        let db = test_db();
        let trip = db
            .create_trip(&NewTrip {
                name: "Eiger circuit".to_string(),
                zone: Some("Europe/Zurich".to_string()),
                ..NewTrip::default()
            })
            .unwrap();
        assert_eq!(trip.name, "Eiger circuit");
        assert_eq!(trip.zone, "Europe/Zurich");
        assert_eq!(db.trip_zone(trip.id).unwrap(), "Europe/Zurich");
    }

    #[test]
    fn zone_defaults_to_utc() {
        let db = test_db();
        let trip = db
            .create_trip(&NewTrip {
                name: "Unzoned".to_string(),
                ..NewTrip::default()
            })
            .unwrap();
        assert_eq!(trip.zone, "UTC");
    }

    #[test]
    fn missing_trip_is_reported() {
        let db = test_db();
        assert!(matches!(db.trip(99), Err(IngestError::TripNotFound(99))));
        assert!(matches!(db.trip_zone(99), Err(IngestError::TripNotFound(99))));
    }

    #[test]
    fn open_creates_parent_directories_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hikelog.db");
        {
            let db = Database::open(&path).unwrap();
            db.initialize().unwrap();
            db.create_trip(&NewTrip {
                name: "Persisted".to_string(),
                ..NewTrip::default()
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        assert_eq!(db.trip(1).unwrap().name, "Persisted");
    }

    /// Builds one row in every child table under a trip, straight SQL.
    fn populate_hierarchy(db: &Database, trip_id: i64) {
        let conn = db.conn();
        conn.execute("INSERT INTO tracks (trip_id, name) VALUES (?, 'Ascent')", [trip_id])
            .unwrap();
        let track_id = conn.last_insert_rowid();
        conn.execute("INSERT INTO track_segments (track_id) VALUES (?)", [track_id])
            .unwrap();
        let segment_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO track_points (segment_id, latitude, longitude) VALUES (?, 46.5, 8.0)",
            [segment_id],
        )
        .unwrap();
        conn.execute("INSERT INTO waypoints (trip_id, name) VALUES (?, 'Hut')", [trip_id])
            .unwrap();
        conn.execute(
            "INSERT INTO photos (trip_id, name, format) VALUES (?, 'summit.png', 'PNG')",
            [trip_id],
        )
        .unwrap();
        let photo_id = conn.last_insert_rowid();
        conn.execute(
            r#"
            INSERT INTO photo_content (photo_id, kind, size_bytes, sha256, data)
            VALUES (?, 'original', 3, 'abc', x'010203')
            "#,
            [photo_id],
        )
        .unwrap();
    }

    fn row_count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn deleting_a_trip_cascades_to_every_child_table() {
        let db = test_db();
        let trip = db
            .create_trip(&NewTrip {
                name: "Doomed".to_string(),
                ..NewTrip::default()
            })
            .unwrap();
        populate_hierarchy(&db, trip.id);

        db.delete_trip(trip.id).unwrap();

        for table in [
            "trips",
            "tracks",
            "track_segments",
            "track_points",
            "waypoints",
            "photos",
            "photo_content",
        ] {
            assert_eq!(row_count(&db, table), 0, "{table} not emptied");
        }
    }

    #[test]
    fn deleting_a_track_cascades_but_leaves_the_trip() {
        let db = test_db();
        let trip = db
            .create_trip(&NewTrip {
                name: "Keeper".to_string(),
                ..NewTrip::default()
            })
            .unwrap();
        populate_hierarchy(&db, trip.id);

        let tracks = db.tracks_for_trip(trip.id).unwrap();
        db.delete_track(tracks[0].id).unwrap();

        assert_eq!(row_count(&db, "tracks"), 0);
        assert_eq!(row_count(&db, "track_segments"), 0);
        assert_eq!(row_count(&db, "track_points"), 0);
        assert_eq!(row_count(&db, "waypoints"), 1);
        assert_eq!(row_count(&db, "photos"), 1);
        assert!(db.trip(trip.id).is_ok());
    }

    #[test]
    fn zone_update_does_not_touch_stored_instants() {
        let db = test_db();
        let start = DateTime::parse_from_rfc3339("2022-05-07T06:00:00+00:00").unwrap();
        let trip = db
            .create_trip(&NewTrip {
                name: "Zoned".to_string(),
                start: Some(start),
                ..NewTrip::default()
            })
            .unwrap();
        let updated = db
            .update_trip(
                trip.id,
                &TripUpdate {
                    zone: Some("America/Denver".to_string()),
                    ..TripUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.zone, "America/Denver");
        assert_eq!(updated.start, Some(start));
    }
}
