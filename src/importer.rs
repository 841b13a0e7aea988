//! Persists a parsed GPX hierarchy under a trip.
//!
//! One call is one transaction: either the full waypoint/track/segment/point
//! hierarchy of the upload lands, or none of it does.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::db::{Database, ImportCounts};
use crate::errors::Result;
use crate::gpx::{GpxElement, GpxTrack, GpxTrackSegment, GpxWaypoint};

/// Write every element of a parsed document under `trip_id`, returning the
/// exact counts of created rows.
///
/// Bare segments and points at the top level are legal parser output but
/// have no parent to hang off; they are logged and skipped rather than
/// failing the upload.
pub fn import_elements(
    db: &Database,
    trip_id: i64,
    elements: &[GpxElement],
) -> Result<ImportCounts> {
    db.trip(trip_id)?;

    let tx = db.conn().unchecked_transaction()?;
    let mut counts = ImportCounts::default();

    for element in elements {
        match element {
            GpxElement::Waypoint(wpt) => {
                insert_waypoint(&tx, trip_id, wpt)?;
                counts.waypoints += 1;
            }
            GpxElement::Track(trk) => {
                let (segments, points) = insert_track(&tx, trip_id, trk)?;
                counts.tracks += 1;
                counts.segments += segments;
                counts.points += points;
            }
            other => {
                warn!(?other, "skipping element with no parent track");
            }
        }
    }

    tx.commit()?;
    debug!(
        trip_id,
        waypoints = counts.waypoints,
        tracks = counts.tracks,
        segments = counts.segments,
        points = counts.points,
        "import committed"
    );
    Ok(counts)
}

fn insert_waypoint(conn: &Connection, trip_id: i64, wpt: &GpxWaypoint) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO waypoints (trip_id, name, description, time, latitude, longitude, elevation)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            trip_id,
            wpt.name,
            wpt.description,
            wpt.time.map(|dt| dt.to_rfc3339()),
            wpt.latitude,
            wpt.longitude,
            wpt.elevation,
        ],
    )?;
    Ok(())
}

fn insert_track(conn: &Connection, trip_id: i64, trk: &GpxTrack) -> Result<(usize, usize)> {
    conn.execute(
        "INSERT INTO tracks (trip_id, name, description) VALUES (?, ?, ?)",
        params![trip_id, trk.name, trk.description],
    )?;
    let track_id = conn.last_insert_rowid();

    let mut points = 0;
    for segment in &trk.segments {
        points += insert_segment(conn, track_id, segment)?;
    }
    Ok((trk.segments.len(), points))
}

fn insert_segment(conn: &Connection, track_id: i64, segment: &GpxTrackSegment) -> Result<usize> {
    conn.execute(
        "INSERT INTO track_segments (track_id) VALUES (?)",
        [track_id],
    )?;
    let segment_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO track_points (segment_id, time, latitude, longitude, elevation)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )?;
    for point in &segment.points {
        stmt.execute(params![
            segment_id,
            point.time.map(|dt| dt.to_rfc3339()),
            point.latitude,
            point.longitude,
            point.elevation,
        ])?;
    }
    Ok(segment.points.len())
}
