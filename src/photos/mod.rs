//! Photo ingestion pipeline.
//!
//! Two operations move a photo through its states: `ingest` stores the
//! original bytes with best-effort capture-time extraction, and
//! `process_pending` lazily derives the downscaled web rendition for a
//! bounded batch of photos that do not have one yet.

pub mod convert;
pub mod exif;

use std::path::Path;

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::{ContentKind, Database, Photo};
use crate::errors::{IngestError, Result};
use crate::timestamp;

pub use convert::{Converter, ImageToolConverter, WEB_BOX_PX, WEB_SOURCE_DPI};

/// The pipeline context: store handle plus the external conversion seam,
/// constructed per call scope and passed in explicitly.
pub struct PhotoPipeline<'a> {
    db: &'a Database,
    converter: &'a dyn Converter,
}

impl<'a> PhotoPipeline<'a> {
    pub fn new(db: &'a Database, converter: &'a dyn Converter) -> Self {
        Self { db, converter }
    }

    /// Store one uploaded photo under a trip.
    ///
    /// The format is sniffed from the byte header. A capture time found in
    /// the image metadata is interpreted in the trip's zone; absence of
    /// metadata is not an error. Photo row and original content row are
    /// written in one transaction.
    pub fn ingest(&self, trip_id: i64, filename: &str, data: &[u8]) -> Result<Photo> {
        let zone = self.db.trip_zone(trip_id)?;
        let format = sniff_format(data)?;
        let time = match exif::capture_time(data) {
            Some(naive) => Some(timestamp::to_instant(naive, Some(&zone))?),
            None => None,
        };

        let tx = self.db.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO photos (trip_id, name, format, time) VALUES (?, ?, ?, ?)",
            params![
                trip_id,
                filename,
                format,
                time.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        let photo_id = tx.last_insert_rowid();
        insert_content(&tx, photo_id, ContentKind::Original, data)?;
        tx.commit()?;

        debug!(photo_id, trip_id, format = format.as_str(), size = data.len(), "photo ingested");
        self.db.photo(photo_id)
    }

    /// Derive web renditions for up to `limit` photos that lack one,
    /// scanning in identifier order. Photos that already have a web row are
    /// skipped without counting against the limit. Returns how many
    /// renditions this call created.
    ///
    /// The batch is atomic: a conversion failure rolls back every rendition
    /// derived earlier in the same call, so repeated invocations either make
    /// whole-batch progress or none.
    pub fn process_pending(&self, limit: usize) -> Result<usize> {
        let tx = self.db.conn().unchecked_transaction()?;
        let pending: Vec<(i64, Vec<u8>)> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT p.id, c.data
                FROM photos p
                JOIN photo_content c ON c.photo_id = p.id AND c.kind = 'original'
                WHERE NOT EXISTS (
                    SELECT 1 FROM photo_content w
                    WHERE w.photo_id = p.id AND w.kind = 'web'
                )
                ORDER BY p.id
                LIMIT ?
                "#,
            )?;
            let rows = stmt.query_map([limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut processed = 0;
        for (photo_id, original) in &pending {
            let rendition = self.converter.downscale(original)?;
            insert_content(&tx, *photo_id, ContentKind::Web, &rendition)?;
            processed += 1;
            debug!(photo_id, size = rendition.len(), "web rendition derived");
        }
        tx.commit()?;
        Ok(processed)
    }
}

/// Partial photo metadata update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// ISO-8601 text, normalized with the owning trip's zone as hint.
    pub time: Option<String>,
}

/// Update display metadata of a stored photo. A new display name keeps the
/// original filename extension if it drops it.
pub fn update_photo(db: &Database, photo_id: i64, update: &PhotoUpdate) -> Result<Photo> {
    let photo = db.photo(photo_id)?;
    let zone = db.trip_zone(photo.trip_id)?;

    let name = match &update.name {
        Some(new_name) => preserve_extension(&photo.name, new_name),
        None => photo.name.clone(),
    };
    let time = match &update.time {
        Some(text) => Some(timestamp::to_instant(text.as_str(), Some(&zone))?),
        None => photo.time,
    };
    let description = update.description.clone().or(photo.description);

    db.conn().execute(
        "UPDATE photos SET name = ?, time = ?, description = ? WHERE id = ?",
        params![
            name,
            time.map(|dt| dt.to_rfc3339()),
            description,
            photo_id,
        ],
    )?;
    db.photo(photo_id)
}

/// Reinterpret every timestamped photo of a trip in a new zone: the
/// wall-clock fields stay put, only the attached zone changes. Returns how
/// many photos were retagged.
pub fn rezone_trip_photos(db: &Database, trip_id: i64, zone: &str) -> Result<usize> {
    timestamp::lookup_zone(zone)?;
    db.trip(trip_id)?;

    let tx = db.conn().unchecked_transaction()?;
    let stored: Vec<(i64, Option<String>)> = {
        let mut stmt = tx.prepare("SELECT id, time FROM photos WHERE trip_id = ?")?;
        let rows = stmt.query_map([trip_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut changed = 0;
    for (photo_id, time) in stored {
        let Some(current) = crate::db::parse_time_column(time)? else {
            continue;
        };
        let retagged = timestamp::with_zone(current, zone)?;
        tx.execute(
            "UPDATE photos SET time = ? WHERE id = ?",
            params![retagged.to_rfc3339(), photo_id],
        )?;
        changed += 1;
    }
    tx.commit()?;
    Ok(changed)
}

/// Identify the image format from the buffer header. Anything the sniffer
/// does not recognize fails the upload.
pub fn sniff_format(data: &[u8]) -> Result<String> {
    let format = image::guess_format(data).map_err(|_| IngestError::UnsupportedFormat)?;
    Ok(format!("{format:?}").to_uppercase())
}

fn insert_content(conn: &Connection, photo_id: i64, kind: ContentKind, data: &[u8]) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let sha256 = format!("{:x}", hasher.finalize());

    match conn.execute(
        r#"
        INSERT INTO photo_content (photo_id, kind, size_bytes, sha256, data)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![photo_id, kind.as_str(), data.len() as i64, sha256, data],
    ) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(IngestError::DuplicateDerivation(photo_id))
        }
        Err(e) => Err(e.into()),
    }
}

fn preserve_extension(old_name: &str, new_name: &str) -> String {
    match Path::new(old_name).extension() {
        Some(ext) => {
            let suffix = format!(".{}", ext.to_string_lossy());
            if new_name.ends_with(&suffix) {
                new_name.to_string()
            } else {
                format!("{new_name}{suffix}")
            }
        }
        None => new_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewTrip;
    use std::cell::Cell;

    struct StubConverter;

    impl Converter for StubConverter {
        fn downscale(&self, _data: &[u8]) -> Result<Vec<u8>> {
            Ok(b"web-rendition".to_vec())
        }
    }

    /// Succeeds `good_calls` times, then fails.
    struct FlakyConverter {
        good_calls: usize,
        calls: Cell<usize>,
    }

    impl Converter for FlakyConverter {
        fn downscale(&self, _data: &[u8]) -> Result<Vec<u8>> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n > self.good_calls {
                Err(IngestError::Convert("tool exited nonzero".to_string()))
            } else {
                Ok(b"web-rendition".to_vec())
            }
        }
    }

    fn test_db(zone: &str) -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let trip = db
            .create_trip(&NewTrip {
                name: "Photo test".to_string(),
                zone: Some(zone.to_string()),
                ..NewTrip::default()
            })
            .unwrap();
        let trip_id = trip.id;
        (db, trip_id)
    }

    fn png_bytes() -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x0D]);
        data.extend_from_slice(b"IHDR");
        data
    }

    /// Minimal JPEG carrying one EXIF DateTime tag and nothing else.
    fn jpeg_with_datetime() -> Vec<u8> {
        let mut tiff = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        // IFD0: one entry, DateTime (0x0132), ASCII, 20 bytes at offset 26
        tiff.extend_from_slice(&[0x01, 0x00]);
        tiff.extend_from_slice(&[
            0x32, 0x01, 0x02, 0x00, 0x14, 0x00, 0x00, 0x00, 0x1A, 0x00, 0x00, 0x00,
        ]);
        tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        tiff.extend_from_slice(b"2022:05:07 10:38:57\0");

        let mut app1 = b"Exif\0\0".to_vec();
        app1.extend_from_slice(&tiff);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&((app1.len() as u16 + 2).to_be_bytes()));
        jpeg.extend_from_slice(&app1);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn web_row_count(db: &Database) -> i64 {
        db.conn()
            .query_row(
                "SELECT COUNT(*) FROM photo_content WHERE kind = 'web'",
                [],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn ingest_without_metadata_has_no_time() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline.ingest(trip_id, "summit.png", &png_bytes()).unwrap();
        assert_eq!(photo.format, "PNG");
        assert_eq!(photo.time, None);

        let original = db
            .photo_content(photo.id, ContentKind::Original)
            .unwrap()
            .unwrap();
        assert_eq!(original.data, png_bytes());
        assert_eq!(original.size_bytes as usize, png_bytes().len());
        assert_eq!(original.sha256.len(), 64);
    }

    #[test]
    fn ingest_reads_exif_time_in_trip_zone() {
        let (db, trip_id) = test_db("America/Denver");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline
            .ingest(trip_id, "camp.jpg", &jpeg_with_datetime())
            .unwrap();
        assert_eq!(photo.format, "JPEG");
        let time = photo.time.unwrap();
        assert_eq!(
            time.naive_local().to_string(),
            "2022-05-07 10:38:57".to_string()
        );
        // Denver in May is UTC-6.
        assert_eq!(time.offset().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn unrecognized_bytes_are_rejected() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let err = pipeline
            .ingest(trip_id, "notes.txt", b"just some text")
            .unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat));
        assert_eq!(db.photos_for_trip(trip_id).unwrap().len(), 0);
    }

    #[test]
    fn process_pending_is_limit_bounded_and_idempotent() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        for i in 0..8 {
            pipeline
                .ingest(trip_id, &format!("p{i}.png"), &png_bytes())
                .unwrap();
        }

        assert_eq!(pipeline.process_pending(5).unwrap(), 5);
        assert_eq!(web_row_count(&db), 5);
        assert_eq!(pipeline.process_pending(5).unwrap(), 3);
        assert_eq!(web_row_count(&db), 8);
        assert_eq!(pipeline.process_pending(5).unwrap(), 0);
        assert_eq!(web_row_count(&db), 8);
    }

    #[test]
    fn failed_batch_commits_nothing() {
        let (db, trip_id) = test_db("UTC");
        let flaky = FlakyConverter {
            good_calls: 1,
            calls: Cell::new(0),
        };
        let pipeline = PhotoPipeline::new(&db, &flaky);
        for i in 0..3 {
            pipeline
                .ingest(trip_id, &format!("p{i}.png"), &png_bytes())
                .unwrap();
        }

        let err = pipeline.process_pending(3).unwrap_err();
        assert!(matches!(err, IngestError::Convert(_)));
        assert_eq!(web_row_count(&db), 0);

        // A retry with a working converter picks all of them up again.
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        assert_eq!(pipeline.process_pending(10).unwrap(), 3);
    }

    #[test]
    fn rename_keeps_the_extension() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline.ingest(trip_id, "summit.png", &png_bytes()).unwrap();

        let updated = update_photo(
            &db,
            photo.id,
            &PhotoUpdate {
                name: Some("summit-view".to_string()),
                ..PhotoUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(updated.name, "summit-view.png");

        let renamed_again = update_photo(
            &db,
            photo.id,
            &PhotoUpdate {
                name: Some("evening.png".to_string()),
                ..PhotoUpdate::default()
            },
        )
        .unwrap();
        assert_eq!(renamed_again.name, "evening.png");
    }

    #[test]
    fn update_time_uses_trip_zone() {
        let (db, trip_id) = test_db("Europe/Zurich");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline.ingest(trip_id, "summit.png", &png_bytes()).unwrap();

        let updated = update_photo(
            &db,
            photo.id,
            &PhotoUpdate {
                time: Some("2022-05-07T10:38:57".to_string()),
                ..PhotoUpdate::default()
            },
        )
        .unwrap();
        let time = updated.time.unwrap();
        assert_eq!(time.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn rezone_keeps_wall_clock_fields() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline.ingest(trip_id, "summit.png", &png_bytes()).unwrap();
        update_photo(
            &db,
            photo.id,
            &PhotoUpdate {
                time: Some("2022-05-07T10:38:57".to_string()),
                ..PhotoUpdate::default()
            },
        )
        .unwrap();

        let changed = rezone_trip_photos(&db, trip_id, "America/Denver").unwrap();
        assert_eq!(changed, 1);
        let retagged = db.photo(photo.id).unwrap().time.unwrap();
        assert_eq!(retagged.naive_local().to_string(), "2022-05-07 10:38:57");
        assert_eq!(retagged.offset().local_minus_utc(), -6 * 3600);
    }

    #[test]
    fn rezone_with_unknown_zone_fails_before_writing() {
        let (db, trip_id) = test_db("UTC");
        let err = rezone_trip_photos(&db, trip_id, "Mars/Olympus").unwrap_err();
        assert!(matches!(err, IngestError::UnknownZone(_)));
    }

    #[test]
    fn duplicate_web_row_is_a_reported_conflict() {
        let (db, trip_id) = test_db("UTC");
        let pipeline = PhotoPipeline::new(&db, &StubConverter);
        let photo = pipeline.ingest(trip_id, "p.png", &png_bytes()).unwrap();
        insert_content(db.conn(), photo.id, ContentKind::Web, b"first").unwrap();
        let err = insert_content(db.conn(), photo.id, ContentKind::Web, b"second").unwrap_err();
        assert!(matches!(err, IngestError::DuplicateDerivation(id) if id == photo.id));
    }
}
