//! Best-effort capture-time extraction from image metadata.

use std::io::Cursor;

use chrono::NaiveDateTime;

/// Read the embedded capture time from an image buffer, if any.
///
/// Absence of EXIF data, of the timestamp tags, or an unreadable value all
/// yield `None`; metadata is an enrichment, never a requirement. The result
/// is naive (cameras rarely record a zone) and the owning trip's zone is
/// attached downstream.
pub fn capture_time(data: &[u8]) -> Option<NaiveDateTime> {
    let mut cursor = Cursor::new(data);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    for tag in [exif::Tag::DateTimeOriginal, exif::Tag::DateTime] {
        if let Some(field) = exif.get_field(tag, exif::In::PRIMARY) {
            let text = field.display_value().to_string();
            if let Some(parsed) = parse_exif_datetime(text.trim_matches('"').trim()) {
                return Some(parsed);
            }
        }
    }
    None
}

/// EXIF writes `2022:05:07 10:38:57`; some writers use dashes or a `T`.
pub(crate) fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    None
}
