//! GPX 1.1 track-file parser.
//!
//! Decodes a raw byte buffer into waypoints, tracks, segments and points.
//! Purely structural: no I/O, no persistence. Unknown descendant tags are
//! skipped so exports from newer recording apps still import; unknown
//! top-level elements are rejected.

use chrono::{DateTime, FixedOffset};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::{IngestError, Result};

/// One recorded GPS sample. Recording apps may omit any of the fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpxTrackPoint {
    pub time: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

/// A contiguous run of recorded points within a track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpxTrackSegment {
    pub points: Vec<GpxTrackPoint>,
}

impl GpxTrackSegment {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A named recording composed of one or more segments, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpxTrack {
    pub name: Option<String>,
    pub description: Option<String>,
    pub segments: Vec<GpxTrackSegment>,
}

impl GpxTrack {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Total point count across all segments. A track with no segments has
    /// no meaningful count, so this yields `None` instead of a silent zero;
    /// callers wanting zero must special-case.
    pub fn point_count(&self) -> Option<usize> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.iter().map(GpxTrackSegment::len).sum())
        }
    }
}

/// A single named point of interest outside any track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpxWaypoint {
    pub name: Option<String>,
    pub description: Option<String>,
    pub time: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

/// A top-level element of a GPX document. Segments and points appearing
/// directly under the root are legal and passed through for the caller to
/// handle or reject.
#[derive(Debug, Clone, PartialEq)]
pub enum GpxElement {
    Waypoint(GpxWaypoint),
    Track(GpxTrack),
    Segment(GpxTrackSegment),
    Point(GpxTrackPoint),
}

/// Parse a GPX document into its top-level elements.
pub fn parse(data: &[u8]) -> Result<Vec<GpxElement>> {
    let text = std::str::from_utf8(data).map_err(|e| IngestError::Parse(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut elements = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if !seen_root {
                    seen_root = true;
                } else {
                    elements.push(parse_top_level(&mut reader, e, false)?);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if seen_root {
                    elements.push(parse_top_level(&mut reader, e, true)?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(elements)
}

fn parse_top_level(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    empty: bool,
) -> Result<GpxElement> {
    let name = local_name(start);
    match name.as_str() {
        "wpt" => {
            let mut wpt = GpxWaypoint {
                latitude: float_attr(start, b"lat")?,
                longitude: float_attr(start, b"lon")?,
                ..GpxWaypoint::default()
            };
            if !empty {
                read_waypoint_children(reader, &mut wpt)?;
            }
            Ok(GpxElement::Waypoint(wpt))
        }
        "trk" => {
            let mut trk = GpxTrack::default();
            if !empty {
                read_track_children(reader, &mut trk)?;
            }
            Ok(GpxElement::Track(trk))
        }
        "trkseg" => {
            let mut seg = GpxTrackSegment::default();
            if !empty {
                read_segment_children(reader, &mut seg)?;
            }
            Ok(GpxElement::Segment(seg))
        }
        "trkpt" => {
            let mut pt = point_from_attrs(start)?;
            if !empty {
                read_point_children(reader, &mut pt)?;
            }
            Ok(GpxElement::Point(pt))
        }
        other => Err(IngestError::UnsupportedElement(other.to_string())),
    }
}

fn read_track_children(reader: &mut Reader<&[u8]>, trk: &mut GpxTrack) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if depth == 0 && name == "trkseg" {
                    let mut seg = GpxTrackSegment::default();
                    read_segment_children(reader, &mut seg)?;
                    trk.segments.push(seg);
                } else {
                    if depth == 0 && matches!(name.as_str(), "name" | "desc") {
                        current = Some(name);
                    }
                    depth += 1;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 && local_name(e) == "trkseg" {
                    trk.segments.push(GpxTrackSegment::default());
                }
            }
            Ok(Event::Text(e)) => {
                if depth == 1 {
                    let text = unescape_text(&e)?;
                    match current.as_deref() {
                        Some("name") => trk.name = Some(text),
                        Some("desc") => trk.description = Some(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    current = None;
                }
            }
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn read_segment_children(reader: &mut Reader<&[u8]>, seg: &mut GpxTrackSegment) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if depth == 0 && local_name(e) == "trkpt" {
                    let mut pt = point_from_attrs(e)?;
                    read_point_children(reader, &mut pt)?;
                    seg.points.push(pt);
                } else {
                    depth += 1;
                }
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 && local_name(e) == "trkpt" {
                    seg.points.push(point_from_attrs(e)?);
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn read_point_children(reader: &mut Reader<&[u8]>, pt: &mut GpxTrackPoint) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if depth == 0 && matches!(name.as_str(), "ele" | "time") {
                    current = Some(name);
                }
                depth += 1;
            }
            Ok(Event::Text(e)) => {
                if depth == 1 {
                    let text = unescape_text(&e)?;
                    match current.as_deref() {
                        Some("ele") => pt.elevation = Some(parse_float(&text)?),
                        Some("time") => pt.time = Some(parse_gpx_time(&text)?),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    current = None;
                }
            }
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn read_waypoint_children(reader: &mut Reader<&[u8]>, wpt: &mut GpxWaypoint) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                if depth == 0 && matches!(name.as_str(), "name" | "desc" | "ele" | "time") {
                    current = Some(name);
                }
                depth += 1;
            }
            Ok(Event::Text(e)) => {
                if depth == 1 {
                    let text = unescape_text(&e)?;
                    match current.as_deref() {
                        Some("name") => wpt.name = Some(text),
                        Some("desc") => wpt.description = Some(text),
                        Some("ele") => wpt.elevation = Some(parse_float(&text)?),
                        Some("time") => wpt.time = Some(parse_gpx_time(&text)?),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                if depth == 0 {
                    current = None;
                }
            }
            Ok(Event::Eof) => return Err(truncated()),
            Err(e) => return Err(IngestError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn point_from_attrs(start: &BytesStart) -> Result<GpxTrackPoint> {
    Ok(GpxTrackPoint {
        latitude: float_attr(start, b"lat")?,
        longitude: float_attr(start, b"lon")?,
        ..GpxTrackPoint::default()
    })
}

/// Tag name without any namespace prefix. GPX exports vary between a default
/// namespace and a `gpx:` prefix; the local name is stable across both.
fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().local_name().as_ref()).to_string()
}

fn float_attr(start: &BytesStart, key: &[u8]) -> Result<Option<f64>> {
    for attr in start.attributes().flatten() {
        if attr.key.as_ref() == key {
            let value = String::from_utf8_lossy(&attr.value).to_string();
            return Ok(Some(parse_float(&value)?));
        }
    }
    Ok(None)
}

fn parse_float(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| IngestError::Parse(format!("invalid coordinate value {text:?}")))
}

/// GPX timestamps are a restricted ISO-8601 form where a literal `Z` suffix
/// denotes UTC. The `Z` is rewritten to an explicit `+00:00` offset so the
/// parsed value is always offset-aware; an offset-less value is taken as UTC.
fn parse_gpx_time(text: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = text.trim();
    let normalized = match trimmed.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt);
    }
    chrono::NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|_| IngestError::UnparsableTimestamp(text.to_string()))
}

fn unescape_text(e: &quick_xml::events::BytesText) -> Result<String> {
    e.unescape()
        .map(|cow| cow.to_string())
        .map_err(|err| IngestError::Parse(err.to_string()))
}

fn truncated() -> IngestError {
    IngestError::Parse("unexpected end of document".to_string())
}
