pub const SCHEMA: &str = r#"
-- Trips: root owner of tracks, waypoints and photos
CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    start_time TEXT,         -- RFC 3339, always offset-aware
    end_time TEXT,
    zone TEXT NOT NULL DEFAULT 'UTC',  -- interprets naive child timestamps
    title TEXT,
    brief TEXT,
    description TEXT
);

-- Tracks: named recordings under a trip
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    name TEXT,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_tracks_trip ON tracks(trip_id);

-- Segments: contiguous runs of points within a track, in import order
CREATE TABLE IF NOT EXISTS track_segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_segments_track ON track_segments(track_id);

-- Points: individual GPS samples; every recorded field is optional
CREATE TABLE IF NOT EXISTS track_points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    segment_id INTEGER NOT NULL REFERENCES track_segments(id) ON DELETE CASCADE,
    time TEXT,
    latitude REAL,
    longitude REAL,
    elevation REAL
);

CREATE INDEX IF NOT EXISTS idx_points_segment ON track_points(segment_id);
CREATE INDEX IF NOT EXISTS idx_points_time ON track_points(time);

-- Waypoints: standalone points of interest under a trip
CREATE TABLE IF NOT EXISTS waypoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    name TEXT,
    description TEXT,
    time TEXT,
    latitude REAL,
    longitude REAL,
    elevation REAL
);

CREATE INDEX IF NOT EXISTS idx_waypoints_trip ON waypoints(trip_id);

-- Photos: display metadata only; bytes live in photo_content
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trip_id INTEGER NOT NULL REFERENCES trips(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    format TEXT NOT NULL,
    time TEXT,
    description TEXT
);

CREATE INDEX IF NOT EXISTS idx_photos_trip ON photos(trip_id);

-- Photo content: one 'original' row per photo, at most one 'web' row.
-- Racing derive calls hit the UNIQUE constraint; the loser gets a
-- constraint error, not a second web row.
CREATE TABLE IF NOT EXISTS photo_content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    sha256 TEXT NOT NULL,
    data BLOB NOT NULL,
    UNIQUE (photo_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_photo_content_photo ON photo_content(photo_id);
"#;
