use crate::engine::{Cell, Table};
use crate::facts::parse_timestamp;
use crate::model::{PlaylistTrack, columns};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PlaylistExport {
    Bare(Vec<Value>),
    Wrapped { playlists: Vec<Value> },
    Other(Value),
}

impl PlaylistExport {
    pub fn into_playlists(self) -> Vec<Value> {
        match self {
            Self::Bare(playlists) | Self::Wrapped { playlists } => playlists,
            Self::Other(_) => Vec::new(),
        }
    }
}

pub fn parse_playlist_export(bytes: &[u8]) -> serde_json::Result<Vec<Value>> {
    let export: PlaylistExport = serde_json::from_slice(bytes)?;
    Ok(export.into_playlists())
}

/// The `items` field of a playlist, which may be one object, a list, or absent.
#[derive(Debug, Clone, Copy)]
enum PlaylistItems<'a> {
    Single(&'a Map<String, Value>),
    Sequence(&'a [Value]),
    Missing,
}

impl<'a> PlaylistItems<'a> {
    fn of(playlist: &'a Map<String, Value>) -> Self {
        match playlist.get("items") {
            Some(Value::Object(item)) => Self::Single(item),
            Some(Value::Array(items)) => Self::Sequence(items),
            _ => Self::Missing,
        }
    }

    /// Second value counts the non-mapping items.
    fn mappings(self) -> (Vec<&'a Map<String, Value>>, usize) {
        match self {
            Self::Single(item) => (vec![item], 0),
            Self::Sequence(items) => {
                let mappings: Vec<_> = items.iter().filter_map(Value::as_object).collect();
                let skipped = items.len() - mappings.len();
                (mappings, skipped)
            }
            Self::Missing => (Vec::new(), 0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistTable {
    tracks: Vec<PlaylistTrack>,
    columns: BTreeSet<String>,
}

impl PlaylistTable {
    pub fn tracks(&self) -> &[PlaylistTrack] {
        &self.tracks
    }

    pub fn playlist_count(&self) -> usize {
        let names: HashSet<&str> = self
            .tracks
            .iter()
            .filter_map(PlaylistTrack::playlist_name)
            .collect();
        names.len()
    }

    pub fn for_year(&self, year: i32) -> Self {
        Self {
            tracks: self
                .tracks
                .iter()
                .filter(|track| {
                    track
                        .last_modified_date()
                        .and_then(parse_timestamp)
                        .is_some_and(|modified| modified.year() == year)
                })
                .cloned()
                .collect(),
            columns: self.columns.clone(),
        }
    }
}

impl Table for PlaylistTable {
    type Row = PlaylistTrack;

    fn rows(&self) -> &[PlaylistTrack] {
        &self.tracks
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    fn cell<'a>(&self, row: &'a PlaylistTrack, column: &str) -> Cell<'a> {
        match row.field(column) {
            None | Some(Value::Null) => Cell::Null,
            Some(Value::String(text)) => Cell::Text(Cow::Borrowed(text)),
            Some(Value::Bool(flag)) => Cell::Bool(*flag),
            Some(Value::Number(number)) => number
                .as_i64()
                .map(Cell::Int)
                .or_else(|| number.as_f64().map(Cell::Float))
                .unwrap_or(Cell::Null),
            Some(other) => Cell::Text(Cow::Owned(other.to_string())),
        }
    }
}

/// Every row carries the playlist's `name`, `lastModifiedDate` and
/// `collaborators` (null when missing) merged with the item's `track`
/// object. Non-mapping playlists and items are skipped.
pub fn flatten_playlists(playlists: &[Value]) -> PlaylistTable {
    let mut table = PlaylistTable::default();
    let mut skipped = 0_usize;

    for playlist in playlists {
        let Some(playlist) = playlist.as_object() else {
            skipped += 1;
            continue;
        };

        let mut inherited = Map::new();
        for key in [
            columns::PLAYLIST_NAME,
            columns::LAST_MODIFIED,
            columns::COLLABORATORS,
        ] {
            inherited.insert(
                key.to_string(),
                playlist.get(key).cloned().unwrap_or(Value::Null),
            );
        }

        let (items, malformed) = PlaylistItems::of(playlist).mappings();
        skipped += malformed;
        for item in items {
            let mut fields = inherited.clone();
            match item.get("track") {
                Some(Value::Object(track)) => {
                    fields.extend(track.iter().map(|(key, value)| (key.clone(), value.clone())));
                }
                None | Some(Value::Null) => {}
                Some(_) => skipped += 1,
            }
            table.columns.extend(fields.keys().cloned());
            table.tracks.push(PlaylistTrack { fields });
        }
    }

    if skipped > 0 {
        tracing::debug!(skipped, "skipped malformed playlist entries");
    }
    table
}
