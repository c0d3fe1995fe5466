use serde_json::{Map, Value};
use time::{Month, OffsetDateTime};

pub mod columns {
    pub const TS: &str = "ts";
    pub const MS_PLAYED: &str = "ms_played";
    pub const MINUTES_PLAYED: &str = "minutes_played";
    pub const YEAR: &str = "year";
    pub const MONTH_NAME: &str = "month_name";
    pub const ARTIST: &str = "master_metadata_album_artist_name";
    pub const TRACK: &str = "master_metadata_track_name";
    pub const EPISODE_SHOW: &str = "episode_show_name";
    pub const AUDIOBOOK: &str = "audiobook_title";
    pub const PLATFORM: &str = "platform";
    pub const SHUFFLE: &str = "shuffle";

    pub const PLAYLIST_NAME: &str = "name";
    pub const LAST_MODIFIED: &str = "lastModifiedDate";
    pub const COLLABORATORS: &str = "collaborators";
    pub const PLAYLIST_ARTIST: &str = "artistName";
    pub const PLAYLIST_TRACK: &str = "trackName";

    pub const SEARCH_QUERY: &str = "searchQuery";
    pub const SEARCH_TIME: &str = "searchTime";
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub timestamp: Option<OffsetDateTime>,
    pub ms_played: Option<u64>,
    pub minutes_played: Option<f64>,
    pub year: Option<i32>,
    pub month: Option<Month>,
    pub artist_name: Option<String>,
    pub track_name: Option<String>,
    pub episode_show_name: Option<String>,
    pub audiobook_title: Option<String>,
    pub platform: Option<String>,
    pub shuffle: Option<bool>,
}

impl PlayEvent {
    pub fn month_name(&self) -> Option<String> {
        self.month.map(|month| month.to_string())
    }
}

/// One track entry of one playlist, with the playlist metadata merged in.
///
/// The row keeps every key of the exported track object. On a key collision
/// the track value wins over the inherited playlist value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaylistTrack {
    pub fields: Map<String, Value>,
}

impl PlaylistTrack {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|value| !value.is_null())
    }

    pub fn playlist_name(&self) -> Option<&str> {
        self.field(columns::PLAYLIST_NAME).and_then(Value::as_str)
    }

    pub fn last_modified_date(&self) -> Option<&str> {
        self.field(columns::LAST_MODIFIED).and_then(Value::as_str)
    }

    pub fn track_name(&self) -> Option<&str> {
        self.field(columns::PLAYLIST_TRACK).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub search_time: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn playlist_track_treats_null_as_missing() {
        let Value::Object(fields) = json!({
            "name": "Road",
            "lastModifiedDate": null,
            "collaborators": ["a", "b"],
            "trackName": "T1",
        }) else {
            unreachable!()
        };
        let track = PlaylistTrack { fields };

        assert_eq!(track.playlist_name(), Some("Road"));
        assert_eq!(track.last_modified_date(), None);
        assert_eq!(track.track_name(), Some("T1"));
        assert_eq!(track.field(columns::PLAYLIST_ARTIST), None);
    }

    #[test]
    fn month_name_follows_calendar_names() {
        let event = PlayEvent {
            timestamp: None,
            ms_played: None,
            minutes_played: None,
            year: None,
            month: Some(Month::September),
            artist_name: None,
            track_name: None,
            episode_show_name: None,
            audiobook_title: None,
            platform: None,
            shuffle: None,
        };
        assert_eq!(event.month_name().as_deref(), Some("September"));
    }
}
