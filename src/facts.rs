use crate::engine::{Cell, Table};
use crate::error::ExportError;
use crate::export::RawRecord;
use crate::model::{PlayEvent, columns};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const MS_PER_MINUTE: f64 = 60_000.0;

/// Older account-data exports use camel-case keys for the same facts.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    (columns::TS, "endTime"),
    (columns::MS_PLAYED, "msPlayed"),
    (columns::ARTIST, "artistName"),
    (columns::TRACK, "trackName"),
];

/// Parses the timestamp shapes found across export variants into UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, and bare `YYYY-MM-DD`. A
/// trailing zone tag such as `[UTC]` is ignored.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    let trimmed = match trimmed.find('[') {
        Some(bracket) => &trimmed[..bracket],
        None => trimmed,
    };
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(parsed.to_offset(UtcOffset::UTC));
    }
    let seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let minutes = format_description!("[year]-[month]-[day] [hour]:[minute]");
    for format in [seconds, minutes] {
        if let Ok(parsed) = PrimitiveDateTime::parse(trimmed, format) {
            return Some(parsed.assume_utc());
        }
    }
    let date = format_description!("[year]-[month]-[day]");
    Date::parse(trimmed, date)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayTable {
    events: Vec<PlayEvent>,
    columns: BTreeSet<String>,
}

impl PlayTable {
    pub fn events(&self) -> &[PlayEvent] {
        &self.events
    }

    pub fn total_minutes(&self) -> f64 {
        self.events
            .iter()
            .filter_map(|event| event.minutes_played)
            .sum()
    }

    pub fn available_years(&self) -> Vec<i32> {
        let years: BTreeSet<i32> = self.events.iter().filter_map(|event| event.year).collect();
        years.into_iter().collect()
    }

    /// Column presence is preserved even when no row survives.
    pub fn for_year(&self, year: i32) -> Self {
        Self {
            events: self
                .events
                .iter()
                .filter(|event| event.year == Some(year))
                .cloned()
                .collect(),
            columns: self.columns.clone(),
        }
    }
}

impl Table for PlayTable {
    type Row = PlayEvent;

    fn rows(&self) -> &[PlayEvent] {
        &self.events
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    fn cell<'a>(&self, row: &'a PlayEvent, column: &str) -> Cell<'a> {
        fn text(value: &Option<String>) -> Cell<'_> {
            value
                .as_deref()
                .map_or(Cell::Null, |text| Cell::Text(Cow::Borrowed(text)))
        }

        match column {
            columns::TS => row.timestamp.map_or(Cell::Null, Cell::Time),
            columns::MS_PLAYED => row
                .ms_played
                .and_then(|ms| i64::try_from(ms).ok())
                .map_or(Cell::Null, Cell::Int),
            columns::MINUTES_PLAYED => row.minutes_played.map_or(Cell::Null, Cell::Float),
            columns::YEAR => row.year.map_or(Cell::Null, |year| Cell::Int(i64::from(year))),
            columns::MONTH_NAME => row
                .month_name()
                .map_or(Cell::Null, |name| Cell::Text(Cow::Owned(name))),
            columns::ARTIST => text(&row.artist_name),
            columns::TRACK => text(&row.track_name),
            columns::EPISODE_SHOW => text(&row.episode_show_name),
            columns::AUDIOBOOK => text(&row.audiobook_title),
            columns::PLATFORM => text(&row.platform),
            columns::SHUFFLE => row.shuffle.map_or(Cell::Null, Cell::Bool),
            _ => Cell::Null,
        }
    }
}

fn lookup<'a>(record: &'a RawRecord, column: &str) -> Option<&'a Value> {
    record.get(column).or_else(|| {
        LEGACY_ALIASES
            .iter()
            .find(|(canonical, _)| *canonical == column)
            .and_then(|(_, alias)| record.get(*alias))
    })
}

fn string_field(record: &RawRecord, column: &str) -> Option<String> {
    match lookup(record, column)? {
        Value::String(text) => Some(text.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn duration_field(record: &RawRecord) -> Option<u64> {
    match lookup(record, columns::MS_PLAYED)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|ms| *ms >= 0.0).map(|ms| ms as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn shuffle_field(record: &RawRecord) -> Option<bool> {
    match lookup(record, columns::SHUFFLE)? {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|flag| flag != 0),
        _ => None,
    }
}

/// Fails when records exist but none of them carries the duration field.
pub fn build_play_table(records: &[RawRecord]) -> Result<PlayTable, ExportError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for record in records {
        for column in [
            columns::TS,
            columns::MS_PLAYED,
            columns::ARTIST,
            columns::TRACK,
            columns::EPISODE_SHOW,
            columns::AUDIOBOOK,
            columns::PLATFORM,
            columns::SHUFFLE,
        ] {
            if lookup(record, column).is_some() {
                seen.insert(column.to_string());
            }
        }
    }

    if !records.is_empty() && !seen.contains(columns::MS_PLAYED) {
        return Err(ExportError::MissingRequiredField {
            field: columns::MS_PLAYED,
        });
    }
    if seen.contains(columns::MS_PLAYED) {
        seen.insert(columns::MINUTES_PLAYED.to_string());
    }
    if seen.contains(columns::TS) {
        seen.insert(columns::YEAR.to_string());
        seen.insert(columns::MONTH_NAME.to_string());
    }

    let mut unparsed = 0_usize;
    let events = records
        .iter()
        .map(|record| {
            let raw_ts = string_field(record, columns::TS);
            let timestamp = raw_ts.as_deref().and_then(parse_timestamp);
            if raw_ts.is_some() && timestamp.is_none() {
                unparsed += 1;
            }
            let ms_played = duration_field(record);
            PlayEvent {
                timestamp,
                ms_played,
                minutes_played: ms_played.map(|ms| ms as f64 / MS_PER_MINUTE),
                year: timestamp.map(|ts| ts.year()),
                month: timestamp.map(|ts| ts.month()),
                artist_name: string_field(record, columns::ARTIST),
                track_name: string_field(record, columns::TRACK),
                episode_show_name: string_field(record, columns::EPISODE_SHOW),
                audiobook_title: string_field(record, columns::AUDIOBOOK),
                platform: string_field(record, columns::PLATFORM),
                shuffle: shuffle_field(record),
            }
        })
        .collect::<Vec<_>>();

    if unparsed > 0 {
        tracing::debug!(unparsed, "play events with unparseable timestamps kept without dates");
    }

    Ok(PlayTable {
        events,
        columns: seen,
    })
}
