use crate::engine::{
    Aggregate, Bucket, BucketTotal, GroupKey, GroupTotal, Table, count_by_group,
    rank_within_group, sum_by_pair, time_resample, top_k_by_group, value_counts,
};
use crate::error::SchemaGap;
use crate::export::ExportDataset;
use crate::model::columns;
use serde::Serialize;

const MONTHS_IN_YEAR: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ready { rows: Vec<T> },
    /// The column exists but no row carries a value for this report.
    Empty,
    /// The export does not contain the column at all.
    Unavailable { column: String },
}

impl<T> Section<T> {
    fn from_rows(section: &str, rows: Result<Vec<T>, SchemaGap>) -> Self {
        match rows {
            Ok(rows) if rows.is_empty() => Self::Empty,
            Ok(rows) => Self::Ready { rows },
            Err(gap) => {
                tracing::debug!(section, column = %gap.column, "report section unavailable");
                Self::Unavailable { column: gap.column }
            }
        }
    }

    pub fn rows(&self) -> &[T] {
        match self {
            Self::Ready { rows } => rows,
            Self::Empty | Self::Unavailable { .. } => &[],
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub year: Option<i32>,
    pub top_k: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            year: None,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_minutes: f64,
    pub total_plays: usize,
    pub playlist_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRanking {
    pub year: i64,
    pub rank: usize,
    pub artist: GroupKey,
    pub minutes_played: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrappedReport {
    pub year: Option<i32>,
    pub available_years: Vec<i32>,
    pub summary: Summary,
    pub top_artists: Section<GroupTotal>,
    pub top_tracks: Section<GroupTotal>,
    pub top_podcasts: Section<GroupTotal>,
    pub top_audiobooks: Section<GroupTotal>,
    pub platforms: Section<GroupTotal>,
    pub shuffle: Section<GroupTotal>,
    pub months: Section<GroupTotal>,
    pub daily_minutes: Section<BucketTotal>,
    pub monthly_minutes: Section<BucketTotal>,
    pub yearly_top_artists: Section<YearRanking>,
    pub largest_playlists: Section<GroupTotal>,
    pub playlist_artists: Section<GroupTotal>,
    pub top_searches: Section<GroupTotal>,
    pub warnings: Vec<String>,
}

/// `Empty` when the column exists but no row has a value.
fn minutes_by<T: Table>(table: &T, column: &str, k: usize) -> Section<GroupTotal> {
    if table.has_column(column) && !table.has_values(column) {
        return Section::Empty;
    }
    Section::from_rows(
        column,
        top_k_by_group(table, column, columns::MINUTES_PLAYED, k, Aggregate::Sum),
    )
}

fn yearly_top_artists<T: Table>(plays: &T, k: usize) -> Section<YearRanking> {
    let ranked = sum_by_pair(plays, columns::YEAR, columns::ARTIST, columns::MINUTES_PLAYED)
        .and_then(|pairs| {
            rank_within_group(&pairs, columns::ARTIST, columns::MINUTES_PLAYED, columns::YEAR)
        })
        .map(|ranked| {
            ranked
                .into_iter()
                .filter(|row| row.rank <= k)
                .filter_map(|row| match row.partition {
                    GroupKey::Int(year) => Some(YearRanking {
                        year,
                        rank: row.rank,
                        artist: row.key,
                        minutes_played: row.value,
                    }),
                    _ => None,
                })
                .collect()
        });
    Section::from_rows("yearly_top_artists", ranked)
}

impl WrappedReport {
    pub fn build(dataset: &ExportDataset, options: &ReportOptions) -> Self {
        let k = options.top_k;
        let (plays, playlists, searches) = match options.year {
            Some(year) => (
                dataset.plays.for_year(year),
                dataset.playlists.for_year(year),
                dataset.searches.for_year(year),
            ),
            None => (
                dataset.plays.clone(),
                dataset.playlists.clone(),
                dataset.searches.clone(),
            ),
        };

        let summary = Summary {
            total_minutes: plays.total_minutes(),
            total_plays: plays.events().len(),
            playlist_count: playlists.playlist_count(),
        };

        let largest_playlists =
            Section::from_rows("largest_playlists", count_by_group(&playlists, columns::PLAYLIST_NAME, k));
        let playlist_artists = Section::from_rows(
            "playlist_artists",
            top_k_by_group(
                &playlists,
                columns::PLAYLIST_ARTIST,
                columns::PLAYLIST_TRACK,
                k,
                Aggregate::Count,
            ),
        );

        let top_searches = if searches.has_column(columns::SEARCH_QUERY) {
            Section::from_rows(
                "top_searches",
                Ok(value_counts(
                    searches.queries().iter().map(|query| query.query.as_deref()),
                    k,
                )),
            )
        } else {
            Section::from_rows("top_searches", Err(SchemaGap::new(columns::SEARCH_QUERY)))
        };

        Self {
            year: options.year,
            available_years: dataset.plays.available_years(),
            summary,
            top_artists: minutes_by(&plays, columns::ARTIST, k),
            top_tracks: minutes_by(&plays, columns::TRACK, k),
            top_podcasts: minutes_by(&plays, columns::EPISODE_SHOW, k),
            top_audiobooks: minutes_by(&plays, columns::AUDIOBOOK, k),
            platforms: minutes_by(&plays, columns::PLATFORM, k),
            shuffle: minutes_by(&plays, columns::SHUFFLE, k),
            months: minutes_by(&plays, columns::MONTH_NAME, MONTHS_IN_YEAR),
            daily_minutes: Section::from_rows(
                "daily_minutes",
                time_resample(&plays, columns::TS, columns::MINUTES_PLAYED, Bucket::Day),
            ),
            monthly_minutes: Section::from_rows(
                "monthly_minutes",
                time_resample(&plays, columns::TS, columns::MINUTES_PLAYED, Bucket::Month),
            ),
            yearly_top_artists: yearly_top_artists(&plays, k),
            largest_playlists,
            playlist_artists,
            top_searches,
            warnings: dataset.warnings.clone(),
        }
    }
}
