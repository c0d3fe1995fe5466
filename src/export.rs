use crate::config::{HistoryPolicy, ReportConfig};
use crate::error::ExportError;
use crate::facts::{PlayTable, build_play_table};
use crate::playlist::{PlaylistTable, flatten_playlists, parse_playlist_export};
use crate::search::{SearchTable, build_search_table};
use anyhow::Result;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub type RawRecord = Map<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct ExportDataset {
    pub plays: PlayTable,
    pub playlists: PlaylistTable,
    pub searches: SearchTable,
    pub warnings: Vec<String>,
}

impl ExportDataset {
    pub fn load(config: &ReportConfig) -> Result<Self> {
        tracing::info!(
            data_dir = %config.data_dir.display(),
            history_policy = config.history_policy.label(),
            "loading export"
        );

        let streaming_dir = config.streaming_path();
        let history = load_records(&streaming_dir, &config.streaming_pattern);
        if history.files_read == 0 && config.history_policy == HistoryPolicy::Required {
            return Err(ExportError::NoStreamingHistory { dir: streaming_dir }.into());
        }
        let plays = build_play_table(&history.items)?;

        let account_dir = config.account_path();
        let playlist_feed = load_playlists(&account_dir, &config.playlist_pattern);
        let playlists = flatten_playlists(&playlist_feed.items);

        let search_feed = load_records_file(&config.search_path());
        let searches = build_search_table(&search_feed.items);

        let warnings: Vec<String> = [history.warnings, playlist_feed.warnings, search_feed.warnings]
            .into_iter()
            .flatten()
            .collect();

        tracing::info!(
            plays = plays.events().len(),
            playlist_tracks = playlists.tracks().len(),
            searches = searches.queries().len(),
            warnings = warnings.len(),
            "export loaded"
        );

        Ok(Self {
            plays,
            playlists,
            searches,
            warnings,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedLoad<T> {
    pub items: Vec<T>,
    pub files_read: usize,
    pub warnings: Vec<String>,
}

impl<T> Default for FeedLoad<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            files_read: 0,
            warnings: Vec::new(),
        }
    }
}

impl<T> FeedLoad<T> {
    fn warn(&mut self, err: &ExportError) {
        tracing::warn!("{err}");
        self.warnings.push(err.to_string());
    }
}

pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&ch) if ch == '?' || ch == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '*')
}

pub fn matching_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| matches_pattern(name, pattern))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn read_json(path: &Path) -> Result<Value, ExportError> {
    let bytes = fs::read(path).map_err(|err| ExportError::source_file(path, err))?;
    serde_json::from_slice(&bytes).map_err(|err| ExportError::source_file(path, err))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn split_records(path: &Path, value: Value) -> Result<(Vec<RawRecord>, usize), ExportError> {
    let Value::Array(items) = value else {
        return Err(ExportError::source_file(path, "expected a JSON array of records"));
    };
    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .collect();
    let skipped = total - records.len();
    Ok((records, skipped))
}

fn append_records(feed: &mut FeedLoad<RawRecord>, path: &Path) {
    match read_json(path).and_then(|value| split_records(path, value)) {
        Ok((records, skipped)) => {
            if skipped > 0 {
                feed.warn(&ExportError::MalformedRecord {
                    source_name: source_name(path),
                    detail: format!("{skipped} entries are not objects"),
                });
            }
            feed.items.extend(records);
            feed.files_read += 1;
        }
        Err(err) => feed.warn(&err),
    }
}

pub fn load_records(dir: &Path, pattern: &str) -> FeedLoad<RawRecord> {
    let mut feed = FeedLoad::default();
    let files = matching_files(dir, pattern);
    if files.is_empty() {
        tracing::warn!(dir = %dir.display(), pattern, "no files matched");
    }
    for path in files {
        append_records(&mut feed, &path);
    }
    feed
}

/// A missing file is an empty feed, not a warning.
pub fn load_records_file(path: &Path) -> FeedLoad<RawRecord> {
    let mut feed = FeedLoad::default();
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "optional export file not present");
        return feed;
    }
    append_records(&mut feed, path);
    feed
}

pub fn load_playlists(dir: &Path, pattern: &str) -> FeedLoad<Value> {
    let mut feed = FeedLoad::default();
    for path in matching_files(dir, pattern) {
        let decoded = fs::read(&path)
            .map_err(|err| ExportError::source_file(&path, err))
            .and_then(|bytes| {
                parse_playlist_export(&bytes).map_err(|err| ExportError::source_file(&path, err))
            });
        match decoded {
            Ok(playlists) => {
                feed.items.extend(playlists);
                feed.files_read += 1;
            }
            Err(err) => feed.warn(&err),
        }
    }
    feed
}
