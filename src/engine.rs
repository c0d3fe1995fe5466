use crate::error::SchemaGap;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use time::{Date, Month, OffsetDateTime};

#[derive(Debug, Clone, PartialEq)]
pub enum Cell<'a> {
    Null,
    Text(Cow<'a, str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Time(OffsetDateTime),
}

impl Cell<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(value) => Some(f64::from(u8::from(*value))),
            Self::Null | Self::Text(_) | Self::Time(_) => None,
        }
    }

    pub fn group_key(&self) -> GroupKey {
        match self {
            Self::Null => GroupKey::Null,
            Self::Text(text) => GroupKey::Text(text.to_string()),
            Self::Int(value) => GroupKey::Int(*value),
            Self::Float(value) => GroupKey::Text(value.to_string()),
            Self::Bool(value) => GroupKey::Bool(*value),
            Self::Time(value) => GroupKey::Text(value.to_string()),
        }
    }
}

/// Grouping key. `Null` collects the rows without a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum GroupKey {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl GroupKey {
    pub fn as_cell(&self) -> Cell<'_> {
        match self {
            Self::Null => Cell::Null,
            Self::Bool(value) => Cell::Bool(*value),
            Self::Int(value) => Cell::Int(*value),
            Self::Text(text) => Cell::Text(Cow::Borrowed(text)),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("(none)"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

pub trait Table {
    type Row;

    fn rows(&self) -> &[Self::Row];

    /// Whether any source record carried this column, even as null.
    fn has_column(&self, column: &str) -> bool;

    fn cell<'a>(&self, row: &'a Self::Row, column: &str) -> Cell<'a>;

    fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn has_values(&self, column: &str) -> bool {
        self.has_column(column)
            && self
                .rows()
                .iter()
                .any(|row| !self.cell(row, column).is_null())
    }
}

fn require<T: Table>(table: &T, columns: &[&str]) -> Result<(), SchemaGap> {
    match columns.iter().find(|column| !table.has_column(column)) {
        Some(column) => Err(SchemaGap::new(column)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    /// Number of rows with a non-null value.
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: GroupKey,
    pub value: f64,
    /// Rows that fell into the group, whatever the aggregate.
    pub count: usize,
}

#[derive(Default)]
struct Grouper {
    index: HashMap<GroupKey, usize>,
    totals: Vec<GroupTotal>,
}

impl Grouper {
    fn add(&mut self, key: GroupKey, amount: f64) {
        match self.index.get(&key) {
            Some(&slot) => {
                let total = &mut self.totals[slot];
                total.value += amount;
                total.count += 1;
            }
            None => {
                self.index.insert(key.clone(), self.totals.len());
                self.totals.push(GroupTotal {
                    key,
                    value: amount,
                    count: 1,
                });
            }
        }
    }

    fn into_top_k(self, k: usize) -> Vec<GroupTotal> {
        let mut totals = self.totals;
        sort_descending(&mut totals, |total| total.value);
        totals.truncate(k);
        totals
    }
}

/// Stable descending sort, so equal values keep their first-seen order.
fn sort_descending<T>(items: &mut [T], value: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| value(b).total_cmp(&value(a)));
}

pub fn top_k_by_group<T: Table>(
    table: &T,
    group_column: &str,
    value_column: &str,
    k: usize,
    agg: Aggregate,
) -> Result<Vec<GroupTotal>, SchemaGap> {
    require(table, &[group_column, value_column])?;

    let mut grouper = Grouper::default();
    for row in table.rows() {
        let value = table.cell(row, value_column);
        let amount = match agg {
            Aggregate::Sum => value.as_f64().unwrap_or(0.0),
            Aggregate::Count => f64::from(u8::from(!value.is_null())),
        };
        grouper.add(table.cell(row, group_column).group_key(), amount);
    }
    Ok(grouper.into_top_k(k))
}

pub fn count_by_group<T: Table>(
    table: &T,
    group_column: &str,
    k: usize,
) -> Result<Vec<GroupTotal>, SchemaGap> {
    require(table, &[group_column])?;

    let mut grouper = Grouper::default();
    for row in table.rows() {
        grouper.add(table.cell(row, group_column).group_key(), 1.0);
    }
    Ok(grouper.into_top_k(k))
}

// `None` values are not counted.
pub fn value_counts<'a, I>(values: I, k: usize) -> Vec<GroupTotal>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut grouper = Grouper::default();
    for value in values.into_iter().flatten() {
        grouper.add(GroupKey::Text(value.to_string()), 1.0);
    }
    grouper.into_top_k(k)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Day,
    Month,
}

impl Bucket {
    fn start_of(self, date: Date) -> Date {
        match self {
            Self::Day => date,
            Self::Month => date.replace_day(1).unwrap_or(date),
        }
    }

    fn next(self, start: Date) -> Option<Date> {
        match self {
            Self::Day => start.next_day(),
            Self::Month => {
                let (year, month) = match start.month() {
                    Month::December => (start.year() + 1, Month::January),
                    month => (start.year(), month.next()),
                };
                Date::from_calendar_date(year, month, 1).ok()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketTotal {
    pub start: Date,
    pub value: f64,
}

/// Covers every bucket from the earliest to the latest timestamp; buckets
/// without rows carry `0.0`. Rows without a timestamp are ignored.
pub fn time_resample<T: Table>(
    table: &T,
    time_column: &str,
    value_column: &str,
    bucket: Bucket,
) -> Result<Vec<BucketTotal>, SchemaGap> {
    require(table, &[time_column, value_column])?;

    let mut sums: BTreeMap<Date, f64> = BTreeMap::new();
    for row in table.rows() {
        let Cell::Time(timestamp) = table.cell(row, time_column) else {
            continue;
        };
        let amount = table.cell(row, value_column).as_f64().unwrap_or(0.0);
        *sums.entry(bucket.start_of(timestamp.date())).or_default() += amount;
    }

    let (Some(&first), Some(&last)) = (sums.keys().next(), sums.keys().next_back()) else {
        return Ok(Vec::new());
    };

    let mut series = Vec::new();
    let mut cursor = Some(first);
    while let Some(start) = cursor.filter(|start| *start <= last) {
        series.push(BucketTotal {
            start,
            value: sums.get(&start).copied().unwrap_or(0.0),
        });
        cursor = bucket.next(start);
    }
    Ok(series)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub partition: GroupKey,
    pub key: GroupKey,
    pub value: f64,
    pub rank: usize,
}

/// Equal values keep their input order. Rows with a null partition or a
/// non-numeric rank value are left out. Partitions come out ascending.
pub fn rank_within_group<T: Table>(
    table: &T,
    group_column: &str,
    rank_column: &str,
    partition_column: &str,
) -> Result<Vec<RankedRow>, SchemaGap> {
    require(table, &[group_column, rank_column, partition_column])?;

    let mut partitions: BTreeMap<GroupKey, Vec<RankedRow>> = BTreeMap::new();
    for row in table.rows() {
        let partition = table.cell(row, partition_column).group_key();
        if partition == GroupKey::Null {
            continue;
        }
        let Some(value) = table.cell(row, rank_column).as_f64() else {
            continue;
        };
        partitions
            .entry(partition.clone())
            .or_default()
            .push(RankedRow {
                partition,
                key: table.cell(row, group_column).group_key(),
                value,
                rank: 0,
            });
    }

    let mut ranked = Vec::new();
    for (_, mut rows) in partitions {
        sort_descending(&mut rows, |row| row.value);
        for (position, mut row) in rows.into_iter().enumerate() {
            row.rank = position + 1;
            ranked.push(row);
        }
    }
    Ok(ranked)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairTotal {
    pub partition: GroupKey,
    pub key: GroupKey,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairTable {
    partition_column: String,
    group_column: String,
    value_column: String,
    rows: Vec<PairTotal>,
}

impl Table for PairTable {
    type Row = PairTotal;

    fn rows(&self) -> &[PairTotal] {
        &self.rows
    }

    fn has_column(&self, column: &str) -> bool {
        column == self.partition_column || column == self.group_column || column == self.value_column
    }

    fn cell<'a>(&self, row: &'a PairTotal, column: &str) -> Cell<'a> {
        if column == self.partition_column {
            row.partition.as_cell()
        } else if column == self.group_column {
            row.key.as_cell()
        } else if column == self.value_column {
            Cell::Float(row.value)
        } else {
            Cell::Null
        }
    }
}

pub fn sum_by_pair<T: Table>(
    table: &T,
    partition_column: &str,
    group_column: &str,
    value_column: &str,
) -> Result<PairTable, SchemaGap> {
    require(table, &[partition_column, group_column, value_column])?;

    let mut index: HashMap<(GroupKey, GroupKey), usize> = HashMap::new();
    let mut rows: Vec<PairTotal> = Vec::new();
    for row in table.rows() {
        let partition = table.cell(row, partition_column).group_key();
        let key = table.cell(row, group_column).group_key();
        let amount = table.cell(row, value_column).as_f64().unwrap_or(0.0);
        match index.get(&(partition.clone(), key.clone())) {
            Some(&slot) => rows[slot].value += amount,
            None => {
                index.insert((partition.clone(), key.clone()), rows.len());
                rows.push(PairTotal {
                    partition,
                    key,
                    value: amount,
                });
            }
        }
    }

    Ok(PairTable {
        partition_column: partition_column.to_string(),
        group_column: group_column.to_string(),
        value_column: value_column.to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert;
    use proptest::prop_assert_eq;
    use proptest::strategy::Strategy;
    use time::macros::datetime;

    #[derive(Debug, Clone)]
    struct Row {
        group: Option<String>,
        year: Option<i64>,
        value: Option<f64>,
        at: Option<OffsetDateTime>,
    }

    struct Fixture {
        rows: Vec<Row>,
        columns: Vec<&'static str>,
    }

    impl Fixture {
        fn new(rows: Vec<Row>) -> Self {
            Self {
                rows,
                columns: vec!["group", "year", "value", "at"],
            }
        }
    }

    impl Table for Fixture {
        type Row = Row;

        fn rows(&self) -> &[Row] {
            &self.rows
        }

        fn has_column(&self, column: &str) -> bool {
            self.columns.iter().any(|known| *known == column)
        }

        fn cell<'a>(&self, row: &'a Row, column: &str) -> Cell<'a> {
            match column {
                "group" => row
                    .group
                    .as_deref()
                    .map_or(Cell::Null, |text| Cell::Text(Cow::Borrowed(text))),
                "year" => row.year.map_or(Cell::Null, Cell::Int),
                "value" => row.value.map_or(Cell::Null, Cell::Float),
                "at" => row.at.map_or(Cell::Null, Cell::Time),
                _ => Cell::Null,
            }
        }
    }

    fn row(group: Option<&str>, value: f64) -> Row {
        Row {
            group: group.map(str::to_string),
            year: None,
            value: Some(value),
            at: None,
        }
    }

    fn text(key: &str) -> GroupKey {
        GroupKey::Text(key.to_string())
    }

    #[test]
    fn top_k_sums_and_sorts_descending() {
        let table = Fixture::new(vec![
            row(Some("a"), 1.0),
            row(Some("b"), 5.0),
            row(Some("a"), 3.0),
            row(Some("c"), 2.0),
        ]);

        let top = top_k_by_group(&table, "group", "value", 2, Aggregate::Sum).expect("top");
        assert_eq!(
            top,
            vec![
                GroupTotal {
                    key: text("b"),
                    value: 5.0,
                    count: 1,
                },
                GroupTotal {
                    key: text("a"),
                    value: 4.0,
                    count: 2,
                },
            ]
        );
    }

    #[test]
    fn top_k_keeps_null_group_and_first_seen_ties() {
        let table = Fixture::new(vec![
            row(Some("x"), 2.0),
            row(None, 2.0),
            row(Some("y"), 2.0),
        ]);

        let top = top_k_by_group(&table, "group", "value", 10, Aggregate::Sum).expect("top");
        let keys: Vec<GroupKey> = top.into_iter().map(|total| total.key).collect();
        assert_eq!(keys, vec![text("x"), GroupKey::Null, text("y")]);
    }

    #[test]
    fn count_aggregate_skips_null_values() {
        let mut rows = vec![row(Some("a"), 1.0), row(Some("a"), 1.0)];
        rows[1].value = None;
        let table = Fixture::new(rows);

        let counted = top_k_by_group(&table, "group", "value", 10, Aggregate::Count).expect("count");
        assert_eq!(counted[0].value, 1.0);
        assert_eq!(counted[0].count, 2);
        let sized = count_by_group(&table, "group", 10).expect("size");
        assert_eq!(sized[0].value, 2.0);
    }

    #[test]
    fn missing_column_is_a_schema_gap() {
        let mut table = Fixture::new(vec![row(Some("a"), 1.0)]);
        table.columns.retain(|column| *column != "group");

        let err = top_k_by_group(&table, "group", "value", 10, Aggregate::Sum).expect_err("gap");
        assert_eq!(err, SchemaGap::new("group"));
        assert!(count_by_group(&table, "group", 10).is_err());
        assert!(!table.has_values("group"));
    }

    #[test]
    fn value_counts_ignores_missing_values() {
        let counts = value_counts(
            [Some("lofi"), None, Some("jazz"), Some("lofi")],
            10,
        );
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].key, text("lofi"));
        assert_eq!(counts[0].value, 2.0);
    }

    #[test]
    fn daily_resample_fills_gaps_with_zero() {
        let mut first = row(Some("a"), 3.0);
        first.at = Some(datetime!(2023-03-01 10:00 UTC));
        let mut second = row(Some("a"), 2.0);
        second.at = Some(datetime!(2023-03-04 23:59 UTC));
        let mut undated = row(Some("a"), 100.0);
        undated.at = None;
        let table = Fixture::new(vec![second, undated, first]);

        let series = time_resample(&table, "at", "value", Bucket::Day).expect("series");
        let values: Vec<f64> = series.iter().map(|bucket| bucket.value).collect();
        assert_eq!(values, vec![3.0, 0.0, 0.0, 2.0]);
        assert_eq!(series[0].start, time::macros::date!(2023 - 03 - 01));
    }

    #[test]
    fn monthly_resample_crosses_year_boundary() {
        let mut first = row(None, 1.0);
        first.at = Some(datetime!(2022-11-15 00:00 UTC));
        let mut second = row(None, 4.0);
        second.at = Some(datetime!(2023-02-02 00:00 UTC));
        let table = Fixture::new(vec![first, second]);

        let series = time_resample(&table, "at", "value", Bucket::Month).expect("series");
        let starts: Vec<Date> = series.iter().map(|bucket| bucket.start).collect();
        assert_eq!(
            starts,
            vec![
                time::macros::date!(2022 - 11 - 01),
                time::macros::date!(2022 - 12 - 01),
                time::macros::date!(2023 - 01 - 01),
                time::macros::date!(2023 - 02 - 01),
            ]
        );
        assert_eq!(series[1].value, 0.0);
    }

    #[test]
    fn empty_table_resamples_to_empty_series() {
        let table = Fixture::new(Vec::new());
        assert!(
            time_resample(&table, "at", "value", Bucket::Day)
                .expect("series")
                .is_empty()
        );
    }

    #[test]
    fn rank_is_per_partition_with_stable_ties() {
        let rows = [
            (2023, "a", 5.0),
            (2022, "b", 1.0),
            (2023, "b", 7.0),
            (2023, "c", 5.0),
            (2022, "a", 1.0),
        ]
        .into_iter()
        .map(|(year, group, value)| Row {
            group: Some(group.to_string()),
            year: Some(year),
            value: Some(value),
            at: None,
        })
        .collect();
        let table = Fixture::new(rows);

        let ranked = rank_within_group(&table, "group", "value", "year").expect("ranked");
        let flat: Vec<(i64, String, usize)> = ranked
            .iter()
            .map(|row| {
                let GroupKey::Int(year) = row.partition else {
                    panic!("year partition expected");
                };
                (year, row.key.to_string(), row.rank)
            })
            .collect();
        assert_eq!(
            flat,
            vec![
                (2022, String::from("b"), 1),
                (2022, String::from("a"), 2),
                (2023, String::from("b"), 1),
                (2023, String::from("a"), 2),
                (2023, String::from("c"), 3),
            ]
        );
    }

    #[test]
    fn sum_by_pair_feeds_rank_within_group() {
        let rows = [(2023, "a", 1.0), (2023, "b", 1.5), (2023, "a", 1.0)]
            .into_iter()
            .map(|(year, group, value)| Row {
                group: Some(group.to_string()),
                year: Some(year),
                value: Some(value),
                at: None,
            })
            .collect();
        let table = Fixture::new(rows);

        let pairs = sum_by_pair(&table, "year", "group", "value").expect("pairs");
        assert_eq!(pairs.rows().len(), 2);
        let ranked = rank_within_group(&pairs, "group", "value", "year").expect("ranked");
        assert_eq!(ranked[0].key, text("a"));
        assert_eq!(ranked[0].value, 2.0);
        assert_eq!(ranked[1].rank, 2);
    }

    fn arbitrary_rows() -> impl Strategy<Value = Vec<Row>> {
        proptest::collection::vec(
            (
                proptest::option::of(0u8..6),
                proptest::option::of(2019i64..2024),
                0u32..500,
                proptest::option::of(0i64..2_000),
            ),
            0..80,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(group, year, value, hours)| Row {
                    group: group.map(|g| format!("g{g}")),
                    year,
                    value: Some(f64::from(value)),
                    at: hours.map(|h| datetime!(2023-01-01 00:00 UTC) + time::Duration::hours(h * 7)),
                })
                .collect()
        })
    }

    proptest::proptest! {
        #[test]
        fn top_k_is_bounded_by_k_and_group_count(rows in arbitrary_rows(), k in 0usize..8) {
            let distinct: std::collections::HashSet<Option<String>> =
                rows.iter().map(|row| row.group.clone()).collect();
            let table = Fixture::new(rows);
            let top = top_k_by_group(&table, "group", "value", k, Aggregate::Sum).expect("top");

            prop_assert!(top.len() <= k);
            prop_assert!(top.len() <= distinct.len());
            prop_assert_eq!(top.is_empty(), table.is_empty() || k == 0);
            prop_assert!(top.windows(2).all(|pair| pair[0].value >= pair[1].value));
        }

        #[test]
        fn daily_buckets_are_contiguous(rows in arbitrary_rows()) {
            let table = Fixture::new(rows);
            let series = time_resample(&table, "at", "value", Bucket::Day).expect("series");

            prop_assert!(series.windows(2).all(|pair| pair[0].start.next_day() == Some(pair[1].start)));
            let expected: f64 = table.rows.iter().filter(|row| row.at.is_some()).filter_map(|row| row.value).sum();
            let actual: f64 = series.iter().map(|bucket| bucket.value).sum();
            prop_assert!((expected - actual).abs() < 1e-6);
        }

        #[test]
        fn ranks_form_a_permutation_per_partition(rows in arbitrary_rows()) {
            let table = Fixture::new(rows);
            let ranked = rank_within_group(&table, "group", "value", "year").expect("ranked");

            let mut by_partition: BTreeMap<GroupKey, Vec<&RankedRow>> = BTreeMap::new();
            for row in &ranked {
                by_partition.entry(row.partition.clone()).or_default().push(row);
            }
            for rows in by_partition.values() {
                let ranks: Vec<usize> = rows.iter().map(|row| row.rank).collect();
                let expected: Vec<usize> = (1..=rows.len()).collect();
                prop_assert_eq!(ranks, expected);
                prop_assert!(rows.windows(2).all(|pair| pair[0].value >= pair[1].value));
            }
        }
    }
}
