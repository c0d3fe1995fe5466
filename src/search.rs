use crate::engine::{Cell, Table};
use crate::export::RawRecord;
use crate::facts::parse_timestamp;
use crate::model::{SearchQuery, columns};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchTable {
    queries: Vec<SearchQuery>,
    columns: BTreeSet<String>,
}

impl SearchTable {
    pub fn queries(&self) -> &[SearchQuery] {
        &self.queries
    }

    pub fn for_year(&self, year: i32) -> Self {
        Self {
            queries: self
                .queries
                .iter()
                .filter(|query| {
                    query
                        .search_time
                        .is_some_and(|searched| searched.year() == year)
                })
                .cloned()
                .collect(),
            columns: self.columns.clone(),
        }
    }
}

impl Table for SearchTable {
    type Row = SearchQuery;

    fn rows(&self) -> &[SearchQuery] {
        &self.queries
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    fn cell<'a>(&self, row: &'a SearchQuery, column: &str) -> Cell<'a> {
        match column {
            columns::SEARCH_QUERY => row
                .query
                .as_deref()
                .map_or(Cell::Null, |query| Cell::Text(Cow::Borrowed(query))),
            columns::SEARCH_TIME => row.search_time.map_or(Cell::Null, Cell::Time),
            _ => Cell::Null,
        }
    }
}

pub fn build_search_table(records: &[RawRecord]) -> SearchTable {
    let mut table = SearchTable::default();
    for record in records {
        for column in [columns::SEARCH_QUERY, columns::SEARCH_TIME] {
            if record.contains_key(column) {
                table.columns.insert(column.to_string());
            }
        }

        let query = match record.get(columns::SEARCH_QUERY) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        };
        let search_time = record
            .get(columns::SEARCH_TIME)
            .and_then(Value::as_str)
            .and_then(parse_timestamp);
        table.queries.push(SearchQuery { query, search_time });
    }
    table
}
