#![no_main]

use libfuzzer_sys::fuzz_target;
use wrapped::engine::{Table, count_by_group};
use wrapped::model::columns;
use wrapped::playlist::{flatten_playlists, parse_playlist_export};

fuzz_target!(|data: &[u8]| {
    let Ok(playlists) = parse_playlist_export(data) else {
        return;
    };
    let table = flatten_playlists(&playlists);
    assert!(table.tracks().len() <= data.len());
    if let Ok(sizes) = count_by_group(&table, columns::PLAYLIST_NAME, 10) {
        assert!(sizes.len() <= 10);
    }
    let _ = table.has_values(columns::PLAYLIST_TRACK);
});
