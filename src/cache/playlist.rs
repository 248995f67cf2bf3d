//! HLS playlist rendering
//!
//! The playlist is a pure function of the fragment window, so it can never
//! name an evicted fragment or miss a retained one.
//!
//! ```text
//! #EXTM3U
//! #EXT-X-VERSION:7
//! #EXT-X-TARGETDURATION:2
//! #EXT-X-MEDIA-SEQUENCE:3
//! #EXT-X-MAP:URI="init-test.mp4"
//! #EXTINF:1.000000,
//! test3.m4s
//! ...
//! ```

use std::fmt::Write;

use super::window::FragmentWindow;

/// Playlist name of the initialization segment for `base`
pub fn init_name(base: &str) -> String {
    format!("init-{}.mp4", base)
}

/// Playlist name of fragment `sequence` for `base`
pub fn fragment_name(base: &str, sequence: u64) -> String {
    format!("{}{}.m4s", base, sequence)
}

/// Parse the sequence id out of a fragment name (`<base><sequence>.m4s`)
///
/// A bare number is also accepted.
pub fn parse_fragment_name(base: &str, name: &str) -> Option<u64> {
    let id = name.strip_suffix(".m4s").unwrap_or(name);
    let id = id.strip_prefix(base).unwrap_or(id);
    // u64::from_str alone would take a leading '+'
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Render the playlist for the current window
///
/// Returns `None` when the window is empty.
pub fn render(base: &str, window: &FragmentWindow) -> Option<String> {
    let media_sequence = window.first_sequence()?;
    let target = window
        .max_duration()
        .map(|d| d.as_secs_f64().ceil() as u64)
        .unwrap_or(1)
        .max(1);

    let mut out = String::with_capacity(128 + window.len() * 48);
    // Writing to a String cannot fail
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(out, "#EXT-X-VERSION:7");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", target);
    let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", media_sequence);
    let _ = writeln!(out, "#EXT-X-MAP:URI=\"{}\"", init_name(base));

    for fragment in window.iter() {
        let _ = writeln!(out, "#EXTINF:{:.6},", fragment.duration.as_secs_f64());
        let _ = writeln!(out, "{}", fragment_name(base, fragment.sequence));
    }

    Some(out)
}

/// Sequence ids listed in a rendered playlist, in order
pub fn listed_sequences(base: &str, playlist: &str) -> Vec<u64> {
    playlist
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| parse_fragment_name(base, line))
        .collect()
}
