//! Playable file selection inside a torrent.

use std::sync::LazyLock;

use regex::Regex;
use seedstream_core::TorrentMetainfo;

use crate::types::{MediaType, StreamRequest};

/// Extensions recognized as streamable media.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "avi", "mov", "webm", "ts", "wmv", "mpg", "mpeg",
];

static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)s(\d{1,3})[ ._-]?e(\d{1,4})").expect("season/episode pattern is valid")
});
static CROSS_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(\d{1,2})x(\d{1,3})(?:$|[^0-9])")
        .expect("cross episode pattern is valid")
});

/// Checks if a path has a media extension.
pub fn is_media_file(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, extension)| MEDIA_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_sample(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.to_ascii_lowercase().contains("sample")
}

/// Season and episode numbers found in a file name (`S01E02` or `1x02`).
pub fn episode_numbers(path: &str) -> Option<(u32, u32)> {
    let file_name = path.rsplit('/').next().unwrap_or(path);

    [&*SEASON_EPISODE, &*CROSS_EPISODE]
        .into_iter()
        .find_map(|pattern| {
            let captures = pattern.captures(file_name)?;
            let season = captures.get(1)?.as_str().parse().ok()?;
            let episode = captures.get(2)?.as_str().parse().ok()?;
            Some((season, episode))
        })
}

/// Picks the file to play for a request.
///
/// Movies, and series requests without episode numbers, get the largest
/// media file. Episodes get the largest media file whose name carries the
/// requested season and episode. Sample clips are ignored.
pub fn select_file(metainfo: &TorrentMetainfo, request: &StreamRequest) -> Option<usize> {
    let candidates = metainfo
        .files
        .iter()
        .enumerate()
        .map(|(index, file)| (index, file.display_path(), file.length))
        .filter(|(_, path, _)| is_media_file(path) && !is_sample(path));

    let wanted = match (request.media_type, request.season, request.episode) {
        (MediaType::Series, Some(season), Some(episode)) => Some((season, episode)),
        _ => None,
    };

    candidates
        .filter(|(_, path, _)| wanted.is_none() || episode_numbers(path) == wanted)
        .max_by(|a, b| a.2.cmp(&b.2).then(b.0.cmp(&a.0)))
        .map(|(index, _, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_patterns_compile() {
        assert!(SEASON_EPISODE.is_match("Show.S01E02.mkv"));
        assert!(CROSS_EPISODE.is_match("Show 1x02.mkv"));
    }

    fn metainfo(files: &[(&str, u64)]) -> TorrentMetainfo {
        let mut entries = String::new();
        for (path, length) in files {
            let components: String = path
                .split('/')
                .map(|c| format!("{}:{}", c.len(), c))
                .collect();
            entries.push_str(&format!("d6:lengthi{length}e4:pathl{components}ee"));
        }
        let bencoded = format!(
            "d4:infod5:filesl{entries}e4:name4:pack12:piece lengthi16384e6:pieces20:12345678901234567890ee"
        );
        TorrentMetainfo::from_bytes(bencoded.as_bytes()).unwrap()
    }

    #[test]
    fn test_episode_patterns() {
        assert_eq!(episode_numbers("Show.S01E02.1080p.mkv"), Some((1, 2)));
        assert_eq!(episode_numbers("show s1 e12.mp4"), Some((1, 12)));
        assert_eq!(episode_numbers("Show - 1x02 - Title.avi"), Some((1, 2)));
        assert_eq!(episode_numbers("Season 1/Show 03x10.mkv"), Some((3, 10)));
        assert_eq!(episode_numbers("Movie.1920x1080.mkv"), None);
        assert_eq!(episode_numbers("Movie.2019.mkv"), None);
    }

    #[test]
    fn test_movie_picks_largest_media_file() {
        let metainfo = metainfo(&[
            ("Movie/movie.nfo", 10),
            ("Movie/sample.mkv", 5_000),
            ("Movie/movie.mkv", 4_000),
            ("Movie/extras.mp4", 1_000),
        ]);
        let request = StreamRequest::movie("tt1");

        assert_eq!(select_file(&metainfo, &request), Some(2));
    }

    #[test]
    fn test_series_picks_matching_episode() {
        let metainfo = metainfo(&[
            ("Show.S01E01.mkv", 900),
            ("Show.S01E02.mkv", 800),
            ("Show.S01E03.mkv", 950),
        ]);

        assert_eq!(
            select_file(&metainfo, &StreamRequest::episode("tt1", 1, 2)),
            Some(1)
        );
        assert_eq!(
            select_file(&metainfo, &StreamRequest::episode("tt1", 2, 1)),
            None
        );
    }

    #[test]
    fn test_no_media_files() {
        let metainfo = metainfo(&[("readme.txt", 10), ("cover.jpg", 20)]);
        assert_eq!(select_file(&metainfo, &StreamRequest::movie("tt1")), None);
    }
}
