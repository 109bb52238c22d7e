//! Bencode parsing of `.torrent` files and info hash calculation

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use super::{InfoHash, MetainfoError};

type BencodeDict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;
type ParseResult<T> = Result<T, MetainfoError>;

/// Complete metadata extracted from a torrent file.
///
/// Contains the info hash, the file layout and the tracker URLs. Piece
/// hashes are not kept; verification belongs to the transfer engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentMetainfo {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u32,
    pub piece_count: usize,
    pub total_length: u64,
    pub files: Vec<TorrentFile>,
    pub announce_urls: Vec<String>,
    /// Multi-file torrents nest their files under a directory named `name`
    pub is_multi_file: bool,
}

/// Individual file within a torrent.
///
/// Path components are relative to the torrent root directory.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFile {
    pub path: Vec<String>,
    pub length: u64,
}

impl TorrentFile {
    /// Returns the path joined with `/` for display and matching.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    /// Returns the lowercase extension of the last path component.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.path.last()?;
        let (_, extension) = file_name.rsplit_once('.')?;
        Some(extension.to_ascii_lowercase())
    }
}

impl TorrentMetainfo {
    /// Parses metainfo from raw `.torrent` bytes.
    ///
    /// # Errors
    ///
    /// - `MetainfoError::InvalidTorrentFile` - Malformed bencode or missing fields
    pub fn from_bytes(torrent_bytes: &[u8]) -> Result<Self, MetainfoError> {
        BencodeParser::parse_bencode_data(torrent_bytes)
    }

    /// Reads and parses a `.torrent` file from disk.
    ///
    /// # Errors
    ///
    /// - `MetainfoError::Io` - File could not be read
    /// - `MetainfoError::InvalidTorrentFile` - Malformed torrent data
    pub async fn from_file(path: &Path) -> Result<Self, MetainfoError> {
        let contents = tokio::fs::read(path).await?;
        Self::from_bytes(&contents)
    }

    /// Returns the on-disk location of a file relative to the download root.
    pub fn relative_file_path(&self, file_index: usize) -> Option<PathBuf> {
        let file = self.files.get(file_index)?;
        let mut path = PathBuf::new();
        if self.is_multi_file {
            path.push(&self.name);
        }
        for component in &file.path {
            path.push(component);
        }
        Some(path)
    }
}

/// Bencode parsing utilities for torrent metadata extraction.
pub struct BencodeParser;

impl BencodeParser {
    /// Parse bencode data and extract torrent metadata
    ///
    /// # Errors
    ///
    /// - `MetainfoError::InvalidTorrentFile` - If bencode parsing or metadata extraction failed
    pub fn parse_bencode_data(torrent_bytes: &[u8]) -> Result<TorrentMetainfo, MetainfoError> {
        let parsed = bencode_rs::Value::parse(torrent_bytes).map_err(|e| {
            MetainfoError::InvalidTorrentFile {
                reason: format!("Bencode parsing failed: {e:?}"),
            }
        })?;

        let Some(root) = parsed.first() else {
            return Err(invalid("Empty bencode data"));
        };

        if let bencode_rs::Value::Dictionary(dict) = root {
            Self::extract_metainfo(dict, torrent_bytes)
        } else {
            Err(invalid("Root element must be dictionary"))
        }
    }

    fn extract_metainfo(
        dict: &BencodeDict<'_>,
        original_data: &[u8],
    ) -> ParseResult<TorrentMetainfo> {
        let Some(bencode_rs::Value::Dictionary(info)) = dict.get(b"info".as_slice()) else {
            return Err(invalid("Missing 'info' field"));
        };

        let info_hash = Self::calculate_info_hash(original_data)?;
        let name = Self::extract_string(info, b"name")?;
        let piece_length = Self::extract_length(info, b"piece length")?;
        let piece_length = u32::try_from(piece_length)
            .map_err(|_| invalid("Piece length does not fit in 32 bits"))?;

        let pieces = Self::extract_bytes(info, b"pieces")?;
        if !pieces.len().is_multiple_of(20) {
            return Err(invalid("Invalid pieces length"));
        }

        let (files, total_length, is_multi_file) = if let Ok(length) =
            Self::extract_length(info, b"length")
        {
            let files = vec![TorrentFile {
                path: vec![name.clone()],
                length,
            }];
            (files, length, false)
        } else if let Some(bencode_rs::Value::List(files_list)) = info.get(b"files".as_slice()) {
            let (files, total_length) = Self::extract_files(files_list)?;
            (files, total_length, true)
        } else {
            return Err(invalid("Missing 'files' or 'length' field"));
        };

        if files.is_empty() {
            return Err(invalid("Torrent contains no files"));
        }

        Ok(TorrentMetainfo {
            info_hash,
            name,
            piece_length,
            piece_count: pieces.len() / 20,
            total_length,
            files,
            announce_urls: Self::extract_announce_urls(dict),
            is_multi_file,
        })
    }

    /// SHA-1 over the raw bytes of the top-level `info` value.
    fn calculate_info_hash(original_data: &[u8]) -> ParseResult<InfoHash> {
        let (info_start, info_end) = Self::top_level_value_span(original_data, b"info")?
            .ok_or_else(|| invalid("Could not find info dictionary in data"))?;

        let mut hasher = Sha1::new();
        hasher.update(&original_data[info_start..info_end]);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&hasher.finalize());

        Ok(InfoHash::new(hash))
    }

    /// Byte span of the value stored under `key` in the root dictionary.
    fn top_level_value_span(data: &[u8], key: &[u8]) -> ParseResult<Option<(usize, usize)>> {
        if data.first() != Some(&b'd') {
            return Err(invalid("Expected dictionary start"));
        }

        let mut pos = 1;
        loop {
            match data.get(pos) {
                Some(b'e') => return Ok(None),
                Some(_) => {
                    let (key_start, key_end) = Self::string_span(data, pos)?;
                    let value_end = Self::value_end(data, key_end)?;
                    if &data[key_start..key_end] == key {
                        return Ok(Some((key_end, value_end)));
                    }
                    pos = value_end;
                }
                None => return Err(invalid("Incomplete bencode dictionary")),
            }
        }
    }

    /// Position just past the bencode value starting at `pos`.
    fn value_end(data: &[u8], pos: usize) -> ParseResult<usize> {
        match data.get(pos) {
            Some(b'i') => data[pos + 1..]
                .iter()
                .position(|&b| b == b'e')
                .map(|offset| pos + 1 + offset + 1)
                .ok_or_else(|| invalid("Unterminated integer")),
            Some(b'l' | b'd') => {
                let mut pos = pos + 1;
                loop {
                    match data.get(pos) {
                        Some(b'e') => return Ok(pos + 1),
                        Some(_) => pos = Self::value_end(data, pos)?,
                        None => return Err(invalid("Incomplete bencode dictionary")),
                    }
                }
            }
            Some(b'0'..=b'9') => Self::string_span(data, pos).map(|(_, end)| end),
            Some(_) => Err(invalid("Invalid bencode character")),
            None => Err(invalid("Incomplete bencode dictionary")),
        }
    }

    /// Content span of the byte string starting at `pos`.
    fn string_span(data: &[u8], pos: usize) -> ParseResult<(usize, usize)> {
        let colon = data[pos..]
            .iter()
            .position(|&b| b == b':')
            .map(|offset| pos + offset)
            .ok_or_else(|| invalid("Invalid string format"))?;

        let length: usize = std::str::from_utf8(&data[pos..colon])
            .ok()
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| invalid("Invalid string length"))?;

        let start = colon + 1;
        let end = start
            .checked_add(length)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| invalid("String runs past end of data"))?;
        Ok((start, end))
    }

    fn extract_string(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<String> {
        let bytes = Self::extract_bytes(dict, key)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| MetainfoError::InvalidTorrentFile {
            reason: format!("Invalid UTF-8 in field: {:?}", String::from_utf8_lossy(key)),
        })
    }

    fn extract_bytes<'a>(dict: &'a BencodeDict<'_>, key: &[u8]) -> ParseResult<&'a [u8]> {
        match dict.get(key) {
            Some(bencode_rs::Value::Bytes(bytes)) => Ok(bytes),
            _ => Err(MetainfoError::InvalidTorrentFile {
                reason: format!(
                    "Missing or invalid field: {:?}",
                    String::from_utf8_lossy(key)
                ),
            }),
        }
    }

    /// Non-negative integer field.
    fn extract_length(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<u64> {
        match dict.get(key) {
            Some(bencode_rs::Value::Integer(value)) if *value >= 0 => Ok(*value as u64),
            _ => Err(MetainfoError::InvalidTorrentFile {
                reason: format!(
                    "Missing or invalid integer field: {:?}",
                    String::from_utf8_lossy(key)
                ),
            }),
        }
    }

    fn extract_files(files_list: &[bencode_rs::Value<'_>]) -> ParseResult<(Vec<TorrentFile>, u64)> {
        let mut files = Vec::with_capacity(files_list.len());
        let mut total_length = 0u64;

        for file_value in files_list {
            let bencode_rs::Value::Dictionary(file_dict) = file_value else {
                return Err(invalid("Invalid file entry type"));
            };

            let length = Self::extract_length(file_dict, b"length")?;
            total_length += length;

            let Some(bencode_rs::Value::List(components)) = file_dict.get(b"path".as_slice())
            else {
                return Err(invalid("Missing or invalid path in file"));
            };

            let mut path = Vec::with_capacity(components.len());
            for component in components {
                let bencode_rs::Value::Bytes(raw) = component else {
                    return Err(invalid("Invalid path component type"));
                };
                let component = String::from_utf8(raw.to_vec())
                    .map_err(|_| invalid("Invalid UTF-8 in file path"))?;
                if component == ".." || component.contains('/') || component.contains('\\') {
                    return Err(invalid("Unsafe path component"));
                }
                path.push(component);
            }

            if path.is_empty() {
                return Err(invalid("Empty file path"));
            }

            files.push(TorrentFile { path, length });
        }

        Ok((files, total_length))
    }

    /// Collects `announce` and `announce-list`; private torrents may carry neither.
    fn extract_announce_urls(dict: &BencodeDict<'_>) -> Vec<String> {
        let mut announce_urls = Vec::new();

        if let Ok(announce) = Self::extract_string(dict, b"announce") {
            announce_urls.push(announce);
        }

        if let Some(bencode_rs::Value::List(tiers)) = dict.get(b"announce-list".as_slice()) {
            for tier in tiers {
                if let bencode_rs::Value::List(urls) = tier {
                    for url in urls {
                        if let bencode_rs::Value::Bytes(bytes) = url
                            && let Ok(url) = String::from_utf8(bytes.to_vec())
                            && !announce_urls.contains(&url)
                        {
                            announce_urls.push(url);
                        }
                    }
                }
            }
        }

        announce_urls
    }
}

fn invalid(reason: &str) -> MetainfoError {
    MetainfoError::InvalidTorrentFile {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_FILE: &[u8] = b"d8:announce9:test:80804:infod6:lengthi1000e4:name8:test.mkv12:piece lengthi32768e6:pieces20:12345678901234567890ee";

    fn multi_file_torrent() -> Vec<u8> {
        b"d8:announce9:test:80804:infod5:filesl\
d6:lengthi500e4:pathl10:S01E01.mkvee\
d6:lengthi300e4:pathl4:Subs10:S01E01.srteee\
4:name4:show12:piece lengthi16384e6:pieces20:12345678901234567890ee"
            .to_vec()
    }

    #[test]
    fn test_parse_single_file_torrent() {
        let metainfo = TorrentMetainfo::from_bytes(SINGLE_FILE).unwrap();

        assert_eq!(metainfo.name, "test.mkv");
        assert_eq!(metainfo.piece_length, 32768);
        assert_eq!(metainfo.piece_count, 1);
        assert_eq!(metainfo.total_length, 1000);
        assert!(!metainfo.is_multi_file);
        assert_eq!(metainfo.announce_urls, vec!["test:8080"]);
        assert_eq!(
            metainfo.relative_file_path(0),
            Some(PathBuf::from("test.mkv"))
        );
    }

    #[test]
    fn test_parse_multi_file_torrent() {
        let metainfo = TorrentMetainfo::from_bytes(&multi_file_torrent()).unwrap();

        assert!(metainfo.is_multi_file);
        assert_eq!(metainfo.total_length, 800);
        assert_eq!(metainfo.files.len(), 2);
        assert_eq!(metainfo.files[1].display_path(), "Subs/S01E01.srt");
        assert_eq!(metainfo.files[1].extension().as_deref(), Some("srt"));
        assert_eq!(
            metainfo.relative_file_path(1),
            Some(PathBuf::from("show/Subs/S01E01.srt"))
        );
        assert_eq!(metainfo.relative_file_path(2), None);
    }

    #[test]
    fn test_info_hash_is_stable_and_content_addressed() {
        let first = TorrentMetainfo::from_bytes(SINGLE_FILE).unwrap();
        let second = TorrentMetainfo::from_bytes(SINGLE_FILE).unwrap();
        assert_eq!(first.info_hash, second.info_hash);

        let other = b"d8:announce9:test:80804:infod6:lengthi2000e4:name9:test2.mkv12:piece lengthi32768e6:pieces20:12345678901234567890ee";
        let third = TorrentMetainfo::from_bytes(other).unwrap();
        assert_ne!(first.info_hash, third.info_hash);
    }

    #[test]
    fn test_info_hash_covers_only_info_dictionary() {
        let mut hasher = Sha1::new();
        hasher.update(b"d6:lengthi1000e4:name8:test.mkv12:piece lengthi32768e6:pieces20:12345678901234567890e");
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&hasher.finalize());

        let metainfo = TorrentMetainfo::from_bytes(SINGLE_FILE).unwrap();
        assert_eq!(metainfo.info_hash, InfoHash::new(expected));
    }

    #[test]
    fn test_missing_announce_is_allowed() {
        let data = b"d4:infod6:lengthi1000e4:name8:test.mkv12:piece lengthi32768e6:pieces20:12345678901234567890ee";
        let metainfo = TorrentMetainfo::from_bytes(data).unwrap();
        assert!(metainfo.announce_urls.is_empty());
    }

    #[test]
    fn test_missing_info_field() {
        let result = TorrentMetainfo::from_bytes(b"d8:announce9:test:8080e");
        assert!(result.unwrap_err().to_string().contains("Missing 'info' field"));
    }

    #[test]
    fn test_invalid_pieces_length() {
        let data = b"d8:announce9:test:80804:infod6:lengthi1000e4:name8:test.mkv12:piece lengthi32768e6:pieces19:1234567890123456789ee";
        let result = TorrentMetainfo::from_bytes(data);
        assert!(result.unwrap_err().to_string().contains("Invalid pieces length"));
    }

    #[test]
    fn test_root_must_be_dictionary() {
        assert!(TorrentMetainfo::from_bytes(b"l4:teste").is_err());
        assert!(TorrentMetainfo::from_bytes(b"").is_err());
    }

    #[test]
    fn test_info_hash_ignores_info_text_in_earlier_fields() {
        let decoy = b"d7:comment11:x4:infodxxxe4:infod6:lengthi1000e4:name8:test.mkv12:piece lengthi32768e6:pieces20:12345678901234567890ee";

        let expected = TorrentMetainfo::from_bytes(SINGLE_FILE).unwrap().info_hash;
        assert_eq!(TorrentMetainfo::from_bytes(decoy).unwrap().info_hash, expected);
    }

    #[test]
    fn test_top_level_value_span() {
        let data = b"d4:listl1:ai5ee4:infod4:name4:testee";
        let (start, end) = BencodeParser::top_level_value_span(data, b"info")
            .unwrap()
            .unwrap();
        assert_eq!(&data[start..end], b"d4:name4:teste");

        assert_eq!(BencodeParser::top_level_value_span(data, b"size").unwrap(), None);
        assert!(BencodeParser::top_level_value_span(b"d3:key", b"info").is_err());
        assert!(BencodeParser::top_level_value_span(b"d4:infod9:trunc", b"info").is_err());
        assert!(BencodeParser::top_level_value_span(b"l4:teste", b"info").is_err());
    }

    #[tokio::test]
    async fn test_parse_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.torrent");
        tokio::fs::write(&path, SINGLE_FILE).await.unwrap();

        let metainfo = TorrentMetainfo::from_file(&path).await.unwrap();
        assert_eq!(metainfo.name, "test.mkv");

        let missing = TorrentMetainfo::from_file(&temp_dir.path().join("missing.torrent")).await;
        assert!(matches!(missing, Err(MetainfoError::Io(_))));
    }
}
