use lofty::config::ParseOptions;
use lofty::error::{ErrorKind, LoftyError};
use lofty::file::{FileType, TaggedFile};
use lofty::id3::v2::{Frame, FrameId, Id3v2Tag};
use lofty::mpeg::MpegFile;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::models::{NewAlbum, NewTrack};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("cannot read tags from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: LoftyError,
    },
    #[error("no tags found in {path}")]
    NoTags { path: PathBuf },
}

/// Raw tag fields for one file, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawTags {
    pub album_artist: Option<String>,
    pub album: Option<String>,
    /// Primary year field, 0 when absent
    pub year: u32,
    pub disc: Option<u32>,
    pub track: Option<u32>,
    /// Alternate date frames keyed by frame id ("TDOR", "TDRL", ...)
    pub frames: BTreeMap<String, String>,
}

/// Reads a file's tag container. The scanner only sees this trait.
pub trait TagReader {
    fn read(&self, path: &Path) -> Result<RawTags, MetadataError>;
}

/// Frames consulted, in order, when the primary year is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFrame {
    /// ID3v2.4 TDOR
    OriginalReleaseDate,
    /// ID3v2.4 TDRL
    ReleaseDate,
    /// ID3v2.3 XDOR
    OriginalReleaseYear,
    /// ID3v2.3 TORY
    OriginalReleaseYearAlt,
}

pub const YEAR_FALLBACK: [YearFrame; 4] = [
    YearFrame::OriginalReleaseDate,
    YearFrame::ReleaseDate,
    YearFrame::OriginalReleaseYear,
    YearFrame::OriginalReleaseYearAlt,
];

impl YearFrame {
    pub fn id(self) -> &'static str {
        match self {
            Self::OriginalReleaseDate => "TDOR",
            Self::ReleaseDate => "TDRL",
            Self::OriginalReleaseYear => "XDOR",
            Self::OriginalReleaseYearAlt => "TORY",
        }
    }

    fn item_key(self) -> ItemKey {
        match self {
            Self::OriginalReleaseDate => ItemKey::OriginalReleaseDate,
            Self::ReleaseDate => ItemKey::ReleaseDate,
            Self::OriginalReleaseYear | Self::OriginalReleaseYearAlt => {
                ItemKey::Unknown(self.id().to_string())
            }
        }
    }
}

/// DSF files start with a `DSD ` chunk; bytes 20..28 hold the offset of the
/// trailing ID3v2 chunk (0 when there is none).
const DSF_MAGIC: &[u8; 4] = b"DSD ";
const DSF_HEADER_LEN: usize = 28;

/// Tag reader backed by `lofty`.
///
/// The format comes from the extension first and from the file's content when
/// that fails, so mislabelled files and extensions lofty doesn't map (`.alac`)
/// still read. DSF is not a lofty format: its ID3v2 chunk is located through the
/// DSD header and parsed on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyReader;

/// The tag fields are read from, plus the raw ID3v2 tag when the file has one.
/// Some frames (ID3v2.3 `XDOR`) only survive in the raw tag.
struct FileTags {
    tag: Tag,
    id3v2: Option<Id3v2Tag>,
}

impl TagReader for LoftyReader {
    fn read(&self, path: &Path) -> Result<RawTags, MetadataError> {
        let tags = read_file_tags(path)
            .map_err(|source| MetadataError::Read {
                path: path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| MetadataError::NoTags {
                path: path.to_path_buf(),
            })?;

        Ok(raw_tags(&tags.tag, tags.id3v2.as_ref()))
    }
}

fn parse_options() -> ParseOptions {
    ParseOptions::new().read_properties(false)
}

fn read_file_tags(path: &Path) -> Result<Option<FileTags>, LoftyError> {
    let mut reader = BufReader::new(File::open(path)?);

    if let Some(offset) = dsf_metadata_offset(&mut reader)? {
        let id3v2 = read_dsf_id3v2(&mut reader, offset)?;
        return Ok(id3v2.map(|id3v2| FileTags {
            tag: Tag::from(id3v2.clone()),
            id3v2: Some(id3v2),
        }));
    }

    let (tagged_file, id3v2) = read_tagged_file(&mut reader, path)?;

    // Try primary tag, then fall back
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .cloned();
    Ok(tag.map(|tag| FileTags { tag, id3v2 }))
}

/// Parse by extension, then by content sniffing if the extension is unknown
/// or wrong.
fn read_tagged_file<R: Read + Seek>(
    reader: &mut R,
    path: &Path,
) -> Result<(TaggedFile, Option<Id3v2Tag>), LoftyError> {
    if let Some(file_type) = FileType::from_path(path) {
        match read_as(reader, file_type) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => {
                log::debug!(
                    "{} did not parse as {:?} ({}), guessing from content",
                    path.display(),
                    file_type,
                    e
                );
                reader.seek(SeekFrom::Start(0))?;
            }
        }
    }

    let guessed = Probe::new(&mut *reader)
        .options(parse_options())
        .guess_file_type()?
        .file_type();
    let Some(file_type) = guessed else {
        return Err(LoftyError::new(ErrorKind::UnknownFormat));
    };
    log::debug!("{}: content looks like {:?}", path.display(), file_type);

    reader.seek(SeekFrom::Start(0))?;
    read_as(reader, file_type)
}

fn read_as<R: Read + Seek>(
    reader: &mut R,
    file_type: FileType,
) -> Result<(TaggedFile, Option<Id3v2Tag>), LoftyError> {
    if file_type == FileType::Mpeg {
        let mpeg = MpegFile::read_from(reader, parse_options())?;
        let id3v2 = mpeg.id3v2().cloned();
        return Ok((mpeg.into(), id3v2));
    }

    let tagged_file = Probe::with_file_type(reader, file_type)
        .options(parse_options())
        .read()?;
    Ok((tagged_file, None))
}

/// `Some(offset)` of the ID3v2 chunk if the stream is DSF, `None` otherwise.
fn dsf_metadata_offset<R: Read + Seek>(reader: &mut R) -> std::io::Result<Option<u64>> {
    let mut header = [0u8; DSF_HEADER_LEN];
    let is_dsf = match reader.read_exact(&mut header) {
        Ok(()) => header.starts_with(DSF_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;

    if !is_dsf {
        return Ok(None);
    }
    let mut offset = [0u8; 8];
    offset.copy_from_slice(&header[20..DSF_HEADER_LEN]);
    Ok(Some(u64::from_le_bytes(offset)))
}

fn read_dsf_id3v2<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<Option<Id3v2Tag>, LoftyError> {
    if offset == 0 {
        return Ok(None);
    }

    reader.seek(SeekFrom::Start(offset))?;
    let mut chunk = Vec::new();
    reader.read_to_end(&mut chunk)?;
    if !chunk.starts_with(b"ID3") {
        log::debug!("DSF metadata pointer {} does not point at an ID3v2 tag", offset);
        return Ok(None);
    }

    // lofty only parses ID3v2 inside a container; a bare tag reads as an MPEG
    // stream with no audio frames. The trailing APE footer search seeks 32 bytes
    // back from the end, so short tags need padding.
    chunk.extend_from_slice(&[0; 32]);
    let mut mpeg = MpegFile::read_from(&mut Cursor::new(chunk), parse_options())?;
    Ok(mpeg.remove_id3v2())
}

fn raw_tags(tag: &Tag, id3v2: Option<&Id3v2Tag>) -> RawTags {
    let mut frames = BTreeMap::new();
    for frame in YEAR_FALLBACK {
        let value = tag
            .get_string(&frame.item_key())
            .map(str::to_string)
            .or_else(|| id3v2.and_then(|id3v2| id3v2_frame_text(id3v2, frame.id())));
        if let Some(value) = value {
            frames.insert(frame.id().to_string(), value);
        }
    }

    RawTags {
        album_artist: tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()),
        album: tag.album().map(|s| s.to_string()),
        year: tag.year().unwrap_or(0),
        disc: tag.disk(),
        track: tag.track(),
        frames,
    }
}

/// Text of an ID3v2 frame. Frames lofty doesn't know are kept as raw bytes and
/// decoded here.
fn id3v2_frame_text(tag: &Id3v2Tag, id: &str) -> Option<String> {
    let id = FrameId::new(id).ok()?;
    match tag.get(&id)? {
        Frame::Text(frame) => Some(frame.value.clone()),
        Frame::Timestamp(frame) => Some(frame.timestamp.to_string()),
        Frame::Binary(frame) => decode_text_payload(&frame.data),
        _ => None,
    }
}

/// Decode a text frame body: one encoding byte, then the text. Only the first
/// of several NUL-separated values is kept.
fn decode_text_payload(data: &[u8]) -> Option<String> {
    let (&encoding, body) = data.split_first()?;
    let text: String = match encoding {
        // ISO-8859-1
        0 => body.iter().map(|&b| char::from(b)).collect(),
        // UTF-16 with BOM
        1 => match body {
            [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
            [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
            _ => decode_utf16(body, u16::from_be_bytes),
        },
        2 => decode_utf16(body, u16::from_be_bytes),
        3 => String::from_utf8_lossy(body).into_owned(),
        _ => return None,
    };

    let value = text.split('\0').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

/// Read one file and normalize it into an album candidate plus a track candidate.
pub fn extract(reader: &dyn TagReader, path: &Path) -> Result<(NewAlbum, NewTrack), MetadataError> {
    let raw = reader.read(path)?;

    let year = match i32::try_from(raw.year) {
        Ok(y) if y != 0 => y,
        _ => fallback_year(&raw.frames),
    };

    let album = NewAlbum {
        album_artist: raw.album_artist.unwrap_or_default(),
        name: raw.album.unwrap_or_default(),
        year,
    };
    let track = NewTrack {
        disc: to_i32(raw.disc),
        track_number: to_i32(raw.track),
        path: path.to_string_lossy().to_string(),
    };

    Ok((album, track))
}

fn to_i32(n: Option<u32>) -> i32 {
    n.and_then(|n| i32::try_from(n).ok()).unwrap_or(0)
}

/// Walk the fallback frames in priority order; first parsable year wins, else 0.
pub fn fallback_year(frames: &BTreeMap<String, String>) -> i32 {
    for frame in YEAR_FALLBACK {
        let Some(value) = frames.get(frame.id()) else {
            continue;
        };
        match parse_frame_year(value) {
            Some(year) => return year,
            None => log::debug!("Unusable {} frame: {:?}", frame.id(), value),
        }
    }
    0
}

/// Parse the leading `YYYY` of a frame value such as `1975-06-01` or `1975`.
fn parse_frame_year(value: &str) -> Option<i32> {
    let head = value.split('-').next().unwrap_or(value).trim();
    if head.len() != 4 || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    head.parse().ok().filter(|y| *y != 0)
}

/// In-memory reader for tests, keyed by path.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MapReader {
    pub tags: std::collections::HashMap<PathBuf, RawTags>,
}

#[cfg(test)]
impl MapReader {
    pub fn insert(&mut self, path: &Path, artist: &str, album: &str, year: u32, disc: u32, track: u32) {
        self.tags.insert(
            path.to_path_buf(),
            RawTags {
                album_artist: Some(artist.to_string()),
                album: Some(album.to_string()),
                year,
                disc: Some(disc),
                track: Some(track),
                frames: BTreeMap::new(),
            },
        );
    }
}

#[cfg(test)]
impl TagReader for MapReader {
    fn read(&self, path: &Path) -> Result<RawTags, MetadataError> {
        self.tags.get(path).cloned().ok_or_else(|| MetadataError::NoTags {
            path: path.to_path_buf(),
        })
    }
}
