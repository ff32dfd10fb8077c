//! Stream metadata structures.
//!
//! A FLAC stream opens with the `fLaC` magic followed by a chain of metadata
//! blocks. Only STREAMINFO (mandatory, always first in practice) and
//! VORBIS_COMMENT are parsed into structured form; every other block kind is
//! recognized and skipped.

use std::fmt::Display;
use std::io::Read;

use anyhow::{Result, bail};
use log::trace;

use crate::utils::bitstream_io::{BitstreamIoReader, BsIoSliceReader};
use crate::utils::errors::MetadataError;

/// Stream marker preceding the metadata chain.
pub const FLAC_MAGIC: [u8; 4] = *b"fLaC";

/// Size of the STREAMINFO block body in bytes.
pub const STREAM_INFO_SIZE: usize = 34;

/// Metadata block kinds from the 7-bit type field of the block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    Unknown(u8),
    Invalid,
}

impl BlockType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => BlockType::StreamInfo,
            1 => BlockType::Padding,
            2 => BlockType::Application,
            3 => BlockType::SeekTable,
            4 => BlockType::VorbisComment,
            5 => BlockType::CueSheet,
            6 => BlockType::Picture,
            127 => BlockType::Invalid,
            code => BlockType::Unknown(code),
        }
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockType::StreamInfo => write!(f, "STREAMINFO"),
            BlockType::Padding => write!(f, "PADDING"),
            BlockType::Application => write!(f, "APPLICATION"),
            BlockType::SeekTable => write!(f, "SEEKTABLE"),
            BlockType::VorbisComment => write!(f, "VORBIS_COMMENT"),
            BlockType::CueSheet => write!(f, "CUESHEET"),
            BlockType::Picture => write!(f, "PICTURE"),
            BlockType::Unknown(code) => write!(f, "Unknown({code})"),
            BlockType::Invalid => write!(f, "InvalidBlockType"),
        }
    }
}

/// Global stream parameters from the mandatory STREAMINFO block.
///
/// Immutable once parsed; every frame header is validated against it.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Minimum and maximum inter-channel samples per block (0 = unknown).
    pub min_block: usize,
    pub max_block: usize,
    /// Minimum and maximum frame size in bytes (0 = unknown).
    pub min_frame: u32,
    pub max_frame: u32,
    pub sample_rate: u32,
    pub n_channels: usize,
    pub bits_per_sample: u32,
    /// Total inter-channel samples (0 = unknown).
    pub total_samples: u64,
    /// Expected MD5 of the interleaved PCM output (all zeros = unknown).
    pub md5: [u8; 16],
}

impl StreamInfo {
    fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let fields = reader.get_fields(&[16, 16, 24, 24, 20, 3, 5, 36])?;

        let mut md5 = [0u8; 16];
        reader.read_bytes(&mut md5)?;

        let info = Self {
            min_block: fields[0] as usize,
            max_block: fields[1] as usize,
            min_frame: fields[2] as u32,
            max_frame: fields[3] as u32,
            sample_rate: fields[4] as u32,
            n_channels: fields[5] as usize + 1,
            bits_per_sample: fields[6] as u32 + 1,
            total_samples: fields[7],
            md5,
        };

        if info.sample_rate == 0 {
            bail!(MetadataError::BadSampleRate);
        }

        Ok(info)
    }

    /// True when the stored MD5 is the all-zero "unknown" marker.
    pub fn md5_unknown(&self) -> bool {
        self.md5 == [0u8; 16]
    }
}

/// Vorbis-style comments (a.k.a. FLAC tags): human-readable textual
/// information keyed as `NAME=value` strings.
#[derive(Debug, Clone, Default)]
pub struct VorbisComment {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl VorbisComment {
    fn read(body: &[u8]) -> Result<Self> {
        let (vendor, body) = vorbis_string(body)?;

        if body.len() < 4 {
            bail!(MetadataError::VorbisCommentTruncated);
        }
        let count = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let mut body = &body[4..];

        let mut comments = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let (comment, rest) = vorbis_string(body)?;
            comments.push(comment);
            body = rest;
        }

        Ok(Self { vendor, comments })
    }
}

/// One length-prefixed string: little-endian 32-bit byte count, then UTF-8.
fn vorbis_string(data: &[u8]) -> Result<(String, &[u8])> {
    if data.len() < 4 {
        bail!(MetadataError::VorbisCommentTruncated);
    }
    let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let data = &data[4..];

    if length > data.len() {
        bail!(MetadataError::VorbisStringTooLong { length, remaining: data.len() });
    }

    let Ok(string) = String::from_utf8(data[..length].to_vec()) else {
        bail!(MetadataError::VorbisStringNotUtf8);
    };

    Ok((string, &data[length..]))
}

/// Parsed metadata header section of a stream.
#[derive(Debug, Clone)]
pub struct MetaData {
    pub stream_info: StreamInfo,
    pub vorbis_comment: Option<VorbisComment>,
}

impl MetaData {
    /// Reads the magic and the whole metadata chain, leaving the reader
    /// positioned at the first audio frame.
    pub fn read<R: Read>(reader: &mut BitstreamIoReader<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_bytes(&mut magic)?;
        if magic != FLAC_MAGIC {
            bail!(MetadataError::BadMagic(u32::from_be_bytes(magic)));
        }

        let mut stream_info = None;
        let mut vorbis_comment = None;

        loop {
            let fields = reader.get_fields(&[1, 7, 24])?;
            let is_last = fields[0] == 1;
            let kind = BlockType::from_code(fields[1] as u8);
            let length = fields[2] as usize;

            trace!("Metadata block {kind}, {length} bytes");

            match kind {
                BlockType::Invalid => bail!(MetadataError::InvalidBlockType),

                BlockType::StreamInfo => {
                    let body = read_body(reader, length)?;
                    if body.len() < STREAM_INFO_SIZE {
                        bail!(MetadataError::StreamInfoTooShort(body.len()));
                    }
                    stream_info = Some(StreamInfo::read(&mut BsIoSliceReader::from_slice(&body))?);
                }

                BlockType::VorbisComment => {
                    let body = read_body(reader, length)?;
                    vorbis_comment = Some(VorbisComment::read(&body)?);
                }

                // Recognized or unknown, the block is skipped whole; its
                // length field is authoritative.
                _ => reader.skip_n(8 * length as u32)?,
            }

            if is_last {
                break;
            }
        }

        let Some(stream_info) = stream_info else {
            bail!(MetadataError::MissingStreamInfo);
        };

        Ok(Self { stream_info, vorbis_comment })
    }
}

fn read_body<R: Read>(reader: &mut BitstreamIoReader<R>, length: usize) -> Result<Vec<u8>> {
    let mut body = vec![0u8; length];
    reader.read_bytes(&mut body)?;

    Ok(body)
}
