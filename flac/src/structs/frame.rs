//! Frame header structures.
//!
//! Every audio frame opens with a 14-bit sync code, a packed description of
//! the block (size, rate, channel layout, sample width), a UTF-8-style coded
//! frame or sample number, optional trailer fields, and a CRC-8 over all
//! header bytes.

use std::io;
use std::io::Read;

use anyhow::{Result, anyhow, bail};
use log::Level::Warn;

use crate::log_or_err;
use crate::process::decode::DecoderState;
use crate::utils::bitstream_io::BitstreamIoReader;
use crate::utils::errors::FrameError;

/// 14-bit synchronization code opening every frame.
pub const FRAME_SYNC_CODE: u16 = 0x3FFE;

/// How the channels of a frame are stored.
///
/// Codes 0-7 are (code + 1) independent channels; 8-10 select a stereo
/// decorrelation mode where one subframe carries the difference signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    Independent(u8),
    LeftSide,
    RightSide,
    MidSide,
}

impl ChannelAssignment {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0..=7 => Ok(ChannelAssignment::Independent(code + 1)),
            8 => Ok(ChannelAssignment::LeftSide),
            9 => Ok(ChannelAssignment::RightSide),
            10 => Ok(ChannelAssignment::MidSide),
            code => bail!(FrameError::BadChannelAssignment(code)),
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            ChannelAssignment::Independent(n) => *n as usize,
            _ => 2,
        }
    }
}

/// Parsed frame header.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub variable_blocking: bool,
    /// Inter-channel samples in this frame (1-65536).
    pub block_size: usize,
    /// Informational; reconstruction only uses STREAMINFO's rate.
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    /// Bits per PCM sample.
    pub sample_size: u32,
    /// First sample index of the frame under variable blocking, the frame
    /// index otherwise.
    pub number: u64,
    pub crc8: u8,
}

impl FrameHeader {
    /// Reads one frame header, arming the byte capture that the end-of-frame
    /// CRC-16 check consumes.
    ///
    /// Returns `Ok(None)` when the source is cleanly exhausted at the frame
    /// boundary; end of input anywhere later in the header is an error.
    pub fn read<R: Read>(
        state: &mut DecoderState,
        reader: &mut BitstreamIoReader<R>,
    ) -> Result<Option<Self>> {
        reader.begin_capture();

        let b0 = match reader.get_n::<u8>(8) {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && reader.captured_len() == 0 => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let sync = (b0 as u16) << 6 | reader.get_n::<u16>(6)?;
        if sync != FRAME_SYNC_CODE {
            bail!(FrameError::LostSync(sync));
        }

        let fields = reader.get_fields(&[1, 1, 4, 4, 4, 3, 1])?;
        if fields[0] != 0 || fields[6] != 0 {
            bail!(FrameError::ReservedHeaderBits);
        }

        let variable_blocking = fields[1] == 1;
        let block_size_code = fields[2] as u8;
        let sample_rate_code = fields[3] as u8;
        let channel_assignment = ChannelAssignment::from_code(fields[4] as u8)?;
        let sample_size_code = fields[5] as u8;

        let info = &state.stream_info;

        let sample_size = match sample_size_code {
            0 => info.bits_per_sample,
            1 => 8,
            2 => 12,
            4 => 16,
            5 => 20,
            6 => 24,
            code => bail!(FrameError::BadSampleSize(code)),
        };

        // A frame cannot change the PCM width mid-stream.
        if sample_size_code != 0 && sample_size != info.bits_per_sample {
            bail!(FrameError::SampleSizeMismatch {
                actual: sample_size,
                expected: info.bits_per_sample
            });
        }

        let number = read_coded_number(reader)?;

        let block_size = match block_size_code {
            0 => bail!(FrameError::BadBlockSize),
            1 => 192,
            2..=5 => 576 << (block_size_code - 2),
            6 => reader.get_n::<u32>(8)? as usize + 1,
            7 => reader.get_n::<u32>(16)? as usize + 1,
            code => 256 << (code - 8),
        };

        let sample_rate = match sample_rate_code {
            0 => info.sample_rate,
            1 => 88_200,
            2 => 176_400,
            3 => 192_000,
            4 => 8_000,
            5 => 16_000,
            6 => 22_050,
            7 => 24_000,
            8 => 32_000,
            9 => 44_100,
            10 => 48_000,
            11 => 96_000,
            12 => reader.get_n::<u32>(8)? * 1_000,
            13 => reader.get_n::<u32>(16)?,
            14 => reader.get_n::<u32>(16)? * 10,
            _ => bail!(FrameError::BadSampleRateCode),
        };

        if sample_rate_code != 0 && sample_rate != info.sample_rate {
            log_or_err!(
                state,
                Warn,
                anyhow!(FrameError::SampleRateMismatch {
                    actual: sample_rate,
                    expected: info.sample_rate
                })
            );
        }

        if channel_assignment.channels() != info.n_channels {
            log_or_err!(
                state,
                Warn,
                anyhow!(FrameError::ChannelCountMismatch {
                    actual: channel_assignment.channels(),
                    expected: info.n_channels
                })
            );
        }

        if info.min_block != 0
            && info.max_block != 0
            && !(info.min_block..=info.max_block).contains(&block_size)
        {
            log_or_err!(
                state,
                Warn,
                anyhow!(FrameError::BlockSizeOutOfBounds {
                    actual: block_size,
                    min: info.min_block,
                    max: info.max_block
                })
            );
        }

        let crc8 = reader.get_n::<u8>(8)?;
        let calculated = reader.with_captured(1, |bytes| state.crc_frame_header.checksum(bytes));
        if calculated != crc8 {
            bail!(FrameError::HeaderCrcMismatch { calculated, read: crc8 });
        }

        Ok(Some(Self {
            variable_blocking,
            block_size,
            sample_rate,
            channel_assignment,
            sample_size,
            number,
            crc8,
        }))
    }

    /// Bit depth of one channel's subframe. The difference channel of a
    /// stereo decorrelation mode carries one extra bit.
    pub fn bits_per_sample(&self, channel: usize) -> u32 {
        let extra = match self.channel_assignment {
            ChannelAssignment::LeftSide if channel == 1 => 1,
            ChannelAssignment::RightSide if channel == 0 => 1,
            ChannelAssignment::MidSide if channel == 1 => 1,
            _ => 0,
        };

        self.sample_size + extra
    }
}

/// Reads the UTF-8-style coded frame/sample number: the count of leading one
/// bits in the first byte selects the length, continuation bytes carry six
/// payload bits each.
fn read_coded_number<R: Read>(reader: &mut BitstreamIoReader<R>) -> Result<u64> {
    let b0 = reader.get_n::<u8>(8)?;

    match b0.leading_ones() {
        0 => Ok(b0 as u64),
        k @ 2..=7 => {
            let mut value = (b0 & (0x7F >> k)) as u64;
            for _ in 1..k {
                let byte = reader.get_n::<u8>(8)?;
                if byte & 0xC0 != 0x80 {
                    bail!(FrameError::BadVarInt);
                }
                value = value << 6 | (byte & 0x3F) as u64;
            }

            Ok(value)
        }
        // A lone continuation byte (one leading 1) or 0xFF (eight).
        _ => bail!(FrameError::BadVarInt),
    }
}
