//! Audio decoding to interleaved PCM bytes.
//!
//! [`Decoder`] pulls one frame per call: header, one subframe per channel,
//! byte re-alignment, CRC-16 verification, channel decorrelation, and
//! little-endian interleaving. A rolling MD5 over everything emitted is
//! compared against the STREAMINFO digest once the source is exhausted.

use std::io::Read;

use anyhow::{Result, bail};
use log::{debug, trace};

use crate::structs::channel;
use crate::structs::frame::FrameHeader;
use crate::structs::metadata::{MetaData, StreamInfo, VorbisComment};
use crate::structs::subframe;
use crate::utils::bitstream_io::BitstreamIoReader;
use crate::utils::crc::{CRC_FRAME_ALG, CRC_FRAME_HEADER_ALG, Crc8, Crc16};
use crate::utils::errors::{DecodeError, FrameError, MetadataError};

/// Decoding state shared with the frame-level parsers.
pub struct DecoderState {
    /// Messages at this level or below fail the decode instead of logging.
    pub fail_level: log::Level,
    pub stream_info: StreamInfo,
    pub vorbis_comment: Option<VorbisComment>,
    pub crc_frame_header: Crc8,
    pub crc_frame: Crc16,
    pub frames_decoded: u64,
    pub samples_decoded: u64,
    md5: md5::Context,
    finished: bool,
}

impl std::fmt::Debug for DecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderState")
            .field("fail_level", &self.fail_level)
            .field("stream_info", &self.stream_info)
            .field("vorbis_comment", &self.vorbis_comment)
            .field("crc_frame_header", &self.crc_frame_header)
            .field("crc_frame", &self.crc_frame)
            .field("frames_decoded", &self.frames_decoded)
            .field("samples_decoded", &self.samples_decoded)
            .field("finished", &self.finished)
            .finish()
    }
}

impl DecoderState {
    pub(crate) fn new(meta: MetaData) -> Self {
        Self {
            fail_level: log::Level::Error,
            stream_info: meta.stream_info,
            vorbis_comment: meta.vorbis_comment,
            crc_frame_header: Crc8::new(&CRC_FRAME_HEADER_ALG),
            crc_frame: Crc16::new(&CRC_FRAME_ALG),
            frames_decoded: 0,
            samples_decoded: 0,
            md5: md5::Context::new(),
            finished: false,
        }
    }
}

/// Pull-based FLAC stream decoder.
///
/// One `next_frame` call advances exactly one audio frame. The decoder is
/// single-threaded and owns its byte source; a failed call leaves the source
/// at an indeterminate position and the decoder should be dropped.
#[derive(Debug)]
pub struct Decoder<R: Read> {
    reader: BitstreamIoReader<R>,
    state: DecoderState,
}

impl<R: Read> Decoder<R> {
    /// Opens a stream: consumes the `fLaC` magic and the metadata chain.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = BitstreamIoReader::new(source);
        let meta = MetaData::read(&mut reader)?;

        let bits = meta.stream_info.bits_per_sample;
        if !matches!(bits, 8 | 16 | 24) {
            bail!(MetadataError::UnsupportedBitsPerSample(bits));
        }

        Ok(Self { reader, state: DecoderState::new(meta) })
    }

    pub fn stream_info(&self) -> &StreamInfo {
        &self.state.stream_info
    }

    pub fn vorbis_comment(&self) -> Option<&VorbisComment> {
        self.state.vorbis_comment.as_ref()
    }

    pub fn metadata(&self) -> MetaData {
        MetaData {
            stream_info: self.state.stream_info.clone(),
            vorbis_comment: self.state.vorbis_comment.clone(),
        }
    }

    /// Inter-channel samples decoded so far.
    pub fn samples_decoded(&self) -> u64 {
        self.state.samples_decoded
    }

    pub fn frames_decoded(&self) -> u64 {
        self.state.frames_decoded
    }

    /// Sets the failure level for stream-validity findings.
    ///
    /// - `log::Level::Error`: only fail on hard errors (default)
    /// - `log::Level::Warn`: fail on warnings too (strict mode)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    /// Decodes the next frame into interleaved little-endian PCM bytes.
    ///
    /// Returns `Ok(None)` once the source is cleanly exhausted at a frame
    /// boundary; the MD5 verification runs at that point and every later
    /// call returns `Ok(None)` without touching the source.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.state.finished {
            return Ok(None);
        }

        let Some(header) = FrameHeader::read(&mut self.state, &mut self.reader)? else {
            self.finish()?;
            return Ok(None);
        };

        trace!(
            "Frame {}: {} samples, {:?}, {} bits",
            header.number, header.block_size, header.channel_assignment, header.sample_size,
        );

        let n_channels = header.channel_assignment.channels();
        let mut data = Vec::with_capacity(n_channels);
        for ch in 0..n_channels {
            data.push(subframe::read(
                &mut self.reader,
                header.block_size,
                header.bits_per_sample(ch),
            )?);
        }

        // Frame trailer: 0-7 padding bits, then the stored CRC-16 over
        // every preceding frame byte.
        self.reader.align_to_byte();
        let read = self.reader.get_n::<u16>(16)?;
        let calculated =
            self.reader.with_captured(2, |bytes| self.state.crc_frame.checksum(bytes));
        if calculated != read {
            bail!(FrameError::FrameCrcMismatch { calculated, read });
        }

        channel::decorrelate(header.channel_assignment, &mut data);
        let pcm = channel::interleave(&data, self.state.stream_info.bits_per_sample);

        self.state.md5.consume(&pcm);
        self.state.frames_decoded += 1;
        self.state.samples_decoded += header.block_size as u64;

        Ok(Some(pcm))
    }

    fn finish(&mut self) -> Result<()> {
        self.state.finished = true;

        if self.state.stream_info.md5_unknown() {
            debug!("Stored MD5 is zero, skipping verification");
            return Ok(());
        }

        let calculated: [u8; 16] = self.state.md5.clone().compute().into();
        if calculated != self.state.stream_info.md5 {
            bail!(DecodeError::Md5Mismatch {
                calculated: hex(&calculated),
                expected: hex(&self.state.stream_info.md5),
            });
        }

        debug!(
            "MD5 verified over {} samples in {} frames",
            self.state.samples_decoded, self.state.frames_decoded
        );

        Ok(())
    }
}

fn hex(digest: &[u8; 16]) -> String {
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Decodes a whole stream, verifies its MD5 checksum, and returns the PCM
/// data and metadata.
pub fn decode<R: Read>(source: R) -> Result<(Vec<u8>, MetaData)> {
    let mut decoder = Decoder::new(source)?;

    let info = decoder.stream_info();
    let capacity =
        info.total_samples as usize * info.n_channels * (info.bits_per_sample as usize / 8);

    let mut data = Vec::with_capacity(capacity);
    while let Some(frame) = decoder.next_frame()? {
        data.extend_from_slice(&frame);
    }

    Ok((data, decoder.metadata()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::metadata::FLAC_MAGIC;
    use crate::utils::errors::SubframeError;
    use std::io;

    /// Appends `width` bits of `value`, MSB first.
    fn push_bits(bits: &mut String, value: u64, width: u32) {
        for i in (0..width).rev() {
            bits.push(if value >> i & 1 == 1 { '1' } else { '0' });
        }
    }

    /// Two's-complement representation of `value` in `width` bits.
    fn signed(value: i64, width: u32) -> u64 {
        (value as u64) & ((1u64 << width) - 1)
    }

    fn to_bytes(bits: &str) -> Vec<u8> {
        assert!(bits.len() % 8 == 0, "bitstream not byte aligned");
        bits.as_bytes()
            .chunks(8)
            .map(|chunk| {
                chunk.iter().fold(0u8, |acc, &bit| acc << 1 | u8::from(bit == b'1'))
            })
            .collect()
    }

    struct StreamParams {
        block_size: usize,
        n_channels: usize,
        bits_per_sample: u32,
        total_samples: u64,
        md5: [u8; 16],
    }

    fn stream_info_block(params: &StreamParams) -> Vec<u8> {
        let mut bits = String::new();
        push_bits(&mut bits, params.block_size as u64, 16);
        push_bits(&mut bits, params.block_size as u64, 16);
        push_bits(&mut bits, 0, 24);
        push_bits(&mut bits, 0, 24);
        push_bits(&mut bits, 44_100, 20);
        push_bits(&mut bits, params.n_channels as u64 - 1, 3);
        push_bits(&mut bits, params.bits_per_sample as u64 - 1, 5);
        push_bits(&mut bits, params.total_samples, 36);

        let mut block = vec![0x80, 0x00, 0x00, 0x22];
        block.extend_from_slice(&to_bytes(&bits));
        block.extend_from_slice(&params.md5);
        block
    }

    /// Assembles one frame from header bit fields and subframe payload bits,
    /// appending the CRC-8 and CRC-16 the decoder will verify.
    fn frame(params: &StreamParams, channel_code: u64, subframes: &str) -> Vec<u8> {
        let mut header = String::new();
        push_bits(&mut header, 0x3FFE, 14); // sync
        push_bits(&mut header, 0, 1); // reserved
        push_bits(&mut header, 0, 1); // fixed blocking
        push_bits(&mut header, 6, 4); // block size from 8-bit trailer
        push_bits(&mut header, 0, 4); // sample rate from STREAMINFO
        push_bits(&mut header, channel_code, 4);
        push_bits(&mut header, 0, 3); // sample size from STREAMINFO
        push_bits(&mut header, 0, 1); // reserved
        push_bits(&mut header, 0, 8); // frame number 0
        push_bits(&mut header, params.block_size as u64 - 1, 8);

        let mut bytes = to_bytes(&header);
        let crc8 = Crc8::new(&CRC_FRAME_HEADER_ALG);
        bytes.push(crc8.checksum(&bytes));

        let mut body = subframes.to_string();
        while body.len() % 8 != 0 {
            body.push('0');
        }
        bytes.extend_from_slice(&to_bytes(&body));

        let crc16 = Crc16::new(&CRC_FRAME_ALG);
        let crc = crc16.checksum(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        bytes
    }

    /// A 16-bit verbatim subframe for one channel (`extra` widens the side
    /// channel of a decorrelated stereo pair).
    fn verbatim(samples: &[i64], extra: u32) -> String {
        let mut bits = String::new();
        push_bits(&mut bits, 0b0_000001_0, 8);
        for &sample in samples {
            push_bits(&mut bits, signed(sample, 16 + extra), 16 + extra);
        }
        bits
    }

    fn stream(params: &StreamParams, frames: &[Vec<u8>]) -> Vec<u8> {
        let mut data = FLAC_MAGIC.to_vec();
        data.extend_from_slice(&stream_info_block(params));
        for frame in frames {
            data.extend_from_slice(frame);
        }
        data
    }

    fn params_with_md5(
        block_size: usize,
        n_channels: usize,
        bits_per_sample: u32,
        pcm: &[u8],
    ) -> StreamParams {
        StreamParams {
            block_size,
            n_channels,
            bits_per_sample,
            total_samples: block_size as u64,
            md5: md5::compute(pcm).into(),
        }
    }

    #[test]
    fn single_constant_sample_stream() -> Result<()> {
        // STREAMINFO declares one 16-bit mono sample; the frame holds a
        // CONSTANT subframe with value 0x1234.
        let expected = [0x34, 0x12];
        let params = params_with_md5(1, 1, 16, &expected);

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        push_bits(&mut subframe, 0x1234, 16);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let mut decoder = Decoder::new(io::Cursor::new(data))?;

        assert_eq!(decoder.next_frame()?.as_deref(), Some(&expected[..]));
        assert_eq!(decoder.next_frame()?, None);
        assert_eq!(decoder.next_frame()?, None);
        assert_eq!(decoder.samples_decoded(), 1);
        assert_eq!(decoder.frames_decoded(), 1);

        Ok(())
    }

    #[test]
    fn independent_stereo_verbatim_frame() -> Result<()> {
        let expected = [0x01, 0x00, 0x02, 0x00, 0xFF, 0xFF, 0xFE, 0xFF];
        let params = params_with_md5(2, 2, 16, &expected);

        let subframes = verbatim(&[1, -1], 0) + &verbatim(&[2, -2], 0);
        let data = stream(&params, &[frame(&params, 1, &subframes)]);

        let (pcm, meta) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);
        assert_eq!(meta.stream_info.n_channels, 2);

        Ok(())
    }

    #[test]
    fn left_side_stereo_recovers_the_right_channel() -> Result<()> {
        let expected = [0x64, 0x00, 0x46, 0x00, 0x64, 0x00, 0x6E, 0x00];
        let params = params_with_md5(2, 2, 16, &expected);

        // ch0 = left, ch1 = side at 17 bits.
        let subframes = verbatim(&[100, 100], 0) + &verbatim(&[30, -10], 1);
        let data = stream(&params, &[frame(&params, 8, &subframes)]);

        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }

    #[test]
    fn right_side_stereo_recovers_the_left_channel() -> Result<()> {
        let expected = [0x64, 0x00, 0x46, 0x00, 0x64, 0x00, 0x6E, 0x00];
        let params = params_with_md5(2, 2, 16, &expected);

        // ch0 = side at 17 bits, ch1 = right.
        let subframes = verbatim(&[30, -10], 1) + &verbatim(&[70, 110], 0);
        let data = stream(&params, &[frame(&params, 9, &subframes)]);

        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }

    #[test]
    fn mid_side_stereo_restores_parity() -> Result<()> {
        let expected = [0x07, 0x00, 0x04, 0x00, 0x01, 0x00, 0xFF, 0xFF];
        let params = params_with_md5(2, 2, 16, &expected);

        // ch0 = mid, ch1 = side at 17 bits.
        let subframes = verbatim(&[5, 0], 0) + &verbatim(&[3, 2], 1);
        let data = stream(&params, &[frame(&params, 10, &subframes)]);

        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }

    #[test]
    fn md5_mismatch_is_reported_at_end_of_stream() -> Result<()> {
        let expected = [0x34, 0x12];
        let mut params = params_with_md5(1, 1, 16, &expected);
        params.md5[0] ^= 0xFF;

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        push_bits(&mut subframe, 0x1234, 16);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let mut decoder = Decoder::new(io::Cursor::new(data))?;

        assert!(decoder.next_frame()?.is_some());
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(DecodeError::Md5Mismatch { .. })));

        Ok(())
    }

    #[test]
    fn all_zero_md5_skips_verification() -> Result<()> {
        let mut params = params_with_md5(1, 1, 16, &[0x34, 0x12]);
        params.md5 = [0; 16];

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        // Wrong-on-purpose sample; without a digest nothing can notice.
        push_bits(&mut subframe, 0x4321, 16);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, [0x21, 0x43]);

        Ok(())
    }

    #[test]
    fn frame_crc_mismatch_is_rejected() -> Result<()> {
        let expected = [0x34, 0x12];
        let params = params_with_md5(1, 1, 16, &expected);

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        push_bits(&mut subframe, 0x1234, 16);

        let mut data = stream(&params, &[frame(&params, 0, &subframe)]);
        let last = data.len() - 1;
        data[last] ^= 0x01;

        let mut decoder = Decoder::new(io::Cursor::new(data))?;
        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(FrameError::FrameCrcMismatch { .. })));

        Ok(())
    }

    #[test]
    fn truncation_mid_frame_is_unexpected_eof() -> Result<()> {
        let expected = [0x34, 0x12];
        let params = params_with_md5(1, 1, 16, &expected);

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        push_bits(&mut subframe, 0x1234, 16);

        let mut data = stream(&params, &[frame(&params, 0, &subframe)]);
        data.truncate(data.len() - 4);

        let mut decoder = Decoder::new(io::Cursor::new(data))?;
        let err = decoder.next_frame().unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);

        Ok(())
    }

    #[test]
    fn unsupported_bits_per_sample_fails_open() {
        let params = StreamParams {
            block_size: 1,
            n_channels: 1,
            bits_per_sample: 20,
            total_samples: 1,
            md5: [0; 16],
        };

        let data = stream(&params, &[]);
        let err = Decoder::new(io::Cursor::new(data)).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(MetadataError::UnsupportedBitsPerSample(20))));
    }

    #[test]
    fn subframe_errors_surface_from_next_frame() -> Result<()> {
        let params = params_with_md5(1, 1, 16, &[0, 0]);

        // Reserved subframe type 000010.
        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000010_0, 8);
        push_bits(&mut subframe, 0, 16);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let mut decoder = Decoder::new(io::Cursor::new(data))?;

        let err = decoder.next_frame().unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(SubframeError::BadSubframeType(0b000010))));

        Ok(())
    }

    #[test]
    fn eight_bit_streams_emit_one_byte_per_sample() -> Result<()> {
        let expected = [0xFE, 0xFE];
        let params = params_with_md5(2, 1, 8, &expected);

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000000_0, 8);
        push_bits(&mut subframe, signed(-2, 8), 8);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }

    #[test]
    fn twenty_four_bit_streams_emit_three_bytes_per_sample() -> Result<()> {
        let expected = [0x56, 0x34, 0x12, 0xFF, 0xFF, 0xFF];
        let params = params_with_md5(2, 1, 24, &expected);

        let mut subframe = String::new();
        push_bits(&mut subframe, 0b0_000001_0, 8);
        push_bits(&mut subframe, signed(0x123456, 24), 24);
        push_bits(&mut subframe, signed(-1, 24), 24);

        let data = stream(&params, &[frame(&params, 0, &subframe)]);
        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }

    #[test]
    fn truncation_inside_the_metadata_fails_open() {
        let params = params_with_md5(1, 1, 16, &[0, 0]);
        let mut data = stream(&params, &[]);
        data.truncate(10);

        let err = Decoder::new(io::Cursor::new(data)).unwrap_err();
        let io_err = err.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn multi_frame_stream_accumulates_the_digest() -> Result<()> {
        // Two mono CONSTANT frames; the MD5 covers both in order.
        let expected = [0x0A, 0x00, 0x0B, 0x00];
        let params = params_with_md5(1, 1, 16, &expected);

        let mut first = String::new();
        push_bits(&mut first, 0b0_000000_0, 8);
        push_bits(&mut first, 0x000A, 16);
        let mut second = String::new();
        push_bits(&mut second, 0b0_000000_0, 8);
        push_bits(&mut second, 0x000B, 16);

        let frames = [frame(&params, 0, &first), frame(&params, 0, &second)];
        let data = stream(&params, &frames);

        let (pcm, _) = decode(io::Cursor::new(data))?;
        assert_eq!(pcm, expected);

        Ok(())
    }
}
