#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder for FLAC bitstreams according to the format's frame syntax.
//!
//! ### Bitstream Organization
//!
//! **Stream level**: `fLaC` magic, a chain of metadata blocks, then audio
//! frames back to back until end of input.
//! **Frame level**: a CRC-8-protected header, one subframe per channel,
//! byte-alignment padding, and a trailing CRC-16 over the whole frame.
//!
//! ### Decoding Pipeline
//!
//! 1. Open a stream with [`process::decode::Decoder::new`]: parses the
//!    metadata chain and fixes the stream parameters.
//! 2. Pull frames with [`process::decode::Decoder::next_frame`]: each call
//!    yields one block of interleaved little-endian PCM.
//! 3. At end of input the rolling MD5 over all emitted PCM is checked
//!    against the STREAMINFO digest.

/// Stream decoding to PCM samples.
///
/// Provides the [`Decoder`](process::decode::Decoder) for pulling decoded
/// frames out of a byte source and a whole-stream
/// [`decode`](process::decode::decode) convenience.
pub mod process;

/// Data structures representing FLAC format components.
///
/// - **Metadata** ([`structs::metadata`]): STREAMINFO and Vorbis comments
/// - **Frame headers** ([`structs::frame`]): sync, blocking, channel layout
/// - **Subframes** ([`structs::subframe`]): constant/verbatim/fixed/LPC
/// - **Residuals** ([`structs::residual`]): partitioned Rice coding
/// - **Channels** ([`structs::channel`]): decorrelation and interleaving
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): bit-level reading
/// - **CRC validation** ([`utils::crc`]): error detection
/// - **Error handling** ([`utils::errors`]): error types
pub mod utils;
