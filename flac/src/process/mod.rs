//! Stream decoding to PCM audio.
//!
//! Provides the pull-based [`Decoder`](decode::Decoder) and the
//! [`decode`](decode::decode) convenience that drains a whole stream at
//! once.

pub mod decode;
