#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("Bad fLaC magic header. Read {0:#010X}")]
    BadMagic(u32),

    #[error("Invalid metadata block type (127)")]
    InvalidBlockType,

    #[error("Missing mandatory STREAMINFO block")]
    MissingStreamInfo,

    #[error("STREAMINFO sample rate must be nonzero")]
    BadSampleRate,

    #[error("Unsupported bits per sample ({0}), supported values are: 8, 16, and 24")]
    UnsupportedBitsPerSample(u32),

    #[error("STREAMINFO block is {0} bytes, expected at least 34")]
    StreamInfoTooShort(usize),

    #[error("Vorbis string length {length} exceeds remaining block size {remaining}")]
    VorbisStringTooLong { length: usize, remaining: usize },

    #[error("Vorbis comment string is not valid UTF-8")]
    VorbisStringNotUtf8,

    #[error("Vorbis comment block is truncated")]
    VorbisCommentTruncated,
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Lost frame synchronization. Read {0:#06X}, expected 0x3FFE")]
    LostSync(u16),

    #[error("Reserved bit in frame header must be 0")]
    ReservedHeaderBits,

    #[error("Reserved channel assignment {0:#03X}")]
    BadChannelAssignment(u8),

    #[error("Reserved sample size code {0}")]
    BadSampleSize(u8),

    #[error("Frame sample size {actual} does not match STREAMINFO bits per sample {expected}")]
    SampleSizeMismatch { actual: u32, expected: u32 },

    #[error("Reserved block size code 0")]
    BadBlockSize,

    #[error("Block size {actual} outside STREAMINFO bounds [{min}, {max}]")]
    BlockSizeOutOfBounds { actual: usize, min: usize, max: usize },

    #[error("Frame declares {actual} channels, STREAMINFO declares {expected}")]
    ChannelCountMismatch { actual: usize, expected: usize },

    #[error("Reserved sample rate code 15")]
    BadSampleRateCode,

    #[error("Frame sample rate {actual} Hz does not match STREAMINFO {expected} Hz")]
    SampleRateMismatch { actual: u32, expected: u32 },

    #[error("Invalid coded number in frame header")]
    BadVarInt,

    #[error("CRC failed on frame header. Calculated {calculated:#04X}, Read {read:#04X}")]
    HeaderCrcMismatch { calculated: u8, read: u8 },

    #[error("CRC failed on frame. Calculated {calculated:#06X}, Read {read:#06X}")]
    FrameCrcMismatch { calculated: u16, read: u16 },
}

#[derive(thiserror::Error, Debug)]
pub enum SubframeError {
    #[error("Reserved subframe type {0:#08b}")]
    BadSubframeType(u8),

    #[error("Invalid LPC coefficient precision code 0xF")]
    BadLpcPrecision,

    #[error("Negative LPC quantization shift {0}")]
    NegativeLpcShift(i32),

    #[error("Wasted bits ({wasted}) meet or exceed the {bits}-bit sample width")]
    WastedBitsTooLarge { wasted: u32, bits: u32 },

    #[error("Predictor order {order} exceeds block size {block_size}")]
    OrderExceedsBlockSize { order: usize, block_size: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ResidualError {
    #[error("Reserved residual coding method {0}")]
    BadCodingMethod(u8),

    #[error("Unsupported escaped (unencoded) Rice partition")]
    UnsupportedEscape,

    #[error(
        "Partition order {order} does not evenly divide block size {block_size}, or leaves the \
         first partition shorter than predictor order {predictor_order}"
    )]
    BadPartitionOrder {
        order: u32,
        block_size: usize,
        predictor_order: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("MD5 mismatch over decoded audio. Calculated {calculated}, expected {expected}")]
    Md5Mismatch { calculated: String, expected: String },
}
