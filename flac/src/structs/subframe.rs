//! Subframe decoding.
//!
//! Each channel of a frame is stored as one subframe: a constant value, the
//! raw samples, or a fixed/LPC predictor whose warm-up samples and
//! Rice-coded residual reconstruct the channel. Samples are decoded into
//! 32-bit two's-complement values; arithmetic wraps silently.

use std::io::Read;

use anyhow::{Result, bail};
use log::debug;

use crate::structs::residual;
use crate::utils::bitstream_io::BitstreamIoReader;
use crate::utils::errors::SubframeError;

/// Fixed-predictor coefficients indexed by order. Order 0 predicts zero, so
/// its residual passes through unchanged.
const FIXED_COEFFS: [&[i32]; 5] = [&[], &[1], &[2, -1], &[3, -3, 1], &[4, -6, 4, -1]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    Constant,
    Verbatim,
    Fixed(u8),
    Lpc(u8),
}

impl SubframeType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0b000000 => Ok(SubframeType::Constant),
            0b000001 => Ok(SubframeType::Verbatim),
            0b001000..=0b001100 => Ok(SubframeType::Fixed(code & 0x07)),
            0b100000..=0b111111 => Ok(SubframeType::Lpc((code & 0x1F) + 1)),
            code => bail!(SubframeError::BadSubframeType(code)),
        }
    }

    pub fn predictor_order(&self) -> usize {
        match self {
            SubframeType::Constant | SubframeType::Verbatim => 0,
            SubframeType::Fixed(order) => *order as usize,
            SubframeType::Lpc(order) => *order as usize,
        }
    }
}

/// Decodes one channel's subframe into `block_size` samples.
///
/// `bits_per_sample` is the channel's width including the extra difference
/// bit of a stereo decorrelation mode. Wasted bits narrow the coded width
/// and shift the decoded samples back up.
pub fn read<R: Read>(
    reader: &mut BitstreamIoReader<R>,
    block_size: usize,
    bits_per_sample: u32,
) -> Result<Vec<i32>> {
    // Padding bit; tolerated when nonzero.
    if reader.get()? {
        debug!("Nonzero padding bit in subframe header");
    }

    let kind = SubframeType::from_code(reader.get_n::<u8>(6)?)?;

    let wasted_bits = if reader.get()? { reader.get_unary()? + 1 } else { 0 };
    if wasted_bits >= bits_per_sample {
        bail!(SubframeError::WastedBitsTooLarge { wasted: wasted_bits, bits: bits_per_sample });
    }
    let bps = bits_per_sample - wasted_bits;

    let order = kind.predictor_order();
    if order > block_size {
        bail!(SubframeError::OrderExceedsBlockSize { order, block_size });
    }

    let mut data = match kind {
        SubframeType::Constant => {
            let value = reader.get_s::<i32>(bps)?;
            vec![value; block_size]
        }

        SubframeType::Verbatim => read_ints(reader, block_size, bps)?,

        SubframeType::Fixed(_) => {
            let warmup = read_ints(reader, order, bps)?;
            let residual = residual::read(reader, block_size, order)?;

            predict(FIXED_COEFFS[order], warmup, &residual, 0)
        }

        SubframeType::Lpc(_) => {
            let warmup = read_ints(reader, order, bps)?;

            let precision = reader.get_n::<u8>(4)?;
            if precision == 0xF {
                bail!(SubframeError::BadLpcPrecision);
            }

            let shift = reader.get_s::<i32>(5)?;
            if shift < 0 {
                bail!(SubframeError::NegativeLpcShift(shift));
            }

            let coeffs = read_ints(reader, order, precision as u32 + 1)?;
            let residual = residual::read(reader, block_size, order)?;

            predict(&coeffs, warmup, &residual, shift as u32)
        }
    };

    if wasted_bits > 0 {
        for sample in &mut data {
            *sample <<= wasted_bits;
        }
    }

    Ok(data)
}

fn read_ints<R: Read>(
    reader: &mut BitstreamIoReader<R>,
    count: usize,
    bits: u32,
) -> Result<Vec<i32>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.get_s::<i32>(bits)?);
    }

    Ok(values)
}

/// Linear-predictive reconstruction shared by the fixed and LPC subframes:
/// `x[i] = residual[i - p] + (sum(c[j] * x[i - 1 - j]) >> shift)`.
///
/// The sum runs in 64 bits (a 15-bit coefficient times a 32-bit sample
/// overflows 32), all `p` terms are accumulated before the shift, and the
/// store narrows to 32 bits with wrap.
fn predict(coeffs: &[i32], warmup: Vec<i32>, residual: &[i32], shift: u32) -> Vec<i32> {
    let mut data = warmup;
    data.reserve(residual.len());

    for &res in residual {
        let pos = data.len();

        let mut acc = 0i64;
        for (j, &coeff) in coeffs.iter().enumerate() {
            acc += coeff as i64 * data[pos - 1 - j] as i64;
        }

        data.push(((acc >> shift) as i32).wrapping_add(res));
    }

    data
}
