//! Partitioned Rice residual decoding.
//!
//! A predictive subframe stores `block_size - order` residuals split into
//! `2^partition_order` partitions, each with its own Rice parameter. The
//! first partition is shorter by `order` samples because the warm-up samples
//! are stored verbatim ahead of the residual.

use std::io::Read;

use anyhow::{Result, bail};

use crate::utils::bitstream_io::BitstreamIoReader;
use crate::utils::errors::ResidualError;

/// Inverse of the zig-zag fold: 0, 1, 2, 3, ... becomes 0, -1, 1, -2, ...
#[inline(always)]
pub fn zigzag_decode(folded: u64) -> i32 {
    ((folded >> 1) as i32) ^ -((folded & 1) as i32)
}

/// Decodes the residual section of a predictive subframe, returning exactly
/// `block_size - predictor_order` values.
pub fn read<R: Read>(
    reader: &mut BitstreamIoReader<R>,
    block_size: usize,
    predictor_order: usize,
) -> Result<Vec<i32>> {
    let method = reader.get_n::<u8>(2)?;
    let parameter_bits = match method {
        0 => 4,
        1 => 5,
        method => bail!(ResidualError::BadCodingMethod(method)),
    };
    let escape = (1u32 << parameter_bits) - 1;

    let order = reader.get_n::<u8>(4)? as u32;
    let partitions = 1usize << order;

    if block_size % partitions != 0 || block_size / partitions < predictor_order {
        bail!(ResidualError::BadPartitionOrder { order, block_size, predictor_order });
    }

    let mut residual = Vec::with_capacity(block_size - predictor_order);

    for i in 0..partitions {
        let parameter = reader.get_n::<u32>(parameter_bits)?;
        if parameter == escape {
            bail!(ResidualError::UnsupportedEscape);
        }

        let mut length = block_size / partitions;
        if i == 0 {
            length -= predictor_order;
        }

        for _ in 0..length {
            let quotient = reader.get_unary()? as u64;
            let remainder = if parameter > 0 { reader.get_n::<u64>(parameter)? } else { 0 };

            residual.push(zigzag_decode(quotient << parameter | remainder));
        }
    }

    Ok(residual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::bitstream_io::BsIoSliceReader;

    fn read_slice(bytes: &[u8], block_size: usize, order: usize) -> Result<Vec<i32>> {
        read(&mut BsIoSliceReader::from_slice(bytes), block_size, order)
    }

    #[test]
    fn zigzag_is_the_documented_bijection() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_decode(4), 2);
        assert_eq!(zigzag_decode(u32::MAX as u64), i32::MIN);
        assert_eq!(zigzag_decode(u32::MAX as u64 - 1), i32::MAX);
    }

    #[test]
    fn decodes_a_single_partition() -> Result<()> {
        // Method 00, partition order 0000, M = 0001, then folded values
        // 1, 2, 3, 8 as quotient/remainder pairs:
        //   1|1  01|0  01|1  00001|0
        // Packed: 00 0000 0001 11 010 011 000010 = 00 74 C2.
        assert_eq!(read_slice(&[0x00, 0x74, 0xC2], 4, 0)?, vec![-1, 1, -2, 4]);

        Ok(())
    }

    #[test]
    fn first_partition_is_shortened_by_the_predictor_order() -> Result<()> {
        // Partition order 1 over a block of 4 with predictor order 1: the
        // first partition holds 1 residual, the second 2. M = 0 in both, so
        // each residual is a bare unary quotient (folded 1, 0, 2).
        // Packed: 00 0001 0000 01 0000 1 001 + 0000 pad = 04 10 90.
        assert_eq!(read_slice(&[0x04, 0x10, 0x90], 4, 1)?, vec![-1, 0, 1]);

        Ok(())
    }

    #[test]
    fn five_bit_parameters_are_method_one() -> Result<()> {
        // Method 01, partition order 0000, M = 00010, one folded value 6 as
        // 01|10. Packed: 01 0000 00010 0110 + 0 pad = 40 4C.
        assert_eq!(read_slice(&[0x40, 0x4C], 1, 0)?, vec![3]);

        Ok(())
    }

    #[test]
    fn escape_parameter_is_unsupported() {
        // Method 0, partition order 0, M = 0xF.
        let err = read_slice(&[0b00_0000_11, 0b11_000000], 4, 0).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(ResidualError::UnsupportedEscape)));
    }

    #[test]
    fn reserved_coding_methods_are_rejected() {
        for bytes in [[0b10_000000u8, 0], [0b11_000000, 0]] {
            let err = read_slice(&bytes, 4, 0).unwrap_err();
            assert!(matches!(err.downcast_ref(), Some(ResidualError::BadCodingMethod(2 | 3))));
        }
    }

    #[test]
    fn partition_order_must_divide_the_block() {
        // Partition order 2 over a block of 6.
        let err = read_slice(&[0b00_0010_00, 0], 6, 0).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(ResidualError::BadPartitionOrder { .. })));

        // Partition of 1 sample cannot hold a second-order warm-up.
        let err = read_slice(&[0b00_0010_00, 0], 4, 2).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(ResidualError::BadPartitionOrder { .. })));
    }
}
