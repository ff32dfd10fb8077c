//! Channel decorrelation and PCM interleaving.
//!
//! Stereo frames may store one channel as a difference signal. The inverse
//! transforms below recover plain left/right, after which the channels are
//! packed sample-major into little-endian PCM bytes.

use crate::structs::frame::ChannelAssignment;

/// Undoes the stereo decorrelation in place. `data[0]`/`data[1]` hold the
/// decoded subframes and end up as left/right.
pub fn decorrelate(assignment: ChannelAssignment, data: &mut [Vec<i32>]) {
    match assignment {
        // ch0 = L, ch1 = L - R.
        ChannelAssignment::LeftSide => {
            for i in 0..data[1].len() {
                data[1][i] = data[0][i].wrapping_sub(data[1][i]);
            }
        }

        // ch0 = L - R, ch1 = R.
        ChannelAssignment::RightSide => {
            for i in 0..data[0].len() {
                data[0][i] = data[0][i].wrapping_add(data[1][i]);
            }
        }

        // ch0 = (L + R) >> 1, ch1 = L - R. The shifted-out parity of L + R
        // equals the parity of L - R, so it is restored from the side
        // channel before the exact average is undone.
        ChannelAssignment::MidSide => {
            for i in 0..data[0].len() {
                let side = data[1][i];
                let mid = (data[0][i].wrapping_mul(2)) | (side & 1);
                data[0][i] = (mid.wrapping_add(side)) / 2;
                data[1][i] = (mid.wrapping_sub(side)) / 2;
            }
        }

        ChannelAssignment::Independent(_) => {}
    }
}

/// Packs the channels into interleaved little-endian PCM: for each sample
/// index, each channel emits `bits_per_sample / 8` bytes taken from the low
/// end of its 32-bit sample.
pub fn interleave(data: &[Vec<i32>], bits_per_sample: u32) -> Vec<u8> {
    let bytes_per_sample = bits_per_sample as usize / 8;
    let n_samples = data[0].len();

    let mut pcm = Vec::with_capacity(n_samples * data.len() * bytes_per_sample);
    for i in 0..n_samples {
        for channel in data {
            pcm.extend_from_slice(&channel[i].to_le_bytes()[..bytes_per_sample]);
        }
    }

    pcm
}
