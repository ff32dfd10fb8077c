//! Bitstream I/O utilities for FLAC parsing.
//!
//! Wraps [`bitstream_io::BitReader`] with the operations the decoder needs:
//! MSB-first unsigned and two's-complement signed reads of 1-36 bits, unary
//! runs, byte re-alignment, and a capture tee that records every byte pulled
//! from the source so the frame CRCs can be computed over the exact consumed
//! byte range even when fields straddle byte boundaries.

use std::cell::RefCell;
use std::io;
use std::io::Read;
use std::rc::Rc;

use bitstream_io::{BigEndian, BitRead, BitReader, SignedInteger, UnsignedInteger};

/// Widest single field in the FLAC format (the 36-bit total-samples count
/// and coded sample number).
pub const MAX_FIELD_BITS: u32 = 36;

#[derive(Debug, Default)]
struct Capture {
    armed: bool,
    buf: Vec<u8>,
}

/// Byte source wrapper feeding the capture tee.
///
/// `bitstream_io` pulls bytes on demand and never reads ahead, so the bytes
/// that land in the capture buffer are exactly the bytes consumed so far.
#[derive(Debug)]
struct TapSource<R: Read> {
    inner: R,
    capture: Rc<RefCell<Capture>>,
}

impl<R: Read> Read for TapSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;

        let mut capture = self.capture.borrow_mut();
        if capture.armed {
            capture.buf.extend_from_slice(&buf[..n]);
        }

        Ok(n)
    }
}

#[derive(Debug)]
pub struct BitstreamIoReader<R: Read> {
    bs: BitReader<TapSource<R>, BigEndian>,
    capture: Rc<RefCell<Capture>>,
    bit_pos: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R: Read> BitstreamIoReader<R> {
    pub fn new(source: R) -> Self {
        let capture = Rc::new(RefCell::new(Capture::default()));
        let tap = TapSource { inner: source, capture: Rc::clone(&capture) };

        Self { bs: BitReader::new(tap), capture, bit_pos: 0 }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        let bit = self.bs.read_bit().map_err(|e| self.out_of_bounds("get", 1, e))?;
        self.bit_pos += 1;

        Ok(bit)
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        debug_assert!(n >= 1 && n <= MAX_FIELD_BITS);

        let value =
            self.bs.read_unsigned_var(n).map_err(|e| self.out_of_bounds("get_n", n, e))?;
        self.bit_pos += n as u64;

        Ok(value)
    }

    /// Sequential [`get_n`](Self::get_n) of each width.
    pub fn get_fields(&mut self, widths: &[u32]) -> io::Result<Vec<u64>> {
        widths.iter().map(|&w| self.get_n::<u64>(w)).collect()
    }

    /// Two's-complement signed read: bit `n-1` of the raw value extends to
    /// the full 32-bit width.
    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        let value = self.bs.read_signed_var(n).map_err(|e| self.out_of_bounds("get_s", n, e))?;
        self.bit_pos += n as u64;

        Ok(value)
    }

    /// Counts 0 bits up to the terminating 1 bit, which is consumed.
    #[inline(always)]
    pub fn get_unary(&mut self) -> io::Result<u32> {
        let mut count = 0;
        while !self.get()? {
            count += 1;
        }

        Ok(count)
    }

    /// Discards 0-7 buffered bits so the next read starts on a byte boundary.
    #[inline(always)]
    pub fn align_to_byte(&mut self) {
        self.bs.byte_align();
        self.bit_pos = self.bit_pos.next_multiple_of(8);
    }

    /// Byte-aligned bulk read, used for the magic, MD5 digest, and metadata
    /// block bodies.
    #[inline(always)]
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        debug_assert!(self.bit_pos % 8 == 0);

        self.bs
            .read_bytes(buf)
            .map_err(|e| self.out_of_bounds("read_bytes", 8 * buf.len() as u32, e))?;
        self.bit_pos += 8 * buf.len() as u64;

        Ok(())
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.bs.skip(n).map_err(|e| self.out_of_bounds("skip_n", n, e))?;
        self.bit_pos += n as u64;

        Ok(())
    }

    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.bit_pos
    }

    /// Clears and arms the capture tee. Every byte pulled from the source
    /// after this call is recorded until the next `begin_capture`.
    pub fn begin_capture(&mut self) {
        let mut capture = self.capture.borrow_mut();
        capture.armed = true;
        capture.buf.clear();
    }

    pub fn captured_len(&self) -> usize {
        self.capture.borrow().buf.len()
    }

    /// Runs `f` over the captured bytes minus `skip_tail` trailing bytes
    /// (the stored checksum itself is excluded from its own coverage).
    pub fn with_captured<T>(&self, skip_tail: usize, f: impl FnOnce(&[u8]) -> T) -> T {
        let capture = self.capture.borrow();
        let end = capture.buf.len() - skip_tail;

        f(&capture.buf[..end])
    }

    fn out_of_bounds(&self, op: &str, n: u32, e: io::Error) -> io::Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{op}({n}): out of bounds bits at {}", self.bit_pos),
            )
        } else {
            e
        }
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self::new(io::Cursor::new(buf))
    }
}
