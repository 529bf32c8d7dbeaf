//! MJPEG byte stream splitting
//!
//! `rpicam-vid --codec mjpeg -o -` writes back-to-back JPEG images with no
//! container. We walk the marker structure of each image to find its EOI
//! rather than searching for the first `FF D9`, since that byte pair may
//! appear inside segment payloads.

use bytes::{Buf, Bytes, BytesMut};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

enum Scan {
    /// A full image of this many bytes starts at offset 0
    Complete(usize),
    /// More data needed
    Incomplete,
    /// Data at offset 0 is not a well-formed image; drop this many bytes
    Invalid(usize),
}

/// Splits a concatenated JPEG stream into individual images
#[derive(Debug)]
pub struct JpegSplitter {
    buf: BytesMut,
    max_frame_size: usize,
    discarded: u64,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256 * 1024),
            max_frame_size,
            discarded: 0,
        }
    }

    /// Append bytes read from the encoder
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next complete image, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            self.skip_to_soi();
            if self.buf.len() < 2 {
                return None;
            }

            match scan(&self.buf) {
                Scan::Complete(len) => return Some(self.buf.split_to(len).freeze()),
                Scan::Invalid(skip) => {
                    self.discard(skip);
                }
                Scan::Incomplete => {
                    if self.buf.len() > self.max_frame_size {
                        tracing::warn!(
                            buffered = self.buf.len(),
                            max = self.max_frame_size,
                            "JPEG frame exceeds size limit, resyncing"
                        );
                        // Keep scanning for the next SOI past this one
                        self.discard(2);
                        continue;
                    }
                    return None;
                }
            }
        }
    }

    /// Bytes dropped while resynchronizing
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn skip_to_soi(&mut self) {
        let start = self.buf.windows(2).position(|w| w == [0xFF, SOI]);
        match start {
            Some(0) => {}
            Some(n) => self.discard(n),
            // Keep a trailing 0xFF: it may be the first half of the next SOI
            None => {
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let n = self.buf.len() - keep;
                self.discard(n);
            }
        }
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            self.buf.advance(n);
            self.discarded += n as u64;
        }
    }
}

impl Default for JpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk the markers of the image starting at `buf[0]`
fn scan(buf: &[u8]) -> Scan {
    let mut pos = 2;

    loop {
        if pos + 2 > buf.len() {
            return Scan::Incomplete;
        }
        if buf[pos] != 0xFF {
            return Scan::Invalid(2);
        }

        let marker = buf[pos + 1];
        match marker {
            // Fill byte before a marker
            0xFF => pos += 1,
            EOI => return Scan::Complete(pos + 2),
            SOI => return Scan::Invalid(pos),
            TEM | 0xD0..=0xD7 => pos += 2,
            _ => {
                if pos + 4 > buf.len() {
                    return Scan::Incomplete;
                }
                let seg_len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
                if seg_len < 2 {
                    return Scan::Invalid(2);
                }
                pos += 2 + seg_len;

                if marker == SOS {
                    match skip_entropy_data(buf, pos) {
                        Some(next) => pos = next,
                        None => return Scan::Incomplete,
                    }
                }
            }
        }
    }
}

/// Skip entropy-coded data; returns the offset of the next real marker
fn skip_entropy_data(buf: &[u8], mut pos: usize) -> Option<usize> {
    while pos + 1 < buf.len() {
        if buf[pos] != 0xFF {
            pos += 1;
            continue;
        }
        match buf[pos + 1] {
            // Stuffed zero or restart marker: still inside the scan
            0x00 | 0xD0..=0xD7 => pos += 2,
            0xFF => pos += 1,
            _ => return Some(pos),
        }
    }
    None
}
