//! MJPEG wire framing
//!
//! Each viewer gets one long-lived HTTP response of type
//! `multipart/x-mixed-replace`. Every delivered frame is one part:
//!
//! ```text
//! --FRAME\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of JPEG>\r\n
//! ```
//!
//! There is no closing boundary; the stream ends when the socket does.

use bytes::{BufMut, Bytes, BytesMut};

/// Multipart boundary token
pub const BOUNDARY: &str = "FRAME";

/// Content type of the outer streaming response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=FRAME";

/// Content type of each part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// Bytes written after each frame payload
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Headers of the outer streaming response, in send order
pub const STREAM_HEADERS: [(&str, &str); 4] = [
    ("age", "0"),
    ("cache-control", "no-cache, private"),
    ("pragma", "no-cache"),
    ("content-type", STREAM_CONTENT_TYPE),
];

/// Boundary line and part headers for a frame of `len` bytes
pub fn part_header(len: usize) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, PART_CONTENT_TYPE, len
    );
    Bytes::from(header)
}

/// Encode a complete part into one body chunk
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let header = part_header(jpeg.len());
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + PART_TRAILER.len());
    buf.put_slice(&header);
    buf.put_slice(jpeg);
    buf.put_slice(PART_TRAILER);
    buf.freeze()
}
