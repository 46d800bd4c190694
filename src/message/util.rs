//! Utility functions intended for use within the [`crate::message`] module.

use std::io::prelude::*;
use std::io::{self, ErrorKind};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a `u64` out of the given stream.
pub fn read_u64<R: Read>(stream: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_bytes_array(stream)?))
}

/// Read an `i32` out of the given stream.
pub fn read_i32<R: Read>(stream: &mut R) -> io::Result<i32> {
    Ok(i32::from_le_bytes(read_bytes_array(stream)?))
}

/// Read a single byte out of the given stream.
pub fn read_u8<R: Read>(stream: &mut R) -> io::Result<u8> {
    Ok(read_bytes_array::<R, 1>(stream)?[0])
}

/// Read the given number of bytes from a stream, into a `Vec<u8>`.
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> io::Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    stream.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Returns `true` if the error means the peer closed the stream.
pub fn is_end_of_stream(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_log2_works() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(5), 3);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn integers_read_back_in_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&42u64.to_le_bytes());
        bytes.extend_from_slice(&(-7i32).to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(b"abc");

        let mut stream = bytes.as_slice();
        assert_eq!(read_u64(&mut stream).unwrap(), 42);
        assert_eq!(read_i32(&mut stream).unwrap(), -7);
        assert_eq!(read_u8(&mut stream).unwrap(), 1);
        assert_eq!(read_bytes_vec(&mut stream, 3).unwrap(), b"abc".to_vec());
        assert!(is_end_of_stream(&read_u8(&mut stream).unwrap_err()));
    }
}
