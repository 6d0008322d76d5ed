//! Byte-level sanitizing for upstream event streams.
//!
//! Some archived event logs carry stray NUL bytes inside string values,
//! which the JSON decoder rejects as raw control characters. [`ByteReplacer`]
//! rewrites them before the decoder sees the stream.

use std::io::{self, Read};

/// Byte replaced by default (NUL).
pub const DEFAULT_SENTINEL: u8 = 0x00;

/// Replacement written in place of the sentinel by default.
pub const DEFAULT_REPLACEMENT: u8 = b' ';

/// A [`Read`] adapter that replaces every `sentinel` byte with `replacement`.
///
/// Substitution happens in place in the caller's buffer, so the adapter keeps
/// no state between reads. EOF and errors from the inner reader pass through
/// unchanged.
#[derive(Debug)]
pub struct ByteReplacer<R> {
    inner: R,
    sentinel: u8,
    replacement: u8,
}

impl<R: Read> ByteReplacer<R> {
    pub const fn new(inner: R, sentinel: u8, replacement: u8) -> Self {
        Self {
            inner,
            sentinel,
            replacement,
        }
    }

    /// Replace NUL bytes with spaces.
    pub const fn nul_to_space(inner: R) -> Self {
        Self::new(inner, DEFAULT_SENTINEL, DEFAULT_REPLACEMENT)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ByteReplacer<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for byte in &mut buf[..n] {
            if *byte == self.sentinel {
                *byte = self.replacement;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn replaces_nul_bytes() {
        let mut out = Vec::new();
        ByteReplacer::nul_to_space(&b"a\0b\0\0c"[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"a b  c");
    }

    #[test]
    fn passes_through_clean_input() {
        let input = br#"{"actor":{"login":"alice"}}"#;
        let mut out = Vec::new();
        ByteReplacer::nul_to_space(&input[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn custom_sentinel_and_replacement() {
        let mut out = String::new();
        ByteReplacer::new(&b"x-y-z"[..], b'-', b'+')
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "x+y+z");
    }

    #[test]
    fn works_across_small_reads() {
        let reader = Trickle {
            data: b"\0ab\0cd\0",
            chunk: 2,
        };
        let mut out = Vec::new();
        ByteReplacer::nul_to_space(reader)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b" ab cd ");
    }

    #[test]
    fn empty_input_is_eof() {
        let mut buf = [0u8; 8];
        let n = ByteReplacer::nul_to_space(&b""[..]).read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn inner_errors_propagate() {
        let mut buf = [0u8; 8];
        let err = ByteReplacer::nul_to_space(Broken).read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
    }
}
