//! Fixed-capacity text buffer used for records and protocol lines.

use core::fmt;

use crate::error::FormatError;

/// Stack-allocated string buffer with `core::fmt::Write` support.
///
/// A write that does not fit is rejected whole and the buffer remembers
/// that it overflowed; content is never silently truncated.
pub struct FixedBuf<const N: usize> {
    buffer: [u8; N],
    len: usize,
    overflowed: bool,
}

impl<const N: usize> Default for FixedBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FixedBuf<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; N],
            len: 0,
            overflowed: false,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }

    pub fn as_str(&self) -> &str {
        // Only whole `&str` slices are ever copied in, so this cannot fail.
        core::str::from_utf8(&self.buffer[..self.len]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Clear the buffer and format `args` into it.
    pub fn format(&mut self, args: fmt::Arguments<'_>) -> Result<&str, FormatError> {
        self.clear();
        if fmt::Write::write_fmt(self, args).is_err() || self.overflowed {
            return Err(FormatError::Overflow { capacity: N });
        }
        Ok(self.as_str())
    }
}

impl<const N: usize> fmt::Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > N {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.buffer[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

impl<const N: usize> fmt::Display for FixedBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn test_format_fits() {
        let mut buf = FixedBuf::<16>::new();
        assert_eq!(buf.format(format_args!("CFG: {} {}", "A", 1)).unwrap(), "CFG: A 1");
        assert_eq!(buf.len(), 8);
        assert!(!buf.overflowed());
    }

    #[test]
    fn test_overflow_is_reported_not_truncated() {
        let mut buf = FixedBuf::<8>::new();
        assert!(buf.write_str("1234").is_ok());
        assert!(buf.write_str("56789").is_err());
        assert!(buf.overflowed());
        assert_eq!(buf.as_str(), "1234");

        let err = buf.format(format_args!("{}", "far too long for eight")).unwrap_err();
        assert_eq!(err, FormatError::Overflow { capacity: 8 });
    }

    #[test]
    fn test_clear_resets_overflow() {
        let mut buf = FixedBuf::<4>::new();
        let _ = buf.write_str("overflow");
        buf.clear();
        assert!(!buf.overflowed());
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
