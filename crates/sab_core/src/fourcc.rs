//! Four character codes used as block tags and magic numbers.

use std::fmt;

use derive_more::derive::{Constructor, Deref};

/// Builds the tag value of a four character code as it is stored on disk.
///
/// The game writes its tags little endian, so `fourcc(b"00PM")` is the value
/// read from a native archive while `fourcc(b"MP00")` is what a byte-swapped
/// archive yields.
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Wrapper to display a raw tag as text when it is printable
#[derive(Constructor, Deref, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub u32);

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_le_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            for b in bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(FourCC(fourcc(b"ALBS")).to_string(), "ALBS");
        assert_eq!(FourCC(0xC).to_string(), "0x0000000c");
        assert_eq!(fourcc(b"MP00"), fourcc(b"00PM").swap_bytes());
    }
}
