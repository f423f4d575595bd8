//! Endian-aware cursor over seekable game data.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use binrw::{BinRead, Endian};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::{
    error::{Error, Result},
    fourcc::FourCC,
};

#[derive(Debug, Copy, Clone)]
struct Checkpoint {
    position: u64,
    origin: u64,
}

/// Binary reader over a seekable stream
///
/// Positions given to [`StreamCursor::seek`] and returned by [`StreamCursor::tell`] are relative
/// to the cursor's origin, which starts at the beginning of the stream and can be moved to the
/// start of a nested pack. Reads are little endian until [`StreamCursor::read_magic`] finds the
/// byte-swapped form of its magic, after which every multi-byte read is big endian.
///
/// ```
/// use std::io::Cursor;
/// use sab_core::{cursor::StreamCursor, fourcc::fourcc};
///
/// # fn main() -> sab_core::error::Result<()> {
/// let mut cursor = StreamCursor::new(Cursor::new(b"SBLA\0\0\0\x07".to_vec()));
/// cursor.read_magic(fourcc(b"ALBS"))?;
/// assert!(cursor.is_swapped());
/// assert_eq!(cursor.read_u32()?, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StreamCursor<R> {
    inner: R,
    endian: Endian,
    origin: u64,
    checkpoints: Vec<Checkpoint>,
}

macro_rules! read_primitive {
    ($(#[$meta:meta])* $name:ident, $ty:ty, $method:ident) => {
        $(#[$meta])*
        pub fn $name(&mut self) -> Result<$ty> {
            Ok(match self.endian {
                Endian::Little => self.inner.$method::<LittleEndian>()?,
                Endian::Big => self.inner.$method::<BigEndian>()?,
            })
        }
    };
}

impl<R: Read + Seek> StreamCursor<R> {
    /// Wraps a stream, reading little endian from its start
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            endian: Endian::Little,
            origin: 0,
            checkpoints: Vec::new(),
        }
    }

    /// Current byte order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Whether reads are byte-swapped
    pub fn is_swapped(&self) -> bool {
        self.endian == Endian::Big
    }

    /// Forces the byte order
    pub fn set_swapped(&mut self, swapped: bool) {
        self.endian = if swapped { Endian::Big } else { Endian::Little };
    }

    /// Access the underlying stream
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap and return the underlying stream
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current position, relative to the origin
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?.saturating_sub(self.origin))
    }

    /// Moves to `position`, relative to the origin
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(self.origin + position))?;
        Ok(())
    }

    /// Moves `count` bytes forward, or backward when negative
    pub fn skip(&mut self, count: i64) -> Result<()> {
        self.inner.seek(SeekFrom::Current(count))?;
        Ok(())
    }

    /// Total length of the stream in bytes, ignoring the origin
    pub fn size(&mut self) -> Result<u64> {
        let position = self.inner.stream_position()?;
        let size = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(size)
    }

    /// Whether the end of the stream has been reached
    pub fn is_eof(&mut self) -> Result<bool> {
        let position = self.inner.stream_position()?;
        Ok(position >= self.size()?)
    }

    /// Saves the current position and origin.
    pub fn push(&mut self) -> Result<()> {
        let position = self.inner.stream_position()?;
        self.checkpoints.push(Checkpoint {
            position,
            origin: self.origin,
        });
        Ok(())
    }

    /// Restores the position and origin saved by the matching [`StreamCursor::push`].
    pub fn pop(&mut self) -> Result<()> {
        let checkpoint = self
            .checkpoints
            .pop()
            .ok_or(Error::CustomError("cursor checkpoint stack is empty".into()))?;
        self.origin = checkpoint.origin;
        self.inner.seek(SeekFrom::Start(checkpoint.position))?;
        Ok(())
    }

    /// Makes the current position the origin for subsequent seeks.
    pub fn set_relative_origin(&mut self) -> Result<()> {
        self.origin = self.inner.stream_position()?;
        Ok(())
    }

    /// Moves the origin back to the start of the stream.
    pub fn reset_relative_origin(&mut self) {
        self.origin = 0;
    }

    /// Reads a magic number, enabling byte-swapping when its reversed form is found.
    ///
    /// `expected` is the little endian value, see [`crate::fourcc::fourcc`].
    pub fn read_magic(&mut self, expected: u32) -> Result<()> {
        let value = self.read_u32()?;
        if value == expected {
            Ok(())
        } else if value == expected.swap_bytes() {
            self.set_swapped(true);
            Ok(())
        } else {
            Err(Error::InvalidHeader(value))
        }
    }

    /// Reads the next 4 bytes as a `u32` without consuming them
    pub fn peek_u32(&mut self) -> Result<u32> {
        let position = self.inner.stream_position()?;
        let value = self.read_u32();
        self.inner.seek(SeekFrom::Start(position))?;
        value
    }

    /// Reads a single byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    read_primitive!(
        /// Reads a `u16` in the cursor's byte order
        read_u16, u16, read_u16
    );
    read_primitive!(
        /// Reads an `i16` in the cursor's byte order
        read_i16, i16, read_i16
    );
    read_primitive!(
        /// Reads a `u32` in the cursor's byte order
        read_u32, u32, read_u32
    );
    read_primitive!(
        /// Reads an `i32` in the cursor's byte order
        read_i32, i32, read_i32
    );
    read_primitive!(
        /// Reads a `u64` in the cursor's byte order
        read_u64, u64, read_u64
    );
    read_primitive!(
        /// Reads an `f32` in the cursor's byte order
        read_f32, f32, read_f32
    );

    /// Reads a byte that must be 0 or 1
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidBool(other)),
        }
    }

    /// Reads a `u32` that must be zero
    pub fn read_reserved_u32(&mut self, field: &'static str) -> Result<()> {
        let value = self.read_u32()?;
        ensure_zero(field, value)
    }

    /// Reads a `u16` that must be zero
    pub fn read_reserved_u16(&mut self, field: &'static str) -> Result<()> {
        let value = self.read_u16()?;
        ensure_zero(field, value)
    }

    /// Reads `count` `u32` values
    pub fn read_u32s(&mut self, count: usize) -> Result<Vec<u32>> {
        (0..count).map(|_| self.read_u32()).collect()
    }

    /// Reads `count` `u16` values
    pub fn read_u16s(&mut self, count: usize) -> Result<Vec<u16>> {
        (0..count).map(|_| self.read_u16()).collect()
    }

    /// Reads `count` `f32` values
    pub fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        (0..count).map(|_| self.read_f32()).collect()
    }

    /// Reads a fixed size array of `f32` values
    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.read_f32()?;
        }
        Ok(values)
    }

    /// Reads `count` raw bytes
    ///
    /// The buffer only grows with the bytes actually present, so a corrupt size fails
    /// with an end of file error instead of a huge allocation.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.inner.by_ref().take(count as u64).read_to_end(&mut buffer)?;
        if buffer.len() != count {
            return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
        }
        Ok(buffer)
    }

    /// Reads a fixed-size record in the cursor's byte order
    pub fn read_record<T>(&mut self) -> Result<T>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        Ok(T::read_options(&mut self.inner, self.endian, ())?)
    }

    /// Reads exactly `count` records, for containers sized by an outer descriptor
    pub fn read_records<T>(&mut self, count: usize) -> Result<Vec<T>>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        (0..count).map(|_| self.read_record()).collect()
    }

    /// Reads a `u32` element count followed by that many records
    pub fn read_container<T>(&mut self) -> Result<Vec<T>>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        let count = self.read_u32()? as usize;
        self.read_records(count)
    }

    /// Reads a `u16` element count followed by that many records
    pub fn read_container16<T>(&mut self) -> Result<Vec<T>>
    where
        T: for<'a> BinRead<Args<'a> = ()>,
    {
        let count = self.read_u16()? as usize;
        self.read_records(count)
    }

    /// Reads a `u32` element count followed by that many elements, using `read` for each one
    pub fn read_container_with<T, E: From<Error>>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> core::result::Result<T, E>,
    ) -> core::result::Result<Vec<T>, E> {
        let count = self.read_u32()? as usize;
        (0..count).map(|_| read(self)).collect()
    }

    /// Reads a `u32` length-prefixed string, cut at the first NUL
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_u32()? as usize;
        self.read_fixed_string(length)
    }

    /// Reads a `u16` length-prefixed string, cut at the first NUL
    pub fn read_string16(&mut self) -> Result<String> {
        let length = self.read_u16()? as usize;
        self.read_fixed_string(length)
    }

    /// Reads a `length` byte string buffer, cut at the first NUL
    pub fn read_fixed_string(&mut self, length: usize) -> Result<String> {
        let buffer = self.read_bytes(length)?;
        Ok(trim_nul(&buffer))
    }

    /// Reads a NUL terminated string
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut buffer = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => buffer.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Skips forward to the next multiple of `alignment`, relative to the origin
    pub fn apply_padding(&mut self, alignment: u64) -> Result<()> {
        let position = self.tell()?;
        let remainder = position % alignment;
        if remainder != 0 {
            self.skip((alignment - remainder) as i64)?;
        }
        Ok(())
    }
}

/// Converts a NUL padded buffer into a string
pub fn trim_nul(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    String::from_utf8_lossy(&buffer[..end]).into_owned()
}

/// Fails with [`Error::UnexpectedValue`] unless `value` is zero
pub fn ensure_zero<T: Into<u64>>(field: &'static str, value: T) -> Result<()> {
    match value.into() {
        0 => Ok(()),
        value => Err(Error::UnexpectedValue { field, value }),
    }
}

/// Fails with [`Error::UnexpectedValue`] unless every value is zero
pub fn ensure_zeroes<T: Into<u64> + Copy>(field: &'static str, values: &[T]) -> Result<()> {
    values.iter().try_for_each(|v| ensure_zero(field, *v))
}

/// Fails with [`Error::UnexpectedValue`] unless `value` is below `limit`
pub fn ensure_below<T: Into<u64>>(field: &'static str, value: T, limit: u64) -> Result<()> {
    match value.into() {
        value if value < limit => Ok(()),
        value => Err(Error::UnexpectedValue { field, value }),
    }
}

/// Fails with [`Error::InvalidHeader`] unless `value` is the expected tag
pub fn ensure_tag(value: u32, expected: u32) -> Result<()> {
    if value == expected {
        Ok(())
    } else {
        tracing::debug!("expected {}, found {}", FourCC(expected), FourCC(value));
        Err(Error::InvalidHeader(value))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::BinRead;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fourcc::fourcc;

    #[derive(BinRead, Debug, PartialEq)]
    struct Pair {
        a: u16,
        b: u32,
    }

    #[test]
    fn swaps_on_reversed_magic() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            b'M', b'P', b'0', b'0',
            0x00, 0x00, 0x00, 0x02,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x02,
            0x00, 0x03, 0x00, 0x00, 0x00, 0x04,
        ];
        let mut cursor = StreamCursor::new(Cursor::new(data));
        cursor.read_magic(fourcc(b"00PM"))?;

        assert!(cursor.is_swapped());
        let pairs: Vec<Pair> = cursor.read_container()?;
        assert_eq!(pairs, vec![Pair { a: 1, b: 2 }, Pair { a: 3, b: 4 }]);
        assert!(cursor.is_eof()?);
        Ok(())
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut cursor = StreamCursor::new(Cursor::new(b"XXXX".to_vec()));
        let result = cursor.read_magic(fourcc(b"00PM"));
        assert!(matches!(result, Err(Error::InvalidHeader(v)) if v == fourcc(b"XXXX")));
        assert!(!cursor.is_swapped());
    }

    #[test]
    fn relative_origin_and_checkpoints() -> Result<()> {
        let data: Vec<u8> = (0u8..32).collect();
        let mut cursor = StreamCursor::new(Cursor::new(data));

        cursor.seek(8)?;
        cursor.push()?;
        cursor.set_relative_origin()?;
        cursor.seek(4)?;
        assert_eq!(cursor.tell()?, 4);
        assert_eq!(cursor.read_u8()?, 12);

        cursor.push()?;
        cursor.set_relative_origin()?;
        cursor.seek(1)?;
        assert_eq!(cursor.read_u8()?, 14);
        cursor.pop()?;

        // inner pop restores the first nested origin
        assert_eq!(cursor.tell()?, 5);
        cursor.pop()?;
        assert_eq!(cursor.tell()?, 8);
        assert!(cursor.pop().is_err());
        Ok(())
    }

    #[test]
    fn strings_and_padding() -> Result<()> {
        #[rustfmt::skip]
        let data = vec![
            0x05, 0x00, 0x00, 0x00, b'a', b'b', b'c', 0x00, 0x00,
            0x03, 0x00, b'x', b'y', b'z',
            b'm', b'a', b'p', 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x2a,
        ];
        let mut cursor = StreamCursor::new(Cursor::new(data));

        assert_eq!(cursor.read_string()?, "abc");
        assert_eq!(cursor.read_string16()?, "xyz");
        assert_eq!(cursor.read_cstring()?, "map");
        cursor.apply_padding(16)?;
        assert_eq!(cursor.tell()?, 32);
        assert_eq!(cursor.read_u8()?, 0x2a);
        Ok(())
    }

    #[test]
    fn validation_helpers() -> Result<()> {
        let mut cursor = StreamCursor::new(Cursor::new(vec![0, 1, 2, 0, 0, 0, 1]));
        assert!(!cursor.read_bool()?);
        assert!(cursor.read_bool()?);
        assert!(matches!(cursor.read_bool(), Err(Error::InvalidBool(2))));
        assert!(matches!(
            cursor.read_reserved_u32("null"),
            Err(Error::UnexpectedValue { field: "null", value: 0x0100_0000 })
        ));
        assert!(ensure_below("lod", 2u16, 3).is_ok());
        assert!(ensure_below("lod", 3u16, 3).is_err());
        Ok(())
    }

    #[test]
    fn peek_does_not_consume() -> Result<()> {
        let mut cursor = StreamCursor::new(Cursor::new(b"sges1234".to_vec()));
        assert_eq!(cursor.peek_u32()?, fourcc(b"sges"));
        assert_eq!(cursor.tell()?, 0);
        Ok(())
    }

    #[test]
    fn oversized_read_fails() -> Result<()> {
        let mut cursor = StreamCursor::new(Cursor::new(vec![1, 2, 3, 4]));
        assert!(matches!(
            cursor.read_bytes(u32::MAX as usize),
            Err(Error::IOError(e)) if e.kind() == ErrorKind::UnexpectedEof
        ));

        cursor.seek(1)?;
        assert_eq!(cursor.read_bytes(3)?, vec![2, 3, 4]);
        Ok(())
    }
}
