use std::{
    fmt::{Debug, Formatter},
    io::ErrorKind,
};

use bstringify::bstringify;
use byteorder::{BigEndian, ReadBytesExt};
use fixed::types::U16F16;

pub use crate::{Error, Result};

pub mod file;
pub mod media;
pub mod sample_table;
pub mod stack;

pub trait Decode: Sized {
    fn decode(input: &mut &[u8]) -> Result<Self>;
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u8()?)
    }
}

impl Decode for u16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u16::<BigEndian>()?)
    }
}

impl Decode for u32 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u32::<BigEndian>()?)
    }
}

impl Decode for u64 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(input.read_u64::<BigEndian>()?)
    }
}

impl Decode for U16F16 {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self::from_bits(input.read_u32::<BigEndian>()?))
    }
}

/// Advances `input` by `len` bytes, failing like a short read would.
pub(crate) fn skip(input: &mut &[u8], len: usize) -> Result<()> {
    let data = *input;
    if data.len() < len {
        return Err(Error::Io(ErrorKind::UnexpectedEof.into()));
    }
    *input = &data[len..];
    Ok(())
}

/// Reads `count` records, keeping the ones decoded before a short read.
pub(crate) fn decode_entries<T: Decode>(
    input: &mut &[u8],
    count: u32,
    entries: &mut Vec<T>,
) -> Result<()> {
    for _ in 0..count {
        entries.push(T::decode(input)?);
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl Decode for FourCC {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        Ok(Self(u32::decode(input)?.to_be_bytes()))
    }
}

macro_rules! box_types {(
    $(
        $type:ident $variant:ident
    ),* $(,)?
) => (
    /// Box types the demuxer knows how to route.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum BoxType {
        $($variant,)*
        Unknown(FourCC),
    }

    impl From<[u8; 4]> for BoxType {
        fn from(r#type: [u8; 4]) -> Self {
            match &r#type {
                $(bstringify!($type) => BoxType::$variant,)*
                _ => BoxType::Unknown(FourCC(r#type)),
            }
        }
    }

    impl BoxType {
        pub fn fourcc(self) -> FourCC {
            match self {
                $(BoxType::$variant => FourCC(*bstringify!($type)),)*
                BoxType::Unknown(fourcc) => fourcc,
            }
        }
    }
)}

box_types! {
    ftyp Ftyp,
    moov Moov,
    trak Trak,
    mdia Mdia,
    minf Minf,
    stbl Stbl,
    mdat Mdat,
    hdlr Hdlr,
    stsd Stsd,
    stts Stts,
    stsc Stsc,
    stsz Stsz,
    stco Stco,
    co64 Co64,
    mp4a Mp4a,
    alac Alac,
    esds Esds,
    wave Wave,
}

impl BoxType {
    /// Containers whose children are parsed in place instead of buffered.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            BoxType::Moov | BoxType::Trak | BoxType::Mdia | BoxType::Minf | BoxType::Stbl
        )
    }
}

impl From<FourCC> for BoxType {
    fn from(fourcc: FourCC) -> Self {
        fourcc.0.into()
    }
}

/// Header of the box currently being read, or of an open container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoxHeader {
    pub r#type: BoxType,
    /// Declared size including the header, [`BoxHeader::UNBOUNDED`] for boxes
    /// that extend to the end of the stream.
    pub size: u64,
    /// Bytes of this box seen so far, header included.
    pub consumed: u64,
    /// Absolute offset of the first header byte.
    pub offset: u64,
    pub header_len: u8,
}

impl BoxHeader {
    pub const UNBOUNDED: u64 = u64::MAX;

    pub fn new(r#type: BoxType, size: u64, header_len: u8, offset: u64) -> Self {
        Self {
            r#type,
            size,
            consumed: header_len as u64,
            offset,
            header_len,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.size == Self::UNBOUNDED
    }

    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.consumed)
    }

    pub fn is_complete(&self) -> bool {
        self.consumed >= self.size
    }
}

// 4.2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl Decode for FullBoxHeader {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let version = input.read_u8()?;
        let flags = input.read_u24::<BigEndian>()?;
        Ok(Self { version, flags })
    }
}

/// Splits the next child box off `input`, returning its type and payload.
/// A payload cut short by the end of `input` is returned truncated.
pub fn split_box<'a>(input: &mut &'a [u8]) -> Result<(BoxType, &'a [u8])> {
    let size = u32::decode(input)? as u64;
    let r#type = FourCC::decode(input)?;
    let (size, header_len) = match size {
        0 => (input.len() as u64 + 8, 8),
        1 => (u64::decode(input)?, 16),
        size => (size, 8),
    };
    if size < header_len {
        return Err(Error::InvalidBoxSize { r#type, size });
    }

    let data: &'a [u8] = *input;
    let len = (size - header_len).min(data.len() as u64) as usize;
    let (payload, remaining_data) = data.split_at(len);
    *input = remaining_data;
    Ok((r#type.into(), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_type_round_trips_known_and_unknown_tags() {
        assert_eq!(BoxType::from(*b"stbl"), BoxType::Stbl);
        assert_eq!(BoxType::from(*b"co64").fourcc(), FourCC(*b"co64"));
        assert_eq!(
            BoxType::from(*b"udta"),
            BoxType::Unknown(FourCC(*b"udta"))
        );
        assert!(BoxType::Minf.is_container());
        assert!(!BoxType::Stsd.is_container());
        assert!(!BoxType::Mdat.is_container());
    }

    #[test]
    fn fourcc_debug_escapes_binary_bytes() {
        assert_eq!(format!("{:?}", FourCC(*b"soun")), "soun");
        assert_eq!(format!("{:?}", FourCC([0, b'a', b'b', b'c'])), "\\x00abc");
    }

    #[test]
    fn split_box_handles_plain_and_large_sizes() {
        let mut data: &[u8] = &[
            0, 0, 0, 10, b'f', b'r', b'e', b'e', 0xAA, 0xBB, // free
            0, 0, 0, 1, b'm', b'd', b'a', b't', 0, 0, 0, 0, 0, 0, 0, 17, 0xCC, // large mdat
        ];
        let (r#type, payload) = split_box(&mut data).unwrap();
        assert_eq!(r#type, BoxType::Unknown(FourCC(*b"free")));
        assert_eq!(payload, &[0xAA, 0xBB]);

        let (r#type, payload) = split_box(&mut data).unwrap();
        assert_eq!(r#type, BoxType::Mdat);
        assert_eq!(payload, &[0xCC]);
        assert!(data.is_empty());
    }

    #[test]
    fn split_box_rejects_sizes_below_header() {
        let mut data: &[u8] = &[0, 0, 0, 4, b'f', b'r', b'e', b'e'];
        assert!(matches!(
            split_box(&mut data),
            Err(Error::InvalidBoxSize { size: 4, .. })
        ));
    }

    #[test]
    fn decode_entries_keeps_prefix_on_short_read() {
        let mut data: &[u8] = &[0, 0, 0, 1, 0, 0, 0, 2, 0, 0];
        let mut entries = Vec::<u32>::new();
        assert!(decode_entries(&mut data, 3, &mut entries).is_err());
        assert_eq!(entries, vec![1, 2]);
    }
}
