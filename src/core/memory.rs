//! Addresses and read-only access to the loaded program image.
//!
//! The trampoline matchers fold constants by reading the image through the
//! [`MemoryReader`] trait. Reads never fail loudly: an unmapped or truncated
//! read is `None`, and matchers treat that as "no match".

use super::error::{LiftError, LiftResult};
use super::expr::Constant;
use super::types::PrimitiveType;
use object::{Object, ObjectSection};
use std::fmt;

/// A fixed address in the program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub value: u64,
    /// Pointer width of the address space the address belongs to.
    pub bits: u32,
}

impl Address {
    pub const fn ptr32(value: u32) -> Self {
        Self {
            value: value as u64,
            bits: 32,
        }
    }

    pub const fn ptr64(value: u64) -> Self {
        Self { value, bits: 64 }
    }

    pub fn new(value: u64, bits: u32) -> Self {
        Self {
            value: value & mask(bits),
            bits,
        }
    }

    /// Address displaced by a signed byte offset, wrapping within the address space.
    pub fn offset(self, delta: i64) -> Self {
        Self::new(self.value.wrapping_add(delta as u64), self.bits)
    }

    pub fn data_type(&self) -> PrimitiveType {
        PrimitiveType::ptr(self.bits)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (self.bits as usize).div_ceil(4);
        write!(f, "{:0width$X}", self.value, width = digits)
    }
}

pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Read-only view of the program image.
///
/// Implementations are shared between concurrently running lifting sessions.
pub trait MemoryReader: Send + Sync {
    /// Read a value of type `dt` at `addr`, or `None` if the read is not possible.
    fn try_read(&self, addr: Address, dt: PrimitiveType) -> Option<Constant>;
}

/// Byte order of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// A contiguous mapped range of the image.
#[derive(Debug, Clone)]
pub struct Segment {
    pub name: String,
    pub base: u64,
    pub data: Vec<u8>,
}

impl Segment {
    /// One past the last mapped address, clamped at the top of the address space.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.data.len() as u64)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.data.len() as u64
    }
}

/// In-memory program image built from raw segments or an object file.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    segments: Vec<Segment>,
    endianness: Endianness,
}

impl MemoryImage {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            segments: Vec::new(),
            endianness,
        }
    }

    /// Map `data` at `base`.
    pub fn add_segment(&mut self, name: impl Into<String>, base: u64, data: Vec<u8>) {
        self.segments.push(Segment {
            name: name.into(),
            base,
            data,
        });
        self.segments.sort_by_key(|s| s.base);
    }

    /// Load every allocated section of an object file.
    pub fn from_object(data: &[u8]) -> LiftResult<Self> {
        let file = object::File::parse(data).map_err(|e| LiftError::Image {
            reason: e.to_string(),
        })?;
        let endianness = if file.is_little_endian() {
            Endianness::Little
        } else {
            Endianness::Big
        };
        let mut image = Self::new(endianness);
        for section in file.sections() {
            if section.address() == 0 {
                continue;
            }
            // Sections without file data (.bss) have nothing to fold constants from.
            let Ok(bytes) = section.data() else { continue };
            if bytes.is_empty() {
                continue;
            }
            let name = section.name().unwrap_or("").to_string();
            log::trace!(
                "Mapped section {} at {:#x} ({} bytes)",
                name,
                section.address(),
                bytes.len()
            );
            image.add_segment(name, section.address(), bytes.to_vec());
        }
        Ok(image)
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Borrow `len` bytes starting at `addr` if they all lie in one segment.
    pub fn read_bytes(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let seg = self.segments.iter().find(|s| s.contains(addr))?;
        let start = (addr - seg.base) as usize;
        seg.data.get(start..start.checked_add(len)?)
    }
}

impl MemoryReader for MemoryImage {
    fn try_read(&self, addr: Address, dt: PrimitiveType) -> Option<Constant> {
        let size = dt.size() as usize;
        if !matches!(size, 1 | 2 | 4 | 8) {
            return None;
        }
        let bytes = self.read_bytes(addr.value, size)?;
        let value = match self.endianness {
            Endianness::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64),
            Endianness::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
        };
        Some(Constant::new(dt, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_offset_wraps() {
        let addr = Address::ptr32(0x0000_0010);
        assert_eq!(addr.offset(-0x20).value, 0xFFFF_FFF0);
        assert_eq!(Address::ptr32(0x10A9C).offset(8).value, 0x10AA4);
        assert_eq!(Address::ptr32(0x00401000).to_string(), "00401000");
        assert_eq!(Address::ptr64(0x1000).to_string(), "0000000000001000");
    }

    #[test]
    fn test_read_little_and_big_endian() {
        let mut le = MemoryImage::new(Endianness::Little);
        le.add_segment(".data", 0x1000, vec![0x78, 0x56, 0x34, 0x12]);
        let c = le.try_read(Address::ptr32(0x1000), PrimitiveType::WORD32).unwrap();
        assert_eq!(c.value, 0x1234_5678);

        let mut be = MemoryImage::new(Endianness::Big);
        be.add_segment(".data", 0x1000, vec![0x12, 0x34, 0x56, 0x78]);
        let c = be.try_read(Address::ptr32(0x1000), PrimitiveType::WORD32).unwrap();
        assert_eq!(c.value, 0x1234_5678);
    }

    #[test]
    fn test_out_of_range_reads_fail() {
        let mut image = MemoryImage::new(Endianness::Little);
        image.add_segment(".got", 0x2000, vec![0; 6]);
        assert!(image.try_read(Address::ptr32(0x1FFF), PrimitiveType::WORD32).is_none());
        // Straddles the end of the segment.
        assert!(image.try_read(Address::ptr32(0x2004), PrimitiveType::WORD32).is_none());
        assert!(image.try_read(Address::ptr32(0x2002), PrimitiveType::WORD32).is_some());
        assert!(image.try_read(Address::ptr32(0x2000), PrimitiveType::word(24)).is_none());
    }

    #[test]
    fn test_segment_at_top_of_address_space() {
        let mut image = MemoryImage::new(Endianness::Little);
        image.add_segment(".plt", u64::MAX - 3, vec![0x11, 0x22, 0x33, 0x44]);
        let seg = &image.segments()[0];
        assert_eq!(seg.end(), u64::MAX);
        assert!(seg.contains(u64::MAX));
        assert!(!seg.contains(u64::MAX - 4));
        let c = image
            .try_read(Address::ptr64(u64::MAX - 3), PrimitiveType::WORD32)
            .unwrap();
        assert_eq!(c.value, 0x4433_2211);
        assert!(image.try_read(Address::ptr64(u64::MAX - 1), PrimitiveType::WORD32).is_none());
    }

    #[test]
    fn test_reader_is_shareable() {
        fn assert_shareable<T: Send + Sync + ?Sized>() {}
        assert_shareable::<dyn MemoryReader>();
        assert_shareable::<MemoryImage>();
    }

    #[test]
    fn test_from_object_rejects_garbage() {
        let err = MemoryImage::from_object(b"not an object file").unwrap_err();
        assert!(matches!(err, LiftError::Image { .. }));
    }
}
