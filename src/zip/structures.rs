use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// Local file header signature (`PK\x03\x04`)
pub const LFH_SIGNATURE: u32 = 0x04034b50;
/// Data descriptor signature (`PK\x07\x08`), also the spanned-archive marker
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;
/// Central Directory File Header signature (`PK\x01\x02`)
pub const CDFH_SIGNATURE: u32 = 0x02014b50;
/// Single-segment split-archive marker (`PK00`)
pub const SPLIT_MARKER_SIGNATURE: u32 = 0x30304b50;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIZE: usize = 30;
/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_MIN_SIZE: usize = 46;

/// General-purpose flag: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General-purpose flag: sizes and CRC follow the data in a descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General-purpose flag: strong encryption
pub const FLAG_STRONG_ENCRYPTION: u16 = 1 << 6;
/// General-purpose flag: name and comment are UTF-8
pub const FLAG_UTF8: u16 = 1 << 11;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressionMethod::Stored => "stored",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Unknown(_) => "unknown",
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const MAGIC: [u8; 4] = *b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt(offset, "truncated end of central directory"));
        }

        let mut cursor = Cursor::new(data);
        if cursor.read_u32::<LittleEndian>()? != Self::SIGNATURE {
            return Err(Error::corrupt(offset, "bad end of central directory signature"));
        }

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: u32 = 0x07064b50;
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corrupt(offset, "truncated ZIP64 locator"));
        }

        let mut cursor = Cursor::new(data);
        if cursor.read_u32::<LittleEndian>()? != Self::SIGNATURE {
            return Err(Error::corrupt(offset, "bad ZIP64 locator signature"));
        }

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: u32 = 0x06064b50;
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::corrupt(offset, "truncated ZIP64 end of central directory"));
        }

        let mut cursor = Cursor::new(data);
        if cursor.read_u32::<LittleEndian>()? != Self::SIGNATURE {
            return Err(Error::corrupt(offset, "bad ZIP64 end of central directory signature"));
        }

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// The fixed 30-byte part of a Local File Header
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < LFH_SIZE {
            return Err(Error::corrupt(offset, "truncated local file header"));
        }

        let mut cursor = Cursor::new(data);
        if cursor.read_u32::<LittleEndian>()? != LFH_SIGNATURE {
            return Err(Error::corrupt(offset, "bad local file header signature"));
        }

        let version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let _mod_time = cursor.read_u16::<LittleEndian>()?;
        let _mod_date = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            version_needed,
            flags,
            compression_method,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            file_name_length: cursor.read_u16::<LittleEndian>()?,
            extra_field_length: cursor.read_u16::<LittleEndian>()?,
        })
    }
}

/// Trailing record carrying CRC and sizes for entries written in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Largest encoding: signature + CRC + two 32-bit sizes
    pub const MAX_SIZE: usize = 16;

    /// Parse a descriptor whose signature is optional.
    ///
    /// When the first word is the signature, the CRC follows it; otherwise
    /// the first word is the CRC itself. Only the 32-bit size form is read.
    pub fn from_bytes(data: &[u8], offset: u64) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let first = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::corrupt(offset, "truncated data descriptor"))?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
            cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| Error::corrupt(offset, "truncated data descriptor"))?
        } else {
            first
        };
        let compressed_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::corrupt(offset, "truncated data descriptor"))?;
        let uncompressed_size = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::corrupt(offset, "truncated data descriptor"))?;

        Ok(Self {
            crc32,
            compressed_size: compressed_size as u64,
            uncompressed_size: uncompressed_size as u64,
        })
    }
}

/// Parsed ZIP entry.
///
/// Built from the central directory and completed with the data offset from
/// the local header; never changes afterwards. `file_name` is already
/// canonical UTF-8 regardless of how the archive encoded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub signature: u32,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub comment_length: u16,
    pub lfh_offset: u64,
    /// Offset of the first compressed byte
    pub offset: u64,
    pub file_name: String,
}

impl ZipEntry {
    /// Directory entries end with '/'
    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & (FLAG_ENCRYPTED | FLAG_STRONG_ENCRYPTION) != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// End of the compressed data, exclusive
    pub fn data_end(&self) -> u64 {
        self.offset + self.compressed_size
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date(self.last_mod_date)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time(self.last_mod_time)
    }
}

/// Unpack a DOS date field to (year, month, day)
pub fn dos_date(date: u16) -> (u16, u8, u8) {
    let day = (date & 0x1F) as u8;
    let month = ((date >> 5) & 0x0F) as u8;
    let year = ((date >> 9) & 0x7F) + 1980;
    (year, month, day)
}

/// Unpack a DOS time field to (hour, minute, second)
pub fn dos_time(time: u16) -> (u8, u8, u8) {
    let second = ((time & 0x1F) * 2) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    (hour, minute, second)
}
