//! Directory readers for the four IMG layouts

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use tracing::{debug, warn};

use super::{Directory, FASTMAN92_SIGNATURE, ImgVersion, RawEntry, V2_SIGNATURE, V3_MAGIC};
use crate::error::{FormatError, Result};
use crate::{NAME_FIELD_LEN, SECTOR_SIZE, decode_name};

/// V2 directory record (32 bytes)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct V2Record {
    pub offset_sectors: u32,
    pub streaming_sectors: u16,
    pub archive_sectors: u16,
    pub name: [u8; NAME_FIELD_LEN],
}

impl V2Record {
    /// Effective size in sectors.
    ///
    /// The archive-size field is authoritative when present; most archives
    /// leave it zero and use the streaming size.
    pub fn size_sectors(&self) -> u32 {
        if self.archive_sectors != 0 {
            u32::from(self.archive_sectors)
        } else {
            u32::from(self.streaming_sectors)
        }
    }
}

/// V1 sidecar record (32 bytes)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct V1Record {
    pub offset_sectors: u32,
    pub size_sectors: u32,
    pub name: [u8; NAME_FIELD_LEN],
}

/// Fastman92 directory record (40 bytes): V2 shape plus compression
/// metadata.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct Fastman92Record {
    pub offset_sectors: u32,
    pub streaming_sectors: u16,
    pub archive_sectors: u16,
    pub name: [u8; NAME_FIELD_LEN],
    /// Uncompressed payload size in bytes
    pub uncompressed_size: u32,
    /// Bit 0: payload stored zlib-compressed
    pub flags: u32,
}

impl Fastman92Record {
    /// Effective size in sectors, with the same archive-size precedence
    /// as [`V2Record::size_sectors`].
    pub fn size_sectors(&self) -> u32 {
        if self.archive_sectors != 0 {
            u32::from(self.archive_sectors)
        } else {
            u32::from(self.streaming_sectors)
        }
    }
}

/// Compressed-payload flag in [`Fastman92Record::flags`]
pub(crate) const FASTMAN92_FLAG_COMPRESSED: u32 = 1;

/// V3 fixed header (20 bytes)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct V3Header {
    pub magic: u32,
    pub version: u32,
    pub entry_count: u32,
    pub table_size: u32,
    pub entry_size: u16,
    pub unknown: u16,
}

/// V3 entry record (16 bytes). The name lives in a string table after the
/// entry table.
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct V3Record {
    pub unknown: u32,
    pub resource_type: u32,
    pub offset_sectors: u32,
    /// Size in sectors at bits 11.., resource flags in the low 11 bits
    pub size_info: u32,
}

impl V3Record {
    pub fn size_sectors(&self) -> u32 {
        self.size_info >> 11
    }
}

/// Read the directory embedded in (or, for V1, impossible without) the
/// archive bytes.
///
/// V1 archives keep their directory in a `.dir` sidecar; pass those bytes
/// to [`read_v1_directory`] instead. Directories that declare more records
/// than the file holds are read up to the last complete record and flagged
/// `truncated` rather than rejected.
pub fn read_directory(data: &[u8], version: ImgVersion) -> Result<Directory> {
    match version {
        ImgVersion::V2 => read_v2(data),
        ImgVersion::Fastman92 => read_fastman92(data),
        ImgVersion::V3 => read_v3(data),
        ImgVersion::V1 => Err(FormatError::MissingSidecar(std::path::PathBuf::new())),
        ImgVersion::Unknown => Err(FormatError::UnknownSignature(
            data.get(..4).and_then(|s| s.try_into().ok()).unwrap_or_default(),
        )),
    }
}

/// Read a V1 `.dir` sidecar: a bare run of 32-byte records.
pub fn read_v1_directory(dir_data: &[u8]) -> Result<Directory> {
    let count = dir_data.len() / 32;
    let truncated = dir_data.len() % 32 != 0;
    if truncated {
        warn!(
            trailing = dir_data.len() % 32,
            "V1 sidecar length is not a multiple of 32, ignoring trailing bytes"
        );
    }

    let mut cursor = Cursor::new(dir_data);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let record = V1Record::read(&mut cursor)?;
        let name = decode_name(&record.name);
        if name.is_empty() {
            continue;
        }
        entries.push(RawEntry::new(
            name,
            u64::from(record.offset_sectors) * SECTOR_SIZE,
            u64::from(record.size_sectors) * SECTOR_SIZE,
        ));
    }

    debug!(entries = entries.len(), "read V1 sidecar directory");
    Ok(Directory {
        version: ImgVersion::V1,
        declared_count: count as u32,
        format_version: 0,
        entries,
        truncated,
    })
}

fn read_v2(data: &[u8]) -> Result<Directory> {
    check_signature(data, V2_SIGNATURE)?;
    let declared_count = read_u32_at(data, 4, "V2 header")?;

    let available = (data.len() - 8) / 32;
    let read_count = (declared_count as usize).min(available);
    let truncated = read_count < declared_count as usize;
    if truncated {
        warn!(
            declared = declared_count,
            available, "V2 directory is truncated, reading available records only"
        );
    }

    let mut cursor = Cursor::new(&data[8..]);
    let mut entries = Vec::with_capacity(read_count);
    for _ in 0..read_count {
        let record = V2Record::read(&mut cursor)?;
        let name = decode_name(&record.name);
        if name.is_empty() {
            continue;
        }
        entries.push(RawEntry::new(
            name,
            u64::from(record.offset_sectors) * SECTOR_SIZE,
            u64::from(record.size_sectors()) * SECTOR_SIZE,
        ));
    }

    debug!(
        declared = declared_count,
        entries = entries.len(),
        "read V2 directory"
    );
    Ok(Directory {
        version: ImgVersion::V2,
        declared_count,
        format_version: 0,
        entries,
        truncated,
    })
}

fn read_fastman92(data: &[u8]) -> Result<Directory> {
    check_signature(data, FASTMAN92_SIGNATURE)?;
    let format_version = read_u32_at(data, 4, "Fastman92 header")?;
    let declared_count = read_u32_at(data, 8, "Fastman92 header")?;
    if data.len() < 16 {
        return Err(FormatError::Truncated {
            what: "Fastman92 header",
            needed: 16,
            available: data.len(),
        });
    }

    let available = (data.len() - 16) / 40;
    let read_count = (declared_count as usize).min(available);
    let truncated = read_count < declared_count as usize;
    if truncated {
        warn!(
            declared = declared_count,
            available, "Fastman92 directory is truncated, reading available records only"
        );
    }

    let mut cursor = Cursor::new(&data[16..]);
    let mut entries = Vec::with_capacity(read_count);
    for _ in 0..read_count {
        let record = Fastman92Record::read(&mut cursor)?;
        let name = decode_name(&record.name);
        if name.is_empty() {
            continue;
        }
        let size = u64::from(record.size_sectors()) * SECTOR_SIZE;
        let is_compressed = record.flags & FASTMAN92_FLAG_COMPRESSED != 0;
        entries.push(RawEntry {
            name,
            offset: u64::from(record.offset_sectors) * SECTOR_SIZE,
            size,
            uncompressed_size: if is_compressed {
                u64::from(record.uncompressed_size)
            } else {
                size
            },
            is_compressed,
        });
    }

    debug!(
        format_version,
        entries = entries.len(),
        "read Fastman92 directory"
    );
    Ok(Directory {
        version: ImgVersion::Fastman92,
        declared_count,
        format_version,
        entries,
        truncated,
    })
}

fn read_v3(data: &[u8]) -> Result<Directory> {
    if data.len() < 20 {
        return Err(FormatError::Truncated {
            what: "V3 header",
            needed: 20,
            available: data.len(),
        });
    }
    let mut cursor = Cursor::new(data);
    let header = V3Header::read(&mut cursor)?;
    if header.magic != V3_MAGIC {
        return Err(FormatError::UnknownSignature(data[..4].try_into().unwrap_or_default()));
    }
    if header.version != 3 {
        return Err(FormatError::UnsupportedV3Version(header.version));
    }

    let entry_size = if header.entry_size == 0 { 16 } else { header.entry_size as usize };
    let table_start = 20usize;
    let declared = header.entry_count as usize;
    let available = data.len().saturating_sub(table_start) / entry_size;
    let read_count = declared.min(available);
    let truncated = read_count < declared;
    if truncated {
        warn!(
            declared,
            available, "V3 entry table is truncated, reading available records only"
        );
    }

    let mut records = Vec::with_capacity(read_count);
    for i in 0..read_count {
        let mut record_cursor = Cursor::new(&data[table_start + i * entry_size..]);
        records.push(V3Record::read(&mut record_cursor)?);
    }

    // Names are NUL-terminated strings packed after the entry table, one
    // per record in table order.
    let mut name_pos = table_start + declared * entry_size;
    let mut entries = Vec::with_capacity(read_count);
    for record in &records {
        let name = if name_pos < data.len() {
            let rest = &data[name_pos..];
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            name_pos += end + 1;
            String::from_utf8_lossy(&rest[..end]).into_owned()
        } else {
            String::new()
        };
        if name.is_empty() {
            continue;
        }
        entries.push(RawEntry::new(
            name,
            u64::from(record.offset_sectors) * SECTOR_SIZE,
            u64::from(record.size_sectors()) * SECTOR_SIZE,
        ));
    }

    debug!(entries = entries.len(), "read V3 directory");
    Ok(Directory {
        version: ImgVersion::V3,
        declared_count: header.entry_count,
        format_version: header.version,
        entries,
        truncated,
    })
}

fn check_signature(data: &[u8], expected: [u8; 4]) -> Result<()> {
    let sig: [u8; 4] = data
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or(FormatError::Truncated {
            what: "IMG signature",
            needed: 4,
            available: data.len(),
        })?;
    if sig != expected {
        return Err(FormatError::UnknownSignature(sig));
    }
    Ok(())
}

fn read_u32_at(data: &[u8], offset: usize, what: &'static str) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(FormatError::Truncated {
            what,
            needed: offset + 4,
            available: data.len(),
        })?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::encode_name;

    fn v2_fixture(entries: &[(&str, u32, u16)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&V2_SIGNATURE);
        data.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for (name, offset_sectors, streaming_sectors) in entries {
            data.extend_from_slice(&offset_sectors.to_le_bytes());
            data.extend_from_slice(&streaming_sectors.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&encode_name(name).expect("valid name"));
        }
        data
    }

    #[test]
    fn reads_v2_directory() {
        let data = v2_fixture(&[("player.dff", 1, 2), ("player.txd", 3, 1)]);
        let dir = read_directory(&data, ImgVersion::V2).expect("parse");

        assert_eq!(dir.declared_count, 2);
        assert!(!dir.truncated);
        assert_eq!(dir.entries[0].name, "player.dff");
        assert_eq!(dir.entries[0].offset, 2048);
        assert_eq!(dir.entries[0].size, 4096);
        assert_eq!(dir.entries[1].offset, 3 * 2048);
    }

    #[test]
    fn v2_archive_size_field_wins_when_nonzero() {
        let mut data = v2_fixture(&[("a.dff", 1, 2)]);
        // patch archive_sectors (offset 8+4+2) to 5
        data[14..16].copy_from_slice(&5u16.to_le_bytes());
        let dir = read_directory(&data, ImgVersion::V2).expect("parse");
        assert_eq!(dir.entries[0].size, 5 * 2048);
    }

    #[test]
    fn truncated_v2_directory_reads_available_records() {
        let mut data = v2_fixture(&[("a.dff", 1, 1)]);
        // claim 10 entries but provide 1
        data[4..8].copy_from_slice(&10u32.to_le_bytes());
        let dir = read_directory(&data, ImgVersion::V2).expect("parse");

        assert!(dir.truncated);
        assert_eq!(dir.declared_count, 10);
        assert_eq!(dir.entries.len(), 1);
    }

    #[test]
    fn empty_name_records_are_skipped() {
        let mut data = v2_fixture(&[("a.dff", 1, 1), ("b.dff", 2, 1)]);
        // NUL out the first record's name
        for byte in &mut data[16..40] {
            *byte = 0;
        }
        let dir = read_directory(&data, ImgVersion::V2).expect("parse");
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.entries[0].name, "b.dff");
    }

    #[test]
    fn rejects_wrong_signature() {
        let err = read_directory(b"NOPE\x00\x00\x00\x00", ImgVersion::V2)
            .expect_err("should reject");
        assert!(matches!(err, FormatError::UnknownSignature(_)));
    }

    #[test]
    fn reads_v1_sidecar() {
        let mut dir_data = Vec::new();
        dir_data.extend_from_slice(&0u32.to_le_bytes());
        dir_data.extend_from_slice(&2u32.to_le_bytes());
        dir_data.extend_from_slice(&encode_name("x.col").expect("valid name"));
        let dir = read_v1_directory(&dir_data).expect("parse");

        assert_eq!(dir.version, ImgVersion::V1);
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.entries[0].size, 4096);
    }

    #[test]
    fn reads_fastman92_directory() {
        let mut data = Vec::new();
        data.extend_from_slice(&FASTMAN92_SIGNATURE);
        data.extend_from_slice(&1u32.to_le_bytes()); // format version
        data.extend_from_slice(&1u32.to_le_bytes()); // entry count
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved
        data.extend_from_slice(&4u32.to_le_bytes()); // offset sectors
        data.extend_from_slice(&2u16.to_le_bytes()); // streaming sectors
        data.extend_from_slice(&0u16.to_le_bytes()); // archive sectors
        data.extend_from_slice(&encode_name("c.dff").expect("valid name"));
        data.extend_from_slice(&3000u32.to_le_bytes()); // uncompressed size
        data.extend_from_slice(&1u32.to_le_bytes()); // flags: compressed

        let dir = read_directory(&data, ImgVersion::Fastman92).expect("parse");
        assert_eq!(dir.format_version, 1);
        let entry = &dir.entries[0];
        assert_eq!(entry.offset, 4 * 2048);
        assert_eq!(entry.size, 2 * 2048);
        assert_eq!(entry.uncompressed_size, 3000);
        assert!(entry.is_compressed);
    }

    #[test]
    fn fastman92_archive_size_field_wins_when_nonzero() {
        let mut data = Vec::new();
        data.extend_from_slice(&FASTMAN92_SIGNATURE);
        data.extend_from_slice(&1u32.to_le_bytes()); // format version
        data.extend_from_slice(&1u32.to_le_bytes()); // entry count
        data.extend_from_slice(&0u32.to_le_bytes()); // reserved
        data.extend_from_slice(&4u32.to_le_bytes()); // offset sectors
        data.extend_from_slice(&2u16.to_le_bytes()); // streaming sectors
        data.extend_from_slice(&5u16.to_le_bytes()); // archive sectors
        data.extend_from_slice(&encode_name("c.dff").expect("valid name"));
        data.extend_from_slice(&0u32.to_le_bytes()); // uncompressed size
        data.extend_from_slice(&0u32.to_le_bytes()); // flags

        let dir = read_directory(&data, ImgVersion::Fastman92).expect("parse");
        assert_eq!(dir.entries[0].size, 5 * 2048);
    }

    #[test]
    fn reads_v3_directory() {
        let mut data = Vec::new();
        data.extend_from_slice(&V3_MAGIC.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes()); // version
        data.extend_from_slice(&2u32.to_le_bytes()); // entry count
        data.extend_from_slice(&32u32.to_le_bytes()); // table size
        data.extend_from_slice(&16u16.to_le_bytes()); // entry size
        data.extend_from_slice(&0u16.to_le_bytes());
        for (offset, size_sectors) in [(1u32, 2u32), (3, 1)] {
            data.extend_from_slice(&0u32.to_le_bytes()); // unknown
            data.extend_from_slice(&110u32.to_le_bytes()); // resource type
            data.extend_from_slice(&offset.to_le_bytes());
            data.extend_from_slice(&(size_sectors << 11).to_le_bytes());
        }
        data.extend_from_slice(b"first.wdr\0second.wtd\0");

        let dir = read_directory(&data, ImgVersion::V3).expect("parse");
        assert_eq!(dir.entries.len(), 2);
        assert_eq!(dir.entries[0].name, "first.wdr");
        assert_eq!(dir.entries[0].size, 4096);
        assert_eq!(dir.entries[1].name, "second.wtd");
        assert_eq!(dir.entries[1].offset, 3 * 2048);
    }

    #[test]
    fn v3_rejects_wrong_version() {
        let mut data = Vec::new();
        data.extend_from_slice(&V3_MAGIC.to_le_bytes());
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0u8; 12]);
        let err = read_directory(&data, ImgVersion::V3).expect_err("should reject");
        assert!(matches!(err, FormatError::UnsupportedV3Version(4)));
    }
}
