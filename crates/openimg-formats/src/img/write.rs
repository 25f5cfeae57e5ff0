//! Directory writers for rebuilds
//!
//! The writers emit headers and directory records only; payload placement
//! is the caller's job. Offsets and sizes in the given [`RawEntry`] values
//! are byte quantities already aligned to sector boundaries.

use std::io::{Seek, Write};

use binrw::BinWrite;

use super::read::{FASTMAN92_FLAG_COMPRESSED, Fastman92Record, V1Record, V2Record};
use super::{FASTMAN92_SIGNATURE, ImgVersion, RawEntry};
use crate::error::{FormatError, Result};
use crate::{SECTOR_SIZE, align_to_sector, encode_name, sectors_for};

/// Size in bytes of the header plus directory for `entry_count` entries.
///
/// V1 returns 0: its directory lives in the sidecar, and payload starts at
/// offset zero.
pub fn directory_len(version: ImgVersion, entry_count: usize) -> Result<u64> {
    match version {
        ImgVersion::V1 => Ok(0),
        ImgVersion::V2 => Ok(8 + 32 * entry_count as u64),
        ImgVersion::Fastman92 => Ok(16 + 40 * entry_count as u64),
        ImgVersion::V3 | ImgVersion::Unknown => Err(FormatError::UnsupportedWrite(version)),
    }
}

/// Byte offset where the first entry payload lands: the directory length
/// rounded up to a sector boundary.
pub fn data_start(version: ImgVersion, entry_count: usize) -> Result<u64> {
    Ok(align_to_sector(directory_len(version, entry_count)?))
}

/// Write the header and directory records for an embedded-directory
/// archive.
///
/// `format_version` is only meaningful for Fastman92 archives and is
/// ignored elsewhere.
pub fn write_directory<W: Write + Seek>(
    writer: &mut W,
    version: ImgVersion,
    format_version: u32,
    entries: &[RawEntry],
) -> Result<()> {
    match version {
        ImgVersion::V2 => write_v2(writer, entries),
        ImgVersion::Fastman92 => write_fastman92(writer, format_version, entries),
        ImgVersion::V1 | ImgVersion::V3 | ImgVersion::Unknown => {
            Err(FormatError::UnsupportedWrite(version))
        }
    }
}

/// Write a V1 `.dir` sidecar.
pub fn write_v1_sidecar<W: Write + Seek>(writer: &mut W, entries: &[RawEntry]) -> Result<()> {
    for entry in entries {
        let record = V1Record {
            offset_sectors: fit_u32(entry, entry.offset / SECTOR_SIZE)?,
            size_sectors: fit_u32(entry, sectors_for(entry.size))?,
            name: encode_name(&entry.name)?,
        };
        record.write(writer)?;
    }
    Ok(())
}

fn write_v2<W: Write + Seek>(writer: &mut W, entries: &[RawEntry]) -> Result<()> {
    writer.write_all(b"VER2")?;
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    for entry in entries {
        let record = V2Record {
            offset_sectors: fit_u32(entry, entry.offset / SECTOR_SIZE)?,
            streaming_sectors: fit_u16(entry, sectors_for(entry.size))?,
            archive_sectors: 0,
            name: encode_name(&entry.name)?,
        };
        record.write(writer)?;
    }
    Ok(())
}

fn write_fastman92<W: Write + Seek>(
    writer: &mut W,
    format_version: u32,
    entries: &[RawEntry],
) -> Result<()> {
    writer.write_all(&FASTMAN92_SIGNATURE)?;
    writer.write_all(&format_version.to_le_bytes())?;
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    writer.write_all(&0u32.to_le_bytes())?;
    for entry in entries {
        let record = Fastman92Record {
            offset_sectors: fit_u32(entry, entry.offset / SECTOR_SIZE)?,
            streaming_sectors: fit_u16(entry, sectors_for(entry.size))?,
            archive_sectors: 0,
            name: encode_name(&entry.name)?,
            uncompressed_size: fit_u32(entry, entry.uncompressed_size)?,
            flags: if entry.is_compressed {
                FASTMAN92_FLAG_COMPRESSED
            } else {
                0
            },
        };
        record.write(writer)?;
    }
    Ok(())
}

fn fit_u32(entry: &RawEntry, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| FormatError::EntryTooLarge {
        name: entry.name.clone(),
        size: entry.size,
    })
}

fn fit_u16(entry: &RawEntry, value: u64) -> Result<u16> {
    u16::try_from(value).map_err(|_| FormatError::EntryTooLarge {
        name: entry.name.clone(),
        size: entry.size,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::img::{read_directory, read_v1_directory};

    #[test]
    fn data_start_is_sector_aligned() {
        assert_eq!(data_start(ImgVersion::V2, 0).expect("writable"), 2048);
        // 8 + 64*32 = 2056 -> two sectors
        assert_eq!(data_start(ImgVersion::V2, 64).expect("writable"), 4096);
        assert_eq!(data_start(ImgVersion::V1, 500).expect("writable"), 0);
    }

    #[test]
    fn v3_is_not_writable() {
        assert!(matches!(
            directory_len(ImgVersion::V3, 1),
            Err(FormatError::UnsupportedWrite(ImgVersion::V3))
        ));
    }

    #[test]
    fn v2_directory_round_trips() {
        let entries = vec![
            RawEntry::new("player.dff", 2048, 4096),
            RawEntry::new("player.txd", 6144, 2048),
        ];
        let mut buffer = Cursor::new(Vec::new());
        write_directory(&mut buffer, ImgVersion::V2, 0, &entries).expect("write");

        let dir =
            read_directory(buffer.get_ref(), ImgVersion::V2).expect("read back");
        assert_eq!(dir.entries, entries);
    }

    #[test]
    fn v1_sidecar_round_trips() {
        let entries = vec![RawEntry::new("generic.txd", 0, 2048)];
        let mut buffer = Cursor::new(Vec::new());
        write_v1_sidecar(&mut buffer, &entries).expect("write");

        let dir = read_v1_directory(buffer.get_ref()).expect("read back");
        assert_eq!(dir.entries, entries);
    }

    #[test]
    fn fastman92_preserves_compression_metadata() {
        let entries = vec![RawEntry {
            name: "c.dff".to_string(),
            offset: 2048,
            size: 2048,
            uncompressed_size: 3000,
            is_compressed: true,
        }];
        let mut buffer = Cursor::new(Vec::new());
        write_directory(&mut buffer, ImgVersion::Fastman92, 1, &entries).expect("write");

        let dir = read_directory(buffer.get_ref(), ImgVersion::Fastman92).expect("read back");
        assert_eq!(dir.format_version, 1);
        assert!(dir.entries[0].is_compressed);
        assert_eq!(dir.entries[0].uncompressed_size, 3000);
    }

    #[test]
    fn oversized_entry_is_rejected() {
        // u16 sector count caps V2 entries at (65535 * 2048) bytes
        let entries = vec![RawEntry::new("huge.dat", 2048, 0x1_0000 * 2048)];
        let mut buffer = Cursor::new(Vec::new());
        let err = write_directory(&mut buffer, ImgVersion::V2, 0, &entries)
            .expect_err("should reject");
        assert!(matches!(err, FormatError::EntryTooLarge { .. }));
    }
}
