//! RenderWare stream headers and file-type signatures
//!
//! Deep archive validation needs just enough RenderWare knowledge to judge
//! whether an entry's payload plausibly matches its extension: the 12-byte
//! section header that opens every DFF/TXD stream, and first-byte
//! signatures for the other common asset types.

/// RenderWare section header: the first 12 bytes of every stream section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Section type identifier
    pub section_type: u32,
    /// Payload size of the section, header excluded
    pub section_size: u32,
    /// Library version stamp
    pub rw_version: u32,
}

impl SectionHeader {
    /// Decode a section header from the start of `data`, if enough bytes
    /// are present.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let bytes = data.get(..12)?;
        Some(Self {
            section_type: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            section_size: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            rw_version: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
        })
    }

    /// Whether the version stamp falls in the window shipped games use
    pub fn has_plausible_version(&self) -> bool {
        is_plausible_rw_version(self.rw_version)
    }
}

/// RenderWare clump section, the root of a DFF model stream
pub const SECTION_CLUMP: u32 = 0x10;
/// RenderWare atomic section, an alternative DFF root
pub const SECTION_ATOMIC: u32 = 0x14;
/// RenderWare texture-dictionary section, the root of a TXD stream
pub const SECTION_TEXDICT: u32 = 0x16;
/// RenderWare UV-animation dictionary, occasionally the first DFF section
pub const SECTION_UVANIMDICT: u32 = 0x2B;

/// Version stamps observed across GTA III through San Andreas
pub const RW_VERSION_RANGE: std::ops::RangeInclusive<u32> = 0x30000..=0x3FFFF;

/// Whether `version` falls in the plausible RenderWare version window
pub fn is_plausible_rw_version(version: u32) -> bool {
    RW_VERSION_RANGE.contains(&version)
}

/// Whether `section_type` is a section that can legitimately open a DFF
pub fn is_dff_root_section(section_type: u32) -> bool {
    matches!(
        section_type,
        SECTION_CLUMP | SECTION_ATOMIC | SECTION_UVANIMDICT
    )
}

/// Judge whether a payload plausibly matches its extension.
///
/// Returns `None` for extensions with no known signature, `Some(true)` when
/// a signature matches, `Some(false)` when the payload opens with something
/// else. Extensions are matched case-insensitively.
pub fn matches_extension(extension: &str, data: &[u8]) -> Option<bool> {
    let extension = extension.to_ascii_lowercase();
    match extension.as_str() {
        "dff" => {
            let header = SectionHeader::parse(data)?;
            Some(is_dff_root_section(header.section_type) && header.has_plausible_version())
        }
        "txd" => {
            let header = SectionHeader::parse(data)?;
            Some(header.section_type == SECTION_TEXDICT && header.has_plausible_version())
        }
        "col" => Some(
            data.len() >= 4
                && matches!(&data[..4], b"COLL" | b"COL\x02" | b"COL\x03" | b"COL\x04"),
        ),
        "ifp" => Some(data.get(..4) == Some(b"ANPK")),
        "wav" => Some(data.get(..4) == Some(b"RIFF")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn dff_header(section_type: u32, rw_version: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&section_type.to_le_bytes());
        data.extend_from_slice(&0x400u32.to_le_bytes());
        data.extend_from_slice(&rw_version.to_le_bytes());
        data
    }

    #[test]
    fn parses_section_header() {
        let header = SectionHeader::parse(&dff_header(SECTION_CLUMP, 0x36003))
            .expect("12 bytes present");
        assert_eq!(header.section_type, SECTION_CLUMP);
        assert_eq!(header.section_size, 0x400);
        assert!(header.has_plausible_version());
    }

    #[test]
    fn short_input_has_no_header() {
        assert_eq!(SectionHeader::parse(&[1, 2, 3]), None);
    }

    #[test]
    fn dff_signature_checks_section_and_version() {
        assert_eq!(
            matches_extension("dff", &dff_header(SECTION_CLUMP, 0x36003)),
            Some(true)
        );
        assert_eq!(
            matches_extension("DFF", &dff_header(SECTION_TEXDICT, 0x36003)),
            Some(false)
        );
        // right section, impossible version stamp
        assert_eq!(
            matches_extension("dff", &dff_header(SECTION_CLUMP, 0xFFFF_FFFF)),
            Some(false)
        );
    }

    #[test]
    fn txd_and_col_signatures() {
        assert_eq!(
            matches_extension("txd", &dff_header(SECTION_TEXDICT, 0x31000)),
            Some(true)
        );
        assert_eq!(matches_extension("col", b"COL\x03rest"), Some(true));
        assert_eq!(matches_extension("col", b"COLXrest"), Some(false));
    }

    #[test]
    fn unknown_extensions_are_not_judged() {
        assert_eq!(matches_extension("scm", b"\x02\x00\x01"), None);
        assert_eq!(matches_extension("dat", b"anything"), None);
    }
}
