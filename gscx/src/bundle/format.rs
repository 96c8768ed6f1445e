//! Bundle table parsing and packing.

use super::{BundleEntry, GSCORE_MAGIC, HEADER_LEN, PackInput};
use gscx_shared::errors::{GscxError, GscxResult};

/// Parsed bundle header and entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleTable {
    pub version: u16,
    pub entries: Vec<BundleEntry>,
}

/// Little-endian cursor that refuses to read past the end of the buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> GscxResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                GscxError::BundleFormat(format!(
                    "truncated entry table: {} needs {} bytes at offset {}, bundle is {} bytes",
                    what,
                    n,
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self, what: &str) -> GscxResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> GscxResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse and validate a bundle.
///
/// Validation is all-or-nothing: the header, every table entry, and every
/// payload range must fit inside `bytes` before anything is returned.
pub fn parse(bytes: &[u8]) -> GscxResult<BundleTable> {
    if bytes.len() < HEADER_LEN {
        return Err(GscxError::BundleFormat(format!(
            "invalid header: {} bytes, need at least {}",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let mut reader = Reader::new(bytes);
    let magic = reader.u32("magic")?;
    if magic != GSCORE_MAGIC {
        return Err(GscxError::BundleFormat(format!(
            "bad magic 0x{:08x}, expected 0x{:08x}",
            magic, GSCORE_MAGIC
        )));
    }
    let version = reader.u16("version")?;
    let count = reader.u16("count")?;

    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count {
        let kind = reader.u16("entry kind")?;
        let name_len = reader.u16("entry name length")?;
        let name_bytes = reader.take(name_len as usize, "entry name")?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|e| {
                GscxError::BundleFormat(format!("entry {} name is not UTF-8: {}", index, e))
            })?
            .to_string();
        let payload_offset = reader.u32("entry payload offset")?;
        let size = reader.u32("entry payload size")?;

        let entry = BundleEntry {
            kind,
            name,
            payload_offset,
            size,
        };

        let range = entry.payload_range();
        if range.end > bytes.len() {
            return Err(GscxError::BundleFormat(format!(
                "truncated payload for '{}': {}..{} past end of {}-byte bundle",
                entry.name,
                range.start,
                range.end,
                bytes.len()
            )));
        }

        entries.push(entry);
    }

    Ok(BundleTable { version, entries })
}

/// Build a bundle: header, entry table, then payloads in entry order.
pub fn pack(version: u16, inputs: &[PackInput]) -> GscxResult<Vec<u8>> {
    let count = u16::try_from(inputs.len())
        .map_err(|_| GscxError::BundleFormat(format!("too many entries: {}", inputs.len())))?;

    let mut table_len = HEADER_LEN;
    for input in inputs {
        if u16::try_from(input.name.len()).is_err() {
            return Err(GscxError::BundleFormat(format!(
                "entry name too long: {} bytes",
                input.name.len()
            )));
        }
        table_len += 2 + 2 + input.name.len() + 4 + 4;
    }

    let payload_len: usize = inputs.iter().map(|i| i.data.len()).sum();
    if table_len + payload_len > u32::MAX as usize {
        return Err(GscxError::BundleFormat(
            "bundle exceeds 4 GiB offset range".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(table_len + payload_len);
    out.extend_from_slice(&GSCORE_MAGIC.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());

    let mut cursor = table_len as u32;
    for input in inputs {
        out.extend_from_slice(&input.kind.to_le_bytes());
        out.extend_from_slice(&(input.name.len() as u16).to_le_bytes());
        out.extend_from_slice(input.name.as_bytes());
        out.extend_from_slice(&cursor.to_le_bytes());
        out.extend_from_slice(&(input.data.len() as u32).to_le_bytes());
        cursor += input.data.len() as u32;
    }

    for input in inputs {
        out.extend_from_slice(&input.data);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{GSCORE_VERSION, kinds};

    fn sample() -> Vec<PackInput> {
        vec![
            PackInput::new(kinds::CPU_CELL, "gscx_cpu_cell.so", b"cell".to_vec()),
            PackInput::new(kinds::RECOVERY, "recovery/gscx_recovery.so", b"rec!".to_vec()),
        ]
    }

    #[test]
    fn test_parse_packed_table() {
        let bytes = pack(GSCORE_VERSION, &sample()).unwrap();
        let table = parse(&bytes).unwrap();

        assert_eq!(table.version, GSCORE_VERSION);
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.entries[1].name, "recovery/gscx_recovery.so");
        assert_eq!(table.entries[1].kind, kinds::RECOVERY);
        assert_eq!(&bytes[table.entries[0].payload_range()], b"cell");
        assert_eq!(&bytes[table.entries[1].payload_range()], b"rec!");
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let bytes = pack(7, &[]).unwrap();
        assert_eq!(bytes, [0x52, 0x43, 0x53, 0x47, 7, 0, 0, 0]);
    }

    #[test]
    fn test_short_header_rejected() {
        let err = parse(&[0x52, 0x43, 0x53]).unwrap_err();
        assert!(matches!(err, GscxError::BundleFormat(_)));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = pack(GSCORE_VERSION, &sample()).unwrap();
        bytes[0] ^= 0xff;
        let err = parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_truncated_table_rejected_at_every_cut() {
        let bytes = pack(GSCORE_VERSION, &sample()).unwrap();
        let table_end = HEADER_LEN
            + sample()
                .iter()
                .map(|i| 12 + i.name.len())
                .sum::<usize>();

        for cut in HEADER_LEN..table_end {
            let err = parse(&bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, GscxError::BundleFormat(_)),
                "cut at {} should fail",
                cut
            );
        }
    }

    #[test]
    fn test_payload_past_end_rejected() {
        let bytes = pack(GSCORE_VERSION, &sample()).unwrap();
        let err = parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.to_string().contains("truncated payload"));
    }

    #[test]
    fn test_invalid_utf8_name_rejected() {
        let mut bytes = pack(
            GSCORE_VERSION,
            &[PackInput::new(kinds::GPU_RSX, "ab", b"x".to_vec())],
        )
        .unwrap();
        // name starts right after kind + name_len
        bytes[HEADER_LEN + 4] = 0xff;
        assert!(matches!(parse(&bytes), Err(GscxError::BundleFormat(_))));
    }

    #[test]
    fn test_zero_size_entry() {
        let bytes = pack(
            GSCORE_VERSION,
            &[PackInput::new(9, "empty.bin", Vec::new())],
        )
        .unwrap();
        let table = parse(&bytes).unwrap();
        assert_eq!(table.entries[0].size, 0);
        assert_eq!(table.entries[0].kind, 9);
    }
}
