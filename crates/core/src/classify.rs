//! Cheap text/binary classification of archive entries.

/// Bytes inspected by the first, cheapest check.
pub const SHORT_PREFIX: usize = 38;
/// Bytes inspected when the short prefix fails.
pub const LONG_PREFIX: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Text,
    Binary,
}

/// Classify content by decoding a prefix as UTF-8: first the leading 38 bytes,
/// then the leading 1024 bytes. Only the prefix is inspected, so invalid bytes
/// past the prefix do not change the verdict.
pub fn classify(data: &[u8]) -> EntryKind {
    if prefix_is_utf8(data, SHORT_PREFIX) || prefix_is_utf8(data, LONG_PREFIX) {
        EntryKind::Text
    } else {
        EntryKind::Binary
    }
}

/// Whether the first `len` bytes are UTF-8. A multi-byte sequence cut off by
/// the prefix boundary still counts as valid.
fn prefix_is_utf8(data: &[u8], len: usize) -> bool {
    let prefix = &data[..data.len().min(len)];
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && prefix.len() == len,
    }
}

/// Decode an entry that classifies as text. `None` for binary entries and for
/// text-looking entries whose full content turns out not to be UTF-8.
pub fn decode_text(data: &[u8]) -> Option<&str> {
    match classify(data) {
        EntryKind::Text => std::str::from_utf8(data).ok(),
        EntryKind::Binary => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_text_is_text() {
        assert_eq!(classify(b"body { margin: 0 }"), EntryKind::Text);
        assert_eq!(classify(b""), EntryKind::Text);
    }

    #[test]
    fn invalid_bytes_after_short_prefix_still_text() {
        let mut data = b"<?xml version=\"1.0\" encoding=\"utf-8\"?>".to_vec();
        assert!(data.len() >= SHORT_PREFIX);
        data.extend_from_slice(&[0xff, 0xfe, 0x00, 0x80]);
        assert_eq!(classify(&data), EntryKind::Text);
        // ...but the full decode refuses it, so it is passed through as binary.
        assert_eq!(decode_text(&data), None);
    }

    #[test]
    fn font_header_is_binary() {
        // TrueType header followed by table records.
        let mut data = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x0f, 0x00, 0x80];
        data.extend(std::iter::repeat(0xc3).take(64));
        assert_eq!(classify(&data), EntryKind::Binary);
    }

    #[test]
    fn jpeg_is_binary() {
        let data = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        assert_eq!(classify(&data), EntryKind::Binary);
    }

    #[test]
    fn multibyte_char_on_prefix_boundary_is_text() {
        // 37 ASCII bytes then a 3-byte character straddling byte 38.
        let mut data = vec![b'a'; SHORT_PREFIX - 1];
        data.extend_from_slice("文本".as_bytes());
        assert_eq!(classify(&data), EntryKind::Text);
        assert_eq!(decode_text(&data).map(|s| s.len()), Some(data.len()));
    }

    #[test]
    fn invalid_byte_inside_short_prefix_is_binary() {
        let mut data = vec![b'a'; 10];
        data.push(0xff);
        assert_eq!(classify(&data), EntryKind::Binary);
    }

    proptest! {
        #[test]
        fn any_utf8_string_is_text(s in "\\PC*") {
            prop_assert_eq!(classify(s.as_bytes()), EntryKind::Text);
            prop_assert_eq!(decode_text(s.as_bytes()), Some(s.as_str()));
        }
    }
}
