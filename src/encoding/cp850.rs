//! CP850 ("DOS Latin I") decoding and encoding
//!
//! SIE files declare `#FORMAT PC8`, which in practice means IBM code page 850.
//! Bytes below 0x80 are ASCII; the upper half maps through a fixed table.

/// Default number of leading bytes inspected by [`is_likely_encoded`]
pub const SNIFF_PREFIX_LEN: usize = 1000;

/// CP850 bytes for å ä ö Å Ä Ö
const SWEDISH_LETTERS: [u8; 6] = [0x86, 0x84, 0x94, 0x8F, 0x8E, 0x99];

/// Unicode characters for bytes 0x80..=0xFF
const CP850_HIGH: [char; 128] = [
    // 0x80
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    // 0x90
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', 'ø', '£', 'Ø', '×', 'ƒ',
    // 0xA0
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '®', '¬', '½', '¼', '¡', '«', '»',
    // 0xB0
    '░', '▒', '▓', '│', '┤', 'Á', 'Â', 'À', '©', '╣', '║', '╗', '╝', '¢', '¥', '┐',
    // 0xC0
    '└', '┴', '┬', '├', '─', '┼', 'ã', 'Ã', '╚', '╔', '╩', '╦', '╠', '═', '╬', '¤',
    // 0xD0
    'ð', 'Ð', 'Ê', 'Ë', 'È', 'ı', 'Í', 'Î', 'Ï', '┘', '┌', '█', '▄', '¦', 'Ì', '▀',
    // 0xE0
    'Ó', 'ß', 'Ô', 'Ò', 'õ', 'Õ', 'µ', 'þ', 'Þ', 'Ú', 'Û', 'Ù', 'ý', 'Ý', '¯', '´',
    // 0xF0
    '\u{AD}', '±', '‗', '¾', '¶', '§', '÷', '¸', '°', '¨', '·', '¹', '³', '²', '■', '\u{A0}',
];

/// Decode a single byte
pub fn decode_byte(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        CP850_HIGH
            .get(usize::from(byte - 0x80))
            .copied()
            .unwrap_or('?')
    }
}

/// Decode CP850 bytes into a string. Never fails.
pub fn decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| decode_byte(b)).collect()
}

/// Heuristic: does the first [`SNIFF_PREFIX_LEN`] bytes contain CP850 Swedish letters?
pub fn is_likely_encoded(bytes: &[u8]) -> bool {
    is_likely_encoded_with(bytes, SNIFF_PREFIX_LEN)
}

/// Same as [`is_likely_encoded`] with an explicit prefix length
pub fn is_likely_encoded_with(bytes: &[u8], prefix_len: usize) -> bool {
    bytes
        .iter()
        .take(prefix_len)
        .any(|b| SWEDISH_LETTERS.contains(b))
}

/// Turn uploaded bytes into text.
///
/// Valid UTF-8 is used as-is (a leading BOM is dropped). Otherwise the sniff
/// decides between CP850 and Latin-1.
pub fn decode_auto(bytes: &[u8], prefix_len: usize) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    if is_likely_encoded_with(bytes, prefix_len) {
        decode(bytes)
    } else {
        bytes.iter().map(|&b| char::from(b)).collect()
    }
}

/// Encode a single character, `?` when it has no CP850 byte
pub fn encode_char(ch: char) -> u8 {
    if ch.is_ascii() {
        return ch as u8;
    }
    CP850_HIGH
        .iter()
        .position(|&c| c == ch)
        .and_then(|pos| u8::try_from(pos + 0x80).ok())
        .unwrap_or(b'?')
}

/// Encode text as CP850 bytes
pub fn encode(text: &str) -> Vec<u8> {
    text.chars().map(encode_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        for b in 0u8..128 {
            assert_eq!(decode(&[b]), (b as char).to_string());
        }
        assert_eq!(decode(b"#KONTO 1930 Bank"), "#KONTO 1930 Bank");
    }

    #[test]
    fn test_swedish_letters() {
        assert_eq!(decode(&[0x86]), "å");
        assert_eq!(decode(&[0x84]), "ä");
        assert_eq!(decode(&[0x94]), "ö");
        assert_eq!(decode(&[0x8F]), "Å");
        assert_eq!(decode(&[0x8E]), "Ä");
        assert_eq!(decode(&[0x99]), "Ö");
        assert_eq!(decode(&[0x82]), "é");
    }

    #[test]
    fn test_decode_is_total() {
        let all: Vec<u8> = (0u8..=255).collect();
        let text = decode(&all);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(decode(&[0xFF]), "\u{A0}");
        assert_eq!(decode(&[0xC4]), "─");
    }

    #[test]
    fn test_sniff() {
        assert!(is_likely_encoded(b"#FNAMN \"F\x94retaget AB\""));
        assert!(!is_likely_encoded(b"#FNAMN \"Foretaget AB\""));

        let mut late = vec![b' '; 1500];
        late[1200] = 0x86;
        assert!(!is_likely_encoded(&late));
        assert!(is_likely_encoded_with(&late, 2000));
    }

    #[test]
    fn test_decode_auto() {
        assert_eq!(decode_auto("Växel".as_bytes(), SNIFF_PREFIX_LEN), "Växel");
        assert_eq!(decode_auto(b"V\x84xel", SNIFF_PREFIX_LEN), "Växel");
        // Latin-1 ä is 0xE4, which CP850 would read as õ
        assert_eq!(decode_auto(b"V\xE4xel", SNIFF_PREFIX_LEN), "Växel");
        assert_eq!(decode_auto(b"\xEF\xBB\xBF#FLAGGA 0", SNIFF_PREFIX_LEN), "#FLAGGA 0");
    }

    #[test]
    fn test_encode_inverse() {
        assert_eq!(encode("Kassa och bank åäöÅÄÖ"), {
            let mut v = b"Kassa och bank ".to_vec();
            v.extend_from_slice(&[0x86, 0x84, 0x94, 0x8F, 0x8E, 0x99]);
            v
        });
        assert_eq!(encode("€"), vec![b'?']);

        let all: Vec<u8> = (0u8..=255).collect();
        assert_eq!(encode(&decode(&all)), all);
    }
}
