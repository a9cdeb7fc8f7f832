//! CP437 codepage table and the archive's alternate-encoding policy for
//! names/comments not representable in CP437.

/// Codepage 437 mapping for byte values 0x80..=0xFF. Byte values 0x00..=0x7F
/// are plain ASCII and are not duplicated here.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', 'É', 'æ', 'Æ',
    'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', 'á', 'í', 'ó', 'ú', 'ñ', 'Ñ',
    'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕',
    '╣', '║', '╗', '╝', '╜', '╛', '┐', '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦',
    '╠', '═', '╬', '╧', '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐',
    '▀', 'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', '≡', '±',
    '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00a0}',
];

/// Decodes CP437 bytes to a Rust `String`. Every byte value has a mapping
/// (CP437 has no unmapped codepoints), so this never fails.
pub fn cp437_decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP437_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

/// Encodes a `&str` to CP437 bytes, or `None` if some character has no
/// CP437 representation.
pub fn cp437_encode(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        if (ch as u32) < 0x80 {
            out.push(ch as u8);
        } else if let Some(pos) = CP437_HIGH.iter().position(|&c| c == ch) {
            out.push(0x80 + pos as u8);
        } else {
            return None;
        }
    }
    Some(out)
}

/// Governs when a name/comment not representable in CP437 is emitted as
/// UTF-8 (GP-bit 11 set) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlternateEncodingPolicy {
    /// Always emit UTF-8 with GP-bit 11 set.
    Always,
    /// Emit CP437 when the name round-trips cleanly through it; UTF-8
    /// otherwise.
    #[default]
    AsNeeded,
    /// Never emit UTF-8; CP437-inexpressible characters are replaced.
    Never,
}

/// Decision made for one name/comment given the archive's policy.
pub struct EncodingDecision {
    pub bytes: Vec<u8>,
    pub utf8_flag: bool,
}

pub fn encode_name(name: &str, policy: AlternateEncodingPolicy) -> EncodingDecision {
    match policy {
        AlternateEncodingPolicy::Always => EncodingDecision {
            bytes: name.as_bytes().to_vec(),
            utf8_flag: true,
        },
        AlternateEncodingPolicy::Never => match cp437_encode(name) {
            Some(bytes) => EncodingDecision { bytes, utf8_flag: false },
            None => EncodingDecision {
                bytes: name.replace(|c: char| cp437_encode(&c.to_string()).is_none(), "_").into_bytes(),
                utf8_flag: false,
            },
        },
        AlternateEncodingPolicy::AsNeeded => match cp437_encode(name) {
            Some(bytes) if cp437_decode(&bytes) == name => EncodingDecision { bytes, utf8_flag: false },
            _ => EncodingDecision {
                bytes: name.as_bytes().to_vec(),
                utf8_flag: true,
            },
        },
    }
}

/// Decodes a stored name given the GP-bit-11 UTF-8 flag from the header.
pub fn decode_name(bytes: &[u8], utf8_flag: bool) -> String {
    if utf8_flag {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        cp437_decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips_as_cp437() {
        let decision = encode_name("hello/world.txt", AlternateEncodingPolicy::AsNeeded);
        assert!(!decision.utf8_flag);
        assert_eq!(decode_name(&decision.bytes, false), "hello/world.txt");
    }

    #[test]
    fn unrepresentable_name_falls_back_to_utf8() {
        let decision = encode_name("日本語.txt", AlternateEncodingPolicy::AsNeeded);
        assert!(decision.utf8_flag);
        assert_eq!(decode_name(&decision.bytes, true), "日本語.txt");
    }

    #[test]
    fn cp437_high_byte_round_trips() {
        let decision = encode_name("café", AlternateEncodingPolicy::AsNeeded);
        assert!(!decision.utf8_flag);
        assert_eq!(decode_name(&decision.bytes, false), "café");
    }
}
