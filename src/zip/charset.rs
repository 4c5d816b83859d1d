//! Entry-name decoding.
//!
//! Names without the UTF-8 flag are in the archiver's legacy code page,
//! which for PKZIP-compatible tools is IBM code page 437.

/// Code page 437, bytes 0x80..=0xFF
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// Decode legacy single-byte text into UTF-8
pub fn decode_cp437(bytes: &[u8]) -> String {
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

/// Decode a raw entry name according to the UTF-8 flag.
///
/// Flagged names that are not valid UTF-8 are decoded lossily rather than
/// reinterpreted as code page 437.
pub fn decode_name(bytes: &[u8], utf8: bool) -> String {
    if utf8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else if bytes.is_ascii() {
        // ASCII is identical in both encodings
        bytes.iter().map(|&b| b as char).collect()
    } else {
        decode_cp437(bytes)
    }
}

/// Canonical form of an entry name.
///
/// Separators become `/`, empty and `.` segments are dropped and a trailing
/// `/` marking a directory is kept. Names that collapse to nothing come back
/// empty.
pub fn canonicalize(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut canonical = name
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if name.ends_with('/') && !canonical.is_empty() {
        canonical.push('/');
    }
    canonical
}

/// Whether a name contains a `..` segment
pub fn has_parent_traversal(name: &str) -> bool {
    name.split(['/', '\\']).any(|segment| segment == "..")
}
