//! Path component cleanup for template values

/// Characters that may never appear in a sanitized path component
pub const DENYLIST: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Lookalike for each `DENYLIST` entry, by position
const LOOKALIKES: [char; 10] = [
    '\u{29F8}', // big solidus
    '\u{29F9}', // big reverse solidus
    '\u{A789}', // modifier letter colon
    '\u{204E}', // low asterisk
    '\u{FF1F}', // fullwidth question mark
    '\u{2033}', // double prime
    '\u{2039}',
    '\u{203A}',
    '\u{FF5C}', // fullwidth vertical line
    '_',
];

fn substitute(c: char) -> char {
    DENYLIST
        .iter()
        .position(|denied| *denied == c)
        .map_or(c, |i| LOOKALIKES[i])
}

/// Make a template value safe to use as one path component
///
/// Reserved characters become lookalikes, other control characters are
/// dropped, and surrounding whitespace plus trailing dots are trimmed so the
/// name is also valid on Windows.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .filter(|c| DENYLIST.contains(c) || !c.is_control())
        .map(substitute)
        .collect();
    replaced
        .trim()
        .trim_end_matches('.')
        .trim_end()
        .to_string()
}
