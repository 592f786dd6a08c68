//! Per-character decisions for vertical (tategaki) setting.

/// Glyphs that read wrong when drawn upright in a vertical column and are
/// turned 90 degrees instead.
const ROTATED_GLYPHS: [char; 5] = ['ー', '〜', '～', '…', '―'];

/// Contracted-sound and glottal-stop small kana.
const SMALL_KANA: [char; 18] = [
    'ぁ', 'ぃ', 'ぅ', 'ぇ', 'ぉ', 'ゃ', 'ゅ', 'ょ', 'っ', //
    'ァ', 'ィ', 'ゥ', 'ェ', 'ォ', 'ャ', 'ュ', 'ョ', 'ッ',
];

/// Small kana are nudged right and up by this fraction of the em.
const SMALL_KANA_NUDGE: f64 = 0.1;

/// Maps half-width digits to full-width digits and the ASCII hyphen to the
/// prolonged sound mark. Everything else passes through, so the mapping is
/// idempotent.
pub fn normalize_for_vertical(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '0'..='9' => shift_char(ch, '0', '０'),
            '-' => 'ー',
            _ => ch,
        })
        .collect()
}

pub fn is_rotated(ch: char) -> bool {
    ROTATED_GLYPHS.contains(&ch)
}

pub fn is_small_kana(ch: char) -> bool {
    SMALL_KANA.contains(&ch)
}

/// Positional offset `(dx, dy)` in millimetres for `ch` at an em of
/// `font_size_mm`.
pub fn glyph_offset(ch: char, font_size_mm: f64) -> (f64, f64) {
    if is_small_kana(ch) {
        (
            font_size_mm * SMALL_KANA_NUDGE,
            -font_size_mm * SMALL_KANA_NUDGE,
        )
    } else {
        (0.0, 0.0)
    }
}

/// Reduces a postal code to ASCII digits: full-width digits are folded to
/// ASCII and every other character (hyphens, `〒`, spaces) is dropped.
pub fn normalize_postal_code(code: &str) -> String {
    code.chars()
        .filter_map(|ch| match ch {
            '0'..='9' => Some(ch),
            '０'..='９' => Some(shift_char(ch, '０', '0')),
            _ => None,
        })
        .collect()
}

fn shift_char(ch: char, from_base: char, to_base: char) -> char {
    let offset = ch as u32 - from_base as u32;
    char::from_u32(to_base as u32 + offset).unwrap_or(ch)
}
