use crate::canvas::{GlyphMetrics, GlyphPlacement};
use crate::layout_spec::{POSTAL_DIGITS, PostalSpec};
use crate::vertical::PT_TO_MM;

/// Places the first seven characters of `digits` in the digit boxes of
/// `spec`, each centred on its box. Shorter codes fill fewer boxes; nothing is
/// padded and extra digits are dropped.
pub fn layout<M: GlyphMetrics + ?Sized>(
    digits: &str,
    spec: &PostalSpec,
    metrics: &M,
) -> Vec<GlyphPlacement> {
    let top = spec.center_y - spec.font_size * PT_TO_MM / 2.0;
    digits
        .chars()
        .zip(spec.x.iter())
        .take(POSTAL_DIGITS)
        .map(|(ch, &box_x)| {
            let measured = metrics.measure_advance_width(ch, spec.font_size);
            let width = measured.unwrap_or(0.0);
            GlyphPlacement {
                ch,
                x: box_x - width / 2.0,
                y: top,
                font_size: spec.font_size,
                rotated: false,
                dx: 0.0,
                dy: 0.0,
                width,
                measured: measured.is_some(),
            }
        })
        .collect()
}

/// `1000001` -> `100-0001`, for listings. Anything that is not exactly seven
/// characters is returned as is.
pub fn format_postal_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() != POSTAL_DIGITS {
        return code.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[3..].iter().collect();
    format!("{head}-{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::layout_spec::LayoutSpec;

    #[test]
    fn seven_digits_fill_every_box_in_order() {
        let spec = LayoutSpec::hagaki().recipient_postal;
        let canvas = MemoryCanvas::new();
        let placements = layout("1234567", &spec, &canvas);
        assert_eq!(placements.len(), 7);
        for (i, p) in placements.iter().enumerate() {
            assert_eq!(p.ch, char::from(b'1' + i as u8));
            assert!((p.column_center_x() - spec.x[i]).abs() < 1e-9);
            assert!((p.y - (13.5 - 16.0 * PT_TO_MM / 2.0)).abs() < 1e-9);
            assert!(!p.rotated);
        }
    }

    #[test]
    fn short_codes_are_not_padded() {
        let spec = LayoutSpec::hagaki().sender_postal;
        let canvas = MemoryCanvas::new();
        assert_eq!(layout("123", &spec, &canvas).len(), 3);
        assert!(layout("", &spec, &canvas).is_empty());
    }

    #[test]
    fn long_codes_are_cut_at_seven() {
        let spec = LayoutSpec::hagaki().sender_postal;
        let canvas = MemoryCanvas::new();
        let placements = layout("123456789", &spec, &canvas);
        assert_eq!(placements.len(), 7);
        assert_eq!(placements[6].ch, '7');
    }

    #[test]
    fn formats_with_a_hyphen() {
        assert_eq!(format_postal_code("1000001"), "100-0001");
        assert_eq!(format_postal_code("12345"), "12345");
    }
}
