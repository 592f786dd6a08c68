//! Top-to-bottom glyph runs and the shrink-to-fit rule that sizes them.

use crate::canvas::{GlyphMetrics, GlyphPlacement};
use crate::glyph::{glyph_offset, is_rotated};
use std::str::Chars;

/// Millimetres per typographic point, as used by every layout constant.
pub const PT_TO_MM: f64 = 0.3528;
/// Line pitch as a multiple of the em.
pub const LINE_PITCH_RATIO: f64 = 1.3;

/// Vertical advance per glyph, in millimetres.
pub fn line_pitch(font_size: f64) -> f64 {
    font_size * PT_TO_MM * LINE_PITCH_RATIO
}

/// Height in millimetres taken by `char_count` glyphs at `font_size`.
pub fn run_height(char_count: usize, font_size: f64) -> f64 {
    char_count as f64 * font_size * PT_TO_MM * LINE_PITCH_RATIO
}

/// Font size that fits `char_count` glyphs into `available_height`: the base
/// size when it already fits, otherwise the size whose run height equals the
/// available height exactly. Empty runs and non-positive spans keep the base
/// size; such runs draw nothing anyway.
pub fn fit_font_size(char_count: usize, base_font_size: f64, available_height: f64) -> f64 {
    if char_count == 0 || !(available_height > 0.0) {
        return base_font_size;
    }
    if run_height(char_count, base_font_size) <= available_height {
        base_font_size
    } else {
        available_height / (char_count as f64 * PT_TO_MM * LINE_PITCH_RATIO)
    }
}

/// Lays `text` out downwards from `start_y`, centred on `anchor_x`.
///
/// The returned iterator is lazy and holds no hidden state: cloning it or
/// calling `layout` again with the same inputs yields the same placements.
/// It ends early, silently, at the first glyph whose cell would cross
/// `limit_y`.
pub fn layout<'a, M: GlyphMetrics + ?Sized>(
    text: &'a str,
    anchor_x: f64,
    start_y: f64,
    font_size: f64,
    limit_y: f64,
    metrics: &'a M,
) -> VerticalRun<'a, M> {
    VerticalRun {
        chars: text.chars(),
        anchor_x,
        y: start_y,
        font_size,
        pitch: line_pitch(font_size),
        limit_y,
        metrics,
        done: false,
    }
}

pub struct VerticalRun<'a, M: ?Sized> {
    chars: Chars<'a>,
    anchor_x: f64,
    y: f64,
    font_size: f64,
    pitch: f64,
    limit_y: f64,
    metrics: &'a M,
    done: bool,
}

impl<M: ?Sized> Clone for VerticalRun<'_, M> {
    fn clone(&self) -> Self {
        Self {
            chars: self.chars.clone(),
            anchor_x: self.anchor_x,
            y: self.y,
            font_size: self.font_size,
            pitch: self.pitch,
            limit_y: self.limit_y,
            metrics: self.metrics,
            done: self.done,
        }
    }
}

impl<M: GlyphMetrics + ?Sized> Iterator for VerticalRun<'_, M> {
    type Item = GlyphPlacement;

    fn next(&mut self) -> Option<GlyphPlacement> {
        if self.done {
            return None;
        }
        let ch = self.chars.next()?;
        if self.y + self.pitch > self.limit_y {
            self.done = true;
            return None;
        }

        let measured = self.metrics.measure_advance_width(ch, self.font_size);
        let width = measured.unwrap_or(0.0);
        let (dx, dy) = glyph_offset(ch, self.font_size * PT_TO_MM);
        let placement = GlyphPlacement {
            ch,
            x: self.anchor_x - width / 2.0 + dx,
            y: self.y + dy,
            font_size: self.font_size,
            rotated: is_rotated(ch),
            dx,
            dy,
            width,
            measured: measured.is_some(),
        };
        self.y += self.pitch;
        Some(placement)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, self.chars.size_hint().1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;

    #[test]
    fn fit_keeps_base_size_when_run_fits() {
        // 5 glyphs at 18pt need 41.2776mm.
        assert_eq!(fit_font_size(5, 18.0, 93.0), 18.0);
        assert_eq!(fit_font_size(5, 18.0, run_height(5, 18.0)), 18.0);
    }

    #[test]
    fn fit_shrinks_to_fill_exactly() {
        let size = fit_font_size(30, 18.0, 93.0);
        let expected = 93.0 / (30.0 * 0.3528 * 1.3);
        assert!((size - expected).abs() < 1e-6);
        assert!((run_height(30, size) - 93.0).abs() < 1e-6);
        assert!(size < 18.0 && size > 0.0);
    }

    #[test]
    fn fit_ignores_empty_runs_and_empty_spans() {
        assert_eq!(fit_font_size(0, 18.0, 10.0), 18.0);
        assert_eq!(fit_font_size(3, 18.0, 0.0), 18.0);
        assert_eq!(fit_font_size(3, 18.0, -4.0), 18.0);
    }

    #[test]
    fn glyphs_advance_by_pitch_and_centre_on_anchor() {
        let canvas = MemoryCanvas::new();
        let placements: Vec<_> = layout("山田", 56.0, 32.0, 18.0, 125.0, &canvas).collect();
        assert_eq!(placements.len(), 2);
        let pitch = line_pitch(18.0);
        assert_eq!(placements[0].y, 32.0);
        assert!((placements[1].y - (32.0 + pitch)).abs() < 1e-9);
        for p in &placements {
            assert!((p.column_center_x() - 56.0).abs() < 1e-9);
            assert!(!p.rotated);
            assert!(p.measured);
        }
    }

    #[test]
    fn run_truncates_at_limit() {
        let canvas = MemoryCanvas::new();
        let pitch = line_pitch(10.0);
        let limit = 20.0 + pitch * 3.5;
        let placements: Vec<_> = layout("一二三四五六", 10.0, 20.0, 10.0, limit, &canvas).collect();
        assert_eq!(placements.len(), 3);
        for p in &placements {
            assert!(p.y - p.dy + pitch <= limit);
        }
    }

    #[test]
    fn truncated_run_stays_finished() {
        let canvas = MemoryCanvas::new();
        let mut run = layout("一二三", 10.0, 0.0, 10.0, line_pitch(10.0), &canvas);
        assert!(run.next().is_some());
        assert!(run.next().is_none());
        assert!(run.next().is_none());
    }

    #[test]
    fn layout_is_deterministic_and_restartable() {
        let canvas = MemoryCanvas::new();
        let run = layout("ちょっと―待って", 40.0, 10.0, 11.0, 110.0, &canvas);
        let first: Vec<_> = run.clone().collect();
        let second: Vec<_> = run.collect();
        let third: Vec<_> = layout("ちょっと―待って", 40.0, 10.0, 11.0, 110.0, &canvas).collect();
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn classification_flows_into_placements() {
        let canvas = MemoryCanvas::new();
        let placements: Vec<_> = layout("よょー", 40.0, 10.0, 10.0, 110.0, &canvas).collect();
        let em = 10.0 * PT_TO_MM;
        let pitch = line_pitch(10.0);

        assert_eq!((placements[0].dx, placements[0].dy), (0.0, 0.0));
        assert!((placements[1].dx - em * 0.1).abs() < 1e-12);
        assert!((placements[1].y - (10.0 + pitch - em * 0.1)).abs() < 1e-9);
        assert!(placements[2].rotated);
        // Rotation does not change the vertical advance.
        assert!((placements[2].y - (10.0 + 2.0 * pitch)).abs() < 1e-9);
    }

    #[test]
    fn unmeasurable_glyph_skips_centering() {
        let canvas = MemoryCanvas::new().with_unmeasurable('〓');
        let placements: Vec<_> = layout("〓", 30.0, 10.0, 10.0, 110.0, &canvas).collect();
        assert_eq!(placements.len(), 1);
        assert!(!placements[0].measured);
        assert_eq!(placements[0].width, 0.0);
        assert_eq!(placements[0].x, 30.0);
    }
}
