use crate::canvas::{Canvas, Document, GlyphMetrics, GlyphPlacement, Recorder};
use crate::debug::DebugLogger;
use crate::error::HagakiError;
use crate::font::FontRegistry;
use crate::metrics::DocumentMetrics;
use crate::pdf;
use crate::types::{Pt, Size};
use crate::vertical::PT_TO_MM;
use std::path::Path;

/// `Canvas` backed by the PDF writer. Drawing is recorded as commands and
/// serialized once, in `finalize`.
pub struct PdfCanvas {
    recorder: Recorder,
    registry: FontRegistry,
    font_name: Option<String>,
    debug: Option<DebugLogger>,
}

impl PdfCanvas {
    pub fn new() -> Self {
        Self {
            recorder: Recorder::new(Size::hagaki()),
            registry: FontRegistry::new(),
            font_name: None,
            debug: None,
        }
    }

    pub fn with_debug(mut self, logger: DebugLogger) -> Self {
        self.debug = Some(logger);
        self
    }

    /// Registers font data already in memory and makes it the drawing font.
    pub fn register_font_bytes(&mut self, name: &str, data: Vec<u8>) -> Result<(), HagakiError> {
        self.registry.register_bytes(data, Some(name))?;
        self.font_name = Some(name.to_string());
        Ok(())
    }

    pub fn font_name(&self) -> Option<&str> {
        self.font_name.as_deref()
    }

    pub fn page_count(&self) -> usize {
        self.recorder.page_count()
    }

    /// Serializes what has been drawn so far without touching the
    /// filesystem.
    pub fn to_pdf_bytes(
        &self,
        metrics: Option<&mut DocumentMetrics>,
    ) -> Result<Vec<u8>, HagakiError> {
        let document = self.snapshot();
        let bytes = pdf::document_to_pdf_with_metrics(
            &document,
            Some(&self.registry),
            metrics,
            self.debug.as_ref(),
        )?;
        Ok(bytes)
    }

    pub fn write_to(
        &self,
        path: &Path,
        metrics: Option<&mut DocumentMetrics>,
    ) -> Result<usize, HagakiError> {
        let bytes = self.to_pdf_bytes(metrics)?;
        std::fs::write(path, &bytes).map_err(|source| HagakiError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(bytes.len())
    }

    fn snapshot(&self) -> Document {
        self.recorder.snapshot()
    }
}

impl Default for PdfCanvas {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphMetrics for PdfCanvas {
    fn measure_advance_width(&self, glyph: char, font_size: f64) -> Option<f64> {
        let name = self.font_name.as_deref()?;
        let mut buf = [0u8; 4];
        let width = self
            .registry
            .measure_text_width(name, Pt::from_f64(font_size), glyph.encode_utf8(&mut buf))?;
        // Layout lengths use the same point-to-mm factor as the pitch tables.
        Some(width.to_f64() * PT_TO_MM)
    }
}

impl Canvas for PdfCanvas {
    fn register_font(&mut self, name: &str, path: &Path) -> Result<(), HagakiError> {
        self.registry.register_file(path, Some(name))?;
        self.font_name = Some(name.to_string());
        Ok(())
    }

    fn begin_page(&mut self, width_mm: f64, height_mm: f64) {
        self.recorder.begin_page(Size::from_mm(width_mm, height_mm));
        if let Some(name) = self.font_name.as_deref() {
            self.recorder.set_font_name(name);
        }
    }

    fn draw_glyph(&mut self, placement: &GlyphPlacement) {
        let mut buf = [0u8; 4];
        let text = placement.ch.encode_utf8(&mut buf);
        let size = Pt::from_f64(placement.font_size);
        let x = Pt::from_mm(placement.x);
        let y = Pt::from_mm(placement.y);

        if placement.rotated {
            // Quarter turn about the centre of the glyph's em box; the turn
            // is scoped to this glyph by save/restore.
            let cx = Pt::from_mm(placement.x + placement.width / 2.0);
            let cy = y + size.mul_ratio(1, 2);
            self.recorder.save_state();
            self.recorder.set_font_size(size);
            self.recorder.rotate_about(90.0, cx, cy);
            self.recorder.draw_string(x, y, text.to_string());
            self.recorder.restore_state();
        } else {
            self.recorder.set_font_size(size);
            self.recorder.draw_string(x, y, text.to_string());
        }
    }

    fn finalize(&mut self, path: &Path) -> Result<usize, HagakiError> {
        self.write_to(path, None)
    }
}
