use crate::error::HagakiError;
use crate::types::{Pt, Size};
use crate::vertical::PT_TO_MM;
use std::path::Path;

/// One positioned glyph. Coordinates are millimetres from the top-left
/// corner of the page; `font_size` is in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPlacement {
    pub ch: char,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub rotated: bool,
    pub dx: f64,
    pub dy: f64,
    /// Measured advance width in millimetres, 0 when measurement failed.
    pub width: f64,
    pub measured: bool,
}

impl GlyphPlacement {
    /// Horizontal centre of the column the glyph was laid out in.
    pub fn column_center_x(&self) -> f64 {
        self.x + self.width / 2.0 - self.dx
    }
}

/// Glyph measurement half of the drawing surface. Layout only ever needs
/// this, which keeps placement computation free of drawing state.
pub trait GlyphMetrics {
    /// Advance width of `glyph` in millimetres at `font_size` points, or
    /// `None` when the surface cannot measure it.
    fn measure_advance_width(&self, glyph: char, font_size: f64) -> Option<f64>;
}

impl<M: GlyphMetrics + ?Sized> GlyphMetrics for &M {
    fn measure_advance_width(&self, glyph: char, font_size: f64) -> Option<f64> {
        (**self).measure_advance_width(glyph, font_size)
    }
}

pub trait Canvas: GlyphMetrics {
    fn register_font(&mut self, name: &str, path: &Path) -> Result<(), HagakiError>;

    fn begin_page(&mut self, width_mm: f64, height_mm: f64);

    /// Draws one placement. Rotated placements turn 90 degrees about the
    /// glyph's own vertical-column centre; rotation never carries over to
    /// the next call.
    fn draw_glyph(&mut self, placement: &GlyphPlacement);

    /// Serializes everything drawn so far to `path`, returning the number of
    /// bytes written.
    fn finalize(&mut self, path: &Path) -> Result<usize, HagakiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    ConcatMatrix {
        a: f32,
        b: f32,
        c: f32,
        d: f32,
        e: Pt,
        f: Pt,
    },
    SetFontName(String),
    SetFontSize(Pt),
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    font_size: Pt,
    font_name: String,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            font_size: Pt::from_f32(12.0),
            font_name: "Helvetica".to_string(),
        }
    }
}

/// Records drawing commands page by page. Coordinates are points with a
/// top-left origin; the PDF writer flips them.
pub struct Recorder {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    page_open: bool,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
}

impl Recorder {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            page_open: false,
            state_stack: Vec::new(),
            current_state: GraphicsState::initial(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.page_open)
    }

    /// Closes the page in progress (if any) and opens a fresh one.
    pub fn begin_page(&mut self, page_size: Size) {
        if self.page_open {
            self.show_page();
        }
        self.page_size = page_size;
        self.page_open = true;
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn concat_matrix(&mut self, a: f32, b: f32, c: f32, d: f32, e: Pt, f: Pt) {
        self.current
            .commands
            .push(Command::ConcatMatrix { a, b, c, d, e, f });
    }

    /// Rotates subsequent drawing by `degrees` clockwise (as seen on the
    /// page) about the top-left-origin point `(cx, cy)`.
    pub fn rotate_about(&mut self, degrees: f64, cx: Pt, cy: Pt) {
        // Clockwise on the page is a negative angle in PDF's y-up space.
        let radians = -degrees.to_radians();
        let cos = libm::cos(radians);
        let sin = libm::sin(radians);
        let px = cx.to_f64();
        let py = (self.page_size.height - cy).to_f64();
        let e = px - (px * cos - py * sin);
        let f = py - (px * sin + py * cos);
        self.concat_matrix(
            cos as f32,
            sin as f32,
            -sin as f32,
            cos as f32,
            Pt::from_f64(e),
            Pt::from_f64(f),
        );
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.current_state.font_name == name {
            return;
        }
        self.current_state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(self.current_state.font_name.clone()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.current_state.font_size == size {
            return;
        }
        self.current_state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::initial();
        self.page_open = false;
    }

    /// The document as it would be after `finish`, leaving the recorder open.
    pub fn snapshot(&self) -> Document {
        let mut pages = self.pages.clone();
        if self.page_open {
            pages.push(self.current.clone());
        }
        Document {
            page_size: self.page_size,
            pages,
        }
    }

    pub fn finish(mut self) -> Document {
        if self.page_open {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}

/// A canvas that keeps placements in memory and measures with a fixed
/// advance: one em for everything outside ASCII, half an em for ASCII.
/// Useful for layout previews and tests where no font file is at hand.
#[derive(Debug, Default)]
pub struct MemoryCanvas {
    pub pages: Vec<Vec<GlyphPlacement>>,
    pub fonts: Vec<String>,
    unmeasurable: Vec<char>,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `measure_advance_width` fail for `ch`.
    pub fn with_unmeasurable(mut self, ch: char) -> Self {
        self.unmeasurable.push(ch);
        self
    }
}

impl GlyphMetrics for MemoryCanvas {
    fn measure_advance_width(&self, glyph: char, font_size: f64) -> Option<f64> {
        if self.unmeasurable.contains(&glyph) {
            return None;
        }
        let em = font_size * PT_TO_MM;
        Some(if glyph.is_ascii() { em / 2.0 } else { em })
    }
}

impl Canvas for MemoryCanvas {
    fn register_font(&mut self, name: &str, path: &Path) -> Result<(), HagakiError> {
        if !path.is_file() {
            return Err(HagakiError::font_load(path, "file not found"));
        }
        self.fonts.push(name.to_string());
        Ok(())
    }

    fn begin_page(&mut self, _width_mm: f64, _height_mm: f64) {
        self.pages.push(Vec::new());
    }

    fn draw_glyph(&mut self, placement: &GlyphPlacement) {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        if let Some(page) = self.pages.last_mut() {
            page.push(*placement);
        }
    }

    fn finalize(&mut self, _path: &Path) -> Result<usize, HagakiError> {
        Ok(0)
    }
}
