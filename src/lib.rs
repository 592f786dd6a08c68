mod canvas;
mod compose;
mod config;
mod debug;
mod error;
mod font;
pub mod glyph;
mod layout_spec;
mod metrics;
mod model;
mod pdf;
mod pdf_canvas;
mod perf;
pub mod postal;
pub mod source;
mod types;
pub mod vertical;

pub use canvas::{Canvas, Command, Document, GlyphMetrics, GlyphPlacement, MemoryCanvas, Page, Recorder};
pub use compose::{PageComposer, PagePlan, Region, RegionPlan};
pub use config::{Config, DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_FILE};
pub use debug::DebugLogger;
pub use error::HagakiError;
pub use font::FontRegistry;
pub use layout_spec::{LayoutSpec, NameBlockSpec, POSTAL_DIGITS, PostalSpec, RegionSpec};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use model::{AddressRecord, DEFAULT_HONORIFIC, SenderProfile, YearStatus};
pub use pdf::document_to_pdf;
pub use pdf_canvas::PdfCanvas;
pub use perf::PerfLogger;
pub use source::{AddressBook, AddressEntry};
pub use types::{Pt, Size};

use rayon::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Renders address cards to PDF with one font and one layout table.
///
/// ```no_run
/// # fn main() -> Result<(), hagaki::HagakiError> {
/// let hagaki = hagaki::Hagaki::builder()
///     .font_file("fonts/ipaexm.ttf")
///     .build()?;
/// let sender = hagaki::SenderProfile::default();
/// let addresses = vec![hagaki::AddressRecord::new("山田", "太郎")];
/// hagaki.render_to_file(&sender, &addresses, "nenga.pdf")?;
/// # Ok(())
/// # }
/// ```
pub struct Hagaki {
    composer: PageComposer,
    font_name: String,
    font_data: Vec<u8>,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,
}

#[derive(Clone, Default)]
pub struct HagakiBuilder {
    font_file: Option<PathBuf>,
    font_bytes: Option<Vec<u8>>,
    font_name: Option<String>,
    layout: LayoutSpec,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl HagakiBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preset from a loaded config file.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::new()
            .font_file(&config.font_file)
            .font_name(config.font_name())
            .layout(config.layout());
        builder.debug_path = config.debug_log.clone();
        builder.perf_path = config.perf_log.clone();
        builder
    }

    pub fn font_file(mut self, path: impl AsRef<Path>) -> Self {
        self.font_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn font_bytes(mut self, data: Vec<u8>) -> Self {
        self.font_bytes = Some(data);
        self
    }

    pub fn font_name(mut self, name: impl Into<String>) -> Self {
        self.font_name = Some(name.into());
        self
    }

    pub fn layout(mut self, layout: LayoutSpec) -> Self {
        self.layout = layout;
        self
    }

    pub fn debug_log(mut self, path: impl AsRef<Path>) -> Self {
        self.debug_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn perf_log(mut self, path: impl AsRef<Path>) -> Self {
        self.perf_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Loads and checks the font and validates the layout. Fails with
    /// `FontLoad` when the font cannot be read or parsed.
    pub fn build(self) -> Result<Hagaki, HagakiError> {
        self.layout.validate()?;

        let (font_data, default_name) = match (self.font_bytes, &self.font_file) {
            (Some(data), _) => (data, "hagaki-font".to_string()),
            (None, Some(path)) => {
                let data = std::fs::read(path)
                    .map_err(|err| HagakiError::font_load(path, err.to_string()))?;
                let stem = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("hagaki-font")
                    .to_string();
                (data, stem)
            }
            (None, None) => {
                return Err(HagakiError::InvalidConfiguration(
                    "font_file is not set".to_string(),
                ));
            }
        };
        let font_name = self.font_name.unwrap_or(default_name);

        // Parse once here so a bad font fails the build, not the first render.
        let mut probe = FontRegistry::new();
        probe
            .register_bytes(font_data.clone(), Some(&font_name))
            .map_err(|err| match (err, &self.font_file) {
                (HagakiError::FontLoad { message, .. }, Some(path)) => {
                    HagakiError::font_load(path, message)
                }
                (err, _) => err,
            })?;

        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = match self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };

        Ok(Hagaki {
            composer: PageComposer::new(self.layout),
            font_name,
            font_data,
            debug,
            perf,
        })
    }
}

impl Hagaki {
    pub fn builder() -> HagakiBuilder {
        HagakiBuilder::new()
    }

    pub fn composer(&self) -> &PageComposer {
        &self.composer
    }

    pub fn font_name(&self) -> &str {
        &self.font_name
    }

    /// A fresh PDF canvas with the font registered.
    pub fn canvas(&self) -> Result<PdfCanvas, HagakiError> {
        let mut canvas = PdfCanvas::new();
        if let Some(logger) = &self.debug {
            canvas = canvas.with_debug(logger.clone());
        }
        canvas.register_font_bytes(&self.font_name, self.font_data.clone())?;
        Ok(canvas)
    }

    /// Lays out every address (in parallel) and draws one page per address,
    /// in input order, onto `canvas`.
    pub fn render_with<C: Canvas + Sync>(
        &self,
        canvas: &mut C,
        sender: &SenderProfile,
        addresses: &[AddressRecord],
    ) -> Result<DocumentMetrics, HagakiError> {
        render_pages(
            &self.composer,
            canvas,
            sender,
            addresses,
            self.debug.as_ref(),
            self.perf.as_ref(),
        )
    }

    pub fn render_to_bytes(
        &self,
        sender: &SenderProfile,
        addresses: &[AddressRecord],
    ) -> Result<(Vec<u8>, DocumentMetrics), HagakiError> {
        let mut canvas = self.canvas()?;
        let mut metrics = self.render_with(&mut canvas, sender, addresses)?;
        let started = Instant::now();
        let bytes = canvas.to_pdf_bytes(Some(&mut metrics))?;
        self.finish_logs(started);
        Ok((bytes, metrics))
    }

    pub fn render_to_file(
        &self,
        sender: &SenderProfile,
        addresses: &[AddressRecord],
        path: impl AsRef<Path>,
    ) -> Result<DocumentMetrics, HagakiError> {
        let path = path.as_ref();
        let mut canvas = self.canvas()?;
        let mut metrics = self.render_with(&mut canvas, sender, addresses)?;
        let started = Instant::now();
        canvas.write_to(path, Some(&mut metrics))?;
        self.finish_logs(started);
        Ok(metrics)
    }

    fn finish_logs(&self, serialize_started: Instant) {
        if let Some(perf) = &self.perf {
            perf.log_span_ms(
                "serialize",
                None,
                serialize_started.elapsed().as_secs_f64() * 1000.0,
            );
            perf.flush();
        }
        if let Some(debug) = &self.debug {
            debug.emit_summary("render");
            debug.flush();
        }
    }
}

fn render_pages<C: Canvas + Sync>(
    composer: &PageComposer,
    canvas: &mut C,
    sender: &SenderProfile,
    addresses: &[AddressRecord],
    debug: Option<&DebugLogger>,
    perf: Option<&PerfLogger>,
) -> Result<DocumentMetrics, HagakiError> {
    for address in addresses {
        address.validate()?;
    }

    let plans: Vec<(PagePlan, f64)> = {
        let metrics: &C = canvas;
        addresses
            .par_iter()
            .map(|address| {
                let started = Instant::now();
                let plan = composer.compose(address, sender, metrics);
                (plan, started.elapsed().as_secs_f64() * 1000.0)
            })
            .collect()
    };

    let mut document = DocumentMetrics::default();
    let draw_started = Instant::now();
    for (index, ((plan, compose_ms), address)) in plans.iter().zip(addresses).enumerate() {
        let page_number = index + 1;
        let unmeasured = plan.unmeasured();
        if let Some(logger) = debug {
            for placement in plan.placements().filter(|p| !p.measured) {
                logger.measure_failed(address.row, placement.ch, placement.font_size);
            }
            logger.increment("page.composed", 1);
            logger.log(json!({
                "type": "page.composed",
                "page": page_number,
                "row": address.row,
                "name": address.display_name(),
                "glyphs": plan.glyph_count(),
                "unmeasured": unmeasured.len(),
                "regions": plan.regions.len(),
            }));
        }
        if let Some(perf) = perf {
            perf.log_span_ms("compose", Some(page_number), *compose_ms);
        }

        composer.draw(canvas, plan);

        document.total_compose_ms += compose_ms;
        document.pages.push(PageMetrics {
            page_number,
            row: address.row,
            glyph_count: plan.glyph_count(),
            unmeasured_glyphs: unmeasured.len(),
            compose_ms: *compose_ms,
            content_bytes: 0,
        });
    }
    if let Some(perf) = perf {
        perf.log_span_ms("draw", None, draw_started.elapsed().as_secs_f64() * 1000.0);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("hagaki_{tag}_{}_{}", std::process::id(), nanos))
    }

    fn sender() -> SenderProfile {
        SenderProfile {
            family_name: "鈴木".to_string(),
            given_name: "花子".to_string(),
            postal_code: "160-0022".to_string(),
            address1: "東京都新宿区2-2".to_string(),
            address2: String::new(),
        }
    }

    fn addresses() -> Vec<AddressRecord> {
        vec![
            AddressRecord::new("山田", "太郎")
                .with_postal_code("1000001")
                .with_address("東京都千代田区1-1", None)
                .with_row(2),
            AddressRecord::new("佐藤", "次郎")
                .with_postal_code("5300001")
                .with_address("大阪府大阪市北区1-2", Some("ハイツ101".to_string()))
                .with_row(3),
        ]
    }

    #[test]
    fn pages_follow_input_order() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let mut canvas = MemoryCanvas::new();
        let metrics =
            render_pages(&composer, &mut canvas, &sender(), &addresses(), None, None).unwrap();
        assert_eq!(canvas.pages.len(), 2);
        assert_eq!(metrics.page_count(), 2);
        assert_eq!(metrics.pages[0].row, 2);
        assert_eq!(metrics.pages[1].row, 3);
        assert_eq!(metrics.pages[0].glyph_count, canvas.pages[0].len());

        let first_postal: String = canvas.pages[1].iter().take(7).map(|p| p.ch).collect();
        assert_eq!(first_postal, "5300001");
    }

    #[test]
    fn empty_family_name_fails_before_drawing() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let mut canvas = MemoryCanvas::new();
        let mut list = addresses();
        list.push(AddressRecord::new("", "名無し").with_row(9));
        let err = render_pages(&composer, &mut canvas, &sender(), &list, None, None).unwrap_err();
        assert!(matches!(err, HagakiError::InvalidRecord(_)));
        assert!(canvas.pages.is_empty());
    }

    #[test]
    fn unmeasured_glyphs_are_logged_per_row() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let mut canvas = MemoryCanvas::new().with_unmeasurable('〓');
        let list = vec![AddressRecord::new("〓田", "太郎").with_row(5)];
        let path = temp_path("debug.jsonl");
        let logger = DebugLogger::new(&path).unwrap();
        let metrics =
            render_pages(&composer, &mut canvas, &sender(), &list, Some(&logger), None).unwrap();
        logger.emit_summary("render");
        logger.flush();
        assert_eq!(metrics.unmeasured_glyphs(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert!(records.iter().any(|r| r["type"] == "glyph.measure_failed" && r["row"] == 5));
        assert!(records.iter().any(|r| r["type"] == "page.composed" && r["unmeasured"] == 1));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn builder_requires_a_font() {
        let err = Hagaki::builder().build().err().unwrap();
        assert!(err.to_string().contains("font_file"));
    }

    #[test]
    fn unreadable_font_is_a_font_load_error() {
        let path = temp_path("missing.ttf");
        let err = Hagaki::builder().font_file(&path).build().err().unwrap();
        match err {
            HagakiError::FontLoad { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_layout_is_rejected_before_the_font_is_read() {
        let mut layout = LayoutSpec::hagaki();
        layout.recipient_name.region.font_size = -1.0;
        let err = Hagaki::builder()
            .font_file(temp_path("missing.ttf"))
            .layout(layout)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, HagakiError::InvalidConfiguration(_)));
    }
}
