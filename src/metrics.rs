#[derive(Debug, Clone, Default)]
pub struct PageMetrics {
    pub page_number: usize,
    /// Source row of the address on this page.
    pub row: usize,
    pub glyph_count: usize,
    pub unmeasured_glyphs: usize,
    pub compose_ms: f64,
    pub content_bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_compose_ms: f64,
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn glyph_count(&self) -> usize {
        self.pages.iter().map(|page| page.glyph_count).sum()
    }

    pub fn unmeasured_glyphs(&self) -> usize {
        self.pages.iter().map(|page| page.unmeasured_glyphs).sum()
    }
}
