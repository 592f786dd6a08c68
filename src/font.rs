use crate::error::HagakiError;
use crate::types::Pt;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use ttf_parser::GlyphId;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Option<Pt>>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Option<Pt>> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Option<Pt>) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// Fonts available to the PDF canvas, looked up by any of their names
/// (PostScript, full, family, file stem or the alias given at
/// registration), case-insensitively.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// Face-wide metrics in 1/1000 em, as the PDF font descriptor wants them.
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    /// Registers a `.ttf`/`.otf`/`.ttc` file under `alias` and its own
    /// names. Returns the font's primary name.
    pub fn register_file(
        &mut self,
        path: impl AsRef<Path>,
        alias: Option<&str>,
    ) -> Result<String, HagakiError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| HagakiError::font_load(path, err.to_string()))?;
        self.register_data(data, path, alias)
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        alias: Option<&str>,
    ) -> Result<String, HagakiError> {
        let source = alias.unwrap_or("EmbeddedFont");
        self.register_data(data, Path::new(source), alias)
    }

    fn register_data(
        &mut self,
        data: Vec<u8>,
        source: &Path,
        alias: Option<&str>,
    ) -> Result<String, HagakiError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| HagakiError::font_load(source, format!("invalid font data: {err}")))?;

        let (name, aliases) = font_names(&face, source);
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        });

        let mut all_aliases = Vec::new();
        all_aliases.extend(alias.map(str::to_string));
        all_aliases.push(name.clone());
        all_aliases.extend(aliases);
        for alias in all_aliases {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }

        Ok(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(name);
        self.lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index))
    }

    /// Shaped advance width of `text`, or `None` when `name` is not
    /// registered or the font has no glyph for some character in `text`.
    pub fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Option<Pt> {
        let key = normalize_name(name);
        let index = self.lookup.get(&key).copied()?;
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let font = self.fonts.get(index)?;
        let value = if text.chars().all(|ch| self.font_supports_char(name, ch)) {
            measure_text_width_shaped(font, font_size, text)
        } else {
            None
        };
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }

    pub(crate) fn map_glyph_id_for_char(&self, name: &str, ch: char) -> u16 {
        let Some(font) = self.resolve(name) else {
            return 0;
        };
        if let Ok(face) = ttf_parser::Face::parse(&font.data, 0) {
            if let Some(gid) = face.glyph_index(ch) {
                return gid.0;
            }
        }
        0
    }

    pub fn font_supports_char(&self, name: &str, ch: char) -> bool {
        self.map_glyph_id_for_char(name, ch) != 0
    }

    /// Horizontal advance of glyph `gid` in 1/1000 em.
    pub(crate) fn glyph_advance(&self, name: &str, gid: u16) -> u16 {
        let Some(font) = self.resolve(name) else {
            return 0;
        };
        if let Ok(face) = ttf_parser::Face::parse(&font.data, 0) {
            let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
            let units = face.units_per_em().max(1) as i64;
            let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
            return scaled.clamp(0, u16::MAX as i64) as u16;
        }
        0
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);

        // CJK faces are full-width; the ideographic space is a better default
        // than the ASCII one.
        let missing_width = ['\u{3000}', ' ']
            .into_iter()
            .find_map(|ch| face.glyph_index(ch))
            .and_then(|id| face.glyph_hor_advance(id))
            .map(|width| (width as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(1000);

        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }
}

fn measure_text_width_shaped(font: &RegisteredFont, font_size: Pt, text: &str) -> Option<Pt> {
    let face = HbFace::from_slice(&font.data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;

    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(rustybuzz::Direction::LeftToRight);
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() {
        return None;
    }
    let mut total_units: i32 = 0;
    for pos in positions {
        let adv = (((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em) as i32;
        total_units = total_units.saturating_add(adv);
    }
    if total_units <= 0 {
        return Some(Pt::ZERO);
    }
    Some(font_size.mul_ratio(total_units, 1000))
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [family, full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "hagaki_font_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn missing_file_is_a_font_load_error() {
        let mut registry = FontRegistry::new();
        let path = temp_path("missing.ttf");
        let err = registry.register_file(&path, Some("mincho")).unwrap_err();
        match err {
            HagakiError::FontLoad { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let path = temp_path("garbage.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        let mut registry = FontRegistry::new();
        let err = registry.register_file(&path, None).unwrap_err();
        assert!(err.to_string().contains("invalid font data"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unknown_font_measures_nothing() {
        let registry = FontRegistry::new();
        assert_eq!(
            registry.measure_text_width("mincho", Pt::from_f32(10.0), "山"),
            None
        );
        assert!(!registry.font_supports_char("mincho", '山'));
        assert_eq!(registry.glyph_advance("mincho", 1), 0);
    }

    #[test]
    fn names_are_normalized() {
        assert_eq!(normalize_name("  \"IPAexMincho\" "), "ipaexmincho");
        assert_eq!(normalize_name("'Mincho'"), "mincho");
    }

    #[test]
    fn width_cache_evicts_oldest_entries() {
        let mut cache = TextWidthCache::new(2);
        let key = |text: &str| TextWidthKey {
            font_index: 0,
            size_milli: 10_000,
            text: text.to_string(),
        };
        cache.insert(key("a"), Some(Pt::from_f32(1.0)));
        cache.insert(key("b"), None);
        cache.insert(key("c"), Some(Pt::from_f32(3.0)));
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")), Some(None));
        assert_eq!(cache.get(&key("c")), Some(Some(Pt::from_f32(3.0))));
    }
}
