use crate::canvas::{Command, Document, Page};
use crate::debug::DebugLogger;
use crate::font::{FontProgramKind, FontRegistry, RegisteredFont};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::types::Pt;
use fixed::types::I32F32;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io;

const PDF_CATALOG_ID: usize = 1;
const PDF_PAGES_ID: usize = 2;
const PDF_RESOURCES_ID: usize = 3;
const PDF_INFO_ID: usize = 4;
const PDF_FIRST_FREE_ID: usize = 5;

const DEFAULT_FONT: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontEncoding {
    WinAnsi,
    IdentityH,
}

#[derive(Debug, Clone)]
struct FontResource {
    resource: String,
    encoding: FontEncoding,
}

#[derive(Default)]
struct FontUsage {
    glyph_map: BTreeMap<u16, String>,
}

pub fn document_to_pdf(document: &Document, registry: Option<&FontRegistry>) -> io::Result<Vec<u8>> {
    document_to_pdf_with_metrics(document, registry, None, None)
}

/// Serializes `document`, filling per-page content sizes and the total byte
/// count into `metrics` when given.
pub(crate) fn document_to_pdf_with_metrics(
    document: &Document,
    registry: Option<&FontRegistry>,
    mut metrics: Option<&mut DocumentMetrics>,
    debug: Option<&DebugLogger>,
) -> io::Result<Vec<u8>> {
    let page_height = document.page_size.height;
    let font_names = collect_used_font_names(document);
    let font_usage = collect_font_usage(document, registry);

    let mut objects: Vec<String> = vec![String::new(); PDF_FIRST_FREE_ID - 1];
    let mut font_map: BTreeMap<String, FontResource> = BTreeMap::new();
    let mut font_resources_list: Vec<(String, usize)> = Vec::new();

    for (index, name) in font_names.iter().enumerate() {
        let resource = format!("F{}", index + 1);
        let start_id = objects.len() + 1;
        match registry.and_then(|registry| registry.resolve(name).map(|font| (registry, font))) {
            Some((registry, font)) => {
                let (font_objects, font_id) =
                    build_cidfont_objects(font, registry, font_usage.get(name), start_id);
                objects.extend(font_objects);
                font_resources_list.push((resource.clone(), font_id));
                font_map.insert(
                    name.clone(),
                    FontResource {
                        resource,
                        encoding: FontEncoding::IdentityH,
                    },
                );
            }
            None => {
                objects.push(font_object(name));
                font_resources_list.push((resource.clone(), start_id));
                font_map.insert(
                    name.clone(),
                    FontResource {
                        resource,
                        encoding: FontEncoding::WinAnsi,
                    },
                );
            }
        }
    }

    if let Some(logger) = debug {
        let fonts: Vec<_> = font_names
            .iter()
            .map(|name| {
                let glyphs = font_usage.get(name).map(|u| u.glyph_map.len()).unwrap_or(0);
                let embedded = font_map
                    .get(name)
                    .is_some_and(|f| f.encoding == FontEncoding::IdentityH);
                json!({ "name": name, "glyphs": glyphs, "embedded": embedded })
            })
            .collect();
        logger.log(json!({ "type": "pdf.fonts", "fonts": fonts }));
    }

    let mut page_ids = Vec::with_capacity(document.pages.len());
    for (page_index, page) in document.pages.iter().enumerate() {
        let content = render_page(page, page_height, &font_map, registry);
        let content_id = objects.len() + 1;
        objects.push(stream_object(&content));
        let page_id = objects.len() + 1;
        objects.push(format!(
            "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
            PDF_PAGES_ID,
            fmt_pt(document.page_size.width),
            fmt_pt(page_height),
            PDF_RESOURCES_ID,
            content_id
        ));
        page_ids.push(page_id);

        if let Some(metrics) = metrics.as_deref_mut() {
            if metrics.pages.len() <= page_index {
                metrics
                    .pages
                    .resize_with(page_index + 1, PageMetrics::default);
            }
            let entry = &mut metrics.pages[page_index];
            if entry.page_number == 0 {
                entry.page_number = page_index + 1;
            }
            entry.content_bytes = content.len();
        }
    }

    objects[PDF_CATALOG_ID - 1] = format!("<< /Type /Catalog /Pages {} 0 R >>", PDF_PAGES_ID);
    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects[PDF_PAGES_ID - 1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        page_ids.len()
    );
    objects[PDF_RESOURCES_ID - 1] = format!("<< /Font {} >>", font_resources(&font_resources_list));
    objects[PDF_INFO_ID - 1] = info_object();

    let bytes = build_pdf(&objects);
    if let Some(metrics) = metrics {
        metrics.total_bytes = bytes.len();
    }
    Ok(bytes)
}

fn collect_used_font_names(document: &Document) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for page in &document.pages {
        let mut current_font = DEFAULT_FONT.to_string();
        for cmd in &page.commands {
            match cmd {
                Command::SetFontName(name) => current_font = name.clone(),
                Command::DrawString { .. } => {
                    names.insert(current_font.clone());
                }
                _ => {}
            }
        }
    }
    names
}

fn collect_font_usage(
    document: &Document,
    registry: Option<&FontRegistry>,
) -> BTreeMap<String, FontUsage> {
    let mut map: BTreeMap<String, FontUsage> = BTreeMap::new();
    let Some(registry) = registry else {
        return map;
    };

    for page in &document.pages {
        let mut current_font = DEFAULT_FONT.to_string();
        for cmd in &page.commands {
            match cmd {
                Command::SetFontName(name) => current_font = name.clone(),
                Command::DrawString { text, .. } => {
                    if registry.resolve(&current_font).is_none() {
                        continue;
                    }
                    let usage = map.entry(current_font.clone()).or_default();
                    for ch in text.chars() {
                        let gid = registry.map_glyph_id_for_char(&current_font, ch);
                        if gid != 0 {
                            usage.glyph_map.entry(gid).or_insert(ch.to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    map
}

/// Type0 font over a CIDFont (CIDFontType2 for TrueType outlines,
/// CIDFontType0 for CFF), Identity-H encoded, with widths for the glyphs
/// actually used and a ToUnicode map so the text stays extractable.
fn build_cidfont_objects(
    font: &RegisteredFont,
    registry: &FontRegistry,
    usage: Option<&FontUsage>,
    start_id: usize,
) -> (Vec<String>, usize) {
    let font_file_id = start_id;
    let descriptor_id = start_id + 1;
    let cid_font_id = start_id + 2;
    let to_unicode_id = start_id + 3;
    let type0_font_id = start_id + 4;

    let mut objects = Vec::new();
    objects.push(font_file_object(&font.data, font.program_kind));
    objects.push(font_descriptor_object(font, font_file_id));

    let glyph_map: BTreeMap<u16, String> = usage.map(|u| u.glyph_map.clone()).unwrap_or_default();

    let mut w_entries: Vec<String> = Vec::new();
    for gid in glyph_map.keys() {
        let adv = registry.glyph_advance(&font.name, *gid);
        let width = if adv > 0 {
            adv
        } else {
            font.metrics.missing_width
        };
        w_entries.push(format!("{} [{}]", gid, width));
    }
    let w_array = if w_entries.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", w_entries.join(" "))
    };

    let (subtype, cid_to_gid) = match font.program_kind {
        FontProgramKind::TrueType => ("CIDFontType2", " /CIDToGIDMap /Identity"),
        FontProgramKind::OpenTypeCff => ("CIDFontType0", ""),
    };
    objects.push(format!(
        "<< /Type /Font /Subtype /{} /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{}{} >>",
        subtype,
        sanitize_font_name(&font.name),
        descriptor_id,
        font.metrics.missing_width,
        w_array,
        cid_to_gid
    ));

    objects.push(stream_object(&to_unicode_cmap(&glyph_map)));

    objects.push(format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
        sanitize_font_name(&font.name),
        cid_font_id,
        to_unicode_id
    ));

    (objects, type0_font_id)
}

fn font_descriptor_object(font: &RegisteredFont, font_file_id: usize) -> String {
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;
    // Symbolic: CJK glyph sets are outside the standard Latin set.
    let mut flags = 4;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = match font.program_kind {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        base,
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        font_file_entry,
        font_file_id
    )
}

fn font_file_object(data: &[u8], kind: FontProgramKind) -> String {
    let mut stream_data = ascii_hex_encode(data);
    stream_data.push('>');
    stream_data.push('\n');
    let length = stream_data.len();
    let mut dict = format!(
        "<< /Length {} /Length1 {} /Filter /ASCIIHexDecode",
        length,
        data.len()
    );
    if matches!(kind, FontProgramKind::OpenTypeCff) {
        dict.push_str(" /Subtype /OpenType");
    }
    dict.push_str(" >>\nstream\n");
    format!("{}{}endstream", dict, stream_data)
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        sanitize_font_name(name)
    )
}

fn font_resources(fonts: &[(String, usize)]) -> String {
    let entries = fonts
        .iter()
        .map(|(resource, font_id)| format!("/{} {} 0 R", resource, font_id))
        .collect::<Vec<_>>();
    format!("<< {} >>", entries.join(" "))
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        DEFAULT_FONT.to_string()
    } else {
        out
    }
}

fn render_page(
    page: &Page,
    page_height: Pt,
    font_map: &BTreeMap<String, FontResource>,
    registry: Option<&FontRegistry>,
) -> String {
    let mut out = String::new();
    let mut current_font_size = Pt::from_f32(12.0);
    let mut current_font_name = DEFAULT_FONT.to_string();
    let mut state_stack: Vec<(Pt, String)> = Vec::new();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                state_stack.push((current_font_size, current_font_name.clone()));
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some((size, name)) = state_stack.pop() {
                    current_font_size = size;
                    current_font_name = name;
                }
                out.push_str("Q\n");
            }
            Command::ConcatMatrix { a, b, c, d, e, f } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} cm\n",
                    fmt(*a),
                    fmt(*b),
                    fmt(*c),
                    fmt(*d),
                    fmt_pt(*e),
                    fmt_pt(*f)
                ));
            }
            Command::SetFontName(name) => {
                current_font_name = name.clone();
            }
            Command::SetFontSize(size) => {
                current_font_size = *size;
            }
            Command::DrawString { x, y, text } => {
                let font_res = font_map.get(&current_font_name);
                let resource = font_res.map(|v| v.resource.as_str()).unwrap_or("F1");
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(current_font_size)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - current_font_size)
                ));
                match (font_res.map(|v| v.encoding), registry) {
                    (Some(FontEncoding::IdentityH), Some(registry)) => {
                        out.push_str(&format!(
                            "{} Tj\n",
                            encode_cid_hex(text, registry, &current_font_name)
                        ));
                    }
                    _ => {
                        out.push_str(&format!("({}) Tj\n", encode_winansi_pdf_string(text)));
                    }
                }
                out.push_str("ET\n");
            }
        }
    }

    out
}

fn stream_object(content: &str) -> String {
    format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content)
}

fn info_object() -> String {
    "<< /Producer (hagaki) >>".to_string()
}

/// Assembles numbered objects (object `n` is `objects[n - 1]`) into a PDF
/// 1.7 file with a classic xref table. The trailer `/ID` is a digest of the
/// body, so identical input gives identical bytes.
fn build_pdf(objects: &[String]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        let obj_id = index + 1;
        out.extend_from_slice(format!("{} 0 obj\n", obj_id).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let digest = Sha256::digest(&out);
    let id = digest
        .iter()
        .take(16)
        .map(|b| format!("{:02X}", b))
        .collect::<String>();

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }

    let trailer = format!(
        "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R /ID [<{}> <{}>] >>\nstartxref\n{}\n%%EOF",
        objects.len() + 1,
        PDF_CATALOG_ID,
        PDF_INFO_ID,
        id,
        id,
        xref_start
    );
    out.extend_from_slice(trailer.as_bytes());

    out
}

fn escape_pdf_byte(byte: u8, out: &mut String) {
    match byte {
        b'\\' => out.push_str("\\\\"),
        b'(' => out.push_str("\\("),
        b')' => out.push_str("\\)"),
        b'\n' => out.push_str("\\n"),
        b'\r' => out.push_str("\\r"),
        b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
        b => out.push(b as char),
    }
}

/// Latin-1 text for the unembedded fallback font; anything else becomes `?`.
fn encode_winansi_pdf_string(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => ch as u8,
            _ => b'?',
        };
        escape_pdf_byte(byte, &mut out);
    }
    out
}

fn encode_cid_hex(text: &str, registry: &FontRegistry, font_name: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4 + 2);
    out.push('<');
    for ch in text.chars() {
        let gid = registry.map_glyph_id_for_char(font_name, ch);
        out.push_str(&format!("{:04X}", gid));
    }
    out.push('>');
    out
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(u16, &String)> = glyph_map.iter().map(|(g, s)| (*g, s)).collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    // bfchar blocks hold at most 100 entries.
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, s) in chunk {
            let mut uni = String::new();
            for unit in s.encode_utf16() {
                uni.push_str(&format!("{:04X}", unit));
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, uni));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
