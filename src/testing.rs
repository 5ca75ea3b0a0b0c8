//! Fixtures shared by unit tests: a synthesized TrueType font and small
//! template PDFs, so no test depends on files outside the crate.

use crate::font::FontResource;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

/// Code point ranges the tiny font covers, each mapped to consecutive glyphs
/// starting at glyph 1. Every glyph is 500 units wide on a 1000-unit em.
const COVERED_RANGES: &[(u16, u16)] = &[(0x0020, 0x007E), (0xFB50, 0xFBFF), (0xFE70, 0xFEFF)];

pub(crate) const TINY_FONT_ADVANCE: u16 = 500;

pub(crate) fn tiny_font_bytes() -> Vec<u8> {
    let num_glyphs: u16 = 1 + COVERED_RANGES
        .iter()
        .map(|(start, end)| end - start + 1)
        .sum::<u16>();

    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap_table()),
        (*b"head", head_table()),
        (*b"hhea", hhea_table()),
        (*b"hmtx", hmtx_table(num_glyphs)),
        (*b"maxp", maxp_table(num_glyphs)),
    ];

    let num_tables = tables.len() as u16;
    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    push_u16(&mut out, num_tables);
    push_u16(&mut out, 64);
    push_u16(&mut out, 2);
    push_u16(&mut out, num_tables * 16 - 64);

    let mut offset = 12 + 16 * tables.len();
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        push_u32(&mut out, 0);
        push_u32(&mut out, offset as u32);
        push_u32(&mut out, data.len() as u32);
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + 16 * tables.len() + body.len();
    }
    out.extend_from_slice(&body);
    out
}

pub(crate) fn tiny_font() -> FontResource {
    FontResource::from_bytes(tiny_font_bytes(), "TinySans.ttf").expect("tiny font parses")
}

fn cmap_table() -> Vec<u8> {
    let mut segments: Vec<(u16, u16, u16)> = Vec::new();
    let mut next_gid: u16 = 1;
    for (start, end) in COVERED_RANGES {
        let delta = (i32::from(next_gid) - i32::from(*start)).rem_euclid(65536) as u16;
        segments.push((*start, *end, delta));
        next_gid += end - start + 1;
    }
    segments.push((0xFFFF, 0xFFFF, 1));

    let seg_count = segments.len() as u16;
    let mut sub = Vec::new();
    push_u16(&mut sub, 4);
    push_u16(&mut sub, 16 + 8 * seg_count);
    push_u16(&mut sub, 0);
    push_u16(&mut sub, seg_count * 2);
    push_u16(&mut sub, 8);
    push_u16(&mut sub, 2);
    push_u16(&mut sub, seg_count * 2 - 8);
    for (_, end, _) in &segments {
        push_u16(&mut sub, *end);
    }
    push_u16(&mut sub, 0);
    for (start, _, _) in &segments {
        push_u16(&mut sub, *start);
    }
    for (_, _, delta) in &segments {
        push_u16(&mut sub, *delta);
    }
    for _ in &segments {
        push_u16(&mut sub, 0);
    }

    let mut out = Vec::new();
    push_u16(&mut out, 0);
    push_u16(&mut out, 1);
    push_u16(&mut out, 3);
    push_u16(&mut out, 1);
    push_u32(&mut out, 12);
    out.extend_from_slice(&sub);
    out
}

fn head_table() -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    push_u32(&mut out, 0x0001_0000);
    push_u32(&mut out, 0);
    push_u32(&mut out, 0x5F0F_3CF5);
    push_u16(&mut out, 0);
    push_u16(&mut out, 1000);
    out.extend_from_slice(&[0u8; 16]);
    push_i16(&mut out, 0);
    push_i16(&mut out, -200);
    push_i16(&mut out, 1000);
    push_i16(&mut out, 800);
    push_u16(&mut out, 0);
    push_u16(&mut out, 8);
    push_i16(&mut out, 2);
    push_i16(&mut out, 0);
    push_i16(&mut out, 0);
    out
}

fn hhea_table() -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0001_0000);
    push_i16(&mut out, 800);
    push_i16(&mut out, -200);
    push_i16(&mut out, 0);
    push_u16(&mut out, TINY_FONT_ADVANCE);
    push_i16(&mut out, 0);
    push_i16(&mut out, 0);
    push_i16(&mut out, TINY_FONT_ADVANCE as i16);
    push_i16(&mut out, 1);
    push_i16(&mut out, 0);
    push_i16(&mut out, 0);
    out.extend_from_slice(&[0u8; 8]);
    push_i16(&mut out, 0);
    push_u16(&mut out, 1);
    out
}

fn hmtx_table(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, TINY_FONT_ADVANCE);
    push_i16(&mut out, 0);
    for _ in 1..num_glyphs {
        push_i16(&mut out, 0);
    }
    out
}

fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, 0x0000_5000);
    push_u16(&mut out, num_glyphs);
    out
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// A template with `pages` pages of the given size, each carrying one line of
/// Helvetica so there is background content to stamp over.
pub(crate) fn template_pdf(width: i64, height: i64, pages: usize) -> Vec<u8> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for page in 0..pages {
        let content = format!("BT /F1 24 Tf 72 72 Td (Background {}) Tj ET", page + 1).into_bytes();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        kids.push(LoObject::Reference(page_id));
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("template pdf saves");
    out
}

/// PNG bytes of a solid-colour image.
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([240, 230, 200]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("png encodes");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_font_maps_ascii_and_presentation_forms() {
        let data = tiny_font_bytes();
        let face = ttf_parser::Face::parse(&data, 0).unwrap();
        assert_eq!(face.units_per_em(), 1000);
        assert_eq!(face.glyph_index(' ').map(|g| g.0), Some(1));
        assert_eq!(face.glyph_index('A').map(|g| g.0), Some(34));
        assert_eq!(face.glyph_index('\u{FB50}').map(|g| g.0), Some(96));
        assert_eq!(face.glyph_index('\u{FE70}').map(|g| g.0), Some(272));
        assert_eq!(face.glyph_index('\u{4E2D}'), None);
        let gid = face.glyph_index('\u{FEFF}').unwrap();
        assert_eq!(face.glyph_hor_advance(gid), Some(TINY_FONT_ADVANCE));
    }

    #[test]
    fn template_fixture_has_requested_pages() {
        let bytes = template_pdf(842, 595, 2);
        let doc = LoDocument::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }
}
