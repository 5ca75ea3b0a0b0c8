use crate::error::BatchError;
use crate::font::{FontProgramKind, FontResource, ShapedGlyph, ShapedRun};
use crate::glyph_report::GlyphCoverageReport;
use crate::shaper::DisplayText;
use crate::types::{Color, Placement, Size, fmt};
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId, Stream as LoStream, dictionary};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const FONT_RESOURCE: &str = "F1";
const TEXT_COLOR: Color = Color::BLACK;

/// A single transparent page holding one rendered name.
#[derive(Debug, Clone)]
pub struct TextOverlay {
    pub bytes: Vec<u8>,
    /// Rendered text width in points.
    pub width: f32,
    pub coverage: GlyphCoverageReport,
}

/// Draws display text onto blank pages with the batch font. Holds no
/// per-record state, so one renderer serves every record of a batch.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    font: FontResource,
}

impl OverlayRenderer {
    pub fn new(font: FontResource) -> Self {
        Self { font }
    }

    /// Renders `text` centered on `placement.x` with its baseline on
    /// `placement.y`, on a page of `page` size.
    pub fn render(
        &self,
        text: &DisplayText,
        page: Size,
        placement: Placement,
    ) -> Result<TextOverlay, BatchError> {
        if !placement.font_size_in_range() {
            return Err(BatchError::configuration(format!(
                "font size {} outside [{}, {}]",
                placement.font_size,
                Placement::MIN_FONT_SIZE,
                Placement::MAX_FONT_SIZE
            )));
        }
        if !page.is_positive() {
            return Err(BatchError::format("overlay page size must be positive"));
        }

        let visual = text.glyph_text();
        let run = self.font.shape_visual(&visual)?;
        if !run.coverage.is_empty() {
            warn!(
                font = self.font.name(),
                missing = %run.coverage.summary(),
                "font has no glyph for some characters"
            );
        }
        let drawable = run.glyphs.iter().any(|g| !g.text.trim().is_empty());
        if !text.is_blank() && !drawable {
            return Err(BatchError::Shaping(format!(
                "font {} cannot display any character of {:?}",
                self.font.name(),
                visual
            )));
        }

        let width = run.width_units as f32 * placement.font_size / 1000.0;
        let bytes = if drawable {
            self.overlay_document(&run, page, placement, width)?
        } else {
            blank_page(page)?
        };
        debug!(glyphs = run.glyphs.len(), width, "rendered overlay");
        Ok(TextOverlay {
            bytes,
            width,
            coverage: run.coverage,
        })
    }

    fn overlay_document(
        &self,
        run: &ShapedRun,
        page: Size,
        placement: Placement,
        width: f32,
    ) -> Result<Vec<u8>, BatchError> {
        let mut doc = LoDocument::with_version("1.5");
        let font_id = self.embed_font(&mut doc, &run.glyphs);

        let start_x = placement.x - width / 2.0;
        let content = format!(
            "q\n{}\nBT\n/{} {} Tf\n{} {} Td\n{}ET\nQ\n",
            TEXT_COLOR.fill_operator(),
            FONT_RESOURCE,
            fmt(placement.font_size),
            fmt(start_x),
            fmt(placement.y),
            glyphs_to_tj(&run.glyphs)
        );
        let resources = dictionary! {
            "Font" => dictionary! { FONT_RESOURCE => font_id },
        };
        finish_page(doc, page, content, resources)
    }

    /// Adds the Type0 font, its CID descendant, descriptor, program and
    /// ToUnicode map, returning the Type0 object id.
    fn embed_font(&self, doc: &mut LoDocument, glyphs: &[ShapedGlyph]) -> ObjectId {
        let metrics = self.font.metrics();
        let base_font = sanitize_font_name(self.font.name());

        let mut glyph_map: BTreeMap<u16, String> = BTreeMap::new();
        let mut widths: BTreeMap<u16, i64> = BTreeMap::new();
        for glyph in glyphs {
            glyph_map
                .entry(glyph.gid)
                .or_insert_with(|| glyph.text.clone());
            let width = if glyph.default_advance > 0 {
                i64::from(glyph.default_advance)
            } else {
                i64::from(metrics.missing_width)
            };
            widths.entry(glyph.gid).or_insert(width);
        }

        let (program_key, cid_subtype, program_dict) = match self.font.program_kind() {
            FontProgramKind::TrueType => (
                "FontFile2",
                "CIDFontType2",
                dictionary! { "Length1" => self.font.data().len() as i64 },
            ),
            FontProgramKind::OpenTypeCff => (
                "FontFile3",
                "CIDFontType0",
                dictionary! { "Subtype" => "OpenType" },
            ),
        };
        let program_id = doc.add_object(LoStream::new(program_dict, self.font.data().to_vec()));

        let mut flags: i64 = 32;
        if metrics.is_fixed_pitch {
            flags |= 1;
        }
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => LoObject::Name(base_font.clone().into_bytes()),
            "Flags" => flags,
            "FontBBox" => vec![
                i64::from(metrics.bbox.0).into(),
                i64::from(metrics.bbox.1).into(),
                i64::from(metrics.bbox.2).into(),
                i64::from(metrics.bbox.3).into(),
            ],
            "ItalicAngle" => i64::from(metrics.italic_angle),
            "Ascent" => i64::from(metrics.ascent),
            "Descent" => i64::from(metrics.descent),
            "CapHeight" => i64::from(metrics.cap_height),
            "StemV" => i64::from(metrics.stem_v),
            "MissingWidth" => i64::from(metrics.missing_width),
            program_key => program_id,
        });

        let mut w_array = Vec::with_capacity(widths.len() * 2);
        for (gid, width) in &widths {
            w_array.push(LoObject::Integer(i64::from(*gid)));
            w_array.push(LoObject::Array(vec![LoObject::Integer(*width)]));
        }
        let mut cid_font = dictionary! {
            "Type" => "Font",
            "Subtype" => cid_subtype,
            "BaseFont" => LoObject::Name(base_font.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => LoObject::string_literal("Adobe"),
                "Ordering" => LoObject::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => i64::from(metrics.missing_width),
            "W" => w_array,
        };
        if cid_subtype == "CIDFontType2" {
            cid_font.set("CIDToGIDMap", "Identity");
        }
        let cid_font_id = doc.add_object(cid_font);

        let to_unicode_id = doc.add_object(LoStream::new(
            dictionary! {},
            to_unicode_cmap(&glyph_map).into_bytes(),
        ));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => LoObject::Name(base_font.into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![cid_font_id.into()],
            "ToUnicode" => to_unicode_id,
        })
    }
}

fn blank_page(page: Size) -> Result<Vec<u8>, BatchError> {
    let doc = LoDocument::with_version("1.5");
    finish_page(doc, page, String::new(), Dictionary::new())
}

fn finish_page(
    mut doc: LoDocument,
    page: Size,
    content: String,
    resources: Dictionary,
) -> Result<Vec<u8>, BatchError> {
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        "Contents" => content_id,
        "Resources" => resources,
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// TJ operand for a left-to-right glyph run. Offsets shift single glyphs
/// and are undone after them; advance differences against the font's
/// default widths become kerning adjustments.
fn glyphs_to_tj(glyphs: &[ShapedGlyph]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(glyphs.len() * 2);
    for glyph in glyphs {
        if glyph.x_offset != 0 {
            parts.push(format!("{}", -glyph.x_offset));
        }
        parts.push(format!("<{:04X}>", glyph.gid));
        let adjust = glyph.default_advance - glyph.advance + glyph.x_offset;
        if adjust != 0 {
            parts.push(format!("{adjust}"));
        }
    }
    format!("[{}] TJ\n", parts.join(" "))
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut units = String::new();
            let mut buf = [0u16; 2];
            for ch in text.chars() {
                for unit in ch.encode_utf16(&mut buf) {
                    units.push_str(&format!("{unit:04X}"));
                }
            }
            out.push_str(&format!("<{gid:04X}> <{units}>\n"));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

/// PDF names cannot carry whitespace or delimiters.
fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| ch.is_ascii_graphic() && !"()<>[]{}/%#".contains(*ch))
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}
