use crate::error::BatchError;
use crate::glyph_report::GlyphCoverageReport;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use ttf_parser::GlyphId;

/// The single embeddable font used for every record of a batch. Loaded once;
/// the raw program is shared read-only between renders.
#[derive(Debug, Clone)]
pub struct FontResource {
    name: String,
    data: Arc<[u8]>,
    metrics: FontMetrics,
    program_kind: FontProgramKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// Font-wide metrics in 1000-unit text space.
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    pub(crate) units_per_em: u16,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

/// One positioned glyph of a left-to-right run. Advances and offsets are in
/// 1000-unit text space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShapedGlyph {
    pub(crate) gid: u16,
    pub(crate) text: String,
    pub(crate) advance: i32,
    pub(crate) default_advance: i32,
    pub(crate) x_offset: i32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ShapedRun {
    pub(crate) glyphs: Vec<ShapedGlyph>,
    pub(crate) width_units: i32,
    pub(crate) coverage: GlyphCoverageReport,
}

impl FontResource {
    /// Reads and validates the font file. A missing or unparseable file is a
    /// configuration error.
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        if !path.is_file() {
            return Err(BatchError::configuration(format!(
                "font file {} not found",
                path.display()
            )));
        }
        let data = fs::read(path).map_err(|err| {
            BatchError::configuration(format!("font file {} unreadable: {err}", path.display()))
        })?;
        let source = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("EmbeddedFont");
        Self::from_bytes(data, source)
    }

    pub fn from_bytes(data: Vec<u8>, source_name: &str) -> Result<Self, BatchError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
            BatchError::configuration(format!("invalid font data for {source_name}: {err}"))
        })?;
        if HbFace::from_slice(&data, 0).is_none() {
            return Err(BatchError::configuration(format!(
                "font {source_name} cannot be used for shaping"
            )));
        }
        let name = font_name(&face, source_name);
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        drop(face);
        Ok(Self {
            name,
            data: Arc::from(data),
            metrics,
            program_kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub(crate) fn program_kind(&self) -> FontProgramKind {
        self.program_kind
    }

    /// Shapes text that is already in visual order, strictly left to right.
    pub(crate) fn shape_visual(&self, text: &str) -> Result<ShapedRun, BatchError> {
        let mut run = ShapedRun::default();
        if text.is_empty() {
            return Ok(run);
        }
        let face = HbFace::from_slice(&self.data, 0)
            .ok_or_else(|| BatchError::Shaping(format!("font {} failed to load", self.name)))?;
        let units_per_em = i64::from(face.units_per_em().max(1));

        let mut buffer = UnicodeBuffer::new();
        buffer.set_direction(HbDirection::LeftToRight);
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);
        let infos = output.glyph_infos();
        let positions = output.glyph_positions();
        if infos.len() != positions.len() {
            return Err(BatchError::Shaping(format!(
                "glyph buffer mismatch for {text:?}"
            )));
        }

        let mut clusters: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
        clusters.push(text.len());
        for (i, (info, pos)) in infos.iter().zip(positions.iter()).enumerate() {
            let start = clusters[i].min(text.len());
            let end = clusters[i + 1].min(text.len()).max(start);
            let cluster_text = text.get(start..end).unwrap_or_default().to_string();
            let gid = u16::try_from(info.glyph_id).unwrap_or(0);
            if gid == 0 {
                for ch in cluster_text.chars().filter(|ch| !ch.is_whitespace()) {
                    run.coverage.record_missing(ch);
                }
                continue;
            }
            let advance = scale_to_text_space(i64::from(pos.x_advance), units_per_em);
            let x_offset = scale_to_text_space(i64::from(pos.x_offset), units_per_em);
            run.width_units = run.width_units.saturating_add(advance);
            run.glyphs.push(ShapedGlyph {
                gid,
                text: cluster_text,
                advance,
                default_advance: i32::from(self.glyph_advance(gid)),
                x_offset,
            });
        }
        Ok(run)
    }

    /// Horizontal advance of a glyph in 1000-unit text space.
    pub(crate) fn glyph_advance(&self, gid: u16) -> u16 {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return 0;
        };
        let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
        let units = i64::from(face.units_per_em().max(1));
        let scaled = scale_to_text_space(i64::from(advance), units);
        scaled.clamp(0, i32::from(u16::MAX)) as u16
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
        let missing_width = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .map(|adv| (adv as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(500);

        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                units_per_em,
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

fn scale_to_text_space(value: i64, units_per_em: i64) -> i32 {
    let half = units_per_em / 2;
    let scaled = if value >= 0 {
        (value * 1000 + half) / units_per_em
    } else {
        (value * 1000 - half) / units_per_em
    };
    scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// PostScript name first, then full name, family, and finally the file stem.
fn font_name(face: &ttf_parser::Face<'_>, source_name: &str) -> String {
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

    let stem = Path::new(source_name)
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    post.or(full)
        .or(family)
        .or(stem)
        .unwrap_or_else(|| "EmbeddedFont".to_string())
}
