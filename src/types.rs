use serde::{Deserialize, Serialize};

/// Page dimensions in PDF points (1/72 in).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// The page used for raster templates when nothing else is configured:
    /// A4 turned sideways, rounded to whole points.
    pub fn a4_landscape() -> Self {
        Self {
            width: 842.0,
            height: 595.0,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl Default for Size {
    fn default() -> Self {
        Self::a4_landscape()
    }
}

/// Where the name is drawn: `x` is the horizontal center, `y` the baseline,
/// both measured from the bottom-left corner of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

impl Placement {
    pub const MIN_FONT_SIZE: f32 = 10.0;
    pub const MAX_FONT_SIZE: f32 = 120.0;

    pub fn font_size_in_range(&self) -> bool {
        (Self::MIN_FONT_SIZE..=Self::MAX_FONT_SIZE).contains(&self.font_size)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x: 421.0,
            y: 300.0,
            font_size: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub(crate) fn fill_operator(&self) -> String {
        format!("{} {} {} rg", fmt(self.r), fmt(self.g), fmt(self.b))
    }
}

/// Formats a number for a content stream with at most three decimals and no
/// trailing zeros, so identical inputs always produce identical bytes.
pub(crate) fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let milli = (value as f64 * 1000.0).round() as i64;
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    let whole = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        return format!("{sign}{whole}");
    }
    let frac = format!("{frac:03}");
    format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_trims_trailing_zeros() {
        assert_eq!(fmt(421.0), "421");
        assert_eq!(fmt(12.5), "12.5");
        assert_eq!(fmt(-0.125), "-0.125");
        assert_eq!(fmt(f32::NAN), "0");
    }

    #[test]
    fn placement_font_size_bounds() {
        let mut placement = Placement::default();
        assert!(placement.font_size_in_range());
        placement.font_size = 9.5;
        assert!(!placement.font_size_in_range());
        placement.font_size = 120.0;
        assert!(placement.font_size_in_range());
    }

    #[test]
    fn color_fill_operator() {
        assert_eq!(Color::BLACK.fill_operator(), "0 0 0 rg");
        assert_eq!(Color { r: 1.0, g: 0.5, b: 0.0 }.fill_operator(), "1 0.5 0 rg");
    }
}
