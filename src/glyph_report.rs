use serde::Serialize;
use std::collections::BTreeMap;

/// Characters the batch font had no glyph for, with how often they occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlyphCoverageReport {
    missing: BTreeMap<u32, MissingGlyph>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingGlyph {
    pub codepoint: u32,
    pub ch: char,
    pub count: usize,
}

impl GlyphCoverageReport {
    pub fn record_missing(&mut self, ch: char) {
        let codepoint = ch as u32;
        let entry = self.missing.entry(codepoint).or_insert(MissingGlyph {
            codepoint,
            ch,
            count: 0,
        });
        entry.count = entry.count.saturating_add(1);
    }

    pub fn merge(&mut self, other: GlyphCoverageReport) {
        for (codepoint, missing) in other.missing {
            let entry = self.missing.entry(codepoint).or_insert(MissingGlyph {
                codepoint,
                ch: missing.ch,
                count: 0,
            });
            entry.count = entry.count.saturating_add(missing.count);
        }
    }

    pub fn missing(&self) -> Vec<MissingGlyph> {
        self.missing.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }

    /// `U+XXXX` list for log lines.
    pub fn summary(&self) -> String {
        self.missing
            .keys()
            .map(|code| format!("U+{code:04X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_counts() {
        let mut a = GlyphCoverageReport::default();
        a.record_missing('\u{0634}');
        a.record_missing('\u{0634}');
        let mut b = GlyphCoverageReport::default();
        b.record_missing('\u{0634}');
        b.record_missing('\u{4E2D}');
        a.merge(b);

        let missing = a.missing();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].count, 3);
        assert_eq!(a.summary(), "U+0634 U+4E2D");
    }
}
