//! Contextual reshaping and bidi reordering of recipient names.
//!
//! The overlay renderer lays glyphs out strictly left to right, so right-to-left
//! and cursive text has to arrive in visual order with its joining forms
//! already chosen. Arabic letters are mapped onto their presentation forms
//! (U+FB50..U+FEFF), then the Unicode Bidirectional Algorithm reorders each
//! paragraph. The result is wrapped in an LRO/PDF pair so that the string
//! carries its own display order.

use std::fmt;
use tracing::warn;
use unicode_bidi::BidiInfo;

const LRO: char = '\u{202D}';
const PDF: char = '\u{202C}';
const LAM: char = '\u{0644}';

/// A name ready for a renderer with no bidi awareness.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DisplayText {
    text: String,
}

impl DisplayText {
    /// The display string, including the direction envelope when present.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Characters in draw order with bidi formatting controls removed.
    pub fn glyph_text(&self) -> String {
        self.text.chars().filter(|ch| !is_bidi_control(*ch)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.text
            .chars()
            .all(|ch| ch.is_whitespace() || is_bidi_control(ch))
    }

    /// True when the text is explicitly in visual order.
    pub fn is_visually_ordered(&self) -> bool {
        has_visual_envelope(&self.text)
    }
}

impl fmt::Display for DisplayText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextShaper {
    reshape_arabic: bool,
}

impl Default for TextShaper {
    fn default() -> Self {
        Self {
            reshape_arabic: true,
        }
    }
}

impl TextShaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reorders only; joining forms are left to the font.
    pub fn without_reshaping() -> Self {
        Self {
            reshape_arabic: false,
        }
    }

    /// Never fails: anything that cannot be reordered is passed through as
    /// the raw string.
    pub fn shape(&self, name: &str) -> DisplayText {
        if name.is_empty() {
            return DisplayText::default();
        }
        if has_visual_envelope(name) {
            return DisplayText {
                text: name.to_string(),
            };
        }
        let single_line: String = name
            .chars()
            .map(|ch| if matches!(ch, '\n' | '\r') { ' ' } else { ch })
            .collect();
        let reshaped = if self.reshape_arabic {
            reshape_arabic(&single_line)
        } else {
            single_line
        };

        let info = BidiInfo::new(&reshaped, None);
        if !info.has_rtl() {
            return DisplayText { text: reshaped };
        }
        let mut visual = String::with_capacity(reshaped.len() + 6);
        visual.push(LRO);
        for para in &info.paragraphs {
            visual.push_str(&info.reorder_line(para, para.range.clone()));
        }
        visual.push(PDF);

        if visual.chars().count() != reshaped.chars().count() + 2 {
            warn!(raw = name, "bidi reordering changed the character count; using raw text");
            return DisplayText {
                text: name.to_string(),
            };
        }
        DisplayText { text: visual }
    }
}

fn has_visual_envelope(text: &str) -> bool {
    text.starts_with(LRO) && text.ends_with(PDF) && text.len() >= LRO.len_utf8() + PDF.len_utf8()
}

pub(crate) fn is_bidi_control(ch: char) -> bool {
    matches!(
        ch,
        '\u{200E}' | '\u{200F}' | '\u{061C}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}'
    )
}

/// Presentation forms: isolated, final, initial, medial. Zero means the
/// letter has no such form.
const ARABIC_FORMS: &[(u32, [u32; 4])] = &[
    (0x0621, [0xFE80, 0, 0, 0]),
    (0x0622, [0xFE81, 0xFE82, 0, 0]),
    (0x0623, [0xFE83, 0xFE84, 0, 0]),
    (0x0624, [0xFE85, 0xFE86, 0, 0]),
    (0x0625, [0xFE87, 0xFE88, 0, 0]),
    (0x0626, [0xFE89, 0xFE8A, 0xFE8B, 0xFE8C]),
    (0x0627, [0xFE8D, 0xFE8E, 0, 0]),
    (0x0628, [0xFE8F, 0xFE90, 0xFE91, 0xFE92]),
    (0x0629, [0xFE93, 0xFE94, 0, 0]),
    (0x062A, [0xFE95, 0xFE96, 0xFE97, 0xFE98]),
    (0x062B, [0xFE99, 0xFE9A, 0xFE9B, 0xFE9C]),
    (0x062C, [0xFE9D, 0xFE9E, 0xFE9F, 0xFEA0]),
    (0x062D, [0xFEA1, 0xFEA2, 0xFEA3, 0xFEA4]),
    (0x062E, [0xFEA5, 0xFEA6, 0xFEA7, 0xFEA8]),
    (0x062F, [0xFEA9, 0xFEAA, 0, 0]),
    (0x0630, [0xFEAB, 0xFEAC, 0, 0]),
    (0x0631, [0xFEAD, 0xFEAE, 0, 0]),
    (0x0632, [0xFEAF, 0xFEB0, 0, 0]),
    (0x0633, [0xFEB1, 0xFEB2, 0xFEB3, 0xFEB4]),
    (0x0634, [0xFEB5, 0xFEB6, 0xFEB7, 0xFEB8]),
    (0x0635, [0xFEB9, 0xFEBA, 0xFEBB, 0xFEBC]),
    (0x0636, [0xFEBD, 0xFEBE, 0xFEBF, 0xFEC0]),
    (0x0637, [0xFEC1, 0xFEC2, 0xFEC3, 0xFEC4]),
    (0x0638, [0xFEC5, 0xFEC6, 0xFEC7, 0xFEC8]),
    (0x0639, [0xFEC9, 0xFECA, 0xFECB, 0xFECC]),
    (0x063A, [0xFECD, 0xFECE, 0xFECF, 0xFED0]),
    (0x0640, [0x0640, 0x0640, 0x0640, 0x0640]),
    (0x0641, [0xFED1, 0xFED2, 0xFED3, 0xFED4]),
    (0x0642, [0xFED5, 0xFED6, 0xFED7, 0xFED8]),
    (0x0643, [0xFED9, 0xFEDA, 0xFEDB, 0xFEDC]),
    (0x0644, [0xFEDD, 0xFEDE, 0xFEDF, 0xFEE0]),
    (0x0645, [0xFEE1, 0xFEE2, 0xFEE3, 0xFEE4]),
    (0x0646, [0xFEE5, 0xFEE6, 0xFEE7, 0xFEE8]),
    (0x0647, [0xFEE9, 0xFEEA, 0xFEEB, 0xFEEC]),
    (0x0648, [0xFEED, 0xFEEE, 0, 0]),
    (0x0649, [0xFEEF, 0xFEF0, 0, 0]),
    (0x064A, [0xFEF1, 0xFEF2, 0xFEF3, 0xFEF4]),
    (0x0671, [0xFB50, 0xFB51, 0, 0]),
    (0x0679, [0xFB66, 0xFB67, 0xFB68, 0xFB69]),
    (0x067A, [0xFB5E, 0xFB5F, 0xFB60, 0xFB61]),
    (0x067B, [0xFB52, 0xFB53, 0xFB54, 0xFB55]),
    (0x067E, [0xFB56, 0xFB57, 0xFB58, 0xFB59]),
    (0x067F, [0xFB62, 0xFB63, 0xFB64, 0xFB65]),
    (0x0680, [0xFB5A, 0xFB5B, 0xFB5C, 0xFB5D]),
    (0x0683, [0xFB76, 0xFB77, 0xFB78, 0xFB79]),
    (0x0684, [0xFB72, 0xFB73, 0xFB74, 0xFB75]),
    (0x0686, [0xFB7A, 0xFB7B, 0xFB7C, 0xFB7D]),
    (0x0687, [0xFB7E, 0xFB7F, 0xFB80, 0xFB81]),
    (0x0688, [0xFB88, 0xFB89, 0, 0]),
    (0x068C, [0xFB84, 0xFB85, 0, 0]),
    (0x068D, [0xFB82, 0xFB83, 0, 0]),
    (0x068E, [0xFB86, 0xFB87, 0, 0]),
    (0x0691, [0xFB8C, 0xFB8D, 0, 0]),
    (0x0698, [0xFB8A, 0xFB8B, 0, 0]),
    (0x06A4, [0xFB6A, 0xFB6B, 0xFB6C, 0xFB6D]),
    (0x06A6, [0xFB6E, 0xFB6F, 0xFB70, 0xFB71]),
    (0x06A9, [0xFB8E, 0xFB8F, 0xFB90, 0xFB91]),
    (0x06AD, [0xFBD3, 0xFBD4, 0xFBD5, 0xFBD6]),
    (0x06AF, [0xFB92, 0xFB93, 0xFB94, 0xFB95]),
    (0x06B1, [0xFB9A, 0xFB9B, 0xFB9C, 0xFB9D]),
    (0x06B3, [0xFB96, 0xFB97, 0xFB98, 0xFB99]),
    (0x06BA, [0xFB9E, 0xFB9F, 0, 0]),
    (0x06BB, [0xFBA0, 0xFBA1, 0xFBA2, 0xFBA3]),
    (0x06BE, [0xFBAA, 0xFBAB, 0xFBAC, 0xFBAD]),
    (0x06C0, [0xFBA4, 0xFBA5, 0, 0]),
    (0x06C1, [0xFBA6, 0xFBA7, 0xFBA8, 0xFBA9]),
    (0x06C5, [0xFBE0, 0xFBE1, 0, 0]),
    (0x06C6, [0xFBD9, 0xFBDA, 0, 0]),
    (0x06C7, [0xFBD7, 0xFBD8, 0, 0]),
    (0x06C8, [0xFBDB, 0xFBDC, 0, 0]),
    (0x06C9, [0xFBE2, 0xFBE3, 0, 0]),
    (0x06CB, [0xFBDE, 0xFBDF, 0, 0]),
    (0x06CC, [0xFBFC, 0xFBFD, 0xFBFE, 0xFBFF]),
    (0x06D0, [0xFBE4, 0xFBE5, 0xFBE6, 0xFBE7]),
    (0x06D2, [0xFBAE, 0xFBAF, 0, 0]),
    (0x06D3, [0xFBB0, 0xFBB1, 0, 0]),
];

/// Lam followed by one of these alefs becomes a single ligature
/// (isolated, final).
const LAM_ALEF: &[(u32, [u32; 2])] = &[
    (0x0622, [0xFEF5, 0xFEF6]),
    (0x0623, [0xFEF7, 0xFEF8]),
    (0x0625, [0xFEF9, 0xFEFA]),
    (0x0627, [0xFEFB, 0xFEFC]),
];

#[derive(Debug, Clone, Copy)]
struct Forms {
    isolated: char,
    fin: Option<char>,
    initial: Option<char>,
    medial: Option<char>,
}

impl Forms {
    fn joins_forward(&self) -> bool {
        self.initial.is_some()
    }

    fn joins_backward(&self) -> bool {
        self.fin.is_some()
    }
}

fn forms_for(ch: char) -> Option<Forms> {
    let code = ch as u32;
    let idx = ARABIC_FORMS
        .binary_search_by_key(&code, |(base, _)| *base)
        .ok()?;
    let [isolated, fin, initial, medial] = ARABIC_FORMS[idx].1;
    let opt = |value: u32| if value == 0 { None } else { char::from_u32(value) };
    Some(Forms {
        isolated: char::from_u32(isolated)?,
        fin: opt(fin),
        initial: opt(initial),
        medial: opt(medial),
    })
}

fn lam_alef_for(alef: char) -> Option<(char, char)> {
    let code = alef as u32;
    LAM_ALEF
        .iter()
        .find(|(base, _)| *base == code)
        .and_then(|(_, [isolated, fin])| Some((char::from_u32(*isolated)?, char::from_u32(*fin)?)))
}

fn is_transparent(ch: char) -> bool {
    matches!(
        ch as u32,
        0x0610..=0x061A
            | 0x064B..=0x065F
            | 0x0670
            | 0x06D6..=0x06DC
            | 0x06DF..=0x06E4
            | 0x06E7..=0x06E8
            | 0x06EA..=0x06ED
    )
}

fn prev_letter(chars: &[char], idx: usize) -> Option<char> {
    chars[..idx]
        .iter()
        .rev()
        .copied()
        .find(|ch| !is_transparent(*ch))
}

fn next_letter(chars: &[char], idx: usize) -> Option<(usize, char)> {
    chars
        .iter()
        .copied()
        .enumerate()
        .skip(idx + 1)
        .find(|(_, ch)| !is_transparent(*ch))
}

/// Replaces Arabic letters with the presentation form their neighbours call
/// for. Characters outside the tables are copied through untouched.
pub(crate) fn reshape_arabic(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut idx = 0;
    while idx < chars.len() {
        let ch = chars[idx];
        let Some(forms) = forms_for(ch) else {
            out.push(ch);
            idx += 1;
            continue;
        };
        let joins_prev = forms.joins_backward()
            && prev_letter(&chars, idx)
                .and_then(forms_for)
                .is_some_and(|prev| prev.joins_forward());
        let next = next_letter(&chars, idx);

        if ch == LAM {
            if let Some((next_idx, ligature)) =
                next.and_then(|(i, alef)| lam_alef_for(alef).map(|lig| (i, lig)))
            {
                out.push(if joins_prev { ligature.1 } else { ligature.0 });
                out.extend(&chars[idx + 1..next_idx]);
                idx = next_idx + 1;
                continue;
            }
        }

        let joins_next = forms.joins_forward()
            && next
                .and_then(|(_, next_ch)| forms_for(next_ch))
                .is_some_and(|next| next.joins_backward());
        let shaped = match (joins_prev, joins_next) {
            (true, true) => forms.medial.or(forms.fin).unwrap_or(forms.isolated),
            (true, false) => forms.fin.unwrap_or(forms.isolated),
            (false, true) => forms.initial.unwrap_or(forms.isolated),
            (false, false) => forms.isolated,
        };
        out.push(shaped);
        idx += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MUHAMMAD: &str = "محمد";
    const MUHAMMAD_VISUAL: &str = "\u{FEAA}\u{FEE4}\u{FEA4}\u{FEE3}";

    #[test]
    fn forms_table_is_sorted() {
        assert!(ARABIC_FORMS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn empty_input_yields_empty_display_text() {
        let shaped = TextShaper::new().shape("");
        assert!(shaped.is_empty());
        assert_eq!(shaped.glyph_text(), "");
    }

    #[test]
    fn latin_passes_through_without_envelope() {
        let shaped = TextShaper::new().shape("Aya Haddad");
        assert_eq!(shaped.as_str(), "Aya Haddad");
        assert!(!shaped.is_visually_ordered());
    }

    #[test]
    fn whitespace_only_is_blank_not_an_error() {
        let shaped = TextShaper::new().shape("   ");
        assert!(shaped.is_blank());
    }

    #[test]
    fn arabic_is_joined_and_reversed() {
        let shaped = TextShaper::new().shape(MUHAMMAD);
        assert!(shaped.is_visually_ordered());
        assert_eq!(shaped.glyph_text(), MUHAMMAD_VISUAL);
    }

    #[test]
    fn lam_alef_becomes_ligature() {
        assert_eq!(reshape_arabic("لا"), "\u{FEFB}");
        assert_eq!(reshape_arabic("سلام"), "\u{FEB3}\u{FEFC}\u{FEE1}");
    }

    #[test]
    fn harakat_do_not_break_joining() {
        // beh + fatha + teh
        let reshaped = reshape_arabic("\u{0628}\u{064E}\u{062A}");
        assert_eq!(reshaped, "\u{FE91}\u{064E}\u{FE96}");
    }

    #[test]
    fn urdu_letters_take_contextual_forms() {
        // beh + yeh barree
        assert_eq!(reshape_arabic("\u{0628}\u{06D2}"), "\u{FE91}\u{FBAF}");
        // teh + heh doachashmee + beh
        assert_eq!(
            reshape_arabic("\u{062A}\u{06BE}\u{0628}"),
            "\u{FE97}\u{FBAD}\u{FE90}"
        );
        // tteh + ddal, then rreh after a break
        assert_eq!(
            reshape_arabic("\u{0679}\u{0688}\u{0691}"),
            "\u{FB68}\u{FB89}\u{FB8C}"
        );
        // heh goal + noon ghunna
        assert_eq!(reshape_arabic("\u{06C1}\u{06BA}"), "\u{FBA8}\u{FB9F}");
    }

    #[test]
    fn alef_wasla_joins_backward_only() {
        assert_eq!(reshape_arabic("\u{0628}\u{0671}"), "\u{FE91}\u{FB51}");
        assert_eq!(reshape_arabic("\u{0671}\u{0628}"), "\u{FB50}\u{FE8F}");
        assert_eq!(reshape_arabic("\u{06C0}"), "\u{FBA4}");
    }

    #[test]
    fn right_joining_letter_breaks_the_chain() {
        // dal never joins forward, so the following beh starts a new shape
        assert_eq!(reshape_arabic("دب"), "\u{FEA9}\u{FE8F}");
    }

    #[test]
    fn mixed_direction_in_either_base_order() {
        let expected = format!("Aya {MUHAMMAD_VISUAL}");
        let ltr_first = TextShaper::new().shape(&format!("Aya {MUHAMMAD}"));
        assert_eq!(ltr_first.glyph_text(), expected);
        let rtl_first = TextShaper::new().shape(&format!("{MUHAMMAD} Aya"));
        assert_eq!(rtl_first.glyph_text(), expected);
    }

    #[test]
    fn shaping_is_idempotent() {
        let shaper = TextShaper::new();
        for name in [MUHAMMAD, "Aya", "Aya محمد", "سلام عليكم", ""] {
            let once = shaper.shape(name);
            let twice = shaper.shape(once.as_str());
            assert_eq!(once.glyph_text(), twice.glyph_text(), "{name}");
        }
    }

    #[test]
    fn reorder_without_reshaping_keeps_base_letters() {
        let shaped = TextShaper::without_reshaping().shape(MUHAMMAD);
        assert_eq!(shaped.glyph_text(), "دمحم");
    }

    #[test]
    fn control_characters_are_stripped_from_glyph_text() {
        let shaped = TextShaper::new().shape("\u{200F}Aya");
        assert_eq!(shaped.glyph_text(), "Aya");
    }
}
