use crate::error::BatchError;
use crate::types::Size;
use lopdf::{Document as LoDocument, Object as LoObject};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfEmptyOrNoPages,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

impl From<PdfInspectError> for BatchError {
    fn from(value: PdfInspectError) -> Self {
        BatchError::Format(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// CropBox, else MediaBox, of the first page.
    pub first_page_size: Option<Size>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;
    let pages = pdf.get_pages();
    let first_page_size = pages
        .values()
        .next()
        .and_then(|id| pdf.get_object(*id).ok())
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|page| page_size(&pdf, page));

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        first_page_size,
    })
}

pub fn composition_compatibility_issues(report: &PdfInspectReport) -> Vec<PdfInspectErrorCode> {
    let mut issues = Vec::new();
    if report.encrypted {
        issues.push(PdfInspectErrorCode::PdfEncryptedUnsupported);
    }
    if report.page_count == 0 {
        issues.push(PdfInspectErrorCode::PdfEmptyOrNoPages);
    }
    issues
}

pub fn require_pdf_composition_compatibility(
    report: &PdfInspectReport,
) -> Result<(), PdfInspectError> {
    match composition_compatibility_issues(report).into_iter().next() {
        Some(PdfInspectErrorCode::PdfEncryptedUnsupported) => Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "encrypted pdf templates are not supported".to_string(),
        }),
        Some(PdfInspectErrorCode::PdfEmptyOrNoPages) => Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEmptyOrNoPages,
            message: "pdf has no pages".to_string(),
        }),
        Some(PdfInspectErrorCode::PdfParseFailed) | None => Ok(()),
    }
}

/// Page size from the box entries of a page dictionary, following the
/// page tree for inherited boxes.
pub(crate) fn page_size(doc: &LoDocument, page: &lopdf::Dictionary) -> Option<Size> {
    let mut current = Some(page.clone());
    let mut depth = 0;
    while let Some(dict) = current {
        for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
            if let Some(size) = dict
                .get(key)
                .ok()
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok().cloned())
                .and_then(|arr| box_size(&arr))
            {
                return Some(size);
            }
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok().cloned());
    }
    None
}

fn resolve<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> Option<&'a LoObject> {
    match obj {
        LoObject::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn box_size(arr: &[LoObject]) -> Option<Size> {
    if arr.len() != 4 {
        return None;
    }
    let mut nums = [0f32; 4];
    for (slot, obj) in nums.iter_mut().zip(arr) {
        *slot = match obj {
            LoObject::Integer(v) => *v as f32,
            LoObject::Real(v) => *v,
            _ => return None,
        };
    }
    let size = Size::new((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
    size.is_positive().then_some(size)
}
