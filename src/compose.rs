use crate::error::BatchError;
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use serde::Serialize;
use sha2::{Digest, Sha256};

const OVERLAY_XOBJECT: &str = "NsOverlay";

/// One finished, personalized document ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateArtifact {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl CertificateArtifact {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let sha256 = sha256_hex(&bytes);
        Self {
            file_name: file_name.into(),
            bytes,
            sha256,
        }
    }
}

/// Merges an overlay page onto the first page of a template. Stateless; the
/// template buffer is parsed afresh on every call and never written to.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCompositor;

impl DocumentCompositor {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, template_pdf: &[u8], overlay_pdf: &[u8]) -> Result<Vec<u8>, BatchError> {
        let mut template = LoDocument::load_mem(template_pdf)?;
        let mut overlay = LoDocument::load_mem(overlay_pdf)?;
        if template.is_encrypted() {
            return Err(BatchError::format("template pdf is encrypted"));
        }
        if overlay.is_encrypted() {
            return Err(BatchError::format("overlay pdf is encrypted"));
        }

        let page_count = template.get_pages().len();
        if page_count == 0 {
            return Err(BatchError::format("template has no pages"));
        }
        if page_count > 1 {
            let extra: Vec<u32> = (2..=page_count as u32).collect();
            template.delete_pages(&extra);
        }
        let template_page_id = *template
            .get_pages()
            .values()
            .next()
            .ok_or_else(|| BatchError::format("template has no pages"))?;

        let start_id = template.max_id + 1;
        overlay.renumber_objects_with(start_id);
        let overlay_page_id = *overlay
            .get_pages()
            .values()
            .next()
            .ok_or_else(|| BatchError::format("overlay has no pages"))?;
        if overlay.max_id > template.max_id {
            template.max_id = overlay.max_id;
        }
        template.objects.extend(overlay.objects);

        let overlay_page = template
            .get_object(overlay_page_id)
            .and_then(LoObject::as_dict)?
            .clone();
        let overlay_content = template.get_page_content(overlay_page_id)?;
        let form_stream = LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "FormType" => 1,
                "BBox" => LoObject::Array(page_box(&template, &overlay_page)),
                "Resources" => inherited_resources(&template, &overlay_page),
            },
            overlay_content,
        );
        let form_id = template.add_object(form_stream);

        let page_dict = template
            .get_object(template_page_id)
            .and_then(LoObject::as_dict)?
            .clone();
        let mut resources = inherited_resources(&template, &page_dict);
        let mut xobjects = match resources.get(b"XObject") {
            Ok(obj) => resolve_dict(&template, obj),
            Err(_) => Dictionary::new(),
        };
        xobjects.set(OVERLAY_XOBJECT, LoObject::Reference(form_id));
        resources.set("XObject", LoObject::Dictionary(xobjects));

        // Bracket the template content so a leaked graphics state cannot
        // move or recolor the overlay.
        let mut contents: Vec<LoObject> = vec![LoObject::Reference(
            template.add_object(LoStream::new(dictionary! {}, b"q\n".to_vec())),
        )];
        contents.extend(
            template
                .get_page_contents(template_page_id)
                .into_iter()
                .map(LoObject::Reference),
        );
        let stamp = format!("\nQ\nq 1 0 0 1 0 0 cm /{OVERLAY_XOBJECT} Do Q\n").into_bytes();
        contents.push(LoObject::Reference(
            template.add_object(LoStream::new(dictionary! {}, stamp)),
        ));

        {
            let page_mut = template
                .get_object_mut(template_page_id)
                .and_then(LoObject::as_dict_mut)?;
            page_mut.set("Resources", LoObject::Dictionary(resources));
            page_mut.set("Contents", LoObject::Array(contents));
        }

        template.prune_objects();
        template.renumber_objects();
        template.compress();
        let mut out = Vec::new();
        template.save_to(&mut out)?;
        Ok(out)
    }
}

fn resolve_dict(doc: &LoDocument, obj: &LoObject) -> Dictionary {
    match obj {
        LoObject::Dictionary(d) => d.clone(),
        LoObject::Reference(id) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

/// The page's own Resources, else the nearest ancestor's.
fn inherited_resources(doc: &LoDocument, page: &Dictionary) -> Dictionary {
    let mut current = Some(page.clone());
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(obj) = dict.get(b"Resources") {
            return resolve_dict(doc, obj);
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .ok()
            .and_then(|obj| obj.as_reference().ok())
            .and_then(|id: LoObjectId| doc.get_object(id).ok())
            .and_then(|obj| obj.as_dict().ok().cloned());
    }
    Dictionary::new()
}

fn page_box(doc: &LoDocument, page: &Dictionary) -> Vec<LoObject> {
    match crate::pdfinspect::page_size(doc, page) {
        Some(size) => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
        None => vec![0.into(), 0.into(), 612.into(), 792.into()],
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayRenderer;
    use crate::shaper::TextShaper;
    use crate::testing::{template_pdf, tiny_font};
    use crate::types::{Placement, Size};

    fn overlay_for(name: &str) -> Vec<u8> {
        let renderer = OverlayRenderer::new(tiny_font());
        renderer
            .render(
                &TextShaper::new().shape(name),
                Size::a4_landscape(),
                Placement::default(),
            )
            .unwrap()
            .bytes
    }

    #[test]
    fn keeps_only_first_template_page() {
        let template = template_pdf(842, 595, 3);
        let out = DocumentCompositor::new()
            .compose(&template, &overlay_for("Aya"))
            .unwrap();
        let doc = LoDocument::load_mem(&out).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();
        let content = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();
        assert!(content.contains("Background 1"));
        assert!(content.ends_with("/NsOverlay Do Q\n"));
    }

    #[test]
    fn template_buffer_is_left_untouched() {
        let template = template_pdf(842, 595, 2);
        let before = template.clone();
        let overlay = overlay_for("Aya");
        let compositor = DocumentCompositor::new();
        compositor.compose(&template, &overlay).unwrap();
        compositor.compose(&template, &overlay).unwrap();
        assert_eq!(template, before);
    }

    #[test]
    fn same_inputs_give_identical_bytes() {
        let template = template_pdf(842, 595, 1);
        let compositor = DocumentCompositor::new();
        let a = compositor.compose(&template, &overlay_for("محمد")).unwrap();
        let b = compositor.compose(&template, &overlay_for("محمد")).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            CertificateArtifact::new("a.pdf", a).sha256,
            CertificateArtifact::new("b.pdf", b).sha256
        );
    }

    #[test]
    fn zero_page_template_is_a_format_error() {
        let template = template_pdf(842, 595, 0);
        let err = DocumentCompositor::new()
            .compose(&template, &overlay_for("Aya"))
            .unwrap_err();
        assert!(matches!(err, BatchError::Format(_)));
    }

    #[test]
    fn corrupt_overlay_is_a_format_error() {
        let template = template_pdf(842, 595, 1);
        let err = DocumentCompositor::new()
            .compose(&template, b"not a pdf")
            .unwrap_err();
        assert!(matches!(err, BatchError::Format(_)));
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        let artifact = CertificateArtifact::new("x.pdf", b"abc".to_vec());
        assert_eq!(
            artifact.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
