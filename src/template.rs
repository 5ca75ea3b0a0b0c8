use crate::error::BatchError;
use crate::pdfinspect::{inspect_pdf_bytes, require_pdf_composition_compatibility, PdfInspectErrorCode};
use crate::types::{Size, fmt};
use image::GenericImageView;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Page size assumed when a PDF template declares no usable page box.
const FALLBACK_PAGE: Size = Size {
    width: 612.0,
    height: 792.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Pdf,
    Image,
}

/// The background every certificate is stamped onto. Always held as PDF
/// bytes; raster templates are converted once when loaded. The buffer is
/// shared and never modified after construction.
#[derive(Debug, Clone)]
pub struct Template {
    bytes: Arc<[u8]>,
    page_size: Size,
    kind: TemplateKind,
}

impl Template {
    /// Reads a template file. A missing file is a configuration error.
    pub fn load(path: &Path, raster_page: Size) -> Result<Self, BatchError> {
        if !path.is_file() {
            return Err(BatchError::configuration(format!(
                "template {} not found",
                path.display()
            )));
        }
        let bytes = std::fs::read(path).map_err(|err| {
            BatchError::configuration(format!("template {} unreadable: {err}", path.display()))
        })?;
        Self::from_bytes(bytes, raster_page)
    }

    /// Detects PDF by its header; anything else must be a PNG or JPEG image.
    pub fn from_bytes(bytes: Vec<u8>, raster_page: Size) -> Result<Self, BatchError> {
        if bytes.is_empty() {
            return Err(BatchError::configuration("template is empty"));
        }
        if is_pdf(&bytes) {
            Self::from_pdf(bytes)
        } else {
            Self::from_image(&bytes, raster_page)
        }
    }

    pub fn from_pdf(bytes: Vec<u8>) -> Result<Self, BatchError> {
        let report = inspect_pdf_bytes(&bytes)?;
        if let Err(err) = require_pdf_composition_compatibility(&report) {
            if err.code != PdfInspectErrorCode::PdfEmptyOrNoPages {
                return Err(err.into());
            }
            warn!("template pdf has no pages; every record will fail to compose");
        }
        let page_size = report.first_page_size.unwrap_or(FALLBACK_PAGE);
        debug!(
            pages = report.page_count,
            width = page_size.width,
            height = page_size.height,
            "loaded pdf template"
        );
        Ok(Self {
            bytes: Arc::from(bytes),
            page_size,
            kind: TemplateKind::Pdf,
        })
    }

    /// Wraps a PNG or JPEG in a one-page PDF with the image stretched over
    /// the whole page.
    pub fn from_image(data: &[u8], page: Size) -> Result<Self, BatchError> {
        if !page.is_positive() {
            return Err(BatchError::configuration("raster page size must be positive"));
        }
        let image = RasterImage::decode(data)?;
        let bytes = image_page_pdf(&image, page)?;
        debug!(
            width = image.width,
            height = image.height,
            "converted raster template to pdf"
        );
        Ok(Self {
            bytes: Arc::from(bytes),
            page_size: page,
            kind: TemplateKind::Image,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }
}

fn is_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|w| w == b"%PDF-")
}

struct RasterImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: Option<&'static str>,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl RasterImage {
    fn decode(data: &[u8]) -> Result<Self, BatchError> {
        let format = image::guess_format(data).map_err(|err| {
            BatchError::configuration(format!("template is neither pdf nor a known image: {err}"))
        })?;
        let decoded = image::load_from_memory(data)
            .map_err(|err| BatchError::configuration(format!("template image unreadable: {err}")))?;
        let (width, height) = decoded.dimensions();

        if matches!(format, image::ImageFormat::Jpeg) {
            let color_space = match decoded.color() {
                image::ColorType::L8 | image::ColorType::La8 => "DeviceGray",
                _ => "DeviceRGB",
            };
            return Ok(Self {
                width,
                height,
                color_space,
                filter: Some("DCTDecode"),
                data: data.to_vec(),
                alpha: None,
            });
        }

        let rgba = decoded.to_rgba8();
        let pixels = pixel_count(width, height);
        let mut rgb = Vec::with_capacity(pixels.saturating_mul(3));
        let mut alpha = Vec::with_capacity(pixels);
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        Ok(Self {
            width,
            height,
            color_space: "DeviceRGB",
            filter: None,
            data: rgb,
            alpha: has_alpha.then_some(alpha),
        })
    }
}

fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}

fn image_page_pdf(image: &RasterImage, page: Size) -> Result<Vec<u8>, BatchError> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();

    let smask_id = image.alpha.as_ref().map(|alpha| {
        doc.add_object(LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha.clone(),
        ))
    });

    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(image.width),
        "Height" => i64::from(image.height),
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
    };
    if let Some(filter) = image.filter {
        image_dict.set("Filter", filter);
    }
    if let Some(id) = smask_id {
        image_dict.set("SMask", LoObject::Reference(id));
    }
    let mut image_stream = LoStream::new(image_dict, image.data.clone());
    if image.filter.is_some() {
        image_stream = image_stream.with_compression(false);
    }
    let image_id = doc.add_object(image_stream);

    let content = format!(
        "q {} 0 0 {} 0 0 cm /Bg Do Q\n",
        fmt(page.width),
        fmt(page.height)
    );
    let content_id = doc.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page.width.into(), page.height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Bg" => image_id },
        },
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
