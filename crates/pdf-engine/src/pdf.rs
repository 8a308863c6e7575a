use crate::{
    clip_bounds, ensure_renderable, DocumentBackend, DocumentLoader, EngineError, OpenSource,
    PageSize, RenderRequest, RgbaImage,
};
use image::{imageops, Rgba};
use lopdf::{Dictionary, Document, Object};
use pageturn_model::Rotation;
use std::fs;
use std::path::Path;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const PAGE_FRAME: Rgba<u8> = Rgba([220, 220, 220, 255]);
const LINK_FRAME: Rgba<u8> = Rgba([0, 0, 255, 255]);

// Page tree depth beyond which inherited attributes are no longer looked up.
const MAX_INHERITANCE_DEPTH: usize = 8;

/// Link annotation rectangle in points, relative to the media box origin.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LinkRect {
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
}

#[derive(Debug, Clone)]
struct PageInfo {
    size: PageSize,
    links: Vec<LinkRect>,
}

/// PDF backend on top of lopdf. Pages are rasterised as blank paper with
/// optional page and link decorations; text comes from the content streams.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    bytes: Vec<u8>,
    document: Document,
    pages: Vec<PageInfo>,
}

impl PdfDocument {
    pub fn open(source: OpenSource) -> Result<Self, EngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(EngineError::EncryptedUnsupported);
        }

        let document = Document::load_mem(&bytes)?;
        let pages = Self::parse_pages(&document)?;

        Ok(Self { bytes, document, pages })
    }

    fn parse_pages(document: &Document) -> Result<Vec<PageInfo>, EngineError> {
        let page_ids = document.get_pages();
        let mut pages = Vec::with_capacity(page_ids.len());

        for (_, object_id) in page_ids {
            let dict = document.get_dictionary(object_id)?;
            let (x0, y0, x1, y1) = inherited(document, dict, b"MediaBox")
                .and_then(|object| rect(document, object))
                .unwrap_or((0.0, 0.0, 612.0, 792.0));

            let links = dict
                .get(b"Annots")
                .ok()
                .and_then(|annots| resolve(document, annots))
                .and_then(|annots| annots.as_array().ok())
                .map(|annots| {
                    annots
                        .iter()
                        .filter_map(|annot| link_rect(document, annot))
                        .map(|(left, bottom, right, top)| LinkRect {
                            left: left - x0,
                            bottom: bottom - y0,
                            right: right - x0,
                            top: top - y0,
                        })
                        .collect()
                })
                .unwrap_or_default();

            let size = PageSize { width_pt: x1 - x0, height_pt: y1 - y0 };
            pages.push(PageInfo { size, links });
        }

        if pages.is_empty() {
            return Err(EngineError::Backend("document has no pages".to_owned()));
        }

        Ok(pages)
    }

    fn page_info(&self, page_index: u32) -> Result<&PageInfo, EngineError> {
        self.pages.get(page_index as usize).ok_or(EngineError::PageOutOfRange {
            page: page_index,
            page_count: self.pages.len() as u32,
        })
    }
}

impl DocumentBackend for PdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, EngineError> {
        Ok(self.page_info(page_index)?.size)
    }

    fn render(&self, request: &RenderRequest) -> Result<RgbaImage, EngineError> {
        let page = self.page_info(request.page_index)?;
        let (width, height) = request.unrotated_pixel_size(page.size);
        ensure_renderable(width, height)?;
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if request.decorate_links {
            let scale_x = width as f32 / page.size.width_pt;
            let scale_y = height as f32 / page.size.height_pt;

            for link in &page.links {
                stroke_rect(
                    &mut image,
                    link.left * scale_x,
                    (page.size.height_pt - link.top) * scale_y,
                    link.right * scale_x,
                    (page.size.height_pt - link.bottom) * scale_y,
                    LINK_FRAME,
                );
            }
        }

        if request.decorate_page && width >= 4 && height >= 4 {
            stroke_rect(&mut image, 0.0, 0.0, (width - 1) as f32, (height - 1) as f32, PAGE_FRAME);
        }

        let image = match request.rotation {
            Rotation::RotateBy0 => image,
            Rotation::RotateBy90 => imageops::rotate90(&image),
            Rotation::RotateBy180 => imageops::rotate180(&image),
            Rotation::RotateBy270 => imageops::rotate270(&image),
        };

        match request.clip {
            None => Ok(image),
            Some(clip) => {
                let (x, y, w, h) =
                    clip_bounds(clip, image.width(), image.height()).ok_or(EngineError::EmptyClip)?;
                Ok(imageops::crop_imm(&image, x, y, w, h).to_image())
            }
        }
    }

    fn page_text(&self, page_index: u32) -> Result<String, EngineError> {
        self.page_info(page_index)?;
        Ok(self.document.extract_text(&[page_index + 1])?)
    }

    fn can_save(&self) -> bool {
        true
    }

    fn save(&self, path: &Path, with_changes: bool) -> Result<(), EngineError> {
        if !with_changes {
            fs::write(path, &self.bytes)?;
            return Ok(());
        }

        let mut document = self.document.clone();
        let mut file = fs::File::create(path)?;
        document.save_to(&mut file)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<Box<dyn DocumentBackend>, EngineError> {
        let document = PdfDocument::open(OpenSource::from(path))?;
        tracing::debug!(path = %path.display(), pages = document.page_count(), "opened PDF");
        Ok(Box::new(document))
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn inherited<'a>(
    document: &'a Document,
    mut dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return resolve(document, value);
        }

        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = document.get_dictionary(parent).ok()?;
    }

    None
}

/// Normalised `(x0, y0, x1, y1)` of a PDF rectangle array.
fn rect(document: &Document, object: &Object) -> Option<(f32, f32, f32, f32)> {
    let array = object.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0f32; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = resolve(document, item)?.as_float().ok()?;
    }

    let [ax, ay, bx, by] = values;
    let (x0, x1) = (ax.min(bx), ax.max(bx));
    let (y0, y1) = (ay.min(by), ay.max(by));
    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
        return None;
    }

    Some((x0, y0, x1, y1))
}

fn link_rect(document: &Document, annot: &Object) -> Option<(f32, f32, f32, f32)> {
    let dict = resolve(document, annot)?.as_dict().ok()?;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Link" {
        return None;
    }

    rect(document, resolve(document, dict.get(b"Rect").ok()?)?)
}

fn stroke_rect(image: &mut RgbaImage, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let clamp_x = |x: f32| (x.round().max(0.0) as u32).min(width - 1);
    let clamp_y = |y: f32| (y.round().max(0.0) as u32).min(height - 1);
    let (left, right) = (clamp_x(x0.min(x1)), clamp_x(x0.max(x1)));
    let (top, bottom) = (clamp_y(y0.min(y1)), clamp_y(y0.max(y1)));

    for x in left..=right {
        image.put_pixel(x, top, color);
        image.put_pixel(x, bottom, color);
    }
    for y in top..=bottom {
        image.put_pixel(left, y, color);
        image.put_pixel(right, y, color);
    }
}
