//! PDF text layer and embedded raster images.
use anyhow::{anyhow, bail, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::Cursor;
use tracing::{debug, warn};

/// An embedded image ready for OCR, or the reason it cannot be read.
#[derive(Debug)]
pub enum RasterImage {
    /// PNG or JPEG bytes.
    Encoded(Vec<u8>),
    Unreadable(String),
}

pub fn load(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| anyhow!("not a readable PDF: {e}"))
}

/// Per-page text in page order.
///
/// pdf-extract runs first (under `catch_unwind`, it panics on some fonts);
/// lopdf's own extraction is the fallback.
pub fn page_texts(doc: &Document, bytes: &[u8]) -> Vec<String> {
    let page_count = doc.get_pages().len();
    let extracted = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match extracted {
        Ok(Ok(pages)) if pages.len() == page_count => return pages,
        Ok(Ok(pages)) => warn!(got = pages.len(), expected = page_count, "pdf-extract page count mismatch, using lopdf"),
        Ok(Err(e)) => warn!(error = %e, "pdf-extract failed, using lopdf"),
        Err(_) => warn!("pdf-extract panicked, using lopdf"),
    }
    doc.get_pages()
        .keys()
        .map(|&n| {
            doc.extract_text(&[n]).unwrap_or_else(|e| {
                warn!(page = n, error = %e, "lopdf text extraction failed for page");
                String::new()
            })
        })
        .collect()
}

/// Every image XObject in object order, skipping those with a side below `min_side`.
pub fn raster_images(doc: &Document, min_side: u32) -> Vec<RasterImage> {
    let mut out = Vec::new();
    for (id, object) in &doc.objects {
        let Object::Stream(stream) = object else { continue };
        if !is_image(&stream.dict) {
            continue;
        }
        let width = dict_u32(doc, &stream.dict, b"Width").unwrap_or(0);
        let height = dict_u32(doc, &stream.dict, b"Height").unwrap_or(0);
        if width < min_side || height < min_side {
            debug!(object = ?id, width, height, "skipping small image");
            continue;
        }
        match encode(doc, stream, width, height) {
            Ok(bytes) => out.push(RasterImage::Encoded(bytes)),
            Err(e) => out.push(RasterImage::Unreadable(e.to_string())),
        }
    }
    out
}

fn is_image(dict: &Dictionary) -> bool {
    let subtype = dict.get(b"Subtype").and_then(Object::as_name).map(|n| n == b"Image").unwrap_or(false);
    let mask = dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false);
    subtype && !mask
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    doc.dereference(obj).map(|(_, o)| o).unwrap_or(obj)
}

fn dict_u32(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let obj = resolve(doc, dict.get(key).ok()?);
    obj.as_i64().ok().and_then(|v| u32::try_from(v).ok())
}

fn filters(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Ok(obj) = dict.get(b"Filter") else { return Vec::new() };
    match resolve(doc, obj) {
        Object::Name(n) => vec![n.clone()],
        Object::Array(items) => items.iter().filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec)).collect(),
        _ => Vec::new(),
    }
}

fn encode(doc: &Document, stream: &Stream, width: u32, height: u32) -> Result<Vec<u8>> {
    let filters = filters(doc, &stream.dict);
    let pixels = match filters.as_slice() {
        [f] if f.as_slice() == b"DCTDecode" => return Ok(stream.content.clone()),
        [] => stream.content.clone(),
        [f] if f.as_slice() == b"FlateDecode" => {
            stream.decompressed_content().map_err(|e| anyhow!("flate decode failed: {e}"))?
        }
        other => {
            let names: Vec<String> = other.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect();
            bail!("unsupported image encoding {}", names.join("+"));
        }
    };

    let bits = dict_u32(doc, &stream.dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        bail!("unsupported bits per component {bits}");
    }
    let space = stream
        .dict
        .get(b"ColorSpace")
        .map(|o| resolve(doc, o))
        .and_then(Object::as_name)
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    let expected = |channels: usize| width as usize * height as usize * channels;
    let image = match space.as_slice() {
        b"DeviceGray" => {
            let data = pixels.get(..expected(1)).ok_or_else(|| anyhow!("truncated gray image"))?.to_vec();
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        b"DeviceRGB" => {
            let data = pixels.get(..expected(3)).ok_or_else(|| anyhow!("truncated rgb image"))?.to_vec();
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        other => bail!("unsupported colour space '{}'", String::from_utf8_lossy(other)),
    }
    .ok_or_else(|| anyhow!("image buffer does not match {width}x{height}"))?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
