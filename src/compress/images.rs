//! In-process recompression of embedded images.
//!
//! Image XObjects are decoded, downscaled so the longer side fits `max_dim`,
//! and re-encoded as JPEG. Soft masks survive as a separate Flate-compressed
//! gray channel. Everything else in the document is left alone apart from
//! stream compression on save.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView};
use lopdf::{Document, Object, ObjectId, Stream};

use crate::error::CompressError;

use super::{check_output, discard, Compressor};

#[derive(Debug, Clone, Copy)]
pub struct ImageRecompressor {
    quality: u8,
    max_dim: u32,
}

impl ImageRecompressor {
    pub fn new(quality: u8, max_dim: u32) -> Self {
        Self { quality, max_dim }
    }

    fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        let mut doc = Document::load(input)?;
        if doc.is_encrypted() {
            if let Err(e) = doc.decrypt(b"") {
                log::warn!(
                    "{} is encrypted and the empty password failed: {:?}",
                    input.display(),
                    e
                );
            }
        }

        let processed = recompress_images(&mut doc, self.quality, self.max_dim);
        log::info!("Re-encoded {} images in {}", processed, input.display());
        doc.compress();

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        doc.save_to(&mut tmp)?;
        tmp.flush()?;
        tmp.persist(output).map_err(|e| e.error)?;
        check_output(output)?;
        Ok(output.to_path_buf())
    }
}

impl Compressor for ImageRecompressor {
    fn compress(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        let result = self.run(input, output);
        if result.is_err() {
            discard(output);
        }
        result
    }

    fn name(&self) -> &str {
        "native"
    }
}

/// Re-encode every image XObject in `doc`. Returns how many were handled.
///
/// A failing image is logged and left untouched.
pub fn recompress_images(doc: &mut Document, quality: u8, max_dim: u32) -> usize {
    let mut handled = 0;
    let mut masks = HashSet::new();

    for (object_id, smask) in image_targets(doc) {
        if let Some(mask_id) = smask {
            masks.insert(mask_id);
        }
        // Masks are rewritten together with the image that owns them.
        if masks.contains(&object_id) {
            continue;
        }
        match process_image_object(doc, object_id, smask, quality, max_dim) {
            Ok(actions) => {
                log::debug!("Image {}: {}", object_id.0, actions);
                handled += 1;
            }
            Err(e) => log::warn!("Failed to process image {}: {:#}", object_id.0, e),
        }
    }
    handled
}

/// Image XObjects and their soft mask, if any.
fn image_targets(doc: &Document) -> Vec<(ObjectId, Option<ObjectId>)> {
    let mut targets: Vec<_> = doc
        .objects
        .iter()
        .filter_map(|(&id, object)| match object {
            Object::Stream(stream) if is_image(stream) => {
                let smask = stream
                    .dict
                    .get(b"SMask")
                    .and_then(|o| o.as_reference())
                    .ok();
                Some((id, smask))
            }
            _ => None,
        })
        .collect();

    // Owners first so their masks are known before the masks come up.
    targets.sort_by_key(|(_, smask)| smask.is_none());
    targets
}

fn is_image(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(|o| o.as_name())
        .map(|name| name == b"Image")
        .unwrap_or(false)
}

fn process_image_object(
    doc: &mut Document,
    object_id: ObjectId,
    smask_id: Option<ObjectId>,
    quality: u8,
    max_dim: u32,
) -> Result<String> {
    let mut actions = Vec::new();

    inline_indirect_entry(doc, object_id, b"Filter");
    inline_indirect_entry(doc, object_id, b"DecodeParms");

    let (mut img, original_len) = {
        let stream = stream_ref(doc, object_id)?;
        if stream
            .dict
            .get(b"ImageMask")
            .and_then(|o| o.as_bool())
            .unwrap_or(false)
        {
            bail!("stencil masks are left alone");
        }
        let components = color_components(doc, stream)?;
        if !has_default_decode(stream, components) {
            bail!("non-default Decode array");
        }
        (
            decode_image(stream, components, &mut actions)?,
            stream.content.len(),
        )
    };

    if let Some(mask_id) = smask_id {
        let mask = decode_mask(stream_ref(doc, mask_id)?)?;
        if mask.dimensions() == img.dimensions() {
            let mut rgba = img.to_rgba8();
            for (x, y, pixel) in rgba.enumerate_pixels_mut() {
                pixel[3] = mask.get_pixel(x, y)[0];
            }
            img = DynamicImage::ImageRgba8(rgba);
            actions.push("applied SMask".to_string());
        }
    }

    let resized = img.width() > max_dim || img.height() > max_dim;
    if resized {
        let (w, h) = img.dimensions();
        img = img.resize(max_dim, max_dim, FilterType::Lanczos3);
        actions.push(format!("resize {}x{} -> {}x{}", w, h, img.width(), img.height()));
    }

    let (w, h) = img.dimensions();
    let has_alpha = smask_id.is_some() && img.color().has_alpha();

    let (encoded, color_space) = if !has_alpha && matches!(img, DynamicImage::ImageLuma8(_)) {
        (encode_jpeg(img.as_bytes(), w, h, ExtendedColorType::L8, quality)?, "DeviceGray")
    } else {
        let rgb = img.to_rgb8();
        (encode_jpeg(rgb.as_raw(), w, h, ExtendedColorType::Rgb8, quality)?, "DeviceRGB")
    };

    if !resized && encoded.len() >= original_len {
        actions.push("kept original (no gain)".to_string());
        return Ok(actions.join(", "));
    }

    actions.push(format!("re-encode: JPEG(q={})", quality));
    let stream = stream_mut(doc, object_id)?;
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
    set_image_geometry(stream, w, h, encoded);

    if let (Some(mask_id), true) = (smask_id, has_alpha) {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p[3]).collect();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        encoder.write_all(&alpha)?;
        let packed = encoder.finish()?;

        let mask = stream_mut(doc, mask_id)?;
        mask.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        mask.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        set_image_geometry(mask, w, h, packed);
        actions.push("alpha: Flate".to_string());
    }

    Ok(actions.join(", "))
}

fn stream_ref(doc: &Document, id: ObjectId) -> Result<&Stream> {
    match doc.objects.get(&id) {
        Some(Object::Stream(s)) => Ok(s),
        _ => Err(anyhow!("object {} {} is not a stream", id.0, id.1)),
    }
}

fn stream_mut(doc: &mut Document, id: ObjectId) -> Result<&mut Stream> {
    match doc.objects.get_mut(&id) {
        Some(Object::Stream(s)) => Ok(s),
        _ => Err(anyhow!("object {} {} is not a stream", id.0, id.1)),
    }
}

fn set_image_geometry(stream: &mut Stream, w: u32, h: u32, content: Vec<u8>) {
    stream.dict.set("Width", Object::Integer(w as i64));
    stream.dict.set("Height", Object::Integer(h as i64));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
    stream.set_content(content);
}

/// Replace an indirect `Filter`/`DecodeParms` (or references inside an
/// array of them) with the referenced objects.
fn inline_indirect_entry(doc: &mut Document, id: ObjectId, key: &[u8]) {
    let resolve = |doc: &Document, obj: &Object| match obj {
        Object::Reference(r) => doc.objects.get(r).cloned(),
        _ => None,
    };

    let replacement = match doc.objects.get(&id) {
        Some(Object::Stream(stream)) => match stream.dict.get(key) {
            Ok(obj @ Object::Reference(_)) => Some(resolve(doc, obj).unwrap_or(Object::Null)),
            Ok(Object::Array(items)) if items.iter().any(|o| matches!(o, Object::Reference(_))) => {
                Some(Object::Array(
                    items
                        .iter()
                        .map(|o| resolve(doc, o).unwrap_or_else(|| o.clone()))
                        .collect(),
                ))
            }
            _ => None,
        },
        _ => None,
    };

    if let (Some(value), Some(Object::Stream(stream))) = (replacement, doc.objects.get_mut(&id)) {
        stream.dict.set(key.to_vec(), value);
    }
}

fn has_filter(stream: &Stream, filter: &[u8]) -> bool {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == filter,
        Ok(Object::Array(arr)) => arr
            .iter()
            .any(|o| matches!(o, Object::Name(name) if name == filter)),
        _ => false,
    }
}

/// Decompress a stream, retrying Flate by hand when lopdf gives up.
fn decompress(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    match stream.decompressed_content() {
        Ok(content) => Ok(content),
        Err(e) if has_filter(stream, b"FlateDecode") => {
            let mut buffer = Vec::new();
            flate2::read::ZlibDecoder::new(&stream.content[..])
                .read_to_end(&mut buffer)
                .with_context(|| format!("zlib fallback after {:?}", e))?;
            Ok(buffer)
        }
        Err(e) => Err(anyhow!("decompression failed: {:?}", e)),
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> u32 {
    stream
        .dict
        .get(key)
        .and_then(|o| o.as_i64())
        .unwrap_or(0)
        .max(0) as u32
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        _ => Ok(object),
    }
}

/// Components per pixel of the image's colour space.
///
/// Only spaces whose samples map straight onto gray, RGB or CMYK pixels are
/// accepted. Indexed, Separation, DeviceN and Lab images are refused.
fn color_components(doc: &Document, stream: &Stream) -> Result<usize> {
    let space = stream
        .dict
        .get(b"ColorSpace")
        .map_err(|_| anyhow!("missing colour space"))?;
    match resolve(doc, space)? {
        Object::Name(name) => family_components(name),
        Object::Array(items) => {
            let family = match items.first() {
                Some(first) => resolve(doc, first)?.as_name()?,
                None => bail!("empty colour space array"),
            };
            if family != b"ICCBased" {
                return family_components(family);
            }
            let profile = items
                .get(1)
                .ok_or_else(|| anyhow!("ICCBased without a profile"))?;
            let n = resolve(doc, profile)?.as_stream()?.dict.get(b"N")?.as_i64()?;
            match n {
                1 | 3 | 4 => Ok(n as usize),
                _ => bail!("unsupported ICC component count {}", n),
            }
        }
        _ => bail!("unsupported colour space"),
    }
}

fn family_components(name: &[u8]) -> Result<usize> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(1),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(3),
        b"DeviceCMYK" | b"CMYK" => Ok(4),
        other => bail!("unsupported colour space {}", String::from_utf8_lossy(other)),
    }
}

/// True when `Decode` is absent or `[0 1 0 1 ...]`.
fn has_default_decode(stream: &Stream, components: usize) -> bool {
    let number = |o: &Object| match o {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    };
    match stream.dict.get(b"Decode") {
        Err(_) => true,
        Ok(Object::Array(values)) => {
            values.len() == components * 2
                && values
                    .iter()
                    .enumerate()
                    .all(|(i, v)| number(v) == Some((i % 2) as f64))
        }
        Ok(_) => false,
    }
}

fn decode_image(
    stream: &Stream,
    components: usize,
    actions: &mut Vec<String>,
) -> Result<DynamicImage> {
    if has_filter(stream, b"DCTDecode") {
        actions.push("was JPEG".to_string());
        return image::load_from_memory(&stream.content).context("undecodable JPEG");
    }

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(|o| o.as_i64())
        .unwrap_or(8);
    if bits != 8 {
        bail!("unsupported bit depth {}", bits);
    }

    let content = decompress(stream)?;
    let width = dimension(stream, b"Width");
    let height = dimension(stream, b"Height");

    let img = match components {
        1 => image::GrayImage::from_raw(width, height, content).map(DynamicImage::ImageLuma8),
        3 => image::RgbImage::from_raw(width, height, content).map(DynamicImage::ImageRgb8),
        _ => {
            actions.push("CMYK->RGB".to_string());
            image::RgbImage::from_raw(width, height, cmyk_to_rgb(&content))
                .map(DynamicImage::ImageRgb8)
        }
    };
    img.ok_or_else(|| {
        anyhow!(
            "{}x{} image with {} components does not fit its data",
            width,
            height,
            components
        )
    })
}

fn decode_mask(stream: &Stream) -> Result<image::GrayImage> {
    let content = decompress(stream).context("failed to decompress mask")?;
    let (w, h) = (dimension(stream, b"Width"), dimension(stream, b"Height"));
    image::GrayImage::from_raw(w, h, content).ok_or_else(|| anyhow!("mask does not fit its data"))
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 1.0 - px[3] as f32 / 255.0;
            let channel = |v: u8| ((1.0 - v as f32 / 255.0) * k * 255.0) as u8;
            [channel(px[0]), channel(px[1]), channel(px[2])]
        })
        .collect()
}

fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    quality: u8,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode(pixels, width, height, color)?;
    Ok(buffer)
}
