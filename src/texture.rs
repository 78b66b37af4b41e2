//! SCT / SCT2 texture container decoding.
//!
//! Both containers carry a pixel-format code, dimensions, and a payload
//! that is usually a size-prefixed LZ4 block. The payload decodes to one
//! of several pixel encodings (RGB565, raw RGB, ETC2 EAC RGBA8, ASTC,
//! L8) which are all normalized to RGBA8 and then PNG-encoded.

use std::io::Cursor;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::{etc2, lz4};

const SCT2_SIGNATURE: u32 = 0x3254_4353; // "SCT2"
const SCT_SIGNATURE_WORD: u16 = 0x4353; // "SC"
const SCT_SIGNATURE_BYTE: u8 = 0x54; // 'T'
const MAX_DIMENSION: u32 = 16384;

bitflags::bitflags! {
    pub struct TextureFlags: u8 {
        const ALPHA      = 0x01;
        const CROP       = 0x02;
        const RAW        = 0x10;
        const MIPMAP2    = 0x20;
        const COMPRESSED = 0x80;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Sct,
    Sct2,
}

#[derive(Debug)]
pub struct TextureHeader {
    pub kind: ContainerKind,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub data_offset: usize,
    pub flags: TextureFlags,
}

/// Identify the container variant from the leading bytes.
pub fn detect(data: &[u8]) -> Option<ContainerKind> {
    if data.len() >= 4 && LittleEndian::read_u32(&data[..4]) == SCT2_SIGNATURE {
        return Some(ContainerKind::Sct2);
    }
    if data.len() >= 3
        && LittleEndian::read_u16(&data[..2]) == SCT_SIGNATURE_WORD
        && data[2] == SCT_SIGNATURE_BYTE
    {
        return Some(ContainerKind::Sct);
    }
    None
}

pub fn parse_header(data: &[u8]) -> Result<TextureHeader> {
    match detect(data) {
        Some(ContainerKind::Sct) => parse_sct_header(data),
        Some(ContainerKind::Sct2) => parse_sct2_header(data),
        None => Err(Error::UnknownTextureFormat),
    }
}

/// SCT: 3-byte signature, reserved byte, pixel format, u16 width and
/// height. Payload begins at byte 9 and is always LZ4-compressed.
fn parse_sct_header(data: &[u8]) -> Result<TextureHeader> {
    if data.len() < 9 {
        return Err(Error::UnknownTextureFormat);
    }
    let width = LittleEndian::read_u16(&data[5..7]) as u32;
    let height = LittleEndian::read_u16(&data[7..9]) as u32;
    Ok(TextureHeader {
        kind: ContainerKind::Sct,
        pixel_format: data[4] as u32,
        width,
        height,
        texture_width: width,
        texture_height: height,
        data_offset: 9,
        flags: TextureFlags::empty(),
    })
}

fn parse_sct2_header(data: &[u8]) -> Result<TextureHeader> {
    if data.len() < 34 {
        return Err(Error::UnknownTextureFormat);
    }
    let data_offset = LittleEndian::read_u32(&data[12..16]) as usize;
    Ok(TextureHeader {
        kind: ContainerKind::Sct2,
        pixel_format: LittleEndian::read_u32(&data[20..24]),
        width: LittleEndian::read_u16(&data[24..26]) as u32,
        height: LittleEndian::read_u16(&data[26..28]) as u32,
        texture_width: LittleEndian::read_u16(&data[28..30]) as u32,
        texture_height: LittleEndian::read_u16(&data[30..32]) as u32,
        data_offset,
        flags: TextureFlags::from_bits_truncate(data[32]),
    })
}

#[derive(Debug, Clone, Copy)]
enum PixelLayout {
    Rgb565,
    Rgb,
    Etc2Rgba8,
    Astc { block_width: u32, block_height: u32 },
    L8,
    Rgba,
}

fn pixel_layout(format: u32) -> PixelLayout {
    match format {
        4 | 16 => PixelLayout::Rgb565,
        6 => PixelLayout::Rgb,
        19 => PixelLayout::Etc2Rgba8,
        40 => PixelLayout::Astc { block_width: 4, block_height: 4 },
        44 => PixelLayout::Astc { block_width: 6, block_height: 6 },
        47 => PixelLayout::Astc { block_width: 8, block_height: 8 },
        102 => PixelLayout::L8,
        _ => PixelLayout::Rgba,
    }
}

fn astc_block_bytes(width: u32, height: u32, block_width: u32, block_height: u32) -> usize {
    let bx = width.div_ceil(block_width) as usize;
    let by = height.div_ceil(block_height) as usize;
    bx * by * 16
}

/// Heuristic for SCT2 payloads flagged raw: the container sometimes
/// stores them LZ4-compressed anyway. Compare the observed size against
/// the expected uncompressed size and accept a trial decompression only
/// if it actually expands the data.
fn should_decompress(payload: &[u8], width: u32, height: u32, pixel_format: u32) -> bool {
    if payload.len() < 8 {
        return false;
    }
    let expected = if pixel_format == 40 {
        astc_block_bytes(width, height, 4, 4)
    } else {
        (width as usize) * (height as usize) * 2
    };
    let size_ratio = payload.len() as f64 / expected as f64;

    let (trial_ok, trial_ratio) = match lz4::decompress_sized(payload) {
        Ok(out) if !out.is_empty() => (true, out.len() as f64 / expected as f64),
        _ => (false, 0.0),
    };

    let decompress = size_ratio < 0.95 && trial_ok && trial_ratio > size_ratio;
    tracing::debug!(
        size_ratio,
        trial_ok,
        trial_ratio,
        decompress,
        "texture payload compression probe"
    );
    decompress
}

/// Decode a texture container to PNG bytes.
pub fn to_png(data: &[u8]) -> Result<Vec<u8>> {
    let header = parse_header(data)?;
    let (rgba, width, height) = to_rgba(data, &header)?;
    encode_png(rgba, width, height)
}

fn to_rgba(data: &[u8], header: &TextureHeader) -> Result<(Vec<u8>, u32, u32)> {
    let (width, height) = (header.width, header.height);
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::BadDimensions { width, height });
    }
    if header.data_offset > data.len() {
        return Err(Error::OutOfBounds {
            offset: header.data_offset,
            len: 0,
            available: data.len(),
        });
    }
    let mut payload = data[header.data_offset..].to_vec();

    match header.kind {
        ContainerKind::Sct => {
            payload = lz4::decompress_sized(&payload)?;
        }
        ContainerKind::Sct2 => {
            if header.flags.intersects(TextureFlags::RAW | TextureFlags::ALPHA) {
                if should_decompress(&payload, width, height, header.pixel_format) {
                    if let Ok(out) = lz4::decompress_sized(&payload) {
                        payload = out;
                    }
                }
            } else if header.pixel_format == 40 || header.flags.contains(TextureFlags::COMPRESSED) {
                match lz4::decompress_sized(&payload) {
                    Ok(out) => payload = out,
                    Err(err) => {
                        tracing::debug!(%err, "texture decompression failed, using raw payload")
                    }
                }
            }
        }
    }

    let mut rgba = match pixel_layout(header.pixel_format) {
        PixelLayout::Rgb565 => rgb_to_rgba(&rgb565_to_rgb(&payload)),
        PixelLayout::Rgb => rgb_to_rgba(&payload),
        PixelLayout::L8 => l8_to_rgba(&payload),
        PixelLayout::Etc2Rgba8 => decode_etc2(&payload, width, height),
        PixelLayout::Astc { block_width, block_height } => {
            let mut rgba = decode_astc(&payload, width, height, block_width, block_height)?;
            swap_rb(&mut rgba);
            rgba
        }
        PixelLayout::Rgba => payload,
    };

    let needed = (width as usize) * (height as usize) * 4;
    if rgba.len() < needed {
        return Err(Error::ShortPixelData { expected: needed, actual: rgba.len() });
    }
    rgba.truncate(needed);
    Ok((rgba, width, height))
}

fn encode_png(rgba: Vec<u8>, width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = (width as usize) * (height as usize) * 4;
    let image = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or(Error::ShortPixelData { expected, actual: 0 })?;
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

fn rgb565_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(2) {
        let pixel = LittleEndian::read_u16(chunk);
        rgb.push((((pixel >> 11) & 0x1F) << 3) as u8);
        rgb.push((((pixel >> 5) & 0x3F) << 2) as u8);
        rgb.push(((pixel & 0x1F) << 3) as u8);
    }
    rgb
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for chunk in rgb.chunks_exact(3) {
        rgba.extend_from_slice(chunk);
        rgba.push(255);
    }
    rgba
}

fn l8_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(data.len() * 4);
    for &gray in data {
        rgba.extend_from_slice(&[gray, gray, gray, 255]);
    }
    rgba
}

fn swap_rb(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

/// ETC2 blocks cover 4x4 texels; boundary blocks only partially occupy
/// the image, so decoded texels are clipped against the dimensions.
fn decode_etc2(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let blocks_x = width.div_ceil(4);
    let blocks_y = height.div_ceil(4);
    let expected = blocks_x * blocks_y * etc2::BLOCK_BYTES;

    if data.len() < expected {
        tracing::debug!(expected, actual = data.len(), "ETC2 payload undersized, emitting gray");
        return vec![128; width * height * 4];
    }

    let mut rgba = vec![0u8; width * height * 4];
    let mut texels = [[0u8; 4]; 16];
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let block = &data[(by * blocks_x + bx) * etc2::BLOCK_BYTES..];
            etc2::decode_block(block, &mut texels);
            for y in 0..4 {
                for x in 0..4 {
                    let px = bx * 4 + x;
                    let py = by * 4 + y;
                    if px < width && py < height {
                        let dst = (py * width + px) * 4;
                        rgba[dst..dst + 4].copy_from_slice(&texels[y * 4 + x]);
                    }
                }
            }
        }
    }
    rgba
}

fn decode_astc(
    data: &[u8],
    width: u32,
    height: u32,
    block_width: u32,
    block_height: u32,
) -> Result<Vec<u8>> {
    let expected = astc_block_bytes(width, height, block_width, block_height);
    if data.len() < expected {
        return Err(Error::ShortPixelData { expected, actual: data.len() });
    }

    let footprint = match (block_width, block_height) {
        (4, 4) => astc_decode::Footprint::ASTC_4X4,
        (6, 6) => astc_decode::Footprint::ASTC_6X6,
        (8, 8) => astc_decode::Footprint::ASTC_8X8,
        _ => return Err(Error::UnknownTextureFormat),
    };

    let (w, h) = (width as usize, height as usize);
    let mut rgba = vec![0u8; w * h * 4];
    let result = astc_decode::astc_decode(data, width, height, footprint, |x, y, texel| {
        let dst = (y as usize * w + x as usize) * 4;
        rgba[dst..dst + 4].copy_from_slice(&texel);
    });
    if let Err(err) = result {
        tracing::debug!(%err, "ASTC decode failed, emitting gray");
        rgba.fill(128);
    }
    Ok(rgba)
}
