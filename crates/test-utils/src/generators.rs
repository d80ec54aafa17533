//! Encoded image payloads for preview tests.
//!
//! Every generator returns bytes a real WMS could have sent back, so
//! validation code sees genuine file signatures.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};

/// A solid semi-transparent PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([30, 110, 200, 180]));
    encode(DynamicImage::ImageRgba8(img), ImageOutputFormat::Png)
}

/// A horizontal gradient JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| {
        let v = ((x * 255) / width.max(1)) as u8;
        Rgb([v, 128, 255 - v])
    });
    encode(DynamicImage::ImageRgb8(img), ImageOutputFormat::Jpeg(85))
}

/// A GIF, for servers that do not offer JPEG or PNG.
pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    encode(DynamicImage::ImageRgba8(img), ImageOutputFormat::Gif)
}

/// What a misconfigured server returns instead of an image.
pub fn text_bytes() -> Vec<u8> {
    b"Service temporarily unavailable, please try again later.\n".to_vec()
}

/// A PNG signature followed by garbage.
pub fn truncated_png_bytes() -> Vec<u8> {
    let mut bytes = png_bytes(4, 4);
    bytes.truncate(16);
    bytes
}

fn encode(img: DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format)
        .expect("encoding an in-memory image cannot fail");
    cursor.into_inner()
}
