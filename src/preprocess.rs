//! Light image cleanup ahead of OCR: grayscale conversion plus auto-contrast.

use image::{DynamicImage, GrayImage};

/// Convert to 8-bit grayscale and stretch the luminance histogram to the full
/// 0..=255 range. Dimensions are preserved.
pub fn preprocess(image: &DynamicImage) -> GrayImage {
    autocontrast(grayscale(image))
}

/// ITU-R 601-2 luma (L = 0.299 R + 0.587 G + 0.114 B) in 16-bit fixed point.
/// Alpha is ignored.
pub fn grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }

    let rgb = image.to_rgb8();
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (out, pixel) in gray.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = pixel.0;
        let luma = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        out.0 = [luma as u8];
    }
    gray
}

/// Histogram stretch: the darkest occurring value maps to 0 and the brightest
/// to 255, everything in between scales linearly. Flat images are untouched.
pub fn autocontrast(mut gray: GrayImage) -> GrayImage {
    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let lo = histogram.iter().position(|&count| count > 0);
    let hi = histogram.iter().rposition(|&count| count > 0);
    let (lo, hi) = match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => (lo as i32, hi as i32),
        _ => return gray,
    };

    let lut: [u8; 256] = std::array::from_fn(|value| {
        ((value as i32 - lo) * 255 / (hi - lo)).clamp(0, 255) as u8
    });

    for pixel in gray.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    gray
}
