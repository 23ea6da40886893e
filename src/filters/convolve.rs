//! 3×3 convolution and the kernel-backed filters.
//!
//! All kernels run over RGB with edge pixels replicated; alpha is carried
//! through from the center pixel untouched. `divisor` and `offset` follow
//! the classic GD convention: the accumulated value is divided, offset,
//! then clamped to 0–255.

use image::{Rgba, RgbaImage};

/// Convolve the RGB channels with a 3×3 kernel (row-major).
pub fn convolve3x3(img: &RgbaImage, kernel: [f32; 9], divisor: f32, offset: f32) -> RgbaImage {
    if divisor == 0.0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let mut out = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for ky in 0..3i64 {
                for kx in 0..3i64 {
                    let sx = (x as i64 + kx - 1).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + ky - 1).clamp(0, h as i64 - 1) as u32;
                    let p = img.get_pixel(sx, sy);
                    let k = kernel[(ky * 3 + kx) as usize];
                    acc[0] += p[0] as f32 * k;
                    acc[1] += p[1] as f32 * k;
                    acc[2] += p[2] as f32 * k;
                }
            }
            let clamp = |v: f32| (v / divisor + offset).round().clamp(0.0, 255.0) as u8;
            let alpha = img.get_pixel(x, y)[3];
            out.put_pixel(x, y, Rgba([clamp(acc[0]), clamp(acc[1]), clamp(acc[2]), alpha]));
        }
    }
    out
}

const GAUSSIAN: [f32; 9] = [1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0];

/// One pass of the 3×3 Gaussian kernel.
pub fn gaussian_pass(img: &RgbaImage) -> RgbaImage {
    convolve3x3(img, GAUSSIAN, 16.0, 0.0)
}

/// Blur is N Gaussian passes. Zero passes is the identity.
pub fn blur(img: RgbaImage, passes: u32) -> RgbaImage {
    let mut img = img;
    for _ in 0..passes {
        img = gaussian_pass(&img);
    }
    img
}

/// Smoothing kernel: neighbors weigh 1, the center weighs `weight`.
pub fn smooth(img: RgbaImage, weight: f32) -> RgbaImage {
    let kernel = [1.0, 1.0, 1.0, 1.0, weight, 1.0, 1.0, 1.0, 1.0];
    convolve3x3(&img, kernel, weight + 8.0, 0.0)
}

pub fn edge_detect(img: &RgbaImage) -> RgbaImage {
    let kernel = [-1.0, 0.0, -1.0, 0.0, 4.0, 0.0, -1.0, 0.0, -1.0];
    convolve3x3(img, kernel, 1.0, 127.0)
}

pub fn emboss(img: &RgbaImage) -> RgbaImage {
    let kernel = [1.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.5];
    convolve3x3(img, kernel, 1.0, 127.0)
}

pub fn mean_removal(img: &RgbaImage) -> RgbaImage {
    let kernel = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];
    convolve3x3(img, kernel, 1.0, 0.0)
}

/// Unsharp mask: subtract a Gaussian blur from the original and push each
/// channel away from the blurred value.
///
/// `amount` is the user scale (capped at 500, pre-scaled by 0.016 before
/// use); `threshold` (capped at 255) is the minimum original-to-blurred
/// difference a channel needs before it is sharpened. Amount 0 is the
/// identity.
pub fn unsharp_mask(img: RgbaImage, amount: u32, threshold: u32) -> RgbaImage {
    let scaled = amount.min(500) as f32 * 0.016;
    if scaled == 0.0 {
        return img;
    }
    let threshold = threshold.min(255) as f32;
    let blurred = gaussian_pass(&img);

    let (w, h) = img.dimensions();
    let mut out = RgbaImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let orig = img.get_pixel(x, y);
            let soft = blurred.get_pixel(x, y);
            let mut px = *orig;
            for c in 0..3 {
                let diff = orig[c] as f32 - soft[c] as f32;
                if diff.abs() >= threshold {
                    px[c] = (orig[c] as f32 + scaled * diff).round().clamp(0.0, 255.0) as u8;
                }
            }
            out.put_pixel(x, y, px);
        }
    }
    out
}
