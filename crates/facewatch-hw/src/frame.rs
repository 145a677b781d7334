//! Frame type and pixel conversions — YUYV decoding, luma extraction,
//! average luminosity.

use image::{GrayImage, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// A captured color frame.
///
/// Kept in RGB because the pipeline annotates and re-encodes it for
/// display; the grayscale view used by detection/recognition is derived
/// on demand.
#[derive(Clone)]
pub struct Frame {
    pub rgb: RgbImage,
}

impl Frame {
    pub fn new(rgb: RgbImage) -> Self {
        Self { rgb }
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Single-channel intensity copy (ITU-R BT.601 integer luma).
    pub fn to_gray(&self) -> GrayImage {
        let (w, h) = self.rgb.dimensions();
        let mut gray = Vec::with_capacity((w * h) as usize);
        for p in self.rgb.pixels() {
            let [r, g, b] = p.0;
            gray.push(((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8);
        }
        GrayImage::from_raw(w, h, gray).unwrap_or_else(|| GrayImage::new(w, h))
    }
}

/// Average pixel intensity of a grayscale image (0–255).
///
/// Used as the luminosity proxy for "is this frame well-lit enough to
/// capture a usable sample".
pub fn avg_luminosity(gray: &GrayImage) -> u8 {
    let data = gray.as_raw();
    if data.is_empty() {
        return 0;
    }
    (data.iter().map(|&b| b as u64).sum::<u64>() / data.len() as u64) as u8
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the U/V pair. Uses the BT.601 full-range integer conversion.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let [y0, u, y1, v] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        for y in [y0, y1] {
            let c = y as i32;
            let d = u as i32 - 128;
            let e = v as i32 - 128;
            let r = (256 * c + 359 * e + 128) >> 8;
            let g = (256 * c - 88 * d - 183 * e + 128) >> 8;
            let b = (256 * c + 454 * d + 128) >> 8;
            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }

    Ok(RgbImage::from_raw(width, height, rgb)
        .unwrap_or_else(|| RgbImage::new(width, height)))
}

/// Expand an 8-bit grayscale buffer to RGB (native output of IR cameras).
pub fn gray_to_rgb(gray: &[u8], width: u32, height: u32) -> RgbImage {
    let pixels = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);
    for &g in gray.iter().take(pixels) {
        rgb.extend_from_slice(&[g, g, g]);
    }
    RgbImage::from_raw(width, height, rgb).unwrap_or_else(|| RgbImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image, U=V=128 → R=G=B=Y
        let yuyv = vec![100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_rgb(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_to_gray_matches_luma_weights() {
        let mut rgb = RgbImage::new(1, 1);
        rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        let gray = Frame::new(rgb).to_gray();
        // 77*255 >> 8 = 76
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
    }

    #[test]
    fn test_avg_luminosity() {
        let gray = GrayImage::from_pixel(4, 4, image::Luma([100u8]));
        assert_eq!(avg_luminosity(&gray), 100);
        assert_eq!(avg_luminosity(&GrayImage::new(0, 0)), 0);
    }

    #[test]
    fn test_gray_to_rgb_roundtrip() {
        let rgb = gray_to_rgb(&[0, 128, 255, 64], 2, 2);
        assert_eq!(rgb.get_pixel(1, 0).0, [128, 128, 128]);
        let back = Frame::new(rgb).to_gray();
        // BT.601 luma of (g,g,g) stays within a rounding step of g.
        assert!((back.get_pixel(1, 0).0[0] as i32 - 128).abs() <= 1);
    }
}
