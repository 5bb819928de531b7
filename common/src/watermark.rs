// Watermark applicator: composites the archive logo onto the bottom-right
// corner of an access image

use crate::config::Settings;
use crate::errors::ConvertError;
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Mean luminance below which the white logo is used
const DARK_THRESHOLD: f64 = 128.0;

#[derive(Debug, Clone)]
pub struct Watermarker {
    /// Images must be wider than this to get a watermark
    width: u32,
    height: u32,
    white: RgbaImage,
    black: RgbaImage,
}

impl Watermarker {
    pub fn new(width: u32, height: u32, white: RgbaImage, black: RgbaImage) -> Self {
        Self {
            width,
            height,
            white,
            black,
        }
    }

    /// Load both logos named in the settings
    #[instrument(skip(settings))]
    pub fn from_settings(settings: &Settings) -> Result<Self, ConvertError> {
        let (white_path, black_path) = settings.watermark.logo_paths(&settings.paths.app_dir);
        let white = load_logo(&white_path)?;
        let black = load_logo(&black_path)?;
        debug!(
            white = %white_path.display(),
            black = %black_path.display(),
            "Watermark logos loaded"
        );
        Ok(Self::new(
            settings.watermark.width,
            settings.watermark.height,
            white,
            black,
        ))
    }

    /// Whether an image of this width gets a watermark
    pub fn applies_to(&self, image_width: u32) -> bool {
        image_width > self.width
    }

    /// Composite the logo in place. Returns false when the image is too
    /// small and was left untouched.
    pub fn apply(&self, img: &mut RgbImage) -> bool {
        if !self.applies_to(img.width()) || img.height() < self.height {
            return false;
        }

        let anchor_x = img.width() - self.width;
        let anchor_y = img.height() - self.height;

        let logo = if mean_luminance(img, anchor_x, anchor_y, self.width, self.height)
            < DARK_THRESHOLD
        {
            &self.white
        } else {
            &self.black
        };

        for (lx, ly, px) in logo.enumerate_pixels() {
            let (x, y) = (anchor_x + lx, anchor_y + ly);
            if x >= img.width() || y >= img.height() {
                continue;
            }
            let alpha = px.0[3] as u32;
            if alpha == 0 {
                continue;
            }
            let base = img.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended =
                    (px.0[c] as u32 * alpha + base.0[c] as u32 * (255 - alpha)) / 255;
                base.0[c] = blended as u8;
            }
        }

        true
    }

    /// Watermark an image file in place. Files too narrow are not rewritten.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn apply_to_path(&self, path: &Path) -> Result<bool, ConvertError> {
        let mut img = image::open(path)
            .map_err(|e| ConvertError::Watermark {
                path: path.to_path_buf(),
                reason: format!("cannot open image: {}", e),
            })?
            .to_rgb8();

        if !self.apply(&mut img) {
            return Ok(false);
        }

        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);
        img.save_with_format(path, format)
            .map_err(|e| ConvertError::Watermark {
                path: path.to_path_buf(),
                reason: format!("cannot save watermarked image: {}", e),
            })?;
        Ok(true)
    }
}

fn load_logo(path: &PathBuf) -> Result<RgbaImage, ConvertError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| ConvertError::Decode {
            path: path.clone(),
            reason: format!("watermark logo: {}", e),
        })
}

/// ITU-R 601 luma, as used for 8-bit grayscale conversion
fn luma(px: &Rgb<u8>) -> f64 {
    let [r, g, b] = px.0;
    (r as f64 * 299.0 + g as f64 * 587.0 + b as f64 * 114.0) / 1000.0
}

fn mean_luminance(img: &RgbImage, x0: u32, y0: u32, width: u32, height: u32) -> f64 {
    let mut total = 0.0;
    let mut count = 0u64;
    for y in y0..(y0 + height).min(img.height()) {
        for x in x0..(x0 + width).min(img.width()) {
            total += luma(img.get_pixel(x, y));
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn watermarker() -> Watermarker {
        // white logo marks pixels 255, black logo marks 0; fully opaque
        let white = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        let black = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        Watermarker::new(4, 2, white, black)
    }

    #[test]
    fn test_dark_image_gets_white_logo() {
        let mut img = RgbImage::from_pixel(10, 6, Rgb([10, 10, 10]));
        assert!(watermarker().apply(&mut img));
        assert_eq!(img.get_pixel(9, 5), &Rgb([255, 255, 255]));
        assert_eq!(img.get_pixel(6, 4), &Rgb([255, 255, 255]));
        // outside the logo area stays untouched
        assert_eq!(img.get_pixel(5, 5), &Rgb([10, 10, 10]));
        assert_eq!(img.get_pixel(9, 3), &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_light_image_gets_black_logo() {
        let mut img = RgbImage::from_pixel(10, 6, Rgb([240, 240, 240]));
        assert!(watermarker().apply(&mut img));
        assert_eq!(img.get_pixel(9, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_images_not_wider_than_logo_are_untouched() {
        let mut img = RgbImage::from_pixel(4, 6, Rgb([10, 10, 10]));
        assert!(!watermarker().apply(&mut img));
        assert_eq!(img.get_pixel(3, 5), &Rgb([10, 10, 10]));
    }

    #[test]
    fn test_transparent_logo_pixels_keep_background() {
        let mut white = RgbaImage::from_pixel(4, 2, Rgba([255, 255, 255, 255]));
        white.put_pixel(0, 0, Rgba([255, 255, 255, 0]));
        let black = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        let marker = Watermarker::new(4, 2, white, black);

        let mut img = RgbImage::from_pixel(10, 6, Rgb([20, 20, 20]));
        marker.apply(&mut img);
        assert_eq!(img.get_pixel(6, 4), &Rgb([20, 20, 20]));
        assert_eq!(img.get_pixel(7, 4), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_apply_to_path_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame_m.png");
        RgbImage::from_pixel(10, 6, Rgb([0, 0, 0])).save(&path).unwrap();

        assert!(watermarker().apply_to_path(&path).unwrap());
        let reloaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(reloaded.get_pixel(9, 5), &Rgb([255, 255, 255]));
    }
}
