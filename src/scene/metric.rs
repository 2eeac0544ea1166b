// Visual difference metric - mean HSV content delta between two frames
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Per-pixel HSV planes of one frame, 8-bit each.
///
/// Hue is stored halved (0-179) so every channel fits in a byte.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFeatures {
    width: u32,
    height: u32,
    hue: Vec<u8>,
    saturation: Vec<u8>,
    value: Vec<u8>,
}

impl ContentFeatures {
    pub fn from_image(image: &RgbImage) -> Self {
        let pixel_count = image.width() as usize * image.height() as usize;
        let mut hue = Vec::with_capacity(pixel_count);
        let mut saturation = Vec::with_capacity(pixel_count);
        let mut value = Vec::with_capacity(pixel_count);

        for pixel in image.pixels() {
            let [h, s, v] = rgb_to_hsv(pixel);
            hue.push(h);
            saturation.push(s);
            value.push(v);
        }

        Self {
            width: image.width(),
            height: image.height(),
            hue,
            saturation,
            value,
        }
    }

    /// Features of `image` at the size of `reference`, resizing if needed
    pub fn matching(image: &RgbImage, reference: &ContentFeatures) -> Self {
        if image.dimensions() == reference.dimensions() {
            return Self::from_image(image);
        }

        let resized = imageops::resize(image, reference.width, reference.height, FilterType::Triangle);
        Self::from_image(&resized)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Content delta to another frame of the same size, 0-255.
    ///
    /// Average over H, S and V of the mean absolute per-pixel difference.
    pub fn distance(&self, other: &ContentFeatures) -> f64 {
        debug_assert_eq!(self.dimensions(), other.dimensions());

        let pixel_count = self.hue.len().min(other.hue.len());
        if pixel_count == 0 {
            return 0.0;
        }

        let delta_h = mean_abs_diff(&self.hue, &other.hue);
        let delta_s = mean_abs_diff(&self.saturation, &other.saturation);
        let delta_v = mean_abs_diff(&self.value, &other.value);

        (delta_h + delta_s + delta_v) / 3.0
    }
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    let count = a.len().min(b.len());
    let sum: u64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    sum as f64 / count as f64
}

/// 8-bit HSV with hue in 0..180 and saturation/value in 0..=255
fn rgb_to_hsv(pixel: &Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0.map(f64::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;

    let saturation = if max == 0.0 { 0.0 } else { 255.0 * chroma / max };

    let hue_degrees = if chroma == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / chroma
    } else if max == g {
        120.0 + 60.0 * (b - r) / chroma
    } else {
        240.0 + 60.0 * (r - g) / chroma
    };
    let hue_degrees = if hue_degrees < 0.0 {
        hue_degrees + 360.0
    } else {
        hue_degrees
    };

    let hue = (hue_degrees / 2.0).round() as u16 % 180;
    [hue as u8, saturation.round() as u8, max as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(rgb))
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv(&Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 0])), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(&Rgb([128, 128, 128])), [0, 0, 128]);
    }

    #[test]
    fn test_identical_frames_have_zero_distance() {
        let a = ContentFeatures::from_image(&flat(16, 9, [40, 90, 200]));
        let b = ContentFeatures::from_image(&flat(16, 9, [40, 90, 200]));
        assert_eq!(a.distance(&b), 0.0);
    }

    #[test]
    fn test_gray_step_scores_a_third_of_the_step() {
        // Gray only moves V, so the score is the step divided by three
        let a = ContentFeatures::from_image(&flat(8, 8, [100, 100, 100]));
        let b = ContentFeatures::from_image(&flat(8, 8, [130, 130, 130]));
        assert_eq!(a.distance(&b), 10.0);
        assert_eq!(b.distance(&a), 10.0);
    }

    #[test]
    fn test_black_to_white_is_a_strong_cut() {
        let a = ContentFeatures::from_image(&flat(8, 8, [0, 0, 0]));
        let b = ContentFeatures::from_image(&flat(8, 8, [255, 255, 255]));
        assert_eq!(a.distance(&b), 85.0);
    }

    #[test]
    fn test_distance_is_independent_of_resolution() {
        let small = (
            ContentFeatures::from_image(&flat(4, 4, [0, 0, 0])),
            ContentFeatures::from_image(&flat(4, 4, [90, 90, 90])),
        );
        let large = (
            ContentFeatures::from_image(&flat(64, 36, [0, 0, 0])),
            ContentFeatures::from_image(&flat(64, 36, [90, 90, 90])),
        );
        assert_eq!(small.0.distance(&small.1), large.0.distance(&large.1));
    }

    #[test]
    fn test_matching_resizes_to_reference() {
        let reference = ContentFeatures::from_image(&flat(8, 8, [50, 50, 50]));
        let other = ContentFeatures::matching(&flat(16, 12, [80, 80, 80]), &reference);

        assert_eq!(other.dimensions(), (8, 8));
        assert_eq!(reference.distance(&other), 10.0);
    }
}
