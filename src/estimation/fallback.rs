//! # Static Fallback Tables
//!
//! Valori di riferimento usati quando lo storico non è disponibile o vuoto.
//!
//! ## Tabelle:
//! - **Riduzione**: percentuale tipica per coppia di formati e modalità lossy
//! - **Durata**: tempo tipico di compressione per coppia di formati e classe di dimensione
//!
//! Le stime di fallback hanno sempre confidenza bassa e `is_learning = false`.

use crate::estimation::EstimationResult;
use crate::format::{ImageFormat, SizeBucket};

/// Confidence attached to every table-based estimate
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Reduction used for pairs the table does not know
const UNKNOWN_PAIR_REDUCTION: f64 = 10.0;

/// Lossless WebP encoding is slower than lossy
const LOSSLESS_WEBP_SLOWDOWN: f64 = 1.25;

/// (input, output, lossy) -> typical reduction percent
const REDUCTION_TABLE: &[((ImageFormat, ImageFormat, bool), f64)] = &[
    // Same-format optimization
    ((ImageFormat::Png, ImageFormat::Png, true), 15.0),
    ((ImageFormat::Png, ImageFormat::Png, false), 15.0),
    ((ImageFormat::Jpeg, ImageFormat::Jpeg, true), 18.0),
    ((ImageFormat::Jpeg, ImageFormat::Jpeg, false), 12.0),
    ((ImageFormat::WebP, ImageFormat::WebP, true), 12.0),
    ((ImageFormat::WebP, ImageFormat::WebP, false), 12.0),
    // Lossy conversion to WebP
    ((ImageFormat::Png, ImageFormat::WebP, true), 85.0),
    ((ImageFormat::Jpeg, ImageFormat::WebP, true), 45.0),
    ((ImageFormat::Gif, ImageFormat::WebP, true), 90.0),
    ((ImageFormat::Bmp, ImageFormat::WebP, true), 98.0),
    ((ImageFormat::Tiff, ImageFormat::WebP, true), 95.0),
    // Lossless conversion to WebP
    ((ImageFormat::Png, ImageFormat::WebP, false), 26.0),
    ((ImageFormat::Jpeg, ImageFormat::WebP, false), 5.0),
    ((ImageFormat::Gif, ImageFormat::WebP, false), 40.0),
    ((ImageFormat::Bmp, ImageFormat::WebP, false), 80.0),
    ((ImageFormat::Tiff, ImageFormat::WebP, false), 70.0),
    // Legacy targets
    ((ImageFormat::Png, ImageFormat::Jpeg, true), 60.0),
    ((ImageFormat::Bmp, ImageFormat::Jpeg, true), 90.0),
    ((ImageFormat::Tiff, ImageFormat::Jpeg, true), 85.0),
    ((ImageFormat::Bmp, ImageFormat::Png, false), 60.0),
    ((ImageFormat::Tiff, ImageFormat::Png, false), 40.0),
    ((ImageFormat::Gif, ImageFormat::Png, false), 10.0),
];

/// (input, output) -> [small, medium, large] duration in ms
const DURATION_TABLE: &[((ImageFormat, ImageFormat), [u64; 3])] = &[
    ((ImageFormat::Png, ImageFormat::WebP), [300, 1200, 3000]),
    ((ImageFormat::Png, ImageFormat::Png), [800, 2500, 6000]),
    ((ImageFormat::Jpeg, ImageFormat::WebP), [200, 800, 2000]),
    ((ImageFormat::Jpeg, ImageFormat::Jpeg), [150, 500, 1200]),
    ((ImageFormat::WebP, ImageFormat::WebP), [250, 900, 2200]),
    ((ImageFormat::Gif, ImageFormat::WebP), [300, 1200, 3000]),
    ((ImageFormat::Bmp, ImageFormat::WebP), [250, 1000, 2500]),
    ((ImageFormat::Tiff, ImageFormat::WebP), [350, 1400, 3500]),
    ((ImageFormat::Png, ImageFormat::Jpeg), [200, 700, 1800]),
];

/// Typical reduction for a format pair, before size adjustment
fn base_reduction(input: ImageFormat, output: ImageFormat, lossy: bool) -> f64 {
    REDUCTION_TABLE
        .iter()
        .find(|((i, o, l), _)| *i == input && *o == output && *l == lossy)
        // A lossless-only entry still beats the unknown default
        .or_else(|| REDUCTION_TABLE.iter().find(|((i, o, _), _)| *i == input && *o == output))
        .map(|(_, percent)| *percent)
        .unwrap_or(UNKNOWN_PAIR_REDUCTION)
}

/// Small files compress less efficiently, large ones slightly better
fn adjust_for_size(reduction: f64, bucket: SizeBucket) -> f64 {
    let factor = match bucket {
        SizeBucket::Small => 0.8,
        SizeBucket::Medium => 1.0,
        SizeBucket::Large => 1.1,
    };
    (reduction * factor).clamp(0.0, 99.0)
}

/// Table-based reduction estimate
pub fn reduction_estimate(
    input: ImageFormat,
    output: ImageFormat,
    original_size: u64,
    lossy: bool,
) -> EstimationResult {
    let bucket = SizeBucket::classify(original_size);
    let percent = adjust_for_size(base_reduction(input, output, lossy), bucket);

    EstimationResult {
        percent,
        ratio: (100.0 - percent) / 100.0,
        confidence: FALLBACK_CONFIDENCE,
        sample_count: 0,
        is_learning: false,
        description: format!("Typical {} → {} result (no history yet)", input, output),
        mean_duration_ms: None,
    }
}

/// Table-based duration, `None` for pairs the table does not know
pub fn duration_ms(input: ImageFormat, output: ImageFormat, original_size: u64, lossy: bool) -> Option<u64> {
    let slot = match SizeBucket::classify(original_size) {
        SizeBucket::Small => 0,
        SizeBucket::Medium => 1,
        SizeBucket::Large => 2,
    };

    let base = DURATION_TABLE
        .iter()
        .find(|((i, o), _)| *i == input && *o == output)
        .map(|(_, times)| times[slot])?;

    if output == ImageFormat::WebP && input != ImageFormat::WebP && !lossy {
        Some((base as f64 * LOSSLESS_WEBP_SLOWDOWN) as u64)
    } else {
        Some(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_format_range() {
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::WebP] {
            let estimate = reduction_estimate(format, format, 2_000_000, true);
            assert!((12.0..=18.0).contains(&estimate.percent), "{}: {}", format, estimate.percent);
            assert!(!estimate.is_learning);
            assert!(estimate.confidence < 0.5);
        }
    }

    #[test]
    fn test_lossy_modern_conversion_range() {
        for input in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp, ImageFormat::Tiff] {
            let estimate = reduction_estimate(input, ImageFormat::WebP, 2_000_000, true);
            assert!((45.0..=98.0).contains(&estimate.percent));
        }
    }

    #[test]
    fn test_size_adjustment() {
        let small = reduction_estimate(ImageFormat::Png, ImageFormat::WebP, 500_000, true);
        let medium = reduction_estimate(ImageFormat::Png, ImageFormat::WebP, 2_000_000, true);
        let large = reduction_estimate(ImageFormat::Bmp, ImageFormat::WebP, 8_000_000, true);
        assert!(small.percent < medium.percent);
        assert_eq!(medium.percent, 85.0);
        assert!(large.percent <= 99.0);
        assert!((medium.ratio - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_pair_defaults() {
        let estimate = reduction_estimate(ImageFormat::Gif, ImageFormat::Jpeg, 2_000_000, true);
        assert_eq!(estimate.percent, UNKNOWN_PAIR_REDUCTION);
        assert_eq!(duration_ms(ImageFormat::Gif, ImageFormat::Jpeg, 2_000_000, true), None);
    }

    #[test]
    fn test_duration_table() {
        assert_eq!(duration_ms(ImageFormat::Png, ImageFormat::WebP, 500_000, true), Some(300));
        assert_eq!(duration_ms(ImageFormat::Png, ImageFormat::WebP, 500_000, false), Some(375));
        assert_eq!(duration_ms(ImageFormat::Jpeg, ImageFormat::Jpeg, 8_000_000, true), Some(1200));
        assert_eq!(duration_ms(ImageFormat::WebP, ImageFormat::WebP, 2_000_000, false), Some(900));
    }
}
