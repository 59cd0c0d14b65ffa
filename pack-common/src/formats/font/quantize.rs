//! Coverage quantization.

use super::Bpp;

/// Reduce 8-bit coverage to `bpp` bits per sample (`coverage >> (8 - bpp)`).
pub fn quantize(pixels: &[u8], bpp: Bpp) -> Vec<u8> {
    let shift = 8 - bpp.bits();
    pixels.iter().map(|&c| c >> shift).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_depths() {
        let coverage = [0u8, 31, 32, 127, 128, 255];
        assert_eq!(quantize(&coverage, Bpp::One), vec![0, 0, 0, 0, 1, 1]);
        assert_eq!(quantize(&coverage, Bpp::Two), vec![0, 0, 0, 1, 2, 3]);
        assert_eq!(quantize(&coverage, Bpp::Three), vec![0, 0, 1, 3, 4, 7]);
        assert_eq!(quantize(&coverage, Bpp::Four), vec![0, 1, 2, 7, 8, 15]);
        assert_eq!(quantize(&coverage, Bpp::Eight), coverage.to_vec());
    }

    #[test]
    fn test_quantize_never_exceeds_max() {
        for bpp in [Bpp::One, Bpp::Two, Bpp::Three, Bpp::Four, Bpp::Eight] {
            let all: Vec<u8> = (0..=255).collect();
            assert!(quantize(&all, bpp).iter().all(|&v| v <= bpp.max_value()));
        }
    }

    #[test]
    fn test_quantize_empty() {
        assert!(quantize(&[], Bpp::Four).is_empty());
    }
}
