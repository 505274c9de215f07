//! DC offset removal
//!
//! Single-pole IIR high-pass applied independently to I and Q:
//!
//! ```text
//! y[n] = x[n] - x[n-1] + ALPHA * y[n-1]
//! ```
//!
//! With the pole at 0.9996 the notch sits on DC and the passband is flat
//! above a few Hz at any usable IQ rate.

use num_complex::Complex32;

/// Pole position of the DC blocker
pub const ALPHA: f32 = 0.9996;

/// DC removal filter with its carry-state (previous input, previous output)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DcRemovalFilter {
    x_prev: Complex32,
    y_prev: Complex32,
}

impl DcRemovalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the carry-state
    pub fn reset(&mut self) {
        self.x_prev = Complex32::new(0.0, 0.0);
        self.y_prev = Complex32::new(0.0, 0.0);
    }

    /// Filter one sample and advance the carry-state
    #[inline(always)]
    pub fn process(&mut self, x: Complex32) -> Complex32 {
        let y = Complex32::new(
            x.re - self.x_prev.re + ALPHA * self.y_prev.re,
            x.im - self.x_prev.im + ALPHA * self.y_prev.im,
        );
        self.x_prev = x;
        self.y_prev = y;
        y
    }

    /// Filter a run of samples in place, in order
    pub fn process_block(&mut self, samples: &mut [Complex32]) {
        for s in samples.iter_mut() {
            *s = self.process(*s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_sequence() -> Vec<Complex32> {
        (0..500)
            .map(|n| {
                let t = n as f32 * 0.05;
                Complex32::new(0.3 + t.sin(), -0.2 + (1.7 * t).cos())
            })
            .collect()
    }

    #[test]
    fn test_first_two_outputs_of_constant_input() {
        let mut filter = DcRemovalFilter::new();
        let x = Complex32::new(1.0, 1.0);

        let y0 = filter.process(x);
        assert_eq!(y0, Complex32::new(1.0, 1.0));

        let y1 = filter.process(x);
        assert_eq!(y1, Complex32::new(ALPHA, ALPHA));
    }

    #[test]
    fn test_deterministic_output() {
        let input = input_sequence();
        let run = |input: &[Complex32]| {
            let mut filter = DcRemovalFilter::new();
            input.iter().map(|&x| filter.process(x)).collect::<Vec<_>>()
        };

        let a = run(&input);
        let b = run(&input);
        let bits = |v: &[Complex32]| {
            v.iter()
                .map(|c| (c.re.to_bits(), c.im.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn test_reset_replays_identically() {
        let input = input_sequence();
        let mut filter = DcRemovalFilter::new();

        let first: Vec<_> = input.iter().map(|&x| filter.process(x)).collect();
        assert_ne!(filter, DcRemovalFilter::new());

        filter.reset();
        let second: Vec<_> = input.iter().map(|&x| filter.process(x)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_dc() {
        let mut filter = DcRemovalFilter::new();
        let x = Complex32::new(1.0, 1.0);
        let mut y = Complex32::new(0.0, 0.0);
        for _ in 0..20_000 {
            y = filter.process(x);
        }
        assert!(y.norm() < 0.01, "DC not rejected: |y| = {}", y.norm());
    }

    #[test]
    fn test_block_matches_per_sample() {
        let input = input_sequence();

        let mut a = DcRemovalFilter::new();
        let expected: Vec<_> = input.iter().map(|&x| a.process(x)).collect();

        let mut b = DcRemovalFilter::new();
        let mut block = input.clone();
        let (head, tail) = block.split_at_mut(123);
        b.process_block(head);
        b.process_block(tail);

        assert_eq!(block, expected);
    }
}
