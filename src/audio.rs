use std::ops::{Add, AddAssign, Mul};

/// A single multi-channel audio frame.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Frame<const N: usize>([f32; N]);

impl<const N: usize> Frame<N> {
    pub const ZERO: Frame<N> = Frame([0.0; N]);

    pub fn new(samples: [f32; N]) -> Frame<N> {
        Self(samples)
    }

    pub fn channel(&self, index: usize) -> f32 {
        self.0[index]
    }

    fn channel_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.0[index]
    }

    pub fn map<F>(&self, mut f: F) -> Frame<N>
    where
        F: FnMut(f32) -> f32,
    {
        let mut output = Self::ZERO;
        for ch in 0..N {
            *output.channel_mut(ch) = f(self.channel(ch))
        }
        output
    }

    fn zip<F>(&self, other: Frame<N>, mut f: F) -> Frame<N>
    where
        F: FnMut(f32, f32) -> f32,
    {
        let mut output = Self::ZERO;
        for ch in 0..N {
            *output.channel_mut(ch) = f(self.channel(ch), other.channel(ch));
        }
        output
    }
}

impl<const N: usize> Add for Frame<N> {
    type Output = Frame<N>;

    fn add(self, other: Frame<N>) -> Self::Output {
        self.zip(other, |a, b| a + b)
    }
}

impl<const N: usize> AddAssign for Frame<N> {
    fn add_assign(&mut self, other: Frame<N>) {
        *self = *self + other;
    }
}

impl<const N: usize> Mul<f32> for Frame<N> {
    type Output = Frame<N>;

    fn mul(self, other: f32) -> Self::Output {
        self.map(|sample| sample * other)
    }
}

pub type Stereo = Frame<2>;

pub type Buffer = Vec<Stereo>;

impl Stereo {
    /// Spread a mono sample across both channels.
    pub fn splat(sample: f32) -> Stereo {
        Frame::new([sample, sample])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_add() {
        let a = Frame::new([0.5, 0.75]);
        let b = Frame::new([0.25, 0.25]);
        assert_eq!(a + b, Frame::new([0.75, 1.0]));
    }

    #[test]
    fn frame_add_assign() {
        let mut a = Frame::new([0.5, 0.75]);
        a += Frame::new([0.25, 0.25]);
        assert_eq!(a, Frame::new([0.75, 1.0]));
    }

    #[test]
    fn frame_scale() {
        let a = Frame::new([0.5, 0.2]);
        assert_eq!(a * 0.5, Frame::new([0.25, 0.1]));
    }

    #[test]
    fn splat_copies_both_channels() {
        let f = Stereo::splat(0.3);
        assert_eq!(f.channel(0), f.channel(1));
    }
}
