/// A single scalar channel plane, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self::new(width, height, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Minimum and maximum over finite values. Returns `(0, 0)` for an
    /// empty or all-NaN plane.
    pub fn min_max(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in &self.data {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if lo > hi { (0.0, 0.0) } else { (lo, hi) }
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(self.width, self.height, self.data.iter().map(|&v| f(v)).collect())
    }

    /// Affinely map this plane's own `[min, max]` onto `[lo, hi]`.
    /// A constant plane maps to `lo`.
    pub fn rescale_to(&self, lo: f32, hi: f32) -> Self {
        let (min, max) = self.min_max();
        let range = max - min;
        if range <= 0.0 || !range.is_finite() {
            return Self::filled(self.width, self.height, lo);
        }
        let scale = (hi - lo) / range;
        self.map(|v| lo + (v - min) * scale)
    }

    /// Min-max normalize to `[0, 1]`.
    pub fn normalized(&self) -> Self {
        self.rescale_to(0.0, 1.0)
    }
}

/// Multi-channel image stored interleaved as (height, width, channels).
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<f32>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels);
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Stack equally sized planes along a trailing channel axis.
    pub fn from_planes(planes: &[Plane]) -> Option<Self> {
        let first = planes.first()?;
        if planes
            .iter()
            .any(|p| p.width != first.width || p.height != first.height)
        {
            return None;
        }
        let channels = planes.len();
        let mut data = Vec::with_capacity(first.len() * channels);
        for i in 0..first.len() {
            for p in planes {
                data.push(p.data[i]);
            }
        }
        Some(Self::new(first.width, first.height, channels, data))
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels)
    }

    /// Extract one channel as its own plane.
    pub fn channel(&self, index: usize) -> Option<Plane> {
        if index >= self.channels {
            return None;
        }
        let data = self
            .data
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect();
        Some(Plane::new(self.width, self.height, data))
    }

    /// Swap the height and width axes.
    pub fn transposed(&self) -> Self {
        let (w, h, c) = (self.width as usize, self.height as usize, self.channels);
        let mut data = vec![0.0f32; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let src = (y * w + x) * c;
                let dst = (x * h + y) * c;
                data[dst..dst + c].copy_from_slice(&self.data[src..src + c]);
            }
        }
        Self::new(self.height, self.width, c, data)
    }
}
