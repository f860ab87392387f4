//! Fixed-binning monitor histograms filled during conversion and event
//! building. These replace nothing fancy: equal-width bins, saturating
//! counts, under/overflow kept separately.

use ndarray::Array2;

/// A 1D histogram with equal-width bins over [low, high)
#[derive(Debug, Clone)]
pub struct Hist1D {
    low: f64,
    high: f64,
    counts: Vec<u32>,
    underflow: u64,
    overflow: u64,
}

impl Hist1D {
    pub fn new(bins: usize, low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            counts: vec![0; bins],
            underflow: 0,
            overflow: 0,
        }
    }

    fn bin_index(&self, value: f64) -> Option<usize> {
        if value < self.low {
            None
        } else {
            let idx = ((value - self.low) / (self.high - self.low) * self.counts.len() as f64)
                .floor() as usize;
            if idx < self.counts.len() {
                Some(idx)
            } else {
                None
            }
        }
    }

    pub fn fill(&mut self, value: f64) {
        match self.bin_index(value) {
            Some(idx) => self.counts[idx] = self.counts[idx].saturating_add(1),
            None if value < self.low => self.underflow += 1,
            None => self.overflow += 1,
        }
    }

    /// Count in the bin that the given value falls into
    pub fn count_at(&self, value: f64) -> u32 {
        self.bin_index(value).map(|i| self.counts[i]).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn underflow(&self) -> u64 {
        self.underflow
    }

    pub fn overflow(&self) -> u64 {
        self.overflow
    }
}

/// A 2D histogram with equal-width bins on both axes
#[derive(Debug, Clone)]
pub struct Hist2D {
    xlow: f64,
    xhigh: f64,
    ylow: f64,
    yhigh: f64,
    counts: Array2<u32>,
}

impl Hist2D {
    pub fn new(xbins: usize, xlow: f64, xhigh: f64, ybins: usize, ylow: f64, yhigh: f64) -> Self {
        Self {
            xlow,
            xhigh,
            ylow,
            yhigh,
            counts: Array2::zeros((xbins, ybins)),
        }
    }

    fn bin_index(value: f64, low: f64, high: f64, bins: usize) -> Option<usize> {
        if value < low {
            return None;
        }
        let idx = ((value - low) / (high - low) * bins as f64).floor() as usize;
        if idx < bins {
            Some(idx)
        } else {
            None
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        let (xbins, ybins) = self.counts.dim();
        if let (Some(i), Some(j)) = (
            Self::bin_index(x, self.xlow, self.xhigh, xbins),
            Self::bin_index(y, self.ylow, self.yhigh, ybins),
        ) {
            self.counts[[i, j]] = self.counts[[i, j]].saturating_add(1);
        }
    }

    /// Count in the bin that the given coordinates fall into
    pub fn count_at(&self, x: f64, y: f64) -> u32 {
        let (xbins, ybins) = self.counts.dim();
        match (
            Self::bin_index(x, self.xlow, self.xhigh, xbins),
            Self::bin_index(y, self.ylow, self.yhigh, ybins),
        ) {
            (Some(i), Some(j)) => self.counts[[i, j]],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hist1d_fill() {
        let mut h = Hist1D::new(10, 0.0, 100.0);
        h.fill(5.0);
        h.fill(5.0);
        h.fill(99.9);
        h.fill(-1.0);
        h.fill(100.0);
        assert_eq!(h.count_at(5.0), 2);
        assert_eq!(h.count_at(95.0), 1);
        assert_eq!(h.underflow(), 1);
        assert_eq!(h.overflow(), 1);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn test_hist1d_negative_range() {
        let mut h = Hist1D::new(100, -50.0, 50.0);
        h.fill(-25.0);
        assert_eq!(h.count_at(-25.0), 1);
        assert_eq!(h.count_at(25.0), 0);
    }

    #[test]
    fn test_hist2d_fill() {
        let mut h = Hist2D::new(10, 0.0, 100.0, 10, 0.0, 100.0);
        h.fill(15.0, 85.0);
        h.fill(85.0, 15.0);
        assert_eq!(h.count_at(15.0, 85.0), 1);
        assert_eq!(h.count_at(85.0, 15.0), 1);
        assert_eq!(h.count_at(15.0, 15.0), 0);
        assert_eq!(h.total(), 2);
    }
}
