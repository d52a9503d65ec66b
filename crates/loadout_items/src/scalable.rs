//! Level-scaled float values

use serde::{Deserialize, Serialize};

/// A float that scales with item level.
///
/// The curve is a sparse list of `(level, multiplier)` points; the value
/// at a level is the base times the multiplier of the greatest point at
/// or below that level, or the base alone below the first point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalableFloat {
    base: f32,
    curve: Vec<(u8, f32)>,
}

impl ScalableFloat {
    /// A value that ignores level
    pub fn constant(base: f32) -> Self {
        Self {
            base,
            curve: Vec::new(),
        }
    }

    /// Add a curve point, keeping points sorted by level
    pub fn with_point(mut self, level: u8, multiplier: f32) -> Self {
        match self.curve.binary_search_by_key(&level, |(l, _)| *l) {
            Ok(i) => self.curve[i] = (level, multiplier),
            Err(i) => self.curve.insert(i, (level, multiplier)),
        }
        self
    }

    /// Base value before scaling
    #[inline]
    pub fn base(&self) -> f32 {
        self.base
    }

    /// Value at the given level
    pub fn value_at(&self, level: u8) -> f32 {
        let multiplier = self
            .curve
            .iter()
            .take_while(|(l, _)| *l <= level)
            .last()
            .map(|(_, m)| *m)
            .unwrap_or(1.0);
        self.base * multiplier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let v = ScalableFloat::constant(10.0);
        assert_eq!(v.value_at(1), 10.0);
        assert_eq!(v.value_at(100), 10.0);
    }

    #[test]
    fn test_curve_steps() {
        let v = ScalableFloat::constant(10.0)
            .with_point(5, 2.0)
            .with_point(10, 4.0);
        assert_eq!(v.value_at(1), 10.0);
        assert_eq!(v.value_at(5), 20.0);
        assert_eq!(v.value_at(7), 20.0);
        assert_eq!(v.value_at(10), 40.0);
        assert_eq!(v.value_at(200), 40.0);
    }

    #[test]
    fn test_point_replacement() {
        let v = ScalableFloat::constant(1.0)
            .with_point(3, 2.0)
            .with_point(3, 5.0);
        assert_eq!(v.value_at(3), 5.0);
    }

    #[test]
    fn test_authoring_roundtrip() {
        let v = ScalableFloat::constant(10.0).with_point(5, 2.0);
        let json = serde_json::to_string(&v).unwrap();
        let back: ScalableFloat = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
