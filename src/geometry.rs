use crate::error::BoxError;

/// Axis-aligned box in image coordinates (y grows downward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, BoxError> {
        // Negated comparisons so that NaN coordinates are rejected too.
        if !(x2 >= x1) || !(y2 >= y1) {
            return Err(BoxError::Inverted { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> f64 {
        self.x1
    }

    pub fn y1(&self) -> f64 {
        self.y1
    }

    pub fn x2(&self) -> f64 {
        self.x2
    }

    pub fn y2(&self) -> f64 {
        self.y2
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center_x(&self) -> f64 {
        (self.x1 + self.x2) * 0.5
    }

    pub fn center_y(&self) -> f64 {
        (self.y1 + self.y2) * 0.5
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }
}

/// One symbol reported by the external detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedSymbol {
    /// Raw class label as emitted by the model, e.g. `digit_3`.
    pub label: String,
    /// Canonical text used in the expression grammar, e.g. `3`.
    pub token: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    pub bbox: BoundingBox,
}

impl DetectedSymbol {
    pub fn new(
        label: impl Into<String>,
        token: impl Into<String>,
        score: f64,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
            score,
            bbox,
        }
    }
}

/// Snapshot of all detections for one inference call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolSet {
    pub image_width: u32,
    pub image_height: u32,
    pub symbols: Vec<DetectedSymbol>,
}

impl SymbolSet {
    pub fn new(image_width: u32, image_height: u32, symbols: Vec<DetectedSymbol>) -> Self {
        Self {
            image_width,
            image_height,
            symbols,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_accessors() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 60.0).unwrap();
        assert_eq!(b.width(), 20.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.center_x(), 20.0);
        assert_eq!(b.center_y(), 40.0);
    }

    #[test]
    fn degenerate_box_is_allowed() {
        let b = BoundingBox::new(5.0, 5.0, 5.0, 5.0).unwrap();
        assert_eq!(b.width(), 0.0);
    }

    #[test]
    fn inverted_box_is_rejected() {
        assert!(BoundingBox::new(10.0, 0.0, 9.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 10.0, 1.0, 9.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn union_covers_both() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
        let b = BoundingBox::new(20.0, -5.0, 25.0, 8.0).unwrap();
        let u = a.union(&b);
        assert_eq!((u.x1(), u.y1(), u.x2(), u.y2()), (0.0, -5.0, 25.0, 10.0));
    }
}
