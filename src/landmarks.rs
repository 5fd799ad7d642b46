use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("Landmark set is empty")]
    Empty,
}

/// Keypoint in image-relative coordinates, both axes in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarkSet {
    pub points: Vec<Point>,
}

pub type FeatureVector = Vec<f32>;

impl HandLandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Per-axis minimum and maximum over all points.
    pub fn bounds(&self) -> Result<(Point, Point), LandmarkError> {
        let first = self.points.first().ok_or(LandmarkError::Empty)?;
        let init = (*first, *first);
        Ok(self.points.iter().fold(init, |(min, max), p| {
            (
                Point::new(min.x.min(p.x), min.y.min(p.y)),
                Point::new(max.x.max(p.x), max.y.max(p.y)),
            )
        }))
    }
}

/// Shifts the landmarks so the hand's bounding-box corner sits at the origin,
/// flattens the `(x, y)` pairs and pads with zeros or truncates to `expected_len`.
///
/// No scale normalization is applied, so the same gesture held closer to the
/// camera produces larger values.
pub fn normalize(
    landmarks: &HandLandmarkSet,
    expected_len: usize,
) -> Result<FeatureVector, LandmarkError> {
    let (min, _) = landmarks.bounds()?;

    let mut features: FeatureVector = landmarks
        .points
        .iter()
        .flat_map(|p| [p.x - min.x, p.y - min.y])
        .take(expected_len)
        .collect();
    features.resize(expected_len, 0.0);

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(coords: &[(f32, f32)]) -> HandLandmarkSet {
        HandLandmarkSet::new(coords.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    #[test]
    fn test_normalize_shifts_to_origin() {
        let landmarks = hand(&[(0.5, 0.25), (0.75, 0.5), (0.25, 0.75)]);
        let features = normalize(&landmarks, 6).unwrap();
        assert_eq!(features, vec![0.25, 0.0, 0.5, 0.25, 0.0, 0.5]);
    }

    #[test]
    fn test_normalize_length_is_always_expected() {
        let landmarks = hand(&[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);
        for expected_len in [0, 1, 4, 6, 7, 42] {
            let features = normalize(&landmarks, expected_len).unwrap();
            assert_eq!(features.len(), expected_len);
        }
    }

    #[test]
    fn test_normalize_pads_with_zeros() {
        let landmarks = hand(&[(0.5, 0.5), (0.75, 1.0)]);
        let features = normalize(&landmarks, 6).unwrap();
        assert_eq!(features, vec![0.0, 0.0, 0.25, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_truncates_in_landmark_order() {
        let landmarks = hand(&[(0.0, 0.0), (0.5, 0.25), (0.75, 1.0)]);
        let features = normalize(&landmarks, 3).unwrap();
        assert_eq!(features, vec![0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_normalize_is_translation_invariant() {
        let base = [(0.125, 0.25), (0.375, 0.5), (0.25, 0.625), (0.5, 0.125)];
        let shifted: Vec<(f32, f32)> = base.iter().map(|&(x, y)| (x + 0.25, y + 0.125)).collect();

        let a = normalize(&hand(&base), 10).unwrap();
        let b = normalize(&hand(&shifted), 10).unwrap();
        for (lhs, rhs) in a.iter().zip(b.iter()) {
            assert!((lhs - rhs).abs() < 1e-6, "{lhs} != {rhs}");
        }
    }

    #[test]
    fn test_normalize_rejects_empty_set() {
        let landmarks = HandLandmarkSet::new(vec![]);
        assert_eq!(normalize(&landmarks, 42), Err(LandmarkError::Empty));
    }

    #[test]
    fn test_bounds() {
        let landmarks = hand(&[(0.4, 0.9), (0.1, 0.3), (0.7, 0.5)]);
        let (min, max) = landmarks.bounds().unwrap();
        assert_eq!(min, Point::new(0.1, 0.3));
        assert_eq!(max, Point::new(0.7, 0.9));
    }
}
