//! Optical calibration derived from resolution and field of view
//!
//! Values are recomputed from scratch whenever the active video mode or the
//! field of view changes; nothing here is updated in place.

use crate::types::Resolution;
use serde::{Deserialize, Serialize};

/// Diagonal field of view used when none is configured, in degrees
pub const DEFAULT_FOV: f64 = 60.8;

/// Geometric quantities consumed by the vision algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationValues {
    /// Diagonal field of view in degrees
    pub field_of_view: f64,
    pub image_width: u32,
    pub image_height: u32,
    /// Horizontal view angle in radians
    pub horizontal_view: f64,
    /// Vertical view angle in radians
    pub vertical_view: f64,
    /// Focal length in pixels
    pub focal_length: f64,
    /// Principal point, x
    pub center_x: f64,
    /// Principal point, y
    pub center_y: f64,
}

impl CalibrationValues {
    pub fn compute(resolution: Resolution, field_of_view: f64) -> Self {
        let width = f64::from(resolution.width);
        let height = f64::from(resolution.height);
        let diagonal = width.hypot(height);
        let half_diagonal_view = (field_of_view.to_radians() / 2.0).tan();

        let horizontal_view = (half_diagonal_view * (width / diagonal)).atan() * 2.0;
        let vertical_view = (half_diagonal_view * (height / diagonal)).atan() * 2.0;
        let focal_length = width / (2.0 * (horizontal_view / 2.0).tan());

        Self {
            field_of_view,
            image_width: resolution.width,
            image_height: resolution.height,
            horizontal_view,
            vertical_view,
            focal_length,
            center_x: width / 2.0 - 0.5,
            center_y: height / 2.0 - 0.5,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image_width, self.image_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_principal_point_is_image_center() {
        let values = CalibrationValues::compute(Resolution::new(640, 480), DEFAULT_FOV);
        assert!(approx(values.center_x, 319.5));
        assert!(approx(values.center_y, 239.5));
    }

    #[test]
    fn test_view_angles_split_diagonal() {
        // 3-4-5 triangle: tan(h/2) = tan(d/2) * 4/5
        let values = CalibrationValues::compute(Resolution::new(640, 480), 90.0);
        assert!(approx((values.horizontal_view / 2.0).tan(), 0.8));
        assert!(approx((values.vertical_view / 2.0).tan(), 0.6));
        assert!(approx(values.focal_length, 640.0 / (2.0 * 0.8)));
    }

    #[test]
    fn test_focal_length_scales_with_width() {
        let small = CalibrationValues::compute(Resolution::new(320, 240), DEFAULT_FOV);
        let large = CalibrationValues::compute(Resolution::new(640, 480), DEFAULT_FOV);
        assert!(approx(large.focal_length, small.focal_length * 2.0));
        assert!(approx(large.horizontal_view, small.horizontal_view));
    }

    #[test]
    fn test_wider_fov_shortens_focal_length() {
        let narrow = CalibrationValues::compute(Resolution::new(640, 480), 50.0);
        let wide = CalibrationValues::compute(Resolution::new(640, 480), 90.0);
        assert!(wide.focal_length < narrow.focal_length);
        assert_eq!(wide.resolution(), Resolution::new(640, 480));
    }
}
