//! Math utilities and types
//!
//! Pointer coordinates and logical-to-framebuffer scale factors are carried
//! as `nalgebra` vectors.

pub use nalgebra::Vector2;

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// Per-axis scale between logical window units and framebuffer pixels
pub type Scale2 = Vector2<f64>;

/// Scale a logical pointer position into framebuffer space
pub fn scale_point(point: Vec2, scale: Scale2) -> Vec2 {
    #[allow(clippy::cast_possible_truncation)]
    Vec2::new(point.x * scale.x as f32, point.y * scale.y as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scale_point_identity() {
        let p = scale_point(Vec2::new(10.0, 20.0), Scale2::new(1.0, 1.0));
        assert_relative_eq!(p.x, 10.0);
        assert_relative_eq!(p.y, 20.0);
    }

    #[test]
    fn test_scale_point_hidpi() {
        let p = scale_point(Vec2::new(10.0, 20.0), Scale2::new(2.0, 1.5));
        assert_relative_eq!(p.x, 20.0);
        assert_relative_eq!(p.y, 30.0);
    }
}
