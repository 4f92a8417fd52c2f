use crate::error::Error;
use ordered_float::NotNan;
use std::ops::{Add, Mul, Sub};

/// A 2D location, either in heatmap or in image space depending on the stage.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Point {
    x: f32,
    y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Result<Self, Error> {
        Ok(Self {
            x: NotNan::new(x)
                .map_err(|e| Error::ConstructNotNan(e, x))?
                .into_inner(),
            y: NotNan::new(y)
                .map_err(|e| Error::ConstructNotNan(e, y))?
                .into_inner(),
        })
    }

    pub fn squared_distance(self, other: Self) -> f32 {
        let delta = other - self;
        delta.dot(delta)
    }

    pub fn distance(self, other: Self) -> f32 {
        self.squared_distance(other).sqrt()
    }

    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    #[inline]
    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Weighted blend `alpha * self + (1 - alpha) * other`.
    #[inline]
    pub fn blend(self, other: Self, alpha: f32) -> Self {
        self * alpha + other * (1.0 - alpha)
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.y
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::Output {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::Output {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::Output {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Point;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn xy_points() {
        let a = Point::new(0.5, 0.5).unwrap();
        let b = Point::new(1.0, 1.0).unwrap();
        assert_eq!(a.squared_distance(b), 0.5);
    }

    #[test]
    fn nan_is_rejected() {
        assert!(Point::new(f32::NAN, 0.0).is_err());
        assert!(Point::new(0.0, f32::NAN).is_err());
    }

    #[test]
    fn blend_favours_first_operand() {
        let current = Point::new(100.0, 0.0).unwrap();
        let previous = Point::new(0.0, 0.0).unwrap();
        let blended = current.blend(previous, 0.8);
        assert_approx_eq!(blended.x(), 80.0);
        assert_approx_eq!(blended.y(), 0.0);
    }

    #[test]
    fn norm_of_three_four() {
        assert_approx_eq!(Point::new(3.0, 4.0).unwrap().norm(), 5.0);
    }
}
