use crate::{error::Error, point::Point};
use num_traits::ToPrimitive;

/// Border added around the resized frame before inference, in network-input pixels.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Padding {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

/// Mapping between original-image space and upsampled heatmap space.
///
/// The network sees the frame resized by `scale` and padded by `pad` up to a
/// multiple of `stride`; its output is upsampled by `upsample_ratio` before
/// decoding.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameGeometry {
    scale: f32,
    pad: Padding,
    stride: u8,
    upsample_ratio: u8,
}

fn round_up_to_multiple(value: f32, multiple: f32) -> f32 {
    (value / multiple).ceil() * multiple
}

impl FrameGeometry {
    pub fn new(scale: f32, pad: Padding, stride: u8, upsample_ratio: u8) -> Result<Self, Error> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::InvalidGeometry("scale must be positive and finite"));
        }
        if stride == 0 || upsample_ratio == 0 {
            return Err(Error::InvalidGeometry(
                "stride and upsample ratio must be non-zero",
            ));
        }
        Ok(Self {
            scale,
            pad,
            stride,
            upsample_ratio,
        })
    }

    /// Geometry of a `width` x `height` frame resized to `net_input_height` rows
    /// and centre-padded to a multiple of `stride`.
    pub fn for_frame(
        width: u16,
        height: u16,
        net_input_height: u16,
        stride: u8,
        upsample_ratio: u8,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 || net_input_height == 0 {
            return Err(Error::InvalidGeometry(
                "frame dims and network input height must be non-zero",
            ));
        }
        if stride == 0 {
            return Err(Error::InvalidGeometry("stride must be non-zero"));
        }

        let net_height = f32::from(net_input_height);
        let stride_f = f32::from(stride);
        let scale = net_height / f32::from(height);
        let scaled_width = (f32::from(width) * scale).round();
        let scaled_height = (f32::from(height) * scale).round().min(net_height);

        let padded_height = round_up_to_multiple(net_height, stride_f);
        let padded_width = round_up_to_multiple(scaled_width.max(net_height), stride_f);

        let top = ((padded_height - scaled_height) / 2.0).floor();
        let left = ((padded_width - scaled_width) / 2.0).floor();
        let pad = Padding {
            top,
            left,
            bottom: padded_height - scaled_height - top,
            right: padded_width - scaled_width - left,
        };

        Self::new(scale, pad, stride, upsample_ratio)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn pad(&self) -> Padding {
        self.pad
    }

    /// Size of the padded network input as `(width, height)`.
    pub fn padded_dims(&self, width: u16, height: u16) -> Result<(usize, usize), Error> {
        let padded_width = (f32::from(width) * self.scale).round() + self.pad.left + self.pad.right;
        let padded_height = (f32::from(height) * self.scale).round() + self.pad.top + self.pad.bottom;
        Ok((
            padded_width.to_usize().ok_or(Error::ConvertToUSize)?,
            padded_height.to_usize().ok_or(Error::ConvertToUSize)?,
        ))
    }

    #[inline]
    fn heatmap_to_input(&self) -> f32 {
        f32::from(self.stride) / f32::from(self.upsample_ratio)
    }

    /// Map a heatmap-space location back to original-image coordinates.
    pub fn to_image(&self, point: Point) -> Result<Point, Error> {
        let factor = self.heatmap_to_input();
        Point::new(
            (point.x() * factor - self.pad.left) / self.scale,
            (point.y() * factor - self.pad.top) / self.scale,
        )
    }

    /// Map an original-image location into heatmap space.
    pub fn to_heatmap(&self, point: Point) -> Result<Point, Error> {
        let factor = self.heatmap_to_input();
        Point::new(
            (point.x() * self.scale + self.pad.left) / factor,
            (point.y() * self.scale + self.pad.top) / factor,
        )
    }
}
