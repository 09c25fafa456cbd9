use crate::graph::{FilterOp, ParamValue};
use crate::schema::ClipSpec;

/// Angles and hue shifts smaller than this are treated as "not set".
const NUMERIC_TOLERANCE: f64 = 0.001;

/// One pixel-level adjustment applied to a clip before it is encoded to an
/// intermediate. Ops compose in the order the chain lists them.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorOp {
    Hue { degrees: f64 },
    Eq { contrast: f64, brightness: f64 },
    Rotate { radians: f64 },
    FlipH,
    FlipV,
    Invert,
}

impl ColorOp {
    pub fn to_filter_op(&self) -> FilterOp {
        match self {
            Self::Hue { degrees } => FilterOp::new("hue").param("h", ParamValue::lit(degrees)),
            Self::Eq {
                contrast,
                brightness,
            } => FilterOp::new("eq")
                .param("contrast", ParamValue::lit(contrast))
                .param("brightness", ParamValue::lit(brightness)),
            Self::Rotate { radians } => FilterOp::new("rotate")
                .pos(ParamValue::lit(radians))
                .param("fillcolor", ParamValue::lit("black")),
            Self::FlipH => FilterOp::new("hflip"),
            Self::FlipV => FilterOp::new("vflip"),
            Self::Invert => FilterOp::new("negate"),
        }
    }

    pub fn render(&self) -> String {
        self.to_filter_op().render()
    }
}

/// Build the transform chain for a clip, in the fixed order
/// hue, eq, rotate, flips, invert. Fields left at their defaults emit
/// nothing; an empty chain means the clip needs no `-vf` at all.
pub fn color_chain(spec: &ClipSpec) -> Vec<ColorOp> {
    let mut ops = Vec::new();

    if let Some(hue) = spec.hue {
        if hue.abs() > NUMERIC_TOLERANCE {
            ops.push(ColorOp::Hue { degrees: hue });
        }
    }

    if spec.contrast.is_some() || spec.brightness.is_some() {
        let contrast = spec.contrast.unwrap_or(1.0);
        // Brightness arrives as a 0..2 multiplier; ffmpeg's eq wants a
        // signed offset.
        let brightness = (spec.brightness.unwrap_or(1.0) - 1.0).clamp(-1.0, 1.0);
        ops.push(ColorOp::Eq {
            contrast,
            brightness,
        });
    }

    if let Some(rotate) = spec.rotate {
        if rotate.abs() > NUMERIC_TOLERANCE {
            ops.push(ColorOp::Rotate {
                radians: rotate.to_radians(),
            });
        }
    }

    if spec.flip_h {
        ops.push(ColorOp::FlipH);
    }
    if spec.flip_v {
        ops.push(ColorOp::FlipV);
    }
    if spec.invert {
        ops.push(ColorOp::Invert);
    }

    ops
}

/// Render a chain to a `-vf` argument. `None` when there is nothing to do.
pub fn render_chain(ops: &[ColorOp]) -> Option<String> {
    if ops.is_empty() {
        return None;
    }
    Some(
        ops.iter()
            .map(ColorOp::render)
            .collect::<Vec<_>>()
            .join(","),
    )
}
