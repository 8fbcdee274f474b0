//! Chart colour schemas and colour parsing.

use lightningcss::traits::Parse;
use lightningcss::values::color::{CssColor, SRGB};
use palette::Srgba;

use crate::error::{ExportError, ExportResult};

/// The chart's grey colour schema, lightest to darkest.
pub const GREY: [&str; 9] = [
    "#F8F8FA", "#EFF2F5", "#D2D6DF", "#C3C6CF", "#ADB0B6", "#666A73", "#45494E", "#363A43",
    "#282C35",
];

/// Returns the grey schema entry at `index`, if there is one.
pub fn grey(index: usize) -> Option<&'static str> {
    GREY.get(index).copied()
}

/// Parses a CSS colour: keywords (`white`, `transparent`), hex,
/// `rgb()`/`rgba()`, `hsl()` and the other sRGB-convertible notations.
pub fn parse_color(value: &str) -> ExportResult<Srgba<u8>> {
    let value = value.trim();
    let unsupported = || ExportError::InvalidConfiguration(format!("unsupported colour {value:?}"));

    match CssColor::parse_string(value).map_err(|_| unsupported())? {
        CssColor::RGBA(rgba) => Ok(Srgba::new(rgba.red, rgba.green, rgba.blue, rgba.alpha)),
        other => {
            let srgb = SRGB::try_from(&other).map_err(|_| unsupported())?;
            Ok(Srgba::new(
                channel(srgb.r),
                channel(srgb.g),
                channel(srgb.b),
                channel(srgb.alpha),
            ))
        }
    }
}

fn channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_grey_is_seventh_entry() {
        assert_eq!(grey(6), Some("#45494E"));
        assert_eq!(grey(9), None);
    }

    #[test]
    fn parses_named_and_hex_colors() {
        assert_eq!(parse_color("white").unwrap(), Srgba::new(255, 255, 255, 255));
        assert_eq!(parse_color("White").unwrap(), Srgba::new(255, 255, 255, 255));
        assert_eq!(parse_color("#45494E").unwrap(), Srgba::new(0x45, 0x49, 0x4e, 255));
        assert_eq!(parse_color("#fff").unwrap(), Srgba::new(255, 255, 255, 255));
    }

    #[test]
    fn parses_functional_and_transparent_colors() {
        assert_eq!(parse_color("transparent").unwrap(), Srgba::new(0, 0, 0, 0));
        assert_eq!(parse_color("rgb(10, 20, 30)").unwrap(), Srgba::new(10, 20, 30, 255));
        assert_eq!(parse_color("rgba(10, 20, 30, 0)").unwrap().alpha, 0);
        assert_eq!(parse_color("hsl(0, 100%, 50%)").unwrap(), Srgba::new(255, 0, 0, 255));
    }

    #[test]
    fn rejects_unknown_colors() {
        assert!(parse_color("not-a-colour").is_err());
        assert!(parse_color("#zzzzzz").is_err());
    }
}
