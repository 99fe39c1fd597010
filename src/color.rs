//! Conversion of perceptual `oklch()` color tokens into RGB-compatible tokens.
//!
//! Chart markup captured from the dashboard may carry `oklch()` values that the
//! downstream SVG decoder does not understand.  [`normalize_css_color`] rewrites
//! those into plain `rgb()`/`rgba()` tokens.  The function is deliberately
//! infallible: anything it cannot parse is returned unchanged, so callers can
//! route every color-valued property through it without error handling.

/// Linear-light threshold below which the transfer function stays linear.
const TRANSFER_THRESHOLD: f64 = 0.0031308;

/// Converts an `oklch()` color token to `rgb()`/`rgba()`.
///
/// Accepted grammar: `oklch(L C H)` or `oklch(L C H / A)` where the lightness
/// is a percentage or a `[0, 1]` decimal, the chroma is a non-negative number,
/// the hue is degrees (optionally suffixed `deg`) or the literal `none`, and
/// the alpha is a number or percentage.
///
/// Any input outside that grammar — including components that parse to `NaN` —
/// is passed through unmodified.  This passthrough is part of the contract:
/// the style inliner feeds every resolved color through here and relies on
/// unknown tokens surviving intact.
pub fn normalize_css_color(input: &str) -> String {
    match parse_oklch(input) {
        Some((l, c, h, alpha)) => format_rgb(oklch_to_rgb(l, c, h), alpha),
        None => input.to_string(),
    }
}

fn parse_oklch(input: &str) -> Option<(f64, f64, f64, Option<f64>)> {
    let trimmed = input.trim();
    // Byte-wise prefix check: slicing the str directly could land inside a
    // multi-byte character and panic, which the passthrough contract rules
    // out.  Once the prefix matches it is ASCII, so offset 6 is a boundary.
    let bytes = trimmed.as_bytes();
    if bytes.len() < 7 || !bytes[..6].eq_ignore_ascii_case(b"oklch(") {
        return None;
    }
    let inner = trimmed[6..].strip_suffix(')')?;

    let (components, alpha_part) = match inner.split_once('/') {
        Some((head, tail)) => (head, Some(tail.trim())),
        None => (inner, None),
    };

    let mut parts = components.split_whitespace();
    let l_raw = parts.next()?;
    let c_raw = parts.next()?;
    let h_raw = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let l = parse_fraction(l_raw)?.clamp(0.0, 1.0);
    let c = parse_number(c_raw)?.max(0.0);
    let h = if h_raw.eq_ignore_ascii_case("none") {
        0.0
    } else {
        parse_number(h_raw.strip_suffix("deg").unwrap_or(h_raw))?.rem_euclid(360.0)
    };

    let alpha = match alpha_part {
        Some(raw) => Some(parse_fraction(raw)?.clamp(0.0, 1.0)),
        None => None,
    };

    Some((l, c, h, alpha))
}

/// Parses a number that may be a percentage; `NaN` is rejected.
fn parse_fraction(raw: &str) -> Option<f64> {
    match raw.strip_suffix('%') {
        Some(percent) => parse_number(percent).map(|v| v / 100.0),
        None => parse_number(raw),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// OKLCH → 8-bit sRGB.
///
/// Decomposes chroma/hue into the two perceptual-plane components, applies the
/// fixed OKLab linear transform (cube the predictors, combine with the matrix
/// coefficients), then companding with a piecewise transfer: linear close to
/// zero, cube-root power above the threshold.  The cube-root branch keeps
/// achromatic inputs on the identity (lightness 0.5 lands on channel 128).
fn oklch_to_rgb(l: f64, c: f64, h: f64) -> [u8; 3] {
    let h_rad = h.to_radians();
    let a = c * h_rad.cos();
    let b = c * h_rad.sin();

    let l_ = l + 0.396_337_777_4 * a + 0.215_803_757_3 * b;
    let m_ = l - 0.105_561_345_8 * a - 0.063_854_172_8 * b;
    let s_ = l - 0.089_484_177_5 * a - 1.291_485_548_0 * b;

    let l3 = l_ * l_ * l_;
    let m3 = m_ * m_ * m_;
    let s3 = s_ * s_ * s_;

    let r = 4.076_741_662_1 * l3 - 3.307_711_591_3 * m3 + 0.230_969_929_2 * s3;
    let g = -1.268_438_004_6 * l3 + 2.609_757_401_1 * m3 - 0.341_319_396_5 * s3;
    let b = -0.004_196_086_3 * l3 - 0.703_418_614_7 * m3 + 1.707_614_701_0 * s3;

    [encode_channel(r), encode_channel(g), encode_channel(b)]
}

fn encode_channel(linear: f64) -> u8 {
    let clamped = linear.clamp(0.0, 1.0);
    let encoded = if clamped <= TRANSFER_THRESHOLD {
        // Continuous with the power branch at the threshold.
        clamped * TRANSFER_THRESHOLD.powf(-2.0 / 3.0)
    } else {
        clamped.cbrt()
    };
    (encoded.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn format_rgb([r, g, b]: [u8; 3], alpha: Option<f64>) -> String {
    match alpha {
        Some(a) if a < 1.0 => format!("rgba({}, {}, {}, {})", r, g, b, format_alpha(a)),
        _ => format!("rgb({}, {}, {})", r, g, b),
    }
}

fn format_alpha(alpha: f64) -> String {
    let formatted = format!("{:.3}", alpha);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(token: &str) -> Vec<u8> {
        let inner = token
            .trim_start_matches("rgba(")
            .trim_start_matches("rgb(")
            .trim_end_matches(')');
        inner
            .split(',')
            .take(3)
            .map(|part| part.trim().parse().unwrap())
            .collect()
    }

    #[test]
    fn passthrough_on_unparseable_input() {
        for input in [
            "",
            "#ff8800",
            "red",
            "oklch(",
            "oklch()",
            "oklch(0.5 0.1)",
            "oklch(0.5 0.1 120 extra junk)",
            "oklch(NaN 0.1 120)",
            "oklch(0.5 NaN 120)",
            "oklch(0.5 0.1 NaN)",
            "oklch(0.5 0.1 120 / NaN)",
            "linear-gradient(oklch(0.5 0 0), white)",
            "oklch€",
            "oklc\u{00e9}(0.5 0 0)",
            "色oklch(0.5 0 0)",
        ] {
            assert_eq!(normalize_css_color(input), input, "input {:?}", input);
        }
    }

    #[test]
    fn reference_mid_gray() {
        let token = normalize_css_color("oklch(0.5 0 none)");
        let rgb = channels(&token);
        for channel in &rgb {
            assert!((126..=130).contains(channel), "channel {} in {}", channel, token);
        }
    }

    #[test]
    fn percentage_lightness_matches_decimal() {
        assert_eq!(
            normalize_css_color("oklch(50% 0 none)"),
            normalize_css_color("oklch(0.5 0 none)")
        );
    }

    #[test]
    fn achromatic_channels_are_equal() {
        for l in ["0", "0.2", "0.35", "0.5", "0.75", "1"] {
            for h in ["0", "90", "215", "none"] {
                let token = normalize_css_color(&format!("oklch({} 0 {})", l, h));
                let rgb = channels(&token);
                assert!(rgb[0].abs_diff(rgb[1]) <= 1, "{}", token);
                assert!(rgb[1].abs_diff(rgb[2]) <= 1, "{}", token);
            }
        }
    }

    #[test]
    fn lightness_extremes() {
        assert_eq!(normalize_css_color("oklch(0 0 0)"), "rgb(0, 0, 0)");
        assert_eq!(normalize_css_color("oklch(1 0 0)"), "rgb(255, 255, 255)");
        // Out-of-range lightness clamps instead of failing.
        assert_eq!(normalize_css_color("oklch(1.7 0 0)"), "rgb(255, 255, 255)");
    }

    #[test]
    fn negative_chroma_clamps_to_achromatic() {
        assert_eq!(
            normalize_css_color("oklch(0.5 -3 120)"),
            normalize_css_color("oklch(0.5 0 120)")
        );
    }

    #[test]
    fn hue_wraps_at_360() {
        assert_eq!(
            normalize_css_color("oklch(0.6 0.1 450)"),
            normalize_css_color("oklch(0.6 0.1 90)")
        );
        assert_eq!(
            normalize_css_color("oklch(0.6 0.1 -90deg)"),
            normalize_css_color("oklch(0.6 0.1 270)")
        );
    }

    #[test]
    fn alpha_produces_rgba() {
        let token = normalize_css_color("oklch(0.5 0 0 / 0.5)");
        assert!(token.starts_with("rgba("), "{}", token);
        assert!(token.ends_with("0.5)"), "{}", token);

        let percent = normalize_css_color("oklch(0.5 0 0 / 50%)");
        assert_eq!(token, percent);

        // Full opacity collapses to rgb.
        assert!(normalize_css_color("oklch(0.5 0 0 / 1)").starts_with("rgb("));
    }
}
