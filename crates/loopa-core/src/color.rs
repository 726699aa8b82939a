//! Hex colour helpers. Colours are stored as `RRGGBB` (or `RGB`) strings
//! without the leading `#`, although a `#` prefix is tolerated on input.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Parses a 3- or 6-digit hex colour.
pub fn parse_hex(hex: &str) -> Option<Rgb> {
    let clean = hex.trim().trim_start_matches('#');
    let full: String = match clean.len() {
        3 => clean.chars().flat_map(|c| [c, c]).collect(),
        6 => clean.to_string(),
        _ => return None,
    };
    let num = u32::from_str_radix(&full, 16).ok()?;
    Some(Rgb {
        r: ((num >> 16) & 0xff) as u8,
        g: ((num >> 8) & 0xff) as u8,
        b: (num & 0xff) as u8,
    })
}

pub fn is_valid_hex(hex: &str) -> bool {
    parse_hex(hex).is_some()
}

/// Composes an upper-case `RRGGBB` string, rounding and clamping each channel.
pub fn to_hex(r: f64, g: f64, b: f64) -> String {
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    format!("{:02X}{:02X}{:02X}", channel(r), channel(g), channel(b))
}

/// Per-channel linear interpolation. `None` if either side is not a valid colour.
pub fn lerp_hex(a: &str, b: &str, t: f64) -> Option<String> {
    let a = parse_hex(a)?;
    let b = parse_hex(b)?;
    let lerp = |x: u8, y: u8| x as f64 + (y as f64 - x as f64) * t;
    Some(to_hex(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b)))
}

/// `[r, g, b, 1]` with channels in `0..=1`, as Lottie expects. Invalid input is black.
pub fn to_unit_rgba(hex: &str) -> Vec<f64> {
    let c = parse_hex(hex).unwrap_or(Rgb { r: 0, g: 0, b: 0 });
    vec![
        c.r as f64 / 255.0,
        c.g as f64 / 255.0,
        c.b as f64 / 255.0,
        1.0,
    ]
}

/// `#RRGGBB` for markup attributes.
pub fn css(hex: &str) -> String {
    format!("#{}", hex.trim().trim_start_matches('#'))
}

pub fn rgba_css(hex: &str, alpha: f64) -> String {
    let c = parse_hex(hex).unwrap_or(Rgb { r: 0, g: 0, b: 0 });
    format!("rgba({},{},{},{})", c.r, c.g, c.b, alpha)
}
