use glam::DVec3;

/// 8-bit RGB colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `#rgb` or one of the few CSS names the default styles use.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return match hex.len() {
                6 => Some(Self::new(
                    u8::from_str_radix(&hex[0..2], 16).ok()?,
                    u8::from_str_radix(&hex[2..4], 16).ok()?,
                    u8::from_str_radix(&hex[4..6], 16).ok()?,
                )),
                3 => {
                    let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
                    Some(Self::new(digit(0)?, digit(1)?, digit(2)?))
                }
                _ => None,
            };
        }

        match s.to_ascii_lowercase().as_str() {
            "white" => Some(Self::new(255, 255, 255)),
            "black" => Some(Self::new(0, 0, 0)),
            "grey" | "gray" => Some(Self::new(128, 128, 128)),
            "red" => Some(Self::new(255, 0, 0)),
            "green" => Some(Self::new(0, 128, 0)),
            "blue" => Some(Self::new(0, 0, 255)),
            "yellow" => Some(Self::new(255, 255, 0)),
            "orange" => Some(Self::new(255, 165, 0)),
            _ => None,
        }
    }

    /// Round and clamp each channel of a point in RGB space.
    pub fn from_vec(v: DVec3) -> Self {
        let channel = |c: f64| c.round().clamp(0.0, 255.0) as u8;
        Self::new(channel(v.x), channel(v.y), channel(v.z))
    }

    pub fn to_vec(self) -> DVec3 {
        DVec3::new(self.r as f64, self.g as f64, self.b as f64)
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
