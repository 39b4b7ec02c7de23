use serde::{Deserialize, Serialize};

/// Color representation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid color: {value}"))
    }
}

impl From<Color> for String {
    fn from(val: Color) -> Self {
        val.to_hex()
    }
}

impl Color {
    /// Transparent color.
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    /// Red color.
    pub const RED: Color = Color::rgba(255, 0, 0, 255);
    /// Green color.
    pub const GREEN: Color = Color::rgba(0, 128, 0, 255);
    /// Blue color.
    pub const BLUE: Color = Color::rgba(0, 0, 255, 255);
    /// White color.
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    /// Black color.
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    /// Gray color.
    pub const GRAY: Color = Color::rgba(128, 128, 128, 255);

    /// Constructs color from its RGBA channels.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Converts the color into the theme HEX8 form: `#AARRGGBB`.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.a, self.r, self.g, self.b)
    }

    /// Parses a color as written in render themes.
    ///
    /// Accepted forms are `#RGB`, `#RRGGBB`, `#AARRGGBB` (note that alpha comes first) and a few
    /// basic color names. Returns `None` for anything else, which themes treat as "no color".
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let Some(hex) = value.strip_prefix('#') else {
            return Self::from_name(value);
        };
        if !hex.is_ascii() {
            return None;
        }

        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
                Some(Self::rgba(digit(0)?, digit(1)?, digit(2)?, 255))
            }
            6 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::rgba(byte(2)?, byte(4)?, byte(6)?, byte(0)?)),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "transparent" => Self::TRANSPARENT,
            "black" => Self::BLACK,
            "white" => Self::WHITE,
            "red" => Self::RED,
            "green" => Self::GREEN,
            "blue" => Self::BLUE,
            "gray" | "grey" => Self::GRAY,
            "yellow" => Self::rgba(255, 255, 0, 255),
            "orange" => Self::rgba(255, 165, 0, 255),
            _ => return None,
        })
    }

    /// Returns a new color instance, copied from the base one but with the given alpha channel.
    pub fn with_alpha(&self, a: u8) -> Self {
        Self { a, ..*self }
    }

    /// Returns true if the color is fully transparent (`a == 0`).
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    /// Red component of the color in RGBA space.
    pub fn r(&self) -> u8 {
        self.r
    }

    /// Green component of the color in RGBA space.
    pub fn g(&self) -> u8 {
        self.g
    }

    /// Blue component of the color in RGBA space.
    pub fn b(&self) -> u8 {
        self.b
    }

    /// Opacity component of the color.
    pub fn a(&self) -> u8 {
        self.a
    }

    /// Converts the color into u8 array (RGBA).
    pub fn to_u8_array(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}
