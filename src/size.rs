use std::fmt;

/// Aspect ratios the front-end offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape4x3,
    Portrait3x4,
    Wide16x9,
    Tall9x16,
}

impl AspectRatio {
    /// Parse a UI token; anything unrecognized falls back to square
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("4:3") => Self::Landscape4x3,
            Some("3:4") => Self::Portrait3x4,
            Some("16:9") => Self::Wide16x9,
            Some("9:16") => Self::Tall9x16,
            _ => Self::Square,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape4x3 => "4:3",
            Self::Portrait3x4 => "3:4",
            Self::Wide16x9 => "16:9",
            Self::Tall9x16 => "9:16",
        }
    }

    pub fn output_size(self) -> OutputSize {
        match self {
            Self::Square => OutputSize::Square,
            Self::Landscape4x3 | Self::Wide16x9 => OutputSize::Landscape,
            Self::Portrait3x4 | Self::Tall9x16 => OutputSize::Portrait,
        }
    }
}

/// Canonical sizes accepted by the synchronous image endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    Square,
    Landscape,
    Portrait,
}

impl OutputSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1024x1024",
            Self::Landscape => "1536x1024",
            Self::Portrait => "1024x1536",
        }
    }
}

impl fmt::Display for OutputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a UI aspect-ratio token straight to a provider size token
pub fn size_for_aspect_ratio(token: Option<&str>) -> OutputSize {
    AspectRatio::from_token(token).output_size()
}

/// Quality hint from the UI; only echoed in stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Standard,
    Hd,
}

impl Quality {
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("hd") => Self::Hd,
            _ => Self::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Hd => "hd",
        }
    }
}
