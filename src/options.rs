use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    #[cfg(test)]
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Square,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self, AspectRatio::Portrait)
    }

    fn orientation(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "landscape",
            AspectRatio::Portrait => "vertical",
            AspectRatio::Square => "square",
        }
    }

    /// Human wording used in prompt templates, e.g. `16:9 landscape`.
    pub fn describe(&self) -> String {
        format!("{} {}", self.as_str(), self.orientation())
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which aspect of a reference image later generations should preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    Character,
    Style,
    Theme,
    #[default]
    None,
}

impl ConsistencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyMode::Character => "character",
            ConsistencyMode::Style => "style",
            ConsistencyMode::Theme => "theme",
            ConsistencyMode::None => "none",
        }
    }

    /// Whether a reference image is attached to the model call in this mode.
    pub fn uses_reference(&self) -> bool {
        !matches!(self, ConsistencyMode::None)
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStyle {
    #[default]
    Seamless,
    Collage,
    Overlay,
    Blend,
    Composite,
}

impl FusionStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionStyle::Seamless => "seamless",
            FusionStyle::Collage => "collage",
            FusionStyle::Overlay => "overlay",
            FusionStyle::Blend => "blend",
            FusionStyle::Composite => "composite",
        }
    }
}

impl fmt::Display for FusionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativityLevel {
    Conservative,
    #[default]
    Balanced,
    Creative,
    Experimental,
}

impl CreativityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreativityLevel::Conservative => "conservative",
            CreativityLevel::Balanced => "balanced",
            CreativityLevel::Creative => "creative",
            CreativityLevel::Experimental => "experimental",
        }
    }
}

impl fmt::Display for CreativityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
