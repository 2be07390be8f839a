//! Lookup of detection architectures by name.

use crate::common::*;

/// The detection architectures this crate can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    YoloV3,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::YoloV3 => "yolov3",
        }
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let kind = match name.to_lowercase().as_str() {
            "yolov3" => Self::YoloV3,
            _ => bail!("\"{}\" is not a valid model_type", name),
        };
        Ok(kind)
    }
}

impl Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
