//! Model configuration format.

use crate::{anchors::Anchors, common::*, registry::ModelKind};

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
}

impl Config {
    /// Loads and validates a JSON5 configuration file.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Self = text
            .parse()
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            model:
                ModelConfig {
                    ref model_type,
                    network:
                        NetworkConfig {
                            batch_norm_decay,
                            leaky_relu,
                            ref anchors,
                            ..
                        },
                    loss: LossConfig { ignore_thresh },
                },
            dataset:
                DatasetConfig {
                    image_preprocessing:
                        ImagePreprocessingConfig {
                            fixed_height,
                            fixed_width,
                        },
                },
        } = *self;

        model_type.parse::<ModelKind>()?;
        let batch_norm_decay = batch_norm_decay.raw();
        let leaky_relu = leaky_relu.raw();
        let ignore_thresh = ignore_thresh.raw();
        ensure!(
            batch_norm_decay >= 0.0 && batch_norm_decay < 1.0,
            "batch_norm_decay must be in range [0, 1)"
        );
        ensure!(leaky_relu >= 0.0, "leaky_relu must be non-negative");
        ensure!(
            ignore_thresh >= 0.0 && ignore_thresh <= 1.0,
            "ignore_thresh must be in range [0, 1]"
        );
        ensure!(
            fixed_height.get() % 32 == 0 && fixed_width.get() % 32 == 0,
            "fixed_height and fixed_width must be multiples of 32, but get {}x{}",
            fixed_height,
            fixed_width
        );
        if let Some(anchors) = anchors {
            Anchors::from_wh_pairs(anchors)?;
        }

        Ok(())
    }

    pub fn model_kind(&self) -> Result<ModelKind> {
        self.model.model_type.parse()
    }

    pub fn num_classes(&self) -> usize {
        self.model.network.num_classes.get()
    }

    /// The network input size in `[height, width]`.
    pub fn image_hw(&self) -> [usize; 2] {
        let ImagePreprocessingConfig {
            fixed_height,
            fixed_width,
        } = self.dataset.image_preprocessing;
        [fixed_height.get(), fixed_width.get()]
    }

    pub fn anchors(&self) -> Result<Anchors> {
        match &self.model.network.anchors {
            Some(pairs) => Anchors::from_wh_pairs(pairs),
            None => Ok(Anchors::default()),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let config: Self = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// The model options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The architecture name, looked up by [ModelKind].
    #[serde(rename = "type")]
    pub model_type: String,
    pub network: NetworkConfig,
    #[serde(default)]
    pub loss: LossConfig,
}

/// Network hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Decay of batch normalization running statistics.
    pub batch_norm_decay: R64,
    /// The negative slope of leaky ReLU.
    pub leaky_relu: R64,
    pub num_classes: NonZeroUsize,
    /// Optional override of the 9 anchor `[width, height]` pairs in pixels.
    #[serde(default)]
    pub anchors: Option<Vec<[R64; 2]>>,
}

/// Loss function options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossConfig {
    /// Predictions overlapping any ground truth above this IoU are not
    /// penalized as negatives.
    #[serde(default = "default_ignore_thresh")]
    pub ignore_thresh: R64,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            ignore_thresh: default_ignore_thresh(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub image_preprocessing: ImagePreprocessingConfig,
}

/// The fixed network input size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImagePreprocessingConfig {
    pub fixed_height: NonZeroUsize,
    pub fixed_width: NonZeroUsize,
}

fn default_ignore_thresh() -> R64 {
    r64(0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = r#"{
        model: {
            type: "yolov3",
            network: { batch_norm_decay: 0.9, leaky_relu: 0.1, num_classes: 20 },
        },
        dataset: { image_preprocessing: { fixed_height: 320, fixed_width: 416 } },
    }"#;

    #[test]
    fn parse_with_defaults() -> Result<()> {
        let config: Config = TEXT.parse()?;
        assert_eq!(config.num_classes(), 20);
        assert_eq!(config.image_hw(), [320, 416]);
        assert_eq!(config.model.loss.ignore_thresh, r64(0.5));
        assert_eq!(config.model_kind()?, ModelKind::YoloV3);
        assert_eq!(config.anchors()?, Anchors::default());
        Ok(())
    }

    #[test]
    fn reject_invalid_values() {
        let bad_size = TEXT.replace("fixed_height: 320", "fixed_height: 300");
        assert!(bad_size.parse::<Config>().is_err());

        let bad_decay = TEXT.replace("batch_norm_decay: 0.9", "batch_norm_decay: 1.5");
        assert!(bad_decay.parse::<Config>().is_err());

        let bad_model = TEXT.replace("\"yolov3\"", "\"ssd\"");
        assert!(bad_model.parse::<Config>().is_err());

        let no_classes = TEXT.replace("num_classes: 20", "num_classes: 0");
        assert!(no_classes.parse::<Config>().is_err());
    }
}
