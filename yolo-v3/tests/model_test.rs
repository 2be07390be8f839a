use anyhow::Result;
use std::path::{Path, PathBuf};
use tch::{nn, Device, Kind, Tensor};
use yolo_v3::{
    detection::Prediction,
    loss::{YoloLossInit, YoloLossOutput},
    model::{YoloV3, YoloV3Init, YoloV3Output},
    preprocess::{GroundTruth, Preprocessor, Targets},
    Config, ModelKind,
};

lazy_static::lazy_static! {
    static ref CONFIG_FILE: PathBuf = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cfg")
        .join("yolov3.json5");
}

fn build_model(config: &Config) -> Result<(nn::VarStore, YoloV3)> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = YoloV3Init::from_config(config)?.build(&vs.root())?;
    Ok((vs, model))
}

#[test]
fn load_config() -> Result<()> {
    let config = Config::open(&*CONFIG_FILE)?;
    assert_eq!(config.model_kind()?, ModelKind::YoloV3);
    assert_eq!(config.num_classes(), 2);
    assert_eq!(config.image_hw(), [64, 64]);
    Ok(())
}

#[test]
fn forward_shapes() -> Result<()> {
    let config = Config::open(&*CONFIG_FILE)?;
    let (_vs, model) = build_model(&config)?;

    let input = Tensor::rand(&[2, 64, 64, 3], (Kind::Float, Device::Cpu));
    let YoloV3Output {
        feature_maps,
        y_true,
    } = model.forward_t(&input, None, false)?;
    assert!(y_true.is_none());

    let shapes: Vec<_> = feature_maps.iter().map(|map| map.size()).collect();
    assert_eq!(
        shapes,
        vec![vec![2, 2, 2, 21], vec![2, 4, 4, 21], vec![2, 8, 8, 21]]
    );

    let Prediction {
        boxes,
        confs,
        probs,
    } = model.predict(&feature_maps)?;
    assert_eq!(boxes.size(), vec![2, 252, 4]);
    assert_eq!(confs.size(), vec![2, 252, 1]);
    assert_eq!(probs.size(), vec![2, 252, 2]);
    Ok(())
}

#[test]
fn single_image_gets_batch_axis() -> Result<()> {
    let config = Config::open(&*CONFIG_FILE)?;
    let (_vs, model) = build_model(&config)?;

    let input = Tensor::rand(&[64, 64, 3], (Kind::Float, Device::Cpu));
    let output = model.forward_t(&input, None, false)?;
    assert_eq!(output.feature_maps[0].size(), vec![1, 2, 2, 21]);
    assert_eq!(output.feature_maps[2].size(), vec![1, 8, 8, 21]);
    Ok(())
}

#[test]
fn train_step_backward() -> Result<()> {
    let config = Config::open(&*CONFIG_FILE)?;
    let (vs, model) = build_model(&config)?;
    let preprocessor = Preprocessor::from_config(&config)?;
    let loss_fn = YoloLossInit::from_config(&config)?.build()?;

    let image = Tensor::randint(256, &[48, 48, 3], (Kind::Uint8, Device::Cpu));
    let boxes = vec![
        GroundTruth::from_xyxy([3.0, 3.0, 10.5, 12.75], 0)?,
        GroundTruth::from_xyxy([6.0, 0.0, 45.0, 30.0], 1)?,
    ];
    let example = preprocessor.preprocess(&image, &boxes)?;
    assert_eq!(example.targets.assignments.len(), 2);

    let input = example.image.unsqueeze(0);
    let y_true = Targets::batch(&[&example.targets])?;
    let output = model.forward_t(&input, Some(&y_true), true)?;
    assert_eq!(output.y_true.as_ref().map(|y_true| y_true.len()), Some(3));

    let YoloLossOutput {
        total_loss,
        xy_loss,
        wh_loss,
        conf_loss,
        class_loss,
    } = loss_fn.forward(&output)?;
    let terms = xy_loss.double_value(&[])
        + wh_loss.double_value(&[])
        + conf_loss.double_value(&[])
        + class_loss.double_value(&[]);
    let total = total_loss.double_value(&[]);
    assert!(total.is_finite());
    assert!((total - terms).abs() <= 1e-3 * total.abs().max(1.0));

    total_loss.backward();
    let num_with_grad = vs
        .trainable_variables()
        .iter()
        .filter(|var| {
            let grad = var.grad();
            grad.defined() && grad.abs().sum(Kind::Float).double_value(&[]) > 0.0
        })
        .count();
    assert!(num_with_grad > 0);
    Ok(())
}
