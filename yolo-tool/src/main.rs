use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use prettytable::{cell, row, Table};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tch::{nn, Device, Kind, Tensor};
use yolo_v3::{
    model::YoloV3Init,
    preprocess::{Assignment, GroundTruth, TargetAssigner, Targets},
    Config, SCALE_STRIDES,
};

#[derive(Debug, Clone, Parser)]
/// Inspect YOLO-v3 models and their training targets.
enum Opts {
    /// Print the variables and the feature map shapes of a model.
    Info {
        /// configuration file
        config_file: PathBuf,
    },
    /// Assign ground truth boxes to anchors and grid cells.
    Assign {
        /// configuration file
        config_file: PathBuf,
        /// JSON file with [x_min, y_min, x_max, y_max, class_id] rows
        boxes_file: PathBuf,
        /// print the assignments in JSON
        #[clap(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::Info { config_file } => info(config_file)?,
        Opts::Assign {
            config_file,
            boxes_file,
            json,
        } => assign(config_file, boxes_file, json)?,
    }

    Ok(())
}

fn info(config_file: impl AsRef<Path>) -> Result<()> {
    let config = Config::open(config_file)?;
    let kind = config.model_kind()?;
    let vs = nn::VarStore::new(Device::Cpu);
    let model = YoloV3Init::from_config(&config)?.build(&vs.root())?;
    let [image_h, image_w] = model.image_hw();

    // print variables
    {
        let mut variables: Vec<_> = vs.variables().into_iter().collect();
        variables.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));
        let num_params: i64 = variables
            .iter()
            .map(|(_, tensor)| tensor.size().iter().product::<i64>())
            .sum();

        let mut table = Table::new();
        table.add_row(row!["name", "shape"]);
        variables.iter().for_each(|(name, tensor)| {
            table.add_row(row![name, format!("{:?}", tensor.size())]);
        });
        table.printstd();
        println!("{} with {} parameters", kind, num_params);
    }

    // print output shapes
    {
        let input = Tensor::zeros(&[1, image_h as i64, image_w as i64, 3], (Kind::Float, Device::Cpu));
        let output = tch::no_grad(|| model.forward_t(&input, None, false))?;

        let mut table = Table::new();
        table.add_row(row!["scale", "stride", "anchors", "output shape"]);
        output
            .feature_maps
            .iter()
            .enumerate()
            .for_each(|(scale, feature_map)| {
                let anchors: Vec<_> = model
                    .anchors()
                    .scale_group(scale)
                    .iter()
                    .map(|anchor| (anchor.w(), anchor.h()))
                    .collect();
                table.add_row(row![
                    scale,
                    SCALE_STRIDES[scale],
                    format!("{:?}", anchors),
                    format!("{:?}", feature_map.size()),
                ]);
            });
        table.printstd();
    }

    Ok(())
}

fn assign(config_file: impl AsRef<Path>, boxes_file: impl AsRef<Path>, json: bool) -> Result<()> {
    let config = Config::open(config_file)?;
    let boxes_file = boxes_file.as_ref();
    let assigner = TargetAssigner::new(config.anchors()?, config.image_hw(), config.num_classes())?;

    let text = fs::read_to_string(boxes_file)
        .with_context(|| format!("failed to read '{}'", boxes_file.display()))?;
    let rows: Vec<[f64; 5]> = serde_json::from_str(&text)
        .with_context(|| format!("invalid box file '{}'", boxes_file.display()))?;
    let boxes: Vec<_> = rows
        .into_iter()
        .map(GroundTruth::from_xyxyc)
        .collect::<Result<_>>()?;
    info!("loaded {} boxes from '{}'", boxes.len(), boxes_file.display());

    let targets = assigner.assign(&boxes)?;
    let Targets {
        ref assignments,
        num_discarded,
        num_overwritten,
        ..
    } = targets;

    if json {
        println!("{}", serde_json::to_string_pretty(assignments)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.add_row(row!["box", "class", "anchor", "scale", "row", "col", "slot"]);
    assignments.iter().for_each(|assignment| {
        let Assignment {
            box_index,
            anchor_index,
            scale,
            row,
            col,
            slot,
        } = *assignment;
        table.add_row(row![
            box_index,
            boxes[box_index].class_id,
            anchor_index,
            scale,
            row,
            col,
            slot
        ]);
    });
    table.printstd();

    targets.scales.iter().enumerate().for_each(|(scale, array)| {
        println!(
            "scale {}: {:?} target with {} objects",
            scale,
            array.shape(),
            array.num_objects()
        );
    });
    println!(
        "{} assigned, {} discarded, {} overwritten",
        assignments.len(),
        num_discarded,
        num_overwritten
    );

    Ok(())
}
