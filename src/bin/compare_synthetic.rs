use std::io;

use anyhow::{Context, Result};
use serde::Serialize;

use ifu_covar::data::synthetic::SyntheticCube;
use ifu_covar::{compare_variance, ComparatorConfig};

#[derive(Serialize)]
struct Row {
    aperture: usize,
    radius: f64,
    correct: f64,
    naive: f64,
    ratio: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            ComparatorConfig::from_json_str(&text)
                .with_context(|| format!("parsing config {path}"))?
        }
        None => ComparatorConfig::default(),
    };

    let cube = SyntheticCube {
        field_radius: Some(0.5 * config.grid_size as f64),
        ..SyntheticCube::new(config.grid_size, config.grid_size, 128)
    };
    log::info!(
        "synthetic cube: {0}x{0} spaxels, {1} wavelengths, {2} covariance anchors",
        config.grid_size,
        cube.n_wave,
        cube.anchors().len()
    );
    let source = cube.build();

    let comparison = compare_variance(&source, &config).context("comparing variance")?;

    let mut writer = csv::Writer::from_writer(io::stdout());
    for (aperture, ((&radius, &correct), ratio)) in comparison
        .radii
        .iter()
        .zip(&comparison.correct)
        .zip(comparison.ratio())
        .enumerate()
    {
        writer
            .serialize(Row {
                aperture,
                radius,
                correct,
                naive: comparison.naive[aperture],
                ratio,
            })
            .context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}
