//! End-to-end behaviour of the covariance pipeline on in-memory sources.

use approx::assert_relative_eq;
use ndarray::{array, s, Array3, Array5};

use ifu_covar::data::model::{COVAR, PRIMARY, VARIANCE, WEIGHT};
use ifu_covar::data::synthetic::SyntheticCube;
use ifu_covar::{
    bin_source, bin_source_multi, compare_variance, full_covariance, read_norm_covariance,
    ComparatorConfig, Error, MemorySource, SpatialSelection, SpectralBinner,
};

// ═══════════════════════════════════════════════════════════════════
// Worked 3×3 example
// ═══════════════════════════════════════════════════════════════════

/// One wavelength on a 3×3 grid with unit weights. Self variance follows
/// `[[1,2,1],[2,4,2],[1,2,1]]`; axis neighbours share 0.5, everything else 0.
fn three_by_three() -> (Array3<f64>, Array5<f64>, Array3<f64>) {
    let self_var = array![[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
    let data = Array3::from_shape_fn((1, 3, 3), |(_, x, y)| 10.0 * x as f64 + y as f64);
    let covar = Array5::from_shape_fn((1, 5, 5, 3, 3), |(_, dx, dy, x, y)| {
        match dx.abs_diff(2) + dy.abs_diff(2) {
            0 => self_var[[x, y]],
            1 => 0.5,
            _ => 0.0,
        }
    });
    let weight = Array3::<f64>::ones((1, 3, 3));
    (data, covar, weight)
}

#[test]
fn cross_shaped_selection_on_three_by_three() {
    let (data, covar, weight) = three_by_three();
    let binner = SpectralBinner::new(data.view(), covar.view(), weight.view()).unwrap();
    let mask = array![[false, true, false], [true, true, true], [false, false, false]];
    let selection = SpatialSelection::from_mask(mask.view());
    assert_eq!(selection.coords(), &[(0, 1), (1, 0), (1, 1), (1, 2)]);

    let binned = binner.bin(&selection).unwrap();

    // Axis-adjacent pairs inside the selection: (0,1)-(1,1), (1,0)-(1,1),
    // (1,2)-(1,1). (0,1)-(1,0) and (0,1)-(1,2) are diagonal, (1,0)-(1,2)
    // is two apart; those contribute 0.
    let self_terms = 2.0 + 2.0 + 4.0 + 2.0;
    let var_sum = self_terms + 2.0 * 3.0 * 0.5;
    assert_eq!(var_sum, 13.0);
    assert_eq!(binned.variance[0], var_sum / 16.0);

    let flux_sum = data[[0, 0, 1]] + data[[0, 1, 0]] + data[[0, 1, 1]] + data[[0, 1, 2]];
    assert_eq!(binned.flux[0], flux_sum / 4.0);
}

#[test]
fn whole_grid_counts_every_adjacent_pair() {
    let (data, covar, weight) = three_by_three();
    let binner = SpectralBinner::new(data.view(), covar.view(), weight.view()).unwrap();
    let all = SpatialSelection::from_coords((0..3).flat_map(|x| (0..3).map(move |y| (x, y))));
    let binned = binner.bin(&all).unwrap();
    // 12 axis-adjacent unordered pairs on a 3×3 grid, each counted twice.
    assert_eq!(binned.variance[0], (16.0 + 12.0) / 81.0);
}

// ═══════════════════════════════════════════════════════════════════
// Source-driven pipeline
// ═══════════════════════════════════════════════════════════════════

#[test]
fn single_spaxel_bin_matches_cube() {
    let source = SyntheticCube::new(5, 5, 9).build();
    let covar = full_covariance(&source).unwrap();
    let binned = bin_source(&source, &SpatialSelection::from_coords([(2, 3)])).unwrap();

    let data = ifu_covar::data::source::load_cubes(&source).unwrap();
    for w in 0..9 {
        assert_relative_eq!(binned.flux[w], data.data()[[w, 2, 3]], max_relative = 1e-12);
        let expected = covar[[w, 2, 2, 2, 3]] / data.weight()[[w, 2, 3]].powi(2);
        assert_relative_eq!(binned.variance[w], expected, max_relative = 1e-12);
    }
}

#[test]
fn batch_binning_shares_one_covariance() {
    let source = SyntheticCube::new(6, 6, 10).build();
    let selections = vec![
        SpatialSelection::from_coords([(0, 0), (0, 1)]),
        SpatialSelection::from_coords([(2, 2), (2, 3), (3, 2), (3, 3)]),
    ];
    let batch = bin_source_multi(&source, &selections).unwrap();
    assert_eq!(batch.len(), 2);
    for (sel, binned) in selections.iter().zip(&batch) {
        assert_eq!(binned, &bin_source(&source, sel).unwrap());
    }
}

#[test]
fn reconstruction_is_clamped_beyond_last_anchor() {
    let cube = SyntheticCube {
        anchor_step: 4,
        ..SyntheticCube::new(3, 3, 10)
    };
    // Anchors at 0, 4, 8, 9; stretch the output so the tail is clamped.
    let source = cube.build().with_header(PRIMARY, "NAXIS3", 14_i64);
    let norm = read_norm_covariance(&source).unwrap();
    assert_eq!(norm.shape(), &[14, 5, 5, 3, 3]);
    let tail = norm.slice(s![9.., 1, 2, 1, 1]);
    assert!(tail.iter().all(|&v| v == norm[[9, 1, 2, 1, 1]]));
}

#[test]
fn missing_weight_is_missing_extension() {
    let source = SyntheticCube::new(4, 4, 4).build().without_block(WEIGHT);
    let err = bin_source(&source, &SpatialSelection::from_coords([(1, 1)])).unwrap_err();
    assert!(matches!(err, Error::MissingExtension(ref block) if block == WEIGHT));
}

#[test]
fn missing_covariance_is_missing_extension() {
    let source = SyntheticCube::new(4, 4, 4).build().without_block(COVAR);
    let err = full_covariance(&source).unwrap_err();
    assert!(matches!(err, Error::MissingExtension(ref block) if block == COVAR));
}

#[test]
fn misaligned_variance_is_shape_mismatch() {
    let source = SyntheticCube::new(4, 4, 4)
        .build()
        .with_array(VARIANCE, Array3::<f64>::ones((4, 4, 3)));
    let err = full_covariance(&source).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn single_anchor_source_is_rejected() {
    let source = MemorySource::new()
        .with_array(PRIMARY, Array3::<f64>::ones((4, 2, 2)))
        .with_array(VARIANCE, Array3::<f64>::ones((4, 2, 2)))
        .with_array(WEIGHT, Array3::<f64>::ones((4, 2, 2)))
        .with_array(COVAR, Array5::<f64>::ones((1, 5, 5, 2, 2)))
        .with_header(PRIMARY, "NAXIS3", 4_i64)
        .with_header(COVAR, "COVAR_N", 1_i64)
        .with_header(COVAR, "COVARLOC_1", 2_i64);
    let err = full_covariance(&source).unwrap_err();
    assert!(matches!(err, Error::InsufficientCovarianceSamples(1)));
}

// ═══════════════════════════════════════════════════════════════════
// Aperture comparison
// ═══════════════════════════════════════════════════════════════════

#[test]
fn default_geometry_comparison() {
    let cube = SyntheticCube {
        n_wave: 5,
        anchor_step: 2,
        ..SyntheticCube::default()
    };
    let result = compare_variance(&cube.build(), &ComparatorConfig::default()).unwrap();
    assert_eq!(result.radii.len(), 15);
    assert_eq!(result.correct.len(), 15);
    assert_eq!(result.naive.len(), 15);
    for (c, n) in result.correct.iter().zip(&result.naive) {
        assert!(c >= n);
    }
    // Larger apertures average more spaxels: the naive variance shrinks.
    assert!(result.naive[14] < result.naive[0]);
    // Correlation makes the covariance-aware variance shrink more slowly.
    let ratio = result.ratio();
    assert!(ratio[14] > ratio[0]);
}

#[test]
fn dead_spaxels_do_not_poison_apertures() {
    let cube = SyntheticCube {
        field_radius: Some(4.0),
        ..SyntheticCube::new(12, 12, 3)
    };
    let config = ComparatorConfig {
        grid_size: 12,
        center: 5.5,
        n_apertures: 5,
        ..ComparatorConfig::default()
    };
    let result = compare_variance(&cube.build(), &config).unwrap();
    assert!(result.correct.iter().all(|v| v.is_finite()));
    assert!(result.naive.iter().all(|v| v.is_finite()));
}
