use approx::assert_relative_eq;
use dcesol::bat::{ConstantBat, PeakGradientBat};
use dcesol::data::parser::prescribed_aif_from_str;
use dcesol::model::ToftsModel;
use dcesol::prelude::*;

fn timing() -> Timing {
    Timing::new(
        (0..50)
            .map(|i| if i < 10 { i as f64 * 10.0 } else { 100.0 + (i - 10) as f64 * 4.5 })
            .collect(),
    )
    .unwrap()
}

#[test]
fn repeated_fits_are_identical() {
    let timing = timing();
    let aif = PopulationAif::parker(60.0).curve_on(&timing);
    let minutes = timing.minutes();
    let mut curve = ToftsModel::new(ModelVariant::Tofts3, &minutes, aif.values()).predict(&[0.2, 0.45, 0.03]);
    curve.iter_mut().enumerate().for_each(|(i, c)| *c += 0.01 * (i as f64 * 1.7).sin());

    let bat = BatEstimator::PeakGradient(PeakGradientBat);
    let fitter = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts3, &bat).with_hematocrit(0.45);
    let first = fitter.fit(&curve);
    for _ in 0..5 {
        assert_eq!(fitter.fit(&curve), first);
    }
}

#[test]
fn full_window_auc_is_the_trapezoidal_integral() {
    let timing = timing();
    let aif = PopulationAif::parker(60.0).curve_on(&timing);
    let minutes = timing.minutes();
    let curve = ToftsModel::new(ModelVariant::Tofts2, &minutes, aif.values()).predict(&[0.3, 0.5]);

    let bat = BatEstimator::Constant(ConstantBat::new(0, timing.len()).unwrap());
    let fit = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat)
        .with_auc_interval(1e6)
        .fit(&curve);

    let t = timing.seconds();
    let mut expected = 0.0;
    for i in 1..t.len() {
        expected += (t[i] - t[i - 1]) * (curve[i] + curve[i - 1]) / 2.0;
    }
    assert_relative_eq!(fit.auc, expected, max_relative = 1e-10);
}

#[test]
fn peak_gradient_on_ramp_and_constant() {
    let ramp: Vec<f64> = (0..12).map(|i| (i * i) as f64).collect();
    assert_eq!(PeakGradientBat.estimate(&ramp), 11);
    assert_eq!(PeakGradientBat.estimate(&[3.0; 12]), 0);
    assert_eq!(PeakGradientBat.estimate(&[1.0]), 0);
}

#[test]
fn peak_gradient_on_linear_ramp_takes_the_first_rise() {
    let ramp: Vec<f64> = (0..12).map(|i| 10.0 + 2.0 * i as f64).collect();
    assert_eq!(PeakGradientBat.estimate(&ramp), 1);
}

#[test]
fn single_voxel_mask_reproduces_the_voxel() {
    let timing = Timing::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
    let conc = ConcentrationVolume::from_shape_fn((3, 2, 2, 4), |(x, y, z, t)| {
        (x + 2 * y + 5 * z) as f64 * 0.1 + (t as f64).sqrt()
    });
    let mut mask = MaskVolume::zeros((3, 2, 2));
    mask[[2, 1, 1]] = 3;

    let aif = MaskAveragedAif::new(&conc, &mask).curve(&timing).unwrap();
    let expected: Vec<f64> = (0..4).map(|t| conc[[2, 1, 1, t]]).collect();
    assert_eq!(aif.values(), expected.as_slice());
}

#[test]
fn prescribed_parser_reads_the_documented_example() {
    let aif = prescribed_aif_from_str("#comment\n0,0\n1,0.5\n2,1.0\n").unwrap();
    assert_eq!(aif.times(), &[0.0, 1.0, 2.0]);
    assert_eq!(aif.values(), &[0.0, 0.5, 1.0]);

    let err = prescribed_aif_from_str("time,concentration\n").unwrap_err();
    assert!(err.to_string().starts_with("No AIF source derivable"));
}

#[test]
fn exact_curve_recovers_parameters() {
    let timing = timing();
    let aif = PopulationAif::parker(60.0).curve_on(&timing);
    let minutes = timing.minutes();
    let curve = ToftsModel::new(ModelVariant::Tofts2, &minutes, aif.values()).predict(&[0.07, 0.22]);

    let bat = BatEstimator::PeakGradient(PeakGradientBat);
    let fit = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat).fit(&curve);

    assert!(fit.status.is_converged());
    assert_relative_eq!(fit.params.ktrans, 0.07, max_relative = 0.01);
    assert_relative_eq!(fit.params.ve, 0.22, max_relative = 0.01);
    assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-4);
}

#[test]
fn recovery_holds_across_the_physiological_range() {
    let timing = Timing::new((0..60).map(|i| i as f64 * 5.0).collect()).unwrap();
    let aif = PopulationAif::parker(30.0).curve_on(&timing);
    let minutes = timing.minutes();
    let bat = BatEstimator::PeakGradient(PeakGradientBat);

    let mut failures = Vec::new();
    for variant in [ModelVariant::Tofts2, ModelVariant::Tofts3] {
        let model = ToftsModel::new(variant, &minutes, aif.values());
        let fitter = PkModelFitter::new(&aif, &timing, variant, &bat);
        for ktrans in [0.05, 0.1, 0.25, 0.5, 1.0, 2.0] {
            for ve in [0.05, 0.1, 0.2, 0.4, 0.8] {
                // beyond kep 10/min the Fpv and Ve columns are nearly collinear on a 5 s grid
                if variant == ModelVariant::Tofts3 && ktrans / ve > 10.0 {
                    continue;
                }
                let mut truth = vec![ktrans, ve];
                if variant == ModelVariant::Tofts3 {
                    truth.push(0.05);
                }

                let fit = fitter.fit(&model.predict(&truth));
                let recovered = fit.params.to_vec();
                let close = truth
                    .iter()
                    .zip(&recovered)
                    .all(|(t, r)| ((r - t) / t).abs() <= 0.01);
                if !fit.status.is_converged() || !close || fit.r_squared < 0.9999 {
                    failures.push(format!(
                        "{:?} {:?}: got {:?} r2={:.4} {:?}",
                        variant, truth, recovered, fit.r_squared, fit.status
                    ));
                }
            }
        }
    }
    assert!(failures.is_empty(), "{:#?}", failures);
}

#[test]
fn zero_curve_fits_to_zero() {
    let timing = timing();
    let aif = PopulationAif::parker(60.0).curve_on(&timing);
    let bat = BatEstimator::PeakGradient(PeakGradientBat);
    let fit = PkModelFitter::new(&aif, &timing, ModelVariant::Tofts2, &bat).fit(&vec![0.0; timing.len()]);

    assert_eq!(fit.params.ktrans, 0.0);
    assert_eq!(fit.params.ve, 0.0);
    assert_eq!(fit.r_squared, 0.0);
    assert_eq!(fit.status, FitStatus::ZeroCurve);
}

#[test]
fn configuration_loads_from_json_file() {
    let path = std::env::temp_dir().join(format!("dcesol-config-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"{ "use_population_aif": true, "solver": { "max_iters": 50 }, "baseline_policy": "BolusArrival" }"#,
    )
    .unwrap();
    let config = Configuration::from_path(&path);
    std::fs::remove_file(&path).unwrap();

    let config = config.unwrap();
    assert!(config.use_population_aif);
    assert_eq!(config.solver.max_iters, 50);
    assert_eq!(config.solver.f_tol, 1e-4);
    assert_eq!(config.baseline_policy, BaselinePolicy::BolusArrival);
}
