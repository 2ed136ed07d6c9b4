use egnmf::{accuracy, nmi, Clustering, Egnmf, EgnmfParams, Error, Hypergraph};
use rand::prelude::*;
use std::sync::Once;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let _ = env_logger::Builder::from_env(env).is_test(true).try_init();
    });
}

/// Three well-separated blobs of 30 jittered grid points each, in the positive quadrant.
fn three_blobs() -> (Vec<Vec<f32>>, Vec<usize>) {
    let centers = [[10.0f32, 1.0], [1.0, 10.0], [8.0, 8.0]];
    let mut rng = StdRng::seed_from_u64(2024);
    let mut data = Vec::with_capacity(90);
    let mut truth = Vec::with_capacity(90);
    for (label, c) in centers.iter().enumerate() {
        for i in 0..30 {
            let gx = (i % 6) as f32 * 0.15 - 0.375;
            let gy = (i / 6) as f32 * 0.15 - 0.3;
            data.push(vec![
                c[0] + gx + rng.random_range(-0.03..0.03),
                c[1] + gy + rng.random_range(-0.03..0.03),
            ]);
            truth.push(label);
        }
    }
    (data, truth)
}

fn params() -> EgnmfParams {
    EgnmfParams::new(3)
        .with_p(5)
        .with_n_estimators(10)
        .with_random_state(7)
}

#[test]
fn test_three_blobs_end_to_end() {
    init();
    let (data, truth) = three_blobs();
    let mut model = Egnmf::new(params()).unwrap();
    let labels = model.fit(&data).unwrap().labels().unwrap();

    assert_eq!(labels.len(), 90);
    assert!(labels.iter().all(|&l| l < 3));
    let acc = accuracy(&truth, labels).unwrap();
    assert!(acc > 0.95, "accuracy {acc}");
    assert!(nmi(&truth, labels).unwrap() > 0.8);
}

#[test]
fn test_same_seed_same_labels() {
    let (data, _) = three_blobs();
    let a = Egnmf::new(params()).unwrap().fit_predict(&data).unwrap();
    let b = Egnmf::new(params()).unwrap().fit_predict(&data).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_parallel_matches_sequential() {
    let (data, _) = three_blobs();
    let model = Egnmf::new(params()).unwrap();
    let parallel = Egnmf::new(params().with_parallel(true)).unwrap();

    assert_eq!(
        model.base_clusterings(&data).unwrap(),
        parallel.base_clusterings(&data).unwrap()
    );
    assert_eq!(
        model.fit_predict(&data).unwrap(),
        parallel.fit_predict(&data).unwrap()
    );
}

#[test]
fn test_base_clusterings_form_valid_hypergraph() {
    let (data, _) = three_blobs();
    let model = Egnmf::new(params().with_n_estimators(2)).unwrap();
    let base = model.base_clusterings(&data).unwrap();
    assert_eq!(base.n_runs(), 2);

    let h = Hypergraph::from_base_clusterings(&base).unwrap();
    assert_eq!(h.n_samples(), 90);
    assert!(h.n_hyperedges() >= 2 && h.n_hyperedges() <= 6);
    for row in h.incidence().outer_iterator() {
        assert_eq!(row.iter().map(|(_, &w)| w).sum::<f32>(), 2.0);
    }
}

#[test]
fn test_minimum_ensemble_fits() {
    let (data, _) = three_blobs();
    let labels = Egnmf::new(params().with_n_estimators(2))
        .unwrap()
        .fit_predict(&data)
        .unwrap();
    assert_eq!(labels.len(), 90);
    assert!(labels.iter().all(|&l| l < 3));
}

#[test]
fn test_each_invalid_parameter_is_reported() {
    let rejected = [
        ("n_clusters", EgnmfParams::new(1)),
        ("rterm", EgnmfParams::new(3).with_rterm(-1.0)),
        ("p", EgnmfParams::new(3).with_p(0)),
        ("max_iter", EgnmfParams::new(3).with_max_iter(1)),
        ("n_estimators", EgnmfParams::new(3).with_n_estimators(1)),
    ];
    for (field, params) in rejected {
        let err = Egnmf::new(params).unwrap_err();
        assert!(
            matches!(err, Error::InvalidParameter { name, .. } if name == field),
            "{field}: {err}"
        );
        assert!(err.to_string().contains(field));
    }
}

#[test]
fn test_neighbour_count_too_large_for_data() {
    let data = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]];
    let err = Egnmf::new(EgnmfParams::new(2).with_p(5).with_random_state(0))
        .unwrap()
        .fit_predict(&data)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { name: "p", .. }));
}
