//! EGNMF on three 2D blobs, compared with a single k-means run.

use egnmf::{accuracy, nmi, Clustering, Egnmf, EgnmfParams, Kmeans};
use rand::prelude::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Three blobs in the positive quadrant (GNMF needs nonnegative data).
    let centers = [[10.0f32, 1.0], [1.0, 10.0], [8.0, 8.0]];
    let mut rng = StdRng::seed_from_u64(0);
    let mut data = Vec::new();
    let mut truth = Vec::new();
    for (label, c) in centers.iter().enumerate() {
        for _ in 0..30 {
            data.push(vec![
                c[0] + rng.random_range(-0.5..0.5),
                c[1] + rng.random_range(-0.5..0.5),
            ]);
            truth.push(label);
        }
    }

    let params = EgnmfParams::new(3)
        .with_p(5)
        .with_n_estimators(10)
        .with_random_state(42);
    let mut model = match Egnmf::new(params) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("invalid parameters: {e}");
            return;
        }
    };
    let labels = match model.fit(&data) {
        Ok(m) => m.labels().unwrap_or_default().to_vec(),
        Err(e) => {
            eprintln!("fit failed: {e}");
            return;
        }
    };

    println!("=== EGNMF (k=3, 10 members) ===");
    for (i, label) in labels.iter().enumerate().step_by(10) {
        println!("  point {:2} ({:5.2}, {:5.2}) => cluster {}", i, data[i][0], data[i][1], label);
    }
    println!(
        "  accuracy {:.3}, NMI {:.3}",
        accuracy(&truth, &labels).unwrap_or(0.0),
        nmi(&truth, &labels).unwrap_or(0.0)
    );

    let kmeans = Kmeans::new(3).with_seed(42).fit_predict(&data).unwrap_or_default();
    println!("\n=== K-means (k=3) ===");
    println!(
        "  accuracy {:.3}, NMI {:.3}",
        accuracy(&truth, &kmeans).unwrap_or(0.0),
        nmi(&truth, &kmeans).unwrap_or(0.0)
    );
}
