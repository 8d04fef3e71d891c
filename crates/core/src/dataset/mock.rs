use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dataset::table::Table;
use crate::dataset::{ACTIVITY_COLUMNS, ACTIVITY_TABLE, HEALTH_COLUMNS, HEALTH_TABLE};

const ACTIVITY_DAYS: u32 = 10;

/// Deterministic synthetic cohort: one health row per patient plus ten days of activity.
pub fn generate(patients: usize, seed: u64) -> (Table, Table) {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut health_rows = Vec::with_capacity(patients);
    for patient in 1..=patients {
        let sex = bernoulli(&mut rng, 0.5);
        let pregnancy = if sex == 1.0 && rng.gen::<f64>() > 0.95 { 1.0 } else { 0.0 };

        health_rows.push(vec![
            patient as f64,
            bernoulli(&mut rng, 0.2),
            round1(normal(&mut rng, 14.0, 2.0)),
            rng.gen::<f64>(),
            f64::from(rng.gen_range(18_u32..90)),
            round1(normal(&mut rng, 25.0, 5.0)),
            sex,
            pregnancy,
            bernoulli(&mut rng, 0.5),
            f64::from(rng.gen_range(1000_u32..5000)),
            f64::from(rng.gen_range(0_u32..500)),
            f64::from(rng.gen_range(1_u32..=3)),
            bernoulli(&mut rng, 0.1),
            bernoulli(&mut rng, 0.1),
        ]);
    }

    let ckd_index = HEALTH_COLUMNS
        .iter()
        .position(|column| *column == "Chronic_kidney_disease")
        .unwrap_or(12);

    let mut activity_rows = Vec::with_capacity(patients * ACTIVITY_DAYS as usize);
    for row in &health_rows {
        let base = if row[ckd_index] == 1.0 { 3000.0 } else { 7000.0 };
        for day in 1..=ACTIVITY_DAYS {
            let steps = normal(&mut rng, base, 1500.0).trunc().max(0.0);
            activity_rows.push(vec![row[0], f64::from(day), steps]);
        }
    }

    (
        Table::new(HEALTH_TABLE, owned(HEALTH_COLUMNS), health_rows),
        Table::new(ACTIVITY_TABLE, owned(ACTIVITY_COLUMNS), activity_rows),
    )
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|column| (*column).to_string()).collect()
}

fn bernoulli(rng: &mut StdRng, probability: f64) -> f64 {
    if rng.gen::<f64>() < probability {
        1.0
    } else {
        0.0
    }
}

// Box-Muller transform over two uniform draws.
fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
