//! Synthetic student population
//!
//! Produces records shaped like the real intake, labelled with the
//! dropout rule below plus 5% label noise. Seeded, so a given
//! `(n, seed)` always yields the same population.

use crate::models::StudentRecord;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Share of labels flipped after applying the dropout rule
pub const LABEL_NOISE: f64 = 0.05;

const MENTOR_COUNT: u32 = 50;

/// Generate `n` labelled students
pub fn generate(n: usize, seed: u64) -> Vec<StudentRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=n).map(|i| student(&mut rng, i)).collect()
}

fn student(rng: &mut StdRng, i: usize) -> StudentRecord {
    let gender = pick(rng, &[("M", 0.55), ("F", 0.45)]);
    let age = rng.gen_range(16..21);
    let socioeconomic_status = pick(rng, &[("Low", 0.3), ("Middle", 0.5), ("High", 0.2)]);
    let previous_academic_score = normal(rng, 75.0, 15.0);
    let distance_from_school_km = exponential(rng, 5.0);
    let attendance_rate = normal(rng, 0.85, 0.15);
    let avg_test_score = normal(rng, 65.0, 20.0);
    let fee_default_rate = rng.gen_range(0.0..1.0);
    let extracurricular_participation = pick(
        rng,
        &[("None", 0.4), ("Low", 0.3), ("Medium", 0.2), ("High", 0.1)],
    );
    let mentor_id = format!("MENT{:03}", rng.gen_range(1..=MENTOR_COUNT));

    let at_risk = attendance_rate < 0.7
        || avg_test_score < 50.0
        || fee_default_rate > 0.8
        || socioeconomic_status == "Low"
        || distance_from_school_km > 10.0;
    let mut is_active = u8::from(!at_risk);
    if rng.gen_bool(LABEL_NOISE) {
        is_active = 1 - is_active;
    }

    StudentRecord {
        student_id: format!("STU{:05}", i),
        name: format!("Student_{}", i),
        gender: gender.to_string(),
        age,
        socioeconomic_status: socioeconomic_status.to_string(),
        previous_academic_score,
        distance_from_school_km,
        attendance_rate,
        avg_test_score,
        fee_default_rate,
        extracurricular_participation: extracurricular_participation.to_string(),
        mentor_id,
        is_active: Some(is_active),
        last_updated: None,
    }
}

/// Weighted choice; weights are expected to sum to 1
fn pick<'a>(rng: &mut StdRng, choices: &[(&'a str, f64)]) -> &'a str {
    let mut roll: f64 = rng.gen_range(0.0..1.0);
    for (value, weight) in choices {
        if roll < *weight {
            return value;
        }
        roll -= weight;
    }
    choices[choices.len() - 1].0
}

/// Box-Muller normal sample
fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
    let u: f64 = rng.gen_range(f64::EPSILON..1.0);
    -mean * u.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_seeded() {
        assert_eq!(generate(50, 7), generate(50, 7));
        assert_ne!(generate(50, 7), generate(50, 8));
    }

    #[test]
    fn test_record_shape() {
        let students = generate(200, 1);
        assert_eq!(students.len(), 200);
        assert_eq!(students[0].student_id, "STU00001");
        assert_eq!(students[199].student_id, "STU00200");
        for s in &students {
            assert!((16..21).contains(&s.age));
            assert!(s.distance_from_school_km >= 0.0);
            assert!((0.0..1.0).contains(&s.fee_default_rate));
            assert!(s.mentor_id.starts_with("MENT"));
            assert!(s.is_active.is_some());
        }
    }

    #[test]
    fn test_both_classes_present() {
        let students = generate(300, 3);
        let active = students.iter().filter(|s| s.is_active == Some(1)).count();
        assert!(active > 30);
        assert!(active < 270);
    }

    #[test]
    fn test_rule_mostly_holds() {
        let students = generate(500, 5);
        let low_ses_active = students
            .iter()
            .filter(|s| s.socioeconomic_status == "Low")
            .filter(|s| s.is_active == Some(1))
            .count();
        let low_ses = students
            .iter()
            .filter(|s| s.socioeconomic_status == "Low")
            .count();
        // Only label noise can make a low-status student active
        assert!((low_ses_active as f64) < 0.15 * low_ses as f64);
    }
}
