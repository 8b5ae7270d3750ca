//! Synthetic trip records for running the demo without a dataset

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use serde_json::json;

use cv_data::loader::JsonRecord;

const VENDORS: [&str; 3] = ["Cityline", "Northway", "Quickcab"];

/// Generate `count` trips spread over eight weeks, deterministic for a given seed
pub fn generate_trips(count: usize, seed: u32) -> Result<Vec<JsonRecord>> {
    let mut rng = seed;
    let base_time = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
        .context("invalid base timestamp")?;

    let mut trips = Vec::with_capacity(count);
    for i in 0..count {
        let day = random_int(&mut rng) % 56;
        let hour = rush_hour(&mut rng);
        let minute = random_int(&mut rng) % 60;
        let created = base_time
            + Duration::days(day as i64)
            + Duration::hours(hour as i64)
            + Duration::minutes(minute as i64);

        let distance = 0.5 + random_float(&mut rng) * 14.5;
        let fare = 3.0 + distance * 2.1 + random_float(&mut rng) * 4.0;
        let vendor = VENDORS[(random_int(&mut rng) % VENDORS.len() as u32) as usize];

        let record = json!({
            "TripId": i as i64,
            "TripCreated": created.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "Vendor": vendor,
            "DistanceKm": (distance * 10.0).round() / 10.0,
            "Fare": (fare * 100.0).round() / 100.0,
        });
        if let serde_json::Value::Object(map) = record {
            trips.push(map);
        }
    }

    Ok(trips)
}

/// Hour of day skewed towards the morning and evening peaks
fn rush_hour(rng: &mut u32) -> u32 {
    let roll = random_float(rng);
    if roll < 0.3 {
        7 + random_int(rng) % 3
    } else if roll < 0.6 {
        16 + random_int(rng) % 4
    } else {
        random_int(rng) % 24
    }
}

fn random_float(seed: &mut u32) -> f64 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    (*seed as f64) / (u32::MAX as f64)
}

fn random_int(seed: &mut u32) -> u32 {
    *seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
    *seed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate_trips(50, 7).unwrap();
        let b = generate_trips(50, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);

        let created = a[0]["TripCreated"].as_str().unwrap();
        assert!(created.starts_with("2024-0"));
        assert!(created.ends_with('Z'));
    }
}
