use anyhow::Result;
use std::{fs::File, io::{BufRead, BufReader, BufWriter, Write}, path::Path};
use serde::Serialize;
use tracing::warn;
use model::*;

mod store;

pub use store::{MemoryTripStore, NdjsonTripStore, StoreError, TripStore};

/// Reads one segment per line. Corrupt lines are logged and skipped so one
/// bad record cannot take the rest of the store down with it.
pub fn import_ndjson(path: &Path) -> Result<Vec<TripSegment>> {
    let f = File::open(path)?;
    let rdr = BufReader::new(f);
    let mut trips = vec![];
    for (n, line) in rdr.lines().enumerate() {
        let s = line?;
        if s.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TripSegment>(&s) {
            Ok(t) => trips.push(t),
            Err(e) => warn!("skipping corrupt trip record at {}:{}: {}", path.display(), n + 1, e),
        }
    }
    Ok(trips)
}

pub fn write_ndjson(trips: &[TripSegment], path: &Path) -> Result<()> {
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    for t in trips {
        let s = serde_json::to_string(t)?;
        writeln!(w, "{}", s)?;
    }
    w.flush()?;
    Ok(())
}

/// Flat one-row-per-point export for spreadsheet collaborators.
pub fn export_points_csv(trips: &[TripSegment], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path)?;
    for t in trips {
        for p in &t.points {
            w.serialize(PointRow {
                trip_id: t.id.to_string(),
                vehicle_id: t.vehicle_id.clone(),
                timestamp: p.timestamp,
                is_moving: p.is_moving,
                confidence: p.confidence,
                ax: p.acceleration_snapshot.x,
                ay: p.acceleration_snapshot.y,
                az: p.acceleration_snapshot.z,
                lat: p.location.as_ref().map(|l| l.latitude),
                lon: p.location.as_ref().map(|l| l.longitude),
                accuracy: p.location.as_ref().map(|l| l.accuracy),
            })?;
        }
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PointRow {
    trip_id: String,
    vehicle_id: String,
    timestamp: u64,
    is_moving: bool,
    confidence: f64,
    ax: f64, ay: f64, az: f64,
    lat: Option<f64>,
    lon: Option<f64>,
    accuracy: Option<f64>,
}
