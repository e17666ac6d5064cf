use model::*;
use serde_json::{json, Value};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Headline numbers for one trip segment, shaped for report collaborators.
pub fn trip_summary(trip: &TripSegment) -> Value {
    let n = trip.points.len();
    let end = trip
        .end_time
        .or_else(|| trip.points.last().map(|p| p.timestamp))
        .unwrap_or(trip.start_time);
    let duration_ms = end.saturating_sub(trip.start_time);

    let moving_ratio = if n > 0 {
        trip.points.iter().filter(|p| p.is_moving).count() as f64 / n as f64
    } else {
        0.0
    };
    let mean_confidence = if n > 0 {
        trip.points.iter().map(|p| p.confidence).sum::<f64>() / n as f64
    } else {
        0.0
    };

    json!({
        "id": trip.id,
        "vehicle_id": trip.vehicle_id,
        "duration_ms": duration_ms,
        "points": n,
        "located_points": trip.points.iter().filter(|p| p.location.is_some()).count(),
        "moving_ratio": moving_ratio,
        "mean_confidence": mean_confidence,
        "distance_m": path_length_m(&trip.points),
        "finished": trip.is_finished(),
        "synced": trip.synced
    })
}

/// Great-circle length over the points that carry a location.
pub fn path_length_m(points: &[TripPoint]) -> f64 {
    let fixes: Vec<&Location> = points.iter().filter_map(|p| p.location.as_ref()).collect();
    fixes.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

fn haversine_m(a: &Location, b: &Location) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
