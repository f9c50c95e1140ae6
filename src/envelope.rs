//! Response envelope shape detection
//!
//! Teslamate wraps car records differently per endpoint:
//! - `/api/v1/cars`          → `{ "data": { "cars": [ {...}, ... ] } }`
//! - `/api/v1/cars/{id}/...` → `{ "data": { "car": {...}, ... } }`
//! - some routes return a car object directly (`car_details`, `car_exterior`
//!   at the top level)

use serde_json::Value;

/// Keys that mark a bare object as a car record
const BARE_RECORD_KEYS: [&str; 2] = ["car_details", "car_exterior"];

/// Recognized envelope shapes, in detection order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// `data.cars` is an array of car records
    Fleet,
    /// `data.car` is a single car record
    Single,
    /// The document itself is a car record
    BareRecord,
    /// Nothing we know how to overlay
    Unrecognized,
}

impl Envelope {
    /// Classify a decoded response body. First match wins: fleet, single car,
    /// bare record.
    pub fn classify(document: &Value) -> Self {
        if let Some(data) = document.get("data").and_then(Value::as_object) {
            if data.get("cars").is_some_and(Value::is_array) {
                return Envelope::Fleet;
            }
            if data.get("car").is_some_and(Value::is_object) {
                return Envelope::Single;
            }
        }

        match document.as_object() {
            Some(obj) if BARE_RECORD_KEYS.iter().any(|key| obj.contains_key(*key)) => {
                Envelope::BareRecord
            }
            _ => Envelope::Unrecognized,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Envelope::Fleet => "fleet",
            Envelope::Single => "single",
            Envelope::BareRecord => "bare-record",
            Envelope::Unrecognized => "unrecognized",
        }
    }
}
