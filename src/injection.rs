//! Response Injection Module
//!
//! Overlays the selected car profile onto every car record found in a
//! decoded Teslamate response.

use crate::envelope::Envelope;
use crate::merge::merge_maps;
use crate::profile::Profile;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Overlay `overrides` onto every car record in `document`.
///
/// Takes the document by value: records are replaced by freshly merged
/// copies, nothing is patched in place. An empty override map returns the
/// document as-is, and so does an envelope we don't recognize.
pub fn inject(document: Value, overrides: &Map<String, Value>) -> Value {
    let envelope = Envelope::classify(&document);
    inject_into(document, envelope, overrides)
}

/// Same as [`inject`] for a document whose shape is already known
fn inject_into(mut document: Value, envelope: Envelope, overrides: &Map<String, Value>) -> Value {
    if overrides.is_empty() {
        return document;
    }

    match envelope {
        Envelope::Fleet => {
            if let Some(Value::Array(cars)) = document.pointer_mut("/data/cars") {
                for car in cars.iter_mut() {
                    *car = overlay(car, overrides);
                }
            }
        }
        Envelope::Single => {
            if let Some(car) = document.pointer_mut("/data/car") {
                *car = overlay(car, overrides);
            }
        }
        Envelope::BareRecord => {
            document = overlay(&document, overrides);
        }
        Envelope::Unrecognized => {}
    }

    document
}

/// Merge onto a single record; a non-object record is replaced outright
fn overlay(record: &Value, overrides: &Map<String, Value>) -> Value {
    match record {
        Value::Object(map) => Value::Object(merge_maps(map, overrides)),
        _ => Value::Object(overrides.clone()),
    }
}

/// Applies one car profile to response bodies and keeps a count of how many
/// bodies it rewrote
pub struct InjectionEngine {
    profile: Profile,
    injected: AtomicU64,
}

impl InjectionEngine {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            injected: AtomicU64::new(0),
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Whether there is anything to overlay at all
    pub fn has_overrides(&self) -> bool {
        !self.profile.overrides.is_empty()
    }

    /// Run the injector over a decoded body, returning the result and the
    /// envelope shape that was detected. The body is classified once.
    pub fn apply(&self, document: Value) -> (Value, Envelope) {
        let envelope = Envelope::classify(&document);
        let result = inject_into(document, envelope, &self.profile.overrides);

        if envelope != Envelope::Unrecognized && self.has_overrides() {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Envelope {} for profile {}", envelope.name(), self.profile.name);

        (result, envelope)
    }

    /// Number of bodies rewritten so far
    pub fn injected_count(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }
}
