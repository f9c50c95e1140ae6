//! Decides which upstream responses are candidates for injection

/// Path prefixes of the car endpoints (versioned API and the short alias)
pub const CAR_ENDPOINTS: [&str; 2] = ["/api/v1/cars", "/cars"];

const JSON_MEDIA_TYPE: &str = "application/json";

/// True when the path is a car endpoint, the upstream answered with JSON and
/// there is a non-empty profile to apply.
pub fn is_eligible(path: &str, content_type: &str, overrides_present: bool) -> bool {
    overrides_present && is_car_endpoint(path) && content_type.starts_with(JSON_MEDIA_TYPE)
}

/// Prefix match against [`CAR_ENDPOINTS`], with or without a leading slash
pub fn is_car_endpoint(path: &str) -> bool {
    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    CAR_ENDPOINTS.iter().any(|endpoint| normalized.starts_with(endpoint))
}
