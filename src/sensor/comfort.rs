//! Heat index, the diagnostic comfort figure logged with every reading
//!
//! Rothfusz regression as used by the NWS, with the simple Steadman estimate
//! below 80°F and the standard low/high humidity adjustments. Pure function:
//! it is logged, never used to decide whether to publish.

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}

fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 0.55555
}

/// Heat index in °C for a temperature in °C and relative humidity in percent
pub fn heat_index_celsius(temperature: f64, humidity: f64) -> f64 {
    let t = celsius_to_fahrenheit(temperature);
    let rh = humidity;

    let mut hi = 0.5 * (t + 61.0 + ((t - 68.0) * 1.2) + (rh * 0.094));

    if hi > 79.0 {
        hi = -42.379 + 2.04901523 * t + 10.14333127 * rh
            - 0.22475541 * t * rh
            - 0.00683783 * t.powi(2)
            - 0.05481717 * rh.powi(2)
            + 0.00122874 * t.powi(2) * rh
            + 0.00085282 * t * rh.powi(2)
            - 0.00000199 * t.powi(2) * rh.powi(2);

        if rh < 13.0 && (80.0..=112.0).contains(&t) {
            hi -= ((13.0 - rh) * 0.25) * ((17.0 - (t - 95.0).abs()) * 0.05882).sqrt();
        } else if rh > 85.0 && (80.0..=87.0).contains(&t) {
            hi += ((rh - 85.0) * 0.1) * ((87.0 - t) * 0.2);
        }
    }

    fahrenheit_to_celsius(hi)
}
