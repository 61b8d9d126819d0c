//! Property tests for the publish-on-change rule

mod test_helpers;

use proptest::prelude::*;
use sensor_agent::config::ThresholdsSection;
use sensor_agent::node::{exceeds_thresholds, ChangeFilter};
use test_helpers::reading;

/// Values on a quarter-degree grid, so adding 0.5 or 2.0 is exact
fn grid(range: std::ops::Range<i32>) -> impl Strategy<Value = f64> {
    range.prop_map(|quarters| f64::from(quarters) / 4.0)
}

/// A value in tenths as a one-decimal sensor reports it
fn tenths(value: i32) -> f64 {
    f64::from(value) / 10.0
}

proptest! {
    #[test]
    fn first_reading_always_publishes(t in -40.0f64..80.0, h in 0.0f64..100.0) {
        let filter = ChangeFilter::new(ThresholdsSection::default());
        prop_assert!(filter.should_publish(&reading(t, h)));
    }

    #[test]
    fn publishes_iff_a_delta_strictly_exceeds(
        t0 in -40.0f64..80.0,
        h0 in 0.0f64..100.0,
        dt in -3.0f64..3.0,
        dh in -6.0f64..6.0,
    ) {
        let thresholds = ThresholdsSection::default();
        let last = reading(t0, h0);
        let next = reading(t0 + dt, h0 + dh);

        let t_delta = (next.temperature - last.temperature).abs();
        let h_delta = (next.humidity - last.humidity).abs();
        // Differences within rounding noise of a threshold count as equal
        prop_assume!((t_delta - 0.5).abs() > 1e-6 && (h_delta - 2.0).abs() > 1e-6);

        let expected = t_delta > 0.5 || h_delta > 2.0;
        prop_assert_eq!(exceeds_thresholds(&next, &last, &thresholds), expected);

        let mut filter = ChangeFilter::new(thresholds);
        filter.record_published(last);
        prop_assert_eq!(filter.should_publish(&next), expected);
    }

    #[test]
    fn exact_threshold_never_publishes(
        t0 in grid(-160..320),
        h0 in grid(0..400),
        t_sign in prop::bool::ANY,
        h_sign in prop::bool::ANY,
    ) {
        let dt = if t_sign { 0.5 } else { -0.5 };
        let dh = if h_sign { 2.0 } else { -2.0 };

        let mut filter = ChangeFilter::new(ThresholdsSection::default());
        filter.record_published(reading(t0, h0));

        prop_assert!(!filter.should_publish(&reading(t0 + dt, h0)));
        prop_assert!(!filter.should_publish(&reading(t0, h0 + dh)));
        prop_assert!(!filter.should_publish(&reading(t0 + dt, h0 + dh)));
    }

    #[test]
    fn exact_threshold_on_one_decimal_grid_never_publishes(
        t0 in -400i32..800,
        h0 in 0i32..980,
        t_sign in prop::bool::ANY,
        h_sign in prop::bool::ANY,
    ) {
        let t_step = if t_sign { 5 } else { -5 };
        let h_step = if h_sign { 20 } else { -20 };

        let mut filter = ChangeFilter::new(ThresholdsSection::default());
        filter.record_published(reading(tenths(t0), tenths(h0)));

        prop_assert!(!filter.should_publish(&reading(tenths(t0 + t_step), tenths(h0))));
        prop_assert!(!filter.should_publish(&reading(tenths(t0), tenths(h0 + h_step))));
        prop_assert!(!filter.should_publish(&reading(
            tenths(t0 + t_step),
            tenths(h0 + h_step)
        )));
    }

    #[test]
    fn one_tenth_past_threshold_publishes(
        t0 in -400i32..800,
        h0 in 0i32..980,
        t_sign in prop::bool::ANY,
    ) {
        let t_step = if t_sign { 6 } else { -6 };

        let mut filter = ChangeFilter::new(ThresholdsSection::default());
        filter.record_published(reading(tenths(t0), tenths(h0)));

        prop_assert!(filter.should_publish(&reading(tenths(t0 + t_step), tenths(h0))));
        prop_assert!(filter.should_publish(&reading(tenths(t0), tenths(h0 + 21))));
    }

    #[test]
    fn unchanged_reading_never_publishes(t in -40.0f64..80.0, h in 0.0f64..100.0) {
        let mut filter = ChangeFilter::new(ThresholdsSection::default());
        filter.record_published(reading(t, h));
        prop_assert!(!filter.should_publish(&reading(t, h)));
    }
}

#[test]
fn test_drift_accumulates_against_last_published() {
    let mut filter = ChangeFilter::new(ThresholdsSection::default());
    filter.record_published(reading(20.0, 50.0));

    // Each step is 0.2; only the third crosses 0.5 from the published 20.0
    assert!(!filter.should_publish(&reading(20.2, 50.0)));
    assert!(!filter.should_publish(&reading(20.4, 50.0)));
    assert!(filter.should_publish(&reading(20.6, 50.0)));
}
