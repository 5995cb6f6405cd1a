//! Integration tests for the publisher worker and its query client.
//!
//! Observations go in through a broadcaster, exactly as producers deliver
//! them, and come back out through `PublisherClient` queries.

use std::thread;

use pulse::PulseError;
use pulse::broadcast::Broadcaster;
use pulse::error::{ConfigError, PublisherError};
use pulse::observation::Observation;
use pulse::publisher::{Publisher, PublisherConfig};

const BASE: u64 = 1_700_000_000_000_000_000;
const SECOND: u64 = 1_000_000_000;

fn publisher(keep: usize) -> Publisher {
    Publisher::new(PublisherConfig {
        keep,
        base_url: "http://localhost:8080".to_string(),
        ..PublisherConfig::default()
    })
    .unwrap()
}

#[test]
fn test_hour_of_seconds_for_four_series() {
    let publisher = publisher(3600);
    let broadcaster = Broadcaster::new();
    assert!(broadcaster.add_receiver(&publisher));

    let names = ["cpu", "mem", "disk", "net"];
    for i in 0..5000u32 {
        for name in names {
            let ts = BASE + u64::from(i) * SECOND;
            broadcaster.broadcast(&Observation::new(ts, name, f64::from(i)));
        }
    }

    let client = publisher.client();
    client.flush().unwrap();
    let selected = client.select(&names).unwrap();
    assert_eq!(selected.len(), 4);

    for name in names {
        let points = &selected[name];
        assert_eq!(points.len(), 3600, "series {name}");
        assert_eq!(points[0].value, 1400.0);
        assert_eq!(points[0].timestamp, BASE + 1400 * SECOND);
        assert_eq!(points[3599].value, 4999.0);
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}

#[test]
fn test_series_listing() {
    let publisher = publisher(10);
    let broadcaster = Broadcaster::new();
    broadcaster.add_receiver(&publisher);

    for name in ["requests", "latency:1M_AVG", "errors"] {
        broadcaster.broadcast(&Observation::new(BASE, name, 1.0));
    }

    let listed = publisher.client().series().unwrap();
    let names: Vec<&str> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["errors", "latency:1M_AVG", "requests"]);
    assert_eq!(listed[2].url, "http://localhost:8080/series?q=requests");
}

#[test]
fn test_concurrent_clients() {
    let publisher = publisher(100);
    let broadcaster = Broadcaster::new();
    broadcaster.add_receiver(&publisher);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let client = publisher.client();
            thread::spawn(move || {
                for _ in 0..50 {
                    let selected = client.select(&["load"]).unwrap();
                    if let Some(points) = selected.get("load") {
                        assert!(points.len() <= 100);
                    }
                }
            })
        })
        .collect();

    for i in 0..1000u32 {
        broadcaster.broadcast(&Observation::new(BASE + u64::from(i), "load", f64::from(i)));
    }
    for reader in readers {
        reader.join().unwrap();
    }

    let selected = publisher.client().select(&["load"]).unwrap();
    let points = &selected["load"];
    assert_eq!(points.len(), 100);
    assert_eq!(points[99].value, 999.0);
}

#[test]
fn test_shutdown_applies_pending_and_closes_clients() {
    let mut publisher = publisher(10);
    let client = publisher.client();
    let other = publisher.client();
    let broadcaster = Broadcaster::new();
    broadcaster.add_receiver(&publisher);

    broadcaster.broadcast(&Observation::new(BASE, "x", 1.0));
    client.flush().unwrap();
    publisher.shutdown();

    assert!(matches!(
        client.series(),
        Err(PulseError::Publisher(PublisherError::Closed))
    ));
    assert!(matches!(
        other.select(&["x"]),
        Err(PulseError::Publisher(PublisherError::Closed))
    ));

    // Late observations are dropped with a warning, not a panic.
    broadcaster.broadcast(&Observation::new(BASE + 1, "x", 2.0));
}

#[test]
fn test_invalid_multiplier_fails_construction() {
    let result = Publisher::new(PublisherConfig {
        capacity_multiplier: 0.9,
        ..PublisherConfig::default()
    });
    assert!(matches!(
        result,
        Err(PulseError::Config(ConfigError::InvalidCapacityMultiplier { .. }))
    ));
}
