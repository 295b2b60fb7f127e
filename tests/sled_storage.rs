//! Sled Storage Tests
//!
//! On-disk behaviour of the sled-backed stores: dedup across reopen,
//! newest-first history, key isolation between similar location ids, and a
//! weather join read from the same database.

use aqi_pipeline::config::{PipelineConfig, StorageBackend, StorageConfig};
use aqi_pipeline::pipeline::{Outcome, PipelineStats, ReadingProcessor};
use aqi_pipeline::storage::{AppendOutcome, Stores};
use aqi_pipeline::types::{EnrichmentStatus, WeatherObservation};
use aqi_pipeline::weather::SledWeatherTable;

use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

fn sled_config(dir: &Path) -> StorageConfig {
    StorageConfig {
        backend: StorageBackend::Sled,
        data_dir: dir.to_path_buf(),
    }
}

fn reading(location: &str, hour: u32, pm10: f64) -> String {
    format!(
        r#"{{"location_id":"{location}","observed_at":"2024-05-01 {hour:02}:00:00","pm10":{pm10}}}"#
    )
}

fn processor(stores: &Stores) -> ReadingProcessor {
    ReadingProcessor::from_config(&PipelineConfig::default(), stores, Arc::new(PipelineStats::new())).unwrap()
}

#[tokio::test]
async fn dedup_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = sled_config(dir.path());

    {
        let stores = Stores::open(&config).unwrap();
        processor(&stores).process(reading("bojongsoang", 10, 80.0).as_bytes()).await;
        tokio_test::assert_ok!(stores.flush());
    }

    let stores = Stores::open(&config).unwrap();
    assert_eq!(stores.analytical.row_count().await.unwrap(), 1);

    let Outcome::Persisted { scored, report } =
        processor(&stores).process(reading("bojongsoang", 10, 80.0).as_bytes()).await
    else {
        panic!("expected persisted");
    };
    assert!(report.fully_persisted());
    assert_eq!(
        stores.analytical.append_if_absent(&scored.to_analytical_row()).await.unwrap(),
        AppendOutcome::Duplicate
    );
    assert_eq!(stores.analytical.row_count().await.unwrap(), 1);
}

#[tokio::test]
async fn history_is_newest_first_and_isolated_per_location() {
    let dir = tempfile::tempdir().unwrap();
    let stores = Stores::open(&sled_config(dir.path())).unwrap();
    let p = processor(&stores);

    for hour in [9, 7, 11, 8] {
        p.process(reading("a", hour, 10.0).as_bytes()).await;
    }
    // "ab" shares a byte prefix with "a"
    p.process(reading("ab", 12, 10.0).as_bytes()).await;

    let rows = stores.analytical.history("a", 3).await.unwrap();
    let hours: Vec<u32> = rows
        .iter()
        .map(|r| chrono::Timelike::hour(&r.observed_at))
        .collect();
    assert_eq!(hours, vec![11, 9, 8]);
    assert!(rows.iter().all(|r| r.location_id == "a"));

    assert_eq!(stores.analytical.history("ab", 10).await.unwrap().len(), 1);
    assert!(stores.analytical.history("nowhere", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn current_store_keeps_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let stores = Stores::open(&sled_config(dir.path())).unwrap();
    let p = processor(&stores);

    p.process(reading("a", 10, 10.0).as_bytes()).await;
    p.process(reading("a", 11, 200.0).as_bytes()).await;
    p.process(reading("b", 11, 10.0).as_bytes()).await;

    let docs = stores.current.list().await.unwrap();
    assert_eq!(
        docs.iter().map(|d| d.location_id.as_str()).collect::<Vec<_>>(),
        vec!["a", "b"]
    );
    assert_eq!(docs[0].pollutants.values().copied().collect::<Vec<_>>(), vec![200.0]);
}

#[tokio::test]
async fn weather_side_table_shares_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path().join("aqi.db")).unwrap();

    let table = SledWeatherTable::new(&db).unwrap();
    table
        .record(&WeatherObservation {
            location_id: "bojongsoang".to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            temperature: 26.0,
            humidity: 85.0,
            wind_speed: 0.8,
            wind_direction: 180.0,
        })
        .unwrap();

    let stores = Stores::sled(db).unwrap();
    let Outcome::Persisted { scored, .. } =
        processor(&stores).process(reading("bojongsoang", 10, 80.0).as_bytes()).await
    else {
        panic!("expected persisted");
    };
    assert_eq!(scored.enrichment, EnrichmentStatus::Matched);
    assert_eq!(scored.weather.unwrap().humidity, 85.0);
}
