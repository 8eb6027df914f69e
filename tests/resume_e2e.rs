//! Interrupted extraction, resume, then merge with event details.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use harvester::models::{Config, Record};
use harvester::pipeline::{MergeOptions, run_extract, run_merge};
use harvester::services::{Capture, ReplaySource};
use harvester::storage::Checkpoint;
use harvester::utils::fs::load_json;
use serde_json::{Value, json};
use tempfile::TempDir;

fn participant(id: &str, dog: &str, rounds: &str) -> Value {
    json!({
        "id": id,
        "fragment": [
            {"kind": "pair", "label": "Dorsal", "value": id.trim_start_matches('p')},
            {"kind": "pair", "label": "Guía", "value": format!("Guía de {dog}")},
            {"kind": "pair", "label": "Perro", "value": dog},
            {"kind": "pair", "label": "Altura (cm)", "value": "48 cm"},
            {"kind": "day_header", "text": "Sábado"},
            {"kind": "pair", "label": "Fecha", "value": "12/04/2025"},
            {"kind": "pair", "label": "Mangas", "value": rounds}
        ]
    })
}

fn capture() -> Capture {
    serde_json::from_value(json!({
        "events": [
            {
                "id": "e1",
                "url": "https://agility.example/zone/events/e1",
                "participants_url": "https://agility.example/zone/events/e1/participants_list",
                "participants": [
                    participant("p11", "Luna", "G2/M(J12)"),
                    participant("p12", "Rayo", "G1 / Small"),
                    participant("p13", "Kira", "G3 Large"),
                    participant("p14", "Nala", "PRE-AGILITY 30"),
                    participant("p15", "Toby", "G2 XS Senior")
                ]
            },
            {
                "id": "e2",
                "url": "https://agility.example/zone/events/e2",
                "title": "Copa del Norte",
                "participants": [
                    participant("p21", "Duna", "G1/L"),
                    participant("p22", "Coco", "G2/I"),
                    participant("p23", "Lola", "G3/M"),
                    participant("p24", "Bimba", "G1/S")
                ]
            }
        ]
    }))
    .unwrap()
}

fn config(out: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.output_dir = out.path().to_string_lossy().into_owned();
    config.extract.request_delay_ms = 0;
    config.extract.retry_backoff_ms = 0;
    config
}

fn row_count(path: &std::path::Path) -> usize {
    csv::Reader::from_path(path).unwrap().records().count()
}

#[tokio::test]
async fn interrupted_run_resumes_and_merges() {
    let out = TempDir::new().unwrap();
    let mut config = config(&out);

    // First run stops after 3 of the 5 participants of e1.
    config.extract.max_events = 1;
    config.extract.max_participants = 3;
    let first = run_extract(
        &config,
        ReplaySource::new(capture()),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();
    assert_eq!(first.participants_written, 3);

    let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
    assert_eq!(checkpoint.last_sub_index("e1"), 3);
    assert!(!checkpoint.is_entity_started("e2"));

    // Resume without limits.
    config.extract.max_events = 0;
    config.extract.max_participants = 0;
    let second = run_extract(
        &config,
        ReplaySource::new(capture()),
        Arc::new(AtomicBool::new(false)),
    )
    .await
    .unwrap();
    assert_eq!(second.participants_written, 2 + 4);
    assert_eq!(second.events_completed, 2);

    assert_eq!(row_count(&second.participants_sink), 5 + 4);
    assert_eq!(row_count(&second.events_sink), 2);

    let checkpoint = Checkpoint::open(config.paths.checkpoint_path(), true);
    assert!(checkpoint.is_entity_done("e1"));
    assert!(checkpoint.is_entity_done("e2"));
    assert!(checkpoint.state().in_progress.is_empty());

    // A third run fetches nothing.
    let mut replay = ReplaySource::new(capture());
    let third = run_extract(&config, &mut replay, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();
    assert_eq!(third.events_skipped, 2);
    assert_eq!(replay.calls(), ["events"]);

    // Merge with event details from a separate directory.
    let details = TempDir::new().unwrap();
    fs::write(
        details.path().join("events_details.json"),
        json!([
            {
                "url_detalle": "https://agility.example/zone/events/e1/info",
                "nombre": "Trofeo de Primavera",
                "lugar": "Oviedo",
                "organizacion": "Club Agility Norte"
            },
            {"id": "e2", "nombre": "Otro nombre", "lugar": "Gijón"}
        ])
        .to_string(),
    )
    .unwrap();

    let options = MergeOptions {
        primary: out.path().to_path_buf(),
        secondary: Some(details.path().to_path_buf()),
        output: config.paths.final_output_path(),
    };
    let report = run_merge(&config, &options).unwrap();
    assert_eq!(report.output_records, 9);
    assert_eq!(report.matched, 9);

    let merged: Vec<Record> = load_json(&options.output).unwrap();
    assert_eq!(merged.len(), 9);
    for record in &merged {
        match record["event_id"].as_str() {
            "e1" => {
                assert_eq!(record["event_title"], "Trofeo de Primavera");
                assert_eq!(record["event_location"], "Oviedo");
                assert_eq!(record["event_organizer"], "Club Agility Norte");
            }
            "e2" => {
                assert_eq!(record["event_title"], "Copa del Norte");
                assert_eq!(record["event_location"], "Gijón");
                assert_eq!(record["event_club"], "unknown");
            }
            other => panic!("unexpected event {other}"),
        }
    }

    let luna = merged.iter().find(|r| r["dog"] == "Luna").unwrap();
    assert_eq!(luna["height"], "48");
    assert_eq!(luna["grade_1"], "G2");
    assert_eq!(luna["category_1"], "M");
    assert_eq!(luna["extra_category_1"], "J12");
    assert_eq!(luna["day_1"], "Sábado");
}
