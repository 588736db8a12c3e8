//! End-to-end integration tests for the complete exclusion zone flow.
//!
//! Tests the full pipeline: segment → runs → segments → annotate

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn ez_binary() -> String {
    env!("CARGO_BIN_EXE_ez").to_string()
}

const EPISODES: &str = r#"{"subject":"P1","admitted":"2024-03-01","discharged":"2024-03-05","label":"APC"}
{"subject":"P1","admitted":"2024-03-04","discharged":"2024-03-07","label":"APC"}
{"subject":"P2","admitted":"2024-05-10","discharged":"2024-05-10","label":"APC"}
this is not json
{"subject":"P3","admitted":"2024-01-10","label":"APC"}
"#;

const READINGS: &str = r#"{"patient":"P1","measured_at":"2024-02-20T08:00:00","value":1}
{"patient":"P1","measured_at":"2024-03-03","value":2}
{"patient":"P1","measured_at":"2024-03-22","value":3}
{"patient":"P2","measured_at":"2024-05-10","value":4}
"#;

/// A sandboxed home directory with a config file pointing at a temp database.
struct Sandbox {
    temp: TempDir,
    config: PathBuf,
}

impl Sandbox {
    fn new(extra_config: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("data").join("ez.db");
        let config = temp.path().join("ez.toml");
        std::fs::write(
            &config,
            format!(
                "database_path = {:?}\n{extra_config}",
                db_path.display().to_string()
            ),
        )
        .unwrap();
        Self { temp, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn ez(&self, args: &[&str]) -> Output {
        Command::new(ez_binary())
            .env("HOME", self.temp.path())
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("XDG_DATA_HOME")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .expect("failed to run ez")
    }

    fn ez_ok(&self, args: &[&str]) -> String {
        let output = self.ez(args);
        assert!(
            output.status.success(),
            "ez {args:?} should succeed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn json_lines(content: &str) -> Vec<Value> {
    content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_segment_then_annotate() {
    let sandbox = Sandbox::new("");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);
    let readings = sandbox.write("readings.jsonl", READINGS);
    let annotated = sandbox.path("annotated.jsonl");

    let report: Value =
        serde_json::from_str(&sandbox.ez_ok(&["segment", "--input", arg(&episodes), "--json"]))
            .unwrap();
    assert_eq!(report["run"]["episodes_read"], 5);
    assert_eq!(report["run"]["rejected"], 2);
    assert_eq!(report["run"]["segments"], 3);
    let run_id = report["run"]["id"].as_str().unwrap().to_string();

    let segments = json_lines(&sandbox.ez_ok(&["segments"]));
    let bounds: Vec<_> = segments
        .iter()
        .map(|s| {
            (
                s["start"].as_str().unwrap().to_string(),
                s["end"].as_str().unwrap().to_string(),
                s["labels"].clone(),
            )
        })
        .collect();
    assert_eq!(
        bounds,
        vec![
            ("2024-02-16".to_string(), "2024-03-01".to_string(), serde_json::json!(["BUFFER_BEFORE"])),
            ("2024-03-01".to_string(), "2024-03-08".to_string(), serde_json::json!(["CORE"])),
            ("2024-03-08".to_string(), "2024-03-22".to_string(), serde_json::json!(["BUFFER_AFTER"])),
        ]
    );

    let summary = sandbox.ez_ok(&[
        "annotate",
        "--input",
        arg(&readings),
        "--output",
        arg(&annotated),
        "--run",
        run_id.as_str(),
        "--subject-field",
        "patient",
        "--time-field",
        "measured_at",
    ]);
    assert!(summary.contains("Annotated 4 readings"), "summary: {summary}");

    let lines = json_lines(&std::fs::read_to_string(&annotated).unwrap());
    let labels: Vec<_> = lines.iter().map(|l| l["region_labels"].clone()).collect();
    assert_eq!(
        labels,
        vec![
            serde_json::json!(["BUFFER_BEFORE"]),
            serde_json::json!(["CORE"]),
            serde_json::json!([]),
            serde_json::json!([]),
        ]
    );
    assert_eq!(lines[0]["value"], 1);
}

#[test]
fn test_annotate_out_hospital_cohort() {
    let sandbox = Sandbox::new("");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);
    let readings = sandbox.write("readings.jsonl", READINGS);
    let annotated = sandbox.path("outside.jsonl");

    sandbox.ez_ok(&["segment", "--input", arg(&episodes)]);
    sandbox.ez_ok(&[
        "annotate",
        "--input",
        arg(&readings),
        "--output",
        arg(&annotated),
        "--cohort",
        "out-hospital",
        "--subject-field",
        "patient",
        "--time-field",
        "measured_at",
    ]);

    let values: Vec<_> = json_lines(&std::fs::read_to_string(&annotated).unwrap())
        .iter()
        .map(|l| l["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![3, 4]);
}

#[test]
fn test_annotate_missing_subject_reports_line() {
    let sandbox = Sandbox::new("");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);
    let readings = sandbox.write(
        "readings.jsonl",
        "{\"subject\":\"P1\",\"timestamp\":\"2024-03-03\"}\n{\"timestamp\":\"2024-03-03\"}\n",
    );
    let annotated = sandbox.path("annotated.jsonl");

    sandbox.ez_ok(&["segment", "--input", arg(&episodes)]);
    let output = sandbox.ez(&[
        "annotate",
        "--input",
        arg(&readings),
        "--output",
        arg(&annotated),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing subject on line 2"), "stderr: {stderr}");
    assert!(!annotated.exists(), "failed annotation must not leave output");
}

#[test]
fn test_annotate_without_runs_fails() {
    let sandbox = Sandbox::new("");
    let readings = sandbox.write("readings.jsonl", READINGS);
    let output = sandbox.ez(&[
        "annotate",
        "--input",
        arg(&readings),
        "--output",
        arg(&sandbox.path("out.jsonl")),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no recorded runs"));
}

#[test]
fn test_runs_lists_each_segmentation() {
    let sandbox = Sandbox::new("");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);

    sandbox.ez_ok(&["segment", "--input", arg(&episodes)]);
    sandbox.ez_ok(&["segment", "--input", arg(&episodes)]);

    let runs: Value = serde_json::from_str(&sandbox.ez_ok(&["runs", "--json"])).unwrap();
    let runs = runs.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["settings"]["buffer_before_days"], 14);

    let table = sandbox.ez_ok(&["runs"]);
    assert!(table.contains("episodes.jsonl"));
}

#[test]
fn test_region_settings_from_config_file() {
    let sandbox = Sandbox::new("[regions]\nbuffer_before_days = 0\nbuffer_after_days = 1\n");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);

    sandbox.ez_ok(&["segment", "--input", arg(&episodes)]);
    let segments = json_lines(&sandbox.ez_ok(&["segments"]));
    let ends: Vec<_> = segments
        .iter()
        .map(|s| s["end"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ends, vec!["2024-03-08", "2024-03-09"]);
}

#[test]
fn test_invalid_config_aborts_startup() {
    let sandbox = Sandbox::new("[regions]\nminimum_stay_days = -3\n");
    let episodes = sandbox.write("episodes.jsonl", EPISODES);

    let output = sandbox.ez(&["segment", "--input", arg(&episodes)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid [regions] configuration"), "stderr: {stderr}");
    assert!(!sandbox.path("data").join("ez.db").exists());
}

#[test]
fn test_predicates_json() {
    let sandbox = Sandbox::new("");
    let table: Value = serde_json::from_str(&sandbox.ez_ok(&["predicates", "--json"])).unwrap();
    assert_eq!(table.as_array().unwrap().len(), 8);
}
