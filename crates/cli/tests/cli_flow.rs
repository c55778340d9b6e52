use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn kubepattern() -> Command {
    let mut cmd = Command::cargo_bin("kubepattern").expect("binary");
    cmd.env_remove("KUBEPATTERN_CONFIG")
        .env_remove("KUBEPATTERN_OUTPUT_DIR")
        .env_remove("KUBEPATTERN_REGISTRY_TOKEN");
    cmd
}

fn sidecar_definition() -> Value {
    json!({
        "version": "kubepattern.it/v1",
        "kind": "Pattern",
        "metadata": {
            "name": "sidecar",
            "displayName": "Sidecar",
            "patternType": "STRUCTURAL",
            "severity": "INFO",
            "category": "composition",
            "docUrl": "https://kubepattern.it/docs/sidecar"
        },
        "spec": {
            "message": "{{pod.name}} in {{pod.namespace}} runs a sidecar",
            "topology": "SINGLE",
            "actors": ["pod"],
            "resources": [{
                "id": "pod", "resource": "Pod", "leader": true,
                "filters": {"matchAll": [
                    {"key": "$.spec.containers", "operator": "ARRAY_SIZE_GREATER_THAN", "values": ["1"]}
                ]}
            }]
        }
    })
}

fn write_snapshot(dir: &Path) -> std::path::PathBuf {
    let pod = |name: &str, containers: usize| {
        let containers: Vec<Value> = (0..containers)
            .map(|i| json!({"name": format!("c{i}"), "image": "busybox"}))
            .collect();
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": name, "namespace": "shop", "uid": format!("uid-{name}")},
            "spec": {"containers": containers}
        })
    };
    let snapshot = json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": [
            {"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "shop", "uid": "uid-shop"}},
            pod("single", 1),
            pod("double", 2)
        ]
    });
    let path = dir.join("snapshot.json");
    fs::write(&path, snapshot.to_string()).unwrap();
    path
}

#[test]
fn lint_accepts_valid_definitions() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("sidecar.json");
    fs::write(&file, sidecar_definition().to_string()).unwrap();

    kubepattern()
        .arg("lint")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"));
}

#[test]
fn lint_fails_on_invalid_definitions() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("broken.json");
    let mut definition = sidecar_definition();
    definition["metadata"]["severity"] = json!("FATAL");
    fs::write(&file, definition.to_string()).unwrap();

    let output = kubepattern().arg("lint").arg(&file).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(body["valid"], false);
    assert!(body["error"].as_str().unwrap().contains("severity"));
}

#[test]
fn lint_reads_stdin() {
    kubepattern()
        .args(["lint", "-"])
        .write_stdin(sidecar_definition().to_string())
        .assert()
        .success();
}

#[test]
fn schema_describes_pattern_documents() {
    kubepattern()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("PatternDocument"))
        .stdout(predicate::str::contains("minCommonRelationshipPoints"));
}

#[test]
fn graph_prints_discovered_relationships() {
    let dir = tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());

    let output = kubepattern()
        .args(["graph", "--cluster-name", "staging", "--snapshot"])
        .arg(&snapshot)
        .output()
        .unwrap();
    assert!(output.status.success());

    let graph: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(graph["clusterName"], "staging");
    assert_eq!(graph["vertices"].as_array().unwrap().len(), 3);
    let edges = graph["edges"].as_array().unwrap();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e["type"] == "IS_NAMESPACE_OF"));
}

#[test]
fn analyze_writes_records_and_prints_report() {
    let dir = tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let patterns = dir.path().join("patterns");
    let output_dir = dir.path().join("out");
    fs::create_dir_all(&patterns).unwrap();
    fs::write(patterns.join("sidecar.json"), sidecar_definition().to_string()).unwrap();

    let output = kubepattern()
        .arg("analyze")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--patterns")
        .arg(&patterns)
        .arg("--output")
        .arg(&output_dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(report["matchesSaved"], 1);
    assert_eq!(report["definitionsEvaluated"], 1);
    assert_eq!(report["target"]["scope"], "cluster");

    let records: Vec<_> = fs::read_dir(output_dir.join("pattern-analysis-ns"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(records.len(), 1);
    let record: Value = serde_json::from_str(&fs::read_to_string(&records[0]).unwrap()).unwrap();
    assert_eq!(record["kind"], "K8sPattern");
    assert_eq!(record["spec"]["message"], "double in shop runs a sidecar");
    assert_eq!(record["spec"]["referenceLink"], "https://kubepattern.it/docs/sidecar");
}

#[test]
fn analyze_unknown_namespace_fails() {
    let dir = tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    let patterns = dir.path().join("patterns");
    fs::create_dir_all(&patterns).unwrap();

    kubepattern()
        .arg("analyze")
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--patterns")
        .arg(&patterns)
        .arg("--output")
        .arg(dir.path().join("out"))
        .args(["--namespace", "billing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Namespace not found: billing"));
}

#[test]
fn analyze_requires_a_definition_source() {
    let dir = tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());

    kubepattern()
        .arg("analyze")
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .failure();
}
