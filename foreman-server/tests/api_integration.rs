mod common;

use std::fs;

use axum::http::StatusCode;
use common::{seed_work_effort, TestApp};
use serde_json::json;

#[tokio::test]
async fn health_reports_repos_and_clients() {
    let app = TestApp::spawn(&["_pyrite", "fogsift"]).await;
    let (status, body) = app.get("/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 0);
    let repos: Vec<&str> = body["repos"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(repos, ["_pyrite", "fogsift"]);
}

#[tokio::test]
async fn repo_listing_aggregates_both_repos() {
    let app = TestApp::spawn(&["_pyrite", "fogsift"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-aaaa",
        "One",
        "active",
        &[("TKT-aaaa-001", "pending"), ("TKT-aaaa-002", "completed")],
    );
    seed_work_effort(
        &app.repo_path("fogsift"),
        "WE-260502-bbbb",
        "Two",
        "completed",
        &[],
    );
    app.registry.refresh("_pyrite").await.unwrap();
    app.registry.refresh("fogsift").await.unwrap();

    let (status, body) = app.get("/api/repos").await;
    assert_eq!(status, StatusCode::OK);
    let repos = body["repos"].as_object().unwrap();
    assert_eq!(repos.len(), 2);
    assert_eq!(repos["_pyrite"]["stats"]["total"], 1);
    assert_eq!(repos["_pyrite"]["stats"]["totalTickets"], 2);
    assert_eq!(
        repos["fogsift"]["stats"]["byStatus"]["completed"],
        1
    );
}

#[tokio::test]
async fn single_repo_fetch_and_miss() {
    let app = TestApp::spawn(&["_pyrite"]).await;

    let (status, body) = app.get("/api/repos/_pyrite").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("workEfforts").is_some());
    assert!(body.get("lastUpdated").is_some());

    let (status, body) = app.get("/api/repos/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Repo not found");
}

#[tokio::test]
async fn add_repo_requires_path() {
    let app = TestApp::spawn(&[]).await;
    let (status, body) =
        app.post("/api/repos", json!({ "name": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("path"));
}

#[tokio::test]
async fn add_then_remove_repo_round_trip() {
    let app = TestApp::spawn(&[]).await;
    let new_repo = app.workspace.path().join("incoming");
    seed_work_effort(
        &new_repo,
        "WE-260501-aaaa",
        "Seeded",
        "active",
        &[],
    );

    let (status, body) = app
        .post(
            "/api/repos",
            json!({
                "name": "incoming",
                "path": new_repo.to_string_lossy(),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["state"]["stats"]["total"], 1);

    // Configuration was persisted before responding.
    let persisted = fs::read_to_string(
        app.workspace.path().join("config.json"),
    )
    .unwrap();
    assert!(persisted.contains("incoming"));

    let (status, body) = app.delete("/api/repos/incoming").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.get("/api/repos/incoming").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn add_repo_without_work_efforts_dir_is_rejected() {
    let app = TestApp::spawn(&[]).await;
    let bare = app.workspace.path().join("bare");
    fs::create_dir_all(&bare).unwrap();

    let (status, body) = app
        .post(
            "/api/repos",
            json!({ "name": "bare", "path": bare.to_string_lossy() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("work-efforts"));
}

#[tokio::test]
async fn status_patch_round_trips_through_reparse() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-ab12",
        "Demo",
        "active",
        &[],
    );
    app.registry.refresh("_pyrite").await.unwrap();

    let (status, body) = app
        .patch(
            "/api/repos/_pyrite/work-efforts/WE-260501-ab12/status",
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");

    // A reparse observes the patched value.
    let state = app.registry.refresh("_pyrite").await.unwrap();
    assert_eq!(
        state
            .work_effort("WE-260501-ab12")
            .unwrap()
            .status
            .as_str(),
        "completed"
    );
}

#[tokio::test]
async fn invalid_status_is_rejected_without_side_effects() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-ab12",
        "Demo",
        "active",
        &[],
    );
    app.registry.refresh("_pyrite").await.unwrap();

    let (status, body) = app
        .patch(
            "/api/repos/_pyrite/work-efforts/WE-260501-ab12/status",
            json!({ "status": "done" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Invalid status. Must be one of:"));
    for allowed in
        ["active", "in_progress", "paused", "completed", "pending", "blocked"]
    {
        assert!(message.contains(allowed));
    }

    // No filesystem change occurred.
    let raw = fs::read_to_string(app.repo_path("_pyrite").join(
        "_work_efforts/WE-260501-ab12_fixture/WE-260501-ab12_index.md",
    ))
    .unwrap();
    assert!(raw.contains("status: active"));
}

#[tokio::test]
async fn patching_unknown_work_effort_is_not_found() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    let (status, body) = app
        .patch(
            "/api/repos/_pyrite/work-efforts/WE-999999-zzzz/status",
            json!({ "status": "completed" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Work effort not found");
}

#[tokio::test]
async fn browse_lists_work_efforts_bearing_dirs_first() {
    let app = TestApp::spawn(&["zzz-repo"]).await;
    seed_work_effort(
        &app.repo_path("zzz-repo"),
        "WE-260501-ab12",
        "Demo",
        "active",
        &[],
    );
    fs::create_dir_all(app.workspace.path().join("aaa-plain")).unwrap();
    fs::create_dir_all(app.workspace.path().join("node_modules"))
        .unwrap();
    fs::create_dir_all(app.workspace.path().join(".hidden")).unwrap();

    let (status, body) = app.get("/api/browse").await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert!(!names.contains(&"node_modules"));
    assert!(!names.contains(&".hidden"));
    // Work-efforts-bearing repo sorts ahead of the alphabetically
    // earlier plain directory.
    let zzz = names.iter().position(|n| *n == "zzz-repo").unwrap();
    let aaa = names.iter().position(|n| *n == "aaa-plain").unwrap();
    assert!(zzz < aaa);

    let repo_item = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["name"] == "zzz-repo")
        .unwrap();
    assert_eq!(repo_item["hasWorkEfforts"], true);
    assert_eq!(repo_item["workEffortCount"], 1);
    assert_eq!(repo_item["isAdded"], true);
}

#[tokio::test]
async fn browse_refuses_paths_outside_the_root() {
    let app = TestApp::spawn(&[]).await;
    let (status, body) = app.get("/api/browse?path=/etc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("outside the browse root"));
}

#[tokio::test]
async fn bulk_add_reports_added_and_errors() {
    let app = TestApp::spawn(&[]).await;
    let good = app.workspace.path().join("good");
    seed_work_effort(&good, "WE-260501-ab12", "Demo", "active", &[]);
    let bare = app.workspace.path().join("bare");
    fs::create_dir_all(&bare).unwrap();

    let (status, body) = app
        .post(
            "/api/repos/bulk",
            json!({
                "paths": [
                    good.to_string_lossy(),
                    bare.to_string_lossy(),
                    "/nonexistent/nowhere",
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    assert_eq!(body["added"][0]["name"], "good");
}

#[tokio::test]
async fn counter_stats_and_audit_are_stamped() {
    let app = TestApp::spawn(&[]).await;

    let (status, body) = app.get("/api/counter/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("timestamp").is_some());
    assert_eq!(body["counters"]["workEfforts"]["global"], 0);

    let (status, body) = app.get("/api/counter/audit?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn counter_repair_scenario_round_trips() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-aaaa",
        "One",
        "active",
        &[],
    );
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260502-bbbb",
        "Two",
        "active",
        &[],
    );

    // Seed counters from the filesystem.
    let (status, _) = app.post("/api/counter/migrate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/counter/validate").await;
    assert_eq!(body["status"], "valid");

    // Out-of-band deletion drifts the filesystem below the counter.
    fs::remove_dir_all(
        app.repo_path("_pyrite")
            .join("_work_efforts/WE-260502-bbbb_fixture"),
    )
    .unwrap();

    let (status, report) = app.get("/api/counter/validate").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["status"], "invalid");
    let failed: Vec<&str> = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["passed"] == false)
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(failed, ["Work Efforts Count"]);

    let (status, result) =
        app.post("/api/counter/repair", report).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["successCount"], 1);

    let (_, audit) = app.get("/api/counter/audit?limit=5").await;
    let last = audit["entries"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["reason"], "auto-repair: Work Efforts Count");
    assert_eq!(last["action"], "set");

    let (_, body) = app.get("/api/counter/validate").await;
    assert_eq!(body["status"], "valid");
}

#[tokio::test]
async fn migrate_preview_leaves_counters_untouched() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-aaaa",
        "One",
        "active",
        &[("TKT-aaaa-001", "pending")],
    );

    let (status, body) =
        app.post("/api/counter/migrate/preview", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let proposed = body["proposed"].as_array().unwrap();
    assert!(proposed.iter().any(|p| {
        p["counter"] == "workEfforts.global" && p["value"] == 1
    }));

    let (_, stats) = app.get("/api/counter/stats").await;
    assert_eq!(stats["counters"]["workEfforts"]["global"], 0);
}

#[tokio::test]
async fn migrate_report_diffs_disk_against_state() {
    let app = TestApp::spawn(&["_pyrite"]).await;
    seed_work_effort(
        &app.repo_path("_pyrite"),
        "WE-260501-aaaa",
        "One",
        "active",
        &[],
    );

    let (status, body) = app.get("/api/counter/migrate/report").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["needsMigration"], true);
    assert_eq!(body["filesystem"]["workEffortsTotal"], 1);
    assert_eq!(body["counterState"]["workEfforts"]["global"], 0);
}
