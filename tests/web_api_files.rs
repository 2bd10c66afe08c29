//! Web API file metadata, admin and routing tests.

mod common;

use common::{spawn_app, token_for};
use filedepot::file::{FilePermissionRepository, PermissionRole};
use filedepot::Role;
use serde_json::{json, Value};

fn file_id(data: &Value) -> String {
    data["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_public_projection() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    let id = file_id(&app.upload(&alice, "cat.png", b"meow").await);

    let response = app
        .server
        .get("/api/file/public")
        .add_query_param("fileId", &id)
        .await;
    assert_eq!(response.status_code(), 200);
    let data = response.json::<Value>()["data"].clone();
    assert_eq!(data["id"], id.as_str());
    assert_eq!(data["name"], "cat.png");
    assert_eq!(data["type"], "image");
    assert_eq!(data["size"], 4);
    assert!(data["createdAt"].is_string());
    assert!(data.get("path").is_none());

    let response = app
        .server
        .get("/api/file/public")
        .add_query_param("fileId", "missing")
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_public_projection_hides_inactive_files() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    let id = file_id(&app.upload(&alice, "old.txt", b"old").await);

    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&alice)
        .json(&json!({ "status": "archived" }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["data"]["status"], "archived");

    let response = app
        .server
        .get("/api/file/public")
        .add_query_param("fileId", &id)
        .await;
    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_patch_metadata_by_owner() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    let id = file_id(&app.upload(&alice, "draft.txt", b"draft").await);

    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&alice)
        .json(&json!({
            "name": "  final.txt  ",
            "description": "the final version",
            "tags": [{ "key": "project", "value": "depot" }]
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let data = response.json::<Value>()["data"].clone();
    assert_eq!(data["name"], "final.txt");
    assert_eq!(data["description"], "the final version");
    assert_eq!(data["tags"][0]["key"], "project");
    assert_eq!(data["createdBy"], "alice");
}

#[tokio::test]
async fn test_patch_rules_for_other_users() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    let bob = token_for("bob", Role::User);
    let id = file_id(&app.upload(&alice, "shared.txt", b"x").await);

    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&bob)
        .json(&json!({ "name": "mine.txt" }))
        .await;
    assert_eq!(response.status_code(), 403);

    FilePermissionRepository::new(app.state.db.pool())
        .grant(&id, "bob", PermissionRole::Editor)
        .await
        .unwrap();

    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&bob)
        .json(&json!({ "name": "renamed.txt" }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["data"]["name"], "renamed.txt");

    // editors cannot change status; with nothing else left the patch is empty
    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&bob)
        .json(&json!({ "status": "archived" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = app
        .server
        .patch(&format!("/api/file/{id}"))
        .authorization_bearer(&alice)
        .json(&json!({ "name": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_delete_requires_owner_or_admin() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    let bob = token_for("bob", Role::User);
    let first = file_id(&app.upload(&alice, "one.txt", b"1").await);
    let second = file_id(&app.upload(&alice, "two.txt", b"2").await);

    let response = app
        .server
        .delete(&format!("/api/file/{first}"))
        .authorization_bearer(&bob)
        .await;
    assert_eq!(response.status_code(), 403);

    let response = app
        .server
        .delete(&format!("/api/file/{first}"))
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .server
        .delete(&format!("/api/file/{second}"))
        .authorization_bearer(token_for("root", Role::Admin))
        .await;
    assert_eq!(response.status_code(), 200);

    let response = app
        .server
        .delete("/api/file/unknown")
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_admin_listing() {
    let app = spawn_app().await;
    let alice = token_for("alice", Role::User);
    for name in ["a.txt", "b.txt", "c.txt"] {
        app.upload(&alice, name, name.as_bytes()).await;
    }

    let response = app
        .server
        .get("/api/admin/files")
        .authorization_bearer(&alice)
        .await;
    assert_eq!(response.status_code(), 403);

    let response = app
        .server
        .get("/api/admin/files")
        .add_query_param("page", 1)
        .add_query_param("pageSize", 2)
        .authorization_bearer(token_for("root", Role::Admin))
        .await;
    assert_eq!(response.status_code(), 200);
    let data = response.json::<Value>()["data"].clone();
    assert_eq!(data["items"].as_array().unwrap().len(), 2);
    assert_eq!(data["meta"]["total"], 3);
    assert_eq!(data["meta"]["pageSize"], 2);

    let response = app
        .server
        .get("/api/admin/files")
        .add_query_param("status", "deleted")
        .authorization_bearer(token_for("mod", Role::Moderator))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["data"]["meta"]["total"], 0);
}

#[tokio::test]
async fn test_health_and_openapi() {
    let app = spawn_app().await;

    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "OK");

    let response = app.server.get("/api-docs/openapi.json").await;
    assert_eq!(response.status_code(), 200);
    let spec = response.json::<Value>();
    assert!(spec["paths"]["/file/upload/chunk/merge"].is_object());
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = spawn_app().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert_eq!(response.header("referrer-policy"), "no-referrer");
}

#[tokio::test]
async fn test_unknown_version_prefix_is_not_found() {
    let app = spawn_app().await;
    let response = app
        .server
        .post("/v9/file/download/token")
        .authorization_bearer(token_for("alice", Role::User))
        .json(&json!({ "fileId": "x" }))
        .await;
    assert_eq!(response.status_code(), 404);
}
