//! End-to-end flows over the HTTP router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use itrack_auth::JwtCredentialIssuer;
use itrack_core::ids::PrincipalId;
use itrack_core::{Principal, Role, Site};
use itrack_server::{AppState, ItrackServer};
use itrack_settings::ItrackSettings;
use itrack_store::{Database, ProfileRepo};

const SECRET: &str = "integration-secret";

struct App {
    router: Router,
    jwt: JwtCredentialIssuer,
}

fn pid(id: &str) -> PrincipalId {
    PrincipalId::from_raw(id)
}

fn app() -> App {
    let mut settings = ItrackSettings::default();
    settings.auth.jwt_secret = SECRET.into();
    let _ = settings
        .pipeline
        .chains
        .insert(Site::Sec, vec![Role::Mentor, Role::Hod, Role::Principal]);

    let db = Database::in_memory().unwrap();
    let profiles = ProfileRepo::new(db.clone());
    profiles
        .upsert_student(&pid("s1"), "Asha", Some("cse"), Some(Site::Sec), Some(&pid("m1")))
        .unwrap();
    profiles
        .upsert_student(&pid("s2"), "Ravi", Some("cse"), Some(Site::Sec), Some(&pid("m1")))
        .unwrap();
    profiles.upsert_staff(&pid("m1"), "Meera", Some("cse"), Some(Site::Sec)).unwrap();
    profiles.upsert_staff(&pid("h1"), "Harish", Some("cse"), Some(Site::Sec)).unwrap();
    profiles.upsert_staff(&pid("p1"), "Priya", None, Some(Site::Sec)).unwrap();
    profiles.upsert_staff(&pid("x1"), "Xavier", Some("ece"), Some(Site::Sec)).unwrap();

    let state = AppState::from_settings(&settings, &db).unwrap();
    App {
        router: ItrackServer::new(settings.server.clone(), state).router(),
        jwt: JwtCredentialIssuer::new(SECRET, &settings.auth.issuer, 3600),
    }
}

impl App {
    fn token(&self, id: &str, role: Role) -> String {
        self.jwt
            .issue(&Principal::new(pid(id), [role], None, None))
            .unwrap()
    }

    async fn send(&self, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1/internships{uri}"))
            .header("authorization", format!("Bearer {token}"));
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn register(&self, student: &str) -> Value {
        let (status, body) = self
            .send("POST", "/register", &self.token(student, Role::Student), Some(register_body()))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"].clone()
    }
}

fn file(name: &str, content: &[u8]) -> Value {
    json!({
        "fileName": name,
        "mimeType": "application/pdf",
        "contentBase64": STANDARD.encode(content),
    })
}

fn register_body() -> Value {
    json!({
        "employerName": "Acme Robotics",
        "employerRegistrationId": "GST-29ABCDE",
        "startDate": "2026-05-04",
        "endDate": "2026-07-24",
        "durationWeeks": 12,
        "offerLetter": file("offer.pdf", b"%PDF-1.7 offer"),
    })
}

fn id_of(record: &Value) -> String {
    record["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_review_cycle_with_send_back_and_completion() {
    let app = app();
    let student = app.token("s1", Role::Student);
    let mentor = app.token("m1", Role::Mentor);
    let hod = app.token("h1", Role::Hod);
    let principal = app.token("p1", Role::Principal);

    let record = app.register("s1").await;
    let id = id_of(&record);
    assert_eq!(record["status"], "under_review");
    assert_eq!(record["currentApprover"], "mentor");

    let (status, body) = app.send("POST", &format!("/approval/{id}"), &mentor, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentApprover"], "hod");

    let (status, body) = app
        .send(
            "POST",
            &format!("/send-back/{id}"),
            &hod,
            Some(json!({ "reason": "offer letter unsigned" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "sent_back");
    assert_eq!(body["data"]["currentApprover"], "mentor");

    let (status, body) = app.send("POST", &format!("/resubmit/{id}"), &student, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "under_review");

    for token in [&mentor, &hod] {
        let (status, _) = app.send("POST", &format!("/approval/{id}"), token, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .send(
            "POST",
            &format!("/approval/{id}"),
            &principal,
            Some(json!({ "comment": "cleared" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert!(body["data"]["currentApprover"].is_null());
    assert_eq!(body["data"]["trail"].as_array().unwrap().len(), 6);

    let (status, body) = app
        .send(
            "POST",
            &format!("/completion-update/{id}"),
            &student,
            Some(json!({ "certificate": file("certificate.pdf", b"%PDF-1.7 cert") })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completion_pending");
    assert_eq!(body["data"]["phase"], "completion");

    let (status, body) = app.send("POST", &format!("/approval/{id}"), &mentor, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completion_verified");

    let (status, body) = app
        .send("GET", &format!("/download-file/{id}?kind=certificate"), &hod, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fileName"], "certificate.pdf");
    let bytes = STANDARD
        .decode(body["data"]["contentBase64"].as_str().unwrap())
        .unwrap();
    assert_eq!(bytes, b"%PDF-1.7 cert");

    let (status, body) = app.send("GET", "/check", &student, None).await;
    assert_eq!(status, StatusCode::OK);
    let statuses = body["data"].as_array().unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0]["status"], "completion_verified");
}

#[tokio::test]
async fn terminal_record_refuses_further_review() {
    let app = app();
    let mentor = app.token("m1", Role::Mentor);
    let id = id_of(&app.register("s1").await);

    let (status, _) = app
        .send("POST", &format!("/reject/{id}"), &mentor, Some(json!({ "reason": "fake employer" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("POST", &format!("/approval/{id}"), &mentor, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATE_CONFLICT");
}

#[tokio::test]
async fn stale_version_is_409() {
    let app = app();
    let mentor = app.token("m1", Role::Mentor);
    let hod = app.token("h1", Role::Hod);
    let record = app.register("s1").await;
    let id = id_of(&record);
    let version = record["version"].as_i64().unwrap();

    let (status, _) = app.send("POST", &format!("/approval/{id}"), &mentor, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            "POST",
            &format!("/send-back/{id}"),
            &hod,
            Some(json!({ "reason": "dates", "version": version })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STALE_STATE");
}

#[tokio::test]
async fn out_of_turn_and_out_of_scope_are_403() {
    let app = app();
    let id = id_of(&app.register("s1").await);

    // Hod acting before the mentor.
    let (status, body) = app
        .send("POST", &format!("/approval/{id}"), &app.token("h1", Role::Hod), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "NOT_AUTHORIZED");
    assert_eq!(body["message"], "You are not authorized to perform this action");

    // Another student.
    let (status, _) = app
        .send("GET", &format!("/{id}"), &app.token("s2", Role::Student), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Mentor from another department.
    let (status, _) = app
        .send("GET", &format!("/{id}"), &app.token("x1", Role::Mentor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn listing_is_scoped() {
    let app = app();
    let _ = app.register("s1").await;
    let _ = app.register("s2").await;

    let (status, body) = app.send("GET", "/view/all", &app.token("h1", Role::Hod), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app.send("GET", "/view/all", &app.token("x1", Role::Hod), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = app
        .send("GET", "/student/s1", &app.token("s1", Role::Student), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn amend_by_owner_then_staff_delete() {
    let app = app();
    let student = app.token("s1", Role::Student);
    let record = app.register("s1").await;
    let id = id_of(&record);

    let mut amended = register_body();
    amended["employerName"] = json!("Acme Robotics Pvt Ltd");
    amended["version"] = record["version"].clone();
    let (status, body) = app.send("PUT", &format!("/{id}"), &student, Some(amended)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["employerName"], "Acme Robotics Pvt Ltd");

    let (status, _) = app.send("DELETE", &format!("/{id}"), &student, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("DELETE", &format!("/{id}"), &app.token("h1", Role::Hod), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("GET", &format!("/{id}"), &student, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn oversized_or_wrong_type_upload_is_rejected() {
    let app = app();
    let student = app.token("s1", Role::Student);
    let mut body = register_body();
    body["offerLetter"]["mimeType"] = json!("application/x-msdownload");

    let (status, resp) = app.send("POST", "/register", &student, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "VALIDATION_FAILED");

    let (status, body) = app.send("GET", "/check", &student, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());
}
