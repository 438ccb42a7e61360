use std::{sync::Arc, time::Duration};

use ledger::records::{NewCategory, NewCourse, NewDepartment, Priority};
use reqwest::{
    Client, StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
        SET_COOKIE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
    },
};
use serde_json::{Value, json};
use server::{build_router, config::Config, state::AppState};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    _dir: TempDir,
    state: Arc<AppState>,
    base: String,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            mirror_interval: Duration::from_millis(50),
            ..Config::for_dir(dir.path())
        };
        let state = AppState::new(config).await.unwrap();

        let store = &state.store;
        store
            .insert_department_if_absent(NewDepartment {
                name: "Computer Science & Engineering".into(),
                code: "CSE".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .insert_course_if_absent(NewCourse {
                name: "Bachelor of Technology in Computer Science".into(),
                code: "B.Tech CSE".into(),
                duration_years: 4,
                department_id: 1,
                degree_type: "Undergraduate".into(),
            })
            .await
            .unwrap();
        store
            .insert_category_if_absent(NewCategory {
                name: "Network & WiFi".into(),
                description: None,
                department_id: 1,
                priority_level: Priority::High,
                typical_resolution_days: 2,
            })
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api", listener.local_addr().unwrap());
        let app = build_router(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _dir: dir,
            state,
            base,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    async fn patch(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PATCH, path, body).await
    }

    async fn register(&self, email: &str, roll_number: &str) -> Value {
        let (status, body) = self
            .post(
                "/register",
                json!({
                    "name": "Asha Rao",
                    "email": email,
                    "phone": "98765 43210",
                    "course_id": 1,
                    "year": 1,
                    "semester": 1,
                    "roll_number": roll_number,
                    "admission_year": 2024,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["user"].clone()
    }

    async fn file(&self, user_id: &Value, title: &str) -> Value {
        let (status, body) = self
            .post(
                "/complaints",
                json!({
                    "title": title,
                    "description": "No connectivity since morning",
                    "category_id": 1,
                    "department_id": 1,
                    "user_id": user_id,
                    "urgency_level": 4,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn admin_id(&self) -> i64 {
        self.state
            .store
            .find_admin_by_email("admin@college.edu".into())
            .await
            .unwrap()
            .unwrap()
            .id
    }
}

#[tokio::test]
async fn test_register_then_login_by_student_id() {
    let server = TestServer::start().await;

    let user = server.register("asha@college.edu", "CSE001").await;
    assert_eq!(user["student_id"], "24BTECHCSE001");
    assert_eq!(user["role"], "student");
    assert!(user.get("password_hash").is_none());

    let (status, body) = server.post("/register", json!({ "name": "Ravi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email is required");

    let response = server
        .client
        .post(server.url("/login"))
        .json(&json!({ "login_type": "student", "student_id": "24BTECHCSE001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("session="));

    let token = cookie.split(';').next().unwrap().to_string();
    let me: Value = server
        .client
        .get(server.url("/me"))
        .header("cookie", token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["email"], "asha@college.edu");

    let (status, _) = server.get("/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = server
        .post(
            "/register",
            json!({
                "name": "Ravi",
                "email": "ravi@college.edu",
                "phone": "call-me-maybe",
                "course_id": 1,
                "year": 1,
                "semester": 1,
                "roll_number": "CSE002",
                "admission_year": 2024,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid phone number");

    let (status, body) = server
        .post("/login", json!({ "student_id": "99UNKNOWN001" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Student ID not found. Please contact administration.");
}

#[tokio::test]
async fn test_admin_login_checks_password() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post(
            "/login",
            json!({ "login_type": "admin", "email": "admin@college.edu", "password": "admin123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");

    let (status, body) = server
        .post(
            "/login",
            json!({ "login_type": "admin", "email": "admin@college.edu", "password": "nope" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_repeated_admin_failures_lock_the_account() {
    let server = TestServer::start().await;
    let login = |password: &str| {
        json!({ "login_type": "admin", "email": "admin@college.edu", "password": password })
    };

    for _ in 0..5 {
        let (status, _) = server.post("/login", login("guess")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = server.post("/login", login("admin123")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Too many failed attempts. Please try again later.");
}

#[tokio::test]
async fn test_complaint_lifecycle() {
    let server = TestServer::start().await;
    let user = server.register("asha@college.edu", "CSE001").await;
    let admin_id = server.admin_id().await;

    let complaint = server.file(&user["id"], "WiFi down").await;
    assert!(complaint["complaint_id"].as_str().unwrap().starts_with("CMP"));
    assert_eq!(complaint["status"], "Pending");
    assert_eq!(complaint["priority"], "High");
    let id = complaint["id"].as_i64().unwrap();

    let (status, body) = server
        .patch(&format!("/complaints/{id}/status"), json!({ "status": "Done" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid status");

    let (status, body) = server
        .patch(
            &format!("/complaints/{id}/status"),
            json!({ "status": "Resolved", "admin_comment": "Router restarted", "admin_id": admin_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Complaint status updated to Resolved");
    assert!(!body["complaint"]["resolved_at"].is_null());

    let (_, comments) = server.get(&format!("/complaints/{id}/comments")).await;
    assert_eq!(
        comments[0]["text"],
        "Status changed to Resolved. Router restarted"
    );

    let (status, _) = server
        .post(
            &format!("/complaints/{id}/comments"),
            json!({ "admin_id": user["id"], "text": "me too" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = server
        .patch(&format!("/complaints/{id}/priority"), json!({ "priority": "Critical" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["priority"], "Critical");

    let (status, _) = server
        .patch("/complaints/4242/status", json!({ "status": "Resolved" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_csv_mirror_reads_own_writes() {
    let server = TestServer::start().await;
    let user = server.register("asha@college.edu", "CSE001").await;
    let complaint = server.file(&user["id"], "WiFi, hostel block").await;
    let id = complaint["id"].as_i64().unwrap();

    server
        .patch(&format!("/complaints/{id}/status"), json!({ "status": "In Progress" }))
        .await;

    let (status, rows) = server.get("/student-complaints/24BTECHCSE001").await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "WiFi, hostel block");
    assert_eq!(rows[0]["status"], "In Progress");

    let (_, all) = server.get("/all-student-complaints").await;
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(server.state.store.pending_outbox_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_bulk_and_stats() {
    let server = TestServer::start().await;
    let user = server.register("asha@college.edu", "CSE001").await;
    let a = server.file(&user["id"], "WiFi down").await;
    let b = server.file(&user["id"], "Printer jam").await;

    let (_, found) = server.get("/complaints/search?q=wifi&status=Pending").await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["complaints"][0]["title"], "WiFi down");

    let (status, _) = server.get("/complaints/search?status=Nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server
        .post(
            "/complaints/bulk-update",
            json!({ "complaint_ids": [a["id"], b["id"]], "action": "status", "value": "Resolved" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated_count"], 2);

    let (status, body) = server
        .post("/complaints/bulk-update", json!({ "complaint_ids": [], "action": "status" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");

    let (_, stats) = server.get("/stats").await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["resolved"], 2);
    assert_eq!(stats["resolution_rate"], 100.0);
    assert_eq!(stats["categories"]["Network & WiFi"], 2);

    let (_, export) = server.get("/complaints/export").await;
    assert_eq!(export["data"][0]["Student ID"], "24BTECHCSE001");
    assert!(export["filename"].as_str().unwrap().starts_with("complaints_export_"));

    let (_, list) = server.get(&format!("/complaints?user_id={}", user["id"])).await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_reference_data_and_misc_routes() {
    let server = TestServer::start().await;

    let (_, departments) = server.get("/departments").await;
    assert_eq!(departments[0]["code"], "CSE");

    let (_, courses) = server.get("/courses/1").await;
    assert_eq!(courses[0]["code"], "B.Tech CSE");

    let (_, categories) = server.get("/departments/1/categories").await;
    assert_eq!(categories[0]["priority_level"], "High");

    let (_, all) = server.get("/complaint-categories").await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let (status, health) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["database"], "connected");

    let response = server
        .client
        .get(server.url("/notifications/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("abc"));

    let (status, body) = server.get("/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Resource not found");

    let (status, body) = server.get("/student/NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Student not found");

    let admin_id = server.admin_id().await;
    let (status, body) = server.get(&format!("/notifications/{admin_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["notifications"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_browser_clients_get_credentialed_cors_and_hardening_headers() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/health"))
        .header(ORIGIN, "http://localhost:3000")
        .send()
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[X_FRAME_OPTIONS], "DENY");
}
