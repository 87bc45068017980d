#![allow(dead_code)]

use std::net::SocketAddr;

use sastd::api::{build_router, AppState};
use sastd::config::Config;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const ADMIN_ID: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-pw";

pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(|_| {}).await
}

pub async fn spawn_server_with(tweak: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempdir().expect("tempdir");
    let mut config = Config {
        data_dir: dir.path().join("data"),
        admin_id: ADMIN_ID.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        ..Config::default()
    };
    tweak(&mut config);
    let state = AppState::open(config).expect("open state");
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    TestServer { addr, dir }
}

pub struct HttpResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

impl HttpResponse {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("invalid json ({e}): {}", self.body))
    }

    /// The `result` of a success envelope.
    pub fn result(&self) -> Value {
        let json = self.json();
        assert_eq!(json["ok"], Value::Bool(true), "not ok: {}", self.body);
        json["result"].clone()
    }

    pub fn error_code(&self) -> String {
        let json = self.json();
        assert_eq!(json["ok"], Value::Bool(false), "unexpected success: {}", self.body);
        json["error"]["code"].as_str().unwrap_or_default().to_string()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }

    /// `name=value` of the session cookie set by this response.
    pub fn session_cookie(&self) -> Option<String> {
        let raw = self.header("set-cookie")?;
        raw.split(';').next().map(|s| s.trim().to_string())
    }
}

fn dechunk(body: &str) -> String {
    let mut out = String::new();
    let mut rest = body;
    while let Some((size_line, tail)) = rest.split_once("\r\n") {
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        if size == 0 {
            break;
        }
        out.push_str(&tail[..size]);
        rest = tail[size..].trim_start_matches("\r\n");
    }
    out
}

pub async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    cookie: Option<&str>,
    body: Option<&Value>,
) -> HttpResponse {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(c) = cookie {
        req.push_str(&format!("Cookie: {c}\r\n"));
    }
    if body.is_some() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n", payload.len()));
    req.push_str(&payload);
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    let chunked = head
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    HttpResponse {
        status,
        head: head.to_string(),
        body: if chunked {
            dechunk(body)
        } else {
            body.to_string()
        },
    }
}

pub async fn get(addr: SocketAddr, path: &str, cookie: &str) -> HttpResponse {
    send(addr, "GET", path, Some(cookie), None).await
}

pub async fn post(addr: SocketAddr, path: &str, cookie: &str, body: Value) -> HttpResponse {
    send(addr, "POST", path, Some(cookie), Some(&body)).await
}

pub async fn put(addr: SocketAddr, path: &str, cookie: &str, body: Value) -> HttpResponse {
    send(addr, "PUT", path, Some(cookie), Some(&body)).await
}

pub async fn delete(addr: SocketAddr, path: &str, cookie: &str) -> HttpResponse {
    send(addr, "DELETE", path, Some(cookie), None).await
}

pub async fn login(addr: SocketAddr, id_number: &str, password: &str) -> String {
    let resp = send(
        addr,
        "POST",
        "/api/auth/login",
        None,
        Some(&json!({ "idNumber": id_number, "password": password })),
    )
    .await;
    assert_eq!(resp.status, 200, "login failed: {}", resp.body);
    resp.session_cookie().expect("session cookie")
}

pub async fn login_admin(addr: SocketAddr) -> String {
    login(addr, ADMIN_ID, ADMIN_PASSWORD).await
}

/// Creates a resource and returns its id.
pub async fn create(addr: SocketAddr, cookie: &str, path: &str, body: Value) -> String {
    let resp = post(addr, path, cookie, body).await;
    assert_eq!(resp.status, 201, "create {path} failed: {}", resp.body);
    resp.result()["id"]
        .as_str()
        .expect("created id")
        .to_string()
}

/// One program with one section and course, a teacher assigned to it, one
/// enrolled student and a two-category questionnaire of three questions.
pub struct Campus {
    pub program_id: String,
    pub section_id: String,
    pub course_id: String,
    pub teacher_id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub student_number: String,
    pub category_ids: Vec<String>,
    pub question_ids: Vec<String>,
    /// Option ids indexed by value - 1.
    pub option_ids: Vec<String>,
}

pub async fn seed_campus(addr: SocketAddr, admin: &str) -> Campus {
    let program_id = create(addr, admin, "/api/admin/programs", json!({ "name": "BSCS" })).await;
    let section_id = create(
        addr,
        admin,
        "/api/admin/sections",
        json!({ "programId": program_id, "name": "1A" }),
    )
    .await;
    let course_id = create(
        addr,
        admin,
        "/api/admin/courses",
        json!({
            "programId": program_id,
            "sectionId": section_id,
            "code": "CS101",
            "name": "Intro to Computing",
        }),
    )
    .await;
    let teacher_id = create(
        addr,
        admin,
        "/api/admin/teachers",
        json!({ "facultyId": "F-001", "fullName": "Maria Santos" }),
    )
    .await;
    let assignment_id = create(
        addr,
        admin,
        "/api/admin/assignments",
        json!({
            "teacherId": teacher_id,
            "programId": program_id,
            "sectionId": section_id,
            "courseId": course_id,
        }),
    )
    .await;
    let student_number = "2024-001".to_string();
    let student_id = create(
        addr,
        admin,
        "/api/admin/students",
        json!({
            "idNumber": student_number,
            "fullName": "Ana Reyes",
            "programId": program_id,
            "sectionId": section_id,
        }),
    )
    .await;

    let teaching = create(
        addr,
        admin,
        "/api/admin/categories",
        json!({ "name": "Teaching", "sortOrder": 0 }),
    )
    .await;
    let conduct = create(
        addr,
        admin,
        "/api/admin/categories",
        json!({ "name": "Conduct", "sortOrder": 1 }),
    )
    .await;
    let mut question_ids = Vec::new();
    for (category, text) in [
        (&teaching, "Explains clearly"),
        (&teaching, "Uses examples"),
        (&conduct, "Is punctual"),
    ] {
        question_ids.push(
            create(
                addr,
                admin,
                "/api/admin/questions",
                json!({ "categoryId": category, "text": text }),
            )
            .await,
        );
    }

    let options = get(addr, "/api/admin/options", admin).await.result();
    let option_ids = options["options"]
        .as_array()
        .expect("options")
        .iter()
        .map(|o| o["id"].as_str().expect("option id").to_string())
        .collect();

    Campus {
        program_id,
        section_id,
        course_id,
        teacher_id,
        assignment_id,
        student_id,
        student_number,
        category_ids: vec![teaching, conduct],
        question_ids,
        option_ids,
    }
}

/// Answers every question of `campus` with the given option values, in
/// question order.
pub fn answers(campus: &Campus, values: &[usize]) -> Value {
    let list: Vec<Value> = campus
        .question_ids
        .iter()
        .zip(values)
        .map(|(q, v)| json!({ "questionId": q, "optionId": campus.option_ids[v - 1] }))
        .collect();
    Value::Array(list)
}

pub async fn open_survey(addr: SocketAddr, admin: &str) {
    let resp = put(
        addr,
        "/api/admin/survey-status",
        admin,
        json!({ "isActive": true }),
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
}
