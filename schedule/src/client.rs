use crate::types::{Course, Faculty, Group, Student, TimetableDay};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::http::{PROXY_ERROR_HEADER, UNKNOWN_TENANT_ERROR};
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("{message}")]
    UnknownTenant { tenant_id: String, message: String },
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// The gateway did not recognise the tenant. Retrying with the same
    /// tenant cannot succeed. A 404 relayed from the upstream is not one.
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, ClientError::UnknownTenant { .. })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Data source for the selection cascade and the timetable. Every call names
/// its tenant explicitly.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn list_faculties(&self, tenant_id: &str) -> Result<Vec<Faculty>, ClientError>;

    async fn list_courses(
        &self,
        tenant_id: &str,
        faculty_id: u32,
    ) -> Result<Vec<Course>, ClientError>;

    async fn list_groups(
        &self,
        tenant_id: &str,
        course_id: u32,
        faculty_id: u32,
    ) -> Result<Vec<Group>, ClientError>;

    async fn list_students(
        &self,
        tenant_id: &str,
        group_id: u32,
    ) -> Result<Vec<Student>, ClientError>;

    async fn get_timetable(
        &self,
        tenant_id: &str,
        student_id: u32,
        date_start: NaiveDate,
        date_end: NaiveDate,
    ) -> Result<Vec<TimetableDay>, ClientError>;
}

/// Typed client for the schedule API behind the gateway.
#[derive(Clone)]
pub struct ScheduleClient {
    http: reqwest::Client,
    gateway_url: Url,
}

impl ScheduleClient {
    pub fn new(mut gateway_url: Url) -> Self {
        // Url::join replaces the last segment unless the base ends with a slash
        if !gateway_url.path().ends_with('/') {
            let path = format!("{}/", gateway_url.path());
            gateway_url.set_path(&path);
        }

        ScheduleClient {
            http: reqwest::Client::new(),
            gateway_url,
        }
    }

    fn endpoint(&self, tenant_id: &str, path: &str) -> Result<Url, ClientError> {
        Ok(self.gateway_url.join(&format!("proxy/{tenant_id}/{path}"))?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        tenant_id: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let url = self.endpoint(tenant_id, path)?;
        tracing::debug!(tenant = tenant_id, %url, "Schedule request");

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let unknown_tenant = response
                .headers()
                .get(PROXY_ERROR_HEADER)
                .is_some_and(|kind| kind == UNKNOWN_TENANT_ERROR);
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);

            if unknown_tenant {
                return Err(ClientError::UnknownTenant {
                    tenant_id: tenant_id.to_string(),
                    message,
                });
            }
            return Err(ClientError::Status { status, message });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ScheduleSource for ScheduleClient {
    async fn list_faculties(&self, tenant_id: &str) -> Result<Vec<Faculty>, ClientError> {
        self.post(tenant_id, "list/faculties", json!({})).await
    }

    async fn list_courses(
        &self,
        tenant_id: &str,
        faculty_id: u32,
    ) -> Result<Vec<Course>, ClientError> {
        self.post(tenant_id, "list/courses", json!({ "facultyId": faculty_id }))
            .await
    }

    async fn list_groups(
        &self,
        tenant_id: &str,
        course_id: u32,
        faculty_id: u32,
    ) -> Result<Vec<Group>, ClientError> {
        self.post(
            tenant_id,
            "list/groups",
            json!({ "courseId": course_id, "facultyId": faculty_id }),
        )
        .await
    }

    async fn list_students(
        &self,
        tenant_id: &str,
        group_id: u32,
    ) -> Result<Vec<Student>, ClientError> {
        self.post(
            tenant_id,
            "list/students-by-group",
            json!({ "groupId": group_id }),
        )
        .await
    }

    async fn get_timetable(
        &self,
        tenant_id: &str,
        student_id: u32,
        date_start: NaiveDate,
        date_end: NaiveDate,
    ) -> Result<Vec<TimetableDay>, ClientError> {
        self.post(
            tenant_id,
            "time-table/student",
            json!({
                "studentId": student_id,
                "dateStart": date_start.format("%Y-%m-%d").to_string(),
                "dateEnd": date_end.format("%Y-%m-%d").to_string(),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    // Fake gateway: records each request and answers with canned payloads.
    async fn gateway_handler(
        req: Request<Incoming>,
        received: Received,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let path = req.uri().path().to_string();
        let body = req.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        received.lock().unwrap().push((path.clone(), body));

        let (status, payload) = match path.as_str() {
            "/proxy/nuzp/list/faculties" => (
                200,
                r#"[{"id": 1, "shortName": "ФІОТ", "fullName": "Факультет інформатики"}]"#,
            ),
            "/proxy/nuzp/list/courses" => (200, r#"[{"course": 1}, {"course": 2}]"#),
            "/proxy/nuzp/list/groups" => (200, r#"[{"id": 7, "name": "КН-21", "course": 2}]"#),
            "/proxy/nuzp/list/students-by-group" => (
                200,
                r#"[{"id": 3, "firstName": "Олена", "lastName": "Коваль"}]"#,
            ),
            "/proxy/nuzp/time-table/student" => (200, "[]"),
            p if p.starts_with("/proxy/unknown/") => (
                404,
                r#"{"error": "tenant 'unknown' is not supported"}"#,
            ),
            // the upstream's own 404, relayed unmarked
            p if p.starts_with("/proxy/lpnu/") => (404, r#"{"error": "Not Found"}"#),
            _ => (500, "boom"),
        };

        let mut response = Response::new(Full::new(Bytes::from_static(payload.as_bytes())));
        *response.status_mut() = hyper::StatusCode::from_u16(status).unwrap();
        if path.starts_with("/proxy/unknown/") {
            response
                .headers_mut()
                .insert(PROXY_ERROR_HEADER, UNKNOWN_TENANT_ERROR.parse().unwrap());
        }
        Ok(response)
    }

    async fn start_gateway() -> (Url, Received) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let server_received = received.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let received = server_received.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| gateway_handler(req, received.clone()));
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        let url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        (url, received)
    }

    #[tokio::test]
    async fn test_list_endpoints() {
        let (url, received) = start_gateway().await;
        let client = ScheduleClient::new(url);

        let faculties = client.list_faculties("nuzp").await.unwrap();
        assert_eq!(faculties[0].short_name, "ФІОТ");

        let courses = client.list_courses("nuzp", 1).await.unwrap();
        assert_eq!(courses, vec![Course { course: 1 }, Course { course: 2 }]);

        let groups = client.list_groups("nuzp", 2, 1).await.unwrap();
        assert_eq!(groups[0].name, "КН-21");

        let students = client.list_students("nuzp", 7).await.unwrap();
        assert_eq!(students[0].display_name(), "Коваль Олена");

        let received = received.lock().unwrap().clone();
        assert_eq!(
            received,
            vec![
                ("/proxy/nuzp/list/faculties".to_string(), json!({})),
                ("/proxy/nuzp/list/courses".to_string(), json!({"facultyId": 1})),
                (
                    "/proxy/nuzp/list/groups".to_string(),
                    json!({"courseId": 2, "facultyId": 1})
                ),
                (
                    "/proxy/nuzp/list/students-by-group".to_string(),
                    json!({"groupId": 7})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_timetable_request_dates() {
        let (url, received) = start_gateway().await;
        let client = ScheduleClient::new(url);

        let days = client
            .get_timetable(
                "nuzp",
                3,
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            )
            .await
            .unwrap();
        assert!(days.is_empty());

        let (path, body) = received.lock().unwrap()[0].clone();
        assert_eq!(path, "/proxy/nuzp/time-table/student");
        assert_eq!(
            body,
            json!({"studentId": 3, "dateStart": "2025-01-01", "dateEnd": "2025-01-31"})
        );
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (url, _received) = start_gateway().await;
        let client = ScheduleClient::new(url);

        let err = client.list_faculties("unknown").await.unwrap_err();
        assert!(err.is_resolution_error());
        assert!(matches!(
            &err,
            ClientError::UnknownTenant { tenant_id, message }
                if tenant_id == "unknown" && message == "tenant 'unknown' is not supported"
        ));

        let err = client.list_faculties("lpnu").await.unwrap_err();
        assert!(!err.is_resolution_error());
        assert!(matches!(
            &err,
            ClientError::Status { status, message }
                if *status == StatusCode::NOT_FOUND && message == "Not Found"
        ));

        // non-JSON error bodies are kept verbatim
        let err = client.list_faculties("knu").await.unwrap_err();
        assert!(!err.is_resolution_error());
        assert!(matches!(
            &err,
            ClientError::Status { status, message }
                if *status == StatusCode::INTERNAL_SERVER_ERROR && message == "boom"
        ));
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ScheduleClient::new(Url::parse(&format!("http://127.0.0.1:{port}")).unwrap());

        let err = client.list_faculties("nuzp").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(!err.is_resolution_error());
    }

    #[test]
    fn test_endpoint_keeps_gateway_path() {
        let client = ScheduleClient::new(Url::parse("https://example.com/api").unwrap());
        assert_eq!(
            client.endpoint("knu", "list/groups").unwrap().as_str(),
            "https://example.com/api/proxy/knu/list/groups"
        );
    }
}
