use std::time::Duration;

use async_trait::async_trait;
use attention_core::HeadPose;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::wire::{DetectRequest, DetectResponse, LandmarkRequest, LandmarkResponse};
use super::{
    BlinkClient, BlinkReading, BlinkRequest, FaceBox, FaceDetectionClient, FaceLandmarkSet,
    GazeClient, GazeReading, GazeRequest, HeadPoseClient, HeadPoseRequest, LandmarkClient,
    ResetRequest, ScoreReading, ScoreRequest, ScorerClient, ServiceError,
};

pub fn build_client(timeout_ms: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// 阶段服务可能以 `{"success": false, "error": ...}` 表示业务失败
#[derive(Debug, Deserialize)]
struct Reply<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

fn default_success() -> bool {
    true
}

/// 单个阶段服务的 JSON-over-HTTP 端点
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    base_url: String,
    service: &'static str,
    attempts: u32,
}

impl JsonEndpoint {
    pub fn new(client: reqwest::Client, base_url: &str, service: &'static str, attempts: u32) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
            attempts: attempts.max(1),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        let reply: Reply<R> = response.json().await.map_err(|e| ServiceError::Decode {
            service: self.service,
            message: e.to_string(),
        })?;
        if !reply.success {
            return Err(ServiceError::Rejected {
                service: self.service,
                message: reply.error.unwrap_or_else(|| "unspecified failure".to_string()),
            });
        }
        Ok(reply.body)
    }

    /// 只关心状态码的调用（如 reset）
    pub async fn post_ack<B>(&self, path: &str, body: &B) -> Result<(), ServiceError>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.send(path, body).await.map(|_| ())
    }

    /// 连接失败按 `attempts` 重试；超时、非 2xx 不重试
    async fn send<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ServiceError::Status {
                            service: self.service,
                            status: status.as_u16(),
                        });
                    }
                    return Ok(response);
                }
                Err(err) if err.is_connect() && attempt < self.attempts => {
                    tracing::debug!(service = self.service, attempt, error = %err, "connect failed, retrying");
                }
                Err(err) => return Err(self.classify(err)),
            }
        }
    }

    fn classify(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout {
                service: self.service,
            }
        } else if err.is_connect() {
            ServiceError::Connect {
                service: self.service,
                message: err.to_string(),
            }
        } else {
            ServiceError::Transport {
                service: self.service,
                message: err.to_string(),
            }
        }
    }
}

pub struct HttpFaceDetection(pub JsonEndpoint);
pub struct HttpLandmarks(pub JsonEndpoint);
pub struct HttpHeadPose(pub JsonEndpoint);
pub struct HttpGaze(pub JsonEndpoint);
pub struct HttpBlink(pub JsonEndpoint);
pub struct HttpScorer(pub JsonEndpoint);

#[async_trait]
impl FaceDetectionClient for HttpFaceDetection {
    async fn detect(&self, frame_data: &str, request_id: &str) -> Result<Vec<FaceBox>, ServiceError> {
        let body = DetectRequest {
            frame_data,
            request_id,
        };
        let response: DetectResponse = self.0.post("/detect", &body).await?;
        Ok(response.faces)
    }
}

#[async_trait]
impl LandmarkClient for HttpLandmarks {
    async fn detect(
        &self,
        frame_data: &str,
        faces: &[FaceBox],
        request_id: &str,
    ) -> Result<Vec<FaceLandmarkSet>, ServiceError> {
        let body = LandmarkRequest {
            frame_data,
            faces,
            request_id,
        };
        let response: LandmarkResponse = self.0.post("/detect", &body).await?;
        Ok(response.faces)
    }
}

#[async_trait]
impl HeadPoseClient for HttpHeadPose {
    async fn estimate(&self, request: &HeadPoseRequest) -> Result<HeadPose, ServiceError> {
        self.0.post("/estimate", request).await
    }
}

#[async_trait]
impl GazeClient for HttpGaze {
    async fn track(&self, request: &GazeRequest) -> Result<GazeReading, ServiceError> {
        self.0.post("/track", request).await
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.0.post_ack("/reset", request).await
    }
}

#[async_trait]
impl BlinkClient for HttpBlink {
    async fn detect(&self, request: &BlinkRequest) -> Result<BlinkReading, ServiceError> {
        self.0.post("/detect", request).await
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.0.post_ack("/reset", request).await
    }
}

#[async_trait]
impl ScorerClient for HttpScorer {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreReading, ServiceError> {
        self.0.post("/score", request).await
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.0.post_ack("/reset", request).await
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    fn endpoint(addr: SocketAddr, attempts: u32) -> JsonEndpoint {
        JsonEndpoint::new(build_client(2000), &format!("http://{addr}/"), "test-stage", attempts)
    }

    #[tokio::test]
    async fn decodes_face_boxes() {
        let router = Router::new().route(
            "/detect",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["request_id"], "r-1");
                Json(json!({
                    "success": true,
                    "faces": [{"x1": 1.0, "y1": 2.0, "x2": 11.0, "y2": 22.0, "confidence": 0.9}],
                }))
            }),
        );
        let addr = serve(router).await;
        let client = HttpFaceDetection(endpoint(addr, 1));

        let faces = client.detect("aGVsbG8=", "r-1").await.unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].x2, 11.0);
    }

    #[tokio::test]
    async fn success_false_is_rejected() {
        let router = Router::new().route(
            "/track",
            post(|| async { Json(json!({"success": false, "error": "iris landmarks missing"})) }),
        );
        let addr = serve(router).await;
        let client = HttpGaze(endpoint(addr, 1));
        let req = GazeRequest {
            landmarks: Vec::new(),
            session_id: None,
            track_id: None,
            request_id: None,
        };

        let err = client.track(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { ref message, .. } if message == "iris landmarks missing"));
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/reset",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        );
        let addr = serve(router).await;
        let client = HttpBlink(endpoint(addr, 2));

        let err = client.reset(&ResetRequest::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Status { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpScorer(endpoint(addr, 2));
        let req = ScoreRequest {
            session_id: None,
            track_id: 1,
            head_pose: HeadPose::default(),
            gaze: GazeReading::default(),
            blink: BlinkReading::default(),
            request_id: None,
        };
        let err = client.score(&req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Connect { .. }));
        assert_eq!(err.service(), "test-stage");
    }
}
