//! Loopback HTTP server standing in for ImgBB and Coze.

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderName};
use axum::routing::post;
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One form field as it arrived.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub value: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl Field {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

/// What the server saw for one request.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub content_type: String,
    pub authorization: Option<String>,
    pub fields: HashMap<String, Field>,
    pub json: Option<Value>,
}

pub type Seen = Arc<Mutex<Vec<Captured>>>;

type ServerState = (Seen, Arc<Value>);

/// Answer every `POST /` with `reply`, recording each request.
/// Returns the endpoint URL and the record.
pub async fn serve(reply: Value) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/", post(capture))
        .with_state((seen.clone(), Arc::new(reply)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), seen)
}

async fn capture(State((seen, reply)): State<ServerState>, request: Request) -> Json<Value> {
    let mut captured = {
        let header_str = |name: HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Captured {
            content_type: header_str(header::CONTENT_TYPE).unwrap_or_default(),
            authorization: header_str(header::AUTHORIZATION),
            ..Default::default()
        }
    };

    if captured.content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .unwrap();
        captured.fields = fields
            .into_iter()
            .map(|(name, value)| {
                let field = Field {
                    value: value.into_bytes(),
                    ..Default::default()
                };
                (name, field)
            })
            .collect();
    } else if captured.content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let value = field.bytes().await.unwrap().to_vec();
            captured.fields.insert(
                name,
                Field {
                    value,
                    file_name,
                    content_type,
                },
            );
        }
    } else {
        let body = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        captured.json = serde_json::from_slice(&body).ok();
    }

    seen.lock().push(captured);
    Json(Value::clone(&reply))
}
