//! REST reading store: `POST <endpoint>` with a JSON body and bearer auth.

use std::time::Duration;

use async_trait::async_trait;

use super::{PersistenceError, ReadingStore};
use crate::session::Credential;
use crate::types::Reading;

/// Default endpoint of the readings API.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/readings";

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpReadingStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReadingStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, PersistenceError> {
        let client = reqwest::Client::builder()
            .timeout(WRITE_TIMEOUT)
            .user_agent(concat!("pulselink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PersistenceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ReadingStore for HttpReadingStore {
    async fn write(&self, reading: &Reading, credential: &Credential) -> Result<(), PersistenceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.token())
            .json(reading)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    PersistenceError::Encode(e.to_string())
                } else {
                    PersistenceError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
            });
        }

        log::debug!("Stored reading taken at {}", reading.timestamp());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;
    use chrono::Utc;

    fn reading() -> Reading {
        Reading::new(UserId::new("u1"), 72.0, 70.0, 98.0, Utc::now())
    }

    #[tokio::test]
    async fn test_unreachable_store_is_network_error() {
        // Port 9 (discard) on loopback is not expected to run an HTTP server
        let store = HttpReadingStore::new("http://127.0.0.1:9/api/readings").unwrap();
        let result = store.write(&reading(), &Credential::bearer("t")).await;
        assert!(matches!(result, Err(PersistenceError::Network(_))));
    }

    #[tokio::test]
    async fn test_posts_json_with_bearer_token() {
        use std::sync::{Arc, Mutex};
        use warp::Filter;

        let seen: Arc<Mutex<Vec<(String, String, serde_json::Value)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let route = warp::post()
            .and(warp::path!("api" / "readings"))
            .and(warp::header::<String>("content-type"))
            .and(warp::header::<String>("authorization"))
            .and(warp::body::json())
            .map(move |content_type: String, auth: String, body: serde_json::Value| {
                sink.lock().unwrap().push((content_type, auth, body));
                warp::reply::with_status("created", warp::http::StatusCode::CREATED)
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let store = HttpReadingStore::new(format!("http://{}/api/readings", addr)).unwrap();
        store.write(&reading(), &Credential::bearer("tok")).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (content_type, auth, body) = &seen[0];
        assert_eq!(content_type, "application/json");
        assert_eq!(auth, "Bearer tok");
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["heartRate"], 72.0);
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        use warp::Filter;

        let route = warp::post().map(|| {
            warp::reply::with_status("nope", warp::http::StatusCode::UNAUTHORIZED)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let store = HttpReadingStore::new(format!("http://{}/api/readings", addr)).unwrap();
        let result = store.write(&reading(), &Credential::bearer("t")).await;
        assert!(matches!(result, Err(PersistenceError::Rejected { status: 401 })));
    }
}
