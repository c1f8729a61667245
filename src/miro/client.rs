//! Miro HTTP Client
//!
//! Direct blocking client for the handful of Miro REST v2 endpoints the mind
//! map needs: boards, cards, sticky notes, and connectors.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::MiroConfig;
use crate::summary::mindmap::{cap_text, NodePlacement};

#[derive(Error, Debug)]
pub enum MiroError {
    #[error("Miro access token is required")]
    MissingToken,
    #[error("Could not extract central topic from summary")]
    MissingCentralTopic,
    #[error("Could not access board with ID {0}")]
    BoardAccess(String),
    #[error("Failed to create central topic: {0}")]
    CentralTopic(String),
    #[error("Miro HTTP error: {0}")]
    Http(String),
    #[error("Miro returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl Serialize for MiroError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for MiroError {
    fn from(e: reqwest::Error) -> Self {
        MiroError::Http(e.to_string())
    }
}

/// Board operations the renderer relies on. Each create call returns the new
/// item's id.
pub trait BoardApi {
    fn create_board(&self, name: &str, description: &str) -> Result<String, MiroError>;
    fn verify_board(&self, board_id: &str) -> Result<(), MiroError>;
    fn create_card(&self, board_id: &str, node: &NodePlacement) -> Result<String, MiroError>;
    fn create_sticky_note(&self, board_id: &str, node: &NodePlacement) -> Result<String, MiroError>;
    fn create_connector(&self, board_id: &str, start_id: &str, end_id: &str) -> Result<String, MiroError>;
}

/// Shareable link for a board
pub fn board_url(board_id: &str) -> String {
    format!("https://miro.com/app/board/{}/", board_id)
}

/// Item payload: position is sent only for nodes away from the origin.
fn item_body(data: Value, node: &NodePlacement) -> Value {
    let mut body = json!({ "data": data });
    if node.x != 0.0 || node.y != 0.0 {
        body["position"] = json!({ "x": node.x, "y": node.y });
    }
    body
}

fn card_body(node: &NodePlacement) -> Value {
    item_body(json!({ "title": cap_text(&node.text) }), node)
}

fn sticky_note_body(node: &NodePlacement) -> Value {
    let mut body = item_body(json!({ "content": cap_text(&node.text) }), node);
    body["style"] = json!({ "fillColor": node.fill_color });
    body
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Miro REST client
#[derive(Clone)]
pub struct MiroClient {
    http: Client,
    base_url: String,
}

impl MiroClient {
    pub fn new(config: &MiroConfig) -> Result<Self, MiroError> {
        let token = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(MiroError::MissingToken)?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| MiroError::Http(format!("invalid access token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string() })
    }

    fn create(&self, path: &str, body: &Value) -> Result<String, MiroError> {
        let resp = self.http.post(format!("{}{}", self.base_url, path)).json(body).send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            error!(path, status = %status, "Miro create failed");
            return Err(MiroError::Api { status: status.as_u16(), message: text });
        }

        let created: Created = serde_json::from_str(&text)
            .map_err(|e| MiroError::Deserialize(format!("{}: {}", e, text)))?;
        debug!(path, id = %created.id, "Miro item created");
        Ok(created.id)
    }
}

impl BoardApi for MiroClient {
    fn create_board(&self, name: &str, description: &str) -> Result<String, MiroError> {
        let id = self.create("/boards", &json!({ "name": name, "description": description }))?;
        info!(board = %id, name, "Created Miro board");
        Ok(id)
    }

    fn verify_board(&self, board_id: &str) -> Result<(), MiroError> {
        let resp = self.http.get(format!("{}/boards/{}", self.base_url, board_id)).send()?;
        if resp.status().as_u16() == 200 {
            Ok(())
        } else {
            error!(board = %board_id, status = %resp.status(), "Board not accessible");
            Err(MiroError::BoardAccess(board_id.to_string()))
        }
    }

    fn create_card(&self, board_id: &str, node: &NodePlacement) -> Result<String, MiroError> {
        self.create(&format!("/boards/{}/cards", board_id), &card_body(node))
    }

    fn create_sticky_note(&self, board_id: &str, node: &NodePlacement) -> Result<String, MiroError> {
        self.create(&format!("/boards/{}/sticky_notes", board_id), &sticky_note_body(node))
    }

    fn create_connector(&self, board_id: &str, start_id: &str, end_id: &str) -> Result<String, MiroError> {
        let body = json!({ "startItem": { "id": start_id }, "endItem": { "id": end_id } });
        self.create(&format!("/boards/{}/connectors", board_id), &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::mindmap::NodeKind;

    fn node(x: f64, y: f64, text: &str) -> NodePlacement {
        NodePlacement {
            kind: NodeKind::Theme,
            parent: Some(0),
            text: text.to_string(),
            x,
            y,
            width: 250.0,
            height: 100.0,
            fill_color: "light_pink",
        }
    }

    #[test]
    fn test_card_body_omits_origin_position() {
        let body = card_body(&node(0.0, 0.0, "Centre"));
        assert_eq!(body["data"]["title"], "Centre");
        assert!(body.get("position").is_none());

        let body = card_body(&node(900.0, 0.0, "Theme"));
        assert_eq!(body["position"]["x"], 900.0);
    }

    #[test]
    fn test_sticky_note_body() {
        let body = sticky_note_body(&node(1.0, 2.0, &"y".repeat(400)));
        assert_eq!(body["style"]["fillColor"], "light_pink");
        assert_eq!(body["data"]["content"].as_str().unwrap().chars().count(), 255);
    }

    #[test]
    fn test_client_requires_token() {
        assert!(matches!(MiroClient::new(&MiroConfig::default()), Err(MiroError::MissingToken)));
    }

    #[test]
    fn test_board_url() {
        assert_eq!(board_url("uXjVK="), "https://miro.com/app/board/uXjVK=/");
    }
}
