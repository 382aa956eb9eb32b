//! Home Assistant REST backend for the light bridge.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::light::SwitchBackend;
use super::Result;

const HTTP_TIMEOUT: Duration = Duration::from_secs(2);
const SWITCH_DOMAIN: &str = "switch";

/// Entity state object returned by `GET /api/states/{entity}`.
#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

/// One entry of the changed-entity list returned by a service call.
#[derive(Debug, Deserialize)]
struct ServiceChange {
    entity_id: String,
    state: String,
}

pub struct HomeAssistant {
    client: Client,
    host: String,
    token: String,
    entity: String,
}

impl HomeAssistant {
    /// `host` is the API base (e.g. `http://homeassistant.local:8123`),
    /// `token` a long-lived access token, `entity` the switch entity id.
    pub fn new(host: &str, token: &str, entity: &str) -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            token: token.to_string(),
            entity: entity.to_string(),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

#[async_trait]
impl SwitchBackend for HomeAssistant {
    async fn turn(&self, on: bool) -> Result<Option<String>> {
        let service = if on { "turn_on" } else { "turn_off" };
        let url = format!("{}/api/services/{}/{}", self.host, SWITCH_DOMAIN, service);
        log::debug!("Calling Home Assistant service {}", service);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "entity_id": self.entity }))
            .send()
            .await?
            .error_for_status()?;

        // The response lists every entity the call changed; ours may or
        // may not be among them (it is absent when already in the target
        // state).
        let changes: Vec<ServiceChange> = response.json().await?;
        Ok(changes
            .into_iter()
            .find(|change| change.entity_id == self.entity)
            .map(|change| change.state))
    }

    async fn state(&self) -> Result<String> {
        let url = format!("{}/api/states/{}", self.host, self.entity);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        let entity: EntityState = response.json().await?;
        Ok(entity.state)
    }
}
