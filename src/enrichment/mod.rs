//! Customer name lookups.
//!
//! The first time a customer is seen each day the hub asks a [`NameLookup`]
//! for their display name. Lookups run off the hub task and report back
//! through the hub's command queue; failures are logged and never retried.

use crate::config::EnrichmentConfig;
use crate::hub::{HubCommand, HubHandle};
use crate::state::EntityId;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Starts a name lookup without waiting for it
pub trait NameLookup: Send {
    /// `epoch` is echoed back with the result
    fn request(&self, entity_id: &EntityId, epoch: u64);
}

/// Used when enrichment is turned off
#[derive(Debug, Default)]
pub struct DisabledLookup;

impl NameLookup for DisabledLookup {
    fn request(&self, entity_id: &EntityId, _epoch: u64) {
        debug!(entity_id = %entity_id, "Name enrichment disabled, customer stays unnamed");
    }
}

/// Body returned by the customer info service
#[derive(Debug, Deserialize)]
struct CustomerInfo {
    name: String,
}

/// Resolves names with `GET <endpoint>?<query_param>=<id>`
#[derive(Debug, Clone)]
pub struct HttpNameLookup {
    http_client: Client,
    endpoint: String,
    query_param: String,
    hub: HubHandle,
}

impl HttpNameLookup {
    pub fn new(config: &EnrichmentConfig, hub: HubHandle) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("trackhub/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            query_param: config.query_param.clone(),
            hub,
        })
    }

    /// Lookup URL for a customer
    pub fn url_for(&self, entity_id: &EntityId) -> String {
        lookup_url(&self.endpoint, &self.query_param, entity_id)
    }
}

impl NameLookup for HttpNameLookup {
    fn request(&self, entity_id: &EntityId, epoch: u64) {
        let url = self.url_for(entity_id);
        let http_client = self.http_client.clone();
        let hub = self.hub.clone();
        let entity_id = entity_id.clone();

        tokio::spawn(async move {
            match fetch_name(&http_client, &url).await {
                Ok(name) => {
                    debug!(entity_id = %entity_id, name = %name, "Resolved customer name");
                    hub.send(HubCommand::NameResolved {
                        entity_id,
                        name,
                        epoch,
                    });
                }
                Err(e) => {
                    warn!(entity_id = %entity_id, error = %e, "Customer name lookup failed");
                }
            }
        });
    }
}

pub fn lookup_url(endpoint: &str, query_param: &str, entity_id: &EntityId) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        endpoint,
        separator,
        urlencoding::encode(query_param),
        urlencoding::encode(entity_id.as_str())
    )
}

async fn fetch_name(http_client: &Client, url: &str) -> Result<String> {
    let response = http_client
        .get(url)
        .send()
        .await
        .context("Request to customer info service failed")?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("Customer info service returned {}", status));
    }

    let body = response
        .text()
        .await
        .context("Failed to read customer info response")?;
    parse_name(&body)
}

fn parse_name(body: &str) -> Result<String> {
    let info: CustomerInfo =
        serde_json::from_str(body).context("Customer info response has no string 'name'")?;
    Ok(info.name)
}
