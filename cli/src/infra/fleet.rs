//! Fleet adapter: implements `FleetApi` over the machines REST API.

use std::time::Duration;

use anyhow::Result;
use hangar_api_types::{CheckStatus, LaunchSpec, Lease, Machine, MachineConfig};
use reqwest::{Method, StatusCode};
use serde::Serialize;

use crate::application::ports::FleetApi;
use crate::domain::TimedOut;
use crate::infra::http::{ApiClient, LEASE_NONCE_HEADER, status_of};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Extra time granted to the HTTP call beyond the server-side wait.
const WAIT_SLACK: Duration = Duration::from_secs(10);

pub struct HttpFleet {
    api: ApiClient,
}

impl HttpFleet {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, token, REQUEST_TIMEOUT)?,
        })
    }
}

fn machines_path(app: &str, rest: &str) -> String {
    format!("/v1/apps/{app}/machines{rest}")
}

#[derive(Serialize)]
struct UpdateBody<'a> {
    config: &'a MachineConfig,
}

impl FleetApi for HttpFleet {
    async fn list_machines(&self, app: &str) -> Result<Vec<Machine>> {
        self.api
            .json(self.api.request(Method::GET, &machines_path(app, "")))
            .await
    }

    async fn launch(&self, app: &str, spec: &LaunchSpec) -> Result<Machine> {
        self.api
            .json(self.api.request(Method::POST, &machines_path(app, "")).json(spec))
            .await
    }

    async fn update(
        &self,
        app: &str,
        machine_id: &str,
        config: &MachineConfig,
        nonce: Option<&str>,
    ) -> Result<Machine> {
        let mut req = self
            .api
            .request(Method::POST, &machines_path(app, &format!("/{machine_id}")))
            .json(&UpdateBody { config });
        if let Some(nonce) = nonce {
            req = req.header(LEASE_NONCE_HEADER, nonce);
        }
        self.api.json(req).await
    }

    async fn destroy(&self, app: &str, machine_id: &str) -> Result<()> {
        let req = self
            .api
            .request(Method::DELETE, &machines_path(app, &format!("/{machine_id}")))
            .query(&[("force", "true")]);
        match self.api.empty(req).await {
            // Already gone.
            Err(e) if status_of(&e) == Some(StatusCode::NOT_FOUND) => Ok(()),
            other => other,
        }
    }

    async fn wait_for_state(
        &self,
        app: &str,
        machine_id: &str,
        state: &str,
        timeout: Duration,
    ) -> Result<()> {
        let req = self
            .api
            .request(Method::GET, &machines_path(app, &format!("/{machine_id}/wait")))
            .query(&[
                ("state", state.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + WAIT_SLACK);
        match self.api.empty(req).await {
            Err(e) if status_of(&e) == Some(StatusCode::REQUEST_TIMEOUT) => Err(TimedOut {
                what: format!("machine {machine_id} to be {state}"),
                after: timeout,
            }
            .into()),
            other => other,
        }
    }

    async fn check_statuses(&self, app: &str, machine_id: &str) -> Result<Vec<CheckStatus>> {
        self.api
            .json(
                self.api
                    .request(Method::GET, &machines_path(app, &format!("/{machine_id}/checks"))),
            )
            .await
    }

    async fn acquire_lease(&self, app: &str, machine_id: &str, ttl: Duration) -> Result<Lease> {
        let req = self
            .api
            .request(Method::POST, &machines_path(app, &format!("/{machine_id}/lease")))
            .query(&[("ttl", ttl.as_secs())]);
        self.api.json(req).await
    }

    async fn refresh_lease(
        &self,
        app: &str,
        machine_id: &str,
        nonce: &str,
        ttl: Duration,
    ) -> Result<Lease> {
        let req = self
            .api
            .request(Method::POST, &machines_path(app, &format!("/{machine_id}/lease")))
            .header(LEASE_NONCE_HEADER, nonce)
            .query(&[("ttl", ttl.as_secs())]);
        self.api.json(req).await
    }

    async fn release_lease(&self, app: &str, machine_id: &str, nonce: &str) -> Result<()> {
        let req = self
            .api
            .request(Method::DELETE, &machines_path(app, &format!("/{machine_id}/lease")))
            .header(LEASE_NONCE_HEADER, nonce);
        self.api.empty(req).await
    }
}
