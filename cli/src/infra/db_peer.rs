//! Database peer adapter: implements `DbPeer` against each node's admin
//! endpoint on the private network.

use std::time::Duration;

use anyhow::{Context, Result};
use hangar_api_types::{DbRole, DbSetting, ReplicationStat};
use reqwest::Method;
use serde::Deserialize;

use crate::application::ports::DbPeer;
use crate::infra::http::ApiClient;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpDbPeer {
    // No base URL; every request names its peer.
    api: ApiClient,
    port: u16,
}

impl HttpDbPeer {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(port: u16, token: Option<String>) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new("", token, REQUEST_TIMEOUT)?,
            port,
        })
    }

    fn url(&self, addr: &str, path: &str) -> String {
        format!("{}{path}", peer_url(addr, self.port))
    }

    async fn post(&self, addr: &str, path: &str) -> Result<()> {
        self.api
            .empty(self.api.request(Method::POST, &self.url(addr, path)))
            .await
            .with_context(|| format!("POST {path} on {addr}"))
    }
}

/// Base URL for a peer; IPv6 addresses are bracketed.
fn peer_url(addr: &str, port: u16) -> String {
    if addr.contains(':') {
        format!("http://[{addr}]:{port}")
    } else {
        format!("http://{addr}:{port}")
    }
}

#[derive(Deserialize)]
struct RoleBody {
    role: String,
}

#[derive(Deserialize)]
struct UidBody {
    uid: String,
}

impl DbPeer for HttpDbPeer {
    async fn role(&self, addr: &str) -> Result<DbRole> {
        let body: RoleBody = self
            .api
            .json(self.api.request(Method::GET, &self.url(addr, "/role")))
            .await?;
        Ok(DbRole::parse(&body.role))
    }

    async fn enable_readonly(&self, addr: &str) -> Result<()> {
        self.post(addr, "/readonly/enable").await
    }

    async fn disable_readonly(&self, addr: &str) -> Result<()> {
        self.post(addr, "/readonly/disable").await
    }

    async fn restart_router(&self, addr: &str) -> Result<()> {
        self.post(addr, "/router/restart").await
    }

    async fn failover(&self, addr: &str) -> Result<()> {
        self.post(addr, "/failover").await
    }

    async fn replication_stats(&self, addr: &str) -> Result<Vec<ReplicationStat>> {
        self.api
            .json(self.api.request(Method::GET, &self.url(addr, "/replication/stats")))
            .await
    }

    async fn settings(&self, addr: &str, names: &[&str]) -> Result<Vec<DbSetting>> {
        let req = self
            .api
            .request(Method::GET, &self.url(addr, "/settings"))
            .query(&[("names", names.join(","))]);
        self.api.json(req).await
    }

    async fn db_uid(&self, addr: &str) -> Result<String> {
        let body: UidBody = self
            .api
            .json(self.api.request(Method::GET, &self.url(addr, "/uid")))
            .await?;
        Ok(body.uid)
    }
}
