//! Control-plane adapter: implements `ControlPlane` over the REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use hangar_api_types::{
    Allocation, App, AppCompact, AppConfig, AppLock, AppVmResources, AutoscaleConfig,
    CreateReleaseRequest, CreateVolumeRequest, ForkVolumeRequest, PlatformVersion, Release, Volume,
};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::application::ports::ControlPlane;
use crate::domain::{GroupCounts, LockError};
use crate::infra::http::{ApiClient, ApiError, status_of};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpControlPlane {
    api: ApiClient,
}

impl HttpControlPlane {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, token, REQUEST_TIMEOUT)?,
        })
    }
}

fn app_path(app: &str, rest: &str) -> String {
    format!("/v1/apps/{app}{rest}")
}

#[derive(Serialize)]
struct PlatformBody<'a> {
    platform_version: PlatformVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_id: Option<&'a str>,
}

#[derive(Serialize)]
struct CountsBody<'a> {
    counts: &'a GroupCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct SecretName {
    name: String,
}

impl ControlPlane for HttpControlPlane {
    async fn get_app_compact(&self, app: &str) -> Result<AppCompact> {
        self.api
            .json(self.api.request(Method::GET, &app_path(app, "/compact")))
            .await
    }

    async fn get_app(&self, app: &str) -> Result<App> {
        self.api.json(self.api.request(Method::GET, &app_path(app, ""))).await
    }

    async fn get_app_config(&self, app: &str) -> Result<AppConfig> {
        self.api
            .json(self.api.request(Method::GET, &app_path(app, "/config")))
            .await
    }

    async fn set_platform_version(
        &self,
        app: &str,
        version: PlatformVersion,
        lock_id: Option<&str>,
    ) -> Result<()> {
        let body = PlatformBody {
            platform_version: version,
            lock_id,
        };
        self.api
            .empty(self.api.request(Method::PUT, &app_path(app, "/platform")).json(&body))
            .await
    }

    async fn lock_app(&self, app: &str) -> Result<AppLock> {
        let req = self.api.request(Method::POST, &app_path(app, "/lock"));
        match self.api.json(req).await {
            Err(e) if status_of(&e) == Some(StatusCode::CONFLICT) => {
                let expires_at = e
                    .chain()
                    .find_map(|c| c.downcast_ref::<ApiError>())
                    .and_then(|a| a.expires_at.clone());
                Err(LockError::AlreadyLocked {
                    app: app.to_string(),
                    expires_at,
                }
                .into())
            }
            other => other,
        }
    }

    async fn unlock_app(&self, app: &str, lock_id: &str) -> Result<()> {
        self.api
            .empty(
                self.api
                    .request(Method::DELETE, &app_path(app, &format!("/lock/{lock_id}"))),
            )
            .await
    }

    async fn current_lock(&self, app: &str) -> Result<Option<AppLock>> {
        match self.api.json(self.api.request(Method::GET, &app_path(app, "/lock"))).await {
            Ok(lock) => Ok(Some(lock)),
            Err(e) if status_of(&e) == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_release(&self, app: &str, request: &CreateReleaseRequest) -> Result<Release> {
        self.api
            .json(self.api.request(Method::POST, &app_path(app, "/releases")).json(request))
            .await
    }

    async fn get_autoscale(&self, app: &str) -> Result<Option<AutoscaleConfig>> {
        match self
            .api
            .json(self.api.request(Method::GET, &app_path(app, "/autoscale")))
            .await
        {
            Ok(cfg) => Ok(Some(cfg)),
            Err(e) if status_of(&e) == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_autoscale(&self, app: &str, config: &AutoscaleConfig) -> Result<()> {
        self.api
            .empty(self.api.request(Method::PUT, &app_path(app, "/autoscale")).json(config))
            .await
    }

    async fn list_allocations(&self, app: &str) -> Result<Vec<Allocation>> {
        self.api
            .json(self.api.request(Method::GET, &app_path(app, "/allocations")))
            .await
    }

    async fn set_group_counts(
        &self,
        app: &str,
        counts: &GroupCounts,
        lock_id: Option<&str>,
    ) -> Result<()> {
        let body = CountsBody { counts, lock_id };
        self.api
            .empty(self.api.request(Method::PUT, &app_path(app, "/counts")).json(&body))
            .await
    }

    async fn vm_resources(&self, app: &str) -> Result<AppVmResources> {
        self.api
            .json(self.api.request(Method::GET, &app_path(app, "/vm")))
            .await
    }

    async fn list_volumes(&self, app: &str) -> Result<Vec<Volume>> {
        self.api
            .json(self.api.request(Method::GET, &app_path(app, "/volumes")))
            .await
    }

    async fn get_volume(&self, app: &str, volume_id: &str) -> Result<Volume> {
        self.api
            .json(
                self.api
                    .request(Method::GET, &app_path(app, &format!("/volumes/{volume_id}"))),
            )
            .await
    }

    async fn fork_volume(&self, app: &str, request: &ForkVolumeRequest) -> Result<Volume> {
        self.api
            .json(
                self.api
                    .request(Method::POST, &app_path(app, "/volumes/fork"))
                    .json(request),
            )
            .await
    }

    async fn create_volume(&self, app: &str, request: &CreateVolumeRequest) -> Result<Volume> {
        self.api
            .json(self.api.request(Method::POST, &app_path(app, "/volumes")).json(request))
            .await
    }

    async fn delete_volume(&self, app: &str, volume_id: &str, lock_id: Option<&str>) -> Result<()> {
        let mut req = self
            .api
            .request(Method::DELETE, &app_path(app, &format!("/volumes/{volume_id}")));
        if let Some(lock_id) = lock_id {
            req = req.query(&[("lock_id", lock_id)]);
        }
        self.api.empty(req).await
    }

    async fn list_secrets(&self, app: &str) -> Result<Vec<String>> {
        let names: Vec<SecretName> = self
            .api
            .json(self.api.request(Method::GET, &app_path(app, "/secrets")))
            .await?;
        Ok(names.into_iter().map(|s| s.name).collect())
    }

    async fn set_secrets(&self, app: &str, secrets: &BTreeMap<String, String>) -> Result<()> {
        self.api
            .empty(self.api.request(Method::PUT, &app_path(app, "/secrets")).json(secrets))
            .await
    }

    async fn resume_app(&self, app: &str) -> Result<()> {
        self.api
            .empty(self.api.request(Method::POST, &app_path(app, "/resume")))
            .await
    }
}
