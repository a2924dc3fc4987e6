//! HTTP backend for the asset-management API.
//!
//! Requests are blocking `ureq` calls authenticated with a bearer token.
//! Non-2xx responses become [`Error::Http`] with the response body attached;
//! failed mutations are additionally wrapped in [`Error::Remote`] naming what
//! was attempted.

use log::debug;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeSet;
use ureq::http::Response;
use ureq::{Agent, Body};

use crate::backend::{AssetQuery, Backend, RemoteAsset};
use crate::error::{Error, Result};
use crate::model::{Container, Label, Permissions, Zone};
use crate::schema::Collector;
use crate::value::Config;

/// Backend talking to the API over HTTP.
pub struct HttpBackend {
    agent: Agent,
    api: String,
    token: String,
    user_agent: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedAsset {
    asset_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedLabel {
    label_id: u64,
}

impl HttpBackend {
    /// Create a backend for `api` (base URL, no trailing slash needed).
    #[must_use]
    pub fn new(api: impl Into<String>, token: impl Into<String>) -> Self {
        let config = Agent::config_builder().http_status_as_error(false).build();
        let api: String = api.into();
        Self {
            agent: Agent::new_with_config(config),
            api: api.trim_end_matches('/').to_string(),
            token: token.into(),
            user_agent: format!("assetctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// URL for an asset listing or a single-asset fetch.
    fn assets_url(&self, query: &AssetQuery) -> Result<String> {
        query.check()?;
        let mut fields = if query.fields.is_empty() {
            vec!["id".to_string()]
        } else {
            query.fields.clone()
        };
        if query.asset_id.is_some() {
            fields.push("container".to_string());
        }
        let mut args = format!("?fields={}", fields.join(","));
        if query.with_collectors {
            args.push_str(",disabledChecks&collectors=key,config");
        }
        for filter in &query.filters {
            args.push('&');
            args.push_str(&filter.query_arg());
        }
        Ok(match query.asset_id {
            Some(asset_id) => self.url(&format!("/asset/{asset_id}{args}")),
            None => self.url(&format!("/container/{}/assets{args}", query.container_id)),
        })
    }

    fn collectors_url(&self, container_id: u64, fields: &[&str], with_options: bool) -> String {
        let fields = if fields.is_empty() {
            "key".to_string()
        } else {
            fields.join(",")
        };
        let mut url = self.url(&format!("/container/{container_id}/collectors?fields={fields}"));
        if with_options {
            url.push_str("&options=key,type,default");
        }
        url
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", self.bearer())
            .call()?;
        Ok(checked(response)?.body_mut().read_json()?)
    }

    fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<Response<Body>> {
        debug!("POST {url}");
        let response = self
            .agent
            .post(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", self.bearer())
            .send_json(body)?;
        checked(response)
    }

    fn patch<B: Serialize>(&self, url: &str, body: &B) -> Result<()> {
        debug!("PATCH {url}");
        let response = self
            .agent
            .patch(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", self.bearer())
            .send_json(body)?;
        checked(response).map(drop)
    }

    fn put(&self, url: &str) -> Result<()> {
        debug!("PUT {url}");
        let response = self
            .agent
            .put(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", self.bearer())
            .send_empty()?;
        checked(response).map(drop)
    }

    fn delete(&self, url: &str) -> Result<()> {
        debug!("DELETE {url}");
        let response = self
            .agent
            .delete(url)
            .header("User-Agent", &self.user_agent)
            .header("Authorization", self.bearer())
            .call()?;
        checked(response).map(drop)
    }
}

/// Pass 2xx responses through; turn anything else into an error with the
/// status line and response body.
fn checked(mut response: Response<Body>) -> Result<Response<Body>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(Error::http(
        format!("{status} Response: {}", body.trim()),
        Some(status.as_u16()),
    ))
}

/// Name what a failed mutation was attempting.
fn attempt(operation: impl FnOnce() -> String, result: Result<()>) -> Result<()> {
    result.map_err(|e| Error::remote(operation(), &e))
}

impl Backend for HttpBackend {
    fn fetch_container(&self, container_id: u64) -> Result<Container> {
        self.get(&self.url(&format!("/container/{container_id}?fields=id,name")))
    }

    fn fetch_assets(&self, query: &AssetQuery) -> Result<Vec<RemoteAsset>> {
        let url = self.assets_url(query)?;
        let Some(asset_id) = query.asset_id else {
            return self.get(&url);
        };
        let mut asset: RemoteAsset = self.get(&url)?;
        if asset.container != Some(query.container_id) {
            return Err(Error::invalid(format!(
                "mismatch between container ID {} and asset ID {asset_id}",
                query.container_id
            )));
        }
        asset.container = None;
        Ok(vec![asset])
    }

    fn fetch_zones(&self, container_id: u64) -> Result<Vec<Zone>> {
        self.get(&self.url(&format!("/container/{container_id}/zones")))
    }

    fn fetch_labels(&self, ids: &BTreeSet<u64>) -> Result<Vec<Label>> {
        ids.iter()
            .map(|id| self.get(&self.url(&format!("/label/{id}?fields=id,name,color,description"))))
            .collect()
    }

    fn fetch_collectors(
        &self,
        container_id: u64,
        fields: &[&str],
        with_options: bool,
    ) -> Result<Vec<Collector>> {
        self.get(&self.collectors_url(container_id, fields, with_options))
    }

    fn fetch_asset_kinds(&self) -> Result<Vec<String>> {
        let url = self.url("/asset/kinds");
        debug!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .call()?;
        Ok(checked(response)?.body_mut().read_json()?)
    }

    fn fetch_permissions(&self, container_id: u64) -> Result<Permissions> {
        self.get(&self.url(&format!("/container/{container_id}/permissions")))
    }

    fn verify_collector_config(&self, collector: &str, config: &Config) -> Result<()> {
        let url = self.url(&format!("/collector/{collector}/verify-config"));
        self.post(&url, &json!({ "config": config })).map(drop)
    }

    fn set_collector_display(
        &self,
        container_id: u64,
        collector: &str,
        display: bool,
    ) -> Result<()> {
        let url = self.url(&format!("/container/{container_id}/collector/{collector}"));
        attempt(
            || format!("set display of collector '{collector}'"),
            self.patch(&url, &json!({ "display": display })),
        )
    }

    fn upsert_zone(&self, container_id: u64, zone: u32, name: &str) -> Result<()> {
        let url = self.url(&format!("/container/{container_id}/zone"));
        attempt(
            || format!("upsert zone {zone}"),
            self.post(&url, &json!({ "zone": zone, "name": name })).map(drop),
        )
    }

    fn create_asset(&self, container_id: u64, name: &str) -> Result<u64> {
        let url = self.url(&format!("/container/{container_id}/asset"));
        let created: CreatedAsset = self
            .post(&url, &json!({ "name": name }))
            .and_then(|mut r| Ok(r.body_mut().read_json()?))
            .map_err(|e| Error::remote(format!("create asset '{name}'"), &e))?;
        Ok(created.asset_id)
    }

    fn set_asset_name(&self, asset_id: u64, name: &str) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/name"));
        attempt(
            || format!("set name of asset {asset_id}"),
            self.patch(&url, &json!({ "name": name })),
        )
    }

    fn set_asset_mode(&self, asset_id: u64, mode: &str) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/mode"));
        attempt(
            || format!("set mode of asset {asset_id}"),
            self.patch(&url, &json!({ "mode": mode })),
        )
    }

    fn set_asset_kind(&self, asset_id: u64, kind: &str) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/kind"));
        attempt(
            || format!("set kind of asset {asset_id}"),
            self.patch(&url, &json!({ "kind": kind })),
        )
    }

    fn set_asset_zone(&self, asset_id: u64, zone: u32) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/zone"));
        attempt(
            || format!("set zone of asset {asset_id}"),
            self.patch(&url, &json!({ "zone": zone })),
        )
    }

    fn set_asset_description(&self, asset_id: u64, description: &str) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/description"));
        attempt(
            || format!("set description of asset {asset_id}"),
            self.patch(&url, &json!({ "description": description })),
        )
    }

    fn add_label_to_asset(&self, asset_id: u64, label_id: u64) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/label/{label_id}"));
        attempt(
            || format!("add label {label_id} to asset {asset_id}"),
            self.put(&url),
        )
    }

    fn delete_label_from_asset(&self, asset_id: u64, label_id: u64) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/label/{label_id}"));
        attempt(
            || format!("delete label {label_id} from asset {asset_id}"),
            self.delete(&url),
        )
    }

    fn enable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()> {
        let url = self.url(&format!(
            "/asset/{asset_id}/collector/{collector}/check/{check}"
        ));
        attempt(
            || format!("enable check '{collector}/{check}' on asset {asset_id}"),
            self.delete(&url),
        )
    }

    fn disable_check(&self, asset_id: u64, collector: &str, check: &str) -> Result<()> {
        let url = self.url(&format!(
            "/asset/{asset_id}/collector/{collector}/check/{check}"
        ));
        attempt(
            || format!("disable check '{collector}/{check}' on asset {asset_id}"),
            self.put(&url),
        )
    }

    fn upsert_collector(
        &self,
        asset_id: u64,
        collector: &str,
        config: Option<&Config>,
    ) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/collector/{collector}"));
        let body = match config {
            Some(config) => json!({ "config": config }),
            None => json!({}),
        };
        attempt(
            || format!("upsert collector '{collector}' on asset {asset_id}"),
            self.post(&url, &body).map(drop),
        )
    }

    fn remove_collector(&self, asset_id: u64, collector: &str) -> Result<()> {
        let url = self.url(&format!("/asset/{asset_id}/collector/{collector}"));
        attempt(
            || format!("remove collector '{collector}' from asset {asset_id}"),
            self.delete(&url),
        )
    }

    fn create_label(&self, container_id: u64, name: &str) -> Result<u64> {
        let url = self.url(&format!("/container/{container_id}/label"));
        let created: CreatedLabel = self
            .post(&url, &json!({ "name": name }))
            .and_then(|mut r| Ok(r.body_mut().read_json()?))
            .map_err(|e| Error::remote(format!("create label '{name}'"), &e))?;
        Ok(created.label_id)
    }

    fn set_label_name(&self, label_id: u64, name: &str) -> Result<()> {
        let url = self.url(&format!("/label/{label_id}/name"));
        attempt(
            || format!("set name of label {label_id}"),
            self.patch(&url, &json!({ "name": name })),
        )
    }

    fn set_label_color(&self, label_id: u64, color: &str) -> Result<()> {
        let url = self.url(&format!("/label/{label_id}/color"));
        attempt(
            || format!("set color of label {label_id}"),
            self.patch(&url, &json!({ "color": color })),
        )
    }

    fn set_label_description(&self, label_id: u64, description: &str) -> Result<()> {
        let url = self.url(&format!("/label/{label_id}/description"));
        attempt(
            || format!("set description of label {label_id}"),
            self.patch(&url, &json!({ "description": description })),
        )
    }
}
