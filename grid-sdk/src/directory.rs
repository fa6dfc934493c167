//! Directory (reference) half of the placement client.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{proxy_directory_url, Config};
use crate::error::SdkError;
use crate::name::UserName;
use crate::proxy::{escape, ProxyCore, HEADER_ACTION_MODE};
use crate::types::{RefDump, Service};

pub struct DirectoryClient {
    core: ProxyCore,
}

impl DirectoryClient {
    /// A client bound to one namespace; calls for any other namespace are
    /// refused.
    pub fn new(ns: &str, config: Arc<dyn Config>) -> Result<DirectoryClient, SdkError> {
        Ok(DirectoryClient {
            core: ProxyCore::new(ns, config)?,
        })
    }

    fn ref_url(&self, n: &dyn UserName, action: &str) -> Result<String, SdkError> {
        let proxy = proxy_directory_url(self.core.config.as_ref(), &self.core.ns)?;
        Ok(format!(
            "http://{}/v3.0/{}/reference/{}?acct={}&ref={}",
            proxy,
            self.core.ns,
            action,
            escape(n.account()),
            escape(n.user()),
        ))
    }

    fn typed_url(
        &self,
        n: &dyn UserName,
        action: &str,
        service_type: &str,
    ) -> Result<String, SdkError> {
        Ok(format!(
            "{}&type={}",
            self.ref_url(n, action)?,
            escape(service_type)
        ))
    }

    fn mutating(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.core.action_mode(true, false) {
            Some(mode) => req.header(HEADER_ACTION_MODE, mode),
            None => req,
        }
    }

    /// `(false, Ok)` when the reference simply does not exist.
    pub async fn has(&self, n: &dyn UserName) -> Result<bool, SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "show")?;
        match self.core.simple(self.core.http.get(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, n: &dyn UserName) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "create")?;
        self.core.simple(self.mutating(self.core.http.post(url))).await
    }

    pub async fn destroy(&self, n: &dyn UserName) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "destroy")?;
        self.core.simple(self.core.http.post(url)).await
    }

    /// Services and properties linked with the reference.
    pub async fn dump(&self, n: &dyn UserName) -> Result<RefDump, SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "show")?;
        self.core.json(self.core.http.get(url)).await
    }

    pub async fn list_services(
        &self,
        n: &dyn UserName,
        service_type: &str,
    ) -> Result<Vec<Service>, SdkError> {
        self.core.check_ns(n)?;
        let url = self.typed_url(n, "show", service_type)?;
        self.core.json(self.core.http.get(url)).await
    }

    /// Bind a service of the given kind; the directory picks the instance.
    pub async fn link_services(
        &self,
        n: &dyn UserName,
        service_type: &str,
    ) -> Result<Vec<Service>, SdkError> {
        self.core.check_ns(n)?;
        let url = self.typed_url(n, "link", service_type)?;
        let req = self
            .mutating(self.core.http.post(url))
            .body(r#"{"action":"Link","args":null}"#);
        self.core.json(req).await
    }

    /// Like link, but assumes the current instance is down.
    pub async fn renew_services(
        &self,
        n: &dyn UserName,
        service_type: &str,
    ) -> Result<Vec<Service>, SdkError> {
        self.core.check_ns(n)?;
        let url = self.typed_url(n, "renew", service_type)?;
        let req = self
            .mutating(self.core.http.post(url))
            .body(r#"{"action":"Renew","args":null}"#);
        self.core.json(req).await
    }

    /// Bind the given services explicitly. They must all carry the same
    /// sequence number.
    pub async fn force_services(
        &self,
        n: &dyn UserName,
        services: &[Service],
    ) -> Result<Vec<Service>, SdkError> {
        self.core.check_ns(n)?;
        let service_type = services
            .first()
            .map(|s| s.service_type.as_str())
            .unwrap_or_default();
        let url = self.typed_url(n, "force", service_type)?;
        let req = self.mutating(self.core.http.post(url)).json(services);
        self.core.json(req).await
    }

    pub async fn unlink_services(
        &self,
        n: &dyn UserName,
        service_type: &str,
    ) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.typed_url(n, "unlink", service_type)?;
        self.core.simple(self.core.http.post(url)).await
    }

    pub async fn get_properties(
        &self,
        n: &dyn UserName,
    ) -> Result<HashMap<String, String>, SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "get_properties")?;
        self.core.json(self.core.http.post(url)).await
    }

    pub async fn set_properties(
        &self,
        n: &dyn UserName,
        props: &HashMap<String, String>,
    ) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "set_properties")?;
        self.core.simple(self.core.http.post(url).json(props)).await
    }

    pub async fn delete_properties(&self, n: &dyn UserName, keys: &[String]) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.ref_url(n, "del_properties")?;
        self.core.simple(self.core.http.post(url).json(&keys)).await
    }
}
