//! Plumbing shared by the proxy-facing clients: request helpers, error
//! decoding, action-mode flags.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{Config, KEY_AUTOCREATE, KEY_FORCE};
use crate::error::SdkError;
use crate::name::AccountName;

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) const HEADER_ACTION_MODE: &str = "X-oio-action-mode";

/// `{status, message}` body attached to proxy failures.
#[derive(Debug, Deserialize)]
struct ProxyErrorBody {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    message: String,
}

pub(crate) fn http_client() -> Result<reqwest::Client, SdkError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?)
}

pub(crate) struct ProxyCore {
    pub ns: String,
    pub config: Arc<dyn Config>,
    pub http: reqwest::Client,
}

impl ProxyCore {
    pub fn new(ns: &str, config: Arc<dyn Config>) -> Result<ProxyCore, SdkError> {
        Ok(ProxyCore {
            ns: ns.to_string(),
            config,
            http: http_client()?,
        })
    }

    /// Every call is checked against the configured namespace.
    pub fn check_ns<N: AccountName + ?Sized>(&self, name: &N) -> Result<(), SdkError> {
        if name.ns() != self.ns {
            return Err(SdkError::NsNotManaged);
        }
        Ok(())
    }

    /// The `X-oio-action-mode` value for a mutating call, driven by the
    /// namespace configuration and the per-call booleans.
    pub fn action_mode(&self, autocreate: bool, force: bool) -> Option<String> {
        let mut tokens = Vec::new();
        if autocreate && self.config.flag(&self.ns, KEY_AUTOCREATE) {
            tokens.push("autocreate");
        }
        if force && self.config.flag(&self.ns, KEY_FORCE) {
            tokens.push("force");
        }
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(", "))
        }
    }

    /// Fire a request whose reply body does not matter: 2xx is success, 404
    /// is [`SdkError::NotFound`], anything else decodes the proxy error.
    pub async fn simple(&self, req: reqwest::RequestBuilder) -> Result<(), SdkError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            Err(SdkError::NotFound)
        } else {
            Err(decode_proxy_error(status.as_u16(), resp).await)
        }
    }

    /// Fire a request and decode its JSON reply.
    pub async fn json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, SdkError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json().await?)
        } else if status.as_u16() == 404 {
            Err(SdkError::NotFound)
        } else {
            Err(decode_proxy_error(status.as_u16(), resp).await)
        }
    }

    /// Same as [`ProxyCore::json`] but keeps the response headers, for the
    /// calls that smuggle metadata through them.
    pub async fn json_with_headers<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(T, reqwest::header::HeaderMap), SdkError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            let headers = resp.headers().clone();
            Ok((resp.json().await?, headers))
        } else if status.as_u16() == 404 {
            Err(SdkError::NotFound)
        } else {
            Err(decode_proxy_error(status.as_u16(), resp).await)
        }
    }
}

pub(crate) async fn decode_proxy_error(http: u16, resp: reqwest::Response) -> SdkError {
    match resp.json::<ProxyErrorBody>().await {
        Ok(body) => SdkError::Proxy {
            http,
            status: body.status,
            message: body.message,
        },
        Err(e) => SdkError::Proxy {
            http,
            status: 0,
            message: e.to_string(),
        },
    }
}

pub(crate) fn escape(v: &str) -> String {
    urlencoding::encode(v).into_owned()
}
