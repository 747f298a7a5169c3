//! Outbound HTTP adapter.
//!
//! Implements [`HttpPort`] with a blocking `reqwest` client.  Each
//! action worker runs on its own thread, so blocking here only holds up
//! the sequence that issued the request.

use std::time::Duration;

use log::info;
use reqwest::Method;
use reqwest::blocking::Client;

use crate::app::model::HttpRequest;
use crate::app::ports::HttpPort;
use crate::error::ActionFault;

pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    /// Build a client with a fixed per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pinagent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpPort for ReqwestHttp {
    fn send(&self, request: &HttpRequest) -> Result<u16, ActionFault> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ActionFault::Http(format!("invalid method '{}'", request.method)))?;

        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .map_err(|e| ActionFault::Http(e.to_string()))?;
        let status = response.status().as_u16();
        info!("Actions: HTTP {} {} -> {}", method, request.url, status);
        Ok(status)
    }
}
