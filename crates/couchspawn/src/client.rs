//! HTTP client for the bootstrap request.

use reqwest::RequestBuilder;

use crate::config::Credentials;

/// A `reqwest::Client` that adds basic auth to every request when
/// credentials are configured.
#[derive(Debug, Clone)]
pub struct CouchClient {
    http: reqwest::Client,
    credentials: Option<Credentials>,
}

impl CouchClient {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.put(url))
    }
}
