use crate::error::TransportError;
use std::{io::Read, time::Duration};

const USER_AGENT: &str = concat!("ModSync/", env!("CARGO_PKG_VERSION"));

pub type Body = Box<dyn Read + Send>;

/// Blocking GET. Non-success statuses are errors, never bodies.
pub trait Transport {
    fn get(&self, url: &str) -> Result<Body, TransportError>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(60))
            .build();
        Self { agent }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Body, TransportError> {
        match self.agent.get(url).set("User-Agent", USER_AGENT).call() {
            Ok(response) => Ok(Box::new(response.into_reader())),
            Err(ureq::Error::Status(status, _)) => Err(TransportError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(err)) => Err(TransportError::Io {
                url: url.to_string(),
                message: err.to_string(),
            }),
        }
    }
}
