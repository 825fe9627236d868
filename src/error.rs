use std::io;

/// Failures talking to the remote document store.
///
/// All of these are transient from the control loop's point of view: the
/// sync adapter logs them and tries again on a later tick.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON from remote: {0}")]
    Decode(#[from] json::Error),

    #[error("change stream closed: {0}")]
    StreamClosed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => RemoteError::Status {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => RemoteError::Transport(transport.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("config is not valid JSON: {0}")]
    Parse(#[from] json::Error),

    #[error("config must be a JSON object")]
    NotAnObject,

    #[error("invalid value for {0}")]
    InvalidValue(&'static str),

    #[error("missing required key {0}")]
    Missing(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("unable to remove network credentials at {path}: {source}")]
    RemoveCredentials { path: String, source: io::Error },
}
