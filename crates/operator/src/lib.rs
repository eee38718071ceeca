pub mod cache;
pub mod cleanup;
pub mod codec;
pub mod conditions;
pub mod config;
pub mod control;
pub mod controllers;
pub mod crd;
pub mod events;
pub mod informer;
pub mod ingress;
pub mod queue;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to marshal the object to TFJob: {0}")]
    FailedMarshal(String),
    #[error("Failed to convert TFJob to unstructured: {0}")]
    Encode(String),
    #[error("Failed to get TFJob from key {0}")]
    GetFromKey(String),
    #[error("The object is not found: {0}")]
    NotExists(String),
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),
    #[error("Condition order violation: {0}")]
    ConditionOrder(String),
    #[error("unable to delete pdb: {0}")]
    DeletePdb(#[source] Box<Error>),
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The job vanished between enqueue and processing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotExists(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// True when the API server answered 404 for the requested object.
pub(crate) fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
