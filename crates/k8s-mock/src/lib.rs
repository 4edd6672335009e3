//! Mock Kubernetes API server for testing.
//!
//! Serves typed CRUD over HTTP so that tests can connect through a real
//! kubeconfig. Objects live in memory; creates, deletes and every request are
//! observable from the test.

pub mod discovery;
mod helpers;
pub mod http;

pub use discovery::{MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, RecordedRequest, RunningHttpMockK8sServer};
