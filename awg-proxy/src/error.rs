use std::net::SocketAddr;

/// Fatal startup failures. Anything reaching `main` through this path exits
/// the process with status 1; nothing on the hot path produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to bind listen socket on {addr}: {source}")]
    Bind { addr: SocketAddr, #[source] source: std::io::Error },
    #[error("failed to resolve remote address {host}: {source}")]
    Resolve { host: String, #[source] source: std::io::Error },
    #[error("remote address {host} did not resolve to any address")]
    NoResolvedAddress { host: String },
    #[error("failed to dial remote {addr}: {source}")]
    Dial { addr: SocketAddr, #[source] source: std::io::Error },
}
