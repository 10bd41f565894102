use std::fmt;

/// Every failure surfaced by this crate, split by when it can be detected.
///
/// - `LayerLookup`: an unknown layer name was presented to the catalog.
/// - `BuildLayer`: a structural or shape violation caught while building
///   a topology (invalid first layer, arity mismatch, dimension mismatch,
///   extending past the terminal layer, pipe operations on a non-pipe).
/// - `BuildNetwork`: a violation only detectable once real data is supplied
///   (input/label shape mismatches, missing bindings).
///
/// All variants are raised synchronously at the offending call and never
/// caught internally. A rejected mutation leaves the topology untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    LayerLookup(String),
    BuildLayer(String),
    BuildNetwork(String),
}

pub type NetResult<T> = Result<T, NetError>;

impl NetError {
    pub(crate) fn lookup(msg: impl Into<String>) -> NetError {
        NetError::LayerLookup(msg.into())
    }

    pub(crate) fn layer(msg: impl Into<String>) -> NetError {
        NetError::BuildLayer(msg.into())
    }

    pub(crate) fn network(msg: impl Into<String>) -> NetError {
        NetError::BuildNetwork(msg.into())
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::LayerLookup(msg) => write!(f, "layer lookup error: {msg}"),
            NetError::BuildLayer(msg) => write!(f, "build layer error: {msg}"),
            NetError::BuildNetwork(msg) => write!(f, "build network error: {msg}"),
        }
    }
}

impl std::error::Error for NetError {}
