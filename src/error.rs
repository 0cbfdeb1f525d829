use std::{num::ParseIntError, sync::Arc};

use thiserror::Error;

/// Errors a pending load may settle with.
///
/// This is cloneable as the same settlement is handed to every waiter
/// of a shared [`PendingOp`](crate::store::PendingOp).
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The loaded value could not be turned into its cached form.
    #[error("failed to encode the value loaded for `{name}`")]
    Encode {
        name: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A cached or embedded value could not be read back.
    #[error("failed to decode the value cached for `{name}`")]
    Decode {
        name: String,
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The loader task went away before producing a value.
    #[error("load `{name}` was abandoned before producing a value")]
    Abandoned { name: String },
}

impl LoadError {
    pub(crate) fn encode(name: &str, source: serde_json::Error) -> Self {
        Self::Encode {
            name: name.to_string(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn decode(name: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            name: name.to_string(),
            source: Arc::new(source),
        }
    }
}

/// Malformed data markers.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("element id `{id}` is not a data marker")]
    NotAMarker { id: String },

    #[error("data marker `{name}` has a malformed body")]
    Body {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Accessing loaded state outside of the loader that provides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("`{0}` accessed outside of a loader providing it")]
    OutsideProvider(&'static str),
}

/// Invalid collector configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timeout `{value}` for {key}")]
    InvalidTimeout {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid flag `{value}` for {key}, expected true or false")]
    InvalidFlag { key: &'static str, value: String },
}
