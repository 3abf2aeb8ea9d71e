//! Error types for extension loading

use crate::executor::ScriptError;
use crate::sfc::SfcError;
use crate::template::TemplateError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use vessel_api::ExtensionId;

/// Errors produced while loading an extension's scripts and components
#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("Provided UI file \"{file}\" is not a recognized component file")]
    NotAComponentFile { path: String, file: String },

    #[error("Failed to parse component {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: SfcError,
    },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Failed to compile template of {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: TemplateError,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Extension '{extension}' reported: {message}")]
    Reported {
        extension: ExtensionId,
        message: String,
    },

    #[error("Invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("File watcher error: {0}")]
    Watch(#[source] notify::Error),
}

impl ExtensionError {
    /// Path of the file the error belongs to, when known
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotAComponentFile { path, .. }
            | Self::Parse { path, .. }
            | Self::Template { path, .. }
            | Self::ReadFile { path, .. }
            | Self::ReadDirectory { path, .. } => Some(path),
            Self::Script(err) => err.origin().file.as_deref(),
            Self::Reported { .. } | Self::Config { .. } | Self::Watch(_) => None,
        }
    }
}

/// Result type for extension loading operations
pub type ExtensionResult<T> = Result<T, ExtensionError>;
