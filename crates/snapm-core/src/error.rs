//! Error taxonomy shared by every snapshot-manager crate.

/// The single error type returned by all fallible snapm operations.
///
/// Each variant corresponds to exactly one taxonomy entry; call sites pick the
/// variant that matches the failure, they never funnel everything through a
/// single catch-all "IO" case.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("argument error: {message}")]
    Argument { message: String },

    #[error("invalid identifier: {message}")]
    InvalidIdentifier { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("already exists: {message}")]
    Exists { message: String },

    #[error("busy: {message}")]
    Busy { message: String },

    #[error("no space: {message}")]
    NoSpace { message: String },

    #[error("no provider claims source: {message}")]
    NoProvider { message: String },

    #[error("size policy error: {message}")]
    SizePolicy { message: String },

    #[error("invalid state: {message}")]
    State { message: String },

    #[error("recursive snapshot: {message}")]
    Recursion { message: String },

    #[error("path error: {message}")]
    Path { message: String },

    #[error("plugin error: {message}")]
    Plugin {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("callout failed: {message}")]
    Callout { message: String },

    #[error("mount error: {message}")]
    Mount { message: String },

    #[error("umount error: {message}")]
    Umount { message: String },

    #[error("timer error: {message}")]
    Timer { message: String },

    #[error("system error: {message}")]
    System { message: String },
}

impl Error {
    pub fn argument<S: Into<String>>(message: S) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    pub fn invalid_identifier<S: Into<String>>(message: S) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn exists<S: Into<String>>(message: S) -> Self {
        Self::Exists {
            message: message.into(),
        }
    }

    pub fn busy<S: Into<String>>(message: S) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    pub fn no_space<S: Into<String>>(message: S) -> Self {
        Self::NoSpace {
            message: message.into(),
        }
    }

    pub fn no_provider<S: Into<String>>(message: S) -> Self {
        Self::NoProvider {
            message: message.into(),
        }
    }

    pub fn size_policy<S: Into<String>>(message: S) -> Self {
        Self::SizePolicy {
            message: message.into(),
        }
    }

    pub fn state<S: Into<String>>(message: S) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn recursion<S: Into<String>>(message: S) -> Self {
        Self::Recursion {
            message: message.into(),
        }
    }

    pub fn path<S: Into<String>>(message: S) -> Self {
        Self::Path {
            message: message.into(),
        }
    }

    pub fn plugin<S: Into<String>>(message: S) -> Self {
        Self::Plugin {
            message: message.into(),
            source: None,
        }
    }

    pub fn plugin_with_source<S: Into<String>>(message: S, source: Error) -> Self {
        Self::Plugin {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn callout<S: Into<String>>(message: S) -> Self {
        Self::Callout {
            message: message.into(),
        }
    }

    pub fn mount<S: Into<String>>(message: S) -> Self {
        Self::Mount {
            message: message.into(),
        }
    }

    pub fn umount<S: Into<String>>(message: S) -> Self {
        Self::Umount {
            message: message.into(),
        }
    }

    pub fn timer<S: Into<String>>(message: S) -> Self {
        Self::Timer {
            message: message.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;
