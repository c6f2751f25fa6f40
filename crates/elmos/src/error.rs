use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// A prerequisite (crosstool-ng, a built toolchain, a configured kernel) is missing.
    NotInstalled { what: String, hint: String },
    /// `ct-ng build` was requested before a `.config` exists.
    NoTargetSelected { hint: String },
    /// A subprocess failed; `stage` names the step that ran it.
    Subprocess { stage: String, source: Box<Error> },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    Cancelled,
    Msg(String),
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::Msg(msg.into())
    }

    pub fn not_installed(what: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::NotInstalled {
            what: what.into(),
            hint: hint.into(),
        }
    }

    pub fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.into(),
            source,
        }
    }

    pub fn stage(stage: impl Into<String>, source: Error) -> Self {
        match source {
            // Cancellation is not a stage failure; keep it recognisable.
            Error::Cancelled => Error::Cancelled,
            other => Self::Subprocess {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInstalled { what, hint } => {
                write!(f, "{what} is not installed (run `{hint}` first)")
            }
            Error::NoTargetSelected { hint } => {
                write!(f, "no toolchain target selected (run `{hint}` first)")
            }
            Error::Subprocess { stage, source } => write!(f, "{stage} failed: {source}"),
            Error::ConfigIo { path, source } => write!(f, "{}: {source}", path.display()),
            Error::Cancelled => write!(f, "cancelled"),
            Error::Msg(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Subprocess { source, .. } => Some(source.as_ref()),
            Error::ConfigIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
