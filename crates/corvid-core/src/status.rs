//! Unified result type carrying an error kind, an optional code, and an
//! optional human description. No exceptions cross component boundaries;
//! every fallible operation in this workspace returns a [`Status`].

use std::fmt;

use thiserror::Error;

/// Sentinel value for an unspecified error code.
pub const UNSPECIFIED: i32 = -1;

/// Closed set of error kinds. `Ok` is the only "success" kind; everything
/// else is a failure, regardless of `code`/`desc`. Derives `Display`/`Error`
/// the way the teacher's leaf error enums do (e.g.
/// `flux-communication::error::QueueError`), one variant per `#[error(...)]`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    #[error("Ok")]
    Ok,
    #[error("Generic")]
    Generic,
    #[error("IO")]
    IO,
    #[error("Runtime")]
    Runtime,
    #[error("Net")]
    Net,
    #[error("Rpc")]
    Rpc,
    #[error("Timeout")]
    Timeout,
    #[error("Invalid")]
    Invalid,
    #[error("System")]
    System,
    #[error("NotImplemented")]
    NotImplemented,
    #[error("Unsupported")]
    Unsupported,
}

/// Product of an error kind, an optional code (sentinel [`UNSPECIFIED`] when
/// absent), and an optional description.
///
/// `ok()` is defined solely by `kind == Kind::Ok`; `code`/`desc` are
/// diagnostic payload and never change ok-ness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    kind: Kind,
    code: i32,
    desc: Option<String>,
}

impl Status {
    pub const fn new(kind: Kind, code: i32, desc: Option<String>) -> Self {
        Self { kind, code, desc }
    }

    /// The canonical success value.
    pub const fn ok() -> Self {
        Self { kind: Kind::Ok, code: UNSPECIFIED, desc: None }
    }

    pub fn err(kind: Kind, desc: impl Into<String>) -> Self {
        Self { kind, code: UNSPECIFIED, desc: Some(desc.into()) }
    }

    pub fn err_code(kind: Kind, code: i32, desc: impl Into<String>) -> Self {
        Self { kind, code, desc: Some(desc.into()) }
    }

    pub const fn kind(&self) -> Kind {
        self.kind
    }

    pub const fn code(&self) -> i32 {
        self.code
    }

    pub fn desc(&self) -> Option<&str> {
        self.desc.as_deref()
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self.kind, Kind::Ok)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "[Ok]");
        }
        write!(
            f,
            "[{}] Code={} Desc=\"{}\"",
            self.kind,
            self.code,
            self.desc.as_deref().unwrap_or("")
        )
    }
}

impl From<std::io::Error> for Status {
    fn from(e: std::io::Error) -> Self {
        let code = e.raw_os_error().unwrap_or(UNSPECIFIED);
        Status::err_code(Kind::IO, code, e.to_string())
    }
}
