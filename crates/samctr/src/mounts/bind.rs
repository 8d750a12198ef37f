//! Bind mounts and the bind specification grammar.
//!
//! A bind spec is `PATH`, `HOST:CTR` or `HOST:CTR:PERM` where `PERM` is
//! `ro` or `rw` (default `rw`).

use std::fmt;
use std::str::FromStr;

use sam_common::{SamError, SamResult};

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Permission {
    /// Read-only.
    Ro,
    /// Read-write.
    #[default]
    Rw,
}

impl Permission {
    /// The token used in bind specs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::Rw => "rw",
        }
    }

    /// Normalize a permission token, falling back to `rw` with a warning.
    #[must_use]
    pub fn normalize(perms: &str) -> Self {
        match perms {
            "ro" => Self::Ro,
            "rw" => Self::Rw,
            other => {
                tracing::warn!(
                    perms = other,
                    default = Self::Rw.as_str(),
                    "Unsupported bind mount permission, using default"
                );
                Self::Rw
            }
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host path made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindMount {
    /// Host path (absolute).
    pub host: String,
    /// Container path (absolute).
    pub ctr: String,
    /// Access mode.
    pub perms: Permission,
}

impl BindMount {
    /// Create a bind mount from a raw permission token.
    ///
    /// Anything other than `ro`/`rw` becomes `rw`.
    pub fn new(host: impl Into<String>, ctr: impl Into<String>, perms: &str) -> Self {
        Self {
            host: host.into(),
            ctr: ctr.into(),
            perms: Permission::normalize(perms),
        }
    }

    /// Create a read-write bind mount.
    pub fn rw(host: impl Into<String>, ctr: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ctr: ctr.into(),
            perms: Permission::Rw,
        }
    }

    /// Create a read-only bind mount.
    pub fn ro(host: impl Into<String>, ctr: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ctr: ctr.into(),
            perms: Permission::Ro,
        }
    }

    /// Parse a bind spec.
    ///
    /// # Errors
    ///
    /// - [`SamError::EmptyBindSpec`] for blank input
    /// - [`SamError::InvalidBindSpec`] for empty components or more than
    ///   three parts
    /// - [`SamError::InvalidBindPermission`] for a permission other than
    ///   `ro`/`rw`
    pub fn parse(spec: &str) -> SamResult<Self> {
        let s = spec.trim();
        if s.is_empty() {
            return Err(SamError::EmptyBindSpec);
        }

        let invalid = || SamError::InvalidBindSpec {
            spec: spec.to_string(),
        };

        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [path] => {
                if path.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::rw(*path, *path))
            }
            [host, ctr] => {
                if host.is_empty() || ctr.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::rw(*host, *ctr))
            }
            [host, ctr, perms] => {
                if host.is_empty() || ctr.is_empty() || perms.is_empty() {
                    return Err(invalid());
                }
                let perms = match *perms {
                    "ro" => Permission::Ro,
                    "rw" => Permission::Rw,
                    other => {
                        return Err(SamError::InvalidBindPermission {
                            perms: other.to_string(),
                            spec: spec.to_string(),
                        });
                    }
                };
                Ok(Self {
                    host: (*host).to_string(),
                    ctr: (*ctr).to_string(),
                    perms,
                })
            }
            _ => Err(invalid()),
        }
    }

    /// Parse a comma separated list of bind specs, skipping blank entries.
    ///
    /// # Errors
    ///
    /// Returns the first parse error.
    pub fn parse_list(list: &str) -> SamResult<Vec<Self>> {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl FromStr for BindMount {
    type Err = SamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.ctr, self.perms)
    }
}
