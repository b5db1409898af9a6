//! File and path metadata.

use serde_json::{json, Value};
use types::{Error, Result};

/// Entry classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InfoKind {
    /// Regular file.
    File,
    /// Directory, or a key prefix on object stores.
    Path,
    /// Symbolic link.
    Link,
    /// Anything else: device, socket, fifo.
    Special,
}

impl InfoKind {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Path => "path",
            Self::Link => "link",
            Self::Special => "special",
        }
    }

    /// Looks a kind up by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "file" => Ok(Self::File),
            "path" => Ok(Self::Path),
            "link" => Ok(Self::Link),
            "special" => Ok(Self::Special),
            _ => Err(Error::format(format!("invalid info kind '{name}'"))),
        }
    }
}

/// Metadata for one storage entry.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageInfo {
    /// Entry name: the file name for listings, the queried path otherwise.
    pub name: String,
    /// Entry classification.
    pub kind: InfoKind,
    /// Size in bytes; zero for paths.
    pub size: u64,
    /// Modification time, unix seconds.
    pub mtime: i64,
    /// Permission bits.
    pub mode: u32,
    /// Owning user name when the driver knows it.
    pub user: Option<String>,
    /// Owning group name when the driver knows it.
    pub group: Option<String>,
    /// Target for links.
    pub link_target: Option<String>,
}

impl StorageInfo {
    /// Creates file metadata with only name and size, the shape object
    /// stores provide.
    #[must_use]
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: InfoKind::File,
            size,
            mtime: 0,
            mode: 0,
            user: None,
            group: None,
            link_target: None,
        }
    }

    /// Creates path metadata with only a name.
    #[must_use]
    pub fn path(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InfoKind::Path,
            size: 0,
            mtime: 0,
            mode: 0,
            user: None,
            group: None,
            link_target: None,
        }
    }

    /// Encodes for the remote protocol.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "kind": self.kind.name(),
            "size": self.size,
            "mtime": self.mtime,
            "mode": self.mode,
            "user": self.user,
            "group": self.group,
            "link_target": self.link_target,
        })
    }

    /// Decodes from the remote protocol.
    pub fn from_json(value: &Value) -> Result<Self> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::format("info is missing 'name'"))?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::format("info is missing 'kind'"))?;

        Ok(Self {
            name: name.to_string(),
            kind: InfoKind::from_name(kind)?,
            size: value.get("size").and_then(Value::as_u64).unwrap_or(0),
            mtime: value.get("mtime").and_then(Value::as_i64).unwrap_or(0),
            mode: value.get("mode").and_then(Value::as_u64).unwrap_or(0) as u32,
            user: value.get("user").and_then(Value::as_str).map(str::to_string),
            group: value.get("group").and_then(Value::as_str).map(str::to_string),
            link_target: value
                .get("link_target")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let info = StorageInfo {
            name: "base".into(),
            kind: InfoKind::Link,
            size: 11,
            mtime: 1_500_000_000,
            mode: 0o640,
            user: Some("postgres".into()),
            group: None,
            link_target: Some("/pg/base".into()),
        };

        let decoded = StorageInfo::from_json(&info.to_json()).expect("decode");
        assert_eq!(decoded, info);
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [InfoKind::File, InfoKind::Path, InfoKind::Link, InfoKind::Special] {
            assert_eq!(InfoKind::from_name(kind.name()).expect("known"), kind);
        }

        assert!(InfoKind::from_name("socket").is_err());
    }
}
