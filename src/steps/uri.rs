// src/steps/uri.rs

//! Step identifier grammar: `scheme://segment[/segment...]`.

use std::fmt;
use std::str::FromStr;

use crate::errors::{EtlError, Result};

/// Known step schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Data,
    DataPrivate,
    Walden,
    WaldenPrivate,
    Snapshot,
    SnapshotPrivate,
    Grapher,
    Github,
    ETag,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Data => "data",
            Scheme::DataPrivate => "data-private",
            Scheme::Walden => "walden",
            Scheme::WaldenPrivate => "walden-private",
            Scheme::Snapshot => "snapshot",
            Scheme::SnapshotPrivate => "snapshot-private",
            Scheme::Grapher => "grapher",
            Scheme::Github => "github",
            Scheme::ETag => "etag",
        }
    }

    /// Scheme with any `-private` suffix removed.
    pub fn base(&self) -> &'static str {
        match self {
            Scheme::Data | Scheme::DataPrivate => "data",
            Scheme::Walden | Scheme::WaldenPrivate => "walden",
            Scheme::Snapshot | Scheme::SnapshotPrivate => "snapshot",
            Scheme::Grapher => "grapher",
            Scheme::Github => "github",
            Scheme::ETag => "etag",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(
            self,
            Scheme::DataPrivate | Scheme::WaldenPrivate | Scheme::SnapshotPrivate
        )
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "data" => Ok(Scheme::Data),
            "data-private" => Ok(Scheme::DataPrivate),
            "walden" => Ok(Scheme::Walden),
            "walden-private" => Ok(Scheme::WaldenPrivate),
            "snapshot" => Ok(Scheme::Snapshot),
            "snapshot-private" => Ok(Scheme::SnapshotPrivate),
            "grapher" => Ok(Scheme::Grapher),
            "github" => Ok(Scheme::Github),
            "etag" => Ok(Scheme::ETag),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step identifier split into its raw scheme and path.
///
/// The scheme is kept as a string so that an unknown scheme can still be
/// reported with the full identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUri {
    pub scheme: String,
    pub path: String,
}

impl StepUri {
    pub fn parse(identifier: &str) -> Result<Self> {
        match identifier.split_once("://") {
            Some((scheme, path)) if !scheme.is_empty() && !path.is_empty() => Ok(Self {
                scheme: scheme.to_string(),
                path: path.to_string(),
            }),
            _ => Err(EtlError::Parse {
                step: identifier.to_string(),
                reason: "expected `scheme://path`".to_string(),
            }),
        }
    }

    /// Resolve the scheme to a known step kind.
    pub fn kind(&self) -> Result<Scheme> {
        self.scheme
            .parse()
            .map_err(|_| EtlError::UnsupportedStep(self.to_string()))
    }
}

impl fmt::Display for StepUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)
    }
}

/// Whether a step is publicly visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Attributes encoded in a step identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAttributes {
    /// The full identifier, as it appears in the DAG.
    pub step: String,
    pub kind: Visibility,
    pub channel: String,
    pub namespace: String,
    pub version: String,
    pub name: String,
    /// `channel/namespace/name`: the same for every version of a step.
    pub identifier: String,
}

/// Extract channel/namespace/version/name from a step identifier.
///
/// Segment counts depend on the scheme: `etag` and `github` paths are taken
/// whole, `snapshot` and `walden` have three segments, everything else four.
pub fn step_attributes(step: &str) -> Result<StepAttributes> {
    let uri = StepUri::parse(step)?;

    let kind = if uri.scheme.contains("private") {
        Visibility::Private
    } else {
        Visibility::Public
    };
    let prefix = uri.scheme.split('-').next().unwrap_or_default();

    let (channel, namespace, version, name, identifier) = match prefix {
        "etag" | "github" => (
            "etag".to_string(),
            "etag".to_string(),
            "latest".to_string(),
            uri.path.clone(),
            uri.path.clone(),
        ),
        "snapshot" | "walden" => {
            let [namespace, version, name] = split_segments::<3>(step, &uri.path)?;
            let identifier = format!("{prefix}/{namespace}/{name}");
            (prefix.to_string(), namespace, version, name, identifier)
        }
        _ => {
            let [channel, namespace, version, name] = split_segments::<4>(step, &uri.path)?;
            let identifier = format!("{channel}/{namespace}/{name}");
            (channel, namespace, version, name, identifier)
        }
    };

    Ok(StepAttributes {
        step: step.to_string(),
        kind,
        channel,
        namespace,
        version,
        name,
        identifier,
    })
}

/// Split `path` into exactly `N` non-empty `/`-separated segments.
pub(crate) fn split_segments<const N: usize>(step: &str, path: &str) -> Result<[String; N]> {
    let parts: Vec<String> = path.split('/').map(str::to_string).collect();
    if parts.len() != N || parts.iter().any(|p| p.is_empty()) {
        return Err(EtlError::Parse {
            step: step.to_string(),
            reason: format!("expected {N} path segments, found {}", parts.len()),
        });
    }
    parts.try_into().map_err(|_| EtlError::Parse {
        step: step.to_string(),
        reason: format!("expected {N} path segments"),
    })
}
