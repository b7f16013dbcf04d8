use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const INIT_MARKER: char = '!';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error(
        "invalid workload '{0}': expected 'CLUSTER/NAMESPACE/TYPE/NAME[/CONTAINER]'"
    )]
    SegmentCount(String),
    #[error("invalid workload '{input}': {segment} segment is empty")]
    EmptySegment { input: String, segment: &'static str },
    #[error("invalid workload '{input}': unknown workload type '{kind}'")]
    UnknownKind { input: String, kind: String },
    #[error("invalid workload '{0}': the '!' init marker belongs on the container segment")]
    MisplacedInitMarker(String),
}

/// Workload resource kinds that can be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    CronJob,
}

impl WorkloadKind {
    /// Resolve a normalized kind or one of its short aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "deployment" | "deploy" => Some(Self::Deployment),
            "statefulset" | "sts" => Some(Self::StatefulSet),
            "daemonset" | "ds" => Some(Self::DaemonSet),
            "cronjob" => Some(Self::CronJob),
            _ => None,
        }
    }

    /// Canonical resource name as accepted by the orchestration client.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::DaemonSet => "daemonset",
            Self::CronJob => "cronjob",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured address of a running workload container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadTarget {
    pub cluster: String,
    pub namespace: String,
    pub kind: WorkloadKind,
    pub name: String,
    pub container: String,
    pub is_init: bool,
}

const SEGMENT_NAMES: [&str; 5] = ["cluster", "namespace", "type", "name", "container"];

/// Lower-case, map `.` and `_` to `-`, and trim.
pub fn normalize_segment(s: &str) -> String {
    s.replace(['.', '_'], "-").to_lowercase().trim().to_owned()
}

pub fn parse_target(input: &str) -> Result<WorkloadTarget, TargetError> {
    let segments: Vec<String> = input.split('/').map(normalize_segment).collect();
    if segments.len() != 4 && segments.len() != 5 {
        return Err(TargetError::SegmentCount(input.to_owned()));
    }

    for (segment, label) in segments.iter().zip(SEGMENT_NAMES) {
        if segment.is_empty() {
            return Err(TargetError::EmptySegment {
                input: input.to_owned(),
                segment: label,
            });
        }
    }

    let container_raw = segments.get(4).unwrap_or(&segments[3]);
    let (container, is_init) = match container_raw.strip_suffix(INIT_MARKER) {
        Some(stripped) => (stripped.trim().to_owned(), true),
        None => (container_raw.clone(), false),
    };
    // In the 4-segment form the name doubles as the container, so the marker
    // is stripped from both. Anywhere else it is an error.
    let name = if segments.len() == 4 {
        container.clone()
    } else if segments[3].contains(INIT_MARKER) {
        return Err(TargetError::MisplacedInitMarker(input.to_owned()));
    } else {
        segments[3].clone()
    };
    if segments[..3].iter().any(|s| s.contains(INIT_MARKER)) {
        return Err(TargetError::MisplacedInitMarker(input.to_owned()));
    }
    if container.is_empty() {
        return Err(TargetError::EmptySegment {
            input: input.to_owned(),
            segment: "container",
        });
    }

    let Some(kind) = WorkloadKind::from_name(&segments[2]) else {
        return Err(TargetError::UnknownKind {
            input: input.to_owned(),
            kind: segments[2].clone(),
        });
    };

    let mut segments = segments.into_iter();
    let cluster = segments.next().unwrap_or_default();
    let namespace = segments.next().unwrap_or_default();

    Ok(WorkloadTarget {
        cluster,
        namespace,
        kind,
        name,
        container,
        is_init,
    })
}

impl FromStr for WorkloadTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_target(s)
    }
}

impl fmt::Display for WorkloadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.cluster, self.namespace, self.kind, self.name, self.container
        )?;
        if self.is_init {
            write!(f, "{INIT_MARKER}")?;
        }
        Ok(())
    }
}
