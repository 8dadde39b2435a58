//! The fixed set of generation tool kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A generation tool a job can belong to.
///
/// The set is small and fixed by product design. Adding a kind means adding
/// a variant here plus one endpoint mapping in the worker adapter -- the
/// queue manager itself is kind-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Image upscaling.
    Upscale,
    /// Pose transfer onto an existing image.
    PoseChange,
    /// Clothing replacement on an existing image.
    OutfitSwap,
    /// Short video generation.
    VideoGen,
}

/// All kinds, in a stable order (used for queue breakdowns).
pub const ALL_KINDS: [JobKind; 4] = [
    JobKind::Upscale,
    JobKind::PoseChange,
    JobKind::OutfitSwap,
    JobKind::VideoGen,
];

impl JobKind {
    /// Snake-case identifier stored in the `jobs.kind` column and used in
    /// URLs and push payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Upscale => "upscale",
            JobKind::PoseChange => "pose_change",
            JobKind::OutfitSwap => "outfit_swap",
            JobKind::VideoGen => "video_gen",
        }
    }

    /// Credit cost charged at admission time.
    pub fn credit_cost(self) -> i32 {
        match self {
            JobKind::Upscale => 2,
            JobKind::PoseChange => 5,
            JobKind::OutfitSwap => 5,
            JobKind::VideoGen => 20,
        }
    }

    /// Human-readable tool name for UI messages.
    pub fn label(self) -> &'static str {
        match self {
            JobKind::Upscale => "Upscale",
            JobKind::PoseChange => "Pose Change",
            JobKind::OutfitSwap => "Outfit Swap",
            JobKind::VideoGen => "Video Generation",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = UnknownJobKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upscale" => Ok(JobKind::Upscale),
            "pose_change" => Ok(JobKind::PoseChange),
            "outfit_swap" => Ok(JobKind::OutfitSwap),
            "video_gen" => Ok(JobKind::VideoGen),
            other => Err(UnknownJobKind(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized kind string.
#[derive(Debug, thiserror::Error)]
#[error("unknown job kind: {0}")]
pub struct UnknownJobKind(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_round_trip() {
        for kind in ALL_KINDS {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("face_swap".parse::<JobKind>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&JobKind::PoseChange).unwrap();
        assert_eq!(json, "\"pose_change\"");
        let back: JobKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobKind::PoseChange);
    }
}
