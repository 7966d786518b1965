// Pose table - the per-shot variation injected into the generation adapter

use serde::{Deserialize, Serialize};

/// One entry of the pose table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseDescription {
    pub pose: String,
    pub camera_angle: String,
}

impl PoseDescription {
    pub fn new(pose: impl Into<String>, camera_angle: impl Into<String>) -> Self {
        Self {
            pose: pose.into(),
            camera_angle: camera_angle.into(),
        }
    }
}

/// Immutable, non-empty list of poses
///
/// Lookups wrap around, so every pose index resolves to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PoseTable {
    poses: Vec<PoseDescription>,
}

impl PoseTable {
    /// Build a table; `None` when `poses` is empty
    pub fn new(poses: Vec<PoseDescription>) -> Option<Self> {
        if poses.is_empty() {
            None
        } else {
            Some(Self { poses })
        }
    }

    /// The ten-shot catalogue photoshoot
    pub fn photoshoot() -> Self {
        let poses = [
            (
                "Full frontal stance: standing straight facing the camera, feet together, arms relaxed at the sides, neutral elegant expression.",
                "Direct front view, 0 degrees",
            ),
            (
                "Right quarter turn: body turned 45 degrees right, looking back over the right shoulder, right hand holding the pallu near the shoulder.",
                "Three-quarter right side view",
            ),
            (
                "Hand on hip: facing front, left hand on the left hip, right hand touching the pallu end, chin slightly lifted.",
                "Straight front with attitude",
            ),
            (
                "Pallu display: facing the camera, both hands holding the pallu open at chest level to show its full design.",
                "Front view, pallu showcase",
            ),
            (
                "Walking forward: left leg forward, right hand lifting the saree slightly to show the border, left hand holding the pallu.",
                "Front diagonal, capturing motion",
            ),
            (
                "Side profile: left side facing the camera, right hand near the ear, left hand holding the pallu drape.",
                "Perfect side profile, 90 degrees",
            ),
            (
                "Looking back: body turned 135 degrees away, head turned over the left shoulder, hands adjusting the pallu on the back.",
                "Back three-quarter view",
            ),
            (
                "Border showcase: leaning forward slightly, both hands lifting the lower edges outward to display the border.",
                "Front view, slightly elevated camera",
            ),
            (
                "Namaste: palms together at the centre of the chest, soft downward gaze, balanced stance.",
                "Direct centered front",
            ),
            (
                "Twirl: captured mid-twirl, body turned slightly right, pallu flowing outward, arms extended.",
                "Front-right capturing movement",
            ),
        ];

        Self {
            poses: poses
                .into_iter()
                .map(|(pose, angle)| PoseDescription::new(pose, angle))
                .collect(),
        }
    }

    /// Entry for a 1-based pose index, wrapping modulo the table length
    pub fn resolve(&self, pose_index: u32) -> &PoseDescription {
        let slot = (pose_index.max(1) - 1) as usize % self.poses.len();
        &self.poses[slot]
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

impl Default for PoseTable {
    fn default() -> Self {
        Self::photoshoot()
    }
}

impl<'de> Deserialize<'de> for PoseTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let poses = Vec::<PoseDescription>::deserialize(deserializer)?;
        PoseTable::new(poses)
            .ok_or_else(|| serde::de::Error::custom("pose table must contain at least one pose"))
    }
}
