//! On-disk shape of the virtual flash.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gscx_shared::errors::GscxError;

/// Partition directories, in mount order.
pub const PARTITIONS: &[&str] = &["dev_flash", "dev_flash2", "dev_flash3"];

pub mod dirs {
    pub const BOOTLOADER: &str = "bootloader";
    pub const REGISTRY: &str = "registry";
}

/// Placeholder files seeded on initialization.
pub mod files {
    pub const VERSION: &str = "version.txt";
    pub const VERSION_CONTENT: &[u8] = b"GSCX PS3 Bootloader (virtual)\n";

    pub const LV0: &str = "lv0.self";
    pub const APPLDR: &str = "appldr.self";
    pub const SELF_STUB: &[u8] = b"stub";

    pub const REGISTRY: &str = "xRegistry.sys";
    pub const REGISTRY_SIZE: usize = 1024;
}

/// Redundant boot-slot storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosSlot {
    Ros0,
    Ros1,
}

impl RosSlot {
    pub const ALL: [RosSlot; 2] = [RosSlot::Ros0, RosSlot::Ros1];

    /// Directory name under the flash base path.
    pub fn dir_name(self) -> &'static str {
        match self {
            RosSlot::Ros0 => "ros0",
            RosSlot::Ros1 => "ros1",
        }
    }

    pub fn other(self) -> RosSlot {
        match self {
            RosSlot::Ros0 => RosSlot::Ros1,
            RosSlot::Ros1 => RosSlot::Ros0,
        }
    }

    /// Selection order: `preferred` first, then the other slot.
    pub fn candidates(preferred: Option<RosSlot>) -> [RosSlot; 2] {
        match preferred {
            Some(slot) => [slot, slot.other()],
            None => Self::ALL,
        }
    }
}

impl fmt::Display for RosSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosSlot::Ros0 => write!(f, "ROS0"),
            RosSlot::Ros1 => write!(f, "ROS1"),
        }
    }
}

impl FromStr for RosSlot {
    type Err = GscxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ros0" => Ok(RosSlot::Ros0),
            "ros1" => Ok(RosSlot::Ros1),
            other => Err(GscxError::Config(format!("unknown ROS slot: {}", other))),
        }
    }
}

/// Cached description of an initialized flash.
///
/// Every partition and ROS slot maps to one subdirectory of `base_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualFlashLayout {
    base_path: PathBuf,
    partitions: Vec<String>,
    ros_slots: Vec<RosSlot>,
    active_ros: Option<RosSlot>,
}

impl VirtualFlashLayout {
    pub(crate) fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            partitions: PARTITIONS.iter().map(|p| p.to_string()).collect(),
            ros_slots: RosSlot::ALL.to_vec(),
            active_ros: None,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    pub fn ros_slots(&self) -> &[RosSlot] {
        &self.ros_slots
    }

    pub fn active_ros(&self) -> Option<RosSlot> {
        self.active_ros
    }

    pub(crate) fn set_active_ros(&mut self, slot: Option<RosSlot>) {
        self.active_ros = slot;
    }

    pub fn partition_dir(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    pub fn ros_dir(&self, slot: RosSlot) -> PathBuf {
        self.base_path.join(slot.dir_name())
    }

    pub fn bootloader_dir(&self) -> PathBuf {
        self.base_path.join(dirs::BOOTLOADER)
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.base_path.join(dirs::REGISTRY)
    }

    /// Every directory the layout owns directly under `base_path`.
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        self.partitions
            .iter()
            .map(|p| self.partition_dir(p))
            .chain(self.ros_slots.iter().map(|s| self.ros_dir(*s)))
            .chain([self.bootloader_dir(), self.registry_dir()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_follow_preference() {
        assert_eq!(RosSlot::candidates(None), [RosSlot::Ros0, RosSlot::Ros1]);
        assert_eq!(
            RosSlot::candidates(Some(RosSlot::Ros1)),
            [RosSlot::Ros1, RosSlot::Ros0]
        );
    }

    #[test]
    fn test_slot_parse_and_display() {
        assert_eq!("ROS1".parse::<RosSlot>().unwrap(), RosSlot::Ros1);
        assert_eq!("ros0".parse::<RosSlot>().unwrap(), RosSlot::Ros0);
        assert!("ros2".parse::<RosSlot>().is_err());
        assert_eq!(RosSlot::Ros0.to_string(), "ROS0");
        assert_eq!(serde_json::to_string(&RosSlot::Ros1).unwrap(), "\"ros1\"");
    }

    #[test]
    fn test_layout_dirs() {
        let layout = VirtualFlashLayout::new(PathBuf::from("/vf"));
        let dirs = layout.all_dirs();
        assert_eq!(dirs.len(), 7);
        assert!(dirs.contains(&PathBuf::from("/vf/dev_flash2")));
        assert!(dirs.contains(&PathBuf::from("/vf/ros1")));
        assert!(dirs.contains(&PathBuf::from("/vf/registry")));
    }
}
