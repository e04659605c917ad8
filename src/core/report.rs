use crate::core::asset::{ImageAsset, SimilarityGroup, UsageStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct AssetEntry {
    pub location: PathBuf,
    pub display_name: String,
    pub relative_path: String,
    pub image_set_byte_size: u64,
    pub usage_status: UsageStatus,
}

impl From<&ImageAsset> for AssetEntry {
    fn from(asset: &ImageAsset) -> Self {
        Self {
            location: asset.location().to_path_buf(),
            display_name: asset.display_name(),
            relative_path: asset.relative_path(),
            image_set_byte_size: asset.image_set_byte_size,
            usage_status: asset.usage_status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberEntry {
    #[serde(flatten)]
    pub asset: AssetEntry,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEntry {
    pub primary: AssetEntry,
    pub members: Vec<MemberEntry>,
    pub total_size: u64,
    pub potential_savings: u64,
}

impl From<&SimilarityGroup> for GroupEntry {
    fn from(group: &SimilarityGroup) -> Self {
        Self {
            primary: AssetEntry::from(group.primary()),
            members: group
                .members()
                .iter()
                .map(|member| MemberEntry {
                    asset: AssetEntry::from(&member.asset),
                    distance: member.distance,
                })
                .collect(),
            total_size: group.total_size(),
            potential_savings: group.potential_savings(),
        }
    }
}

/// Machine-readable summary of one analysis run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub catalog_root: PathBuf,
    pub project_root: Option<PathBuf>,
    pub groups: Vec<GroupEntry>,
    pub unused: Vec<AssetEntry>,
    pub total_potential_savings: u64,
}

impl AnalysisReport {
    pub fn new(
        catalog_root: &Path,
        project_root: Option<&Path>,
        groups: &[SimilarityGroup],
        assets: &[ImageAsset],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            catalog_root: catalog_root.to_path_buf(),
            project_root: project_root.map(Path::to_path_buf),
            groups: groups.iter().map(GroupEntry::from).collect(),
            unused: assets
                .iter()
                .filter(|a| a.usage_status == UsageStatus::Unused)
                .map(AssetEntry::from)
                .collect(),
            total_potential_savings: groups.iter().map(SimilarityGroup::potential_savings).sum(),
        }
    }
}
