use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

pub const IMAGE_SET_SUFFIX: &str = ".imageset";
pub const CATALOG_SUFFIX: &str = ".xcassets";

/// Result of usage analysis for a single asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    #[default]
    Unknown,
    Used,
    Unused,
}

/// One representative file of a discovered image set.
///
/// Identity is the file location: two assets with the same location compare
/// equal no matter what their other fields hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    location: PathBuf,
    /// Aggregate size of every file directly inside the image-set directory.
    pub image_set_byte_size: u64,
    pub usage_status: UsageStatus,
    pub is_marked_for_deletion: bool,
}

impl ImageAsset {
    pub fn new(location: impl Into<PathBuf>, image_set_byte_size: u64) -> Self {
        Self {
            location: location.into(),
            image_set_byte_size,
            usage_status: UsageStatus::Unknown,
            is_marked_for_deletion: false,
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Image-set name without its suffix, or the file stem outside an image set.
    pub fn display_name(&self) -> String {
        self.image_set_name().unwrap_or_else(|| {
            self.location
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    pub fn image_set_name(&self) -> Option<String> {
        let dir = image_set_directory(&self.location)?;
        let name = dir.file_name()?.to_string_lossy();
        let stripped = name.strip_suffix(IMAGE_SET_SUFFIX)?;
        (!stripped.is_empty()).then(|| stripped.to_string())
    }

    /// Path from the enclosing catalog down to the image set, e.g.
    /// `Assets.xcassets/Icons/Logo.imageset`. Falls back to the file name.
    pub fn relative_path(&self) -> String {
        let from_catalog = image_set_directory(&self.location).and_then(|image_set| {
            let catalog = image_set.ancestors().find(|dir| has_suffix(dir, CATALOG_SUFFIX))?;
            let base = catalog.parent().unwrap_or(Path::new(""));
            let fragment = image_set.strip_prefix(base).ok()?;
            Some(
                fragment
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            )
        });

        from_catalog.unwrap_or_else(|| self.file_name())
    }

    pub fn file_name(&self) -> String {
        self.location
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Size of the representative file alone. Savings math uses
    /// `image_set_byte_size` instead.
    pub fn file_size(&self) -> std::io::Result<u64> {
        fs::metadata(&self.location).map(|metadata| metadata.len())
    }

    /// Both assets must carry a non-empty image-set name for them to share one.
    pub fn is_in_same_image_set(&self, other: &ImageAsset) -> bool {
        match (self.image_set_name(), other.image_set_name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Alphanumeric-only form of the display name, the way asset symbol
    /// generators mangle names into identifiers. `None` when it would be empty
    /// or identical to the display name.
    pub fn resource_identifier(&self) -> Option<String> {
        let name = self.display_name();
        let sanitized: String = name.chars().filter(|c| c.is_alphanumeric()).collect();
        (!sanitized.is_empty() && sanitized != name).then_some(sanitized)
    }
}

impl PartialEq for ImageAsset {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for ImageAsset {}

impl Hash for ImageAsset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}

/// Nearest ancestor directory of `path` whose name ends in `.imageset`.
pub fn image_set_directory(path: &Path) -> Option<&Path> {
    path.ancestors()
        .skip(1)
        .find(|dir| has_suffix(dir, IMAGE_SET_SUFFIX))
}

fn has_suffix(dir: &Path, suffix: &str) -> bool {
    dir.file_name()
        .map(|name| name.to_string_lossy().ends_with(suffix))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub asset: ImageAsset,
    pub distance: f32,
}

/// A primary asset and the distinct image sets found close to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityGroup {
    primary: ImageAsset,
    members: Vec<GroupMember>,
}

impl SimilarityGroup {
    pub fn new(primary: ImageAsset, mut members: Vec<GroupMember>) -> Self {
        members.sort_by(|a, b| compare_distance(a.distance, b.distance));
        Self { primary, members }
    }

    pub fn primary(&self) -> &ImageAsset {
        &self.primary
    }

    /// Sorted ascending by distance to the primary.
    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }

    pub fn all_assets(&self) -> impl Iterator<Item = &ImageAsset> {
        std::iter::once(&self.primary).chain(self.members.iter().map(|m| &m.asset))
    }

    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    pub fn total_size(&self) -> u64 {
        self.all_assets().map(|a| a.image_set_byte_size).sum()
    }

    /// Bytes reclaimable from this group: everything when no asset is used,
    /// otherwise everything but the smallest image set, which is kept.
    pub fn potential_savings(&self) -> u64 {
        let total = self.total_size();
        if self
            .all_assets()
            .all(|a| a.usage_status == UsageStatus::Unused)
        {
            return total;
        }
        let smallest = self
            .all_assets()
            .map(|a| a.image_set_byte_size)
            .min()
            .unwrap_or(0);
        total - smallest
    }
}

impl PartialEq for SimilarityGroup {
    fn eq(&self, other: &Self) -> bool {
        self.primary == other.primary
    }
}

impl Eq for SimilarityGroup {}

fn compare_distance(a: f32, b: f32) -> Ordering {
    a.total_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(path: &str, size: u64, status: UsageStatus) -> ImageAsset {
        let mut asset = ImageAsset::new(path, size);
        asset.usage_status = status;
        asset
    }

    #[test]
    fn test_names_inside_image_set() {
        let asset = ImageAsset::new(
            "/proj/App/Assets.xcassets/Icons/Logo.imageset/logo@2x.png",
            10,
        );
        assert_eq!(asset.image_set_name().as_deref(), Some("Logo"));
        assert_eq!(asset.display_name(), "Logo");
        assert_eq!(asset.relative_path(), "Assets.xcassets/Icons/Logo.imageset");
        assert_eq!(asset.file_name(), "logo@2x.png");
    }

    #[test]
    fn test_names_outside_image_set() {
        let asset = ImageAsset::new("/proj/Resources/banner.png", 10);
        assert_eq!(asset.image_set_name(), None);
        assert_eq!(asset.display_name(), "banner");
        assert_eq!(asset.relative_path(), "banner.png");
    }

    #[test]
    fn test_relative_path_without_catalog_falls_back_to_file_name() {
        let asset = ImageAsset::new("/loose/Logo.imageset/logo.png", 10);
        assert_eq!(asset.display_name(), "Logo");
        assert_eq!(asset.relative_path(), "logo.png");
    }

    #[test]
    fn test_equality_is_by_location() {
        let a = asset("/x/A.imageset/a.png", 10, UsageStatus::Used);
        let b = asset("/x/A.imageset/a.png", 99, UsageStatus::Unused);
        let c = asset("/x/A.imageset/a@2x.png", 10, UsageStatus::Used);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_same_image_set_requires_names() {
        let a1 = ImageAsset::new("/x/Cat.xcassets/A.imageset/a.png", 1);
        let a2 = ImageAsset::new("/y/Other.xcassets/A.imageset/a@3x.png", 1);
        let b = ImageAsset::new("/x/Cat.xcassets/B.imageset/b.png", 1);
        let loose1 = ImageAsset::new("/x/loose.png", 1);
        let loose2 = ImageAsset::new("/x/other.png", 1);

        assert!(a1.is_in_same_image_set(&a2));
        assert!(!a1.is_in_same_image_set(&b));
        assert!(!loose1.is_in_same_image_set(&loose2));
        assert!(!a1.is_in_same_image_set(&loose1));
    }

    #[test]
    fn test_resource_identifier() {
        let mangled = ImageAsset::new("/c/My-Icon!!.imageset/i.png", 1);
        assert_eq!(mangled.resource_identifier().as_deref(), Some("MyIcon"));

        let plain = ImageAsset::new("/c/Logo.imageset/l.png", 1);
        assert_eq!(plain.resource_identifier(), None);

        let symbols = ImageAsset::new("/c/--.imageset/l.png", 1);
        assert_eq!(symbols.resource_identifier(), None);

        let accented = ImageAsset::new("/c/Café Icon.imageset/l.png", 1);
        assert_eq!(accented.resource_identifier().as_deref(), Some("CaféIcon"));
    }

    #[test]
    fn test_members_sorted_by_distance() {
        let group = SimilarityGroup::new(
            ImageAsset::new("/c/A.imageset/a.png", 1),
            vec![
                GroupMember { asset: ImageAsset::new("/c/B.imageset/b.png", 1), distance: 0.4 },
                GroupMember { asset: ImageAsset::new("/c/C.imageset/c.png", 1), distance: 0.1 },
                GroupMember { asset: ImageAsset::new("/c/D.imageset/d.png", 1), distance: 0.2 },
            ],
        );
        let distances: Vec<f32> = group.members().iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![0.1, 0.2, 0.4]);

        let names: Vec<String> = group.all_assets().map(|a| a.display_name()).collect();
        assert_eq!(names, vec!["A", "C", "D", "B"]);
        assert_eq!(group.len(), 4);
    }

    #[test]
    fn test_potential_savings_all_unused() {
        let group = SimilarityGroup::new(
            asset("/c/A.imageset/a.png", 100, UsageStatus::Unused),
            vec![GroupMember {
                asset: asset("/c/B.imageset/b.png", 40, UsageStatus::Unused),
                distance: 0.0,
            }],
        );
        assert_eq!(group.total_size(), 140);
        assert_eq!(group.potential_savings(), 140);
    }

    #[test]
    fn test_potential_savings_keeps_smallest() {
        let group = SimilarityGroup::new(
            asset("/c/A.imageset/a.png", 100, UsageStatus::Used),
            vec![
                GroupMember {
                    asset: asset("/c/B.imageset/b.png", 40, UsageStatus::Unused),
                    distance: 0.2,
                },
                GroupMember {
                    asset: asset("/c/C.imageset/c.png", 60, UsageStatus::Unknown),
                    distance: 0.1,
                },
            ],
        );
        assert_eq!(group.total_size(), 200);
        assert_eq!(group.potential_savings(), 160);
    }

    #[test]
    fn test_unknown_status_is_not_unused() {
        let group = SimilarityGroup::new(
            asset("/c/A.imageset/a.png", 10, UsageStatus::Unknown),
            vec![GroupMember {
                asset: asset("/c/B.imageset/b.png", 30, UsageStatus::Unknown),
                distance: 0.0,
            }],
        );
        assert_eq!(group.potential_savings(), 30);
    }

    #[test]
    fn test_group_identity_is_primary() {
        let primary = ImageAsset::new("/c/A.imageset/a.png", 1);
        let g1 = SimilarityGroup::new(primary.clone(), vec![]);
        let g2 = SimilarityGroup::new(
            primary,
            vec![GroupMember { asset: ImageAsset::new("/c/B.imageset/b.png", 1), distance: 0.0 }],
        );
        assert_eq!(g1, g2);
    }
}
