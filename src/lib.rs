//! Finds near-duplicate and unreferenced image sets in Xcode asset catalogs.

pub mod core;

pub use crate::core::asset::{GroupMember, ImageAsset, SimilarityGroup, UsageStatus};
pub use crate::core::cache::FeatureCache;
pub use crate::core::config::{AnalysisConfig, ConfigError, SearchBackend};
pub use crate::core::features::{FeatureError, FeatureExtractor, FeatureVector, PerceptualExtractor};
pub use crate::core::report::AnalysisReport;
pub use crate::core::scanner::{CatalogScanner, ScanError};
pub use crate::core::search::{GrepSearcher, RegexSearcher, SearchError, SearchRequest, TextSearcher};
pub use crate::core::similarity::{ProgressCallback, SimilarityEngine, SimilarityError};
pub use crate::core::usage::{UsageAnalyzer, UsageError, UsageSummary};
pub use crate::core::verbosity::Verbosity;
