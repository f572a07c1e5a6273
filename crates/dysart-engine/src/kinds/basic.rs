use crate::kind::FeatureKind;

/// The kind every project can use: updating it records an empty snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseFeature;

impl FeatureKind for BaseFeature {
    fn name(&self) -> &str {
        "Feature"
    }
}
