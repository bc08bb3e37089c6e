//! Conversions from each service's tag shape into [`TagSet`]

use tagsweep_common::TagSet;

pub fn from_ec2(tags: &[aws_sdk_ec2::types::Tag]) -> TagSet {
    TagSet::collect_from(tags, |t| t.key(), |t| t.value())
}

pub fn from_ecs(tags: &[aws_sdk_ecs::types::Tag]) -> TagSet {
    TagSet::collect_from(tags, |t| t.key(), |t| t.value())
}

/// IAM tags always carry both key and value
pub fn from_iam(tags: &[aws_sdk_iam::types::Tag]) -> TagSet {
    tags.iter().map(|t| (t.key(), t.value())).collect()
}

/// CloudWatch Logs returns tags as a plain map
pub fn from_logs(tags: Option<&std::collections::HashMap<String, String>>) -> TagSet {
    tags.into_iter()
        .flatten()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
