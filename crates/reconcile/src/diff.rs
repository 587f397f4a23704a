//! Attribute-level diff between a desired spec and its tracked record

use crate::types::{ResourceRecord, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One difference between desired and last-applied values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeChange {
    /// Attribute present in the spec but never applied
    Added { key: String, value: String },
    /// Attribute applied before but gone from the spec
    Removed { key: String, old: String },
    /// Attribute value differs
    Changed {
        key: String,
        from: String,
        to: String,
    },
    /// Region differs from the one last applied
    Region { from: String, to: String },
}

impl fmt::Display for AttributeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added { key, value } => write!(f, "+ {key} = {value}"),
            Self::Removed { key, old } => write!(f, "- {key} = {old}"),
            Self::Changed { key, from, to } => write!(f, "~ {key}: {from} -> {to}"),
            Self::Region { from, to } => write!(f, "~ region: {from} -> {to}"),
        }
    }
}

/// Compare a spec with the values last applied for its record.
///
/// A record without a stored region (written before regions were tracked)
/// never reports a region change.
pub fn attribute_changes(spec: &ResourceSpec, record: &ResourceRecord) -> Vec<AttributeChange> {
    let mut changes = Vec::new();

    if let Some(applied) = &record.region
        && applied != &spec.region
    {
        changes.push(AttributeChange::Region {
            from: applied.clone(),
            to: spec.region.clone(),
        });
    }

    for (key, value) in &spec.attributes {
        match record.attributes.get(key) {
            None => changes.push(AttributeChange::Added {
                key: key.clone(),
                value: value.clone(),
            }),
            Some(old) if old != value => changes.push(AttributeChange::Changed {
                key: key.clone(),
                from: old.clone(),
                to: value.clone(),
            }),
            Some(_) => {}
        }
    }

    for (key, old) in &record.attributes {
        if !spec.attributes.contains_key(key) {
            changes.push(AttributeChange::Removed {
                key: key.clone(),
                old: old.clone(),
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;

    fn web(instance_type: &str) -> ResourceSpec {
        ResourceSpec::new(ResourceKind::ComputeInstance, "web", "us-east-1")
            .with_attribute("ami", "ami-123")
            .with_attribute("instance_type", instance_type)
    }

    #[test]
    fn test_identical_has_no_changes() {
        let record = ResourceRecord::from_spec(&web("t3.micro"), "i-1");
        assert!(attribute_changes(&web("t3.micro"), &record).is_empty());
    }

    #[test]
    fn test_changed_attribute() {
        let record = ResourceRecord::from_spec(&web("t3.micro"), "i-1");
        let changes = attribute_changes(&web("t3.large"), &record);
        assert_eq!(
            changes,
            vec![AttributeChange::Changed {
                key: "instance_type".into(),
                from: "t3.micro".into(),
                to: "t3.large".into(),
            }]
        );
        assert_eq!(changes[0].to_string(), "~ instance_type: t3.micro -> t3.large");
    }

    #[test]
    fn test_added_and_removed() {
        let record = ResourceRecord::from_spec(&web("t3.micro"), "i-1");
        let mut spec = web("t3.micro").with_attribute("monitoring", "true");
        spec.attributes.remove("ami");

        let changes = attribute_changes(&spec, &record);
        assert!(changes.contains(&AttributeChange::Added {
            key: "monitoring".into(),
            value: "true".into(),
        }));
        assert!(changes.contains(&AttributeChange::Removed {
            key: "ami".into(),
            old: "ami-123".into(),
        }));
    }

    #[test]
    fn test_region_change() {
        let record = ResourceRecord::from_spec(&web("t3.micro"), "i-1");
        let mut spec = web("t3.micro");
        spec.region = "eu-west-1".into();

        assert_eq!(
            attribute_changes(&spec, &record),
            vec![AttributeChange::Region {
                from: "us-east-1".into(),
                to: "eu-west-1".into(),
            }]
        );
    }

    #[test]
    fn test_legacy_record_without_region() {
        let mut record = ResourceRecord::from_spec(&web("t3.micro"), "i-1");
        record.region = None;
        assert!(attribute_changes(&web("t3.micro"), &record).is_empty());
    }
}
