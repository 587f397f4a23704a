//! # Manifest
//!
//! Desired-state documents: the list of resources a user wants to exist.
//!
//! A manifest is a YAML, TOML or JSON document with a `resources` list.
//! Each entry names a `type`, a `name` and a `region`; every other key is a
//! kind-specific attribute.
//!
//! ```yaml
//! resources:
//!   - type: aws_s3_bucket
//!     name: my-bucket
//!     region: us-east-1
//!   - type: aws_ec2_instance
//!     name: web
//!     region: us-east-1
//!     ami: ami-0c02fb55956c7d316
//!     instance_type: t3.micro
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let desired = manifest::load(Path::new("main.yaml"))?;
//! for spec in &desired {
//!     println!("{} {}", spec.kind, spec.name);
//! }
//! # Ok::<(), manifest::ConfigError>(())
//! ```
//!
//! Unknown resource types parse fine; whether a type is supported is decided
//! per resource at reconcile time.

mod error;
mod types;

pub use error::{ConfigError, Result};
pub use types::Format;

use reconcile::{ResourceKind, ResourceSpec};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

/// Keys that are not attributes
const TYPE_KEY: &str = "type";
const NAME_KEY: &str = "name";
const REGION_KEY: &str = "region";

static BUCKET_NAME: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$"));

/// Load and validate a manifest file
///
/// The format is chosen from the file extension.
pub fn load(path: &Path) -> Result<Vec<ResourceSpec>> {
    let format =
        Format::from_path(path).ok_or_else(|| ConfigError::UnknownFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let specs = parse_str(&content, format)?;
    log::debug!("Loaded {} resources from {}", specs.len(), path.display());
    Ok(specs)
}

/// Parse and validate a manifest held in memory
pub fn parse_str(content: &str, format: Format) -> Result<Vec<ResourceSpec>> {
    let document = parse_document(content, format)?;
    let specs = specs_from_document(document)?;
    validate(&specs)?;
    Ok(specs)
}

/// Check cross-entry and kind-specific rules
///
/// Exposed for callers that build specs programmatically.
pub fn validate(specs: &[ResourceSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(ConfigError::DuplicateName(spec.name.clone()));
        }

        match spec.kind {
            ResourceKind::ComputeInstance => {
                if is_blank(spec.image_id()) {
                    return Err(missing_attribute(spec, ResourceSpec::IMAGE_ID));
                }
                if is_blank(spec.instance_type()) {
                    return Err(missing_attribute(spec, ResourceSpec::INSTANCE_TYPE));
                }
            }
            ResourceKind::StorageBucket => {
                if !is_valid_bucket_name(&spec.name) {
                    return Err(ConfigError::InvalidBucketName(spec.name.clone()));
                }
            }
            ResourceKind::Other(_) => {}
        }
    }
    Ok(())
}

/// Absent or whitespace-only counts as missing, as for `type`/`name`/`region`
fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn missing_attribute(spec: &ResourceSpec, attribute: &'static str) -> ConfigError {
    ConfigError::MissingAttribute {
        kind: spec.kind.to_string(),
        name: spec.name.clone(),
        attribute,
    }
}

/// Whether a storage provider would accept `name` as a bucket name
pub fn is_valid_bucket_name(name: &str) -> bool {
    match &*BUCKET_NAME {
        Ok(re) => re.is_match(name) && !name.contains(".."),
        Err(e) => {
            log::error!("Bucket name pattern failed to compile: {e}");
            false
        }
    }
}

fn parse_document(content: &str, format: Format) -> Result<Value> {
    let syntax = |message: String| ConfigError::Syntax { format, message };
    match format {
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| syntax(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| syntax(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| syntax(e.to_string())),
    }
}

fn specs_from_document(document: Value) -> Result<Vec<ResourceSpec>> {
    let entries = match document {
        Value::Object(mut root) => match root.remove("resources") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(ConfigError::MissingResources),
        },
        _ => return Err(ConfigError::MissingResources),
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| match entry {
            Value::Object(fields) => spec_from_entry(index, fields),
            other => Err(ConfigError::InvalidEntry {
                index,
                reason: format!("expected a mapping, found {}", value_kind(&other)),
            }),
        })
        .collect()
}

fn spec_from_entry(index: usize, mut fields: Map<String, Value>) -> Result<ResourceSpec> {
    let mut required = |field: &'static str| -> Result<String> {
        match fields.remove(field) {
            Some(value) => match scalar(value) {
                Some(text) if !text.trim().is_empty() => Ok(text),
                Some(_) | None => Err(ConfigError::MissingField { index, field }),
            },
            None => Err(ConfigError::MissingField { index, field }),
        }
    };

    let kind = ResourceKind::parse(&required(TYPE_KEY)?);
    let name = required(NAME_KEY)?;
    let region = required(REGION_KEY)?;

    let mut attributes = BTreeMap::new();
    for (key, value) in fields {
        if value.is_null() {
            continue;
        }
        let kind_of = value_kind(&value);
        let text = scalar(value).ok_or_else(|| ConfigError::InvalidEntry {
            index,
            reason: format!("attribute `{key}` must be a scalar, found {kind_of}"),
        })?;
        attributes.insert(key, text);
    }

    Ok(ResourceSpec {
        kind,
        name,
        region,
        attributes,
    })
}

/// Stringify a scalar value; `None` for nulls and nested values
fn scalar(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const YAML: &str = r"
resources:
  - type: aws_s3_bucket
    name: my-bucket
    region: us-east-1
  - type: aws_ec2_instance
    name: web
    region: eu-west-1
    ami: ami-0c02fb55956c7d316
    instance_type: t3.micro
";

    #[test]
    fn test_parse_yaml() {
        let specs = parse_str(YAML, Format::Yaml).unwrap();
        assert_eq!(specs.len(), 2);

        assert_eq!(specs[0].kind, ResourceKind::StorageBucket);
        assert_eq!(specs[0].name, "my-bucket");
        assert!(specs[0].attributes.is_empty());

        assert_eq!(specs[1].kind, ResourceKind::ComputeInstance);
        assert_eq!(specs[1].region, "eu-west-1");
        assert_eq!(specs[1].image_id(), Some("ami-0c02fb55956c7d316"));
        assert_eq!(specs[1].instance_type(), Some("t3.micro"));
    }

    #[test]
    fn test_formats_agree() {
        let toml = r#"
[[resources]]
type = "aws_s3_bucket"
name = "my-bucket"
region = "us-east-1"

[[resources]]
type = "aws_ec2_instance"
name = "web"
region = "eu-west-1"
ami = "ami-0c02fb55956c7d316"
instance_type = "t3.micro"
"#;
        let json = r#"{"resources": [
            {"type": "aws_s3_bucket", "name": "my-bucket", "region": "us-east-1"},
            {"type": "aws_ec2_instance", "name": "web", "region": "eu-west-1",
             "ami": "ami-0c02fb55956c7d316", "instance_type": "t3.micro"}
        ]}"#;

        let from_yaml = parse_str(YAML, Format::Yaml).unwrap();
        assert_eq!(parse_str(toml, Format::Toml).unwrap(), from_yaml);
        assert_eq!(parse_str(json, Format::Json).unwrap(), from_yaml);
    }

    #[test]
    fn test_scalars_are_stringified() {
        let yaml = r"
resources:
  - type: custom_thing
    name: t
    region: us-east-1
    replicas: 3
    public: false
    note:
";
        let specs = parse_str(yaml, Format::Yaml).unwrap();
        assert_eq!(specs[0].attribute("replicas"), Some("3"));
        assert_eq!(specs[0].attribute("public"), Some("false"));
        assert_eq!(specs[0].attribute("note"), None);
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let yaml = "resources:\n  - {type: gcp_bucket, name: g, region: us-central1}\n";
        let specs = parse_str(yaml, Format::Yaml).unwrap();
        assert_eq!(specs[0].kind, ResourceKind::Other("gcp_bucket".into()));
    }

    #[test]
    fn test_missing_resources() {
        let err = parse_str("name: nothing\n", Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingResources));

        let err = parse_str("resources: 3\n", Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingResources));
    }

    #[test]
    fn test_malformed_document() {
        let err = parse_str("resources: [", Format::Yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Syntax {
                format: Format::Yaml,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let yaml = "resources:\n  - {type: aws_s3_bucket, name: my-bucket}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingField {
                index: 0,
                field: "region"
            }
        ));

        let yaml = "resources:\n  - {type: aws_s3_bucket, name: '  ', region: us-east-1}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "name", .. }));
    }

    #[test]
    fn test_nested_attribute_rejected() {
        let yaml = r"
resources:
  - type: aws_ec2_instance
    name: web
    region: us-east-1
    ami: ami-1
    instance_type: t3.micro
    tags:
      env: prod
";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(err.to_string().contains("`tags` must be a scalar"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r"
resources:
  - {type: aws_s3_bucket, name: logs, region: us-east-1}
  - {type: aws_s3_bucket, name: logs, region: eu-west-1}
";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(ref n) if n == "logs"));
    }

    #[test]
    fn test_instance_requires_image_and_type() {
        let yaml = "resources:\n  - {type: aws_ec2_instance, name: web, region: us-east-1, instance_type: t3.micro}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAttribute { attribute: "ami", .. }));

        let yaml = "resources:\n  - {type: aws_ec2_instance, name: web, region: us-east-1, ami: ami-1}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingAttribute {
                attribute: "instance_type",
                ..
            }
        ));
    }

    #[test]
    fn test_blank_instance_attributes_are_missing() {
        let yaml = "resources:\n  - {type: aws_ec2_instance, name: web, region: us-east-1, ami: '', instance_type: ''}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAttribute { attribute: "ami", .. }));

        let yaml = "resources:\n  - {type: aws_ec2_instance, name: web, region: us-east-1, ami: ami-1, instance_type: '  '}\n";
        let err = parse_str(yaml, Format::Yaml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingAttribute {
                attribute: "instance_type",
                ..
            }
        ));
    }

    #[test]
    fn test_bucket_names() {
        for good in ["abc", "my-bucket", "logs.example.com", "a1b2c3"] {
            assert!(is_valid_bucket_name(good), "{good} should be valid");
        }
        for bad in ["ab", "My-Bucket", "-lead", "trail-", "a..b", "under_score"] {
            assert!(!is_valid_bucket_name(bad), "{bad} should be invalid");
        }
        assert!(!is_valid_bucket_name(&"a".repeat(64)));

        let yaml = "resources:\n  - {type: aws_s3_bucket, name: Bad_Name, region: us-east-1}\n";
        assert!(matches!(
            parse_str(yaml, Format::Yaml).unwrap_err(),
            ConfigError::InvalidBucketName(_)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("main.yml");
        fs::write(&path, YAML).unwrap();

        let specs = load(&path).unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn test_load_errors() {
        let temp = TempDir::new().unwrap();

        let err = load(&temp.path().join("main.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let ini = temp.path().join("main.ini");
        fs::write(&ini, "").unwrap();
        assert!(matches!(load(&ini).unwrap_err(), ConfigError::UnknownFormat(_)));
    }
}
