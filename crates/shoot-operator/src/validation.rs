use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::shootcluster::ShootClusterSpec;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid {field}: {reason}")]
    InvalidName { field: &'static str, reason: String },

    #[error("Invalid node bounds: minNodes={min}, maxNodes={max}")]
    InvalidNodeBounds { min: i32, max: i32 },

    #[error("Invalid diskSize: {0} (must be at least 1)")]
    InvalidDiskSize(i32),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// DNS-1123 label: lowercase alphanumeric and hyphens, 1-63 chars, no leading/trailing hyphen
static LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

/// Validates a DNS-1123 label used as a resource name
pub fn validate_label(field: &'static str, value: &str) -> ValidationResult<()> {
    if value.is_empty() {
        return Err(ValidationError::InvalidName {
            field,
            reason: "cannot be empty".to_string(),
        });
    }

    if !LABEL_REGEX.is_match(value) {
        return Err(ValidationError::InvalidName {
            field,
            reason: format!("'{}' is not a valid DNS-1123 label", value),
        });
    }

    Ok(())
}

/// Validates a ShootCluster spec before anything is sent to the backend
/// Rules:
/// - shootName and gardenerNamespace are DNS-1123 labels
/// - minNodes >= 1 and maxNodes >= minNodes
/// - diskSize >= 1
pub fn validate_spec(spec: &ShootClusterSpec) -> ValidationResult<()> {
    validate_label("shootName", &spec.shoot_name)?;
    validate_label("gardenerNamespace", &spec.gardener_namespace)?;

    if spec.min_nodes < 1 || spec.max_nodes < spec.min_nodes {
        return Err(ValidationError::InvalidNodeBounds {
            min: spec.min_nodes,
            max: spec.max_nodes,
        });
    }

    if spec.disk_size < 1 {
        return Err(ValidationError::InvalidDiskSize(spec.disk_size));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(min: i32, max: i32, disk: i32) -> ShootClusterSpec {
        ShootClusterSpec {
            shoot_name: "build-42".to_string(),
            gardener_namespace: "garden-ci".to_string(),
            min_nodes: min,
            max_nodes: max,
            disk_size: disk,
        }
    }

    #[test]
    fn test_valid_labels() {
        assert!(validate_label("shootName", "a").is_ok());
        assert!(validate_label("shootName", "build-42").is_ok());
        assert!(validate_label("shootName", &"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_labels() {
        assert!(validate_label("shootName", "").is_err());
        assert!(validate_label("shootName", "-build").is_err());
        assert!(validate_label("shootName", "build-").is_err());
        assert!(validate_label("shootName", "Build").is_err());
        assert!(validate_label("shootName", "build.42").is_err());
        assert!(validate_label("shootName", &"a".repeat(64)).is_err());
    }

    #[test]
    fn test_valid_spec() {
        assert!(validate_spec(&spec(1, 1, 1)).is_ok());
        assert!(validate_spec(&spec(2, 8, 100)).is_ok());
    }

    #[test]
    fn test_node_bounds() {
        assert_eq!(
            validate_spec(&spec(0, 3, 50)),
            Err(ValidationError::InvalidNodeBounds { min: 0, max: 3 })
        );
        assert_eq!(
            validate_spec(&spec(5, 3, 50)),
            Err(ValidationError::InvalidNodeBounds { min: 5, max: 3 })
        );
    }

    #[test]
    fn test_disk_size() {
        assert_eq!(
            validate_spec(&spec(1, 3, 0)),
            Err(ValidationError::InvalidDiskSize(0))
        );
    }

    #[test]
    fn test_error_names_field() {
        let mut s = spec(1, 3, 50);
        s.gardener_namespace = "Garden_CI".to_string();
        let err = validate_spec(&s).unwrap_err();
        assert!(err.to_string().contains("gardenerNamespace"));
    }
}
