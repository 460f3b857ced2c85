//! Identifier and version-token generation.

use chrono::Local;
use rand::Rng;

use crate::types::{ContainerGroupId, ContainerId};

/// Generate a group id: `job_<yyyymmdd_hhmmss>_<rand>_<name-prefix>`.
///
/// The name prefix keeps only alphanumerics (everything else becomes `_`)
/// and is truncated to 16 characters.
pub fn generate_group_id(name: &str) -> ContainerGroupId {
    let mut suffix = String::new();
    for c in name.chars() {
        suffix.push(if c.is_ascii_alphanumeric() { c } else { '_' });
        if suffix.len() >= 16 {
            break;
        }
    }
    format!(
        "job_{}_{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        rand::rng().random_range(0..1000),
        suffix
    )
}

/// Container id of the replica at `offset` within a group.
pub fn container_id(group_id: &str, offset: i32) -> ContainerId {
    format!("{group_id}.pod_{offset}")
}

/// Recover the group id from a container id (everything before the last
/// `.`).
pub fn group_id_of(container_id: &str) -> ContainerGroupId {
    match container_id.rsplit_once('.') {
        Some((group, _)) => group.to_string(),
        None => container_id.to_string(),
    }
}

/// Mint a version token: `ver_<yyyymmdd_hh:mm:ss>_<rand>`.
pub fn new_version_token() -> String {
    format!(
        "ver_{}_{}",
        Local::now().format("%Y%m%d_%H:%M:%S"),
        rand::rng().random_range(0..u32::MAX)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_sanitizes_and_truncates_name() {
        let id = generate_group_id("my-service.with.long.name.tail");
        assert!(id.starts_with("job_"));
        // Non-alphanumerics become underscores; the prefix stops at 16.
        assert!(id.ends_with("my_service_with_"));
    }

    #[test]
    fn container_id_embeds_offset() {
        assert_eq!(container_id("job_x", 3), "job_x.pod_3");
    }

    #[test]
    fn group_id_recovered_from_container_id() {
        assert_eq!(group_id_of("job_x.pod_3"), "job_x");
        assert_eq!(group_id_of("job_20240101_120000_7_svc.pod_0"), "job_20240101_120000_7_svc");
    }

    #[test]
    fn version_token_has_prefix() {
        let v = new_version_token();
        assert!(v.starts_with("ver_"));
    }

    #[test]
    fn version_tokens_are_distinct() {
        assert_ne!(new_version_token(), new_version_token());
    }
}
