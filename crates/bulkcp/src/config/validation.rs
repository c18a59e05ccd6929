//! Configuration validation.

use super::CopySessionConfig;
use crate::error::{CopyError, Result};

/// Validate the session configuration.
///
/// Rejects every contradictory flag pair before any task executes. The
/// all-versions/parallel exclusion in particular is enforced here because
/// concurrent workers could otherwise interleave version-sensitive
/// operations and break generation ordering.
pub fn validate(config: &CopySessionConfig) -> Result<()> {
    if config.workers == 0 {
        return Err(CopyError::Config("workers must be at least 1".into()));
    }

    if config.preserve_acl && config.canned_acl.is_some() {
        return Err(CopyError::Config(
            "specifying both preserve-acl and a canned ACL is invalid".into(),
        ));
    }

    if config.all_versions && config.parallel() {
        return Err(CopyError::Config(
            "parallel execution is not supported with all-versions, to ensure \
             that object version ordering is preserved"
                .into(),
        ));
    }

    let wire = config.gzip_wire_all || config.gzip_wire_exts.is_some();
    let local = config.gzip_local_all || config.gzip_local_exts.is_some();
    if wire && local {
        return Err(CopyError::Config(
            "specifying both wire-gzip and local-gzip is invalid".into(),
        ));
    }
    if config.gzip_wire_all && config.gzip_wire_exts.is_some() {
        return Err(CopyError::Config(
            "specifying both a wire-gzip extension list and wire-gzip for all files is invalid"
                .into(),
        ));
    }
    if config.gzip_local_all && config.gzip_local_exts.is_some() {
        return Err(CopyError::Config(
            "specifying both a local-gzip extension list and local-gzip for all files is invalid"
                .into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&CopySessionConfig::default()).is_ok());
    }

    #[test]
    fn test_preserve_acl_conflicts_with_canned_acl() {
        let config = CopySessionConfig {
            preserve_acl: true,
            canned_acl: Some("public-read".into()),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_all_versions_conflicts_with_parallel() {
        let config = CopySessionConfig {
            all_versions: true,
            workers: 4,
            ..Default::default()
        };
        assert!(validate(&config).is_err());

        let sequential = CopySessionConfig {
            all_versions: true,
            workers: 1,
            ..Default::default()
        };
        assert!(validate(&sequential).is_ok());
    }

    #[test]
    fn test_wire_gzip_conflicts_with_local_gzip() {
        let config = CopySessionConfig {
            gzip_wire_exts: Some(vec!["html".into()]),
            gzip_local_all: true,
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_gzip_ext_list_conflicts_with_all_files_in_one_mode() {
        let wire = CopySessionConfig {
            gzip_wire_exts: Some(vec!["html".into()]),
            gzip_wire_all: true,
            ..Default::default()
        };
        assert!(validate(&wire).is_err());

        let local = CopySessionConfig {
            gzip_local_exts: Some(vec!["css".into()]),
            gzip_local_all: true,
            ..Default::default()
        };
        assert!(validate(&local).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = CopySessionConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }
}
