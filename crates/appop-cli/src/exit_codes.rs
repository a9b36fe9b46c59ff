//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - the App cannot be turned into managed resources
pub const VALIDATION_ERROR: i32 = 2;

/// Manifest error - an App or live-object file does not parse
pub const MANIFEST_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Cluster error - the Kubernetes API could not be reached or refused a call
pub const CLUSTER_ERROR: i32 = 6;

/// Diff found changes (used by `diff --exit-code`)
pub const DIFF_CHANGES: i32 = 10;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
