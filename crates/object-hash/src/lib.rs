//! Object fingerprints and drift detection.
//!
//! - [`hash`]: FNV-32a digests over the canonical serde projection of a value
//! - [`config`]: normalizers that turn pod fields into order-independent projections
//! - [`digest`]: DaemonSet fingerprint and the apply/skip decision

pub mod config;
pub mod digest;
pub mod hash;

pub use config::{
    EnvVar, VolumeConfig, VolumeMountConfig, extract_env_vars, extract_volume_mounts,
    extract_volumes, sort_env_vars,
};
pub use digest::{
    ApplyDecision, ContainerConfig, DaemonSetConfig, LAST_APPLIED_HASH_ANNOTATION,
    daemonset_fingerprint, decide, stamp_fingerprint,
};
pub use hash::{
    HashError, is_effectively_zero, object_hash, object_hash_ignore_empty_keys, string_hash,
};
