//! Where fetch failures go.
//!
//! Every fetch in the engine has a role, and the role alone decides whether a
//! failure reaches the caller:
//!
//! | Role | On failure |
//! |------|------------|
//! | [`FetchRole::Root`] | surfaced; the cycle aborts and the previous view stays |
//! | [`FetchRole::Subfolder`] | swallowed; that branch is dropped, siblings continue |
//! | [`FetchRole::Prefetch`] | swallowed; prefetch is best-effort |
//!
//! Call sites pass their result through [`settle`] instead of matching on
//! errors themselves. Nothing is retried.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRole {
    /// The current folder's manifest.
    Root,
    /// A descendant folder's manifest during recursive aggregation.
    Subfolder,
    /// A hover warm-up request for a full-size image.
    Prefetch,
}

impl FetchRole {
    pub fn surfaces_errors(self) -> bool {
        matches!(self, FetchRole::Root)
    }
}

/// Apply the role's policy to a fetch result.
///
/// Surfaced errors come back as `Err`; swallowed errors are logged and come
/// back as `Ok(None)`.
pub fn settle<T, E: Display>(
    role: FetchRole,
    url: &dyn Display,
    result: Result<T, E>,
) -> Result<Option<T>, E> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if role.surfaces_errors() => Err(err),
        Err(err) => {
            match role {
                FetchRole::Subfolder => {
                    tracing::warn!(url = %url, error = %err, "dropping folder from aggregation")
                }
                _ => tracing::debug!(url = %url, error = %err, "prefetch failed"),
            }
            Ok(None)
        }
    }
}
