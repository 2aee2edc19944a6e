//! Build information captured at compile time.

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit hash (7 chars).
pub const BUILD_HASH: &str = env!("BUILD_HASH");

const BUILD_DIRTY: &str = env!("BUILD_DIRTY");

/// Version reported by `/health`.
///
/// Format: `0.1.0 (abc1234)` or `0.1.0 (abc1234*)` if dirty.
#[must_use]
pub fn version_string() -> String {
    let dirty = if BUILD_DIRTY == "true" { "*" } else { "" };
    format!("{VERSION} ({BUILD_HASH}{dirty})")
}

/// `User-Agent` for outbound page fetches.
#[must_use]
pub fn user_agent() -> String {
    format!("pairline/{VERSION}")
}
