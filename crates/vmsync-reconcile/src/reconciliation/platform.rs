//! Platform resolution.
//!
//! Guest OS labels are matched to registry platforms by slug and created on
//! first sight. Lookups are cached for the lifetime of one run.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use vmsync_connector::prelude::*;

/// Turn a label into a registry slug.
///
/// Drops everything except word characters, whitespace and hyphens,
/// lowercases, then collapses whitespace/hyphen runs into a single `-`.
#[must_use]
pub fn slugify(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || *c == '-')
        .collect();
    let lowered = kept.trim().to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut in_run = false;
    for c in lowered.chars() {
        if c.is_whitespace() || c == '-' {
            if !in_run {
                slug.push('-');
                in_run = true;
            }
        } else {
            slug.push(c);
            in_run = false;
        }
    }
    slug
}

/// Per-run platform lookup with a slug cache.
pub struct PlatformResolver<'a> {
    registry: &'a dyn Registry,
    cache: HashMap<String, Option<PlatformId>>,
}

impl<'a> PlatformResolver<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    /// Resolve a guest label to a platform, creating it if missing.
    ///
    /// Absent labels and failed lookups leave the platform unset.
    pub async fn resolve(&mut self, label: Option<&str>) -> Option<PlatformId> {
        let label = label.map(str::trim).filter(|l| !l.is_empty())?;
        let slug = slugify(label);
        if slug.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(&slug) {
            return *cached;
        }

        let resolved = self.lookup_or_create(label, &slug).await;
        self.cache.insert(slug, resolved);
        resolved
    }

    async fn lookup_or_create(&self, label: &str, slug: &str) -> Option<PlatformId> {
        match self.registry.find_platform_by_slug(slug).await {
            Ok(Some(platform)) => {
                debug!(platform = %platform.name, slug, "Platform found");
                return Some(platform.id);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(slug, error = %e, "Platform lookup failed");
                return None;
            }
        }

        match self.registry.create_platform(label, slug).await {
            Ok(platform) => {
                info!(platform = %platform.name, id = %platform.id, "Created platform");
                Some(platform.id)
            }
            Err(e) => {
                warn!(platform = label, error = %e, "Platform creation failed, leaving unset");
                None
            }
        }
    }
}
