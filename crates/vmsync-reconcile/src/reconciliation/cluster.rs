//! Cluster and site resolution.
//!
//! A [`ClusterMapping`] is built once per run from the registry's cluster
//! list, restricted to clusters the source reports. It always holds an
//! `"Unknown"` entry backed by a registry cluster/site pair that is created
//! on first use. [`ClusterResolver`] turns a source cluster name into live
//! registry entities, falling back to the `"Unknown"` pair whenever the
//! mapped entities are gone.

use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

use vmsync_connector::model::UNKNOWN;
use vmsync_connector::prelude::*;

use super::platform::slugify;

/// Registry placement for one source cluster name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub cluster: ClusterId,
    pub site: SiteId,
}

/// Source cluster name to registry cluster/site, rebuilt every run.
#[derive(Debug, Clone, Default)]
pub struct ClusterMapping {
    entries: HashMap<String, MappingEntry>,
}

impl ClusterMapping {
    /// Build the mapping, materializing the `"Unknown"` site, cluster type
    /// and cluster if they do not exist yet.
    #[instrument(skip_all, fields(source_clusters = source_clusters.len()))]
    pub async fn build(
        registry: &dyn Registry,
        source_clusters: &[String],
    ) -> ConnectorResult<Self> {
        let wanted: HashSet<&str> = source_clusters.iter().map(String::as_str).collect();
        let mut unknown_site: Option<Site> = None;
        let mut entries = HashMap::new();

        for cluster in registry.list_clusters().await? {
            if cluster.name == UNKNOWN || !wanted.contains(cluster.name.as_str()) {
                continue;
            }
            let site = match cluster.site {
                Some(site) => site,
                None => {
                    let site = ensure_unknown_site(registry, &mut unknown_site).await?;
                    warn!(cluster = %cluster.name, "Cluster has no site, mapping to Unknown site");
                    site
                }
            };
            info!(cluster = %cluster.name, cluster_id = %cluster.id, site_id = %site, "Mapped cluster");
            entries.insert(
                cluster.name,
                MappingEntry {
                    cluster: cluster.id,
                    site,
                },
            );
        }

        let site = ensure_unknown_site(registry, &mut unknown_site).await?;
        let cluster = match registry.find_cluster_by_name(UNKNOWN).await? {
            Some(cluster) => cluster,
            None => {
                let cluster_type = match registry.find_cluster_type_by_name(UNKNOWN).await? {
                    Some(cluster_type) => cluster_type,
                    None => {
                        registry
                            .create_cluster_type(UNKNOWN, &slugify(UNKNOWN))
                            .await?
                    }
                };
                let cluster = registry
                    .create_cluster(&NewCluster {
                        name: UNKNOWN.to_string(),
                        cluster_type: cluster_type.id,
                        site: Some(site),
                    })
                    .await?;
                info!(cluster_id = %cluster.id, site_id = %site, "Created Unknown cluster");
                cluster
            }
        };
        entries.insert(
            UNKNOWN.to_string(),
            MappingEntry {
                cluster: cluster.id,
                site,
            },
        );

        Ok(Self { entries })
    }

    /// Build a mapping from known entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, MappingEntry)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Entry for a source cluster name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<MappingEntry> {
        self.entries.get(name).copied()
    }

    /// The fallback entry.
    #[must_use]
    pub fn unknown(&self) -> Option<MappingEntry> {
        self.get(UNKNOWN)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn ensure_unknown_site(
    registry: &dyn Registry,
    cached: &mut Option<Site>,
) -> ConnectorResult<SiteId> {
    if let Some(site) = cached {
        return Ok(site.id);
    }
    let site = match registry.find_site_by_name(UNKNOWN).await? {
        Some(site) => site,
        None => {
            let site = registry.create_site(UNKNOWN, &slugify(UNKNOWN)).await?;
            info!(site_id = %site.id, "Created Unknown site");
            site
        }
    };
    let id = site.id;
    *cached = Some(site);
    Ok(id)
}

/// Live registry placement for a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub cluster: Cluster,
    pub site: Site,
}

impl Placement {
    /// Cluster to assign, or `None` when the cluster belongs to another site.
    #[must_use]
    pub fn assignable_cluster(&self) -> Option<ClusterId> {
        (self.cluster.site == Some(self.site.id)).then_some(self.cluster.id)
    }
}

/// Errors resolving a source cluster to a registry placement.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The mapping has no `"Unknown"` entry to fall back to.
    #[error("No mapping for cluster '{name}' and no Unknown fallback")]
    Unmapped { name: String },

    /// Neither the mapped nor the fallback entities exist anymore.
    #[error("Cluster {cluster} or site {site} no longer exists")]
    Dangling { cluster: ClusterId, site: SiteId },

    /// The registry could not be queried.
    #[error("Registry error: {0}")]
    Registry(#[from] ConnectorError),
}

/// Resolves source cluster names against a per-run mapping.
pub struct ClusterResolver<'a> {
    registry: &'a dyn Registry,
    mapping: &'a ClusterMapping,
}

impl<'a> ClusterResolver<'a> {
    pub fn new(registry: &'a dyn Registry, mapping: &'a ClusterMapping) -> Self {
        Self { registry, mapping }
    }

    /// Resolve a source cluster name to live registry entities.
    ///
    /// Unmapped names and names whose entities vanished fall back to the
    /// `"Unknown"` entry, once.
    pub async fn resolve(&self, cluster_name: Option<&str>) -> Result<Placement, ResolutionError> {
        let name = cluster_name.unwrap_or(UNKNOWN);
        let unknown = self.mapping.unknown();

        let entry = match self.mapping.get(name).or(unknown) {
            Some(entry) => entry,
            None => {
                return Err(ResolutionError::Unmapped {
                    name: name.to_string(),
                })
            }
        };

        if let Some(placement) = self.dereference(entry).await? {
            return Ok(placement);
        }

        match unknown {
            Some(fallback) if fallback != entry => {
                warn!(cluster = name, "Mapped cluster or site is gone, using Unknown");
                self.dereference(fallback)
                    .await?
                    .ok_or(ResolutionError::Dangling {
                        cluster: fallback.cluster,
                        site: fallback.site,
                    })
            }
            _ => Err(ResolutionError::Dangling {
                cluster: entry.cluster,
                site: entry.site,
            }),
        }
    }

    async fn dereference(&self, entry: MappingEntry) -> ConnectorResult<Option<Placement>> {
        let Some(cluster) = self.registry.get_cluster(entry.cluster).await? else {
            return Ok(None);
        };
        let Some(site) = self.registry.get_site(entry.site).await? else {
            return Ok(None);
        };
        Ok(Some(Placement { cluster, site }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(cluster_site: Option<u64>, site: u64) -> Placement {
        Placement {
            cluster: Cluster {
                id: ClusterId::new(7),
                name: "Prod".into(),
                site: cluster_site.map(SiteId::new),
            },
            site: Site {
                id: SiteId::new(site),
                name: "DC1".into(),
                slug: "dc1".into(),
            },
        }
    }

    #[test]
    fn test_assignable_cluster_requires_matching_site() {
        assert_eq!(
            placement(Some(1), 1).assignable_cluster(),
            Some(ClusterId::new(7))
        );
        assert_eq!(placement(Some(2), 1).assignable_cluster(), None);
        assert_eq!(placement(None, 1).assignable_cluster(), None);
    }

    #[test]
    fn test_mapping_lookup() {
        let entry = MappingEntry {
            cluster: ClusterId::new(1),
            site: SiteId::new(2),
        };
        let mapping = ClusterMapping::from_entries([(UNKNOWN.to_string(), entry)]);
        assert_eq!(mapping.unknown(), Some(entry));
        assert_eq!(mapping.get("Prod"), None);
        assert_eq!(mapping.len(), 1);
    }
}
