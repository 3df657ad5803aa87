//! Reconciliation engine orchestrator.
//!
//! Main entry point for reconciliation runs. A run reads the whole source
//! inventory and the whole registry listing once, then walks the source
//! records in order and converges each registry record onto it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use vmsync_connector::prelude::*;

use super::cluster::{ClusterMapping, ClusterResolver, Placement, ResolutionError};
use super::custom_fields::CustomFieldProjector;
use super::lifecycle::TagLifecycle;
use super::network::NetworkBinder;
use super::platform::PlatformResolver;
use super::report::{ReconciliationReport, RecordReport};
use super::snapshot::SnapshotCache;
use super::statistics::StatisticsTracker;
use super::types::{BindMode, LifecycleTag, OrphanPolicy, RecordOutcome};

/// Comment reason for records the source no longer reports.
const ORPHAN_REASON: &str = "VM no longer present in vCenter";

/// Configuration for reconciliation engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Also bind the source's IPv6 addresses and elect a primary IPv6.
    #[serde(default)]
    pub bind_ipv6: bool,
    /// Handling of registry records missing from the source.
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
}

/// Converges registry VM records onto the source inventory.
pub struct ReconciliationEngine {
    source: Arc<dyn SourceInventory>,
    registry: Arc<dyn Registry>,
    config: ReconciliationConfig,
    snapshot: Option<SnapshotCache>,
}

impl ReconciliationEngine {
    /// Create a new reconciliation engine.
    pub fn new(source: Arc<dyn SourceInventory>, registry: Arc<dyn Registry>) -> Self {
        Self {
            source,
            registry,
            config: ReconciliationConfig::default(),
            snapshot: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ReconciliationConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve source fetches from a snapshot file while it is fresh.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: SnapshotCache) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Run one full reconciliation.
    ///
    /// Fails only when a bulk listing or the cluster mapping cannot be
    /// obtained; per-record problems are reported in the returned report.
    pub async fn run(&self) -> ReconciliationResult<ReconciliationReport> {
        self.execute(Uuid::new_v4()).await
    }

    #[instrument(skip(self), fields(source = %self.source.display_name(), registry = %self.registry.display_name()))]
    async fn execute(&self, run_id: Uuid) -> ReconciliationResult<ReconciliationReport> {
        let started_at = Utc::now();
        info!("Starting reconciliation");

        let fetch = self.fetch_source().await?;
        let registry = self.registry.as_ref();
        let existing = registry.list_vms().await?;
        let mapping = ClusterMapping::build(registry, &fetch.clusters).await?;
        let projector = CustomFieldProjector::load(registry).await;
        info!(
            source_vms = fetch.vms.len(),
            registry_vms = existing.len(),
            mapped_clusters = mapping.len(),
            "Loaded inventories"
        );

        let tracker = StatisticsTracker::with_total(count(fetch.vms.len()));
        let mut ctx = RunContext {
            registry,
            resolver: ClusterResolver::new(registry, &mapping),
            binder: NetworkBinder::new(registry),
            lifecycle: TagLifecycle::new(registry),
            platforms: PlatformResolver::new(registry),
            projector,
            index: TargetIndex::new(existing),
        };

        let mut records = Vec::with_capacity(fetch.vms.len());
        for vm in &fetch.vms {
            let outcome = match self.reconcile_record(&mut ctx, vm).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(vm = %vm.name, error = %e, "Record failed");
                    RecordOutcome::Failed(e.to_string())
                }
            };
            debug!(vm = %vm.name, outcome = %outcome, "Record done");
            tracker.record(&outcome);
            records.push(RecordReport {
                source_id: vm.id.clone(),
                name: vm.name.clone(),
                outcome,
            });
        }

        let orphaned = match self.config.orphan_policy {
            OrphanPolicy::Ignore => Vec::new(),
            OrphanPolicy::Tag => {
                let reported: HashSet<String> =
                    fetch.vms.iter().map(SourceVm::match_name).collect();
                self.tag_orphans(&mut ctx, &reported, &tracker).await
            }
        };

        let statistics = tracker.snapshot();
        info!(%statistics, "Reconciliation finished");
        Ok(ReconciliationReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            statistics,
            records,
            orphaned,
        })
    }

    /// Source records and cluster names, from the snapshot when fresh.
    async fn fetch_source(&self) -> ReconciliationResult<SourceFetch> {
        if let Some(cache) = &self.snapshot {
            if cache.is_fresh().await {
                match cache.load().await {
                    Ok(vms) => {
                        info!(path = %cache.path().display(), count = vms.len(), "Using snapshot");
                        return Ok(SourceFetch::new(vms, Vec::new()));
                    }
                    Err(e) => warn!(error = %e, "Snapshot unreadable, fetching live"),
                }
            }
        }

        let vms = self
            .source
            .list_virtual_machines()
            .await
            .map_err(ReconciliationError::Source)?;
        let clusters = self
            .source
            .list_clusters()
            .await
            .map_err(ReconciliationError::Source)?;

        if let Some(cache) = &self.snapshot {
            if let Err(e) = cache.store(&vms).await {
                warn!(error = %e, "Failed to write snapshot");
            }
        }
        Ok(SourceFetch::new(vms, clusters))
    }

    #[instrument(skip_all, fields(vm = %vm.name, cluster = ?vm.cluster))]
    async fn reconcile_record(
        &self,
        ctx: &mut RunContext<'_>,
        vm: &SourceVm,
    ) -> ReconciliationResult<RecordOutcome> {
        if vm.name.trim().is_empty() {
            warn!(source_id = %vm.id, "Skipping record without a name");
            return Ok(RecordOutcome::Skipped("empty name".to_string()));
        }

        let placement = ctx.resolver.resolve(vm.cluster.as_deref()).await?;
        let cluster = placement.assignable_cluster();
        if cluster.is_none() {
            warn!(
                cluster = %placement.cluster.name,
                site = %placement.site.name,
                "Cluster is not assigned to the resolved site, leaving cluster unset"
            );
        }

        let name = vm.match_name();
        if let Some(slot) = ctx.index.find_exact(&name, cluster) {
            let target = ctx.index.claim(slot);
            let updated = self.update_record(ctx, vm, target, &placement, cluster).await?;
            ctx.index.replace(slot, updated);
            return Ok(RecordOutcome::Updated);
        }

        if let Some(slot) = ctx.index.find_elsewhere(&name, cluster) {
            let target = ctx.index.claim(slot);
            info!(
                vm_id = %target.id,
                from = ?target.cluster,
                to = ?cluster,
                "Reassigning existing record to resolved cluster"
            );
            let updated = self.update_record(ctx, vm, target, &placement, cluster).await?;
            ctx.index.replace(slot, updated);
            return Ok(RecordOutcome::ReassignedAndUpdated);
        }

        let created = self.create_record(ctx, vm, &placement, cluster).await?;
        ctx.index.insert_claimed(created);
        Ok(RecordOutcome::Created)
    }

    async fn update_record(
        &self,
        ctx: &mut RunContext<'_>,
        vm: &SourceVm,
        mut target: RegistryVm,
        placement: &Placement,
        cluster: Option<ClusterId>,
    ) -> ReconciliationResult<RegistryVm> {
        let original = target.clone();

        target.cluster = cluster;
        target.site = Some(placement.site.id);
        target.status = vm.status();
        target.vcpus = Some(vm.vcpus);
        target.memory_mb = Some(vm.memory_mb);
        target.disk_gb = Some(vm.disk_gb);
        if let Some(platform) = ctx.platforms.resolve(vm.platform.as_deref()).await {
            target.platform = Some(platform);
        }
        target.comments = vm.comments.clone();
        ctx.projector.apply(vm, &mut target.custom_fields);
        if let Err(e) = ctx.lifecycle.ensure_tags(&mut target, &vm.tags).await {
            abandon_rejected(e, "source tags")?;
        }

        if target == original {
            debug!("Attributes unchanged");
        } else {
            match ctx.registry.update_vm(&target).await {
                Ok(saved) => {
                    info!(vm_id = %saved.id, "Updated attributes");
                    target = saved;
                }
                Err(e) => {
                    abandon_rejected(e, "attribute update")?;
                    target = original;
                }
            }
        }

        self.bind_addresses(ctx, vm, &mut target, BindMode::Update)
            .await?;
        self.mark_synced(ctx, &mut target).await?;
        Ok(target)
    }

    async fn create_record(
        &self,
        ctx: &mut RunContext<'_>,
        vm: &SourceVm,
        placement: &Placement,
        cluster: Option<ClusterId>,
    ) -> ReconciliationResult<RegistryVm> {
        let platform = ctx.platforms.resolve(vm.platform.as_deref()).await;
        let tags = match ctx.lifecycle.tag_ids(&vm.tags).await {
            Ok(tags) => tags,
            Err(e) => {
                abandon_rejected(e, "source tags")?;
                Vec::new()
            }
        };

        let request = NewVm {
            name: vm.name.clone(),
            status: vm.status(),
            cluster,
            site: Some(placement.site.id),
            vcpus: vm.vcpus,
            memory_mb: vm.memory_mb,
            disk_gb: vm.disk_gb,
            platform,
            comments: vm.comments.clone(),
            custom_fields: ctx.projector.project(vm),
            tags,
            tenant: vm.tenant_id,
            role: vm.role_id,
        };
        let mut created = ctx.registry.create_vm(&request).await?;
        info!(vm_id = %created.id, status = %created.status, "Created record");

        self.bind_addresses(ctx, vm, &mut created, BindMode::Create)
            .await?;
        self.mark_synced(ctx, &mut created).await?;
        Ok(created)
    }

    async fn bind_addresses(
        &self,
        ctx: &mut RunContext<'_>,
        vm: &SourceVm,
        target: &mut RegistryVm,
        mode: BindMode,
    ) -> ReconciliationResult<()> {
        let mut addresses = vec![vm.ip_address.as_deref()];
        if self.config.bind_ipv6 {
            addresses.extend(vm.ipv6.iter().map(|a| Some(a.as_str())));
        }

        for address in addresses {
            match ctx.binder.bind(target, address, mode).await {
                Ok(outcome) => debug!(?outcome, "Address bound"),
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => warn!(error = %e, "Address binding failed"),
            }
        }
        Ok(())
    }

    async fn mark_synced(
        &self,
        ctx: &mut RunContext<'_>,
        target: &mut RegistryVm,
    ) -> ReconciliationResult<()> {
        match ctx.lifecycle.apply(target, LifecycleTag::Synced).await {
            Ok(transition) => {
                debug!(?transition, "Synced tag");
                Ok(())
            }
            Err(e) => abandon_rejected(e, "synced tag"),
        }
    }

    /// Mark synced records the source no longer reports as orphaned.
    ///
    /// A record whose name the source still reports is left alone even when
    /// its source record failed this run.
    async fn tag_orphans(
        &self,
        ctx: &mut RunContext<'_>,
        reported: &HashSet<String>,
        tracker: &StatisticsTracker,
    ) -> Vec<String> {
        let mut orphaned = Vec::new();
        for mut vm in ctx
            .index
            .unclaimed_with_tag(LifecycleTag::Synced.tag_name(), reported)
        {
            match ctx.lifecycle.mark_orphaned(&mut vm, ORPHAN_REASON).await {
                Ok(()) => {
                    tracker.record_orphaned();
                    orphaned.push(vm.name);
                }
                Err(e) => {
                    error!(vm = %vm.name, error = %e, "Failed to mark orphaned");
                    tracker.record_failure();
                }
            }
        }
        orphaned
    }
}

/// Log and drop a registry rejection; anything else fails the record.
fn abandon_rejected(err: ConnectorError, what: &str) -> ReconciliationResult<()> {
    if err.is_rejection() {
        warn!(error = %err, "Registry rejected {what}, continuing");
        Ok(())
    } else {
        Err(err.into())
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

struct SourceFetch {
    vms: Vec<SourceVm>,
    clusters: Vec<String>,
}

impl SourceFetch {
    /// Cluster names are the union of the listed ones and those on records.
    fn new(vms: Vec<SourceVm>, mut clusters: Vec<String>) -> Self {
        clusters.extend(vms.iter().filter_map(|vm| vm.cluster.clone()));
        clusters.sort();
        clusters.dedup();
        Self { vms, clusters }
    }
}

/// Per-run collaborators and state.
struct RunContext<'a> {
    registry: &'a dyn Registry,
    resolver: ClusterResolver<'a>,
    binder: NetworkBinder<'a>,
    lifecycle: TagLifecycle<'a>,
    platforms: PlatformResolver<'a>,
    projector: CustomFieldProjector,
    index: TargetIndex,
}

/// Registry records of one run, indexed for matching.
///
/// Records are held in ascending id order so every candidate list yields
/// the lowest id first. A claimed record has been matched by a source
/// record this run and is never matched again.
struct TargetIndex {
    records: Vec<RegistryVm>,
    by_key: HashMap<(String, Option<ClusterId>), Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    claimed: HashSet<usize>,
}

impl TargetIndex {
    fn new(mut records: Vec<RegistryVm>) -> Self {
        records.sort_by_key(|vm| vm.id);
        let mut by_key: HashMap<_, Vec<usize>> = HashMap::new();
        let mut by_name: HashMap<_, Vec<usize>> = HashMap::new();
        for (slot, vm) in records.iter().enumerate() {
            let name = vm.name.to_lowercase();
            by_key.entry((name.clone(), vm.cluster)).or_default().push(slot);
            by_name.entry(name).or_default().push(slot);
        }
        Self {
            records,
            by_key,
            by_name,
            claimed: HashSet::new(),
        }
    }

    fn find_exact(&self, name: &str, cluster: Option<ClusterId>) -> Option<usize> {
        self.by_key
            .get(&(name.to_string(), cluster))?
            .iter()
            .copied()
            .find(|slot| !self.claimed.contains(slot))
    }

    /// Lowest-id unclaimed record with this name under another cluster.
    fn find_elsewhere(&self, name: &str, cluster: Option<ClusterId>) -> Option<usize> {
        self.by_name
            .get(name)?
            .iter()
            .copied()
            .find(|slot| !self.claimed.contains(slot) && self.records[*slot].cluster != cluster)
    }

    /// Claim a slot and hand out a working copy of its record.
    fn claim(&mut self, slot: usize) -> RegistryVm {
        self.claimed.insert(slot);
        self.records[slot].clone()
    }

    fn replace(&mut self, slot: usize, vm: RegistryVm) {
        self.records[slot] = vm;
    }

    fn insert_claimed(&mut self, vm: RegistryVm) {
        self.claimed.insert(self.records.len());
        self.records.push(vm);
    }

    /// Unclaimed records carrying `tag` whose name is not in `reported`.
    fn unclaimed_with_tag(&self, tag: &str, reported: &HashSet<String>) -> Vec<RegistryVm> {
        self.records
            .iter()
            .enumerate()
            .filter(|(slot, vm)| {
                !self.claimed.contains(slot)
                    && vm.has_tag(tag)
                    && !reported.contains(&vm.name.to_lowercase())
            })
            .map(|(_, vm)| vm.clone())
            .collect()
    }
}

/// Result type for reconciliation operations.
pub type ReconciliationResult<T> = Result<T, ReconciliationError>;

/// Errors that can occur during reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    /// The source inventory could not be read.
    #[error("Source error: {0}")]
    Source(ConnectorError),

    /// A registry call failed.
    #[error("Registry error: {0}")]
    Registry(#[from] ConnectorError),

    /// No usable cluster/site placement.
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Another run holds the gate.
    #[error("Reconciliation already running")]
    AlreadyRunning,

    /// The run task panicked or was cancelled.
    #[error("Reconciliation task failed: {0}")]
    Task(String),
}

impl ReconciliationError {
    /// Check if retrying later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ReconciliationError::Source(e) | ReconciliationError::Registry(e) => e.is_transient(),
            ReconciliationError::Resolution(ResolutionError::Registry(e)) => e.is_transient(),
            ReconciliationError::AlreadyRunning => true,
            _ => false,
        }
    }
}
