//! In-memory [`CloudProvider`] with scripted state transitions.
//!
//! # Design
//! - Every call is appended to a log so tests can assert ordering.
//! - Asynchronous transitions (snapshot copy, detach, stop, ...) report an interim
//!   state for `settle_polls` probes before reaching their target.
//! - Faults are keyed by operation name and apply to every later call until cleared.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reseal_core::{
    AttachedVolume, CloudProvider, InstanceState, ProviderError, ProviderResult, SnapshotState,
    Tag, VolumeRecord, VolumeSpec, VolumeState,
};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `resolve_region`.
    ResolveRegion,
    /// `describe_instance_volumes`.
    DescribeInstanceVolumes {
        /// Instance described.
        instance_id: String,
    },
    /// `describe_volume`.
    DescribeVolume {
        /// Volume described.
        volume_id: String,
    },
    /// `create_snapshot`.
    CreateSnapshot {
        /// Volume snapshotted.
        volume_id: String,
    },
    /// `snapshot_state`.
    SnapshotState {
        /// Snapshot polled.
        snapshot_id: String,
    },
    /// `snapshot_exists`.
    SnapshotExists {
        /// Snapshot checked.
        snapshot_id: String,
    },
    /// `create_volume`.
    CreateVolume {
        /// Source snapshot.
        snapshot_id: String,
        /// Encryption key.
        kms_key_id: String,
    },
    /// `stop_instance`.
    StopInstance {
        /// Instance stopped.
        instance_id: String,
    },
    /// `instance_state`.
    InstanceState {
        /// Instance polled.
        instance_id: String,
    },
    /// `detach_volume`.
    DetachVolume {
        /// Instance detached from.
        instance_id: String,
        /// Volume detached.
        volume_id: String,
    },
    /// `volume_state`.
    VolumeState {
        /// Volume polled.
        volume_id: String,
    },
    /// `attach_volume`.
    AttachVolume {
        /// Instance attached to.
        instance_id: String,
        /// Volume attached.
        volume_id: String,
        /// Device name.
        device_path: String,
    },
    /// `set_delete_on_termination`.
    SetDeleteOnTermination {
        /// Instance modified.
        instance_id: String,
        /// Device modified.
        device_path: String,
        /// New attribute value.
        delete_on_termination: bool,
    },
    /// `create_tags`.
    CreateTags {
        /// Resource tagged.
        resource_id: String,
        /// Tags written.
        tags: Vec<Tag>,
    },
    /// `start_instance`.
    StartInstance {
        /// Instance started.
        instance_id: String,
    },
    /// `delete_snapshot`.
    DeleteSnapshot {
        /// Snapshot deleted.
        snapshot_id: String,
    },
}

impl ProviderCall {
    /// Trait method name of the call.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::ResolveRegion => "resolve_region",
            Self::DescribeInstanceVolumes { .. } => "describe_instance_volumes",
            Self::DescribeVolume { .. } => "describe_volume",
            Self::CreateSnapshot { .. } => "create_snapshot",
            Self::SnapshotState { .. } => "snapshot_state",
            Self::SnapshotExists { .. } => "snapshot_exists",
            Self::CreateVolume { .. } => "create_volume",
            Self::StopInstance { .. } => "stop_instance",
            Self::InstanceState { .. } => "instance_state",
            Self::DetachVolume { .. } => "detach_volume",
            Self::VolumeState { .. } => "volume_state",
            Self::AttachVolume { .. } => "attach_volume",
            Self::SetDeleteOnTermination { .. } => "set_delete_on_termination",
            Self::CreateTags { .. } => "create_tags",
            Self::StartInstance { .. } => "start_instance",
            Self::DeleteSnapshot { .. } => "delete_snapshot",
        }
    }

    /// Whether the call changes provider state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateSnapshot { .. }
                | Self::CreateVolume { .. }
                | Self::StopInstance { .. }
                | Self::DetachVolume { .. }
                | Self::AttachVolume { .. }
                | Self::SetDeleteOnTermination { .. }
                | Self::CreateTags { .. }
                | Self::StartInstance { .. }
                | Self::DeleteSnapshot { .. }
        )
    }
}

/// Injected failure for an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with `ProviderError::Api` carrying this message.
    Api(String),
    /// Fail with `ProviderError::NotFound`.
    NotFound,
}

/// Volume seeded onto an instance.
#[derive(Debug, Clone)]
pub struct SeedVolume {
    record: VolumeRecord,
}

impl SeedVolume {
    /// Unencrypted `gp3` volume attached at `device_path`.
    #[must_use]
    pub fn plain(volume_id: &str, device_path: &str) -> Self {
        Self {
            record: VolumeRecord {
                volume_id: volume_id.to_string(),
                availability_zone: "us-east-1a".to_string(),
                volume_type: "gp3".to_string(),
                device_path: Some(device_path.to_string()),
                delete_on_termination: Some(false),
                encrypted: false,
                size_gib: Some(20),
                iops: Some(3000),
                throughput: Some(125),
            },
        }
    }

    /// Encrypted `gp3` volume attached at `device_path`.
    #[must_use]
    pub fn encrypted(volume_id: &str, device_path: &str) -> Self {
        let mut seed = Self::plain(volume_id, device_path);
        seed.record.encrypted = true;
        seed
    }

    /// Override the delete-on-termination attribute.
    #[must_use]
    pub const fn delete_on_termination(mut self, flag: bool) -> Self {
        self.record.delete_on_termination = Some(flag);
        self
    }

    /// Report the volume with an unknown delete-on-termination attribute.
    #[must_use]
    pub const fn without_delete_on_termination(mut self) -> Self {
        self.record.delete_on_termination = None;
        self
    }

    /// Report the mapping without a device name.
    #[must_use]
    pub fn without_device(mut self) -> Self {
        self.record.device_path = None;
        self
    }

    /// Override the volume type.
    #[must_use]
    pub fn volume_type(mut self, volume_type: &str) -> Self {
        self.record.volume_type = volume_type.to_string();
        self
    }
}

/// Observable state of one fake volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeView {
    /// Volume description.
    pub record: VolumeRecord,
    /// Current lifecycle state.
    pub state: VolumeState,
    /// Tags on the volume.
    pub tags: Vec<Tag>,
    /// KMS key the volume was created with.
    pub kms_key_id: Option<String>,
    /// Snapshot the volume was restored from.
    pub source_snapshot: Option<String>,
}

#[derive(Debug, Clone)]
struct Scripted<S> {
    current: S,
    next: Option<(S, u32)>,
}

impl<S: Clone> Scripted<S> {
    const fn settled(state: S) -> Self {
        Self {
            current: state,
            next: None,
        }
    }

    fn transition(&mut self, interim: S, target: S, polls: u32) {
        self.current = interim;
        self.next = Some((target, polls));
    }

    fn observe(&mut self) -> S {
        if let Some((target, remaining)) = self.next.as_mut() {
            if *remaining == 0 {
                self.current = target.clone();
                self.next = None;
            } else {
                *remaining -= 1;
            }
        }
        self.current.clone()
    }
}

#[derive(Debug, Clone)]
struct Mapping {
    device_path: Option<String>,
    volume_id: Option<String>,
    delete_on_termination: Option<bool>,
}

#[derive(Debug)]
struct FakeInstance {
    state: Scripted<InstanceState>,
    mappings: Vec<Mapping>,
}

#[derive(Debug)]
struct FakeVolume {
    record: VolumeRecord,
    state: Scripted<VolumeState>,
    tags: Vec<Tag>,
    kms_key_id: Option<String>,
    source_snapshot: Option<String>,
}

#[derive(Debug)]
struct FakeSnapshot {
    state: Scripted<SnapshotState>,
}

#[derive(Debug)]
struct FakeState {
    region: String,
    settle_polls: u32,
    snapshot_outcome: SnapshotState,
    stop_outcome: InstanceState,
    instances: HashMap<String, FakeInstance>,
    volumes: HashMap<String, FakeVolume>,
    snapshots: HashMap<String, FakeSnapshot>,
    faults: HashMap<&'static str, Fault>,
    calls: Vec<ProviderCall>,
    next_id: u32,
}

impl FakeState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-fake{:04}", self.next_id)
    }

    fn check_fault(&self, operation: &'static str, resource_id: &str) -> ProviderResult<()> {
        match self.faults.get(operation) {
            None => Ok(()),
            Some(Fault::Api(message)) => Err(ProviderError::api(operation, message.clone())),
            Some(Fault::NotFound) => Err(not_found(resource_id)),
        }
    }

    fn instance_mut(&mut self, instance_id: &str) -> ProviderResult<&mut FakeInstance> {
        self.instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found(instance_id))
    }

    fn volume_mut(&mut self, volume_id: &str) -> ProviderResult<&mut FakeVolume> {
        self.volumes
            .get_mut(volume_id)
            .ok_or_else(|| not_found(volume_id))
    }
}

fn not_found(resource_id: &str) -> ProviderError {
    ProviderError::NotFound {
        resource_id: resource_id.to_string(),
    }
}

/// Scriptable in-memory provider.
#[derive(Debug)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    /// Empty provider bound to `region`; transitions settle after one interim poll.
    #[must_use]
    pub fn new(region: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                region: region.to_string(),
                settle_polls: 1,
                snapshot_outcome: SnapshotState::Completed,
                stop_outcome: InstanceState::Stopped,
                instances: HashMap::new(),
                volumes: HashMap::new(),
                snapshots: HashMap::new(),
                faults: HashMap::new(),
                calls: Vec::new(),
                next_id: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a running instance with no volumes.
    #[must_use]
    pub fn with_instance(self, instance_id: &str) -> Self {
        self.lock().instances.insert(
            instance_id.to_string(),
            FakeInstance {
                state: Scripted::settled(InstanceState::Running),
                mappings: Vec::new(),
            },
        );
        self
    }

    /// Attach a seeded volume to `instance_id` at the end of its mapping.
    #[must_use]
    pub fn with_volume(self, instance_id: &str, seed: SeedVolume) -> Self {
        {
            let mut state = self.lock();
            let record = seed.record;
            if let Some(instance) = state.instances.get_mut(instance_id) {
                instance.mappings.push(Mapping {
                    device_path: record.device_path.clone(),
                    volume_id: Some(record.volume_id.clone()),
                    delete_on_termination: record.delete_on_termination,
                });
            }
            state.volumes.insert(
                record.volume_id.clone(),
                FakeVolume {
                    record,
                    state: Scripted::settled(VolumeState::InUse),
                    tags: Vec::new(),
                    kms_key_id: None,
                    source_snapshot: None,
                },
            );
        }
        self
    }

    /// Number of interim polls before each transition settles.
    #[must_use]
    pub fn with_settle_polls(self, polls: u32) -> Self {
        self.lock().settle_polls = polls;
        self
    }

    /// Final state new snapshots reach.
    #[must_use]
    pub fn with_snapshot_outcome(self, outcome: SnapshotState) -> Self {
        self.lock().snapshot_outcome = outcome;
        self
    }

    /// Final state a stop request reaches.
    #[must_use]
    pub fn with_stop_outcome(self, outcome: InstanceState) -> Self {
        self.lock().stop_outcome = outcome;
        self
    }

    /// Fail `operation` from now on.
    #[must_use]
    pub fn with_fault(self, operation: &'static str, fault: Fault) -> Self {
        self.set_fault(operation, fault);
        self
    }

    /// Fail `operation` from now on.
    pub fn set_fault(&self, operation: &'static str, fault: Fault) {
        self.lock().faults.insert(operation, fault);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Remove a snapshot behind the workflow's back.
    pub fn remove_snapshot(&self, snapshot_id: &str) {
        self.lock().snapshots.remove(snapshot_id);
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Calls for `operation`, in order.
    #[must_use]
    pub fn calls_to(&self, operation: &str) -> Vec<ProviderCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    /// Number of calls to `operation`.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        self.calls_to(operation).len()
    }

    /// Current state of a volume.
    #[must_use]
    pub fn volume(&self, volume_id: &str) -> Option<VolumeView> {
        self.lock().volumes.get(volume_id).map(|volume| VolumeView {
            record: volume.record.clone(),
            state: volume.state.current.clone(),
            tags: volume.tags.clone(),
            kms_key_id: volume.kms_key_id.clone(),
            source_snapshot: volume.source_snapshot.clone(),
        })
    }

    /// Current state of an instance, without advancing transitions.
    #[must_use]
    pub fn current_instance_state(&self, instance_id: &str) -> Option<InstanceState> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|instance| instance.state.current.clone())
    }

    /// Attached `(device, volume_id, delete_on_termination)` triples in mapping order.
    #[must_use]
    pub fn attachments(&self, instance_id: &str) -> Vec<(String, String, bool)> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|instance| {
                instance
                    .mappings
                    .iter()
                    .filter_map(|mapping| {
                        mapping.volume_id.as_ref().map(|volume_id| {
                            (
                                mapping.device_path.clone().unwrap_or_default(),
                                volume_id.clone(),
                                mapping.delete_on_termination.unwrap_or(false),
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot ids that still exist, sorted.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.lock().snapshots.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    async fn resolve_region(&self) -> ProviderResult<String> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::ResolveRegion);
        state.check_fault("resolve_region", "region")?;
        Ok(state.region.clone())
    }

    async fn describe_instance_volumes(
        &self,
        instance_id: &str,
    ) -> ProviderResult<Vec<AttachedVolume>> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::DescribeInstanceVolumes {
            instance_id: instance_id.to_string(),
        });
        state.check_fault("describe_instance_volumes", instance_id)?;
        let instance = state.instance_mut(instance_id)?;
        Ok(instance
            .mappings
            .iter()
            .filter_map(|mapping| {
                mapping.volume_id.as_ref().map(|volume_id| AttachedVolume {
                    volume_id: volume_id.clone(),
                    device_path: mapping.device_path.clone(),
                    delete_on_termination: mapping.delete_on_termination,
                })
            })
            .collect())
    }

    async fn describe_volume(&self, volume_id: &str) -> ProviderResult<VolumeRecord> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::DescribeVolume {
            volume_id: volume_id.to_string(),
        });
        state.check_fault("describe_volume", volume_id)?;
        Ok(state.volume_mut(volume_id)?.record.clone())
    }

    async fn create_snapshot(
        &self,
        volume_id: &str,
        _description: &str,
    ) -> ProviderResult<String> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::CreateSnapshot {
            volume_id: volume_id.to_string(),
        });
        state.check_fault("create_snapshot", volume_id)?;
        state.volume_mut(volume_id)?;
        let snapshot_id = state.next_id("snap");
        let mut scripted = Scripted::settled(SnapshotState::Pending);
        let outcome = state.snapshot_outcome.clone();
        scripted.transition(SnapshotState::Pending, outcome, state.settle_polls);
        state
            .snapshots
            .insert(snapshot_id.clone(), FakeSnapshot { state: scripted });
        Ok(snapshot_id)
    }

    async fn snapshot_state(&self, snapshot_id: &str) -> ProviderResult<SnapshotState> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::SnapshotState {
            snapshot_id: snapshot_id.to_string(),
        });
        state.check_fault("snapshot_state", snapshot_id)?;
        state
            .snapshots
            .get_mut(snapshot_id)
            .map(|snapshot| snapshot.state.observe())
            .ok_or_else(|| not_found(snapshot_id))
    }

    async fn snapshot_exists(&self, snapshot_id: &str) -> ProviderResult<bool> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::SnapshotExists {
            snapshot_id: snapshot_id.to_string(),
        });
        state.check_fault("snapshot_exists", snapshot_id)?;
        Ok(state.snapshots.contains_key(snapshot_id))
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> ProviderResult<String> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::CreateVolume {
            snapshot_id: spec.snapshot_id.clone(),
            kms_key_id: spec.kms_key_id.clone(),
        });
        state.check_fault("create_volume", &spec.snapshot_id)?;
        if !state.snapshots.contains_key(&spec.snapshot_id) {
            return Err(not_found(&spec.snapshot_id));
        }
        let volume_id = state.next_id("vol");
        let mut scripted = Scripted::settled(VolumeState::Creating);
        scripted.transition(
            VolumeState::Creating,
            VolumeState::Available,
            state.settle_polls,
        );
        state.volumes.insert(
            volume_id.clone(),
            FakeVolume {
                record: VolumeRecord {
                    volume_id: volume_id.clone(),
                    availability_zone: spec.availability_zone.clone(),
                    volume_type: spec.volume_type.clone(),
                    device_path: None,
                    delete_on_termination: None,
                    encrypted: true,
                    size_gib: spec.size_gib,
                    iops: spec.iops,
                    throughput: spec.throughput,
                },
                state: scripted,
                tags: spec.tags.clone(),
                kms_key_id: Some(spec.kms_key_id.clone()),
                source_snapshot: Some(spec.snapshot_id.clone()),
            },
        );
        Ok(volume_id)
    }

    async fn stop_instance(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::StopInstance {
            instance_id: instance_id.to_string(),
        });
        state.check_fault("stop_instance", instance_id)?;
        let polls = state.settle_polls;
        let outcome = state.stop_outcome.clone();
        let instance = state.instance_mut(instance_id)?;
        if instance.state.current != InstanceState::Stopped {
            instance
                .state
                .transition(InstanceState::Stopping, outcome, polls);
        }
        Ok(())
    }

    async fn instance_state(&self, instance_id: &str) -> ProviderResult<InstanceState> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::InstanceState {
            instance_id: instance_id.to_string(),
        });
        state.check_fault("instance_state", instance_id)?;
        Ok(state.instance_mut(instance_id)?.state.observe())
    }

    async fn detach_volume(&self, instance_id: &str, volume_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::DetachVolume {
            instance_id: instance_id.to_string(),
            volume_id: volume_id.to_string(),
        });
        state.check_fault("detach_volume", volume_id)?;
        let polls = state.settle_polls;
        let instance = state.instance_mut(instance_id)?;
        let mapping = instance
            .mappings
            .iter_mut()
            .find(|mapping| mapping.volume_id.as_deref() == Some(volume_id))
            .ok_or_else(|| not_found(volume_id))?;
        mapping.volume_id = None;
        let volume = state.volume_mut(volume_id)?;
        volume.record.device_path = None;
        volume.record.delete_on_termination = None;
        volume.state.transition(
            VolumeState::Unknown("detaching".to_string()),
            VolumeState::Available,
            polls,
        );
        Ok(())
    }

    async fn volume_state(&self, volume_id: &str) -> ProviderResult<VolumeState> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::VolumeState {
            volume_id: volume_id.to_string(),
        });
        state.check_fault("volume_state", volume_id)?;
        Ok(state.volume_mut(volume_id)?.state.observe())
    }

    async fn attach_volume(
        &self,
        instance_id: &str,
        volume_id: &str,
        device_path: &str,
    ) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::AttachVolume {
            instance_id: instance_id.to_string(),
            volume_id: volume_id.to_string(),
            device_path: device_path.to_string(),
        });
        state.check_fault("attach_volume", volume_id)?;
        let polls = state.settle_polls;
        let volume = state.volume_mut(volume_id)?;
        if volume.state.current != VolumeState::Available {
            return Err(ProviderError::api(
                "attach_volume",
                format!("volume {volume_id} is {}", volume.state.current.as_str()),
            ));
        }
        volume.record.device_path = Some(device_path.to_string());
        volume.record.delete_on_termination = Some(false);
        volume.state.transition(
            VolumeState::Unknown("attaching".to_string()),
            VolumeState::InUse,
            polls,
        );
        let instance = state.instance_mut(instance_id)?;
        if let Some(slot) = instance
            .mappings
            .iter_mut()
            .find(|mapping| {
                mapping.device_path.as_deref() == Some(device_path) && mapping.volume_id.is_none()
            })
        {
            slot.volume_id = Some(volume_id.to_string());
            slot.delete_on_termination = Some(false);
        } else {
            instance.mappings.push(Mapping {
                device_path: Some(device_path.to_string()),
                volume_id: Some(volume_id.to_string()),
                delete_on_termination: Some(false),
            });
        }
        Ok(())
    }

    async fn set_delete_on_termination(
        &self,
        instance_id: &str,
        device_path: &str,
        delete_on_termination: bool,
    ) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::SetDeleteOnTermination {
            instance_id: instance_id.to_string(),
            device_path: device_path.to_string(),
            delete_on_termination,
        });
        state.check_fault("set_delete_on_termination", device_path)?;
        let instance = state.instance_mut(instance_id)?;
        let mapping = instance
            .mappings
            .iter_mut()
            .find(|mapping| {
                mapping.device_path.as_deref() == Some(device_path) && mapping.volume_id.is_some()
            })
            .ok_or_else(|| not_found(device_path))?;
        mapping.delete_on_termination = Some(delete_on_termination);
        let volume_id = mapping.volume_id.clone();
        if let Some(volume) = volume_id.and_then(|id| state.volumes.get_mut(&id)) {
            volume.record.delete_on_termination = Some(delete_on_termination);
        }
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::CreateTags {
            resource_id: resource_id.to_string(),
            tags: tags.to_vec(),
        });
        state.check_fault("create_tags", resource_id)?;
        let volume = state.volume_mut(resource_id)?;
        for tag in tags {
            volume.tags.retain(|existing| existing.key != tag.key);
            volume.tags.push(tag.clone());
        }
        Ok(())
    }

    async fn start_instance(&self, instance_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::StartInstance {
            instance_id: instance_id.to_string(),
        });
        state.check_fault("start_instance", instance_id)?;
        let polls = state.settle_polls;
        let instance = state.instance_mut(instance_id)?;
        instance
            .state
            .transition(InstanceState::Pending, InstanceState::Running, polls);
        Ok(())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        state.calls.push(ProviderCall::DeleteSnapshot {
            snapshot_id: snapshot_id.to_string(),
        });
        state.check_fault("delete_snapshot", snapshot_id)?;
        state
            .snapshots
            .remove(snapshot_id)
            .map(|_| ())
            .ok_or_else(|| not_found(snapshot_id))
    }
}
