//! Lease backend contract and an in-memory simulation of it.
//!
//! The engine only advises a zone and start time. The backend is the
//! authority on whether a lease can actually be created and must reject
//! over-subscription itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use envboot_core::{AllocationSnapshot, EngineError, ReservationWindow, ResourceRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by a lease backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("lease not found: {0}")]
    LeaseNotFound(String),

    #[error("zone {zone} cannot hold {requested} more node(s); {available} free")]
    OverSubscribed {
        zone: String,
        requested: u32,
        available: i64,
    },

    #[error("zone not offered by backend: {0}")]
    UnknownZone(String),

    #[error("invalid lease request: {0}")]
    InvalidRequest(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Pending,
    Active,
    Deleted,
}

/// Everything a backend needs to create one lease.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseRequest {
    pub name: String,
    pub zone: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub flavor: String,
    pub count: u32,
    pub profile: ResourceRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseReceipt {
    pub lease_id: String,
    pub status: LeaseStatus,
}

/// Create, inspect and remove reservations.
///
/// `create` is a single atomic external operation. Implementations must not
/// retry internally; retry policy belongs to the caller.
pub trait LeaseBackend {
    fn create(&mut self, request: &LeaseRequest) -> BackendResult<LeaseReceipt>;
    fn query(&self, lease_id: &str) -> BackendResult<LeaseStatus>;
    fn delete(&mut self, lease_id: &str) -> BackendResult<LeaseStatus>;
}

#[derive(Debug, Clone)]
struct SimulatedLease {
    request: LeaseRequest,
    status: LeaseStatus,
}

/// Backend seeded from an allocation snapshot.
///
/// Each created lease occupies `count` nodes for its window on top of the
/// snapshot's reservations, so a second lease for the same capacity is
/// rejected.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    snapshot: AllocationSnapshot,
    leases: BTreeMap<String, SimulatedLease>,
    next_id: u64,
    outage: Option<String>,
}

impl SimulatedBackend {
    pub fn new(snapshot: AllocationSnapshot) -> Self {
        Self {
            snapshot,
            leases: BTreeMap::new(),
            next_id: 1,
            outage: None,
        }
    }

    /// A backend whose every call fails with `Unavailable(reason)`.
    pub fn unavailable(snapshot: AllocationSnapshot, reason: impl Into<String>) -> Self {
        Self {
            outage: Some(reason.into()),
            ..Self::new(snapshot)
        }
    }

    /// Number of leases that have not been deleted.
    pub fn active_leases(&self) -> usize {
        self.leases
            .values()
            .filter(|l| l.status != LeaseStatus::Deleted)
            .count()
    }

    pub fn lease(&self, lease_id: &str) -> Option<&LeaseRequest> {
        self.leases.get(lease_id).map(|l| &l.request)
    }

    fn check_outage(&self) -> BackendResult<()> {
        match &self.outage {
            Some(reason) => Err(BackendError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    /// The snapshot with this backend's live leases added to `zone`.
    fn occupied(&self, zone: &str) -> BackendResult<AllocationSnapshot> {
        let allocation = self
            .snapshot
            .zone(zone)
            .map_err(|_| BackendError::UnknownZone(zone.to_string()))?;

        let mut windows = allocation.windows.clone();
        for (id, lease) in &self.leases {
            if lease.status == LeaseStatus::Deleted || lease.request.zone != zone {
                continue;
            }
            for i in 0..lease.request.count {
                let window = ReservationWindow::new(
                    format!("{id}/{i}"),
                    lease.request.start,
                    lease.request.end,
                )
                .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;
                windows.push(window);
            }
        }
        Ok(self
            .snapshot
            .clone()
            .with_zone(zone, allocation.total_nodes, windows))
    }
}

impl LeaseBackend for SimulatedBackend {
    fn create(&mut self, request: &LeaseRequest) -> BackendResult<LeaseReceipt> {
        self.check_outage()?;
        if request.count == 0 {
            return Err(BackendError::InvalidRequest("count must be >= 1".to_string()));
        }
        if request.start >= request.end {
            return Err(BackendError::InvalidRequest(format!(
                "start {} is not before end {}",
                request.start, request.end
            )));
        }

        let occupied = self.occupied(&request.zone)?;
        let available = envboot_scheduler::min_free_over(
            &occupied,
            &request.zone,
            request.start,
            request.end,
        )
        .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;

        if available < i64::from(request.count) {
            warn!(
                zone = %request.zone,
                requested = request.count,
                available,
                "lease rejected: over-subscribed"
            );
            return Err(BackendError::OverSubscribed {
                zone: request.zone.clone(),
                requested: request.count,
                available,
            });
        }

        let lease_id = format!("sim-lease-{:04}", self.next_id);
        self.next_id += 1;
        self.leases.insert(
            lease_id.clone(),
            SimulatedLease {
                request: request.clone(),
                status: LeaseStatus::Active,
            },
        );
        info!(
            lease_id = %lease_id,
            name = %request.name,
            zone = %request.zone,
            count = request.count,
            "lease created"
        );

        Ok(LeaseReceipt {
            lease_id,
            status: LeaseStatus::Active,
        })
    }

    fn query(&self, lease_id: &str) -> BackendResult<LeaseStatus> {
        self.check_outage()?;
        self.leases
            .get(lease_id)
            .map(|l| l.status)
            .ok_or_else(|| BackendError::LeaseNotFound(lease_id.to_string()))
    }

    fn delete(&mut self, lease_id: &str) -> BackendResult<LeaseStatus> {
        self.check_outage()?;
        let lease = self
            .leases
            .get_mut(lease_id)
            .ok_or_else(|| BackendError::LeaseNotFound(lease_id.to_string()))?;
        lease.status = LeaseStatus::Deleted;
        debug!(lease_id, "lease deleted");
        Ok(LeaseStatus::Deleted)
    }
}
