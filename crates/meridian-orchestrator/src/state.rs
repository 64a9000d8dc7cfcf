//! Typestate pattern for the deployment state machine.
//!
//! States are encoded in the type system so invalid transitions are a
//! compile-time error. The store remains the source of truth: every typed
//! transition is paired with a compare-and-set write, so a record that moved
//! underneath us surfaces as [`crate::OrchestratorError::StaleState`] rather
//! than a silent overwrite.
//!
//! ```text
//! Pending ──▶ Deploying ──▶ Active ──▶ Inactive | RolledBack
//!    │            │            │
//!    ▼            ▼            ▼
//!  Failed       Failed     Undeployed ◀── Failed
//! ```

use std::marker::PhantomData;

use chrono::Utc;
use meridian_core::DeploymentId;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::{DeployState, DeploymentData};

// =============================================================================
// State marker types (zero-sized)
// =============================================================================

/// Marker trait for deployment states.
pub trait DeploymentState: private::Sealed + Send + Sync {
    /// Get the persisted state representation.
    fn persisted() -> DeployState;

    /// Get the state name for error messages.
    fn name() -> &'static str;
}

mod private {
    pub trait Sealed {}
}

/// Record created, provisioning not started.
#[derive(Debug, Clone, Copy)]
pub struct Pending;

/// Infrastructure provisioning in progress.
#[derive(Debug, Clone, Copy)]
pub struct Deploying;

/// Serving production traffic.
#[derive(Debug, Clone, Copy)]
pub struct Active;

/// Provisioning or cutover failed.
#[derive(Debug, Clone, Copy)]
pub struct Failed;

/// Left service via an automated rollback.
#[derive(Debug, Clone, Copy)]
pub struct RolledBack;

/// Explicitly torn down.
#[derive(Debug, Clone, Copy)]
pub struct Undeployed;

/// Left service because a newer deployment took over its traffic.
#[derive(Debug, Clone, Copy)]
pub struct Inactive;

impl private::Sealed for Pending {}
impl private::Sealed for Deploying {}
impl private::Sealed for Active {}
impl private::Sealed for Failed {}
impl private::Sealed for RolledBack {}
impl private::Sealed for Undeployed {}
impl private::Sealed for Inactive {}

impl DeploymentState for Pending {
    fn persisted() -> DeployState {
        DeployState::Pending
    }
    fn name() -> &'static str {
        "pending"
    }
}

impl DeploymentState for Deploying {
    fn persisted() -> DeployState {
        DeployState::Deploying
    }
    fn name() -> &'static str {
        "deploying"
    }
}

impl DeploymentState for Active {
    fn persisted() -> DeployState {
        DeployState::Active
    }
    fn name() -> &'static str {
        "active"
    }
}

impl DeploymentState for Failed {
    fn persisted() -> DeployState {
        DeployState::Failed
    }
    fn name() -> &'static str {
        "failed"
    }
}

impl DeploymentState for RolledBack {
    fn persisted() -> DeployState {
        DeployState::RolledBack
    }
    fn name() -> &'static str {
        "rolled_back"
    }
}

impl DeploymentState for Undeployed {
    fn persisted() -> DeployState {
        DeployState::Undeployed
    }
    fn name() -> &'static str {
        "undeployed"
    }
}

impl DeploymentState for Inactive {
    fn persisted() -> DeployState {
        DeployState::Inactive
    }
    fn name() -> &'static str {
        "inactive"
    }
}

// =============================================================================
// Deployment struct parameterised by state
// =============================================================================

/// A deployment in a specific state.
///
/// The state parameter `S` determines which transitions are available.
#[derive(Debug)]
pub struct Deployment<S: DeploymentState> {
    data: DeploymentData,
    _state: PhantomData<S>,
}

impl<S: DeploymentState> Deployment<S> {
    /// Get a reference to the deployment data.
    #[must_use]
    pub const fn data(&self) -> &DeploymentData {
        &self.data
    }

    /// Get the deployment ID.
    #[must_use]
    pub const fn id(&self) -> &DeploymentId {
        &self.data.id
    }

    /// Get the current state as a persisted value.
    #[must_use]
    pub fn state(&self) -> DeployState {
        S::persisted()
    }

    /// Convert into the underlying data (consuming the deployment).
    #[must_use]
    pub fn into_data(self) -> DeploymentData {
        self.data
    }

    fn transition<T: DeploymentState>(self) -> Deployment<T> {
        Deployment {
            data: self.data,
            _state: PhantomData,
        }
    }

    fn transition_with<T: DeploymentState>(
        mut self,
        f: impl FnOnce(&mut DeploymentData),
    ) -> Deployment<T> {
        f(&mut self.data);
        self.data.updated_at = Utc::now();
        Deployment {
            data: self.data,
            _state: PhantomData,
        }
    }
}

// =============================================================================
// State transitions
// =============================================================================

impl Deployment<Pending> {
    /// Create a new deployment in the pending state.
    #[must_use]
    pub const fn create(data: DeploymentData) -> Self {
        Self {
            data,
            _state: PhantomData,
        }
    }

    /// Begin provisioning.
    #[must_use]
    pub fn start_deploying(self) -> Deployment<Deploying> {
        self.transition()
    }

    /// Fail before provisioning starts.
    #[must_use]
    pub fn fail(self, reason: String) -> Deployment<Failed> {
        self.transition_with(|data| {
            data.failure_reason = Some(reason);
        })
    }
}

impl Deployment<Deploying> {
    /// Provisioning succeeded: the deployment begins serving traffic.
    ///
    /// Stamps `deployed_at` and `activated_at` and records the assigned
    /// endpoint and infrastructure handle.
    #[must_use]
    pub fn activate(self, endpoint: String, infra_handle: String) -> Deployment<Active> {
        self.transition_with(|data| {
            let now = Utc::now();
            data.endpoint = Some(endpoint);
            data.infra_handle = Some(infra_handle);
            data.deployed_at = Some(now);
            data.activated_at = Some(now);
        })
    }

    /// An infrastructure step failed.
    #[must_use]
    pub fn fail(self, reason: String) -> Deployment<Failed> {
        self.transition_with(|data| {
            data.failure_reason = Some(reason);
        })
    }
}

impl Deployment<Active> {
    /// A newer deployment took over this record's traffic via cutover.
    #[must_use]
    pub fn mark_inactive(self, successor: DeploymentId) -> Deployment<Inactive> {
        self.transition_with(|data| {
            data.superseded_by = Some(successor);
            data.rolled_back_at = Some(Utc::now());
        })
    }

    /// An automated (drift-triggered) rollback moved traffic away.
    #[must_use]
    pub fn mark_rolled_back(self, successor: DeploymentId) -> Deployment<RolledBack> {
        self.transition_with(|data| {
            data.superseded_by = Some(successor);
            data.rolled_back_at = Some(Utc::now());
        })
    }

    /// Explicit teardown.
    #[must_use]
    pub fn undeploy(self) -> Deployment<Undeployed> {
        self.transition_with(|data| {
            data.undeployed_at = Some(Utc::now());
        })
    }
}

impl Deployment<Failed> {
    /// Tear down a failed deployment's remains.
    #[must_use]
    pub fn undeploy(self) -> Deployment<Undeployed> {
        self.transition_with(|data| {
            data.undeployed_at = Some(Utc::now());
        })
    }
}

// =============================================================================
// Loading from persisted state
// =============================================================================

/// A type-erased deployment that can be in any state.
///
/// Used when loading from the store, where the state is not known at
/// compile time.
#[derive(Debug)]
pub enum AnyDeployment {
    /// Deployment in pending state.
    Pending(Deployment<Pending>),
    /// Deployment in deploying state.
    Deploying(Deployment<Deploying>),
    /// Deployment in active state.
    Active(Deployment<Active>),
    /// Deployment in failed state.
    Failed(Deployment<Failed>),
    /// Deployment in rolled-back state.
    RolledBack(Deployment<RolledBack>),
    /// Deployment in undeployed state.
    Undeployed(Deployment<Undeployed>),
    /// Deployment in inactive state.
    Inactive(Deployment<Inactive>),
}

impl AnyDeployment {
    /// Create an `AnyDeployment` from data and persisted state.
    #[must_use]
    pub const fn from_persisted(data: DeploymentData, state: DeployState) -> Self {
        match state {
            DeployState::Pending => Self::Pending(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::Deploying => Self::Deploying(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::Active => Self::Active(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::Failed => Self::Failed(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::RolledBack => Self::RolledBack(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::Undeployed => Self::Undeployed(Deployment {
                data,
                _state: PhantomData,
            }),
            DeployState::Inactive => Self::Inactive(Deployment {
                data,
                _state: PhantomData,
            }),
        }
    }

    /// Get a reference to the deployment data.
    #[must_use]
    pub const fn data(&self) -> &DeploymentData {
        match self {
            Self::Pending(d) => d.data(),
            Self::Deploying(d) => d.data(),
            Self::Active(d) => d.data(),
            Self::Failed(d) => d.data(),
            Self::RolledBack(d) => d.data(),
            Self::Undeployed(d) => d.data(),
            Self::Inactive(d) => d.data(),
        }
    }

    /// Get the current state.
    #[must_use]
    pub const fn state(&self) -> DeployState {
        match self {
            Self::Pending(_) => DeployState::Pending,
            Self::Deploying(_) => DeployState::Deploying,
            Self::Active(_) => DeployState::Active,
            Self::Failed(_) => DeployState::Failed,
            Self::RolledBack(_) => DeployState::RolledBack,
            Self::Undeployed(_) => DeployState::Undeployed,
            Self::Inactive(_) => DeployState::Inactive,
        }
    }

    /// Try to extract an active deployment.
    pub fn try_into_active(self) -> OrchestratorResult<Deployment<Active>> {
        match self {
            Self::Active(d) => Ok(d),
            other => Err(OrchestratorError::InvalidStateTransition {
                from: other.state().as_str(),
                to: "active",
            }),
        }
    }

}
