/// Synchronization mechanisms.
///
/// A mechanism is one strategy for reconciling the local chain with a peer after a
/// block arrives. The synchronizer asks each registered mechanism, in order, whether
/// it applies to the block and runs the first one that does.
use anyhow::Result;
use async_trait::async_trait;
use containers::Block;
use futures::future::{BoxFuture, FutureExt};
use libp2p_identity::PeerId;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::SyncError;

#[async_trait]
pub trait Mechanism: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Whether this mechanism should handle `block`.
    ///
    /// May query local state. Called for candidates that end up not being selected,
    /// so it must not mutate anything.
    async fn is_valid_for(&self, block: &Block) -> Result<bool>;

    /// Reconcile the local chain using `peer_id`, the peer that sent `block`.
    async fn run(&self, block: &Block, peer_id: &PeerId) -> Result<()>;
}

fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub type IsValidForFn = Arc<dyn Fn(Block) -> BoxFuture<'static, Result<bool>> + Send + Sync>;
pub type RunFn = Arc<dyn Fn(Block, PeerId) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A mechanism assembled at runtime from configuration rather than a concrete type.
///
/// Both operations are optional while the definition is being put together.
/// [`MechanismDefinition::build`] refuses incomplete definitions, so a
/// [`DynamicMechanism`] always has both.
#[derive(Clone)]
pub struct MechanismDefinition {
    name: String,
    is_valid_for: Option<IsValidForFn>,
    run: Option<RunFn>,
}

impl MechanismDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_valid_for: None,
            run: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_is_valid_for<F, Fut>(mut self, is_valid_for: F) -> Self
    where
        F: Fn(Block) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        self.is_valid_for = Some(Arc::new(move |block| is_valid_for(block).boxed()));
        self
    }

    pub fn with_run<F, Fut>(mut self, run: F) -> Self
    where
        F: Fn(Block, PeerId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |block, peer_id| run(block, peer_id).boxed()));
        self
    }

    /// Check the definition implements the whole mechanism contract.
    pub fn build(self) -> Result<DynamicMechanism, SyncError> {
        let Some(is_valid_for) = self.is_valid_for else {
            return Err(SyncError::MechanismContract {
                mechanism: self.name,
                operation: "isValidFor",
            });
        };
        let Some(run) = self.run else {
            return Err(SyncError::MechanismContract {
                mechanism: self.name,
                operation: "run",
            });
        };

        Ok(DynamicMechanism {
            name: self.name,
            is_valid_for,
            run,
        })
    }
}

impl fmt::Debug for MechanismDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MechanismDefinition")
            .field("name", &self.name)
            .field("is_valid_for", &self.is_valid_for.is_some())
            .field("run", &self.run.is_some())
            .finish()
    }
}

/// A complete, runtime-assembled mechanism.
pub struct DynamicMechanism {
    name: String,
    is_valid_for: IsValidForFn,
    run: RunFn,
}

#[async_trait]
impl Mechanism for DynamicMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_valid_for(&self, block: &Block) -> Result<bool> {
        (self.is_valid_for)(block.clone()).await
    }

    async fn run(&self, block: &Block, peer_id: &PeerId) -> Result<()> {
        (self.run)(block.clone(), *peer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containers::{Bytes32, Height};

    fn block() -> Block {
        Block::new(Height(1), Bytes32::ZERO, 2, 0, Height(0), vec![])
    }

    struct NamedMechanism;

    #[async_trait]
    impl Mechanism for NamedMechanism {
        async fn is_valid_for(&self, _block: &Block) -> Result<bool> {
            Ok(false)
        }

        async fn run(&self, _block: &Block, _peer_id: &PeerId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert_eq!(NamedMechanism.name(), "NamedMechanism");
        assert_eq!(short_type_name("a::b::Outer<c::Inner>"), "Outer");
    }

    #[test]
    fn test_build_requires_is_valid_for() {
        let err = MechanismDefinition::new("partial")
            .with_run(|_, _| async { Ok(()) })
            .build()
            .err()
            .unwrap();

        assert!(matches!(
            err,
            SyncError::MechanismContract {
                operation: "isValidFor",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Mechanism Object should implement \"isValidFor\" method"
        );
    }

    #[test]
    fn test_build_requires_run() {
        let err = MechanismDefinition::new("partial")
            .with_is_valid_for(|_| async { Ok(true) })
            .build()
            .err()
            .unwrap();

        assert!(matches!(err, SyncError::MechanismContract { operation: "run", .. }));
        assert_eq!(err.to_string(), "Mechanism Object should implement \"run\" method");
    }

    #[tokio::test]
    async fn test_dynamic_mechanism_delegates_to_closures() {
        let mechanism = MechanismDefinition::new("configured")
            .with_is_valid_for(|block: Block| async move { Ok(block.height() == Height(1)) })
            .with_run(|_, _| async { anyhow::bail!("peer went away") })
            .build()
            .unwrap();

        assert_eq!(mechanism.name(), "configured");
        assert!(mechanism.is_valid_for(&block()).await.unwrap());
        let err = mechanism.run(&block(), &PeerId::random()).await.unwrap_err();
        assert_eq!(err.to_string(), "peer went away");
    }
}
