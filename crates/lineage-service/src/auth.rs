use crate::{Result, ServiceError};
use lineage_core::{Author, EntityKey};

/// External identity and permission collaborator
///
/// Consulted before every mutating operation; reads are unrestricted.
pub trait AuthContext: Send + Sync {
    /// Resolve the acting identity
    fn current_user(&self) -> Result<Author>;

    /// Check that the identity may mutate the entity
    fn authorize(&self, _user: &Author, _entity: &EntityKey) -> Result<()> {
        Ok(())
    }
}

/// AuthContext with a fixed identity and no restrictions
///
/// Suitable for embedding, the CLI, and tests; real deployments plug in
/// their own AuthContext.
pub struct StaticAuth {
    user: Author,
}

impl StaticAuth {
    /// Create a StaticAuth acting as the given identity
    pub fn new(user: Author) -> Self {
        Self { user }
    }
}

impl AuthContext for StaticAuth {
    fn current_user(&self) -> Result<Author> {
        Ok(self.user.clone())
    }
}

/// AuthContext that refuses everything; useful in tests
pub struct DenyAll;

impl AuthContext for DenyAll {
    fn current_user(&self) -> Result<Author> {
        Err(ServiceError::permission_denied(
            "anonymous",
            "no identity available",
        ))
    }
}
