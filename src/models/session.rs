//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Server-side anchor of one login lineage.
///
/// Sessions start valid and can only be revoked; a revoked session is kept
/// for audit and never becomes valid again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (embedded in every token issued for this login)
    pub id: Uuid,
    /// Associated user ID
    pub user_id: Uuid,
    /// Validity flag, the only revocation mechanism
    pub valid: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new, valid session
    pub fn new(id: Uuid, user_id: Uuid) -> Self {
        Self {
            id,
            user_id,
            valid: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_valid() {
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(session.valid);
    }
}
