// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! Caller identity and authorization.

use affilink_audit::Actor;
use affilink_domain::ProfileId;

use crate::error::AuthError;

/// Identity of the caller as established by the transport layer.
///
/// The engine does not authenticate callers itself. Whatever sits in front
/// of it resolves a session into this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's profile id, or `None` for an anonymous call.
    pub caller_id: Option<String>,
    /// Whether the caller carries the admin claim.
    pub is_admin: bool,
}

impl CallerIdentity {
    #[must_use]
    pub fn affiliate(id: &str) -> Self {
        Self {
            caller_id: Some(id.to_string()),
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(id: &str) -> Self {
        Self {
            caller_id: Some(id.to_string()),
            is_admin: true,
        }
    }

    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            caller_id: None,
            is_admin: false,
        }
    }
}

/// Actor roles for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Operators who manage configuration, commissions and payouts for
    /// every profile.
    Admin,
    /// A marketplace profile acting on its own ledger.
    Affiliate,
}

/// An authenticated caller with an associated role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedActor {
    /// The caller's identifier. For affiliates this is their profile id.
    pub id: String,
    pub role: Role,
}

impl AuthenticatedActor {
    /// Creates a new authenticated actor.
    ///
    /// # Arguments
    ///
    /// * `id` - The unique identifier for this actor
    /// * `role` - The role assigned to this actor
    #[must_use]
    pub const fn new(id: String, role: Role) -> Self {
        Self { id, role }
    }

    /// Resolves a caller identity into an authenticated actor.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::AuthenticationFailed` if the caller is anonymous.
    pub fn authenticate(identity: &CallerIdentity) -> Result<Self, AuthError> {
        let id: &str = identity
            .caller_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::AuthenticationFailed {
                reason: String::from("caller is not signed in"),
            })?;
        let role: Role = if identity.is_admin {
            Role::Admin
        } else {
            Role::Affiliate
        };
        Ok(Self::new(id.to_string(), role))
    }

    /// Converts this authenticated actor into an audit Actor.
    #[must_use]
    pub fn to_audit_actor(&self) -> Actor {
        match self.role {
            Role::Admin => Actor::admin(&self.id),
            Role::Affiliate => Actor::affiliate(&self.id),
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Role and ownership checks for every callable operation.
pub struct AuthorizationService;

impl AuthorizationService {
    /// Checks that the actor is an admin.
    ///
    /// # Arguments
    ///
    /// * `actor` - The authenticated actor
    /// * `action` - Name of the attempted operation, for the error
    ///
    /// # Errors
    ///
    /// Returns an error if the actor does not have the Admin role.
    pub fn authorize_admin(actor: &AuthenticatedActor, action: &str) -> Result<(), AuthError> {
        match actor.role {
            Role::Admin => Ok(()),
            Role::Affiliate => Err(AuthError::Unauthorized {
                action: action.to_string(),
                required_role: String::from("Admin"),
            }),
        }
    }

    /// Checks that the actor reads a profile it may see: its own, or any
    /// profile for admins.
    ///
    /// # Errors
    ///
    /// Returns an error if an affiliate targets another profile.
    pub fn authorize_profile_read(
        actor: &AuthenticatedActor,
        profile_id: &ProfileId,
        action: &str,
    ) -> Result<(), AuthError> {
        if actor.is_admin() || actor.id == profile_id.as_str() {
            Ok(())
        } else {
            Err(AuthError::NotOwner {
                action: action.to_string(),
            })
        }
    }

    /// Checks that the actor acts on its own profile. Admins get no
    /// exemption.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor is not the profile owner.
    pub fn authorize_owner(
        actor: &AuthenticatedActor,
        profile_id: &ProfileId,
        action: &str,
    ) -> Result<(), AuthError> {
        if actor.id == profile_id.as_str() {
            Ok(())
        } else {
            Err(AuthError::NotOwner {
                action: action.to_string(),
            })
        }
    }
}
