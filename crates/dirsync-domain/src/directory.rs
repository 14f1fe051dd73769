//! Narrow interface onto the external directory service.
//!
//! The wire protocol and attribute mapping live behind [`DirectoryClient`];
//! this crate only consumes the already-mapped [`RawEntry`] values.

use async_trait::async_trait;

use crate::error::DirectoryError;

/// A group object as returned by the directory, before parent resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Group name (unique within a scope, compared case-insensitively).
    pub name: String,
    /// Distinguished name, e.g. `CN=Ops,OU=Groups,DC=corp`.
    pub dn: String,
    pub description: Option<String>,
    /// Candidate parent references in directory order (DNs or plain names).
    pub parents: Vec<String>,
    /// Raw member references, possibly containing blanks or `null` markers.
    pub members: Vec<String>,
    /// Explicit manager group, if the directory carries one.
    pub manager_group: Option<String>,
}

impl RawEntry {
    pub fn new(name: impl Into<String>, dn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dn: dn.into(),
            ..Default::default()
        }
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_manager_group(mut self, manager_group: impl Into<String>) -> Self {
        self.manager_group = Some(manager_group.into());
        self
    }
}

/// Identifies the identity whose group memberships are requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityQuery {
    /// Login or account name.
    pub identity: String,
    /// Scope the identity belongs to.
    pub scope: String,
    /// Distinguished name of the identity, when already known.
    pub dn: Option<String>,
}

impl IdentityQuery {
    pub fn new(identity: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            scope: scope.into(),
            dn: None,
        }
    }

    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }
}

/// Query capability of the directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetches every group entry of a scope.
    async fn fetch_scope_entries(&self, scope: &str) -> Result<Vec<RawEntry>, DirectoryError>;

    /// Fetches the groups an identity is a direct member of.
    async fn fetch_user_groups(
        &self,
        query: &IdentityQuery,
    ) -> Result<Vec<RawEntry>, DirectoryError>;
}
