use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusId(pub i64);

impl fmt::Display for StatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }

    /// Public and unlisted statuses may appear outside their author's followers.
    pub fn is_distributable(&self) -> bool {
        matches!(self, Self::Public | Self::Unlisted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown visibility '{0}'")]
pub struct ParseVisibilityError(pub String);

impl FromStr for Visibility {
    type Err = ParseVisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            "direct" => Ok(Self::Direct),
            other => Err(ParseVisibilityError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    /// `None` for accounts hosted on this server.
    pub domain: Option<String>,
}

impl Account {
    pub fn is_local(&self) -> bool {
        self.domain.is_none()
    }

    /// `user` for local accounts, `user@domain` for remote ones.
    pub fn acct(&self) -> String {
        match &self.domain {
            Some(domain) => format!("{}@{}", self.username, domain),
            None => self.username.clone(),
        }
    }
}

/// A published message, or a reblog of one.
///
/// Hashtags and mentions are not carried here: removal reads them in bulk
/// for the whole working set before anything is destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub account: Account,
    pub visibility: Visibility,
    pub local: bool,
    pub reblog_of_id: Option<StatusId>,
    pub media_attachment_ids: Vec<i64>,
    /// Set right before a batch destroy. Tells the store to skip the
    /// per-row bookkeeping (author and reblog counters).
    #[serde(skip)]
    pub mass_destruction: bool,
}

impl Status {
    pub fn is_reblog(&self) -> bool {
        self.reblog_of_id.is_some()
    }

    pub fn is_distributable(&self) -> bool {
        self.visibility.is_distributable()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn has_media(&self) -> bool {
        !self.media_attachment_ids.is_empty()
    }

    pub fn mark_for_mass_destruction(&mut self) {
        self.mass_destruction = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_round_trips_through_str() {
        for v in [Visibility::Public, Visibility::Unlisted, Visibility::Private, Visibility::Direct] {
            assert_eq!(v.as_str().parse::<Visibility>().unwrap(), v);
        }
        assert!("followers".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_distributable() {
        assert!(Visibility::Public.is_distributable());
        assert!(Visibility::Unlisted.is_distributable());
        assert!(!Visibility::Private.is_distributable());
        assert!(!Visibility::Direct.is_distributable());
    }

    #[test]
    fn test_acct() {
        let local = Account { id: AccountId(1), username: "alice".into(), domain: None };
        let remote = Account {
            id: AccountId(2),
            username: "bob".into(),
            domain: Some("example.social".into()),
        };
        assert!(local.is_local());
        assert_eq!(local.acct(), "alice");
        assert_eq!(remote.acct(), "bob@example.social");
    }
}
