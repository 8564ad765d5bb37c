//! Streaming channel names.
//!
//! Names are consumed verbatim by the streaming service, so they must stay
//! byte-for-byte stable.

use crate::models::{AccountId, Status};

pub const PUBLIC_LOCAL: &str = "timeline:public:local";
pub const PUBLIC_LOCAL_MEDIA: &str = "timeline:public:local:media";

/// `timeline:hashtag:<tag>`, tag lowercased with no other changes.
pub fn hashtag(tag: &str) -> String {
    format!("timeline:hashtag:{}", tag.to_lowercase())
}

/// `timeline:hashtag:<tag>:local`
pub fn hashtag_local(tag: &str) -> String {
    format!("timeline:hashtag:{}:local", tag.to_lowercase())
}

/// Per-account stream (home feed and notifications).
pub fn user(account_id: AccountId) -> String {
    format!("timeline:{}", account_id)
}

/// Per-account direct message stream.
pub fn direct(account_id: AccountId) -> String {
    format!("timeline:direct:{}", account_id)
}

/// Public channels a status is currently visible on, computed from its
/// visibility, locality, media and hashtags.
///
/// Any distributable local status reaches the local timelines; hashtag
/// timelines only carry public ones.
pub fn public_channels(status: &Status, tags: &[String]) -> Vec<String> {
    let mut channels = Vec::new();

    if !status.is_distributable() {
        return channels;
    }

    if status.local {
        channels.push(PUBLIC_LOCAL.to_string());
        if status.has_media() {
            channels.push(PUBLIC_LOCAL_MEDIA.to_string());
        }
    }

    if status.is_public() {
        for tag in tags {
            channels.push(hashtag(tag));
            if status.local {
                channels.push(hashtag_local(tag));
            }
        }
    }

    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, StatusId, Visibility};

    fn status(visibility: Visibility, local: bool, media: Vec<i64>) -> Status {
        Status {
            id: StatusId(1),
            account: Account { id: AccountId(9), username: "alice".into(), domain: None },
            visibility,
            local,
            reblog_of_id: None,
            media_attachment_ids: media,
            mass_destruction: false,
        }
    }

    #[test]
    fn test_public_local_with_media_and_tags() {
        let s = status(Visibility::Public, true, vec![1]);
        let tags = vec!["foo".to_string(), "BAR".to_string()];
        assert_eq!(
            public_channels(&s, &tags),
            vec![
                "timeline:public:local",
                "timeline:public:local:media",
                "timeline:hashtag:foo",
                "timeline:hashtag:foo:local",
                "timeline:hashtag:bar",
                "timeline:hashtag:bar:local",
            ]
        );
    }

    #[test]
    fn test_remote_public_only_gets_global_hashtags() {
        let s = status(Visibility::Public, false, vec![1]);
        let tags = vec!["Rust".to_string()];
        assert_eq!(public_channels(&s, &tags), vec!["timeline:hashtag:rust"]);
    }

    #[test]
    fn test_unlisted_local_skips_hashtags() {
        let s = status(Visibility::Unlisted, true, vec![1]);
        let tags = vec!["foo".to_string()];
        assert_eq!(
            public_channels(&s, &tags),
            vec!["timeline:public:local", "timeline:public:local:media"]
        );
    }

    #[test]
    fn test_unlisted_remote_has_no_public_channels() {
        let s = status(Visibility::Unlisted, false, vec![1]);
        assert!(public_channels(&s, &["foo".to_string()]).is_empty());
    }

    #[test]
    fn test_private_and_direct_have_no_public_channels() {
        let tags = vec!["foo".to_string()];
        for v in [Visibility::Private, Visibility::Direct] {
            assert!(public_channels(&status(v, true, vec![1]), &tags).is_empty());
        }
    }

    #[test]
    fn test_hashtag_case_folding_keeps_inner_characters() {
        assert_eq!(hashtag("Ünïcode_Tag"), "timeline:hashtag:ünïcode_tag");
        assert_eq!(hashtag_local("ABC"), "timeline:hashtag:abc:local");
    }

    #[test]
    fn test_account_streams() {
        assert_eq!(user(AccountId(42)), "timeline:42");
        assert_eq!(direct(AccountId(42)), "timeline:direct:42");
    }
}
