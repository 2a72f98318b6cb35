//! Per-contributor limits

use crate::entry::ContributorId;
use mbq_common::config::PermissionSettings;
use std::time::Duration;

/// Answers permission questions about a contributor
pub trait PermissionLookup: Send + Sync {
    /// Longest item the contributor may enqueue; None means unlimited
    fn max_song_length(&self, contributor: ContributorId) -> Option<Duration>;
}

/// Named set of contributors sharing a limit
#[derive(Debug, Clone)]
struct Group {
    name: String,
    members: Vec<ContributorId>,
    max_song_length: Option<Duration>,
}

/// Permission lookup backed by configured groups
///
/// A contributor belongs to the first group listing them; everyone else
/// gets the default limit.
#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    groups: Vec<Group>,
    default_max_song_length: Option<Duration>,
}

impl PermissionTable {
    /// Table with no groups and no limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &PermissionSettings) -> Self {
        Self {
            groups: settings
                .groups
                .iter()
                .map(|g| Group {
                    name: g.name.clone(),
                    members: g.user_ids.clone(),
                    max_song_length: g.max_song_length(),
                })
                .collect(),
            default_max_song_length: settings.default_max_song_length(),
        }
    }

    /// Name of the group `contributor` belongs to
    pub fn group_of(&self, contributor: ContributorId) -> Option<&str> {
        self.find(contributor).map(|g| g.name.as_str())
    }

    fn find(&self, contributor: ContributorId) -> Option<&Group> {
        self.groups.iter().find(|g| g.members.contains(&contributor))
    }
}

impl PermissionLookup for PermissionTable {
    fn max_song_length(&self, contributor: ContributorId) -> Option<Duration> {
        match self.find(contributor) {
            Some(group) => group.max_song_length,
            None => self.default_max_song_length,
        }
    }
}
