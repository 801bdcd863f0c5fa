use std::fmt;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Channel permission mask as carried on the Mumble control channel.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Permissions: u32 {
        const WRITE = 0x1;
        const TRAVERSE = 0x2;
        const ENTER = 0x4;
        const SPEAK = 0x8;
        const MUTE_DEAFEN = 0x10;
        const MOVE = 0x20;
        const MAKE_CHANNEL = 0x40;
        const LINK_CHANNEL = 0x80;
        const WHISPER = 0x100;
        const TEXT_MESSAGE = 0x200;
        const MAKE_TEMP_CHANNEL = 0x400;
        const KICK = 0x10000;
        const BAN = 0x20000;
        const REGISTER = 0x40000;
        const SELF_REGISTER = 0x80000;
        const CACHED = 0x8000000;
        const ALL = 0xf07ff;
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AclError {
    EmptyGroupName,
    ExcludedMember(u32),
    DuplicateGroup(String),
}

impl fmt::Display for AclError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclError::EmptyGroupName => write!(f, "group name must not be empty"),
            AclError::ExcludedMember(id) => {
                write!(f, "user {id} is both a member and an excluded member")
            }
            AclError::DuplicateGroup(name) => {
                write!(f, "duplicate group name: {name}")
            }
        }
    }
}

impl std::error::Error for AclError {}

/// Target of an ACL entry. A rule applies either to a single registered
/// user or to a named group, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclTarget {
    User(u32),
    Group(String),
}

/// One access-control entry attached to a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAcl {
    pub apply_here: bool,
    pub apply_subs: bool,
    pub inherited: bool,
    target: AclTarget,
    pub grant: Permissions,
    pub deny: Permissions,
}

impl ChannelAcl {
    pub fn new(target: AclTarget, grant: Permissions, deny: Permissions) -> Result<Self, AclError> {
        if let AclTarget::Group(name) = &target {
            if name.is_empty() {
                return Err(AclError::EmptyGroupName);
            }
        }
        Ok(Self {
            apply_here: true,
            apply_subs: true,
            inherited: false,
            target,
            grant,
            deny,
        })
    }

    pub fn for_user(user_id: u32, grant: Permissions, deny: Permissions) -> Self {
        Self {
            apply_here: true,
            apply_subs: true,
            inherited: false,
            target: AclTarget::User(user_id),
            grant,
            deny,
        }
    }

    pub fn for_group(
        name: impl Into<String>,
        grant: Permissions,
        deny: Permissions,
    ) -> Result<Self, AclError> {
        Self::new(AclTarget::Group(name.into()), grant, deny)
    }

    pub fn target(&self) -> &AclTarget {
        &self.target
    }

    pub fn has_user_id(&self) -> bool {
        matches!(self.target, AclTarget::User(_))
    }

    pub fn user_id(&self) -> Option<u32> {
        match self.target {
            AclTarget::User(id) => Some(id),
            AclTarget::Group(_) => None,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match &self.target {
            AclTarget::User(_) => None,
            AclTarget::Group(name) => Some(name),
        }
    }
}

/// A named group of users scoped to a channel.
///
/// Member lists keep their insertion order. `members` holds users added at
/// this channel, `excluded_members` users excluded despite inheritance, and
/// `inherited_members` users contributed by an ancestor channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroup {
    name: String,
    pub inherited: bool,
    pub inherit: bool,
    pub inheritable: bool,
    members: Vec<u32>,
    excluded_members: Vec<u32>,
    inherited_members: Vec<u32>,
}

impl ChannelGroup {
    pub fn new(
        name: impl Into<String>,
        members: Vec<u32>,
        excluded_members: Vec<u32>,
        inherited_members: Vec<u32>,
    ) -> Result<Self, AclError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AclError::EmptyGroupName);
        }
        let members = dedup_preserving_order(members);
        let excluded_members = dedup_preserving_order(excluded_members);
        let inherited_members = dedup_preserving_order(inherited_members);
        if let Some(id) = members
            .iter()
            .copied()
            .find(|id| excluded_members.contains(id))
        {
            return Err(AclError::ExcludedMember(id));
        }
        Ok(Self {
            name,
            inherited: false,
            inherit: true,
            inheritable: true,
            members,
            excluded_members,
            inherited_members,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[u32] {
        &self.members
    }

    pub fn excluded_members(&self) -> &[u32] {
        &self.excluded_members
    }

    pub fn inherited_members(&self) -> &[u32] {
        &self.inherited_members
    }

    /// Membership after inheritance is applied: inherited members (when
    /// `inherit` is set) followed by local members, minus exclusions.
    pub fn effective_members(&self) -> Vec<u32> {
        let mut effective = Vec::new();
        if self.inherit {
            for id in &self.inherited_members {
                if !self.excluded_members.contains(id) {
                    effective.push(*id);
                }
            }
        }
        for id in &self.members {
            if !effective.contains(id) {
                effective.push(*id);
            }
        }
        effective
    }
}

/// Full access-control state of one channel. Replaced wholesale whenever
/// the server sends a new ACL message for the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    pub channel_id: u32,
    pub inherit_acls: bool,
    pub groups: Vec<ChannelGroup>,
    pub acls: Vec<ChannelAcl>,
}

impl AccessControl {
    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id,
            inherit_acls: true,
            groups: Vec::new(),
            acls: Vec::new(),
        }
    }

    /// Group names must be unique within a channel's group set.
    pub fn validate(&self) -> Result<(), AclError> {
        for (index, group) in self.groups.iter().enumerate() {
            if self.groups[..index].iter().any(|g| g.name == group.name) {
                return Err(AclError::DuplicateGroup(group.name.clone()));
            }
        }
        Ok(())
    }

    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|group| group.name == name)
    }
}

fn dedup_preserving_order(ids: Vec<u32>) -> Vec<u32> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{AccessControl, AclError, AclTarget, ChannelAcl, ChannelGroup, Permissions};

    /// User-targeted entries report a user id and no group.
    #[test]
    fn acl_user_target_has_user_id() {
        // Arrange
        // Act
        let acl = ChannelAcl::for_user(7, Permissions::SPEAK, Permissions::empty());
        // Assert
        assert!(acl.has_user_id());
        assert_eq!(acl.user_id(), Some(7));
        assert_eq!(acl.group(), None);
    }

    /// Group-targeted entries report a group name and no user id.
    #[test]
    fn acl_group_target_has_no_user_id() {
        // Arrange
        // Act
        let acl = ChannelAcl::for_group("admin", Permissions::ALL, Permissions::empty())
            .expect("group acl");
        // Assert
        assert!(!acl.has_user_id());
        assert_eq!(acl.user_id(), None);
        assert_eq!(acl.group(), Some("admin"));
    }

    /// Empty group names are rejected at construction.
    #[test]
    fn acl_rejects_empty_group_name() {
        // Arrange
        // Act
        let err = ChannelAcl::for_group("", Permissions::empty(), Permissions::empty())
            .expect_err("expected empty name to fail");
        // Assert
        assert_eq!(err, AclError::EmptyGroupName);
    }

    /// New entries apply to the channel and sub-channels by default.
    #[test]
    fn acl_defaults_apply_everywhere() {
        // Arrange
        // Act
        let acl = ChannelAcl::for_user(1, Permissions::ENTER, Permissions::empty());
        // Assert
        assert!(acl.apply_here);
        assert!(acl.apply_subs);
        assert!(!acl.inherited);
    }

    /// Group construction rejects a user both added and excluded.
    #[test]
    fn group_rejects_member_overlap() {
        // Arrange
        // Act
        let err = ChannelGroup::new("ops", vec![1, 2], vec![2], Vec::new())
            .expect_err("expected overlap to fail");
        // Assert
        assert_eq!(err, AclError::ExcludedMember(2));
    }

    /// Group construction rejects an empty name.
    #[test]
    fn group_rejects_empty_name() {
        // Arrange
        // Act
        let err = ChannelGroup::new("", Vec::new(), Vec::new(), Vec::new())
            .expect_err("expected empty name to fail");
        // Assert
        assert_eq!(err, AclError::EmptyGroupName);
    }

    /// Member lists preserve insertion order and drop duplicates.
    #[test]
    fn group_preserves_member_order() {
        // Arrange
        // Act
        let group =
            ChannelGroup::new("ops", vec![3, 1, 3, 2], Vec::new(), Vec::new()).expect("group");
        // Assert
        assert_eq!(group.members(), &[3, 1, 2]);
    }

    /// Effective membership unions inherited and local members.
    #[test]
    fn group_effective_members_unions_inherited() {
        // Arrange
        let group = ChannelGroup::new("ops", vec![4, 5], Vec::new(), vec![1, 2]).expect("group");
        // Act
        let effective = group.effective_members();
        // Assert
        assert_eq!(effective, vec![1, 2, 4, 5]);
    }

    /// Exclusions remove inherited members from the effective set.
    #[test]
    fn group_effective_members_applies_exclusions() {
        // Arrange
        let group = ChannelGroup::new("ops", vec![4], vec![2], vec![1, 2]).expect("group");
        // Act
        let effective = group.effective_members();
        // Assert
        assert_eq!(effective, vec![1, 4]);
    }

    /// Inherited members are ignored when inheritance is disabled.
    #[test]
    fn group_effective_members_respects_inherit_flag() {
        // Arrange
        let mut group = ChannelGroup::new("ops", vec![4], Vec::new(), vec![1, 2]).expect("group");
        group.inherit = false;
        // Act
        let effective = group.effective_members();
        // Assert
        assert_eq!(effective, vec![4]);
    }

    /// Local members already inherited are not listed twice.
    #[test]
    fn group_effective_members_has_no_duplicates() {
        // Arrange
        let group = ChannelGroup::new("ops", vec![2, 3], Vec::new(), vec![1, 2]).expect("group");
        // Act
        let effective = group.effective_members();
        // Assert
        assert_eq!(effective, vec![1, 2, 3]);
    }

    /// Access control validation rejects duplicate group names.
    #[test]
    fn access_control_rejects_duplicate_groups() {
        // Arrange
        let mut access_control = AccessControl::new(1);
        access_control
            .groups
            .push(ChannelGroup::new("ops", Vec::new(), Vec::new(), Vec::new()).expect("group"));
        access_control
            .groups
            .push(ChannelGroup::new("ops", vec![1], Vec::new(), Vec::new()).expect("group"));
        // Act
        let err = access_control.validate().expect_err("expected duplicate");
        // Assert
        assert_eq!(err, AclError::DuplicateGroup("ops".to_string()));
    }

    /// Group lookup by name finds the matching definition.
    #[test]
    fn access_control_group_lookup() {
        // Arrange
        let mut access_control = AccessControl::new(1);
        access_control
            .groups
            .push(ChannelGroup::new("ops", vec![9], Vec::new(), Vec::new()).expect("group"));
        // Act
        let group = access_control.group("ops").expect("missing group");
        // Assert
        assert_eq!(group.members(), &[9]);
        assert!(access_control.group("admin").is_none());
    }

    /// ACL entries survive a JSON round trip unchanged.
    #[test]
    fn acl_json_round_trip() {
        // Arrange
        let mut acl = ChannelAcl::for_group("admin", Permissions::ALL, Permissions::KICK)
            .expect("group acl");
        acl.apply_subs = false;
        acl.inherited = true;
        // Act
        let encoded = serde_json::to_string(&acl).expect("encode failed");
        let decoded: ChannelAcl = serde_json::from_str(&encoded).expect("decode failed");
        // Assert
        assert_eq!(decoded, acl);
    }

    /// Groups survive a JSON round trip unchanged.
    #[test]
    fn group_json_round_trip() {
        // Arrange
        let mut group = ChannelGroup::new("ops", vec![3, 1], vec![2], vec![5]).expect("group");
        group.inherited = true;
        group.inherit = false;
        // Act
        let encoded = serde_json::to_string(&group).expect("encode failed");
        let decoded: ChannelGroup = serde_json::from_str(&encoded).expect("decode failed");
        // Assert
        assert_eq!(decoded, group);
    }

    /// Permission masks survive a JSON round trip unchanged.
    #[test]
    fn permissions_json_round_trip() {
        // Arrange
        let permissions = Permissions::ENTER | Permissions::SPEAK | Permissions::KICK;
        // Act
        let encoded = serde_json::to_string(&permissions).expect("encode failed");
        let decoded: Permissions = serde_json::from_str(&encoded).expect("decode failed");
        // Assert
        assert_eq!(decoded, permissions);
    }

    /// The ALL mask covers every non-cached permission bit.
    #[test]
    fn permissions_all_covers_base_bits() {
        // Arrange
        let all = Permissions::ALL;
        // Act
        // Assert
        assert!(all.contains(Permissions::WRITE));
        assert!(all.contains(Permissions::TRAVERSE | Permissions::ENTER | Permissions::SPEAK));
        assert!(all.contains(Permissions::KICK | Permissions::BAN));
        assert!(!all.contains(Permissions::CACHED));
    }
}
