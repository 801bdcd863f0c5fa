use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::transport::types::{Channel, User};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeItemKind {
    Channel,
    User,
}

/// One row of the flattened channel hierarchy, ready for list display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub id: u32,
    pub name: String,
    pub depth: usize,
    pub kind: TreeItemKind,
}

/// Flattens channels and users into a depth-first display list.
///
/// Channels without a cached parent are treated as roots. Siblings and the
/// users within a channel are ordered by name, then id.
pub fn channel_tree(channels: &[Channel], users: &[User]) -> Vec<TreeItem> {
    let mut items = Vec::new();
    let mut visited = HashSet::new();

    let known: HashSet<u32> = channels.iter().map(|channel| channel.id).collect();
    let mut roots: Vec<&Channel> = channels
        .iter()
        .filter(|channel| match channel.parent_id {
            None => true,
            Some(parent_id) => !known.contains(&parent_id) || parent_id == channel.id,
        })
        .collect();
    sort_channels(&mut roots);

    for root in roots {
        push_channel(root, 0, channels, users, &mut visited, &mut items);
    }

    // Channels trapped in parent cycles never qualify as roots; surface
    // them at the root level rather than dropping them.
    let mut remaining: Vec<&Channel> = channels
        .iter()
        .filter(|channel| !visited.contains(&channel.id))
        .collect();
    sort_channels(&mut remaining);
    for channel in remaining {
        push_channel(channel, 0, channels, users, &mut visited, &mut items);
    }

    items
}

fn push_channel(
    channel: &Channel,
    depth: usize,
    channels: &[Channel],
    users: &[User],
    visited: &mut HashSet<u32>,
    items: &mut Vec<TreeItem>,
) {
    // Guards against parent cycles in malformed server state.
    if !visited.insert(channel.id) {
        return;
    }

    items.push(TreeItem {
        id: channel.id,
        name: channel.name.clone(),
        depth,
        kind: TreeItemKind::Channel,
    });

    let mut occupants: Vec<&User> = users
        .iter()
        .filter(|user| user.channel_id == channel.id)
        .collect();
    occupants.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    for user in occupants {
        items.push(TreeItem {
            id: user.id,
            name: user.name.clone(),
            depth: depth + 1,
            kind: TreeItemKind::User,
        });
    }

    let mut children: Vec<&Channel> = channels
        .iter()
        .filter(|child| child.parent_id == Some(channel.id) && child.id != channel.id)
        .collect();
    sort_channels(&mut children);
    for child in children {
        push_channel(child, depth + 1, channels, users, visited, items);
    }
}

fn sort_channels(channels: &mut [&Channel]) {
    channels.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::{channel_tree, TreeItemKind};
    use crate::transport::types::{Channel, User};

    fn channel(id: u32, name: &str, parent_id: Option<u32>) -> Channel {
        Channel {
            id,
            name: name.to_string(),
            parent_id,
        }
    }

    fn user(id: u32, name: &str, channel_id: u32) -> User {
        User {
            id,
            name: name.to_string(),
            channel_id,
            muted: false,
            deafened: false,
            talking: false,
        }
    }

    /// Channels nest depth-first with users listed under their channel.
    #[test]
    fn tree_nests_channels_and_users() {
        // Arrange
        let channels = vec![
            channel(0, "Root", None),
            channel(1, "Lobby", Some(0)),
            channel(2, "Ops", Some(1)),
        ];
        let users = vec![user(10, "Alice", 1), user(11, "Bob", 2)];

        // Act
        let items = channel_tree(&channels, &users);

        // Assert
        let summary: Vec<(&str, usize, TreeItemKind)> = items
            .iter()
            .map(|item| (item.name.as_str(), item.depth, item.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Root", 0, TreeItemKind::Channel),
                ("Lobby", 1, TreeItemKind::Channel),
                ("Alice", 2, TreeItemKind::User),
                ("Ops", 2, TreeItemKind::Channel),
                ("Bob", 3, TreeItemKind::User),
            ]
        );
    }

    /// Siblings and occupants are ordered by name, then id.
    #[test]
    fn tree_orders_siblings_by_name() {
        // Arrange
        let channels = vec![
            channel(0, "Root", None),
            channel(2, "Beta", Some(0)),
            channel(1, "Alpha", Some(0)),
        ];
        let users = vec![user(21, "Zed", 0), user(20, "Ann", 0)];

        // Act
        let items = channel_tree(&channels, &users);

        // Assert
        let names: Vec<&str> = items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["Root", "Ann", "Zed", "Alpha", "Beta"]);
    }

    /// Channels whose parent is unknown surface as roots.
    #[test]
    fn tree_attaches_orphans_at_root() {
        // Arrange
        let channels = vec![channel(0, "Root", None), channel(5, "Stray", Some(99))];

        // Act
        let items = channel_tree(&channels, &[]);

        // Assert
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "Root");
        assert_eq!(items[1].name, "Stray");
        assert_eq!(items[1].depth, 0);
    }

    /// Parent cycles terminate instead of recursing forever.
    #[test]
    fn tree_survives_parent_cycles() {
        // Arrange
        let channels = vec![
            channel(1, "A", Some(2)),
            channel(2, "B", Some(1)),
            channel(3, "Self", Some(3)),
        ];

        // Act
        let items = channel_tree(&channels, &[]);

        // Assert: every channel appears exactly once.
        let mut ids: Vec<u32> = items.iter().map(|item| item.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    /// Empty input yields an empty tree.
    #[test]
    fn tree_empty_input() {
        // Arrange
        // Act
        let items = channel_tree(&[], &[]);
        // Assert
        assert!(items.is_empty());
    }
}
