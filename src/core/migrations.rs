//! Pending-migration detection from the migration runner's status listing.
//!
//! The runner prints one line per migration; a `[ ]` prefix marks it pending,
//! `[X]` applied. A small allow-list of long-running index builds is pulled
//! forward so they run outside the downtime window.

use serde::Serialize;

/// Marker the migration runner prints for a not-yet-applied migration.
const PENDING_MARKER: &str = "[ ]";

/// Index-building migrations that take long enough on large installations
/// that they must run before the server is stopped.
pub const LARGE_INDEX_MIGRATIONS: [&str; 5] = [
    "0082_index_starred_messages",
    "0083_index_mentioned_messages",
    "0095_index_unread_messages",
    "0098_index_alert_word_messages",
    "0099_index_wildcard_mentions",
];

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Pending migration names, in listing order.
    pub pending: Vec<String>,
    /// True when any large-index migration is pending.
    pub needs_large_indexes: bool,
}

impl MigrationStatus {
    pub fn migrations_needed(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Parse the migration runner's status listing.
///
/// Lines without the pending marker (applied migrations, app headers, blank
/// lines) are ignored.
pub fn parse_status_listing(listing: &str) -> MigrationStatus {
    let pending: Vec<String> = listing
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(PENDING_MARKER))
        .map(|line| line[PENDING_MARKER.len()..].trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    let needs_large_indexes = pending
        .iter()
        .any(|name| LARGE_INDEX_MIGRATIONS.contains(&name.as_str()));

    MigrationStatus {
        pending,
        needs_large_indexes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
messaging
 [X] 0001_initial
 [X] 0081_add_message_flags
 [ ] 0082_index_starred_messages
 [ ] 0100_add_topic_links
accounts
 [X] 0005_rename_profile_fields
";

    #[test]
    fn parses_pending_lines_only() {
        let status = parse_status_listing(LISTING);
        assert_eq!(
            status.pending,
            vec!["0082_index_starred_messages", "0100_add_topic_links"]
        );
        assert!(status.migrations_needed());
    }

    #[test]
    fn flags_large_index_migrations() {
        let status = parse_status_listing(LISTING);
        assert!(status.needs_large_indexes);
    }

    #[test]
    fn no_pending_lines_means_no_migrations_needed() {
        let status = parse_status_listing(" [X] 0001_initial\n [X] 0002_follow_up\n");
        assert!(status.pending.is_empty());
        assert!(!status.migrations_needed());
        assert!(!status.needs_large_indexes);
    }

    #[test]
    fn ignores_headers_and_blank_lines() {
        let status = parse_status_listing("messaging\n\n [ ] 0042_add_reactions\n");
        assert_eq!(status.pending, vec!["0042_add_reactions"]);
        assert!(!status.needs_large_indexes);
    }
}
