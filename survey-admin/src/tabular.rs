//! Tabular text format for the bulk maintenance commands.
//!
//! Comma-separated lines with a header row first, no quoting:
//! identifiers and group names never contain commas. Input rows with a
//! missing field are skipped rather than treated as fatal, so a sheet
//! with stray blank lines imports cleanly.

use survey_core::{UserId, UserRecord};

/// Export header. It names five reaction columns while rows carry four
/// values; downstream sheets were built against this shape and exports
/// must keep producing it as-is.
pub const EXPORT_HEADER: &str = "uid,group,a,b,c,d,e";

/// One parsed input row, fields still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub uid: String,
    pub group: String,
}

/// Parse a `uid,group` table, skipping the header row and any row
/// without both fields. Columns past the second are ignored.
pub fn parse_user_rows(input: &str) -> Vec<UserRow> {
    input
        .lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let mut fields = line.split(',');
            let uid = fields.next().unwrap_or("").trim();
            let group = fields.next().unwrap_or("").trim();
            if uid.is_empty() || group.is_empty() {
                return None;
            }
            Some(UserRow {
                uid: uid.to_string(),
                group: group.to_string(),
            })
        })
        .collect()
}

/// Render the reaction export.
///
/// Only records with both a group and reactions appear; provisioned-but-
/// unused records and records with undecodable fields are left out.
pub fn render_export(records: &[(UserId, UserRecord)]) -> String {
    let mut out = String::from(EXPORT_HEADER);
    out.push('\n');

    for (id, record) in records {
        let (Some(group), Some(reactions)) = (record.group, record.reactions) else {
            continue;
        };
        let counts = reactions.as_array();
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            id.as_str(),
            group.as_str(),
            counts[0],
            counts[1],
            counts[2],
            counts[3],
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::{Group, ReactionCounts};

    #[test]
    fn test_parse_skips_header() {
        let rows = parse_user_rows("uid,group\nu1,plain\nu2,with-motion\n");
        assert_eq!(
            rows,
            vec![
                UserRow {
                    uid: "u1".to_string(),
                    group: "plain".to_string(),
                },
                UserRow {
                    uid: "u2".to_string(),
                    group: "with-motion".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_tolerates_crlf_and_blank_lines() {
        let rows = parse_user_rows("uid,group\r\nu1,plain\r\n\r\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uid, "u1");
        assert_eq!(rows[0].group, "plain");
    }

    #[test]
    fn test_parse_skips_incomplete_rows() {
        let rows = parse_user_rows("uid,group\nu1\n,plain\nu2,with-motion\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uid, "u2");
    }

    #[test]
    fn test_parse_ignores_extra_columns() {
        let rows = parse_user_rows("uid,group,note\nu1,plain,ignore me\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, "plain");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_user_rows("").is_empty());
        assert!(parse_user_rows("uid,group\n").is_empty());
    }

    #[test]
    fn test_export_header_has_spare_column() {
        // 7 header columns, 6 fields per row: the historical export
        // shape, preserved on purpose.
        assert_eq!(EXPORT_HEADER.split(',').count(), 7);

        let records = vec![(
            UserId::from("u1"),
            UserRecord::completed(Group::Plain, ReactionCounts([3, 0, 1, 7])),
        )];
        let output = render_export(&records);
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some(EXPORT_HEADER));
        let row = lines.next().unwrap();
        assert_eq!(row.split(',').count(), 6);
        assert_eq!(row, "u1,plain,3,0,1,7");
    }

    #[test]
    fn test_export_skips_incomplete_records() {
        let records = vec![
            (
                UserId::from("fresh"),
                UserRecord::fresh(Group::Plain),
            ),
            (
                UserId::from("groupless"),
                UserRecord {
                    group: None,
                    locked: true,
                    reactions: Some(ReactionCounts([1, 1, 1, 1])),
                },
            ),
            (
                UserId::from("done"),
                UserRecord::completed(Group::WithMotion, ReactionCounts([0, 0, 0, 0])),
            ),
        ];

        let output = render_export(&records);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "done,with-motion,0,0,0,0");
    }
}
