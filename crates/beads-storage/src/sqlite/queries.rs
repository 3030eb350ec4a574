//! Work queries: ready, blocked, statistics.

use chrono::Utc;
use rusqlite::params;

use beads_core::filter::WorkFilter;
use beads_core::issue::Issue;

use crate::error::Result;
use crate::sqlite::issues::{ISSUE_COLUMNS, format_datetime, scan_issue};
use crate::sqlite::store::SqliteStore;
use crate::traits::{BlockedIssue, Statistics};

impl SqliteStore {
    /// Returns issues that are ready to work on.
    ///
    /// Ready means: status is open or in_progress, not ephemeral, not
    /// deferred past now (unless requested), and every blocking dependency
    /// (`blocks` or `parent-child`) points at a closed issue. Ordering is
    /// ascending priority with `created_at`/`id` as stable tiebreaks.
    pub fn get_ready_work_impl(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;

        let mut where_clauses: Vec<String> = vec![
            "i.status IN ('open', 'in_progress')".to_string(),
            "i.ephemeral = 0".to_string(),
            // No open blocker may remain.
            "NOT EXISTS (
                SELECT 1 FROM dependencies d
                INNER JOIN issues blocker ON blocker.id = d.depends_on_id
                WHERE d.issue_id = i.id
                  AND d.type IN ('blocks', 'parent-child')
                  AND blocker.status != 'closed'
            )"
            .to_string(),
        ];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut idx = 1;

        if !filter.include_deferred {
            where_clauses.push(format!(
                "(i.defer_until IS NULL OR i.defer_until <= ?{idx})"
            ));
            values.push(Box::new(format_datetime(&Utc::now())));
            idx += 1;
        }
        if let Some(ref issue_type) = filter.issue_type {
            where_clauses.push(format!("i.issue_type = ?{idx}"));
            values.push(Box::new(issue_type.as_str().to_owned()));
            idx += 1;
        }
        if let Some(priority) = filter.priority {
            where_clauses.push(format!("i.priority = ?{idx}"));
            values.push(Box::new(priority));
            idx += 1;
        }
        if let Some(ref assignee) = filter.assignee {
            where_clauses.push(format!("i.assignee = ?{idx}"));
            values.push(Box::new(assignee.clone()));
            idx += 1;
        }
        for label in &filter.labels {
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = i.id AND labels.label = ?{idx})"
            ));
            values.push(Box::new(label.clone()));
            idx += 1;
        }

        let where_sql = where_clauses.join(" AND ");
        let limit_sql = filter
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i WHERE {where_sql}
             ORDER BY i.priority ASC, i.created_at ASC, i.id ASC{limit_sql}"
        );

        let value_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(value_refs.as_slice(), scan_issue)?;

        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        let _ = idx;
        Ok(issues)
    }

    /// Returns open issues with at least one open `blocks` dependency,
    /// together with the ids of those blockers.
    pub fn get_blocked_issues_impl(&self) -> Result<Vec<BlockedIssue>> {
        let conn = self.lock_conn()?;

        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i
             WHERE i.status IN ('open', 'in_progress')
               AND EXISTS (
                   SELECT 1 FROM dependencies d
                   INNER JOIN issues blocker ON blocker.id = d.depends_on_id
                   WHERE d.issue_id = i.id
                     AND d.type = 'blocks'
                     AND blocker.status != 'closed'
               )
             ORDER BY i.priority ASC, i.created_at ASC, i.id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_issue)?;

        let mut result = Vec::new();
        for row in rows {
            let issue: Issue = row?;
            let mut blocker_stmt = conn.prepare_cached(
                "SELECT d.depends_on_id FROM dependencies d
                 INNER JOIN issues blocker ON blocker.id = d.depends_on_id
                 WHERE d.issue_id = ?1 AND d.type = 'blocks' AND blocker.status != 'closed'
                 ORDER BY d.depends_on_id",
            )?;
            let open_blockers: Vec<String> = blocker_stmt
                .query_map(params![issue.id], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            result.push(BlockedIssue {
                issue,
                open_blockers,
            });
        }
        Ok(result)
    }

    /// Returns aggregate statistics.
    pub fn get_statistics_impl(&self) -> Result<Statistics> {
        let conn = self.lock_conn()?;
        let mut stats = Statistics::default();

        let count = |status: &str| -> Result<i64> {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM issues WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )?)
        };
        stats.total_issues =
            conn.query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        stats.open_issues = count("open")?;
        stats.in_progress_issues = count("in_progress")?;
        stats.blocked_issues = count("blocked")?;
        stats.closed_issues = count("closed")?;
        stats.tombstone_issues = count("tombstone")?;

        {
            let mut stmt = conn.prepare(
                "SELECT issue_type, COUNT(*) FROM issues WHERE status != 'tombstone'
                 GROUP BY issue_type ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                stats.by_type.push(row?);
            }
        }
        {
            let mut stmt = conn.prepare(
                "SELECT priority, COUNT(*) FROM issues WHERE status != 'tombstone'
                 GROUP BY priority ORDER BY priority ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                stats.by_priority.push(row?);
            }
        }
        {
            let mut stmt = conn.prepare(
                "SELECT CASE WHEN assignee = '' THEN '(unassigned)' ELSE assignee END, COUNT(*)
                 FROM issues
                 WHERE status NOT IN ('closed', 'tombstone')
                 GROUP BY assignee
                 ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                stats.by_assignee.push(row?);
            }
        }

        Ok(stats)
    }
}
