//! Dependency CRUD operations and cycle detection for [`SqliteStore`].

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{Connection, params};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, EventType};
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{ISSUE_COLUMNS, emit_event, format_datetime, parse_datetime, scan_issue};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Inserts a dependency on the given connection, with self-loop and cycle
/// checks for blocking types.
pub(crate) fn add_dependency_on_conn(
    conn: &Connection,
    dep: &Dependency,
    actor: &str,
) -> Result<()> {
    if dep.issue_id == dep.depends_on_id {
        return Err(StorageError::constraint(format!(
            "self-loop on {}",
            dep.issue_id
        )));
    }

    // Both endpoints must exist; a dangling edge would poison ready queries.
    for endpoint in [&dep.issue_id, &dep.depends_on_id] {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
            params![endpoint],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StorageError::not_found("issue", endpoint.as_str()));
        }
    }

    if dep.dep_type.is_blocking() {
        detect_cycle(conn, &dep.issue_id, &dep.depends_on_id)?;
    }

    let now_str = format_datetime(&Utc::now());
    conn.execute(
        "INSERT OR REPLACE INTO dependencies
         (issue_id, depends_on_id, type, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            dep.issue_id,
            dep.depends_on_id,
            dep.dep_type.as_str(),
            format_datetime(&dep.created_at),
            dep.created_by,
        ],
    )?;

    emit_event(
        conn,
        &dep.issue_id,
        EventType::DependencyAdded,
        actor,
        None,
        Some(&format!("{} ({})", dep.depends_on_id, dep.dep_type)),
        &now_str,
    )?;
    Ok(())
}

/// Removes a dependency on the given connection (all edge types between the
/// two endpoints).
pub(crate) fn remove_dependency_on_conn(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    actor: &str,
) -> Result<()> {
    let affected = conn.execute(
        "DELETE FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
        params![issue_id, depends_on_id],
    )?;
    if affected == 0 {
        return Err(StorageError::not_found(
            "dependency",
            format!("{issue_id} -> {depends_on_id}"),
        ));
    }

    emit_event(
        conn,
        issue_id,
        EventType::DependencyRemoved,
        actor,
        Some(depends_on_id),
        None,
        &format_datetime(&Utc::now()),
    )?;
    Ok(())
}

/// Returns outgoing edges (`issue_id` as source) on the given connection.
pub(crate) fn get_outgoing_edges_on_conn(
    conn: &Connection,
    issue_id: &str,
) -> Result<Vec<Dependency>> {
    scan_edges(
        conn,
        "SELECT issue_id, depends_on_id, type, created_at, created_by
         FROM dependencies WHERE issue_id = ?1
         ORDER BY depends_on_id, type",
        issue_id,
    )
}

/// Returns every edge where `issue_id` is either endpoint.
pub(crate) fn get_edges_touching_on_conn(
    conn: &Connection,
    issue_id: &str,
) -> Result<Vec<Dependency>> {
    scan_edges(
        conn,
        "SELECT issue_id, depends_on_id, type, created_at, created_by
         FROM dependencies WHERE issue_id = ?1 OR depends_on_id = ?1
         ORDER BY issue_id, depends_on_id, type",
        issue_id,
    )
}

fn scan_edges(conn: &Connection, sql: &str, param: &str) -> Result<Vec<Dependency>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![param], |row| {
        let type_str: String = row.get("type")?;
        Ok((
            row.get::<_, String>("issue_id")?,
            row.get::<_, String>("depends_on_id")?,
            type_str,
            row.get::<_, String>("created_at")?,
            row.get::<_, String>("created_by")?,
        ))
    })?;

    let mut deps = Vec::new();
    for row in rows {
        let (issue_id, depends_on_id, type_str, created_at, created_by) = row?;
        let dep_type: DependencyType = type_str
            .parse()
            .map_err(|e| StorageError::Internal(format!("bad edge row: {e}")))?;
        deps.push(Dependency {
            issue_id,
            depends_on_id,
            dep_type,
            created_at: parse_datetime(&created_at),
            created_by,
        });
    }
    Ok(deps)
}

/// Replaces every outgoing edge of `issue_id` with the given set (import
/// reconciliation). Edges are deduplicated by `(source, target, type)`.
pub(crate) fn replace_outgoing_edges_on_conn(
    conn: &Connection,
    issue_id: &str,
    deps: &[Dependency],
) -> Result<()> {
    conn.execute(
        "DELETE FROM dependencies WHERE issue_id = ?1",
        params![issue_id],
    )?;
    let mut seen = HashSet::new();
    for dep in deps {
        if dep.issue_id != issue_id || !seen.insert(dep.key()) {
            continue;
        }
        conn.execute(
            "INSERT OR REPLACE INTO dependencies
             (issue_id, depends_on_id, type, created_at, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                dep.issue_id,
                dep.depends_on_id,
                dep.dep_type.as_str(),
                format_datetime(&dep.created_at),
                dep.created_by,
            ],
        )?;
    }
    Ok(())
}

/// Upserts a single edge without endpoint checks (import of mirrored
/// parent-child edges whose source is another record).
pub(crate) fn upsert_edge_on_conn(conn: &Connection, dep: &Dependency) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO dependencies
         (issue_id, depends_on_id, type, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            dep.issue_id,
            dep.depends_on_id,
            dep.dep_type.as_str(),
            format_datetime(&dep.created_at),
            dep.created_by,
        ],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Rejects the edge `issue_id -> depends_on_id` if `issue_id` is reachable
/// from `depends_on_id` along blocking edges.
///
/// Explicit-stack DFS over the adjacency list; the graph is small enough
/// that a full walk per insertion is fine.
fn detect_cycle(conn: &Connection, issue_id: &str, depends_on_id: &str) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = vec![depends_on_id.to_owned()];

    while let Some(current) = stack.pop() {
        if current == issue_id {
            return Err(StorageError::constraint(format!(
                "cycle via {issue_id} -> {depends_on_id}"
            )));
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let mut stmt = conn.prepare_cached(
            "SELECT depends_on_id FROM dependencies
             WHERE issue_id = ?1 AND type IN ('blocks', 'parent-child')",
        )?;
        let rows = stmt.query_map(params![current], |row| row.get::<_, String>(0))?;
        for row in rows {
            let next = row?;
            if !visited.contains(&next) {
                stack.push(next);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Adds a dependency edge.
    pub fn add_dependency_impl(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.retry_on_busy(|conn| add_dependency_on_conn(conn, dep, actor))
    }

    /// Removes a dependency edge.
    pub fn remove_dependency_impl(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        actor: &str,
    ) -> Result<()> {
        self.retry_on_busy(|conn| remove_dependency_on_conn(conn, issue_id, depends_on_id, actor))
    }

    /// Returns issues that the given issue depends on.
    pub fn get_dependencies_impl(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE id IN (SELECT depends_on_id FROM dependencies WHERE issue_id = ?1)
             ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![issue_id], scan_issue)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    /// Returns issues that depend on the given issue.
    pub fn get_dependents_impl(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE id IN (SELECT issue_id FROM dependencies WHERE depends_on_id = ?1)
             ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![issue_id], scan_issue)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row?);
        }
        Ok(issues)
    }

    /// Returns every edge where the issue is either endpoint.
    pub fn get_edges_touching_impl(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.lock_conn()?;
        get_edges_touching_on_conn(&conn, issue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn seed(store: &SqliteStore, ids: &[&str]) {
        for id in ids {
            store
                .create_issue_impl(&IssueBuilder::new(*id).id(*id).build(), "test")
                .unwrap();
        }
    }

    fn blocks(issue: &str, on: &str) -> Dependency {
        Dependency::new(issue, on, DependencyType::Blocks, "test")
    }

    #[test]
    fn add_and_get_dependency() {
        let store = test_store();
        seed(&store, &["bd-p1", "bd-c1"]);
        store.add_dependency_impl(&blocks("bd-c1", "bd-p1"), "a").unwrap();

        let deps = store.get_dependencies_impl("bd-c1").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, "bd-p1");

        let dependents = store.get_dependents_impl("bd-p1").unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, "bd-c1");
    }

    #[test]
    fn self_loop_rejected() {
        let store = test_store();
        seed(&store, &["bd-s1"]);
        let err = store
            .add_dependency_impl(&blocks("bd-s1", "bd-s1"), "a")
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
    }

    #[test]
    fn dangling_endpoint_rejected() {
        let store = test_store();
        seed(&store, &["bd-d1"]);
        let err = store
            .add_dependency_impl(&blocks("bd-d1", "bd-ghost"), "a")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn cycle_rejected_through_blocking_chain() {
        let store = test_store();
        seed(&store, &["bd-cy1", "bd-cy2", "bd-cy3"]);
        store.add_dependency_impl(&blocks("bd-cy1", "bd-cy2"), "a").unwrap();
        store.add_dependency_impl(&blocks("bd-cy2", "bd-cy3"), "a").unwrap();

        let err = store
            .add_dependency_impl(&blocks("bd-cy3", "bd-cy1"), "a")
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
    }

    #[test]
    fn related_edges_do_not_cycle_check() {
        let store = test_store();
        seed(&store, &["bd-r1", "bd-r2"]);
        store
            .add_dependency_impl(
                &Dependency::new("bd-r1", "bd-r2", DependencyType::Related, "a"),
                "a",
            )
            .unwrap();
        // The reverse "related" edge is fine; related edges never block.
        store
            .add_dependency_impl(
                &Dependency::new("bd-r2", "bd-r1", DependencyType::Related, "a"),
                "a",
            )
            .unwrap();
    }

    #[test]
    fn remove_dependency() {
        let store = test_store();
        seed(&store, &["bd-a1", "bd-b1"]);
        store.add_dependency_impl(&blocks("bd-b1", "bd-a1"), "a").unwrap();
        store.remove_dependency_impl("bd-b1", "bd-a1", "a").unwrap();
        assert!(store.get_dependencies_impl("bd-b1").unwrap().is_empty());

        let err = store
            .remove_dependency_impl("bd-b1", "bd-a1", "a")
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn edges_touching_sees_both_directions() {
        let store = test_store();
        seed(&store, &["bd-e1", "bd-e2", "bd-e3"]);
        store.add_dependency_impl(&blocks("bd-e1", "bd-e2"), "a").unwrap();
        store.add_dependency_impl(&blocks("bd-e3", "bd-e1"), "a").unwrap();

        let edges = store.get_edges_touching_impl("bd-e1").unwrap();
        assert_eq!(edges.len(), 2);
    }
}
