use crate::permissions::Role;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "shine.sqlite3";

/// Demo accounts present in every fresh workspace, one per dashboard.
const SEED_USERS: &[(&str, &str, Role)] = &[
    ("admin-1", "Shine Administrator", Role::Admin),
    ("teacher-1", "Demo Teacher", Role::Teacher),
    ("student-1", "Demo Student", Role::Student),
];

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roles(
            role TEXT PRIMARY KEY,
            seeded_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS role_permissions(
            role TEXT NOT NULL,
            code TEXT NOT NULL,
            PRIMARY KEY(role, code),
            FOREIGN KEY(role) REFERENCES roles(role)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_role_permissions_role ON role_permissions(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(role) REFERENCES roles(role)
        )",
        [],
    )?;
    // Older workspaces have no active flag; everyone in them was active.
    ensure_users_active(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    seed_directory(&conn)?;
    Ok(conn)
}

/// Opens an existing workspace database for a single read.
pub fn open_directory_readonly(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

fn seed_directory(conn: &Connection) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    for role in Role::ALL {
        // Grants are only seeded the first time a role appears, so revocations stick.
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO roles(role, seeded_at) VALUES(?, ?)",
            (role.as_str(), &now),
        )?;
        if inserted == 0 {
            continue;
        }
        for code in role.default_codes() {
            conn.execute(
                "INSERT OR IGNORE INTO role_permissions(role, code) VALUES(?, ?)",
                (role.as_str(), code.as_str()),
            )?;
        }
        tracing::debug!(role = %role, "seeded role permissions");
    }

    for (id, name, role) in SEED_USERS {
        conn.execute(
            "INSERT OR IGNORE INTO users(id, display_name, role, active, created_at)
             VALUES(?, ?, ?, 1, ?)",
            (id, name, role.as_str(), &now),
        )?;
    }
    Ok(())
}

/// Codes granted to a user through their role.
///
/// `None` when the user id is unknown. Inactive users resolve to an empty list.
pub fn user_permission_codes(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Option<Vec<String>>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT role, active FROM users WHERE id = ?",
            [user_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((role, active)) = row else {
        return Ok(None);
    };
    if active == 0 {
        return Ok(Some(Vec::new()));
    }
    Ok(Some(role_codes(conn, &role)?))
}

pub fn role_codes(conn: &Connection, role: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT code FROM role_permissions WHERE role = ? ORDER BY code")?;
    let codes = stmt
        .query_map([role], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(codes)
}

pub fn roles_list(conn: &Connection) -> anyhow::Result<Vec<(String, Vec<String>)>> {
    let mut stmt = conn.prepare("SELECT role FROM roles ORDER BY role")?;
    let roles = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        let codes = role_codes(conn, &role)?;
        out.push((role, codes));
    }
    Ok(out)
}

/// Returns whether a new grant was written.
pub fn role_grant(conn: &Connection, role: Role, code: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO role_permissions(role, code) VALUES(?, ?)",
        (role.as_str(), code),
    )?;
    Ok(changed > 0)
}

/// Returns whether an existing grant was removed.
pub fn role_revoke(conn: &Connection, role: Role, code: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "DELETE FROM role_permissions WHERE role = ? AND code = ?",
        (role.as_str(), code),
    )?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub role: String,
    pub active: bool,
}

pub fn users_list(conn: &Connection) -> anyhow::Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, display_name, role, active FROM users ORDER BY role, display_name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(UserRow {
                id: r.get(0)?,
                display_name: r.get(1)?,
                role: r.get(2)?,
                active: r.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn user_create(
    conn: &Connection,
    user_id: &str,
    display_name: &str,
    role: Role,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users(id, display_name, role, active, created_at) VALUES(?, ?, ?, 1, ?)",
        (
            user_id,
            display_name,
            role.as_str(),
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

pub fn user_exists(conn: &Connection, user_id: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Returns false when the user does not exist.
pub fn user_set_role(conn: &Connection, user_id: &str, role: Role) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET role = ? WHERE id = ?",
        (role.as_str(), user_id),
    )?;
    Ok(changed > 0)
}

/// Returns false when the user does not exist.
pub fn user_set_active(conn: &Connection, user_id: &str, active: bool) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET active = ? WHERE id = ?",
        (active as i64, user_id),
    )?;
    Ok(changed > 0)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_users_active(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "active")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE users ADD COLUMN active INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_seeds_roles_and_demo_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");

        let roles = roles_list(&conn).expect("roles");
        let names: Vec<&str> = roles.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(names, vec!["admin", "student", "teacher"]);

        let teacher = user_permission_codes(&conn, "teacher-1")
            .expect("lookup")
            .expect("teacher exists");
        assert!(teacher.contains(&"class.view".to_string()));
        assert!(!teacher.contains(&"class.edit".to_string()));

        assert_eq!(user_permission_codes(&conn, "ghost").expect("lookup"), None);
    }

    #[test]
    fn revocations_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = open_db(dir.path()).expect("open db");
            assert!(role_revoke(&conn, Role::Student, "payment.view").expect("revoke"));
        }
        let conn = open_db(dir.path()).expect("reopen db");
        let codes = role_codes(&conn, "student").expect("codes");
        assert!(!codes.contains(&"payment.view".to_string()));
    }

    #[test]
    fn inactive_user_has_no_codes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        assert!(user_set_active(&conn, "admin-1", false).expect("deactivate"));
        assert_eq!(
            user_permission_codes(&conn, "admin-1").expect("lookup"),
            Some(Vec::new())
        );
    }

    #[test]
    fn user_exists_ignores_active_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        assert!(!user_exists(&conn, "s-new").expect("exists"));
        user_create(&conn, "s-new", "New Student", Role::Student).expect("create");
        assert!(user_exists(&conn, "s-new").expect("exists"));
        assert!(user_set_active(&conn, "s-new", false).expect("deactivate"));
        assert!(user_exists(&conn, "s-new").expect("exists"));
        assert!(user_create(&conn, "s-new", "Again", Role::Teacher).is_err());
    }

    #[test]
    fn legacy_users_table_gets_active_column() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let conn = Connection::open(db_path(dir.path())).expect("raw open");
            conn.execute_batch(
                "CREATE TABLE roles(role TEXT PRIMARY KEY, seeded_at TEXT);
                 CREATE TABLE users(id TEXT PRIMARY KEY, display_name TEXT NOT NULL,
                                    role TEXT NOT NULL, created_at TEXT);
                 INSERT INTO roles(role) VALUES('teacher');
                 INSERT INTO users(id, display_name, role) VALUES('t-old', 'Old', 'teacher');",
            )
            .expect("legacy schema");
        }
        let conn = open_db(dir.path()).expect("open migrates");
        assert!(table_has_column(&conn, "users", "active").expect("pragma"));
        let users = users_list(&conn).expect("users");
        let old = users.iter().find(|u| u.id == "t-old").expect("legacy user");
        assert!(old.active);
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = open_db(dir.path()).expect("open db");
        assert_eq!(settings_get_json(&conn, "gate.config").expect("get"), None);
        settings_set_json(&conn, "gate.config", &serde_json::json!({ "a": 1 })).expect("set");
        settings_set_json(&conn, "gate.config", &serde_json::json!({ "a": 2 })).expect("set");
        assert_eq!(
            settings_get_json(&conn, "gate.config").expect("get"),
            Some(serde_json::json!({ "a": 2 }))
        );
    }
}
