use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "evald.sqlite3";

/// Opens (or creates) the workspace database and brings the schema up.
/// Schema setup is idempotent and happens exactly here, once per open;
/// nothing re-registers tables at request time.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            department TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role)",
        [],
    )?;

    // The two evaluation families share one column shape so the aggregation
    // engine is a single code path parameterized by table name.
    // evaluator_name is a display-name snapshot taken at submission time and
    // is never re-derived from profiles on read.
    for table in ["peer_evaluations", "hierarchy_evaluations"] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table}(
                    id TEXT PRIMARY KEY,
                    target_id TEXT NOT NULL,
                    target_role TEXT NOT NULL,
                    evaluator_id TEXT NOT NULL,
                    evaluator_name TEXT NOT NULL,
                    department TEXT NOT NULL,
                    school_year TEXT NOT NULL,
                    semester TEXT NOT NULL,
                    subject_title TEXT NOT NULL,
                    points REAL NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY(evaluator_id) REFERENCES profiles(id),
                    UNIQUE(evaluator_id, target_id, subject_title, semester, school_year)
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_target
                 ON {table}(target_id, target_role, school_year)"
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_evaluator
                 ON {table}(evaluator_id)"
            ),
            [],
        )?;
    }

    Ok(conn)
}
