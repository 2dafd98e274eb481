/// SQL DDL for the itrack database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS students (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    department TEXT,
    site TEXT,
    mentor_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS staff (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    department TEXT,
    site TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS internships (
    id TEXT PRIMARY KEY,
    student_id TEXT NOT NULL,
    department TEXT NOT NULL,
    site TEXT NOT NULL,
    mentor_id TEXT,
    employer_name TEXT NOT NULL,
    employer_registration_id TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    duration_weeks INTEGER NOT NULL,
    offer_letter_id TEXT,
    certificate_id TEXT,
    status TEXT NOT NULL,
    phase TEXT NOT NULL,
    current_approver TEXT,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_trail (
    record_id TEXT NOT NULL REFERENCES internships(id) ON DELETE CASCADE,
    seq INTEGER NOT NULL,
    role TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    decision TEXT NOT NULL,
    comment TEXT,
    phase TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (record_id, seq)
);

CREATE TRIGGER IF NOT EXISTS review_trail_append_only
BEFORE UPDATE ON review_trail
BEGIN
    SELECT RAISE(ABORT, 'review trail is append-only');
END;

CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    mime_type TEXT NOT NULL,
    logical_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    bytes BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_internships_student ON internships(student_id);
CREATE INDEX IF NOT EXISTS idx_internships_scope ON internships(site, department);
CREATE INDEX IF NOT EXISTS idx_internships_mentor ON internships(mentor_id);
CREATE INDEX IF NOT EXISTS idx_students_mentor ON students(mentor_id);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

pub const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";
