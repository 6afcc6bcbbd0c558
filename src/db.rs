use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("halqa.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT NOT NULL,
            address TEXT,
            phone TEXT,
            email TEXT,
            parent_name TEXT,
            parent_phone TEXT,
            parent_email TEXT,
            enrollment_date TEXT NOT NULL,
            class TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            photo TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_status ON students(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            gender TEXT NOT NULL,
            address TEXT,
            phone TEXT NOT NULL,
            email TEXT,
            qualification TEXT,
            specialization TEXT,
            hire_date TEXT NOT NULL,
            salary REAL,
            status TEXT NOT NULL DEFAULT 'active',
            photo TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_status ON teachers(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS halqas(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            teacher_id TEXT NOT NULL,
            schedule_days TEXT,
            start_time TEXT,
            end_time TEXT,
            location TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            max_students INTEGER NOT NULL DEFAULT 30,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_halqas_teacher ON halqas(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_halqas_status ON halqas(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS halqa_students(
            halqa_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(halqa_id, student_id),
            FOREIGN KEY(halqa_id) REFERENCES halqas(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_halqa_students_student ON halqa_students(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            fee_type TEXT NOT NULL,
            amount REAL NOT NULL,
            period TEXT,
            due_date TEXT,
            paid_date TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            paid_amount REAL NOT NULL DEFAULT 0,
            payment_method TEXT,
            receipt_number TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fees_student ON fees(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fees_status ON fees(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS withdrawals(
            id TEXT PRIMARY KEY,
            amount REAL NOT NULL,
            category TEXT NOT NULL,
            description TEXT NOT NULL,
            payment_method TEXT NOT NULL DEFAULT 'cash',
            recipient TEXT,
            receipt_number TEXT,
            date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            approved_at TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_withdrawals_category ON withdrawals(category)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawals(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quran_progress(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            surah TEXT NOT NULL,
            from_ayah INTEGER NOT NULL,
            to_ayah INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'in-progress',
            memorization_date TEXT,
            review_count INTEGER NOT NULL DEFAULT 0,
            last_review_date TEXT,
            notes TEXT,
            grade TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quran_progress_student ON quran_progress(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quran_progress_teacher ON quran_progress(teacher_id)",
        [],
    )?;

    Ok(conn)
}
