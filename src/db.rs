use std::future::Future;

use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::auth::{CredentialHasher, Role};
use crate::models::{FacultyInsert, FacultyRow, MarkRecord, MarkRow};

/// Data access used by the HTTP handlers and CLI commands.
pub trait Repository: Send + Sync + 'static {
    /// Marks joined with student and subject data, optionally limited to one department.
    fn marks_for_department(
        &self,
        department: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<Vec<MarkRecord>>> + Send;

    fn faculty_count(
        &self,
        department: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<i64>> + Send;

    fn list_faculty(
        &self,
        department: Option<&str>,
    ) -> impl Future<Output = anyhow::Result<Vec<FacultyRow>>> + Send;

    fn faculty_subjects(
        &self,
        faculty_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;

    fn insert_faculty(
        &self,
        faculty: &FacultyInsert,
    ) -> impl Future<Output = anyhow::Result<Uuid>> + Send;
}

#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Repository for PgRepository {
    async fn marks_for_department(
        &self,
        department: Option<&str>,
    ) -> anyhow::Result<Vec<MarkRecord>> {
        let rows: Vec<MarkRow> = sqlx::query_as(
            "SELECT m.student_id, st.full_name AS student_name, \
             m.subject_id, sub.name AS subject_name, sub.department, \
             m.marks_obtained, m.max_marks, m.status \
             FROM department_dashboard.marks m \
             JOIN department_dashboard.users st ON st.id = m.student_id \
             LEFT JOIN department_dashboard.subjects sub ON sub.id = m.subject_id \
             WHERE ($1::text IS NULL OR sub.department = $1) \
             ORDER BY m.created_at, m.id",
        )
        .bind(department)
        .fetch_all(&self.pool)
        .await
        .context("failed to load marks")?;

        Ok(rows.into_iter().map(MarkRecord::from_row).collect())
    }

    async fn faculty_count(&self, department: Option<&str>) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM department_dashboard.users \
             WHERE role = $1 AND ($2::text IS NULL OR department = $2)",
        )
        .bind(Role::Faculty.as_str())
        .bind(department)
        .fetch_one(&self.pool)
        .await
        .context("failed to count faculty")?
        .get("count");

        Ok(count)
    }

    async fn list_faculty(&self, department: Option<&str>) -> anyhow::Result<Vec<FacultyRow>> {
        let rows: Vec<FacultyRow> = sqlx::query_as(
            "SELECT id, username, full_name, department, designation \
             FROM department_dashboard.users \
             WHERE role = $1 AND ($2::text IS NULL OR department = $2) \
             ORDER BY full_name, username",
        )
        .bind(Role::Faculty.as_str())
        .bind(department)
        .fetch_all(&self.pool)
        .await
        .context("failed to list faculty")?;

        Ok(rows)
    }

    async fn faculty_subjects(&self, faculty_id: Uuid) -> anyhow::Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM department_dashboard.subjects \
             WHERE faculty_id = $1 ORDER BY name",
        )
        .bind(faculty_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load faculty subjects")?;

        Ok(names)
    }

    async fn insert_faculty(&self, faculty: &FacultyInsert) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO department_dashboard.users
            (id, username, full_name, email, password_hash, role, department, designation)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(faculty.id)
        .bind(&faculty.username)
        .bind(&faculty.full_name)
        .bind(&faculty.email)
        .bind(&faculty.password_hash)
        .bind(Role::Faculty.as_str())
        .bind(&faculty.department)
        .bind(&faculty.designation)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert faculty")?
        .get("id");

        Ok(id)
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_user(
    pool: &PgPool,
    id: Uuid,
    username: &str,
    full_name: &str,
    role: Role,
    department: &str,
    password_hash: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO department_dashboard.users
        (id, username, full_name, email, password_hash, role, department)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (username) DO UPDATE
        SET full_name = EXCLUDED.full_name, department = EXCLUDED.department
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(full_name)
    .bind(format!("{username}@department.edu"))
    .bind(password_hash)
    .bind(role.as_str())
    .bind(department)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn upsert_subject(
    pool: &PgPool,
    name: &str,
    department: &str,
    faculty_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO department_dashboard.subjects (id, name, department, faculty_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name, department) DO UPDATE
        SET faculty_id = COALESCE(EXCLUDED.faculty_id, department_dashboard.subjects.faculty_id)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(department)
    .bind(faculty_id)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn insert_mark(
    pool: &PgPool,
    student_id: Uuid,
    subject_id: Uuid,
    marks_obtained: Option<f64>,
    max_marks: Option<f64>,
    status: &str,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO department_dashboard.marks
        (id, student_id, subject_id, marks_obtained, max_marks, status, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(subject_id)
    .bind(marks_obtained)
    .bind(max_marks)
    .bind(status)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(
    pool: &PgPool,
    hasher: &dyn CredentialHasher,
    default_password: &str,
) -> anyhow::Result<()> {
    let password_hash = hasher.hash(default_password)?;

    upsert_user(
        pool,
        Uuid::parse_str("7b1c2a9e-5d1f-4f0e-9a43-1f6f3e2b8c01")?,
        "hod.cse",
        "Meera Iyer",
        Role::Hod,
        "CSE",
        &password_hash,
    )
    .await?;

    let faculty = vec![
        (
            Uuid::parse_str("2f8d1c6b-3a5e-4b7f-8c9d-0e1f2a3b4c5d")?,
            "r.shah",
            "Rohan Shah",
            "Data Structures",
        ),
        (
            Uuid::parse_str("9a0b1c2d-3e4f-4a5b-8c6d-7e8f9a0b1c2d")?,
            "l.fernandes",
            "Lena Fernandes",
            "Operating Systems",
        ),
    ];

    let mut subjects = Vec::new();
    for (id, username, name, subject) in faculty {
        let faculty_id =
            upsert_user(pool, id, username, name, Role::Faculty, "CSE", &password_hash).await?;
        subjects.push(upsert_subject(pool, subject, "CSE", Some(faculty_id)).await?);
    }

    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "cse.avery",
            "Avery Lee",
            [38.0, 41.0],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "cse.jules",
            "Jules Moreno",
            [14.0, 19.0],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "cse.kiara",
            "Kiara Patel",
            [26.0, 22.0],
        ),
    ];

    for (id, username, name, marks) in students {
        let student_id =
            upsert_user(pool, id, username, name, Role::Student, "CSE", &password_hash).await?;
        for (subject_id, marks_obtained) in subjects.iter().zip(marks) {
            let status = if marks_obtained < 20.0 {
                "PENDING"
            } else {
                "FINALIZED"
            };
            insert_mark(
                pool,
                student_id,
                *subject_id,
                Some(marks_obtained),
                Some(50.0),
                status,
                &format!("seed-{username}-{subject_id}"),
            )
            .await?;
        }
    }

    Ok(())
}

pub async fn import_marks_csv(
    pool: &PgPool,
    hasher: &dyn CredentialHasher,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        student_username: String,
        student_name: String,
        subject_name: String,
        department: String,
        marks_obtained: Option<f64>,
        max_marks: Option<f64>,
        status: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let password_hash = hasher.hash(&Uuid::new_v4().to_string())?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let student_id = upsert_user(
            pool,
            Uuid::new_v4(),
            &row.student_username,
            &row.student_name,
            Role::Student,
            &row.department,
            &password_hash,
        )
        .await?;
        let subject_id = upsert_subject(pool, &row.subject_name, &row.department, None).await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let status = row.status.unwrap_or_else(|| "PENDING".to_string());

        if insert_mark(
            pool,
            student_id,
            subject_id,
            row.marks_obtained,
            row.max_marks,
            &status,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}
