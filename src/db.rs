//! Database module for medbot
//!
//! SQLite-backed record store for patients and prescriptions. Every
//! operation is a single statement (or a read-after-write on the same
//! locked connection), so identifiers are handed out in strictly increasing
//! order per table even when several operators write at once.

mod schema;

pub use schema::*;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Medication encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Prescription not found: {0}")]
    PrescriptionNotFound(PrescriptionId),
    #[error("Database connection poisoned by a panicked writer")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // ==================== Patient Operations ====================

    /// Insert a patient and return the stored record with its new identifier
    pub fn insert_patient(&self, patient: &NewPatient) -> DbResult<Patient> {
        let conn = self.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO patients (name, age, phone, operator_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                patient.name,
                patient.age,
                patient.phone,
                patient.operator_id,
                format_timestamp(&now),
            ],
        )?;

        Ok(Patient {
            id: conn.last_insert_rowid(),
            name: patient.name.clone(),
            age: patient.age,
            phone: patient.phone.clone(),
            operator_id: patient.operator_id,
            created_at: now,
        })
    }

    /// Most recently created patients of one operator, newest first
    pub fn recent_patients(&self, operator_id: OperatorId, limit: usize) -> DbResult<Vec<Patient>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, age, phone, operator_id, created_at
             FROM patients WHERE operator_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![operator_id, sql_limit(limit)], parse_patient_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get a patient by identifier, regardless of owner
    pub fn get_patient(&self, id: PatientId) -> DbResult<Option<Patient>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, age, phone, operator_id, created_at FROM patients WHERE id = ?1",
            params![id],
            parse_patient_row,
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Case-insensitive substring match on name or phone within one operator's patients
    pub fn search_patients(&self, operator_id: OperatorId, term: &str) -> DbResult<Vec<Patient>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, age, phone, operator_id, created_at
             FROM patients WHERE operator_id = ?1
             ORDER BY id DESC",
        )?;

        let needle = term.to_lowercase();
        let mut matches = Vec::new();
        for row in stmt.query_map(params![operator_id], parse_patient_row)? {
            let patient = row?;
            if patient.name.to_lowercase().contains(&needle)
                || patient.phone.to_lowercase().contains(&needle)
            {
                matches.push(patient);
            }
        }
        Ok(matches)
    }

    pub fn count_patients(&self, operator_id: OperatorId) -> DbResult<i64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE operator_id = ?1",
            params![operator_id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    // ==================== Prescription Operations ====================

    /// Insert a prescription and return it joined with the patient's name
    pub fn insert_prescription(&self, prescription: &NewPrescription) -> DbResult<Prescription> {
        let conn = self.lock()?;
        let now = Utc::now();
        let medications = encode_medications(&prescription.medications)?;

        conn.execute(
            "INSERT INTO prescriptions (patient_id, diagnosis, admission_date, discharge_date, medications, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prescription.patient_id,
                prescription.diagnosis,
                prescription.admission_date.format(DATE_FORMAT).to_string(),
                prescription.discharge_date.format(DATE_FORMAT).to_string(),
                medications,
                format_timestamp(&now),
            ],
        )?;

        let id = conn.last_insert_rowid();
        conn.query_row(
            "SELECT p.id, p.patient_id, pt.name, p.diagnosis, p.admission_date,
                    p.discharge_date, p.medications, p.created_at
             FROM prescriptions p JOIN patients pt ON p.patient_id = pt.id
             WHERE p.id = ?1",
            params![id],
            parse_prescription_row,
        )
        .optional()?
        .ok_or(DbError::PrescriptionNotFound(id))
    }

    /// Most recent prescriptions written for one operator's patients, newest first
    pub fn recent_prescriptions(
        &self,
        operator_id: OperatorId,
        limit: usize,
    ) -> DbResult<Vec<Prescription>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.patient_id, pt.name, p.diagnosis, p.admission_date,
                    p.discharge_date, p.medications, p.created_at
             FROM prescriptions p JOIN patients pt ON p.patient_id = pt.id
             WHERE pt.operator_id = ?1
             ORDER BY p.id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(
            params![operator_id, sql_limit(limit)],
            parse_prescription_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn count_prescriptions(&self, operator_id: OperatorId) -> DbResult<i64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM prescriptions p
             JOIN patients pt ON p.patient_id = pt.id
             WHERE pt.operator_id = ?1",
            params![operator_id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    /// Prescriptions created on the given local calendar day
    pub fn count_prescriptions_on(&self, operator_id: OperatorId, day: NaiveDate) -> DbResult<i64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM prescriptions p
             JOIN patients pt ON p.patient_id = pt.id
             WHERE pt.operator_id = ?1 AND date(p.created_at, 'localtime') = ?2",
            params![operator_id, day.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }

    /// All three counters in one call
    pub fn statistics(&self, operator_id: OperatorId, today: NaiveDate) -> DbResult<Statistics> {
        Ok(Statistics {
            patients: self.count_patients(operator_id)?,
            prescriptions: self.count_prescriptions(operator_id)?,
            prescriptions_today: self.count_prescriptions_on(operator_id, today)?,
        })
    }
}

fn parse_patient_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        phone: row.get(3)?,
        operator_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn parse_prescription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Prescription> {
    let medications = decode_medications(&row.get::<_, String>(6)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Prescription {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        diagnosis: row.get(3)?,
        admission_date: parse_date(row, 4)?,
        discharge_date: parse_date(row, 5)?,
        medications,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn parse_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Millisecond precision keeps the value inside what SQLite's date() parses
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
