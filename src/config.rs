//! Runtime configuration
//!
//! Resolved once at startup from the environment and passed down; nothing
//! below `main` reads environment variables.

use std::path::PathBuf;
use std::str::FromStr;

/// How many records each listing shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Candidates offered when selecting a patient for a prescription
    pub patient_choices: usize,
    /// Rows in the "View Patients" listing
    pub patient_list: usize,
    /// Rows in the "View Prescriptions" listing
    pub prescription_list: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            patient_choices: 10,
            patient_list: 20,
            prescription_list: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> Self {
        let db_path = std::env::var("MEDBOT_DB_PATH").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".medbot").join("medical_records.db")
            },
            PathBuf::from,
        );

        let defaults = Limits::default();
        Self {
            db_path,
            port: parse_or(std::env::var("MEDBOT_PORT").ok(), 8000),
            limits: Limits {
                patient_choices: parse_or(
                    std::env::var("MEDBOT_PATIENT_CHOICES").ok(),
                    defaults.patient_choices,
                ),
                patient_list: parse_or(
                    std::env::var("MEDBOT_PATIENT_LIST_LIMIT").ok(),
                    defaults.patient_list,
                ),
                prescription_list: parse_or(
                    std::env::var("MEDBOT_PRESCRIPTION_LIST_LIMIT").ok(),
                    defaults.prescription_list,
                ),
            },
        }
    }
}

/// Parse an optional raw value, keeping the default when absent or malformed
fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %value, "Ignoring malformed configuration value");
            default
        }),
        None => default,
    }
}
