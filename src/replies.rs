//! Operator-facing message text
//!
//! Markdown-flavoured text sent back over the channel. Dates shown to the
//! operator are always `DD-MM-YYYY`.

use crate::db::{MedicationEntry, Patient, Prescription, Statistics};
use crate::parser::H_PYLORI_KEYWORD;
use chrono::NaiveDate;
use std::fmt::Write;

/// Display format for every date shown to the operator
pub const DATE_FORMAT: &str = "%d-%m-%Y";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================================
// Menu and Control
// ============================================================

pub fn welcome() -> String {
    "🏥 **Medical Management Bot**\n\n\
     Welcome to the Medical Bot! I can help you:\n\n\
     👤 Manage patient records\n\
     💊 Create and manage prescriptions\n\
     📋 View patient history\n\
     🔍 Search through records\n\
     📊 Generate reports\n\n\
     Choose an option from the menu below:"
        .to_string()
}

pub fn idle_hint() -> String {
    "Please choose an option from the menu below.".to_string()
}

pub fn cancelled() -> String {
    "❌ Operation cancelled. Back to main menu.".to_string()
}

pub fn store_unavailable() -> String {
    "⚠️ The record store could not be reached. Nothing was saved; please send the same input again."
        .to_string()
}

pub fn session_lost() -> String {
    "⚠️ The entry in progress was lost. Back to main menu.".to_string()
}

// ============================================================
// Patient Registration
// ============================================================

pub fn name_prompt() -> String {
    "🏥 **Adding New Patient**\n\nPlease enter the patient's full name:".to_string()
}

pub fn name_required() -> String {
    "The name cannot be empty. Please enter the patient's full name:".to_string()
}

pub fn age_prompt(name: &str) -> String {
    format!("Patient Name: **{name}**\n\nPlease enter the patient's age:")
}

pub fn invalid_age() -> String {
    "Please enter a valid age (number only):".to_string()
}

pub fn phone_prompt(age: i64) -> String {
    format!("Age: **{age}** years\n\nPlease enter the patient's phone number:")
}

pub fn patient_added(patient: &Patient) -> String {
    format!(
        "✅ **Patient Added Successfully!**\n\n\
         👤 **Name:** {}\n\
         🎂 **Age:** {} years\n\
         📱 **Phone:** {}\n\
         🆔 **Patient ID:** {}\n\n\
         Would you like to create a prescription for this patient?",
        patient.name, patient.age, patient.phone, patient.id
    )
}

// ============================================================
// Prescription Authoring
// ============================================================

pub fn no_patients_for_prescription() -> String {
    "❌ No patients found. Please add a patient first.".to_string()
}

pub fn select_patient_prompt() -> String {
    "👤 **Select Patient for Prescription:**".to_string()
}

pub fn select_patient_retry() -> String {
    "Please select a patient from the list above.".to_string()
}

pub fn diagnosis_prompt() -> String {
    "🏥 **Enter Diagnosis:**\n\nExample: Acute gastritis with H. pylori infection".to_string()
}

pub fn diagnosis_required() -> String {
    "The diagnosis cannot be empty. Please enter the diagnosis:".to_string()
}

pub fn medication_prompt() -> String {
    format!(
        "💊 **Enter Prescription Details**\n\n\
         **Format for each medication:**\n\
         ```\n\
         Medication Name | Dosage | Quantity | Instructions\n\
         ```\n\n\
         **Example:**\n\
         ```\n\
         Doxycycline 100mg | 100mg | 28 tablets | Take 1 tablet twice daily after meals for 14 days\n\n\
         Metronidazole 500mg | 500mg | 42 tablets | Take 1 tablet three times daily after meals for 14 days\n\n\
         Esomeprazole 40mg | 40mg | 28 tablets | Take 1 tablet twice daily before meals for 14 days\n\n\
         Bismuth 525mg | 525mg | 56 tablets | Take 1 tablet four times daily with meals and at bedtime for 14 days\n\
         ```\n\n\
         **H. pylori Quadruple Therapy Template:**\n\
         Send \"{H_PYLORI_KEYWORD}\" for quick H. pylori prescription template.\n\n\
         Please enter your prescription:"
    )
}

pub fn invalid_prescription() -> String {
    format!(
        "❌ Invalid prescription format. Please follow the example format or send '{H_PYLORI_KEYWORD}' for template."
    )
}

pub fn edit_prompt() -> String {
    "✏️ Please enter the corrected prescription:".to_string()
}

pub fn preview(
    patient: &Patient,
    diagnosis: &str,
    today: NaiveDate,
    medications: &[MedicationEntry],
) -> String {
    let mut text = format!(
        "📋 **Prescription Preview**\n\n\
         **Patient:** {} (Age: {})\n\
         **Diagnosis:** {diagnosis}\n\
         **Date:** {}\n\n\
         **Medications:**\n",
        patient.name,
        patient.age,
        format_date(today)
    );

    for (i, med) in medications.iter().enumerate() {
        let _ = write!(
            text,
            "\n**{}. {}**\n   • Dosage: {}\n   • Quantity: {}\n   • Instructions: {}\n",
            i + 1,
            med.name,
            med.dosage,
            med.quantity,
            med.instructions
        );
    }
    text
}

pub fn prescription_saved(prescription: &Prescription) -> String {
    format!(
        "✅ **Prescription Saved Successfully!**\n\n\
         📋 **Prescription ID:** {}\n\
         📅 **Date:** {}\n\n\
         The prescription has been saved to the database.\n\n\
         **Next Steps:**\n\
         • Print prescription for patient\n\
         • Schedule follow-up appointment\n\
         • Monitor treatment progress",
        prescription.id,
        format_date(prescription.admission_date)
    )
}

pub fn patient_missing() -> String {
    "❌ That patient could not be found in your records. The prescription was not saved."
        .to_string()
}

// ============================================================
// Listings and Reports
// ============================================================

pub fn patient_list(patients: &[Patient]) -> String {
    if patients.is_empty() {
        return "❌ No patients found.".to_string();
    }

    let mut text = "👥 **Patient List:**\n".to_string();
    for patient in patients {
        let _ = write!(
            text,
            "\n**{}** (ID: {})\n🎂 Age: {} years\n📱 Phone: {}\n📅 Added: {}\n---\n",
            patient.name,
            patient.id,
            patient.age,
            patient.phone,
            format_date(patient.created_at.date_naive())
        );
    }
    text
}

pub fn prescription_list(prescriptions: &[Prescription]) -> String {
    if prescriptions.is_empty() {
        return "❌ No prescriptions found.".to_string();
    }

    let mut text = "📋 **Recent Prescriptions:**\n".to_string();
    for rx in prescriptions {
        let _ = write!(
            text,
            "\n**Prescription #{}**\n👤 Patient: {}\n🏥 Diagnosis: {}\n📅 Date: {}\n💊 Medications: {} items\n---\n",
            rx.id,
            rx.patient_name,
            rx.diagnosis,
            format_date(rx.admission_date),
            rx.medications.len()
        );
    }
    text
}

pub fn search_prompt() -> String {
    "🔍 **Patient Search**\n\nEnter patient name or phone number to search:".to_string()
}

pub fn search_results(term: &str, patients: &[Patient]) -> String {
    if patients.is_empty() {
        return format!("❌ No patients found matching '{term}'");
    }

    let mut text = format!("🔍 **Search Results for '{term}':**\n");
    for patient in patients {
        let _ = write!(
            text,
            "\n**{}** (ID: {})\n🎂 Age: {} years\n📱 Phone: {}\n---\n",
            patient.name, patient.id, patient.age, patient.phone
        );
    }
    text
}

pub fn statistics(stats: &Statistics) -> String {
    format!(
        "📊 **Medical Bot Statistics**\n\n\
         👥 **Total Patients:** {}\n\
         📋 **Total Prescriptions:** {}\n\
         📅 **Today's Prescriptions:** {}\n\n\
         📈 **Usage Summary:**\n\
         • Average prescriptions per patient: {:.1}",
        stats.patients,
        stats.prescriptions,
        stats.prescriptions_today,
        stats.average_per_patient()
    )
}
