use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use octowl_core::{Dataset, part10, tags};

use crate::cli::OutputFormat;
use crate::output::{print_json, print_warning};

/// One line of the worklist listing.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorklistRow {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorklistRow {
    pub fn from_dataset(file: String, dataset: &Dataset) -> Self {
        let step = dataset
            .items(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .and_then(|items| items.first());
        let from_step = |tag| step.and_then(|s| s.get_str(tag));
        Self {
            file,
            patient_name: dataset.get_str(tags::PATIENT_NAME),
            patient_id: dataset.get_str(tags::PATIENT_ID),
            accession_number: dataset.get_str(tags::ACCESSION_NUMBER),
            modality: from_step(tags::MODALITY).or_else(|| dataset.get_str(tags::MODALITY)),
            scheduled_date: from_step(tags::SCHEDULED_PROCEDURE_STEP_START_DATE),
            error: None,
        }
    }

    pub fn failed(file: String, error: impl ToString) -> Self {
        Self {
            file,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Read every regular file in `folder`, in name order.
pub fn collect_rows(folder: &Path) -> Result<Vec<WorklistRow>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(folder)
        .with_context(|| format!("Failed to read folder {}", folder.display()))?
    {
        let entry = entry?;
        if entry.path().is_file() {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();

    Ok(files
        .into_iter()
        .map(|file| match part10::read_file(folder.join(&file)) {
            Ok(dataset) => WorklistRow::from_dataset(file, &dataset),
            Err(e) => WorklistRow::failed(file, e),
        })
        .collect())
}

pub fn run(folder: &Path, format: OutputFormat) -> Result<()> {
    let rows = collect_rows(folder)?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            if rows.is_empty() {
                println!("No datasets found in {}.", folder.display());
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record([
                "File",
                "Patient Name",
                "Patient ID",
                "Accession",
                "Modality",
                "Scheduled",
            ]);
            let mut failures = 0;
            for row in &rows {
                let cell = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                match &row.error {
                    Some(error) => {
                        failures += 1;
                        builder.push_record([
                            row.file.clone(),
                            format!("load error: {error}"),
                            String::new(),
                            String::new(),
                            String::new(),
                            String::new(),
                        ]);
                    }
                    None => builder.push_record([
                        row.file.clone(),
                        cell(&row.patient_name),
                        cell(&row.patient_id),
                        cell(&row.accession_number),
                        cell(&row.modality),
                        cell(&row.scheduled_date),
                    ]),
                }
            }
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{table}");
            println!("{}: {}", "Datasets".cyan(), rows.len() - failures);
            if failures > 0 {
                print_warning(&format!("{failures} file(s) could not be loaded"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use octowl_core::Vr;

    fn worklist_item() -> Dataset {
        let mut step = Dataset::new();
        step.put_str(tags::MODALITY, Vr::CS, "MR").unwrap();
        step.put_str(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, Vr::DA, "20240612")
            .unwrap();
        let mut ds = Dataset::new();
        ds.put_str(tags::PATIENT_NAME, Vr::PN, "Doe^John").unwrap();
        ds.put_str(tags::PATIENT_ID, Vr::LO, "PID-1").unwrap();
        ds.put_str(tags::ACCESSION_NUMBER, Vr::SH, "A-77").unwrap();
        ds.put_sequence(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE, vec![step]);
        ds
    }

    #[test]
    fn test_row_reads_the_first_scheduled_step() {
        let row = WorklistRow::from_dataset("a.dcm".into(), &worklist_item());
        assert_eq!(row.patient_name.as_deref(), Some("Doe^John"));
        assert_eq!(row.patient_id.as_deref(), Some("PID-1"));
        assert_eq!(row.accession_number.as_deref(), Some("A-77"));
        assert_eq!(row.modality.as_deref(), Some("MR"));
        assert_eq!(row.scheduled_date.as_deref(), Some("20240612"));
        assert!(row.error.is_none());
    }

    #[test]
    fn test_collect_rows_reports_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        part10::write_file(dir.path().join("b.dcm"), &worklist_item()).unwrap();
        fs::write(dir.path().join("a.dcm"), b"not dicom").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let rows = collect_rows(dir.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].file, "a.dcm");
        assert!(rows[0].error.is_some());
        assert_eq!(rows[1].patient_id.as_deref(), Some("PID-1"));

        let json = serde_json::to_value(&rows[1]).unwrap();
        assert_eq!(json["patientId"], "PID-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_rows(&dir.path().join("missing")).is_err());
    }
}
