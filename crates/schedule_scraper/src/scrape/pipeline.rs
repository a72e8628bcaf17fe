//! The per-department sub-pipeline: fetch, extract, persist.

use super::error::ScrapeError;
use super::report::DepartmentReport;
use crate::db::{Store, StoreError};
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::model::{Department, PrimaryKey, Queryable};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Scrapes one department into `staging`.
///
/// The page is fully extracted before anything is written, so a department
/// whose page can't be fetched or parsed leaves no rows behind. After that,
/// only a failure to write the department row aborts the sub-pipeline. A class
/// or section that can't be written is logged and skipped, and sections are
/// only written under classes that made it into the store.
pub(crate) async fn scrape_department<F, X>(
    dept: Department,
    fetcher: &F,
    extractor: &X,
    staging: &Store,
) -> Result<DepartmentReport, ScrapeError>
where
    F: Fetcher + ?Sized,
    X: Extractor + ?Sized,
{
    let name = dept.abbreviation.clone();
    let page = fetcher
        .fetch(&dept.link)
        .await
        .map_err(|source| ScrapeError::DepartmentFetch {
            department: name.clone(),
            source,
        })?;

    let extract_err = |source| ScrapeError::DepartmentExtract {
        department: name.clone(),
        source,
    };
    let classes = extractor.classes(&page, &dept).map_err(extract_err)?;
    let sections = extractor.sections(&page, &classes).map_err(extract_err)?;

    let mut report = DepartmentReport::new(&name);
    report.classes = classes.len();
    report.sections = sections.len();

    match staging.insert(&dept) {
        Ok(()) => report.inserted += 1,
        Err(e) if e.is_duplicate() => {
            warn!(department = %name, error = %e, "Department already stored, skipping row");
            report.skipped += 1;
        }
        Err(source) => {
            return Err(ScrapeError::DepartmentStore {
                department: name,
                source,
            })
        }
    }

    let mut stored_classes: HashSet<PrimaryKey> = HashSet::new();
    for class in &classes {
        if store_record(staging, class, &name, &mut report) {
            stored_classes.insert(class.primary_key());
        }
    }

    for section in &sections {
        let parent_stored = section
            .foreign_key()
            .is_some_and(|class_key| stored_classes.contains(&class_key));
        if !parent_stored {
            warn!(
                department = %name,
                sln = %section.sln,
                class = %section.class_key,
                "Class was not stored, skipping section"
            );
            report.skipped += 1;
            continue;
        }
        store_record(staging, section, &name, &mut report);
    }

    info!(
        department = %name,
        classes = report.classes,
        sections = report.sections,
        inserted = report.inserted,
        skipped = report.skipped,
        "Department scraped"
    );

    Ok(report)
}

/// Writes one record, returning true if a row with its key is now present.
fn store_record<Q: Queryable>(
    staging: &Store,
    record: &Q,
    department: &str,
    report: &mut DepartmentReport,
) -> bool {
    match staging.insert(record) {
        Ok(()) => {
            report.inserted += 1;
            true
        }
        Err(e) => {
            report.skipped += 1;
            log_skipped(record, department, &e);
            e.is_duplicate()
        }
    }
}

fn log_skipped<Q: Queryable>(record: &Q, department: &str, error: &StoreError) {
    if error.is_record_level() {
        debug!(
            department = %department,
            table = record.table_name(),
            key = %record.primary_key(),
            error = %error,
            "Skipped record"
        );
    } else {
        warn!(
            department = %department,
            table = record.table_name(),
            key = %record.primary_key(),
            error = %error,
            "Failed to store record"
        );
    }
}
