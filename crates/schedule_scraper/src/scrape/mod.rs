//! The refresh cycle.
//!
//! Each cycle fetches the root index, runs one sub-pipeline per department
//! against the staging store, waits for all of them, then flips the switch so
//! the freshly built snapshot becomes live.

mod error;
mod pipeline;
mod report;

pub use error::ScrapeError;
pub use report::{CycleReport, DepartmentReport};

use crate::config::{ExecutionMode, ScraperConfig};
use crate::db::{Store, SwitchController};
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::model::Department;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{error, info, warn};
use url::Url;

/// When the refresh loop should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Keep cycling until a fatal error
    Never,
    /// Return after this many completed cycles
    AfterCycles(u64),
}

impl StopCondition {
    fn is_met(self, completed_cycles: u64) -> bool {
        match self {
            StopCondition::Never => false,
            StopCondition::AfterCycles(n) => completed_cycles >= n,
        }
    }
}

pub struct Scraper<F, X> {
    switch: Arc<SwitchController>,
    fetcher: Arc<F>,
    extractor: Arc<X>,
    config: ScraperConfig,
    root: Url,
}

impl<F: Fetcher, X: Extractor> Scraper<F, X> {
    pub fn new(
        switch: Arc<SwitchController>,
        fetcher: F,
        extractor: X,
        config: ScraperConfig,
    ) -> Result<Self, ScrapeError> {
        let root = config.root()?;
        Ok(Self {
            switch,
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(extractor),
            config,
            root,
        })
    }

    pub fn switch(&self) -> &Arc<SwitchController> {
        &self.switch
    }

    /// Runs cycles back to back, sleeping the configured interval in between.
    ///
    /// The stop condition is checked before every cycle, so
    /// `AfterCycles(0)` returns without touching either store. Returns the
    /// number of cycles run, or the first fatal error.
    pub async fn run(&self, stop: StopCondition) -> Result<u64, ScrapeError> {
        let mut cycles = 0;
        while !stop.is_met(cycles) {
            if cycles > 0 {
                tokio::time::sleep(self.config.cycle_interval()).await;
            }

            let report = self.run_cycle().await?;
            cycles += 1;
            info!(
                cycle = cycles,
                live = %report.live,
                departments = report.launched,
                failed = report.failed.len(),
                inserted = report.inserted(),
                skipped = report.skipped(),
                duration_ms = report.duration.as_millis() as u64,
                "Cycle complete"
            );
        }
        Ok(cycles)
    }

    /// Runs one full cycle and flips the switch.
    ///
    /// Failures to fetch or parse the root index, or to prepare or flip the
    /// stores, are returned before the live store is touched. Failures inside
    /// a department's sub-pipeline are only reported.
    pub async fn run_cycle(&self) -> Result<CycleReport, ScrapeError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let index = self
            .fetcher
            .fetch(self.root.as_str())
            .await
            .map_err(ScrapeError::IndexFetch)?;
        let departments = self
            .extractor
            .departments(&index, &self.root)
            .map_err(ScrapeError::IndexExtract)?;
        info!(departments = departments.len(), "Extracted departments from root index");

        let staging = self.switch.prepare_staging()?;
        info!(staging = %staging.id(), mode = ?self.config.mode, "Scraping into staging store");

        let launched = departments.len();
        let outcomes = match self.config.mode {
            ExecutionMode::Concurrent => self.scrape_concurrently(departments, &staging).await,
            ExecutionMode::Sequential => self.scrape_sequentially(departments, &staging).await,
        };

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (department, outcome) in outcomes {
            match outcome {
                Ok(report) => completed.push(report),
                Err(e) => {
                    warn!(department = %department, error = %e, "Department sub-pipeline aborted");
                    failed.push(department);
                }
            }
        }

        let fingerprint = match staging.fingerprint() {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(error = %e, "Failed to fingerprint staging store");
                None
            }
        };

        let live = self.switch.flip()?;

        Ok(CycleReport {
            started_at,
            duration: start.elapsed(),
            launched,
            completed,
            failed,
            live,
            fingerprint,
        })
    }

    /// Launches one task per department, pausing `launch_delay` between
    /// launches, then waits for every task to finish.
    async fn scrape_concurrently(
        &self,
        departments: Vec<Department>,
        staging: &Arc<Store>,
    ) -> Vec<(String, Result<DepartmentReport, ScrapeError>)> {
        let delay = self.config.launch_delay();
        let mut tasks = Vec::with_capacity(departments.len());

        for (i, dept) in departments.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let name = dept.abbreviation.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let staging = Arc::clone(staging);
            let handle = tokio::spawn(async move {
                pipeline::scrape_department(dept, fetcher.as_ref(), extractor.as_ref(), &staging)
                    .await
            });
            tasks.push((name, handle));
        }

        join_all(tasks.into_iter().map(|(name, handle)| async move {
            let outcome = handle.await.unwrap_or_else(|e| Err(task_failed(&name, e)));
            (name, outcome)
        }))
        .await
    }

    async fn scrape_sequentially(
        &self,
        departments: Vec<Department>,
        staging: &Arc<Store>,
    ) -> Vec<(String, Result<DepartmentReport, ScrapeError>)> {
        let mut outcomes = Vec::with_capacity(departments.len());
        for dept in departments {
            let name = dept.abbreviation.clone();
            let outcome = pipeline::scrape_department(
                dept,
                self.fetcher.as_ref(),
                self.extractor.as_ref(),
                staging,
            )
            .await;
            outcomes.push((name, outcome));
        }
        outcomes
    }
}

fn task_failed(department: &str, err: JoinError) -> ScrapeError {
    error!(department = %department, error = %err, "Department task did not complete");
    ScrapeError::TaskFailed {
        department: department.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreId;
    use crate::extract::{ExtractError, TimeScheduleExtractor};
    use crate::fetch::FetchError;
    use crate::model::{Class, Entity, Queryable, Section};
    use crate::test_pages;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Serves canned pages; URLs in `failing` always error.
    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, Vec<u8>>,
        failing: HashSet<String>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn page(mut self, path: &str, body: impl Into<Vec<u8>>) -> Self {
            self.pages.insert(url(path), body.into());
            self
        }

        fn failing(mut self, path: &str) -> Self {
            self.failing.insert(url(path));
            self
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                return Err(FetchError::Network {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn url(path: &str) -> String {
        format!("{}{}", test_pages::ROOT_URL, path)
    }

    fn config(mode: ExecutionMode) -> ScraperConfig {
        ScraperConfig {
            root_url: test_pages::ROOT_URL.to_string(),
            launch_delay_ms: 0,
            cycle_interval_secs: 0,
            mode,
            ..Default::default()
        }
    }

    /// Root index listing CSE and MATH, where MATH's page can't be fetched.
    fn cse_and_broken_math() -> StaticFetcher {
        StaticFetcher::default()
            .page(
                "",
                test_pages::index(&[
                    ("cse.html", "Computer Science &amp; Engineering", "CSE"),
                    ("math.html", "Mathematics", "MATH"),
                ]),
            )
            .page("cse.html", test_pages::cse_page())
            .failing("math.html")
    }

    fn five_departments() -> StaticFetcher {
        let depts = ["ANTH", "BIOL", "CHEM", "XYZ", "PHYS"];
        let entries: Vec<(String, String, String)> = depts
            .iter()
            .map(|d| (format!("{}.html", d.to_lowercase()), format!("Dept {d}"), d.to_string()))
            .collect();
        let refs: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|(h, t, a)| (h.as_str(), t.as_str(), a.as_str()))
            .collect();

        let mut fetcher = StaticFetcher::default().page("", test_pages::index(&refs));
        for (i, dept) in depts.iter().enumerate() {
            let base = 10000 + i * 10;
            let intro = format!("{} {}", base, base + 1);
            let next = format!("{}", base + 2);
            let page = test_pages::dept_page(
                dept,
                &[
                    ("101", "INTRO", intro.as_str()),
                    ("201", "NEXT", next.as_str()),
                ],
            );
            fetcher = fetcher.page(&format!("{}.html", dept.to_lowercase()), page);
        }
        fetcher.failing("xyz.html")
    }

    /// Panics while extracting one department's classes, otherwise parses
    /// pages like the real extractor.
    struct PanicsOn(&'static str);

    impl Extractor for PanicsOn {
        fn departments(&self, page: &[u8], base: &Url) -> Result<Vec<Department>, ExtractError> {
            TimeScheduleExtractor.departments(page, base)
        }

        fn classes(&self, page: &[u8], dept: &Department) -> Result<Vec<Class>, ExtractError> {
            if dept.abbreviation == self.0 {
                panic!("extractor bug on {}", self.0);
            }
            TimeScheduleExtractor.classes(page, dept)
        }

        fn sections(&self, page: &[u8], classes: &[Class]) -> Result<Vec<Section>, ExtractError> {
            TimeScheduleExtractor.sections(page, classes)
        }
    }

    fn open_switch(dir: &Path) -> Arc<SwitchController> {
        Arc::new(SwitchController::open(dir).unwrap())
    }

    fn scraper(
        switch: Arc<SwitchController>,
        fetcher: StaticFetcher,
        mode: ExecutionMode,
    ) -> Scraper<StaticFetcher, TimeScheduleExtractor> {
        Scraper::new(switch, fetcher, TimeScheduleExtractor, config(mode)).unwrap()
    }

    #[tokio::test]
    async fn test_cycle_publishes_reachable_departments() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = scraper(
            Arc::clone(&switch),
            cse_and_broken_math(),
            ExecutionMode::Concurrent,
        );

        let report = scraper.run_cycle().await.unwrap();
        assert_eq!(report.launched, 2);
        assert_eq!(report.failed, vec!["MATH".to_string()]);
        assert_eq!(report.live, StoreId::B);

        assert!(matches!(switch.get("departments", &"CSE".into()), Ok(Entity::Department(_))));
        match switch.get("classes", &"CSE-CSE142".into()).unwrap() {
            Entity::Class(class) => assert_eq!(class.foreign_key().unwrap().as_str(), "CSE"),
            other => panic!("expected a class, got {other:?}"),
        }
        let section: Section = switch.get_as(&"12345".into()).unwrap();
        assert_eq!(section.class_key, "CSE-CSE142");
        assert!(switch
            .get("departments", &"MATH".into())
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_failed_department_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = scraper(Arc::clone(&switch), five_departments(), ExecutionMode::Concurrent);

        let report = scraper.run_cycle().await.unwrap();
        assert_eq!(report.failed, vec!["XYZ".to_string()]);
        assert_eq!(report.completed.len(), 4);

        let live = switch.current_live();
        assert_eq!(live.row_count("departments").unwrap(), 4);
        assert_eq!(live.row_count("classes").unwrap(), 8);
        assert_eq!(live.row_count("sections").unwrap(), 12);
        assert!(live.orphaned_rows().unwrap().is_empty());
        assert!(live
            .get::<Class>(&"XYZ-XYZ101".into())
            .unwrap_err()
            .is_not_found());
        assert!(live
            .get::<Section>(&"10030".into())
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_and_alternates_stores() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = scraper(Arc::clone(&switch), five_departments(), ExecutionMode::Concurrent);

        let first = scraper.run_cycle().await.unwrap();
        let second = scraper.run_cycle().await.unwrap();
        let third = scraper.run_cycle().await.unwrap();

        assert_eq!((first.live, second.live, third.live), (StoreId::B, StoreId::A, StoreId::B));
        assert!(first.fingerprint.is_some());
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.fingerprint, third.fingerprint);
    }

    #[tokio::test]
    async fn test_sequential_mode_matches_concurrent() {
        let concurrent_dir = tempfile::tempdir().unwrap();
        let sequential_dir = tempfile::tempdir().unwrap();

        let concurrent = scraper(
            open_switch(concurrent_dir.path()),
            five_departments(),
            ExecutionMode::Concurrent,
        )
        .run_cycle()
        .await
        .unwrap();
        let sequential = scraper(
            open_switch(sequential_dir.path()),
            five_departments(),
            ExecutionMode::Sequential,
        )
        .run_cycle()
        .await
        .unwrap();

        assert_eq!(concurrent.fingerprint, sequential.fingerprint);
        assert_eq!(concurrent.failed, sequential.failed);
    }

    #[tokio::test]
    async fn test_unreachable_index_is_fatal_and_leaves_switch() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        scraper(Arc::clone(&switch), cse_and_broken_math(), ExecutionMode::Concurrent)
            .run_cycle()
            .await
            .unwrap();

        // Leave something in staging to prove it isn't reset either
        let staging = switch.current_staging();
        staging
            .insert(&Department::new("OLD", "Old", "old.html"))
            .unwrap();

        let broken = StaticFetcher::default().failing("");
        let err = scraper(Arc::clone(&switch), broken, ExecutionMode::Concurrent)
            .run_cycle()
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, ScrapeError::IndexFetch(_)));
        assert_eq!(switch.live_id(), StoreId::B);
        assert_eq!(staging.row_count("departments").unwrap(), 1);
        assert!(switch.get("departments", &"CSE".into()).is_ok());
    }

    #[tokio::test]
    async fn test_unparsable_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let fetcher = StaticFetcher::default()
            .page("", "<html><body>maintenance</body></html>".to_string());

        let err = scraper(Arc::clone(&switch), fetcher, ExecutionMode::Sequential)
            .run_cycle()
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::IndexExtract(_)));
        assert_eq!(switch.live_id(), StoreId::A);
    }

    #[tokio::test]
    async fn test_crash_before_flip_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let before = {
            let switch = open_switch(dir.path());
            let report = scraper(
                Arc::clone(&switch),
                cse_and_broken_math(),
                ExecutionMode::Concurrent,
            )
            .run_cycle()
            .await
            .unwrap();

            // A cycle that dies after writing to staging but before flipping
            let staging = switch.prepare_staging().unwrap();
            staging
                .insert(&Department::new("HALF", "Half Written", "half.html"))
                .unwrap();
            report.fingerprint.unwrap()
        };

        let switch = open_switch(dir.path());
        assert_eq!(switch.live_id(), StoreId::B);
        assert_eq!(switch.current_live().fingerprint().unwrap(), before);
        assert!(switch
            .get("departments", &"HALF".into())
            .unwrap_err()
            .is_not_found());

        let report = scraper(Arc::clone(&switch), cse_and_broken_math(), ExecutionMode::Concurrent)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(report.live, StoreId::A);
        assert_eq!(report.fingerprint.unwrap(), before);
        assert!(switch
            .get("departments", &"HALF".into())
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let page = test_pages::dept_page(
            "BIOL",
            &[("180", "INTRO", "11111"), ("200", "CELLS", "11111 11112")],
        );
        let fetcher = StaticFetcher::default()
            .page("", test_pages::index(&[("biol.html", "Biology", "BIOL")]))
            .page("biol.html", page);

        let report = scraper(Arc::clone(&switch), fetcher, ExecutionMode::Concurrent)
            .run_cycle()
            .await
            .unwrap();

        assert!(report.failed.is_empty());
        assert_eq!(report.skipped(), 1);
        let first: Section = switch.get_as(&"11111".into()).unwrap();
        assert_eq!(first.class_key, "BIOL-BIOL180");
        assert!(switch.get_as::<Section>(&"11112".into()).is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_after_requested_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = scraper(
            Arc::clone(&switch),
            cse_and_broken_math(),
            ExecutionMode::Concurrent,
        );

        assert_eq!(scraper.run(StopCondition::AfterCycles(2)).await.unwrap(), 2);
        assert_eq!(switch.live_id(), StoreId::A);

        let requests = scraper.fetcher.requests.lock().unwrap();
        assert_eq!(requests.iter().filter(|u| u.ends_with("cse.html")).count(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_department_page_leaves_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let fetcher = StaticFetcher::default()
            .page(
                "",
                test_pages::index(&[
                    ("cse.html", "Computer Science &amp; Engineering", "CSE"),
                    ("xyz.html", "Xylography", "XYZ"),
                ]),
            )
            .page("cse.html", test_pages::cse_page())
            .page("xyz.html", vec![0xff, 0xfe, 0x00]);

        let report = scraper(Arc::clone(&switch), fetcher, ExecutionMode::Concurrent)
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["XYZ".to_string()]);
        assert!(switch
            .get("departments", &"XYZ".into())
            .unwrap_err()
            .is_not_found());
        assert!(switch.get("departments", &"CSE".into()).is_ok());
        assert_eq!(switch.current_live().row_count("departments").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_launches_are_paced() {
        let dir = tempfile::tempdir().unwrap();
        let paced = ScraperConfig {
            launch_delay_ms: 40,
            ..config(ExecutionMode::Concurrent)
        };
        let scraper = Scraper::new(
            open_switch(dir.path()),
            five_departments(),
            TimeScheduleExtractor,
            paced,
        )
        .unwrap();

        let start = Instant::now();
        let report = scraper.run_cycle().await.unwrap();

        assert_eq!(report.launched, 5);
        assert!(start.elapsed() >= Duration::from_millis(4 * 40));
    }

    #[tokio::test]
    async fn test_panicking_department_still_reaches_barrier() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = Scraper::new(
            Arc::clone(&switch),
            five_departments(),
            PanicsOn("BIOL"),
            config(ExecutionMode::Concurrent),
        )
        .unwrap();

        let report = scraper.run_cycle().await.unwrap();

        assert_eq!(report.launched, 5);
        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.failed, vec!["BIOL".to_string(), "XYZ".to_string()]);
        assert_eq!(report.live, StoreId::B);
        assert!(switch
            .get("departments", &"BIOL".into())
            .unwrap_err()
            .is_not_found());
        assert!(switch.get("departments", &"ANTH".into()).is_ok());
        assert!(switch.current_live().orphaned_rows().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_with_zero_cycles_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let switch = open_switch(dir.path());
        let scraper = scraper(
            Arc::clone(&switch),
            cse_and_broken_math(),
            ExecutionMode::Concurrent,
        );

        assert_eq!(scraper.run(StopCondition::AfterCycles(0)).await.unwrap(), 0);
        assert_eq!(switch.live_id(), StoreId::A);
        assert!(scraper.fetcher.requests.lock().unwrap().is_empty());
    }
}
