//! The filter-and-fetch loop
//!
//! For every experiment, model, variable and ensemble member the catalog is
//! queried; each matching store is time-subset, written to NetCDF and, when a
//! target grid is configured, regridded and written a second time.

use crate::catalog::{Catalog, CatalogEntry, Query};
use crate::config::{Settings, TargetGridSpec};
use crate::cftime::TimeRange;
use crate::data_source::DataReader;
use crate::dataset::Dataset;
use crate::errors::Result;
use crate::netcdf_io::write_dataset;
use crate::regrid::{RegridMethod, Regridder, TargetGrid};
use crate::zarr_io::{ZarrReader, ZarrSource};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

const SEPARATOR: &str = "---------------------------------------";

/// Opens the store behind a catalog `zstore` value
pub trait StoreOpener {
    fn open(&self, zstore: &str) -> Result<Box<dyn DataReader>>;
}

/// Opens consolidated Zarr stores over HTTP or from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrOpener;

impl StoreOpener for ZarrOpener {
    fn open(&self, zstore: &str) -> Result<Box<dyn DataReader>> {
        Ok(Box::new(ZarrReader::open(ZarrSource::parse(zstore)?)?))
    }
}

/// Behaviour switches from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub fail_fast: bool,
}

/// Counts of what a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub regridded: usize,
    pub not_found: usize,
    /// Stores with no time step inside the experiment range
    pub empty: usize,
    pub failed: usize,
    /// Stores listed by a dry run
    pub planned: usize,
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn log(&self) {
        info!("📊 Run summary:");
        info!("   Downloaded: {}", self.downloaded);
        info!("   Regridded: {}", self.regridded);
        info!("   Not in catalog: {}", self.not_found);
        info!("   Empty time selection: {}", self.empty);
        info!("   Failed: {}", self.failed);
        if self.planned > 0 {
            info!("   Planned (dry run): {}", self.planned);
        }
    }
}

/// Facets identifying one requested dataset
#[derive(Debug, Clone, Copy)]
struct Job<'a> {
    experiment: &'a str,
    range: &'a TimeRange,
    source_id: &'a str,
    variable: &'a str,
    table: &'a str,
    member: &'a str,
}

impl<'a> Job<'a> {
    fn query(&self) -> Query<'a> {
        Query {
            table_id: self.table,
            variable_id: self.variable,
            experiment_id: self.experiment,
            source_id: self.source_id,
            member_id: self.member,
        }
    }
}

enum Outcome {
    Written,
    Empty,
}

/// `{var}_{exp}_{table}_{source}_{member}_{start}_{end}[_{dlat}x{dlon}].nc`
pub fn output_file_name(
    variable: &str,
    experiment: &str,
    table: &str,
    source_id: &str,
    member: &str,
    range: &TimeRange,
    grid: Option<&TargetGridSpec>,
) -> String {
    let stem = format!(
        "{}_{}_{}_{}_{}_{}_{}",
        variable, experiment, table, source_id, member, range.start.label, range.end.label
    );
    match grid {
        Some(grid) => format!("{}_{}.nc", stem, grid.label()),
        None => format!("{}.nc", stem),
    }
}

/// One configured run over a catalog
pub struct Pipeline<'a, O: StoreOpener> {
    settings: &'a Settings,
    catalog: &'a Catalog,
    opener: O,
    options: RunOptions,
}

impl<'a, O: StoreOpener> Pipeline<'a, O> {
    pub fn new(settings: &'a Settings, catalog: &'a Catalog, opener: O, options: RunOptions) -> Self {
        Self {
            settings,
            catalog,
            opener,
            options,
        }
    }

    /// `(model key, source_id)` pairs to visit
    fn models(&self) -> Vec<(String, String)> {
        if self.settings.download_all_models {
            self.catalog
                .unique_source_ids()
                .into_iter()
                .map(|source| (source.clone(), source))
                .collect()
        } else {
            self.settings
                .dataset
                .iter()
                .map(|(key, entry)| (key.clone(), entry.source_id.clone()))
                .collect()
        }
    }

    /// Configured ensemble members of a model
    fn members(&self, model: &str) -> Option<Vec<String>> {
        self.settings
            .model_entry(model)
            .map(|entry| entry.ens_members.clone())
    }

    /// Runs the nested loop
    ///
    /// # Errors
    ///
    /// Fails if the output directory cannot be created or the target grid is
    /// invalid; per-dataset failures only abort with `fail_fast`.
    pub fn run(&self) -> Result<RunSummary> {
        fs::create_dir_all(&self.settings.out_dir)?;

        let target = self
            .settings
            .target_grid
            .as_ref()
            .map(|spec| TargetGrid::from_spacing(spec.dlat, spec.dlon))
            .transpose()?;
        if let Some(grid) = &target {
            let (n_lat, n_lon) = grid.shape();
            info!("🌐 Regridding enabled: {} x {} target grid", n_lat, n_lon);
        }

        let models = self.models();
        let all_members = self
            .settings
            .download_all_members
            .then(|| self.catalog.unique_member_ids());
        let mut summary = RunSummary::default();

        for (experiment, range) in &self.settings.experiments {
            for (model, source_id) in &models {
                let members = match &all_members {
                    Some(members) => members.clone(),
                    None => match self.members(model) {
                        Some(members) => members,
                        None => {
                            warn!("⚠ No ensemble members configured for model '{}', skipping", model);
                            continue;
                        }
                    },
                };
                for (variable, table) in &self.settings.variables {
                    for member in &members {
                        let job = Job {
                            experiment,
                            range,
                            source_id,
                            variable,
                            table,
                            member,
                        };
                        self.visit(&job, target.as_ref(), &mut summary)?;
                        info!("{}", SEPARATOR);
                    }
                }
            }
        }

        Ok(summary)
    }

    fn visit(&self, job: &Job<'_>, target: Option<&TargetGrid>, summary: &mut RunSummary) -> Result<()> {
        let query = job.query();
        let Some(entry) = self.catalog.select(&query) else {
            info!("❌ Data not found for: {}", job.variable);
            info!("{}", query);
            summary.not_found += 1;
            return Ok(());
        };

        info!("⏬ Trying to download: ");
        info!("{}", query);
        if self.options.dry_run {
            info!("   store: {}", entry.zstore);
            summary.planned += 1;
            return Ok(());
        }

        match self.fetch(job, entry, target, summary) {
            Ok(Outcome::Written) => Ok(()),
            Ok(Outcome::Empty) => {
                summary.empty += 1;
                Ok(())
            }
            Err(e) if !self.options.fail_fast => {
                error!("❌ Failed to process {}: {}", entry.zstore, e);
                summary.failed += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn fetch(
        &self,
        job: &Job<'_>,
        entry: &CatalogEntry,
        target: Option<&TargetGrid>,
        summary: &mut RunSummary,
    ) -> Result<Outcome> {
        let reader = self.opener.open(&entry.zstore)?;
        let Some(dataset) = Dataset::load_time_subset(reader.as_ref(), job.range)? else {
            warn!(
                "⚠ No time steps between {} and {} in {}",
                job.range.start.label, job.range.end.label, entry.zstore
            );
            return Ok(Outcome::Empty);
        };

        let out_file = self.output_path(job, None);
        write_dataset(&dataset, &out_file)?;
        info!("💾 Saved original resolution: {}", out_file.display());
        summary.written.push(out_file);
        // counted before regridding, which may still fail
        summary.downloaded += 1;

        let (Some(grid), Some(spec), Some(method)) = (
            target,
            self.settings.target_grid.as_ref(),
            self.settings.regrid_method,
        ) else {
            return Ok(Outcome::Written);
        };

        let out_file = self.output_path(job, Some(spec));
        regrid_and_write(&dataset, grid, method, &out_file)?;
        info!("💾 Saved regridded data: {}", out_file.display());
        summary.written.push(out_file);
        summary.regridded += 1;
        Ok(Outcome::Written)
    }

    fn output_path(&self, job: &Job<'_>, grid: Option<&TargetGridSpec>) -> PathBuf {
        self.settings.out_dir.join(output_file_name(
            job.variable,
            job.experiment,
            job.table,
            job.source_id,
            job.member,
            job.range,
            grid,
        ))
    }
}

fn regrid_and_write(dataset: &Dataset, grid: &TargetGrid, method: RegridMethod, path: &Path) -> Result<()> {
    let regridder = Regridder::from_dataset(dataset, grid.clone(), method)?;
    let regridded = regridder.regrid_dataset(dataset)?;
    write_dataset(&regridded, path)
}
