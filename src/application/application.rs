// This is where we define the core application and all the related
// wiring for how to start it up and shut it down again.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::analysis::lemma::LemmaEngines;
use crate::crawl::{Crawler, CrawlerConfig};
use crate::indexes::admin::AdminService;
use crate::indexes::service::{IndexService, NrtRefresher};

use super::config::configuration::Configuration;
use super::config::state::StateSource;
use super::logging::tracing::tracing_subscribe;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// Process-wide state, constructed once at startup and shut down in
/// reverse order of construction. Everything downstream holds shared
/// non-owning handles into this.
pub struct Application {
    pub config: Configuration,
    pub state_source: Arc<StateSource>,
    pub service: Arc<IndexService>,
    pub crawler: Arc<Crawler>,
    pub admin: Arc<AdminService>,
    refresher: Mutex<Option<NrtRefresher>>,
}

impl Application {
    pub fn initialize(config: Configuration) -> Result<Arc<Self>> {
        let state_source = Arc::new(StateSource::load(config.config_file.clone())?);
        let lemmas = Arc::new(LemmaEngines::new(config.lemma_cache_size));

        let service = IndexService::open(
            &config.index_dir,
            lemmas,
            config.writer_threads,
            config.writer_buffer_bytes,
            config.nrt_refresh_interval_ms,
            config.slow_nrt_refresh_interval_ms,
        )?;
        if service.schema_upgrade_required() {
            warn!("index schema is stale, a full reindex is required");
        }

        let crawler_config: CrawlerConfig = config.crawler_config();
        let crawler = Crawler::new(service.clone(), state_source.clone(), crawler_config);
        let admin = Arc::new(AdminService::new(service.clone()));
        let refresher = NrtRefresher::start(service.clone());

        info!(
            index_dir = %config.index_dir.display(),
            roots = state_source.directories().len(),
            "application initialized"
        );

        Ok(Arc::new(Self {
            config,
            state_source,
            service,
            crawler,
            admin,
            refresher: Mutex::new(Some(refresher)),
        }))
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }
        if !tracing_subscribe(config) {
            warn!("failed to install tracing subscriber, there's probably one already");
        }
        LOGGER_INSTALLED.set(true).unwrap();
    }

    /// Reverse order of construction: crawler, refresh scheduler, admin
    /// executor, then the index itself.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.crawler.stop();
        if let Some(mut refresher) = self.refresher.lock().unwrap().take() {
            refresher.stop();
        }
        self.admin.shutdown();
        if let Err(err) = self.service.close() {
            warn!(error = %err, "index close failed");
        }
    }
}
