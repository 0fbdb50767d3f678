//! Pool of markup-to-text converter service endpoints.
//!
//! Endpoints are handed out round-robin through explicit leases: a lease
//! grants exclusive use of one endpoint and returns it to the back of the
//! queue when dropped. The semaphore bounds outstanding leases to the pool
//! size, so `acquire` waits while every endpoint is busy.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ConverterConfig;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Server-side conversion timeout passed to spawned instances
const SERVICE_TIMEOUT_SECS: u64 = 30;

pub struct ConverterPool {
    endpoints: Arc<Mutex<VecDeque<Url>>>,
    permits: Arc<Semaphore>,
    size: usize,
    children: tokio::sync::Mutex<Vec<Child>>,
}

impl ConverterPool {
    /// Use converter services that are already running.
    pub fn from_endpoints(endpoints: Vec<Url>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(AppError::config("converter pool needs at least one endpoint"));
        }
        let size = endpoints.len();
        Ok(Self {
            endpoints: Arc::new(Mutex::new(endpoints.into())),
            permits: Arc::new(Semaphore::new(size)),
            size,
            children: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    /// Build the pool described by the configuration.
    ///
    /// Configured endpoints are used as-is; otherwise `instances` services
    /// are spawned on sequential ports and polled until they accept
    /// connections.
    pub async fn from_config(config: &ConverterConfig) -> Result<Self> {
        if !config.endpoints.is_empty() {
            let endpoints = config
                .endpoints
                .iter()
                .map(|e| Url::parse(e))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Self::from_endpoints(endpoints);
        }
        Self::launch(config).await
    }

    /// Spawn and health-check the configured number of converter instances.
    pub async fn launch(config: &ConverterConfig) -> Result<Self> {
        let mut children = Vec::with_capacity(config.instances);
        let mut endpoints = Vec::with_capacity(config.instances);

        for i in 0..config.instances {
            let port = config
                .base_port
                .checked_add(i as u16)
                .ok_or_else(|| AppError::config("converter port range overflows"))?;
            let child = Command::new(&config.command)
                .arg("--port")
                .arg(port.to_string())
                .arg("--timeout")
                .arg(SERVICE_TIMEOUT_SECS.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    AppError::converter(format!("{}:{port}", config.command), e)
                })?;
            children.push(child);
            endpoints.push(Url::parse(&format!("http://127.0.0.1:{port}/"))?);
        }

        let startup = Duration::from_secs(config.startup_timeout_secs);
        let health = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()?;
        for endpoint in &endpoints {
            wait_until_ready(&health, endpoint, startup).await?;
        }
        log::info!("Converter pool ready with {} instances", endpoints.len());

        let pool = Self::from_endpoints(endpoints)?;
        *pool.children.lock().await = children;
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of endpoints not currently leased.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Take an endpoint for exclusive use, waiting while all are busy.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<ConverterLease> {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            permit = Arc::clone(&self.permits).acquire_owned() => {
                permit.map_err(|_| AppError::invariant("converter pool closed"))?
            }
        };

        let endpoint = self
            .endpoints
            .lock()
            .map_err(|_| AppError::invariant("converter pool lock poisoned"))?
            .pop_front()
            .ok_or_else(|| AppError::invariant("converter permit granted without endpoint"))?;

        Ok(ConverterLease {
            endpoint,
            endpoints: Arc::clone(&self.endpoints),
            _permit: permit,
        })
    }

    /// Stop spawned instances.
    pub async fn shutdown(&self) {
        self.permits.close();
        let mut children = self.children.lock().await;
        for child in children.iter_mut() {
            if let Err(e) = child.kill().await {
                log::warn!("Failed to stop converter instance: {e}");
            }
        }
        children.clear();
    }
}

/// Exclusive use of one converter endpoint.
#[derive(Debug)]
pub struct ConverterLease {
    endpoint: Url,
    endpoints: Arc<Mutex<VecDeque<Url>>>,
    // Dropped after the endpoint is queued again.
    _permit: OwnedSemaphorePermit,
}

impl ConverterLease {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Drop for ConverterLease {
    fn drop(&mut self) {
        let endpoint = self.endpoint.clone();
        match self.endpoints.lock() {
            Ok(mut queue) => queue.push_back(endpoint),
            Err(poisoned) => poisoned.into_inner().push_back(endpoint),
        }
    }
}

async fn wait_until_ready(client: &reqwest::Client, endpoint: &Url, limit: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        match client.get(endpoint.clone()).send().await {
            Ok(_) => {
                log::debug!("Converter {endpoint} is accepting connections");
                return Ok(());
            }
            Err(e) if tokio::time::Instant::now() >= deadline => {
                return Err(AppError::converter(
                    endpoint.as_str(),
                    format!("not ready after {}s: {e}", limit.as_secs()),
                ));
            }
            Err(_) => tokio::time::sleep(HEALTH_POLL_INTERVAL).await,
        }
    }
}
