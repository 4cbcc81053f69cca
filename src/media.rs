use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, USER_AGENT};

pub const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub cache_bytes: usize,
    pub timeout: Duration,
    pub user_agent: String,
    pub http_client: Option<Client>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 2,
            cache_bytes: DEFAULT_CACHE_BYTES,
            timeout: Duration::from_secs(30),
            user_agent: format!("arena-roll/{}", crate::VERSION),
            http_client: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Display,
    Preload,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub purpose: Purpose,
}

#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub bytes: Arc<Vec<u8>>,
}

pub struct ByteCache {
    entries: LruCache<String, Arc<Vec<u8>>>,
    max_bytes: usize,
    current_bytes: usize,
}

impl ByteCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_bytes,
            current_bytes: 0,
        }
    }

    pub fn insert(&mut self, url: String, bytes: Arc<Vec<u8>>) -> bool {
        let size = bytes.len();
        // anything over half the budget would churn the whole cache
        if size > self.max_bytes / 2 {
            return false;
        }

        if let Some(existing) = self.entries.pop(&url) {
            self.current_bytes = self.current_bytes.saturating_sub(existing.len());
        }

        while self.current_bytes + size > self.max_bytes && !self.entries.is_empty() {
            if let Some((evicted_url, evicted)) = self.entries.pop_lru() {
                self.current_bytes = self.current_bytes.saturating_sub(evicted.len());
                tracing::trace!(url = %evicted_url, bytes = evicted.len(), "media cache eviction");
            }
        }

        self.current_bytes += size;
        self.entries.put(url, bytes);
        true
    }

    pub fn get(&mut self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.current_bytes
    }
}

struct Job {
    request: Request,
    tx: Sender<Result<Fetched>>,
}

struct Inner {
    cache: Mutex<ByteCache>,
    client: Client,
    user_agent: String,
    jobs: Sender<Job>,
    stop: Sender<()>,
}

pub struct Manager {
    inner: Arc<Inner>,
    handles: Vec<thread::JoinHandle<()>>,
}

#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Manager {
    pub fn new(cfg: Config) -> Result<Self> {
        let workers = if cfg.workers == 0 { 2 } else { cfg.workers };

        let client = if let Some(client) = cfg.http_client.clone() {
            client
        } else {
            Client::builder()
                .timeout(cfg.timeout)
                .build()
                .context("media: build http client")?
        };

        let (job_tx, job_rx) = unbounded();
        let (stop_tx, stop_rx) = unbounded();

        let inner = Arc::new(Inner {
            cache: Mutex::new(ByteCache::new(cfg.cache_bytes)),
            client,
            user_agent: cfg.user_agent,
            jobs: job_tx,
            stop: stop_tx,
        });

        let mut handles = Vec::new();
        for _ in 0..workers {
            let rx_jobs = job_rx.clone();
            let rx_stop = stop_rx.clone();
            let worker_inner = inner.clone();
            handles.push(thread::spawn(move || worker_inner.worker(rx_jobs, rx_stop)));
        }
        tracing::debug!(workers, cache_bytes = cfg.cache_bytes, "media manager started");

        Ok(Self { inner, handles })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            inner: self.inner.clone(),
        }
    }

    fn shutdown(&mut self) {
        for _ in &self.handles {
            let _ = self.inner.stop.send(());
        }
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Handle {
    pub fn enqueue(&self, request: Request) -> Receiver<Result<Fetched>> {
        let (tx, rx) = unbounded();
        if let Some(bytes) = self.inner.cache.lock().get(&request.url) {
            let _ = tx.send(Ok(Fetched {
                url: request.url,
                bytes,
            }));
            return rx;
        }
        let job = Job { request, tx };
        let _ = self.inner.jobs.send(job);
        rx
    }

    pub fn preload(&self, url: &str) {
        if self.inner.cache.lock().contains(url) {
            return;
        }
        drop(self.enqueue(Request {
            url: url.to_string(),
            purpose: Purpose::Preload,
        }));
    }

    pub fn cached(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.inner.cache.lock().get(url)
    }
}

impl Inner {
    fn worker(&self, jobs: Receiver<Job>, stop: Receiver<()>) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(jobs) -> msg => {
                    match msg {
                        Ok(job) => self.process(job),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn process(&self, job: Job) {
        let Job { request, tx } = job;
        let purpose = request.purpose;
        let result = self.fetch(&request.url);
        if let Err(err) = &result {
            let message = format!("{err:#}");
            match purpose {
                Purpose::Display => {
                    tracing::warn!(url = %request.url, error = %message, "image download failed")
                }
                Purpose::Preload => {
                    tracing::debug!(url = %request.url, error = %message, "preload failed")
                }
            }
        }
        let _ = tx.send(result);
    }

    fn fetch(&self, url: &str) -> Result<Fetched> {
        if url.is_empty() {
            return Err(anyhow!("media: url required"));
        }

        if let Some(bytes) = self.cache.lock().get(url) {
            return Ok(Fetched {
                url: url.to_string(),
                bytes,
            });
        }

        let mut builder = self.client.get(url);
        if let Ok(agent) = HeaderValue::from_str(&self.user_agent) {
            builder = builder.header(USER_AGENT, agent);
        }
        let response = builder.send().context("media: download")?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(anyhow!("media: request failed: {status}"));
        }

        let bytes = Arc::new(response.bytes().context("media: body")?.to_vec());
        if bytes.is_empty() {
            return Err(anyhow!("media: empty body"));
        }
        tracing::debug!(url, bytes = bytes.len(), "image downloaded");
        self.cache.lock().insert(url.to_string(), bytes.clone());

        Ok(Fetched {
            url: url.to_string(),
            bytes,
        })
    }
}
