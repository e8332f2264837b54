use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Worker pool for the occlusion sampling phase. Sampling is the only part
/// of the pipeline allowed off the tick thread; results are always handed
/// back and published by the owning portal.
pub struct JobPool {
    pool: ThreadPool,
}

impl JobPool {
    pub fn new(num_threads: Option<usize>) -> Result<Self, ThreadPoolBuildError> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|index| format!("view-scan-{index}"));
        if let Some(count) = num_threads {
            builder = builder.num_threads(count);
        }

        let pool = builder.build()?;
        Ok(Self { pool })
    }

    pub fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&rayon::Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }
}

impl Default for JobPool {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(4);
        let worker_threads = available.saturating_sub(1).clamp(2, 8);
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|index| format!("view-scan-{index}"))
            .build()
            .expect("failed to create default view scan thread pool");
        Self { pool }
    }
}
