use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Small worker pool for work that must stay off the frame thread
/// (asset builds). Results come back through `events`.
pub struct JobSystem {
    pool: ThreadPool,
}

impl JobSystem {
    pub fn new(
        name: &'static str,
        num_threads: Option<usize>,
    ) -> Result<Self, ThreadPoolBuildError> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(move |index| format!("{name}-{index}"));
        if let Some(count) = num_threads {
            builder = builder.num_threads(count.max(1));
        }

        let pool = builder.build()?;
        Ok(Self { pool })
    }

    /// Pool sized for background loading: leaves at least one core to the
    /// render thread and never exceeds four workers.
    pub fn for_loading() -> Result<Self, ThreadPoolBuildError> {
        let available = std::thread::available_parallelism()
            .map(|parallelism| parallelism.get())
            .unwrap_or(2);
        Self::new("asset-worker", Some(available.saturating_sub(1).clamp(1, 4)))
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::JobSystem;

    #[test]
    fn spawned_jobs_run_and_report_back() {
        let jobs = JobSystem::new("test-worker", Some(2)).expect("build pool");
        assert_eq!(jobs.thread_count(), 2);

        let (tx, rx) = mpsc::channel();
        for value in 0..4u32 {
            let tx = tx.clone();
            jobs.spawn(move || {
                let _ = tx.send(value * 10);
            });
        }
        drop(tx);

        let mut results: Vec<u32> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("job result"))
            .collect();
        results.sort_unstable();
        assert_eq!(results, vec![0, 10, 20, 30]);
    }
}
