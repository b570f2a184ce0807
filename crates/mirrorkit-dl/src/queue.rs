//! Bounded parallel execution of blocking download jobs.

use std::{
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{sync::Semaphore, task::JoinSet};

/// Sets the shared flag when dropped, so in-flight blocking jobs stop early if the
/// caller gives up on the whole batch (first error, deadline, or drop of the future).
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Runs `jobs` on the blocking pool with at most `limit` running at once.
///
/// Results come back in job order. The first failing job cancels the rest: jobs
/// that have not started are aborted and running ones observe the flag they are
/// handed.
pub async fn run_bounded<T, E, F>(jobs: Vec<F>, limit: usize) -> Result<Vec<T>, E>
where
    F: FnOnce(&AtomicBool) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(cancel.clone());
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let total = jobs.len();
    let mut set = JoinSet::new();

    for (idx, job) in jobs.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            if cancel.load(Ordering::Relaxed) {
                return (idx, None);
            }
            let result = tokio::task::spawn_blocking(move || job(&cancel)).await;
            match result {
                Ok(result) => (idx, Some(result)),
                Err(err) => panic::resume_unwind(err.into_panic()),
            }
        });
    }

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Some(Ok(value)))) => slots[idx] = Some(value),
            Ok((_, Some(Err(err)))) => {
                cancel.store(true, Ordering::Relaxed);
                set.abort_all();
                return Err(err);
            }
            Ok((_, None)) => {}
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(_) => {}
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::AtomicUsize,
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    type Job = Box<dyn FnOnce(&AtomicBool) -> Result<usize, String> + Send>;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_keep_job_order() {
        let jobs: Vec<Job> = (0..8usize)
            .map(|i| {
                Box::new(move |_: &AtomicBool| {
                    thread::sleep(Duration::from_millis(((8 - i) * 5) as u64));
                    Ok(i)
                }) as Job
            })
            .collect();

        let results = run_bounded(jobs, 4).await.unwrap();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..10usize)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                Box::new(move |_: &AtomicBool| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }) as Job
            })
            .collect();

        run_bounded(jobs, 3).await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_error_cancels_the_rest() {
        let started = Arc::new(AtomicUsize::new(0));
        let began = Instant::now();

        let mut jobs: Vec<Job> = vec![Box::new(|_: &AtomicBool| Err("index 2 missing".into()))];
        for i in 1..20usize {
            let started = started.clone();
            jobs.push(Box::new(move |cancel: &AtomicBool| {
                started.fetch_add(1, Ordering::SeqCst);
                while !cancel.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(i)
            }));
        }

        let err = run_bounded(jobs, 2).await.unwrap_err();
        assert_eq!(err, "index 2 missing");
        assert!(started.load(Ordering::SeqCst) < 19);
        assert!(began.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let jobs: Vec<Job> = Vec::new();
        assert!(run_bounded(jobs, 4).await.unwrap().is_empty());
    }
}
