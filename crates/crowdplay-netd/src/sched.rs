//! Coalescing periodic task scheduler.
//!
//! A driver thread ticks every ~10 ms, hands every ready task to a small
//! worker pool and pushes its deadline forward by one period. A task whose
//! previous run is still executing is skipped for that tick, so slow jobs
//! coalesce instead of piling up, and missed deadlines never catch up.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use tracing::debug;

pub type TaskId = u64;

const TICK: Duration = Duration::from_millis(10);

type Job = Arc<dyn Fn() + Send + Sync>;

struct Task {
    id: TaskId,
    job: Job,
    period: Duration,
    next_run: Instant,
    in_flight: Arc<AtomicBool>,
}

pub struct Scheduler {
    tasks: Arc<Mutex<Vec<Task>>>,
    running: Arc<AtomicBool>,
    next_id: AtomicU64,
    job_tx: Mutex<Option<Sender<(Job, Arc<AtomicBool>)>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(workers: usize) -> Self {
        let tasks: Arc<Mutex<Vec<Task>>> = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (job_tx, job_rx) = unbounded::<(Job, Arc<AtomicBool>)>();

        let mut threads = Vec::with_capacity(workers + 1);
        for i in 0..workers.max(1) {
            let rx = job_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("sched-worker-{i}"))
                .spawn(move || worker_loop(rx));
            if let Ok(handle) = handle {
                threads.push(handle);
            }
        }

        {
            let tasks = Arc::clone(&tasks);
            let running = Arc::clone(&running);
            let tx = job_tx.clone();
            if let Ok(handle) = thread::Builder::new()
                .name("sched-driver".to_string())
                .spawn(move || driver_loop(tasks, running, tx))
            {
                threads.push(handle);
            }
        }

        Self {
            tasks,
            running,
            next_id: AtomicU64::new(1),
            job_tx: Mutex::new(Some(job_tx)),
            threads: Mutex::new(threads),
        }
    }

    /// Register a job to run roughly every `period`, starting one period
    /// from now.
    pub fn schedule(&self, period: Duration, job: impl Fn() + Send + Sync + 'static) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().push(Task {
            id,
            job: Arc::new(job),
            period,
            next_run: Instant::now() + period,
            in_flight: Arc::new(AtomicBool::new(false)),
        });
        id
    }

    pub fn cancel(&self, id: TaskId) {
        self.tasks.lock().retain(|task| task.id != id);
    }

    /// Stop the driver and workers. In-flight jobs finish first.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        // Dropping the last sender lets the workers drain and exit.
        self.job_tx.lock().take();
        let threads: Vec<JoinHandle<()>> = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            let _ = handle.join();
        }
        debug!("periodic scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            self.stop();
        }
    }
}

fn driver_loop(
    tasks: Arc<Mutex<Vec<Task>>>,
    running: Arc<AtomicBool>,
    tx: Sender<(Job, Arc<AtomicBool>)>,
) {
    while running.load(Ordering::Acquire) {
        thread::sleep(TICK);
        let now = Instant::now();
        let mut tasks = tasks.lock();
        for task in tasks.iter_mut() {
            if now < task.next_run {
                continue;
            }
            task.next_run = now + task.period;
            // Skip if the previous run hasn't finished.
            if task.in_flight.swap(true, Ordering::AcqRel) {
                continue;
            }
            if tx
                .send((Arc::clone(&task.job), Arc::clone(&task.in_flight)))
                .is_err()
            {
                return;
            }
        }
    }
}

fn worker_loop(rx: Receiver<(Job, Arc<AtomicBool>)>) {
    while let Ok((job, in_flight)) = rx.recv() {
        job();
        in_flight.store(false, Ordering::Release);
    }
}
