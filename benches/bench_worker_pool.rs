//! A no-harness throughput bench for `WorkerPool`, in the spirit of the
//! teacher crate's `bench_burst_pool.rs`: submit a fixed number of direct
//! jobs, record each job's scheduling latency (time from submit to the job
//! actually running) into a histogram, and print summary stats.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use threadnet::workers::{SubmitMode, WorkerPool};

const WORKERS: usize = 8;
const ITERS: usize = 2_000;

struct Stats {
    avg_us: f64,
    stddev_us: f64,
    best_us: f64,
    worst_us: f64,
}

fn mk_stats(samples: &[f64]) -> Stats {
    let n = samples.len() as f64;
    let avg = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / (n - 1.0);
    let best = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let worst = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Stats { avg_us: avg, stddev_us: variance.sqrt(), best_us: best, worst_us: worst }
}

fn samples() -> &'static Mutex<Vec<f64>> {
    static SAMPLES: OnceLock<Mutex<Vec<f64>>> = OnceLock::new();
    SAMPLES.get_or_init(|| Mutex::new(Vec::with_capacity(ITERS)))
}

fn bench_direct_dispatch_latency() -> Stats {
    samples().lock().unwrap().clear();
    let pool = WorkerPool::new(WORKERS, None).expect("failed to create worker pool");
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..ITERS {
        let submitted_at = Instant::now();
        let completed = completed.clone();
        let job: threadnet::workers::JobFn = Box::new(move |_arg| {
            samples().lock().unwrap().push(submitted_at.elapsed().as_secs_f64() * 1_000_000.0);
            completed.fetch_add(1, Ordering::SeqCst);
        });
        // `max_waiting = None` means the waiting list is unbounded, so a
        // `Direct` submission here can never be rejected.
        pool.submit(job, Box::new(()), SubmitMode::Direct, None).expect("unbounded pool rejected a submission");
    }

    pool.wait_all(Duration::from_micros(200));
    pool.destroy(Duration::from_millis(5));
    assert_eq!(completed.load(Ordering::SeqCst), ITERS);

    mk_stats(&samples().lock().unwrap())
}

fn main() {
    let stats = bench_direct_dispatch_latency();
    println!(
        "worker_pool direct dispatch ({WORKERS} workers, {ITERS} jobs)\n\
         avg {:.1} us (stddev {:.1} us)\n\
         range {:.1}..{:.1} us",
        stats.avg_us, stats.stddev_us, stats.best_us, stats.worst_us
    );
}
