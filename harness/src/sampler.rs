use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

/// One captured value and the moment it was taken.
#[derive(Debug, Clone)]
pub struct Sample<T> {
    pub value: T,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Periodic background sampler.
///
/// `start` hands the sampling closure to a dedicated thread that calls it at
/// the requested frequency, pairing each value with a capture timestamp.
/// Cancellation is cooperative, checked once per cycle; a closure that
/// blocks is not interrupted mid-call. `stop` joins the thread before
/// returning the buffer, so no sample can be appended after it returns.
///
/// A run ends on its own once the buffer holds exactly `max_samples`
/// entries.
pub struct AsyncSampler<T> {
    samples: Arc<Mutex<Vec<Sample<T>>>>,
    cancel: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<T: Send + 'static> AsyncSampler<T> {
    pub fn new() -> AsyncSampler<T> {
        AsyncSampler {
            samples: Arc::new(Mutex::new(Vec::new())),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Begins sampling `sample_fn` at `frequency` hertz. Returns `false`
    /// without touching anything when a run is already in progress.
    pub fn start<F>(&mut self, frequency: f64, max_samples: Option<usize>, mut sample_fn: F) -> bool
    where
        F: FnMut() -> T + Send + 'static,
    {
        if self.worker.is_some() {
            return false;
        }

        self.samples.lock().unwrap().clear();
        self.cancel.store(false, Ordering::SeqCst);

        let period = Duration::from_secs_f64(1.0 / frequency);
        let samples = self.samples.clone();
        let cancel = self.cancel.clone();

        self.worker = Some(thread::spawn(move || loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }

            let cycle_started = Instant::now();
            let value = sample_fn();

            {
                let mut samples = samples.lock().unwrap();

                samples.push(Sample {
                    value,
                    captured_at: chrono::Utc::now(),
                });

                if let Some(max) = max_samples {
                    if samples.len() >= max {
                        break;
                    }
                }
            }

            // Hold cadence despite sampling latency.
            let elapsed = cycle_started.elapsed();
            if elapsed < period {
                thread::sleep(period - elapsed);
            }
        }));

        true
    }

    /// Signals cancellation, waits for the sampling thread to exit, and
    /// returns everything captured. Stopping a sampler that never started
    /// returns an empty buffer.
    pub fn stop(&mut self) -> Vec<Sample<T>> {
        self.cancel.store(true, Ordering::SeqCst);

        match self.worker.take() {
            Some(worker) => {
                let _ = worker.join();

                std::mem::take(&mut *self.samples.lock().unwrap())
            }
            None => Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl<T: Send + 'static> Default for AsyncSampler<T> {
    fn default() -> AsyncSampler<T> {
        AsyncSampler::new()
    }
}

impl<T> Drop for AsyncSampler<T> {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
