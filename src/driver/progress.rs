use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Receives the fraction of voxels processed so far.
///
/// Called from worker threads; reports are best effort and may arrive out of order.
pub trait ProgressObserver: Sync {
    fn report(&self, fraction: f64);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64) + Sync,
{
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Counts completed voxels across threads and forwards every 5% step to an observer
pub struct ProgressTracker<'a> {
    counter: AtomicUsize,
    total: usize,
    observer: Option<&'a dyn ProgressObserver>,
    start_time: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(total: usize, observer: Option<&'a dyn ProgressObserver>) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            total,
            observer,
            start_time: Instant::now(),
        }
    }

    pub fn inc(&self) {
        let current = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let Some(observer) = self.observer else {
            return;
        };
        if self.total == 0 {
            return;
        }
        // report whenever a 5% boundary is crossed
        if (current * 20) / self.total != ((current - 1) * 20) / self.total {
            observer.report(current as f64 / self.total as f64);
        }
    }

    pub fn completed(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        if let Some(observer) = self.observer {
            observer.report(1.0);
        }
        tracing::debug!(
            "Processed {} voxels in {:.2}s",
            self.completed(),
            self.start_time.elapsed().as_secs_f64()
        );
    }
}

/// Terminal progress bar
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

const BAR_STEPS: u64 = 1000;

impl ProgressBarObserver {
    pub fn new(message: impl Into<String>) -> Self {
        let bar = ProgressBar::new(BAR_STEPS).with_message(message.into());
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{elapsed_precise}] {wide_bar} {percent}% ({eta})")
        {
            bar.set_style(style);
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn report(&self, fraction: f64) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * BAR_STEPS as f64).round() as u64);
    }
}
