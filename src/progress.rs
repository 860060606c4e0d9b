use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "rayon")]
use std::sync::Mutex;

use crate::EncodingError;

/// A thread-safe flag for cancelling an encode operation.
///
/// Cancellation is cooperative: the encoder checks the token between block
/// rows (never within a block, since a single block encodes in microseconds)
/// and returns [`EncodingError::Cancelled`] once it observes the flag.
#[derive(Debug, Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Requests cancellation. This cannot be undone.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A progress reporter used by [`encode()`](crate::encode()).
///
/// This is a wrapper around a function that handles progress reports. A
/// report is a single `f32` between 0 and 1 representing the portion of the
/// image that has been encoded. Reports only increase or stay the same, and
/// there may be multiple reports for 100%.
///
/// Progress is reported once per row of blocks. Parallel encoding reports
/// from multiple threads through an internal mutex, so the reporter function
/// must be `Send`.
pub struct Progress<'a> {
    reporter: Option<&'a mut (dyn FnMut(f32) + Send)>,
    token: Option<&'a CancellationToken>,
}

impl<'a> Progress<'a> {
    /// Creates a new progress reporter.
    pub fn new<F: FnMut(f32) + Send>(reporter: &'a mut F) -> Self {
        Self {
            reporter: Some(reporter),
            token: None,
        }
    }

    /// Creates a progress reporter that doesn't report anything.
    ///
    /// This is only useful in combination with [`Progress::with_token`] to
    /// get cancellation without progress reporting.
    pub fn none() -> Self {
        Self {
            reporter: None,
            token: None,
        }
    }

    /// Attaches a cancellation token.
    pub fn with_token(mut self, token: &'a CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub(crate) fn report(&mut self, progress: f32) {
        debug_assert!((0.0..=1.0).contains(&progress));
        if let Some(reporter) = self.reporter.as_mut() {
            reporter(progress);
        }
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), EncodingError> {
        match self.token {
            Some(token) if token.is_cancelled() => Err(EncodingError::Cancelled),
            _ => Ok(()),
        }
    }

    pub(crate) fn checked_report(&mut self, progress: f32) -> Result<(), EncodingError> {
        self.check_cancelled()?;
        self.report(progress);
        Ok(())
    }
}

/// The current progress count and the function to report it with.
#[cfg(feature = "rayon")]
type InnerState<'a> = (u64, &'a mut (dyn FnMut(f32) + Send));

/// Shared progress state for parallel encoding.
///
/// Worker threads submit finished work in arbitrary order; the shared counter
/// keeps the reported fraction monotone.
#[cfg(feature = "rayon")]
pub(crate) struct ParallelProgress<'a> {
    reporter: Option<Mutex<InnerState<'a>>>,
    token: Option<&'a CancellationToken>,
    total: u64,
}

#[cfg(feature = "rayon")]
impl<'a> ParallelProgress<'a> {
    pub fn new<'b: 'a>(progress: &'a mut Progress<'b>, total: u64) -> Self {
        debug_assert!(total > 0);
        Self {
            reporter: progress
                .reporter
                .as_mut()
                .map(|f| Mutex::new((0, &mut **f as &'a mut (dyn FnMut(f32) + Send)))),
            token: progress.token,
            total,
        }
    }

    pub fn submit(&self, amount: u64) {
        if let Some(mutex) = self.reporter.as_ref() {
            let mut guard = mutex.lock().unwrap();
            guard.0 += amount;
            let progress = (guard.0 as f32 / self.total as f32).min(1.0);
            (guard.1)(progress);
        }
    }

    pub fn check_cancelled(&self) -> Result<(), EncodingError> {
        match self.token {
            Some(token) if token.is_cancelled() => Err(EncodingError::Cancelled),
            _ => Ok(()),
        }
    }
}
