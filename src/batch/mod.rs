//! Bounded worker pool for verifying or scoring many addresses.
//!
//! Workers pull the next address from a shared index, so at most
//! `max_concurrent_verifications` sessions are open at once. Results are keyed
//! by address and do not depend on completion order.

mod control;

pub use control::{CancelToken, Progress, ProgressSnapshot};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, info};

use crate::config::Config;
use crate::scorer::{ScoreResult, Scorer};
use crate::smtp_verify::{VerificationResult, Verifier};

/// Verifies every address. Duplicates are verified once.
pub fn verify_batch(
    addresses: &[String],
    config: &Config,
    progress: &Progress,
    cancel: &CancelToken,
) -> BTreeMap<String, VerificationResult> {
    let verifier = Verifier::new(config).with_cancel(cancel.clone());
    run_pool(
        addresses,
        config.max_concurrent_verifications,
        progress,
        |address| verifier.verify(address),
        |result| result.verified && result.deliverable,
    )
}

/// Scores every address. Duplicates are scored once.
pub fn score_batch(
    addresses: &[String],
    config: &Config,
    progress: &Progress,
    cancel: &CancelToken,
) -> BTreeMap<String, ScoreResult> {
    let scorer = Scorer::new(config).with_cancel(cancel.clone());
    run_pool(
        addresses,
        config.max_concurrent_verifications,
        progress,
        |address| scorer.score(address),
        |result| result.is_valid,
    )
}

pub(crate) fn run_pool<T, W, S>(
    addresses: &[String],
    workers: usize,
    progress: &Progress,
    work: W,
    success: S,
) -> BTreeMap<String, T>
where
    T: Send,
    W: Fn(&str) -> T + Sync,
    S: Fn(&T) -> bool + Sync,
{
    let mut unique: Vec<&str> = Vec::with_capacity(addresses.len());
    for address in addresses {
        let address = address.trim();
        if !address.is_empty() && !unique.contains(&address) {
            unique.push(address);
        }
    }
    progress.start(unique.len());
    let workers = workers.clamp(1, unique.len().max(1));
    info!(target: "mailprobe::batch", addresses = unique.len(), workers, "batch started");

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(String, T)>();
    thread::scope(|scope| {
        for id in 0..workers {
            let tx = tx.clone();
            let (unique, next, work, success) = (&unique, &next, &work, &success);
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(address) = unique.get(index) else {
                        break;
                    };
                    debug!(target: "mailprobe::batch", worker = id, address, "picked");
                    let result = work(*address);
                    progress.record(success(&result));
                    if tx.send((address.to_string(), result)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let results: BTreeMap<String, T> = rx.into_iter().collect();
    let snapshot = progress.snapshot();
    info!(
        target: "mailprobe::batch",
        completed = snapshot.completed,
        verified = snapshot.verified,
        failed = snapshot.failed,
        "batch finished"
    );
    results
}
