//! A bounded worker pool. Work items are queued on a channel up front and
//! a fixed number of scoped threads pull from it, so at most `threads` items
//! are in flight at once.

use crossbeam_channel::unbounded;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Applies `f` to every item on up to `threads` worker threads and returns
/// the results in input order. After the first failure no further items are
/// started, and the error for the lowest failing index is returned. With
/// fewer than two threads (or items) everything runs on the calling thread.
pub fn try_map<T, R, E, F>(items: &[T], threads: usize, f: F) -> Result<Vec<R>, E>
where
    T: Sync,
    R: Send,
    E: Send,
    F: Fn(&T) -> Result<R, E> + Sync,
{
    if threads < 2 || items.len() < 2 {
        return items.iter().map(&f).collect();
    }

    let (tx, rx) = unbounded::<(usize, &T)>();
    for job in items.iter().enumerate() {
        if tx.send(job).is_err() {
            break;
        }
    }
    drop(tx);

    let failed = AtomicBool::new(false);
    let workers = threads.min(items.len());
    let finished: Vec<Vec<(usize, Result<R, E>)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let (f, failed) = (&f, &failed);
                scope.spawn(move || {
                    let mut done = Vec::new();

                    // Check before taking a job, never after: a job that has
                    // been taken always runs, so every index below a failure
                    // has run too.
                    while !failed.load(Ordering::SeqCst) {
                        let (i, item) = match rx.recv() {
                            Ok(job) => job,
                            Err(_) => break,
                        };
                        let result = f(item);
                        if result.is_err() {
                            failed.store(true, Ordering::SeqCst);
                        }
                        done.push((i, result));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(done) => done,
                Err(payload) => panic::resume_unwind(payload),
            })
            .collect()
    });

    let mut slots: Vec<Option<R>> = (0..items.len()).map(|_| None).collect();
    let mut first_error: Option<(usize, E)> = None;
    for (i, result) in finished.into_iter().flatten() {
        match result {
            Ok(value) => slots[i] = Some(value),
            Err(err) => {
                if first_error.as_ref().map_or(true, |(j, _)| i < *j) {
                    first_error = Some((i, err));
                }
            }
        }
    }
    if let Some((_, err)) = first_error {
        return Err(err);
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u64> = (0..200).collect();
        for threads in &[0, 1, 2, 8] {
            let squares: Result<Vec<u64>, ()> = try_map(&items, *threads, |n| Ok(n * n));
            assert_eq!(
                squares,
                Ok(items.iter().map(|n| n * n).collect::<Vec<_>>()),
                "threads: {}",
                threads
            );
        }
    }

    #[test]
    fn test_lowest_failing_index_wins() {
        let items: Vec<usize> = (0..100).collect();
        for threads in &[1, 4] {
            let result = try_map(&items, *threads, |n| {
                if n % 10 == 7 {
                    Err(*n)
                } else {
                    Ok(*n)
                }
            });
            assert_eq!(result, Err(7), "threads: {}", threads);
        }
    }

    #[test]
    fn test_every_item_runs_once() {
        let calls = AtomicUsize::new(0);
        let items = vec!["a"; 64];
        let result: Result<Vec<&str>, ()> = try_map(&items, 4, |s| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(*s)
        });
        assert_eq!(result.map(|v| v.len()), Ok(64));
        assert_eq!(calls.load(Ordering::SeqCst), 64);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_worker_panics_propagate() {
        let items: Vec<u32> = (0..8).collect();
        let _: Result<Vec<u32>, ()> = try_map(&items, 4, |n| {
            if *n == 5 {
                panic!("boom");
            }
            Ok(*n)
        });
    }
}
