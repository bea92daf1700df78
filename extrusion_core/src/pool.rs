//! Order-preserving fan-out of per-record work over scoped worker threads.
//!
//! Jobs and results travel over crossbeam channels tagged with their input
//! index, so the output always lines up with the input regardless of which
//! worker finished first.

use crossbeam_channel as xch;

/// Apply `f` to every item on up to `workers` threads and return the
/// results in input order. One worker (or a single item) runs inline.
pub fn map_ordered<T, U, F>(items: Vec<T>, workers: usize, f: F) -> Vec<U>
where
    T: Send,
    U: Send,
    F: Fn(T) -> U + Sync,
{
    let n = items.len();
    let workers = workers.min(n);
    if workers <= 1 {
        return items.into_iter().map(f).collect();
    }

    let (job_tx, job_rx) = xch::unbounded::<(usize, T)>();
    let (res_tx, res_rx) = xch::unbounded::<(usize, U)>();
    for job in items.into_iter().enumerate() {
        // Receiver is alive in this scope.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let f = &f;
    std::thread::scope(|s| {
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = res_tx.clone();
            s.spawn(move || {
                for (idx, item) in rx.iter() {
                    if tx.send((idx, f(item))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(res_tx);

    let mut slots: Vec<Option<U>> = std::iter::repeat_with(|| None).take(n).collect();
    for (idx, out) in res_rx.try_iter() {
        if let Some(slot) = slots.get_mut(idx) {
            *slot = Some(out);
        }
    }
    slots.into_iter().flatten().collect()
}
