/*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! The collective build: one distributor rank and `W` worker ranks,
//! modelled as OS threads exchanging fixed-shape messages over
//! `crossbeam_channel` rather than real MPI (nothing in this workspace's
//! dependency tree talks to an MPI runtime). A worker's "waiting" request
//! is implemented by the worker retrying after a short backoff rather
//! than the distributor holding a separate queue — observably the same
//! dynamic-scheduling behaviour with one less data structure.

use crate::partition::chunk_ranges;
use crate::topindex::TopIndex;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use sidx_elements::{ElementStore, SidxError, SidxResult};
use sidx_geometry::Aabb;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Copy, Clone, Debug)]
pub struct MultiBuildConfig {
    pub fanout: usize,
    pub leaf_capacity: usize,
}

impl Default for MultiBuildConfig {
    fn default() -> Self {
        MultiBuildConfig {
            fanout: sidx_rtree::DEFAULT_FANOUT,
            leaf_capacity: sidx_rtree::DEFAULT_LEAF_CAPACITY,
        }
    }
}

enum ToWorker {
    Chunk { start: usize, len: usize },
    Retry,
    Done,
}

struct Request {
    worker: usize,
    load: usize,
    reply: Sender<ToWorker>,
}

/// Builds a multi-index over `store`, partitioned across `workers`
/// ranks, writing `out_dir/subtrees/worker_<i>.bin` and
/// `out_dir/topindex.bin`. `workers` must be a power of two.
pub fn build_multi_index(
    store: ElementStore,
    workers: usize,
    out_dir: &Path,
    config: MultiBuildConfig,
) -> SidxResult<()> {
    if workers == 0 || (workers & (workers - 1)) != 0 {
        return Err(SidxError::InvalidInput(
            "worker count must be a power of two".into(),
        ));
    }

    let n = store.len();
    let chunks: VecDeque<(usize, usize)> = chunk_ranges(n, workers).into_iter().collect();
    log::info!(
        "starting collective build: {} elements, {} workers, {} chunks",
        n,
        workers,
        chunks.len()
    );

    let subtrees_dir = out_dir.join("subtrees");
    fs::create_dir_all(&subtrees_dir)?;

    let (request_tx, request_rx) = unbounded::<Request>();
    let abort = Arc::new(AtomicBool::new(false));

    let dist_abort = Arc::clone(&abort);
    let dist_handle = thread::spawn(move || distributor_loop(chunks, workers, request_rx, dist_abort));

    let store = Arc::new(store);
    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let request_tx = request_tx.clone();
        let store = Arc::clone(&store);
        let subtrees_dir = subtrees_dir.clone();
        let abort = Arc::clone(&abort);
        let fanout = config.fanout;
        let leaf_capacity = config.leaf_capacity;
        handles.push(thread::spawn(move || {
            worker_loop(
                worker_id,
                request_tx,
                &store,
                fanout,
                leaf_capacity,
                &subtrees_dir,
                &abort,
            )
        }));
    }
    drop(request_tx);

    let mut envelopes = Vec::new();
    let mut first_err: Option<SidxError> = None;
    for handle in handles {
        match handle.join().expect("worker thread panicked") {
            Ok(Some((id, envelope))) => envelopes.push((envelope, id)),
            Ok(None) => {}
            Err(e) => {
                log::error!("worker failed, triggering collective abort: {}", e);
                abort.store(true, Ordering::SeqCst);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    let _ = dist_handle.join();

    if let Some(e) = first_err {
        let _ = fs::remove_dir_all(out_dir);
        return Err(e);
    }

    log::info!("collective build finished, {} subtrees", envelopes.len());
    let top = TopIndex::new(envelopes);
    top.write(&out_dir.join("topindex.bin"))?;
    Ok(())
}

fn distributor_loop(
    mut chunks: VecDeque<(usize, usize)>,
    workers: usize,
    request_rx: Receiver<Request>,
    abort: Arc<AtomicBool>,
) {
    let mut loads: HashMap<usize, usize> = HashMap::new();
    let mut done_workers: HashSet<usize> = HashSet::new();

    while done_workers.len() < workers {
        if abort.load(Ordering::SeqCst) {
            break;
        }
        let request = match request_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        if abort.load(Ordering::SeqCst) {
            let _ = request.reply.send(ToWorker::Done);
            continue;
        }

        loads.insert(request.worker, request.load);

        if chunks.is_empty() {
            log::debug!("worker {} done, no chunks remain", request.worker);
            done_workers.insert(request.worker);
            let _ = request.reply.send(ToWorker::Done);
            continue;
        }

        let mean = loads.values().sum::<usize>() as f64 / loads.len() as f64;
        if (request.load as f64) <= 1.05 * mean {
            let (start, len) = chunks.pop_front().unwrap();
            log::debug!(
                "dispatching chunk [{}, {}) to worker {} (load {}, mean {:.1}, {} chunks left)",
                start,
                start + len,
                request.worker,
                request.load,
                mean,
                chunks.len()
            );
            let _ = request.reply.send(ToWorker::Chunk { start, len });
        } else {
            log::debug!(
                "worker {} over {:.2}x mean load ({} vs {:.1}), asking it to retry",
                request.worker,
                request.load as f64 / mean.max(1.0),
                request.load,
                mean
            );
            let _ = request.reply.send(ToWorker::Retry);
        }
    }
}

fn worker_loop(
    worker_id: usize,
    request_tx: Sender<Request>,
    store: &ElementStore,
    fanout: usize,
    leaf_capacity: usize,
    subtrees_dir: &Path,
    abort: &AtomicBool,
) -> SidxResult<Option<(u32, Aabb)>> {
    let (reply_tx, reply_rx) = unbounded();
    let mut rows: Vec<usize> = Vec::new();

    loop {
        if abort.load(Ordering::SeqCst) {
            log::warn!("rank {} observed a collective abort, terminating", worker_id);
            return Err(SidxError::CollectiveAbort(format!(
                "rank {} terminated by a collective abort",
                worker_id
            )));
        }
        request_tx
            .send(Request {
                worker: worker_id,
                load: rows.len(),
                reply: reply_tx.clone(),
            })
            .map_err(|_| SidxError::CollectiveAbort("distributor is gone".into()))?;

        match reply_rx.recv() {
            Ok(ToWorker::Chunk { start, len }) => rows.extend(start..start + len),
            Ok(ToWorker::Retry) => thread::sleep(Duration::from_micros(100)),
            Ok(ToWorker::Done) => {
                if abort.load(Ordering::SeqCst) {
                    log::warn!("rank {} observed a collective abort, terminating", worker_id);
                    return Err(SidxError::CollectiveAbort(format!(
                        "rank {} terminated by a collective abort",
                        worker_id
                    )));
                }
                break;
            }
            Err(_) => break,
        }
    }

    if rows.is_empty() {
        return Ok(None);
    }

    let local_store = store.reorder(&rows);
    let tree = sidx_rtree::bulk_load(local_store, fanout, leaf_capacity)?;
    let envelope = tree.bounds();
    let path: PathBuf = subtrees_dir.join(format!("worker_{}.bin", worker_id));
    fs::write(&path, tree.to_bytes())?;
    log::debug!("rank {} wrote subtree with {} rows to {}", worker_id, rows.len(), path.display());
    Ok(Some((worker_id as u32, envelope)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidx_elements::{ElementKind, ElementStoreBuilder};

    fn ten_thousand_points() -> ElementStore {
        let mut b = ElementStoreBuilder::new(ElementKind::Sphere);
        for i in 0..10_000u64 {
            let x = (i % 100) as f32;
            let y = (i / 100) as f32;
            b.push_sphere(i, [x, y, 0.0], 0.1).unwrap();
        }
        b.finish().unwrap()
    }

    #[test]
    fn builds_one_subtree_file_per_worker_with_work() {
        let dir = tempdir::TempDir::new("sidx_multi_build").unwrap();
        build_multi_index(
            ten_thousand_points(),
            4,
            dir.path(),
            MultiBuildConfig::default(),
        )
        .unwrap();
        assert!(dir.path().join("topindex.bin").exists());
        let top = TopIndex::open(&dir.path().join("topindex.bin")).unwrap();
        assert_eq!(top.len(), 4);
    }

    #[test]
    fn rejects_non_power_of_two_worker_count() {
        let dir = tempdir::TempDir::new("sidx_multi_badw").unwrap();
        let result = build_multi_index(
            ten_thousand_points(),
            3,
            dir.path(),
            MultiBuildConfig::default(),
        );
        assert!(result.is_err());
    }
}
