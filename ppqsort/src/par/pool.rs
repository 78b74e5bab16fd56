//! Work-stealing thread pool for recursive sort tasks.
//!
//! Each worker owns a LIFO task stack and a binary semaphore. Submissions
//! probe the stacks round-robin without blocking; workers drain every stack
//! while tasks remain visible, so a task is executed by exactly one worker.
//! Shutdown is a separate handshake from task accounting: a running task may
//! keep submitting new tasks without risking premature worker exit.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use super::task_stack::TaskStack;
use crate::params::CACHELINE_SIZE;

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Binary semaphore; releases saturate at one permit.
pub(crate) struct Semaphore {
    permit: Mutex<bool>,
    cv: Condvar,
}

impl Semaphore {
    pub(crate) fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn acquire(&self) {
        let mut permit = self.permit.lock().unwrap();
        while !*permit {
            permit = self.cv.wait(permit).unwrap();
        }
        *permit = false;
    }

    pub(crate) fn release(&self) {
        *self.permit.lock().unwrap() = true;
        self.cv.notify_one();
    }
}

/// Count-down latch: `wait` returns once `count_down` ran `n` times.
pub(crate) struct Latch {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl Latch {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            remaining: Mutex::new(n),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn count_down(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        *remaining -= 1;
        if *remaining == 0 {
            self.cv.notify_all();
        }
    }

    pub(crate) fn wait(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        while *remaining > 0 {
            remaining = self.cv.wait(remaining).unwrap();
        }
    }
}

/// Keeps a hot counter on its own cache line.
#[repr(align(64))]
struct CachePadded<T>(T);

const _: () = assert!(mem::align_of::<CachePadded<AtomicUsize>>() == CACHELINE_SIZE);

struct WorkerQueue {
    queue: TaskStack<Task>,
    /// Released once per push targeting this queue; workers sleep on it.
    ready: Semaphore,
}

struct PoolShared {
    queues: Box<[WorkerQueue]>,
    /// Round-robin submission hint; idle workers publish their own id here.
    index: CachePadded<AtomicUsize>,
    /// Submitted minus started.
    pending_tasks: CachePadded<AtomicUsize>,
    /// Submitted minus completed: pending plus currently running.
    handling_tasks: CachePadded<AtomicUsize>,
    /// Released by the worker that observes all tasks done.
    threads_done: Semaphore,
    stop: AtomicBool,
    /// First payload of a panicking task, replayed by `wait_and_stop`.
    panic: Mutex<Option<Box<dyn Any + Send>>>,
}

pub(crate) struct ThreadPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads_count: usize,
}

/// Worker count matching the machine.
pub(crate) fn default_threads() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

impl ThreadPool {
    pub(crate) fn new(threads_count: usize) -> Self {
        let threads_count = threads_count.max(1);
        let queues = (0..threads_count)
            .map(|_| WorkerQueue {
                queue: TaskStack::new(),
                ready: Semaphore::new(),
            })
            .collect();
        let shared = Arc::new(PoolShared {
            queues,
            index: CachePadded(AtomicUsize::new(0)),
            pending_tasks: CachePadded(AtomicUsize::new(0)),
            handling_tasks: CachePadded(AtomicUsize::new(0)),
            threads_done: Semaphore::new(),
            stop: AtomicBool::new(false),
            panic: Mutex::new(None),
        });

        let workers = (0..threads_count)
            .map(|id| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("ppqsort-worker-{id}"))
                    .spawn(move || worker(&shared, id))
                    .expect("failed to spawn pool worker")
            })
            .collect();

        Self {
            shared,
            workers: Mutex::new(workers),
            threads_count,
        }
    }

    /// Enqueues a task whose captures are not `'static`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the task finishes before any of its borrows
    /// end. Calling `wait_and_stop` before releasing the borrows satisfies
    /// this.
    pub(crate) unsafe fn push_task_erased<'a>(&self, task: Box<dyn FnOnce() + Send + 'a>) {
        // SAFETY: lifetime erasure only; the caller upholds the contract
        // above.
        let task: Task = unsafe { mem::transmute(task) };
        self.push_task(task);
    }

    /// Enqueues `task`; exactly one worker will eventually run it. Safe to
    /// call from any thread, including from inside a running task. Blocks at
    /// most for one queue lock.
    pub(crate) fn push_task(&self, mut task: Task) {
        let i = self.shared.index.0.fetch_add(1, Ordering::Relaxed);

        // Probe the queues without blocking before taking one lock for real.
        const ROUNDS: usize = 2;
        for n in 0..self.threads_count * ROUNDS {
            match self.shared.queues[(i + n) % self.threads_count]
                .queue
                .try_push(task)
            {
                Ok(()) => {
                    self.after_push();
                    return;
                }
                Err(rejected) => task = rejected,
            }
        }

        self.shared.queues[i % self.threads_count].queue.push(task);
        self.after_push();
    }

    fn after_push(&self) {
        self.shared.pending_tasks.0.fetch_add(1, Ordering::Release);
        self.shared.handling_tasks.0.fetch_add(1, Ordering::Release);
        // Wake everyone, not just the target queue's worker: a worker can
        // block inside a barrier-coordinated partition task with more tasks
        // sitting in its queue, and only an awake peer can steal those.
        for q in self.shared.queues.iter() {
            q.ready.release();
        }
    }

    /// Blocks until the pool has no pending or running tasks, then stops and
    /// joins the workers. Idempotent; must not be called concurrently with
    /// itself. Replays the first panic any task raised.
    pub(crate) fn wait_and_stop(&self) {
        self.shutdown();
        if let Some(payload) = self.shared.panic.lock().unwrap().take() {
            panic::resume_unwind(payload);
        }
    }

    fn shutdown(&self) {
        let mut workers = self.workers.lock().unwrap();
        if workers.is_empty() {
            return;
        }

        // The queues can be empty while a running task is still producing
        // new ones; `handling_tasks` counts both, so it is the only correct
        // drain test. The last worker to go idle releases `threads_done`.
        if self.shared.handling_tasks.0.load(Ordering::Acquire) > 0 {
            self.shared.threads_done.acquire();
        }

        self.shared.stop.store(true, Ordering::Release);
        for q in self.shared.queues.iter() {
            q.ready.release();
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Panics are not replayed from a destructor.
        self.shutdown();
    }
}

fn worker(shared: &PoolShared, id: usize) {
    loop {
        // Sleep until someone signals new tasks (or shutdown).
        shared.queues[id].ready.acquire();

        // While tasks are visible, keep draining. `pending_tasks` only
        // counts queued tasks, so a miss here is transient lock contention;
        // parking instead would strand the task if its queue's worker is
        // blocked inside a partition barrier.
        while shared.pending_tasks.0.load(Ordering::Acquire) > 0 {
            if !get_next_task(shared, id) {
                thread::yield_now();
            }
        }

        // Last worker standing signals that every task has completed.
        if shared.handling_tasks.0.load(Ordering::Acquire) == 0 {
            shared.threads_done.release();
        }

        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        // This queue is idle, so prioritize it for the next submission.
        shared.index.0.store(id, Ordering::Relaxed);
    }
}

fn get_next_task(shared: &PoolShared, id: usize) -> bool {
    let n = shared.queues.len();

    // Spin once over all queues starting with our own.
    for k in 0..n {
        if let Some(task) = shared.queues[(id + k) % n].queue.try_pop() {
            run_task(shared, task);
            return true;
        }
    }

    // Everything contended or empty; take our own lock for a last look.
    if let Some(task) = shared.queues[id].queue.pop() {
        run_task(shared, task);
        return true;
    }

    false
}

fn run_task(shared: &PoolShared, task: Task) {
    shared.pending_tasks.0.fetch_sub(1, Ordering::Release);
    let result = panic::catch_unwind(AssertUnwindSafe(task));
    shared.handling_tasks.0.fetch_sub(1, Ordering::Release);
    if let Err(payload) = result {
        let mut slot = shared.panic.lock().unwrap();
        if slot.is_none() {
            *slot = Some(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadPool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn executes_every_pushed_task() {
        let pool = Arc::new(ThreadPool::new(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..125 {
                        let counter = Arc::clone(&counter);
                        pool.push_task(Box::new(move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        }));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        pool.wait_and_stop();
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn single_thread_pool_runs_everything() {
        let pool = ThreadPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.push_task(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            }));
        }
        pool.wait_and_stop();
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn stop_empty_pool() {
        let pool = ThreadPool::new(4);
        pool.wait_and_stop();
        // Calling it again is fine.
        pool.wait_and_stop();
    }

    #[test]
    fn drop_without_stop() {
        let _pool = ThreadPool::new(2);
    }

    #[test]
    fn running_task_may_push_more_tasks() {
        // Both workers are busy and the queues empty while new tasks are
        // still being produced; no worker may conclude the pool is done.
        let pool = Arc::new(ThreadPool::new(2));
        let counter = Arc::new(AtomicUsize::new(0));

        let outer_pool = Arc::clone(&pool);
        let outer_counter = Arc::clone(&counter);
        pool.push_task(Box::new(move || {
            thread::sleep(Duration::from_millis(100));
            let inner_pool = Arc::clone(&outer_pool);
            let inner_counter = Arc::clone(&outer_counter);
            outer_pool.push_task(Box::new(move || {
                thread::sleep(Duration::from_millis(50));
                let final_counter = Arc::clone(&inner_counter);
                inner_pool.push_task(Box::new(move || {
                    final_counter.fetch_add(1, Ordering::Relaxed);
                }));
                thread::sleep(Duration::from_millis(100));
            }));
            thread::sleep(Duration::from_millis(200));
        }));

        pool.wait_and_stop();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn task_panic_is_replayed_on_wait() {
        let pool = ThreadPool::new(2);
        pool.push_task(Box::new(|| panic!("task failed")));
        let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pool.wait_and_stop();
        }));
        assert!(err.is_err());
    }
}
