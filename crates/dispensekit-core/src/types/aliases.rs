//! Type aliases for commonly used shared types.
//!
//! State crossing the UI/print-thread boundary is always wrapped in one of
//! these, so a reader can tell at a glance which lock guards it.
//!
//! ```rust,ignore
//! use dispensekit_core::types::*;
//!
//! // Instead of: Arc<parking_lot::Mutex<Vec<String>>>
//! let log: ThreadSafeVec<String> = thread_safe_vec();
//! log.lock().push("1,15\n".to_string());
//! ```

use crate::motion::MotionController;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-guarded value.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe vector, used for logs written by one thread and read by another.
pub type ThreadSafeVec<T> = Arc<Mutex<Vec<T>>>;

/// A thread-safe value with many readers and an occasional writer.
///
/// Used for job state that the UI polls while the print thread updates it.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Shared handle to a motion controller.
///
/// Dynamic dispatch because the backend (simulated or vendor) is chosen at runtime.
pub type SharedMotionController = Arc<dyn MotionController>;

/// Progress callback receiving (completed, total).
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

#[inline]
pub fn thread_safe_vec<T>() -> ThreadSafeVec<T> {
    Arc::new(Mutex::new(Vec::new()))
}

#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_creation() {
        let value: ThreadSafe<i32> = thread_safe(42);
        assert_eq!(*value.lock(), 42);

        *value.lock() = 100;
        assert_eq!(*value.lock(), 100);
    }

    #[test]
    fn test_thread_safe_vec_shared_between_threads() {
        let log: ThreadSafeVec<String> = thread_safe_vec();
        let writer = Arc::clone(&log);
        std::thread::spawn(move || writer.lock().push("1,-1\n".to_string()))
            .join()
            .unwrap();
        assert_eq!(log.lock().as_slice(), ["1,-1\n".to_string()]);
    }

    #[test]
    fn test_thread_safe_rw() {
        let value: ThreadSafeRw<i32> = thread_safe_rw(42);
        assert_eq!(*value.read(), 42);
        *value.write() = 100;
        assert_eq!(*value.read(), 100);
    }
}
