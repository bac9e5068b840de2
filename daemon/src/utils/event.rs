use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// 生成唯一 ID
fn generate_id() -> ListenerId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    ListenerId(COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn describe_panic(panic_value: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic_value.downcast_ref::<String>() {
        format!("Panic message: {}", msg)
    } else if let Some(msg) = panic_value.downcast_ref::<&str>() {
        format!("Panic message: {}", msg)
    } else {
        format!("Panic value type_id={:?}", (*panic_value).type_id())
    }
}

/// Handle returned by [`Event::add_listener`], pass it to
/// [`Event::remove_listener`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Default)]
pub enum TListener {
    #[default]
    Simple,
    Count(Arc<AtomicUsize>),
    Once(Arc<AtomicBool>),
}

impl TListener {
    pub fn count(count: usize) -> Self {
        TListener::Count(Arc::new(AtomicUsize::new(count)))
    }

    pub fn once() -> Self {
        TListener::Once(Arc::new(AtomicBool::new(false)))
    }
}

struct ListenerWrapper<T> {
    id: ListenerId,
    callback: Callback<T>,
    t_callback: TListener,
    is_removed: Arc<AtomicBool>,
}

// derive(Clone) would require `T: Clone`
impl<T> Clone for ListenerWrapper<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: self.callback.clone(),
            t_callback: self.t_callback.clone(),
            is_removed: self.is_removed.clone(),
        }
    }
}

/// 消耗一次listener wrapper，返回true表示次数耗尽，需要remove listener
fn consume_wrapper<T>(wrapper: &ListenerWrapper<T>) -> bool {
    if wrapper.is_removed.load(Ordering::Relaxed) {
        return false;
    }

    let should_remove = match &wrapper.t_callback {
        TListener::Simple => false,
        TListener::Count(counter) => counter.fetch_sub(1, Ordering::SeqCst) == 1,
        TListener::Once(consumed) => !consumed.swap(true, Ordering::SeqCst),
    };

    if should_remove {
        wrapper.is_removed.store(true, Ordering::Relaxed);
    }
    should_remove
}

/// Typed publish/subscribe point.
///
/// Listeners run synchronously on the invoking thread, in registration order,
/// so every listener observes the payloads of one event in the order they
/// were invoked. A listener registered or removed while an invocation is in
/// progress takes effect from the next invocation. A panicking listener is
/// logged and does not prevent the remaining listeners from running.
pub struct Event<T> {
    listeners: Arc<Mutex<Vec<ListenerWrapper<T>>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_listener<F>(&self, callback: F, t_callback: TListener) -> Option<ListenerId>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        if let TListener::Count(counter) = &t_callback {
            if counter.load(Ordering::Relaxed) == 0 {
                return None;
            }
        }

        let id = generate_id();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push(ListenerWrapper {
            id,
            callback: Arc::new(callback),
            t_callback,
            is_removed: Arc::new(AtomicBool::new(false)),
        });
        Some(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = guard.iter().position(|w| w.id == id) {
            let removed = guard.remove(pos);
            removed.is_removed.store(true, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn invoke(&self, arg: &T) {
        let snapshot = {
            let guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };

        for wrapper in snapshot.iter() {
            if wrapper.is_removed.load(Ordering::Relaxed) {
                continue;
            }

            let should_remove = consume_wrapper(wrapper);
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (wrapper.callback)(arg))) {
                error!("event listener panicked: {}", describe_panic(panic));
            }

            if should_remove {
                self.remove_listener(wrapper.id);
            }
        }
    }
}
