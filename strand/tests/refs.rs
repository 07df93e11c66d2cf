//! Counted handles shared across threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strand::refs::{RefCounted, Strong, Weak};
use strand::thread::Thread;

struct Resource {
    drops: Arc<AtomicUsize>,
    value: u64,
}

impl RefCounted for Resource {}

impl Drop for Resource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn clones_and_weak_upgrades_race_with_last_drop() {
    for _ in 0..50 {
        let drops = Arc::new(AtomicUsize::new(0));
        let strong = Resource {
            drops: Arc::clone(&drops),
            value: 7,
        }
        .into_strong();
        let weak: Weak<Resource> = Strong::downgrade(&strong);

        let threads: Vec<Thread> = (0..4)
            .map(|_| {
                let thread = Thread::new();
                let strong = strong.clone();
                let weak = weak.clone();
                thread
                    .start(move || {
                        for _ in 0..200 {
                            let copy = strong.clone();
                            assert_eq!(copy.value, 7);
                            if let Some(up) = weak.upgrade() {
                                assert_eq!(up.value, 7);
                            }
                        }
                        drop(strong);
                        for _ in 0..200 {
                            if let Some(up) = weak.upgrade() {
                                assert_eq!(up.value, 7);
                            }
                        }
                    })
                    .unwrap();
                thread
            })
            .collect();
        drop(strong);
        for t in &threads {
            t.join().unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(weak.upgrade().is_none());
        assert_eq!(weak.weak_count(), 1);
    }
}

#[test]
fn weak_only_cycle_breaks() {
    struct Node {
        parent: strand::sync::Mutex<Option<Weak<Node>>>,
        children: strand::sync::Mutex<Vec<Strong<Node>>>,
        drops: Arc<AtomicUsize>,
    }
    impl RefCounted for Node {}
    impl Drop for Node {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let node = |drops: &Arc<AtomicUsize>| {
        Node {
            parent: strand::sync::Mutex::new(None),
            children: strand::sync::Mutex::new(Vec::new()),
            drops: Arc::clone(drops),
        }
        .into_strong()
    };
    let root = node(&drops);
    for _ in 0..3 {
        let child = node(&drops);
        *child.parent.lock() = Some(Strong::downgrade(&root));
        root.children.lock().push(child);
    }
    let first_child = root.children.lock()[0].clone();
    drop(root);
    // Root plus the two children nobody else holds.
    assert_eq!(drops.load(Ordering::SeqCst), 3);
    let parent = first_child.parent.lock().as_ref().and_then(Weak::upgrade);
    assert!(parent.is_none());
    drop(first_child);
    assert_eq!(drops.load(Ordering::SeqCst), 4);
}
