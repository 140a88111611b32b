// SPDX-License-Identifier: Apache-2.0
//! Minimal synchronous publish/subscribe used for the select and snapshot
//! channels. Dispatch always runs over a snapshot of the subscriber list so
//! unsubscribing never disturbs an in-flight step.

use std::rc::Rc;

pub(crate) type Callback<T> = Rc<dyn Fn(&T)>;

pub(crate) struct Publisher<T> {
    subscribers: Vec<(u64, Callback<T>)>,
    next_id: u64,
}

impl<T> Publisher<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub(crate) fn subscribe(&mut self, callback: Callback<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, callback));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: u64) {
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Snapshot of the current subscribers, cheap to clone and safe to invoke
    /// after the core borrow is released.
    pub(crate) fn listeners(&self) -> Vec<Callback<T>> {
        self.subscribers
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect()
    }
}
