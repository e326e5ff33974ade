//! Index key iterators
//!
//! Both iterators yield the primary keys associated with one index
//! value, forward-only and single-pass; removal through them is not
//! supported. The batched flavor trades staleness for throughput by
//! prefetching a whole batch per lock acquisition.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::arena::EntryRef;
use crate::index::engine::{head_for, link_for};
use crate::map::core::{Chain, MapCore};

/// One key per lock acquisition.
pub struct IndexKeys {
    core: Arc<Mutex<MapCore>>,
    hash: u32,
    value: Bytes,
    chain: Chain,
    /// Entry most recently returned; `None` before the first call and
    /// after exhaustion.
    cursor: Option<EntryRef>,
    started: bool,
}

impl IndexKeys {
    pub(crate) fn new(core: Arc<Mutex<MapCore>>, hash: u32, value: &[u8], chain: Chain) -> Self {
        Self {
            core,
            hash,
            value: Bytes::copy_from_slice(value),
            chain,
            cursor: None,
            started: false,
        }
    }
}

impl Iterator for IndexKeys {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let core = self.core.lock();
        if core.closed {
            return None;
        }
        let mut cur = if self.started {
            let c = self.cursor?;
            // stale cursor: the chain moved under us, stop
            link_for(core.arena.try_get(c)?, self.chain)
        } else {
            self.started = true;
            head_for(&core, self.hash, self.chain)
        };
        while let Some(c) = cur {
            let e = core.arena.try_get(c)?;
            if e.aux_hash == self.hash && e.data[..] == self.value[..] {
                self.cursor = Some(c);
                return Some(e.key);
            }
            cur = link_for(e, self.chain);
        }
        self.cursor = None;
        None
    }
}

/// Up to `batch_size` keys per lock acquisition, prefetched eagerly.
pub struct BatchedIndexKeys {
    core: Arc<Mutex<MapCore>>,
    hash: u32,
    value: Bytes,
    chain: Chain,
    batch: usize,
    buf: VecDeque<u64>,
    /// Entry the next refill resumes after.
    resume: Option<EntryRef>,
    started: bool,
    exhausted: bool,
}

impl BatchedIndexKeys {
    pub(crate) fn new(
        core: Arc<Mutex<MapCore>>,
        hash: u32,
        value: &[u8],
        batch_size: usize,
        chain: Chain,
    ) -> Self {
        let mut keys = Self {
            core,
            hash,
            value: Bytes::copy_from_slice(value),
            chain,
            batch: batch_size.max(1),
            buf: VecDeque::new(),
            resume: None,
            started: false,
            exhausted: false,
        };
        keys.refill();
        keys
    }

    fn refill(&mut self) {
        if self.exhausted {
            return;
        }
        let core = self.core.lock();
        if core.closed {
            self.exhausted = true;
            return;
        }
        let mut cur = if self.started {
            match self.resume.and_then(|r| core.arena.try_get(r)) {
                Some(e) => link_for(e, self.chain),
                None => {
                    self.exhausted = true;
                    return;
                }
            }
        } else {
            self.started = true;
            head_for(&core, self.hash, self.chain)
        };
        while let Some(c) = cur {
            let e = match core.arena.try_get(c) {
                Some(e) => e,
                None => {
                    self.exhausted = true;
                    return;
                }
            };
            if e.aux_hash == self.hash && e.data[..] == self.value[..] {
                self.buf.push_back(e.key);
                self.resume = Some(c);
                if self.buf.len() >= self.batch {
                    return;
                }
            }
            cur = link_for(e, self.chain);
        }
        self.exhausted = true;
    }
}

impl Iterator for BatchedIndexKeys {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.buf.is_empty() {
            self.refill();
        }
        self.buf.pop_front()
    }
}
